//! The version lifecycle engine.
//!
//! This is the only writer of a version's `state`, its packages and its
//! approval metadata. Every write is a compare-and-swap on the state the
//! engine read, so two concurrent transitions of the same version can never
//! both succeed.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::{
  Error, Result,
  audit::{AuditEntry, AuditSink},
  context::RequestContext,
  error::StoreResultExt,
  query::{Page, PageRequest, VersionFilter},
  semver::{self, VersionNumber},
  signal::{ChangeSignal, Signals},
  store::Store,
  version::{
    NewPackage, NewVersion, PackageInfo, Transition, Version, VersionPatch,
    VersionState,
  },
};

pub struct VersionLifecycle<S> {
  store:   Arc<S>,
  audit:   Arc<dyn AuditSink>,
  signals: Signals,
}

impl<S> Clone for VersionLifecycle<S> {
  fn clone(&self) -> Self {
    Self {
      store:   self.store.clone(),
      audit:   self.audit.clone(),
      signals: self.signals.clone(),
    }
  }
}

fn validate_server_versions<'a>(
  versions: impl IntoIterator<Item = &'a str>,
) -> Result<()> {
  for v in versions {
    VersionNumber::parse(v)?;
  }
  Ok(())
}

fn validate_checksum(checksum: &str) -> Result<()> {
  let valid = checksum.len() == 64
    && checksum.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
  if valid {
    Ok(())
  } else {
    Err(Error::InvalidRequest(
      "checksum_sha256 must be 64 lowercase hex characters".into(),
    ))
  }
}

fn not_draft(version: &Version, action: &str) -> Error {
  Error::InvalidState(format!(
    "cannot {action} version {} in state {}",
    version.version_number, version.state
  ))
}

impl<S: Store> VersionLifecycle<S> {
  pub fn new(store: Arc<S>, audit: Arc<dyn AuditSink>, signals: Signals) -> Self {
    Self { store, audit, signals }
  }

  // ─── Reads ─────────────────────────────────────────────────────────────

  pub async fn get_version(&self, id: Uuid) -> Result<Version> {
    self
      .store
      .get_version(id)
      .await
      .or_store()?
      .ok_or_else(|| Error::NotFound(format!("version {id}")))
  }

  async fn require_product(&self, product_id: &str) -> Result<()> {
    match self.store.get_product(product_id).await.or_store()? {
      Some(_) => Ok(()),
      None => Err(Error::NotFound(format!("product {product_id}"))),
    }
  }

  /// Versions of a product, newest version number first.
  pub async fn list_versions(
    &self,
    product_id: &str,
    filter: &VersionFilter,
    page: PageRequest,
  ) -> Result<Page<Version>> {
    self.require_product(product_id).await?;
    let mut versions =
      self.store.list_versions(product_id, filter).await.or_store()?;
    versions
      .sort_by(|a, b| semver::compare(&b.version_number, &a.version_number));
    Ok(Page::from_vec(versions, page))
  }

  /// The highest released version of a product that is not past its
  /// end-of-life date.
  pub async fn latest_release(&self, product_id: &str) -> Result<Version> {
    self.require_product(product_id).await?;
    let filter = VersionFilter {
      state:        Some(VersionState::Released),
      release_type: None,
    };
    let now = Utc::now();
    self
      .store
      .list_versions(product_id, &filter)
      .await
      .or_store()?
      .into_iter()
      .filter(|v| v.is_offerable(now))
      .max_by(|a, b| semver::compare(&a.version_number, &b.version_number))
      .ok_or_else(|| Error::NotFound(format!("released version of {product_id}")))
  }

  pub async fn list_packages(&self, id: Uuid) -> Result<Vec<PackageInfo>> {
    Ok(self.get_version(id).await?.packages)
  }

  pub async fn get_package(
    &self,
    id: Uuid,
    package_id: Uuid,
  ) -> Result<PackageInfo> {
    self
      .get_version(id)
      .await?
      .package(package_id)
      .cloned()
      .ok_or_else(|| Error::NotFound(format!("package {package_id}")))
  }

  // ─── Drafts ────────────────────────────────────────────────────────────

  pub async fn create_version(
    &self,
    ctx: &RequestContext,
    product_id: &str,
    input: NewVersion,
  ) -> Result<Version> {
    ctx.check_deadline()?;
    let number = VersionNumber::parse(&input.version_number)?;
    validate_server_versions(
      [
        &input.min_server_version,
        &input.max_server_version,
        &input.recommended_server_version,
      ]
      .into_iter()
      .filter_map(|v| v.as_deref()),
    )?;

    let now = Utc::now();
    let release_date = input.release_date.unwrap_or(now);
    if input.eol_date.is_some_and(|eol| eol < release_date) {
      return Err(Error::InvalidRequest(
        "eol_date is before release_date".into(),
      ));
    }

    self.require_product(product_id).await?;
    // `1.0` and `1.0.0` compare equal, so uniqueness is checked on the
    // parsed number rather than the raw string.
    let existing = self
      .store
      .list_versions(product_id, &VersionFilter::default())
      .await
      .or_store()?;
    if let Some(clash) = existing
      .iter()
      .find(|v| VersionNumber::parse_lossy(&v.version_number) == number)
    {
      return Err(Error::Conflict(format!(
        "version {} of {product_id} already exists as {}",
        input.version_number, clash.version_number
      )));
    }

    let version = Version {
      id: Uuid::new_v4(),
      product_id: product_id.to_owned(),
      version_number: input.version_number,
      release_type: input.release_type,
      state: VersionState::Draft,
      release_date,
      eol_date: input.eol_date,
      min_server_version: input.min_server_version,
      max_server_version: input.max_server_version,
      recommended_server_version: input.recommended_server_version,
      release_notes: input.release_notes,
      packages: Vec::new(),
      created_by: ctx.user_id().to_owned(),
      approved_by: None,
      approved_at: None,
      released_by: None,
      released_at: None,
      created_at: now,
      updated_at: now,
    };
    let version = self.store.insert_version(version).await.or_store()?;

    tracing::info!(
      product = %version.product_id,
      version = %version.version_number,
      id = %version.id,
      "created draft version"
    );
    self.audit.record(
      AuditEntry::new(ctx, "version.create", "version", version.id).with_details(
        json!({
          "product_id": version.product_id,
          "version_number": version.version_number,
        }),
      ),
    );
    Ok(version)
  }

  pub async fn update_draft(
    &self,
    ctx: &RequestContext,
    id: Uuid,
    patch: VersionPatch,
  ) -> Result<Version> {
    ctx.check_deadline()?;
    validate_server_versions(patch.server_versions())?;

    let mut version = self.get_version(id).await?;
    if version.state != VersionState::Draft {
      return Err(not_draft(&version, "edit"));
    }
    if patch.is_empty() {
      return Ok(version);
    }
    patch.apply(&mut version);
    if version.eol_date.is_some_and(|eol| eol < version.release_date) {
      return Err(Error::InvalidRequest(
        "eol_date is before release_date".into(),
      ));
    }

    let version = self.swap(version, VersionState::Draft).await?;
    self
      .audit
      .record(AuditEntry::new(ctx, "version.update", "version", version.id));
    Ok(version)
  }

  /// Remove a version that never left `draft`.
  pub async fn delete_version(
    &self,
    ctx: &RequestContext,
    id: Uuid,
  ) -> Result<Version> {
    ctx.check_deadline()?;
    let version = self.get_version(id).await?;
    if version.state != VersionState::Draft {
      return Err(not_draft(&version, "delete"));
    }
    if !self
      .store
      .delete_version_if_state(id, VersionState::Draft)
      .await
      .or_store()?
    {
      let current = self.get_version(id).await?;
      return Err(not_draft(&current, "delete"));
    }

    tracing::info!(id = %id, version = %version.version_number, "deleted draft version");
    self.audit.record(
      AuditEntry::new(ctx, "version.delete", "version", id)
        .with_details(json!({ "version_number": version.version_number })),
    );
    Ok(version)
  }

  /// Append a package to a draft. The package list only ever grows.
  pub async fn attach_package(
    &self,
    ctx: &RequestContext,
    id: Uuid,
    package: NewPackage,
  ) -> Result<Version> {
    ctx.check_deadline()?;
    if package.file_name.trim().is_empty() {
      return Err(Error::InvalidRequest("file_name is required".into()));
    }
    validate_checksum(&package.checksum_sha256)?;

    let mut version = self.get_version(id).await?;
    if version.state != VersionState::Draft {
      return Err(not_draft(&version, "attach a package to"));
    }
    if version.package(package.package_id).is_some() {
      return Err(Error::Conflict(format!(
        "package {} already attached",
        package.package_id
      )));
    }

    let info = PackageInfo {
      package_id:      package.package_id,
      package_type:    package.package_type,
      file_name:       package.file_name,
      file_size:       package.file_size,
      checksum_sha256: package.checksum_sha256,
      os:              package.os,
      architecture:    package.architecture,
      uploaded_at:     Utc::now(),
      uploaded_by:     ctx.user_id().to_owned(),
    };
    let package_id = info.package_id;
    version.packages.push(info);

    let version = self.swap(version, VersionState::Draft).await?;
    tracing::info!(
      id = %version.id,
      package = %package_id,
      "attached package"
    );
    self.audit.record(
      AuditEntry::new(ctx, "version.attach_package", "version", version.id)
        .with_details(json!({ "package_id": package_id })),
    );
    Ok(version)
  }

  // ─── Transitions ───────────────────────────────────────────────────────

  pub async fn submit_for_review(
    &self,
    ctx: &RequestContext,
    id: Uuid,
  ) -> Result<Version> {
    self.transition(ctx, id, Transition::Submit, None).await
  }

  /// Approve a pending version. `approved_by` defaults to the caller.
  pub async fn approve(
    &self,
    ctx: &RequestContext,
    id: Uuid,
    approved_by: Option<String>,
  ) -> Result<Version> {
    self.transition(ctx, id, Transition::Approve, approved_by).await
  }

  pub async fn release(&self, ctx: &RequestContext, id: Uuid) -> Result<Version> {
    self.transition(ctx, id, Transition::Release, None).await
  }

  pub async fn deprecate(
    &self,
    ctx: &RequestContext,
    id: Uuid,
  ) -> Result<Version> {
    self.transition(ctx, id, Transition::Deprecate, None).await
  }

  pub async fn mark_eol(&self, ctx: &RequestContext, id: Uuid) -> Result<Version> {
    self.transition(ctx, id, Transition::EndOfLife, None).await
  }

  async fn transition(
    &self,
    ctx: &RequestContext,
    id: Uuid,
    transition: Transition,
    approved_by: Option<String>,
  ) -> Result<Version> {
    ctx.check_deadline()?;
    let mut version = self.get_version(id).await?;
    let from = transition.from_state();
    if version.state != from {
      return Err(Error::InvalidState(format!(
        "cannot {transition} version {}: state is {}, expected {from}",
        version.version_number, version.state
      )));
    }

    let now = Utc::now();
    version.state = transition.to_state();
    match transition {
      Transition::Approve => {
        let by = approved_by
          .filter(|s| !s.trim().is_empty())
          .unwrap_or_else(|| ctx.user_id().to_owned());
        version.approved_by = Some(by);
        version.approved_at = Some(now);
      }
      Transition::Release => {
        version.released_by = Some(ctx.user_id().to_owned());
        version.released_at = Some(now);
      }
      Transition::Submit | Transition::Deprecate | Transition::EndOfLife => {}
    }

    let version = self.swap(version, from).await?;
    tracing::info!(
      product = %version.product_id,
      version = %version.version_number,
      from = %from,
      to = %version.state,
      "version transition"
    );

    if matches!(
      transition,
      Transition::Release | Transition::Deprecate | Transition::EndOfLife
    ) {
      self.signals.emit(ChangeSignal::VersionReleased {
        product_id: version.product_id.clone(),
      });
    }
    self.audit.record(
      AuditEntry::new(ctx, transition.action(), "version", version.id)
        .with_details(json!({
          "from": from,
          "to": version.state,
          "version_number": version.version_number,
        })),
    );
    Ok(version)
  }

  /// Persist `version` only if the stored state is still `expected`.
  async fn swap(&self, version: Version, expected: VersionState) -> Result<Version> {
    let id = version.id;
    match self
      .store
      .replace_version_if_state(version, expected)
      .await
      .or_store()?
    {
      Some(stored) => Ok(stored),
      None => {
        let current = self.get_version(id).await?;
        Err(Error::InvalidState(format!(
          "version {} moved to {} concurrently",
          current.version_number, current.state
        )))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn checksum_must_be_lowercase_sha256_hex() {
    assert!(validate_checksum(&"a".repeat(64)).is_ok());
    assert!(validate_checksum(&"0123456789abcdef".repeat(4)).is_ok());
    assert!(validate_checksum(&"A".repeat(64)).is_err());
    assert!(validate_checksum(&"a".repeat(63)).is_err());
    assert!(validate_checksum("").is_err());
  }

  #[test]
  fn server_versions_are_validated() {
    assert!(validate_server_versions(["1.0", "2.3.4"]).is_ok());
    assert!(validate_server_versions(["1.x"]).is_err());
  }
}
