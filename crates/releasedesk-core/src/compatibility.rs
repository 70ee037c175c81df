//! Compatibility matrices and upgrade-path edges.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::{
  Error, Result,
  audit::{AuditEntry, AuditSink},
  compat::{
    CompatibilityMatrix, MatrixInput, NewUpgradePath, PathType, UpgradePath,
    ValidationStatus,
  },
  context::RequestContext,
  error::StoreResultExt,
  semver::VersionNumber,
  store::Store,
  version::Version,
};

pub struct Compatibility<S> {
  store: Arc<S>,
  audit: Arc<dyn AuditSink>,
}

impl<S> Clone for Compatibility<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), audit: self.audit.clone() }
  }
}

impl<S: Store> Compatibility<S> {
  pub fn new(store: Arc<S>, audit: Arc<dyn AuditSink>) -> Self {
    Self { store, audit }
  }

  /// Both the product and the version must exist.
  async fn require_version(
    &self,
    product_id: &str,
    version_number: &str,
  ) -> Result<Version> {
    if self.store.get_product(product_id).await.or_store()?.is_none() {
      return Err(Error::NotFound(format!("product {product_id}")));
    }
    self
      .store
      .find_version(product_id, version_number)
      .await
      .or_store()?
      .ok_or_else(|| {
        Error::NotFound(format!("version {version_number} of {product_id}"))
      })
  }

  pub async fn get_matrix(
    &self,
    product_id: &str,
    version_number: &str,
  ) -> Result<CompatibilityMatrix> {
    self.require_version(product_id, version_number).await?;
    self
      .store
      .get_matrix(product_id, version_number)
      .await
      .or_store()?
      .ok_or_else(|| {
        Error::NotFound(format!(
          "compatibility matrix for {product_id} {version_number}"
        ))
      })
  }

  /// Replace the matrix of a version wholesale and mark it validated by the
  /// caller.
  pub async fn upsert_matrix(
    &self,
    ctx: &RequestContext,
    product_id: &str,
    version_number: &str,
    input: MatrixInput,
  ) -> Result<CompatibilityMatrix> {
    ctx.check_deadline()?;
    for v in [
      &input.min_server_version,
      &input.max_server_version,
      &input.recommended_server_version,
    ]
    .into_iter()
    .flatten()
    .chain(&input.incompatible_versions)
    {
      VersionNumber::parse(v)?;
    }
    if let (Some(min), Some(max)) =
      (&input.min_server_version, &input.max_server_version)
      && VersionNumber::parse_lossy(min) > VersionNumber::parse_lossy(max)
    {
      return Err(Error::InvalidRequest(format!(
        "min_server_version {min} is above max_server_version {max}"
      )));
    }

    let version = self.require_version(product_id, version_number).await?;
    let now = Utc::now();
    let matrix = CompatibilityMatrix {
      id: Uuid::new_v4(),
      product_id: version.product_id,
      version_number: version.version_number,
      min_server_version: input.min_server_version,
      max_server_version: input.max_server_version,
      recommended_server_version: input.recommended_server_version,
      incompatible_versions: input.incompatible_versions,
      validation_status: ValidationStatus::Passed,
      validated_by: Some(ctx.user_id().to_owned()),
      validated_at: Some(now),
      notes: input.notes,
      created_at: now,
      updated_at: now,
    };
    let matrix = self.store.upsert_matrix(matrix).await.or_store()?;

    self.audit.record(
      AuditEntry::new(ctx, "compatibility.upsert", "compatibility", matrix.id)
        .with_details(json!({
          "product_id": matrix.product_id,
          "version_number": matrix.version_number,
        })),
    );
    Ok(matrix)
  }

  // ─── Upgrade paths ─────────────────────────────────────────────────────

  pub async fn create_upgrade_path(
    &self,
    ctx: &RequestContext,
    product_id: &str,
    input: NewUpgradePath,
  ) -> Result<UpgradePath> {
    ctx.check_deadline()?;
    if input.from_version == input.to_version {
      return Err(Error::InvalidRequest(
        "an upgrade path needs two distinct versions".into(),
      ));
    }
    self.require_version(product_id, &input.from_version).await?;
    self.require_version(product_id, &input.to_version).await?;

    let now = Utc::now();
    let path = UpgradePath {
      id:           Uuid::new_v4(),
      product_id:   product_id.to_owned(),
      from_version: input.from_version,
      to_version:   input.to_version,
      path_type:    PathType::Direct,
      is_blocked:   false,
      block_reason: None,
      notes:        input.notes,
      created_by:   ctx.user_id().to_owned(),
      blocked_by:   None,
      blocked_at:   None,
      created_at:   now,
      updated_at:   now,
    };
    let path = self.store.insert_upgrade_path(path).await.or_store()?;

    self.audit.record(
      AuditEntry::new(ctx, "upgrade_path.create", "upgrade_path", path.id)
        .with_details(json!({
          "from_version": path.from_version,
          "to_version": path.to_version,
        })),
    );
    Ok(path)
  }

  pub async fn list_upgrade_paths(
    &self,
    product_id: &str,
    from_version: Option<&str>,
  ) -> Result<Vec<UpgradePath>> {
    if self.store.get_product(product_id).await.or_store()?.is_none() {
      return Err(Error::NotFound(format!("product {product_id}")));
    }
    self
      .store
      .list_upgrade_paths(product_id, from_version)
      .await
      .or_store()
  }

  pub async fn block_upgrade_path(
    &self,
    ctx: &RequestContext,
    id: Uuid,
    reason: String,
  ) -> Result<UpgradePath> {
    ctx.check_deadline()?;
    if reason.trim().is_empty() {
      return Err(Error::InvalidRequest("a block reason is required".into()));
    }
    let mut path = self
      .store
      .get_upgrade_path(id)
      .await
      .or_store()?
      .ok_or_else(|| Error::NotFound(format!("upgrade path {id}")))?;

    path.is_blocked = true;
    path.path_type = PathType::Blocked;
    path.block_reason = Some(reason);
    path.blocked_by = Some(ctx.user_id().to_owned());
    path.blocked_at = Some(Utc::now());
    let path = self.store.update_upgrade_path(path).await.or_store()?;

    tracing::info!(path = %path.id, from = %path.from_version, to = %path.to_version, "blocked upgrade path");
    self.audit.record(
      AuditEntry::new(ctx, "upgrade_path.block", "upgrade_path", path.id)
        .with_details(json!({ "reason": path.block_reason })),
    );
    Ok(path)
  }

  pub async fn delete_upgrade_path(
    &self,
    ctx: &RequestContext,
    id: Uuid,
  ) -> Result<()> {
    ctx.check_deadline()?;
    if !self.store.delete_upgrade_path(id).await.or_store()? {
      return Err(Error::NotFound(format!("upgrade path {id}")));
    }
    self
      .audit
      .record(AuditEntry::new(ctx, "upgrade_path.delete", "upgrade_path", id));
    Ok(())
  }
}
