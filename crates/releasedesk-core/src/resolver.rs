//! Pending-updates resolution.
//!
//! [`compute_updates`] is the pure heart: given a deployment and the released
//! versions of its product it picks the candidates, ranks them and derives gap
//! type and priority. [`UpdateResolver`] wraps it with store reads, the
//! per-deployment cache and the tenant / customer / fleet roll-ups.
//!
//! Only per-deployment results are cached. Aggregates are recomputed from
//! (possibly cached) deployment results on every call, so evicting a
//! deployment entry is enough to keep every aggregate coherent.

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  cache::{TtlCache, deployment_key},
  context::RequestContext,
  error::StoreResultExt,
  fleet::{Customer, Deployment, DeploymentType, Tenant},
  query::{DeploymentFilter, EntityRef, Page, PageRequest, UpdateFilter, VersionFilter},
  semver::{self, GapType},
  store::Store,
  version::{ReleaseType, Version, VersionState},
};

// ─── Result types ────────────────────────────────────────────────────────────

/// Urgency of a deployment's pending updates. Declaration order is ascending
/// urgency.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
  Normal,
  High,
  Critical,
}

impl Priority {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Normal => "normal",
      Self::High => "high",
      Self::Critical => "critical",
    }
  }
}

/// One candidate version as offered to a deployment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvailableUpdate {
  pub version_id:     Uuid,
  pub version_number: String,
  pub release_type:   ReleaseType,
  pub release_date:   DateTime<Utc>,
  pub eol_date:       Option<DateTime<Utc>>,
  pub release_notes:  Option<String>,
  pub package_count:  usize,
}

impl From<&Version> for AvailableUpdate {
  fn from(v: &Version) -> Self {
    Self {
      version_id:     v.id,
      version_number: v.version_number.clone(),
      release_type:   v.release_type,
      release_date:   v.release_date,
      eol_date:       v.eol_date,
      release_notes:  v.release_notes.clone(),
      package_count:  v.packages.len(),
    }
  }
}

/// Pending updates of one deployment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentUpdates {
  pub id:                Uuid,
  pub deployment_id:     String,
  pub customer_id:       String,
  pub tenant_id:         String,
  pub product_id:        String,
  pub deployment_type:   DeploymentType,
  pub current_version:   String,
  pub latest_version:    Option<String>,
  pub update_count:      usize,
  pub available_updates: Vec<AvailableUpdate>,
  pub gap_type:          GapType,
  pub priority:          Priority,
  pub checked_at:        DateTime<Utc>,
}

impl DeploymentUpdates {
  pub fn has_updates(&self) -> bool { self.update_count > 0 }
}

/// Count of deployments with pending updates, per priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PriorityCounts {
  pub critical: u64,
  pub high:     u64,
  pub normal:   u64,
}

impl PriorityCounts {
  fn bump(&mut self, priority: Priority) {
    match priority {
      Priority::Critical => self.critical += 1,
      Priority::High => self.high += 1,
      Priority::Normal => self.normal += 1,
    }
  }

  fn merge(&mut self, other: &Self) {
    self.critical += other.critical;
    self.high += other.high;
    self.normal += other.normal;
  }
}

/// Totals shared by the tenant and customer roll-ups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateSummary {
  pub total_deployments:        u64,
  pub deployments_with_updates: u64,
  pub total_updates:            u64,
  pub by_priority:              PriorityCounts,
  /// Deployments with pending updates, per product.
  pub by_product:               BTreeMap<String, u64>,
}

impl UpdateSummary {
  fn add(&mut self, d: &DeploymentUpdates) {
    self.total_deployments += 1;
    if d.has_updates() {
      self.deployments_with_updates += 1;
      self.total_updates += d.update_count as u64;
      self.by_priority.bump(d.priority);
      *self.by_product.entry(d.product_id.clone()).or_default() += 1;
    }
  }

  fn merge(&mut self, other: &Self) {
    self.total_deployments += other.total_deployments;
    self.deployments_with_updates += other.deployments_with_updates;
    self.total_updates += other.total_updates;
    self.by_priority.merge(&other.by_priority);
    for (product, n) in &other.by_product {
      *self.by_product.entry(product.clone()).or_default() += n;
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TenantUpdates {
  pub customer_id: String,
  pub tenant_id:   String,
  pub tenant_name: String,
  #[serde(flatten)]
  pub summary:     UpdateSummary,
  pub deployments: Vec<DeploymentUpdates>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerUpdates {
  pub customer_id:   String,
  pub customer_name: String,
  pub total_tenants: u64,
  #[serde(flatten)]
  pub summary:       UpdateSummary,
  pub tenants:       Vec<TenantUpdates>,
}

// ─── Pure computation ────────────────────────────────────────────────────────

/// Compute the pending updates of `deployment` from `versions`, which may
/// contain any versions of any product; non-candidates are ignored.
pub fn compute_updates(
  deployment: &Deployment,
  versions: &[Version],
  now: DateTime<Utc>,
) -> DeploymentUpdates {
  let installed = &deployment.installed_version;
  let mut candidates: Vec<&Version> = versions
    .iter()
    .filter(|v| v.product_id == deployment.product_id)
    .filter(|v| v.is_offerable(now))
    .filter(|v| semver::is_newer(&v.version_number, installed))
    .collect();

  // Newest release first; the version number breaks same-instant ties.
  candidates.sort_by(|a, b| {
    b.release_date
      .cmp(&a.release_date)
      .then_with(|| semver::compare(&b.version_number, &a.version_number))
  });

  let latest = candidates.first().map(|v| v.version_number.clone());
  let gap_type = latest
    .as_deref()
    .map_or(GapType::None, |latest| semver::gap_type(installed, latest));

  let priority = if candidates
    .iter()
    .any(|v| v.release_type == ReleaseType::Security)
  {
    Priority::Critical
  } else if gap_type == GapType::Major
    && deployment.deployment_type == DeploymentType::Production
  {
    Priority::High
  } else {
    Priority::Normal
  };

  DeploymentUpdates {
    id: deployment.id,
    deployment_id: deployment.deployment_id.clone(),
    customer_id: deployment.customer_id.clone(),
    tenant_id: deployment.tenant_id.clone(),
    product_id: deployment.product_id.clone(),
    deployment_type: deployment.deployment_type,
    current_version: installed.clone(),
    latest_version: latest,
    update_count: candidates.len(),
    available_updates: candidates.into_iter().map(AvailableUpdate::from).collect(),
    gap_type,
    priority,
    checked_at: now,
  }
}

fn matches_priority(filter: &UpdateFilter, d: &DeploymentUpdates) -> bool {
  filter.priority.is_none_or(|p| d.priority == p)
}

// ─── Resolver ────────────────────────────────────────────────────────────────

pub type UpdateCache = TtlCache<DeploymentUpdates>;

pub struct UpdateResolver<S> {
  store: Arc<S>,
  cache: Arc<UpdateCache>,
}

impl<S> Clone for UpdateResolver<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), cache: self.cache.clone() }
  }
}

impl<S: Store> UpdateResolver<S> {
  pub fn new(store: Arc<S>, cache: Arc<UpdateCache>) -> Self {
    Self { store, cache }
  }

  pub fn cache(&self) -> &Arc<UpdateCache> { &self.cache }

  /// Pending updates of one deployment, addressed by surrogate id or
  /// business key.
  pub async fn updates_for_deployment(
    &self,
    deployment: &EntityRef,
  ) -> Result<DeploymentUpdates> {
    if let EntityRef::Id(id) = deployment
      && let Some(hit) = self.cache.get(&deployment_key(*id))
    {
      return Ok(hit);
    }

    let epoch = self.cache.epoch();
    let deployment = self
      .store
      .get_deployment(deployment)
      .await
      .or_store()?
      .ok_or_else(|| Error::NotFound(format!("deployment {deployment}")))?;
    self.resolve(deployment, epoch).await
  }

  async fn resolve(
    &self,
    deployment: Deployment,
    epoch: u64,
  ) -> Result<DeploymentUpdates> {
    let key = deployment_key(deployment.id);
    if let Some(hit) = self.cache.get(&key) {
      return Ok(hit);
    }

    let released = VersionFilter {
      state:        Some(VersionState::Released),
      release_type: None,
    };
    let versions = self
      .store
      .list_versions(&deployment.product_id, &released)
      .await
      .or_store()?;
    let updates = compute_updates(&deployment, &versions, Utc::now());
    self.cache.insert(
      key,
      deployment.product_id.clone(),
      updates.clone(),
      epoch,
    );
    Ok(updates)
  }

  /// Resolve many deployments, skipping (and logging) individual failures.
  /// `epoch` must be read before `deployments` were loaded.
  async fn resolve_all(
    &self,
    ctx: &RequestContext,
    deployments: Vec<Deployment>,
    epoch: u64,
  ) -> Result<Vec<DeploymentUpdates>> {
    let mut out = Vec::with_capacity(deployments.len());
    for deployment in deployments {
      ctx.check_deadline()?;
      let id = deployment.deployment_id.clone();
      match self.resolve(deployment, epoch).await {
        Ok(updates) => out.push(updates),
        Err(e) => {
          tracing::warn!(deployment = %id, error = %e, "skipping deployment in update roll-up");
        }
      }
    }
    Ok(out)
  }

  async fn customer(&self, customer: &EntityRef) -> Result<Customer> {
    self
      .store
      .get_customer(customer)
      .await
      .or_store()?
      .ok_or_else(|| Error::NotFound(format!("customer {customer}")))
  }

  async fn tenant_summary(
    &self,
    ctx: &RequestContext,
    tenant: &Tenant,
    filter: &UpdateFilter,
  ) -> Result<TenantUpdates> {
    let epoch = self.cache.epoch();
    let deployments = self
      .store
      .list_deployments(&DeploymentFilter {
        tenant_id: Some(tenant.tenant_id.clone()),
        product_id: filter.product_id.clone(),
        deployment_type: filter.deployment_type,
        ..Default::default()
      })
      .await
      .or_store()?;

    let mut deployments = self.resolve_all(ctx, deployments, epoch).await?;
    deployments.retain(|d| matches_priority(filter, d));

    let mut summary = UpdateSummary::default();
    for d in &deployments {
      summary.add(d);
    }
    Ok(TenantUpdates {
      customer_id: tenant.customer_id.clone(),
      tenant_id: tenant.tenant_id.clone(),
      tenant_name: tenant.name.clone(),
      summary,
      deployments,
    })
  }

  /// Roll-up over the deployments of one tenant of `customer`.
  pub async fn updates_for_tenant(
    &self,
    ctx: &RequestContext,
    customer: &EntityRef,
    tenant: &EntityRef,
    filter: &UpdateFilter,
  ) -> Result<TenantUpdates> {
    let customer = self.customer(customer).await?;
    let tenant = self
      .store
      .get_tenant(tenant)
      .await
      .or_store()?
      .filter(|t| t.customer_id == customer.customer_id)
      .ok_or_else(|| Error::NotFound(format!("tenant {tenant}")))?;
    self.tenant_summary(ctx, &tenant, filter).await
  }

  /// Roll-up over every tenant of `customer`.
  pub async fn updates_for_customer(
    &self,
    ctx: &RequestContext,
    customer: &EntityRef,
    filter: &UpdateFilter,
  ) -> Result<CustomerUpdates> {
    let customer = self.customer(customer).await?;
    let tenants = self
      .store
      .list_tenants(&customer.customer_id)
      .await
      .or_store()?;

    let mut summary = UpdateSummary::default();
    let mut out = Vec::with_capacity(tenants.len());
    for tenant in tenants {
      if filter.tenant_id.as_ref().is_some_and(|t| *t != tenant.tenant_id) {
        continue;
      }
      let t = self.tenant_summary(ctx, &tenant, filter).await?;
      summary.merge(&t.summary);
      out.push(t);
    }

    Ok(CustomerUpdates {
      customer_id: customer.customer_id,
      customer_name: customer.name,
      total_tenants: out.len() as u64,
      summary,
      tenants: out,
    })
  }

  /// Every deployment with at least one pending update, most urgent first.
  pub async fn updates_for_fleet(
    &self,
    ctx: &RequestContext,
    filter: &UpdateFilter,
    page: PageRequest,
  ) -> Result<Page<DeploymentUpdates>> {
    // Filters accept either reference form; an unknown one matches nothing.
    let customer_id = match &filter.customer_id {
      Some(raw) => Some(
        self
          .store
          .get_customer(&EntityRef::parse(raw))
          .await
          .or_store()?
          .map_or_else(|| raw.clone(), |c| c.customer_id),
      ),
      None => None,
    };
    let tenant_id = match &filter.tenant_id {
      Some(raw) => Some(
        self
          .store
          .get_tenant(&EntityRef::parse(raw))
          .await
          .or_store()?
          .map_or_else(|| raw.clone(), |t| t.tenant_id),
      ),
      None => None,
    };

    let epoch = self.cache.epoch();
    let deployments = self
      .store
      .list_deployments(&DeploymentFilter {
        customer_id,
        tenant_id,
        product_id: filter.product_id.clone(),
        deployment_type: filter.deployment_type,
        status: None,
      })
      .await
      .or_store()?;

    let mut results = self.resolve_all(ctx, deployments, epoch).await?;
    results.retain(|d| d.has_updates() && matches_priority(filter, d));
    results.sort_by(|a, b| {
      b.priority
        .cmp(&a.priority)
        .then_with(|| a.customer_id.cmp(&b.customer_id))
        .then_with(|| a.tenant_id.cmp(&b.tenant_id))
        .then_with(|| a.deployment_id.cmp(&b.deployment_id))
    });
    Ok(Page::from_vec(results, page))
  }
}

#[cfg(test)]
mod tests {
  use chrono::Duration;

  use super::*;
  use crate::fleet::DeploymentStatus;

  fn deployment(installed: &str, deployment_type: DeploymentType) -> Deployment {
    let now = Utc::now();
    Deployment {
      id: Uuid::new_v4(),
      deployment_id: "DEP-1".into(),
      customer_id: "CUST-1".into(),
      tenant_id: "TEN-1".into(),
      product_id: "p1".into(),
      deployment_type,
      installed_version: installed.into(),
      number_of_users: None,
      license_id: None,
      server_hostname: None,
      notes: None,
      status: DeploymentStatus::Active,
      deployment_date: now,
      last_updated_date: None,
      created_by: "admin".into(),
      created_at: now,
      updated_at: now,
    }
  }

  fn version(
    number: &str,
    release_type: ReleaseType,
    state: VersionState,
    days_ago: i64,
  ) -> Version {
    let now = Utc::now();
    Version {
      id: Uuid::new_v4(),
      product_id: "p1".into(),
      version_number: number.into(),
      release_type,
      state,
      release_date: now - Duration::days(days_ago),
      eol_date: None,
      min_server_version: None,
      max_server_version: None,
      recommended_server_version: None,
      release_notes: None,
      packages: vec![],
      created_by: "admin".into(),
      approved_by: None,
      approved_at: None,
      released_by: None,
      released_at: None,
      created_at: now,
      updated_at: now,
    }
  }

  fn released(number: &str, release_type: ReleaseType, days_ago: i64) -> Version {
    version(number, release_type, VersionState::Released, days_ago)
  }

  #[test]
  fn no_candidates_means_no_gap_and_normal_priority() {
    let d = deployment("1.0.0", DeploymentType::Production);
    let u = compute_updates(&d, &[released("1.0.0", ReleaseType::Major, 3)], Utc::now());
    assert_eq!(u.update_count, 0);
    assert_eq!(u.latest_version, None);
    assert_eq!(u.gap_type, GapType::None);
    assert_eq!(u.priority, Priority::Normal);
  }

  #[test]
  fn candidates_are_newest_release_first() {
    let d = deployment("1.0.0", DeploymentType::Testing);
    let versions = [
      released("1.1.0", ReleaseType::Feature, 10),
      released("1.2.0", ReleaseType::Feature, 1),
      released("0.9.0", ReleaseType::Feature, 30),
    ];
    let u = compute_updates(&d, &versions, Utc::now());
    let numbers: Vec<_> = u
      .available_updates
      .iter()
      .map(|a| a.version_number.as_str())
      .collect();
    assert_eq!(numbers, ["1.2.0", "1.1.0"]);
    assert_eq!(u.latest_version.as_deref(), Some("1.2.0"));
    assert_eq!(u.gap_type, GapType::Minor);
  }

  #[test]
  fn non_released_and_past_eol_versions_are_not_candidates() {
    let d = deployment("1.0.0", DeploymentType::Production);
    let mut past_eol = released("1.3.0", ReleaseType::Feature, 5);
    past_eol.eol_date = Some(Utc::now() - Duration::days(1));
    let mut future_eol = released("1.4.0", ReleaseType::Feature, 5);
    future_eol.eol_date = Some(Utc::now() + Duration::days(30));
    let versions = [
      version("1.1.0", ReleaseType::Feature, VersionState::Approved, 1),
      version("1.2.0", ReleaseType::Feature, VersionState::Deprecated, 1),
      version("2.0.0", ReleaseType::Major, VersionState::Eol, 1),
      past_eol,
      future_eol,
    ];
    let u = compute_updates(&d, &versions, Utc::now());
    assert_eq!(u.update_count, 1);
    assert_eq!(u.latest_version.as_deref(), Some("1.4.0"));
  }

  #[test]
  fn priority_ladder() {
    let now = Utc::now();
    let prod = deployment("1.0.0", DeploymentType::Production);
    let security = [released("1.0.1", ReleaseType::Security, 1)];
    assert_eq!(compute_updates(&prod, &security, now).priority, Priority::Critical);

    let major = [released("2.0.0", ReleaseType::Major, 1)];
    let u = compute_updates(&prod, &major, now);
    assert_eq!(u.gap_type, GapType::Major);
    assert_eq!(u.priority, Priority::High);

    let uat = deployment("1.0.0", DeploymentType::Uat);
    assert_eq!(compute_updates(&uat, &major, now).priority, Priority::Normal);
  }

  #[test]
  fn security_anywhere_in_the_list_is_critical() {
    let d = deployment("1.0.0", DeploymentType::Development);
    let versions = [
      released("1.0.1", ReleaseType::Security, 20),
      released("1.1.0", ReleaseType::Feature, 1),
    ];
    let u = compute_updates(&d, &versions, Utc::now());
    assert_eq!(u.latest_version.as_deref(), Some("1.1.0"));
    assert_eq!(u.priority, Priority::Critical);
  }

  #[test]
  fn other_products_are_ignored() {
    let d = deployment("1.0.0", DeploymentType::Production);
    let mut other = released("9.0.0", ReleaseType::Security, 1);
    other.product_id = "p2".into();
    assert_eq!(compute_updates(&d, &[other], Utc::now()).update_count, 0);
  }

  #[test]
  fn summary_counts_only_deployments_with_updates() {
    let now = Utc::now();
    let mut summary = UpdateSummary::default();
    let with = compute_updates(
      &deployment("1.0.0", DeploymentType::Production),
      &[released("1.0.1", ReleaseType::Security, 1), released("1.0.2", ReleaseType::Maintenance, 0)],
      now,
    );
    let without = compute_updates(&deployment("1.0.2", DeploymentType::Uat), &[], now);
    summary.add(&with);
    summary.add(&without);

    assert_eq!(summary.total_deployments, 2);
    assert_eq!(summary.deployments_with_updates, 1);
    assert_eq!(summary.total_updates, 2);
    assert_eq!(summary.by_priority.critical, 1);
    assert_eq!(summary.by_priority.normal, 0);
    assert_eq!(summary.by_product.get("p1"), Some(&1));
  }
}
