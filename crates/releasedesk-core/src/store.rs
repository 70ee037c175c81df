//! Store traits consumed by the engines.
//!
//! The traits are implemented by storage backends (e.g.
//! `releasedesk-store-sqlite`). Engines depend on these abstractions, never on
//! a concrete backend.
//!
//! Contract shared by every backend:
//!
//! - single-record writes are atomic;
//! - `insert_*` sets `created_at` and `updated_at`, `update_*` bumps
//!   `updated_at`, and both return the record as stored;
//! - a unique-key violation surfaces as an error that converts into
//!   [`crate::Error::Conflict`];
//! - guarded deletes re-check their guard inside the same atomic write and
//!   report `false` instead of deleting when it no longer holds.
//!
//! All methods return `Send` futures so engines can be driven from a
//! multi-threaded runtime (tokio with `axum`).

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  compat::{CompatibilityMatrix, UpgradePath},
  fleet::{Customer, Deployment, Tenant},
  license::{AllocationStatus, License, LicenseAllocation, Subscription},
  product::Product,
  query::{
    CustomerFilter, DeploymentFilter, DetectionFilter, EntityRef, LicenseFilter,
    Page, PageRequest, ProductFilter, RolloutFilter, VersionFilter,
  },
  rollout::{UpdateDetection, UpdateRollout},
  version::{Version, VersionState},
};

/// Common error type of a storage backend.
pub trait StoreBackend: Send + Sync + 'static {
  type Error: std::error::Error + Send + Sync + Into<crate::Error> + 'static;
}

// ─── Catalogue: products, versions, compatibility ────────────────────────────

pub trait CatalogStore: StoreBackend {
  // ── Products ──────────────────────────────────────────────────────────

  fn insert_product(
    &self,
    product: Product,
  ) -> impl Future<Output = Result<Product, Self::Error>> + Send;

  fn get_product(
    &self,
    product_id: &str,
  ) -> impl Future<Output = Result<Option<Product>, Self::Error>> + Send;

  fn list_products(
    &self,
    filter: &ProductFilter,
    page: PageRequest,
  ) -> impl Future<Output = Result<Page<Product>, Self::Error>> + Send;

  fn update_product(
    &self,
    product: Product,
  ) -> impl Future<Output = Result<Product, Self::Error>> + Send;

  /// Delete a product only if no version references it.
  fn delete_product(
    &self,
    product_id: &str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send;

  fn count_versions(
    &self,
    product_id: &str,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send;

  // ── Versions ──────────────────────────────────────────────────────────

  fn insert_version(
    &self,
    version: Version,
  ) -> impl Future<Output = Result<Version, Self::Error>> + Send;

  fn get_version(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Version>, Self::Error>> + Send;

  fn find_version(
    &self,
    product_id: &str,
    version_number: &str,
  ) -> impl Future<Output = Result<Option<Version>, Self::Error>> + Send;

  /// All versions of a product matching `filter`, in no particular order.
  fn list_versions(
    &self,
    product_id: &str,
    filter: &VersionFilter,
  ) -> impl Future<Output = Result<Vec<Version>, Self::Error>> + Send;

  /// Compare-and-swap on the lifecycle state: replace the stored document
  /// only if its state still equals `expected`. Returns `None` when the
  /// version is missing or its state has moved.
  fn replace_version_if_state(
    &self,
    version: Version,
    expected: VersionState,
  ) -> impl Future<Output = Result<Option<Version>, Self::Error>> + Send;

  /// Delete a version only if its state still equals `expected`.
  fn delete_version_if_state(
    &self,
    id: Uuid,
    expected: VersionState,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send;

  // ── Compatibility & upgrade paths ─────────────────────────────────────

  /// Insert or wholesale-replace the matrix keyed by its
  /// `(product_id, version_number)`.
  fn upsert_matrix(
    &self,
    matrix: CompatibilityMatrix,
  ) -> impl Future<Output = Result<CompatibilityMatrix, Self::Error>> + Send;

  fn get_matrix(
    &self,
    product_id: &str,
    version_number: &str,
  ) -> impl Future<Output = Result<Option<CompatibilityMatrix>, Self::Error>> + Send;

  fn insert_upgrade_path(
    &self,
    path: UpgradePath,
  ) -> impl Future<Output = Result<UpgradePath, Self::Error>> + Send;

  fn get_upgrade_path(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<UpgradePath>, Self::Error>> + Send;

  fn list_upgrade_paths(
    &self,
    product_id: &str,
    from_version: Option<&str>,
  ) -> impl Future<Output = Result<Vec<UpgradePath>, Self::Error>> + Send;

  fn update_upgrade_path(
    &self,
    path: UpgradePath,
  ) -> impl Future<Output = Result<UpgradePath, Self::Error>> + Send;

  fn delete_upgrade_path(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send;
}

// ─── Fleet: customers, tenants, deployments ──────────────────────────────────

pub trait FleetStore: StoreBackend {
  fn insert_customer(
    &self,
    customer: Customer,
  ) -> impl Future<Output = Result<Customer, Self::Error>> + Send;

  fn get_customer(
    &self,
    customer: &EntityRef,
  ) -> impl Future<Output = Result<Option<Customer>, Self::Error>> + Send;

  fn list_customers(
    &self,
    filter: &CustomerFilter,
    page: PageRequest,
  ) -> impl Future<Output = Result<Page<Customer>, Self::Error>> + Send;

  fn update_customer(
    &self,
    customer: Customer,
  ) -> impl Future<Output = Result<Customer, Self::Error>> + Send;

  /// Delete a customer only if it owns no tenants.
  fn delete_customer(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send;

  fn insert_tenant(
    &self,
    tenant: Tenant,
  ) -> impl Future<Output = Result<Tenant, Self::Error>> + Send;

  fn get_tenant(
    &self,
    tenant: &EntityRef,
  ) -> impl Future<Output = Result<Option<Tenant>, Self::Error>> + Send;

  fn list_tenants(
    &self,
    customer_id: &str,
  ) -> impl Future<Output = Result<Vec<Tenant>, Self::Error>> + Send;

  fn count_tenants(
    &self,
    customer_id: &str,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send;

  fn update_tenant(
    &self,
    tenant: Tenant,
  ) -> impl Future<Output = Result<Tenant, Self::Error>> + Send;

  /// Delete a tenant only if it owns no deployments.
  fn delete_tenant(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send;

  fn insert_deployment(
    &self,
    deployment: Deployment,
  ) -> impl Future<Output = Result<Deployment, Self::Error>> + Send;

  fn get_deployment(
    &self,
    deployment: &EntityRef,
  ) -> impl Future<Output = Result<Option<Deployment>, Self::Error>> + Send;

  /// Deployments matching `filter`, ordered by `deployment_id`.
  fn list_deployments(
    &self,
    filter: &DeploymentFilter,
  ) -> impl Future<Output = Result<Vec<Deployment>, Self::Error>> + Send;

  fn count_deployments(
    &self,
    tenant_id: &str,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send;

  fn update_deployment(
    &self,
    deployment: Deployment,
  ) -> impl Future<Output = Result<Deployment, Self::Error>> + Send;

  fn delete_deployment(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send;
}

// ─── Licensing: subscriptions, licenses, allocations ─────────────────────────

pub trait LicenseStore: StoreBackend {
  fn insert_subscription(
    &self,
    subscription: Subscription,
  ) -> impl Future<Output = Result<Subscription, Self::Error>> + Send;

  fn get_subscription(
    &self,
    subscription: &EntityRef,
  ) -> impl Future<Output = Result<Option<Subscription>, Self::Error>> + Send;

  fn list_subscriptions(
    &self,
    customer_id: &str,
  ) -> impl Future<Output = Result<Vec<Subscription>, Self::Error>> + Send;

  fn update_subscription(
    &self,
    subscription: Subscription,
  ) -> impl Future<Output = Result<Subscription, Self::Error>> + Send;

  fn count_licenses(
    &self,
    subscription_id: &str,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send;

  /// Delete a subscription only if it owns no licenses.
  fn delete_subscription(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send;

  fn insert_license(
    &self,
    license: License,
  ) -> impl Future<Output = Result<License, Self::Error>> + Send;

  fn get_license(
    &self,
    license: &EntityRef,
  ) -> impl Future<Output = Result<Option<License>, Self::Error>> + Send;

  fn list_licenses(
    &self,
    filter: &LicenseFilter,
  ) -> impl Future<Output = Result<Vec<License>, Self::Error>> + Send;

  fn update_license(
    &self,
    license: License,
  ) -> impl Future<Output = Result<License, Self::Error>> + Send;

  /// Delete a license only if none of its allocations is active.
  fn delete_license(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send;

  fn insert_allocation(
    &self,
    allocation: LicenseAllocation,
  ) -> impl Future<Output = Result<LicenseAllocation, Self::Error>> + Send;

  fn get_allocation(
    &self,
    allocation: &EntityRef,
  ) -> impl Future<Output = Result<Option<LicenseAllocation>, Self::Error>> + Send;

  fn list_allocations(
    &self,
    license_id: &str,
    status: Option<AllocationStatus>,
  ) -> impl Future<Output = Result<Vec<LicenseAllocation>, Self::Error>> + Send;

  /// `(Σ seats_allocated, count)` over the active allocations of a license.
  fn active_seat_usage(
    &self,
    license_id: &str,
  ) -> impl Future<Output = Result<(u64, u64), Self::Error>> + Send;

  /// Mark an allocation released only if it is still active. Returns `None`
  /// when it was already released (or is missing).
  fn release_allocation(
    &self,
    id: Uuid,
    released_by: &str,
    released_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<LicenseAllocation>, Self::Error>> + Send;
}

// ─── Rollout bookkeeping ─────────────────────────────────────────────────────

pub trait RolloutStore: StoreBackend {
  /// Insert or update the detection keyed by `(endpoint_id, product_id)`,
  /// preserving the stored `id`, `detected_at` and `created_at`.
  fn upsert_detection(
    &self,
    detection: UpdateDetection,
  ) -> impl Future<Output = Result<UpdateDetection, Self::Error>> + Send;

  fn list_detections(
    &self,
    filter: &DetectionFilter,
  ) -> impl Future<Output = Result<Vec<UpdateDetection>, Self::Error>> + Send;

  fn insert_rollout(
    &self,
    rollout: UpdateRollout,
  ) -> impl Future<Output = Result<UpdateRollout, Self::Error>> + Send;

  fn get_rollout(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<UpdateRollout>, Self::Error>> + Send;

  fn list_rollouts(
    &self,
    filter: &RolloutFilter,
    page: PageRequest,
  ) -> impl Future<Output = Result<Page<UpdateRollout>, Self::Error>> + Send;

  fn update_rollout(
    &self,
    rollout: UpdateRollout,
  ) -> impl Future<Output = Result<UpdateRollout, Self::Error>> + Send;
}

// ─── Everything ──────────────────────────────────────────────────────────────

/// A backend that implements every store trait.
pub trait Store: CatalogStore + FleetStore + LicenseStore + RolloutStore {}

impl<T> Store for T where T: CatalogStore + FleetStore + LicenseStore + RolloutStore
{}
