//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{Duration, Utc};
use releasedesk_core::{
  Error as CoreError,
  compat::{CompatibilityMatrix, ValidationStatus},
  fleet::{
    Customer, CustomerStatus, Deployment, DeploymentStatus, DeploymentType,
    Tenant, TenantStatus,
  },
  license::{
    AllocationStatus, License, LicenseAllocation, LicenseStatus, LicenseType,
    Subscription, SubscriptionStatus,
  },
  product::{Product, ProductType},
  query::{CustomerFilter, DeploymentFilter, EntityRef, PageRequest, ProductFilter},
  rollout::UpdateDetection,
  store::{CatalogStore, FleetStore, LicenseStore, RolloutStore},
  version::{ReleaseType, Version, VersionState},
};
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

fn product(product_id: &str) -> Product {
  let now = Utc::now();
  Product {
    id:           Uuid::new_v4(),
    product_id:   product_id.into(),
    name:         format!("{product_id} server"),
    product_type: ProductType::Server,
    description:  None,
    vendor:       None,
    is_active:    true,
    created_by:   "tester".into(),
    created_at:   now,
    updated_at:   now,
  }
}

fn version(product_id: &str, number: &str) -> Version {
  let now = Utc::now();
  Version {
    id:                         Uuid::new_v4(),
    product_id:                 product_id.into(),
    version_number:             number.into(),
    release_type:               ReleaseType::Feature,
    state:                      VersionState::Draft,
    release_date:               now,
    eol_date:                   None,
    min_server_version:         None,
    max_server_version:         None,
    recommended_server_version: None,
    release_notes:              None,
    packages:                   vec![],
    created_by:                 "tester".into(),
    approved_by:                None,
    approved_at:                None,
    released_by:                None,
    released_at:                None,
    created_at:                 now,
    updated_at:                 now,
  }
}

fn customer(customer_id: &str, name: &str, organization: Option<&str>) -> Customer {
  let now = Utc::now();
  Customer {
    id:              Uuid::new_v4(),
    customer_id:     customer_id.into(),
    name:            name.into(),
    email:           None,
    organization:    organization.map(Into::into),
    account_manager: None,
    status:          CustomerStatus::Active,
    created_by:      "tester".into(),
    created_at:      now,
    updated_at:      now,
  }
}

fn tenant(customer_id: &str, tenant_id: &str) -> Tenant {
  let now = Utc::now();
  Tenant {
    id:          Uuid::new_v4(),
    tenant_id:   tenant_id.into(),
    customer_id: customer_id.into(),
    name:        tenant_id.into(),
    description: None,
    status:      TenantStatus::Active,
    created_by:  "tester".into(),
    created_at:  now,
    updated_at:  now,
  }
}

fn deployment(
  tenant: &Tenant,
  deployment_id: &str,
  product_id: &str,
  deployment_type: DeploymentType,
) -> Deployment {
  let now = Utc::now();
  Deployment {
    id: Uuid::new_v4(),
    deployment_id: deployment_id.into(),
    customer_id: tenant.customer_id.clone(),
    tenant_id: tenant.tenant_id.clone(),
    product_id: product_id.into(),
    deployment_type,
    installed_version: "1.0.0".into(),
    number_of_users: None,
    license_id: None,
    server_hostname: None,
    notes: None,
    status: DeploymentStatus::Active,
    deployment_date: now,
    last_updated_date: None,
    created_by: "tester".into(),
    created_at: now,
    updated_at: now,
  }
}

fn subscription(customer_id: &str, subscription_id: &str) -> Subscription {
  let now = Utc::now();
  Subscription {
    id:              Uuid::new_v4(),
    subscription_id: subscription_id.into(),
    customer_id:     customer_id.into(),
    name:            "Enterprise".into(),
    description:     None,
    start_date:      now,
    end_date:        None,
    status:          SubscriptionStatus::Active,
    created_by:      "tester".into(),
    created_at:      now,
    updated_at:      now,
  }
}

fn license(sub: &Subscription, license_id: &str, seats: u32) -> License {
  let now = Utc::now();
  License {
    id:              Uuid::new_v4(),
    license_id:      license_id.into(),
    subscription_id: sub.subscription_id.clone(),
    customer_id:     sub.customer_id.clone(),
    product_id:      "ACME".into(),
    license_type:    LicenseType::Perpetual,
    number_of_seats: seats,
    start_date:      now,
    end_date:        None,
    status:          LicenseStatus::Active,
    notes:           None,
    assigned_by:     "tester".into(),
    revoked_by:      None,
    revoked_at:      None,
    revoke_reason:   None,
    created_at:      now,
    updated_at:      now,
  }
}

fn allocation(lic: &License, allocation_id: &str, seats: u32) -> LicenseAllocation {
  let now = Utc::now();
  LicenseAllocation {
    id:              Uuid::new_v4(),
    allocation_id:   allocation_id.into(),
    license_id:      lic.license_id.clone(),
    customer_id:     lic.customer_id.clone(),
    tenant_id:       "TEN-1".into(),
    deployment_id:   None,
    seats_allocated: seats,
    status:          AllocationStatus::Active,
    notes:           None,
    allocated_by:    "tester".into(),
    allocated_at:    now,
    released_by:     None,
    released_at:     None,
    created_at:      now,
    updated_at:      now,
  }
}

// ─── Catalogue ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn product_round_trip_and_duplicate_key() {
  let s = store().await;
  let p = s.insert_product(product("ACME")).await.unwrap();

  let fetched = s.get_product("ACME").await.unwrap().unwrap();
  assert_eq!(fetched.id, p.id);
  assert!(s.get_product("NOPE").await.unwrap().is_none());

  let err: CoreError = s.insert_product(product("ACME")).await.unwrap_err().into();
  assert!(matches!(err, CoreError::Conflict(_)), "got {err:?}");
}

#[tokio::test]
async fn list_products_filters_and_pages() {
  let s = store().await;
  for id in ["A", "B", "C"] {
    s.insert_product(product(id)).await.unwrap();
  }
  let mut inactive = product("D");
  inactive.is_active = false;
  s.insert_product(inactive).await.unwrap();

  let filter = ProductFilter { is_active: Some(true), ..Default::default() };
  let page = s
    .list_products(&filter, PageRequest { page: 2, limit: 2 })
    .await
    .unwrap();
  assert_eq!(page.total, 3);
  assert_eq!(page.items.len(), 1);
  assert_eq!(page.items[0].product_id, "C");
}

#[tokio::test]
async fn product_with_versions_is_not_deleted() {
  let s = store().await;
  s.insert_product(product("ACME")).await.unwrap();
  s.insert_version(version("ACME", "1.0.0")).await.unwrap();

  assert!(!s.delete_product("ACME").await.unwrap());
  assert_eq!(s.count_versions("ACME").await.unwrap(), 1);

  s.insert_product(product("EMPTY")).await.unwrap();
  assert!(s.delete_product("EMPTY").await.unwrap());
}

#[tokio::test]
async fn version_swap_requires_expected_state() {
  let s = store().await;
  let v = s.insert_version(version("ACME", "1.0.0")).await.unwrap();

  let mut next = v.clone();
  next.state = VersionState::PendingReview;
  let swapped = s
    .replace_version_if_state(next.clone(), VersionState::Draft)
    .await
    .unwrap();
  assert_eq!(swapped.unwrap().state, VersionState::PendingReview);

  // Second swap from draft loses: the row has moved on.
  let lost = s
    .replace_version_if_state(next, VersionState::Draft)
    .await
    .unwrap();
  assert!(lost.is_none());

  let stored = s.get_version(v.id).await.unwrap().unwrap();
  assert_eq!(stored.state, VersionState::PendingReview);
  assert!(!s.delete_version_if_state(v.id, VersionState::Draft).await.unwrap());
}

#[tokio::test]
async fn matrix_upsert_keeps_identity() {
  let s = store().await;
  let now = Utc::now();
  let matrix = CompatibilityMatrix {
    id:                         Uuid::new_v4(),
    product_id:                 "ACME".into(),
    version_number:             "1.0.0".into(),
    min_server_version:         Some("1.0.0".into()),
    max_server_version:         None,
    recommended_server_version: None,
    incompatible_versions:      vec![],
    validation_status:          ValidationStatus::Passed,
    validated_by:               Some("tester".into()),
    validated_at:               Some(now),
    notes:                      None,
    created_at:                 now,
    updated_at:                 now,
  };
  let first = s.upsert_matrix(matrix.clone()).await.unwrap();

  let mut replacement = matrix;
  replacement.id = Uuid::new_v4();
  replacement.min_server_version = Some("2.0.0".into());
  let second = s.upsert_matrix(replacement).await.unwrap();

  assert_eq!(second.id, first.id);
  let stored = s.get_matrix("ACME", "1.0.0").await.unwrap().unwrap();
  assert_eq!(stored.min_server_version.as_deref(), Some("2.0.0"));
}

// ─── Fleet ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn customer_lookup_by_id_or_key() {
  let s = store().await;
  let c = s
    .insert_customer(customer("CUST-1", "Acme Corp", None))
    .await
    .unwrap();

  let by_id = s.get_customer(&EntityRef::Id(c.id)).await.unwrap().unwrap();
  let by_key = s.get_customer(&EntityRef::parse("CUST-1")).await.unwrap().unwrap();
  assert_eq!(by_id.id, by_key.id);
}

#[tokio::test]
async fn customer_search_is_case_insensitive() {
  let s = store().await;
  s.insert_customer(customer("CUST-1", "Acme Corp", None)).await.unwrap();
  s.insert_customer(customer("CUST-2", "Globex", Some("ACME Holdings")))
    .await
    .unwrap();
  s.insert_customer(customer("CUST-3", "Initech", None)).await.unwrap();

  let filter = CustomerFilter { search: Some("acme".into()), ..Default::default() };
  let page = s.list_customers(&filter, PageRequest::default()).await.unwrap();
  let ids: Vec<_> = page.items.iter().map(|c| c.customer_id.as_str()).collect();
  assert_eq!(ids, ["CUST-1", "CUST-2"]);
}

#[tokio::test]
async fn guarded_fleet_deletes() {
  let s = store().await;
  let c = s.insert_customer(customer("CUST-1", "Acme", None)).await.unwrap();
  let t = s.insert_tenant(tenant("CUST-1", "TEN-1")).await.unwrap();
  let d = s
    .insert_deployment(deployment(&t, "DEP-1", "ACME", DeploymentType::Production))
    .await
    .unwrap();

  assert!(!s.delete_customer(c.id).await.unwrap());
  assert!(!s.delete_tenant(t.id).await.unwrap());

  assert!(s.delete_deployment(d.id).await.unwrap());
  assert!(s.delete_tenant(t.id).await.unwrap());
  assert!(s.delete_customer(c.id).await.unwrap());
}

#[tokio::test]
async fn one_deployment_per_product_and_type() {
  let s = store().await;
  let t = s.insert_tenant(tenant("CUST-1", "TEN-1")).await.unwrap();
  s.insert_deployment(deployment(&t, "DEP-1", "ACME", DeploymentType::Production))
    .await
    .unwrap();
  s.insert_deployment(deployment(&t, "DEP-2", "ACME", DeploymentType::Uat))
    .await
    .unwrap();

  let err: CoreError = s
    .insert_deployment(deployment(&t, "DEP-3", "ACME", DeploymentType::Production))
    .await
    .unwrap_err()
    .into();
  assert!(matches!(err, CoreError::Conflict(_)));

  let filter = DeploymentFilter {
    tenant_id: Some("TEN-1".into()),
    deployment_type: Some(DeploymentType::Uat),
    ..Default::default()
  };
  let found = s.list_deployments(&filter).await.unwrap();
  assert_eq!(found.len(), 1);
  assert_eq!(found[0].deployment_id, "DEP-2");
}

#[tokio::test]
async fn updating_missing_row_is_not_found() {
  let s = store().await;
  let err: CoreError = s
    .update_tenant(tenant("CUST-1", "TEN-GHOST"))
    .await
    .unwrap_err()
    .into();
  assert!(matches!(err, CoreError::NotFound(_)));
}

// ─── Licensing ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn seat_usage_counts_active_allocations_only() {
  let s = store().await;
  let sub = s.insert_subscription(subscription("CUST-1", "SUB-1")).await.unwrap();
  let lic = s.insert_license(license(&sub, "LIC-1", 100)).await.unwrap();

  let a = s.insert_allocation(allocation(&lic, "ALLOC-1", 30)).await.unwrap();
  s.insert_allocation(allocation(&lic, "ALLOC-2", 20)).await.unwrap();
  assert_eq!(s.active_seat_usage("LIC-1").await.unwrap(), (50, 2));

  let released = s
    .release_allocation(a.id, "tester", Utc::now())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(released.status, AllocationStatus::Released);
  assert_eq!(released.released_by.as_deref(), Some("tester"));
  assert_eq!(s.active_seat_usage("LIC-1").await.unwrap(), (20, 1));

  // Releasing twice is refused.
  assert!(
    s.release_allocation(a.id, "tester", Utc::now())
      .await
      .unwrap()
      .is_none()
  );
  let active = s
    .list_allocations("LIC-1", Some(AllocationStatus::Active))
    .await
    .unwrap();
  assert_eq!(active.len(), 1);
}

#[tokio::test]
async fn license_with_active_allocations_is_not_deleted() {
  let s = store().await;
  let sub = s.insert_subscription(subscription("CUST-1", "SUB-1")).await.unwrap();
  let lic = s.insert_license(license(&sub, "LIC-1", 10)).await.unwrap();
  let a = s.insert_allocation(allocation(&lic, "ALLOC-1", 5)).await.unwrap();

  assert!(!s.delete_license(lic.id).await.unwrap());
  assert!(!s.delete_subscription(sub.id).await.unwrap());

  s.release_allocation(a.id, "tester", Utc::now()).await.unwrap();
  assert!(s.delete_license(lic.id).await.unwrap());
  assert!(s.list_allocations("LIC-1", None).await.unwrap().is_empty());
  assert!(s.delete_subscription(sub.id).await.unwrap());
}

// ─── Rollouts ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn detection_upsert_preserves_first_sighting() {
  let s = store().await;
  let first_seen = Utc::now() - Duration::days(2);
  let detection = UpdateDetection {
    id:                Uuid::new_v4(),
    endpoint_id:       "EP-1".into(),
    product_id:        "ACME".into(),
    current_version:   "1.0.0".into(),
    available_version: "1.1.0".into(),
    detected_at:       first_seen,
    last_checked_at:   first_seen,
    created_at:        first_seen,
    updated_at:        first_seen,
  };
  let stored = s.upsert_detection(detection.clone()).await.unwrap();

  let mut again = detection;
  again.id = Uuid::new_v4();
  again.available_version = "1.2.0".into();
  again.detected_at = Utc::now();
  again.last_checked_at = Utc::now();
  let updated = s.upsert_detection(again).await.unwrap();

  assert_eq!(updated.id, stored.id);
  assert_eq!(updated.detected_at, first_seen);
  assert_eq!(updated.available_version, "1.2.0");
  assert_eq!(s.list_detections(&Default::default()).await.unwrap().len(), 1);
}

// ─── Audit ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn audit_entries_are_appended() {
  use releasedesk_core::{RequestContext, audit::AuditEntry};

  let s = store().await;
  let ctx = RequestContext::system();
  s.append_audit(&AuditEntry::new(&ctx, "product.create", "product", "ACME"))
    .await
    .unwrap();
  s.append_audit(&AuditEntry::new(&ctx, "product.delete", "product", "ACME"))
    .await
    .unwrap();

  let recent = s.recent_audit(10).await.unwrap();
  assert_eq!(recent.len(), 2);
  assert!(recent.iter().all(|e| e.actor.user_id == "system"));
}
