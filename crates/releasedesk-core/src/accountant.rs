//! The license seat accountant.
//!
//! For every license, the seats of its active allocations never exceed
//! `number_of_seats`. All writes that can affect that sum (allocate, release,
//! capacity changes, revocation, deletion) run inside a per-license critical
//! section, and the sum is re-read from the store inside it. Two concurrent
//! allocations that together overshoot capacity are therefore serialised and
//! the second one sees the first one's seats.
//!
//! The critical section is an async mutex so it can be held across store
//! calls; the map that hands them out is a short-lived synchronous lock.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::{
  Error, Result,
  audit::{AuditEntry, AuditSink},
  context::RequestContext,
  error::StoreResultExt,
  license::{
    AllocationRequest, AllocationStatus, License, LicenseAllocation,
    LicensePatch, LicenseStatus, LicenseType, NewLicense, Subscription,
    Utilization, validate_term,
  },
  query::{EntityRef, LicenseFilter, generate_key},
  store::Store,
};

type LicenseLock = Arc<tokio::sync::Mutex<()>>;

pub struct SeatAccountant<S> {
  store: Arc<S>,
  audit: Arc<dyn AuditSink>,
  locks: Arc<Mutex<HashMap<Uuid, LicenseLock>>>,
}

impl<S> Clone for SeatAccountant<S> {
  fn clone(&self) -> Self {
    Self {
      store: self.store.clone(),
      audit: self.audit.clone(),
      locks: self.locks.clone(),
    }
  }
}

/// Eligibility of a license for new allocations at `now`.
fn check_allocatable(license: &License, now: DateTime<Utc>) -> Result<()> {
  match license.status {
    LicenseStatus::Active => {}
    LicenseStatus::Expired => {
      return Err(Error::LicenseExpired(license.license_id.clone()));
    }
    LicenseStatus::Revoked => {
      return Err(Error::LicenseNotActive(license.license_id.clone()));
    }
  }
  if license.is_lapsed_at(now) {
    return Err(Error::LicenseExpired(license.license_id.clone()));
  }
  Ok(())
}

fn seats(used: u64) -> u32 { u32::try_from(used).unwrap_or(u32::MAX) }

impl<S: Store> SeatAccountant<S> {
  pub fn new(store: Arc<S>, audit: Arc<dyn AuditSink>) -> Self {
    Self { store, audit, locks: Arc::default() }
  }

  /// Enter the critical section of one license, giving up with
  /// [`Error::Cancelled`] if the request deadline passes first.
  async fn lock(&self, ctx: &RequestContext, license: Uuid) -> Result<OwnedMutexGuard<()>> {
    let lock = self.locks.lock().entry(license).or_default().clone();
    ctx.before_deadline(lock.lock_owned()).await
  }

  // ─── Scoping ───────────────────────────────────────────────────────────

  async fn subscription(
    &self,
    customer: &EntityRef,
    subscription: &EntityRef,
  ) -> Result<Subscription> {
    let customer = self
      .store
      .get_customer(customer)
      .await
      .or_store()?
      .ok_or_else(|| Error::NotFound(format!("customer {customer}")))?;
    self
      .store
      .get_subscription(subscription)
      .await
      .or_store()?
      .filter(|s| s.customer_id == customer.customer_id)
      .ok_or_else(|| Error::NotFound(format!("subscription {subscription}")))
  }

  /// Resolve a license through its owning customer and subscription.
  pub async fn get_license(
    &self,
    customer: &EntityRef,
    subscription: &EntityRef,
    license: &EntityRef,
  ) -> Result<License> {
    let subscription = self.subscription(customer, subscription).await?;
    self
      .store
      .get_license(license)
      .await
      .or_store()?
      .filter(|l| l.subscription_id == subscription.subscription_id)
      .ok_or_else(|| Error::NotFound(format!("license {license}")))
  }

  /// Re-read a license inside its critical section.
  async fn reload(&self, license: &License) -> Result<License> {
    self
      .store
      .get_license(&EntityRef::Id(license.id))
      .await
      .or_store()?
      .ok_or_else(|| Error::NotFound(format!("license {}", license.license_id)))
  }

  pub async fn list_licenses(
    &self,
    customer: &EntityRef,
    subscription: &EntityRef,
  ) -> Result<Vec<License>> {
    let subscription = self.subscription(customer, subscription).await?;
    let filter = LicenseFilter {
      subscription_id: Some(subscription.subscription_id),
      ..Default::default()
    };
    self.store.list_licenses(&filter).await.or_store()
  }

  // ─── License administration ────────────────────────────────────────────

  pub async fn assign_license(
    &self,
    ctx: &RequestContext,
    customer: &EntityRef,
    subscription: &EntityRef,
    input: NewLicense,
  ) -> Result<License> {
    ctx.check_deadline()?;
    let now = Utc::now();
    let start_date = input.start_date.unwrap_or(now);
    validate_term(input.license_type, start_date, input.end_date)?;

    let subscription = self.subscription(customer, subscription).await?;
    if self.store.get_product(&input.product_id).await.or_store()?.is_none() {
      return Err(Error::NotFound(format!("product {}", input.product_id)));
    }
    let license_id = input.license_id.unwrap_or_else(|| generate_key("LIC"));
    if self
      .store
      .get_license(&EntityRef::Key(license_id.clone()))
      .await
      .or_store()?
      .is_some()
    {
      return Err(Error::Conflict(format!("license {license_id} already exists")));
    }

    let license = License {
      id: Uuid::new_v4(),
      license_id,
      subscription_id: subscription.subscription_id,
      customer_id: subscription.customer_id,
      product_id: input.product_id,
      license_type: input.license_type,
      number_of_seats: input.number_of_seats,
      start_date,
      end_date: input.end_date,
      status: LicenseStatus::Active,
      notes: input.notes,
      assigned_by: ctx.user_id().to_owned(),
      revoked_by: None,
      revoked_at: None,
      revoke_reason: None,
      created_at: now,
      updated_at: now,
    };
    let license = self.store.insert_license(license).await.or_store()?;

    tracing::info!(
      license = %license.license_id,
      product = %license.product_id,
      seats = license.number_of_seats,
      "assigned license"
    );
    self.audit.record(
      AuditEntry::new(ctx, "license.assign", "license", &license.license_id)
        .with_details(json!({
          "subscription_id": license.subscription_id,
          "product_id": license.product_id,
          "number_of_seats": license.number_of_seats,
        })),
    );
    Ok(license)
  }

  /// Edit capacity, term or notes. Capacity can never drop below the seats
  /// currently allocated.
  pub async fn update_license(
    &self,
    ctx: &RequestContext,
    customer: &EntityRef,
    subscription: &EntityRef,
    license: &EntityRef,
    patch: LicensePatch,
  ) -> Result<License> {
    let license = self.get_license(customer, subscription, license).await?;
    let _guard = self.lock(ctx, license.id).await?;
    let mut license = self.reload(&license).await?;

    if let Some(capacity) = patch.number_of_seats {
      let (used, _) = self.store.active_seat_usage(&license.license_id).await.or_store()?;
      if u64::from(capacity) < used {
        return Err(Error::InsufficientSeats {
          requested: seats(used),
          available: capacity,
        });
      }
      license.number_of_seats = capacity;
    }
    if let Some(start) = patch.start_date {
      license.start_date = start;
    }
    if let Some(end) = patch.end_date {
      license.end_date = Some(end);
    }
    if let Some(notes) = patch.notes {
      license.notes = Some(notes);
    }
    license.validate_dates()?;
    let license = self.store.update_license(license).await.or_store()?;

    self.audit.record(
      AuditEntry::new(ctx, "license.update", "license", &license.license_id)
        .with_details(json!({ "number_of_seats": license.number_of_seats })),
    );
    Ok(license)
  }

  /// Refused with [`Error::HasAllocations`] while any allocation is active.
  pub async fn delete_license(
    &self,
    ctx: &RequestContext,
    customer: &EntityRef,
    subscription: &EntityRef,
    license: &EntityRef,
  ) -> Result<()> {
    let license = self.get_license(customer, subscription, license).await?;
    {
      let _guard = self.lock(ctx, license.id).await?;
      let (_, active) = self.store.active_seat_usage(&license.license_id).await.or_store()?;
      if active > 0 || !self.store.delete_license(license.id).await.or_store()? {
        return Err(Error::HasAllocations(license.license_id));
      }
    }
    self.locks.lock().remove(&license.id);

    tracing::info!(license = %license.license_id, "deleted license");
    self
      .audit
      .record(AuditEntry::new(ctx, "license.delete", "license", &license.license_id));
    Ok(())
  }

  /// Move a license to `revoked`. Refused while allocations are active.
  pub async fn revoke(
    &self,
    ctx: &RequestContext,
    customer: &EntityRef,
    subscription: &EntityRef,
    license: &EntityRef,
    reason: Option<String>,
  ) -> Result<License> {
    let license = self.get_license(customer, subscription, license).await?;
    let _guard = self.lock(ctx, license.id).await?;
    let mut license = self.reload(&license).await?;

    if license.status == LicenseStatus::Revoked {
      return Err(Error::InvalidState(format!(
        "license {} is already revoked",
        license.license_id
      )));
    }
    let (_, active) = self.store.active_seat_usage(&license.license_id).await.or_store()?;
    if active > 0 {
      return Err(Error::HasAllocations(license.license_id));
    }

    license.status = LicenseStatus::Revoked;
    license.revoked_by = Some(ctx.user_id().to_owned());
    license.revoked_at = Some(Utc::now());
    license.revoke_reason = reason;
    let license = self.store.update_license(license).await.or_store()?;

    tracing::info!(license = %license.license_id, "revoked license");
    self.audit.record(
      AuditEntry::new(ctx, "license.revoke", "license", &license.license_id)
        .with_details(json!({ "reason": license.revoke_reason })),
    );
    Ok(license)
  }

  /// Extend a time-based license. An expired license whose new end date lies
  /// in the future becomes active again.
  pub async fn renew(
    &self,
    ctx: &RequestContext,
    customer: &EntityRef,
    subscription: &EntityRef,
    license: &EntityRef,
    end_date: DateTime<Utc>,
  ) -> Result<License> {
    let license = self.get_license(customer, subscription, license).await?;
    let _guard = self.lock(ctx, license.id).await?;
    let mut license = self.reload(&license).await?;

    if license.license_type != LicenseType::TimeBased {
      return Err(Error::InvalidRequest(format!(
        "license {} is perpetual and cannot be renewed",
        license.license_id
      )));
    }
    if license.status == LicenseStatus::Revoked {
      return Err(Error::LicenseNotActive(license.license_id));
    }
    validate_term(license.license_type, license.start_date, Some(end_date))?;

    let previous = license.end_date;
    license.end_date = Some(end_date);
    if license.status == LicenseStatus::Expired && end_date > Utc::now() {
      license.status = LicenseStatus::Active;
    }
    let license = self.store.update_license(license).await.or_store()?;

    tracing::info!(license = %license.license_id, %end_date, status = license.status.as_str(), "renewed license");
    self.audit.record(
      AuditEntry::new(ctx, "license.renew", "license", &license.license_id)
        .with_details(json!({
          "previous_end_date": previous,
          "end_date": end_date,
          "status": license.status,
        })),
    );
    Ok(license)
  }

  /// Mark every active time-based license whose term has passed as
  /// `expired`. Returns the licenses that changed.
  pub async fn expire_overdue(
    &self,
    ctx: &RequestContext,
    now: DateTime<Utc>,
  ) -> Result<Vec<License>> {
    let filter = LicenseFilter {
      status: Some(LicenseStatus::Active),
      ..Default::default()
    };
    let candidates: Vec<License> = self
      .store
      .list_licenses(&filter)
      .await
      .or_store()?
      .into_iter()
      .filter(|l| l.is_lapsed_at(now))
      .collect();

    let mut expired = Vec::with_capacity(candidates.len());
    for license in candidates {
      let _guard = self.lock(ctx, license.id).await?;
      let mut license = self.reload(&license).await?;
      if license.status != LicenseStatus::Active || !license.is_lapsed_at(now) {
        continue;
      }
      license.status = LicenseStatus::Expired;
      let license = self.store.update_license(license).await.or_store()?;
      tracing::info!(license = %license.license_id, "license expired");
      self
        .audit
        .record(AuditEntry::new(ctx, "license.expire", "license", &license.license_id));
      expired.push(license);
    }
    Ok(expired)
  }

  // ─── Seats ─────────────────────────────────────────────────────────────

  /// Reserve seats of a license for a tenant, optionally scoped to one of
  /// its deployments.
  pub async fn allocate(
    &self,
    ctx: &RequestContext,
    customer: &EntityRef,
    subscription: &EntityRef,
    license: &EntityRef,
    request: AllocationRequest,
  ) -> Result<LicenseAllocation> {
    let license = self.get_license(customer, subscription, license).await?;
    let _guard = self.lock(ctx, license.id).await?;
    let license = self.reload(&license).await?;
    let now = Utc::now();

    check_allocatable(&license, now)?;

    let tenant_ref = request
      .tenant_id
      .as_deref()
      .filter(|t| !t.is_empty())
      .map(EntityRef::parse)
      .ok_or_else(|| Error::InvalidRequest("tenant_id is required".into()))?;
    let tenant = self
      .store
      .get_tenant(&tenant_ref)
      .await
      .or_store()?
      .filter(|t| t.customer_id == license.customer_id)
      .ok_or_else(|| Error::NotFound(format!("tenant {tenant_ref}")))?;

    let deployment = match request.deployment_id.as_deref().filter(|d| !d.is_empty()) {
      None => None,
      Some(raw) => {
        let deployment_ref = EntityRef::parse(raw);
        let deployment = self
          .store
          .get_deployment(&deployment_ref)
          .await
          .or_store()?
          .filter(|d| d.tenant_id == tenant.tenant_id)
          .ok_or_else(|| Error::NotFound(format!("deployment {deployment_ref}")))?;
        if deployment.product_id != license.product_id {
          return Err(Error::ProductMismatch {
            license:    license.product_id,
            deployment: deployment.product_id,
          });
        }
        Some(deployment)
      }
    };

    if request.seats_allocated < 1 {
      return Err(Error::InvalidRequest("seats_allocated must be at least 1".into()));
    }

    let (used, _) = self.store.active_seat_usage(&license.license_id).await.or_store()?;
    let available = u64::from(license.number_of_seats).saturating_sub(used);
    if u64::from(request.seats_allocated) > available {
      return Err(Error::InsufficientSeats {
        requested: request.seats_allocated,
        available: seats(available),
      });
    }

    let allocation = LicenseAllocation {
      id: Uuid::new_v4(),
      allocation_id: generate_key("ALLOC"),
      license_id: license.license_id.clone(),
      customer_id: license.customer_id.clone(),
      tenant_id: tenant.tenant_id,
      deployment_id: deployment.map(|d| d.deployment_id),
      seats_allocated: request.seats_allocated,
      status: AllocationStatus::Active,
      notes: request.notes,
      allocated_by: ctx.user_id().to_owned(),
      allocated_at: now,
      released_by: None,
      released_at: None,
      created_at: now,
      updated_at: now,
    };
    let allocation = self.store.insert_allocation(allocation).await.or_store()?;

    tracing::info!(
      license = %license.license_id,
      allocation = %allocation.allocation_id,
      seats = allocation.seats_allocated,
      remaining = available - u64::from(allocation.seats_allocated),
      "allocated seats"
    );
    self.audit.record(
      AuditEntry::new(ctx, "license.allocate", "license_allocation", &allocation.allocation_id)
        .with_details(json!({
          "license_id": allocation.license_id,
          "tenant_id": allocation.tenant_id,
          "deployment_id": allocation.deployment_id,
          "seats_allocated": allocation.seats_allocated,
        })),
    );
    Ok(allocation)
  }

  /// Return an allocation's seats to the license.
  pub async fn release(
    &self,
    ctx: &RequestContext,
    customer: &EntityRef,
    subscription: &EntityRef,
    license: &EntityRef,
    allocation: &EntityRef,
  ) -> Result<LicenseAllocation> {
    let license = self.get_license(customer, subscription, license).await?;
    let _guard = self.lock(ctx, license.id).await?;

    let current = self
      .store
      .get_allocation(allocation)
      .await
      .or_store()?
      .filter(|a| a.license_id == license.license_id)
      .ok_or_else(|| Error::NotFound(format!("allocation {allocation}")))?;
    if current.status == AllocationStatus::Released {
      return Err(Error::AlreadyReleased(current.allocation_id));
    }

    let released = self
      .store
      .release_allocation(current.id, ctx.user_id(), Utc::now())
      .await
      .or_store()?
      .ok_or_else(|| Error::AlreadyReleased(current.allocation_id.clone()))?;

    tracing::info!(
      license = %license.license_id,
      allocation = %released.allocation_id,
      seats = released.seats_allocated,
      "released seats"
    );
    self.audit.record(
      AuditEntry::new(ctx, "license.release", "license_allocation", &released.allocation_id)
        .with_details(json!({
          "license_id": released.license_id,
          "seats_allocated": released.seats_allocated,
        })),
    );
    Ok(released)
  }

  pub async fn list_allocations(
    &self,
    customer: &EntityRef,
    subscription: &EntityRef,
    license: &EntityRef,
    status: Option<AllocationStatus>,
  ) -> Result<Vec<LicenseAllocation>> {
    let license = self.get_license(customer, subscription, license).await?;
    self
      .store
      .list_allocations(&license.license_id, status)
      .await
      .or_store()
  }

  /// Current seat usage of a license.
  pub async fn utilization(&self, license: &EntityRef) -> Result<Utilization> {
    let license = self
      .store
      .get_license(license)
      .await
      .or_store()?
      .ok_or_else(|| Error::NotFound(format!("license {license}")))?;
    let (allocated, active) = self
      .store
      .active_seat_usage(&license.license_id)
      .await
      .or_store()?;
    Ok(Utilization::compute(&license, allocated, active))
  }
}
