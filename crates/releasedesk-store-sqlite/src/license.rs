//! [`LicenseStore`] for [`SqliteStore`].

use chrono::{DateTime, Utc};
use releasedesk_core::{
  license::{AllocationStatus, License, LicenseAllocation, Subscription},
  query::{EntityRef, LicenseFilter},
  store::LicenseStore,
};
use uuid::Uuid;

use crate::{
  Result, SqliteStore,
  encode::{Where, text},
};

impl LicenseStore for SqliteStore {
  // ── Subscriptions ─────────────────────────────────────────────────────────

  async fn insert_subscription(
    &self,
    subscription: Subscription,
  ) -> Result<Subscription> {
    self.insert_doc(subscription).await
  }

  async fn get_subscription(
    &self,
    subscription: &EntityRef,
  ) -> Result<Option<Subscription>> {
    self.get_by_ref(subscription).await
  }

  async fn list_subscriptions(&self, customer_id: &str) -> Result<Vec<Subscription>> {
    self
      .fetch_all(
        "SELECT doc FROM subscriptions WHERE customer_id = ?1
         ORDER BY subscription_id"
          .to_owned(),
        vec![text(customer_id)],
      )
      .await
  }

  async fn update_subscription(
    &self,
    subscription: Subscription,
  ) -> Result<Subscription> {
    self.update_doc(subscription).await
  }

  async fn count_licenses(&self, subscription_id: &str) -> Result<u64> {
    self
      .count(
        "SELECT COUNT(*) FROM licenses WHERE subscription_id = ?1".to_owned(),
        vec![text(subscription_id)],
      )
      .await
  }

  async fn delete_subscription(&self, id: Uuid) -> Result<bool> {
    self
      .delete_where(
        "subscriptions",
        id,
        "NOT EXISTS (SELECT 1 FROM licenses l
                      WHERE l.subscription_id = subscriptions.subscription_id)",
      )
      .await
  }

  // ── Licenses ──────────────────────────────────────────────────────────────

  async fn insert_license(&self, license: License) -> Result<License> {
    self.insert_doc(license).await
  }

  async fn get_license(&self, license: &EntityRef) -> Result<Option<License>> {
    self.get_by_ref(license).await
  }

  async fn list_licenses(&self, filter: &LicenseFilter) -> Result<Vec<License>> {
    let w = Where::new()
      .eq("customer_id", filter.customer_id.as_deref())
      .eq("subscription_id", filter.subscription_id.as_deref())
      .eq("product_id", filter.product_id.as_deref())
      .eq("status", filter.status.map(|s| s.as_str()));
    let sql = format!("SELECT doc FROM licenses{} ORDER BY license_id", w.sql());
    self.fetch_all(sql, w.into_params()).await
  }

  async fn update_license(&self, license: License) -> Result<License> {
    self.update_doc(license).await
  }

  async fn delete_license(&self, id: Uuid) -> Result<bool> {
    let deleted = self
      .delete_where(
        "licenses",
        id,
        "NOT EXISTS (SELECT 1 FROM allocations a
                      WHERE a.license_id = licenses.license_id
                        AND a.status = 'active')",
      )
      .await?;
    if deleted {
      // Released allocations carry no seats; drop them with their license.
      self
        .execute(
          "DELETE FROM allocations
            WHERE status = 'released'
              AND license_id NOT IN (SELECT license_id FROM licenses)"
            .to_owned(),
          vec![],
        )
        .await?;
    }
    Ok(deleted)
  }

  // ── Allocations ───────────────────────────────────────────────────────────

  async fn insert_allocation(
    &self,
    allocation: LicenseAllocation,
  ) -> Result<LicenseAllocation> {
    self.insert_doc(allocation).await
  }

  async fn get_allocation(
    &self,
    allocation: &EntityRef,
  ) -> Result<Option<LicenseAllocation>> {
    self.get_by_ref(allocation).await
  }

  async fn list_allocations(
    &self,
    license_id: &str,
    status: Option<AllocationStatus>,
  ) -> Result<Vec<LicenseAllocation>> {
    let w = Where::new()
      .eq("license_id", Some(license_id))
      .eq("status", status.map(|s| s.as_str()));
    let sql = format!(
      "SELECT doc FROM allocations{} ORDER BY allocation_id",
      w.sql()
    );
    self.fetch_all(sql, w.into_params()).await
  }

  async fn active_seat_usage(&self, license_id: &str) -> Result<(u64, u64)> {
    let [seats, count] = self
      .query_counts::<2>(
        "SELECT COALESCE(SUM(seats_allocated), 0), COUNT(*)
           FROM allocations WHERE license_id = ?1 AND status = 'active'"
          .to_owned(),
        vec![text(license_id)],
      )
      .await?;
    Ok((
      u64::try_from(seats).unwrap_or(0),
      u64::try_from(count).unwrap_or(0),
    ))
  }

  async fn release_allocation(
    &self,
    id: Uuid,
    released_by: &str,
    released_at: DateTime<Utc>,
  ) -> Result<Option<LicenseAllocation>> {
    let Some(mut allocation) = self.get_doc::<LicenseAllocation>(id).await? else {
      return Ok(None);
    };
    if allocation.status != AllocationStatus::Active {
      return Ok(None);
    }
    allocation.status = AllocationStatus::Released;
    allocation.released_by = Some(released_by.to_owned());
    allocation.released_at = Some(released_at);
    tracing::debug!(allocation = %id, "releasing allocation");
    self
      .update_doc_if(allocation, Some(("status", text(AllocationStatus::Active.as_str()))))
      .await
  }
}
