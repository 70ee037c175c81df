//! Subscriptions, licenses and seat allocations.
//!
//! A license partitions `number_of_seats` into allocations. At every moment
//! the seats of its active allocations sum to at most its capacity; the
//! [`crate::accountant::SeatAccountant`] is the only writer that can break
//! that, and it never does.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Subscription ────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
  #[default]
  Active,
  Expired,
  Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
  pub id:              Uuid,
  pub subscription_id: String,
  pub customer_id:     String,
  pub name:            String,
  pub description:     Option<String>,
  pub start_date:      DateTime<Utc>,
  pub end_date:        Option<DateTime<Utc>>,
  pub status:          SubscriptionStatus,
  pub created_by:      String,
  pub created_at:      DateTime<Utc>,
  pub updated_at:      DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSubscription {
  pub subscription_id: Option<String>,
  pub name:            String,
  pub description:     Option<String>,
  pub start_date:      Option<DateTime<Utc>>,
  pub end_date:        Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionPatch {
  pub name:        Option<String>,
  pub description: Option<String>,
  pub end_date:    Option<DateTime<Utc>>,
  pub status:      Option<SubscriptionStatus>,
}

impl SubscriptionPatch {
  pub fn apply(self, s: &mut Subscription) {
    if let Some(name) = self.name {
      s.name = name;
    }
    if let Some(d) = self.description {
      s.description = Some(d);
    }
    if let Some(end) = self.end_date {
      s.end_date = Some(end);
    }
    if let Some(status) = self.status {
      s.status = status;
    }
  }
}

// ─── License ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseType {
  Perpetual,
  TimeBased,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
  Active,
  Expired,
  Revoked,
}

impl LicenseStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Active => "active",
      Self::Expired => "expired",
      Self::Revoked => "revoked",
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct License {
  pub id:              Uuid,
  pub license_id:      String,
  pub subscription_id: String,
  pub customer_id:     String,
  pub product_id:      String,
  pub license_type:    LicenseType,
  pub number_of_seats: u32,
  pub start_date:      DateTime<Utc>,
  pub end_date:        Option<DateTime<Utc>>,
  pub status:          LicenseStatus,
  pub notes:           Option<String>,
  pub assigned_by:     String,
  pub revoked_by:      Option<String>,
  pub revoked_at:      Option<DateTime<Utc>>,
  pub revoke_reason:   Option<String>,
  pub created_at:      DateTime<Utc>,
  pub updated_at:      DateTime<Utc>,
}

impl License {
  /// A time-based license must carry `end_date ≥ start_date`.
  pub fn validate_dates(&self) -> Result<()> {
    validate_term(self.license_type, self.start_date, self.end_date)
  }

  /// `true` for a time-based license whose end date is not in the future.
  pub fn is_lapsed_at(&self, now: DateTime<Utc>) -> bool {
    self.license_type == LicenseType::TimeBased
      && self.end_date.is_some_and(|end| end <= now)
  }
}

/// Check the date invariant for a license term.
pub fn validate_term(
  license_type: LicenseType,
  start: DateTime<Utc>,
  end: Option<DateTime<Utc>>,
) -> Result<()> {
  match (license_type, end) {
    (LicenseType::TimeBased, None) => Err(Error::InvalidRequest(
      "a time_based license requires an end_date".into(),
    )),
    (_, Some(end)) if end < start => Err(Error::InvalidRequest(format!(
      "end_date {end} is before start_date {start}"
    ))),
    _ => Ok(()),
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewLicense {
  pub license_id:      Option<String>,
  pub product_id:      String,
  pub license_type:    LicenseType,
  pub number_of_seats: u32,
  pub start_date:      Option<DateTime<Utc>>,
  pub end_date:        Option<DateTime<Utc>>,
  pub notes:           Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LicensePatch {
  pub number_of_seats: Option<u32>,
  pub start_date:      Option<DateTime<Utc>>,
  pub end_date:        Option<DateTime<Utc>>,
  pub notes:           Option<String>,
}

// ─── Allocation ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationStatus {
  Active,
  Released,
}

impl AllocationStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Active => "active",
      Self::Released => "released",
    }
  }
}

/// A reservation of seats by a tenant, optionally scoped to one deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseAllocation {
  pub id:              Uuid,
  pub allocation_id:   String,
  pub license_id:      String,
  pub customer_id:     String,
  pub tenant_id:       String,
  pub deployment_id:   Option<String>,
  pub seats_allocated: u32,
  pub status:          AllocationStatus,
  pub notes:           Option<String>,
  pub allocated_by:    String,
  pub allocated_at:    DateTime<Utc>,
  pub released_by:     Option<String>,
  pub released_at:     Option<DateTime<Utc>>,
  pub created_at:      DateTime<Utc>,
  pub updated_at:      DateTime<Utc>,
}

/// Input to [`crate::accountant::SeatAccountant::allocate`].
#[derive(Debug, Clone, Deserialize)]
pub struct AllocationRequest {
  pub tenant_id:       Option<String>,
  pub deployment_id:   Option<String>,
  pub seats_allocated: u32,
  pub notes:           Option<String>,
}

/// Seat usage of one license.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Utilization {
  pub license_id:          String,
  pub total:               u32,
  pub allocated:           u32,
  pub available:           u32,
  pub utilization_percent: f64,
  pub active_allocations:  u64,
}

impl Utilization {
  pub fn compute(license: &License, allocated: u64, active: u64) -> Self {
    let total = license.number_of_seats;
    let allocated = u32::try_from(allocated).unwrap_or(u32::MAX);
    let percent = if total == 0 {
      0.0
    } else {
      (f64::from(allocated) / f64::from(total) * 10_000.0).round() / 100.0
    };
    Self {
      license_id:          license.license_id.clone(),
      total,
      allocated,
      available:           total.saturating_sub(allocated),
      utilization_percent: percent,
      active_allocations:  active,
    }
  }
}
