//! Typed filters, pagination and entity references.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  fleet::{CustomerStatus, DeploymentStatus, DeploymentType},
  license::{AllocationStatus, LicenseStatus},
  product::ProductType,
  resolver::Priority,
  rollout::RolloutStatus,
  version::{ReleaseType, VersionState},
};

// ─── Pagination ──────────────────────────────────────────────────────────────

pub const MAX_PAGE_SIZE: u32 = 100;

/// A normalised page request: `page ≥ 1`, `1 ≤ limit ≤ 100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
  pub page:  u32,
  pub limit: u32,
}

impl PageRequest {
  /// Clamp raw query values. `page < 1` becomes 1; a `limit` outside
  /// `[1, 100]` falls back to `default_limit`.
  pub fn new(page: Option<i64>, limit: Option<i64>, default_limit: u32) -> Self {
    let page = page
      .filter(|p| *p >= 1)
      .and_then(|p| u32::try_from(p).ok())
      .unwrap_or(1);
    let limit = limit
      .filter(|l| (1..=i64::from(MAX_PAGE_SIZE)).contains(l))
      .map(|l| l as u32)
      .unwrap_or(default_limit);
    Self { page, limit }
  }

  pub fn offset(&self) -> u64 { u64::from(self.page - 1) * u64::from(self.limit) }
}

impl Default for PageRequest {
  fn default() -> Self { Self { page: 1, limit: 20 } }
}

/// One page of results plus the total count across all pages.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
  pub items: Vec<T>,
  pub page:  u32,
  pub limit: u32,
  pub total: u64,
}

impl<T> Page<T> {
  pub fn total_pages(&self) -> u64 {
    if self.limit == 0 {
      0
    } else {
      self.total.div_ceil(u64::from(self.limit))
    }
  }

  /// Slice an already-filtered, already-sorted collection.
  pub fn from_vec(all: Vec<T>, req: PageRequest) -> Self {
    let total = all.len() as u64;
    let items = all
      .into_iter()
      .skip(req.offset() as usize)
      .take(req.limit as usize)
      .collect();
    Self { items, page: req.page, limit: req.limit, total }
  }

  pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
    Page {
      items: self.items.into_iter().map(f).collect(),
      page:  self.page,
      limit: self.limit,
      total: self.total,
    }
  }
}

// ─── Entity references ───────────────────────────────────────────────────────

/// A reference that may be either a surrogate id or a business key.
/// Lookups resolve surrogate ids first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityRef {
  Id(Uuid),
  Key(String),
}

impl EntityRef {
  pub fn parse(raw: &str) -> Self {
    match Uuid::parse_str(raw) {
      Ok(id) => Self::Id(id),
      Err(_) => Self::Key(raw.to_owned()),
    }
  }
}

impl From<&str> for EntityRef {
  fn from(raw: &str) -> Self { Self::parse(raw) }
}

impl From<Uuid> for EntityRef {
  fn from(id: Uuid) -> Self { Self::Id(id) }
}

impl fmt::Display for EntityRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Id(id) => write!(f, "{id}"),
      Self::Key(k) => f.write_str(k),
    }
  }
}

/// Generate a business key such as `CUST-3F2A9C01B7D4`.
pub fn generate_key(prefix: &str) -> String {
  let simple = Uuid::new_v4().simple().to_string().to_uppercase();
  format!("{prefix}-{}", &simple[..12])
}

// ─── Filters ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
  #[serde(rename = "type")]
  pub product_type: Option<ProductType>,
  pub is_active:    Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VersionFilter {
  pub state:        Option<VersionState>,
  pub release_type: Option<ReleaseType>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerFilter {
  pub status: Option<CustomerStatus>,
  /// Case-insensitive substring match on name, customer id and organization.
  pub search: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeploymentFilter {
  pub customer_id:     Option<String>,
  pub tenant_id:       Option<String>,
  pub product_id:      Option<String>,
  pub deployment_type: Option<DeploymentType>,
  pub status:          Option<DeploymentStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LicenseFilter {
  pub customer_id:     Option<String>,
  pub subscription_id: Option<String>,
  pub product_id:      Option<String>,
  pub status:          Option<LicenseStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AllocationFilter {
  pub status: Option<AllocationStatus>,
}

/// Narrowing applied to pending-update results at every aggregation level.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateFilter {
  pub customer_id:     Option<String>,
  pub tenant_id:       Option<String>,
  pub product_id:      Option<String>,
  pub deployment_type: Option<DeploymentType>,
  pub priority:        Option<Priority>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetectionFilter {
  pub endpoint_id: Option<String>,
  pub product_id:  Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RolloutFilter {
  pub endpoint_id: Option<String>,
  pub product_id:  Option<String>,
  pub status:      Option<RolloutStatus>,
}
