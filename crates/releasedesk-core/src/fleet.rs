//! The customer → tenant → deployment hierarchy.
//!
//! Every entity carries a surrogate `id` and a human-readable business key
//! (`customer_id`, `tenant_id`, `deployment_id`). Children refer to their
//! parents by business key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Customer ────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum CustomerStatus {
  #[default]
  Active,
  Inactive,
}

impl CustomerStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Active => "active",
      Self::Inactive => "inactive",
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
  pub id:              Uuid,
  pub customer_id:     String,
  pub name:            String,
  pub email:           Option<String>,
  pub organization:    Option<String>,
  pub account_manager: Option<String>,
  pub status:          CustomerStatus,
  pub created_by:      String,
  pub created_at:      DateTime<Utc>,
  pub updated_at:      DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCustomer {
  /// Generated when absent.
  pub customer_id:     Option<String>,
  pub name:            String,
  pub email:           Option<String>,
  pub organization:    Option<String>,
  pub account_manager: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerPatch {
  pub name:            Option<String>,
  pub email:           Option<String>,
  pub organization:    Option<String>,
  pub account_manager: Option<String>,
  pub status:          Option<CustomerStatus>,
}

impl CustomerPatch {
  pub fn apply(self, c: &mut Customer) {
    if let Some(name) = self.name {
      c.name = name;
    }
    if let Some(email) = self.email {
      c.email = Some(email);
    }
    if let Some(org) = self.organization {
      c.organization = Some(org);
    }
    if let Some(am) = self.account_manager {
      c.account_manager = Some(am);
    }
    if let Some(status) = self.status {
      c.status = status;
    }
  }
}

/// What a customer delete actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
  /// The record is gone.
  Deleted,
  /// Children still exist; the record was soft-deleted instead.
  Deactivated,
}

// ─── Tenant ──────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
  #[default]
  Active,
  Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
  pub id:          Uuid,
  pub tenant_id:   String,
  pub customer_id: String,
  pub name:        String,
  pub description: Option<String>,
  pub status:      TenantStatus,
  pub created_by:  String,
  pub created_at:  DateTime<Utc>,
  pub updated_at:  DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTenant {
  pub tenant_id:   Option<String>,
  pub name:        String,
  pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenantPatch {
  pub name:        Option<String>,
  pub description: Option<String>,
  pub status:      Option<TenantStatus>,
}

impl TenantPatch {
  pub fn apply(self, t: &mut Tenant) {
    if let Some(name) = self.name {
      t.name = name;
    }
    if let Some(d) = self.description {
      t.description = Some(d);
    }
    if let Some(s) = self.status {
      t.status = s;
    }
  }
}

// ─── Deployment ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentType {
  Production,
  Uat,
  Testing,
  Development,
}

impl DeploymentType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Production => "production",
      Self::Uat => "uat",
      Self::Testing => "testing",
      Self::Development => "development",
    }
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
  #[default]
  Active,
  Inactive,
  Maintenance,
}

impl DeploymentStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Active => "active",
      Self::Inactive => "inactive",
      Self::Maintenance => "maintenance",
    }
  }
}

/// An installation of one product inside a tenant. Unique per
/// `(tenant_id, product_id, deployment_type)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
  pub id:                Uuid,
  pub deployment_id:     String,
  pub customer_id:       String,
  pub tenant_id:         String,
  pub product_id:        String,
  pub deployment_type:   DeploymentType,
  pub installed_version: String,
  pub number_of_users:   Option<u32>,
  pub license_id:        Option<String>,
  pub server_hostname:   Option<String>,
  pub notes:             Option<String>,
  pub status:            DeploymentStatus,
  pub deployment_date:   DateTime<Utc>,
  pub last_updated_date: Option<DateTime<Utc>>,
  pub created_by:        String,
  pub created_at:        DateTime<Utc>,
  pub updated_at:        DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDeployment {
  pub deployment_id:     Option<String>,
  pub product_id:        String,
  pub deployment_type:   DeploymentType,
  pub installed_version: String,
  pub number_of_users:   Option<u32>,
  pub license_id:        Option<String>,
  pub server_hostname:   Option<String>,
  pub notes:             Option<String>,
  pub deployment_date:   Option<DateTime<Utc>>,
}

/// Editable deployment fields. Product and tenant are fixed at creation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeploymentPatch {
  pub installed_version: Option<String>,
  pub deployment_type:   Option<DeploymentType>,
  pub number_of_users:   Option<u32>,
  pub license_id:        Option<String>,
  pub server_hostname:   Option<String>,
  pub notes:             Option<String>,
  pub status:            Option<DeploymentStatus>,
}

impl DeploymentPatch {
  /// Apply the patch; `now` stamps `last_updated_date` when the installed
  /// version actually changes.
  pub fn apply(self, d: &mut Deployment, now: DateTime<Utc>) {
    if let Some(v) = self.installed_version
      && v != d.installed_version
    {
      d.installed_version = v;
      d.last_updated_date = Some(now);
    }
    if let Some(t) = self.deployment_type {
      d.deployment_type = t;
    }
    if let Some(n) = self.number_of_users {
      d.number_of_users = Some(n);
    }
    if let Some(l) = self.license_id {
      d.license_id = Some(l);
    }
    if let Some(h) = self.server_hostname {
      d.server_hostname = Some(h);
    }
    if let Some(n) = self.notes {
      d.notes = Some(n);
    }
    if let Some(s) = self.status {
      d.status = s;
    }
  }
}
