//! Encoding between domain records and SQLite rows.
//!
//! Timestamps used in key columns are stored as fixed-width RFC 3339 strings
//! (microsecond precision, `Z` suffix) so lexical order equals time order.
//! UUIDs are stored as hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use releasedesk_core::{
  compat::{CompatibilityMatrix, UpgradePath},
  fleet::{Customer, Deployment, Tenant},
  license::{License, LicenseAllocation, Subscription},
  product::Product,
  rollout::{UpdateDetection, UpdateRollout},
  version::Version,
};
use rusqlite::types::Value;
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn text(s: impl Into<String>) -> Value { Value::Text(s.into()) }

pub fn opt_text(s: Option<impl Into<String>>) -> Value {
  s.map_or(Value::Null, text)
}

// ─── Documents ───────────────────────────────────────────────────────────────

/// A record stored as one row of `TABLE`.
///
/// `KEY` is the business-key column used when a lookup is not by surrogate
/// id. `columns` lists the indexed columns in declaration order, not
/// including `id` and `doc`.
pub trait Document: Serialize + DeserializeOwned + Send + 'static {
  const TABLE: &'static str;
  const KEY: &'static str;

  fn id(&self) -> Uuid;

  fn columns(&self) -> Vec<(&'static str, Value)>;

  /// Stamp `created_at` and `updated_at` for a fresh insert.
  fn created(&mut self, now: DateTime<Utc>);

  /// Bump `updated_at` for an update.
  fn updated(&mut self, now: DateTime<Utc>);

  fn encode(&self) -> Result<String> { Ok(serde_json::to_string(self)?) }

  fn decode(doc: &str) -> Result<Self> { Ok(serde_json::from_str(doc)?) }
}

macro_rules! timestamps {
  () => {
    fn created(&mut self, now: DateTime<Utc>) {
      self.created_at = now;
      self.updated_at = now;
    }

    fn updated(&mut self, now: DateTime<Utc>) { self.updated_at = now; }
  };
}

impl Document for Product {
  const KEY: &'static str = "product_id";
  const TABLE: &'static str = "products";

  fn id(&self) -> Uuid { self.id }

  fn columns(&self) -> Vec<(&'static str, Value)> {
    vec![
      ("product_id", text(&self.product_id)),
      ("product_type", text(self.product_type.as_str())),
      ("is_active", Value::Integer(i64::from(self.is_active))),
    ]
  }

  timestamps!();
}

impl Document for Version {
  const KEY: &'static str = "version_number";
  const TABLE: &'static str = "versions";

  fn id(&self) -> Uuid { self.id }

  fn columns(&self) -> Vec<(&'static str, Value)> {
    vec![
      ("product_id", text(&self.product_id)),
      ("version_number", text(&self.version_number)),
      ("state", text(self.state.as_str())),
      ("release_type", text(self.release_type.as_str())),
    ]
  }

  timestamps!();
}

impl Document for CompatibilityMatrix {
  const KEY: &'static str = "version_number";
  const TABLE: &'static str = "compatibility";

  fn id(&self) -> Uuid { self.id }

  fn columns(&self) -> Vec<(&'static str, Value)> {
    vec![
      ("product_id", text(&self.product_id)),
      ("version_number", text(&self.version_number)),
    ]
  }

  timestamps!();
}

impl Document for UpgradePath {
  const KEY: &'static str = "id";
  const TABLE: &'static str = "upgrade_paths";

  fn id(&self) -> Uuid { self.id }

  fn columns(&self) -> Vec<(&'static str, Value)> {
    vec![
      ("product_id", text(&self.product_id)),
      ("from_version", text(&self.from_version)),
      ("to_version", text(&self.to_version)),
    ]
  }

  timestamps!();
}

impl Document for Customer {
  const KEY: &'static str = "customer_id";
  const TABLE: &'static str = "customers";

  fn id(&self) -> Uuid { self.id }

  fn columns(&self) -> Vec<(&'static str, Value)> {
    vec![
      ("customer_id", text(&self.customer_id)),
      ("name", text(&self.name)),
      ("organization", opt_text(self.organization.as_deref())),
      ("status", text(self.status.as_str())),
    ]
  }

  timestamps!();
}

impl Document for Tenant {
  const KEY: &'static str = "tenant_id";
  const TABLE: &'static str = "tenants";

  fn id(&self) -> Uuid { self.id }

  fn columns(&self) -> Vec<(&'static str, Value)> {
    vec![
      ("tenant_id", text(&self.tenant_id)),
      ("customer_id", text(&self.customer_id)),
    ]
  }

  timestamps!();
}

impl Document for Deployment {
  const KEY: &'static str = "deployment_id";
  const TABLE: &'static str = "deployments";

  fn id(&self) -> Uuid { self.id }

  fn columns(&self) -> Vec<(&'static str, Value)> {
    vec![
      ("deployment_id", text(&self.deployment_id)),
      ("customer_id", text(&self.customer_id)),
      ("tenant_id", text(&self.tenant_id)),
      ("product_id", text(&self.product_id)),
      ("deployment_type", text(self.deployment_type.as_str())),
      ("status", text(self.status.as_str())),
    ]
  }

  timestamps!();
}

impl Document for Subscription {
  const KEY: &'static str = "subscription_id";
  const TABLE: &'static str = "subscriptions";

  fn id(&self) -> Uuid { self.id }

  fn columns(&self) -> Vec<(&'static str, Value)> {
    vec![
      ("subscription_id", text(&self.subscription_id)),
      ("customer_id", text(&self.customer_id)),
    ]
  }

  timestamps!();
}

impl Document for License {
  const KEY: &'static str = "license_id";
  const TABLE: &'static str = "licenses";

  fn id(&self) -> Uuid { self.id }

  fn columns(&self) -> Vec<(&'static str, Value)> {
    vec![
      ("license_id", text(&self.license_id)),
      ("subscription_id", text(&self.subscription_id)),
      ("customer_id", text(&self.customer_id)),
      ("product_id", text(&self.product_id)),
      ("status", text(self.status.as_str())),
    ]
  }

  timestamps!();
}

impl Document for LicenseAllocation {
  const KEY: &'static str = "allocation_id";
  const TABLE: &'static str = "allocations";

  fn id(&self) -> Uuid { self.id }

  fn columns(&self) -> Vec<(&'static str, Value)> {
    vec![
      ("allocation_id", text(&self.allocation_id)),
      ("license_id", text(&self.license_id)),
      ("tenant_id", text(&self.tenant_id)),
      ("status", text(self.status.as_str())),
      ("seats_allocated", Value::Integer(i64::from(self.seats_allocated))),
    ]
  }

  timestamps!();
}

impl Document for UpdateDetection {
  const KEY: &'static str = "id";
  const TABLE: &'static str = "update_detections";

  fn id(&self) -> Uuid { self.id }

  fn columns(&self) -> Vec<(&'static str, Value)> {
    vec![
      ("endpoint_id", text(&self.endpoint_id)),
      ("product_id", text(&self.product_id)),
    ]
  }

  timestamps!();
}

impl Document for UpdateRollout {
  const KEY: &'static str = "id";
  const TABLE: &'static str = "update_rollouts";

  fn id(&self) -> Uuid { self.id }

  fn columns(&self) -> Vec<(&'static str, Value)> {
    vec![
      ("endpoint_id", text(&self.endpoint_id)),
      ("product_id", text(&self.product_id)),
      ("status", text(self.status.as_str())),
      ("created_at", text(encode_dt(self.created_at))),
    ]
  }

  timestamps!();
}

// ─── Filters ─────────────────────────────────────────────────────────────────

/// An accumulating `WHERE` clause with positional parameters.
#[derive(Debug, Default)]
pub struct Where {
  clauses: Vec<String>,
  params:  Vec<Value>,
}

impl Where {
  pub fn new() -> Self { Self::default() }

  /// Add `column = ?` when `value` is present.
  pub fn eq(mut self, column: &str, value: Option<impl Into<String>>) -> Self {
    if let Some(v) = value {
      self.params.push(text(v));
      self.clauses.push(format!("{column} = ?{}", self.params.len()));
    }
    self
  }

  pub fn eq_int(mut self, column: &str, value: Option<i64>) -> Self {
    if let Some(v) = value {
      self.params.push(Value::Integer(v));
      self.clauses.push(format!("{column} = ?{}", self.params.len()));
    }
    self
  }

  /// Case-insensitive substring match against any of `columns`.
  pub fn contains_any(mut self, columns: &[&str], needle: Option<&str>) -> Self {
    if let Some(needle) = needle.filter(|n| !n.is_empty()) {
      let escaped = needle
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
      self.params.push(text(format!("%{escaped}%")));
      let n = self.params.len();
      let any = columns
        .iter()
        .map(|c| format!("lower(coalesce({c}, '')) LIKE ?{n} ESCAPE '\\'"))
        .collect::<Vec<_>>()
        .join(" OR ");
      self.clauses.push(format!("({any})"));
    }
    self
  }

  pub fn sql(&self) -> String {
    if self.clauses.is_empty() {
      String::new()
    } else {
      format!(" WHERE {}", self.clauses.join(" AND "))
    }
  }

  pub fn into_params(self) -> Vec<Value> { self.params }
}
