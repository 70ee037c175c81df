//! Compatibility matrices and upgrade paths, adjuncts to the version
//! lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
  #[default]
  Pending,
  Passed,
  Failed,
}

/// Server-compatibility envelope of one client version; one per
/// `(product_id, version_number)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatibilityMatrix {
  pub id:                         Uuid,
  pub product_id:                 String,
  pub version_number:             String,
  pub min_server_version:         Option<String>,
  pub max_server_version:         Option<String>,
  pub recommended_server_version: Option<String>,
  #[serde(default)]
  pub incompatible_versions:      Vec<String>,
  pub validation_status:          ValidationStatus,
  pub validated_by:               Option<String>,
  pub validated_at:               Option<DateTime<Utc>>,
  pub notes:                      Option<String>,
  pub created_at:                 DateTime<Utc>,
  pub updated_at:                 DateTime<Utc>,
}

/// Body of a matrix upsert. The write replaces the stored matrix wholesale.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatrixInput {
  pub min_server_version:         Option<String>,
  pub max_server_version:         Option<String>,
  pub recommended_server_version: Option<String>,
  #[serde(default)]
  pub incompatible_versions:      Vec<String>,
  pub notes:                      Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathType {
  Direct,
  Blocked,
}

/// A directed edge `from_version → to_version` within one product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradePath {
  pub id:           Uuid,
  pub product_id:   String,
  pub from_version: String,
  pub to_version:   String,
  pub path_type:    PathType,
  pub is_blocked:   bool,
  pub block_reason: Option<String>,
  pub notes:        Option<String>,
  pub created_by:   String,
  pub blocked_by:   Option<String>,
  pub blocked_at:   Option<DateTime<Utc>>,
  pub created_at:   DateTime<Utc>,
  pub updated_at:   DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUpgradePath {
  pub from_version: String,
  pub to_version:   String,
  pub notes:        Option<String>,
}
