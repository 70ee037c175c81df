//! Update-detection and rollout bookkeeping for external endpoint agents.
//!
//! Nothing here delivers software; these records only track what agents
//! report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The latest update an endpoint has seen for a product. Unique per
/// `(endpoint_id, product_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateDetection {
  pub id:                Uuid,
  pub endpoint_id:       String,
  pub product_id:        String,
  pub current_version:   String,
  pub available_version: String,
  pub detected_at:       DateTime<Utc>,
  pub last_checked_at:   DateTime<Utc>,
  pub created_at:        DateTime<Utc>,
  pub updated_at:        DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDetection {
  pub endpoint_id:       String,
  pub product_id:        String,
  pub current_version:   String,
  pub available_version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutStatus {
  Pending,
  InProgress,
  Completed,
  Failed,
}

impl RolloutStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::InProgress => "in_progress",
      Self::Completed => "completed",
      Self::Failed => "failed",
    }
  }

  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Completed | Self::Failed)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRollout {
  pub id:            Uuid,
  pub endpoint_id:   String,
  pub product_id:    String,
  pub from_version:  String,
  pub to_version:    String,
  pub status:        RolloutStatus,
  /// Percentage in `0..=100`.
  pub progress:      u8,
  pub error_message: Option<String>,
  pub initiated_by:  String,
  pub started_at:    Option<DateTime<Utc>>,
  pub completed_at:  Option<DateTime<Utc>>,
  pub created_at:    DateTime<Utc>,
  pub updated_at:    DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRollout {
  pub endpoint_id:  String,
  pub product_id:   String,
  pub from_version: String,
  pub to_version:   String,
}

/// Progress report from an agent. `progress` is signed so out-of-range
/// values reach validation instead of failing deserialisation.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressUpdate {
  pub progress:      i64,
  pub status:        Option<RolloutStatus>,
  pub error_message: Option<String>,
}
