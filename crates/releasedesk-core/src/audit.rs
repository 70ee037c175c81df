//! Audit trail as a fire-and-forget side effect.
//!
//! Engines build an [`AuditEntry`] after every successful mutation and hand it
//! to an [`AuditSink`]. `record` never blocks the caller on durability and
//! never reports failure: a lost audit entry must not fail the operation it
//! describes.

use std::fmt::Display;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::{Actor, RequestContext};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
  pub id:            Uuid,
  pub actor:         Actor,
  /// Dotted action name, e.g. `version.release`.
  pub action:        String,
  pub resource_type: String,
  pub resource_id:   String,
  pub details:       serde_json::Value,
  pub recorded_at:   DateTime<Utc>,
}

impl AuditEntry {
  pub fn new(
    ctx: &RequestContext,
    action: &str,
    resource_type: &str,
    resource_id: impl Display,
  ) -> Self {
    Self {
      id:            Uuid::new_v4(),
      actor:         ctx.actor.clone(),
      action:        action.to_owned(),
      resource_type: resource_type.to_owned(),
      resource_id:   resource_id.to_string(),
      details:       serde_json::Value::Null,
      recorded_at:   Utc::now(),
    }
  }

  pub fn with_details(mut self, details: serde_json::Value) -> Self {
    self.details = details;
    self
  }
}

/// Destination for audit entries.
pub trait AuditSink: Send + Sync {
  /// Accept an entry. Implementations must return promptly and swallow (but
  /// log) their own failures.
  fn record(&self, entry: AuditEntry);
}

/// Writes entries to the `releasedesk::audit` tracing target only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
  fn record(&self, entry: AuditEntry) {
    tracing::info!(
      target: "releasedesk::audit",
      user = %entry.actor.user_id,
      action = %entry.action,
      resource_type = %entry.resource_type,
      resource_id = %entry.resource_id,
      "audit"
    );
  }
}

/// Keeps every entry in memory; used by tests.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
  entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
  pub fn new() -> Self { Self::default() }

  pub fn entries(&self) -> Vec<AuditEntry> { self.entries.lock().clone() }

  pub fn actions(&self) -> Vec<String> {
    self.entries.lock().iter().map(|e| e.action.clone()).collect()
  }
}

impl AuditSink for MemoryAuditSink {
  fn record(&self, entry: AuditEntry) { self.entries.lock().push(entry); }
}
