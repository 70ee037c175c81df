//! Durable audit sink writing to the `audit_log` table.

use releasedesk_core::audit::{AuditEntry, AuditSink};
use tokio::runtime::Handle;

use crate::{
  Error, Result, SqliteStore,
  encode::{encode_dt, encode_uuid, text},
};

/// Appends every entry to `audit_log` on a background task.
///
/// `record` returns immediately; a failed insert is logged and dropped.
#[derive(Clone)]
pub struct SqliteAuditSink {
  store: SqliteStore,
}

impl SqliteAuditSink {
  pub fn new(store: SqliteStore) -> Self { Self { store } }
}

impl AuditSink for SqliteAuditSink {
  fn record(&self, entry: AuditEntry) {
    let Ok(handle) = Handle::try_current() else {
      tracing::warn!(action = %entry.action, "no runtime; audit entry dropped");
      return;
    };
    let store = self.store.clone();
    handle.spawn(async move {
      if let Err(e) = store.append_audit(&entry).await {
        tracing::warn!(
          action = %entry.action,
          resource_id = %entry.resource_id,
          "failed to write audit entry: {e}"
        );
      }
    });
  }
}

impl SqliteStore {
  pub(crate) async fn append_audit(&self, entry: &AuditEntry) -> Result<()> {
    let doc = serde_json::to_string(entry)?;
    self
      .execute(
        "INSERT INTO audit_log
           (id, recorded_at, user_id, action, resource_type, resource_id, doc)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
          .to_owned(),
        vec![
          text(encode_uuid(entry.id)),
          text(encode_dt(entry.recorded_at)),
          text(&entry.actor.user_id),
          text(&entry.action),
          text(&entry.resource_type),
          text(&entry.resource_id),
          text(doc),
        ],
      )
      .await?;
    Ok(())
  }

  /// The most recent `limit` audit entries, newest first.
  pub async fn recent_audit(&self, limit: u32) -> Result<Vec<AuditEntry>> {
    let docs = self
      .query_docs(
        "SELECT doc FROM audit_log ORDER BY recorded_at DESC, id LIMIT ?1".to_owned(),
        vec![rusqlite::types::Value::Integer(i64::from(limit))],
      )
      .await?;
    docs
      .iter()
      .map(|d| serde_json::from_str(d).map_err(Error::from))
      .collect()
  }
}
