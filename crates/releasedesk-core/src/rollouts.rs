//! Update detections and rollout progress reported by endpoint agents.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::{
  Error, Result,
  audit::{AuditEntry, AuditSink},
  context::RequestContext,
  error::StoreResultExt,
  query::{DetectionFilter, Page, PageRequest, RolloutFilter},
  rollout::{
    NewDetection, NewRollout, ProgressUpdate, RolloutStatus, UpdateDetection,
    UpdateRollout,
  },
  store::Store,
};

pub struct RolloutTracker<S> {
  store: Arc<S>,
  audit: Arc<dyn AuditSink>,
}

impl<S> Clone for RolloutTracker<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), audit: self.audit.clone() }
  }
}

fn require(field: &str, value: &str) -> Result<()> {
  if value.trim().is_empty() {
    Err(Error::InvalidRequest(format!("{field} is required")))
  } else {
    Ok(())
  }
}

/// Apply an agent's progress report to a rollout in memory.
fn apply_progress(rollout: &mut UpdateRollout, update: ProgressUpdate) -> Result<()> {
  if rollout.status.is_terminal() {
    return Err(Error::InvalidState(format!(
      "rollout {} is already {}",
      rollout.id,
      rollout.status.as_str()
    )));
  }
  let progress = u8::try_from(update.progress)
    .ok()
    .filter(|p| *p <= 100)
    .ok_or_else(|| {
      Error::InvalidRequest(format!(
        "progress {} is outside 0..=100",
        update.progress
      ))
    })?;

  let now = Utc::now();
  let status = update.status.unwrap_or(match progress {
    0 => rollout.status,
    100 => RolloutStatus::Completed,
    _ => RolloutStatus::InProgress,
  });

  rollout.progress = progress;
  rollout.status = status;
  if status != RolloutStatus::Pending && rollout.started_at.is_none() {
    rollout.started_at = Some(now);
  }
  match status {
    RolloutStatus::Completed => {
      rollout.progress = 100;
      rollout.completed_at = Some(now);
    }
    RolloutStatus::Failed => {
      rollout.completed_at = Some(now);
      rollout.error_message = update.error_message;
    }
    RolloutStatus::Pending | RolloutStatus::InProgress => {
      if update.error_message.is_some() {
        rollout.error_message = update.error_message;
      }
    }
  }
  Ok(())
}

impl<S: Store> RolloutTracker<S> {
  pub fn new(store: Arc<S>, audit: Arc<dyn AuditSink>) -> Self {
    Self { store, audit }
  }

  /// Upsert the detection for `(endpoint_id, product_id)`.
  pub async fn record_detection(
    &self,
    ctx: &RequestContext,
    input: NewDetection,
  ) -> Result<UpdateDetection> {
    ctx.check_deadline()?;
    require("endpoint_id", &input.endpoint_id)?;
    require("product_id", &input.product_id)?;
    require("current_version", &input.current_version)?;
    require("available_version", &input.available_version)?;

    let now = Utc::now();
    let detection = UpdateDetection {
      id:                Uuid::new_v4(),
      endpoint_id:       input.endpoint_id,
      product_id:        input.product_id,
      current_version:   input.current_version,
      available_version: input.available_version,
      detected_at:       now,
      last_checked_at:   now,
      created_at:        now,
      updated_at:        now,
    };
    let detection = self.store.upsert_detection(detection).await.or_store()?;

    tracing::debug!(
      endpoint = %detection.endpoint_id,
      product = %detection.product_id,
      available = %detection.available_version,
      "recorded update detection"
    );
    Ok(detection)
  }

  pub async fn list_detections(
    &self,
    filter: &DetectionFilter,
  ) -> Result<Vec<UpdateDetection>> {
    self.store.list_detections(filter).await.or_store()
  }

  pub async fn start_rollout(
    &self,
    ctx: &RequestContext,
    input: NewRollout,
  ) -> Result<UpdateRollout> {
    ctx.check_deadline()?;
    require("endpoint_id", &input.endpoint_id)?;
    require("product_id", &input.product_id)?;
    require("from_version", &input.from_version)?;
    require("to_version", &input.to_version)?;

    let now = Utc::now();
    let rollout = UpdateRollout {
      id:            Uuid::new_v4(),
      endpoint_id:   input.endpoint_id,
      product_id:    input.product_id,
      from_version:  input.from_version,
      to_version:    input.to_version,
      status:        RolloutStatus::Pending,
      progress:      0,
      error_message: None,
      initiated_by:  ctx.user_id().to_owned(),
      started_at:    None,
      completed_at:  None,
      created_at:    now,
      updated_at:    now,
    };
    let rollout = self.store.insert_rollout(rollout).await.or_store()?;

    tracing::info!(
      rollout = %rollout.id,
      endpoint = %rollout.endpoint_id,
      to = %rollout.to_version,
      "started rollout"
    );
    self.audit.record(
      AuditEntry::new(ctx, "rollout.start", "rollout", rollout.id).with_details(
        json!({
          "endpoint_id": rollout.endpoint_id,
          "product_id": rollout.product_id,
          "to_version": rollout.to_version,
        }),
      ),
    );
    Ok(rollout)
  }

  pub async fn get_rollout(&self, id: Uuid) -> Result<UpdateRollout> {
    self
      .store
      .get_rollout(id)
      .await
      .or_store()?
      .ok_or_else(|| Error::NotFound(format!("rollout {id}")))
  }

  pub async fn list_rollouts(
    &self,
    filter: &RolloutFilter,
    page: PageRequest,
  ) -> Result<Page<UpdateRollout>> {
    self.store.list_rollouts(filter, page).await.or_store()
  }

  pub async fn update_rollout_progress(
    &self,
    ctx: &RequestContext,
    id: Uuid,
    update: ProgressUpdate,
  ) -> Result<UpdateRollout> {
    ctx.check_deadline()?;
    let mut rollout = self.get_rollout(id).await?;
    apply_progress(&mut rollout, update)?;
    let rollout = self.store.update_rollout(rollout).await.or_store()?;

    if rollout.status.is_terminal() {
      tracing::info!(rollout = %rollout.id, status = rollout.status.as_str(), "rollout finished");
    }
    self.audit.record(
      AuditEntry::new(ctx, "rollout.progress", "rollout", rollout.id)
        .with_details(json!({
          "progress": rollout.progress,
          "status": rollout.status,
        })),
    );
    Ok(rollout)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn rollout() -> UpdateRollout {
    let now = Utc::now();
    UpdateRollout {
      id:            Uuid::new_v4(),
      endpoint_id:   "ep-1".into(),
      product_id:    "p1".into(),
      from_version:  "1.0.0".into(),
      to_version:    "1.1.0".into(),
      status:        RolloutStatus::Pending,
      progress:      0,
      error_message: None,
      initiated_by:  "admin".into(),
      started_at:    None,
      completed_at:  None,
      created_at:    now,
      updated_at:    now,
    }
  }

  fn progress(p: i64, status: Option<RolloutStatus>) -> ProgressUpdate {
    ProgressUpdate { progress: p, status, error_message: None }
  }

  #[test]
  fn progress_outside_percentage_range_is_rejected() {
    let mut r = rollout();
    assert!(matches!(
      apply_progress(&mut r, progress(101, None)),
      Err(Error::InvalidRequest(_))
    ));
    assert!(matches!(
      apply_progress(&mut r, progress(-1, None)),
      Err(Error::InvalidRequest(_))
    ));
    assert_eq!(r.progress, 0);
  }

  #[test]
  fn partial_progress_starts_the_rollout() {
    let mut r = rollout();
    apply_progress(&mut r, progress(40, None)).unwrap();
    assert_eq!(r.status, RolloutStatus::InProgress);
    assert!(r.started_at.is_some());
    assert!(r.completed_at.is_none());
  }

  #[test]
  fn completion_forces_full_progress_and_is_terminal() {
    let mut r = rollout();
    apply_progress(&mut r, progress(70, Some(RolloutStatus::Completed))).unwrap();
    assert_eq!(r.progress, 100);
    assert!(r.completed_at.is_some());

    assert!(matches!(
      apply_progress(&mut r, progress(50, None)),
      Err(Error::InvalidState(_))
    ));
  }

  #[test]
  fn failure_keeps_the_error_message() {
    let mut r = rollout();
    apply_progress(&mut r, ProgressUpdate {
      progress:      30,
      status:        Some(RolloutStatus::Failed),
      error_message: Some("disk full".into()),
    })
    .unwrap();
    assert_eq!(r.status, RolloutStatus::Failed);
    assert_eq!(r.error_message.as_deref(), Some("disk full"));
  }
}
