//! Handlers for update detections and rollout bookkeeping.

use std::sync::Arc;

use axum::extract::State;
use releasedesk_core::{
  query::{DetectionFilter, RolloutFilter},
  rollout::{NewDetection, NewRollout, ProgressUpdate, UpdateDetection, UpdateRollout},
  store::Store,
};
use uuid::Uuid;

use crate::{
  AppState,
  envelope::Envelope,
  error::Result,
  extract::{ApiJson, ApiPath, ApiQuery, Caller, PageQuery},
};

/// `GET /update-detections[?endpoint_id=&product_id=]`
pub async fn list_detections<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  ApiQuery(filter): ApiQuery<DetectionFilter>,
) -> Result<Envelope<Vec<UpdateDetection>>> {
  Ok(Envelope::ok(state.plane.rollouts.list_detections(&filter).await?))
}

/// `POST /update-detections`
///
/// Upsert per `(endpoint_id, product_id)`.
pub async fn record_detection<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiJson(input): ApiJson<NewDetection>,
) -> Result<Envelope<UpdateDetection>> {
  Ok(Envelope::ok(state.plane.rollouts.record_detection(&ctx, input).await?))
}

/// `GET /rollouts[?endpoint_id=&product_id=&status=&page=&limit=]`
pub async fn list<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  ApiQuery(filter): ApiQuery<RolloutFilter>,
  ApiQuery(page): ApiQuery<PageQuery>,
) -> Result<Envelope<Vec<UpdateRollout>>> {
  let rollouts = state
    .plane
    .rollouts
    .list_rollouts(&filter, page.with_default(10))
    .await?;
  Ok(Envelope::page(rollouts))
}

/// `POST /rollouts`
pub async fn start<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiJson(input): ApiJson<NewRollout>,
) -> Result<Envelope<UpdateRollout>> {
  Ok(Envelope::created(state.plane.rollouts.start_rollout(&ctx, input).await?))
}

/// `GET /rollouts/{id}`
pub async fn get_one<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  ApiPath(id): ApiPath<Uuid>,
) -> Result<Envelope<UpdateRollout>> {
  Ok(Envelope::ok(state.plane.rollouts.get_rollout(id).await?))
}

/// `PUT /rollouts/{id}/progress`
pub async fn update_progress<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath(id): ApiPath<Uuid>,
  ApiJson(update): ApiJson<ProgressUpdate>,
) -> Result<Envelope<UpdateRollout>> {
  let rollout = state
    .plane
    .rollouts
    .update_rollout_progress(&ctx, id, update)
    .await?;
  Ok(Envelope::ok(rollout))
}
