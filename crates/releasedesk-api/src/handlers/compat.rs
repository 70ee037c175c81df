//! Handlers for compatibility matrices and upgrade paths.

use std::sync::Arc;

use axum::extract::State;
use releasedesk_core::{
  compat::{CompatibilityMatrix, MatrixInput, NewUpgradePath, UpgradePath},
  store::Store,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
  AppState,
  envelope::{Envelope, Message},
  error::Result,
  extract::{ApiJson, ApiPath, ApiQuery, Caller},
};

/// `GET /products/{product_id}/versions/{version_number}/compatibility`
pub async fn get_matrix<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  ApiPath((product_id, version_number)): ApiPath<(String, String)>,
) -> Result<Envelope<CompatibilityMatrix>> {
  let matrix = state
    .plane
    .compatibility
    .get_matrix(&product_id, &version_number)
    .await?;
  Ok(Envelope::ok(matrix))
}

/// `PUT /products/{product_id}/versions/{version_number}/compatibility`
pub async fn put_matrix<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath((product_id, version_number)): ApiPath<(String, String)>,
  ApiJson(input): ApiJson<MatrixInput>,
) -> Result<Envelope<CompatibilityMatrix>> {
  let matrix = state
    .plane
    .compatibility
    .upsert_matrix(&ctx, &product_id, &version_number, input)
    .await?;
  Ok(Envelope::ok(matrix))
}

#[derive(Debug, Default, Deserialize)]
pub struct PathQuery {
  pub from_version: Option<String>,
}

/// `GET /products/{product_id}/upgrade-paths[?from_version=]`
pub async fn list_paths<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  ApiPath(product_id): ApiPath<String>,
  ApiQuery(query): ApiQuery<PathQuery>,
) -> Result<Envelope<Vec<UpgradePath>>> {
  let paths = state
    .plane
    .compatibility
    .list_upgrade_paths(&product_id, query.from_version.as_deref())
    .await?;
  Ok(Envelope::ok(paths))
}

/// `POST /products/{product_id}/upgrade-paths`
pub async fn create_path<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath(product_id): ApiPath<String>,
  ApiJson(input): ApiJson<NewUpgradePath>,
) -> Result<Envelope<UpgradePath>> {
  let path = state
    .plane
    .compatibility
    .create_upgrade_path(&ctx, &product_id, input)
    .await?;
  Ok(Envelope::created(path))
}

#[derive(Debug, Deserialize)]
pub struct BlockBody {
  pub reason: String,
}

/// `POST /upgrade-paths/{id}/block`
pub async fn block_path<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath(id): ApiPath<Uuid>,
  ApiJson(body): ApiJson<BlockBody>,
) -> Result<Envelope<UpgradePath>> {
  let path = state
    .plane
    .compatibility
    .block_upgrade_path(&ctx, id, body.reason)
    .await?;
  Ok(Envelope::ok(path))
}

/// `DELETE /upgrade-paths/{id}`
pub async fn delete_path<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath(id): ApiPath<Uuid>,
) -> Result<Envelope<Message>> {
  state.plane.compatibility.delete_upgrade_path(&ctx, id).await?;
  Ok(Envelope::ok(Message::new(format!("upgrade path {id} deleted"))))
}
