//! Handlers for deployments and the pending-updates views.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET` `POST` | `/customers/{cid}/tenants/{tid}/deployments` | |
//! | `GET` `PUT` `DELETE` | `…/deployments/{did}` | |
//! | `GET`  | `…/deployments/{did}/updates` | cached for the configured TTL |
//! | `GET`  | `/customers/{cid}/tenants/{tid}/updates` | tenant summary |
//! | `GET`  | `/customers/{cid}/updates` | customer summary |
//! | `GET`  | `/updates/pending` | fleet view, paginated |

use std::sync::Arc;

use axum::extract::State;
use releasedesk_core::{
  fleet::{Deployment, DeploymentPatch, NewDeployment},
  query::{DeploymentFilter, EntityRef, UpdateFilter},
  resolver::{CustomerUpdates, DeploymentUpdates, TenantUpdates},
  store::Store,
};

use crate::{
  AppState,
  envelope::{Envelope, Message},
  error::Result,
  extract::{ApiJson, ApiPath, ApiQuery, Caller, PageQuery},
};

type DeploymentPath = (String, String, String);

fn refs((cid, tid, did): &DeploymentPath) -> (EntityRef, EntityRef, EntityRef) {
  (EntityRef::parse(cid), EntityRef::parse(tid), EntityRef::parse(did))
}

// ─── Deployments ─────────────────────────────────────────────────────────────

/// `GET /customers/{cid}/tenants/{tid}/deployments[?product_id=&deployment_type=&status=]`
pub async fn list<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  ApiPath((cid, tid)): ApiPath<(String, String)>,
  ApiQuery(filter): ApiQuery<DeploymentFilter>,
) -> Result<Envelope<Vec<Deployment>>> {
  let deployments = state
    .plane
    .registry
    .list_deployments(&EntityRef::parse(&cid), &EntityRef::parse(&tid), filter)
    .await?;
  Ok(Envelope::ok(deployments))
}

/// `POST /customers/{cid}/tenants/{tid}/deployments`
pub async fn create<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath((cid, tid)): ApiPath<(String, String)>,
  ApiJson(input): ApiJson<NewDeployment>,
) -> Result<Envelope<Deployment>> {
  let deployment = state
    .plane
    .registry
    .create_deployment(&ctx, &EntityRef::parse(&cid), &EntityRef::parse(&tid), input)
    .await?;
  Ok(Envelope::created(deployment))
}

/// `GET …/deployments/{did}`
pub async fn get_one<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  ApiPath(path): ApiPath<DeploymentPath>,
) -> Result<Envelope<Deployment>> {
  let (c, t, d) = refs(&path);
  Ok(Envelope::ok(state.plane.registry.get_deployment(&c, &t, &d).await?))
}

/// `PUT …/deployments/{did}`
pub async fn update<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath(path): ApiPath<DeploymentPath>,
  ApiJson(patch): ApiJson<DeploymentPatch>,
) -> Result<Envelope<Deployment>> {
  let (c, t, d) = refs(&path);
  let deployment = state
    .plane
    .registry
    .update_deployment(&ctx, &c, &t, &d, patch)
    .await?;
  Ok(Envelope::ok(deployment))
}

/// `DELETE …/deployments/{did}`
pub async fn delete<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath(path): ApiPath<DeploymentPath>,
) -> Result<Envelope<Message>> {
  let (c, t, d) = refs(&path);
  state.plane.registry.delete_deployment(&ctx, &c, &t, &d).await?;
  Ok(Envelope::ok(Message::new(format!("deployment {} deleted", path.2))))
}

// ─── Pending updates ─────────────────────────────────────────────────────────

/// `GET …/deployments/{did}/updates`
pub async fn deployment_updates<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  ApiPath(path): ApiPath<DeploymentPath>,
) -> Result<Envelope<DeploymentUpdates>> {
  let (c, t, d) = refs(&path);
  // Resolve through the registry first so the path hierarchy is enforced.
  let deployment = state.plane.registry.get_deployment(&c, &t, &d).await?;
  let updates = state
    .plane
    .resolver
    .updates_for_deployment(&EntityRef::Id(deployment.id))
    .await?;
  Ok(Envelope::ok(updates))
}

/// `GET /customers/{cid}/tenants/{tid}/updates`
pub async fn tenant_updates<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath((cid, tid)): ApiPath<(String, String)>,
  ApiQuery(filter): ApiQuery<UpdateFilter>,
) -> Result<Envelope<TenantUpdates>> {
  let updates = state
    .plane
    .resolver
    .updates_for_tenant(&ctx, &EntityRef::parse(&cid), &EntityRef::parse(&tid), &filter)
    .await?;
  Ok(Envelope::ok(updates))
}

/// `GET /customers/{cid}/updates`
pub async fn customer_updates<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath(cid): ApiPath<String>,
  ApiQuery(filter): ApiQuery<UpdateFilter>,
) -> Result<Envelope<CustomerUpdates>> {
  let updates = state
    .plane
    .resolver
    .updates_for_customer(&ctx, &EntityRef::parse(&cid), &filter)
    .await?;
  Ok(Envelope::ok(updates))
}

/// `GET /updates/pending[?customer_id=&tenant_id=&product_id=&deployment_type=&priority=&page=&limit=]`
pub async fn fleet_updates<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiQuery(filter): ApiQuery<UpdateFilter>,
  ApiQuery(page): ApiQuery<PageQuery>,
) -> Result<Envelope<Vec<DeploymentUpdates>>> {
  let updates = state
    .plane
    .resolver
    .updates_for_fleet(&ctx, &filter, page.with_default(20))
    .await?;
  Ok(Envelope::page(updates))
}
