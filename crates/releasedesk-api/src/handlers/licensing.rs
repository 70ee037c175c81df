//! Handlers for subscriptions, licenses and seat allocations.

use std::sync::Arc;

use axum::extract::State;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use releasedesk_core::{
  license::{
    AllocationRequest, License, LicenseAllocation, LicensePatch, NewLicense,
    NewSubscription, Subscription, SubscriptionPatch, Utilization,
  },
  query::{AllocationFilter, EntityRef},
  store::Store,
};
use serde::Deserialize;

use crate::{
  AppState,
  envelope::{Envelope, Message},
  error::Result,
  extract::{ApiJson, ApiPath, ApiQuery, Caller},
  handlers::optional_json,
};

type LicensePath = (String, String, String);

fn refs((cid, sid, lid): &LicensePath) -> (EntityRef, EntityRef, EntityRef) {
  (EntityRef::parse(cid), EntityRef::parse(sid), EntityRef::parse(lid))
}

// ─── Subscriptions ───────────────────────────────────────────────────────────

/// `GET /customers/{cid}/subscriptions`
pub async fn list_subscriptions<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  ApiPath(cid): ApiPath<String>,
) -> Result<Envelope<Vec<Subscription>>> {
  let subs = state
    .plane
    .subscriptions
    .list_subscriptions(&EntityRef::parse(&cid))
    .await?;
  Ok(Envelope::ok(subs))
}

/// `POST /customers/{cid}/subscriptions`
pub async fn create_subscription<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath(cid): ApiPath<String>,
  ApiJson(input): ApiJson<NewSubscription>,
) -> Result<Envelope<Subscription>> {
  let sub = state
    .plane
    .subscriptions
    .create_subscription(&ctx, &EntityRef::parse(&cid), input)
    .await?;
  Ok(Envelope::created(sub))
}

/// `GET /customers/{cid}/subscriptions/{sid}`
pub async fn get_subscription<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  ApiPath((cid, sid)): ApiPath<(String, String)>,
) -> Result<Envelope<Subscription>> {
  let sub = state
    .plane
    .subscriptions
    .get_subscription(&EntityRef::parse(&cid), &EntityRef::parse(&sid))
    .await?;
  Ok(Envelope::ok(sub))
}

/// `PUT /customers/{cid}/subscriptions/{sid}`
pub async fn update_subscription<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath((cid, sid)): ApiPath<(String, String)>,
  ApiJson(patch): ApiJson<SubscriptionPatch>,
) -> Result<Envelope<Subscription>> {
  let sub = state
    .plane
    .subscriptions
    .update_subscription(&ctx, &EntityRef::parse(&cid), &EntityRef::parse(&sid), patch)
    .await?;
  Ok(Envelope::ok(sub))
}

/// `DELETE /customers/{cid}/subscriptions/{sid}`
///
/// 409 while licenses exist.
pub async fn delete_subscription<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath((cid, sid)): ApiPath<(String, String)>,
) -> Result<Envelope<Message>> {
  state
    .plane
    .subscriptions
    .delete_subscription(&ctx, &EntityRef::parse(&cid), &EntityRef::parse(&sid))
    .await?;
  Ok(Envelope::ok(Message::new(format!("subscription {sid} deleted"))))
}

// ─── Licenses ────────────────────────────────────────────────────────────────

/// `GET /customers/{cid}/subscriptions/{sid}/licenses`
pub async fn list_licenses<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  ApiPath((cid, sid)): ApiPath<(String, String)>,
) -> Result<Envelope<Vec<License>>> {
  let licenses = state
    .plane
    .accountant
    .list_licenses(&EntityRef::parse(&cid), &EntityRef::parse(&sid))
    .await?;
  Ok(Envelope::ok(licenses))
}

/// `POST /customers/{cid}/subscriptions/{sid}/licenses`
pub async fn assign_license<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath((cid, sid)): ApiPath<(String, String)>,
  ApiJson(input): ApiJson<NewLicense>,
) -> Result<Envelope<License>> {
  let license = state
    .plane
    .accountant
    .assign_license(&ctx, &EntityRef::parse(&cid), &EntityRef::parse(&sid), input)
    .await?;
  Ok(Envelope::created(license))
}

/// `GET …/licenses/{lid}`
pub async fn get_license<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  ApiPath(path): ApiPath<LicensePath>,
) -> Result<Envelope<License>> {
  let (c, s, l) = refs(&path);
  Ok(Envelope::ok(state.plane.accountant.get_license(&c, &s, &l).await?))
}

/// `PUT …/licenses/{lid}`
pub async fn update_license<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath(path): ApiPath<LicensePath>,
  ApiJson(patch): ApiJson<LicensePatch>,
) -> Result<Envelope<License>> {
  let (c, s, l) = refs(&path);
  let license = state
    .plane
    .accountant
    .update_license(&ctx, &c, &s, &l, patch)
    .await?;
  Ok(Envelope::ok(license))
}

/// `DELETE …/licenses/{lid}`
///
/// 409 while allocations are active.
pub async fn delete_license<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath(path): ApiPath<LicensePath>,
) -> Result<Envelope<Message>> {
  let (c, s, l) = refs(&path);
  state.plane.accountant.delete_license(&ctx, &c, &s, &l).await?;
  Ok(Envelope::ok(Message::new(format!("license {} deleted", path.2))))
}

#[derive(Debug, Deserialize)]
pub struct RenewBody {
  pub end_date: DateTime<Utc>,
}

/// `POST …/licenses/{lid}/renew`
///
/// Body `{"end_date": "…"}`.
pub async fn renew<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath(path): ApiPath<LicensePath>,
  ApiJson(body): ApiJson<RenewBody>,
) -> Result<Envelope<License>> {
  let (c, s, l) = refs(&path);
  let license = state
    .plane
    .accountant
    .renew(&ctx, &c, &s, &l, body.end_date)
    .await?;
  Ok(Envelope::ok(license))
}

#[derive(Debug, Default, Deserialize)]
pub struct RevokeBody {
  pub reason: Option<String>,
}

/// `POST …/licenses/{lid}/revoke`
///
/// Optional body `{"reason": "…"}`.
pub async fn revoke<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath(path): ApiPath<LicensePath>,
  body: Bytes,
) -> Result<Envelope<License>> {
  let body: RevokeBody = optional_json(&body)?;
  let (c, s, l) = refs(&path);
  let license = state
    .plane
    .accountant
    .revoke(&ctx, &c, &s, &l, body.reason)
    .await?;
  Ok(Envelope::ok(license))
}

// ─── Allocations ─────────────────────────────────────────────────────────────

/// `POST …/licenses/{lid}/allocate`
pub async fn allocate<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath(path): ApiPath<LicensePath>,
  ApiJson(request): ApiJson<AllocationRequest>,
) -> Result<Envelope<LicenseAllocation>> {
  let (c, s, l) = refs(&path);
  let allocation = state
    .plane
    .accountant
    .allocate(&ctx, &c, &s, &l, request)
    .await?;
  Ok(Envelope::created(allocation))
}

/// `GET …/licenses/{lid}/allocations[?status=]`
pub async fn list_allocations<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  ApiPath(path): ApiPath<LicensePath>,
  ApiQuery(filter): ApiQuery<AllocationFilter>,
) -> Result<Envelope<Vec<LicenseAllocation>>> {
  let (c, s, l) = refs(&path);
  let allocations = state
    .plane
    .accountant
    .list_allocations(&c, &s, &l, filter.status)
    .await?;
  Ok(Envelope::ok(allocations))
}

/// `POST …/licenses/{lid}/allocations/{aid}/release`
pub async fn release<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath((cid, sid, lid, aid)): ApiPath<(String, String, String, String)>,
) -> Result<Envelope<LicenseAllocation>> {
  let (c, s, l) = refs(&(cid, sid, lid));
  let allocation = state
    .plane
    .accountant
    .release(&ctx, &c, &s, &l, &EntityRef::parse(&aid))
    .await?;
  Ok(Envelope::ok(allocation))
}

/// `GET …/licenses/{lid}/utilization`
pub async fn utilization<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  ApiPath(path): ApiPath<LicensePath>,
) -> Result<Envelope<Utilization>> {
  let (c, s, l) = refs(&path);
  // Scope the license to its customer and subscription before reporting.
  let license = state.plane.accountant.get_license(&c, &s, &l).await?;
  let usage = state
    .plane
    .accountant
    .utilization(&EntityRef::Id(license.id))
    .await?;
  Ok(Envelope::ok(usage))
}
