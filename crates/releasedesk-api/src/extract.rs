//! Request extractors whose rejections use the API error envelope, plus the
//! caller identity.

use std::{convert::Infallible, sync::Arc};

use axum::{
  extract::{FromRequest, FromRequestParts},
  http::{HeaderMap, request::Parts},
};
use releasedesk_core::{Actor, RequestContext, query::PageRequest, store::Store};
use serde::Deserialize;

use crate::{AppState, error::ApiError};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

// ─── Caller ──────────────────────────────────────────────────────────────────

/// The [`RequestContext`] of the current request: identity from
/// `X-User-ID` / `X-User-Email` (trusted, `anonymous` when absent) and a
/// deadline of `request_timeout` from now.
pub struct Caller(pub RequestContext);

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
  headers
    .get(name)
    .and_then(|v| v.to_str().ok())
    .map(str::trim)
    .filter(|v| !v.is_empty())
    .map(str::to_owned)
}

pub fn actor_from_headers(headers: &HeaderMap) -> Actor {
  match header_str(headers, USER_ID_HEADER) {
    Some(user_id) => Actor::new(user_id, header_str(headers, USER_EMAIL_HEADER)),
    None => Actor::anonymous(),
  }
}

impl<S: Store> FromRequestParts<Arc<AppState<S>>> for Caller {
  type Rejection = Infallible;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &Arc<AppState<S>>,
  ) -> Result<Self, Self::Rejection> {
    let ctx = RequestContext::new(actor_from_headers(&parts.headers))
      .with_timeout(state.request_timeout);
    Ok(Self(ctx))
  }
}

// ─── Pagination ──────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
  pub page:  Option<i64>,
  pub limit: Option<i64>,
}

impl PageQuery {
  pub fn with_default(&self, default_limit: u32) -> PageRequest {
    PageRequest::new(self.page, self.limit, default_limit)
  }
}
