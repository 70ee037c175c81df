//! The success envelope: `{success:true, data, meta?}`.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use releasedesk_core::query::Page;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Meta {
  pub page:        u32,
  pub limit:       u32,
  pub total:       u64,
  pub total_pages: u64,
}

#[derive(Debug, Serialize)]
struct Body<T> {
  success: bool,
  data:    T,
  #[serde(skip_serializing_if = "Option::is_none")]
  meta:    Option<Meta>,
}

/// A successful response carrying `data`.
pub struct Envelope<T> {
  status: StatusCode,
  data:   T,
  meta:   Option<Meta>,
}

impl<T: Serialize> Envelope<T> {
  pub fn ok(data: T) -> Self { Self { status: StatusCode::OK, data, meta: None } }

  pub fn created(data: T) -> Self {
    Self { status: StatusCode::CREATED, data, meta: None }
  }
}

impl<T: Serialize> Envelope<Vec<T>> {
  pub fn page(page: Page<T>) -> Self {
    let meta = Meta {
      page:        page.page,
      limit:       page.limit,
      total:       page.total,
      total_pages: page.total_pages(),
    };
    Self { status: StatusCode::OK, data: page.items, meta: Some(meta) }
  }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
  fn into_response(self) -> Response {
    let body = Body { success: true, data: self.data, meta: self.meta };
    (self.status, Json(body)).into_response()
  }
}

/// Payload for deletes and other bodiless successes.
#[derive(Debug, Serialize)]
pub struct Message {
  pub message: String,
}

impl Message {
  pub fn new(message: impl Into<String>) -> Self { Self { message: message.into() } }
}
