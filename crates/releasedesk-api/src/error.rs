//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every failure leaves the API as `{success:false, error:{code, message}}`
//! with a status derived from the error kind.

use axum::{
  Json,
  extract::{
    multipart::MultipartError,
    rejection::{JsonRejection, PathRejection, QueryRejection},
  },
  http::StatusCode,
  response::{IntoResponse, Response},
};
use releasedesk_core::Error as CoreError;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Core(#[from] CoreError),

  #[error("{0}")]
  BadRequest(String),

  #[error("no route for {0}")]
  RouteNotFound(String),

  #[error("method not allowed")]
  MethodNotAllowed,

  #[error("package storage error: {0}")]
  Storage(#[from] std::io::Error),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      Self::Core(e) => core_status(e),
      Self::BadRequest(_) => StatusCode::BAD_REQUEST,
      Self::RouteNotFound(_) => StatusCode::NOT_FOUND,
      Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
      Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  pub fn code(&self) -> &'static str {
    match self {
      Self::Core(e) => e.code(),
      Self::BadRequest(_) => "INVALID_REQUEST",
      Self::RouteNotFound(_) => "NOT_FOUND",
      Self::MethodNotAllowed => "METHOD_NOT_ALLOWED",
      Self::Storage(_) => "INTERNAL",
    }
  }
}

fn core_status(e: &CoreError) -> StatusCode {
  match e {
    CoreError::InvalidRequest(_)
    | CoreError::InvalidState(_)
    | CoreError::InsufficientSeats { .. }
    | CoreError::LicenseExpired(_)
    | CoreError::LicenseNotActive(_)
    | CoreError::ProductMismatch { .. }
    | CoreError::AlreadyReleased(_) => StatusCode::BAD_REQUEST,
    CoreError::NotFound(_) => StatusCode::NOT_FOUND,
    CoreError::Conflict(_)
    | CoreError::HasAllocations(_)
    | CoreError::HasDependents(_) => StatusCode::CONFLICT,
    CoreError::Cancelled => StatusCode::REQUEST_TIMEOUT,
    CoreError::Serialization(_) | CoreError::Internal(_) => {
      StatusCode::INTERNAL_SERVER_ERROR
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
      tracing::error!(error = %self, "request failed");
      "internal server error".to_owned()
    } else {
      self.to_string()
    };
    let body = json!({
      "success": false,
      "error": { "code": self.code(), "message": message },
    });
    (status, Json(body)).into_response()
  }
}

// ─── Extractor rejections ────────────────────────────────────────────────────

impl From<JsonRejection> for ApiError {
  fn from(r: JsonRejection) -> Self { Self::BadRequest(r.body_text()) }
}

impl From<QueryRejection> for ApiError {
  fn from(r: QueryRejection) -> Self { Self::BadRequest(r.body_text()) }
}

impl From<PathRejection> for ApiError {
  fn from(r: PathRejection) -> Self { Self::BadRequest(r.body_text()) }
}

impl From<MultipartError> for ApiError {
  fn from(e: MultipartError) -> Self { Self::BadRequest(e.body_text()) }
}

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn core_kinds_map_to_statuses() {
    let cases = [
      (CoreError::NotFound("x".into()), StatusCode::NOT_FOUND),
      (CoreError::Conflict("x".into()), StatusCode::CONFLICT),
      (CoreError::HasDependents("x".into()), StatusCode::CONFLICT),
      (
        CoreError::InsufficientSeats { requested: 2, available: 1 },
        StatusCode::BAD_REQUEST,
      ),
      (CoreError::Cancelled, StatusCode::REQUEST_TIMEOUT),
      (CoreError::internal("boom"), StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (e, status) in cases {
      assert_eq!(ApiError::from(e).status(), status);
    }
  }

  #[test]
  fn method_not_allowed_has_its_own_code() {
    let e = ApiError::MethodNotAllowed;
    assert_eq!(e.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(e.code(), "METHOD_NOT_ALLOWED");
  }
}
