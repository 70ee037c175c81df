//! Route handlers, one module per resource family.
//!
//! Every handler is generic over the [`releasedesk_core::store::Store`] and
//! answers with an [`crate::envelope::Envelope`] or an
//! [`crate::ApiError`].

pub mod compat;
pub mod customers;
pub mod deployments;
pub mod licensing;
pub mod products;
pub mod rollouts;
pub mod versions;

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};

use crate::{envelope::Envelope, error::ApiError};

#[derive(Debug, Serialize)]
pub struct Health {
  pub status: &'static str,
}

/// `GET /health`
pub async fn health() -> Envelope<Health> { Envelope::ok(Health { status: "ok" }) }

/// Parse an optional JSON body: an empty body yields `T::default()`.
pub(crate) fn optional_json<T: DeserializeOwned + Default>(
  body: &Bytes,
) -> Result<T, ApiError> {
  if body.iter().all(u8::is_ascii_whitespace) {
    return Ok(T::default());
  }
  serde_json::from_slice(body)
    .map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))
}
