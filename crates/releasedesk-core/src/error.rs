//! Error types for `releasedesk-core`.
//!
//! Every variant corresponds to one error kind of the public API; the HTTP
//! layer maps kinds to status codes and uses [`Error::code`] as the stable
//! machine-readable identifier.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid request: {0}")]
  InvalidRequest(String),

  #[error("invalid state: {0}")]
  InvalidState(String),

  #[error("{0} not found")]
  NotFound(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("insufficient seats: requested {requested}, available {available}")]
  InsufficientSeats { requested: u32, available: u32 },

  #[error("license {0} has active allocations")]
  HasAllocations(String),

  #[error("{0} still has dependent records")]
  HasDependents(String),

  #[error("license {0} has expired")]
  LicenseExpired(String),

  #[error("license {0} is not active")]
  LicenseNotActive(String),

  #[error(
    "product mismatch: license covers {license}, deployment runs {deployment}"
  )]
  ProductMismatch { license: String, deployment: String },

  #[error("allocation {0} is already released")]
  AlreadyReleased(String),

  #[error("operation cancelled: request deadline exceeded")]
  Cancelled,

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("internal error: {0}")]
  Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Wrap any backend failure as [`Error::Internal`].
  pub fn internal(
    e: impl Into<Box<dyn std::error::Error + Send + Sync>>,
  ) -> Self {
    Self::Internal(e.into())
  }

  /// Stable, upper-snake-case identifier for the error kind.
  pub fn code(&self) -> &'static str {
    match self {
      Self::InvalidRequest(_) => "INVALID_REQUEST",
      Self::InvalidState(_) => "INVALID_STATE",
      Self::NotFound(_) => "NOT_FOUND",
      Self::Conflict(_) => "CONFLICT",
      Self::InsufficientSeats { .. } => "INSUFFICIENT_SEATS",
      Self::HasAllocations(_) => "HAS_ALLOCATIONS",
      Self::HasDependents(_) => "HAS_DEPENDENTS",
      Self::LicenseExpired(_) => "LICENSE_EXPIRED",
      Self::LicenseNotActive(_) => "LICENSE_NOT_ACTIVE",
      Self::ProductMismatch { .. } => "PRODUCT_MISMATCH",
      Self::AlreadyReleased(_) => "ALREADY_RELEASED",
      Self::Cancelled => "CANCELLED",
      Self::Serialization(_) | Self::Internal(_) => "INTERNAL",
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Lift a backend result into the core error type.
///
/// Store traits expose their own error type; engines call `.or_store()?` to
/// funnel it through the `Into<Error>` conversion every backend provides.
pub(crate) trait StoreResultExt<T> {
  fn or_store(self) -> Result<T>;
}

impl<T, E: Into<Error>> StoreResultExt<T> for std::result::Result<T, E> {
  fn or_store(self) -> Result<T> { self.map_err(Into::into) }
}
