//! Error type for `releasedesk-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// An update addressed a row that does not exist.
  #[error("no {table} row with id {id}")]
  Missing { table: &'static str, id: uuid::Uuid },
}

impl Error {
  /// `true` when a write was rejected by a `UNIQUE` or `PRIMARY KEY`
  /// constraint.
  pub fn is_unique_violation(&self) -> bool {
    let Self::Database(tokio_rusqlite::Error::Rusqlite(
      rusqlite::Error::SqliteFailure(failure, _),
    )) = self
    else {
      return false;
    };
    matches!(
      failure.extended_code,
      rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
  }
}

impl From<Error> for releasedesk_core::Error {
  fn from(e: Error) -> Self {
    if let Error::Missing { table, id } = &e {
      return releasedesk_core::Error::NotFound(format!("{table} {id}"));
    }
    if e.is_unique_violation() {
      let detail = match &e {
        Error::Database(tokio_rusqlite::Error::Rusqlite(
          rusqlite::Error::SqliteFailure(_, Some(msg)),
        )) => msg.clone(),
        _ => "duplicate record".to_owned(),
      };
      releasedesk_core::Error::Conflict(detail)
    } else {
      releasedesk_core::Error::internal(e)
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
