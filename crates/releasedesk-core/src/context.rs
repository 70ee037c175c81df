//! Caller identity and per-request deadline.

use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::{Error, Result};

/// The user id recorded when a request carries no identity headers.
pub const ANONYMOUS: &str = "anonymous";

/// The identity of whoever triggered an operation. Headers are trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
  pub user_id: String,
  pub email:   Option<String>,
}

impl Actor {
  pub fn new(user_id: impl Into<String>, email: Option<String>) -> Self {
    Self { user_id: user_id.into(), email }
  }

  pub fn anonymous() -> Self { Self::new(ANONYMOUS, None) }

  /// Identity used by background jobs such as the license-expiry sweep.
  pub fn system() -> Self { Self::new("system", None) }
}

impl Default for Actor {
  fn default() -> Self { Self::anonymous() }
}

/// Everything an engine needs to know about the calling request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
  pub actor:    Actor,
  /// Absolute deadline; `None` means the operation may wait indefinitely.
  pub deadline: Option<Instant>,
}

impl RequestContext {
  pub fn new(actor: Actor) -> Self { Self { actor, deadline: None } }

  pub fn system() -> Self { Self::new(Actor::system()) }

  /// Set the deadline to `timeout` from now.
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.deadline = Some(Instant::now() + timeout);
    self
  }

  pub fn user_id(&self) -> &str { &self.actor.user_id }

  /// Fail with [`Error::Cancelled`] if the deadline has already passed.
  pub fn check_deadline(&self) -> Result<()> {
    match self.deadline {
      Some(deadline) if Instant::now() >= deadline => Err(Error::Cancelled),
      _ => Ok(()),
    }
  }

  /// Await `fut`, giving up with [`Error::Cancelled`] once the deadline
  /// passes. Used for waits that precede a critical section.
  pub async fn before_deadline<F: Future>(&self, fut: F) -> Result<F::Output> {
    match self.deadline {
      Some(deadline) => tokio::time::timeout_at(deadline, fut)
        .await
        .map_err(|_| Error::Cancelled),
      None => Ok(fut.await),
    }
  }
}
