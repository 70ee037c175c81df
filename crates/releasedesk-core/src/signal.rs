//! Change signals between engines.
//!
//! The lifecycle engine and the deployment registry emit signals
//! synchronously; listeners (the cache invalidator) run before the emitting
//! call returns, so the next read after a release observes the eviction.

use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSignal {
  /// A version of `product_id` entered or left the candidate set (release,
  /// deprecation, end of life).
  VersionReleased { product_id: String },
  /// A deployment was created, updated or deleted.
  DeploymentChanged { deployment: Uuid, product_id: String },
}

pub trait ChangeListener: Send + Sync {
  fn notify(&self, signal: &ChangeSignal);
}

/// Fan-out to every subscribed listener. Cloning shares the subscriber list.
#[derive(Clone, Default)]
pub struct Signals {
  listeners: Arc<RwLock<Vec<Arc<dyn ChangeListener>>>>,
}

impl Signals {
  pub fn new() -> Self { Self::default() }

  pub fn subscribe(&self, listener: Arc<dyn ChangeListener>) {
    self.listeners.write().push(listener);
  }

  pub fn emit(&self, signal: ChangeSignal) {
    tracing::debug!(?signal, "emitting change signal");
    for listener in self.listeners.read().iter() {
      listener.notify(&signal);
    }
  }
}

impl std::fmt::Debug for Signals {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Signals")
      .field("listeners", &self.listeners.read().len())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use parking_lot::Mutex;

  use super::*;

  #[derive(Default)]
  struct Recorder(Mutex<Vec<ChangeSignal>>);

  impl ChangeListener for Recorder {
    fn notify(&self, signal: &ChangeSignal) { self.0.lock().push(signal.clone()); }
  }

  #[test]
  fn every_listener_sees_every_signal() {
    let signals = Signals::new();
    let a = Arc::new(Recorder::default());
    let b = Arc::new(Recorder::default());
    signals.subscribe(a.clone());
    signals.clone().subscribe(b.clone());

    signals.emit(ChangeSignal::VersionReleased { product_id: "p1".into() });

    assert_eq!(a.0.lock().len(), 1);
    assert_eq!(b.0.lock().len(), 1);
  }
}
