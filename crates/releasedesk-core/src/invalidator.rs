//! Keeps the pending-updates cache coherent with releases and deployment
//! edits.

use std::sync::Arc;

use crate::{
  cache::deployment_key,
  resolver::UpdateCache,
  signal::{ChangeListener, ChangeSignal},
};

#[derive(Debug, Clone)]
pub struct CacheInvalidator {
  cache: Arc<UpdateCache>,
}

impl CacheInvalidator {
  pub fn new(cache: Arc<UpdateCache>) -> Self { Self { cache } }
}

impl ChangeListener for CacheInvalidator {
  fn notify(&self, signal: &ChangeSignal) {
    match signal {
      ChangeSignal::VersionReleased { product_id } => {
        let evicted = self.cache.evict_tag(product_id);
        tracing::info!(product = %product_id, evicted, "invalidated pending updates");
      }
      ChangeSignal::DeploymentChanged { deployment, product_id } => {
        let evicted = self.cache.evict(&deployment_key(*deployment));
        tracing::debug!(%deployment, product = %product_id, evicted, "invalidated deployment updates");
      }
    }
  }
}
