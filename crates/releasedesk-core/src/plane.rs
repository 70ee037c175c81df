//! One handle over every engine, sharing a store, an audit sink, the change
//! signals and the pending-updates cache.

use std::{sync::Arc, time::Duration};

use crate::{
  accountant::SeatAccountant,
  audit::{AuditSink, TracingAuditSink},
  cache::{DEFAULT_TTL, TtlCache},
  catalog::ProductCatalog,
  compatibility::Compatibility,
  invalidator::CacheInvalidator,
  lifecycle::VersionLifecycle,
  registry::DeploymentRegistry,
  resolver::UpdateResolver,
  rollouts::RolloutTracker,
  signal::Signals,
  store::Store,
  subscriptions::Subscriptions,
};

#[derive(Clone)]
pub struct ControlPlaneOptions {
  pub audit:     Arc<dyn AuditSink>,
  pub cache_ttl: Duration,
}

impl Default for ControlPlaneOptions {
  fn default() -> Self {
    Self { audit: Arc::new(TracingAuditSink), cache_ttl: DEFAULT_TTL }
  }
}

pub struct ControlPlane<S> {
  pub catalog:       ProductCatalog<S>,
  pub lifecycle:     VersionLifecycle<S>,
  pub compatibility: Compatibility<S>,
  pub registry:      DeploymentRegistry<S>,
  pub subscriptions: Subscriptions<S>,
  pub accountant:    SeatAccountant<S>,
  pub resolver:      UpdateResolver<S>,
  pub rollouts:      RolloutTracker<S>,
  pub signals:       Signals,
}

impl<S> Clone for ControlPlane<S> {
  fn clone(&self) -> Self {
    Self {
      catalog:       self.catalog.clone(),
      lifecycle:     self.lifecycle.clone(),
      compatibility: self.compatibility.clone(),
      registry:      self.registry.clone(),
      subscriptions: self.subscriptions.clone(),
      accountant:    self.accountant.clone(),
      resolver:      self.resolver.clone(),
      rollouts:      self.rollouts.clone(),
      signals:       self.signals.clone(),
    }
  }
}

impl<S: Store> ControlPlane<S> {
  pub fn new(store: Arc<S>, options: ControlPlaneOptions) -> Self {
    let ControlPlaneOptions { audit, cache_ttl } = options;
    let signals = Signals::new();
    let cache = Arc::new(TtlCache::new(cache_ttl));
    signals.subscribe(Arc::new(CacheInvalidator::new(cache.clone())));

    Self {
      catalog: ProductCatalog::new(store.clone(), audit.clone()),
      lifecycle: VersionLifecycle::new(
        store.clone(),
        audit.clone(),
        signals.clone(),
      ),
      compatibility: Compatibility::new(store.clone(), audit.clone()),
      registry: DeploymentRegistry::new(
        store.clone(),
        audit.clone(),
        signals.clone(),
      ),
      subscriptions: Subscriptions::new(store.clone(), audit.clone()),
      accountant: SeatAccountant::new(store.clone(), audit.clone()),
      resolver: UpdateResolver::new(store.clone(), cache),
      rollouts: RolloutTracker::new(store, audit),
      signals,
    }
  }
}
