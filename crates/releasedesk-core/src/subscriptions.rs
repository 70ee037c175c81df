//! Customer subscriptions, the containers licenses are assigned under.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
  Error, Result,
  audit::{AuditEntry, AuditSink},
  context::RequestContext,
  error::StoreResultExt,
  fleet::Customer,
  license::{NewSubscription, Subscription, SubscriptionPatch, SubscriptionStatus},
  query::{EntityRef, generate_key},
  store::Store,
};

pub struct Subscriptions<S> {
  store: Arc<S>,
  audit: Arc<dyn AuditSink>,
}

impl<S> Clone for Subscriptions<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), audit: self.audit.clone() }
  }
}

impl<S: Store> Subscriptions<S> {
  pub fn new(store: Arc<S>, audit: Arc<dyn AuditSink>) -> Self {
    Self { store, audit }
  }

  async fn customer(&self, customer: &EntityRef) -> Result<Customer> {
    self
      .store
      .get_customer(customer)
      .await
      .or_store()?
      .ok_or_else(|| Error::NotFound(format!("customer {customer}")))
  }

  pub async fn get_subscription(
    &self,
    customer: &EntityRef,
    subscription: &EntityRef,
  ) -> Result<Subscription> {
    let customer = self.customer(customer).await?;
    self
      .store
      .get_subscription(subscription)
      .await
      .or_store()?
      .filter(|s| s.customer_id == customer.customer_id)
      .ok_or_else(|| Error::NotFound(format!("subscription {subscription}")))
  }

  pub async fn list_subscriptions(
    &self,
    customer: &EntityRef,
  ) -> Result<Vec<Subscription>> {
    let customer = self.customer(customer).await?;
    self
      .store
      .list_subscriptions(&customer.customer_id)
      .await
      .or_store()
  }

  pub async fn create_subscription(
    &self,
    ctx: &RequestContext,
    customer: &EntityRef,
    input: NewSubscription,
  ) -> Result<Subscription> {
    ctx.check_deadline()?;
    if input.name.trim().is_empty() {
      return Err(Error::InvalidRequest("name is required".into()));
    }
    let now = Utc::now();
    let start_date = input.start_date.unwrap_or(now);
    if input.end_date.is_some_and(|end| end < start_date) {
      return Err(Error::InvalidRequest("end_date is before start_date".into()));
    }
    let customer = self.customer(customer).await?;

    let subscription_id =
      input.subscription_id.unwrap_or_else(|| generate_key("SUB"));
    let key = EntityRef::Key(subscription_id.clone());
    if self.store.get_subscription(&key).await.or_store()?.is_some() {
      return Err(Error::Conflict(format!(
        "subscription {subscription_id} already exists"
      )));
    }

    let subscription = Subscription {
      id: Uuid::new_v4(),
      subscription_id,
      customer_id: customer.customer_id,
      name: input.name,
      description: input.description,
      start_date,
      end_date: input.end_date,
      status: SubscriptionStatus::Active,
      created_by: ctx.user_id().to_owned(),
      created_at: now,
      updated_at: now,
    };
    let subscription =
      self.store.insert_subscription(subscription).await.or_store()?;

    tracing::info!(
      customer = %subscription.customer_id,
      subscription = %subscription.subscription_id,
      "created subscription"
    );
    self.audit.record(AuditEntry::new(
      ctx,
      "subscription.create",
      "subscription",
      &subscription.subscription_id,
    ));
    Ok(subscription)
  }

  pub async fn update_subscription(
    &self,
    ctx: &RequestContext,
    customer: &EntityRef,
    subscription: &EntityRef,
    patch: SubscriptionPatch,
  ) -> Result<Subscription> {
    ctx.check_deadline()?;
    let mut subscription = self.get_subscription(customer, subscription).await?;
    patch.apply(&mut subscription);
    if subscription
      .end_date
      .is_some_and(|end| end < subscription.start_date)
    {
      return Err(Error::InvalidRequest("end_date is before start_date".into()));
    }
    let subscription =
      self.store.update_subscription(subscription).await.or_store()?;

    self.audit.record(AuditEntry::new(
      ctx,
      "subscription.update",
      "subscription",
      &subscription.subscription_id,
    ));
    Ok(subscription)
  }

  /// Refused with [`Error::HasDependents`] while licenses remain.
  pub async fn delete_subscription(
    &self,
    ctx: &RequestContext,
    customer: &EntityRef,
    subscription: &EntityRef,
  ) -> Result<()> {
    ctx.check_deadline()?;
    let subscription = self.get_subscription(customer, subscription).await?;
    let licenses = self
      .store
      .count_licenses(&subscription.subscription_id)
      .await
      .or_store()?;
    if licenses > 0
      || !self
        .store
        .delete_subscription(subscription.id)
        .await
        .or_store()?
    {
      return Err(Error::HasDependents(format!(
        "subscription {}",
        subscription.subscription_id
      )));
    }

    tracing::info!(subscription = %subscription.subscription_id, "deleted subscription");
    self.audit.record(AuditEntry::new(
      ctx,
      "subscription.delete",
      "subscription",
      &subscription.subscription_id,
    ));
    Ok(())
  }
}
