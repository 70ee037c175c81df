//! The deployment registry: customers, their tenants and the deployments
//! those tenants run.
//!
//! Children are always addressed through their parents; a tenant that exists
//! but belongs to another customer is reported as not found. Every deployment
//! mutation emits [`ChangeSignal::DeploymentChanged`].

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::{
  Error, Result,
  audit::{AuditEntry, AuditSink},
  context::RequestContext,
  error::StoreResultExt,
  fleet::{
    Customer, CustomerPatch, CustomerStatus, DeleteOutcome, Deployment,
    DeploymentPatch, DeploymentStatus, NewCustomer, NewDeployment, NewTenant,
    Tenant, TenantPatch, TenantStatus,
  },
  query::{CustomerFilter, DeploymentFilter, EntityRef, Page, PageRequest, generate_key},
  semver::VersionNumber,
  signal::{ChangeSignal, Signals},
  store::Store,
};

pub struct DeploymentRegistry<S> {
  store:   Arc<S>,
  audit:   Arc<dyn AuditSink>,
  signals: Signals,
}

impl<S> Clone for DeploymentRegistry<S> {
  fn clone(&self) -> Self {
    Self {
      store:   self.store.clone(),
      audit:   self.audit.clone(),
      signals: self.signals.clone(),
    }
  }
}

fn require_name(name: &str) -> Result<()> {
  if name.trim().is_empty() {
    Err(Error::InvalidRequest("name is required".into()))
  } else {
    Ok(())
  }
}

impl<S: Store> DeploymentRegistry<S> {
  pub fn new(store: Arc<S>, audit: Arc<dyn AuditSink>, signals: Signals) -> Self {
    Self { store, audit, signals }
  }

  // ─── Customers ─────────────────────────────────────────────────────────

  pub async fn get_customer(&self, customer: &EntityRef) -> Result<Customer> {
    self
      .store
      .get_customer(customer)
      .await
      .or_store()?
      .ok_or_else(|| Error::NotFound(format!("customer {customer}")))
  }

  pub async fn list_customers(
    &self,
    filter: &CustomerFilter,
    page: PageRequest,
  ) -> Result<Page<Customer>> {
    self.store.list_customers(filter, page).await.or_store()
  }

  pub async fn create_customer(
    &self,
    ctx: &RequestContext,
    input: NewCustomer,
  ) -> Result<Customer> {
    ctx.check_deadline()?;
    require_name(&input.name)?;
    let customer_id = input.customer_id.unwrap_or_else(|| generate_key("CUST"));
    let key = EntityRef::Key(customer_id.clone());
    if self.store.get_customer(&key).await.or_store()?.is_some() {
      return Err(Error::Conflict(format!("customer {customer_id} already exists")));
    }

    let now = Utc::now();
    let customer = Customer {
      id: Uuid::new_v4(),
      customer_id,
      name: input.name,
      email: input.email,
      organization: input.organization,
      account_manager: input.account_manager,
      status: CustomerStatus::Active,
      created_by: ctx.user_id().to_owned(),
      created_at: now,
      updated_at: now,
    };
    let customer = self.store.insert_customer(customer).await.or_store()?;

    tracing::info!(customer = %customer.customer_id, "created customer");
    self.audit.record(AuditEntry::new(
      ctx,
      "customer.create",
      "customer",
      &customer.customer_id,
    ));
    Ok(customer)
  }

  pub async fn update_customer(
    &self,
    ctx: &RequestContext,
    customer: &EntityRef,
    patch: CustomerPatch,
  ) -> Result<Customer> {
    ctx.check_deadline()?;
    if let Some(name) = &patch.name {
      require_name(name)?;
    }
    let mut customer = self.get_customer(customer).await?;
    patch.apply(&mut customer);
    let customer = self.store.update_customer(customer).await.or_store()?;

    self.audit.record(AuditEntry::new(
      ctx,
      "customer.update",
      "customer",
      &customer.customer_id,
    ));
    Ok(customer)
  }

  /// Hard-delete a customer without tenants; otherwise mark it inactive.
  pub async fn delete_customer(
    &self,
    ctx: &RequestContext,
    customer: &EntityRef,
  ) -> Result<DeleteOutcome> {
    ctx.check_deadline()?;
    let mut customer = self.get_customer(customer).await?;
    let tenants = self.store.count_tenants(&customer.customer_id).await.or_store()?;

    let outcome = if tenants == 0
      && self.store.delete_customer(customer.id).await.or_store()?
    {
      DeleteOutcome::Deleted
    } else {
      customer.status = CustomerStatus::Inactive;
      customer = self.store.update_customer(customer).await.or_store()?;
      DeleteOutcome::Deactivated
    };

    tracing::info!(customer = %customer.customer_id, ?outcome, "deleted customer");
    self.audit.record(
      AuditEntry::new(ctx, "customer.delete", "customer", &customer.customer_id)
        .with_details(json!({ "outcome": outcome })),
    );
    Ok(outcome)
  }

  // ─── Tenants ───────────────────────────────────────────────────────────

  pub async fn get_tenant(
    &self,
    customer: &EntityRef,
    tenant: &EntityRef,
  ) -> Result<Tenant> {
    let customer = self.get_customer(customer).await?;
    self.tenant_of(&customer, tenant).await
  }

  async fn tenant_of(&self, customer: &Customer, tenant: &EntityRef) -> Result<Tenant> {
    self
      .store
      .get_tenant(tenant)
      .await
      .or_store()?
      .filter(|t| t.customer_id == customer.customer_id)
      .ok_or_else(|| Error::NotFound(format!("tenant {tenant}")))
  }

  pub async fn list_tenants(&self, customer: &EntityRef) -> Result<Vec<Tenant>> {
    let customer = self.get_customer(customer).await?;
    self.store.list_tenants(&customer.customer_id).await.or_store()
  }

  pub async fn create_tenant(
    &self,
    ctx: &RequestContext,
    customer: &EntityRef,
    input: NewTenant,
  ) -> Result<Tenant> {
    ctx.check_deadline()?;
    require_name(&input.name)?;
    let customer = self.get_customer(customer).await?;
    let tenant_id = input.tenant_id.unwrap_or_else(|| generate_key("TEN"));
    let key = EntityRef::Key(tenant_id.clone());
    if self.store.get_tenant(&key).await.or_store()?.is_some() {
      return Err(Error::Conflict(format!("tenant {tenant_id} already exists")));
    }

    let now = Utc::now();
    let tenant = Tenant {
      id: Uuid::new_v4(),
      tenant_id,
      customer_id: customer.customer_id,
      name: input.name,
      description: input.description,
      status: TenantStatus::Active,
      created_by: ctx.user_id().to_owned(),
      created_at: now,
      updated_at: now,
    };
    let tenant = self.store.insert_tenant(tenant).await.or_store()?;

    tracing::info!(customer = %tenant.customer_id, tenant = %tenant.tenant_id, "created tenant");
    self.audit.record(
      AuditEntry::new(ctx, "tenant.create", "tenant", &tenant.tenant_id)
        .with_details(json!({ "customer_id": tenant.customer_id })),
    );
    Ok(tenant)
  }

  pub async fn update_tenant(
    &self,
    ctx: &RequestContext,
    customer: &EntityRef,
    tenant: &EntityRef,
    patch: TenantPatch,
  ) -> Result<Tenant> {
    ctx.check_deadline()?;
    if let Some(name) = &patch.name {
      require_name(name)?;
    }
    let mut tenant = self.get_tenant(customer, tenant).await?;
    patch.apply(&mut tenant);
    let tenant = self.store.update_tenant(tenant).await.or_store()?;

    self
      .audit
      .record(AuditEntry::new(ctx, "tenant.update", "tenant", &tenant.tenant_id));
    Ok(tenant)
  }

  /// Refused with [`Error::HasDependents`] while the tenant has deployments.
  pub async fn delete_tenant(
    &self,
    ctx: &RequestContext,
    customer: &EntityRef,
    tenant: &EntityRef,
  ) -> Result<()> {
    ctx.check_deadline()?;
    let tenant = self.get_tenant(customer, tenant).await?;
    let deployments = self.store.count_deployments(&tenant.tenant_id).await.or_store()?;
    if deployments > 0 || !self.store.delete_tenant(tenant.id).await.or_store()? {
      return Err(Error::HasDependents(format!("tenant {}", tenant.tenant_id)));
    }

    tracing::info!(tenant = %tenant.tenant_id, "deleted tenant");
    self
      .audit
      .record(AuditEntry::new(ctx, "tenant.delete", "tenant", &tenant.tenant_id));
    Ok(())
  }

  // ─── Deployments ───────────────────────────────────────────────────────

  pub async fn get_deployment(
    &self,
    customer: &EntityRef,
    tenant: &EntityRef,
    deployment: &EntityRef,
  ) -> Result<Deployment> {
    let tenant = self.get_tenant(customer, tenant).await?;
    self.deployment_of(&tenant, deployment).await
  }

  async fn deployment_of(
    &self,
    tenant: &Tenant,
    deployment: &EntityRef,
  ) -> Result<Deployment> {
    self
      .store
      .get_deployment(deployment)
      .await
      .or_store()?
      .filter(|d| d.tenant_id == tenant.tenant_id)
      .ok_or_else(|| Error::NotFound(format!("deployment {deployment}")))
  }

  /// Deployments of one tenant; the filter's customer and tenant fields are
  /// overridden by the path.
  pub async fn list_deployments(
    &self,
    customer: &EntityRef,
    tenant: &EntityRef,
    filter: DeploymentFilter,
  ) -> Result<Vec<Deployment>> {
    let tenant = self.get_tenant(customer, tenant).await?;
    let filter = DeploymentFilter {
      customer_id: Some(tenant.customer_id),
      tenant_id: Some(tenant.tenant_id),
      ..filter
    };
    self.store.list_deployments(&filter).await.or_store()
  }

  /// A referenced license must exist and cover the deployment's product.
  async fn check_license(&self, license_id: &str, product_id: &str) -> Result<()> {
    let license = self
      .store
      .get_license(&EntityRef::parse(license_id))
      .await
      .or_store()?
      .ok_or_else(|| Error::NotFound(format!("license {license_id}")))?;
    if license.product_id != product_id {
      return Err(Error::ProductMismatch {
        license:    license.product_id,
        deployment: product_id.to_owned(),
      });
    }
    Ok(())
  }

  pub async fn create_deployment(
    &self,
    ctx: &RequestContext,
    customer: &EntityRef,
    tenant: &EntityRef,
    input: NewDeployment,
  ) -> Result<Deployment> {
    ctx.check_deadline()?;
    VersionNumber::parse(&input.installed_version)?;
    let tenant = self.get_tenant(customer, tenant).await?;
    if self.store.get_product(&input.product_id).await.or_store()?.is_none() {
      return Err(Error::NotFound(format!("product {}", input.product_id)));
    }
    if let Some(license_id) = &input.license_id {
      self.check_license(license_id, &input.product_id).await?;
    }

    let clash = DeploymentFilter {
      tenant_id: Some(tenant.tenant_id.clone()),
      product_id: Some(input.product_id.clone()),
      deployment_type: Some(input.deployment_type),
      ..Default::default()
    };
    if !self.store.list_deployments(&clash).await.or_store()?.is_empty() {
      return Err(Error::Conflict(format!(
        "tenant {} already has a {} deployment of {}",
        tenant.tenant_id,
        input.deployment_type.as_str(),
        input.product_id
      )));
    }

    let now = Utc::now();
    let deployment = Deployment {
      id: Uuid::new_v4(),
      deployment_id: input.deployment_id.unwrap_or_else(|| generate_key("DEP")),
      customer_id: tenant.customer_id,
      tenant_id: tenant.tenant_id,
      product_id: input.product_id,
      deployment_type: input.deployment_type,
      installed_version: input.installed_version,
      number_of_users: input.number_of_users,
      license_id: input.license_id,
      server_hostname: input.server_hostname,
      notes: input.notes,
      status: DeploymentStatus::Active,
      deployment_date: input.deployment_date.unwrap_or(now),
      last_updated_date: None,
      created_by: ctx.user_id().to_owned(),
      created_at: now,
      updated_at: now,
    };
    let deployment = self.store.insert_deployment(deployment).await.or_store()?;

    tracing::info!(
      deployment = %deployment.deployment_id,
      product = %deployment.product_id,
      version = %deployment.installed_version,
      "created deployment"
    );
    self.changed(&deployment);
    self.audit.record(
      AuditEntry::new(ctx, "deployment.create", "deployment", &deployment.deployment_id)
        .with_details(json!({
          "tenant_id": deployment.tenant_id,
          "product_id": deployment.product_id,
          "installed_version": deployment.installed_version,
        })),
    );
    Ok(deployment)
  }

  pub async fn update_deployment(
    &self,
    ctx: &RequestContext,
    customer: &EntityRef,
    tenant: &EntityRef,
    deployment: &EntityRef,
    patch: DeploymentPatch,
  ) -> Result<Deployment> {
    ctx.check_deadline()?;
    if let Some(v) = &patch.installed_version {
      VersionNumber::parse(v)?;
    }
    let mut deployment = self.get_deployment(customer, tenant, deployment).await?;
    if let Some(license_id) = &patch.license_id {
      self.check_license(license_id, &deployment.product_id).await?;
    }
    let previous = deployment.installed_version.clone();
    patch.apply(&mut deployment, Utc::now());
    let deployment = self.store.update_deployment(deployment).await.or_store()?;

    if deployment.installed_version != previous {
      tracing::info!(
        deployment = %deployment.deployment_id,
        from = %previous,
        to = %deployment.installed_version,
        "installed version changed"
      );
    }
    self.changed(&deployment);
    self.audit.record(
      AuditEntry::new(ctx, "deployment.update", "deployment", &deployment.deployment_id)
        .with_details(json!({
          "previous_version": previous,
          "installed_version": deployment.installed_version,
        })),
    );
    Ok(deployment)
  }

  /// Record that a deployment now runs `version`.
  pub async fn update_installed_version(
    &self,
    ctx: &RequestContext,
    customer: &EntityRef,
    tenant: &EntityRef,
    deployment: &EntityRef,
    version: String,
  ) -> Result<Deployment> {
    let patch = DeploymentPatch {
      installed_version: Some(version),
      ..Default::default()
    };
    self
      .update_deployment(ctx, customer, tenant, deployment, patch)
      .await
  }

  pub async fn delete_deployment(
    &self,
    ctx: &RequestContext,
    customer: &EntityRef,
    tenant: &EntityRef,
    deployment: &EntityRef,
  ) -> Result<()> {
    ctx.check_deadline()?;
    let deployment = self.get_deployment(customer, tenant, deployment).await?;
    if !self.store.delete_deployment(deployment.id).await.or_store()? {
      return Err(Error::NotFound(format!(
        "deployment {}",
        deployment.deployment_id
      )));
    }

    tracing::info!(deployment = %deployment.deployment_id, "deleted deployment");
    self.changed(&deployment);
    self.audit.record(AuditEntry::new(
      ctx,
      "deployment.delete",
      "deployment",
      &deployment.deployment_id,
    ));
    Ok(())
  }

  fn changed(&self, deployment: &Deployment) {
    self.signals.emit(ChangeSignal::DeploymentChanged {
      deployment: deployment.id,
      product_id: deployment.product_id.clone(),
    });
  }
}
