//! [`FleetStore`] for [`SqliteStore`].

use releasedesk_core::{
  fleet::{Customer, Deployment, Tenant},
  query::{CustomerFilter, DeploymentFilter, EntityRef, Page, PageRequest},
  store::FleetStore,
};
use uuid::Uuid;

use crate::{
  Result, SqliteStore,
  encode::{Where, text},
};

impl FleetStore for SqliteStore {
  // ── Customers ─────────────────────────────────────────────────────────────

  async fn insert_customer(&self, customer: Customer) -> Result<Customer> {
    self.insert_doc(customer).await
  }

  async fn get_customer(&self, customer: &EntityRef) -> Result<Option<Customer>> {
    self.get_by_ref(customer).await
  }

  async fn list_customers(
    &self,
    filter: &CustomerFilter,
    page: PageRequest,
  ) -> Result<Page<Customer>> {
    let w = Where::new()
      .eq("status", filter.status.map(|s| s.as_str()))
      .contains_any(
        &["name", "customer_id", "organization"],
        filter.search.as_deref(),
      );
    self.fetch_page(w.sql(), w.into_params(), "customer_id", page).await
  }

  async fn update_customer(&self, customer: Customer) -> Result<Customer> {
    self.update_doc(customer).await
  }

  async fn delete_customer(&self, id: Uuid) -> Result<bool> {
    self
      .delete_where(
        "customers",
        id,
        "NOT EXISTS (SELECT 1 FROM tenants t
                      WHERE t.customer_id = customers.customer_id)",
      )
      .await
  }

  // ── Tenants ───────────────────────────────────────────────────────────────

  async fn insert_tenant(&self, tenant: Tenant) -> Result<Tenant> {
    self.insert_doc(tenant).await
  }

  async fn get_tenant(&self, tenant: &EntityRef) -> Result<Option<Tenant>> {
    self.get_by_ref(tenant).await
  }

  async fn list_tenants(&self, customer_id: &str) -> Result<Vec<Tenant>> {
    self
      .fetch_all(
        "SELECT doc FROM tenants WHERE customer_id = ?1 ORDER BY tenant_id"
          .to_owned(),
        vec![text(customer_id)],
      )
      .await
  }

  async fn count_tenants(&self, customer_id: &str) -> Result<u64> {
    self
      .count(
        "SELECT COUNT(*) FROM tenants WHERE customer_id = ?1".to_owned(),
        vec![text(customer_id)],
      )
      .await
  }

  async fn update_tenant(&self, tenant: Tenant) -> Result<Tenant> {
    self.update_doc(tenant).await
  }

  async fn delete_tenant(&self, id: Uuid) -> Result<bool> {
    self
      .delete_where(
        "tenants",
        id,
        "NOT EXISTS (SELECT 1 FROM deployments d
                      WHERE d.tenant_id = tenants.tenant_id)",
      )
      .await
  }

  // ── Deployments ───────────────────────────────────────────────────────────

  async fn insert_deployment(&self, deployment: Deployment) -> Result<Deployment> {
    self.insert_doc(deployment).await
  }

  async fn get_deployment(
    &self,
    deployment: &EntityRef,
  ) -> Result<Option<Deployment>> {
    self.get_by_ref(deployment).await
  }

  async fn list_deployments(
    &self,
    filter: &DeploymentFilter,
  ) -> Result<Vec<Deployment>> {
    let w = Where::new()
      .eq("customer_id", filter.customer_id.as_deref())
      .eq("tenant_id", filter.tenant_id.as_deref())
      .eq("product_id", filter.product_id.as_deref())
      .eq("deployment_type", filter.deployment_type.map(|t| t.as_str()))
      .eq("status", filter.status.map(|s| s.as_str()));
    let sql = format!("SELECT doc FROM deployments{} ORDER BY deployment_id", w.sql());
    self.fetch_all(sql, w.into_params()).await
  }

  async fn count_deployments(&self, tenant_id: &str) -> Result<u64> {
    self
      .count(
        "SELECT COUNT(*) FROM deployments WHERE tenant_id = ?1".to_owned(),
        vec![text(tenant_id)],
      )
      .await
  }

  async fn update_deployment(&self, deployment: Deployment) -> Result<Deployment> {
    self.update_doc(deployment).await
  }

  async fn delete_deployment(&self, id: Uuid) -> Result<bool> {
    self.delete_where("deployments", id, "1 = 1").await
  }
}
