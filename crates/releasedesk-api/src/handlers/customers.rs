//! Handlers for customers and their tenants.
//!
//! Path segments `{cid}` and `{tid}` accept either the surrogate id or the
//! business key.

use std::sync::Arc;

use axum::extract::State;
use releasedesk_core::{
  fleet::{
    Customer, CustomerPatch, DeleteOutcome, NewCustomer, NewTenant, Tenant,
    TenantPatch,
  },
  query::{CustomerFilter, EntityRef},
  store::Store,
};
use serde::Serialize;

use crate::{
  AppState,
  envelope::{Envelope, Message},
  error::Result,
  extract::{ApiJson, ApiPath, ApiQuery, Caller, PageQuery},
};

// ─── Customers ───────────────────────────────────────────────────────────────

/// `GET /customers[?status=&search=&page=&limit=]`
pub async fn list<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  ApiQuery(filter): ApiQuery<CustomerFilter>,
  ApiQuery(page): ApiQuery<PageQuery>,
) -> Result<Envelope<Vec<Customer>>> {
  let customers = state
    .plane
    .registry
    .list_customers(&filter, page.with_default(20))
    .await?;
  Ok(Envelope::page(customers))
}

/// `POST /customers`
pub async fn create<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiJson(input): ApiJson<NewCustomer>,
) -> Result<Envelope<Customer>> {
  Ok(Envelope::created(state.plane.registry.create_customer(&ctx, input).await?))
}

/// `GET /customers/{cid}`
pub async fn get_one<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  ApiPath(cid): ApiPath<String>,
) -> Result<Envelope<Customer>> {
  let customer = state.plane.registry.get_customer(&EntityRef::parse(&cid)).await?;
  Ok(Envelope::ok(customer))
}

/// `PUT /customers/{cid}`
pub async fn update<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath(cid): ApiPath<String>,
  ApiJson(patch): ApiJson<CustomerPatch>,
) -> Result<Envelope<Customer>> {
  let customer = state
    .plane
    .registry
    .update_customer(&ctx, &EntityRef::parse(&cid), patch)
    .await?;
  Ok(Envelope::ok(customer))
}

#[derive(Debug, Serialize)]
pub struct CustomerDeleted {
  pub customer_id: String,
  pub outcome:     DeleteOutcome,
}

/// `DELETE /customers/{cid}`
///
/// Soft-deletes while tenants exist.
pub async fn delete<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath(cid): ApiPath<String>,
) -> Result<Envelope<CustomerDeleted>> {
  let outcome = state
    .plane
    .registry
    .delete_customer(&ctx, &EntityRef::parse(&cid))
    .await?;
  Ok(Envelope::ok(CustomerDeleted { customer_id: cid, outcome }))
}

// ─── Tenants ─────────────────────────────────────────────────────────────────

/// `GET /customers/{cid}/tenants`
pub async fn list_tenants<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  ApiPath(cid): ApiPath<String>,
) -> Result<Envelope<Vec<Tenant>>> {
  let tenants = state.plane.registry.list_tenants(&EntityRef::parse(&cid)).await?;
  Ok(Envelope::ok(tenants))
}

/// `POST /customers/{cid}/tenants`
pub async fn create_tenant<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath(cid): ApiPath<String>,
  ApiJson(input): ApiJson<NewTenant>,
) -> Result<Envelope<Tenant>> {
  let tenant = state
    .plane
    .registry
    .create_tenant(&ctx, &EntityRef::parse(&cid), input)
    .await?;
  Ok(Envelope::created(tenant))
}

/// `GET /customers/{cid}/tenants/{tid}`
pub async fn get_tenant<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  ApiPath((cid, tid)): ApiPath<(String, String)>,
) -> Result<Envelope<Tenant>> {
  let tenant = state
    .plane
    .registry
    .get_tenant(&EntityRef::parse(&cid), &EntityRef::parse(&tid))
    .await?;
  Ok(Envelope::ok(tenant))
}

/// `PUT /customers/{cid}/tenants/{tid}`
pub async fn update_tenant<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath((cid, tid)): ApiPath<(String, String)>,
  ApiJson(patch): ApiJson<TenantPatch>,
) -> Result<Envelope<Tenant>> {
  let tenant = state
    .plane
    .registry
    .update_tenant(&ctx, &EntityRef::parse(&cid), &EntityRef::parse(&tid), patch)
    .await?;
  Ok(Envelope::ok(tenant))
}

/// `DELETE /customers/{cid}/tenants/{tid}`
///
/// 409 while deployments exist.
pub async fn delete_tenant<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath((cid, tid)): ApiPath<(String, String)>,
) -> Result<Envelope<Message>> {
  state
    .plane
    .registry
    .delete_tenant(&ctx, &EntityRef::parse(&cid), &EntityRef::parse(&tid))
    .await?;
  Ok(Envelope::ok(Message::new(format!("tenant {tid} deleted"))))
}
