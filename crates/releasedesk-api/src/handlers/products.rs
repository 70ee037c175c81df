//! Handlers for `/products`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/products` | `?type=&is_active=&page=&limit=` |
//! | `POST` | `/products` | 409 on a duplicate `product_id` |
//! | `GET` `PUT` `DELETE` | `/products/{product_id}` | delete is refused while versions exist |
//! | `POST` | `/products/{product_id}/deactivate` | soft delete |

use std::sync::Arc;

use axum::extract::State;
use releasedesk_core::{
  product::{NewProduct, Product, ProductPatch},
  query::ProductFilter,
  store::Store,
};

use crate::{
  AppState,
  envelope::{Envelope, Message},
  error::Result,
  extract::{ApiJson, ApiPath, ApiQuery, Caller, PageQuery},
};

/// `GET /products`
pub async fn list<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  ApiQuery(filter): ApiQuery<ProductFilter>,
  ApiQuery(page): ApiQuery<PageQuery>,
) -> Result<Envelope<Vec<Product>>> {
  let products = state
    .plane
    .catalog
    .list_products(&filter, page.with_default(20))
    .await?;
  Ok(Envelope::page(products))
}

/// `POST /products`
pub async fn create<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiJson(input): ApiJson<NewProduct>,
) -> Result<Envelope<Product>> {
  let product = state.plane.catalog.create_product(&ctx, input).await?;
  Ok(Envelope::created(product))
}

/// `GET /products/{product_id}`
pub async fn get_one<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  ApiPath(product_id): ApiPath<String>,
) -> Result<Envelope<Product>> {
  Ok(Envelope::ok(state.plane.catalog.get_product(&product_id).await?))
}

/// `PUT /products/{product_id}`
pub async fn update<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath(product_id): ApiPath<String>,
  ApiJson(patch): ApiJson<ProductPatch>,
) -> Result<Envelope<Product>> {
  let product = state
    .plane
    .catalog
    .update_product(&ctx, &product_id, patch)
    .await?;
  Ok(Envelope::ok(product))
}

/// `POST /products/{product_id}/deactivate`
pub async fn deactivate<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath(product_id): ApiPath<String>,
) -> Result<Envelope<Product>> {
  let product = state
    .plane
    .catalog
    .deactivate_product(&ctx, &product_id)
    .await?;
  Ok(Envelope::ok(product))
}

/// `DELETE /products/{product_id}`
pub async fn delete<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath(product_id): ApiPath<String>,
) -> Result<Envelope<Message>> {
  state.plane.catalog.delete_product(&ctx, &product_id).await?;
  Ok(Envelope::ok(Message::new(format!("product {product_id} deleted"))))
}
