//! The product catalogue.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::{
  Error, Result,
  audit::{AuditEntry, AuditSink},
  context::RequestContext,
  error::StoreResultExt,
  product::{NewProduct, Product, ProductPatch},
  query::{Page, PageRequest, ProductFilter},
  store::Store,
};

pub struct ProductCatalog<S> {
  store: Arc<S>,
  audit: Arc<dyn AuditSink>,
}

impl<S> Clone for ProductCatalog<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), audit: self.audit.clone() }
  }
}

fn valid_product_id(id: &str) -> bool {
  !id.is_empty()
    && id
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl<S: Store> ProductCatalog<S> {
  pub fn new(store: Arc<S>, audit: Arc<dyn AuditSink>) -> Self {
    Self { store, audit }
  }

  pub async fn get_product(&self, product_id: &str) -> Result<Product> {
    self
      .store
      .get_product(product_id)
      .await
      .or_store()?
      .ok_or_else(|| Error::NotFound(format!("product {product_id}")))
  }

  pub async fn list_products(
    &self,
    filter: &ProductFilter,
    page: PageRequest,
  ) -> Result<Page<Product>> {
    self.store.list_products(filter, page).await.or_store()
  }

  pub async fn create_product(
    &self,
    ctx: &RequestContext,
    input: NewProduct,
  ) -> Result<Product> {
    ctx.check_deadline()?;
    if !valid_product_id(&input.product_id) {
      return Err(Error::InvalidRequest(format!(
        "invalid product_id {:?}",
        input.product_id
      )));
    }
    if input.name.trim().is_empty() {
      return Err(Error::InvalidRequest("name is required".into()));
    }
    if self.store.get_product(&input.product_id).await.or_store()?.is_some() {
      return Err(Error::Conflict(format!(
        "product {} already exists",
        input.product_id
      )));
    }

    let now = Utc::now();
    let product = Product {
      id:           Uuid::new_v4(),
      product_id:   input.product_id,
      name:         input.name,
      product_type: input.product_type,
      description:  input.description,
      vendor:       input.vendor,
      is_active:    true,
      created_by:   ctx.user_id().to_owned(),
      created_at:   now,
      updated_at:   now,
    };
    let product = self.store.insert_product(product).await.or_store()?;

    tracing::info!(product = %product.product_id, "created product");
    self.audit.record(
      AuditEntry::new(ctx, "product.create", "product", &product.product_id)
        .with_details(json!({ "type": product.product_type })),
    );
    Ok(product)
  }

  pub async fn update_product(
    &self,
    ctx: &RequestContext,
    product_id: &str,
    patch: ProductPatch,
  ) -> Result<Product> {
    ctx.check_deadline()?;
    if patch.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
      return Err(Error::InvalidRequest("name cannot be empty".into()));
    }
    let mut product = self.get_product(product_id).await?;
    patch.apply(&mut product);
    let product = self.store.update_product(product).await.or_store()?;

    self.audit.record(AuditEntry::new(
      ctx,
      "product.update",
      "product",
      &product.product_id,
    ));
    Ok(product)
  }

  /// Soft delete: the product stays referenced by its versions.
  pub async fn deactivate_product(
    &self,
    ctx: &RequestContext,
    product_id: &str,
  ) -> Result<Product> {
    ctx.check_deadline()?;
    let mut product = self.get_product(product_id).await?;
    if !product.is_active {
      return Ok(product);
    }
    product.is_active = false;
    let product = self.store.update_product(product).await.or_store()?;

    tracing::info!(product = %product.product_id, "deactivated product");
    self.audit.record(AuditEntry::new(
      ctx,
      "product.deactivate",
      "product",
      &product.product_id,
    ));
    Ok(product)
  }

  /// Hard delete, refused with [`Error::HasDependents`] while any version
  /// references the product.
  pub async fn delete_product(
    &self,
    ctx: &RequestContext,
    product_id: &str,
  ) -> Result<()> {
    ctx.check_deadline()?;
    self.get_product(product_id).await?;
    let versions = self.store.count_versions(product_id).await.or_store()?;
    if versions > 0 || !self.store.delete_product(product_id).await.or_store()? {
      return Err(Error::HasDependents(format!("product {product_id}")));
    }

    tracing::info!(product = %product_id, "deleted product");
    self
      .audit
      .record(AuditEntry::new(ctx, "product.delete", "product", product_id));
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn product_ids_are_url_safe() {
    assert!(valid_product_id("acme-server_2.x"));
    assert!(!valid_product_id(""));
    assert!(!valid_product_id("has space"));
    assert!(!valid_product_id("a/b"));
  }
}
