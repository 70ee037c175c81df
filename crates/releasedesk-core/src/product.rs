//! Products: the top of the release catalogue.
//!
//! A product is identified by a stable human-readable `product_id`. Products
//! are soft-deleted by clearing `is_active`; they are never hard-removed while
//! any version references them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where the product runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
  Server,
  Client,
}

impl ProductType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Server => "server",
      Self::Client => "client",
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
  pub id:           Uuid,
  pub product_id:   String,
  pub name:         String,
  #[serde(rename = "type")]
  pub product_type: ProductType,
  pub description:  Option<String>,
  pub vendor:       Option<String>,
  pub is_active:    bool,
  pub created_by:   String,
  pub created_at:   DateTime<Utc>,
  pub updated_at:   DateTime<Utc>,
}

/// Input to [`crate::catalog::ProductCatalog::create_product`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
  pub product_id:   String,
  pub name:         String,
  #[serde(rename = "type")]
  pub product_type: ProductType,
  pub description:  Option<String>,
  pub vendor:       Option<String>,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductPatch {
  pub name:         Option<String>,
  #[serde(rename = "type")]
  pub product_type: Option<ProductType>,
  pub description:  Option<String>,
  pub vendor:       Option<String>,
  pub is_active:    Option<bool>,
}

impl ProductPatch {
  pub fn apply(self, product: &mut Product) {
    if let Some(name) = self.name {
      product.name = name;
    }
    if let Some(t) = self.product_type {
      product.product_type = t;
    }
    if let Some(d) = self.description {
      product.description = Some(d);
    }
    if let Some(v) = self.vendor {
      product.vendor = Some(v);
    }
    if let Some(active) = self.is_active {
      product.is_active = active;
    }
  }
}
