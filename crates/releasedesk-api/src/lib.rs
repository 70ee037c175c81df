//! JSON REST API for ReleaseDesk.
//!
//! Exposes an axum [`Router`] serving `/api/v1` over a
//! [`ControlPlane`] backed by any [`Store`]. TLS and authentication are the
//! caller's responsibility; identity headers are trusted as sent.
//!
//! # Mounting
//!
//! ```rust,ignore
//! let app = releasedesk_api::router(Arc::new(AppState::new(plane, packages)));
//! ```

pub mod envelope;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod packages;

use std::{sync::Arc, time::Duration};

use axum::{
  Router,
  extract::DefaultBodyLimit,
  http::Uri,
  routing::{get, post, put},
};
use releasedesk_core::{ControlPlane, store::Store};

pub use error::ApiError;
pub use packages::PackageStorage;

use handlers::{
  compat, customers, deployments, licensing, products, rollouts, versions,
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct AppState<S> {
  pub plane:            ControlPlane<S>,
  pub packages:         PackageStorage,
  /// Deadline given to every request's [`releasedesk_core::RequestContext`].
  pub request_timeout:  Duration,
  pub max_upload_bytes: usize,
}

impl<S: Store> AppState<S> {
  pub fn new(plane: ControlPlane<S>, packages: PackageStorage) -> Self {
    Self {
      plane,
      packages,
      request_timeout: DEFAULT_REQUEST_TIMEOUT,
      max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
    }
  }

  pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
    self.request_timeout = timeout;
    self
  }

  pub fn with_max_upload_bytes(mut self, bytes: usize) -> Self {
    self.max_upload_bytes = bytes;
    self
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the full router with every endpoint under `/api/v1`.
pub fn router<S: Store>(state: Arc<AppState<S>>) -> Router<()> {
  Router::new()
    .nest("/api/v1", api_routes::<S>(state.max_upload_bytes))
    .fallback(route_not_found)
    .with_state(state)
}

fn api_routes<S: Store>(max_upload_bytes: usize) -> Router<Arc<AppState<S>>> {
  const LICENSE: &str = "/customers/{cid}/subscriptions/{sid}/licenses/{lid}";
  const DEPLOYMENT: &str = "/customers/{cid}/tenants/{tid}/deployments/{did}";

  Router::new()
    .route("/health", get(handlers::health))
    // Products
    .route("/products", get(products::list::<S>).post(products::create::<S>))
    .route(
      "/products/{product_id}",
      get(products::get_one::<S>)
        .put(products::update::<S>)
        .delete(products::delete::<S>),
    )
    .route("/products/{product_id}/deactivate", post(products::deactivate::<S>))
    // Versions
    .route(
      "/products/{product_id}/versions",
      get(versions::list::<S>).post(versions::create::<S>),
    )
    .route("/products/{product_id}/versions/latest", get(versions::latest::<S>))
    .route(
      "/versions/{id}",
      get(versions::get_one::<S>)
        .put(versions::update::<S>)
        .delete(versions::delete::<S>),
    )
    .route("/versions/{id}/submit", post(versions::submit::<S>))
    .route("/versions/{id}/approve", post(versions::approve::<S>))
    .route("/versions/{id}/release", post(versions::release::<S>))
    .route("/versions/{id}/deprecate", post(versions::deprecate::<S>))
    .route("/versions/{id}/eol", post(versions::eol::<S>))
    .route(
      "/versions/{id}/packages",
      get(versions::list_packages::<S>)
        .post(versions::upload_package::<S>)
        .layer(DefaultBodyLimit::max(max_upload_bytes)),
    )
    .route("/versions/{id}/packages/{package_id}", get(versions::get_package::<S>))
    .route(
      "/versions/{id}/packages/{package_id}/download",
      get(versions::download_package::<S>),
    )
    // Compatibility & upgrade paths
    .route(
      "/products/{product_id}/versions/{version_number}/compatibility",
      get(compat::get_matrix::<S>).put(compat::put_matrix::<S>),
    )
    .route(
      "/products/{product_id}/upgrade-paths",
      get(compat::list_paths::<S>).post(compat::create_path::<S>),
    )
    .route("/upgrade-paths/{id}/block", post(compat::block_path::<S>))
    .route("/upgrade-paths/{id}", axum::routing::delete(compat::delete_path::<S>))
    // Customers & tenants
    .route("/customers", get(customers::list::<S>).post(customers::create::<S>))
    .route(
      "/customers/{cid}",
      get(customers::get_one::<S>)
        .put(customers::update::<S>)
        .delete(customers::delete::<S>),
    )
    .route(
      "/customers/{cid}/tenants",
      get(customers::list_tenants::<S>).post(customers::create_tenant::<S>),
    )
    .route(
      "/customers/{cid}/tenants/{tid}",
      get(customers::get_tenant::<S>)
        .put(customers::update_tenant::<S>)
        .delete(customers::delete_tenant::<S>),
    )
    // Deployments & pending updates
    .route(
      "/customers/{cid}/tenants/{tid}/deployments",
      get(deployments::list::<S>).post(deployments::create::<S>),
    )
    .route(
      DEPLOYMENT,
      get(deployments::get_one::<S>)
        .put(deployments::update::<S>)
        .delete(deployments::delete::<S>),
    )
    .route(&format!("{DEPLOYMENT}/updates"), get(deployments::deployment_updates::<S>))
    .route("/customers/{cid}/tenants/{tid}/updates", get(deployments::tenant_updates::<S>))
    .route("/customers/{cid}/updates", get(deployments::customer_updates::<S>))
    .route("/updates/pending", get(deployments::fleet_updates::<S>))
    // Subscriptions, licenses & allocations
    .route(
      "/customers/{cid}/subscriptions",
      get(licensing::list_subscriptions::<S>).post(licensing::create_subscription::<S>),
    )
    .route(
      "/customers/{cid}/subscriptions/{sid}",
      get(licensing::get_subscription::<S>)
        .put(licensing::update_subscription::<S>)
        .delete(licensing::delete_subscription::<S>),
    )
    .route(
      "/customers/{cid}/subscriptions/{sid}/licenses",
      get(licensing::list_licenses::<S>).post(licensing::assign_license::<S>),
    )
    .route(
      LICENSE,
      get(licensing::get_license::<S>)
        .put(licensing::update_license::<S>)
        .delete(licensing::delete_license::<S>),
    )
    .route(&format!("{LICENSE}/allocate"), post(licensing::allocate::<S>))
    .route(&format!("{LICENSE}/allocations"), get(licensing::list_allocations::<S>))
    .route(
      &format!("{LICENSE}/allocations/{{aid}}/release"),
      post(licensing::release::<S>),
    )
    .route(&format!("{LICENSE}/utilization"), get(licensing::utilization::<S>))
    .route(&format!("{LICENSE}/renew"), post(licensing::renew::<S>))
    .route(&format!("{LICENSE}/revoke"), post(licensing::revoke::<S>))
    // Detections & rollouts
    .route(
      "/update-detections",
      get(rollouts::list_detections::<S>).post(rollouts::record_detection::<S>),
    )
    .route("/rollouts", get(rollouts::list::<S>).post(rollouts::start::<S>))
    .route("/rollouts/{id}", get(rollouts::get_one::<S>))
    .route("/rollouts/{id}/progress", put(rollouts::update_progress::<S>))
    .method_not_allowed_fallback(method_not_allowed)
}

async fn route_not_found(uri: Uri) -> ApiError { ApiError::RouteNotFound(uri.path().to_owned()) }

async fn method_not_allowed() -> ApiError { ApiError::MethodNotAllowed }

#[cfg(test)]
mod tests;
