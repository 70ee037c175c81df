//! Domain types, store traits and engines of the ReleaseDesk control plane.
//!
//! This crate is free of HTTP and database dependencies. Storage backends
//! implement the traits in [`store`]; the HTTP layer drives the engines
//! bundled in [`plane::ControlPlane`].
//!
//! - [`lifecycle`] owns version states and packages.
//! - [`resolver`] computes pending updates behind a TTL [`cache`], kept
//!   coherent by the [`invalidator`].
//! - [`accountant`] enforces license seat capacity.

pub mod accountant;
pub mod audit;
pub mod cache;
pub mod catalog;
pub mod compat;
pub mod compatibility;
pub mod context;
pub mod error;
pub mod fleet;
pub mod invalidator;
pub mod license;
pub mod lifecycle;
pub mod plane;
pub mod product;
pub mod query;
pub mod registry;
pub mod resolver;
pub mod rollout;
pub mod rollouts;
pub mod semver;
pub mod signal;
pub mod store;
pub mod subscriptions;
pub mod version;

pub use context::{Actor, RequestContext};
pub use error::{Error, Result};
pub use plane::{ControlPlane, ControlPlaneOptions};
