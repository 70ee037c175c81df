//! SQL schema for the ReleaseDesk SQLite store.
//!
//! Every entity is one row: a surrogate `id`, the columns that are indexed or
//! filtered on, and the full record as JSON in `doc`. Key columns are always
//! written from the document, so the two never disagree.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS products (
    id           TEXT PRIMARY KEY,
    product_id   TEXT NOT NULL,
    product_type TEXT NOT NULL,   -- 'server' | 'client'
    is_active    INTEGER NOT NULL,
    doc          TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS products_key_idx ON products(product_id);

CREATE TABLE IF NOT EXISTS versions (
    id             TEXT PRIMARY KEY,
    product_id     TEXT NOT NULL,
    version_number TEXT NOT NULL,
    state          TEXT NOT NULL,
    release_type   TEXT NOT NULL,
    doc            TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS versions_key_idx
    ON versions(product_id, version_number);
CREATE INDEX IF NOT EXISTS versions_state_idx ON versions(product_id, state);

CREATE TABLE IF NOT EXISTS compatibility (
    id             TEXT PRIMARY KEY,
    product_id     TEXT NOT NULL,
    version_number TEXT NOT NULL,
    doc            TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS compatibility_key_idx
    ON compatibility(product_id, version_number);

CREATE TABLE IF NOT EXISTS upgrade_paths (
    id           TEXT PRIMARY KEY,
    product_id   TEXT NOT NULL,
    from_version TEXT NOT NULL,
    to_version   TEXT NOT NULL,
    doc          TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS upgrade_paths_key_idx
    ON upgrade_paths(product_id, from_version, to_version);

CREATE TABLE IF NOT EXISTS customers (
    id           TEXT PRIMARY KEY,
    customer_id  TEXT NOT NULL,
    name         TEXT NOT NULL,
    organization TEXT,
    status       TEXT NOT NULL,
    doc          TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS customers_key_idx ON customers(customer_id);

CREATE TABLE IF NOT EXISTS tenants (
    id          TEXT PRIMARY KEY,
    tenant_id   TEXT NOT NULL,
    customer_id TEXT NOT NULL,
    doc         TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS tenants_key_idx ON tenants(tenant_id);
CREATE INDEX IF NOT EXISTS tenants_customer_idx ON tenants(customer_id);

CREATE TABLE IF NOT EXISTS deployments (
    id              TEXT PRIMARY KEY,
    deployment_id   TEXT NOT NULL,
    customer_id     TEXT NOT NULL,
    tenant_id       TEXT NOT NULL,
    product_id      TEXT NOT NULL,
    deployment_type TEXT NOT NULL,
    status          TEXT NOT NULL,
    doc             TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS deployments_key_idx ON deployments(deployment_id);
CREATE UNIQUE INDEX IF NOT EXISTS deployments_slot_idx
    ON deployments(tenant_id, product_id, deployment_type);
CREATE INDEX IF NOT EXISTS deployments_customer_idx ON deployments(customer_id);
CREATE INDEX IF NOT EXISTS deployments_product_idx  ON deployments(product_id);

CREATE TABLE IF NOT EXISTS subscriptions (
    id              TEXT PRIMARY KEY,
    subscription_id TEXT NOT NULL,
    customer_id     TEXT NOT NULL,
    doc             TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS subscriptions_key_idx ON subscriptions(subscription_id);
CREATE INDEX IF NOT EXISTS subscriptions_customer_idx ON subscriptions(customer_id);

CREATE TABLE IF NOT EXISTS licenses (
    id              TEXT PRIMARY KEY,
    license_id      TEXT NOT NULL,
    subscription_id TEXT NOT NULL,
    customer_id     TEXT NOT NULL,
    product_id      TEXT NOT NULL,
    status          TEXT NOT NULL,
    doc             TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS licenses_key_idx ON licenses(license_id);
CREATE INDEX IF NOT EXISTS licenses_subscription_idx ON licenses(subscription_id);
CREATE INDEX IF NOT EXISTS licenses_customer_idx ON licenses(customer_id);

CREATE TABLE IF NOT EXISTS allocations (
    id              TEXT PRIMARY KEY,
    allocation_id   TEXT NOT NULL,
    license_id      TEXT NOT NULL,
    tenant_id       TEXT NOT NULL,
    status          TEXT NOT NULL,  -- 'active' | 'released'
    seats_allocated INTEGER NOT NULL,
    doc             TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS allocations_key_idx ON allocations(allocation_id);
CREATE INDEX IF NOT EXISTS allocations_license_idx ON allocations(license_id, status);
CREATE INDEX IF NOT EXISTS allocations_tenant_idx  ON allocations(tenant_id);

CREATE TABLE IF NOT EXISTS update_detections (
    id          TEXT PRIMARY KEY,
    endpoint_id TEXT NOT NULL,
    product_id  TEXT NOT NULL,
    doc         TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS update_detections_key_idx
    ON update_detections(endpoint_id, product_id);

CREATE TABLE IF NOT EXISTS update_rollouts (
    id          TEXT PRIMARY KEY,
    endpoint_id TEXT NOT NULL,
    product_id  TEXT NOT NULL,
    status      TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    doc         TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS update_rollouts_endpoint_idx ON update_rollouts(endpoint_id);

-- Append-only.
CREATE TABLE IF NOT EXISTS audit_log (
    id            TEXT PRIMARY KEY,
    recorded_at   TEXT NOT NULL,
    user_id       TEXT NOT NULL,
    action        TEXT NOT NULL,
    resource_type TEXT NOT NULL,
    resource_id   TEXT NOT NULL,
    doc           TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS audit_log_resource_idx ON audit_log(resource_type, resource_id);
CREATE INDEX IF NOT EXISTS audit_log_recorded_idx ON audit_log(recorded_at);

PRAGMA user_version = 1;
";
