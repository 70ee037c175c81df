use std::sync::Arc;

use axum::{
  Router,
  body::{Body, to_bytes},
  http::{Request, StatusCode, header},
};
use chrono::Utc;
use releasedesk_core::{
  ControlPlane, ControlPlaneOptions, RequestContext, audit::MemoryAuditSink,
};
use releasedesk_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt as _;

use super::*;

const HELLO_SHA256: &str =
  "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
const BOUNDARY: &str = "releasedesk-test-boundary";

struct TestApp {
  app:   Router,
  plane: ControlPlane<SqliteStore>,
  audit: Arc<MemoryAuditSink>,
  dir:   TempDir,
}

async fn make_app() -> TestApp {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let audit = Arc::new(MemoryAuditSink::new());
  let plane = ControlPlane::new(Arc::new(store), ControlPlaneOptions {
    audit: audit.clone(),
    ..Default::default()
  });
  let dir = tempfile::tempdir().unwrap();
  let packages = PackageStorage::new(dir.path().join("packages"));
  let app = router(Arc::new(AppState::new(plane.clone(), packages)));
  TestApp { app, plane, audit, dir }
}

async fn read_json(resp: axum::response::Response) -> Value {
  let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  if bytes.is_empty() {
    return Value::Null;
  }
  serde_json::from_slice(&bytes).unwrap()
}

async fn send(
  app:    &Router,
  method: &str,
  uri:    &str,
  body:   Option<Value>,
) -> (StatusCode, Value) {
  let mut builder = Request::builder()
    .method(method)
    .uri(uri)
    .header("x-user-id", "admin");
  let body = match body {
    Some(v) => {
      builder = builder.header(header::CONTENT_TYPE, "application/json");
      Body::from(v.to_string())
    }
    None => Body::empty(),
  };
  let resp = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
  let status = resp.status();
  (status, read_json(resp).await)
}

fn file_part(body: &mut Vec<u8>, file_name: &str, contents: &[u8]) {
  body.extend_from_slice(
    format!(
      "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .as_bytes(),
  );
  body.extend_from_slice(contents);
  body.extend_from_slice(b"\r\n");
}

fn multipart_body(file_name: &str, contents: &[u8], fields: &[(&str, &str)]) -> Vec<u8> {
  let mut body = Vec::new();
  for (name, value) in fields {
    body.extend_from_slice(
      format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
      )
      .as_bytes(),
    );
  }
  file_part(&mut body, file_name, contents);
  body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
  body
}

async fn upload(app: &Router, version_id: &str, fields: &[(&str, &str)]) -> (StatusCode, Value) {
  post_multipart(
    app,
    version_id,
    multipart_body("agent-setup.exe", b"hello world", fields),
  )
  .await
}

async fn post_multipart(app: &Router, version_id: &str, body: Vec<u8>) -> (StatusCode, Value) {
  let req = Request::builder()
    .method("POST")
    .uri(format!("/api/v1/versions/{version_id}/packages"))
    .header("x-user-id", "admin")
    .header(
      header::CONTENT_TYPE,
      format!("multipart/form-data; boundary={BOUNDARY}"),
    )
    .body(Body::from(body))
    .unwrap();
  let resp = app.clone().oneshot(req).await.unwrap();
  let status = resp.status();
  (status, read_json(resp).await)
}

// ── Fixtures ────────────────────────────────────────────────────────────────

async fn create_product(app: &Router, product_id: &str) {
  let (status, _) = send(
    app,
    "POST",
    "/api/v1/products",
    Some(json!({ "product_id": product_id, "name": "Agent", "type": "server" })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
}

async fn create_version(
  app: &Router,
  product_id: &str,
  number: &str,
  release_type: &str,
) -> String {
  let (status, body) = send(
    app,
    "POST",
    &format!("/api/v1/products/{product_id}/versions"),
    Some(json!({ "version_number": number, "release_type": release_type })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED, "{body}");
  body["data"]["id"].as_str().unwrap().to_owned()
}

/// Create a version and walk it to `released`.
async fn publish(app: &Router, product_id: &str, number: &str, release_type: &str) -> String {
  let id = create_version(app, product_id, number, release_type).await;
  for step in ["submit", "approve", "release"] {
    let (status, body) =
      send(app, "POST", &format!("/api/v1/versions/{id}/{step}"), None).await;
    assert_eq!(status, StatusCode::OK, "{step}: {body}");
  }
  id
}

/// Customer `ACME` with tenant `T1`.
async fn create_fleet(app: &Router) {
  let (status, _) = send(
    app,
    "POST",
    "/api/v1/customers",
    Some(json!({ "customer_id": "ACME", "name": "Acme Corp" })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  let (status, _) = send(
    app,
    "POST",
    "/api/v1/customers/ACME/tenants",
    Some(json!({ "tenant_id": "T1", "name": "Head office" })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
}

async fn create_deployment(app: &Router, product_id: &str, kind: &str, installed: &str) {
  let (status, body) = send(
    app,
    "POST",
    "/api/v1/customers/ACME/tenants/T1/deployments",
    Some(json!({
      "deployment_id": "D1",
      "product_id": product_id,
      "deployment_type": kind,
      "installed_version": installed,
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED, "{body}");
}

const LICENSE_URI: &str = "/api/v1/customers/ACME/subscriptions/S1/licenses/L1";
const DEPLOYMENT_URI: &str = "/api/v1/customers/ACME/tenants/T1/deployments/D1";

/// Subscription `S1` holding license `L1` for `product_id`.
async fn create_license(app: &Router, product_id: &str, seats: u32) {
  let (status, _) = send(
    app,
    "POST",
    "/api/v1/customers/ACME/subscriptions",
    Some(json!({ "subscription_id": "S1", "name": "Enterprise" })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  let (status, body) = send(
    app,
    "POST",
    "/api/v1/customers/ACME/subscriptions/S1/licenses",
    Some(json!({
      "license_id": "L1",
      "product_id": product_id,
      "license_type": "perpetual",
      "number_of_seats": seats,
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED, "{body}");
}

async fn allocate(app: &Router, seats: u32) -> (StatusCode, Value) {
  send(
    app,
    "POST",
    &format!("{LICENSE_URI}/allocate"),
    Some(json!({ "tenant_id": "T1", "seats_allocated": seats })),
  )
  .await
}

// ── Surface ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_ok() {
  let t = make_app().await;
  let (status, body) = send(&t.app, "GET", "/api/v1/health", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["success"], true);
  assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn unknown_route_gets_error_envelope() {
  let t = make_app().await;
  let (status, body) = send(&t.app, "GET", "/api/v1/nope", None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert_eq!(body["success"], false);
  assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn wrong_method_gets_error_envelope() {
  let t = make_app().await;
  let (status, body) = send(&t.app, "PATCH", "/api/v1/products", None).await;
  assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
  assert_eq!(body["success"], false);
  assert_eq!(body["error"]["code"], "METHOD_NOT_ALLOWED");
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
  let t = make_app().await;
  let req = Request::builder()
    .method("POST")
    .uri("/api/v1/products")
    .header(header::CONTENT_TYPE, "application/json")
    .body(Body::from("{not json"))
    .unwrap();
  let resp = t.app.clone().oneshot(req).await.unwrap();
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  let body = read_json(resp).await;
  assert_eq!(body["error"]["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn out_of_range_limit_falls_back_to_default() {
  let t = make_app().await;
  for i in 0..3 {
    create_product(&t.app, &format!("P{i}")).await;
  }

  let (_, body) = send(&t.app, "GET", "/api/v1/products?page=0&limit=500", None).await;
  assert_eq!(body["meta"]["page"], 1);
  assert_eq!(body["meta"]["limit"], 20);
  assert_eq!(body["meta"]["total"], 3);

  let (_, body) = send(&t.app, "GET", "/api/v1/products?page=2&limit=2", None).await;
  assert_eq!(body["data"].as_array().unwrap().len(), 1);
  assert_eq!(body["meta"]["total_pages"], 2);
}

#[tokio::test]
async fn duplicate_product_conflicts() {
  let t = make_app().await;
  create_product(&t.app, "P1").await;
  let (status, body) = send(
    &t.app,
    "POST",
    "/api/v1/products",
    Some(json!({ "product_id": "P1", "name": "Again", "type": "client" })),
  )
  .await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["error"]["code"], "CONFLICT");
}

// ── Version lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn lifecycle_with_package_upload_and_download() {
  let t = make_app().await;
  create_product(&t.app, "P1").await;
  let id = create_version(&t.app, "P1", "1.0.0", "feature").await;

  let (status, body) = upload(&t.app, &id, &[
    ("package_type", "full_installer"),
    ("checksum_sha256", HELLO_SHA256),
  ])
  .await;
  assert_eq!(status, StatusCode::CREATED, "{body}");
  let package = &body["data"]["packages"][0];
  assert_eq!(package["file_size"], 11);
  assert_eq!(package["checksum_sha256"], HELLO_SHA256);
  let package_id = package["package_id"].as_str().unwrap().to_owned();

  let (_, body) = send(&t.app, "POST", &format!("/api/v1/versions/{id}/submit"), None).await;
  assert_eq!(body["data"]["state"], "pending_review");

  let (_, body) = send(
    &t.app,
    "POST",
    &format!("/api/v1/versions/{id}/approve"),
    Some(json!({ "approved_by": "release-manager" })),
  )
  .await;
  assert_eq!(body["data"]["state"], "approved");
  assert_eq!(body["data"]["approved_by"], "release-manager");
  assert!(body["data"]["approved_at"].is_string());

  let (_, body) = send(&t.app, "POST", &format!("/api/v1/versions/{id}/release"), None).await;
  assert_eq!(body["data"]["state"], "released");

  let (status, body) = upload(&t.app, &id, &[("package_type", "update")]).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"]["code"], "INVALID_STATE");

  let req = Request::builder()
    .uri(format!("/api/v1/versions/{id}/packages/{package_id}/download"))
    .body(Body::empty())
    .unwrap();
  let resp = t.app.clone().oneshot(req).await.unwrap();
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(resp.headers()["x-checksum-sha256"], HELLO_SHA256);
  assert_eq!(resp.headers()[header::CONTENT_LENGTH], "11");
  let disposition = resp.headers()[header::CONTENT_DISPOSITION].to_str().unwrap();
  assert!(disposition.contains("agent-setup.exe"), "{disposition}");
  let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  assert_eq!(&bytes[..], b"hello world");

  let (_, body) = send(&t.app, "GET", "/api/v1/products/P1/versions/latest", None).await;
  assert_eq!(body["data"]["version_number"], "1.0.0");
  assert!(t.audit.actions().contains(&"version.release".to_owned()));
}

#[tokio::test]
async fn checksum_mismatch_rejects_upload() {
  let t = make_app().await;
  create_product(&t.app, "P1").await;
  let id = create_version(&t.app, "P1", "1.0.0", "feature").await;

  let zeros = "0".repeat(64);
  let (status, _) = upload(&t.app, &id, &[
    ("package_type", "full_installer"),
    ("checksum_sha256", zeros.as_str()),
  ])
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (_, body) = send(&t.app, "GET", &format!("/api/v1/versions/{id}/packages"), None).await;
  assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn out_of_order_transition_is_invalid_state() {
  let t = make_app().await;
  create_product(&t.app, "P1").await;
  let id = create_version(&t.app, "P1", "1.0.0", "feature").await;
  let (status, body) =
    send(&t.app, "POST", &format!("/api/v1/versions/{id}/release"), None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"]["code"], "INVALID_STATE");
}

#[tokio::test]
async fn product_with_versions_cannot_be_deleted() {
  let t = make_app().await;
  create_product(&t.app, "P1").await;
  create_version(&t.app, "P1", "1.0.0", "feature").await;
  let (status, _) = send(&t.app, "DELETE", "/api/v1/products/P1", None).await;
  assert_eq!(status, StatusCode::CONFLICT);
}

// ── Compatibility ───────────────────────────────────────────────────────────

#[tokio::test]
async fn blocked_upgrade_path_is_listed_with_reason() {
  let t = make_app().await;
  create_product(&t.app, "P1").await;
  create_version(&t.app, "P1", "1.0.0", "feature").await;
  create_version(&t.app, "P1", "2.0.0", "major").await;
  let (status, body) = send(
    &t.app,
    "POST",
    "/api/v1/products/P1/upgrade-paths",
    Some(json!({ "from_version": "1.0.0", "to_version": "2.0.0" })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED, "{body}");
  let path_id = body["data"]["id"].as_str().unwrap().to_owned();

  let (_, body) = send(
    &t.app,
    "POST",
    &format!("/api/v1/upgrade-paths/{path_id}/block"),
    Some(json!({ "reason": "schema migration missing" })),
  )
  .await;
  assert_eq!(body["data"]["path_type"], "blocked");

  let (_, body) =
    send(&t.app, "GET", "/api/v1/products/P1/upgrade-paths?from_version=1.0.0", None).await;
  let paths = body["data"].as_array().unwrap();
  assert_eq!(paths.len(), 1);
  assert_eq!(paths[0]["block_reason"], "schema migration missing");
}

// ── Seat accounting ─────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_allocations_never_oversubscribe() {
  let t = make_app().await;
  create_product(&t.app, "P1").await;
  create_fleet(&t.app).await;
  create_license(&t.app, "P1", 100).await;

  let (a, b) = tokio::join!(allocate(&t.app, 60), allocate(&t.app, 60));
  let statuses = [a.0, b.0];
  assert_eq!(statuses.iter().filter(|s| **s == StatusCode::CREATED).count(), 1);
  let loser = if a.0 == StatusCode::CREATED { &b.1 } else { &a.1 };
  assert_eq!(loser["error"]["code"], "INSUFFICIENT_SEATS");

  let (_, usage) = send(&t.app, "GET", &format!("{LICENSE_URI}/utilization"), None).await;
  assert_eq!(usage["data"]["allocated"], 60);
  assert_eq!(usage["data"]["available"], 40);

  // Releasing the winner frees the full license again.
  let winner = if a.0 == StatusCode::CREATED { &a.1 } else { &b.1 };
  let aid = winner["data"]["allocation_id"].as_str().unwrap();
  let (status, body) = send(
    &t.app,
    "POST",
    &format!("{LICENSE_URI}/allocations/{aid}/release"),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["data"]["status"], "released");

  let (_, usage) = send(&t.app, "GET", &format!("{LICENSE_URI}/utilization"), None).await;
  assert_eq!(usage["data"]["allocated"], 0);

  let (status, _) = allocate(&t.app, 100).await;
  assert_eq!(status, StatusCode::CREATED);

  let (status, body) = send(
    &t.app,
    "POST",
    &format!("{LICENSE_URI}/allocations/{aid}/release"),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"]["code"], "ALREADY_RELEASED");
}

#[tokio::test]
async fn revoked_license_refuses_allocation() {
  let t = make_app().await;
  create_product(&t.app, "P1").await;
  create_fleet(&t.app).await;
  create_license(&t.app, "P1", 10).await;

  let (status, body) = send(
    &t.app,
    "POST",
    &format!("{LICENSE_URI}/revoke"),
    Some(json!({ "reason": "contract ended" })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["data"]["status"], "revoked");
  assert_eq!(body["data"]["revoke_reason"], "contract ended");

  let (status, body) = allocate(&t.app, 1).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"]["code"], "LICENSE_NOT_ACTIVE");
}

#[tokio::test]
async fn license_with_active_allocation_cannot_be_deleted() {
  let t = make_app().await;
  create_product(&t.app, "P1").await;
  create_fleet(&t.app).await;
  create_license(&t.app, "P1", 10).await;
  allocate(&t.app, 2).await;

  let (status, body) = send(&t.app, "DELETE", LICENSE_URI, None).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["error"]["code"], "HAS_ALLOCATIONS");

  let (_, body) =
    send(&t.app, "GET", &format!("{LICENSE_URI}/allocations?status=active"), None).await;
  assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

// ── Pending updates ─────────────────────────────────────────────────────────

#[tokio::test]
async fn release_invalidates_cached_updates() {
  let t = make_app().await;
  create_product(&t.app, "P1").await;
  publish(&t.app, "P1", "1.0.0", "feature").await;
  create_fleet(&t.app).await;
  create_deployment(&t.app, "P1", "production", "1.0.0").await;

  let uri = format!("{DEPLOYMENT_URI}/updates");
  let (_, body) = send(&t.app, "GET", &uri, None).await;
  assert_eq!(body["data"]["update_count"], 0);
  assert_eq!(body["data"]["gap_type"], "none");

  publish(&t.app, "P1", "1.1.0", "feature").await;

  let (_, body) = send(&t.app, "GET", &uri, None).await;
  assert_eq!(body["data"]["update_count"], 1);
  assert_eq!(body["data"]["latest_version"], "1.1.0");
  assert_eq!(body["data"]["gap_type"], "minor");
  assert_eq!(body["data"]["priority"], "normal");
}

#[tokio::test]
async fn priority_follows_release_type_gap_and_environment() {
  let t = make_app().await;
  create_product(&t.app, "P1").await;
  publish(&t.app, "P1", "1.0.0", "feature").await;
  create_fleet(&t.app).await;
  create_deployment(&t.app, "P1", "production", "1.0.0").await;
  let uri = format!("{DEPLOYMENT_URI}/updates");

  let security = publish(&t.app, "P1", "1.0.1", "security").await;
  let (_, body) = send(&t.app, "GET", &uri, None).await;
  assert_eq!(body["data"]["priority"], "critical");

  send(&t.app, "POST", &format!("/api/v1/versions/{security}/deprecate"), None).await;
  publish(&t.app, "P1", "2.0.0", "major").await;
  let (_, body) = send(&t.app, "GET", &uri, None).await;
  assert_eq!(body["data"]["latest_version"], "2.0.0");
  assert_eq!(body["data"]["gap_type"], "major");
  assert_eq!(body["data"]["priority"], "high");

  let (status, _) =
    send(&t.app, "PUT", DEPLOYMENT_URI, Some(json!({ "deployment_type": "uat" }))).await;
  assert_eq!(status, StatusCode::OK);
  let (_, body) = send(&t.app, "GET", &uri, None).await;
  assert_eq!(body["data"]["priority"], "normal");
}

#[tokio::test]
async fn summaries_roll_up_to_tenant_customer_and_fleet() {
  let t = make_app().await;
  create_product(&t.app, "P1").await;
  publish(&t.app, "P1", "1.0.0", "feature").await;
  publish(&t.app, "P1", "1.2.0", "security").await;
  create_fleet(&t.app).await;
  create_deployment(&t.app, "P1", "production", "1.0.0").await;

  let (_, body) =
    send(&t.app, "GET", "/api/v1/customers/ACME/tenants/T1/updates", None).await;
  assert_eq!(body["data"]["total_deployments"], 1);
  assert_eq!(body["data"]["deployments_with_updates"], 1);
  assert_eq!(body["data"]["by_priority"]["critical"], 1);

  let (_, body) = send(&t.app, "GET", "/api/v1/customers/ACME/updates", None).await;
  assert_eq!(body["data"]["total_tenants"], 1);
  assert_eq!(body["data"]["total_updates"], 1);

  let (_, body) =
    send(&t.app, "GET", "/api/v1/updates/pending?priority=critical", None).await;
  assert_eq!(body["meta"]["total"], 1);
  assert_eq!(body["data"][0]["deployment_id"], "D1");

  let (_, body) = send(&t.app, "GET", "/api/v1/updates/pending?priority=high", None).await;
  assert_eq!(body["meta"]["total"], 0);
}

#[tokio::test]
async fn deployment_lookups_are_scoped_to_their_tenant() {
  let t = make_app().await;
  create_product(&t.app, "P1").await;
  create_fleet(&t.app).await;
  create_deployment(&t.app, "P1", "production", "1.0.0").await;
  send(
    &t.app,
    "POST",
    "/api/v1/customers/ACME/tenants",
    Some(json!({ "tenant_id": "T2", "name": "Branch" })),
  )
  .await;

  let (status, _) = send(
    &t.app,
    "GET",
    "/api/v1/customers/ACME/tenants/T2/deployments/D1/updates",
    None,
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn second_deployment_in_same_slot_conflicts() {
  let t = make_app().await;
  create_product(&t.app, "P1").await;
  create_fleet(&t.app).await;
  create_deployment(&t.app, "P1", "production", "1.0.0").await;
  let (status, _) = send(
    &t.app,
    "POST",
    "/api/v1/customers/ACME/tenants/T1/deployments",
    Some(json!({
      "product_id": "P1",
      "deployment_type": "production",
      "installed_version": "1.1.0",
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CONFLICT);
}

// ── Delete guards ───────────────────────────────────────────────────────────

#[tokio::test]
async fn parents_with_children_cannot_be_deleted() {
  let t = make_app().await;
  create_product(&t.app, "P1").await;
  create_fleet(&t.app).await;
  create_license(&t.app, "P1", 5).await;
  create_deployment(&t.app, "P1", "testing", "1.0.0").await;

  let (status, body) =
    send(&t.app, "DELETE", "/api/v1/customers/ACME/subscriptions/S1", None).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["error"]["code"], "HAS_DEPENDENTS");

  let (status, _) = send(&t.app, "DELETE", "/api/v1/customers/ACME/tenants/T1", None).await;
  assert_eq!(status, StatusCode::CONFLICT);

  let (status, _) = send(&t.app, "DELETE", DEPLOYMENT_URI, None).await;
  assert_eq!(status, StatusCode::OK);
  let (status, _) = send(&t.app, "DELETE", "/api/v1/customers/ACME/tenants/T1", None).await;
  assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn customer_with_tenants_is_soft_deleted() {
  let t = make_app().await;
  create_fleet(&t.app).await;
  let (status, body) = send(&t.app, "DELETE", "/api/v1/customers/ACME", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["data"]["outcome"], "deactivated");

  let (_, body) = send(&t.app, "GET", "/api/v1/customers/ACME", None).await;
  assert_eq!(body["data"]["status"], "inactive");
}

// ── Rollouts ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn rollout_progress_through_completion() {
  let t = make_app().await;
  let (status, body) = send(
    &t.app,
    "POST",
    "/api/v1/rollouts",
    Some(json!({
      "endpoint_id": "host-7",
      "product_id": "P1",
      "from_version": "1.0.0",
      "to_version": "1.1.0",
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED, "{body}");
  assert_eq!(body["data"]["status"], "pending");
  let id = body["data"]["id"].as_str().unwrap().to_owned();
  let uri = format!("/api/v1/rollouts/{id}/progress");

  let (_, body) = send(&t.app, "PUT", &uri, Some(json!({ "progress": 40 }))).await;
  assert_eq!(body["data"]["status"], "in_progress");

  let (status, _) = send(&t.app, "PUT", &uri, Some(json!({ "progress": 140 }))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (_, body) =
    send(&t.app, "PUT", &uri, Some(json!({ "progress": 90, "status": "completed" }))).await;
  assert_eq!(body["data"]["status"], "completed");
  assert_eq!(body["data"]["progress"], 100);

  let (_, body) = send(&t.app, "GET", "/api/v1/rollouts?status=completed", None).await;
  assert_eq!(body["meta"]["total"], 1);
}

#[tokio::test]
async fn detections_upsert_per_endpoint_and_product() {
  let t = make_app().await;
  for available in ["1.1.0", "1.2.0"] {
    let (status, _) = send(
      &t.app,
      "POST",
      "/api/v1/update-detections",
      Some(json!({
        "endpoint_id": "host-7",
        "product_id": "P1",
        "current_version": "1.0.0",
        "available_version": available,
      })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
  }

  let (_, body) =
    send(&t.app, "GET", "/api/v1/update-detections?endpoint_id=host-7", None).await;
  let detections = body["data"].as_array().unwrap();
  assert_eq!(detections.len(), 1);
  assert_eq!(detections[0]["available_version"], "1.2.0");
}

// ── Cache coherence ─────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn deployment_edit_racing_a_roll_up_is_never_served_stale() {
  let t = make_app().await;
  create_product(&t.app, "P1").await;
  publish(&t.app, "P1", "1.0.0", "feature").await;
  publish(&t.app, "P1", "2.0.0", "major").await;
  create_fleet(&t.app).await;
  create_deployment(&t.app, "P1", "production", "1.0.0").await;
  for (id, kind) in [("D2", "development"), ("D3", "testing"), ("D4", "uat")] {
    let (status, _) = send(
      &t.app,
      "POST",
      "/api/v1/customers/ACME/tenants/T1/deployments",
      Some(json!({
        "deployment_id": id,
        "product_id": "P1",
        "deployment_type": kind,
        "installed_version": "1.0.0",
      })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
  }

  let updates_uri = format!("{DEPLOYMENT_URI}/updates");
  for round in 1..=60 {
    let installed = format!("1.0.{round}");
    let roll_up = tokio::spawn({
      let app = t.app.clone();
      async move { send(&app, "GET", "/api/v1/customers/ACME/tenants/T1/updates", None).await }
    });
    let edit = tokio::spawn({
      let app = t.app.clone();
      let body = json!({ "installed_version": installed });
      async move { send(&app, "PUT", DEPLOYMENT_URI, Some(body)).await }
    });
    let (roll_up, edit) = (roll_up.await.unwrap(), edit.await.unwrap());
    assert_eq!(roll_up.0, StatusCode::OK);
    assert_eq!(edit.0, StatusCode::OK, "{}", edit.1);

    let (_, body) = send(&t.app, "GET", &updates_uri, None).await;
    assert_eq!(body["data"]["current_version"], installed, "round {round}");
  }
}

#[tokio::test]
async fn fleet_filters_accept_surrogate_ids() {
  let t = make_app().await;
  create_product(&t.app, "P1").await;
  publish(&t.app, "P1", "1.0.0", "feature").await;
  publish(&t.app, "P1", "1.1.0", "feature").await;
  create_fleet(&t.app).await;
  create_deployment(&t.app, "P1", "production", "1.0.0").await;

  let (_, customer) = send(&t.app, "GET", "/api/v1/customers/ACME", None).await;
  let customer_id = customer["data"]["id"].as_str().unwrap().to_owned();
  let (_, tenant) = send(&t.app, "GET", "/api/v1/customers/ACME/tenants/T1", None).await;
  let tenant_id = tenant["data"]["id"].as_str().unwrap().to_owned();

  for query in [
    format!("customer_id={customer_id}"),
    format!("tenant_id={tenant_id}"),
    "customer_id=ACME".to_owned(),
  ] {
    let (_, body) =
      send(&t.app, "GET", &format!("/api/v1/updates/pending?{query}"), None).await;
    assert_eq!(body["meta"]["total"], 1, "{query}");
  }

  let (_, body) =
    send(&t.app, "GET", "/api/v1/updates/pending?customer_id=NOBODY", None).await;
  assert_eq!(body["meta"]["total"], 0);
}

// ── Version numbers ─────────────────────────────────────────────────────────

#[tokio::test]
async fn equivalent_version_numbers_conflict() {
  let t = make_app().await;
  create_product(&t.app, "P1").await;
  create_version(&t.app, "P1", "1.0.0", "feature").await;

  for number in ["1.0", "1", "1.0.0.0"] {
    let (status, body) = send(
      &t.app,
      "POST",
      "/api/v1/products/P1/versions",
      Some(json!({ "version_number": number, "release_type": "feature" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{number}");
    assert_eq!(body["error"]["code"], "CONFLICT");
  }

  let (status, body) = send(
    &t.app,
    "POST",
    "/api/v1/products/P1/versions",
    Some(json!({ "version_number": "+1.1", "release_type": "feature" })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"]["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn deprecated_version_reaches_eol_and_stops() {
  let t = make_app().await;
  create_product(&t.app, "P1").await;
  let id = publish(&t.app, "P1", "1.0.0", "feature").await;

  let (status, body) =
    send(&t.app, "POST", &format!("/api/v1/versions/{id}/eol"), None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
  assert_eq!(body["error"]["code"], "INVALID_STATE");

  let (_, body) = send(&t.app, "POST", &format!("/api/v1/versions/{id}/deprecate"), None).await;
  assert_eq!(body["data"]["state"], "deprecated");
  let (status, body) = send(&t.app, "POST", &format!("/api/v1/versions/{id}/eol"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["data"]["state"], "eol");

  let (status, _) =
    send(&t.app, "POST", &format!("/api/v1/versions/{id}/deprecate"), None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(t.audit.actions().contains(&"version.eol".to_owned()));
}

#[tokio::test]
async fn second_file_field_is_rejected_and_cleaned_up() {
  let t = make_app().await;
  create_product(&t.app, "P1").await;
  let id = create_version(&t.app, "P1", "1.0.0", "feature").await;

  let mut body = Vec::new();
  body.extend_from_slice(
    format!(
      "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"package_type\"\r\n\r\nfull_installer\r\n"
    )
    .as_bytes(),
  );
  file_part(&mut body, "agent-setup.exe", b"first");
  file_part(&mut body, "agent-setup.msi", b"second");
  body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

  let (status, body) = post_multipart(&t.app, &id, body).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"]["code"], "INVALID_REQUEST");

  let version_dir = t.dir.path().join("packages").join(&id);
  let leftover = std::fs::read_dir(&version_dir)
    .map(|entries| entries.count())
    .unwrap_or(0);
  assert_eq!(leftover, 0);
  let (_, body) = send(&t.app, "GET", &format!("/api/v1/versions/{id}/packages"), None).await;
  assert!(body["data"].as_array().unwrap().is_empty());
}

// ── License terms ───────────────────────────────────────────────────────────

const TIMED_URI: &str = "/api/v1/customers/ACME/subscriptions/S1/licenses/L2";

/// Time-based license `L2` in subscription `S1`.
async fn create_timed_license(app: &Router, start: &str, end: &str) -> (StatusCode, Value) {
  send(
    app,
    "POST",
    "/api/v1/customers/ACME/subscriptions/S1/licenses",
    Some(json!({
      "license_id": "L2",
      "product_id": "P1",
      "license_type": "time_based",
      "number_of_seats": 5,
      "start_date": start,
      "end_date": end,
    })),
  )
  .await
}

async fn renew(app: &Router, uri: &str, end: &str) -> (StatusCode, Value) {
  send(app, "POST", &format!("{uri}/renew"), Some(json!({ "end_date": end }))).await
}

#[tokio::test]
async fn license_term_must_not_end_before_it_starts() {
  let t = make_app().await;
  create_product(&t.app, "P1").await;
  create_fleet(&t.app).await;
  create_license(&t.app, "P1", 10).await;

  let (status, body) =
    create_timed_license(&t.app, "2030-01-01T00:00:00Z", "2029-01-01T00:00:00Z").await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"]["code"], "INVALID_REQUEST");

  let (status, _) =
    create_timed_license(&t.app, "2030-01-01T00:00:00Z", "2031-01-01T00:00:00Z").await;
  assert_eq!(status, StatusCode::CREATED);
  let (status, body) = renew(&t.app, TIMED_URI, "2029-06-01T00:00:00Z").await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"]["code"], "INVALID_REQUEST");

  let (status, _) = renew(&t.app, LICENSE_URI, "2031-01-01T00:00:00Z").await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn lapsed_license_expires_and_renewal_reactivates_it() {
  let t = make_app().await;
  create_product(&t.app, "P1").await;
  create_fleet(&t.app).await;
  create_license(&t.app, "P1", 10).await;
  let (status, _) =
    create_timed_license(&t.app, "2020-01-01T00:00:00Z", "2021-01-01T00:00:00Z").await;
  assert_eq!(status, StatusCode::CREATED);

  let (status, body) = send(
    &t.app,
    "POST",
    &format!("{TIMED_URI}/allocate"),
    Some(json!({ "tenant_id": "T1", "seats_allocated": 1 })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"]["code"], "LICENSE_EXPIRED");

  let expired = t
    .plane
    .accountant
    .expire_overdue(&RequestContext::system(), Utc::now())
    .await
    .unwrap();
  let ids: Vec<_> = expired.iter().map(|l| l.license_id.as_str()).collect();
  assert_eq!(ids, ["L2"]);
  let again = t
    .plane
    .accountant
    .expire_overdue(&RequestContext::system(), Utc::now())
    .await
    .unwrap();
  assert!(again.is_empty());

  let (_, body) = send(&t.app, "GET", TIMED_URI, None).await;
  assert_eq!(body["data"]["status"], "expired");
  let (_, body) = send(&t.app, "GET", LICENSE_URI, None).await;
  assert_eq!(body["data"]["status"], "active");

  let (status, body) = renew(&t.app, TIMED_URI, "2099-01-01T00:00:00Z").await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["data"]["status"], "active");

  let (status, body) = renew(&t.app, TIMED_URI, "2099-01-01T00:00:00Z").await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["data"]["status"], "active");
  assert!(t.audit.actions().contains(&"license.expire".to_owned()));
}

#[tokio::test]
async fn license_with_active_allocation_cannot_be_revoked() {
  let t = make_app().await;
  create_product(&t.app, "P1").await;
  create_fleet(&t.app).await;
  create_license(&t.app, "P1", 10).await;
  let (_, allocation) = allocate(&t.app, 3).await;

  let (status, body) = send(&t.app, "POST", &format!("{LICENSE_URI}/revoke"), None).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["error"]["code"], "HAS_ALLOCATIONS");

  let aid = allocation["data"]["allocation_id"].as_str().unwrap();
  send(&t.app, "POST", &format!("{LICENSE_URI}/allocations/{aid}/release"), None).await;
  let (status, body) = send(&t.app, "POST", &format!("{LICENSE_URI}/revoke"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["data"]["status"], "revoked");
}

#[tokio::test]
async fn allocation_to_other_products_deployment_is_refused() {
  let t = make_app().await;
  create_product(&t.app, "P1").await;
  create_product(&t.app, "P2").await;
  create_fleet(&t.app).await;
  create_license(&t.app, "P1", 10).await;
  create_deployment(&t.app, "P2", "production", "1.0.0").await;

  let (status, body) = send(
    &t.app,
    "POST",
    &format!("{LICENSE_URI}/allocate"),
    Some(json!({ "tenant_id": "T1", "deployment_id": "D1", "seats_allocated": 1 })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"]["code"], "PRODUCT_MISMATCH");

  let (_, usage) = send(&t.app, "GET", &format!("{LICENSE_URI}/utilization"), None).await;
  assert_eq!(usage["data"]["allocated"], 0);
}
