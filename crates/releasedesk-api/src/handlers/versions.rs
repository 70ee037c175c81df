//! Handlers for versions, their lifecycle transitions and packages.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET` `POST` | `/products/{product_id}/versions` | list is semver-descending |
//! | `GET`  | `/products/{product_id}/versions/latest` | newest released, non-EOL |
//! | `GET` `PUT` `DELETE` | `/versions/{id}` | edits and deletes only in `draft` |
//! | `POST` | `/versions/{id}/{submit,approve,release,deprecate,eol}` | one step along the lifecycle |
//! | `GET` `POST` | `/versions/{id}/packages` | upload is `multipart/form-data` |
//! | `GET`  | `/versions/{id}/packages/{package_id}[/download]` | |

use std::sync::Arc;

use axum::{
  body::Body,
  extract::{Multipart, State},
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use bytes::Bytes;
use releasedesk_core::{
  Error as CoreError,
  query::VersionFilter,
  store::Store,
  version::{NewPackage, NewVersion, PackageInfo, PackageType, Version, VersionPatch, VersionState},
};
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::{
  AppState,
  envelope::{Envelope, Message},
  error::{ApiError, Result},
  extract::{ApiJson, ApiPath, ApiQuery, Caller, PageQuery},
  handlers::optional_json,
  packages::StoredFile,
};

pub const CHECKSUM_HEADER: &str = "x-checksum-sha256";

// ─── Reads ───────────────────────────────────────────────────────────────────

/// `GET /products/{product_id}/versions`
pub async fn list<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  ApiPath(product_id): ApiPath<String>,
  ApiQuery(filter): ApiQuery<VersionFilter>,
  ApiQuery(page): ApiQuery<PageQuery>,
) -> Result<Envelope<Vec<Version>>> {
  let versions = state
    .plane
    .lifecycle
    .list_versions(&product_id, &filter, page.with_default(20))
    .await?;
  Ok(Envelope::page(versions))
}

/// `GET /products/{product_id}/versions/latest`
pub async fn latest<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  ApiPath(product_id): ApiPath<String>,
) -> Result<Envelope<Version>> {
  Ok(Envelope::ok(state.plane.lifecycle.latest_release(&product_id).await?))
}

/// `GET /versions/{id}`
pub async fn get_one<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  ApiPath(id): ApiPath<Uuid>,
) -> Result<Envelope<Version>> {
  Ok(Envelope::ok(state.plane.lifecycle.get_version(id).await?))
}

// ─── Draft editing ───────────────────────────────────────────────────────────

/// `POST /products/{product_id}/versions`
pub async fn create<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath(product_id): ApiPath<String>,
  ApiJson(input): ApiJson<NewVersion>,
) -> Result<Envelope<Version>> {
  let version = state
    .plane
    .lifecycle
    .create_version(&ctx, &product_id, input)
    .await?;
  Ok(Envelope::created(version))
}

/// `PUT /versions/{id}`
pub async fn update<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath(id): ApiPath<Uuid>,
  ApiJson(patch): ApiJson<VersionPatch>,
) -> Result<Envelope<Version>> {
  Ok(Envelope::ok(state.plane.lifecycle.update_draft(&ctx, id, patch).await?))
}

/// `DELETE /versions/{id}`
///
/// Also removes the package files.
pub async fn delete<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath(id): ApiPath<Uuid>,
) -> Result<Envelope<Message>> {
  let version = state.plane.lifecycle.delete_version(&ctx, id).await?;
  if let Err(e) = state.packages.remove_version(id).await {
    tracing::warn!(version = %id, "failed to remove package files: {e}");
  }
  Ok(Envelope::ok(Message::new(format!(
    "version {} of {} deleted",
    version.version_number, version.product_id
  ))))
}

// ─── Transitions ─────────────────────────────────────────────────────────────

/// `POST /versions/{id}/submit`
pub async fn submit<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath(id): ApiPath<Uuid>,
) -> Result<Envelope<Version>> {
  Ok(Envelope::ok(state.plane.lifecycle.submit_for_review(&ctx, id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct ApproveBody {
  pub approved_by: Option<String>,
}

/// `POST /versions/{id}/approve`
///
/// Optional body `{"approved_by": "…"}`;
/// the caller is recorded when absent.
pub async fn approve<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath(id): ApiPath<Uuid>,
  body: Bytes,
) -> Result<Envelope<Version>> {
  let body: ApproveBody = optional_json(&body)?;
  let version = state
    .plane
    .lifecycle
    .approve(&ctx, id, body.approved_by)
    .await?;
  Ok(Envelope::ok(version))
}

/// `POST /versions/{id}/release`
pub async fn release<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath(id): ApiPath<Uuid>,
) -> Result<Envelope<Version>> {
  Ok(Envelope::ok(state.plane.lifecycle.release(&ctx, id).await?))
}

/// `POST /versions/{id}/deprecate`
pub async fn deprecate<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath(id): ApiPath<Uuid>,
) -> Result<Envelope<Version>> {
  Ok(Envelope::ok(state.plane.lifecycle.deprecate(&ctx, id).await?))
}

/// `POST /versions/{id}/eol`
pub async fn eol<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath(id): ApiPath<Uuid>,
) -> Result<Envelope<Version>> {
  Ok(Envelope::ok(state.plane.lifecycle.mark_eol(&ctx, id).await?))
}

// ─── Packages ────────────────────────────────────────────────────────────────

/// `GET /versions/{id}/packages`
pub async fn list_packages<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  ApiPath(id): ApiPath<Uuid>,
) -> Result<Envelope<Vec<PackageInfo>>> {
  Ok(Envelope::ok(state.plane.lifecycle.list_packages(id).await?))
}

/// `GET /versions/{id}/packages/{package_id}`
pub async fn get_package<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  ApiPath((id, package_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<Envelope<PackageInfo>> {
  Ok(Envelope::ok(state.plane.lifecycle.get_package(id, package_id).await?))
}

/// Text fields of an upload, collected in any order.
#[derive(Debug, Default)]
struct UploadFields {
  package_type:    Option<String>,
  os:              Option<String>,
  architecture:    Option<String>,
  checksum_sha256: Option<String>,
}

/// `POST /versions/{id}/packages`
///
/// Multipart fields `file` (required),
/// `package_type` (required), `os`, `architecture`, and `checksum_sha256`
/// (verified against the received bytes when present).
pub async fn upload_package<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  Caller(ctx): Caller,
  ApiPath(id): ApiPath<Uuid>,
  mut multipart: Multipart,
) -> Result<Envelope<Version>> {
  // Refuse early instead of writing bytes that can never be attached.
  let version = state.plane.lifecycle.get_version(id).await?;
  if version.state != VersionState::Draft {
    return Err(
      CoreError::InvalidState(format!(
        "packages can only be attached in draft; version is {}",
        version.state
      ))
      .into(),
    );
  }

  let package_id = Uuid::new_v4();
  let mut fields = UploadFields::default();
  let mut upload: Option<(String, StoredFile)> = None;

  while let Some(mut field) = multipart.next_field().await? {
    let name = field.name().unwrap_or_default().to_owned();
    match name.as_str() {
      "file" => {
        if let Some((first, _)) = &upload {
          let duplicate = ApiError::BadRequest("only one file field is allowed".into());
          return Err(discard(&state, id, package_id, first, duplicate).await);
        }
        let file_name = field
          .file_name()
          .map(str::to_owned)
          .filter(|n| !n.is_empty())
          .ok_or_else(|| ApiError::BadRequest("file field needs a file name".into()))?;
        let mut writer = state.packages.create(id, package_id, &file_name).await?;
        while let Some(chunk) = field.chunk().await? {
          writer.write(&chunk).await?;
        }
        upload = Some((file_name, writer.finish().await?));
      }
      "package_type" => fields.package_type = Some(field.text().await?),
      "os" => fields.os = Some(field.text().await?),
      "architecture" => fields.architecture = Some(field.text().await?),
      "checksum_sha256" => fields.checksum_sha256 = Some(field.text().await?),
      _ => {}
    }
  }

  let Some((file_name, stored)) = upload else {
    return Err(ApiError::BadRequest("missing file field".into()));
  };

  match attach(&state, &ctx, id, package_id, &file_name, stored, fields).await {
    Ok(version) => Ok(Envelope::created(version)),
    Err(e) => Err(discard(&state, id, package_id, &file_name, e).await),
  }
}

/// Remove the file of a rejected upload and hand back the rejection.
async fn discard<S: Store>(
  state: &AppState<S>,
  id: Uuid,
  package_id: Uuid,
  file_name: &str,
  err: ApiError,
) -> ApiError {
  if let Err(io) = state.packages.remove(id, package_id, file_name).await {
    tracing::warn!(package = %package_id, "failed to remove rejected upload: {io}");
  }
  err
}

async fn attach<S: Store>(
  state: &AppState<S>,
  ctx: &releasedesk_core::RequestContext,
  id: Uuid,
  package_id: Uuid,
  file_name: &str,
  stored: StoredFile,
  fields: UploadFields,
) -> Result<Version> {
  let raw_type = fields
    .package_type
    .ok_or_else(|| ApiError::BadRequest("missing package_type field".into()))?;
  let package_type = PackageType::parse(raw_type.trim())
    .ok_or_else(|| ApiError::BadRequest(format!("unknown package_type {raw_type:?}")))?;

  if let Some(expected) = fields.checksum_sha256
    && !expected.trim().eq_ignore_ascii_case(&stored.checksum_sha256)
  {
    return Err(ApiError::BadRequest(format!(
      "checksum mismatch: expected {}, received {}",
      expected.trim(),
      stored.checksum_sha256
    )));
  }

  let package = NewPackage {
    package_id,
    package_type,
    file_name: file_name.to_owned(),
    file_size: stored.file_size,
    checksum_sha256: stored.checksum_sha256,
    os: fields.os.filter(|s| !s.is_empty()),
    architecture: fields.architecture.filter(|s| !s.is_empty()),
  };
  Ok(state.plane.lifecycle.attach_package(ctx, id, package).await?)
}

/// Characters safe inside a quoted `Content-Disposition` file name.
fn disposition_name(file_name: &str) -> String {
  file_name
    .chars()
    .filter(|c| c.is_ascii_graphic() || *c == ' ')
    .filter(|c| !matches!(c, '"' | '\\'))
    .collect()
}

/// `GET /versions/{id}/packages/{package_id}/download`
pub async fn download_package<S: Store>(
  State(state): State<Arc<AppState<S>>>,
  ApiPath((id, package_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<Response> {
  let package = state.plane.lifecycle.get_package(id, package_id).await?;
  let (file, len) = state.packages.open(id, &package).await.map_err(|e| {
    if e.kind() == std::io::ErrorKind::NotFound {
      ApiError::Core(CoreError::NotFound(format!("package file {package_id}")))
    } else {
      ApiError::Storage(e)
    }
  })?;

  let disposition = HeaderValue::from_str(&format!(
    "attachment; filename=\"{}\"",
    disposition_name(&package.file_name)
  ))
  .map_err(CoreError::internal)?;
  let checksum =
    HeaderValue::from_str(&package.checksum_sha256).map_err(CoreError::internal)?;

  Ok(
    (
      StatusCode::OK,
      [
        (header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
        (header::CONTENT_DISPOSITION, disposition),
        (header::CONTENT_LENGTH, HeaderValue::from(len)),
        (header::HeaderName::from_static(CHECKSUM_HEADER), checksum),
      ],
      Body::from_stream(ReaderStream::new(file)),
    )
      .into_response(),
  )
}
