//! Versions, their lifecycle states and attached packages.
//!
//! A version moves along a single directed path:
//!
//! ```text
//! draft -> pending_review -> approved -> released -> deprecated -> eol
//! ```
//!
//! Field edits and package attachment are only possible in `draft`. No
//! backward or skipping transition exists.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Enumerations ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseType {
  Major,
  Feature,
  Maintenance,
  Security,
}

impl ReleaseType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Major => "major",
      Self::Feature => "feature",
      Self::Maintenance => "maintenance",
      Self::Security => "security",
    }
  }
}

/// The lifecycle state of a version. Declaration order is lifecycle order.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum VersionState {
  Draft,
  PendingReview,
  Approved,
  Released,
  Deprecated,
  Eol,
}

impl VersionState {
  pub const ALL: [Self; 6] = [
    Self::Draft,
    Self::PendingReview,
    Self::Approved,
    Self::Released,
    Self::Deprecated,
    Self::Eol,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Draft => "draft",
      Self::PendingReview => "pending_review",
      Self::Approved => "approved",
      Self::Released => "released",
      Self::Deprecated => "deprecated",
      Self::Eol => "eol",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|st| st.as_str() == s)
  }

  /// The single state reachable from `self`, if any.
  pub fn successor(self) -> Option<Self> {
    match self {
      Self::Draft => Some(Self::PendingReview),
      Self::PendingReview => Some(Self::Approved),
      Self::Approved => Some(Self::Released),
      Self::Released => Some(Self::Deprecated),
      Self::Deprecated => Some(Self::Eol),
      Self::Eol => None,
    }
  }

  pub fn can_transition_to(self, next: Self) -> bool {
    self.successor() == Some(next)
  }

  /// Approval metadata must be present exactly in these states.
  pub fn is_approved_or_later(self) -> bool { self >= Self::Approved }
}

impl fmt::Display for VersionState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A named edge of the lifecycle graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
  Submit,
  Approve,
  Release,
  Deprecate,
  EndOfLife,
}

impl Transition {
  pub fn from_state(self) -> VersionState {
    match self {
      Self::Submit => VersionState::Draft,
      Self::Approve => VersionState::PendingReview,
      Self::Release => VersionState::Approved,
      Self::Deprecate => VersionState::Released,
      Self::EndOfLife => VersionState::Deprecated,
    }
  }

  pub fn to_state(self) -> VersionState {
    match self {
      Self::Submit => VersionState::PendingReview,
      Self::Approve => VersionState::Approved,
      Self::Release => VersionState::Released,
      Self::Deprecate => VersionState::Deprecated,
      Self::EndOfLife => VersionState::Eol,
    }
  }

  /// Action name used in audit entries.
  pub fn action(self) -> &'static str {
    match self {
      Self::Submit => "version.submit",
      Self::Approve => "version.approve",
      Self::Release => "version.release",
      Self::Deprecate => "version.deprecate",
      Self::EndOfLife => "version.eol",
    }
  }
}

impl fmt::Display for Transition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let verb = match self {
      Self::Submit => "submit",
      Self::Approve => "approve",
      Self::Release => "release",
      Self::Deprecate => "deprecate",
      Self::EndOfLife => "end-of-life",
    };
    f.write_str(verb)
  }
}

// ─── Packages ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageType {
  FullInstaller,
  Update,
  Delta,
  Rollback,
}

impl PackageType {
  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "full_installer" => Some(Self::FullInstaller),
      "update" => Some(Self::Update),
      "delta" => Some(Self::Delta),
      "rollback" => Some(Self::Rollback),
      _ => None,
    }
  }
}

/// A package artifact embedded in a version. Immutable once attached; the
/// bytes live outside the store, one file per `package_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
  pub package_id:      Uuid,
  pub package_type:    PackageType,
  pub file_name:       String,
  pub file_size:       u64,
  /// Lowercase SHA-256 hex digest of the file contents.
  pub checksum_sha256: String,
  pub os:              Option<String>,
  pub architecture:    Option<String>,
  pub uploaded_at:     DateTime<Utc>,
  pub uploaded_by:     String,
}

/// Input to [`crate::lifecycle::VersionLifecycle::attach_package`].
///
/// `package_id` is chosen by the caller because the byte store is written
/// before the metadata is attached.
#[derive(Debug, Clone)]
pub struct NewPackage {
  pub package_id:      Uuid,
  pub package_type:    PackageType,
  pub file_name:       String,
  pub file_size:       u64,
  pub checksum_sha256: String,
  pub os:              Option<String>,
  pub architecture:    Option<String>,
}

// ─── Version ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
  pub id:                         Uuid,
  pub product_id:                 String,
  pub version_number:             String,
  pub release_type:               ReleaseType,
  pub state:                      VersionState,
  pub release_date:               DateTime<Utc>,
  pub eol_date:                   Option<DateTime<Utc>>,
  pub min_server_version:         Option<String>,
  pub max_server_version:         Option<String>,
  pub recommended_server_version: Option<String>,
  pub release_notes:              Option<String>,
  #[serde(default)]
  pub packages:                   Vec<PackageInfo>,
  pub created_by:                 String,
  pub approved_by:                Option<String>,
  pub approved_at:                Option<DateTime<Utc>>,
  pub released_by:                Option<String>,
  pub released_at:                Option<DateTime<Utc>>,
  pub created_at:                 DateTime<Utc>,
  pub updated_at:                 DateTime<Utc>,
}

impl Version {
  /// `true` once `eol_date` is set and no longer in the future.
  pub fn is_past_eol(&self, now: DateTime<Utc>) -> bool {
    self.eol_date.is_some_and(|eol| eol <= now)
  }

  /// A version can be offered as an update iff it is released and its
  /// end-of-life date, if any, is still ahead.
  pub fn is_offerable(&self, now: DateTime<Utc>) -> bool {
    self.state == VersionState::Released && !self.is_past_eol(now)
  }

  pub fn package(&self, package_id: Uuid) -> Option<&PackageInfo> {
    self.packages.iter().find(|p| p.package_id == package_id)
  }
}

/// Input to [`crate::lifecycle::VersionLifecycle::create_version`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewVersion {
  pub version_number:             String,
  pub release_type:               ReleaseType,
  /// Defaults to the creation time.
  pub release_date:               Option<DateTime<Utc>>,
  pub eol_date:                   Option<DateTime<Utc>>,
  pub min_server_version:         Option<String>,
  pub max_server_version:         Option<String>,
  pub recommended_server_version: Option<String>,
  pub release_notes:              Option<String>,
}

/// Editable fields of a draft. The version number is the identity of a
/// version and cannot be patched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VersionPatch {
  pub release_type:               Option<ReleaseType>,
  pub release_date:               Option<DateTime<Utc>>,
  pub eol_date:                   Option<DateTime<Utc>>,
  pub min_server_version:         Option<String>,
  pub max_server_version:         Option<String>,
  pub recommended_server_version: Option<String>,
  pub release_notes:              Option<String>,
}

impl VersionPatch {
  pub fn is_empty(&self) -> bool {
    self.release_type.is_none()
      && self.release_date.is_none()
      && self.eol_date.is_none()
      && self.min_server_version.is_none()
      && self.max_server_version.is_none()
      && self.recommended_server_version.is_none()
      && self.release_notes.is_none()
  }

  /// Server-version bounds named by this patch, for validation.
  pub fn server_versions(&self) -> impl Iterator<Item = &str> {
    [
      &self.min_server_version,
      &self.max_server_version,
      &self.recommended_server_version,
    ]
    .into_iter()
    .filter_map(|v| v.as_deref())
  }

  pub fn apply(self, v: &mut Version) {
    if let Some(rt) = self.release_type {
      v.release_type = rt;
    }
    if let Some(d) = self.release_date {
      v.release_date = d;
    }
    if let Some(d) = self.eol_date {
      v.eol_date = Some(d);
    }
    if let Some(s) = self.min_server_version {
      v.min_server_version = Some(s);
    }
    if let Some(s) = self.max_server_version {
      v.max_server_version = Some(s);
    }
    if let Some(s) = self.recommended_server_version {
      v.recommended_server_version = Some(s);
    }
    if let Some(n) = self.release_notes {
      v.release_notes = Some(n);
    }
  }
}
