//! Package byte storage on the local filesystem.
//!
//! Each package is one file at `<root>/<version_id>/<package_id><ext>`, where
//! `<ext>` is the extension of the uploaded file name. The SHA-256 digest and
//! the length are computed while the bytes are written.

use std::{
  io,
  path::{Path, PathBuf},
};

use releasedesk_core::version::PackageInfo;
use sha2::{Digest, Sha256};
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

/// Result of writing one package file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
  pub path:            PathBuf,
  pub file_size:       u64,
  pub checksum_sha256: String,
}

#[derive(Debug, Clone)]
pub struct PackageStorage {
  root: PathBuf,
}

/// Extension of `file_name` including the leading dot, or empty.
fn extension(file_name: &str) -> String {
  Path::new(file_name)
    .extension()
    .and_then(|e| e.to_str())
    .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
    .map(|e| format!(".{e}"))
    .unwrap_or_default()
}

impl PackageStorage {
  pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

  pub fn root(&self) -> &Path { &self.root }

  pub fn path_for(&self, version_id: Uuid, package_id: Uuid, file_name: &str) -> PathBuf {
    self
      .root
      .join(version_id.to_string())
      .join(format!("{package_id}{}", extension(file_name)))
  }

  /// Begin writing a new package file.
  pub async fn create(
    &self,
    version_id: Uuid,
    package_id: Uuid,
    file_name: &str,
  ) -> io::Result<PackageWriter> {
    let path = self.path_for(version_id, package_id, file_name);
    if let Some(dir) = path.parent() {
      fs::create_dir_all(dir).await?;
    }
    let file = fs::File::create(&path).await?;
    Ok(PackageWriter { path, file, hasher: Sha256::new(), written: 0 })
  }

  /// Open the file of an attached package for streaming, with its length on
  /// disk.
  pub async fn open(
    &self,
    version_id: Uuid,
    package: &PackageInfo,
  ) -> io::Result<(fs::File, u64)> {
    let path = self.path_for(version_id, package.package_id, &package.file_name);
    let file = fs::File::open(path).await?;
    let len = file.metadata().await?.len();
    Ok((file, len))
  }

  /// Remove a package file; a missing file is not an error.
  pub async fn remove(
    &self,
    version_id: Uuid,
    package_id: Uuid,
    file_name: &str,
  ) -> io::Result<()> {
    match fs::remove_file(self.path_for(version_id, package_id, file_name)).await {
      Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
      _ => Ok(()),
    }
  }

  /// Remove every package file of a version.
  pub async fn remove_version(&self, version_id: Uuid) -> io::Result<()> {
    match fs::remove_dir_all(self.root.join(version_id.to_string())).await {
      Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
      _ => Ok(()),
    }
  }
}

/// An in-progress package write.
pub struct PackageWriter {
  path:    PathBuf,
  file:    fs::File,
  hasher:  Sha256,
  written: u64,
}

impl PackageWriter {
  pub async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
    self.file.write_all(chunk).await?;
    self.hasher.update(chunk);
    self.written += chunk.len() as u64;
    Ok(())
  }

  pub async fn finish(mut self) -> io::Result<StoredFile> {
    self.file.flush().await?;
    self.file.sync_all().await?;
    Ok(StoredFile {
      path:            self.path,
      file_size:       self.written,
      checksum_sha256: hex::encode(self.hasher.finalize()),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn extension_is_kept_when_plain() {
    assert_eq!(extension("setup.msi"), ".msi");
    assert_eq!(extension("bundle.tar.gz"), ".gz");
    assert_eq!(extension("README"), "");
    assert_eq!(extension("evil.m$i"), "");
  }

  #[tokio::test]
  async fn write_hashes_and_counts() {
    let dir = tempfile::tempdir().unwrap();
    let storage = PackageStorage::new(dir.path());
    let (version_id, package_id) = (Uuid::new_v4(), Uuid::new_v4());

    let mut w = storage.create(version_id, package_id, "a.bin").await.unwrap();
    w.write(b"hello ").await.unwrap();
    w.write(b"world").await.unwrap();
    let stored = w.finish().await.unwrap();

    assert_eq!(stored.file_size, 11);
    assert_eq!(
      stored.checksum_sha256,
      "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
    );
    assert_eq!(stored.path, storage.path_for(version_id, package_id, "a.bin"));

    storage.remove(version_id, package_id, "a.bin").await.unwrap();
    storage.remove(version_id, package_id, "a.bin").await.unwrap();
  }
}
