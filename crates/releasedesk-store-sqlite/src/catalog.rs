//! [`CatalogStore`] for [`SqliteStore`].

use releasedesk_core::{
  compat::{CompatibilityMatrix, UpgradePath},
  product::Product,
  query::{Page, PageRequest, ProductFilter, VersionFilter},
  store::CatalogStore,
  version::{Version, VersionState},
};
use uuid::Uuid;

use crate::{
  Result, SqliteStore,
  encode::{Where, encode_uuid, text},
};

impl CatalogStore for SqliteStore {
  // ── Products ──────────────────────────────────────────────────────────────

  async fn insert_product(&self, product: Product) -> Result<Product> {
    self.insert_doc(product).await
  }

  async fn get_product(&self, product_id: &str) -> Result<Option<Product>> {
    self
      .fetch_one(
        "SELECT doc FROM products WHERE product_id = ?1".to_owned(),
        vec![text(product_id)],
      )
      .await
  }

  async fn list_products(
    &self,
    filter: &ProductFilter,
    page: PageRequest,
  ) -> Result<Page<Product>> {
    let w = Where::new()
      .eq("product_type", filter.product_type.map(|t| t.as_str()))
      .eq_int("is_active", filter.is_active.map(i64::from));
    self.fetch_page(w.sql(), w.into_params(), "product_id", page).await
  }

  async fn update_product(&self, product: Product) -> Result<Product> {
    self.update_doc(product).await
  }

  async fn delete_product(&self, product_id: &str) -> Result<bool> {
    let n = self
      .execute(
        "DELETE FROM products WHERE product_id = ?1
           AND NOT EXISTS (SELECT 1 FROM versions WHERE product_id = ?1)"
          .to_owned(),
        vec![text(product_id)],
      )
      .await?;
    Ok(n == 1)
  }

  async fn count_versions(&self, product_id: &str) -> Result<u64> {
    self
      .count(
        "SELECT COUNT(*) FROM versions WHERE product_id = ?1".to_owned(),
        vec![text(product_id)],
      )
      .await
  }

  // ── Versions ──────────────────────────────────────────────────────────────

  async fn insert_version(&self, version: Version) -> Result<Version> {
    self.insert_doc(version).await
  }

  async fn get_version(&self, id: Uuid) -> Result<Option<Version>> {
    self.get_doc(id).await
  }

  async fn find_version(
    &self,
    product_id: &str,
    version_number: &str,
  ) -> Result<Option<Version>> {
    self
      .fetch_one(
        "SELECT doc FROM versions WHERE product_id = ?1 AND version_number = ?2"
          .to_owned(),
        vec![text(product_id), text(version_number)],
      )
      .await
  }

  async fn list_versions(
    &self,
    product_id: &str,
    filter: &VersionFilter,
  ) -> Result<Vec<Version>> {
    let w = Where::new()
      .eq("product_id", Some(product_id))
      .eq("state", filter.state.map(|s| s.as_str()))
      .eq("release_type", filter.release_type.map(|t| t.as_str()));
    let sql = format!("SELECT doc FROM versions{}", w.sql());
    self.fetch_all(sql, w.into_params()).await
  }

  async fn replace_version_if_state(
    &self,
    version: Version,
    expected: VersionState,
  ) -> Result<Option<Version>> {
    self
      .update_doc_if(version, Some(("state", text(expected.as_str()))))
      .await
  }

  async fn delete_version_if_state(
    &self,
    id: Uuid,
    expected: VersionState,
  ) -> Result<bool> {
    let n = self
      .execute(
        "DELETE FROM versions WHERE id = ?1 AND state = ?2".to_owned(),
        vec![text(encode_uuid(id)), text(expected.as_str())],
      )
      .await?;
    Ok(n == 1)
  }

  // ── Compatibility & upgrade paths ─────────────────────────────────────────

  async fn upsert_matrix(
    &self,
    mut matrix: CompatibilityMatrix,
  ) -> Result<CompatibilityMatrix> {
    match self
      .get_matrix(&matrix.product_id, &matrix.version_number)
      .await?
    {
      Some(existing) => {
        matrix.id = existing.id;
        matrix.created_at = existing.created_at;
        self.update_doc(matrix).await
      }
      None => self.insert_doc(matrix).await,
    }
  }

  async fn get_matrix(
    &self,
    product_id: &str,
    version_number: &str,
  ) -> Result<Option<CompatibilityMatrix>> {
    self
      .fetch_one(
        "SELECT doc FROM compatibility WHERE product_id = ?1 AND version_number = ?2"
          .to_owned(),
        vec![text(product_id), text(version_number)],
      )
      .await
  }

  async fn insert_upgrade_path(&self, path: UpgradePath) -> Result<UpgradePath> {
    self.insert_doc(path).await
  }

  async fn get_upgrade_path(&self, id: Uuid) -> Result<Option<UpgradePath>> {
    self.get_doc(id).await
  }

  async fn list_upgrade_paths(
    &self,
    product_id: &str,
    from_version: Option<&str>,
  ) -> Result<Vec<UpgradePath>> {
    let w = Where::new()
      .eq("product_id", Some(product_id))
      .eq("from_version", from_version);
    let sql = format!(
      "SELECT doc FROM upgrade_paths{} ORDER BY from_version, to_version",
      w.sql()
    );
    self.fetch_all(sql, w.into_params()).await
  }

  async fn update_upgrade_path(&self, path: UpgradePath) -> Result<UpgradePath> {
    self.update_doc(path).await
  }

  async fn delete_upgrade_path(&self, id: Uuid) -> Result<bool> {
    self.delete_where("upgrade_paths", id, "1 = 1").await
  }
}
