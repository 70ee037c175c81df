//! [`SqliteStore`] and the generic document plumbing the trait impls share.

use std::path::Path;

use chrono::Utc;
use releasedesk_core::{
  query::{EntityRef, Page, PageRequest},
  store::StoreBackend,
};
use rusqlite::{OptionalExtension as _, params_from_iter, types::Value};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{Document, encode_uuid, text},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A ReleaseDesk store backed by a single SQLite file.
///
/// Clones share one reference-counted connection.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl StoreBackend for SqliteStore {
  type Error = Error;
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ─── Raw statements ────────────────────────────────────────────────────

  /// Run a write; returns the number of affected rows.
  pub(crate) async fn execute(
    &self,
    sql: String,
    params: Vec<Value>,
  ) -> Result<usize> {
    Ok(
      self
        .conn
        .call(move |conn| Ok(conn.execute(&sql, params_from_iter(params))?))
        .await?,
    )
  }

  /// Fetch the `doc` column of every matching row.
  pub(crate) async fn query_docs(&self, sql: String, params: Vec<Value>) -> Result<Vec<String>> {
    Ok(
      self
        .conn
        .call(move |conn| {
          let mut stmt = conn.prepare(&sql)?;
          let rows = stmt
            .query_map(params_from_iter(params), |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          Ok(rows)
        })
        .await?,
    )
  }

  /// Fetch a single row of integers.
  pub(crate) async fn query_counts<const N: usize>(
    &self,
    sql: String,
    params: Vec<Value>,
  ) -> Result<[i64; N]> {
    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(conn.query_row(&sql, params_from_iter(params), |row| {
            let mut out = [0_i64; N];
            for (i, slot) in out.iter_mut().enumerate() {
              *slot = row.get(i)?;
            }
            Ok(out)
          })?)
        })
        .await?,
    )
  }

  pub(crate) async fn count(&self, sql: String, params: Vec<Value>) -> Result<u64> {
    let [n] = self.query_counts::<1>(sql, params).await?;
    Ok(u64::try_from(n).unwrap_or(0))
  }

  // ─── Documents ─────────────────────────────────────────────────────────

  pub(crate) async fn insert_doc<D: Document>(&self, mut doc: D) -> Result<D> {
    doc.created(Utc::now());
    let columns = doc.columns();
    let names = columns.iter().map(|(c, _)| *c).collect::<Vec<_>>();
    let placeholders = (1..=names.len() + 2)
      .map(|i| format!("?{i}"))
      .collect::<Vec<_>>()
      .join(", ");
    let sql = format!(
      "INSERT INTO {} (id, {}, doc) VALUES ({placeholders})",
      D::TABLE,
      names.join(", "),
    );

    let mut params = vec![text(encode_uuid(doc.id()))];
    params.extend(columns.into_iter().map(|(_, v)| v));
    params.push(text(doc.encode()?));
    self.execute(sql, params).await?;
    Ok(doc)
  }

  /// Rewrite a row from its document. With `expect = Some((column, value))`
  /// the write only happens while the stored `column` still equals `value`.
  pub(crate) async fn update_doc_if<D: Document>(
    &self,
    mut doc: D,
    expect: Option<(&str, Value)>,
  ) -> Result<Option<D>> {
    doc.updated(Utc::now());
    let columns = doc.columns();
    let mut sets = columns
      .iter()
      .enumerate()
      .map(|(i, (c, _))| format!("{c} = ?{}", i + 1))
      .collect::<Vec<_>>();
    sets.push(format!("doc = ?{}", columns.len() + 1));
    let id_param = columns.len() + 2;

    let mut params: Vec<Value> = columns.into_iter().map(|(_, v)| v).collect();
    params.push(text(doc.encode()?));
    params.push(text(encode_uuid(doc.id())));

    let mut sql = format!(
      "UPDATE {} SET {} WHERE id = ?{id_param}",
      D::TABLE,
      sets.join(", ")
    );
    if let Some((column, value)) = expect {
      sql.push_str(&format!(" AND {column} = ?{}", id_param + 1));
      params.push(value);
    }

    let n = self.execute(sql, params).await?;
    Ok((n == 1).then_some(doc))
  }

  pub(crate) async fn update_doc<D: Document>(&self, doc: D) -> Result<D> {
    let id = doc.id();
    self
      .update_doc_if(doc, None)
      .await?
      .ok_or(Error::Missing { table: D::TABLE, id })
  }

  pub(crate) async fn get_doc<D: Document>(&self, id: Uuid) -> Result<Option<D>> {
    let sql = format!("SELECT doc FROM {} WHERE id = ?1", D::TABLE);
    self.fetch_one(sql, vec![text(encode_uuid(id))]).await
  }

  /// Resolve a surrogate id or business key. A UUID-shaped string is tried
  /// as a surrogate id first and as a business key second.
  pub(crate) async fn get_by_ref<D: Document>(
    &self,
    entity: &EntityRef,
  ) -> Result<Option<D>> {
    let raw = match entity {
      EntityRef::Id(id) => encode_uuid(*id),
      EntityRef::Key(k) => k.clone(),
    };
    let sql = format!(
      "SELECT doc FROM {table} WHERE id = ?1 OR {key} = ?1
       ORDER BY id = ?1 DESC LIMIT 1",
      table = D::TABLE,
      key = D::KEY,
    );
    self.fetch_one(sql, vec![text(raw)]).await
  }

  pub(crate) async fn fetch_one<D: Document>(
    &self,
    sql: String,
    params: Vec<Value>,
  ) -> Result<Option<D>> {
    let doc: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, params_from_iter(params), |row| row.get(0))
            .optional()?,
        )
      })
      .await?;
    doc.as_deref().map(D::decode).transpose()
  }

  pub(crate) async fn fetch_all<D: Document>(
    &self,
    sql: String,
    params: Vec<Value>,
  ) -> Result<Vec<D>> {
    self
      .query_docs(sql, params)
      .await?
      .iter()
      .map(|d| D::decode(d))
      .collect()
  }

  /// Run `SELECT doc FROM … {where_sql} ORDER BY {order}` as one page plus a
  /// total count.
  pub(crate) async fn fetch_page<D: Document>(
    &self,
    where_sql: String,
    params: Vec<Value>,
    order: &str,
    page: PageRequest,
  ) -> Result<Page<D>> {
    let total = self
      .count(
        format!("SELECT COUNT(*) FROM {}{where_sql}", D::TABLE),
        params.clone(),
      )
      .await?;
    let sql = format!(
      "SELECT doc FROM {}{where_sql} ORDER BY {order} LIMIT {} OFFSET {}",
      D::TABLE,
      page.limit,
      page.offset(),
    );
    let items = self.fetch_all(sql, params).await?;
    Ok(Page { items, page: page.page, limit: page.limit, total })
  }

  /// Delete a row by id if `guard` (an SQL condition on the row) holds.
  pub(crate) async fn delete_where(
    &self,
    table: &str,
    id: Uuid,
    guard: &str,
  ) -> Result<bool> {
    let sql = format!("DELETE FROM {table} WHERE id = ?1 AND {guard}");
    let n = self.execute(sql, vec![text(encode_uuid(id))]).await?;
    Ok(n == 1)
  }
}
