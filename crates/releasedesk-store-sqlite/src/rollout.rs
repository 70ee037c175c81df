//! [`RolloutStore`] for [`SqliteStore`].

use releasedesk_core::{
  query::{DetectionFilter, Page, PageRequest, RolloutFilter},
  rollout::{UpdateDetection, UpdateRollout},
  store::RolloutStore,
};
use uuid::Uuid;

use crate::{
  Result, SqliteStore,
  encode::{Where, text},
};

impl RolloutStore for SqliteStore {
  async fn upsert_detection(
    &self,
    mut detection: UpdateDetection,
  ) -> Result<UpdateDetection> {
    let existing: Option<UpdateDetection> = self
      .fetch_one(
        "SELECT doc FROM update_detections WHERE endpoint_id = ?1 AND product_id = ?2"
          .to_owned(),
        vec![text(&detection.endpoint_id), text(&detection.product_id)],
      )
      .await?;
    match existing {
      Some(prev) => {
        detection.id = prev.id;
        detection.detected_at = prev.detected_at;
        detection.created_at = prev.created_at;
        self.update_doc(detection).await
      }
      None => self.insert_doc(detection).await,
    }
  }

  async fn list_detections(
    &self,
    filter: &DetectionFilter,
  ) -> Result<Vec<UpdateDetection>> {
    let w = Where::new()
      .eq("endpoint_id", filter.endpoint_id.as_deref())
      .eq("product_id", filter.product_id.as_deref());
    let sql = format!(
      "SELECT doc FROM update_detections{} ORDER BY endpoint_id, product_id",
      w.sql()
    );
    self.fetch_all(sql, w.into_params()).await
  }

  async fn insert_rollout(&self, rollout: UpdateRollout) -> Result<UpdateRollout> {
    self.insert_doc(rollout).await
  }

  async fn get_rollout(&self, id: Uuid) -> Result<Option<UpdateRollout>> {
    self.get_doc(id).await
  }

  async fn list_rollouts(
    &self,
    filter: &RolloutFilter,
    page: PageRequest,
  ) -> Result<Page<UpdateRollout>> {
    let w = Where::new()
      .eq("endpoint_id", filter.endpoint_id.as_deref())
      .eq("product_id", filter.product_id.as_deref())
      .eq("status", filter.status.map(|s| s.as_str()));
    self
      .fetch_page(w.sql(), w.into_params(), "created_at DESC, id", page)
      .await
  }

  async fn update_rollout(&self, rollout: UpdateRollout) -> Result<UpdateRollout> {
    self.update_doc(rollout).await
  }
}
