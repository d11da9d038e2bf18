use std::sync::Arc;

use uuid::Uuid;

use crate::db::{CaseData, CaseRecord};
use crate::error::{DatabaseError, RecordError};
use crate::records::{
    InFlight, RecordCache, ServiceContext, UpdateOutcome, purge_attachments, update_with_cleanup,
};

const ENTITY: &str = "case";

pub struct CaseService {
    ctx: Arc<ServiceContext>,
    cache: RecordCache<CaseRecord>,
    in_flight: InFlight,
}

impl CaseService {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self {
            ctx,
            cache: RecordCache::new(),
            in_flight: InFlight::default(),
        }
    }

    /// Cached cases, newest first.
    pub async fn list(&self) -> Vec<CaseRecord> {
        self.cache.snapshot().await
    }

    pub async fn get(&self, id: Uuid) -> Option<CaseRecord> {
        self.cache.find(|c| c.id == id).await
    }

    pub async fn refresh(&self) -> Result<(), DatabaseError> {
        let cases = self.ctx.db.list_cases().await?;
        tracing::debug!(count = cases.len(), "Fetched cases");
        self.cache.replace(cases).await;
        Ok(())
    }

    pub(crate) async fn clear(&self) {
        self.cache.clear().await;
    }

    async fn refresh_or_alert(&self) {
        if let Err(e) = self.refresh().await {
            tracing::error!("Failed to re-fetch cases: {}", e);
            self.ctx.alert("error_loading_data", &e.to_string());
        }
    }

    pub async fn add(&self, data: CaseData) -> Result<(), RecordError> {
        let owner = self.ctx.owner()?;
        if let Err(e) = self.ctx.db.insert_case(owner, &data).await {
            tracing::error!(reference = %data.reference_id, "Failed to add case: {}", e);
            self.ctx.alert("error_saving_record", &e.to_string());
            return Err(e.into());
        }
        tracing::info!(reference = %data.reference_id, case_type = %data.case_type, "Added case");
        self.refresh_or_alert().await;
        Ok(())
    }

    pub async fn update(
        &self,
        original: &CaseRecord,
        updated: &CaseData,
    ) -> Result<UpdateOutcome, RecordError> {
        let _guard = self.in_flight.begin(ENTITY, original.id)?;
        let outcome = update_with_cleanup(
            &self.ctx,
            ENTITY,
            &original.data.attachments,
            &updated.attachments,
            self.ctx.db.update_case(original.id, updated),
        )
        .await;
        if outcome.record.is_ok() {
            self.refresh_or_alert().await;
        }
        Ok(outcome)
    }

    /// Returns `false` when the user declines the confirmation.
    pub async fn delete(&self, id: Uuid) -> Result<bool, RecordError> {
        if !self.ctx.confirm("confirm_delete_case").await {
            return Ok(false);
        }
        let case = self
            .get(id)
            .await
            .ok_or(RecordError::NotLoaded { entity: ENTITY, id })?;
        let _guard = self.in_flight.begin(ENTITY, id)?;

        purge_attachments(&self.ctx, ENTITY, &case.data.attachments).await?;
        if let Err(e) = self.ctx.db.delete_case(id).await {
            tracing::error!(%id, "Failed to delete case: {}", e);
            self.ctx.alert("error_deleting_record", &e.to_string());
            return Err(e.into());
        }
        tracing::info!(%id, reference = %case.data.reference_id, "Deleted case");
        self.refresh_or_alert().await;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::{Attachment, CaseData, CaseStatus};
    use crate::error::RecordError;
    use crate::testing::TestHarness;

    fn attachment(name: &str) -> Attachment {
        Attachment {
            id: format!("1-{name}"),
            name: name.to_string(),
            url: Some(format!(
                "https://test.supabase.co/storage/v1/object/public/attachments/owner/1_{name}"
            )),
            uploaded_at: None,
        }
    }

    fn case(reference: &str) -> CaseData {
        CaseData {
            reference_id: reference.to_string(),
            case_type: "Litigation".to_string(),
            case_subtype: "Civil".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn update_replacing_attachment_deletes_exactly_the_old_path() {
        let harness = TestHarness::signed_in();
        let mut data = case("LIT-001");
        data.attachments = vec![attachment("a.pdf")];
        let id = harness.db.seed_case(harness.user_id, data);
        harness.cases.refresh().await.expect("refresh");
        let original = harness.cases.get(id).await.expect("cached");

        let mut updated = original.data.clone();
        updated.attachments = vec![attachment("b.pdf")];
        let outcome = harness.cases.update(&original, &updated).await.expect("update");

        assert!(outcome.is_ok());
        assert_eq!(outcome.cleanup.as_ref().ok(), Some(&1));
        assert_eq!(
            harness.storage.delete_batches(),
            vec![vec!["owner/1_a.pdf".to_string()]]
        );
        let saved = harness.cases.get(id).await.expect("cached");
        assert_eq!(saved.data.attachments, vec![attachment("b.pdf")]);
    }

    #[tokio::test]
    async fn update_without_removed_files_makes_no_storage_call() {
        let harness = TestHarness::signed_in();
        let id = harness.db.seed_case(harness.user_id, case("LIT-002"));
        harness.cases.refresh().await.expect("refresh");
        let original = harness.cases.get(id).await.expect("cached");

        let mut updated = original.data.clone();
        updated.status = CaseStatus::Completed;
        let outcome = harness.cases.update(&original, &updated).await.expect("update");

        assert!(outcome.is_ok());
        assert!(harness.storage.delete_batches().is_empty());
        assert_eq!(
            harness.cases.get(id).await.expect("cached").data.status,
            CaseStatus::Completed
        );
    }

    #[tokio::test]
    async fn failed_row_write_is_reported_and_cache_untouched() {
        let harness = TestHarness::signed_in();
        let id = harness.db.seed_case(harness.user_id, case("LIT-003"));
        harness.cases.refresh().await.expect("refresh");
        let original = harness.cases.get(id).await.expect("cached");
        harness.db.fail_writes(true);

        let mut updated = original.data.clone();
        updated.notes = "changed".to_string();
        let outcome = harness.cases.update(&original, &updated).await.expect("update");

        assert!(outcome.record.is_err());
        assert!(outcome.cleanup.is_ok());
        assert_eq!(harness.cases.get(id).await.expect("cached").data.notes, "");
        assert_eq!(harness.notifier.messages().len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_row_and_files() {
        let harness = TestHarness::signed_in();
        let mut data = case("LIT-004");
        data.attachments = vec![attachment("writ.pdf")];
        let id = harness.db.seed_case(harness.user_id, data);
        harness.cases.refresh().await.expect("refresh");

        assert!(harness.cases.delete(id).await.expect("delete"));
        assert_eq!(harness.storage.delete_batches().len(), 1);
        assert!(harness.db.cases().is_empty());
    }

    #[tokio::test]
    async fn overlapping_update_and_delete_are_rejected() {
        let harness = TestHarness::signed_in();
        let id = harness.db.seed_case(harness.user_id, case("LIT-006"));
        harness.cases.refresh().await.expect("refresh");
        let original = harness.cases.get(id).await.expect("cached");

        let gate = harness.db.hold_writes().await;
        let first = {
            let cases = harness.cases.clone();
            let original = original.clone();
            let mut updated = original.data.clone();
            updated.notes = "first".to_string();
            tokio::spawn(async move { cases.update(&original, &updated).await })
        };
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        let mut second = original.data.clone();
        second.notes = "second".to_string();
        let err = harness
            .cases
            .update(&original, &second)
            .await
            .expect_err("first update still running");
        assert!(matches!(err, RecordError::InFlight { entity: "case" }));
        let err = harness.cases.delete(id).await.expect_err("first update still running");
        assert!(matches!(err, RecordError::InFlight { .. }));

        drop(gate);
        let outcome = first.await.expect("task").expect("update");
        assert!(outcome.is_ok());
        assert_eq!(harness.cases.get(id).await.expect("cached").data.notes, "first");

        // The claim is released once the first update finishes.
        assert!(harness.cases.delete(id).await.expect("delete"));
    }

    #[tokio::test]
    async fn failed_insert_surfaces_backend_error() {
        let harness = TestHarness::signed_in();
        harness.db.fail_writes(true);
        let err = harness.cases.add(case("LIT-005")).await.expect_err("write fails");
        assert!(matches!(err, RecordError::Database(_)));
        assert_eq!(harness.notifier.messages().len(), 1);
    }
}
