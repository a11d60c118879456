//! In-memory processed-event store.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::{SaveResult, WebhookEventRecord, WebhookEventRepository};

#[derive(Default)]
pub struct InMemoryWebhookEventRepository {
    records: RwLock<HashMap<String, WebhookEventRecord>>,
}

impl InMemoryWebhookEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl WebhookEventRepository for InMemoryWebhookEventRepository {
    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError> {
        Ok(self.records.read().await.get(event_id).cloned())
    }

    async fn save(&self, record: WebhookEventRecord) -> Result<SaveResult, DomainError> {
        let mut records = self.records.write().await;
        match records.get(&record.event_id) {
            Some(existing) if existing.outcome.is_final() => Ok(SaveResult::AlreadyExists),
            _ => {
                records.insert(record.event_id.clone(), record);
                Ok(SaveResult::Inserted)
            }
        }
    }

    async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| !r.processed_at.is_before(&cutoff));
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::webhook::{OutcomeKind, WebhookOutcome};

    fn record(id: &str, outcome: WebhookOutcome, at: Timestamp) -> WebhookEventRecord {
        WebhookEventRecord::new(id, "payment_intent.succeeded", &outcome, serde_json::json!({}), at)
    }

    #[tokio::test]
    async fn failed_record_is_replaced_but_final_record_is_kept() {
        let repo = InMemoryWebhookEventRepository::new();
        let now = Timestamp::now();

        assert_eq!(
            repo.save(record("evt_1", WebhookOutcome::failed("db down"), now)).await.unwrap(),
            SaveResult::Inserted
        );
        assert_eq!(
            repo.save(record("evt_1", WebhookOutcome::applied("ok"), now)).await.unwrap(),
            SaveResult::Inserted
        );
        assert_eq!(
            repo.save(record("evt_1", WebhookOutcome::ignored("again"), now)).await.unwrap(),
            SaveResult::AlreadyExists
        );

        let stored = repo.find_by_event_id("evt_1").await.unwrap().unwrap();
        assert_eq!(stored.outcome, OutcomeKind::Applied);
    }

    #[tokio::test]
    async fn delete_before_removes_old_records() {
        let repo = InMemoryWebhookEventRepository::new();
        let now = Timestamp::from_unix_secs(1_705_276_800).unwrap();
        repo.save(record("evt_old", WebhookOutcome::applied("ok"), now.minus_days(40)))
            .await
            .unwrap();
        repo.save(record("evt_new", WebhookOutcome::applied("ok"), now))
            .await
            .unwrap();

        let deleted = repo.delete_before(now.minus_days(30)).await.unwrap();

        assert_eq!(deleted, 1);
        assert!(repo.find_by_event_id("evt_old").await.unwrap().is_none());
        assert_eq!(repo.len().await, 1);
    }
}
