//! 会话持久化协调
//!
//! 记录 blob 与 History 元数据总是一起写：先写记录，再刷新 updated_at 并写元数据。

use std::sync::Arc;

use crate::alert::Alert;
use crate::core::AgentError;
use crate::memory::{load_transcript, save_transcript, Content, History, Repository, Storage};

#[derive(Clone)]
pub struct HistoryStore {
    repo: Arc<dyn Repository>,
    storage: Arc<dyn Storage>,
}

impl HistoryStore {
    pub fn new(repo: Arc<dyn Repository>, storage: Arc<dyn Storage>) -> Self {
        Self { repo, storage }
    }

    /// 整体写入记录并更新元数据
    pub async fn persist(
        &self,
        history: &mut History,
        transcript: &[Content],
    ) -> Result<(), AgentError> {
        save_transcript(self.storage.as_ref(), &history.id, transcript).await?;
        history.touch();
        self.repo.put_history(history).await?;
        tracing::debug!(history_id = %history.id, entries = transcript.len(), "transcript persisted");
        Ok(())
    }

    pub async fn load(&self, history_id: &str) -> Result<(History, Vec<Content>), AgentError> {
        let history = self
            .repo
            .get_history(history_id)
            .await?
            .ok_or_else(|| AgentError::HistoryNotFound(history_id.to_string()))?;
        let transcript = load_transcript(self.storage.as_ref(), history_id).await?;
        Ok((history, transcript))
    }

    pub async fn alert(&self, alert_id: &str) -> Result<Alert, AgentError> {
        self.repo
            .get_alert(alert_id)
            .await?
            .ok_or_else(|| AgentError::AlertNotFound(alert_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_persist_then_load() {
        let mem = Arc::new(InMemoryStore::new());
        let store = HistoryStore::new(mem.clone(), mem.clone());
        let mut history = History::new("a1");
        let before = history.updated_at;
        let transcript = vec![Content::user("hi"), Content::model_text("hello")];

        store.persist(&mut history, &transcript).await.unwrap();
        assert!(history.updated_at >= before);
        assert_eq!(mem.put_count(), 1);

        let (loaded, contents) = store.load(&history.id).await.unwrap();
        assert_eq!(loaded, history);
        assert_eq!(contents, transcript);
    }

    #[tokio::test]
    async fn test_missing_records() {
        let mem = Arc::new(InMemoryStore::new());
        let store = HistoryStore::new(mem.clone(), mem.clone());
        assert!(matches!(
            store.load("nope").await,
            Err(AgentError::HistoryNotFound(_))
        ));
        assert!(matches!(
            store.alert("nope").await,
            Err(AgentError::AlertNotFound(_))
        ));

        mem.put_alert(&Alert::new("a1", "SSH brute force", json!({})))
            .await
            .unwrap();
        assert_eq!(store.alert("a1").await.unwrap().title, "SSH brute force");
    }
}
