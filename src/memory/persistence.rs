//! 持久化接口与实现
//!
//! Repository 存结构化记录（告警、会话元数据），Storage 存大块 blob（会话记录 JSON）。
//! 提供内存实现（测试 / 单次运行）与文件实现（blob 落盘）；SQLite 元数据实现见 sqlite.rs。

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Context;
use async_trait::async_trait;

use crate::alert::Alert;
use crate::memory::{transcript_key, Content, History};

/// 结构化记录存储
#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_alert(&self, id: &str) -> anyhow::Result<Option<Alert>>;

    async fn put_alert(&self, alert: &Alert) -> anyhow::Result<()>;

    /// 全文检索告警，按创建时间倒序，最多 limit 条
    async fn search_alerts(&self, query: &str, limit: usize) -> anyhow::Result<Vec<Alert>>;

    async fn put_history(&self, history: &History) -> anyhow::Result<()>;

    async fn get_history(&self, id: &str) -> anyhow::Result<Option<History>>;
}

/// Blob 存储：按 key 整体写入 / 读出
#[async_trait]
pub trait Storage: Send + Sync {
    async fn put(&self, key: &str, data: Vec<u8>) -> anyhow::Result<()>;

    /// key 不存在时返回 None
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
}

/// 把整段记录序列化后写入 Storage
pub async fn save_transcript(
    storage: &dyn Storage,
    history_id: &str,
    contents: &[Content],
) -> anyhow::Result<()> {
    let data = serde_json::to_vec(contents).context("serialize transcript")?;
    storage.put(&transcript_key(history_id), data).await
}

/// 读取记录；blob 不存在时返回空记录
pub async fn load_transcript(
    storage: &dyn Storage,
    history_id: &str,
) -> anyhow::Result<Vec<Content>> {
    match storage.get(&transcript_key(history_id)).await? {
        Some(data) => serde_json::from_slice(&data).context("parse transcript"),
        None => Ok(Vec::new()),
    }
}

/// 内存实现：同时充当 Repository 与 Storage；记录 put 次数便于断言
#[derive(Debug, Default)]
pub struct InMemoryStore {
    alerts: Mutex<HashMap<String, Alert>>,
    histories: Mutex<HashMap<String, History>>,
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    put_count: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage::put 被调用的次数
    pub fn put_count(&self) -> usize {
        self.put_count.load(Ordering::SeqCst)
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow::anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl Repository for InMemoryStore {
    async fn get_alert(&self, id: &str) -> anyhow::Result<Option<Alert>> {
        Ok(self.alerts.lock().map_err(poisoned)?.get(id).cloned())
    }

    async fn put_alert(&self, alert: &Alert) -> anyhow::Result<()> {
        self.alerts
            .lock()
            .map_err(poisoned)?
            .insert(alert.id.clone(), alert.clone());
        Ok(())
    }

    async fn search_alerts(&self, query: &str, limit: usize) -> anyhow::Result<Vec<Alert>> {
        let alerts = self.alerts.lock().map_err(poisoned)?;
        let mut found: Vec<Alert> = alerts.values().filter(|a| a.matches(query)).cloned().collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        found.truncate(limit);
        Ok(found)
    }

    async fn put_history(&self, history: &History) -> anyhow::Result<()> {
        self.histories
            .lock()
            .map_err(poisoned)?
            .insert(history.id.clone(), history.clone());
        Ok(())
    }

    async fn get_history(&self, id: &str) -> anyhow::Result<Option<History>> {
        Ok(self.histories.lock().map_err(poisoned)?.get(id).cloned())
    }
}

#[async_trait]
impl Storage for InMemoryStore {
    async fn put(&self, key: &str, data: Vec<u8>) -> anyhow::Result<()> {
        self.put_count.fetch_add(1, Ordering::SeqCst);
        self.blobs.lock().map_err(poisoned)?.insert(key.to_string(), data);
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.blobs.lock().map_err(poisoned)?.get(key).cloned())
    }
}

/// 文件实现：每个 key 对应 root 下的一个文件；父目录不存在时自动创建
#[derive(Debug)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// key 只允许普通路径段，拒绝绝对路径与 ..
    fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
        let rel = Path::new(key);
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            anyhow::bail!("invalid storage key: {key}");
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn put(&self, key: &str, data: Vec<u8>) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create {}", parent.display()))?;
        }
        tokio::fs::write(&path, data)
            .await
            .with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_in_memory_transcript_roundtrip() {
        let store = InMemoryStore::new();
        let contents = vec![Content::user("hello"), Content::model_text("hi")];
        save_transcript(&store, "h1", &contents).await.unwrap();
        assert_eq!(store.put_count(), 1);
        let loaded = load_transcript(&store, "h1").await.unwrap();
        assert_eq!(loaded, contents);
        assert!(load_transcript(&store, "missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_search_limit() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store
                .put_alert(&Alert::new(format!("a{i}"), format!("ssh login {i}"), json!({})))
                .await
                .unwrap();
        }
        store
            .put_alert(&Alert::new("other", "dns tunnel", json!({})))
            .await
            .unwrap();
        let found = store.search_alerts("SSH", 3).await.unwrap();
        assert_eq!(found.len(), 3);
        assert!(found.iter().all(|a| a.title.contains("ssh")));
    }

    #[tokio::test]
    async fn test_file_storage_put_get() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        storage.put("history/x/transcript.json", b"[]".to_vec()).await.unwrap();
        let got = storage.get("history/x/transcript.json").await.unwrap();
        assert_eq!(got.as_deref(), Some(&b"[]"[..]));
        assert!(storage.get("history/y/transcript.json").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_storage_rejects_escape() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        assert!(storage.put("../evil", vec![1]).await.is_err());
        assert!(storage.get("/etc/passwd").await.is_err());
    }
}
