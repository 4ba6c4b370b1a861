//! SQLite 元数据存储
//!
//! 告警与会话元数据落在同一个 SQLite 文件里（rusqlite，bundled）。
//! 连接由 Mutex 串行化；单会话单线程场景下每次调用都很短。

use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::alert::Alert;
use crate::memory::{History, Repository};

pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    /// 打开（或创建）数据库文件并建表
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open sqlite {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS alerts (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                schema TEXT NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS histories (
                id TEXT PRIMARY KEY,
                alert_id TEXT NOT NULL,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_histories_alert ON histories(alert_id);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> anyhow::Result<T>) -> anyhow::Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("sqlite connection lock poisoned"))?;
        f(&conn)
    }
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

/// 转义 LIKE 通配符，使查询按字面子串匹配（与 Alert::matches 一致）
fn like_pattern(query: &str) -> String {
    let escaped = query
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn alert_from_row(row: &Row<'_>) -> rusqlite::Result<Alert> {
    let data: String = row.get(4)?;
    let created_at: String = row.get(5)?;
    Ok(Alert {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        schema: row.get(3)?,
        data: serde_json::from_str(&data).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?,
        created_at: parse_time(&created_at)?,
    })
}

fn history_from_row(row: &Row<'_>) -> rusqlite::Result<History> {
    let created_at: String = row.get(3)?;
    let updated_at: String = row.get(4)?;
    Ok(History {
        id: row.get(0)?,
        alert_id: row.get(1)?,
        title: row.get(2)?,
        created_at: parse_time(&created_at)?,
        updated_at: parse_time(&updated_at)?,
    })
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn get_alert(&self, id: &str) -> anyhow::Result<Option<Alert>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, title, description, schema, data, created_at FROM alerts WHERE id = ?1",
                    params![id],
                    alert_from_row,
                )
                .optional()?)
        })
    }

    async fn put_alert(&self, alert: &Alert) -> anyhow::Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO alerts (id, title, description, schema, data, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    alert.id,
                    alert.title,
                    alert.description,
                    alert.schema,
                    alert.data.to_string(),
                    alert.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    async fn search_alerts(&self, query: &str, limit: usize) -> anyhow::Result<Vec<Alert>> {
        let pattern = like_pattern(query);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, description, schema, data, created_at FROM alerts
                 WHERE lower(title) LIKE ?1 ESCAPE '\\'
                    OR lower(description) LIKE ?1 ESCAPE '\\'
                    OR lower(data) LIKE ?1 ESCAPE '\\'
                 ORDER BY created_at DESC, id ASC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![pattern, limit as i64], alert_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    async fn put_history(&self, history: &History) -> anyhow::Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO histories (id, alert_id, title, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    history.id,
                    history.alert_id,
                    history.title,
                    history.created_at.to_rfc3339(),
                    history.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    async fn get_history(&self, id: &str) -> anyhow::Result<Option<History>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, alert_id, title, created_at, updated_at FROM histories WHERE id = ?1",
                    params![id],
                    history_from_row,
                )
                .optional()?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_alert_roundtrip() {
        let repo = SqliteRepository::in_memory().unwrap();
        let alert = Alert::new("a1", "Suspicious login", json!({"user": "root"}))
            .with_description("login from new country");
        repo.put_alert(&alert).await.unwrap();
        let got = repo.get_alert("a1").await.unwrap().unwrap();
        assert_eq!(got.title, "Suspicious login");
        assert_eq!(got.data, json!({"user": "root"}));
        assert!(repo.get_alert("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_matches_data() {
        let repo = SqliteRepository::in_memory().unwrap();
        repo.put_alert(&Alert::new("a1", "Login", json!({"ip": "203.0.113.9"})))
            .await
            .unwrap();
        repo.put_alert(&Alert::new("a2", "Port scan", json!({"ip": "198.51.100.1"})))
            .await
            .unwrap();
        let found = repo.search_alerts("203.0.113", 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a1");
    }

    #[tokio::test]
    async fn test_search_treats_wildcards_literally() {
        let repo = SqliteRepository::in_memory().unwrap();
        repo.put_alert(&Alert::new("a1", "host_a beacon", json!({})))
            .await
            .unwrap();
        repo.put_alert(&Alert::new("a2", "hostXa beacon", json!({"rate": "100%"})))
            .await
            .unwrap();

        let found = repo.search_alerts("host_a", 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a1");

        let found = repo.search_alerts("100%", 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a2");
    }

    #[tokio::test]
    async fn test_corrupt_alert_data_is_an_error() {
        let repo = SqliteRepository::in_memory().unwrap();
        repo.with_conn(|conn| {
            conn.execute(
                "INSERT INTO alerts (id, title, description, schema, data, created_at)
                 VALUES ('bad', 't', '', '', '{not json', ?1)",
                params![Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .unwrap();
        assert!(repo.get_alert("bad").await.is_err());
    }

    #[tokio::test]
    async fn test_history_persisted_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db").join("sleuth.db");
        let mut history = History::new("a1");
        history.title = "SSH brute force triage".to_string();
        {
            let repo = SqliteRepository::open(&path).unwrap();
            repo.put_history(&history).await.unwrap();
        }
        let repo = SqliteRepository::open(&path).unwrap();
        let got = repo.get_history(&history.id).await.unwrap().unwrap();
        assert_eq!(got.title, history.title);
        assert_eq!(got.alert_id, "a1");
    }
}
