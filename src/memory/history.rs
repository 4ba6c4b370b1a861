//! 会话历史元数据
//!
//! 一个 History 对应一个会话：标题、关联告警、时间戳；记录本身作为 blob 单独存放在 Storage。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 会话历史元数据（记录正文不在此结构中）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub id: String,
    pub title: String,
    pub alert_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl History {
    pub fn new(alert_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: String::new(),
            alert_id: alert_id.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// 记录 blob 在 Storage 中的 key
pub fn transcript_key(history_id: &str) -> String {
    format!("history/{}/transcript.json", history_id)
}
