//! 告警记录
//!
//! 调查对象；由 Repository 存取，并被渲染进各阶段的 system prompt。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 单条安全告警
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// 告警来源 / 数据格式标识，如 guardduty.v2
    #[serde(default)]
    pub schema: String,
    /// 原始告警数据
    #[serde(default)]
    pub data: Value,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(id: impl Into<String>, title: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            schema: String::new(),
            data,
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// 渲染为提示词中的告警上下文段落
    pub fn context_section(&self) -> String {
        let data = serde_json::to_string_pretty(&self.data).unwrap_or_else(|_| self.data.to_string());
        format!(
            "## Alert\n- ID: {}\n- Title: {}\n- Schema: {}\n- Description: {}\n\n### Data\n```json\n{}\n```\n",
            self.id, self.title, self.schema, self.description, data
        )
    }

    /// 简单的大小写不敏感全文匹配（标题 / 描述 / 原始数据）
    pub fn matches(&self, query: &str) -> bool {
        let q = query.to_lowercase();
        if q.trim().is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(&q)
            || self.description.to_lowercase().contains(&q)
            || self.data.to_string().to_lowercase().contains(&q)
    }
}
