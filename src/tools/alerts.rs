//! 告警检索工具
//!
//! 一个工具声明两个函数：search_alerts（全文检索历史告警）与 get_alert（按 ID 取完整告警），
//! 均由 Repository 支撑，结果放在 "result" 字段。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::llm::FunctionDeclaration;
use crate::memory::Repository;
use crate::tools::{Tool, ToolError};

const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 50;

pub struct AlertTool {
    repo: Arc<dyn Repository>,
}

impl AlertTool {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    async fn search(&self, args: &Value) -> Result<Value, ToolError> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArgs("missing query".to_string()))?;
        let limit = args
            .get("limit")
            .and_then(|v| v.as_u64())
            .map(|n| (n as usize).clamp(1, MAX_LIMIT))
            .unwrap_or(DEFAULT_LIMIT);
        let alerts = self
            .repo
            .search_alerts(query, limit)
            .await
            .map_err(|e| ToolError::Failed(e.to_string()))?;
        let summaries: Vec<Value> = alerts
            .iter()
            .map(|a| {
                json!({
                    "id": a.id,
                    "title": a.title,
                    "schema": a.schema,
                    "created_at": a.created_at.to_rfc3339(),
                })
            })
            .collect();
        Ok(json!({ "result": summaries }))
    }

    async fn get(&self, args: &Value) -> Result<Value, ToolError> {
        let id = args
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArgs("missing id".to_string()))?;
        match self.repo.get_alert(id).await {
            Ok(Some(alert)) => Ok(json!({ "result": alert })),
            Ok(None) => Err(ToolError::Failed(format!("alert not found: {}", id))),
            Err(e) => Err(ToolError::Failed(e.to_string())),
        }
    }
}

#[async_trait]
impl Tool for AlertTool {
    fn id(&self) -> &str {
        "alerts"
    }

    fn specs(&self) -> Vec<FunctionDeclaration> {
        vec![
            FunctionDeclaration {
                name: "search_alerts".to_string(),
                description: "Search past alerts by keyword (title, description or raw data), newest first.".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "Keyword, IP address, domain, user name, etc."},
                        "limit": {"type": "integer", "description": "Max number of alerts (default 10, max 50)"}
                    },
                    "required": ["query"]
                }),
            },
            FunctionDeclaration {
                name: "get_alert".to_string(),
                description: "Get the full record of one alert by its ID.".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "id": {"type": "string", "description": "Alert ID"}
                    },
                    "required": ["id"]
                }),
            },
        ]
    }

    fn prompt(&self) -> Option<String> {
        Some(
            "Use `search_alerts` to find related past alerts sharing indicators (IPs, domains, users) \
             with the current one, then `get_alert` to inspect a specific alert in full."
                .to_string(),
        )
    }

    async fn execute(&self, name: &str, args: &Value) -> Result<Value, ToolError> {
        match name {
            "search_alerts" => self.search(args).await,
            "get_alert" => self.get(args).await,
            other => Err(ToolError::NotFound {
                name: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::Alert;
    use crate::memory::InMemoryStore;

    async fn tool() -> AlertTool {
        let store = Arc::new(InMemoryStore::new());
        store
            .put_alert(&Alert::new("a1", "SSH brute force", json!({"src": "203.0.113.7"})))
            .await
            .unwrap();
        store
            .put_alert(&Alert::new("a2", "DNS tunnel", json!({"src": "198.51.100.2"})))
            .await
            .unwrap();
        AlertTool::new(store)
    }

    #[tokio::test]
    async fn test_search_alerts() {
        let tool = tool().await;
        let out = tool
            .execute("search_alerts", &json!({"query": "203.0.113.7"}))
            .await
            .unwrap();
        let items = out["result"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], "a1");
    }

    #[tokio::test]
    async fn test_get_alert_missing() {
        let tool = tool().await;
        let err = tool.execute("get_alert", &json!({"id": "zzz"})).await.unwrap_err();
        assert_eq!(err, ToolError::Failed("alert not found: zzz".to_string()));
        let err = tool.execute("get_alert", &json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgs(_)));
    }

    #[tokio::test]
    async fn test_get_alert() {
        let tool = tool().await;
        let out = tool.execute("get_alert", &json!({"id": "a2"})).await.unwrap();
        assert_eq!(out["result"]["title"], "DNS tunnel");
    }
}
