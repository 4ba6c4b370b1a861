//! 工具注册表
//!
//! 每个 Tool 可声明多个函数；ToolRegistry 按函数名建立 name -> Tool 索引并分发调用。
//! 函数名冲突时后注册的工具静默覆盖先注册的。调用原样委托给工具，不加重试与超时；
//! 每次调用输出结构化审计日志（JSON）。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

use crate::llm::FunctionDeclaration;

/// 工具错误：永不中止循环，总是编码为 {"error": "..."} 写回函数响应
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("tool not found")]
    NotFound { name: String },

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("{0}")]
    Failed(String),
}

/// 工具 trait：函数声明（供模型调用）、可选提示词、按函数名执行
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具标识（用于日志）
    fn id(&self) -> &str;

    /// 本工具提供的全部函数声明
    fn specs(&self) -> Vec<FunctionDeclaration>;

    /// 拼入 system prompt 的使用说明；None 或空串表示不需要
    fn prompt(&self) -> Option<String> {
        None
    }

    /// 执行名为 name 的函数，返回 JSON 对象（约定成功结果放在 "result" 字段）
    async fn execute(&self, name: &str, args: &Value) -> Result<Value, ToolError>;
}

/// 工具注册表：按注册顺序保存工具，按函数名索引
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        let mut index = HashMap::new();
        for tool in &tools {
            for spec in tool.specs() {
                if let Some(prev) = index.insert(spec.name.clone(), tool.clone()) {
                    tracing::debug!(
                        function = %spec.name,
                        previous = prev.id(),
                        current = tool.id(),
                        "function name collision, later tool wins"
                    );
                }
            }
        }
        Self { tools, index }
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// 去重后的函数声明：每个函数名只出现一次，取实际拥有该名字的工具的声明
    pub fn specs(&self) -> Vec<FunctionDeclaration> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for tool in &self.tools {
            for spec in tool.specs() {
                let owned = self
                    .index
                    .get(&spec.name)
                    .map(|owner| Arc::ptr_eq(owner, tool))
                    .unwrap_or(false);
                if owned && seen.insert(spec.name.clone()) {
                    out.push(spec);
                }
            }
        }
        out
    }

    /// 非空工具提示词，按注册顺序以空行拼接
    pub fn prompts(&self) -> String {
        self.tools
            .iter()
            .filter_map(|t| t.prompt())
            .filter(|p| !p.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// 可用函数名（按声明顺序）
    pub fn tool_names(&self) -> Vec<String> {
        self.specs().into_iter().map(|s| s.name).collect()
    }

    /// 生成提示词中的 Available tools 段落
    pub fn catalog(&self) -> String {
        self.specs()
            .iter()
            .map(|s| format!("- {}: {}", s.name, s.description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub async fn execute(&self, name: &str, args: &Value) -> Result<Value, ToolError> {
        let tool = self.index.get(name).ok_or_else(|| ToolError::NotFound {
            name: name.to_string(),
        })?;
        let start = Instant::now();
        let result = tool.execute(name, args).await;
        let audit = json!({
            "event": "tool_audit",
            "tool": name,
            "owner": tool.id(),
            "ok": result.is_ok(),
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(args),
        });
        tracing::info!(audit = %audit, "tool");
        result
    }
}

/// 把执行结果编码为函数响应：成功时对象原样返回（非对象包进 "result"），失败时为 {"error": 描述}
pub fn to_response(result: &Result<Value, ToolError>) -> Value {
    match result {
        Ok(Value::Object(map)) => Value::Object(map.clone()),
        Ok(other) => json!({ "result": other }),
        Err(e) => json!({ "error": e.to_string() }),
    }
}

/// 工具调用记录用的结果字符串：取 "result" 字段，失败时为显式错误串
pub fn result_text(result: &Result<Value, ToolError>) -> String {
    match result {
        Ok(v) => match v.get("result") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => v.to_string(),
        },
        Err(e) => format!("error: {}", e),
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
