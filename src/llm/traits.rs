//! LLM 客户端抽象
//!
//! 所有后端（Gemini REST / Mock）实现 LlmClient::generate_content：输入完整会话记录与调用配置，
//! 返回 0 个或多个候选，每个候选是一条有序 Part 的 Content。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::memory::{Content, FunctionCall};

/// 模型调用错误；ContextWindowExceeded 是唯一可恢复的类别
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("context window exceeded: {0}")]
    ContextWindowExceeded(String),

    #[error("API error {code} {status}: {message}")]
    Api {
        code: u16,
        status: String,
        message: String,
    },

    #[error("network error: {0}")]
    Network(String),

    #[error("decode error: {0}")]
    Decode(String),
}

/// 上下文溢出特征：(HTTP code, status, message 前缀) 三元组，按提供方配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OverflowSignature {
    #[serde(default = "default_overflow_code")]
    pub code: u16,
    #[serde(default = "default_overflow_status")]
    pub status: String,
    #[serde(default = "default_overflow_prefix")]
    pub message_prefix: String,
}

fn default_overflow_code() -> u16 {
    400
}

fn default_overflow_status() -> String {
    "INVALID_ARGUMENT".to_string()
}

fn default_overflow_prefix() -> String {
    "The input token count".to_string()
}

impl Default for OverflowSignature {
    fn default() -> Self {
        Self {
            code: default_overflow_code(),
            status: default_overflow_status(),
            message_prefix: default_overflow_prefix(),
        }
    }
}

impl OverflowSignature {
    pub fn matches(&self, code: u16, status: &str, message: &str) -> bool {
        code == self.code && status == self.status && message.starts_with(&self.message_prefix)
    }

    /// 把提供方返回的错误归类：命中特征则为 ContextWindowExceeded，否则为普通 Api 错误
    pub fn classify(&self, code: u16, status: &str, message: &str) -> LlmError {
        if self.matches(code, status, message) {
            LlmError::ContextWindowExceeded(message.to_string())
        } else {
            LlmError::Api {
                code,
                status: status.to_string(),
                message: message.to_string(),
            }
        }
    }
}

/// 暴露给模型的函数声明（名称、描述、参数 JSON Schema）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// 单次调用配置
#[derive(Debug, Clone, Default)]
pub struct GenerateConfig {
    pub system_instruction: Option<String>,
    /// 结构化输出 schema；设置后要求模型只输出 JSON
    pub response_schema: Option<Value>,
    pub tools: Vec<FunctionDeclaration>,
}

impl GenerateConfig {
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_instruction = Some(system.into());
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn with_tools(mut self, tools: Vec<FunctionDeclaration>) -> Self {
        self.tools = tools;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub content: Content,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateResponse {
    pub candidates: Vec<Candidate>,
}

impl GenerateResponse {
    pub fn from_content(content: Content) -> Self {
        Self {
            candidates: vec![Candidate { content }],
        }
    }

    /// 第一个候选的内容
    pub fn first_content(&self) -> Option<&Content> {
        self.candidates.first().map(|c| &c.content)
    }

    /// 第一个候选中第一个文本 Part
    pub fn first_text(&self) -> Option<&str> {
        self.first_content()
            .and_then(|c| c.parts.iter().find_map(|p| p.as_text()))
    }

    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.first_content()
            .map(|c| c.function_calls())
            .unwrap_or_default()
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate_content(
        &self,
        contents: &[Content],
        config: &GenerateConfig,
    ) -> Result<GenerateResponse, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_signature_classify() {
        let sig = OverflowSignature::default();
        let err = sig.classify(
            400,
            "INVALID_ARGUMENT",
            "The input token count (1200000) exceeds the maximum number of tokens allowed (1048576).",
        );
        assert!(matches!(err, LlmError::ContextWindowExceeded(_)));

        let err = sig.classify(400, "INVALID_ARGUMENT", "Request contains an invalid argument.");
        assert!(matches!(err, LlmError::Api { code: 400, .. }));

        let err = sig.classify(500, "INVALID_ARGUMENT", "The input token count is large");
        assert!(matches!(err, LlmError::Api { code: 500, .. }));
    }

    #[test]
    fn test_custom_signature() {
        let sig = OverflowSignature {
            code: 413,
            status: "PAYLOAD_TOO_LARGE".to_string(),
            message_prefix: "prompt is too long".to_string(),
        };
        assert!(sig.matches(413, "PAYLOAD_TOO_LARGE", "prompt is too long: 210000 tokens"));
        assert!(!sig.matches(400, "INVALID_ARGUMENT", "The input token count"));
    }

    #[test]
    fn test_first_text_skips_calls() {
        use crate::memory::Part;
        let resp = GenerateResponse::from_content(Content::model(vec![
            Part::FunctionCall(FunctionCall::new("x", Value::Null)),
            Part::text("answer"),
        ]));
        assert_eq!(resp.first_text(), Some("answer"));
        assert_eq!(resp.function_calls().len(), 1);
        assert!(GenerateResponse::default().first_text().is_none());
    }
}
