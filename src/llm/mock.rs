//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按脚本顺序返回预置响应或错误，并记录每次请求（会话记录 + 配置），便于断言调用次数与输入内容。
//! 脚本耗尽时返回 Api 错误。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{GenerateConfig, GenerateResponse, LlmClient, LlmError};
use crate::memory::{Content, FunctionCall, Part};

/// 一次被记录的请求
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub contents: Vec<Content>,
    pub config: GenerateConfig,
}

#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<GenerateResponse, LlmError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: Result<GenerateResponse, LlmError>) -> &Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(item);
        }
        self
    }

    /// 预置一条纯文本回复
    pub fn push_text(&self, text: &str) -> &Self {
        self.push(Ok(GenerateResponse::from_content(Content::model_text(text))))
    }

    /// 预置一轮函数调用（可带前置文本）
    pub fn push_calls(&self, text: Option<&str>, calls: Vec<(&str, Value)>) -> &Self {
        let mut parts = Vec::new();
        if let Some(t) = text {
            parts.push(Part::text(t));
        }
        for (name, args) in calls {
            parts.push(Part::FunctionCall(FunctionCall::new(name, args)));
        }
        self.push(Ok(GenerateResponse::from_content(Content::model(parts))))
    }

    /// 预置一个结构化 JSON 回复
    pub fn push_json(&self, value: Value) -> &Self {
        self.push_text(&value.to_string())
    }

    pub fn push_error(&self, err: LlmError) -> &Self {
        self.push(Err(err))
    }

    /// 预置一个零候选的响应
    pub fn push_empty(&self) -> &Self {
        self.push(Ok(GenerateResponse::default()))
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate_content(
        &self,
        contents: &[Content],
        config: &GenerateConfig,
    ) -> Result<GenerateResponse, LlmError> {
        if let Ok(mut reqs) = self.requests.lock() {
            reqs.push(RecordedRequest {
                contents: contents.to_vec(),
                config: config.clone(),
            });
        }
        self.script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| {
                Err(LlmError::Api {
                    code: 500,
                    status: "MOCK_EXHAUSTED".to_string(),
                    message: "mock script exhausted".to_string(),
                })
            })
    }
}
