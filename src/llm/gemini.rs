//! Gemini REST 客户端
//!
//! 通过 reqwest 调用 `models/{model}:generateContent`；会话记录、函数声明、结构化输出 schema
//! 转为 Gemini 请求格式。HTTP 错误按配置的 OverflowSignature 归类为上下文溢出或普通 Api 错误。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::{
    Candidate, FunctionDeclaration, GenerateConfig, GenerateResponse, LlmClient, LlmError,
    OverflowSignature,
};
use crate::memory::{Content, FunctionCall, FunctionResponse, Part, Role};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const GEMINI_DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    overflow: OverflowSignature,
    pub usage: TokenUsage,
}

impl GeminiClient {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        api_key: &str,
        timeout_secs: u64,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LlmError::Network(format!("build http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or(GEMINI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            overflow: OverflowSignature::default(),
            usage: TokenUsage::default(),
        })
    }

    /// 替换上下文溢出特征（不同网关 / 代理返回的错误格式可能不同）
    pub fn with_overflow_signature(mut self, signature: OverflowSignature) -> Self {
        self.overflow = signature;
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
    #[serde(default, skip_serializing)]
    thought: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought_signature: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireContent {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    role: String,
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireTool<'a> {
    function_declarations: &'a [FunctionDeclaration],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig<'a> {
    response_mime_type: &'static str,
    response_json_schema: &'a Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest<'a> {
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<WireGenerationConfig<'a>>,
}

#[derive(Deserialize)]
struct WireCandidate {
    content: Option<WireContent>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct WireUsage {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
    #[serde(default)]
    usage_metadata: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireErrorBody {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
struct WireErrorEnvelope {
    error: WireErrorBody,
}

fn to_wire(content: &Content) -> WireContent {
    let role = match content.role {
        Role::User | Role::Tool => "user",
        Role::Model => "model",
    };
    let parts = content
        .parts
        .iter()
        .map(|p| match p {
            Part::Text(t) => WirePart {
                text: Some(t.clone()),
                ..Default::default()
            },
            Part::FunctionCall(fc) => {
                let mut call = fc.clone();
                let signature = call.thought_signature.take();
                WirePart {
                    function_call: Some(call),
                    thought_signature: signature,
                    ..Default::default()
                }
            }
            Part::FunctionResponse(fr) => WirePart {
                function_response: Some(fr.clone()),
                ..Default::default()
            },
        })
        .collect();
    WireContent {
        role: role.to_string(),
        parts,
    }
}

fn from_wire(content: WireContent) -> Content {
    let parts = content
        .parts
        .into_iter()
        .filter(|p| !p.thought.unwrap_or(false))
        .filter_map(|p| {
            if let Some(mut fc) = p.function_call {
                if fc.thought_signature.is_none() {
                    fc.thought_signature = p.thought_signature;
                }
                Some(Part::FunctionCall(fc))
            } else if let Some(fr) = p.function_response {
                Some(Part::FunctionResponse(fr))
            } else {
                p.text.map(Part::Text)
            }
        })
        .collect();
    Content::model(parts)
}

#[async_trait]
impl LlmClient for GeminiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn generate_content(
        &self,
        contents: &[Content],
        config: &GenerateConfig,
    ) -> Result<GenerateResponse, LlmError> {
        let request = WireRequest {
            contents: contents.iter().map(to_wire).collect(),
            system_instruction: config.system_instruction.as_ref().map(|s| WireContent {
                role: String::new(),
                parts: vec![WirePart {
                    text: Some(s.clone()),
                    ..Default::default()
                }],
            }),
            tools: if config.tools.is_empty() {
                Vec::new()
            } else {
                vec![WireTool {
                    function_declarations: &config.tools,
                }]
            },
            generation_config: config.response_schema.as_ref().map(|schema| {
                WireGenerationConfig {
                    response_mime_type: "application/json",
                    response_json_schema: schema,
                }
            }),
        };

        let resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let http_status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if !http_status.is_success() {
            let (code, status, message) = match serde_json::from_str::<WireErrorEnvelope>(&body) {
                Ok(env) => (
                    if env.error.code == 0 { http_status.as_u16() } else { env.error.code },
                    env.error.status,
                    env.error.message,
                ),
                Err(_) => (http_status.as_u16(), String::new(), body),
            };
            tracing::warn!(code, status = %status, "gemini request failed");
            return Err(self.overflow.classify(code, &status, &message));
        }

        let parsed: WireResponse =
            serde_json::from_str(&body).map_err(|e| LlmError::Decode(e.to_string()))?;

        if let Some(usage) = &parsed.usage_metadata {
            self.usage
                .add(usage.prompt_token_count, usage.candidates_token_count);
        }

        let candidates = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .map(|content| Candidate {
                content: from_wire(content),
            })
            .collect();
        Ok(GenerateResponse { candidates })
    }
}
