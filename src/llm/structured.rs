//! 结构化输出
//!
//! 由 Rust 类型（schemars）生成响应 schema 注入调用配置；解析时容忍外层 ```json 围栏，
//! 其余任何非 JSON / 空输出都是 StructuredOutput 错误，不重试。

use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::AgentError;
use crate::llm::GenerateResponse;

/// 生成内联子 schema 的 JSON Schema（部分提供方不支持 $ref）
pub fn response_schema<T: JsonSchema>() -> Value {
    let settings = SchemaSettings::draft07().with(|s| {
        s.inline_subschemas = true;
        s.meta_schema = None;
    });
    let schema = settings.into_generator().into_root_schema_for::<T>();
    serde_json::to_value(schema).unwrap_or(Value::Null)
}

/// 取出 ```json ... ``` 围栏内的内容；没有围栏时原样返回
fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim());
    }
    if let Some(rest) = trimmed.strip_prefix("```") {
        return rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim());
    }
    trimmed
}

pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<T, AgentError> {
    let json_str = strip_fence(text);
    if json_str.is_empty() {
        return Err(AgentError::StructuredOutput("empty output".to_string()));
    }
    serde_json::from_str(json_str)
        .map_err(|e| AgentError::StructuredOutput(format!("{}: {}", e, json_str)))
}

/// 从响应第一个候选中解析结构化输出
pub fn parse_response<T: DeserializeOwned>(resp: &GenerateResponse) -> Result<T, AgentError> {
    let text = resp
        .first_content()
        .map(|c| c.texts().concat())
        .unwrap_or_default();
    parse_structured(&text)
}
