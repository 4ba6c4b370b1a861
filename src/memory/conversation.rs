//! 会话记录（Transcript）
//!
//! 一条 Content = 角色 + 有序 Part；Part 为文本、function call 或 function response 之一。
//! 不变式：tool 角色的 Content 紧跟在包含对应 function call 的 model 轮之后，
//! 同一轮多个调用的响应合并在一条 Content 中，顺序与调用顺序一致。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 消息角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
    /// 工具执行结果（合成条目）
    Tool,
}

/// 模型发出的函数调用
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
    /// 思考模型附带的签名，多轮函数调用时需原样回传
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            name: name.into(),
            args,
            thought_signature: None,
        }
    }
}

/// 回写给模型的函数响应
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: Value,
}

/// 单个 Part；JSON 形如 {"text": "..."} / {"functionCall": {...}} / {"functionResponse": {...}}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Part {
    Text(String),
    FunctionCall(FunctionCall),
    FunctionResponse(FunctionResponse),
}

impl Part {
    pub fn text(s: impl Into<String>) -> Self {
        Part::Text(s.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(t) => Some(t.as_str()),
            _ => None,
        }
    }
}

/// 单条会话记录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::text(text)],
        }
    }

    pub fn model(parts: Vec<Part>) -> Self {
        Self {
            role: Role::Model,
            parts,
        }
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self::model(vec![Part::text(text)])
    }

    /// 把一轮内所有函数响应合并为一条 tool 记录（保持调用顺序）
    pub fn tool_results(responses: Vec<FunctionResponse>) -> Self {
        Self {
            role: Role::Tool,
            parts: responses.into_iter().map(Part::FunctionResponse).collect(),
        }
    }

    /// 按出现顺序返回本条记录中的函数调用
    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::FunctionCall(fc) => Some(fc),
                _ => None,
            })
            .collect()
    }

    pub fn has_function_calls(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::FunctionCall(_)))
    }

    /// 所有非空文本 Part，按顺序
    pub fn texts(&self) -> Vec<&str> {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .filter(|t| !t.trim().is_empty())
            .collect()
    }

    /// 序列化后的字节数，用于压缩时估算占用
    pub fn serialized_size(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}

/// 把记录渲染为纯文本（供摘要、模式判定等一次性调用使用）
pub fn render_transcript(contents: &[Content]) -> String {
    let mut out = String::new();
    for c in contents {
        let role = match c.role {
            Role::User => "user",
            Role::Model => "model",
            Role::Tool => "tool",
        };
        for part in &c.parts {
            let line = match part {
                Part::Text(t) => t.clone(),
                Part::FunctionCall(fc) => format!("call {}({})", fc.name, fc.args),
                Part::FunctionResponse(fr) => format!("result {}: {}", fr.name, fr.response),
            };
            out.push_str(&format!("[{}] {}\n", role, line));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_part_wire_shape() {
        let part = Part::FunctionCall(FunctionCall::new("search_alerts", json!({"query": "ssh"})));
        let v = serde_json::to_value(&part).unwrap();
        assert_eq!(v, json!({"functionCall": {"name": "search_alerts", "args": {"query": "ssh"}}}));
        assert_eq!(serde_json::to_value(Part::text("hi")).unwrap(), json!({"text": "hi"}));
    }

    #[test]
    fn test_tool_results_preserve_order() {
        let c = Content::tool_results(vec![
            FunctionResponse { name: "a".to_string(), response: json!({"result": 1}) },
            FunctionResponse { name: "b".to_string(), response: json!({"result": 2}) },
        ]);
        assert_eq!(c.role, Role::Tool);
        let names: Vec<_> = c
            .parts
            .iter()
            .map(|p| match p {
                Part::FunctionResponse(fr) => fr.name.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_texts_skip_blank() {
        let c = Content::model(vec![Part::text("  "), Part::text("finding"), Part::text("")]);
        assert_eq!(c.texts(), vec!["finding"]);
    }

    #[test]
    fn test_content_roundtrip() {
        let c = Content::model(vec![
            Part::text("checking"),
            Part::FunctionCall(FunctionCall::new("get_alert", json!({"id": "a1"}))),
        ]);
        let raw = serde_json::to_string(&c).unwrap();
        let back: Content = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, c);
        assert!(c.serialized_size() == raw.len());
    }
}
