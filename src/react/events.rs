//! 调查过程事件：用于向前端 / 日志推送模式选择、工具调用、计划进度与结论

use serde::Serialize;

use crate::react::Mode;

/// 过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    ModeSelected { mode: Mode },
    /// 调用工具
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    ToolResult { tool: String, ok: bool, preview: String },
    /// 历史被压缩（摘要掉的条数 / 剩余条数）
    Compressed { summarized: usize, remaining: usize },
    PlanCreated { objective: String, steps: usize },
    StepStarted { step_id: String, description: String },
    StepFinished { step_id: String, success: bool },
    /// 反思完成（本次产生的计划变更数）
    Reflected { step_id: String, achieved: bool, updates: usize },
    Concluded,
}

pub type EventSender = tokio::sync::mpsc::UnboundedSender<AgentEvent>;

/// 发送事件；接收端已关闭时忽略
pub fn send_event(tx: Option<&EventSender>, ev: AgentEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

/// Observation 预览最大字符数
const PREVIEW_CHARS: usize = 200;

pub fn preview(text: &str) -> String {
    let p: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        format!("{}...", p)
    } else {
        p
    }
}
