//! Agent 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 AgentError 决定 SummarizeAndPrune（压缩历史后重试）还是 Abort。
//! 工具错误（ToolError）不在此列：它们总是作为数据写回 function response，永不中止循环。

use thiserror::Error;

use crate::llm::LlmError;

/// 调查过程中可能出现的致命错误（模型调用、结构化输出、计划调度、持久化等）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 模型调用失败；其中 ContextWindowExceeded 在直接模式下触发压缩重试
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// PlanGenerator / Reflector 返回空或非法 JSON
    #[error("structured output error: {0}")]
    StructuredOutput(String),

    /// 生成内容未通过校验（如标题超长），重试次数耗尽
    #[error("validation error: {0}")]
    Validation(String),

    /// PlanUpdate 引用了计划中不存在的步骤
    #[error("target step not found: {0}")]
    StepNotFound(String),

    #[error("insufficient content to compress")]
    InsufficientContent,

    /// 模型返回了零个候选或没有文本
    #[error("empty response: {0}")]
    EmptyResponse(String),

    #[error("alert not found: {0}")]
    AlertNotFound(String),

    #[error("history not found: {0}")]
    HistoryNotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("cancelled")]
    Cancelled,
}

impl AgentError {
    /// 是否为上下文窗口溢出（直接模式据此压缩历史）
    pub fn is_context_window_exceeded(&self) -> bool {
        matches!(self, AgentError::Llm(LlmError::ContextWindowExceeded(_)))
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(e: anyhow::Error) -> Self {
        AgentError::Storage(format!("{e:#}"))
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 压缩历史后重试同一轮（不消耗迭代预算）
    SummarizeAndPrune,
    /// 终止当前任务
    Abort,
}
