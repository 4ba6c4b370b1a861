//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction，供直接模式循环决定是压缩历史后重试还是终止。

use crate::core::{AgentError, RecoveryAction};

/// 错误到恢复动作的映射：只有上下文窗口溢出可恢复，其余一律终止
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        if err.is_context_window_exceeded() {
            RecoveryAction::SummarizeAndPrune
        } else {
            RecoveryAction::Abort
        }
    }
}
