//! 取消支持
//!
//! 模型调用与工具执行都是阻塞式挂起点；调用方持有的 CancellationToken 被取消时，
//! 正在等待的调用立即以 AgentError::Cancelled 结束，不做任何部分状态回滚。

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::core::AgentError;

/// 在 token 取消前等待 fut 完成；未提供 token 时直接等待
pub async fn run_cancellable<F, T>(
    token: Option<&CancellationToken>,
    fut: F,
) -> Result<T, AgentError>
where
    F: Future<Output = T>,
{
    match token {
        Some(token) => {
            if token.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(AgentError::Cancelled),
                out = fut => Ok(out),
            }
        }
        None => Ok(fut.await),
    }
}

/// 监听 Ctrl+C，收到后取消 token
pub fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            tracing::info!("Received Ctrl+C, cancelling investigation");
            token.cancel();
        }
    });
}
