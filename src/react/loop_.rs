//! 直接模式主循环
//!
//! 追加用户消息 -> 调模型 -> 有函数调用则顺序执行并回写 tool 记录 -> 继续，直到模型给出纯文本回复。
//! 上下文溢出时压缩历史、立即持久化，然后重试同一轮（不消耗迭代预算）；其他模型错误直接终止。
//! 正常结束或迭代耗尽时持久化一次；出错路径不写任何东西。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::alert::Alert;
use crate::core::{run_cancellable, AgentError, RecoveryAction, RecoveryEngine};
use crate::llm::{GenerateConfig, GenerateResponse, LlmClient};
use crate::memory::{Content, History, HistoryCompressor, HistoryStore};
use crate::react::dispatch::dispatch_calls;
use crate::react::events::{send_event, AgentEvent, EventSender};
use crate::react::prompts;
use crate::tools::ToolRegistry;

/// 默认最大迭代数（模型调用轮数）
pub const DEFAULT_MAX_ITERATIONS: usize = 32;

/// 同一轮内最多压缩次数，超过则按原错误终止
const MAX_COMPRESSIONS_PER_ITERATION: usize = 3;

/// 直接模式执行结果
#[derive(Debug, Clone, PartialEq)]
pub struct DirectResult {
    /// 最终回复（迭代耗尽时为最后一次模型文本，可能为空）
    pub response: String,
    /// 实际消耗的迭代数；压缩重试不计入
    pub iterations: usize,
    /// 是否以纯文本回复正常结束
    pub completed: bool,
}

/// 单个会话的可变状态：元数据 + 记录
pub struct SessionState<'a> {
    pub alert: &'a Alert,
    pub history: &'a mut History,
    pub transcript: &'a mut Vec<Content>,
}

pub struct ConversationLoop {
    llm: Arc<dyn LlmClient>,
    registry: Arc<ToolRegistry>,
    compressor: HistoryCompressor,
    recovery: RecoveryEngine,
    store: HistoryStore,
    max_iterations: usize,
}

impl ConversationLoop {
    pub fn new(llm: Arc<dyn LlmClient>, registry: Arc<ToolRegistry>, store: HistoryStore) -> Self {
        Self {
            compressor: HistoryCompressor::new(llm.clone()),
            llm,
            registry,
            recovery: RecoveryEngine::new(),
            store,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_compressor(mut self, compressor: HistoryCompressor) -> Self {
        self.compressor = compressor;
        self
    }

    pub async fn run(
        &self,
        state: SessionState<'_>,
        message: &str,
        cancel: Option<&CancellationToken>,
        events: Option<&EventSender>,
    ) -> Result<DirectResult, AgentError> {
        let SessionState {
            alert,
            history,
            transcript,
        } = state;

        transcript.push(Content::user(message));
        let config = GenerateConfig::default()
            .with_system(prompts::direct_system(alert, &self.registry.prompts()))
            .with_tools(self.registry.specs());

        let mut iteration = 0usize;
        let mut last_text = String::new();

        while iteration < self.max_iterations {
            iteration += 1;
            tracing::debug!(history_id = %history.id, iteration, "direct iteration");

            let resp = self
                .generate_with_recovery(history, transcript, &config, cancel, events)
                .await?;

            let Some(content) = resp.first_content().cloned() else {
                return Err(AgentError::EmptyResponse("model returned no candidates".to_string()));
            };
            let text = content.texts().join("\n");
            if !text.trim().is_empty() {
                last_text = text.clone();
            }

            if !content.has_function_calls() {
                transcript.push(content);
                self.store.persist(history, transcript).await?;
                tracing::info!(history_id = %history.id, iterations = iteration, "direct mode completed");
                return Ok(DirectResult {
                    response: text,
                    iterations: iteration,
                    completed: true,
                });
            }

            let dispatched = {
                let calls = content.function_calls();
                dispatch_calls(&self.registry, &calls, cancel, events).await?
            };
            transcript.push(content);
            transcript.push(dispatched.content);
        }

        tracing::warn!(
            history_id = %history.id,
            max_iterations = self.max_iterations,
            "direct mode hit iteration limit"
        );
        self.store.persist(history, transcript).await?;
        Ok(DirectResult {
            response: last_text,
            iterations: iteration,
            completed: false,
        })
    }

    /// 调用模型；遇到上下文溢出则压缩记录、持久化后重试
    async fn generate_with_recovery(
        &self,
        history: &mut History,
        transcript: &mut Vec<Content>,
        config: &GenerateConfig,
        cancel: Option<&CancellationToken>,
        events: Option<&EventSender>,
    ) -> Result<GenerateResponse, AgentError> {
        let mut compressions = 0usize;
        loop {
            let call = self.llm.generate_content(transcript.as_slice(), config);
            let err = match run_cancellable(cancel, call).await? {
                Ok(resp) => return Ok(resp),
                Err(e) => AgentError::from(e),
            };
            match self.recovery.handle(&err) {
                RecoveryAction::SummarizeAndPrune if compressions < MAX_COMPRESSIONS_PER_ITERATION => {
                    compressions += 1;
                    tracing::warn!(
                        history_id = %history.id,
                        error = %err,
                        "context window exceeded, compressing history"
                    );
                    let before = transcript.len();
                    let compressed = self.compressor.compress(transcript, cancel).await?;
                    let remaining = compressed.len();
                    *transcript = compressed;
                    self.store.persist(history, transcript).await?;
                    send_event(
                        events,
                        AgentEvent::Compressed {
                            summarized: before + 1 - remaining,
                            remaining,
                        },
                    );
                }
                _ => return Err(err),
            }
        }
    }
}
