//! StepExecutor：在独立的短上下文里执行单个计划步骤
//!
//! 与直接模式相同的调用 / 函数调用 / 继续模式，但不压缩、不逐轮持久化。
//! 跨轮累积非空文本作为 findings；模型调用失败时立即返回 success=false，错误文本作为 findings。

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::alert::Alert;
use crate::core::{run_cancellable, AgentError};
use crate::llm::{GenerateConfig, LlmClient};
use crate::memory::Content;
use crate::react::dispatch::dispatch_calls;
use crate::react::events::EventSender;
use crate::react::{prompts, Plan, Step, StepResult, ToolCall};
use crate::tools::ToolRegistry;

/// 单步默认最大迭代数
pub const DEFAULT_MAX_STEP_ITERATIONS: usize = 10;

pub struct StepExecutor {
    llm: Arc<dyn LlmClient>,
    registry: Arc<ToolRegistry>,
    max_iterations: usize,
}

impl StepExecutor {
    pub fn new(llm: Arc<dyn LlmClient>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            llm,
            registry,
            max_iterations: DEFAULT_MAX_STEP_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    /// 执行 step；只有取消会返回 Err，其余失败都编码进 StepResult
    pub async fn execute(
        &self,
        alert: &Alert,
        plan: &Plan,
        step: &Step,
        previous: &[StepResult],
        cancel: Option<&CancellationToken>,
        events: Option<&EventSender>,
    ) -> Result<StepResult, AgentError> {
        let config = GenerateConfig::default()
            .with_system(prompts::step_system(alert))
            .with_tools(self.registry.specs());
        let mut contents = vec![Content::user(prompts::step_request(
            plan,
            step,
            previous,
            &self.registry.catalog(),
        ))];

        let mut findings: Vec<String> = Vec::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();

        for iteration in 1..=self.max_iterations {
            let resp = match run_cancellable(cancel, self.llm.generate_content(&contents, &config))
                .await?
            {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(step_id = %step.id, iteration, error = %e, "step model call failed");
                    return Ok(finish(step, false, vec![e.to_string()], tool_calls));
                }
            };
            let Some(content) = resp.first_content().cloned() else {
                tracing::warn!(step_id = %step.id, iteration, "step model returned no candidates");
                findings.push("model returned no candidates".to_string());
                return Ok(finish(step, false, findings, tool_calls));
            };

            findings.extend(content.texts().into_iter().map(|t| t.trim().to_string()));

            if !content.has_function_calls() {
                tracing::debug!(step_id = %step.id, iterations = iteration, "step finished");
                return Ok(finish(step, true, findings, tool_calls));
            }

            let dispatched = {
                let calls = content.function_calls();
                dispatch_calls(&self.registry, &calls, cancel, events).await?
            };
            tool_calls.extend(dispatched.calls);
            contents.push(content);
            contents.push(dispatched.content);
        }

        tracing::warn!(step_id = %step.id, max_iterations = self.max_iterations, "step hit iteration limit");
        findings.push(format!(
            "step stopped after reaching the iteration limit ({})",
            self.max_iterations
        ));
        Ok(finish(step, false, findings, tool_calls))
    }
}

fn finish(step: &Step, success: bool, findings: Vec<String>, tool_calls: Vec<ToolCall>) -> StepResult {
    StepResult {
        step_id: step.id.clone(),
        success,
        findings: findings.join("\n"),
        tool_calls,
        executed_at: Utc::now(),
    }
}
