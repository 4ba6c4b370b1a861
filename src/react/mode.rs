//! ModeSelector：决定新消息走直接模式还是计划执行模式
//!
//! 只有模型回复恰好为 "yes"（忽略大小写与首尾空白）才进入计划模式；
//! 模型报错、无候选或任何其他回复一律回落到直接模式。取消仍然向上传播。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::core::{run_cancellable, AgentError};
use crate::llm::{GenerateConfig, LlmClient};
use crate::memory::{render_transcript, Content};
use crate::react::prompts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Direct,
    PlanExecute,
}

pub struct ModeSelector {
    llm: Arc<dyn LlmClient>,
}

impl ModeSelector {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn select(
        &self,
        prior: &[Content],
        message: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<Mode, AgentError> {
        let config = GenerateConfig::default().with_system(prompts::MODE_SYSTEM_PROMPT);
        let contents = vec![Content::user(prompts::mode_request(
            &render_transcript(prior),
            message,
        ))];

        let mode = match run_cancellable(cancel, self.llm.generate_content(&contents, &config)).await? {
            Ok(resp) => match resp.first_text() {
                Some(answer) if answer.trim().eq_ignore_ascii_case("yes") => Mode::PlanExecute,
                _ => Mode::Direct,
            },
            Err(e) => {
                tracing::warn!(error = %e, "mode selection failed, falling back to direct mode");
                Mode::Direct
            }
        };
        tracing::info!(?mode, "mode selected");
        Ok(mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, MockLlmClient};

    async fn select_with(mock: MockLlmClient) -> Mode {
        ModeSelector::new(Arc::new(mock))
            .select(&[Content::user("earlier")], "triage this alert fully", None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_yes_selects_plan() {
        let mock = MockLlmClient::new();
        mock.push_text(" YES\n");
        assert_eq!(select_with(mock).await, Mode::PlanExecute);
    }

    #[tokio::test]
    async fn test_everything_else_is_direct() {
        for answer in ["no", "yes, definitely", "y", ""] {
            let mock = MockLlmClient::new();
            mock.push_text(answer);
            assert_eq!(select_with(mock).await, Mode::Direct, "answer {answer:?}");
        }

        let mock = MockLlmClient::new();
        mock.push_error(LlmError::Network("down".to_string()));
        assert_eq!(select_with(mock).await, Mode::Direct);

        let mock = MockLlmClient::new();
        mock.push_empty();
        assert_eq!(select_with(mock).await, Mode::Direct);
    }

    #[tokio::test]
    async fn test_cancellation_propagates() {
        let token = CancellationToken::new();
        token.cancel();
        let err = ModeSelector::new(Arc::new(MockLlmClient::new()))
            .select(&[], "x", Some(&token))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
    }

    #[test]
    fn test_mode_wire_name() {
        assert_eq!(serde_json::to_string(&Mode::PlanExecute).unwrap(), "\"plan_execute\"");
    }
}
