//! TitleGenerator：为新会话生成简短标题
//!
//! 标题超过字符上限时重试，每次重试把此前所有超长标题作为反例写进提示；总次数用尽返回 Validation 错误。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::alert::Alert;
use crate::core::{run_cancellable, AgentError};
use crate::llm::{GenerateConfig, LlmClient};
use crate::memory::Content;
use crate::react::prompts;

pub const DEFAULT_TITLE_MAX_CHARS: usize = 50;
pub const DEFAULT_TITLE_MAX_ATTEMPTS: usize = 3;

pub struct TitleGenerator {
    llm: Arc<dyn LlmClient>,
    max_chars: usize,
    max_attempts: usize,
}

impl TitleGenerator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            max_chars: DEFAULT_TITLE_MAX_CHARS,
            max_attempts: DEFAULT_TITLE_MAX_ATTEMPTS,
        }
    }

    pub fn with_limits(mut self, max_chars: usize, max_attempts: usize) -> Self {
        self.max_chars = max_chars.max(1);
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub async fn generate(
        &self,
        alert: &Alert,
        message: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<String, AgentError> {
        let config = GenerateConfig::default().with_system(prompts::TITLE_SYSTEM_PROMPT);
        let mut rejected: Vec<String> = Vec::new();

        for attempt in 1..=self.max_attempts {
            let contents = vec![Content::user(prompts::title_request(
                alert,
                message,
                self.max_chars,
                &rejected,
            ))];
            let resp =
                run_cancellable(cancel, self.llm.generate_content(&contents, &config)).await??;
            let title = resp
                .first_text()
                .map(|t| t.trim().trim_matches('"').trim().to_string())
                .filter(|t| !t.is_empty())
                .ok_or_else(|| AgentError::EmptyResponse("title".to_string()))?;

            if title.chars().count() <= self.max_chars {
                return Ok(title);
            }
            tracing::debug!(attempt, chars = title.chars().count(), "title too long, retrying");
            rejected.push(title);
        }

        Err(AgentError::Validation(format!(
            "title exceeds {} characters after {} attempts",
            self.max_chars, self.max_attempts
        )))
    }
}
