//! ConclusionGenerator：汇总计划、步骤结果与反思，生成最终 markdown 结论
//!
//! 自由文本，无 schema、不重试；取第一个候选的第一个文本 Part，缺失或为空即失败。

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::alert::Alert;
use crate::core::{run_cancellable, AgentError};
use crate::llm::{GenerateConfig, LlmClient};
use crate::memory::Content;
use crate::react::{prompts, Conclusion, PlanRun};

pub struct ConclusionGenerator {
    llm: Arc<dyn LlmClient>,
}

impl ConclusionGenerator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn generate(
        &self,
        alert: &Alert,
        run: &PlanRun,
        cancel: Option<&CancellationToken>,
    ) -> Result<Conclusion, AgentError> {
        let config = GenerateConfig::default().with_system(format!(
            "{}\n\n{}",
            prompts::CONCLUSION_SYSTEM_PROMPT,
            alert.context_section()
        ));
        let contents = vec![Content::user(prompts::conclusion_request(
            &run.plan,
            &run.step_results(),
            &run.reflections(),
        ))];

        let resp = run_cancellable(cancel, self.llm.generate_content(&contents, &config)).await??;
        let content = resp
            .first_text()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AgentError::EmptyResponse("conclusion".to_string()))?
            .to_string();

        tracing::info!(chars = content.chars().count(), "conclusion generated");
        Ok(Conclusion {
            content,
            generated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::react::{Plan, Reflection, Step, StepResult};
    use serde_json::json;

    fn run() -> PlanRun {
        let plan = Plan::new("Is the login malicious?", vec![Step::new("s1", "check ip")]);
        let result = StepResult {
            step_id: "s1".to_string(),
            success: true,
            findings: "ip belongs to corporate VPN".to_string(),
            tool_calls: vec![],
            executed_at: Utc::now(),
        };
        let reflection = Reflection {
            step_id: "s1".to_string(),
            achieved: true,
            insights: vec!["benign".to_string()],
            plan_updates: vec![],
            reflected_at: Utc::now(),
        };
        PlanRun {
            plan,
            results: vec![(result, reflection)],
        }
    }

    #[tokio::test]
    async fn test_conclusion_first_text() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_text("## Verdict\nBenign.");
        let alert = Alert::new("a1", "t", json!({}));
        let c = ConclusionGenerator::new(mock.clone())
            .generate(&alert, &run(), None)
            .await
            .unwrap();
        assert_eq!(c.content, "## Verdict\nBenign.");
        let input = mock.requests()[0].contents[0].texts().concat();
        assert!(input.contains("ip belongs to corporate VPN"));
        assert!(input.contains("benign"));
    }

    #[tokio::test]
    async fn test_missing_candidate_is_fatal() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_empty();
        let alert = Alert::new("a1", "t", json!({}));
        let err = ConclusionGenerator::new(mock)
            .generate(&alert, &run(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::EmptyResponse(_)));
    }
}
