//! PlanGenerator：一次结构化调用生成调查计划
//!
//! 输入：请求、告警上下文、既有会话（渲染为文本）、工具目录；输出 {objective, steps[]}。
//! 输出为空、非 JSON 或没有任何步骤时整体失败，不重试。

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::alert::Alert;
use crate::core::{run_cancellable, AgentError};
use crate::llm::{parse_response, response_schema, GenerateConfig, LlmClient};
use crate::memory::{render_transcript, Content};
use crate::react::{prompts, Plan, Step};
use crate::tools::ToolRegistry;

/// 模型返回的计划草稿
#[derive(Debug, Deserialize, JsonSchema)]
pub struct PlanDraft {
    /// 本次调查要回答的问题
    pub objective: String,
    pub steps: Vec<StepDraft>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct StepDraft {
    /// 计划内唯一，如 s1
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub expected: String,
}

impl From<StepDraft> for Step {
    fn from(d: StepDraft) -> Self {
        Step::new(d.id, d.description)
            .with_tools(d.tools)
            .with_expected(d.expected)
    }
}

pub struct PlanGenerator {
    llm: Arc<dyn LlmClient>,
    registry: Arc<ToolRegistry>,
}

impl PlanGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, registry: Arc<ToolRegistry>) -> Self {
        Self { llm, registry }
    }

    pub async fn generate(
        &self,
        alert: &Alert,
        request: &str,
        prior: &[Content],
        cancel: Option<&CancellationToken>,
    ) -> Result<Plan, AgentError> {
        let config = GenerateConfig::default()
            .with_system(prompts::plan_system(alert, &self.registry.catalog()))
            .with_schema(response_schema::<PlanDraft>());
        let contents = vec![Content::user(prompts::plan_request(
            request,
            &render_transcript(prior),
        ))];

        let resp = run_cancellable(cancel, self.llm.generate_content(&contents, &config)).await??;
        let draft: PlanDraft = parse_response(&resp)?;
        if draft.steps.is_empty() {
            return Err(AgentError::StructuredOutput("plan has no steps".to_string()));
        }

        let plan = Plan::new(
            draft.objective,
            draft.steps.into_iter().map(Step::from).collect(),
        );
        tracing::info!(
            objective = %plan.objective,
            steps = plan.steps.len(),
            "plan generated"
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::react::StepStatus;
    use serde_json::json;

    fn generator(mock: Arc<MockLlmClient>) -> PlanGenerator {
        PlanGenerator::new(mock, Arc::new(ToolRegistry::default()))
    }

    #[tokio::test]
    async fn test_generate_plan_all_pending() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_text(
            "```json\n{\"objective\":\"Is 203.0.113.7 malicious?\",\"steps\":[\
             {\"id\":\"s1\",\"description\":\"search related alerts\",\"tools\":[\"search_alerts\"],\"expected\":\"list\"},\
             {\"id\":\"s2\",\"description\":\"summarize\"}]}\n```",
        );
        let alert = Alert::new("a1", "Suspicious login", json!({"ip": "203.0.113.7"}));
        let plan = generator(mock.clone())
            .generate(&alert, "investigate the ip", &[Content::user("earlier question")], None)
            .await
            .unwrap();
        assert_eq!(plan.objective, "Is 203.0.113.7 malicious?");
        assert_eq!(plan.steps.len(), 2);
        assert!(plan.steps.iter().all(|s| s.status == StepStatus::Pending));
        assert_eq!(plan.steps[0].tools, vec!["search_alerts".to_string()]);
        assert_eq!(plan.steps[1].expected, "");

        let req = &mock.requests()[0];
        assert!(req.config.response_schema.is_some());
        let input = req.contents[0].texts().concat();
        assert!(input.contains("earlier question"));
        assert!(input.contains("investigate the ip"));
    }

    #[tokio::test]
    async fn test_malformed_plan_is_fatal() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_text("I think we should look at the logs first.");
        let alert = Alert::new("a1", "t", json!({}));
        let err = generator(mock.clone())
            .generate(&alert, "go", &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::StructuredOutput(_)));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_outputs_are_fatal() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_empty();
        mock.push_json(json!({"objective": "x", "steps": []}));
        let alert = Alert::new("a1", "t", json!({}));
        let gen = generator(mock);
        assert!(matches!(
            gen.generate(&alert, "go", &[], None).await,
            Err(AgentError::StructuredOutput(_))
        ));
        assert!(matches!(
            gen.generate(&alert, "go", &[], None).await,
            Err(AgentError::StructuredOutput(_))
        ));
    }
}
