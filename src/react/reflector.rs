//! Reflector：步骤执行后的结构化反思
//!
//! 判断步骤是否达成预期、提炼要点，并给出计划变更（add_step / update_step / cancel_step）。
//! 输出非法即整体失败，不重试；变更引用的步骤是否存在由 Plan::apply_all 校验。

use std::sync::Arc;

use chrono::Utc;
use schemars::JsonSchema;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::core::{run_cancellable, AgentError};
use crate::llm::{parse_response, response_schema, GenerateConfig, LlmClient};
use crate::memory::Content;
use crate::react::planner::StepDraft;
use crate::react::{prompts, Plan, PlanUpdate, Reflection, Step, StepResult};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReflectionDraft {
    /// 步骤是否达成预期结果
    pub achieved: bool,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub plan_updates: Vec<UpdateDraft>,
}

#[derive(Debug, Clone, Copy, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    AddStep,
    UpdateStep,
    CancelStep,
}

/// 模型侧的扁平变更结构：step 用于 add/update，step_id + reason 用于 cancel
#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateDraft {
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    #[serde(default)]
    pub step: Option<StepDraft>,
    #[serde(default)]
    pub step_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl TryFrom<UpdateDraft> for PlanUpdate {
    type Error = AgentError;

    fn try_from(d: UpdateDraft) -> Result<Self, Self::Error> {
        match d.kind {
            UpdateKind::AddStep => d
                .step
                .map(|s| PlanUpdate::AddStep { step: Step::from(s) })
                .ok_or_else(|| AgentError::StructuredOutput("add_step without step".to_string())),
            UpdateKind::UpdateStep => d
                .step
                .map(|s| PlanUpdate::UpdateStep { step: Step::from(s) })
                .ok_or_else(|| {
                    AgentError::StructuredOutput("update_step without step".to_string())
                }),
            UpdateKind::CancelStep => d
                .step_id
                .map(|step_id| PlanUpdate::CancelStep {
                    step_id,
                    reason: d.reason.unwrap_or_default(),
                })
                .ok_or_else(|| {
                    AgentError::StructuredOutput("cancel_step without step_id".to_string())
                }),
        }
    }
}

pub struct Reflector {
    llm: Arc<dyn LlmClient>,
}

impl Reflector {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn reflect(
        &self,
        step: &Step,
        result: &StepResult,
        tool_names: &[String],
        plan: &Plan,
        cancel: Option<&CancellationToken>,
    ) -> Result<Reflection, AgentError> {
        let config = GenerateConfig::default()
            .with_system(prompts::REFLECT_SYSTEM_PROMPT)
            .with_schema(response_schema::<ReflectionDraft>());
        let contents = vec![Content::user(prompts::reflect_request(
            step, result, tool_names, plan,
        ))];

        let resp = run_cancellable(cancel, self.llm.generate_content(&contents, &config)).await??;
        let draft: ReflectionDraft = parse_response(&resp)?;
        let plan_updates = draft
            .plan_updates
            .into_iter()
            .map(PlanUpdate::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!(
            step_id = %step.id,
            achieved = draft.achieved,
            updates = plan_updates.len(),
            "step reflected"
        );
        Ok(Reflection {
            step_id: step.id.clone(),
            achieved: draft.achieved,
            insights: draft.insights,
            plan_updates,
            reflected_at: Utc::now(),
        })
    }
}
