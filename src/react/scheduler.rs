//! PlanScheduler：Plan -> Execute -> Reflect 主循环
//!
//! 每轮按索引顺序取第一个 Pending 步骤：标记 InProgress，执行，无论成败标记 Completed，反思，应用变更。
//! AddStep 总是追加到末尾，所以新步骤一定排在插入时已存在的步骤之后执行。
//! 变更引用不存在的步骤时整个运行终止。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::alert::Alert;
use crate::core::AgentError;
use crate::react::events::{send_event, AgentEvent, EventSender};
use crate::react::{Plan, Reflection, Reflector, StepExecutor, StepResult, StepStatus};
use crate::tools::ToolRegistry;

/// 单次运行最多执行的步骤数；反思不断追加步骤时兜底
pub const DEFAULT_MAX_PLAN_STEPS: usize = 50;

/// 调度结果：变更后的计划 + 按执行顺序的 (结果, 反思)
#[derive(Debug, Clone)]
pub struct PlanRun {
    pub plan: Plan,
    pub results: Vec<(StepResult, Reflection)>,
}

impl PlanRun {
    pub fn step_results(&self) -> Vec<StepResult> {
        self.results.iter().map(|(r, _)| r.clone()).collect()
    }

    pub fn reflections(&self) -> Vec<Reflection> {
        self.results.iter().map(|(_, r)| r.clone()).collect()
    }
}

pub struct PlanScheduler {
    executor: StepExecutor,
    reflector: Reflector,
    registry: Arc<ToolRegistry>,
    max_steps: usize,
}

impl PlanScheduler {
    pub fn new(executor: StepExecutor, reflector: Reflector, registry: Arc<ToolRegistry>) -> Self {
        Self {
            executor,
            reflector,
            registry,
            max_steps: DEFAULT_MAX_PLAN_STEPS,
        }
    }

    pub fn with_max_steps(mut self, max: usize) -> Self {
        self.max_steps = max.max(1);
        self
    }

    pub async fn run(
        &self,
        alert: &Alert,
        mut plan: Plan,
        cancel: Option<&CancellationToken>,
        events: Option<&EventSender>,
    ) -> Result<PlanRun, AgentError> {
        let tool_names = self.registry.tool_names();
        let mut results: Vec<(StepResult, Reflection)> = Vec::new();

        while let Some(idx) = plan.next_pending() {
            if results.len() >= self.max_steps {
                tracing::warn!(
                    max_steps = self.max_steps,
                    pending = plan.pending_count(),
                    "plan step limit reached, remaining steps left pending"
                );
                break;
            }

            plan.steps[idx].status = StepStatus::InProgress;
            let step = plan.steps[idx].clone();
            tracing::info!(step_id = %step.id, "executing step");
            send_event(
                events,
                AgentEvent::StepStarted {
                    step_id: step.id.clone(),
                    description: step.description.clone(),
                },
            );

            let previous: Vec<StepResult> = results.iter().map(|(r, _)| r.clone()).collect();
            let result = self
                .executor
                .execute(alert, &plan, &step, &previous, cancel, events)
                .await?;
            plan.steps[idx].status = StepStatus::Completed;
            send_event(
                events,
                AgentEvent::StepFinished {
                    step_id: step.id.clone(),
                    success: result.success,
                },
            );

            let reflection = self
                .reflector
                .reflect(&step, &result, &tool_names, &plan, cancel)
                .await?;
            plan.apply_all(&reflection.plan_updates)?;
            send_event(
                events,
                AgentEvent::Reflected {
                    step_id: step.id.clone(),
                    achieved: reflection.achieved,
                    updates: reflection.plan_updates.len(),
                },
            );

            results.push((result, reflection));
        }

        tracing::info!(executed = results.len(), total = plan.steps.len(), "plan finished");
        Ok(PlanRun { plan, results })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::react::Step;
    use serde_json::json;

    fn scheduler(mock: Arc<MockLlmClient>) -> PlanScheduler {
        let registry = Arc::new(ToolRegistry::default());
        PlanScheduler::new(
            StepExecutor::new(mock.clone(), registry.clone()),
            Reflector::new(mock),
            registry,
        )
    }

    #[tokio::test]
    async fn test_cancel_skips_step() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_text("s1 done");
        mock.push_json(json!({"achieved": true, "plan_updates": [{"type": "cancel_step", "step_id": "s2"}]}));
        mock.push_text("s3 done");
        mock.push_json(json!({"achieved": true}));
        let plan = Plan::new(
            "o",
            vec![Step::new("s1", "a"), Step::new("s2", "b"), Step::new("s3", "c")],
        );
        let alert = Alert::new("a1", "t", json!({}));
        let run = scheduler(mock.clone()).run(&alert, plan, None, None).await.unwrap();

        let executed: Vec<_> = run.results.iter().map(|(r, _)| r.step_id.as_str()).collect();
        assert_eq!(executed, vec!["s1", "s3"]);
        let statuses: Vec<_> = run.plan.steps.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![StepStatus::Completed, StepStatus::Canceled, StepStatus::Completed]
        );
        assert_eq!(mock.remaining(), 0);
    }

    #[tokio::test]
    async fn test_update_revives_completed_step() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_text("first pass");
        mock.push_json(json!({
            "achieved": false,
            "plan_updates": [{"type": "update_step", "step": {"id": "s1", "description": "retry with wider window"}}]
        }));
        mock.push_text("second pass");
        mock.push_json(json!({"achieved": true}));
        let plan = Plan::new("o", vec![Step::new("s1", "look")]);
        let alert = Alert::new("a1", "t", json!({}));
        let run = scheduler(mock).run(&alert, plan, None, None).await.unwrap();
        assert_eq!(run.results.len(), 2);
        assert_eq!(run.plan.steps.len(), 1);
        assert_eq!(run.plan.steps[0].description, "retry with wider window");
        assert_eq!(run.plan.steps[0].status, StepStatus::Completed);
    }

    #[tokio::test]
    async fn test_unknown_step_aborts_run() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_text("done");
        mock.push_json(json!({"achieved": true, "plan_updates": [{"type": "cancel_step", "step_id": "s7"}]}));
        mock.push_text("never reached");
        let plan = Plan::new("o", vec![Step::new("s1", "a"), Step::new("s2", "b")]);
        let alert = Alert::new("a1", "t", json!({}));
        let err = scheduler(mock.clone()).run(&alert, plan, None, None).await.unwrap_err();
        assert_eq!(err.to_string(), "target step not found: s7");
        assert_eq!(mock.remaining(), 1);
    }

    #[tokio::test]
    async fn test_step_limit_stops_runaway_plan() {
        let mock = Arc::new(MockLlmClient::new());
        for i in 0..3 {
            mock.push_text("ok");
            mock.push_json(json!({
                "achieved": true,
                "plan_updates": [{"type": "add_step", "step": {"id": format!("x{i}"), "description": "more"}}]
            }));
        }
        let plan = Plan::new("o", vec![Step::new("s1", "a")]);
        let alert = Alert::new("a1", "t", json!({}));
        let run = scheduler(mock)
            .with_max_steps(3)
            .run(&alert, plan, None, None)
            .await
            .unwrap();
        assert_eq!(run.results.len(), 3);
        assert_eq!(run.plan.pending_count(), 1);
    }
}
