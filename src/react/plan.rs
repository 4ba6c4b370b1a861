//! 计划数据模型
//!
//! Plan 只追加 / 替换 / 取消步骤，从不重排或删除：Canceled 是终态跳过，不是移除，
//! 保证按步骤 ID 引用的审计记录稳定。步骤 ID 唯一性由调用方保证，这里不校验。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::AgentError;

/// 步骤状态：Pending 为初始态，InProgress 仅在执行期间，Completed / Canceled 为终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub description: String,
    /// 建议使用的工具（仅提示，不限制）
    #[serde(default)]
    pub tools: Vec<String>,
    /// 预期结果
    #[serde(default)]
    pub expected: String,
    #[serde(default)]
    pub status: StepStatus,
}

impl Step {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            tools: Vec::new(),
            expected: String::new(),
            status: StepStatus::Pending,
        }
    }

    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = expected.into();
        self
    }

    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools = tools;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub objective: String,
    pub steps: Vec<Step>,
    pub generated_at: DateTime<Utc>,
}

/// 单次工具调用记录（只追加）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub args: Value,
    /// 工具返回的 result 字段，或显式错误串
    pub result: String,
}

/// 步骤执行结果，创建后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub success: bool,
    pub findings: String,
    pub tool_calls: Vec<ToolCall>,
    pub executed_at: DateTime<Utc>,
}

/// 计划变更
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanUpdate {
    AddStep {
        step: Step,
    },
    UpdateStep {
        step: Step,
    },
    CancelStep {
        step_id: String,
        #[serde(default)]
        reason: String,
    },
}

/// 每个已执行步骤一条反思
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reflection {
    pub step_id: String,
    pub achieved: bool,
    pub insights: Vec<String>,
    pub plan_updates: Vec<PlanUpdate>,
    pub reflected_at: DateTime<Utc>,
}

/// 最终结论（markdown）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conclusion {
    pub content: String,
    pub generated_at: DateTime<Utc>,
}

impl Plan {
    pub fn new(objective: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            objective: objective.into(),
            steps,
            generated_at: Utc::now(),
        }
    }

    /// 按索引顺序找到第一个 Pending 步骤
    pub fn next_pending(&self) -> Option<usize> {
        self.steps
            .iter()
            .position(|s| s.status == StepStatus::Pending)
    }

    pub fn pending_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Pending)
            .count()
    }

    pub fn descriptions_with(&self, status: StepStatus) -> Vec<String> {
        self.steps
            .iter()
            .filter(|s| s.status == status)
            .map(|s| format!("{}: {}", s.id, s.description))
            .collect()
    }

    fn position(&self, step_id: &str) -> Result<usize, AgentError> {
        self.steps
            .iter()
            .position(|s| s.id == step_id)
            .ok_or_else(|| AgentError::StepNotFound(step_id.to_string()))
    }

    /// 应用单个变更；新增与替换的步骤一律强制为 Pending
    pub fn apply(&mut self, update: &PlanUpdate) -> Result<(), AgentError> {
        match update {
            PlanUpdate::AddStep { step } => {
                let mut step = step.clone();
                step.status = StepStatus::Pending;
                self.steps.push(step);
            }
            PlanUpdate::UpdateStep { step } => {
                let idx = self.position(&step.id)?;
                let mut step = step.clone();
                step.status = StepStatus::Pending;
                self.steps[idx] = step;
            }
            PlanUpdate::CancelStep { step_id, .. } => {
                let idx = self.position(step_id)?;
                self.steps[idx].status = StepStatus::Canceled;
            }
        }
        Ok(())
    }

    /// 按顺序应用一组变更；任一失败则整体不生效，步骤列表保持原样
    pub fn apply_all(&mut self, updates: &[PlanUpdate]) -> Result<(), AgentError> {
        let backup = self.steps.clone();
        for update in updates {
            if let Err(e) = self.apply(update) {
                self.steps = backup;
                return Err(e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plan() -> Plan {
        Plan::new(
            "Decide whether the login is malicious",
            vec![
                Step::new("s1", "Look up source IP"),
                Step::new("s2", "Check user history"),
            ],
        )
    }

    #[test]
    fn test_add_step_forced_pending_and_appended() {
        let mut p = plan();
        let mut s3 = Step::new("s3", "Correlate with VPN logs");
        s3.status = StepStatus::Completed;
        p.apply(&PlanUpdate::AddStep { step: s3 }).unwrap();
        assert_eq!(p.steps.len(), 3);
        assert_eq!(p.steps[2].id, "s3");
        assert_eq!(p.steps[2].status, StepStatus::Pending);
    }

    #[test]
    fn test_update_step_replaces_first_match() {
        let mut p = plan();
        p.steps[0].status = StepStatus::Completed;
        p.steps.push(Step::new("s1", "duplicate id"));
        p.apply(&PlanUpdate::UpdateStep {
            step: Step::new("s1", "Look up source IP in threat intel").with_expected("reputation"),
        })
        .unwrap();
        assert_eq!(p.steps[0].description, "Look up source IP in threat intel");
        assert_eq!(p.steps[0].status, StepStatus::Pending);
        assert_eq!(p.steps[2].description, "duplicate id");
    }

    #[test]
    fn test_cancel_step_in_place() {
        let mut p = plan();
        p.apply(&PlanUpdate::CancelStep {
            step_id: "s2".to_string(),
            reason: "not needed".to_string(),
        })
        .unwrap();
        assert_eq!(p.steps.len(), 2);
        assert_eq!(p.steps[1].status, StepStatus::Canceled);
        assert_eq!(p.next_pending(), Some(0));
    }

    #[test]
    fn test_unknown_step_fails_and_leaves_plan_unchanged() {
        let mut p = plan();
        let before = p.steps.clone();
        let err = p
            .apply(&PlanUpdate::CancelStep {
                step_id: "s9".to_string(),
                reason: String::new(),
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "target step not found: s9");
        assert_eq!(p.steps, before);

        let err = p
            .apply(&PlanUpdate::UpdateStep {
                step: Step::new("s9", "ghost"),
            })
            .unwrap_err();
        assert!(matches!(err, AgentError::StepNotFound(ref id) if id == "s9"));
        assert_eq!(p.steps, before);
    }

    #[test]
    fn test_apply_all_is_atomic() {
        let mut p = plan();
        let before = p.steps.clone();
        let result = p.apply_all(&[
            PlanUpdate::AddStep {
                step: Step::new("s3", "extra"),
            },
            PlanUpdate::CancelStep {
                step_id: "missing".to_string(),
                reason: String::new(),
            },
        ]);
        assert!(result.is_err());
        assert_eq!(p.steps, before);
    }

    #[test]
    fn test_plan_update_wire_shape() {
        let v = serde_json::to_value(PlanUpdate::CancelStep {
            step_id: "s2".to_string(),
            reason: "dup".to_string(),
        })
        .unwrap();
        assert_eq!(v, json!({"type": "cancel_step", "step_id": "s2", "reason": "dup"}));
    }

    #[test]
    fn test_plan_json_roundtrip_keeps_status_and_order() {
        let mut p = plan();
        p.steps[0].status = StepStatus::Completed;
        p.steps[1].status = StepStatus::Canceled;
        p.steps.push(Step::new("s3", "x"));
        let raw = serde_json::to_string(&p).unwrap();
        let back: Plan = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, p);
        let ids: Vec<_> = back.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2", "s3"]);

        let reflection = Reflection {
            step_id: "s1".to_string(),
            achieved: true,
            insights: vec!["ip is a tor exit".to_string()],
            plan_updates: vec![PlanUpdate::AddStep {
                step: Step::new("s4", "check tor usage"),
            }],
            reflected_at: Utc::now(),
        };
        let back: Reflection =
            serde_json::from_str(&serde_json::to_string(&reflection).unwrap()).unwrap();
        assert_eq!(back, reflection);

        let result = StepResult {
            step_id: "s1".to_string(),
            success: false,
            findings: "none".to_string(),
            tool_calls: vec![
                ToolCall { name: "a".to_string(), args: json!({}), result: "1".to_string() },
                ToolCall { name: "b".to_string(), args: json!({}), result: "2".to_string() },
            ],
            executed_at: Utc::now(),
        };
        let back: StepResult =
            serde_json::from_str(&serde_json::to_string(&result).unwrap()).unwrap();
        assert_eq!(back, result);
    }
}
