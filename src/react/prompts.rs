//! 提示词模板
//!
//! 各阶段的 system prompt 与输入拼装。只保证输入形状，不追求措辞。

use crate::alert::Alert;
use crate::react::{Plan, Reflection, Step, StepResult, StepStatus};

pub const DIRECT_SYSTEM_PROMPT: &str = "You are a security analyst assistant investigating an alert. \
Answer the analyst's questions about the alert. Call the available tools whenever data is needed \
instead of guessing; if a tool returns an error, adjust the arguments or try another approach.";

pub const PLAN_SYSTEM_PROMPT: &str = "You are a security investigation planner. Break the analyst's \
request into a short ordered list of concrete investigation steps that can each be carried out with \
the available tools. Give every step a unique id (s1, s2, ...), a description, the tools it will \
likely need, and the expected outcome. Respond with JSON only.";

pub const STEP_SYSTEM_PROMPT: &str = "You are executing exactly one step of a security investigation \
plan. Use the available tools to carry out the step, then report your findings in plain text. \
Do not work on other steps.";

pub const REFLECT_SYSTEM_PROMPT: &str = "You review the result of one investigation step. Decide \
whether the step achieved its expected outcome, list the key insights, and propose plan updates: \
add_step for new work the findings call for, update_step to revise a pending step, cancel_step for \
steps that are no longer needed. Only reference step ids that exist. Respond with JSON only.";

pub const CONCLUSION_SYSTEM_PROMPT: &str = "You write the final report of a security alert \
investigation in markdown: verdict, key evidence, what each step found, and recommended next actions.";

pub const MODE_SYSTEM_PROMPT: &str = "Decide whether the analyst's new message needs a multi-step \
investigation plan. Answer \"yes\" if the request requires several dependent data lookups, \
correlation across sources, or a full triage of the alert. Answer \"no\" for simple questions, \
clarifications, single lookups, or follow-ups that the conversation already answers. \
Reply with exactly one word: yes or no.";

pub const TITLE_SYSTEM_PROMPT: &str = "Write a short title for this alert investigation session. \
Reply with the title only, no quotes.";

/// 直接模式 system prompt：基础提示 + 告警上下文 + 工具提示词
pub fn direct_system(alert: &Alert, tool_prompts: &str) -> String {
    let mut s = format!("{}\n\n{}", DIRECT_SYSTEM_PROMPT, alert.context_section());
    if !tool_prompts.trim().is_empty() {
        s.push_str("\n## Tools\n");
        s.push_str(tool_prompts);
        s.push('\n');
    }
    s
}

pub fn plan_system(alert: &Alert, catalog: &str) -> String {
    format!(
        "{}\n\n{}\n## Available tools\n{}\n",
        PLAN_SYSTEM_PROMPT,
        alert.context_section(),
        catalog
    )
}

pub fn plan_request(request: &str, prior: &str) -> String {
    if prior.trim().is_empty() {
        format!("## Request\n{}\n", request)
    } else {
        format!(
            "## Conversation so far\n{}\n## Request\n{}\n",
            prior, request
        )
    }
}

pub fn step_system(alert: &Alert) -> String {
    format!("{}\n\n{}", STEP_SYSTEM_PROMPT, alert.context_section())
}

/// 步骤执行的初始输入：目标、步骤、预期、已完成步骤结果、工具目录
pub fn step_request(plan: &Plan, step: &Step, previous: &[StepResult], catalog: &str) -> String {
    let mut s = format!(
        "## Objective\n{}\n\n## Current step ({})\n{}\n\n## Expected outcome\n{}\n",
        plan.objective, step.id, step.description, step.expected
    );
    if !step.tools.is_empty() {
        s.push_str(&format!("\nSuggested tools: {}\n", step.tools.join(", ")));
    }
    if !previous.is_empty() {
        s.push_str("\n## Results of previous steps\n");
        for r in previous {
            s.push_str(&format!(
                "- {} ({}): {}\n",
                r.step_id,
                if r.success { "success" } else { "failed" },
                r.findings
            ));
        }
    }
    s.push_str(&format!("\n## Available tools\n{}\n", catalog));
    s
}

pub fn reflect_request(
    step: &Step,
    result: &StepResult,
    tool_names: &[String],
    plan: &Plan,
) -> String {
    let calls = result
        .tool_calls
        .iter()
        .map(|c| format!("- {}({}) -> {}", c.name, c.args, c.result))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "## Step {}\n{}\n\n## Expected outcome\n{}\n\n## Result\nsuccess: {}\nfindings:\n{}\n\n## Tool calls\n{}\n\n\
         ## Enabled tools\n{}\n\n## Completed steps\n{}\n\n## Pending steps\n{}\n",
        step.id,
        step.description,
        step.expected,
        result.success,
        result.findings,
        if calls.is_empty() { "(none)".to_string() } else { calls },
        tool_names.join(", "),
        bullet(&plan.descriptions_with(StepStatus::Completed)),
        bullet(&plan.descriptions_with(StepStatus::Pending)),
    )
}

pub fn conclusion_request(
    plan: &Plan,
    results: &[StepResult],
    reflections: &[Reflection],
) -> String {
    let mut s = format!("## Objective\n{}\n\n## Steps\n", plan.objective);
    for step in &plan.steps {
        s.push_str(&format!(
            "- {} [{:?}] {}\n",
            step.id, step.status, step.description
        ));
    }
    s.push_str("\n## Results\n");
    for r in results {
        s.push_str(&format!(
            "### {} ({})\n{}\n",
            r.step_id,
            if r.success { "success" } else { "failed" },
            r.findings
        ));
    }
    s.push_str("\n## Reflections\n");
    for r in reflections {
        s.push_str(&format!(
            "- {} achieved={}: {}\n",
            r.step_id,
            r.achieved,
            r.insights.join("; ")
        ));
    }
    s
}

pub fn mode_request(prior: &str, message: &str) -> String {
    format!(
        "## Conversation so far\n{}\n\n## New message\n{}\n",
        if prior.trim().is_empty() { "(empty)" } else { prior },
        message
    )
}

pub fn title_request(alert: &Alert, message: &str, max_chars: usize, rejected: &[String]) -> String {
    let mut s = format!(
        "Alert: {}\nFirst message: {}\n\nThe title must be at most {} characters.\n",
        alert.title, message, max_chars
    );
    if !rejected.is_empty() {
        s.push_str("These titles were too long, do not repeat them:\n");
        for t in rejected {
            s.push_str(&format!("- {} ({} characters)\n", t, t.chars().count()));
        }
    }
    s
}

fn bullet(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items
            .iter()
            .map(|i| format!("- {}", i))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
