//! 函数调用分发
//!
//! 一轮模型输出中的全部函数调用按出现顺序逐个执行（不并发），
//! 所有响应合并为一条 tool 记录；工具错误编码进对应响应，不中止。

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::core::{run_cancellable, AgentError};
use crate::memory::{Content, FunctionCall, FunctionResponse};
use crate::react::events::{preview, send_event, AgentEvent, EventSender};
use crate::react::ToolCall;
use crate::tools::{result_text, to_response, ToolRegistry};

pub struct Dispatched {
    /// 合并后的 tool 记录
    pub content: Content,
    /// 每个调用一条记录，顺序与调用一致
    pub calls: Vec<ToolCall>,
}

pub async fn dispatch_calls(
    registry: &ToolRegistry,
    calls: &[&FunctionCall],
    cancel: Option<&CancellationToken>,
    events: Option<&EventSender>,
) -> Result<Dispatched, AgentError> {
    let mut responses = Vec::with_capacity(calls.len());
    let mut records = Vec::with_capacity(calls.len());

    for call in calls {
        send_event(
            events,
            AgentEvent::ToolCall {
                tool: call.name.clone(),
                args: call.args.clone(),
            },
        );
        let args = if call.args.is_null() {
            Value::Object(Default::default())
        } else {
            call.args.clone()
        };
        let result = run_cancellable(cancel, registry.execute(&call.name, &args)).await?;
        if let Err(e) = &result {
            tracing::warn!(tool = %call.name, error = %e, "tool call failed");
        }
        let text = result_text(&result);
        send_event(
            events,
            AgentEvent::ToolResult {
                tool: call.name.clone(),
                ok: result.is_ok(),
                preview: preview(&text),
            },
        );
        responses.push(FunctionResponse {
            name: call.name.clone(),
            response: to_response(&result),
        });
        records.push(ToolCall {
            name: call.name.clone(),
            args,
            result: text,
        });
    }

    Ok(Dispatched {
        content: Content::tool_results(responses),
        calls: records,
    })
}
