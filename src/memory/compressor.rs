//! 历史压缩
//!
//! 上下文溢出时，把记录最旧的一段（累计字节数首次达到总量 ratio 的最短前缀）交给模型摘要，
//! 替换为一条合成 user 记录；后缀原样保留。前缀为空或覆盖全部记录时无法压缩。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::{run_cancellable, AgentError};
use crate::llm::{GenerateConfig, LlmClient};
use crate::memory::{render_transcript, Content, Role};

pub const SUMMARY_HEADER: &str = "=== Previous Conversation Summary ===";

/// 默认压缩比例：摘要掉约 70% 的字节
pub const DEFAULT_COMPRESS_RATIO: f64 = 0.7;

const SUMMARY_SYSTEM_PROMPT: &str = "You are summarizing the earlier part of a security alert investigation \
conversation so that it can continue within the model's context limit. Preserve every concrete fact: \
indicators (IPs, domains, hashes, user names), tool calls made and what they returned, conclusions reached, \
and open questions. Output plain text only.";

pub struct HistoryCompressor {
    llm: Arc<dyn LlmClient>,
    ratio: f64,
}

impl HistoryCompressor {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            ratio: DEFAULT_COMPRESS_RATIO,
        }
    }

    pub fn with_ratio(mut self, ratio: f64) -> Self {
        self.ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// 选出被摘要的前缀长度 k（contents[..k]）
    ///
    /// k 是累计字节数 >= ratio * 总量 的最小前缀；后缀不能以 tool 记录开头（否则其函数调用会被摘要掉），
    /// 因此 k 会向后跳过紧随的 tool 记录。以下情况返回 InsufficientContent：
    /// k 为 0、k 覆盖全部记录、或前缀只有一条已有摘要（再压缩没有意义）。
    pub fn split_point(&self, contents: &[Content]) -> Result<usize, AgentError> {
        let sizes: Vec<usize> = contents.iter().map(Content::serialized_size).collect();
        let total: usize = sizes.iter().sum();
        let target = self.ratio * total as f64;

        let mut cumulative = 0usize;
        let mut k = 0usize;
        while k < sizes.len() && (cumulative as f64) < target {
            cumulative += sizes[k];
            k += 1;
        }
        while k < contents.len() && contents[k].role == Role::Tool {
            k += 1;
        }

        if k == 0 || k >= contents.len() {
            return Err(AgentError::InsufficientContent);
        }
        if k == 1 && is_summary(&contents[0]) {
            return Err(AgentError::InsufficientContent);
        }
        Ok(k)
    }

    /// 返回压缩后的新记录：[摘要] + 原后缀
    pub async fn compress(
        &self,
        contents: &[Content],
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<Content>, AgentError> {
        let k = self.split_point(contents)?;
        let (prefix, suffix) = contents.split_at(k);

        let request = vec![Content::user(format!(
            "Summarize the following conversation:\n\n{}",
            render_transcript(prefix)
        ))];
        let config = GenerateConfig::default().with_system(SUMMARY_SYSTEM_PROMPT);
        let resp = run_cancellable(cancel, self.llm.generate_content(&request, &config)).await??;
        let summary = resp
            .first_content()
            .map(|c| c.texts().join("\n"))
            .unwrap_or_default();
        if summary.trim().is_empty() {
            return Err(AgentError::EmptyResponse("history summary".to_string()));
        }

        tracing::info!(
            summarized = k,
            kept = suffix.len(),
            summary_chars = summary.chars().count(),
            "history compressed"
        );

        let mut out = Vec::with_capacity(suffix.len() + 1);
        out.push(Content::user(format!("{}\n\n{}", SUMMARY_HEADER, summary.trim())));
        out.extend_from_slice(suffix);
        Ok(out)
    }
}

/// 是否为压缩产生的摘要记录
pub fn is_summary(content: &Content) -> bool {
    content.role == Role::User
        && content
            .parts
            .first()
            .and_then(|p| p.as_text())
            .map(|t| t.starts_with(SUMMARY_HEADER))
            .unwrap_or(false)
}
