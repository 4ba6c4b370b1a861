//! Sleuth - 安全告警调查智能体
//!
//! 用法：`sleuth <alert.json> <request...>`
//! 入口：初始化日志、加载配置、打开存储、写入告警，跑一次会话并打印回复或结论。

use std::sync::Arc;

use anyhow::Context;
use sleuth::agent::{AgentComponents, ChatSession};
use sleuth::alert::Alert;
use sleuth::config::load_config;
use sleuth::core::cancel_on_ctrl_c;
use sleuth::llm::GeminiClient;
use sleuth::memory::{FileStorage, Repository, SqliteRepository};
use sleuth::observability;
use sleuth::react::AgentEvent;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let mut args = std::env::args().skip(1);
    let alert_path = args
        .next()
        .context("usage: sleuth <alert.json> <request...>")?;
    let request = args.collect::<Vec<_>>().join(" ");
    anyhow::ensure!(!request.trim().is_empty(), "usage: sleuth <alert.json> <request...>");

    let cfg = load_config(None).context("Failed to load config")?;

    let raw = std::fs::read_to_string(&alert_path)
        .with_context(|| format!("read alert file {}", alert_path))?;
    let alert: Alert = serde_json::from_str(&raw).context("parse alert JSON")?;

    let repo = Arc::new(
        SqliteRepository::open(cfg.storage.db_path()).context("open metadata database")?,
    );
    repo.put_alert(&alert).await.context("store alert")?;
    let storage = Arc::new(FileStorage::new(cfg.storage.blob_root()));

    let api_key = std::env::var(&cfg.llm.api_key_env)
        .with_context(|| format!("environment variable {} is not set", cfg.llm.api_key_env))?;
    let llm = Arc::new(
        GeminiClient::new(
            cfg.llm.base_url.as_deref(),
            &cfg.llm.model,
            &api_key,
            cfg.llm.timeout_secs,
        )
        .context("build Gemini client")?
        .with_overflow_signature(cfg.llm.overflow.clone()),
    );

    let components = Arc::new(AgentComponents::new(
        llm,
        repo,
        storage,
        cfg.agent.clone(),
        Vec::new(),
    ));

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<AgentEvent>();
    tokio::spawn(async move {
        while let Some(ev) = rx.recv().await {
            if let Ok(line) = serde_json::to_string(&ev) {
                tracing::info!(event = %line, "progress");
            }
        }
    });

    let mut session = ChatSession::new(components, &alert.id)
        .await
        .context("Failed to create session")?
        .with_events(tx);
    cancel_on_ctrl_c(session.cancel_token());

    let outcome = session.chat(&request).await.context("Investigation failed")?;
    tracing::info!(
        history_id = %session.history().id,
        mode = ?outcome.mode(),
        "investigation finished"
    );
    println!("{}", outcome.answer());

    Ok(())
}
