//! 会话运行时
//!
//! AgentComponents 持有可多会话共享的模型、工具注册表、存储与 [agent] 配置；
//! ChatSession 绑定一个告警与一个 History，对每条新消息选择模式并执行：
//! 直接模式交给 ConversationLoop（由其负责持久化），计划模式跑完整的
//! 计划 -> 调度 -> 结论，成功后把用户消息与结论追加进记录并持久化一次。
//! 两种模式下出错的一轮都不会进入内存中的记录。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::alert::Alert;
use crate::config::{AgentSection, PlanMode};
use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::{Content, History, HistoryCompressor, HistoryStore, Repository, Storage};
use crate::react::events::{send_event, AgentEvent, EventSender};
use crate::react::{
    Conclusion, ConclusionGenerator, ConversationLoop, DirectResult, Mode, ModeSelector,
    PlanGenerator, PlanRun, PlanScheduler, Reflector, SessionState, StepExecutor,
    TitleGenerator,
};
use crate::tools::{AlertTool, Tool, ToolRegistry};

/// 预构建的会话组件，可多会话共享
pub struct AgentComponents {
    pub llm: Arc<dyn LlmClient>,
    pub registry: Arc<ToolRegistry>,
    pub store: HistoryStore,
    pub settings: AgentSection,
}

impl AgentComponents {
    /// 默认注册 AlertTool；extra_tools 追加在其后（同名函数后注册者生效）
    pub fn new(
        llm: Arc<dyn LlmClient>,
        repo: Arc<dyn Repository>,
        storage: Arc<dyn Storage>,
        settings: AgentSection,
        extra_tools: Vec<Arc<dyn Tool>>,
    ) -> Self {
        let mut tools: Vec<Arc<dyn Tool>> = vec![Arc::new(AlertTool::new(repo.clone()))];
        tools.extend(extra_tools);
        Self {
            llm,
            registry: Arc::new(ToolRegistry::new(tools)),
            store: HistoryStore::new(repo, storage),
            settings,
        }
    }

    fn conversation_loop(&self) -> ConversationLoop {
        ConversationLoop::new(self.llm.clone(), self.registry.clone(), self.store.clone())
            .with_max_iterations(self.settings.max_iterations)
            .with_compressor(
                HistoryCompressor::new(self.llm.clone()).with_ratio(self.settings.compress_ratio),
            )
    }

    fn scheduler(&self) -> PlanScheduler {
        PlanScheduler::new(
            StepExecutor::new(self.llm.clone(), self.registry.clone())
                .with_max_iterations(self.settings.max_step_iterations),
            Reflector::new(self.llm.clone()),
            self.registry.clone(),
        )
    }
}

/// 单条消息的处理结果
#[derive(Debug, Clone)]
pub enum ChatOutcome {
    Direct(DirectResult),
    Plan { run: PlanRun, conclusion: Conclusion },
}

impl ChatOutcome {
    pub fn mode(&self) -> Mode {
        match self {
            ChatOutcome::Direct(_) => Mode::Direct,
            ChatOutcome::Plan { .. } => Mode::PlanExecute,
        }
    }

    /// 展示给用户的文本：直接模式的回复或计划模式的结论
    pub fn answer(&self) -> &str {
        match self {
            ChatOutcome::Direct(r) => &r.response,
            ChatOutcome::Plan { conclusion, .. } => &conclusion.content,
        }
    }
}

pub struct ChatSession {
    components: Arc<AgentComponents>,
    alert: Alert,
    history: History,
    transcript: Vec<Content>,
    cancel: CancellationToken,
    events: Option<EventSender>,
}

impl ChatSession {
    /// 为告警开启新会话（标题在第一条消息时生成）
    pub async fn new(components: Arc<AgentComponents>, alert_id: &str) -> Result<Self, AgentError> {
        let alert = components.store.alert(alert_id).await?;
        let history = History::new(&alert.id);
        tracing::info!(history_id = %history.id, alert_id = %alert.id, "session created");
        Ok(Self {
            components,
            alert,
            history,
            transcript: Vec::new(),
            cancel: CancellationToken::new(),
            events: None,
        })
    }

    /// 按 history id 恢复会话：重新加载元数据、告警与记录
    pub async fn resume(
        components: Arc<AgentComponents>,
        history_id: &str,
    ) -> Result<Self, AgentError> {
        let (history, transcript) = components.store.load(history_id).await?;
        let alert = components.store.alert(&history.alert_id).await?;
        tracing::info!(
            history_id = %history.id,
            entries = transcript.len(),
            "session resumed"
        );
        Ok(Self {
            components,
            alert,
            history,
            transcript,
            cancel: CancellationToken::new(),
            events: None,
        })
    }

    pub fn with_events(mut self, tx: EventSender) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn transcript(&self) -> &[Content] {
        &self.transcript
    }

    pub fn alert(&self) -> &Alert {
        &self.alert
    }

    pub async fn chat(&mut self, message: &str) -> Result<ChatOutcome, AgentError> {
        let cancel = self.cancel.clone();
        let events = self.events.clone();

        if self.history.title.is_empty() && self.transcript.is_empty() {
            let title = TitleGenerator::new(self.components.llm.clone())
                .with_limits(
                    self.components.settings.title_max_chars,
                    self.components.settings.title_max_attempts,
                )
                .generate(&self.alert, message, Some(&cancel))
                .await?;
            tracing::info!(history_id = %self.history.id, title = %title, "session titled");
            self.history.title = title;
        }

        let mode = match self.components.settings.plan_mode {
            PlanMode::Direct => Mode::Direct,
            PlanMode::Plan => Mode::PlanExecute,
            PlanMode::Auto => {
                ModeSelector::new(self.components.llm.clone())
                    .select(&self.transcript, message, Some(&cancel))
                    .await?
            }
        };
        send_event(events.as_ref(), AgentEvent::ModeSelected { mode });

        match mode {
            Mode::Direct => {
                // 在副本上运行，失败的一轮不留在会话记录里
                let mut working = self.transcript.clone();
                let state = SessionState {
                    alert: &self.alert,
                    history: &mut self.history,
                    transcript: &mut working,
                };
                let result = self
                    .components
                    .conversation_loop()
                    .run(state, message, Some(&cancel), events.as_ref())
                    .await?;
                self.transcript = working;
                Ok(ChatOutcome::Direct(result))
            }
            Mode::PlanExecute => {
                let (run, conclusion) = self
                    .run_plan(message, &cancel, events.as_ref())
                    .await?;
                self.transcript.push(Content::user(message));
                self.transcript.push(Content::model_text(conclusion.content.clone()));
                self.components
                    .store
                    .persist(&mut self.history, &self.transcript)
                    .await?;
                Ok(ChatOutcome::Plan { run, conclusion })
            }
        }
    }

    async fn run_plan(
        &self,
        message: &str,
        cancel: &CancellationToken,
        events: Option<&EventSender>,
    ) -> Result<(PlanRun, Conclusion), AgentError> {
        let c = &self.components;
        let plan = PlanGenerator::new(c.llm.clone(), c.registry.clone())
            .generate(&self.alert, message, &self.transcript, Some(cancel))
            .await?;
        send_event(
            events,
            AgentEvent::PlanCreated {
                objective: plan.objective.clone(),
                steps: plan.steps.len(),
            },
        );

        let run = c.scheduler().run(&self.alert, plan, Some(cancel), events).await?;
        let conclusion = ConclusionGenerator::new(c.llm.clone())
            .generate(&self.alert, &run, Some(cancel))
            .await?;
        send_event(events, AgentEvent::Concluded);
        Ok((run, conclusion))
    }
}
