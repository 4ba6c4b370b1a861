//! 调查控制核心：直接模式循环、计划生成 / 执行 / 反思 / 调度、结论、模式选择

pub mod conclusion;
pub mod dispatch;
pub mod events;
pub mod executor;
pub mod loop_;
pub mod mode;
pub mod plan;
pub mod planner;
pub mod prompts;
pub mod reflector;
pub mod scheduler;
pub mod title;

pub use conclusion::ConclusionGenerator;
pub use events::{AgentEvent, EventSender};
pub use executor::{StepExecutor, DEFAULT_MAX_STEP_ITERATIONS};
pub use loop_::{ConversationLoop, DirectResult, SessionState, DEFAULT_MAX_ITERATIONS};
pub use mode::{Mode, ModeSelector};
pub use plan::{
    Conclusion, Plan, PlanUpdate, Reflection, Step, StepResult, StepStatus, ToolCall,
};
pub use planner::PlanGenerator;
pub use reflector::Reflector;
pub use scheduler::{PlanRun, PlanScheduler, DEFAULT_MAX_PLAN_STEPS};
pub use title::{TitleGenerator, DEFAULT_TITLE_MAX_ATTEMPTS, DEFAULT_TITLE_MAX_CHARS};
