//! 核心层：错误分类、恢复策略、取消支持

pub mod cancel;
pub mod error;
pub mod recovery;

pub use cancel::{cancel_on_ctrl_c, run_cancellable};
pub use error::{AgentError, RecoveryAction};
pub use recovery::RecoveryEngine;
