//! 可观测性：tracing 订阅器初始化（仅由 main 调用）

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// fmt 输出 + EnvFilter；未设置 RUST_LOG 时默认 info
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}
