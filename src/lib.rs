//! Sleuth - 安全告警调查智能体
//!
//! 模块划分：
//! - **agent**: 会话运行时（模式路由、标题、计划运行结果落盘）
//! - **alert**: 告警记录
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、恢复策略、取消
//! - **llm**: LLM 客户端抽象与实现（Gemini REST / Mock）、结构化输出
//! - **memory**: 会话记录、历史元数据、压缩与持久化
//! - **observability**: tracing 初始化
//! - **react**: 直接模式循环与计划-执行-反思调度
//! - **tools**: 工具注册表与内置告警工具

pub mod agent;
pub mod alert;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;
