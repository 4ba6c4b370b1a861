//! 工具箱：Tool trait、注册表与内置工具

pub mod alerts;
pub mod registry;

pub use alerts::AlertTool;
pub use registry::{result_text, to_response, Tool, ToolError, ToolRegistry};
