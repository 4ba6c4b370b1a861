//! LLM 层：客户端抽象、Gemini 实现、Mock、结构化输出

pub mod gemini;
pub mod mock;
pub mod structured;
pub mod traits;

pub use gemini::{GeminiClient, TokenUsage, GEMINI_BASE_URL, GEMINI_DEFAULT_MODEL};
pub use mock::{MockLlmClient, RecordedRequest};
pub use structured::{parse_response, parse_structured, response_schema};
pub use traits::{
    Candidate, FunctionDeclaration, GenerateConfig, GenerateResponse, LlmClient, LlmError,
    OverflowSignature,
};
