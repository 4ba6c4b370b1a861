//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SLEUTH__*` 覆盖（双下划线表示嵌套，如 `SLEUTH__AGENT__PLAN_MODE=plan`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::AgentError;
use crate::llm::{OverflowSignature, GEMINI_DEFAULT_MODEL};
use crate::memory::compressor::DEFAULT_COMPRESS_RATIO;
use crate::react::{
    DEFAULT_MAX_ITERATIONS, DEFAULT_MAX_STEP_ITERATIONS, DEFAULT_TITLE_MAX_ATTEMPTS,
    DEFAULT_TITLE_MAX_CHARS,
};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub storage: StorageSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：模型、端点、API Key 所在环境变量、超时、上下文溢出特征
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub overflow: OverflowSignature,
}

fn default_model() -> String {
    GEMINI_DEFAULT_MODEL.to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            overflow: OverflowSignature::default(),
        }
    }
}

/// 新消息的模式路由：auto 交给 ModeSelector，其余强制
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanMode {
    #[default]
    Auto,
    Direct,
    Plan,
}

/// [agent] 段：迭代上限、压缩比例、标题约束、模式路由
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_max_step_iterations")]
    pub max_step_iterations: usize,
    #[serde(default = "default_compress_ratio")]
    pub compress_ratio: f64,
    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,
    #[serde(default = "default_title_max_attempts")]
    pub title_max_attempts: usize,
    #[serde(default)]
    pub plan_mode: PlanMode,
}

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

fn default_max_step_iterations() -> usize {
    DEFAULT_MAX_STEP_ITERATIONS
}

fn default_compress_ratio() -> f64 {
    DEFAULT_COMPRESS_RATIO
}

fn default_title_max_chars() -> usize {
    DEFAULT_TITLE_MAX_CHARS
}

fn default_title_max_attempts() -> usize {
    DEFAULT_TITLE_MAX_ATTEMPTS
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_step_iterations: default_max_step_iterations(),
            compress_ratio: default_compress_ratio(),
            title_max_chars: default_title_max_chars(),
            title_max_attempts: default_title_max_attempts(),
            plan_mode: PlanMode::Auto,
        }
    }
}

/// [storage] 段：SQLite 元数据库与记录 blob 的根目录
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

impl StorageSection {
    pub fn db_path(&self) -> PathBuf {
        self.root.join("sleuth.db")
    }

    pub fn blob_root(&self) -> PathBuf {
        self.root.join("blobs")
    }
}

/// 从 config 目录加载配置，环境变量 SLEUTH__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SLEUTH__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, AgentError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        if std::path::Path::new(&format!("{}.toml", name)).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SLEUTH")
            .separator("__")
            .try_parsing(true),
    );

    builder
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| AgentError::ConfigError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.model, "gemini-2.5-flash");
        assert_eq!(cfg.llm.api_key_env, "GEMINI_API_KEY");
        assert_eq!(cfg.llm.timeout_secs, 120);
        assert_eq!(cfg.llm.overflow, OverflowSignature::default());
        assert_eq!(cfg.agent.max_iterations, 32);
        assert_eq!(cfg.agent.max_step_iterations, 10);
        assert!((cfg.agent.compress_ratio - 0.7).abs() < f64::EPSILON);
        assert_eq!(cfg.agent.title_max_chars, 50);
        assert_eq!(cfg.agent.title_max_attempts, 3);
        assert_eq!(cfg.agent.plan_mode, PlanMode::Auto);
        assert_eq!(cfg.storage.root, PathBuf::from("./data"));
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[llm]
model = "gemini-2.5-pro"

[llm.overflow]
code = 413
message_prefix = "prompt is too long"

[agent]
plan_mode = "plan"
max_iterations = 8

[storage]
root = "/var/lib/sleuth"
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.llm.model, "gemini-2.5-pro");
        assert_eq!(cfg.llm.overflow.code, 413);
        assert_eq!(cfg.llm.overflow.status, "INVALID_ARGUMENT");
        assert_eq!(cfg.llm.overflow.message_prefix, "prompt is too long");
        assert_eq!(cfg.agent.plan_mode, PlanMode::Plan);
        assert_eq!(cfg.agent.max_iterations, 8);
        assert_eq!(cfg.agent.max_step_iterations, 10);
        assert_eq!(cfg.storage.db_path(), PathBuf::from("/var/lib/sleuth/sleuth.db"));
    }

    #[test]
    fn test_invalid_value_is_config_error() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[agent]\nplan_mode = \"sometimes\"").unwrap();

        let err = load_config(Some(file.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, AgentError::ConfigError(_)));
    }
}
