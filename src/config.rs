//! 程序配置
//!
//! 配置来源优先级：环境变量 > TOML 配置文件 > 默认值

use std::path::{Path, PathBuf};
use std::str::FromStr;

use directories::ProjectDirs;
use serde::Deserialize;

use crate::error::{AppResult, ConfigError};

/// 默认系统指令
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "你是一名专业的图片说明文案编辑。\
请在保持原意和事实信息不变的前提下改写用户提供的图片说明，使其更通顺、准确、简洁。\
只返回改写后的说明文字，不要添加任何解释。";

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 同时处理的行数（worker 数量）
    pub max_concurrent_rows: usize,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    /// 覆盖服务商默认的 API 地址
    pub llm_api_base_url: Option<String>,
    pub llm_model_name: String,
    /// 显式指定服务商，未指定时按模型名推断
    pub llm_provider: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub system_instruction: String,
    /// 单次请求超时（秒），未设置时不限时
    pub request_timeout_secs: Option<u64>,
    // --- 历史记录配置 ---
    pub history_file: PathBuf,
    pub history_limit: usize,
    /// 历史记录文件的字节配额
    pub history_quota_bytes: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_rows: 3,
            verbose_logging: false,
            output_log_file: "output.txt".to_string(),
            llm_api_key: String::new(),
            llm_api_base_url: None,
            llm_model_name: "gemini-2.0-flash".to_string(),
            llm_provider: None,
            temperature: 0.3,
            max_tokens: 1024,
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            request_timeout_secs: None,
            history_file: default_history_file(),
            history_limit: 20,
            history_quota_bytes: None,
        }
    }
}

impl Config {
    /// 从默认值 + 环境变量构建配置
    pub fn from_env() -> AppResult<Self> {
        Self::default().with_env_overrides()
    }

    /// 从 TOML 文件加载配置，再用环境变量覆盖
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let base = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        base.with_env_overrides()
    }

    /// 读取 TOML 配置文件
    pub fn from_toml_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    fn from_toml_str(content: &str, origin: &str) -> AppResult<Self> {
        let config = toml::from_str(content).map_err(|source| ConfigError::TomlParseFailed {
            path: origin.to_string(),
            source,
        })?;
        Ok(config)
    }

    fn with_env_overrides(mut self) -> AppResult<Self> {
        if let Some(v) = env_parse("MAX_CONCURRENT_ROWS")? {
            self.max_concurrent_rows = v;
        }
        if let Some(v) = env_parse("VERBOSE_LOGGING")? {
            self.verbose_logging = v;
        }
        if let Ok(v) = std::env::var("OUTPUT_LOG_FILE") {
            self.output_log_file = v;
        }
        if let Ok(v) = std::env::var("LLM_API_KEY") {
            self.llm_api_key = v;
        }
        if let Ok(v) = std::env::var("LLM_API_BASE_URL") {
            self.llm_api_base_url = Some(v);
        }
        if let Ok(v) = std::env::var("LLM_MODEL_NAME") {
            self.llm_model_name = v;
        }
        if let Ok(v) = std::env::var("LLM_PROVIDER") {
            self.llm_provider = Some(v);
        }
        if let Some(v) = env_parse("LLM_TEMPERATURE")? {
            self.temperature = v;
        }
        if let Some(v) = env_parse("LLM_MAX_TOKENS")? {
            self.max_tokens = v;
        }
        if let Ok(v) = std::env::var("SYSTEM_INSTRUCTION") {
            self.system_instruction = v;
        }
        if let Some(v) = env_parse("REQUEST_TIMEOUT_SECS")? {
            self.request_timeout_secs = Some(v);
        }
        if let Ok(v) = std::env::var("HISTORY_FILE") {
            self.history_file = PathBuf::from(v);
        }
        if let Some(v) = env_parse("HISTORY_LIMIT")? {
            self.history_limit = v;
        }
        if let Some(v) = env_parse("HISTORY_QUOTA_BYTES")? {
            self.history_quota_bytes = Some(v);
        }
        Ok(self)
    }
}

/// 解析环境变量，不存在时返回 None
fn env_parse<T: FromStr>(var_name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var_name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: std::any::type_name::<T>().to_string(),
            }),
        Err(_) => Ok(None),
    }
}

fn default_history_file() -> PathBuf {
    ProjectDirs::from("", "", "caption-rewriter")
        .map(|dirs| dirs.data_dir().join("history.json"))
        .unwrap_or_else(|| PathBuf::from("caption_history.json"))
}
