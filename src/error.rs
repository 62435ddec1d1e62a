use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 输入校验错误（缺少 API Key、空批次、文件类型错误）
    #[error("输入错误: {0}")]
    Validation(#[from] ValidationError),
    /// 文件解析错误（表格、PDF、图片）
    #[error("解析错误: {0}")]
    Parse(#[from] ParseError),
    /// 单行改写错误
    #[error("改写错误: {0}")]
    Rewrite(#[from] RewriteError),
    /// 历史记录存储错误
    #[error("存储错误: {0}")]
    Storage(#[from] StorageError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 导出表格失败
    #[error("导出失败: {0}")]
    Export(#[from] rust_xlsxwriter::XlsxError),
}

/// 输入校验错误
#[derive(Debug, Error)]
pub enum ValidationError {
    /// 未配置 API Key
    #[error("未配置 API Key，请设置 LLM_API_KEY")]
    MissingApiKey,
    /// 没有可处理的行
    #[error("没有待处理的行")]
    EmptyBatch,
    /// 不支持的文件类型
    #[error("不支持的文件类型 ({path})，期望: {expected}")]
    UnsupportedFileType { path: String, expected: String },
    /// 历史会话不存在
    #[error("历史会话不存在: {0}")]
    SessionNotFound(String),
}

/// 文件解析错误
#[derive(Debug, Error)]
pub enum ParseError {
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 表格无法打开或格式错误
    #[error("表格解析失败: {0}")]
    Spreadsheet(String),
    /// 表格中没有工作表
    #[error("表格中没有工作表")]
    NoWorksheet,
    /// PDF 文本提取失败
    #[error("PDF 解析失败: {0}")]
    Pdf(String),
    /// 远程图片下载失败
    #[error("图片下载失败 ({url}): {source}")]
    ImageDownload {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// 单行改写错误
///
/// 写入行的 `error` 字段，不中断整个批次
#[derive(Debug, Error)]
pub enum RewriteError {
    /// API 调用失败
    #[error("LLM API 调用失败 (模型: {model}): {message}")]
    ApiCallFailed { model: String, message: String },
    /// 请求构建失败
    #[error("请求构建失败: {0}")]
    RequestBuild(String),
    /// 返回内容为空
    #[error("LLM 返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
    /// 纯文本模型收到图片
    #[error("模型 {model} (服务商: {provider}) 不支持图片输入，请选择支持视觉的模型")]
    VisionUnsupported { provider: String, model: String },
    /// 行内既没有文本也没有图片
    #[error("该行既没有原始文本也没有图片")]
    EmptyInput,
    /// 请求超时
    #[error("请求超时 ({0} 秒)")]
    Timeout(u64),
}

/// 历史记录存储错误
#[derive(Debug, Error)]
pub enum StorageError {
    /// 超出存储配额
    #[error("存储空间不足: 需要 {required} 字节，配额 {quota} 字节")]
    QuotaExceeded { required: usize, quota: usize },
    /// 读写文件失败
    #[error("存储读写失败 ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 序列化失败
    #[error("历史记录序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置文件解析失败
    #[error("配置文件解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// 配置文件读取失败
    #[error("配置文件读取失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 模型名不属于任何已知服务商
    #[error("无法识别模型 {model} 的服务商，请设置 LLM_PROVIDER（可选: {known}）")]
    UnknownProvider { model: String, known: String },
    /// 指定的服务商不存在
    #[error("未知的服务商: {name}（可选: {known}）")]
    UnknownProviderName { name: String, known: String },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建文件读取错误
    pub fn file_read_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::Parse(ParseError::ReadFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建文件类型错误
    pub fn unsupported_file_type(path: impl Into<String>, expected: impl Into<String>) -> Self {
        AppError::Validation(ValidationError::UnsupportedFileType {
            path: path.into(),
            expected: expected.into(),
        })
    }
}

impl RewriteError {
    /// 创建 LLM API 调用错误
    pub fn api_failed(model: impl Into<String>, source: impl std::fmt::Display) -> Self {
        RewriteError::ApiCallFailed {
            model: model.into(),
            message: source.to_string(),
        }
    }
}

impl From<async_openai::error::OpenAIError> for RewriteError {
    fn from(err: async_openai::error::OpenAIError) -> Self {
        RewriteError::RequestBuild(err.to_string())
    }
}

impl From<calamine::Error> for ParseError {
    fn from(err: calamine::Error) -> Self {
        ParseError::Spreadsheet(err.to_string())
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vision_error_names_provider_and_model() {
        let err = RewriteError::VisionUnsupported {
            provider: "deepseek".to_string(),
            model: "deepseek-chat".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("deepseek-chat"));
        assert!(msg.contains("不支持图片"));
    }

    #[test]
    fn test_category_wrapping() {
        let err: AppError = ValidationError::EmptyBatch.into();
        assert!(matches!(err, AppError::Validation(ValidationError::EmptyBatch)));
        assert!(err.to_string().starts_with("输入错误"));
    }
}
