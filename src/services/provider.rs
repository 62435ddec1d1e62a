//! 服务商注册表
//!
//! 所有服务商都走 OpenAI 兼容协议，按能力（纯文本 / 视觉）打标签。
//! 优先使用显式指定的服务商，否则按模型名前缀推断；都不匹配时报错。

use std::fmt;

use crate::config::Config;
use crate::error::ConfigError;

/// 模型能力
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// 只接受文本
    TextOnly,
    /// 接受文本和图片
    Vision,
}

impl Capability {
    pub fn supports_images(self) -> bool {
        self == Capability::Vision
    }
}

/// 服务商描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSpec {
    pub name: &'static str,
    pub base_url: &'static str,
    pub capability: Capability,
    pub model_prefixes: &'static [&'static str],
}

impl ProviderSpec {
    pub fn matches_model(&self, model: &str) -> bool {
        let model = model.to_lowercase();
        self.model_prefixes.iter().any(|p| model.starts_with(p))
    }
}

impl fmt::Display for ProviderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let capability = match self.capability {
            Capability::TextOnly => "文本",
            Capability::Vision => "文本+图片",
        };
        write!(
            f,
            "{:<10} {:<10} {:<45} {}",
            self.name,
            capability,
            self.base_url,
            self.model_prefixes.join(", ")
        )
    }
}

/// 内置服务商
///
/// 视觉模型前缀要排在同一家的纯文本前缀之前
pub const BUILTIN_PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        name: "openai",
        base_url: "https://api.openai.com/v1",
        capability: Capability::Vision,
        model_prefixes: &["gpt-", "chatgpt-", "o1", "o3", "o4"],
    },
    ProviderSpec {
        name: "gemini",
        base_url: "https://generativelanguage.googleapis.com/v1beta/openai",
        capability: Capability::Vision,
        model_prefixes: &["gemini-"],
    },
    ProviderSpec {
        name: "qwen-vl",
        base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1",
        capability: Capability::Vision,
        model_prefixes: &["qwen-vl", "qwen2.5-vl", "qwen3-vl", "qvq-"],
    },
    ProviderSpec {
        name: "qwen",
        base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1",
        capability: Capability::TextOnly,
        model_prefixes: &["qwen"],
    },
    ProviderSpec {
        name: "deepseek",
        base_url: "https://api.deepseek.com/v1",
        capability: Capability::TextOnly,
        model_prefixes: &["deepseek-"],
    },
    ProviderSpec {
        name: "moonshot",
        base_url: "https://api.moonshot.cn/v1",
        capability: Capability::TextOnly,
        model_prefixes: &["moonshot-", "kimi-"],
    },
];

/// 选定的服务商（已合并 base_url 覆盖）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProvider {
    pub name: String,
    pub base_url: String,
    pub capability: Capability,
    pub model: String,
}

/// 服务商注册表
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: Vec<ProviderSpec>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self {
            providers: BUILTIN_PROVIDERS.to_vec(),
        }
    }
}

impl ProviderRegistry {
    pub fn providers(&self) -> &[ProviderSpec] {
        &self.providers
    }

    pub fn get(&self, name: &str) -> Option<&ProviderSpec> {
        self.providers
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// 按模型名推断服务商
    pub fn infer(&self, model: &str) -> Option<&ProviderSpec> {
        self.providers.iter().find(|p| p.matches_model(model))
    }

    /// 按配置选择服务商
    pub fn resolve(
        &self,
        explicit: Option<&str>,
        model: &str,
        base_url_override: Option<&str>,
    ) -> Result<ResolvedProvider, ConfigError> {
        let spec = match explicit.map(str::trim).filter(|s| !s.is_empty()) {
            Some(name) => self
                .get(name)
                .ok_or_else(|| ConfigError::UnknownProviderName {
                    name: name.to_string(),
                    known: self.known_names(),
                })?,
            None => self.infer(model).ok_or_else(|| ConfigError::UnknownProvider {
                model: model.to_string(),
                known: self.known_names(),
            })?,
        };

        Ok(ResolvedProvider {
            name: spec.name.to_string(),
            base_url: base_url_override
                .map(str::to_string)
                .unwrap_or_else(|| spec.base_url.to_string()),
            capability: spec.capability,
            model: model.to_string(),
        })
    }

    pub fn resolve_config(&self, config: &Config) -> Result<ResolvedProvider, ConfigError> {
        self.resolve(
            config.llm_provider.as_deref(),
            &config.llm_model_name,
            config.llm_api_base_url.as_deref(),
        )
    }

    fn known_names(&self) -> String {
        self.providers
            .iter()
            .map(|p| p.name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_by_prefix() {
        let registry = ProviderRegistry::default();
        assert_eq!(registry.infer("gemini-2.0-flash").unwrap().name, "gemini");
        assert_eq!(registry.infer("GPT-4o").unwrap().name, "openai");
        assert_eq!(registry.infer("qwen-vl-max").unwrap().name, "qwen-vl");
        assert_eq!(registry.infer("qwen-plus").unwrap().name, "qwen");
        assert_eq!(
            registry.infer("deepseek-chat").unwrap().capability,
            Capability::TextOnly
        );
    }

    #[test]
    fn test_unknown_model_is_always_error() {
        let registry = ProviderRegistry::default();
        let err = registry.resolve(None, "llama-3-70b", None).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProvider { .. }));
    }

    #[test]
    fn test_explicit_provider_wins() {
        let registry = ProviderRegistry::default();
        let resolved = registry
            .resolve(Some("deepseek"), "my-finetune", Some("http://localhost:8000/v1"))
            .unwrap();
        assert_eq!(resolved.name, "deepseek");
        assert_eq!(resolved.base_url, "http://localhost:8000/v1");
        assert_eq!(resolved.model, "my-finetune");

        let err = registry.resolve(Some("nope"), "gpt-4o", None).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProviderName { .. }));
    }
}
