//! LLM 服务 - 业务能力层
//!
//! 只负责"改写一条说明"能力，不关心批次和流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 所有服务商都走 OpenAI 兼容接口，由 [`ProviderRegistry`](super::ProviderRegistry) 选定
//! - 图片以 data URL 形式放进 Vision 消息

use std::sync::OnceLock;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrl,
    },
    Client,
};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::RewriteError;
use crate::services::provider::ResolvedProvider;

/// 一次改写请求
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RewriteRequest {
    /// 原始说明（可选）
    pub text: Option<String>,
    /// 图片 data URL（可选）
    pub image: Option<String>,
    /// 系统指令
    pub instruction: String,
}

/// 改写结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOutput {
    pub rewritten: String,
    /// 原始说明来自图片时，模型提取出的原始说明
    pub extracted_original: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RewriteJson {
    #[serde(default)]
    original: Option<String>,
    rewritten: String,
}

/// LLM 服务
///
/// 职责：
/// - 调用 LLM API 改写单条说明
/// - 提供通用的 LLM 调用接口
/// - 拒绝向纯文本模型发送图片
pub struct LlmService {
    client: Client<OpenAIConfig>,
    provider: ResolvedProvider,
    temperature: f32,
    max_tokens: u32,
}

impl LlmService {
    /// 创建新的 LLM 服务
    pub fn new(config: &Config, provider: ResolvedProvider) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&provider.base_url);

        Self {
            client: Client::with_config(openai_config),
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    pub fn provider(&self) -> &ResolvedProvider {
        &self.provider
    }

    pub fn model_name(&self) -> &str {
        &self.provider.model
    }

    /// 通用的 LLM 调用函数
    ///
    /// # 参数
    /// - `user_message`: 用户消息内容
    /// - `system_message`: 系统消息（可选）
    /// - `imgs`: 图片 URL / data URL 列表（可选），会追加到用户消息中
    ///
    /// # 返回
    /// 返回 LLM 的响应内容（已去除首尾空白）
    pub async fn send_to_llm(
        &self,
        user_message: &str,
        system_message: Option<&str>,
        imgs: Option<&[String]>,
    ) -> Result<String, RewriteError> {
        let model = self.model_name();
        let imgs = imgs.filter(|i| !i.is_empty());

        if imgs.is_some() && !self.provider.capability.supports_images() {
            return Err(RewriteError::VisionUnsupported {
                provider: self.provider.name.clone(),
                model: model.to_string(),
            });
        }

        debug!("调用 LLM API，服务商: {}, 模型: {}", self.provider.name, model);
        debug!("用户消息长度: {} 字符", user_message.chars().count());

        let mut messages = Vec::new();

        if let Some(sys_msg) = system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = match imgs {
            Some(img_urls) => {
                let mut content_parts: Vec<ChatCompletionRequestUserMessageContentPart> =
                    Vec::new();

                if !user_message.is_empty() {
                    content_parts.push(ChatCompletionRequestUserMessageContentPart::Text(
                        ChatCompletionRequestMessageContentPartText {
                            text: user_message.to_string(),
                        },
                    ));
                }

                for url in img_urls {
                    content_parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                        ChatCompletionRequestMessageContentPartImage {
                            image_url: ImageUrl {
                                url: url.clone(),
                                detail: Some(ImageDetail::Auto),
                            },
                        },
                    ));
                }

                debug!("使用 Vision API，包含 {} 张图片", img_urls.len());

                ChatCompletionRequestUserMessageArgs::default()
                    .content(ChatCompletionRequestUserMessageContent::Array(
                        content_parts,
                    ))
                    .build()?
            }
            None => ChatCompletionRequestUserMessageArgs::default()
                .content(user_message)
                .build()?,
        };

        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build()?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            RewriteError::api_failed(model, e)
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| RewriteError::EmptyContent {
                model: model.to_string(),
            })?;

        Ok(content)
    }

    /// 改写一条说明
    ///
    /// 只有图片没有文本时，要求模型同时返回从图片中识别出的原始说明
    pub async fn rewrite(&self, request: &RewriteRequest) -> Result<RewriteOutput, RewriteError> {
        let text = request
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        if text.is_none() && request.image.is_none() {
            return Err(RewriteError::EmptyInput);
        }

        let user_message = build_user_message(text, request.image.is_some());
        let images = request.image.clone().map(|img| vec![img]);

        let response = self
            .send_to_llm(&user_message, Some(&request.instruction), images.as_deref())
            .await?;

        parse_rewrite_response(&response, self.model_name())
    }
}

/// 构建用户消息
fn build_user_message(text: Option<&str>, has_image: bool) -> String {
    match (text, has_image) {
        (Some(text), true) => format!(
            "请结合图片内容改写下面这条图片说明：\n{}",
            text
        ),
        (Some(text), false) => format!("请改写下面这条图片说明：\n{}", text),
        (None, _) => r#"这张图片没有提供文字说明。请先识别图片中已有的说明文字（若图片中没有文字，则根据画面写一条简短说明），再按要求改写。
只返回 JSON，格式为：{"original": "识别出的原始说明", "rewritten": "改写后的说明"}"#
            .to_string(),
    }
}

fn fenced_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("fenced block regex is valid")
    })
}

/// 解析改写响应
///
/// 依次尝试：纯 JSON → 代码块中的 JSON → 整段文本作为改写结果
fn parse_rewrite_response(response: &str, model: &str) -> Result<RewriteOutput, RewriteError> {
    let response = response.trim();

    let candidates = std::iter::once(response).chain(
        fenced_block_regex()
            .captures(response)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str()),
    );

    for candidate in candidates {
        if let Ok(parsed) = serde_json::from_str::<RewriteJson>(candidate) {
            let rewritten = parsed.rewritten.trim().to_string();
            if rewritten.is_empty() {
                return Err(RewriteError::EmptyContent {
                    model: model.to_string(),
                });
            }
            return Ok(RewriteOutput {
                rewritten,
                extracted_original: parsed
                    .original
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty()),
            });
        }
    }

    if response.is_empty() {
        return Err(RewriteError::EmptyContent {
            model: model.to_string(),
        });
    }

    Ok(RewriteOutput {
        rewritten: response.to_string(),
        extracted_original: None,
    })
}
