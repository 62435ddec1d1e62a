//! 单行处理流程 - 流程层
//!
//! 核心职责：定义"一行说明"如何变成一次改写请求
//!
//! 流程顺序：
//! 1. 组装请求（文本 / 图片 / 系统指令）
//! 2. 调用 LLM（可选超时）
//! 3. 返回改写结果，由编排层写回状态

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::Config;
use crate::error::RewriteError;
use crate::models::row::CaptionRow;
use crate::services::llm_service::{LlmService, RewriteOutput, RewriteRequest};
use crate::utils::logging::truncate_text;

/// 合并基础指令和 PDF 中的补充指令
pub fn compose_instruction(base: &str, supplement: Option<&str>) -> String {
    match supplement.map(str::trim).filter(|s| !s.is_empty()) {
        Some(extra) => format!("{}\n\n补充要求：\n{}", base.trim(), extra),
        None => base.trim().to_string(),
    }
}

/// 单行处理流程
///
/// - 不持有行列表
/// - 只依赖业务能力（LlmService）
pub struct RowFlow {
    llm_service: Arc<LlmService>,
    instruction: String,
    timeout: Option<Duration>,
}

impl RowFlow {
    /// 创建新的行处理流程
    pub fn new(config: &Config, llm_service: Arc<LlmService>, supplement: Option<&str>) -> Self {
        Self {
            llm_service,
            instruction: compose_instruction(&config.system_instruction, supplement),
            timeout: config.request_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// 根据行内容组装请求
    pub fn build_request(&self, row: &CaptionRow) -> RewriteRequest {
        RewriteRequest {
            text: row.has_text().then(|| row.original.clone()),
            image: row.image_data.clone(),
            instruction: self.instruction.clone(),
        }
    }

    pub async fn run(&self, row: &CaptionRow) -> Result<RewriteOutput, RewriteError> {
        let request = self.build_request(row);
        debug!(
            "[行 {}] 文本: {} | 图片: {}",
            row.id,
            truncate_text(&row.original, 30),
            request.image.is_some()
        );

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.llm_service.rewrite(&request))
                .await
                .map_err(|_| RewriteError::Timeout(limit.as_secs()))?,
            None => self.llm_service.rewrite(&request).await,
        }
    }
}
