//! 说明行数据模型

use serde::{Deserialize, Serialize};
use std::fmt;

/// 行处理状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    /// 等待处理
    #[default]
    Pending,
    /// 处理中
    Processing,
    /// 已完成
    Completed,
    /// 处理失败
    Error,
}

impl RowStatus {
    /// 是否会被（重新）纳入批次
    pub fn is_runnable(self) -> bool {
        matches!(self, RowStatus::Pending | RowStatus::Error)
    }

    /// 单次运行内的状态只能单调推进
    pub fn can_transition_to(self, next: RowStatus) -> bool {
        matches!(
            (self, next),
            (RowStatus::Pending, RowStatus::Processing)
                | (RowStatus::Error, RowStatus::Processing)
                | (RowStatus::Processing, RowStatus::Completed)
                | (RowStatus::Processing, RowStatus::Error)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RowStatus::Pending => "pending",
            RowStatus::Processing => "processing",
            RowStatus::Completed => "completed",
            RowStatus::Error => "error",
        }
    }

    /// 从导出表格中的文本解析，无法识别时视为 pending
    ///
    /// 表格里残留的 processing 没有跑完，同样视为 pending
    pub fn parse_lenient(text: &str) -> Self {
        match text.trim().to_lowercase().as_str() {
            "completed" | "done" | "已完成" => RowStatus::Completed,
            "error" | "failed" | "失败" => RowStatus::Error,
            _ => RowStatus::Pending,
        }
    }
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一行待改写的说明
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionRow {
    pub id: String,
    /// 原始说明
    pub original: String,
    /// 改写结果
    pub rewritten: Option<String>,
    pub status: RowStatus,
    /// 表格中的图片路径（或文件名）
    pub image_path: Option<String>,
    /// 内嵌图片（data URL），不写入历史记录
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
    pub error: Option<String>,
}

impl CaptionRow {
    /// 创建只有文本的待处理行
    pub fn new(id: impl Into<String>, original: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            original: original.into(),
            rewritten: None,
            status: RowStatus::Pending,
            image_path: None,
            image_data: None,
            error: None,
        }
    }

    pub fn with_image_path(mut self, image_path: impl Into<String>) -> Self {
        self.image_path = Some(image_path.into());
        self
    }

    pub fn with_image_data(mut self, data_url: impl Into<String>) -> Self {
        self.image_data = Some(data_url.into());
        self
    }

    pub fn has_text(&self) -> bool {
        !self.original.trim().is_empty()
    }

    pub fn has_image(&self) -> bool {
        self.image_data.is_some()
    }

    /// 去掉图片数据后的副本（用于持久化）
    pub fn without_image(&self) -> Self {
        Self {
            image_data: None,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_transitions() {
        assert!(RowStatus::Pending.can_transition_to(RowStatus::Processing));
        assert!(RowStatus::Error.can_transition_to(RowStatus::Processing));
        assert!(RowStatus::Processing.can_transition_to(RowStatus::Completed));
        assert!(RowStatus::Processing.can_transition_to(RowStatus::Error));

        assert!(!RowStatus::Completed.can_transition_to(RowStatus::Processing));
        assert!(!RowStatus::Pending.can_transition_to(RowStatus::Completed));
        assert!(!RowStatus::Completed.can_transition_to(RowStatus::Pending));
    }

    #[test]
    fn test_parse_lenient() {
        assert_eq!(RowStatus::parse_lenient("Completed"), RowStatus::Completed);
        assert_eq!(RowStatus::parse_lenient(" error "), RowStatus::Error);
        assert_eq!(RowStatus::parse_lenient("???"), RowStatus::Pending);
        assert_eq!(RowStatus::parse_lenient("processing"), RowStatus::Pending);
        assert_eq!(RowStatus::parse_lenient(""), RowStatus::Pending);
    }

    #[test]
    fn test_serialized_row_omits_image_data() {
        let row = CaptionRow::new("1", "a cat")
            .with_image_path("cat.png")
            .with_image_data("data:image/png;base64,AAAA");
        let json = serde_json::to_string(&row.without_image()).unwrap();
        assert!(json.contains("\"imagePath\":\"cat.png\""));
        assert!(!json.contains("imageData"));
        assert!(json.contains("\"status\":\"pending\""));
    }
}
