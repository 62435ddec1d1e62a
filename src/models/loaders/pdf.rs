//! PDF 补充指令导入

use std::path::Path;

use tokio::fs;
use tracing::info;

use crate::error::{AppError, AppResult, ParseError};

/// 提取 PDF 全部页面的文本，用作补充指令
pub async fn extract_pdf_text(path: &Path) -> AppResult<String> {
    let is_pdf = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    if !is_pdf {
        return Err(AppError::unsupported_file_type(path.display().to_string(), "pdf"));
    }

    let bytes = fs::read(path)
        .await
        .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;

    let text = extract_pdf_text_bytes(&bytes)?;
    info!("📄 已从 PDF 中提取 {} 个字符的补充指令", text.chars().count());
    Ok(text)
}

/// 从内存中的 PDF 提取文本
pub fn extract_pdf_text_bytes(bytes: &[u8]) -> AppResult<String> {
    // pdf-extract 遇到部分畸形文件会 panic
    let extracted = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
        .map_err(|_| ParseError::Pdf("PDF 结构无法识别".to_string()))?;
    let text = extracted.map_err(|e| ParseError::Pdf(e.to_string()))?;
    Ok(text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_pdf_is_parse_error() {
        let result = extract_pdf_text_bytes(b"%PDF-1.4 broken");
        assert!(matches!(result, Err(AppError::Parse(ParseError::Pdf(_)))));
    }

    #[tokio::test]
    async fn test_non_pdf_extension_rejected() {
        let result = extract_pdf_text(Path::new("notes.docx")).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
