//! 导出服务 - 业务能力层
//!
//! 把结果写成 xlsx：原始说明中被删除的字符标红加删除线，
//! 改写结果中新增的字符标绿加粗。两列读回时仍是完整的原文和改写文本。

use std::path::Path;

use rust_xlsxwriter::{Color, Format, Workbook, Worksheet, XlsxError};
use tracing::info;

use crate::error::AppResult;
use crate::models::row::CaptionRow;
use crate::services::diff::{diff_chars, side, DiffKind, DiffSegment};

/// 导出表头，列顺序固定
pub const EXPORT_HEADERS: [&str; 6] = [
    "ID",
    "Image Path",
    "Original Caption",
    "Rewritten Caption",
    "Status",
    "Error",
];

const COLUMN_WIDTHS: [f64; 6] = [10.0, 30.0, 50.0, 50.0, 12.0, 40.0];

struct DiffFormats {
    plain: Format,
    added: Format,
    removed: Format,
}

impl DiffFormats {
    fn new() -> Self {
        Self {
            plain: Format::new(),
            added: Format::new().set_font_color(Color::RGB(0x1E8449)).set_bold(),
            removed: Format::new()
                .set_font_color(Color::RGB(0xC0392B))
                .set_font_strikethrough(),
        }
    }

    fn for_kind(&self, kind: DiffKind) -> &Format {
        match kind {
            DiffKind::Equal => &self.plain,
            DiffKind::Added => &self.added,
            DiffKind::Removed => &self.removed,
        }
    }
}

/// 导出器
pub struct Exporter;

impl Exporter {
    /// 导出到文件
    pub fn export_to_file(rows: &[CaptionRow], path: &Path) -> AppResult<()> {
        let mut workbook = Self::build_workbook(rows)?;
        workbook.save(path)?;
        info!("💾 已导出 {} 行到 {}", rows.len(), path.display());
        Ok(())
    }

    /// 导出到内存
    pub fn export_to_buffer(rows: &[CaptionRow]) -> AppResult<Vec<u8>> {
        let mut workbook = Self::build_workbook(rows)?;
        Ok(workbook.save_to_buffer()?)
    }

    fn build_workbook(rows: &[CaptionRow]) -> Result<Workbook, XlsxError> {
        let mut workbook = Workbook::new();
        let formats = DiffFormats::new();
        let header_format = Format::new().set_bold();

        let sheet = workbook.add_worksheet();
        sheet.set_name("Captions")?;

        for (col, (header, width)) in EXPORT_HEADERS.iter().zip(COLUMN_WIDTHS).enumerate() {
            sheet.write_string_with_format(0, col as u16, *header, &header_format)?;
            sheet.set_column_width(col as u16, width)?;
        }
        sheet.set_freeze_panes(1, 0)?;

        for (index, row) in rows.iter().enumerate() {
            let r = (index + 1) as u32;
            sheet.write_string(r, 0, &row.id)?;
            if let Some(path) = &row.image_path {
                sheet.write_string(r, 1, path)?;
            }

            match &row.rewritten {
                Some(rewritten) => {
                    let segments = diff_chars(&row.original, rewritten);
                    write_diff_side(sheet, r, 2, &segments, DiffKind::Removed, &formats)?;
                    write_diff_side(sheet, r, 3, &segments, DiffKind::Added, &formats)?;
                }
                None => {
                    if !row.original.is_empty() {
                        sheet.write_string(r, 2, &row.original)?;
                    }
                }
            }

            sheet.write_string(r, 4, row.status.as_str())?;
            if let Some(error) = &row.error {
                sheet.write_string(r, 5, error)?;
            }
        }

        Ok(workbook)
    }
}

/// 写入差异的一侧；没有高亮片段时写普通文本
fn write_diff_side(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    segments: &[DiffSegment],
    keep: DiffKind,
    formats: &DiffFormats,
) -> Result<(), XlsxError> {
    let visible = side(segments, keep);
    if visible.is_empty() {
        return Ok(());
    }

    if visible.iter().all(|s| s.kind == DiffKind::Equal) {
        let text: String = visible.iter().map(|s| s.text.as_str()).collect();
        sheet.write_string(row, col, text)?;
        return Ok(());
    }

    let runs: Vec<(&Format, &str)> = visible
        .iter()
        .map(|s| (formats.for_kind(s.kind), s.text.as_str()))
        .collect();
    sheet.write_rich_string(row, col, &runs)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::loaders::import_spreadsheet_bytes;
    use crate::models::row::RowStatus;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_export_then_import_roundtrip() {
        let mut done = CaptionRow::new("r1", "a black cat sits").with_image_path("imgs/cat.png");
        done.rewritten = Some("a small black cat sat".to_string());
        done.status = RowStatus::Completed;

        let mut from_image = CaptionRow::new("r2", "").with_image_path("dog.jpg");
        from_image.rewritten = Some("A dog runs on the beach.".to_string());
        from_image.status = RowStatus::Completed;

        let mut failed = CaptionRow::new("r3", "一只鸟");
        failed.status = RowStatus::Error;
        failed.error = Some("LLM 返回内容为空".to_string());

        let untouched = CaptionRow::new("r4", "same text");

        let rows = vec![done, from_image, failed, untouched];
        let bytes = Exporter::export_to_buffer(&rows).unwrap();
        let imported = import_spreadsheet_bytes(&bytes).unwrap();

        assert_eq!(imported.len(), rows.len());
        for (before, after) in rows.iter().zip(&imported) {
            assert_eq!(after.id, before.id);
            assert_eq!(after.original, before.original);
            assert_eq!(after.rewritten, before.rewritten);
            assert_eq!(after.image_path, before.image_path);
            assert_eq!(after.status, before.status);
            assert_eq!(after.error, before.error);
        }
    }

    #[test]
    fn test_export_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        Exporter::export_to_file(&[CaptionRow::new("1", "x")], &path).unwrap();
        assert!(path.exists());
    }
}
