//! 表格导入
//!
//! 读取第一个工作表，首行作为表头，按表头关键字定位各列

use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use tokio::fs;
use tracing::{debug, info};

use crate::error::{AppError, AppResult, ParseError};
use crate::models::row::{CaptionRow, RowStatus};

/// 支持的表格扩展名
pub const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

const CAPTION_KEYWORDS: &[&str] = &["caption", "desc", "描述"];
const IMAGE_KEYWORDS: &[&str] = &["path", "image", "img", "图片"];
const REWRITTEN_KEYWORDS: &[&str] = &["rewrit", "改写"];
const STATUS_KEYWORDS: &[&str] = &["status", "状态"];
const ERROR_KEYWORDS: &[&str] = &["error", "错误"];

/// 表头定位结果（列下标）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub caption: usize,
    pub image_path: Option<usize>,
    pub rewritten: Option<usize>,
    pub status: Option<usize>,
    pub error: Option<usize>,
    pub id: Option<usize>,
}

/// 根据表头定位各列
///
/// 一列只归属一个角色：说明列不参与图片路径的匹配（如 `图片描述`），
/// 说明列找不到时退回第一个未被占用的列
pub fn detect_columns(headers: &[String]) -> ColumnMap {
    let lowered: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();

    let find = |keywords: &[&str], skip: &[Option<usize>]| {
        lowered.iter().enumerate().position(|(idx, header)| {
            !skip.contains(&Some(idx)) && keywords.iter().any(|k| header.contains(k))
        })
    };

    let rewritten = find(REWRITTEN_KEYWORDS, &[]);
    let matched_caption = find(CAPTION_KEYWORDS, &[rewritten]);
    let image_path = find(IMAGE_KEYWORDS, &[rewritten, matched_caption]);
    let status = find(STATUS_KEYWORDS, &[]);
    let error = find(ERROR_KEYWORDS, &[]);
    let id = lowered.iter().position(|h| h == "id" || h == "编号");

    let taken = [rewritten, image_path, status, error, id];
    let caption = matched_caption.unwrap_or_else(|| {
        (0..lowered.len())
            .find(|idx| !taken.contains(&Some(*idx)))
            .unwrap_or(0)
    });

    ColumnMap {
        caption,
        image_path,
        rewritten,
        status,
        error,
        id,
    }
}

/// 从文件导入表格
pub async fn import_spreadsheet(path: &Path) -> AppResult<Vec<CaptionRow>> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();
    if !SPREADSHEET_EXTENSIONS.contains(&extension.as_str()) {
        return Err(AppError::unsupported_file_type(
            path.display().to_string(),
            SPREADSHEET_EXTENSIONS.join("/"),
        ));
    }

    let bytes = fs::read(path)
        .await
        .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;

    info!(
        "📊 正在解析表格: {}",
        path.file_name().unwrap_or_default().to_string_lossy()
    );
    import_spreadsheet_bytes(&bytes)
}

/// 从内存中的工作簿导入
pub fn import_spreadsheet_bytes(bytes: &[u8]) -> AppResult<Vec<CaptionRow>> {
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(ParseError::from)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ParseError::NoWorksheet)?
        .map_err(ParseError::from)?;

    let mut sheet_rows = range.rows();
    let headers: Vec<String> = match sheet_rows.next() {
        Some(header) => header.iter().map(cell_text).collect(),
        None => return Ok(Vec::new()),
    };

    let columns = detect_columns(&headers);
    debug!("表头: {:?}, 列映射: {:?}", headers, columns);

    let mut rows = Vec::new();
    for (data_index, cells) in sheet_rows.enumerate() {
        let get = |col: Option<usize>| {
            col.and_then(|c| cells.get(c))
                .map(cell_text)
                .filter(|s| !s.is_empty())
        };
        // 说明文本保留首尾空白，导出后读回与原文一致
        let get_text = |col: Option<usize>| {
            col.and_then(|c| cells.get(c))
                .map(|cell| cell.to_string())
                .filter(|s| !s.trim().is_empty())
        };

        let original = get_text(Some(columns.caption)).unwrap_or_default();
        let image_path = get(columns.image_path);
        if original.is_empty() && image_path.is_none() {
            continue;
        }

        let id = get(columns.id).unwrap_or_else(|| (data_index + 1).to_string());
        rows.push(CaptionRow {
            id,
            original,
            rewritten: get_text(columns.rewritten),
            status: get(columns.status)
                .map(|s| RowStatus::parse_lenient(&s))
                .unwrap_or_default(),
            image_path,
            image_data: None,
            error: get(columns.error),
        });
    }

    info!("✓ 从表格中读取 {} 行", rows.len());
    Ok(rows)
}

fn cell_text(cell: &Data) -> String {
    cell.to_string().trim().to_string()
}
