//! 图片导入与匹配
//!
//! - 把图片读成 data URL，供预览和 API 请求使用
//! - 按文件名后缀把表格行和图片文件关联（匹配模式）

use std::path::{Path, PathBuf};

use base64::Engine;
use phf::phf_map;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult, ParseError};
use crate::models::row::CaptionRow;

/// 扩展名 → MIME 类型
static IMAGE_MIME_TYPES: phf::Map<&'static str, &'static str> = phf_map! {
    "png" => "image/png",
    "jpg" => "image/jpeg",
    "jpeg" => "image/jpeg",
    "webp" => "image/webp",
    "gif" => "image/gif",
    "bmp" => "image/bmp",
};

/// 匹配结果
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MatchReport {
    pub matched: usize,
    /// 未找到图片的行 ID
    pub unmatched: Vec<String>,
}

/// 根据扩展名判断 MIME 类型
pub fn mime_for_path(path: &str) -> Option<&'static str> {
    let extension = path.rsplit('.').next()?.to_lowercase();
    IMAGE_MIME_TYPES.get(extension.as_str()).copied()
}

/// 编码为 data URL
pub fn encode_data_url(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// 读取本地图片为 data URL
pub async fn load_image_data_url(path: &Path) -> AppResult<String> {
    let display = path.display().to_string();
    let mime = mime_for_path(&display)
        .ok_or_else(|| AppError::unsupported_file_type(&display, image_extensions()))?;
    let bytes = fs::read(path)
        .await
        .map_err(|e| AppError::file_read_failed(&display, e))?;
    Ok(encode_data_url(mime, &bytes))
}

/// 下载远程图片为 data URL
pub async fn download_image_data_url(url: &str) -> AppResult<String> {
    let download_err = |source| ParseError::ImageDownload {
        url: url.to_string(),
        source,
    };

    let response = reqwest::get(url)
        .await
        .and_then(|r| r.error_for_status())
        .map_err(download_err)?;

    let header_mime = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| v.starts_with("image/"))
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
    let mime = header_mime
        .or_else(|| mime_for_path(url).map(str::to_string))
        .unwrap_or_else(|| "image/png".to_string());

    let bytes = response.bytes().await.map_err(download_err)?;
    Ok(encode_data_url(&mime, &bytes))
}

/// 列出目录下的图片文件（按文件名排序）
pub async fn list_image_files(dir: &Path) -> AppResult<Vec<PathBuf>> {
    let display = dir.display().to_string();
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| AppError::file_read_failed(&display, e))?;

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| AppError::file_read_failed(&display, e))?
    {
        let path = entry.path();
        if path.is_file() && mime_for_path(&path.to_string_lossy()).is_some() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// 导入图片目录：每张图片一行，原始说明留空（由模型从图片中提取）
pub async fn import_image_dir(dir: &Path) -> AppResult<Vec<CaptionRow>> {
    let files = list_image_files(dir).await?;
    let mut rows = Vec::with_capacity(files.len());

    for (index, path) in files.iter().enumerate() {
        let data_url = load_image_data_url(path).await?;
        let file_name = path.file_name().unwrap_or_default().to_string_lossy();
        rows.push(
            CaptionRow::new((index + 1).to_string(), "")
                .with_image_path(file_name)
                .with_image_data(data_url),
        );
    }

    info!("🖼️ 从目录中导入 {} 张图片", rows.len());
    Ok(rows)
}

/// 在候选文件中查找与表格路径匹配的图片
///
/// 先比较完整文件名，再按后缀匹配，均忽略大小写
pub fn find_image_match<'a>(image_path: &str, files: &'a [PathBuf]) -> Option<&'a PathBuf> {
    let normalized = image_path.trim().replace('\\', "/").to_lowercase();
    let base_name = normalized.rsplit('/').next().unwrap_or(&normalized);
    if base_name.is_empty() {
        return None;
    }

    let file_name = |p: &PathBuf| {
        p.file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    };

    files
        .iter()
        .find(|p| file_name(p) == base_name)
        .or_else(|| files.iter().find(|p| file_name(p).ends_with(base_name)))
}

/// 匹配模式：为带图片路径的行加载图片
///
/// `http(s)` 路径直接下载，其余在 `image_dir` 中按文件名后缀匹配
pub async fn match_images(
    rows: &mut [CaptionRow],
    image_dir: Option<&Path>,
) -> AppResult<MatchReport> {
    let files = match image_dir {
        Some(dir) => list_image_files(dir).await?,
        None => Vec::new(),
    };
    debug!("候选图片文件: {} 个", files.len());

    let mut report = MatchReport::default();
    for row in rows.iter_mut().filter(|r| r.image_data.is_none()) {
        let Some(image_path) = row.image_path.clone() else {
            continue;
        };

        let loaded = if image_path.starts_with("http://") || image_path.starts_with("https://") {
            download_image_data_url(&image_path).await.map(Some)
        } else {
            match find_image_match(&image_path, &files) {
                Some(file) => load_image_data_url(file).await.map(Some),
                None => Ok(None),
            }
        };

        match loaded {
            Ok(Some(data_url)) => {
                row.image_data = Some(data_url);
                report.matched += 1;
            }
            Ok(None) => report.unmatched.push(row.id.clone()),
            Err(e) => {
                warn!("[行 {}] ⚠️ 图片加载失败: {}", row.id, e);
                report.unmatched.push(row.id.clone());
            }
        }
    }

    info!(
        "🔗 图片匹配完成: 成功 {}, 未匹配 {}",
        report.matched,
        report.unmatched.len()
    );
    Ok(report)
}

fn image_extensions() -> String {
    let mut extensions: Vec<&str> = IMAGE_MIME_TYPES.keys().copied().collect();
    extensions.sort_unstable();
    extensions.join("/")
}
