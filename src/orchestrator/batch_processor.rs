//! 批量改写处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责一次批处理的完整生命周期。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：校验 API Key、选择服务商、创建 LlmService
//! 2. **加载数据**：表格 / 图片目录 / 历史会话，必要时匹配图片
//! 3. **并发处理**：委托 worker 池处理所有 pending / error 行
//! 4. **保存历史**：会话快照写入本地历史（失败不影响本次结果）
//! 5. **导出结果**：写出带差异高亮的 xlsx（失败时结果仍在历史中）
//! 6. **全局统计**：输出并记录本次运行的统计

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{AppError, ValidationError};
use crate::models::loaders::{extract_pdf_text, import_image_dir, import_spreadsheet, match_images};
use crate::models::row::CaptionRow;
use crate::models::session::{Session, SessionStats};
use crate::orchestrator::worker_pool::{run_batch, BatchReport, CancelFlag};
use crate::services::{Exporter, FileStore, HistoryStore, LlmService, ProviderRegistry};
use crate::utils::logging;
use crate::workflow::{BatchState, RowFlow};

/// 待处理数据的来源
#[derive(Debug, Clone)]
pub enum JobInput {
    /// 表格文件
    Spreadsheet(PathBuf),
    /// 图片目录（每张图一行）
    ImageDir(PathBuf),
    /// 历史会话 ID（重新运行未完成的行）
    Session(String),
}

/// 一次批处理任务
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub input: JobInput,
    /// 匹配模式的图片目录
    pub image_dir: Option<PathBuf>,
    /// 补充指令 PDF
    pub instructions_pdf: Option<PathBuf>,
    /// 导出路径
    pub output: PathBuf,
    /// 会话名称
    pub session_name: Option<String>,
}

/// 运行结果
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub report: BatchReport,
    pub stats: SessionStats,
    pub rows: Vec<CaptionRow>,
    /// 保存成功时的会话 ID
    pub session_id: Option<String>,
    /// 导出失败的原因
    pub export_error: Option<String>,
}

/// 打开配置中的历史记录
pub fn open_history(config: &Config) -> HistoryStore<FileStore> {
    HistoryStore::with_limit(
        FileStore::new(&config.history_file, config.history_quota_bytes),
        config.history_limit,
    )
}

/// 应用主结构
pub struct App {
    config: Config,
    llm_service: Arc<LlmService>,
    history: HistoryStore<FileStore>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        if config.llm_api_key.trim().is_empty() {
            return Err(AppError::from(ValidationError::MissingApiKey).into());
        }

        let provider = ProviderRegistry::default()
            .resolve_config(&config)
            .map_err(AppError::from)?;

        logging::init_log_file(&config.output_log_file)
            .with_context(|| format!("无法创建日志文件: {}", config.output_log_file))?;
        logging::log_startup(&provider.name, &provider.model, config.max_concurrent_rows);

        let llm_service = Arc::new(LlmService::new(&config, provider));
        let history = open_history(&config);

        Ok(Self {
            config,
            llm_service,
            history,
        })
    }

    /// 运行一次批处理
    pub async fn run(&self, job: BatchJob) -> Result<RunSummary> {
        let rows = self.load_rows(&job).await?;
        if rows.is_empty() {
            return Err(AppError::from(ValidationError::EmptyBatch).into());
        }

        let supplement = match &job.instructions_pdf {
            Some(pdf) => Some(extract_pdf_text(pdf).await?),
            None => None,
        };

        let mut state = BatchState::new(rows);
        let runnable = state.pending_indices().len();
        logging::log_rows_loaded(state.len(), runnable);
        if runnable == 0 {
            return Err(AppError::from(ValidationError::EmptyBatch).into());
        }

        let flow = Arc::new(RowFlow::new(
            &self.config,
            Arc::clone(&self.llm_service),
            supplement.as_deref(),
        ));
        let transform = move |row: CaptionRow| {
            let flow = Arc::clone(&flow);
            async move { flow.run(&row).await }
        };

        let cancel = CancelFlag::new();
        let ctrl_c = spawn_ctrl_c_listener(cancel.clone());
        let report = run_batch(
            &mut state,
            Arc::new(transform),
            self.config.max_concurrent_rows,
            &cancel,
        )
        .await;
        ctrl_c.abort();

        Ok(self.finish(state.into_rows(), report, &job))
    }

    /// 批次结束后的收尾：先保存历史和运行日志，再导出
    ///
    /// 导出失败只记录在结果里，已完成的行仍在历史中，可以 rerun
    fn finish(&self, rows: Vec<CaptionRow>, report: BatchReport, job: &BatchJob) -> RunSummary {
        let stats = SessionStats::from_rows(&rows);

        let session_name = job.session_name.clone().unwrap_or_else(Session::default_name);
        let session_id = self.save_history(&session_name, &rows);
        self.write_run_log(&rows, &report);

        let export_error = match Exporter::export_to_file(&rows, &job.output) {
            Ok(()) => None,
            Err(e) => {
                error!("❌ 导出失败 ({}): {}", job.output.display(), e);
                if let Some(id) = &session_id {
                    warn!("结果已保存在历史记录 {} 中，可用 history export 重新导出", id);
                }
                Some(e.to_string())
            }
        };

        let output = match &export_error {
            None => job.output.display().to_string(),
            Some(_) => "(导出失败)".to_string(),
        };
        logging::print_final_stats(&stats, &output, &self.config.output_log_file);

        RunSummary {
            report,
            stats,
            rows,
            session_id,
            export_error,
        }
    }

    /// 加载行
    async fn load_rows(&self, job: &BatchJob) -> Result<Vec<CaptionRow>> {
        info!("\n📁 正在加载待处理数据...");

        let mut rows = match &job.input {
            JobInput::Spreadsheet(path) => import_spreadsheet(path).await?,
            JobInput::ImageDir(dir) => import_image_dir(dir).await?,
            JobInput::Session(id) => {
                let session = self
                    .history
                    .get_session(id)
                    .map_err(AppError::from)?
                    .ok_or_else(|| AppError::from(ValidationError::SessionNotFound(id.clone())))?;
                info!("📚 载入历史会话: {} ({})", session.name, session.id);
                session.rows
            }
        };

        let needs_images = rows
            .iter()
            .any(|r| r.image_path.is_some() && r.image_data.is_none());
        if needs_images {
            let report = match_images(&mut rows, job.image_dir.as_deref()).await?;
            if !report.unmatched.is_empty() {
                warn!(
                    "⚠️ {} 行未找到图片，将只使用文本: {:?}",
                    report.unmatched.len(),
                    report.unmatched
                );
            }
        }

        Ok(rows)
    }

    /// 保存历史；存储失败只影响保存本身
    fn save_history(&self, name: &str, rows: &[CaptionRow]) -> Option<String> {
        let session = Session::snapshot(name, rows);
        match self.history.save_session(&session) {
            Ok(()) => Some(session.id),
            Err(e) => {
                error!("❌ 保存历史记录失败: {}", e);
                None
            }
        }
    }

    fn write_run_log(&self, rows: &[CaptionRow], report: &BatchReport) {
        let path = &self.config.output_log_file;
        let mut lines: Vec<String> = rows
            .iter()
            .map(|row| {
                format!(
                    "[{}] {} | {} → {}{}",
                    row.status,
                    row.id,
                    logging::truncate_text(&row.original, 40),
                    logging::truncate_text(row.rewritten.as_deref().unwrap_or("-"), 40),
                    row.error
                        .as_deref()
                        .map(|e| format!(" | 错误: {}", e))
                        .unwrap_or_default()
                )
            })
            .collect();
        lines.push(format!(
            "\n发出 {} / 排队 {} | 成功 {} | 失败 {} | 未处理 {}{}",
            report.dispatched,
            report.queued,
            report.completed,
            report.failed,
            report.not_dispatched,
            if report.cancelled { " | 已手动停止" } else { "" }
        ));

        for line in lines {
            if let Err(e) = logging::append_log_line(path, &line) {
                warn!("写入日志文件失败: {}", e);
                break;
            }
        }
    }
}

/// Ctrl-C 触发协作式停止
fn spawn_ctrl_c_listener(cancel: CancelFlag) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("⏹️ 收到停止请求，等待进行中的请求完成...");
            cancel.cancel();
        }
    })
}

/// 默认导出文件名
pub fn default_output_path(dir: &Path) -> PathBuf {
    dir.join(format!(
        "rewritten_captions_{}.xlsx",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ))
}
