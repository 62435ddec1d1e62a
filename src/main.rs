use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use caption_rewriter::models::RowStatus;
use caption_rewriter::orchestrator::{default_output_path, open_history, RunSummary};
use caption_rewriter::services::{diff_chars, render_inline, Exporter, ProviderRegistry};
use caption_rewriter::utils::logging;
use caption_rewriter::{App, BatchJob, Config, JobInput};

/// 批量改写图片说明文字
#[derive(Parser, Debug)]
#[command(
    name = "caption-rewriter",
    about = "Batch caption rewriter backed by OpenAI-compatible LLM providers",
    after_help = "ENVIRONMENT VARIABLES:\n\
        LLM_API_KEY            API key (required for run / rerun)\n\
        LLM_MODEL_NAME         Model name, also selects the provider\n\
        LLM_PROVIDER           Force a provider by name\n\
        LLM_API_BASE_URL       Override the provider base URL\n\
        MAX_CONCURRENT_ROWS    Worker count (default 3)\n\
        HISTORY_FILE           History file location"
)]
struct Args {
    /// TOML config file (environment variables still win)
    #[arg(short, long, global = true, env = "CAPTION_REWRITER_CONFIG")]
    config: Option<PathBuf>,

    /// Debug level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rewrite every pending caption in a spreadsheet or image directory
    Run {
        /// Spreadsheet file, or a directory of images (one row per image)
        #[arg(short, long)]
        input: PathBuf,

        /// Directory used to match the spreadsheet's image paths
        #[arg(long)]
        images: Option<PathBuf>,

        /// PDF whose text is appended to the system instruction
        #[arg(long)]
        instructions: Option<PathBuf>,

        /// Output xlsx (default: rewritten_captions_<time>.xlsx)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Session name stored in history
        #[arg(short, long)]
        name: Option<String>,

        /// Worker count
        #[arg(long)]
        concurrency: Option<usize>,

        /// Model name
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Re-run the unfinished rows of a saved session
    Rerun {
        /// Session id (see `history list`)
        #[arg(short, long)]
        session: String,

        /// Directory used to re-attach images
        #[arg(long)]
        images: Option<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Inspect or edit local history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Print a character-level diff of two captions
    Diff { original: String, rewritten: String },

    /// List the built-in providers
    Providers,
}

#[derive(Subcommand, Debug)]
enum HistoryAction {
    /// List saved sessions, newest first
    List,
    /// Show one session with its diffs
    Show { id: String },
    /// Export one session to xlsx
    Export {
        id: String,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Delete one session
    Delete { id: String },
    /// Delete all sessions
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 加载配置
    let mut config = Config::load(args.config.as_deref())?;

    // 初始化日志
    logging::init(args.verbose || config.verbose_logging);

    match args.command {
        Commands::Run {
            input,
            images,
            instructions,
            output,
            name,
            concurrency,
            model,
        } => {
            if let Some(n) = concurrency {
                config.max_concurrent_rows = n;
            }
            if let Some(m) = model {
                config.llm_model_name = m;
            }
            let input = if input.is_dir() {
                JobInput::ImageDir(input)
            } else {
                JobInput::Spreadsheet(input)
            };
            let job = BatchJob {
                input,
                image_dir: images,
                instructions_pdf: instructions,
                output: output.unwrap_or_else(|| default_output_path(&PathBuf::from("."))),
                session_name: name,
            };
            report_export(App::initialize(config).await?.run(job).await?)?;
        }
        Commands::Rerun {
            session,
            images,
            output,
        } => {
            let job = BatchJob {
                input: JobInput::Session(session),
                image_dir: images,
                instructions_pdf: None,
                output: output.unwrap_or_else(|| default_output_path(&PathBuf::from("."))),
                session_name: None,
            };
            report_export(App::initialize(config).await?.run(job).await?)?;
        }
        Commands::History { action } => run_history(&config, action)?,
        Commands::Diff {
            original,
            rewritten,
        } => {
            println!("{}", render_inline(&diff_chars(&original, &rewritten)));
        }
        Commands::Providers => {
            for provider in ProviderRegistry::default().providers() {
                println!("{}", provider);
            }
        }
    }

    Ok(())
}

/// 导出失败时以错误退出；结果已在历史中
fn report_export(summary: RunSummary) -> Result<()> {
    match summary.export_error {
        Some(e) => anyhow::bail!(
            "导出失败: {}（会话 {} 已保存，可使用 history export 重新导出）",
            e,
            summary.session_id.as_deref().unwrap_or("-")
        ),
        None => Ok(()),
    }
}

fn run_history(config: &Config, action: HistoryAction) -> Result<()> {
    let history = open_history(config);

    match action {
        HistoryAction::List => {
            let sessions = history.list_sessions()?;
            if sessions.is_empty() {
                println!("暂无历史记录");
            }
            for s in sessions {
                println!(
                    "{}  {}  {}  (共 {} | 成功 {} | 失败 {} | 未处理 {})",
                    s.id,
                    s.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    s.name,
                    s.stats.total,
                    s.stats.completed,
                    s.stats.failed,
                    s.stats.pending
                );
            }
        }
        HistoryAction::Show { id } => {
            let session = history
                .get_session(&id)?
                .ok_or_else(|| anyhow::anyhow!("历史记录不存在: {}", id))?;
            println!("{} - {}", session.name, session.timestamp.format("%Y-%m-%d %H:%M:%S"));
            for row in &session.rows {
                let line = match (&row.status, &row.rewritten) {
                    (RowStatus::Completed, Some(rewritten)) => {
                        render_inline(&diff_chars(&row.original, rewritten))
                    }
                    _ => row.original.clone(),
                };
                let error = row
                    .error
                    .as_deref()
                    .map(|e| format!("  ({})", e))
                    .unwrap_or_default();
                println!("[{}] {}: {}{}", row.status, row.id, line, error);
            }
        }
        HistoryAction::Export { id, output } => {
            let session = history
                .get_session(&id)?
                .ok_or_else(|| anyhow::anyhow!("历史记录不存在: {}", id))?;
            Exporter::export_to_file(&session.rows, &output)?;
        }
        HistoryAction::Delete { id } => {
            if history.delete_session(&id)? {
                info!("🗑️ 已删除历史记录: {}", id);
            } else {
                println!("历史记录不存在: {}", id);
            }
        }
        HistoryAction::Clear => {
            history.clear()?;
            info!("🗑️ 已清空历史记录");
        }
    }

    Ok(())
}
