//! # Caption Rewriter
//!
//! 批量改写图片说明文字的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 数据层（Models）
//! - `models/` - 行、会话与导入器
//! - `CaptionRow` / `RowStatus` - 单行说明及其状态
//! - `loaders` - 表格、PDF、图片目录导入
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `LlmService` - 改写能力（按服务商路由，支持图片）
//! - `diff` - 字符级差异
//! - `Exporter` - 带高亮的 xlsx 导出
//! - `HistoryStore` - 本地历史（最多 20 条）
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一行"的处理流程与状态转换
//! - `RowFlow` - 组装请求并调用 LLM
//! - `BatchState` - 批次状态的唯一持有者
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/worker_pool` - 固定并发的 worker 池，支持停止
//! - `orchestrator/batch_processor` - 加载、运行、导出、保存历史
//!
//! ## 模块结构

pub mod config;
pub mod error;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{CaptionRow, RowStatus, Session, SessionStats};
pub use orchestrator::{run_batch, App, BatchJob, BatchReport, CancelFlag, JobInput};
pub use workflow::{BatchState, RowCtx, RowFlow, RowUpdate};
