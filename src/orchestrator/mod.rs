//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和并发调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量改写处理器
//! - 管理应用生命周期（初始化、运行）
//! - 加载行（表格 / 图片目录 / 历史会话）
//! - 导出 xlsx、保存历史
//! - 输出全局统计信息
//!
//! ### `worker_pool` - 固定大小的 worker 池
//! - 按顺序排队所有 pending / error 行
//! - 原子游标领取，保证每行只被领取一次
//! - 协作式取消（Ctrl-C）
//! - 状态写回只经过一个持有者
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理整个批次)
//!     ↓
//! worker_pool (并发领取 Vec<CaptionRow>)
//!     ↓
//! workflow::RowFlow (处理单行)
//!     ↓
//! services (能力层：llm / diff / export / history)
//! ```

pub mod batch_processor;
pub mod worker_pool;

// 重新导出主要类型
pub use batch_processor::{default_output_path, open_history, App, BatchJob, JobInput, RunSummary};
pub use worker_pool::{run_batch, BatchReport, CancelFlag, RowTransform};
