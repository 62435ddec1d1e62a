//! 行处理上下文
//!
//! 封装"我正在处理第几行"这一信息，只用于日志

use std::fmt::Display;

/// 行处理上下文
#[derive(Debug, Clone)]
pub struct RowCtx {
    /// 行在列表中的下标（从0开始）
    pub row_index: usize,

    /// 行 ID
    pub row_id: String,

    /// 本批次的行数
    pub batch_size: usize,

    /// 处理该行的 worker 编号（从1开始）
    pub worker: usize,
}

impl RowCtx {
    /// 创建新的行上下文
    pub fn new(row_index: usize, row_id: impl Into<String>, batch_size: usize, worker: usize) -> Self {
        Self {
            row_index,
            row_id: row_id.into(),
            batch_size,
            worker,
        }
    }
}

impl Display for RowCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[worker#{} 行#{}/{} ID#{}]",
            self.worker,
            self.row_index + 1,
            self.batch_size,
            self.row_id
        )
    }
}
