//! 批次状态
//!
//! 行列表只由一个所有者持有，所有修改都表达为 [`RowUpdate`]，
//! 经纯函数 [`transition`] 计算出新行后按下标替换。

use thiserror::Error;

use crate::models::row::{CaptionRow, RowStatus};
use crate::models::session::SessionStats;
use crate::services::llm_service::RewriteOutput;

/// 单行状态更新
#[derive(Debug, Clone, PartialEq)]
pub enum RowUpdate {
    /// worker 领取了该行
    Started { index: usize },
    /// 改写成功
    Completed { index: usize, output: RewriteOutput },
    /// 改写失败
    Failed { index: usize, error: String },
}

impl RowUpdate {
    pub fn index(&self) -> usize {
        match self {
            RowUpdate::Started { index }
            | RowUpdate::Completed { index, .. }
            | RowUpdate::Failed { index, .. } => *index,
        }
    }

    fn target_status(&self) -> RowStatus {
        match self {
            RowUpdate::Started { .. } => RowStatus::Processing,
            RowUpdate::Completed { .. } => RowStatus::Completed,
            RowUpdate::Failed { .. } => RowStatus::Error,
        }
    }
}

/// 状态转换错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("行 {index} 不能从 {from} 转换到 {to}")]
    InvalidTransition {
        index: usize,
        from: RowStatus,
        to: RowStatus,
    },
    #[error("行下标 {index} 超出范围 (共 {len} 行)")]
    IndexOutOfRange { index: usize, len: usize },
}

/// 计算一次更新后的行
pub fn transition(row: &CaptionRow, update: &RowUpdate) -> Result<CaptionRow, TransitionError> {
    let to = update.target_status();
    if !row.status.can_transition_to(to) {
        return Err(TransitionError::InvalidTransition {
            index: update.index(),
            from: row.status,
            to,
        });
    }

    let mut next = row.clone();
    next.status = to;
    match update {
        RowUpdate::Started { .. } => {
            next.error = None;
        }
        RowUpdate::Completed { output, .. } => {
            next.rewritten = Some(output.rewritten.clone());
            next.error = None;
            if !next.has_text() {
                if let Some(extracted) = &output.extracted_original {
                    next.original = extracted.clone();
                }
            }
        }
        RowUpdate::Failed { error, .. } => {
            next.error = Some(error.clone());
        }
    }
    Ok(next)
}

/// 批次状态：有序的行列表
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchState {
    rows: Vec<CaptionRow>,
}

impl BatchState {
    pub fn new(rows: Vec<CaptionRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[CaptionRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<CaptionRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 待处理或失败的行下标，按顺序
    pub fn pending_indices(&self) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.status.is_runnable())
            .map(|(index, _)| index)
            .collect()
    }

    /// 应用一次更新
    pub fn apply(&mut self, update: &RowUpdate) -> Result<&CaptionRow, TransitionError> {
        let index = update.index();
        let len = self.rows.len();
        let row = self
            .rows
            .get(index)
            .ok_or(TransitionError::IndexOutOfRange { index, len })?;
        let next = transition(row, update)?;
        self.rows[index] = next;
        Ok(&self.rows[index])
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats::from_rows(&self.rows)
    }
}
