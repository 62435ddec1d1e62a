//! 历史会话快照

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::models::row::{CaptionRow, RowStatus};

/// 会话统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub pending: usize,
}

impl SessionStats {
    /// 根据行状态汇总统计
    pub fn from_rows(rows: &[CaptionRow]) -> Self {
        let mut stats = Self {
            total: rows.len(),
            ..Default::default()
        };
        for row in rows {
            match row.status {
                RowStatus::Completed => stats.completed += 1,
                RowStatus::Error => stats.failed += 1,
                // 处理中的行视作未完成
                RowStatus::Pending | RowStatus::Processing => stats.pending += 1,
            }
        }
        stats
    }
}

/// 一次批处理的快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub timestamp: DateTime<Local>,
    pub name: String,
    pub stats: SessionStats,
    pub rows: Vec<CaptionRow>,
}

impl Session {
    /// 创建快照，图片数据会被剥离
    pub fn snapshot(name: impl Into<String>, rows: &[CaptionRow]) -> Self {
        let timestamp = Local::now();
        let id = format!(
            "session_{}",
            timestamp
                .timestamp_nanos_opt()
                .unwrap_or_else(|| timestamp.timestamp_millis())
        );
        Self {
            id,
            timestamp,
            name: name.into(),
            stats: SessionStats::from_rows(rows),
            rows: rows.iter().map(CaptionRow::without_image).collect(),
        }
    }

    /// 默认会话名
    pub fn default_name() -> String {
        format!("批处理 {}", Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_strips_images_and_counts() {
        let mut done = CaptionRow::new("1", "a").with_image_data("data:image/png;base64,AA");
        done.status = RowStatus::Completed;
        let mut failed = CaptionRow::new("2", "b");
        failed.status = RowStatus::Error;
        let pending = CaptionRow::new("3", "c");

        let session = Session::snapshot("test", &[done, failed, pending]);

        assert!(session.id.starts_with("session_"));
        assert!(session.rows.iter().all(|r| r.image_data.is_none()));
        assert_eq!(
            session.stats,
            SessionStats {
                total: 3,
                completed: 1,
                failed: 1,
                pending: 1
            }
        );
    }
}
