//! 历史记录服务 - 业务能力层
//!
//! 会话列表以 JSON 形式存放在一个简单的键值存储中，
//! 最新的在前，最多保留 `limit` 条，保存前剥离图片数据。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info};

use crate::error::StorageError;
use crate::models::session::Session;

/// 历史记录使用的键
pub const HISTORY_KEY: &str = "caption_history";

/// 默认保留条数
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// 简单的字符串键值存储
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// 内存存储，可设置字节配额
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            quota_bytes: Some(quota_bytes),
            ..Self::default()
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = entries.clone();
        next.insert(key.to_string(), value.to_string());
        check_quota(self.quota_bytes, &next)?;
        *entries = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }
}

/// 文件存储：整个存储是一个 JSON 对象文件
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    quota_bytes: Option<usize>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>, quota_bytes: Option<usize>) -> Self {
        Self {
            path: path.into(),
            quota_bytes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path).map_err(|e| self.io_err(e))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        check_quota(self.quota_bytes, entries)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let content = serde_json::to_string(entries)?;
        std::fs::write(&self.path, content).map_err(|e| self.io_err(e))
    }

    fn io_err(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.read_all()?;
        if entries.remove(key).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}

/// 配额按键和值的字节数之和计算
fn check_quota(
    quota_bytes: Option<usize>,
    entries: &BTreeMap<String, String>,
) -> Result<(), StorageError> {
    let Some(quota) = quota_bytes else {
        return Ok(());
    };
    let required: usize = entries.iter().map(|(k, v)| k.len() + v.len()).sum();
    if required > quota {
        return Err(StorageError::QuotaExceeded { required, quota });
    }
    Ok(())
}

/// 历史记录服务
pub struct HistoryStore<S: KeyValueStore> {
    store: S,
    limit: usize,
}

impl<S: KeyValueStore> HistoryStore<S> {
    pub fn new(store: S) -> Self {
        Self::with_limit(store, DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_limit(store: S, limit: usize) -> Self {
        Self {
            store,
            limit: limit.max(1),
        }
    }

    /// 所有会话，最新的在前
    pub fn list_sessions(&self) -> Result<Vec<Session>, StorageError> {
        match self.store.get(HISTORY_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    /// 保存会话：插到最前，超出上限的旧会话被丢弃
    pub fn save_session(&self, session: &Session) -> Result<(), StorageError> {
        let mut stripped = session.clone();
        for row in &mut stripped.rows {
            row.image_data = None;
        }

        let mut sessions = self.list_sessions()?;
        sessions.retain(|s| s.id != stripped.id);
        sessions.insert(0, stripped);
        sessions.truncate(self.limit);

        self.persist(&sessions)?;
        info!("📚 已保存会话 {} ({} 条历史)", session.id, sessions.len());
        Ok(())
    }

    pub fn get_session(&self, id: &str) -> Result<Option<Session>, StorageError> {
        Ok(self.list_sessions()?.into_iter().find(|s| s.id == id))
    }

    /// 删除会话，返回是否存在
    pub fn delete_session(&self, id: &str) -> Result<bool, StorageError> {
        let mut sessions = self.list_sessions()?;
        let before = sessions.len();
        sessions.retain(|s| s.id != id);
        if sessions.len() == before {
            return Ok(false);
        }
        self.persist(&sessions)?;
        debug!("已删除会话 {}", id);
        Ok(true)
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.store.remove(HISTORY_KEY)
    }

    fn persist(&self, sessions: &[Session]) -> Result<(), StorageError> {
        let raw = serde_json::to_string(sessions)?;
        self.store.set(HISTORY_KEY, &raw)
    }
}
