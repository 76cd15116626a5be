//! 存储层错误类型
//!
//! 生产记录落库失败会让当前周期失败，调用方需要区分错误来源：
//! SQLite 执行、记录文档编解码、重复保存同一条记录、内存实现的锁中毒。

/// 错误来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    Database,
    Document,
    /// 同一 `record_id` 已经落库
    Conflict,
    Lock,
    Other,
}

#[derive(Debug)]
pub struct StorageError {
    kind: StorageErrorKind,
    message: String,
}

impl StorageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_kind(StorageErrorKind::Other, message)
    }

    pub fn with_kind(kind: StorageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// 内存存储的读写锁已中毒
    pub fn lock_poisoned() -> Self {
        Self::with_kind(StorageErrorKind::Lock, "store lock poisoned")
    }

    /// 记录已存在，拒绝覆盖
    pub fn conflict(record_id: &str) -> Self {
        Self::with_kind(
            StorageErrorKind::Conflict,
            format!("record {} already stored", record_id),
        )
    }

    pub fn kind(&self) -> StorageErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            StorageErrorKind::Database => write!(f, "database: {}", self.message),
            StorageErrorKind::Document => write!(f, "record document: {}", self.message),
            StorageErrorKind::Conflict => write!(f, "conflict: {}", self.message),
            StorageErrorKind::Lock | StorageErrorKind::Other => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        Self::with_kind(StorageErrorKind::Database, err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_kind(StorageErrorKind::Document, err.to_string())
    }
}
