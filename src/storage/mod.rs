//! 存储协作方：学生档案与周期记录
//!
//! 核心只依赖两个窄接口：ProfileStore（档案读写）与 RecordSink（逐条追加 CycleRecord）。
//! 未配置 sqlite_path 时使用内存实现。

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::StorageSection;
use crate::core::TutorError;
use crate::models::{CycleRecord, StudentProfile};

pub use memory::{MemoryProfileStore, MemoryRecordSink};
pub use sqlite::SqliteStore;

/// 长期学生档案
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// 读取档案；不存在时返回默认档案（不写入）
    async fn load(&self, student_id: &str) -> Result<StudentProfile, TutorError>;

    async fn save(&self, profile: &StudentProfile) -> Result<(), TutorError>;

    /// 追加一条观察笔记
    async fn append_note(&self, student_id: &str, note: &str) -> Result<(), TutorError> {
        let mut profile = self.load(student_id).await?;
        profile.add_note(note);
        self.save(&profile).await
    }
}

/// 周期记录的持久化边界：只需“接收并追加一条”
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn append(&self, record: &CycleRecord) -> Result<(), TutorError>;
}

/// 按配置打开存储：sqlite_path 存在时两个接口共用一个 SQLite 连接
pub fn open_storage(
    section: &StorageSection,
) -> Result<(Arc<dyn ProfileStore>, Arc<dyn RecordSink>), TutorError> {
    match &section.sqlite_path {
        Some(path) => {
            let store = Arc::new(SqliteStore::open(path)?);
            tracing::info!(path = %path.display(), "Using SQLite storage");
            Ok((store.clone(), store))
        }
        None => Ok((
            Arc::new(MemoryProfileStore::default()),
            Arc::new(MemoryRecordSink::default()),
        )),
    }
}
