//! SQLite 存储：档案与周期记录以 JSON 文本存放
//!
//! rusqlite 是同步 API，连接放在 std Mutex 中；每次调用只做一条短语句，不跨 await 持锁。

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use super::{ProfileStore, RecordSink};
use crate::core::TutorError;
use crate::models::{CycleRecord, StudentProfile};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS student_profiles (
    student_id   TEXT PRIMARY KEY,
    profile_json TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS cycle_records (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id   TEXT NOT NULL,
    cycle        INTEGER NOT NULL,
    action       TEXT NOT NULL,
    failed       INTEGER NOT NULL,
    record_json  TEXT NOT NULL,
    created_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cycle_records_session ON cycle_records(session_id, id);
";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, TutorError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| TutorError::Storage(format!("create {}: {e}", parent.display())))?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, TutorError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, TutorError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// 按追加顺序读取某个会话的全部记录
    pub fn records_for_session(&self, session_id: &str) -> Result<Vec<CycleRecord>, TutorError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn.prepare(
            "SELECT record_json FROM cycle_records WHERE session_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![session_id], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for json in rows {
            let record = serde_json::from_str(&json?)
                .map_err(|e| TutorError::Storage(format!("decode cycle record: {e}")))?;
            out.push(record);
        }
        Ok(out)
    }
}

#[async_trait]
impl ProfileStore for SqliteStore {
    async fn load(&self, student_id: &str) -> Result<StudentProfile, TutorError> {
        let json: Option<String> = {
            let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
            conn.query_row(
                "SELECT profile_json FROM student_profiles WHERE student_id = ?1",
                params![student_id],
                |row| row.get(0),
            )
            .optional()?
        };
        match json {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| TutorError::Storage(format!("decode profile {student_id}: {e}"))),
            None => Ok(StudentProfile::new(student_id)),
        }
    }

    async fn save(&self, profile: &StudentProfile) -> Result<(), TutorError> {
        let json = serde_json::to_string(profile)
            .map_err(|e| TutorError::Storage(format!("encode profile: {e}")))?;
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT INTO student_profiles (student_id, profile_json, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(student_id) DO UPDATE SET profile_json = excluded.profile_json, updated_at = excluded.updated_at",
            params![profile.student_id, json, profile.updated_at.to_rfc3339()],
        )?;
        Ok(())
    }
}

#[async_trait]
impl RecordSink for SqliteStore {
    async fn append(&self, record: &CycleRecord) -> Result<(), TutorError> {
        let json = serde_json::to_string(record)
            .map_err(|e| TutorError::Storage(format!("encode cycle record: {e}")))?;
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT INTO cycle_records (session_id, cycle, action, failed, record_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.session_id,
                record.cycle as i64,
                record.decision.action.as_str(),
                record.failed,
                json,
                record.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}
