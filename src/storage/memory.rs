//! 内存存储（默认 / 测试）

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::{ProfileStore, RecordSink};
use crate::core::TutorError;
use crate::models::{CycleRecord, StudentProfile};

#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: Mutex<HashMap<String, StudentProfile>>,
}

impl MemoryProfileStore {
    /// 预置档案
    pub fn with_profile(profile: StudentProfile) -> Self {
        let store = Self::default();
        store
            .profiles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(profile.student_id.clone(), profile);
        store
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn load(&self, student_id: &str) -> Result<StudentProfile, TutorError> {
        Ok(self
            .profiles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(student_id)
            .cloned()
            .unwrap_or_else(|| StudentProfile::new(student_id)))
    }

    async fn save(&self, profile: &StudentProfile) -> Result<(), TutorError> {
        self.profiles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(profile.student_id.clone(), profile.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryRecordSink {
    records: Mutex<Vec<CycleRecord>>,
}

impl MemoryRecordSink {
    pub fn records(&self) -> Vec<CycleRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl RecordSink for MemoryRecordSink {
    async fn append(&self, record: &CycleRecord) -> Result<(), TutorError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}
