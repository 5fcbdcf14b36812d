//! 转写滑动窗口
//!
//! 只保留最近 retention 秒内的 TranscriptEntry：写入时剪枝，读取时按窗口过滤并按时间戳稳定排序。
//! 时间戳可能乱序到达（客户端 STT 分段返回），读取不会因此出错；相同时间戳保持插入顺序。

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::clock::SharedClock;

/// 单条转写，写入后不可变
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub text: String,
    pub timestamp: f64,
}

impl TranscriptEntry {
    pub fn new(text: impl Into<String>, timestamp: f64) -> Self {
        Self {
            text: text.into(),
            timestamp,
        }
    }
}

/// 转写缓冲区（默认保留 30 秒）
pub struct TranscriptBuffer {
    entries: VecDeque<TranscriptEntry>,
    retention: f64,
    clock: SharedClock,
}

impl TranscriptBuffer {
    pub fn new(retention: f64, clock: SharedClock) -> Self {
        Self {
            entries: VecDeque::new(),
            retention,
            clock,
        }
    }

    pub fn retention(&self) -> f64 {
        self.retention
    }

    pub fn append(&mut self, text: impl Into<String>, timestamp: f64) {
        self.entries.push_back(TranscriptEntry::new(text, timestamp));
        self.prune();
    }

    /// 返回 now - timestamp <= duration 的条目，按时间戳升序
    pub fn recent(&self, duration: f64) -> Vec<TranscriptEntry> {
        let now = self.clock.now();
        let window = duration.min(self.retention);
        let mut out: Vec<TranscriptEntry> = self
            .entries
            .iter()
            .filter(|e| now - e.timestamp <= window)
            .cloned()
            .collect();
        // sort_by 是稳定排序，相同时间戳保持插入顺序
        out.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        out
    }

    /// 保留窗口内全部条目
    pub fn all(&self) -> Vec<TranscriptEntry> {
        self.recent(self.retention)
    }

    /// 最近窗口内最新的一条
    pub fn latest(&self, duration: f64) -> Option<TranscriptEntry> {
        self.recent(duration).pop()
    }

    /// 窗口内文本拼接
    pub fn joined_text(&self, duration: f64) -> String {
        self.recent(duration)
            .iter()
            .map(|e| e.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn prune(&mut self) {
        let cutoff = self.clock.now() - self.retention;
        // 乱序写入时过期条目不一定在队首，整体过滤
        self.entries.retain(|e| e.timestamp >= cutoff);
    }
}
