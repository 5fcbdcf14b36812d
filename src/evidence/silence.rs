//! 静默计时器
//!
//! 每次检测到语音时把 last_speech_time 重置为 now；静默时长随时钟隐式累积。

use super::clock::SharedClock;

/// 静默计时器
pub struct SilenceTracker {
    threshold: f64,
    last_speech_time: f64,
    clock: SharedClock,
}

impl SilenceTracker {
    /// 创建时视为刚刚说过话（静默从 0 开始累积）
    pub fn new(threshold: f64, clock: SharedClock) -> Self {
        let now = clock.now();
        Self {
            threshold,
            last_speech_time: now,
            clock,
        }
    }

    /// 语音活动信号：有语音则重置，否则不做任何事
    pub fn update(&mut self, has_speech: bool) {
        if has_speech {
            self.reset();
        }
    }

    pub fn reset(&mut self) {
        self.last_speech_time = self.clock.now();
    }

    /// 当前静默时长（秒），不会为负
    pub fn duration(&self) -> f64 {
        (self.clock.now() - self.last_speech_time).max(0.0)
    }

    pub fn is_silent(&self) -> bool {
        self.duration() >= self.threshold
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn last_speech_time(&self) -> f64 {
        self.last_speech_time
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::evidence::ManualClock;

    #[test]
    fn test_duration_monotonic_between_resets() {
        let clock = ManualClock::new(0.0);
        let mut tracker = SilenceTracker::new(3.0, Arc::new(clock.clone()));
        let mut last = tracker.duration();
        for _ in 0..10 {
            clock.advance(0.7);
            tracker.update(false);
            let d = tracker.duration();
            assert!(d >= last);
            last = d;
        }
        assert!(tracker.is_silent());
        tracker.update(true);
        assert!(tracker.duration().abs() < 1e-9);
        assert!(!tracker.is_silent());
    }

    #[test]
    fn test_reset_sets_last_speech_time() {
        let clock = ManualClock::new(10.0);
        let mut tracker = SilenceTracker::new(3.0, Arc::new(clock.clone()));
        clock.advance(5.0);
        tracker.reset();
        assert_eq!(tracker.last_speech_time(), 15.0);
        assert_eq!(tracker.threshold(), 3.0);
    }
}
