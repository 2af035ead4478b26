//! 活动监视
//!
//! 记录最近一次接受测量点的时间，用于判断雷达是否仍在产出有效数据
//! （电机在转、线缆未断开）。
//!
//! 时间以单调时钟相对于监视器创建时刻的微秒数存入 `AtomicU64`，
//! 可在任意线程无锁读取，不受系统时钟调整影响。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// 默认活动窗口
pub const DEFAULT_ACTIVITY_WINDOW: Duration = Duration::from_secs(1);

/// 活动监视器
#[derive(Debug)]
pub struct ActivityMonitor {
    anchor: Instant,
    /// 相对 `anchor` 的微秒数 + 1；0 表示从未记录
    last_activity: AtomicU64,
    window: Duration,
}

impl ActivityMonitor {
    pub fn new(window: Duration) -> Self {
        Self::with_anchor(Instant::now(), window)
    }

    pub(crate) fn with_anchor(anchor: Instant, window: Duration) -> Self {
        Self {
            anchor,
            last_activity: AtomicU64::new(0),
            window,
        }
    }

    /// 记录一次活动
    pub fn record(&self, now: Instant) {
        let micros = now.saturating_duration_since(self.anchor).as_micros() as u64;
        self.last_activity.store(micros.saturating_add(1), Ordering::Relaxed);
    }

    /// 最近一次活动时间
    pub fn last_activity(&self) -> Option<Instant> {
        match self.last_activity.load(Ordering::Relaxed) {
            0 => None,
            stamp => Some(self.anchor + Duration::from_micros(stamp - 1)),
        }
    }

    /// `now` 时刻是否仍处于活动窗口内
    pub fn is_active_at(&self, now: Instant) -> bool {
        self.last_activity()
            .is_some_and(|last| now.saturating_duration_since(last) < self.window)
    }

    pub fn is_active(&self) -> bool {
        self.is_active_at(Instant::now())
    }

    /// 距最近一次活动的时长，从未活动时返回 `None`
    pub fn time_since_last_activity(&self) -> Option<Duration> {
        self.last_activity().map(|last| last.elapsed())
    }

    /// 清除记录（重连或复位后）
    pub fn clear(&self) {
        self.last_activity.store(0, Ordering::Relaxed);
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for ActivityMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_ACTIVITY_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initially_inactive() {
        let monitor = ActivityMonitor::default();
        assert!(!monitor.is_active());
        assert!(monitor.last_activity().is_none());
        assert!(monitor.time_since_last_activity().is_none());
    }

    #[test]
    fn test_activity_window() {
        let anchor = Instant::now();
        let monitor = ActivityMonitor::with_anchor(anchor, Duration::from_secs(1));

        let t = anchor + Duration::from_millis(100);
        monitor.record(t);
        assert_eq!(monitor.last_activity(), Some(t));
        assert!(monitor.is_active_at(t));
        assert!(monitor.is_active_at(t + Duration::from_millis(999)));
        assert!(!monitor.is_active_at(t + Duration::from_secs(1)));
    }

    #[test]
    fn test_record_at_anchor_and_clear() {
        let anchor = Instant::now();
        let monitor = ActivityMonitor::with_anchor(anchor, Duration::from_millis(50));
        // 与 anchor 同一时刻也必须能被记录
        monitor.record(anchor);
        assert_eq!(monitor.last_activity(), Some(anchor));

        monitor.clear();
        assert!(!monitor.is_active_at(anchor));
    }

    #[test]
    fn test_real_clock() {
        let monitor = ActivityMonitor::new(Duration::from_millis(50));
        monitor.record(Instant::now());
        assert!(monitor.is_active());
        std::thread::sleep(Duration::from_millis(80));
        assert!(!monitor.is_active());
    }
}
