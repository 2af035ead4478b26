//! 性能指标模块
//!
//! 提供零开销的原子计数器，用于监控数据链路的健康状态。
//! 所有计数器都使用原子操作，可以在任何线程安全地读取，不会引入锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

/// 雷达实时指标
///
/// # 使用示例
///
/// ```rust
/// use rplidar_driver::LidarMetrics;
/// use std::sync::Arc;
/// use std::sync::atomic::Ordering;
///
/// let metrics = Arc::new(LidarMetrics::default());
///
/// // 在 RX 线程中更新指标
/// metrics.frames_total.fetch_add(1, Ordering::Relaxed);
///
/// // 在主线程中读取快照
/// let snapshot = metrics.snapshot();
/// assert_eq!(snapshot.frames_total, 1);
/// ```
#[derive(Debug, Default)]
pub struct LidarMetrics {
    /// 从传输层读到的总字节数
    pub bytes_received: AtomicU64,

    /// 完整提取的帧数（含无法解码的帧）
    pub frames_total: AtomicU64,

    /// 解码为 `Response::Invalid` 的帧数
    pub invalid_responses: AtomicU64,

    /// 写入向量表的测量点数
    pub samples_accepted: AtomicU64,

    /// 未通过接受条件的测量点数
    pub samples_rejected: AtomicU64,

    /// 重新同步次数（全部原因）
    pub resyncs: AtomicU64,

    /// 接收缓冲区溢出次数
    pub overflows: AtomicU64,

    /// 流模式下回退重对齐次数
    ///
    /// 稳定扫描时应接近 0；持续增长说明链路噪声大或波特率不匹配。
    pub backoffs: AtomicU64,

    /// 应答交接通道满而丢弃的应答数
    pub handoff_drops: AtomicU64,

    /// 传输层错误次数（不含超时）
    pub transport_errors: AtomicU64,

    /// RX 超时次数（正常现象，无数据时会超时）
    pub rx_timeouts: AtomicU64,

    /// 已写出的命令数
    pub commands_sent: AtomicU64,
}

impl LidarMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取指标快照
    ///
    /// 不同计数器之间可能有微小的时间差。
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            frames_total: self.frames_total.load(Ordering::Relaxed),
            invalid_responses: self.invalid_responses.load(Ordering::Relaxed),
            samples_accepted: self.samples_accepted.load(Ordering::Relaxed),
            samples_rejected: self.samples_rejected.load(Ordering::Relaxed),
            resyncs: self.resyncs.load(Ordering::Relaxed),
            overflows: self.overflows.load(Ordering::Relaxed),
            backoffs: self.backoffs.load(Ordering::Relaxed),
            handoff_drops: self.handoff_drops.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            rx_timeouts: self.rx_timeouts.load(Ordering::Relaxed),
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        self.bytes_received.store(0, Ordering::Relaxed);
        self.frames_total.store(0, Ordering::Relaxed);
        self.invalid_responses.store(0, Ordering::Relaxed);
        self.samples_accepted.store(0, Ordering::Relaxed);
        self.samples_rejected.store(0, Ordering::Relaxed);
        self.resyncs.store(0, Ordering::Relaxed);
        self.overflows.store(0, Ordering::Relaxed);
        self.backoffs.store(0, Ordering::Relaxed);
        self.handoff_drops.store(0, Ordering::Relaxed);
        self.transport_errors.store(0, Ordering::Relaxed);
        self.rx_timeouts.store(0, Ordering::Relaxed);
        self.commands_sent.store(0, Ordering::Relaxed);
    }
}

/// 指标快照（不可变）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricsSnapshot {
    pub bytes_received: u64,
    pub frames_total: u64,
    pub invalid_responses: u64,
    pub samples_accepted: u64,
    pub samples_rejected: u64,
    pub resyncs: u64,
    pub overflows: u64,
    pub backoffs: u64,
    pub handoff_drops: u64,
    pub transport_errors: u64,
    pub rx_timeouts: u64,
    pub commands_sent: u64,
}

impl MetricsSnapshot {
    /// 无效帧占比（百分比）
    ///
    /// 如果 `frames_total` 为 0，返回 0.0。
    pub fn invalid_frame_rate(&self) -> f64 {
        if self.frames_total == 0 {
            return 0.0;
        }
        (self.invalid_responses as f64 / self.frames_total as f64) * 100.0
    }

    /// 测量点接受率（百分比）
    ///
    /// 如果没有任何测量点，返回 0.0。
    pub fn acceptance_rate(&self) -> f64 {
        let total = self.samples_accepted + self.samples_rejected;
        if total == 0 {
            return 0.0;
        }
        (self.samples_accepted as f64 / total as f64) * 100.0
    }
}
