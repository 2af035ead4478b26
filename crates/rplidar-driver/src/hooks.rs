//! 钩子系统（Hook System）
//!
//! 在 RX 线程内同步扇出事件：
//!
//! - `on_sample`: 每个被接受的测量点一次（Express 包中的每个点都会触发），
//!   在向量表更新之后调用
//! - `on_response`: 每个解码出的帧一次，无论是否写入向量表（含 `Invalid`）
//!
//! 不做缓冲与重放。回调在 RX 线程中执行，必须快速返回；需要耗时处理时
//! 使用 [`ChannelHook`] 把事件转交给其他线程。
//!
//! # 使用示例
//!
//! ```rust
//! use rplidar_driver::hooks::{ChannelHook, HookManager, LidarCallback, LidarEvent};
//! use std::sync::Arc;
//!
//! let mut hooks = HookManager::new();
//! let (hook, rx) = ChannelHook::new(1024);
//! hooks.add_callback(Arc::new(hook) as Arc<dyn LidarCallback>);
//! assert_eq!(hooks.len(), 1);
//! assert!(rx.try_recv().is_err());
//! ```

use crate::sample::ScanSample;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use rplidar_protocol::Response;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// 雷达事件回调
///
/// # 性能要求
///
/// - 在 RX 线程中同步调用，阻塞会直接拖慢解析
/// - 推荐使用 `crossbeam_channel::Sender::try_send` 转交
pub trait LidarCallback: Send + Sync {
    /// 测量点已写入向量表
    fn on_sample(&self, sample: &ScanSample) {
        let _ = sample;
    }

    /// 解码出一个帧
    fn on_response(&self, response: &Response) {
        let _ = response;
    }
}

/// 钩子管理器
///
/// 回调列表本身不是线程安全的，需要外部同步（通常通过 `RwLock<HookManager>`）。
#[derive(Default)]
pub struct HookManager {
    callbacks: Vec<Arc<dyn LidarCallback>>,
}

impl HookManager {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    /// 添加回调（按添加顺序触发）
    pub fn add_callback(&mut self, callback: Arc<dyn LidarCallback>) {
        self.callbacks.push(callback);
    }

    /// 移除所有回调
    pub fn clear(&mut self) {
        self.callbacks.clear();
    }

    pub fn trigger_sample(&self, sample: &ScanSample) {
        for callback in self.callbacks.iter() {
            callback.on_sample(sample);
        }
    }

    pub fn trigger_response(&self, response: &Response) {
        for callback in self.callbacks.iter() {
            callback.on_response(response);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

/// 通过通道转交的事件
#[derive(Debug, Clone, PartialEq)]
pub enum LidarEvent {
    Sample(ScanSample),
    Response(Response),
}

/// 基于有界通道的回调
///
/// 队列满时丢弃事件而不是阻塞 RX 线程，丢弃数量见 [`ChannelHook::dropped`]。
pub struct ChannelHook {
    tx: Sender<LidarEvent>,
    forward_responses: bool,
    dropped: Arc<AtomicU64>,
}

impl ChannelHook {
    /// 转交测量点与应答
    #[must_use]
    pub fn new(capacity: usize) -> (Self, Receiver<LidarEvent>) {
        Self::build(capacity, true)
    }

    /// 只转交测量点
    #[must_use]
    pub fn samples_only(capacity: usize) -> (Self, Receiver<LidarEvent>) {
        Self::build(capacity, false)
    }

    fn build(capacity: usize, forward_responses: bool) -> (Self, Receiver<LidarEvent>) {
        let (tx, rx) = bounded(capacity);
        let hook = Self {
            tx,
            forward_responses,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (hook, rx)
    }

    /// 丢弃计数器
    pub fn dropped(&self) -> &Arc<AtomicU64> {
        &self.dropped
    }

    fn forward(&self, event: LidarEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl LidarCallback for ChannelHook {
    fn on_sample(&self, sample: &ScanSample) {
        self.forward(LidarEvent::Sample(*sample));
    }

    fn on_response(&self, response: &Response) {
        if self.forward_responses {
            self.forward(LidarEvent::Response(response.clone()));
        }
    }
}
