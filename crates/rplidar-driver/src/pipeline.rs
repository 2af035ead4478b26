//! Pipeline IO 循环模块
//!
//! 后台 RX 线程读取字节并驱动 [`ScanProcessor`]，TX 线程从命令队列取请求写出。

use crate::metrics::LidarMetrics;
use crate::processor::ScanProcessor;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use rplidar_protocol::CommandBytes;
use rplidar_transport::{RxTransport, TransportError, TxTransport};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, trace};

/// Pipeline 配置
///
/// # Example
///
/// ```
/// use rplidar_driver::PipelineConfig;
///
/// let config = PipelineConfig {
///     receive_timeout_ms: 50,
///     ..Default::default()
/// };
/// assert_eq!(config.read_chunk_size, 4096);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PipelineConfig {
    /// 传输读超时（毫秒），也是 RX 线程检查退出标志的间隔
    pub receive_timeout_ms: u64,
    /// 单次读取的最大字节数
    pub read_chunk_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            receive_timeout_ms: 20,
            read_chunk_size: 4096,
        }
    }
}

impl PipelineConfig {
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms.max(1))
    }
}

/// TX 线程的请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxRequest {
    /// 写出一个命令包
    Command(CommandBytes),
    /// 设置 DTR 电平（A1 电机控制）
    Dtr(bool),
}

/// RX 线程主循环
///
/// # 参数
/// - `rx`: RX 半边（只读）
/// - `processor`: 扫描处理器（RX 线程独占）
/// - `config`: Pipeline 配置
/// - `is_running`: 运行标志（用于生命周期联动）
/// - `reset_requested`: 其他线程请求解析器复位（Stop / Reset 之后）
/// - `metrics`: 性能指标
pub fn rx_loop(
    mut rx: impl RxTransport,
    mut processor: ScanProcessor,
    config: PipelineConfig,
    is_running: Arc<AtomicBool>,
    reset_requested: Arc<AtomicBool>,
    metrics: Arc<LidarMetrics>,
) {
    let mut buf = vec![0u8; config.read_chunk_size.max(1)];

    loop {
        // Acquire: If we see false, we must see all cleanup writes from other threads
        if !is_running.load(Ordering::Acquire) {
            trace!("RX thread: is_running flag is false, exiting");
            break;
        }

        // 复位由 RX 线程自己执行，与解析串行
        if reset_requested.swap(false, Ordering::AcqRel) {
            processor.reset();
        }

        let n = match rx.read(&mut buf) {
            Ok(n) => n,
            Err(TransportError::Timeout) => {
                metrics.rx_timeouts.fetch_add(1, Ordering::Relaxed);
                continue;
            },
            Err(e) => {
                error!("RX thread: transport read error: {}", e);
                metrics.transport_errors.fetch_add(1, Ordering::Relaxed);

                if e.is_fatal() {
                    error!("RX thread: Fatal error detected, setting is_running = false");
                    // Release: All writes before this are visible to threads that see the false value
                    is_running.store(false, Ordering::Release);
                    break;
                }
                continue;
            },
        };

        // 读取期间到达的复位请求作用于本次数据之前
        if reset_requested.swap(false, Ordering::AcqRel) {
            processor.reset();
        }

        processor.feed(&buf[..n]);
    }

    trace!("RX thread: loop exited");
}

/// TX 线程主循环
///
/// # 参数
/// - `tx`: TX 半边（只写）
/// - `cmd_rx`: 命令队列接收端
/// - `is_running`: 运行标志（用于生命周期联动）
/// - `metrics`: 性能指标
pub fn tx_loop(
    mut tx: impl TxTransport,
    cmd_rx: Receiver<TxRequest>,
    is_running: Arc<AtomicBool>,
    metrics: Arc<LidarMetrics>,
) {
    loop {
        // Acquire: If we see false, we must see all cleanup writes from other threads
        if !is_running.load(Ordering::Acquire) {
            trace!("TX thread: is_running flag is false, exiting");
            break;
        }

        let request = match cmd_rx.recv_timeout(Duration::from_millis(20)) {
            Ok(request) => request,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                trace!("TX thread: command channel disconnected");
                break;
            },
        };

        let result = match &request {
            TxRequest::Command(bytes) => tx.write_all(bytes),
            TxRequest::Dtr(level) => tx.set_dtr(*level),
        };

        match result {
            Ok(()) => {
                if let TxRequest::Command(bytes) = &request {
                    metrics.commands_sent.fetch_add(1, Ordering::Relaxed);
                    debug!("TX thread: sent command 0x{:02X}", bytes.get(1).copied().unwrap_or(0));
                }
            },
            Err(e) => {
                error!("TX thread: Failed to write request: {}", e);
                metrics.transport_errors.fetch_add(1, Ordering::Relaxed);

                if e.is_fatal() {
                    error!("TX thread: Fatal error detected, setting is_running = false");
                    // Release: All writes before this are visible to threads that see the false value
                    is_running.store(false, Ordering::Release);
                    break;
                }
            },
        }
    }

    trace!("TX thread: loop exited");
}
