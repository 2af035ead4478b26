//! 命令/应答关联
//!
//! 调用方先登记一个等待者，再发送命令，然后在有界交接通道上带超时等待。
//! RX 线程只在存在等待者时才把应答放进通道：
//!
//! - 单次应答帧（设备信息、健康状态、采样周期）
//! - 新启动的测量流的第一帧
//!
//! 稳态流帧不会进入通道。多个等待者按到达顺序竞争，先就绪者先得。

use crate::error::DriverError;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use rplidar_protocol::Response;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::trace;

/// 交接结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandOff {
    /// 已放入通道
    Delivered,
    /// 没有等待者，未放入
    NoWaiter,
    /// 通道已满，丢弃
    Dropped,
}

/// 应答关联器
pub struct ResponseCorrelator {
    tx: Sender<Response>,
    rx: Receiver<Response>,
    waiters: AtomicUsize,
}

impl ResponseCorrelator {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self {
            tx,
            rx,
            waiters: AtomicUsize::new(0),
        }
    }

    pub fn has_waiters(&self) -> bool {
        self.waiters.load(Ordering::Acquire) > 0
    }

    /// 登记等待者
    ///
    /// 必须在发送命令**之前**调用，否则应答可能在登记前到达而不被交接。
    /// 第一个等待者登记时会清掉之前超时的等待者遗留的应答。
    pub fn register(&self) -> ResponseWaiter<'_> {
        if self.waiters.fetch_add(1, Ordering::AcqRel) == 0 {
            let stale = self.rx.try_iter().count();
            if stale > 0 {
                trace!("Discarded {} stale responses", stale);
            }
        }
        ResponseWaiter { correlator: self }
    }

    /// RX 线程调用：有等待者时交接应答
    pub fn offer(&self, response: &Response) -> HandOff {
        if !self.has_waiters() {
            return HandOff::NoWaiter;
        }
        match self.tx.try_send(response.clone()) {
            Ok(()) => HandOff::Delivered,
            Err(TrySendError::Full(_)) => HandOff::Dropped,
            // 收发两端都由本结构持有
            Err(TrySendError::Disconnected(_)) => HandOff::Dropped,
        }
    }

    /// 通道中尚未取走的应答数
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

/// 等待者（RAII：drop 时注销）
pub struct ResponseWaiter<'a> {
    correlator: &'a ResponseCorrelator,
}

impl ResponseWaiter<'_> {
    /// 等待下一个应答
    ///
    /// # 错误
    /// - `DriverError::Timeout`: 超时（命令可能已经生效）
    pub fn wait(&self, timeout: Duration) -> Result<Response, DriverError> {
        match self.correlator.rx.recv_timeout(timeout) {
            Ok(response) => Ok(response),
            Err(RecvTimeoutError::Timeout) => Err(DriverError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(DriverError::ChannelClosed),
        }
    }

    /// 等待指定类型的应答，其他应答被跳过
    pub fn wait_for_type(
        &self,
        response_type: impl Into<u8>,
        timeout: Duration,
    ) -> Result<Response, DriverError> {
        let expected = response_type.into();
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(DriverError::Timeout);
            }
            let response = self.wait(remaining)?;
            if response.response_type() == expected {
                return Ok(response);
            }
            trace!(
                "Skipping response 0x{:02X} while waiting for 0x{:02X}",
                response.response_type(),
                expected
            );
        }
    }
}

impl Drop for ResponseWaiter<'_> {
    fn drop(&mut self) {
        self.correlator.waiters.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rplidar_protocol::{DeviceHealth, HealthStatus, ResponseType, SampleRate};
    use std::sync::Arc;

    fn health(code: u16) -> Response {
        Response::DeviceHealth(DeviceHealth {
            status: HealthStatus::Ok,
            error_code: code,
        })
    }

    fn rate() -> Response {
        Response::SampleRate(SampleRate {
            standard_us: 500,
            express_us: 250,
        })
    }

    #[test]
    fn test_no_waiter_no_handoff() {
        let correlator = ResponseCorrelator::new(4);
        assert_eq!(correlator.offer(&health(0)), HandOff::NoWaiter);
        assert_eq!(correlator.pending(), 0);
    }

    #[test]
    fn test_waiter_receives_in_order() {
        let correlator = ResponseCorrelator::new(4);
        let waiter = correlator.register();
        assert!(correlator.has_waiters());

        assert_eq!(correlator.offer(&health(1)), HandOff::Delivered);
        assert_eq!(correlator.offer(&health(2)), HandOff::Delivered);
        assert_eq!(waiter.wait(Duration::from_millis(10)).unwrap(), health(1));
        assert_eq!(waiter.wait(Duration::from_millis(10)).unwrap(), health(2));

        drop(waiter);
        assert!(!correlator.has_waiters());
    }

    #[test]
    fn test_wait_timeout() {
        let correlator = ResponseCorrelator::new(4);
        let waiter = correlator.register();
        let start = Instant::now();
        let result = waiter.wait(Duration::from_millis(20));
        assert!(matches!(result, Err(DriverError::Timeout)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_full_channel_drops() {
        let correlator = ResponseCorrelator::new(1);
        let _waiter = correlator.register();
        assert_eq!(correlator.offer(&health(1)), HandOff::Delivered);
        assert_eq!(correlator.offer(&health(2)), HandOff::Dropped);
    }

    #[test]
    fn test_stale_responses_discarded_on_register() {
        let correlator = ResponseCorrelator::new(4);
        {
            let _timed_out = correlator.register();
            correlator.offer(&health(1));
        }
        assert_eq!(correlator.pending(), 1);

        let waiter = correlator.register();
        assert_eq!(correlator.pending(), 0);
        assert!(matches!(
            waiter.wait(Duration::from_millis(5)),
            Err(DriverError::Timeout)
        ));
    }

    #[test]
    fn test_wait_for_type_skips_others() {
        let correlator = ResponseCorrelator::new(4);
        let waiter = correlator.register();
        correlator.offer(&health(7));
        correlator.offer(&rate());

        let response = waiter
            .wait_for_type(ResponseType::SampleRate, Duration::from_millis(20))
            .unwrap();
        assert_eq!(response, rate());

        let result = waiter.wait_for_type(ResponseType::DeviceInfo, Duration::from_millis(10));
        assert!(matches!(result, Err(DriverError::Timeout)));
    }

    #[test]
    fn test_waiter_across_threads() {
        let correlator = Arc::new(ResponseCorrelator::new(4));
        let waiter = correlator.register();

        let producer = correlator.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(5));
            producer.offer(&health(3))
        });

        assert_eq!(waiter.wait(Duration::from_secs(1)).unwrap(), health(3));
        assert_eq!(handle.join().unwrap(), HandOff::Delivered);
    }
}
