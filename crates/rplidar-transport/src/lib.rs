//! # RPLIDAR Transport Layer
//!
//! 字节流传输抽象层。扫描仪只需要"能读到一些字节、能写出一些字节"的通道，
//! 读到的字节可能在任意位置被切分。
//!
//! - `serial`: 串口（serialport）
//! - `tcp`: TCP 串口服务器 / 网络版雷达
//! - `mock`: 内存模拟设备（`mock` feature 或测试）

use std::time::Duration;
use thiserror::Error;

pub mod serial;

pub use serial::{SerialConfig, SerialRx, SerialTransport, SerialTx};

pub mod tcp;

pub use tcp::{TcpRx, TcpTransport, TcpTx};

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockHandle, MockRx, MockTransport, MockTx};

/// 传输层统一错误类型
#[derive(Error, Debug)]
pub enum TransportError {
    /// 底层 IO 错误
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    /// 读取超时（非致命，可以重试）
    #[error("Read timeout")]
    Timeout,

    /// 对端关闭或设备断开（致命）
    #[error("Transport closed")]
    Closed,

    /// 不支持的配置或操作
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl TransportError {
    /// 是否为致命错误（会话必须结束）
    pub fn is_fatal(&self) -> bool {
        match self {
            TransportError::Timeout => false,
            TransportError::Closed => true,
            TransportError::Unsupported(_) => false,
            TransportError::Io(e) => !matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),
        }
    }
}

/// 双向字节流
///
/// `read` 的约定：
/// - 返回 `Ok(n)` 且 `n > 0`
/// - 无数据时返回 `Err(TransportError::Timeout)`
/// - 对端关闭时返回 `Err(TransportError::Closed)`
pub trait LidarTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;
    fn set_receive_timeout(&mut self, _timeout: Duration) -> Result<(), TransportError> {
        Ok(())
    }
    fn receive_timeout(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        self.set_receive_timeout(timeout)?;
        self.read(buf)
    }
    fn try_read(&mut self, buf: &mut [u8]) -> Result<Option<usize>, TransportError> {
        match self.read(buf) {
            Ok(n) => Ok(Some(n)),
            Err(TransportError::Timeout) => Ok(None),
            Err(e) => Err(e),
        }
    }
    /// 设置 DTR 线（A1 系列用 DTR 控制电机），默认忽略
    fn set_dtr(&mut self, _level: bool) -> Result<(), TransportError> {
        Ok(())
    }
    /// 描述（用于日志）
    fn describe(&self) -> String {
        "transport".to_string()
    }
}

pub trait RxTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;
}

pub trait TxTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
    fn set_dtr(&mut self, _level: bool) -> Result<(), TransportError> {
        Ok(())
    }
}

/// 可分离为独立 RX / TX 半边的传输（用于双线程驱动）
pub trait SplittableTransport: LidarTransport {
    type Rx: RxTransport;
    type Tx: TxTransport;
    fn split(self) -> Result<(Self::Rx, Self::Tx), TransportError>;
}
