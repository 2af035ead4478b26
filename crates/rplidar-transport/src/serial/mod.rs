//! 串口传输
//!
//! 基于 `serialport`，8N1、无流控，任意波特率（A2M8 为 115200，A3/S 系列为 256000）。
//! RX/TX 分离基于 `SerialPort::try_clone()`，两个半边共享同一个设备，
//! 读超时各自独立。

use crate::{LidarTransport, RxTransport, SplittableTransport, TransportError, TxTransport};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, trace};

/// 串口配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// 波特率（A1/A2M8 为 115200，A3/S1 为 256000）
    pub baud_rate: u32,
    /// 读超时
    pub read_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            read_timeout: Duration::from_millis(20),
        }
    }
}

fn serial_error(e: serialport::Error) -> TransportError {
    TransportError::Io(std::io::Error::from(e))
}

fn read_available(port: &mut dyn SerialPort, buf: &mut [u8]) -> Result<usize, TransportError> {
    match port.read(buf) {
        // 读超时内有数据却读到 0 字节：设备已拔出
        Ok(0) => Err(TransportError::Closed),
        Ok(n) => Ok(n),
        Err(e)
            if matches!(
                e.kind(),
                ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
            ) =>
        {
            Err(TransportError::Timeout)
        },
        Err(e) if e.kind() == ErrorKind::BrokenPipe => Err(TransportError::Closed),
        Err(e) => Err(TransportError::Io(e)),
    }
}

/// 串口传输
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    path: PathBuf,
    config: SerialConfig,
}

impl SerialTransport {
    /// 打开并配置串口
    ///
    /// # 错误
    /// - `TransportError::Io`: 打开或配置失败
    pub fn open(path: impl AsRef<Path>, config: SerialConfig) -> Result<Self, TransportError> {
        let path = path.as_ref().to_path_buf();
        let port = serialport::new(path.to_string_lossy(), config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(config.read_timeout)
            .open()
            .map_err(serial_error)?;

        debug!("Serial port {} opened at {} baud", path.display(), config.baud_rate);
        Ok(Self { port, path, config })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 丢弃内核中尚未读取的数据
    pub fn flush_input(&self) -> Result<(), TransportError> {
        self.port.clear(ClearBuffer::Input).map_err(serial_error)
    }
}

impl LidarTransport for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(bytes)?;
        trace!("Serial TX {} bytes", bytes.len());
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        read_available(self.port.as_mut(), buf)
    }

    fn set_receive_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.port.set_timeout(timeout).map_err(serial_error)?;
        self.config.read_timeout = timeout;
        Ok(())
    }

    fn set_dtr(&mut self, level: bool) -> Result<(), TransportError> {
        self.port.write_data_terminal_ready(level).map_err(serial_error)
    }

    fn describe(&self) -> String {
        format!("serial://{}@{}", self.path.display(), self.config.baud_rate)
    }
}

pub struct SerialRx {
    port: Box<dyn SerialPort>,
}

impl RxTransport for SerialRx {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        read_available(self.port.as_mut(), buf)
    }
}

pub struct SerialTx {
    port: Box<dyn SerialPort>,
}

impl TxTransport for SerialTx {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(bytes)?;
        Ok(())
    }

    fn set_dtr(&mut self, level: bool) -> Result<(), TransportError> {
        self.port.write_data_terminal_ready(level).map_err(serial_error)
    }
}

impl SplittableTransport for SerialTransport {
    type Rx = SerialRx;
    type Tx = SerialTx;

    fn split(self) -> Result<(Self::Rx, Self::Tx), TransportError> {
        let tx_port = self.port.try_clone().map_err(serial_error)?;
        Ok((SerialRx { port: self.port }, SerialTx { port: tx_port }))
    }
}
