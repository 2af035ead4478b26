//! TCP 传输
//!
//! 用于网络版雷达或串口服务器（ser2net 等）。RX/TX 分离基于
//! `TcpStream::try_clone()`，两个半边共享同一个 socket。

use crate::{LidarTransport, RxTransport, SplittableTransport, TransportError, TxTransport};
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, trace};

/// 默认连接超时
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// 默认读超时
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(20);

fn map_read_result(result: std::io::Result<usize>) -> Result<usize, TransportError> {
    match result {
        Ok(0) => Err(TransportError::Closed),
        Ok(n) => Ok(n),
        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
            Err(TransportError::Timeout)
        },
        Err(e) if e.kind() == ErrorKind::Interrupted => Err(TransportError::Timeout),
        Err(e) if matches!(
            e.kind(),
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe
        ) =>
        {
            Err(TransportError::Closed)
        },
        Err(e) => Err(TransportError::Io(e)),
    }
}

/// TCP 传输
pub struct TcpTransport {
    stream: TcpStream,
    peer: SocketAddr,
}

impl TcpTransport {
    /// 连接到 `addr`
    ///
    /// # 错误
    /// - `TransportError::Io`: 解析或连接失败
    pub fn connect(addr: impl ToSocketAddrs, timeout: Duration) -> Result<Self, TransportError> {
        let mut last_error = None;
        for peer in addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&peer, timeout) {
                Ok(stream) => return Self::from_stream(stream),
                Err(e) => {
                    debug!("TCP connect to {} failed: {}", peer, e);
                    last_error = Some(e);
                },
            }
        }
        Err(TransportError::Io(last_error.unwrap_or_else(|| {
            std::io::Error::new(ErrorKind::AddrNotAvailable, "no address resolved")
        })))
    }

    /// 包装已连接的 stream
    pub fn from_stream(stream: TcpStream) -> Result<Self, TransportError> {
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(DEFAULT_READ_TIMEOUT))?;
        let peer = stream.peer_addr()?;
        trace!("TCP transport connected to {}", peer);
        Ok(Self { stream, peer })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl LidarTransport for TcpTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(bytes)?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        map_read_result(self.stream.read(buf))
    }

    fn set_receive_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        // 零超时在 std 中非法，用最小值代替
        let timeout = timeout.max(Duration::from_millis(1));
        self.stream.set_read_timeout(Some(timeout))?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.peer)
    }
}

pub struct TcpRx {
    stream: TcpStream,
}

impl RxTransport for TcpRx {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        map_read_result(self.stream.read(buf))
    }
}

pub struct TcpTx {
    stream: TcpStream,
}

impl TxTransport for TcpTx {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(bytes).map_err(|e| match e.kind() {
            ErrorKind::BrokenPipe | ErrorKind::ConnectionReset => TransportError::Closed,
            _ => TransportError::Io(e),
        })
    }
}

impl SplittableTransport for TcpTransport {
    type Rx = TcpRx;
    type Tx = TcpTx;

    fn split(self) -> Result<(Self::Rx, Self::Tx), TransportError> {
        let tx_stream = self.stream.try_clone()?;
        Ok((TcpRx { stream: self.stream }, TcpTx { stream: tx_stream }))
    }
}
