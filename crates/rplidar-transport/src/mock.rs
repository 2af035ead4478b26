//! 内存模拟设备
//!
//! `MockTransport` 与 `MockHandle` 共享同一个队列：测试端通过 handle 注入
//! 设备发出的字节、读取驱动发送的命令，也可以挂一个应答器自动回复命令。

use crate::{LidarTransport, RxTransport, SplittableTransport, TransportError, TxTransport};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

/// 默认读超时
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(5);

#[derive(Default)]
struct State {
    rx_chunks: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    closed: bool,
    dtr: Option<bool>,
    responder: Option<Responder>,
}

struct Shared {
    state: Mutex<State>,
    readable: Condvar,
}

impl Shared {
    fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        let mut state = self.state.lock();
        if state.rx_chunks.is_empty() && !state.closed {
            let _ = self.readable.wait_for(&mut state, timeout);
        }

        let Some(mut chunk) = state.rx_chunks.pop_front() else {
            return Err(if state.closed {
                TransportError::Closed
            } else {
                TransportError::Timeout
            });
        };

        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            chunk.drain(..n);
            state.rx_chunks.push_front(chunk);
        }
        Ok(n)
    }

    fn write(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        state.sent.push(bytes.to_vec());
        let reply = state.responder.as_mut().and_then(|responder| responder(bytes));
        if let Some(reply) = reply
            && !reply.is_empty()
        {
            state.rx_chunks.push_back(reply);
            self.readable.notify_all();
        }
        Ok(())
    }
}

/// 测试端句柄
#[derive(Clone)]
pub struct MockHandle {
    shared: Arc<Shared>,
}

impl MockHandle {
    /// 注入设备发出的字节（作为一个读块）
    pub fn push_rx(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.shared.state.lock().rx_chunks.push_back(bytes.to_vec());
        self.shared.readable.notify_all();
    }

    /// 按固定块大小注入（模拟任意切分）
    pub fn push_rx_chunked(&self, bytes: &[u8], chunk_size: usize) {
        let chunk_size = chunk_size.max(1);
        let mut state = self.shared.state.lock();
        for chunk in bytes.chunks(chunk_size) {
            state.rx_chunks.push_back(chunk.to_vec());
        }
        self.shared.readable.notify_all();
    }

    /// 尚未被读取的字节数
    pub fn pending_rx(&self) -> usize {
        self.shared.state.lock().rx_chunks.iter().map(Vec::len).sum()
    }

    /// 已发送的写入（每次 `write_all` 一项）
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.shared.state.lock().sent.clone()
    }

    /// 取出并清空已发送的写入
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.shared.state.lock().sent)
    }

    /// 最近一次设置的 DTR 电平
    pub fn dtr(&self) -> Option<bool> {
        self.shared.state.lock().dtr
    }

    /// 设置命令应答器：每次写入后调用，返回的字节被追加到读队列
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        self.shared.state.lock().responder = Some(Box::new(responder));
    }

    /// 模拟对端关闭（读完剩余数据后返回 `Closed`）
    pub fn close(&self) {
        self.shared.state.lock().closed = true;
        self.shared.readable.notify_all();
    }
}

/// 模拟传输
pub struct MockTransport {
    shared: Arc<Shared>,
    read_timeout: Duration,
}

impl MockTransport {
    pub fn new() -> (Self, MockHandle) {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            readable: Condvar::new(),
        });
        (
            Self {
                shared: shared.clone(),
                read_timeout: DEFAULT_READ_TIMEOUT,
            },
            MockHandle { shared },
        )
    }
}

impl LidarTransport for MockTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.shared.write(bytes)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.shared.read(buf, self.read_timeout)
    }

    fn set_receive_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.read_timeout = timeout;
        Ok(())
    }

    fn set_dtr(&mut self, level: bool) -> Result<(), TransportError> {
        self.shared.state.lock().dtr = Some(level);
        Ok(())
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

pub struct MockRx {
    shared: Arc<Shared>,
    read_timeout: Duration,
}

impl RxTransport for MockRx {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.shared.read(buf, self.read_timeout)
    }
}

pub struct MockTx {
    shared: Arc<Shared>,
}

impl TxTransport for MockTx {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.shared.write(bytes)
    }

    fn set_dtr(&mut self, level: bool) -> Result<(), TransportError> {
        self.shared.state.lock().dtr = Some(level);
        Ok(())
    }
}

impl SplittableTransport for MockTransport {
    type Rx = MockRx;
    type Tx = MockTx;

    fn split(self) -> Result<(Self::Rx, Self::Tx), TransportError> {
        Ok((
            MockRx {
                shared: self.shared.clone(),
                read_timeout: self.read_timeout,
            },
            MockTx {
                shared: self.shared,
            },
        ))
    }
}
