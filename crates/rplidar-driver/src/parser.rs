//! 帧解析状态机
//!
//! 从任意切分的字节流中提取完整的应答帧（帧头 + 负载），不关心负载语义。
//!
//! ```text
//! Sync ──0xA5──▶ StartFlag ──0x5A──▶ LengthModeAndType ──┬─ Single ─▶ SingleResponse ─▶ Sync
//!   ▲                │ 其他字节                           ├─ Multi ──▶ MultiResponse ◀─┐
//!   └────────────────┘（从该字节重新同步）                 └─ Reserved ─▶ 清空 ─▶ Sync │
//!                                                           MultiResponse ──每帧──────┘
//! ```
//!
//! 每个状态一个 step 函数，返回 `Step::Completed` 时继续驱动，`Step::NeedMoreData`
//! 时停止并压缩缓冲区。对 1 字节与大块输入的结果完全一致。

use crate::buffer::ReceiveBuffer;
use rplidar_protocol::{
    FrameHeader, HEADER_BODY_LEN, ResponseMode, ResponseType, START_FLAG, SYNC_BYTE,
};
use tracing::{debug, trace, warn};

/// 解析器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// 寻找同步字节 0xA5
    Sync,
    /// 期待起始标志 0x5A
    StartFlag,
    /// 等待 5 字节的长度/模式/类型
    LengthModeAndType,
    /// 等待单次应答的负载
    SingleResponse,
    /// 流模式：连续等待同一帧头描述的负载
    MultiResponse,
}

/// 接收方对一帧的判定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
    /// 帧已处理
    Accept,
    /// 类型正确但内容不合法（流模式下触发回退重对齐）
    Misaligned,
    /// 类型无法识别，帧头是伪造的
    Unrecognized,
}

/// 重新同步的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResyncReason {
    /// 同步字节后不是起始标志
    MissingStartFlag,
    /// 帧头模式为保留值
    ReservedMode,
    /// 流模式帧头声明长度为 0
    ZeroLength,
    /// 流模式下帧内容不合法，游标回退
    Backoff,
    /// 帧类型无法识别
    Unrecognized,
    /// 缓冲区已满且无法继续解析
    Overflow,
}

/// 帧接收方
pub trait FrameSink {
    /// 收到一个完整帧
    fn on_frame(&mut self, header: &FrameHeader, payload: &[u8]) -> FrameDisposition;

    /// 收到流模式帧头，随后的帧属于一个新启动的测量流（默认忽略）
    fn on_stream_start(&mut self, header: &FrameHeader) {
        let _ = header;
    }

    /// 发生重新同步（默认忽略）
    fn on_resync(&mut self, reason: ResyncReason) {
        let _ = reason;
    }
}

enum Step {
    NeedMoreData,
    Completed,
}

/// 帧解析器
pub struct FrameParser {
    buffer: ReceiveBuffer,
    state: ParserState,
    /// `SingleResponse` / `MultiResponse` 状态下的当前帧头
    header: Option<FrameHeader>,
}

impl FrameParser {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: ReceiveBuffer::new(capacity),
            state: ParserState::Sync,
            header: None,
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// 当前帧头（仅在负载状态下存在）
    pub fn header(&self) -> Option<&FrameHeader> {
        self.header.as_ref()
    }

    /// 缓冲中尚未消费的字节数
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// 丢弃缓冲并回到 `Sync`
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = ParserState::Sync;
        self.header = None;
    }

    /// 假定设备已在推送 `kind` 类型的测量流
    ///
    /// 直接进入 `MultiResponse`，帧头由该类型的负载长度合成，对齐依靠回退重同步。
    pub fn force_streaming(&mut self, kind: ResponseType) {
        self.buffer.clear();
        self.header = Some(FrameHeader {
            length: kind.payload_len() as u16,
            mode: ResponseMode::MultiResponse,
            response_type: kind.into(),
        });
        self.state = ParserState::MultiResponse;
        debug!("Parser forced into {:?} stream", kind);
    }

    /// 输入一段字节
    ///
    /// 放不下的部分分窗追加；只有缓冲区已满且没有任何状态能继续推进时才判定溢出。
    pub fn feed<S: FrameSink>(&mut self, mut bytes: &[u8], sink: &mut S) {
        while !bytes.is_empty() {
            let appended = self.buffer.append(bytes);
            bytes = &bytes[appended..];

            self.run(sink);
            self.buffer.compact();

            if !bytes.is_empty() && self.buffer.is_full() {
                warn!(
                    "Receive buffer overflow ({} bytes) in state {:?}, resyncing",
                    self.buffer.capacity(),
                    self.state
                );
                self.reset();
                sink.on_resync(ResyncReason::Overflow);
            }
        }
    }

    fn run<S: FrameSink>(&mut self, sink: &mut S) {
        loop {
            let step = match self.state {
                ParserState::Sync => self.step_sync(),
                ParserState::StartFlag => self.step_start_flag(sink),
                ParserState::LengthModeAndType => self.step_length_mode_and_type(sink),
                ParserState::SingleResponse => self.step_single_response(sink),
                ParserState::MultiResponse => self.step_multi_response(sink),
            };
            if let Step::NeedMoreData = step {
                break;
            }
        }
    }

    fn step_sync(&mut self) -> Step {
        match self.buffer.unread().iter().position(|&b| b == SYNC_BYTE) {
            Some(index) => {
                self.buffer.consume(index + 1);
                self.state = ParserState::StartFlag;
                Step::Completed
            },
            None => {
                // 非同步字节永远不会成为帧的开头
                let junk = self.buffer.len();
                self.buffer.consume(junk);
                Step::NeedMoreData
            },
        }
    }

    fn step_start_flag<S: FrameSink>(&mut self, sink: &mut S) -> Step {
        let Some(&[byte]) = self.buffer.peek(1) else {
            return Step::NeedMoreData;
        };
        if byte == START_FLAG {
            self.buffer.consume(1);
            self.state = ParserState::LengthModeAndType;
        } else {
            // 不消费该字节，Sync 从这里重新寻找
            trace!("Expected start flag, got 0x{:02X}", byte);
            self.state = ParserState::Sync;
            sink.on_resync(ResyncReason::MissingStartFlag);
        }
        Step::Completed
    }

    fn step_length_mode_and_type<S: FrameSink>(&mut self, sink: &mut S) -> Step {
        let Some(body) = self.buffer.peek(HEADER_BODY_LEN) else {
            return Step::NeedMoreData;
        };
        let mut raw = [0u8; HEADER_BODY_LEN];
        raw.copy_from_slice(body);
        let header = FrameHeader::parse(&raw);

        match header.mode {
            ResponseMode::SingleResponse => {
                self.buffer.consume(HEADER_BODY_LEN);
                self.header = Some(header);
                self.state = ParserState::SingleResponse;
            },
            ResponseMode::MultiResponse if header.length == 0 => {
                warn!(
                    "Stream header for type 0x{:02X} has zero length, resyncing",
                    header.response_type
                );
                self.buffer.consume(HEADER_BODY_LEN);
                self.state = ParserState::Sync;
                sink.on_resync(ResyncReason::ZeroLength);
            },
            ResponseMode::MultiResponse => {
                self.buffer.consume(HEADER_BODY_LEN);
                debug!(
                    "Entering stream of type 0x{:02X} ({} bytes per frame)",
                    header.response_type, header.length
                );
                self.header = Some(header);
                self.state = ParserState::MultiResponse;
                sink.on_stream_start(&header);
            },
            ResponseMode::Reserved1 | ResponseMode::Reserved2 => {
                warn!("Reserved response mode in header {:02X?}, flushing buffer", raw);
                self.reset();
                sink.on_resync(ResyncReason::ReservedMode);
            },
        }
        Step::Completed
    }

    fn step_single_response<S: FrameSink>(&mut self, sink: &mut S) -> Step {
        let Some(header) = self.header else {
            self.state = ParserState::Sync;
            return Step::Completed;
        };
        let length = header.length as usize;
        let Some(payload) = self.buffer.peek(length) else {
            return Step::NeedMoreData;
        };

        let disposition = sink.on_frame(&header, payload);
        self.buffer.consume(length);
        self.header = None;
        self.state = ParserState::Sync;
        if disposition == FrameDisposition::Unrecognized {
            sink.on_resync(ResyncReason::Unrecognized);
        }
        Step::Completed
    }

    fn step_multi_response<S: FrameSink>(&mut self, sink: &mut S) -> Step {
        let Some(header) = self.header else {
            self.state = ParserState::Sync;
            return Step::Completed;
        };
        let length = header.length as usize;
        let Some(payload) = self.buffer.peek(length) else {
            return Step::NeedMoreData;
        };

        match sink.on_frame(&header, payload) {
            FrameDisposition::Accept => {
                self.buffer.consume(length);
            },
            FrameDisposition::Misaligned => {
                warn!(
                    "Invalid 0x{:02X} frame in stream, backing off {} bytes",
                    header.response_type,
                    length - 1
                );
                self.buffer.consume(length);
                self.buffer.rewind(length - 1);
                sink.on_resync(ResyncReason::Backoff);
            },
            FrameDisposition::Unrecognized => {
                // 负载区可能包含真正的帧头，不消费，从这里重新同步
                warn!(
                    "Unrecognized stream type 0x{:02X}, resyncing",
                    header.response_type
                );
                self.header = None;
                self.state = ParserState::Sync;
                sink.on_resync(ResyncReason::Unrecognized);
            },
        }
        Step::Completed
    }
}
