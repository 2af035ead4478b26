//! 测试辅助函数
//!
//! 帧构造、带事件记录的处理器、按块喂数据。
#![allow(dead_code)]

use crossbeam_channel::Receiver;
use rplidar_sdk::prelude::*;
use rplidar_sdk::protocol::{FrameHeader, ResponseMode, encode_frame};
use std::sync::Arc;
use std::time::Instant;

/// 单次应答模式的标准测量帧
pub fn scan_frame(scan: &ScanResponse) -> Vec<u8> {
    encode_frame(
        ResponseMode::SingleResponse,
        ResponseType::Measurement,
        &scan.encode(),
    )
    .unwrap()
}

/// 流模式帧头（7 字节描述符）
pub fn stream_descriptor(kind: ResponseType) -> Vec<u8> {
    FrameHeader::new(kind.payload_len(), ResponseMode::MultiResponse, kind)
        .unwrap()
        .to_descriptor()
        .to_vec()
}

/// 合法的测量点（原始字段）
pub fn raw_scan(angle_q6: u16, distance_q2: u32, quality: u8, sync: bool) -> ScanResponse {
    ScanResponse {
        angle_q6,
        distance_q2,
        quality,
        sync,
        inverse_sync: !sync,
        check_bit: true,
    }
}

/// 处理器 + 事件接收端
pub struct Recorder {
    pub processor: ScanProcessor,
    pub events: Receiver<LidarEvent>,
}

impl Recorder {
    pub fn new(config: ProcessorConfig) -> Self {
        let processor = ScanProcessor::new(config).unwrap();
        let (hook, events) = ChannelHook::new(4096);
        processor
            .context()
            .hooks
            .write()
            .unwrap()
            .add_callback(Arc::new(hook));
        Self { processor, events }
    }

    /// 以给定的块大小序列循环切分输入
    pub fn feed_chunked(&mut self, bytes: &[u8], chunk_sizes: &[usize], now: Instant) {
        let mut rest = bytes;
        let mut sizes = chunk_sizes.iter().cycle();
        while !rest.is_empty() {
            let size = sizes.next().copied().unwrap_or(rest.len()).clamp(1, rest.len());
            let (chunk, tail) = rest.split_at(size);
            self.processor.feed_at(chunk, now);
            rest = tail;
        }
    }

    pub fn responses(&self) -> Vec<Response> {
        self.events
            .try_iter()
            .filter_map(|event| match event {
                LidarEvent::Response(response) => Some(response),
                LidarEvent::Sample(_) => None,
            })
            .collect()
    }

    /// 全部事件（测量点与应答交错，保持顺序）
    pub fn drain(&self) -> Vec<LidarEvent> {
        self.events.try_iter().collect()
    }
}
