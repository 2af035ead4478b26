//! 应答帧头定义
//!
//! 应答描述符紧跟在 `0xA5 0x5A` 之后：
//!
//! ```text
//! Byte 0-3: u32 小端，Bit 0-13 = length，Bit 30-31 = mode
//! Byte 4:   type
//! ```
//!
//! Bit 14-29 在本实现中忽略（长度最大 14 bit）。

use crate::ids::{HEADER_BODY_LEN, MAX_FRAME_LENGTH, START_FLAG, SYNC_BYTE};
use crate::{ProtocolError, read_u32_le};
use bilge::prelude::*;

/// 应答模式（2 bit）
#[bitsize(2)]
#[derive(FromBits, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// 单次请求，单次应答（完成后回到 Sync）
    SingleResponse = 0x0,
    /// 单次请求，连续应答（测量流，持续分帧）
    MultiResponse = 0x1,
    /// 保留（视为数据损坏）
    Reserved1 = 0x2,
    /// 保留（视为数据损坏）
    Reserved2 = 0x3,
}

impl ResponseMode {
    /// 是否为保留模式
    pub fn is_reserved(self) -> bool {
        matches!(self, ResponseMode::Reserved1 | ResponseMode::Reserved2)
    }
}

/// 长度/模式字（Byte 0-3）
///
/// bilge 默认 LSB first，与协议位序一致。
#[bitsize(32)]
#[derive(FromBits, DebugBits, Clone, Copy)]
pub struct LengthModeWord {
    pub length: u14,   // Bit 0-13: 负载长度
    pub reserved: u16, // Bit 14-29: 忽略
    pub mode: ResponseMode, // Bit 30-31: 应答模式
}

/// 应答帧头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// 负载长度（字节）
    pub length: u16,
    /// 应答模式
    pub mode: ResponseMode,
    /// 应答类型标签（原始值，未知类型由解码器处理）
    pub response_type: u8,
}

impl FrameHeader {
    /// 创建帧头
    ///
    /// # 错误
    /// - `ProtocolError::PayloadTooLarge`: `length` 超过 14 bit
    pub fn new(
        length: usize,
        mode: ResponseMode,
        response_type: impl Into<u8>,
    ) -> Result<Self, ProtocolError> {
        if length > MAX_FRAME_LENGTH {
            return Err(ProtocolError::PayloadTooLarge {
                len: length,
                max: MAX_FRAME_LENGTH,
            });
        }
        Ok(Self {
            length: length as u16,
            mode,
            response_type: response_type.into(),
        })
    }

    /// 从 5 字节描述符体解析（不含 SYNC/START_FLAG）
    pub fn parse(body: &[u8; HEADER_BODY_LEN]) -> Self {
        let word = LengthModeWord::from(u32::new(read_u32_le(body, 0)));
        Self {
            length: word.length().value(),
            mode: word.mode(),
            response_type: body[4],
        }
    }

    /// 编码为 5 字节描述符体
    pub fn encode(&self) -> [u8; HEADER_BODY_LEN] {
        // `reserved` 字段由 bilge 视为填充位，不出现在构造参数中，编码为 0
        let word = LengthModeWord::new(u14::new(self.length & MAX_FRAME_LENGTH as u16), self.mode);
        let raw = u32::from(word).value().to_le_bytes();
        [raw[0], raw[1], raw[2], raw[3], self.response_type]
    }

    /// 编码为完整描述符（含 `0xA5 0x5A`）
    pub fn to_descriptor(&self) -> [u8; HEADER_BODY_LEN + 2] {
        let body = self.encode();
        let mut out = [0u8; HEADER_BODY_LEN + 2];
        out[0] = SYNC_BYTE;
        out[1] = START_FLAG;
        out[2..].copy_from_slice(&body);
        out
    }
}

/// 将帧头与负载拼接为完整的线上字节序列
///
/// 主要用于模拟设备与测试。
///
/// # 错误
/// - `ProtocolError::PayloadTooLarge`: 负载超过 14 bit 长度
pub fn encode_frame(
    mode: ResponseMode,
    response_type: impl Into<u8>,
    payload: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    let header = FrameHeader::new(payload.len(), mode, response_type)?;
    let mut out = Vec::with_capacity(HEADER_BODY_LEN + 2 + payload.len());
    out.extend_from_slice(&header.to_descriptor());
    out.extend_from_slice(payload);
    Ok(out)
}
