//! # RPLIDAR Protocol
//!
//! 2D 激光雷达（RPLIDAR）串行协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `ids`: 命令码与应答类型常量
//! - `header`: 应答帧头（长度/模式/类型）位域
//! - `command`: 请求包构建
//! - `response`: 应答负载解析
//! - `capsule`: Express / Ultra Express 压缩测量包解析
//! - `varbitscale`: 可变位宽缩放（scale-bucket）编解码
//!
//! ## 字节序
//!
//! 协议使用小端字节序（LSB 在前）。
//!
//! ## 帧格式
//!
//! ```text
//! [0xA5][0x5A][4 字节: length(14 bit) + mode(2 bit)][type][payload: length 字节]
//! ```

pub mod capsule;
pub mod command;
pub mod header;
pub mod ids;
pub mod response;
pub mod varbitscale;

// 重新导出常用类型
pub use capsule::*;
pub use command::*;
pub use header::*;
pub use ids::*;
pub use response::*;

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid payload length for {kind}: expected {expected}, got {actual}")]
    InvalidLength {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid sync nibbles: 0x{first:02X} 0x{second:02X}")]
    InvalidSync { first: u8, second: u8 },

    #[error("Checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: &'static str, value: u32 },

    #[error("Payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },
}

/// 小端字节序转 u16
#[inline]
pub fn bytes_to_u16_le(bytes: [u8; 2]) -> u16 {
    u16::from_le_bytes(bytes)
}

/// 小端字节序转 u32
#[inline]
pub fn bytes_to_u32_le(bytes: [u8; 4]) -> u32 {
    u32::from_le_bytes(bytes)
}

/// 从切片指定偏移读取 u16（小端）
///
/// 调用方保证 `offset + 2 <= data.len()`。
#[inline]
pub(crate) fn read_u16_le(data: &[u8], offset: usize) -> u16 {
    bytes_to_u16_le([data[offset], data[offset + 1]])
}

/// 从切片指定偏移读取 u32（小端）
#[inline]
pub(crate) fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    bytes_to_u32_le([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// 计算 XOR 校验和
pub fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc ^ b)
}
