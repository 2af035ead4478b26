//! 应答负载解析
//!
//! 每种应答类型提供 `TryFrom<&[u8]>`，[`Response::decode`] 把
//! `(type, payload)` 映射到封闭的应答集合；未知类型或长度错误映射为
//! [`Response::Invalid`]，不会向调用方返回错误。

use crate::capsule::{ExpressCapsule, UltraCapsule};
use crate::ids::ResponseType;
use crate::{ProtocolError, read_u16_le};
use bilge::prelude::*;
use num_enum::TryFromPrimitive;

/// 有效测量要求的最低质量（不含）
pub const MIN_ACCEPTED_QUALITY: u8 = 10;

/// 质量字段最大值（6 bit）
pub const MAX_QUALITY: u8 = 0x3F;

/// Express 解压后有回波的点的合成质量
pub const SYNTHESIZED_QUALITY: u8 = 0x2F;

// ============================================================================
// 标准测量点 (0x81)
// ============================================================================

/// 测量点 Byte 0：起始标志、反向起始标志与质量
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct SyncQuality {
    pub sync: bool,         // Bit 0: 新一圈起始
    pub inverse_sync: bool, // Bit 1: 必须等于 !sync
    pub quality: u6,        // Bit 2-7: 信号质量
}

/// 测量点 Byte 1-2：校验位与角度
#[bitsize(16)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct AngleCheck {
    pub check_bit: bool, // Bit 0: 恒为 1
    pub angle_q6: u15,   // Bit 1-15: 角度，单位 1/64 度
}

/// 单个测量点
///
/// 保存原始定点值；物理量通过 `angle_deg()` / `range_m()` 换算。
/// Express / Ultra 解压得到的点也用该类型表示。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanResponse {
    /// 角度（1/64 度）
    pub angle_q6: u16,
    /// 距离（1/4 mm）
    pub distance_q2: u32,
    /// 信号质量（0-63）
    pub quality: u8,
    /// 新一圈起始标志
    pub sync: bool,
    /// 反向起始标志
    pub inverse_sync: bool,
    /// 校验位
    pub check_bit: bool,
}

impl ScanResponse {
    /// 由物理量构造一个合法的测量点
    pub fn new(angle_deg: f64, range_m: f64, quality: u8, sync: bool) -> Self {
        let angle_q6 = (angle_deg.rem_euclid(360.0) * 64.0).round() as u32 % (360 << 6);
        Self {
            angle_q6: angle_q6 as u16,
            distance_q2: (range_m.max(0.0) * 4000.0).round() as u32,
            quality: quality.min(MAX_QUALITY),
            sync,
            inverse_sync: !sync,
            check_bit: true,
        }
    }

    /// 角度（度）
    pub fn angle_deg(&self) -> f64 {
        self.angle_q6 as f64 / 64.0
    }

    /// 距离（米）
    pub fn range_m(&self) -> f64 {
        self.distance_q2 as f64 / 4.0 / 1000.0
    }

    /// 起始标志互斥且校验位为 1
    pub fn is_valid(&self) -> bool {
        self.sync != self.inverse_sync && self.check_bit
    }

    /// 编码为 5 字节负载（距离超过 16 bit 时饱和）
    pub fn encode(&self) -> [u8; 5] {
        let sq = SyncQuality::new(
            self.sync,
            self.inverse_sync,
            u6::new(self.quality & MAX_QUALITY),
        );
        let ac = AngleCheck::new(self.check_bit, u15::new(self.angle_q6 & 0x7FFF));
        let angle = u16::from(ac).to_le_bytes();
        let distance = (self.distance_q2.min(u16::MAX as u32) as u16).to_le_bytes();
        [
            u8::from(sq),
            angle[0],
            angle[1],
            distance[0],
            distance[1],
        ]
    }
}

impl TryFrom<&[u8]> for ScanResponse {
    type Error = ProtocolError;

    fn try_from(payload: &[u8]) -> Result<Self, Self::Error> {
        let expected = ResponseType::Measurement.payload_len();
        if payload.len() != expected {
            return Err(ProtocolError::InvalidLength {
                kind: "Measurement",
                expected,
                actual: payload.len(),
            });
        }

        let sq = SyncQuality::from(payload[0]);
        let ac = AngleCheck::from(read_u16_le(payload, 1));

        Ok(Self {
            angle_q6: ac.angle_q6().value(),
            distance_q2: read_u16_le(payload, 3) as u32,
            quality: sq.quality().value(),
            sync: sq.sync(),
            inverse_sync: sq.inverse_sync(),
            check_bit: ac.check_bit(),
        })
    }
}

// ============================================================================
// 设备信息 (0x04)
// ============================================================================

/// 设备信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub model: u8,
    pub firmware_minor: u8,
    pub firmware_major: u8,
    pub hardware: u8,
    pub serial_number: [u8; 16],
}

impl DeviceInfo {
    /// 固件版本，如 "1.29"
    pub fn firmware_version(&self) -> String {
        format!("{}.{:02}", self.firmware_major, self.firmware_minor)
    }

    /// 序列号（大写十六进制）
    pub fn serial_hex(&self) -> String {
        self.serial_number.iter().map(|b| format!("{:02X}", b)).collect()
    }

    /// 编码为 20 字节负载
    pub fn encode(&self) -> [u8; 20] {
        let mut out = [0u8; 20];
        out[0] = self.model;
        out[1] = self.firmware_minor;
        out[2] = self.firmware_major;
        out[3] = self.hardware;
        out[4..].copy_from_slice(&self.serial_number);
        out
    }
}

impl TryFrom<&[u8]> for DeviceInfo {
    type Error = ProtocolError;

    fn try_from(payload: &[u8]) -> Result<Self, Self::Error> {
        let expected = ResponseType::DeviceInfo.payload_len();
        if payload.len() != expected {
            return Err(ProtocolError::InvalidLength {
                kind: "DeviceInfo",
                expected,
                actual: payload.len(),
            });
        }

        let mut serial_number = [0u8; 16];
        serial_number.copy_from_slice(&payload[4..20]);
        Ok(Self {
            model: payload[0],
            firmware_minor: payload[1],
            firmware_major: payload[2],
            hardware: payload[3],
            serial_number,
        })
    }
}

// ============================================================================
// 健康状态 (0x06)
// ============================================================================

/// 健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum HealthStatus {
    Ok = 0,
    Warning = 1,
    Error = 2,
}

/// 健康状态应答
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceHealth {
    pub status: HealthStatus,
    pub error_code: u16,
}

impl DeviceHealth {
    /// 编码为 3 字节负载
    pub fn encode(&self) -> [u8; 3] {
        let code = self.error_code.to_le_bytes();
        [self.status as u8, code[0], code[1]]
    }
}

impl TryFrom<&[u8]> for DeviceHealth {
    type Error = ProtocolError;

    fn try_from(payload: &[u8]) -> Result<Self, Self::Error> {
        let expected = ResponseType::DeviceHealth.payload_len();
        if payload.len() != expected {
            return Err(ProtocolError::InvalidLength {
                kind: "DeviceHealth",
                expected,
                actual: payload.len(),
            });
        }

        let status =
            HealthStatus::try_from(payload[0]).map_err(|_| ProtocolError::InvalidValue {
                field: "health status",
                value: payload[0] as u32,
            })?;
        Ok(Self {
            status,
            error_code: read_u16_le(payload, 1),
        })
    }
}

// ============================================================================
// 采样周期 (0x15)
// ============================================================================

/// 采样周期（微秒/点）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRate {
    pub standard_us: u16,
    pub express_us: u16,
}

impl SampleRate {
    pub fn encode(&self) -> [u8; 4] {
        let s = self.standard_us.to_le_bytes();
        let e = self.express_us.to_le_bytes();
        [s[0], s[1], e[0], e[1]]
    }
}

impl TryFrom<&[u8]> for SampleRate {
    type Error = ProtocolError;

    fn try_from(payload: &[u8]) -> Result<Self, Self::Error> {
        let expected = ResponseType::SampleRate.payload_len();
        if payload.len() != expected {
            return Err(ProtocolError::InvalidLength {
                kind: "SampleRate",
                expected,
                actual: payload.len(),
            });
        }
        Ok(Self {
            standard_us: read_u16_le(payload, 0),
            express_us: read_u16_le(payload, 2),
        })
    }
}

// ============================================================================
// 应答集合
// ============================================================================

/// 无效应答的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    /// 未知应答类型（帧头很可能是伪造的）
    UnknownType,
    /// 已知类型但负载不合法
    Malformed(ProtocolError),
}

/// 解码后的应答
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// 标准测量点（可能校验失败，见 [`ScanResponse::is_valid`]）
    Scan(ScanResponse),
    /// Express 压缩测量包
    ExpressScan(ExpressCapsule),
    /// Ultra Express 压缩测量包
    UltraExpressScan(UltraCapsule),
    DeviceInfo(DeviceInfo),
    DeviceHealth(DeviceHealth),
    SampleRate(SampleRate),
    /// 无法解码的帧
    Invalid {
        response_type: u8,
        reason: InvalidReason,
    },
}

impl Response {
    /// 解码 `(type, payload)`
    pub fn decode(response_type: u8, payload: &[u8]) -> Self {
        let Ok(kind) = ResponseType::try_from(response_type) else {
            return Response::Invalid {
                response_type,
                reason: InvalidReason::UnknownType,
            };
        };

        let decoded = match kind {
            ResponseType::Measurement => ScanResponse::try_from(payload).map(Response::Scan),
            ResponseType::MeasurementCapsuled => {
                ExpressCapsule::try_from(payload).map(Response::ExpressScan)
            },
            ResponseType::MeasurementCapsuledUltra => {
                UltraCapsule::try_from(payload).map(Response::UltraExpressScan)
            },
            ResponseType::DeviceInfo => DeviceInfo::try_from(payload).map(Response::DeviceInfo),
            ResponseType::DeviceHealth => {
                DeviceHealth::try_from(payload).map(Response::DeviceHealth)
            },
            ResponseType::SampleRate => SampleRate::try_from(payload).map(Response::SampleRate),
        };

        decoded.unwrap_or_else(|error| Response::Invalid {
            response_type,
            reason: InvalidReason::Malformed(error),
        })
    }

    /// 应答类型标签
    pub fn response_type(&self) -> u8 {
        match self {
            Response::Scan(_) => ResponseType::Measurement.into(),
            Response::ExpressScan(_) => ResponseType::MeasurementCapsuled.into(),
            Response::UltraExpressScan(_) => ResponseType::MeasurementCapsuledUltra.into(),
            Response::DeviceInfo(_) => ResponseType::DeviceInfo.into(),
            Response::DeviceHealth(_) => ResponseType::DeviceHealth.into(),
            Response::SampleRate(_) => ResponseType::SampleRate.into(),
            Response::Invalid { response_type, .. } => *response_type,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Response::Invalid { .. })
    }
}
