//! 协议常量定义
//!
//! 同步字节、命令码与应答类型。

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// 请求/应答同步字节
pub const SYNC_BYTE: u8 = 0xA5;

/// 应答起始标志
pub const START_FLAG: u8 = 0x5A;

/// 应答描述符长度（不含 SYNC 与 START_FLAG）：4 字节长度/模式 + 1 字节类型
pub const HEADER_BODY_LEN: usize = 5;

/// 完整应答描述符长度（含 SYNC 与 START_FLAG）
pub const DESCRIPTOR_LEN: usize = 2 + HEADER_BODY_LEN;

/// 帧长度字段的最大值（14 bit）
pub const MAX_FRAME_LENGTH: usize = 0x3FFF;

/// 命令码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum CommandCode {
    /// 停止扫描（无应答）
    Stop = 0x25,
    /// 标准扫描
    Scan = 0x20,
    /// 强制扫描（忽略转速稳定判断）
    ForceScan = 0x21,
    /// 软复位（无应答）
    Reset = 0x40,
    /// 设备信息
    GetDeviceInfo = 0x50,
    /// 健康状态
    GetDeviceHealth = 0x52,
    /// 采样周期（固件 1.17+）
    GetSampleRate = 0x59,
    /// Express 扫描（固件 1.17+，带负载）
    ExpressScan = 0x82,
    /// 电机 PWM（A2 配件板，带负载，无应答）
    SetMotorPwm = 0xF0,
}

/// 应答类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ResponseType {
    /// 设备信息 (20 字节)
    DeviceInfo = 0x04,
    /// 健康状态 (3 字节)
    DeviceHealth = 0x06,
    /// 采样周期 (4 字节)
    SampleRate = 0x15,
    /// 标准测量点 (5 字节)
    Measurement = 0x81,
    /// Express 压缩测量包 (84 字节)
    MeasurementCapsuled = 0x82,
    /// Ultra Express 压缩测量包 (132 字节)
    MeasurementCapsuledUltra = 0x84,
}

impl ResponseType {
    /// 该应答类型的固定负载长度
    pub const fn payload_len(self) -> usize {
        match self {
            ResponseType::DeviceInfo => 20,
            ResponseType::DeviceHealth => 3,
            ResponseType::SampleRate => 4,
            ResponseType::Measurement => 5,
            ResponseType::MeasurementCapsuled => 84,
            ResponseType::MeasurementCapsuledUltra => 132,
        }
    }

    /// 是否为测量流类型（以 MultiResponse 模式持续推送）
    pub const fn is_measurement(self) -> bool {
        matches!(
            self,
            ResponseType::Measurement
                | ResponseType::MeasurementCapsuled
                | ResponseType::MeasurementCapsuledUltra
        )
    }
}
