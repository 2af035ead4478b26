//! 请求包构建
//!
//! ```text
//! 无负载: [0xA5][cmd]
//! 带负载: [0xA5][cmd][len][payload...][checksum]
//! ```
//!
//! checksum 为之前所有字节（含 0xA5 与 cmd）的 XOR。

use crate::ids::{CommandCode, SYNC_BYTE};
use crate::xor_checksum;
use smallvec::SmallVec;

/// 电机 PWM 最大值
pub const MAX_MOTOR_PWM: u16 = 1023;

/// 电机 PWM 默认值
pub const DEFAULT_MOTOR_PWM: u16 = 660;

/// 请求包缓冲区
///
/// 最长的请求（Express 扫描）为 2 + 1 + 5 + 1 = 9 字节，全部在栈上。
pub type CommandBytes = SmallVec<[u8; 10]>;

/// Express 扫描工作模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExpressScanConfig {
    /// 工作模式（0 = 设备默认模式）
    pub working_mode: u8,
    /// 工作标志
    pub working_flags: u16,
    /// 模式参数
    pub param: u16,
}

impl ExpressScanConfig {
    fn payload(&self) -> [u8; 5] {
        let flags = self.working_flags.to_le_bytes();
        let param = self.param.to_le_bytes();
        [self.working_mode, flags[0], flags[1], param[0], param[1]]
    }
}

/// 请求命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Stop,
    Reset,
    Scan,
    ForceScan,
    GetDeviceInfo,
    GetDeviceHealth,
    GetSampleRate,
    ExpressScan(ExpressScanConfig),
    /// 电机 PWM，超出 [`MAX_MOTOR_PWM`] 时截断
    SetMotorPwm(u16),
}

impl Command {
    /// 命令码
    pub fn code(&self) -> CommandCode {
        match self {
            Command::Stop => CommandCode::Stop,
            Command::Reset => CommandCode::Reset,
            Command::Scan => CommandCode::Scan,
            Command::ForceScan => CommandCode::ForceScan,
            Command::GetDeviceInfo => CommandCode::GetDeviceInfo,
            Command::GetDeviceHealth => CommandCode::GetDeviceHealth,
            Command::GetSampleRate => CommandCode::GetSampleRate,
            Command::ExpressScan(_) => CommandCode::ExpressScan,
            Command::SetMotorPwm(_) => CommandCode::SetMotorPwm,
        }
    }

    /// 设备是否会对该命令发送应答
    ///
    /// Stop / Reset / SetMotorPwm 无应答；扫描类命令的"应答"是测量流的第一帧。
    pub fn expects_response(&self) -> bool {
        !matches!(self, Command::Stop | Command::Reset | Command::SetMotorPwm(_))
    }

    /// 是否启动测量流
    pub fn starts_stream(&self) -> bool {
        matches!(
            self,
            Command::Scan | Command::ForceScan | Command::ExpressScan(_)
        )
    }

    /// 编码为线上字节序列
    pub fn to_bytes(&self) -> CommandBytes {
        let mut out = CommandBytes::new();
        out.push(SYNC_BYTE);
        out.push(self.code().into());

        let payload: SmallVec<[u8; 5]> = match self {
            Command::ExpressScan(config) => SmallVec::from_slice(&config.payload()),
            Command::SetMotorPwm(pwm) => {
                SmallVec::from_slice(&(*pwm).min(MAX_MOTOR_PWM).to_le_bytes())
            },
            _ => SmallVec::new(),
        };

        if !payload.is_empty() {
            out.push(payload.len() as u8);
            out.extend_from_slice(&payload);
            let checksum = xor_checksum(&out);
            out.push(checksum);
        }
        out
    }
}
