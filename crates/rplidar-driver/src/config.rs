//! 处理器配置
//!
//! `ProcessorConfig` 是纯数据（POD），运行时组件（回调等）由 `HookManager` 管理。

use crate::error::DriverError;
use rplidar_protocol::ResponseType;
use std::time::Duration;

/// 一整圈的 1/64 度数
pub(crate) const FULL_CIRCLE_Q6: u32 = 360 << 6;

/// 接收缓冲区最小容量（能容纳最大的测量帧）
pub const MIN_BUFFER_CAPACITY: usize = 256;

/// 扫描处理器配置
///
/// # Example
///
/// ```
/// use rplidar_driver::ProcessorConfig;
///
/// let config = ProcessorConfig {
///     sector_width_deg: 1.0,
///     bearing_offset_deg: 180.0,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ProcessorConfig {
    /// 扇区宽度（度），必须整除 360 且为 1/64 度的整数倍
    pub sector_width_deg: f64,
    /// 安装方位偏移（度）
    pub bearing_offset_deg: f64,
    /// 过期窗口（毫秒），超过该时间未刷新的扇区距离清零
    pub staleness_window_ms: u64,
    /// 活动窗口（毫秒）
    pub activity_window_ms: u64,
    /// 接收缓冲区容量（字节）
    pub buffer_capacity: usize,
    /// 应答交接通道容量
    pub handoff_capacity: usize,
    /// 假定设备已在推送的测量流类型（进程重启而雷达仍在扫描时使用）
    pub forced_stream: Option<ResponseType>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            sector_width_deg: 0.25,
            bearing_offset_deg: 0.0,
            staleness_window_ms: 500,
            activity_window_ms: 1000,
            buffer_capacity: 64 * 1024,
            handoff_capacity: 16,
            forced_stream: None,
        }
    }
}

impl ProcessorConfig {
    /// 检查配置合法性
    ///
    /// # 错误
    /// - `DriverError::InvalidConfig`: 扇区宽度、容量或强制流类型非法
    pub fn validate(&self) -> Result<(), DriverError> {
        self.sector_width_q6()?;

        if !self.bearing_offset_deg.is_finite() {
            return Err(DriverError::InvalidConfig(format!(
                "bearing offset {} is not finite",
                self.bearing_offset_deg
            )));
        }
        if self.buffer_capacity < MIN_BUFFER_CAPACITY {
            return Err(DriverError::InvalidConfig(format!(
                "buffer capacity {} below minimum {}",
                self.buffer_capacity, MIN_BUFFER_CAPACITY
            )));
        }
        if self.handoff_capacity == 0 {
            return Err(DriverError::InvalidConfig(
                "handoff capacity must be at least 1".to_string(),
            ));
        }
        if let Some(kind) = self.forced_stream
            && !kind.is_measurement()
        {
            return Err(DriverError::InvalidConfig(format!(
                "forced stream type {:?} is not a measurement stream",
                kind
            )));
        }
        Ok(())
    }

    /// 扇区宽度（1/64 度）
    pub(crate) fn sector_width_q6(&self) -> Result<u32, DriverError> {
        let width = self.sector_width_deg;
        let scaled = width * 64.0;
        if !width.is_finite() || width <= 0.0 || width > 360.0 {
            return Err(DriverError::InvalidConfig(format!(
                "sector width {} out of range (0, 360]",
                width
            )));
        }
        let q6 = scaled.round();
        if (scaled - q6).abs() > 1e-9 || q6 < 1.0 || FULL_CIRCLE_Q6 % (q6 as u32) != 0 {
            return Err(DriverError::InvalidConfig(format!(
                "sector width {} must be a multiple of 1/64 degree dividing 360",
                width
            )));
        }
        Ok(q6 as u32)
    }

    pub fn staleness_window(&self) -> Duration {
        Duration::from_millis(self.staleness_window_ms)
    }

    pub fn activity_window(&self) -> Duration {
        Duration::from_millis(self.activity_window_ms)
    }
}
