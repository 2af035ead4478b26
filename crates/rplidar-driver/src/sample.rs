//! 测量点

use rplidar_protocol::{MIN_ACCEPTED_QUALITY, ScanResponse};
use std::time::Instant;

/// 可接受的最小距离（米）
pub const MIN_ACCEPTED_RANGE_M: f64 = 0.001;

/// 一个带时间戳的测量点
///
/// `bearing_deg` 是雷达坐标系下的原始角度，偏移与航向在写入向量表时才叠加。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanSample {
    /// 角度（度）
    pub bearing_deg: f64,
    /// 距离（米），0 表示无回波
    pub range_m: f64,
    /// 信号质量（0-63）
    pub quality: u8,
    /// 起始标志与校验位是否一致
    pub valid: bool,
    /// 新一圈起始标志
    pub sync: bool,
    /// 接收时间
    pub timestamp: Instant,
}

impl ScanSample {
    pub fn from_response(response: &ScanResponse, timestamp: Instant) -> Self {
        Self {
            bearing_deg: response.angle_deg(),
            range_m: response.range_m(),
            quality: response.quality,
            valid: response.is_valid(),
            sync: response.sync,
            timestamp,
        }
    }

    /// 是否可以写入向量表
    ///
    /// `quality > 10`、校验通过、角度在 `[0, 360)` 内且距离大于 1 mm。
    pub fn is_acceptable(&self) -> bool {
        self.quality > MIN_ACCEPTED_QUALITY
            && self.valid
            && (0.0..360.0).contains(&self.bearing_deg)
            && self.range_m > MIN_ACCEPTED_RANGE_M
    }
}
