//! 共享上下文
//!
//! RX 线程写、任意线程读的全部状态：
//!
//! - 方位向量表（每扇区一个原子槽）
//! - 活动监视器
//! - 最近一次设备信息 / 健康状态 / 采样周期（ArcSwapOption，无锁读取）
//! - 钩子与应答关联器

use crate::activity::ActivityMonitor;
use crate::config::ProcessorConfig;
use crate::correlator::ResponseCorrelator;
use crate::error::DriverError;
use crate::hooks::HookManager;
use crate::vectors::BearingVectorStore;
use arc_swap::ArcSwapOption;
use rplidar_protocol::{DeviceHealth, DeviceInfo, SampleRate};
use std::sync::{Arc, RwLock};

/// 雷达上下文
pub struct LidarContext {
    /// 方位向量表
    pub vectors: BearingVectorStore,
    /// 最近一次接受测量点的时间
    pub activity: ActivityMonitor,
    /// 最近收到的设备信息
    pub device_info: ArcSwapOption<DeviceInfo>,
    /// 最近收到的健康状态
    pub device_health: ArcSwapOption<DeviceHealth>,
    /// 最近收到的采样周期
    pub sample_rate: ArcSwapOption<SampleRate>,
    /// 运行时回调
    pub hooks: Arc<RwLock<HookManager>>,
    /// 命令应答交接
    pub correlator: ResponseCorrelator,
}

impl LidarContext {
    /// 按配置创建上下文
    ///
    /// # 错误
    /// - `DriverError::InvalidConfig`: 配置未通过校验
    pub fn new(config: &ProcessorConfig) -> Result<Self, DriverError> {
        config.validate()?;
        Ok(Self {
            vectors: BearingVectorStore::new(
                config.sector_width_q6()?,
                config.bearing_offset_deg,
                config.staleness_window(),
            ),
            activity: ActivityMonitor::new(config.activity_window()),
            device_info: ArcSwapOption::empty(),
            device_health: ArcSwapOption::empty(),
            sample_rate: ArcSwapOption::empty(),
            hooks: Arc::new(RwLock::new(HookManager::new())),
            correlator: ResponseCorrelator::new(config.handoff_capacity),
        })
    }

    /// 是否在活动窗口内接受过测量点
    pub fn is_active(&self) -> bool {
        self.activity.is_active()
    }
}
