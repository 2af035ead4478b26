//! 连接参数
//!
//! 命令行参数优先，其次是配置文件。

use crate::config::CliConfig;
use anyhow::{Context, Result};
use clap::Args;
use rplidar_sdk::prelude::*;
use std::path::PathBuf;
use std::time::Duration;

/// 连接参数（全局）
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectArgs {
    /// TCP 地址（host:port，覆盖配置）
    #[arg(long, global = true, conflicts_with = "serial")]
    pub tcp: Option<String>,

    /// 串口设备路径（覆盖配置）
    #[arg(long, global = true)]
    pub serial: Option<PathBuf>,

    /// 串口波特率
    #[arg(long, global = true)]
    pub baud: Option<u32>,

    /// 安装方位偏移（度）
    #[arg(long, global = true, allow_hyphen_values = true)]
    pub offset: Option<f64>,
}

impl ConnectArgs {
    /// 确定连接目标
    pub fn endpoint(&self, config: &CliConfig) -> Result<Endpoint> {
        if let Some(addr) = &self.tcp {
            return Ok(Endpoint::Tcp(addr.clone()));
        }
        if let Some(path) = &self.serial {
            return Ok(Endpoint::Serial(path.clone()));
        }
        config.endpoint.as_deref().map(Endpoint::parse).ok_or_else(|| {
            anyhow::anyhow!(
                "未指定连接目标：使用 --tcp / --serial，或 `rplidar-cli config set --endpoint`"
            )
        })
    }

    /// 处理器配置
    pub fn processor_config(&self, config: &CliConfig) -> ProcessorConfig {
        let defaults = ProcessorConfig::default();
        ProcessorConfig {
            sector_width_deg: config.sector_width_deg.unwrap_or(defaults.sector_width_deg),
            bearing_offset_deg: self
                .offset
                .or(config.bearing_offset_deg)
                .unwrap_or(defaults.bearing_offset_deg),
            ..defaults
        }
    }

    /// 读取配置并连接雷达
    pub fn connect(&self) -> Result<Lidar> {
        let config = CliConfig::load()?;
        let endpoint = self.endpoint(&config)?;

        println!("⏳ 连接到 {} ...", endpoint);
        let mut builder = LidarBuilder::new()
            .endpoint(endpoint.clone())
            .processor_config(self.processor_config(&config))
            .connect_timeout(Duration::from_secs(3));
        if let Some(baud) = self.baud.or(config.baud_rate) {
            builder = builder.baud_rate(baud);
        }
        let lidar = builder.build().with_context(|| format!("连接 {} 失败", endpoint))?;
        println!("✅ 已连接");
        Ok(lidar)
    }
}
