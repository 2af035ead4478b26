//! 配置管理命令
//!
//! 用于管理 CLI 配置（默认连接、扇区宽度等）

use crate::config::{CliConfig, config_file};
use anyhow::{Context, Result};
use clap::Subcommand;
use rplidar_sdk::prelude::ProcessorConfig;

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 设置配置项
    Set {
        /// 默认连接（串口路径或 host:port）
        #[arg(short, long)]
        endpoint: Option<String>,

        /// 串口波特率
        #[arg(short, long)]
        baud: Option<u32>,

        /// 扇区宽度（度）
        #[arg(long)]
        sector_width: Option<f64>,

        /// 安装方位偏移（度）
        #[arg(long, allow_hyphen_values = true)]
        offset: Option<f64>,
    },

    /// 获取配置项
    Get {
        /// 配置项名称
        #[arg(default_value = "all")]
        key: String,
    },

    /// 检查配置
    Check,
}

impl ConfigCommand {
    pub fn execute(self) -> Result<()> {
        match self {
            ConfigCommand::Set {
                endpoint,
                baud,
                sector_width,
                offset,
            } => Self::set_(endpoint, baud, sector_width, offset),

            ConfigCommand::Get { key } => Self::get_(&key),

            ConfigCommand::Check => Self::check_(),
        }
    }

    fn set_(
        endpoint: Option<String>,
        baud: Option<u32>,
        sector_width: Option<f64>,
        offset: Option<f64>,
    ) -> Result<()> {
        let mut config = CliConfig::load()?;

        if let Some(endpoint) = endpoint {
            println!("✅ 设置默认连接: {}", endpoint);
            config.endpoint = Some(endpoint);
        }
        if let Some(baud) = baud {
            println!("✅ 设置波特率: {}", baud);
            config.baud_rate = Some(baud);
        }
        if let Some(width) = sector_width {
            println!("✅ 设置扇区宽度: {}°", width);
            config.sector_width_deg = Some(width);
        }
        if let Some(offset) = offset {
            println!("✅ 设置方位偏移: {}°", offset);
            config.bearing_offset_deg = Some(offset);
        }

        validate(&config)?;
        let path = config.save()?;
        println!("已保存到 {}", path.display());
        Ok(())
    }

    fn get_(key: &str) -> Result<()> {
        let config = CliConfig::load()?;

        match key {
            "endpoint" => print_value(config.endpoint.as_deref()),
            "baud" | "baud_rate" => print_value(config.baud_rate),
            "sector_width" | "sector_width_deg" => print_value(config.sector_width_deg),
            "offset" | "bearing_offset_deg" => print_value(config.bearing_offset_deg),
            _ => print_all(&config),
        }
        Ok(())
    }

    fn check_() -> Result<()> {
        let path = config_file()?;
        let config = CliConfig::load()?;

        println!("配置文件: {}", path.display());
        print_all(&config);
        validate(&config)?;
        println!("✅ 配置有效");
        Ok(())
    }
}

/// 检查扇区宽度等能否构造合法的处理器配置
fn validate(config: &CliConfig) -> Result<()> {
    let defaults = ProcessorConfig::default();
    ProcessorConfig {
        sector_width_deg: config.sector_width_deg.unwrap_or(defaults.sector_width_deg),
        bearing_offset_deg: config.bearing_offset_deg.unwrap_or(defaults.bearing_offset_deg),
        ..defaults
    }
    .validate()
    .context("配置无效")
}

fn print_value<T: std::fmt::Display>(value: Option<T>) {
    match value {
        Some(value) => println!("{}", value),
        None => println!("(未设置)"),
    }
}

fn print_all(config: &CliConfig) {
    println!("RPLIDAR CLI 配置:");
    println!("  连接:     {:?}", config.endpoint);
    println!("  波特率:   {:?}", config.baud_rate);
    println!("  扇区宽度: {:?}", config.sector_width_deg);
    println!("  方位偏移: {:?}", config.bearing_offset_deg);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(validate(&CliConfig::default()).is_ok());
        assert!(
            validate(&CliConfig {
                sector_width_deg: Some(1.0),
                ..Default::default()
            })
            .is_ok()
        );
        // 不整除 360
        assert!(
            validate(&CliConfig {
                sector_width_deg: Some(7.0),
                ..Default::default()
            })
            .is_err()
        );
    }
}
