//! 设备查询命令（info / health / sample-rate）

use crate::connection::ConnectArgs;
use anyhow::Result;
use rplidar_sdk::prelude::*;
use std::time::Duration;

/// 查询超时
const QUERY_TIMEOUT: Duration = Duration::from_secs(1);

/// 查询类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Info,
    Health,
    SampleRate,
}

pub fn execute(connect: &ConnectArgs, kind: QueryKind) -> Result<()> {
    let lidar = connect.connect()?;

    match kind {
        QueryKind::Info => print_info(&lidar.device_info(QUERY_TIMEOUT)?),
        QueryKind::Health => print_health(&lidar.health(QUERY_TIMEOUT)?),
        QueryKind::SampleRate => print_sample_rate(&lidar.sample_rate(QUERY_TIMEOUT)?),
    }
    Ok(())
}

fn print_info(info: &DeviceInfo) {
    println!("设备信息:");
    println!("  型号:     0x{:02X}", info.model);
    println!("  固件版本: {}", info.firmware_version());
    println!("  硬件版本: {}", info.hardware);
    println!("  序列号:   {}", hex::encode_upper(info.serial_number));
}

fn print_health(health: &DeviceHealth) {
    let status = match health.status {
        HealthStatus::Ok => "正常",
        HealthStatus::Warning => "警告",
        HealthStatus::Error => "错误",
    };
    println!("健康状态: {} ({:?})", status, health.status);
    if health.error_code != 0 {
        println!("  错误码: 0x{:04X}", health.error_code);
    }
}

fn print_sample_rate(rate: &SampleRate) {
    println!("采样周期:");
    println!("  标准扫描:  {} µs ({})", rate.standard_us, frequency(rate.standard_us));
    println!("  Express:   {} µs ({})", rate.express_us, frequency(rate.express_us));
}

/// 采样周期换算为采样频率
fn frequency(period_us: u16) -> String {
    if period_us == 0 {
        return "-".to_string();
    }
    format!("{:.0} Hz", 1_000_000.0 / period_us as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency() {
        assert_eq!(frequency(0), "-");
        assert_eq!(frequency(500), "2000 Hz");
        assert_eq!(frequency(250), "4000 Hz");
    }
}
