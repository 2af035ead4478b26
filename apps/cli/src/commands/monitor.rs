//! 监控命令
//!
//! 按固定频率读取方位向量表，打印每个扇区组的最近距离与覆盖率，以及接收统计。

use crate::connection::ConnectArgs;
use anyhow::Result;
use clap::Args;
use rplidar_sdk::prelude::*;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

/// 监控命令参数
#[derive(Args, Debug)]
pub struct MonitorCommand {
    /// 刷新频率（Hz）
    #[arg(short, long, default_value_t = 2)]
    pub frequency: u32,

    /// 将一圈划分的扇区组数量
    #[arg(short, long, default_value_t = 8)]
    pub sectors: usize,

    /// 使用 Express 扫描
    #[arg(short, long)]
    pub express: bool,
}

/// 一个扇区组的概览
#[derive(Debug, Clone, PartialEq)]
pub struct SectorSummary {
    /// 起始角度（度）
    pub start_deg: f64,
    /// 最近距离（米），无数据时为 `None`
    pub nearest_m: Option<f64>,
    /// 有数据的扇区占比（0-1）
    pub coverage: f64,
}

/// 将向量表划分为 `groups` 组并汇总
pub fn summarize(vectors: &[BearingVector], groups: usize) -> Vec<SectorSummary> {
    let groups = groups.clamp(1, vectors.len().max(1));
    let per_group = vectors.len().div_ceil(groups).max(1);

    vectors
        .chunks(per_group)
        .map(|chunk| {
            let filled: Vec<f64> = chunk
                .iter()
                .map(|v| v.range_m)
                .filter(|&range| range > 0.0)
                .collect();
            SectorSummary {
                start_deg: chunk[0].bearing_deg,
                nearest_m: filled.iter().copied().reduce(f64::min),
                coverage: filled.len() as f64 / chunk.len() as f64,
            }
        })
        .collect()
}

impl MonitorCommand {
    pub fn execute(&self, connect: &ConnectArgs) -> Result<()> {
        let running = super::install_ctrlc()?;
        let lidar = connect.connect()?;

        lidar.start_motor()?;
        if self.express {
            lidar.start_express_scan(ExpressScanConfig::default())?;
        } else {
            lidar.start_scan()?;
        }

        let interval = Duration::from_secs_f64(1.0 / self.frequency.max(1) as f64);
        let mut last = lidar.metrics();
        let mut last_time = Instant::now();

        while running.load(Ordering::SeqCst) {
            std::thread::sleep(interval);
            if !lidar.is_healthy() {
                println!("❌ 连接已断开");
                break;
            }

            let metrics = lidar.metrics();
            let elapsed = last_time.elapsed().as_secs_f64();
            let rate = metrics.samples_accepted.saturating_sub(last.samples_accepted) as f64 / elapsed;
            last = metrics;
            last_time = Instant::now();

            print_monitor_output(&lidar, &summarize(&lidar.vectors(), self.sectors), rate);
        }

        if lidar.is_healthy() {
            lidar.stop()?;
            lidar.stop_motor()?;
        }
        println!("✅ 监控已结束");
        Ok(())
    }
}

fn print_monitor_output(lidar: &Lidar, sectors: &[SectorSummary], sample_rate: f64) {
    let metrics = lidar.metrics();
    println!("========================================");
    println!(
        "状态: {}  采样: {:7.1} 点/s  重新同步: {}  溢出: {}",
        if lidar.is_active() { "活动" } else { "静默" },
        sample_rate,
        metrics.resyncs,
        metrics.overflows
    );

    println!("\n扇区 (°)     最近 (m)   覆盖率");
    for sector in sectors {
        match sector.nearest_m {
            Some(nearest) => println!(
                "  {:6.1}    {:8.3}   {:5.1}%",
                sector.start_deg,
                nearest,
                sector.coverage * 100.0
            ),
            None => println!("  {:6.1}           -   {:5.1}%", sector.start_deg, 0.0),
        }
    }
    println!("========================================\n");
}
