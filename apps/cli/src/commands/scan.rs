//! 扫描命令
//!
//! 启动电机与扫描，逐行打印测量点，直到达到数量/时长限制或 Ctrl-C。

use crate::connection::ConnectArgs;
use anyhow::Result;
use clap::Args;
use crossbeam_channel::RecvTimeoutError;
use rplidar_sdk::prelude::*;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

/// 扫描命令参数
#[derive(Args, Debug)]
pub struct ScanCommand {
    /// 使用 Express 扫描
    #[arg(short, long)]
    pub express: bool,

    /// 打印的测量点数量，0 表示无限
    #[arg(short = 'n', long, default_value_t = 0)]
    pub count: u64,

    /// 扫描时长（秒），0 表示无限
    #[arg(short, long, default_value_t = 0)]
    pub duration: u64,

    /// 同时以十六进制打印每个测量帧的负载
    #[arg(long)]
    pub raw: bool,
}

impl ScanCommand {
    pub fn execute(&self, connect: &ConnectArgs) -> Result<()> {
        let running = super::install_ctrlc()?;
        let lidar = connect.connect()?;

        let (hook, events) = if self.raw {
            ChannelHook::new(8192)
        } else {
            ChannelHook::samples_only(8192)
        };
        let dropped = hook.dropped().clone();
        lidar.add_callback(Arc::new(hook))?;

        lidar.start_motor()?;
        if self.express {
            lidar.start_express_scan(ExpressScanConfig::default())?;
        } else {
            lidar.start_scan()?;
        }
        println!("🔄 扫描中（Ctrl-C 停止）...");

        let start = Instant::now();
        let mut printed = 0u64;
        while running.load(Ordering::SeqCst) {
            if self.duration > 0 && start.elapsed() >= Duration::from_secs(self.duration) {
                println!("\n⏱️  达到时长限制");
                break;
            }
            if self.count > 0 && printed >= self.count {
                break;
            }
            if !lidar.is_healthy() {
                println!("\n❌ 连接已断开");
                break;
            }

            match events.recv_timeout(Duration::from_millis(100)) {
                Ok(LidarEvent::Sample(sample)) => {
                    println!("{}", format_sample(&sample));
                    printed += 1;
                },
                Ok(LidarEvent::Response(response)) => {
                    if let Some(payload) = raw_payload(&response) {
                        println!("   raw: {}", hex::encode(payload));
                    }
                },
                Err(RecvTimeoutError::Timeout) => {},
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if lidar.is_healthy() {
            lidar.stop()?;
            lidar.stop_motor()?;
        }

        let metrics = lidar.metrics();
        println!("\n统计:");
        println!("  接收字节:   {}", metrics.bytes_received);
        println!("  帧:         {} (无效 {:.2}%)", metrics.frames_total, metrics.invalid_frame_rate());
        println!("  测量点:     {} (接受率 {:.1}%)", metrics.samples_accepted, metrics.acceptance_rate());
        println!("  重新同步:   {}", metrics.resyncs);
        println!("  丢弃事件:   {}", dropped.load(Ordering::Relaxed));
        Ok(())
    }
}

/// 测量点的单行输出
fn format_sample(sample: &ScanSample) -> String {
    format!(
        "{} theta: {:6.2} dist: {:8.3} m  Q: {:2}",
        if sample.sync { 'S' } else { ' ' },
        sample.bearing_deg,
        sample.range_m,
        sample.quality
    )
}

/// 测量帧的负载字节
fn raw_payload(response: &Response) -> Option<Vec<u8>> {
    match response {
        Response::Scan(scan) => Some(scan.encode().to_vec()),
        Response::ExpressScan(capsule) => Some(capsule.encode().to_vec()),
        Response::UltraExpressScan(capsule) => Some(capsule.encode().to_vec()),
        _ => None,
    }
}
