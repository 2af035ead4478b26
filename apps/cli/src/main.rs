//! # RPLIDAR CLI
//!
//! Command-line interface for RPLIDAR 2D laser scanners.
//!
//! 每个命令独立执行：读取配置 → 连接雷达 → 执行操作 → 断开。
//!
//! ```bash
//! # 配置默认连接
//! rplidar-cli config set --endpoint /dev/ttyUSB0
//!
//! # 查询设备
//! rplidar-cli info
//! rplidar-cli --tcp 192.168.0.7:20108 health
//!
//! # 打印测量点，Ctrl-C 停止
//! rplidar-cli scan --express
//!
//! # 扇区概览
//! rplidar-cli monitor --frequency 2 --sectors 12
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;
mod connection;

use commands::{ConfigCommand, MonitorCommand, QueryKind, ScanCommand};
use connection::ConnectArgs;

/// RPLIDAR CLI - 激光雷达命令行工具
#[derive(Parser, Debug)]
#[command(name = "rplidar-cli")]
#[command(about = "Command-line interface for RPLIDAR laser scanners", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    connect: ConnectArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 查询设备信息
    Info,

    /// 查询健康状态
    Health,

    /// 查询采样周期
    SampleRate,

    /// 启动扫描并打印测量点
    Scan {
        #[command(flatten)]
        args: ScanCommand,
    },

    /// 周期性打印扇区概览与统计
    Monitor {
        #[command(flatten)]
        args: MonitorCommand,
    },
}

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rplidar_cli=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config(cmd) => cmd.execute(),
        Commands::Info => commands::query::execute(&cli.connect, QueryKind::Info),
        Commands::Health => commands::query::execute(&cli.connect, QueryKind::Health),
        Commands::SampleRate => commands::query::execute(&cli.connect, QueryKind::SampleRate),
        Commands::Scan { args } => args.execute(&cli.connect),
        Commands::Monitor { args } => args.execute(&cli.connect),
    }
}
