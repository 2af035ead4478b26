//! 驱动层模块
//!
//! 本模块提供 RPLIDAR 扫描仪的设备驱动功能，包括：
//! - 帧解析状态机（任意切分的字节流 → 完整帧，失步后自动重新同步）
//! - 应答解码与 Express / Ultra 压缩包解压
//! - 方位向量表（按扇区的原子槽，带过期清理）
//! - 钩子系统：`on_sample` / `on_response` 同步扇出
//! - 命令/应答关联（有界交接通道，带超时等待）
//! - IO 线程管理（RX/TX 双线程）
//!
//! # 使用场景
//!
//! 不需要线程时直接使用 [`ScanProcessor`]：把任意字节源的数据喂给 `feed`。
//! 连接真实设备时使用 [`LidarBuilder`] 构建 [`Lidar`]。

mod activity;
mod buffer;
mod builder;
mod config;
mod context;
pub mod correlator;
mod error;
pub mod hooks;
mod lidar;
pub mod metrics;
pub mod parser;
pub mod pipeline;
mod processor;
mod sample;
pub mod vectors;

pub use activity::{ActivityMonitor, DEFAULT_ACTIVITY_WINDOW};
pub use buffer::ReceiveBuffer;
pub use builder::{DEFAULT_BAUD_RATE, DEFAULT_CONNECT_TIMEOUT, Endpoint, LidarBuilder};
pub use config::{MIN_BUFFER_CAPACITY, ProcessorConfig};
pub use context::LidarContext;
pub use correlator::{HandOff, ResponseCorrelator, ResponseWaiter};
pub use error::DriverError;
pub use hooks::{ChannelHook, HookManager, LidarCallback, LidarEvent};
pub use lidar::Lidar;
pub use metrics::{LidarMetrics, MetricsSnapshot};
pub use parser::{FrameDisposition, FrameParser, FrameSink, ParserState, ResyncReason};
pub use pipeline::{PipelineConfig, TxRequest, rx_loop, tx_loop};
pub use processor::ScanProcessor;
pub use sample::{MIN_ACCEPTED_RANGE_M, ScanSample};
pub use vectors::{BearingVector, BearingVectorStore};
