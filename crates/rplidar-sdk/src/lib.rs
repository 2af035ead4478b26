//! RPLIDAR SDK - 2D 激光雷达 Rust SDK
//!
//! 从任意切分、可能带噪声的字节流中重建测量点，并维护一张按方位索引的实时距离表。
//!
//! # 架构设计
//!
//! 本 SDK 采用分层架构，从底层到高层：
//!
//! - **协议层** (`protocol`): 帧头位域、命令编码、应答与压缩包解码
//! - **传输层** (`transport`): 串口 / TCP / 模拟设备的字节流抽象
//! - **驱动层** (`driver`): 帧解析状态机、方位向量表、钩子、应答关联、IO 线程
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use rplidar_sdk::prelude::*;
//! use std::time::Duration;
//!
//! rplidar_sdk::init_logger();
//!
//! let lidar = LidarBuilder::new().serial("/dev/ttyUSB0").build()?;
//! let info = lidar.device_info(Duration::from_secs(1))?;
//! println!("model 0x{:02X}, firmware {}", info.model, info.firmware_version());
//!
//! lidar.start_motor()?;
//! lidar.start_scan()?;
//! std::thread::sleep(Duration::from_secs(1));
//! println!("range ahead: {:.3} m", lidar.range_at_bearing(0.0));
//! # Ok::<(), DriverError>(())
//! ```
//!
//! 不需要线程时，可以直接把字节喂给 [`ScanProcessor`](driver::ScanProcessor)：
//!
//! ```rust
//! use rplidar_sdk::prelude::*;
//!
//! let mut processor = ScanProcessor::new(ProcessorConfig::default())?;
//! processor.feed(&[0xA5, 0x5A, 0x05, 0x00, 0x00, 0x00, 0x81, 0x3D, 0x01, 0x2D, 0x70, 0x17]);
//! assert_eq!(processor.range_at_bearing(90.0), 1.5);
//! # Ok::<(), DriverError>(())
//! ```

mod logging;

// Prelude 模块
pub mod prelude;

pub use rplidar_driver as driver;
pub use rplidar_protocol as protocol;
pub use rplidar_transport as transport;

// --- 用户以此为界 ---

pub use driver::{DriverError, Lidar, LidarBuilder, ScanProcessor};
pub use logging::{LoggerError, init_logger, try_init_logger};
pub use protocol::ProtocolError;
pub use transport::TransportError;
