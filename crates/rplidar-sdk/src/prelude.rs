//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use rplidar_sdk::prelude::*;
//! ```

// 驱动层
pub use crate::driver::{
    BearingVector, ChannelHook, Endpoint, HookManager, Lidar, LidarBuilder, LidarCallback,
    LidarEvent, MetricsSnapshot, PipelineConfig, ProcessorConfig, ScanProcessor, ScanSample,
};

// 协议层
pub use crate::protocol::{
    Command, DeviceHealth, DeviceInfo, ExpressScanConfig, HealthStatus, Response, ResponseType,
    SampleRate, ScanResponse,
};

// 传输层（常用 Trait）
pub use crate::transport::{LidarTransport, SplittableTransport};

// 错误类型
pub use crate::driver::DriverError;
pub use crate::protocol::ProtocolError;
pub use crate::transport::TransportError;
