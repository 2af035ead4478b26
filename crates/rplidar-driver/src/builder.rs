//! Builder 模式实现
//!
//! 提供链式构造 `Lidar` 实例的便捷方式。

use crate::config::ProcessorConfig;
use crate::error::DriverError;
use crate::lidar::Lidar;
use crate::pipeline::PipelineConfig;
use rplidar_transport::{SplittableTransport, TcpTransport};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// 默认串口波特率（A1 / A2M8）
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// 默认 TCP 连接超时
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// 连接目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// 串口设备路径
    Serial(PathBuf),
    /// TCP 地址（串口服务器 / 网络版雷达），`host:port`
    Tcp(String),
}

impl Endpoint {
    /// 解析连接字符串
    ///
    /// - `tcp://host:port` 或含 `:` 且不以 `/` 开头 → TCP
    /// - 其他 → 串口路径
    ///
    /// ```
    /// use rplidar_driver::Endpoint;
    ///
    /// assert_eq!(Endpoint::parse("tcp://10.0.0.2:20108"), Endpoint::Tcp("10.0.0.2:20108".into()));
    /// assert_eq!(Endpoint::parse("/dev/ttyUSB0"), Endpoint::Serial("/dev/ttyUSB0".into()));
    /// ```
    pub fn parse(s: &str) -> Self {
        if let Some(addr) = s.strip_prefix("tcp://") {
            return Endpoint::Tcp(addr.to_string());
        }
        if !s.starts_with('/') && s.contains(':') {
            return Endpoint::Tcp(s.to_string());
        }
        Endpoint::Serial(PathBuf::from(s))
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Serial(path) => write!(f, "{}", path.display()),
            Endpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
        }
    }
}

/// Lidar Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use rplidar_driver::{LidarBuilder, ProcessorConfig};
///
/// let lidar = LidarBuilder::new()
///     .serial("/dev/ttyUSB0")
///     .baud_rate(115_200)
///     .processor_config(ProcessorConfig {
///         bearing_offset_deg: 180.0,
///         ..Default::default()
///     })
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct LidarBuilder {
    endpoint: Option<Endpoint>,
    baud_rate: Option<u32>,
    connect_timeout: Option<Duration>,
    processor_config: ProcessorConfig,
    pipeline_config: PipelineConfig,
}

impl LidarBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置连接目标
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// 使用串口
    pub fn serial(self, path: impl Into<PathBuf>) -> Self {
        self.endpoint(Endpoint::Serial(path.into()))
    }

    /// 使用 TCP（`host:port`）
    pub fn tcp(self, addr: impl Into<String>) -> Self {
        self.endpoint(Endpoint::Tcp(addr.into()))
    }

    /// 设置串口波特率（可选，默认 115200）
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = Some(baud_rate);
        self
    }

    /// 设置 TCP 连接超时（可选，默认 3 秒）
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// 设置扫描处理器配置
    pub fn processor_config(mut self, config: ProcessorConfig) -> Self {
        self.processor_config = config;
        self
    }

    /// 设置 Pipeline 配置
    pub fn pipeline_config(mut self, config: PipelineConfig) -> Self {
        self.pipeline_config = config;
        self
    }

    /// 打开传输并启动 `Lidar`
    ///
    /// # 错误
    /// - `DriverError::InvalidConfig`: 未设置连接目标或配置非法
    /// - `DriverError::Transport`: 打开设备失败
    pub fn build(self) -> Result<Lidar, DriverError> {
        // 先校验，避免打开设备后才发现配置错误
        self.processor_config.validate()?;

        let endpoint = self
            .endpoint
            .clone()
            .ok_or_else(|| DriverError::InvalidConfig("no endpoint configured".to_string()))?;
        info!("Opening lidar at {}", endpoint);

        match &endpoint {
            Endpoint::Tcp(addr) => {
                let timeout = self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
                let transport = TcpTransport::connect(addr.as_str(), timeout)?;
                self.build_with(transport)
            },
            Endpoint::Serial(path) => self.build_serial(path),
        }
    }

    fn build_serial(self, path: &std::path::Path) -> Result<Lidar, DriverError> {
        use rplidar_transport::{SerialConfig, SerialTransport};

        let config = SerialConfig {
            baud_rate: self.baud_rate.unwrap_or(DEFAULT_BAUD_RATE),
            read_timeout: self.pipeline_config.receive_timeout(),
        };
        let transport = SerialTransport::open(path, config)?;
        // 丢弃打开前积累的旧数据
        transport.flush_input()?;
        self.build_with(transport)
    }

    /// 使用自定义传输启动 `Lidar`（测试、回放或其他字节源）
    pub fn build_with<T>(self, transport: T) -> Result<Lidar, DriverError>
    where
        T: SplittableTransport,
        T::Rx: Send + 'static,
        T::Tx: Send + 'static,
    {
        Lidar::new(transport, self.processor_config, self.pipeline_config)
    }
}
