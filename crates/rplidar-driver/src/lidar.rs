//! Lidar API 模块
//!
//! 提供对外的 `Lidar` 结构体，封装 RX/TX 线程、命令队列与应答等待。

use crate::config::ProcessorConfig;
use crate::context::LidarContext;
use crate::correlator::ResponseWaiter;
use crate::error::DriverError;
use crate::hooks::{HookManager, LidarCallback};
use crate::metrics::{LidarMetrics, MetricsSnapshot};
use crate::pipeline::{PipelineConfig, TxRequest, rx_loop, tx_loop};
use crate::processor::ScanProcessor;
use crate::vectors::BearingVector;
use crossbeam_channel::{Sender, TrySendError};
use rplidar_protocol::{
    Command, DEFAULT_MOTOR_PWM, DeviceHealth, DeviceInfo, ExpressScanConfig, Response,
    ResponseType, SampleRate,
};
use rplidar_transport::SplittableTransport;
use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::{JoinHandle, spawn};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// 命令队列容量
const COMMAND_QUEUE_CAPACITY: usize = 10;

/// Extension trait for timeout-capable thread joins
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()>;
}

impl<T: std::marker::Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();

        // Spawn a watchdog thread that joins the target thread
        spawn(move || {
            let result = self.join();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

/// 命令对应的应答类型（Express 扫描的类型取决于设备，返回 `None`）
fn expected_response(command: &Command) -> Option<ResponseType> {
    match command {
        Command::GetDeviceInfo => Some(ResponseType::DeviceInfo),
        Command::GetDeviceHealth => Some(ResponseType::DeviceHealth),
        Command::GetSampleRate => Some(ResponseType::SampleRate),
        Command::Scan | Command::ForceScan => Some(ResponseType::Measurement),
        Command::ExpressScan(_) | Command::Stop | Command::Reset | Command::SetMotorPwm(_) => None,
    }
}

/// RPLIDAR 驱动（对外 API）
///
/// RX 线程独占 [`ScanProcessor`]，TX 线程独占传输的写半边。
/// 方位向量表、缓存的设备应答与指标可以在任意线程读取。
pub struct Lidar {
    /// 命令发送通道
    ///
    /// 需要在 Drop 时 **提前关闭通道**（在 join TX 线程之前）。
    cmd_tx: ManuallyDrop<Sender<TxRequest>>,
    /// 共享状态上下文
    ctx: Arc<LidarContext>,
    /// RX 线程句柄
    rx_thread: Option<JoinHandle<()>>,
    /// TX 线程句柄
    tx_thread: Option<JoinHandle<()>>,
    /// 运行标志（用于线程生命周期联动）
    is_running: Arc<AtomicBool>,
    /// 解析器复位请求（由 RX 线程执行）
    reset_requested: Arc<AtomicBool>,
    /// 性能指标（原子计数器）
    metrics: Arc<LidarMetrics>,
    /// 传输描述（日志用）
    endpoint: String,
}

impl Lidar {
    /// 创建 Lidar 实例并启动 RX/TX 线程
    ///
    /// # 参数
    /// - `transport`: 可分离的传输（会被移动到 IO 线程）
    /// - `processor_config`: 扫描处理器配置
    /// - `pipeline_config`: IO 线程配置
    ///
    /// # 错误
    /// - `DriverError::InvalidConfig`: 处理器配置未通过校验
    /// - `DriverError::Transport`: 设置读超时或分离传输失败
    pub fn new<T>(
        mut transport: T,
        processor_config: ProcessorConfig,
        pipeline_config: PipelineConfig,
    ) -> Result<Self, DriverError>
    where
        T: SplittableTransport,
        T::Rx: Send + 'static,
        T::Tx: Send + 'static,
    {
        let ctx = Arc::new(LidarContext::new(&processor_config)?);
        let metrics = Arc::new(LidarMetrics::new());
        let processor = ScanProcessor::with_context(&processor_config, ctx.clone(), metrics.clone());

        transport.set_receive_timeout(pipeline_config.receive_timeout())?;
        let endpoint = transport.describe();
        let (rx, tx) = transport.split()?;

        let (cmd_tx, cmd_rx) = crossbeam_channel::bounded(COMMAND_QUEUE_CAPACITY);
        let is_running = Arc::new(AtomicBool::new(true));
        let reset_requested = Arc::new(AtomicBool::new(false));

        let is_running_rx = is_running.clone();
        let reset_rx = reset_requested.clone();
        let metrics_rx = metrics.clone();
        let rx_thread = std::thread::Builder::new()
            .name("rplidar-rx".into())
            .spawn(move || {
                rx_loop(
                    rx,
                    processor,
                    pipeline_config,
                    is_running_rx,
                    reset_rx,
                    metrics_rx,
                );
            })
            .map_err(|e| DriverError::IoThread(e.to_string()))?;

        let is_running_tx = is_running.clone();
        let metrics_tx = metrics.clone();
        let tx_thread = std::thread::Builder::new()
            .name("rplidar-tx".into())
            .spawn(move || {
                tx_loop(tx, cmd_rx, is_running_tx, metrics_tx);
            })
            .map_err(|e| DriverError::IoThread(e.to_string()))?;

        info!("Lidar connected: {}", endpoint);

        Ok(Self {
            cmd_tx: ManuallyDrop::new(cmd_tx),
            ctx,
            rx_thread: Some(rx_thread),
            tx_thread: Some(tx_thread),
            is_running,
            reset_requested,
            metrics,
            endpoint,
        })
    }

    /// 传输描述
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn enqueue(&self, request: TxRequest) -> Result<(), DriverError> {
        if !self.is_running.load(Ordering::Acquire) {
            return Err(DriverError::ChannelClosed);
        }
        self.cmd_tx.try_send(request).map_err(|e| match e {
            TrySendError::Full(_) => DriverError::ChannelFull(COMMAND_QUEUE_CAPACITY),
            TrySendError::Disconnected(_) => DriverError::ChannelClosed,
        })
    }

    /// 请求 RX 线程丢弃缓冲并回到 `Sync`
    pub fn request_parser_reset(&self) {
        self.reset_requested.store(true, Ordering::Release);
    }

    /// 发送命令（不等待应答）
    ///
    /// Stop / Reset 之后会请求解析器复位。
    ///
    /// # 错误
    /// - `DriverError::ChannelFull`: 命令队列已满
    /// - `DriverError::ChannelClosed`: IO 线程已退出
    pub fn send_command(&self, command: Command) -> Result<(), DriverError> {
        self.enqueue(TxRequest::Command(command.to_bytes()))?;
        if matches!(command, Command::Stop | Command::Reset) {
            self.request_parser_reset();
        }
        Ok(())
    }

    /// 登记应答等待者
    ///
    /// 自行发送原始命令时使用：先登记，再发送，再等待。
    pub fn waiter(&self) -> ResponseWaiter<'_> {
        self.ctx.correlator.register()
    }

    /// 发送命令并等待应答
    ///
    /// 扫描类命令的应答是新测量流的第一帧。
    ///
    /// # 错误
    /// - `DriverError::NoResponse`: 该命令没有应答
    /// - `DriverError::Timeout`: 超时（命令可能已经生效）
    pub fn send_command_and_wait(
        &self,
        command: Command,
        timeout: Duration,
    ) -> Result<Response, DriverError> {
        if !command.expects_response() {
            return Err(DriverError::NoResponse(command.code().into()));
        }
        let waiter = self.waiter();
        self.send_command(command)?;
        let response = match expected_response(&command) {
            Some(kind) => waiter.wait_for_type(kind, timeout)?,
            None => waiter.wait(timeout)?,
        };
        debug!(
            "Command {:?} answered with 0x{:02X}",
            command.code(),
            response.response_type()
        );
        Ok(response)
    }

    /// 查询设备信息
    pub fn device_info(&self, timeout: Duration) -> Result<DeviceInfo, DriverError> {
        match self.send_command_and_wait(Command::GetDeviceInfo, timeout)? {
            Response::DeviceInfo(info) => Ok(info),
            other => Err(unexpected(ResponseType::DeviceInfo, &other)),
        }
    }

    /// 查询健康状态
    pub fn health(&self, timeout: Duration) -> Result<DeviceHealth, DriverError> {
        match self.send_command_and_wait(Command::GetDeviceHealth, timeout)? {
            Response::DeviceHealth(health) => Ok(health),
            other => Err(unexpected(ResponseType::DeviceHealth, &other)),
        }
    }

    /// 查询采样周期
    pub fn sample_rate(&self, timeout: Duration) -> Result<SampleRate, DriverError> {
        match self.send_command_and_wait(Command::GetSampleRate, timeout)? {
            Response::SampleRate(rate) => Ok(rate),
            other => Err(unexpected(ResponseType::SampleRate, &other)),
        }
    }

    /// 开始标准扫描
    pub fn start_scan(&self) -> Result<(), DriverError> {
        self.send_command(Command::Scan)
    }

    /// 强制扫描（不等待转速稳定）
    pub fn force_scan(&self) -> Result<(), DriverError> {
        self.send_command(Command::ForceScan)
    }

    /// 开始 Express 扫描
    pub fn start_express_scan(&self, config: ExpressScanConfig) -> Result<(), DriverError> {
        self.send_command(Command::ExpressScan(config))
    }

    /// 停止扫描
    pub fn stop(&self) -> Result<(), DriverError> {
        self.send_command(Command::Stop)
    }

    /// 软复位
    pub fn reset(&self) -> Result<(), DriverError> {
        self.send_command(Command::Reset)
    }

    /// 设置电机 PWM（A2 配件板）
    pub fn set_motor_pwm(&self, pwm: u16) -> Result<(), DriverError> {
        self.send_command(Command::SetMotorPwm(pwm))
    }

    /// 设置 DTR 电平（A1 上 DTR 低电平驱动电机）
    pub fn set_motor_dtr(&self, level: bool) -> Result<(), DriverError> {
        self.enqueue(TxRequest::Dtr(level))
    }

    /// 启动电机（同时覆盖 A1 与 A2）
    pub fn start_motor(&self) -> Result<(), DriverError> {
        self.set_motor_dtr(false)?;
        self.set_motor_pwm(DEFAULT_MOTOR_PWM)
    }

    /// 停止电机
    pub fn stop_motor(&self) -> Result<(), DriverError> {
        self.set_motor_pwm(0)?;
        self.set_motor_dtr(true)
    }

    /// 最近收到的设备信息（无锁）
    pub fn latest_device_info(&self) -> Option<DeviceInfo> {
        self.ctx.device_info.load().as_deref().copied()
    }

    /// 最近收到的健康状态（无锁）
    pub fn latest_health(&self) -> Option<DeviceHealth> {
        self.ctx.device_health.load().as_deref().copied()
    }

    /// 最近收到的采样周期（无锁）
    pub fn latest_sample_rate(&self) -> Option<SampleRate> {
        self.ctx.sample_rate.load().as_deref().copied()
    }

    /// 更新航向（度）
    pub fn set_heading(&self, heading_deg: f64) {
        self.ctx.vectors.set_heading(heading_deg);
    }

    /// 更新安装偏角（度）
    pub fn set_bearing_offset(&self, offset_deg: f64) {
        self.ctx.vectors.set_bearing_offset(offset_deg);
    }

    /// 某一方位的距离（米），无数据时为 0
    pub fn range_at_bearing(&self, bearing_deg: f64) -> f64 {
        self.ctx.vectors.range_at_bearing(bearing_deg)
    }

    pub fn last_sample_time_at_bearing(&self, bearing_deg: f64) -> Option<Instant> {
        self.ctx.vectors.last_sample_time_at_bearing(bearing_deg)
    }

    /// 全部扇区的只读快照
    pub fn vectors(&self) -> Vec<BearingVector> {
        self.ctx.vectors.vectors()
    }

    /// 最近 1 秒内是否接受过测量点
    pub fn is_active(&self) -> bool {
        self.ctx.is_active()
    }

    /// 添加回调
    ///
    /// # 错误
    /// - `DriverError::PoisonedLock`: 回调锁被毒化
    pub fn add_callback(&self, callback: Arc<dyn LidarCallback>) -> Result<(), DriverError> {
        self.ctx
            .hooks
            .write()
            .map_err(|_| DriverError::PoisonedLock)?
            .add_callback(callback);
        Ok(())
    }

    /// 回调管理器
    pub fn hooks(&self) -> &Arc<RwLock<HookManager>> {
        &self.ctx.hooks
    }

    pub fn context(&self) -> &Arc<LidarContext> {
        &self.ctx
    }

    /// 获取性能指标快照
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// 检查线程健康状态
    ///
    /// # 返回
    /// - `(rx_alive, tx_alive)`
    pub fn check_health(&self) -> (bool, bool) {
        let rx_alive = self.rx_thread.as_ref().is_some_and(|h| !h.is_finished());
        let tx_alive = self.tx_thread.as_ref().is_some_and(|h| !h.is_finished());
        (rx_alive, tx_alive)
    }

    /// 运行中且两个线程都存活
    pub fn is_healthy(&self) -> bool {
        let (rx_alive, tx_alive) = self.check_health();
        self.is_running.load(Ordering::Acquire) && rx_alive && tx_alive
    }
}

fn unexpected(expected: ResponseType, actual: &Response) -> DriverError {
    DriverError::UnexpectedResponse {
        expected: expected.into(),
        actual: actual.response_type(),
    }
}

impl Drop for Lidar {
    fn drop(&mut self) {
        // 使用 Release 确保所有之前的写入对其他线程可见
        self.is_running.store(false, Ordering::Release);

        // 必须在 join 线程之前真正 drop 掉 Sender，否则接收端不会 Disconnected
        unsafe {
            ManuallyDrop::drop(&mut self.cmd_tx);
        }

        let join_timeout = Duration::from_secs(2);

        if let Some(handle) = self.rx_thread.take()
            && let Err(_e) = handle.join_timeout(join_timeout)
        {
            error!(
                "RX thread panicked or failed to shut down within {:?}",
                join_timeout
            );
        }

        if let Some(handle) = self.tx_thread.take()
            && let Err(_e) = handle.join_timeout(join_timeout)
        {
            error!(
                "TX thread panicked or failed to shut down within {:?}",
                join_timeout
            );
        }

        debug!("Lidar disconnected: {}", self.endpoint);
    }
}
