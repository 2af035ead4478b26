//! 扫描处理器
//!
//! 单一入口 `feed(&mut self, bytes)`：字节 → 帧解析 → 应答解码 →
//! {向量表更新, 事件扇出, 应答交接}，全部在调用线程内同步完成。
//!
//! `ScanProcessor` 不依赖任何线程或传输，可以直接在测试或自定义读循环中使用；
//! `Lidar` 的 RX 线程也是通过它处理数据。

use crate::config::ProcessorConfig;
use crate::context::LidarContext;
use crate::correlator::HandOff;
use crate::error::DriverError;
use crate::hooks::HookManager;
use crate::metrics::LidarMetrics;
use crate::parser::{FrameDisposition, FrameParser, FrameSink, ParserState, ResyncReason};
use crate::sample::ScanSample;
use rplidar_protocol::{
    CapsuleDecoder, FrameHeader, InvalidReason, ResponseMode, ResponseType, Response, ScanResponse,
};
use smallvec::SmallVec;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// 解析出的帧的接收方
struct FrameHandler {
    ctx: Arc<LidarContext>,
    metrics: Arc<LidarMetrics>,
    capsules: CapsuleDecoder,
    /// 本轮输入的接收时间
    now: Instant,
    /// 新测量流的第一帧尚未交接
    stream_handoff_pending: bool,
}

impl FrameHandler {
    fn classify(response: &Response) -> FrameDisposition {
        match response {
            Response::Invalid {
                reason: InvalidReason::UnknownType,
                ..
            } => FrameDisposition::Unrecognized,
            Response::Invalid { .. } => FrameDisposition::Misaligned,
            Response::Scan(scan) if !scan.is_valid() => FrameDisposition::Misaligned,
            _ => FrameDisposition::Accept,
        }
    }

    /// 单个测量点：写入向量表，接受后触发 `on_sample`
    fn ingest(&self, scan: &ScanResponse, hooks: Option<&HookManager>) {
        let sample = ScanSample::from_response(scan, self.now);
        if !self.ctx.vectors.update(&sample) {
            self.metrics.samples_rejected.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.ctx.activity.record(self.now);
        self.metrics.samples_accepted.fetch_add(1, Ordering::Relaxed);
        if let Some(hooks) = hooks {
            hooks.trigger_sample(&sample);
        }
    }

    fn hand_off(&self, response: &Response) {
        match self.ctx.correlator.offer(response) {
            HandOff::Dropped => {
                self.metrics.handoff_drops.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Response hand-off channel full, dropped 0x{:02X}",
                    response.response_type()
                );
            },
            HandOff::Delivered | HandOff::NoWaiter => {},
        }
    }
}

impl FrameSink for FrameHandler {
    fn on_frame(&mut self, header: &FrameHeader, payload: &[u8]) -> FrameDisposition {
        self.metrics.frames_total.fetch_add(1, Ordering::Relaxed);

        let response = Response::decode(header.response_type, payload);
        let disposition = Self::classify(&response);
        if response.is_invalid() {
            self.metrics.invalid_responses.fetch_add(1, Ordering::Relaxed);
            trace!("Invalid frame: {:?}", response);
        }

        // 注册回调时会短暂阻塞；锁被毒化时跳过事件
        let hooks = self.ctx.hooks.read().ok();

        if disposition == FrameDisposition::Accept {
            let scans: SmallVec<[ScanResponse; 1]> = match &response {
                Response::Scan(scan) => SmallVec::from_elem(*scan, 1),
                Response::ExpressScan(capsule) => self.capsules.push_express(capsule).into(),
                Response::UltraExpressScan(capsule) => self.capsules.push_ultra(capsule).into(),
                Response::DeviceInfo(info) => {
                    self.ctx.device_info.store(Some(Arc::new(*info)));
                    SmallVec::new()
                },
                Response::DeviceHealth(health) => {
                    self.ctx.device_health.store(Some(Arc::new(*health)));
                    SmallVec::new()
                },
                Response::SampleRate(rate) => {
                    self.ctx.sample_rate.store(Some(Arc::new(*rate)));
                    SmallVec::new()
                },
                Response::Invalid { .. } => SmallVec::new(),
            };
            for scan in scans.iter() {
                self.ingest(scan, hooks.as_deref());
            }
        }

        if let Some(hooks) = hooks.as_deref() {
            hooks.trigger_response(&response);
        }
        drop(hooks);

        if disposition == FrameDisposition::Accept {
            if header.mode == ResponseMode::SingleResponse {
                self.hand_off(&response);
            } else if self.stream_handoff_pending {
                self.stream_handoff_pending = false;
                self.hand_off(&response);
            }
        }

        disposition
    }

    fn on_stream_start(&mut self, header: &FrameHeader) {
        self.capsules.reset();
        self.stream_handoff_pending = true;
        debug!("Measurement stream 0x{:02X} started", header.response_type);
    }

    fn on_resync(&mut self, reason: ResyncReason) {
        self.metrics.resyncs.fetch_add(1, Ordering::Relaxed);
        match reason {
            ResyncReason::Overflow => {
                self.metrics.overflows.fetch_add(1, Ordering::Relaxed);
            },
            ResyncReason::Backoff => {
                self.metrics.backoffs.fetch_add(1, Ordering::Relaxed);
            },
            ResyncReason::MissingStartFlag
            | ResyncReason::ReservedMode
            | ResyncReason::ZeroLength
            | ResyncReason::Unrecognized => {},
        }
        // 缓存的压缩包只能与紧随其后的包配对，任何丢帧都使其作废
        self.capsules.reset();
    }
}

/// 扫描处理器
///
/// # Example
///
/// ```
/// use rplidar_driver::{ProcessorConfig, ScanProcessor};
/// use rplidar_protocol::{ResponseMode, ResponseType, ScanResponse, encode_frame};
///
/// let mut processor = ScanProcessor::new(ProcessorConfig::default()).unwrap();
/// let payload = ScanResponse::new(90.0, 1.5, 15, true).encode();
/// let bytes = encode_frame(ResponseMode::SingleResponse, ResponseType::Measurement, &payload).unwrap();
/// processor.feed(&bytes);
///
/// assert_eq!(processor.range_at_bearing(90.0), 1.5);
/// ```
pub struct ScanProcessor {
    parser: FrameParser,
    handler: FrameHandler,
    staleness_window: Duration,
    last_trim: Option<Instant>,
}

impl ScanProcessor {
    /// 创建处理器及其上下文
    ///
    /// # 错误
    /// - `DriverError::InvalidConfig`: 配置未通过校验
    pub fn new(config: ProcessorConfig) -> Result<Self, DriverError> {
        let ctx = Arc::new(LidarContext::new(&config)?);
        Ok(Self::with_context(&config, ctx, Arc::new(LidarMetrics::new())))
    }

    /// 使用已有的上下文与指标（由 `Lidar` 调用）
    pub fn with_context(
        config: &ProcessorConfig,
        ctx: Arc<LidarContext>,
        metrics: Arc<LidarMetrics>,
    ) -> Self {
        let mut parser = FrameParser::new(config.buffer_capacity);
        if let Some(kind) = config.forced_stream {
            parser.force_streaming(kind);
        }
        Self {
            parser,
            handler: FrameHandler {
                ctx,
                metrics,
                capsules: CapsuleDecoder::new(),
                now: Instant::now(),
                stream_handoff_pending: false,
            },
            staleness_window: config.staleness_window(),
            last_trim: None,
        }
    }

    /// 输入一段字节（以当前时间为接收时间）
    pub fn feed(&mut self, bytes: &[u8]) {
        self.feed_at(bytes, Instant::now());
    }

    /// 输入一段字节，`now` 作为其中所有测量点的时间戳
    pub fn feed_at(&mut self, bytes: &[u8], now: Instant) {
        self.handler.now = now;
        self.handler
            .metrics
            .bytes_received
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        self.parser.feed(bytes, &mut self.handler);
        self.maybe_trim(now);
    }

    /// 每个过期窗口最多清理一次
    fn maybe_trim(&mut self, now: Instant) {
        let due = self
            .last_trim
            .is_none_or(|last| now.saturating_duration_since(last) >= self.staleness_window);
        if due {
            let trimmed = self.handler.ctx.vectors.trim(now);
            if trimmed > 0 {
                trace!("Trimmed {} stale sectors", trimmed);
            }
            self.last_trim = Some(now);
        }
    }

    /// 丢弃缓冲，回到 `Sync`（Stop / Reset 之后调用）
    pub fn reset(&mut self) {
        self.parser.reset();
        self.handler.capsules.reset();
        self.handler.stream_handoff_pending = false;
        debug!("Scan processor reset");
    }

    /// 假定设备已在推送 `kind` 类型的测量流
    pub fn force_streaming(&mut self, kind: ResponseType) {
        self.parser.force_streaming(kind);
        self.handler.capsules.reset();
        self.handler.stream_handoff_pending = false;
    }

    pub fn state(&self) -> ParserState {
        self.parser.state()
    }

    pub fn context(&self) -> &Arc<LidarContext> {
        &self.handler.ctx
    }

    pub fn metrics(&self) -> &Arc<LidarMetrics> {
        &self.handler.metrics
    }

    pub fn range_at_bearing(&self, bearing_deg: f64) -> f64 {
        self.handler.ctx.vectors.range_at_bearing(bearing_deg)
    }

    pub fn is_active(&self) -> bool {
        self.handler.ctx.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{ChannelHook, LidarEvent};
    use crossbeam_channel::Receiver;
    use rplidar_protocol::{
        DeviceHealth, DeviceInfo, ExpressCabin, ExpressCapsule, HealthStatus, encode_frame,
    };

    fn processor() -> (ScanProcessor, Receiver<LidarEvent>) {
        let processor = ScanProcessor::new(ProcessorConfig::default()).unwrap();
        let (hook, rx) = ChannelHook::new(4096);
        processor
            .context()
            .hooks
            .write()
            .unwrap()
            .add_callback(Arc::new(hook));
        (processor, rx)
    }

    fn single_scan(angle: f64, range: f64, quality: u8) -> Vec<u8> {
        let payload = ScanResponse::new(angle, range, quality, false).encode();
        encode_frame(ResponseMode::SingleResponse, ResponseType::Measurement, &payload).unwrap()
    }

    fn scan_stream(samples: &[(f64, f64)]) -> Vec<u8> {
        let header =
            FrameHeader::new(5, ResponseMode::MultiResponse, ResponseType::Measurement).unwrap();
        let mut bytes = header.to_descriptor().to_vec();
        for &(angle, range) in samples {
            bytes.extend_from_slice(&ScanResponse::new(angle, range, 30, false).encode());
        }
        bytes
    }

    fn drain(rx: &Receiver<LidarEvent>) -> (Vec<ScanSample>, Vec<Response>) {
        let mut samples = Vec::new();
        let mut responses = Vec::new();
        for event in rx.try_iter() {
            match event {
                LidarEvent::Sample(s) => samples.push(s),
                LidarEvent::Response(r) => responses.push(r),
            }
        }
        (samples, responses)
    }

    #[test]
    fn test_single_measurement_scenario() {
        let (mut processor, rx) = processor();
        processor.feed(&[0xA5, 0x5A]);
        assert_eq!(processor.state(), ParserState::LengthModeAndType);

        processor.feed(&[0x05, 0x00, 0x00, 0x00, 0x81, 0x3D, 0x01, 0x2D, 0x70, 0x17]);

        let (samples, responses) = drain(&rx);
        assert_eq!(responses.len(), 1);
        assert!(matches!(responses[0], Response::Scan(_)));
        assert_eq!(samples.len(), 1);
        assert!((samples[0].bearing_deg - 90.0).abs() < 1e-9);
        assert!((samples[0].range_m - 1.5).abs() < 1e-9);
        assert_eq!(processor.state(), ParserState::Sync);
        assert_eq!(processor.range_at_bearing(90.0), 1.5);
        assert!(processor.is_active());

        let metrics = processor.metrics().snapshot();
        assert_eq!(metrics.frames_total, 1);
        assert_eq!(metrics.samples_accepted, 1);
        assert_eq!(metrics.bytes_received, 12);
    }

    #[test]
    fn test_rejected_sample_still_reported() {
        let (mut processor, rx) = processor();
        processor.feed(&single_scan(90.0, 1.5, 5));

        let (samples, responses) = drain(&rx);
        assert!(samples.is_empty());
        assert_eq!(responses.len(), 1);
        assert_eq!(processor.range_at_bearing(90.0), 0.0);
        assert!(!processor.is_active());
        assert_eq!(processor.metrics().snapshot().samples_rejected, 1);
    }

    #[test]
    fn test_invalid_frame_reported() {
        let (mut processor, rx) = processor();
        let bytes = encode_frame(ResponseMode::SingleResponse, 0x99u8, &[1, 2, 3]).unwrap();
        processor.feed(&bytes);

        let (_, responses) = drain(&rx);
        assert_eq!(responses.len(), 1);
        assert!(responses[0].is_invalid());
        assert_eq!(processor.metrics().snapshot().invalid_responses, 1);
        assert_eq!(processor.state(), ParserState::Sync);
    }

    #[test]
    fn test_stream_updates_store() {
        let (mut processor, rx) = processor();
        processor.feed(&scan_stream(&[(10.0, 1.0), (20.0, 2.0), (30.0, 3.0)]));

        let (samples, responses) = drain(&rx);
        assert_eq!(samples.len(), 3);
        assert_eq!(responses.len(), 3);
        assert_eq!(processor.range_at_bearing(20.0), 2.0);
        assert_eq!(processor.state(), ParserState::MultiResponse);
    }

    #[test]
    fn test_backoff_counts_metrics() {
        let (mut processor, _rx) = processor();
        let mut bytes = scan_stream(&[(10.0, 1.0)]);
        bytes.push(0x00);
        bytes.extend_from_slice(&ScanResponse::new(40.0, 4.0, 30, false).encode());
        processor.feed(&bytes);

        let metrics = processor.metrics().snapshot();
        assert_eq!(metrics.backoffs, 1);
        assert_eq!(metrics.resyncs, 1);
        assert_eq!(processor.range_at_bearing(40.0), 4.0);
    }

    #[test]
    fn test_staleness_through_feed() {
        let (mut processor, _rx) = processor();
        let t = Instant::now();
        let window = Duration::from_millis(500);
        let epsilon = Duration::from_millis(5);

        processor.feed_at(&single_scan(45.0, 3.0, 40), t);
        assert_eq!(processor.range_at_bearing(45.0), 3.0);

        processor.feed_at(&[0x00], t + window - epsilon);
        assert_eq!(processor.range_at_bearing(45.0), 3.0);

        processor.feed_at(&[0x00], t + window + epsilon);
        assert_eq!(processor.range_at_bearing(45.0), 0.0);
    }

    #[test]
    fn test_device_responses_cached_and_handed_off() {
        let (mut processor, _rx) = processor();
        let ctx = processor.context().clone();
        let waiter = ctx.correlator.register();

        let info = DeviceInfo {
            model: 0x18,
            firmware_minor: 29,
            firmware_major: 1,
            hardware: 7,
            serial_number: [0xAB; 16],
        };
        let health = DeviceHealth {
            status: HealthStatus::Warning,
            error_code: 3,
        };
        let mut bytes =
            encode_frame(ResponseMode::SingleResponse, ResponseType::DeviceInfo, &info.encode())
                .unwrap();
        bytes.extend(
            encode_frame(
                ResponseMode::SingleResponse,
                ResponseType::DeviceHealth,
                &health.encode(),
            )
            .unwrap(),
        );
        processor.feed(&bytes);

        assert_eq!(ctx.device_info.load().as_deref(), Some(&info));
        assert_eq!(ctx.device_health.load().as_deref(), Some(&health));
        assert_eq!(
            waiter.wait(Duration::from_millis(10)).unwrap(),
            Response::DeviceInfo(info)
        );
        assert_eq!(
            waiter.wait(Duration::from_millis(10)).unwrap(),
            Response::DeviceHealth(health)
        );
    }

    #[test]
    fn test_only_first_stream_frame_handed_off() {
        let (mut processor, _rx) = processor();
        let ctx = processor.context().clone();
        let waiter = ctx.correlator.register();

        processor.feed(&scan_stream(&[(10.0, 1.0), (20.0, 2.0), (30.0, 3.0)]));
        assert_eq!(ctx.correlator.pending(), 1);
        let first = waiter.wait(Duration::from_millis(10)).unwrap();
        assert_eq!(first, Response::Scan(ScanResponse::new(10.0, 1.0, 30, false)));
    }

    #[test]
    fn test_no_handoff_without_waiter() {
        let (mut processor, _rx) = processor();
        processor.feed(&single_scan(10.0, 1.0, 30));
        assert_eq!(processor.context().correlator.pending(), 0);
    }

    #[test]
    fn test_express_stream_samples() {
        let (mut processor, rx) = processor();
        let cabin = ExpressCabin {
            distance1_mm: 1000,
            distance2_mm: 2000,
            offset1_q3: 0,
            offset2_q3: 0,
        };
        let capsule = |angle_q6: u16| ExpressCapsule {
            start_angle_q6: angle_q6,
            start_of_scan: false,
            cabins: [cabin; 16],
        };
        let header = FrameHeader::new(
            84,
            ResponseMode::MultiResponse,
            ResponseType::MeasurementCapsuled,
        )
        .unwrap();
        let mut bytes = header.to_descriptor().to_vec();
        bytes.extend_from_slice(&capsule(0).encode());
        bytes.extend_from_slice(&capsule(10 << 6).encode());
        processor.feed(&bytes);

        let (samples, responses) = drain(&rx);
        assert_eq!(responses.len(), 2);
        // 第一个包的 32 个点在第二个包到达后才能解出
        assert_eq!(samples.len(), 32);
        assert!(samples.iter().all(|s| s.quality > 10));
        assert_eq!(processor.range_at_bearing(0.0), 1.0);
    }

    #[test]
    fn test_corrupt_capsule_drops_cached_capsule() {
        let (mut processor, rx) = processor();
        let cabin = ExpressCabin {
            distance1_mm: 1000,
            distance2_mm: 2000,
            offset1_q3: 0,
            offset2_q3: 0,
        };
        let capsule = |angle_q6: u16| ExpressCapsule {
            start_angle_q6: angle_q6,
            start_of_scan: false,
            cabins: [cabin; 16],
        };
        let header = FrameHeader::new(
            84,
            ResponseMode::MultiResponse,
            ResponseType::MeasurementCapsuled,
        )
        .unwrap();
        let mut corrupt = capsule(10 << 6).encode();
        corrupt[40] ^= 0xFF;

        let mut bytes = header.to_descriptor().to_vec();
        bytes.extend_from_slice(&capsule(0).encode());
        bytes.extend_from_slice(&corrupt);
        bytes.extend_from_slice(&capsule(20 << 6).encode());
        bytes.extend_from_slice(&capsule(30 << 6).encode());
        processor.feed(&bytes);

        let (samples, responses) = drain(&rx);
        assert!(responses.iter().any(|r| r.is_invalid()));
        assert!(processor.metrics().snapshot().backoffs > 0);

        // 0 度的包失去了后继，不能跨越丢失的包插值
        assert_eq!(samples.len(), 32);
        for sample in &samples {
            assert!(
                (20.0..30.0).contains(&sample.bearing_deg),
                "bearing {}",
                sample.bearing_deg
            );
        }
        assert_eq!(processor.range_at_bearing(5.0), 0.0);
        assert_eq!(processor.range_at_bearing(20.0), 1.0);
    }

    #[test]
    fn test_forced_stream_from_config() {
        let config = ProcessorConfig {
            forced_stream: Some(ResponseType::Measurement),
            ..Default::default()
        };
        let mut processor = ScanProcessor::new(config).unwrap();
        assert_eq!(processor.state(), ParserState::MultiResponse);

        processor.feed(&ScanResponse::new(77.0, 0.5, 20, false).encode());
        assert_eq!(processor.range_at_bearing(77.0), 0.5);
    }

    #[test]
    fn test_reset_returns_to_sync() {
        let (mut processor, _rx) = processor();
        processor.feed(&scan_stream(&[(10.0, 1.0)]));
        assert_eq!(processor.state(), ParserState::MultiResponse);

        processor.reset();
        assert_eq!(processor.state(), ParserState::Sync);
        // 残余的流数据不再被当作测量点
        processor.feed(&ScanResponse::new(50.0, 5.0, 30, false).encode());
        assert_eq!(processor.range_at_bearing(50.0), 0.0);
    }
}
