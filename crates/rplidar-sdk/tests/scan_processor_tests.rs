//! 扫描处理器集成测试
//!
//! 覆盖：单点场景、垃圾后的重新同步、接受条件、过期窗口、Express 解压、溢出恢复、
//! 强制流模式下的回退对齐。

mod common;

use common::*;
use rplidar_sdk::driver::ParserState;
use rplidar_sdk::prelude::*;
use rplidar_sdk::protocol::{ExpressCabin, ExpressCapsule, ResponseMode, encode_frame};
use std::time::{Duration, Instant};

#[test]
fn test_single_measurement_scenario() {
    let mut recorder = Recorder::new(ProcessorConfig::default());
    recorder.processor.feed(&[
        0xA5, 0x5A, 0x05, 0x00, 0x00, 0x00, 0x81, 0x3D, 0x01, 0x2D, 0x70, 0x17,
    ]);

    let events = recorder.drain();
    assert_eq!(events.len(), 2);
    match &events[0] {
        LidarEvent::Sample(sample) => {
            assert!((sample.bearing_deg - 90.0).abs() < 1e-9);
            assert!((sample.range_m - 1.5).abs() < 1e-9);
            assert_eq!(sample.quality, 15);
        },
        other => panic!("expected sample, got {:?}", other),
    }
    assert!(matches!(events[1], LidarEvent::Response(Response::Scan(_))));
    assert_eq!(recorder.processor.state(), ParserState::Sync);

    let vectors = recorder.processor.context().vectors.vectors();
    assert_eq!(vectors[(90.0f64 / 0.25).floor() as usize].range_m, 1.5);
}

#[test]
fn test_resync_after_garbage() {
    let mut recorder = Recorder::new(ProcessorConfig::default());
    let mut bytes = vec![0xA5, 0x00, 0xA5, 0xA5, 0x12, 0xFF, 0x5A, 0x01];
    bytes.extend(scan_frame(&ScanResponse::new(33.0, 2.25, 40, false)));
    recorder.processor.feed(&bytes);

    assert_eq!(
        recorder.responses(),
        vec![Response::Scan(ScanResponse::new(33.0, 2.25, 40, false))]
    );
    assert_eq!(recorder.processor.range_at_bearing(33.0), 2.25);
    assert_eq!(recorder.processor.metrics().snapshot().resyncs, 3);
}

#[test]
fn test_reserved_mode_resyncs() {
    let mut recorder = Recorder::new(ProcessorConfig::default());
    // mode = 2（保留）
    recorder
        .processor
        .feed(&[0xA5, 0x5A, 0x05, 0x00, 0x00, 0x80, 0x81]);
    assert_eq!(recorder.processor.state(), ParserState::Sync);

    recorder
        .processor
        .feed(&scan_frame(&ScanResponse::new(1.0, 1.0, 20, true)));
    assert_eq!(recorder.responses().len(), 1);
}

#[test]
fn test_acceptance_predicate() {
    let mut recorder = Recorder::new(ProcessorConfig::default());
    let processor = &mut recorder.processor;

    // 质量 5：永不写入
    processor.feed(&scan_frame(&ScanResponse::new(90.0, 1.5, 5, false)));
    assert_eq!(processor.range_at_bearing(90.0), 0.0);

    // 质量 10：边界值不接受
    processor.feed(&scan_frame(&ScanResponse::new(90.0, 1.5, 10, false)));
    assert_eq!(processor.range_at_bearing(90.0), 0.0);

    // 距离 1 mm：边界值不接受
    processor.feed(&scan_frame(&ScanResponse::new(90.0, 0.001, 40, false)));
    assert_eq!(processor.range_at_bearing(90.0), 0.0);

    processor.feed(&scan_frame(&ScanResponse::new(90.0, 1.5, 15, false)));
    let slot = (90.0f64 / 0.25).floor() as usize;
    assert_eq!(processor.context().vectors.vectors()[slot].range_m, 1.5);

    let metrics = processor.metrics().snapshot();
    assert_eq!(metrics.samples_rejected, 3);
    assert_eq!(metrics.samples_accepted, 1);
    // 被拒绝的点仍然产生 on_response
    assert_eq!(recorder.responses().len(), 4);
}

#[test]
fn test_staleness_window() {
    let mut recorder = Recorder::new(ProcessorConfig::default());
    let window = Duration::from_millis(500);
    let epsilon = Duration::from_millis(10);
    let t = Instant::now();

    recorder
        .processor
        .feed_at(&scan_frame(&ScanResponse::new(270.0, 4.0, 30, false)), t);
    assert_eq!(recorder.processor.range_at_bearing(270.0), 4.0);

    recorder.processor.feed_at(&[0x00], t + window - epsilon);
    assert_eq!(recorder.processor.range_at_bearing(270.0), 4.0);

    recorder.processor.feed_at(&[0x00], t + window + epsilon);
    assert_eq!(recorder.processor.range_at_bearing(270.0), 0.0);
    let vectors = recorder.processor.context().vectors.vectors();
    let slot = &vectors[(270.0f64 / 0.25) as usize];
    assert_eq!(slot.bearing_deg, 270.0);
    assert!(slot.refresh_time.is_none());
}

#[test]
fn test_express_capsule_stream() {
    let mut recorder = Recorder::new(ProcessorConfig::default());

    let mut cabins = [ExpressCabin::default(); 16];
    for (i, cabin) in cabins.iter_mut().enumerate() {
        cabin.distance1_mm = 500 + 20 * i as u16;
        cabin.distance2_mm = 510 + 20 * i as u16;
    }
    // 最后一个点带 1 度补偿
    cabins[15].offset2_q3 = 8;

    let anchor = ExpressCapsule {
        start_angle_q6: 10 << 6,
        start_of_scan: true,
        cabins,
    };
    let next = ExpressCapsule {
        start_angle_q6: (21 << 6) + 16,
        start_of_scan: false,
        cabins: [ExpressCabin::default(); 16],
    };

    let mut bytes = stream_descriptor(ResponseType::MeasurementCapsuled);
    bytes.extend_from_slice(&anchor.encode());
    bytes.extend_from_slice(&next.encode());
    recorder.processor.feed(&bytes);

    let samples: Vec<ScanSample> = recorder
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            LidarEvent::Sample(sample) => Some(sample),
            LidarEvent::Response(_) => None,
        })
        .collect();
    assert_eq!(samples.len(), 32);

    let step = 11.25 / 32.0;
    for (k, sample) in samples.iter().enumerate() {
        let offset = if k == 31 { 1.0 } else { 0.0 };
        let expected_angle = 10.0 + k as f64 * step - offset;
        let expected_range = (500 + 10 * k as u32) as f64 / 1000.0;
        assert!(
            (sample.bearing_deg - expected_angle).abs() <= 1.0 / 64.0,
            "sample {}: {} vs {}",
            k,
            sample.bearing_deg,
            expected_angle
        );
        assert!((sample.range_m - expected_range).abs() < 1e-9);
        assert_eq!(sample.quality, 47);
    }
}

#[test]
fn test_overflow_recovery() {
    let config = ProcessorConfig {
        buffer_capacity: 256,
        ..Default::default()
    };
    for chunk in [1usize, 7, 4096] {
        let mut recorder = Recorder::new(config.clone());

        // 声明 1000 字节负载的单次应答，超过缓冲区容量
        let mut bytes = vec![0xA5, 0x5A, 0xE8, 0x03, 0x00, 0x00, 0x81];
        bytes.extend(std::iter::repeat_n(0u8, 1000));
        bytes.extend(scan_frame(&ScanResponse::new(12.0, 0.75, 25, true)));
        recorder.feed_chunked(&bytes, &[chunk], Instant::now());

        assert_eq!(recorder.processor.range_at_bearing(12.0), 0.75, "chunk {}", chunk);
        assert_eq!(recorder.processor.state(), ParserState::Sync);
        let metrics = recorder.processor.metrics().snapshot();
        assert_eq!(metrics.overflows, 1, "chunk {}", chunk);
        assert_eq!(metrics.bytes_received, bytes.len() as u64);
    }
}

#[test]
fn test_large_legitimate_input_not_discarded() {
    let config = ProcessorConfig {
        buffer_capacity: 256,
        ..Default::default()
    };
    let mut recorder = Recorder::new(config);
    let mut bytes = Vec::new();
    for i in 0..200u16 {
        bytes.extend(scan_frame(&ScanResponse::new(i as f64, 1.0, 30, false)));
    }
    recorder.processor.feed(&bytes);

    assert_eq!(recorder.responses().len(), 200);
    assert_eq!(recorder.processor.metrics().snapshot().overflows, 0);
}

#[test]
fn test_forced_stream_aligns_by_backoff() {
    let config = ProcessorConfig {
        forced_stream: Some(ResponseType::Measurement),
        ..Default::default()
    };
    let mut recorder = Recorder::new(config);

    // 从流中间开始接收：前两个字节属于上一个点
    let mut bytes = vec![0x00, 0x00];
    for angle in [100.0, 101.0, 102.0] {
        bytes.extend_from_slice(&ScanResponse::new(angle, 2.0, 30, false).encode());
    }
    recorder.processor.feed(&bytes);

    assert_eq!(recorder.processor.metrics().snapshot().backoffs, 2);
    assert_eq!(recorder.processor.range_at_bearing(100.0), 2.0);
    assert_eq!(recorder.processor.range_at_bearing(102.0), 2.0);
    assert_eq!(recorder.processor.state(), ParserState::MultiResponse);
}

#[test]
fn test_device_info_opaque() {
    let mut recorder = Recorder::new(ProcessorConfig::default());
    let info = DeviceInfo {
        model: 0x28,
        firmware_minor: 24,
        firmware_major: 1,
        hardware: 5,
        serial_number: *b"0123456789abcdef",
    };
    let bytes = encode_frame(
        ResponseMode::SingleResponse,
        ResponseType::DeviceInfo,
        &info.encode(),
    )
    .unwrap();
    recorder.processor.feed(&bytes);

    assert_eq!(recorder.responses(), vec![Response::DeviceInfo(info)]);
    assert_eq!(
        recorder.processor.context().device_info.load().as_deref(),
        Some(&info)
    );
}

#[test]
fn test_wrong_length_is_invalid() {
    let mut recorder = Recorder::new(ProcessorConfig::default());
    let bytes = encode_frame(
        ResponseMode::SingleResponse,
        ResponseType::DeviceHealth,
        &[0x00, 0x00],
    )
    .unwrap();
    recorder.processor.feed(&bytes);

    let responses = recorder.responses();
    assert_eq!(responses.len(), 1);
    assert!(responses[0].is_invalid());
    assert_eq!(recorder.processor.state(), ParserState::Sync);
}
