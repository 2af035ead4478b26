//! Express / Ultra Express 压缩测量包
//!
//! 两种测量包共用 4 字节前缀：
//!
//! ```text
//! Byte 0: 高 4 bit = 0xA，低 4 bit = checksum[3:0]
//! Byte 1: 高 4 bit = 0x5，低 4 bit = checksum[7:4]
//! Byte 2-3: u16 小端，Bit 0-14 = start_angle_q6，Bit 15 = 新一圈起始
//! ```
//!
//! checksum 为 Byte 2 至包尾的 XOR。
//!
//! 每个包内的点角度需要下一个包的起始角度插值，因此解码是有状态的：
//! [`CapsuleDecoder`] 缓存上一个包，收到下一个包时才输出上一个包的点。

use crate::ids::ResponseType;
use crate::response::{SYNTHESIZED_QUALITY, ScanResponse};
use crate::{ProtocolError, read_u16_le, read_u32_le, varbitscale, xor_checksum};
use bilge::prelude::*;

const SYNC_NIBBLE_1: u8 = 0xA;
const SYNC_NIBBLE_2: u8 = 0x5;

/// Express 包中的 cabin 数量
pub const EXPRESS_CABIN_COUNT: usize = 16;

/// Ultra 包中的 cabin 数量
pub const ULTRA_CABIN_COUNT: usize = 32;

/// 一圈的 q6 角度
const FULL_TURN_Q6: i64 = 360 << 6;
/// 一圈的 q8 角度
const FULL_TURN_Q8: i64 = 360 << 8;
/// 一圈的 q16 角度
const FULL_TURN_Q16: i64 = 360 << 16;

/// 起始角度字（Byte 2-3）
#[bitsize(16)]
#[derive(FromBits, DebugBits, Clone, Copy)]
pub struct StartAngleWord {
    pub angle_q6: u15,      // Bit 0-14
    pub start_of_scan: bool, // Bit 15
}

/// Express cabin 距离字：低 2 bit 为角度偏移的 Bit 4-5
#[bitsize(16)]
#[derive(FromBits, DebugBits, Clone, Copy)]
pub struct CabinDistance {
    pub offset_high: u2,
    pub distance_mm: u14,
}

/// Express cabin 偏移字节：两个角度偏移的低 4 bit
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy)]
pub struct CabinOffsets {
    pub offset1_low: u4,
    pub offset2_low: u4,
}

/// 校验同步 nibble 与 checksum
fn check_prefix(payload: &[u8]) -> Result<(), ProtocolError> {
    let (first, second) = (payload[0], payload[1]);
    if first >> 4 != SYNC_NIBBLE_1 || second >> 4 != SYNC_NIBBLE_2 {
        return Err(ProtocolError::InvalidSync { first, second });
    }
    let expected = (first & 0x0F) | ((second & 0x0F) << 4);
    let actual = xor_checksum(&payload[2..]);
    if expected != actual {
        return Err(ProtocolError::ChecksumMismatch { expected, actual });
    }
    Ok(())
}

/// 写入同步 nibble 与 checksum（`out[2..]` 必须已填好）
fn write_prefix(out: &mut [u8]) {
    let checksum = xor_checksum(&out[2..]);
    out[0] = (SYNC_NIBBLE_1 << 4) | (checksum & 0x0F);
    out[1] = (SYNC_NIBBLE_2 << 4) | (checksum >> 4);
}

fn write_start_angle(out: &mut [u8], start_angle_q6: u16, start_of_scan: bool) {
    let word = StartAngleWord::new(u15::new(start_angle_q6 & 0x7FFF), start_of_scan);
    out[2..4].copy_from_slice(&u16::from(word).to_le_bytes());
}

// ============================================================================
// Express (0x82)
// ============================================================================

/// Express cabin：两个点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExpressCabin {
    /// 第一个点的距离（mm，14 bit）
    pub distance1_mm: u16,
    /// 第二个点的距离（mm，14 bit）
    pub distance2_mm: u16,
    /// 第一个点的角度偏移（1/8 度，6 bit）
    pub offset1_q3: u8,
    /// 第二个点的角度偏移（1/8 度，6 bit）
    pub offset2_q3: u8,
}

impl ExpressCabin {
    fn parse(bytes: &[u8]) -> Self {
        let d1 = CabinDistance::from(read_u16_le(bytes, 0));
        let d2 = CabinDistance::from(read_u16_le(bytes, 2));
        let offsets = CabinOffsets::from(bytes[4]);
        Self {
            distance1_mm: d1.distance_mm().value(),
            distance2_mm: d2.distance_mm().value(),
            offset1_q3: offsets.offset1_low().value() | (d1.offset_high().value() << 4),
            offset2_q3: offsets.offset2_low().value() | (d2.offset_high().value() << 4),
        }
    }

    fn encode(&self) -> [u8; 5] {
        let d1 = CabinDistance::new(
            u2::new((self.offset1_q3 >> 4) & 0x3),
            u14::new(self.distance1_mm & 0x3FFF),
        );
        let d2 = CabinDistance::new(
            u2::new((self.offset2_q3 >> 4) & 0x3),
            u14::new(self.distance2_mm & 0x3FFF),
        );
        let offsets = CabinOffsets::new(
            u4::new(self.offset1_q3 & 0x0F),
            u4::new(self.offset2_q3 & 0x0F),
        );
        let a = u16::from(d1).to_le_bytes();
        let b = u16::from(d2).to_le_bytes();
        [a[0], a[1], b[0], b[1], u8::from(offsets)]
    }
}

/// Express 测量包（84 字节）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpressCapsule {
    pub start_angle_q6: u16,
    pub start_of_scan: bool,
    pub cabins: [ExpressCabin; EXPRESS_CABIN_COUNT],
}

impl ExpressCapsule {
    /// 编码为 84 字节负载（自动计算 checksum）
    pub fn encode(&self) -> [u8; 84] {
        let mut out = [0u8; 84];
        write_start_angle(&mut out, self.start_angle_q6, self.start_of_scan);
        for (i, cabin) in self.cabins.iter().enumerate() {
            let offset = 4 + i * 5;
            out[offset..offset + 5].copy_from_slice(&cabin.encode());
        }
        write_prefix(&mut out);
        out
    }
}

impl TryFrom<&[u8]> for ExpressCapsule {
    type Error = ProtocolError;

    fn try_from(payload: &[u8]) -> Result<Self, Self::Error> {
        let expected = ResponseType::MeasurementCapsuled.payload_len();
        if payload.len() != expected {
            return Err(ProtocolError::InvalidLength {
                kind: "MeasurementCapsuled",
                expected,
                actual: payload.len(),
            });
        }
        check_prefix(payload)?;

        let start = StartAngleWord::from(read_u16_le(payload, 2));
        let mut cabins = [ExpressCabin::default(); EXPRESS_CABIN_COUNT];
        for (i, cabin) in cabins.iter_mut().enumerate() {
            let offset = 4 + i * 5;
            *cabin = ExpressCabin::parse(&payload[offset..offset + 5]);
        }

        Ok(Self {
            start_angle_q6: start.angle_q6().value(),
            start_of_scan: start.start_of_scan(),
            cabins,
        })
    }
}

// ============================================================================
// Ultra Express (0x84)
// ============================================================================

/// Ultra cabin：三个点压缩在一个 u32 中
///
/// ```text
/// Bit 0-11:  major（缩放后的距离，见 varbitscale）
/// Bit 12-21: predict1（有符号 10 bit）
/// Bit 22-31: predict2（有符号 10 bit）
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UltraCabin(pub u32);

impl UltraCabin {
    /// 预测值的"无回波"标记
    pub const PREDICT_NO_RETURN: [i32; 2] = [-512, 511];

    pub fn new(major_scaled: u16, predict1: i16, predict2: i16) -> Self {
        let major = (major_scaled as u32) & 0xFFF;
        let p1 = ((predict1 as i32 as u32) & 0x3FF) << 12;
        let p2 = ((predict2 as i32 as u32) & 0x3FF) << 22;
        Self(major | p1 | p2)
    }

    pub fn major(&self) -> u32 {
        self.0 & 0xFFF
    }

    pub fn predict1(&self) -> i32 {
        ((self.0 << 10) as i32) >> 22
    }

    pub fn predict2(&self) -> i32 {
        (self.0 as i32) >> 22
    }
}

/// Ultra Express 测量包（132 字节）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UltraCapsule {
    pub start_angle_q6: u16,
    pub start_of_scan: bool,
    pub cabins: [UltraCabin; ULTRA_CABIN_COUNT],
}

impl UltraCapsule {
    /// 编码为 132 字节负载（自动计算 checksum）
    pub fn encode(&self) -> [u8; 132] {
        let mut out = [0u8; 132];
        write_start_angle(&mut out, self.start_angle_q6, self.start_of_scan);
        for (i, cabin) in self.cabins.iter().enumerate() {
            let offset = 4 + i * 4;
            out[offset..offset + 4].copy_from_slice(&cabin.0.to_le_bytes());
        }
        write_prefix(&mut out);
        out
    }
}

impl TryFrom<&[u8]> for UltraCapsule {
    type Error = ProtocolError;

    fn try_from(payload: &[u8]) -> Result<Self, Self::Error> {
        let expected = ResponseType::MeasurementCapsuledUltra.payload_len();
        if payload.len() != expected {
            return Err(ProtocolError::InvalidLength {
                kind: "MeasurementCapsuledUltra",
                expected,
                actual: payload.len(),
            });
        }
        check_prefix(payload)?;

        let start = StartAngleWord::from(read_u16_le(payload, 2));
        let mut cabins = [UltraCabin::default(); ULTRA_CABIN_COUNT];
        for (i, cabin) in cabins.iter_mut().enumerate() {
            *cabin = UltraCabin(read_u32_le(payload, 4 + i * 4));
        }

        Ok(Self {
            start_angle_q6: start.angle_q6().value(),
            start_of_scan: start.start_of_scan(),
            cabins,
        })
    }
}

// ============================================================================
// 有状态解码
// ============================================================================

/// 缓存的上一个测量包
#[derive(Debug, Clone, Copy)]
enum Previous {
    Express(ExpressCapsule),
    Ultra(UltraCapsule),
}

/// 压缩测量包解码器
///
/// 每收到一个包，输出**上一个**包解压出的点（Express 32 个，Ultra 96 个）。
/// 带起始标志的包、或与缓存类型不同的包会丢弃缓存，本次不输出。
#[derive(Debug, Default)]
pub struct CapsuleDecoder {
    previous: Option<Previous>,
}

/// 角度插值参数（q16）
struct Sweep {
    current_q16: i64,
    increment_q16: i64,
}

impl Sweep {
    /// `divisor` 为每个包的点数 / 32（Express 为 1，Ultra 为 3）
    fn new(previous_q6: u16, current_q6: u16, divisor: i64) -> Self {
        let previous_q8 = (previous_q6 as i64) << 2;
        let current_q8 = (current_q6 as i64) << 2;
        let mut diff_q8 = current_q8 - previous_q8;
        if previous_q8 > current_q8 {
            diff_q8 += FULL_TURN_Q8;
        }
        Self {
            current_q16: previous_q8 << 8,
            increment_q16: (diff_q8 << 3) / divisor,
        }
    }

    /// 当前点是否越过 0 度
    fn crosses_zero(&self) -> bool {
        (self.current_q16 + self.increment_q16) % FULL_TURN_Q16 < self.increment_q16
    }

    fn advance(&mut self) {
        self.current_q16 += self.increment_q16;
    }
}

fn wrap_q6(angle_q6: i64) -> u16 {
    angle_q6.rem_euclid(FULL_TURN_Q6) as u16
}

fn synthesized_sample(angle_q6: u16, distance_q2: u32, sync: bool) -> ScanResponse {
    ScanResponse {
        angle_q6,
        distance_q2,
        quality: if distance_q2 != 0 { SYNTHESIZED_QUALITY } else { 0 },
        sync,
        inverse_sync: !sync,
        check_bit: true,
    }
}

impl CapsuleDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 丢弃缓存（重新同步、停止扫描时调用）
    pub fn reset(&mut self) {
        self.previous = None;
    }

    /// 是否有缓存的包
    pub fn has_previous(&self) -> bool {
        self.previous.is_some()
    }

    /// 输入 Express 包，返回上一个包的点
    pub fn push_express(&mut self, capsule: &ExpressCapsule) -> Vec<ScanResponse> {
        let previous = match self.previous.take() {
            Some(Previous::Express(previous)) if !capsule.start_of_scan => Some(previous),
            _ => None,
        };
        self.previous = Some(Previous::Express(*capsule));

        let Some(previous) = previous else {
            return Vec::new();
        };

        let mut sweep = Sweep::new(previous.start_angle_q6, capsule.start_angle_q6, 1);
        let mut samples = Vec::with_capacity(EXPRESS_CABIN_COUNT * 2);
        for cabin in previous.cabins.iter() {
            let points = [
                (cabin.distance1_mm, cabin.offset1_q3),
                (cabin.distance2_mm, cabin.offset2_q3),
            ];
            for (distance_mm, offset_q3) in points {
                let angle_q6 = (sweep.current_q16 - ((offset_q3 as i64) << 13)) >> 10;
                let sync = sweep.crosses_zero();
                sweep.advance();
                samples.push(synthesized_sample(
                    wrap_q6(angle_q6),
                    (distance_mm as u32) << 2,
                    sync,
                ));
            }
        }
        samples
    }

    /// 输入 Ultra 包，返回上一个包的点
    pub fn push_ultra(&mut self, capsule: &UltraCapsule) -> Vec<ScanResponse> {
        let previous = match self.previous.take() {
            Some(Previous::Ultra(previous)) if !capsule.start_of_scan => Some(previous),
            _ => None,
        };
        self.previous = Some(Previous::Ultra(*capsule));

        let Some(previous) = previous else {
            return Vec::new();
        };

        let mut sweep = Sweep::new(previous.start_angle_q6, capsule.start_angle_q6, 3);
        let mut samples = Vec::with_capacity(ULTRA_CABIN_COUNT * 3);
        for (pos, cabin) in previous.cabins.iter().enumerate() {
            // 最后一个 cabin 的第三个点以下一个包的第一个 cabin 为基准
            let next = if pos + 1 == ULTRA_CABIN_COUNT {
                capsule.cabins[0]
            } else {
                previous.cabins[pos + 1]
            };

            for distance_q2 in ultra_distances_q2(cabin, &next) {
                let offset_q16 = ultra_offset_q16(distance_q2);
                let offset_deg_q16 = (offset_q16 as f64 * 180.0 / std::f64::consts::PI) as i64;
                let angle_q6 = (sweep.current_q16 - offset_deg_q16) >> 10;
                let sync = sweep.crosses_zero();
                sweep.advance();
                samples.push(synthesized_sample(wrap_q6(angle_q6), distance_q2, sync));
            }
        }
        samples
    }
}

/// 解压 Ultra cabin 的三个距离（q2）
fn ultra_distances_q2(cabin: &UltraCabin, next: &UltraCabin) -> [u32; 3] {
    let (major, level1) = varbitscale::decode(cabin.major());
    let (major2, level2) = varbitscale::decode(next.major());

    let (mut base1, mut level1) = (major as i64, level1);
    let base2 = major2 as i64;
    if major == 0 && major2 != 0 {
        base1 = base2;
        level1 = level2;
    }

    let predicted = |predict: i32, base: i64, level: u32| -> u32 {
        if UltraCabin::PREDICT_NO_RETURN.contains(&predict) {
            0
        } else {
            ((((predict as i64) << level) + base).max(0) << 2) as u32
        }
    };

    [
        major << 2,
        predicted(cabin.predict1(), base1, level1),
        predicted(cabin.predict2(), base2, level2),
    ]
}

/// Ultra 点的角度偏移（弧度，q16）
fn ultra_offset_q16(distance_q2: u32) -> i64 {
    const K1: i64 = 98361;
    let pi = std::f64::consts::PI;
    if distance_q2 >= 50 * 4 {
        let k2 = K1 / distance_q2 as i64;
        (8.0 * pi * 65536.0 / 180.0) as i64 - (k2 << 6) - (k2 * k2 * k2) / 98304
    } else {
        (7.5 * pi * 65536.0 / 180.0) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn express(start_deg: u16, start_of_scan: bool, cabin: ExpressCabin) -> ExpressCapsule {
        ExpressCapsule {
            start_angle_q6: start_deg << 6,
            start_of_scan,
            cabins: [cabin; EXPRESS_CABIN_COUNT],
        }
    }

    #[test]
    fn test_express_cabin_fields() {
        let cabin = ExpressCabin {
            distance1_mm: 1500,
            distance2_mm: 0x3FFF,
            offset1_q3: 0b11_0101,
            offset2_q3: 0b10_1010,
        };
        let bytes = cabin.encode();
        // 1500 << 2 | 0b11
        assert_eq!(u16::from_le_bytes([bytes[0], bytes[1]]), (1500 << 2) | 0b11);
        assert_eq!(bytes[4], 0b1010_0101);
        assert_eq!(ExpressCabin::parse(&bytes), cabin);
    }

    #[test]
    fn test_express_capsule_round_trip() {
        let capsule = express(
            10,
            false,
            ExpressCabin {
                distance1_mm: 1000,
                distance2_mm: 2000,
                offset1_q3: 8,
                offset2_q3: 16,
            },
        );
        let bytes = capsule.encode();
        assert_eq!(bytes[0] >> 4, 0xA);
        assert_eq!(bytes[1] >> 4, 0x5);
        assert_eq!(ExpressCapsule::try_from(&bytes[..]).unwrap(), capsule);
    }

    #[test]
    fn test_express_capsule_bad_sync() {
        let mut bytes = express(10, false, ExpressCabin::default()).encode();
        bytes[0] &= 0x0F;
        assert!(matches!(
            ExpressCapsule::try_from(&bytes[..]),
            Err(ProtocolError::InvalidSync { .. })
        ));
    }

    #[test]
    fn test_express_capsule_bad_checksum() {
        let mut bytes = express(10, false, ExpressCabin::default()).encode();
        bytes[40] ^= 0xFF;
        assert!(matches!(
            ExpressCapsule::try_from(&bytes[..]),
            Err(ProtocolError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_decoder_needs_successor() {
        let mut decoder = CapsuleDecoder::new();
        let first = express(10, false, ExpressCabin::default());
        assert!(decoder.push_express(&first).is_empty());
        assert!(decoder.has_previous());

        let second = express(20, false, ExpressCabin::default());
        assert_eq!(decoder.push_express(&second).len(), 32);
    }

    #[test]
    fn test_decoder_interpolates_angles() {
        let mut decoder = CapsuleDecoder::new();
        let cabin = ExpressCabin {
            distance1_mm: 1500,
            distance2_mm: 0,
            offset1_q3: 8, // 1 度
            offset2_q3: 0,
        };
        decoder.push_express(&express(10, false, cabin));
        let samples = decoder.push_express(&express(20, false, cabin));

        // 第 0 个点：10° - 1° = 9°
        assert_eq!(samples[0].angle_q6, 9 << 6);
        assert_eq!(samples[0].distance_q2, 1500 << 2);
        assert_eq!(samples[0].quality, SYNTHESIZED_QUALITY);
        assert!(samples[0].is_valid());

        // 第 1 个点：10° + 10°/32，无回波
        assert!((samples[1].angle_deg() - 10.3125).abs() < 1e-9);
        assert_eq!(samples[1].distance_q2, 0);
        assert_eq!(samples[1].quality, 0);

        // 第 k 个点 (偶数) 的角度 = 10 + k * 10 / 32 - 1
        let k = 16;
        assert!((samples[k].angle_deg() - (10.0 + k as f64 * 10.0 / 32.0 - 1.0)).abs() < 1e-9);
    }

    #[test]
    fn test_decoder_wraps_past_zero() {
        let mut decoder = CapsuleDecoder::new();
        let cabin = ExpressCabin {
            distance1_mm: 800,
            distance2_mm: 800,
            offset1_q3: 0,
            offset2_q3: 0,
        };
        decoder.push_express(&express(350, false, cabin));
        let samples = decoder.push_express(&express(10, false, cabin));
        assert_eq!(samples.len(), 32);
        assert!(samples.iter().all(|s| s.angle_deg() < 360.0));
        // 跨越 0 度的那个点被标记为新一圈
        assert_eq!(samples.iter().filter(|s| s.sync).count(), 1);
        assert!(samples.last().unwrap().angle_deg() < 10.0);
    }

    #[test]
    fn test_decoder_start_flag_discards_previous() {
        let mut decoder = CapsuleDecoder::new();
        decoder.push_express(&express(10, false, ExpressCabin::default()));
        assert!(decoder.push_express(&express(20, true, ExpressCabin::default())).is_empty());
        assert_eq!(
            decoder.push_express(&express(30, false, ExpressCabin::default())).len(),
            32
        );

        decoder.reset();
        assert!(!decoder.has_previous());
    }

    #[test]
    fn test_ultra_cabin_fields() {
        let cabin = UltraCabin::new(1500, -3, 200);
        assert_eq!(cabin.major(), 1500);
        assert_eq!(cabin.predict1(), -3);
        assert_eq!(cabin.predict2(), 200);

        let cabin = UltraCabin::new(0xFFF, -512, 511);
        assert_eq!(cabin.predict1(), -512);
        assert_eq!(cabin.predict2(), 511);
    }

    #[test]
    fn test_ultra_capsule_round_trip() {
        let capsule = UltraCapsule {
            start_angle_q6: 123 << 6,
            start_of_scan: true,
            cabins: [UltraCabin::new(700, 1, -1); ULTRA_CABIN_COUNT],
        };
        let bytes = capsule.encode();
        assert_eq!(UltraCapsule::try_from(&bytes[..]).unwrap(), capsule);
    }

    #[test]
    fn test_ultra_distances() {
        // major 1280 -> 2048 mm，级别 2；预测 +3 -> +12 mm
        let cabin = UltraCabin::new(1280, 3, -512);
        let next = UltraCabin::new(512, 0, 0);
        let d = ultra_distances_q2(&cabin, &next);
        assert_eq!(d[0], 2048 << 2);
        assert_eq!(d[1], (2048 + 12) << 2);
        // -512 表示无回波
        assert_eq!(d[2], 0);
    }

    #[test]
    fn test_ultra_zero_major_borrows_next_base() {
        let cabin = UltraCabin::new(0, 2, 0);
        let next = UltraCabin::new(600, 0, 0); // 600 -> 688 mm，级别 1
        let d = ultra_distances_q2(&cabin, &next);
        assert_eq!(d[0], 0);
        assert_eq!(d[1], (688 + (2 << 1)) << 2);
        assert_eq!(d[2], 688 << 2);
    }

    #[test]
    fn test_ultra_decoder_emits_three_per_cabin() {
        let mut decoder = CapsuleDecoder::new();
        let capsule = |start: u16| UltraCapsule {
            start_angle_q6: start << 6,
            start_of_scan: false,
            cabins: [UltraCabin::new(1000, 0, 0); ULTRA_CABIN_COUNT],
        };
        assert!(decoder.push_ultra(&capsule(100)).is_empty());
        let samples = decoder.push_ultra(&capsule(110));
        assert_eq!(samples.len(), 96);
        assert!(samples.iter().all(|s| s.quality == SYNTHESIZED_QUALITY));
        // 角度单调递增，且落在 [100 - 8, 110) 附近
        for pair in samples.windows(2) {
            assert!(pair[1].angle_q6 >= pair[0].angle_q6);
        }
        assert!(samples[0].angle_deg() > 90.0 && samples[0].angle_deg() < 100.0);
    }

    #[test]
    fn test_mixed_capsule_kinds_reset_cache() {
        let mut decoder = CapsuleDecoder::new();
        decoder.push_express(&express(10, false, ExpressCabin::default()));
        let ultra = UltraCapsule {
            start_angle_q6: 20 << 6,
            start_of_scan: false,
            cabins: [UltraCabin::default(); ULTRA_CABIN_COUNT],
        };
        assert!(decoder.push_ultra(&ultra).is_empty());
    }
}
