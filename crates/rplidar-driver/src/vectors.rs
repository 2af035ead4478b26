//! 方位向量表
//!
//! 按角度扇区索引的定长环形数组，创建时一次性分配，之后原地更新。
//! 每个扇区的 (距离, 刷新时间) 打包进一个 `AtomicU64`，写入方（RX 线程）与
//! 任意读取线程之间不需要锁，且读到的二者总是同一次写入的结果。
//!
//! 扇区索引使用 1/64 度整数运算：`index = floor(bearing_q6 / width_q6) mod slot_count`。

use crate::config::FULL_CIRCLE_Q6;
use crate::sample::ScanSample;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// 距离字段位宽（1/4 mm，最大约 262 m）
const RANGE_BITS: u32 = 20;
const RANGE_MASK: u64 = (1 << RANGE_BITS) - 1;
/// 时间字段最大值（微秒 + 1，约 203 天）
const STAMP_MAX: u64 = (1 << (64 - RANGE_BITS)) - 1;

/// 一个扇区的快照
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BearingVector {
    /// 扇区起始角度（度）
    pub bearing_deg: f64,
    /// 距离（米），0 表示无数据
    pub range_m: f64,
    /// 最近一次刷新时间，过期或从未写入时为 `None`
    pub refresh_time: Option<Instant>,
}

/// 方位向量表
#[derive(Debug)]
pub struct BearingVectorStore {
    anchor: Instant,
    sector_width_q6: u32,
    slots: Box<[AtomicU64]>,
    /// f64 位模式
    bearing_offset: AtomicU64,
    /// f64 位模式
    heading: AtomicU64,
    staleness_window: Duration,
}

impl BearingVectorStore {
    /// 创建向量表
    ///
    /// `sector_width_q6` 必须整除 `360 * 64`（由 `ProcessorConfig::validate` 保证）。
    pub fn new(sector_width_q6: u32, bearing_offset_deg: f64, staleness_window: Duration) -> Self {
        Self::with_anchor(
            Instant::now(),
            sector_width_q6,
            bearing_offset_deg,
            staleness_window,
        )
    }

    pub(crate) fn with_anchor(
        anchor: Instant,
        sector_width_q6: u32,
        bearing_offset_deg: f64,
        staleness_window: Duration,
    ) -> Self {
        let width = sector_width_q6.clamp(1, FULL_CIRCLE_Q6);
        let count = (FULL_CIRCLE_Q6 / width) as usize;
        Self {
            anchor,
            sector_width_q6: width,
            slots: (0..count).map(|_| AtomicU64::new(0)).collect(),
            bearing_offset: AtomicU64::new(bearing_offset_deg.to_bits()),
            heading: AtomicU64::new(0f64.to_bits()),
            staleness_window,
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn sector_width_deg(&self) -> f64 {
        self.sector_width_q6 as f64 / 64.0
    }

    pub fn staleness_window(&self) -> Duration {
        self.staleness_window
    }

    pub fn heading(&self) -> f64 {
        f64::from_bits(self.heading.load(Ordering::Relaxed))
    }

    /// 更新航向（度），可在任意线程调用
    pub fn set_heading(&self, heading_deg: f64) {
        self.heading.store(heading_deg.to_bits(), Ordering::Relaxed);
    }

    pub fn bearing_offset(&self) -> f64 {
        f64::from_bits(self.bearing_offset.load(Ordering::Relaxed))
    }

    pub fn set_bearing_offset(&self, offset_deg: f64) {
        self.bearing_offset.store(offset_deg.to_bits(), Ordering::Relaxed);
    }

    /// 角度对应的扇区索引
    pub fn index_of(&self, bearing_deg: f64) -> usize {
        let q6 = (bearing_deg * 64.0).floor() as i64;
        let q6 = q6.rem_euclid(FULL_CIRCLE_Q6 as i64) as u32;
        (q6 / self.sector_width_q6) as usize % self.slots.len()
    }

    /// 写入一个测量点
    ///
    /// 未通过接受条件的点被忽略，返回 `false`。
    pub fn update(&self, sample: &ScanSample) -> bool {
        if !sample.is_acceptable() {
            return false;
        }
        let adjusted = sample.bearing_deg + self.bearing_offset() + self.heading();
        let index = self.index_of(adjusted);
        let packed = self.pack(sample.range_m, sample.timestamp);
        self.slots[index].store(packed, Ordering::Release);
        true
    }

    /// 将超过过期窗口未刷新的扇区清零，返回清除的扇区数
    pub fn trim(&self, now: Instant) -> usize {
        let mut trimmed = 0;
        for slot in self.slots.iter() {
            let packed = slot.load(Ordering::Acquire);
            let Some(refreshed) = self.unpack_time(packed) else {
                continue;
            };
            if now.saturating_duration_since(refreshed) > self.staleness_window
                && slot
                    .compare_exchange(packed, 0, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
            {
                trimmed += 1;
            }
        }
        trimmed
    }

    /// 清空全部扇区
    pub fn clear(&self) {
        for slot in self.slots.iter() {
            slot.store(0, Ordering::Release);
        }
    }

    /// 某一方位的距离（米），无数据时为 0
    pub fn range_at_bearing(&self, bearing_deg: f64) -> f64 {
        let packed = self.slots[self.index_of(bearing_deg)].load(Ordering::Acquire);
        unpack_range(packed)
    }

    /// 某一方位最近一次刷新时间
    pub fn last_sample_time_at_bearing(&self, bearing_deg: f64) -> Option<Instant> {
        let packed = self.slots[self.index_of(bearing_deg)].load(Ordering::Acquire);
        self.unpack_time(packed)
    }

    /// 全部扇区的只读快照
    pub fn vectors(&self) -> Vec<BearingVector> {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                let packed = slot.load(Ordering::Acquire);
                BearingVector {
                    bearing_deg: (index as u32 * self.sector_width_q6) as f64 / 64.0,
                    range_m: unpack_range(packed),
                    refresh_time: self.unpack_time(packed),
                }
            })
            .collect()
    }

    fn pack(&self, range_m: f64, time: Instant) -> u64 {
        let range_q2 = ((range_m * 4000.0).round() as u64).min(RANGE_MASK);
        // 向上取整：记录的时间不早于实际采样时间，过期判断不会提前
        let nanos = time.saturating_duration_since(self.anchor).as_nanos();
        let micros = u64::try_from(nanos.div_ceil(1000)).unwrap_or(u64::MAX);
        let stamp = micros.saturating_add(1).min(STAMP_MAX);
        (stamp << RANGE_BITS) | range_q2
    }

    fn unpack_time(&self, packed: u64) -> Option<Instant> {
        match packed >> RANGE_BITS {
            0 => None,
            stamp => Some(self.anchor + Duration::from_micros(stamp - 1)),
        }
    }
}

fn unpack_range(packed: u64) -> f64 {
    (packed & RANGE_MASK) as f64 / 4000.0
}
