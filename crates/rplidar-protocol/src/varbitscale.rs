//! 可变位宽缩放（scale-bucket）编解码
//!
//! Ultra Express 测量包使用 12 bit 的"缩放值"表示最大约 28.6 m 的距离（mm）。
//! 距离越远，量化步长越大：
//!
//! | 缩放值区间 | 级别 | 步长 | 距离区间 (mm) |
//! |---|---|---|---|
//! | 3328..=4095 | 4 | 16 | 16384..=28671 |
//! | 1792..3328 | 3 | 8 | 4096..16384 |
//! | 1280..1792 | 2 | 4 | 2048..4096 |
//! | 512..1280 | 1 | 2 | 512..2048 |
//! | 0..512 | 0 | 1 | 0..512 |

/// 各级别对应的源值位阈值（`1 << bit` 为该级别的距离基值）
pub const SRC_BITS: [u32; 4] = [14, 12, 11, 9];

/// 各级别的缩放基值（降序）
const SCALED_BASE: [u32; 5] = [3328, 1792, 1280, 512, 0];
/// 各级别的位移量
const SCALED_LEVEL: [u32; 5] = [4, 3, 2, 1, 0];
/// 各级别的距离基值
const TARGET_BASE: [u32; 5] = [1 << 14, 1 << 12, 1 << 11, 1 << 9, 0];

/// 12 bit 缩放值的最大值
pub const MAX_SCALED: u32 = 0xFFF;

/// 可表示的最大距离（mm）
pub const MAX_DECODED: u32 = TARGET_BASE[0] + ((MAX_SCALED - SCALED_BASE[0]) << SCALED_LEVEL[0]);

/// 解码缩放值
///
/// 返回 `(距离, 级别)`。级别同时用于放大预测差值。
pub fn decode(scaled: u32) -> (u32, u32) {
    for i in 0..SCALED_BASE.len() {
        if let Some(remain) = scaled.checked_sub(SCALED_BASE[i]) {
            let level = SCALED_LEVEL[i];
            return (TARGET_BASE[i] + (remain << level), level);
        }
    }
    (0, 0)
}

/// 编码距离为缩放值
///
/// 返回 `(缩放值, 级别)`。超出范围的距离饱和到 [`MAX_SCALED`]；
/// 低于步长的部分被截断。
pub fn encode(value: u32) -> (u32, u32) {
    let value = value.min(MAX_DECODED);
    for i in 0..TARGET_BASE.len() {
        if let Some(remain) = value.checked_sub(TARGET_BASE[i]) {
            let level = SCALED_LEVEL[i];
            return (SCALED_BASE[i] + (remain >> level), level);
        }
    }
    (0, 0)
}
