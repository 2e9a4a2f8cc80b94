/*!
 * 字符排版
 *
 * 从左到右推进光标，给每个字符决定粘贴位置（变换后位图的左上角）。
 */

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::Size;

/// 变换后字形位图左上角在画布中的位置，可以为负或超出画布
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Placement {
    pub x: i32,
    pub y: i32,
}

impl Placement {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// 起始光标，相对平均字宽
    pub start_ratio: f32,
    /// 固定字距（像素），可为负
    pub spacing: i32,
    /// 随机重叠上限，相对平均字宽；每次前进减去 `[0, overlap_ratio * avg]`
    pub overlap_ratio: f32,
    /// 字符之间插入随机空隙的概率
    pub gap_probability: f64,
    /// 随机空隙宽度，相对平均字宽；空白字符也按这个宽度前进
    pub gap_ratio: f32,
    /// 竖直方向的随机偏移上限（像素）
    pub vertical_jitter: u32,
    /// 整行右侧有富余时，随机右移的上限，相对富余宽度
    pub shift_ratio: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            start_ratio: 0.1,
            spacing: 0,
            overlap_ratio: 0.25,
            gap_probability: 0.5,
            gap_ratio: 0.3,
            vertical_jitter: 4,
            shift_ratio: 0.5,
        }
    }
}

impl LayoutConfig {
    /// 等距排列，没有随机成分
    pub fn fixed(spacing: i32) -> Self {
        Self {
            start_ratio: 0.0,
            spacing,
            overlap_ratio: 0.0,
            gap_probability: 0.0,
            gap_ratio: 0.0,
            vertical_jitter: 0,
            shift_ratio: 0.0,
        }
    }
}

/// 为每个字形规划位置，返回顺序与 `glyph_sizes` 相同。
///
/// 不保证整体能放进画布：超出部分由合成阶段裁剪，包围盒阶段截断。
pub fn plan<R: Rng>(
    characters: &[char],
    canvas_width: u32,
    canvas_height: u32,
    glyph_sizes: &[Size],
    config: &LayoutConfig,
    rng: &mut R,
) -> Vec<Placement> {
    debug_assert_eq!(characters.len(), glyph_sizes.len());
    if glyph_sizes.is_empty() {
        return Vec::new();
    }

    let total: u32 = glyph_sizes.iter().map(|s| s.width).sum();
    let average = total as f32 / glyph_sizes.len() as f32;
    let max_overlap = (config.overlap_ratio * average) as i32;
    let gap = (config.gap_ratio * average).round() as i32;

    let mut cursor = (config.start_ratio * average) as i32;
    let mut right = cursor;
    let mut xs = Vec::with_capacity(glyph_sizes.len());

    for (i, (ch, size)) in characters.iter().zip(glyph_sizes).enumerate() {
        if i > 0 && config.gap_probability > 0.0 && rng.random_bool(config.gap_probability) {
            cursor += gap;
        }
        xs.push(cursor);
        right = right.max(cursor + size.width as i32);

        let advance = if size.width == 0 && ch.is_whitespace() {
            gap
        } else {
            size.width as i32
        };
        let jitter = if max_overlap > 0 {
            rng.random_range(-max_overlap..=0)
        } else {
            0
        };
        cursor += advance + config.spacing + jitter;
    }

    let slack = canvas_width as i32 - right;
    let max_shift = (slack.max(0) as f32 * config.shift_ratio) as i32;
    let shift = if max_shift > 0 {
        rng.random_range(0..=max_shift)
    } else {
        0
    };

    let jitter = config.vertical_jitter as i32;
    xs.into_iter()
        .zip(glyph_sizes)
        .map(|(x, size)| {
            let free = canvas_height as i32 - size.height as i32;
            let mut y = free / 2;
            if jitter > 0 {
                y += rng.random_range(-jitter..=jitter);
                if free >= 0 {
                    y = y.clamp(0, free);
                }
            }
            Placement::new(x + shift, y)
        })
        .collect()
}
