/*!
 * 字符包围盒
 *
 * 用变换的正向映射计算变换后字形的轴对齐包围盒，再平移到画布坐标并截断到画布内。
 * 不依赖最终图像的 alpha 轮廓，因此结果与合成顺序、透明度阈值无关。
 */

use serde::{Deserialize, Serialize};

use crate::Size;
use crate::layout::Placement;
use crate::transform::ForwardMap;

/// 画布像素坐标下的矩形，原点在左上角。
///
/// 序列化为 `[x, y, width, height]`。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u32; 4]", into = "[u32; 4]")]
pub struct BBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl From<[u32; 4]> for BBox {
    fn from([x, y, width, height]: [u32; 4]) -> Self {
        Self::new(x, y, width, height)
    }
}

impl From<BBox> for [u32; 4] {
    fn from(b: BBox) -> Self {
        [b.x, b.y, b.width, b.height]
    }
}

/// 单个输入字符的包围盒，序列化为 `{"character": "A", "bbox": [x, y, w, h]}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacterBoundingBox {
    pub character: char,
    pub bbox: BBox,
}

/// 计算一个字符在画布中的包围盒。
///
/// 源矩形的角点（非线性映射时加上边上的采样点）经 `map` 映射后取轴对齐范围，
/// 平移 `placement`，截断到 `[0, canvas_width] × [0, canvas_height]`，
/// 最后两条边分别按四舍五入（0.5 进位）取整。
pub fn track(
    character: char,
    source: Size,
    map: &ForwardMap,
    placement: Placement,
    canvas_width: u32,
    canvas_height: u32,
) -> CharacterBoundingBox {
    let extent = map
        .extent(source)
        .translate(placement.x as f32, placement.y as f32);

    let (x, width) = clamp_span(extent.left, extent.right, canvas_width);
    let (y, height) = clamp_span(extent.top, extent.bottom, canvas_height);

    CharacterBoundingBox {
        character,
        bbox: BBox::new(x, y, width, height),
    }
}

/// 截断后的 `(起点, 长度)`；完全落在画布外时长度为 0，起点贴在最近的边上
fn clamp_span(start: f32, end: f32, limit: u32) -> (u32, u32) {
    let limit = limit as f32;
    let lo = start.clamp(0.0, limit);
    let hi = end.clamp(lo, limit);

    let lo = round_half_up(lo);
    let hi = round_half_up(hi).max(lo);
    (lo as u32, (hi - lo) as u32)
}

fn round_half_up(v: f32) -> f32 {
    (v + 0.5).floor()
}
