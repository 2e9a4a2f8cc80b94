/*!
 * 单字符几何变换
 *
 * 变换顺序固定为：缩放 → 绕中心旋转 → 透视 → 正弦扭曲 → 平移到原点。
 * 正向映射 [`ForwardMap`] 与变换后的位图一起返回，包围盒计算直接使用它。
 */

use std::f32::consts::TAU;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tiny_skia::{Point, Transform};

use crate::Size;
use crate::glyph::GlyphBitmap;

// =============================================================================
// Transform Parameters
// =============================================================================

/// 竖直方向的正弦位移：`dy = amplitude * sin(2π * x / period + phase)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SineWarp {
    pub amplitude: f32,
    pub period: f32,
    pub phase: f32,
}

impl SineWarp {
    fn offset(&self, x: f32) -> f32 {
        self.amplitude * (TAU * x / self.period + self.phase).sin()
    }
}

/// 单个字形的具体变换参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformConfig {
    /// 等比缩放
    pub scale: f32,
    /// 旋转角度（度）
    pub rotation: f32,
    /// 透视：四个角（左上、右上、右下、左下）的偏移量
    pub perspective: Option<[(f32, f32); 4]>,
    pub warp: Option<SineWarp>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            scale: 1.0,
            rotation: 0.0,
            perspective: None,
            warp: None,
        }
    }
}

impl TransformConfig {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn rotation(degrees: f32) -> Self {
        Self {
            rotation: degrees,
            ..Self::default()
        }
    }
}

/// 随机变换参数的取值区间，每个区间为 `(min, max)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Distortion {
    pub scale: (f32, f32),
    /// 旋转角度区间（度）
    pub rotation: (f32, f32),
    /// 扭曲振幅（像素）
    pub warp_amplitude: (f32, f32),
    /// 扭曲周期（像素）
    pub warp_period: (f32, f32),
    /// 透视角点水平偏移幅度，相对字形宽度
    pub perspective_dx: (f32, f32),
    /// 透视角点竖直偏移幅度，相对字形高度
    pub perspective_dy: (f32, f32),
}

impl Default for Distortion {
    fn default() -> Self {
        Self {
            scale: (1.0, 1.0),
            rotation: (-30.0, 30.0),
            warp_amplitude: (0.0, 3.0),
            warp_period: (30.0, 60.0),
            perspective_dx: (0.1, 0.3),
            perspective_dy: (0.2, 0.3),
        }
    }
}

impl Distortion {
    /// 不做任何变形
    pub fn none() -> Self {
        Self {
            scale: (1.0, 1.0),
            rotation: (0.0, 0.0),
            warp_amplitude: (0.0, 0.0),
            warp_period: (30.0, 30.0),
            perspective_dx: (0.0, 0.0),
            perspective_dy: (0.0, 0.0),
        }
    }

    pub(crate) fn ranges(&self) -> [(&'static str, (f32, f32)); 6] {
        [
            ("scale", self.scale),
            ("rotation", self.rotation),
            ("warp_amplitude", self.warp_amplitude),
            ("warp_period", self.warp_period),
            ("perspective_dx", self.perspective_dx),
            ("perspective_dy", self.perspective_dy),
        ]
    }

    pub fn sample<R: Rng>(&self, rng: &mut R, source: Size) -> TransformConfig {
        let scale = uniform(rng, self.scale);
        let rotation = uniform(rng, self.rotation);

        let w = source.width as f32 * scale;
        let h = source.height as f32 * scale;
        let mx = uniform(rng, self.perspective_dx) * w;
        let my = uniform(rng, self.perspective_dy) * h;
        let perspective = if mx > 0.0 || my > 0.0 {
            let mut corners = [(0.0, 0.0); 4];
            for corner in &mut corners {
                *corner = (uniform(rng, (-mx, mx)), uniform(rng, (-my, my)));
            }
            Some(corners)
        } else {
            None
        };

        let amplitude = uniform(rng, self.warp_amplitude);
        let warp = if amplitude != 0.0 {
            Some(SineWarp {
                amplitude,
                period: uniform(rng, self.warp_period),
                phase: uniform(rng, (0.0, TAU)),
            })
        } else {
            None
        };

        TransformConfig {
            scale,
            rotation,
            perspective,
            warp,
        }
    }
}

pub(crate) fn uniform<R: Rng>(rng: &mut R, (min, max): (f32, f32)) -> f32 {
    if min < max {
        rng.random_range(min..=max)
    } else {
        min
    }
}

// =============================================================================
// Homography
// =============================================================================

/// 3×3 射影矩阵（行主序）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    m: [f64; 9],
}

impl Homography {
    /// 单位正方形到四边形，角点顺序 (0,0) (1,0) (1,1) (0,1)
    pub fn square_to_quad(quad: [(f64, f64); 4]) -> Option<Self> {
        const EPS: f64 = 1e-9;
        let [(x0, y0), (x1, y1), (x2, y2), (x3, y3)] = quad;
        let sx = x0 - x1 + x2 - x3;
        let sy = y0 - y1 + y2 - y3;

        let m = if sx.abs() < EPS && sy.abs() < EPS {
            // 平行四边形，退化为仿射
            [x1 - x0, x3 - x0, x0, y1 - y0, y3 - y0, y0, 0.0, 0.0, 1.0]
        } else {
            let dx1 = x1 - x2;
            let dx2 = x3 - x2;
            let dy1 = y1 - y2;
            let dy2 = y3 - y2;
            let det = dx1 * dy2 - dx2 * dy1;
            if det.abs() < EPS {
                return None;
            }
            let g = (sx * dy2 - dx2 * sy) / det;
            let h = (dx1 * sy - sx * dy1) / det;
            [
                x1 - x0 + g * x1,
                x3 - x0 + h * x3,
                x0,
                y1 - y0 + g * y1,
                y3 - y0 + h * y3,
                y0,
                g,
                h,
                1.0,
            ]
        };

        // 分母在四个角上都为正，矩形内部就不会穿过无穷远
        let [.., g, h, _] = m;
        let corners_ok = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]
            .iter()
            .all(|&(u, v)| g * u + h * v + 1.0 > EPS);
        corners_ok.then_some(Self { m })
    }

    /// 轴对齐矩形到四边形
    pub fn rect_to_quad(rect: &Extent, quad: [(f64, f64); 4]) -> Option<Self> {
        let w = rect.width() as f64;
        let h = rect.height() as f64;
        if w <= 0.0 || h <= 0.0 {
            return None;
        }
        let to_unit = Self {
            m: [
                1.0 / w,
                0.0,
                -rect.left as f64 / w,
                0.0,
                1.0 / h,
                -rect.top as f64 / h,
                0.0,
                0.0,
                1.0,
            ],
        };
        Some(Self::square_to_quad(quad)?.concat(&to_unit))
    }

    /// `self ∘ other`：先应用 `other`
    fn concat(&self, other: &Self) -> Self {
        let a = &self.m;
        let b = &other.m;
        let mut m = [0.0; 9];
        for row in 0..3 {
            for col in 0..3 {
                m[row * 3 + col] = (0..3).map(|k| a[row * 3 + k] * b[k * 3 + col]).sum();
            }
        }
        Self { m }
    }

    pub fn invert(&self) -> Option<Self> {
        let [a, b, c, d, e, f, g, h, i] = self.m;
        let co = [
            e * i - f * h,
            c * h - b * i,
            b * f - c * e,
            f * g - d * i,
            a * i - c * g,
            c * d - a * f,
            d * h - e * g,
            b * g - a * h,
            a * e - b * d,
        ];
        let det = a * co[0] + b * co[3] + c * co[6];
        if det.abs() < 1e-12 {
            return None;
        }
        Some(Self {
            m: co.map(|v| v / det),
        })
    }

    pub fn map(&self, p: Point) -> Point {
        let [a, b, c, d, e, f, g, h, i] = self.m;
        let (x, y) = (p.x as f64, p.y as f64);
        let w = g * x + h * y + i;
        Point::from_xy(((a * x + b * y + c) / w) as f32, ((d * x + e * y + f) / w) as f32)
    }
}

// =============================================================================
// Forward Map
// =============================================================================

/// 浮点包围范围
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Extent {
    pub fn empty() -> Self {
        Self {
            left: f32::INFINITY,
            top: f32::INFINITY,
            right: f32::NEG_INFINITY,
            bottom: f32::NEG_INFINITY,
        }
    }

    pub fn from_size(size: Size) -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            right: size.width as f32,
            bottom: size.height as f32,
        }
    }

    pub fn include(&mut self, p: Point) {
        self.left = self.left.min(p.x);
        self.top = self.top.min(p.y);
        self.right = self.right.max(p.x);
        self.bottom = self.bottom.max(p.y);
    }

    pub fn width(&self) -> f32 {
        (self.right - self.left).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.bottom - self.top).max(0.0)
    }

    pub fn translate(&self, dx: f32, dy: f32) -> Self {
        Self {
            left: self.left + dx,
            top: self.top + dy,
            right: self.right + dx,
            bottom: self.bottom + dy,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Stage {
    Affine {
        forward: Transform,
        inverse: Transform,
    },
    Projective {
        forward: Homography,
        inverse: Homography,
    },
    Warp(SineWarp),
}

impl Stage {
    fn affine(forward: Transform) -> Option<Self> {
        forward
            .invert()
            .map(|inverse| Stage::Affine { forward, inverse })
    }

    fn projective(forward: Homography) -> Option<Self> {
        forward
            .invert()
            .map(|inverse| Stage::Projective { forward, inverse })
    }

    fn is_linear(&self) -> bool {
        matches!(self, Stage::Affine { .. })
    }

    fn map(&self, p: Point) -> Point {
        match self {
            Stage::Affine { forward, .. } => map_affine(forward, p),
            Stage::Projective { forward, .. } => forward.map(p),
            Stage::Warp(warp) => Point::from_xy(p.x, p.y + warp.offset(p.x)),
        }
    }

    fn unmap(&self, p: Point) -> Point {
        match self {
            Stage::Affine { inverse, .. } => map_affine(inverse, p),
            Stage::Projective { inverse, .. } => inverse.map(p),
            // x 不变，所以可以直接求逆
            Stage::Warp(warp) => Point::from_xy(p.x, p.y - warp.offset(p.x)),
        }
    }
}

fn map_affine(ts: &Transform, p: Point) -> Point {
    let mut points = [p];
    ts.map_points(&mut points);
    points[0]
}

/// 从变换前字形局部坐标到变换后字形局部坐标的映射
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForwardMap {
    stages: Vec<Stage>,
}

impl ForwardMap {
    pub fn identity() -> Self {
        Self::default()
    }

    /// 按固定顺序构建映射，结果的包围范围左上角位于原点
    pub fn from_config(config: &TransformConfig, source: Size) -> Self {
        let mut map = Self::identity();
        if source.is_empty() {
            return map;
        }

        let scale = config.scale;
        if scale != 1.0 {
            map.push(Stage::affine(Transform::from_scale(scale, scale)));
        }

        if config.rotation != 0.0 {
            let cx = source.width as f32 * scale / 2.0;
            let cy = source.height as f32 * scale / 2.0;
            map.push(Stage::affine(Transform::from_rotate_at(config.rotation, cx, cy)));
        }

        if let Some(offsets) = config.perspective {
            let rect = map.extent(source);
            let corners = [
                (rect.left, rect.top),
                (rect.right, rect.top),
                (rect.right, rect.bottom),
                (rect.left, rect.bottom),
            ];
            let mut quad = [(0.0f64, 0.0f64); 4];
            for (dst, ((x, y), (dx, dy))) in quad.iter_mut().zip(corners.iter().zip(offsets)) {
                *dst = ((x + dx) as f64, (y + dy) as f64);
            }
            map.push(Homography::rect_to_quad(&rect, quad).and_then(Stage::projective));
        }

        if let Some(warp) = config.warp {
            if warp.amplitude != 0.0 && warp.period > 0.0 {
                map.push(Some(Stage::Warp(warp)));
            }
        }

        map.normalize(source);
        map
    }

    fn push(&mut self, stage: Option<Stage>) {
        // 不可逆的阶段（退化透视）直接丢弃
        if let Some(stage) = stage {
            self.stages.push(stage);
        }
    }

    fn normalize(&mut self, source: Size) {
        let extent = self.extent(source);
        if extent.left != 0.0 || extent.top != 0.0 {
            self.push(Stage::affine(Transform::from_translate(
                -extent.left,
                -extent.top,
            )));
        }
    }

    /// 追加一次缩放（挤压模式使用），原点不动
    pub fn then_scale(mut self, sx: f32, sy: f32) -> Self {
        if sx != 1.0 || sy != 1.0 {
            self.push(Stage::affine(Transform::from_scale(sx, sy)));
        }
        self
    }

    pub fn is_identity(&self) -> bool {
        self.stages.is_empty()
    }

    /// 只包含仿射阶段时，直线仍是直线
    pub fn is_linear(&self) -> bool {
        self.stages.iter().all(Stage::is_linear)
    }

    pub fn map_point(&self, x: f32, y: f32) -> (f32, f32) {
        let p = self
            .stages
            .iter()
            .fold(Point::from_xy(x, y), |p, stage| stage.map(p));
        (p.x, p.y)
    }

    pub fn unmap_point(&self, x: f32, y: f32) -> (f32, f32) {
        let p = self
            .stages
            .iter()
            .rev()
            .fold(Point::from_xy(x, y), |p, stage| stage.unmap(p));
        (p.x, p.y)
    }

    /// 源矩形经映射后的轴对齐包围范围。
    ///
    /// 仿射映射下只需四个角；含透视或扭曲时边不再是直线，额外沿四条边密集采样。
    pub fn extent(&self, source: Size) -> Extent {
        if source.is_empty() {
            return Extent::from_size(Size::new(0, 0));
        }

        let w = source.width as f32;
        let h = source.height as f32;
        let mut extent = Extent::empty();
        let mut include = |x: f32, y: f32| {
            let (mx, my) = self.map_point(x, y);
            extent.include(Point::from_xy(mx, my));
        };

        for (x, y) in [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)] {
            include(x, y);
        }

        if !self.is_linear() {
            let steps = (w.max(h) * 4.0).clamp(16.0, 4096.0) as usize;
            for i in 1..steps {
                let t = i as f32 / steps as f32;
                include(w * t, 0.0);
                include(w * t, h);
                include(0.0, h * t);
                include(w, h * t);
            }
        }

        extent
    }

    /// 容纳变换后字形所需的位图尺寸
    pub fn output_size(&self, source: Size) -> Size {
        if source.is_empty() {
            return Size::new(0, 0);
        }
        let extent = self.extent(source);
        Size::new(
            extent.right.max(0.0).ceil() as u32,
            extent.bottom.max(0.0).ceil() as u32,
        )
    }
}

// =============================================================================
// Resampling
// =============================================================================

/// 变换一个字形位图，同时返回所用的正向映射
pub fn apply(bitmap: &GlyphBitmap, config: &TransformConfig) -> (GlyphBitmap, ForwardMap) {
    let map = ForwardMap::from_config(config, bitmap.size());
    (resample(bitmap, &map), map)
}

/// 逆向映射每个目标像素中心，在源位图上双线性采样
pub fn resample(bitmap: &GlyphBitmap, map: &ForwardMap) -> GlyphBitmap {
    if bitmap.is_empty() {
        return GlyphBitmap::default();
    }

    let size = map.output_size(bitmap.size());
    let mut out = GlyphBitmap::new(size.width, size.height);

    for oy in 0..size.height {
        for ox in 0..size.width {
            let (sx, sy) = map.unmap_point(ox as f32 + 0.5, oy as f32 + 0.5);
            if !sx.is_finite() || !sy.is_finite() {
                continue;
            }
            out.coverage[(oy * size.width + ox) as usize] =
                sample_bilinear(bitmap, sx - 0.5, sy - 0.5);
        }
    }

    out
}

fn sample_bilinear(bitmap: &GlyphBitmap, x: f32, y: f32) -> u8 {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (ix, iy) = (x0 as i32, y0 as i32);

    let p00 = bitmap.get(ix, iy) as f32;
    let p10 = bitmap.get(ix + 1, iy) as f32;
    let p01 = bitmap.get(ix, iy + 1) as f32;
    let p11 = bitmap.get(ix + 1, iy + 1) as f32;

    let top = p00 + (p10 - p00) * fx;
    let bottom = p01 + (p11 - p01) * fx;
    (top + (bottom - top) * fy).round().clamp(0.0, 255.0) as u8
}
