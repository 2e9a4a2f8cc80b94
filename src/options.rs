/*!
 * 生成参数
 *
 * 所有字段都有默认值，`ImageCaptcha::new` 时统一校验。
 */

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::glyph::{FontSource, MissingGlyphPolicy};
use crate::layout::LayoutConfig;
use crate::transform::Distortion;

// =============================================================================
// Color
// =============================================================================

/// 非预乘 RGBA 颜色，文本形式为 `#RRGGBB` 或 `#RRGGBBAA`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// 各通道在 `[start, end]` 内均匀取值；`alpha` 为 `None` 时不透明
    pub fn random<R: Rng>(rng: &mut R, start: u8, end: u8, alpha: Option<(u8, u8)>) -> Self {
        let r = rng.random_range(start..=end);
        let g = rng.random_range(start..=end);
        let b = rng.random_range(start..=end);
        let a = match alpha {
            Some((lo, hi)) => rng.random_range(lo..=hi),
            None => 255,
        };
        Self { r, g, b, a }
    }

    pub fn to_skia(self) -> tiny_skia::Color {
        tiny_skia::Color::from_rgba8(self.r, self.g, self.b, self.a)
    }
}

impl FromStr for Color {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let hex = s.trim().trim_start_matches('#');
        let invalid = || Error::InvalidConfiguration(format!("invalid color '{s}'"));
        let channel = |i: usize| {
            hex.get(i..i + 2)
                .and_then(|c| u8::from_str_radix(c, 16).ok())
                .ok_or_else(invalid)
        };

        match hex.len() {
            6 => Ok(Self::rgb(channel(0)?, channel(2)?, channel(4)?)),
            8 => Ok(Self::rgba(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)?;
        if self.a != 255 {
            write!(f, "{:02x}", self.a)?;
        }
        Ok(())
    }
}

impl TryFrom<String> for Color {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

// =============================================================================
// Policies
// =============================================================================

/// 噪点、噪线相对文字的绘制顺序
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseOrder {
    BeforeText,
    #[default]
    AfterText,
}

/// 文字总宽度超过画布时的处理方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// 超出部分被裁掉，包围盒截断到画布内
    Clip,
    /// 水平压缩所有字形，使整行放进画布
    #[default]
    Squeeze,
}

// =============================================================================
// Options
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptchaOptions {
    pub width: u32,
    pub height: u32,
    /// 为空时使用内置字体。`FontSource::Bytes` 序列化时被略去
    #[serde(serialize_with = "serialize_fonts")]
    pub fonts: Vec<FontSource>,
    /// 候选字号，每个字符随机选一个
    pub font_sizes: Vec<f32>,
    /// 设置后忽略 `font_sizes`，在区间内均匀取字号
    pub font_size_range: Option<(f32, f32)>,
    /// 为空时随机浅色
    pub background: Option<Color>,
    /// 为空时每个字符随机深色
    pub foreground: Option<Color>,
    #[serde(flatten)]
    pub distortion: Distortion,
    /// 噪点噪线颜色；为空时沿用 `foreground`，两者都为空时每次随机
    pub noise_color: Option<Color>,
    pub noise_curves: u32,
    pub noise_dots: u32,
    pub dot_width: f32,
    pub noise_order: NoiseOrder,
    /// 最后做一次 3×3 平滑
    pub smooth: bool,
    pub overflow: OverflowPolicy,
    pub missing_glyph: MissingGlyphPolicy,
    pub layout: LayoutConfig,
    /// 固定种子时输出可复现
    pub seed: Option<u64>,
}

impl Default for CaptchaOptions {
    fn default() -> Self {
        Self {
            width: 160,
            height: 60,
            fonts: Vec::new(),
            font_sizes: vec![42.0, 50.0, 56.0],
            font_size_range: None,
            background: None,
            foreground: None,
            distortion: Distortion::default(),
            noise_color: None,
            noise_curves: 1,
            noise_dots: 30,
            dot_width: 3.0,
            noise_order: NoiseOrder::default(),
            smooth: true,
            overflow: OverflowPolicy::default(),
            missing_glyph: MissingGlyphPolicy::default(),
            layout: LayoutConfig::default(),
            seed: None,
        }
    }
}

impl CaptchaOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn font(mut self, source: FontSource) -> Self {
        self.fonts.push(source);
        self
    }

    pub fn fonts(mut self, sources: impl IntoIterator<Item = FontSource>) -> Self {
        self.fonts = sources.into_iter().collect();
        self
    }

    pub fn font_sizes(mut self, sizes: impl IntoIterator<Item = f32>) -> Self {
        self.font_sizes = sizes.into_iter().collect();
        self.font_size_range = None;
        self
    }

    pub fn font_size_range(mut self, min: f32, max: f32) -> Self {
        self.font_size_range = Some((min, max));
        self
    }

    pub fn background(mut self, color: Color) -> Self {
        self.background = Some(color);
        self
    }

    pub fn foreground(mut self, color: Color) -> Self {
        self.foreground = Some(color);
        self
    }

    pub fn distortion(mut self, distortion: Distortion) -> Self {
        self.distortion = distortion;
        self
    }

    pub fn rotation(mut self, min: f32, max: f32) -> Self {
        self.distortion.rotation = (min, max);
        self
    }

    pub fn warp(mut self, amplitude: (f32, f32), period: (f32, f32)) -> Self {
        self.distortion.warp_amplitude = amplitude;
        self.distortion.warp_period = period;
        self
    }

    pub fn perspective(mut self, dx: (f32, f32), dy: (f32, f32)) -> Self {
        self.distortion.perspective_dx = dx;
        self.distortion.perspective_dy = dy;
        self
    }

    pub fn noise(mut self, curves: u32, dots: u32) -> Self {
        self.noise_curves = curves;
        self.noise_dots = dots;
        self
    }

    pub fn noise_color(mut self, color: Color) -> Self {
        self.noise_color = Some(color);
        self
    }

    pub fn noise_order(mut self, order: NoiseOrder) -> Self {
        self.noise_order = order;
        self
    }

    pub fn smooth(mut self, smooth: bool) -> Self {
        self.smooth = smooth;
        self
    }

    pub fn overflow(mut self, policy: OverflowPolicy) -> Self {
        self.overflow = policy;
        self
    }

    pub fn missing_glyph(mut self, policy: MissingGlyphPolicy) -> Self {
        self.missing_glyph = policy;
        self
    }

    pub fn layout(mut self, layout: LayoutConfig) -> Self {
        self.layout = layout;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidConfiguration(msg));

        if self.width == 0 || self.height == 0 {
            return invalid(format!(
                "canvas must be at least 1x1, got {}x{}",
                self.width, self.height
            ));
        }

        match self.font_size_range {
            Some((min, max)) => {
                if !(min.is_finite() && max.is_finite()) || min <= 0.0 || min > max {
                    return invalid(format!("font size range [{min}, {max}] is invalid"));
                }
            }
            None => {
                if self.font_sizes.is_empty() {
                    return invalid("font size list is empty".into());
                }
                if let Some(bad) = self
                    .font_sizes
                    .iter()
                    .find(|s| !s.is_finite() || **s <= 0.0)
                {
                    return invalid(format!("font size {bad} must be positive"));
                }
            }
        }

        for (name, (min, max)) in self.distortion.ranges() {
            if !(min.is_finite() && max.is_finite()) || min > max {
                return invalid(format!("{name} range [{min}, {max}] is invalid"));
            }
        }
        if self.distortion.scale.0 <= 0.0 {
            return invalid("scale must be positive".into());
        }
        if self.distortion.warp_period.0 <= 0.0 {
            return invalid("warp period must be positive".into());
        }
        if self.distortion.perspective_dx.0 < 0.0 || self.distortion.perspective_dy.0 < 0.0 {
            return invalid("perspective offsets must not be negative".into());
        }

        let layout = &self.layout;
        if !(0.0..=1.0).contains(&layout.gap_probability) {
            return invalid(format!(
                "gap probability {} is outside [0, 1]",
                layout.gap_probability
            ));
        }
        if [layout.overlap_ratio, layout.gap_ratio, layout.start_ratio, layout.shift_ratio]
            .iter()
            .any(|r| r.is_nan() || *r < 0.0)
        {
            return invalid("layout ratios must not be negative".into());
        }

        if self.noise_dots > 0 && (self.dot_width.is_nan() || self.dot_width <= 0.0) {
            return invalid(format!("dot width {} must be positive", self.dot_width));
        }

        Ok(())
    }

    /// 按配置随机取一个字号
    pub(crate) fn pick_font_size<R: Rng>(&self, rng: &mut R) -> f32 {
        match self.font_size_range {
            Some(range) => crate::transform::uniform(rng, range),
            None => self.font_sizes[rng.random_range(0..self.font_sizes.len())],
        }
    }
}

/// 内存字体无法写进配置文件，只输出路径和族名
fn serialize_fonts<S: serde::Serializer>(
    fonts: &[FontSource],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(fonts.iter().filter(|f| !matches!(f, FontSource::Bytes(_))))
}
