/*!
 * Araea Captcha Library
 *
 * 纯 Rust 实现的验证码图片生成库：扭曲文字 + 噪点背景，
 * 并可返回每个字符在最终图像中的包围盒（用作标注数据）。
 */

pub mod bbox;
mod captcha;
mod compose;
mod error;
pub mod glyph;
pub mod layout;
mod options;
pub mod transform;

use image::RgbImage;
use serde::{Deserialize, Serialize};

pub use bbox::{BBox, CharacterBoundingBox};
pub use captcha::ImageCaptcha;
pub use compose::{annotate, encode_png};
pub use error::{Error, Result};
pub use glyph::{FontSet, FontSource, GlyphBitmap, GlyphRasterizer, MissingGlyphPolicy};
pub use layout::{LayoutConfig, Placement};
pub use options::{CaptchaOptions, Color, NoiseOrder, OverflowPolicy};
pub use transform::{Distortion, ForwardMap, TransformConfig};

// =============================================================================
// Public Data Types
// =============================================================================

/// 像素尺寸
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

// =============================================================================
// Shortcuts
// =============================================================================

/// 用给定参数生成一张验证码；随机源来自 `options.seed`
pub fn generate(text: &str, options: &CaptchaOptions) -> Result<RgbImage> {
    let captcha = ImageCaptcha::new(options.clone())?;
    captcha.generate(text, &mut captcha.rng())
}

/// 同 [`generate`]，额外按输入顺序返回每个字符的包围盒
pub fn generate_with_bounding_boxes(
    text: &str,
    options: &CaptchaOptions,
) -> Result<(RgbImage, Vec<CharacterBoundingBox>)> {
    let captcha = ImageCaptcha::new(options.clone())?;
    captcha.generate_with_bounding_boxes(text, &mut captcha.rng())
}
