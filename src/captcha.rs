/*!
 * 验证码生成
 *
 * 每个字符：光栅化 → 随机变换（记录正向映射）→ 排版 → 贴到画布 → 计算包围盒。
 */

use std::path::Path;

use image::RgbImage;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::Size;
use crate::bbox::{self, CharacterBoundingBox};
use crate::compose::{self, Canvas};
use crate::error::{Error, Result};
use crate::glyph::{self, FontSet, GlyphBitmap, GlyphRasterizer};
use crate::layout::{self, Placement};
use crate::options::{CaptchaOptions, Color, NoiseOrder, OverflowPolicy};
use crate::transform::{self, ForwardMap};

/// 一个字符在合成前的全部中间结果
struct PreparedGlyph {
    character: char,
    bitmap: GlyphBitmap,
    map: ForwardMap,
    color: Color,
}

/// 验证码生成器。构造时校验参数并加载字体，之后只读，可重复调用
pub struct ImageCaptcha<G: GlyphRasterizer = FontSet> {
    options: CaptchaOptions,
    rasterizer: G,
}

impl ImageCaptcha<FontSet> {
    pub fn new(options: CaptchaOptions) -> Result<Self> {
        options.validate()?;
        let rasterizer = FontSet::load(&options.fonts)?;
        Ok(Self {
            options,
            rasterizer,
        })
    }
}

impl<G: GlyphRasterizer> ImageCaptcha<G> {
    /// 使用自定义字形来源，`options.fonts` 被忽略
    pub fn with_rasterizer(options: CaptchaOptions, rasterizer: G) -> Result<Self> {
        options.validate()?;
        if rasterizer.font_count() == 0 {
            return Err(Error::InvalidConfiguration(
                "glyph rasterizer provides no fonts".into(),
            ));
        }
        Ok(Self {
            options,
            rasterizer,
        })
    }

    pub fn options(&self) -> &CaptchaOptions {
        &self.options
    }

    /// 按 `options.seed` 初始化的随机源；未设置种子时取系统熵
    pub fn rng(&self) -> ChaCha8Rng {
        match self.options.seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_os_rng(),
        }
    }

    pub fn generate<R: Rng>(&self, text: &str, rng: &mut R) -> Result<RgbImage> {
        self.generate_with_bounding_boxes(text, rng)
            .map(|(image, _)| image)
    }

    /// 生成并编码为 PNG
    pub fn to_png<R: Rng>(&self, text: &str, rng: &mut R) -> Result<Vec<u8>> {
        compose::encode_png(&self.generate(text, rng)?)
    }

    /// 生成并写入 PNG 文件
    pub fn write<R: Rng>(&self, text: &str, path: impl AsRef<Path>, rng: &mut R) -> Result<()> {
        std::fs::write(path, self.to_png(text, rng)?)?;
        Ok(())
    }

    /// 生成图像，并按输入顺序返回每个字符的包围盒
    #[tracing::instrument(
        skip_all,
        fields(
            chars = text.chars().count(),
            width = self.options.width,
            height = self.options.height
        )
    )]
    pub fn generate_with_bounding_boxes<R: Rng>(
        &self,
        text: &str,
        rng: &mut R,
    ) -> Result<(RgbImage, Vec<CharacterBoundingBox>)> {
        let opts = &self.options;
        let (width, height) = (opts.width, opts.height);

        let background = opts
            .background
            .unwrap_or_else(|| Color::random(rng, 238, 255, None));
        let noise_color = opts
            .noise_color
            .or(opts.foreground)
            .unwrap_or_else(|| random_ink(rng));

        let mut glyphs = text
            .chars()
            .map(|ch| self.prepare(ch, rng))
            .collect::<Result<Vec<_>>>()?;

        let characters: Vec<char> = glyphs.iter().map(|g| g.character).collect();
        let sizes: Vec<Size> = glyphs
            .iter()
            .map(|g| g.map.output_size(g.bitmap.size()))
            .collect();
        let mut placements = layout::plan(&characters, width, height, &sizes, &opts.layout, rng);

        let extent = placements
            .iter()
            .zip(&sizes)
            .map(|(p, s)| p.x + s.width as i32)
            .max()
            .unwrap_or(0);
        tracing::debug!(extent, "planned layout");

        if opts.overflow == OverflowPolicy::Squeeze && extent > width as i32 {
            let factor = width as f32 / extent as f32;
            tracing::debug!(factor, "squeezing text to fit canvas");
            squeeze(&mut glyphs, &mut placements, factor);
        }

        let mut canvas = Canvas::new(width, height, background)?;
        if opts.noise_order == NoiseOrder::BeforeText {
            self.draw_noise(&mut canvas, rng, noise_color);
        }

        let mut boxes = Vec::with_capacity(glyphs.len());
        for (glyph, placement) in glyphs.iter().zip(&placements) {
            let transformed = transform::resample(&glyph.bitmap, &glyph.map);
            canvas.paste(&transformed, *placement, glyph.color)?;
            boxes.push(bbox::track(
                glyph.character,
                glyph.bitmap.size(),
                &glyph.map,
                *placement,
                width,
                height,
            ));
        }

        if opts.noise_order == NoiseOrder::AfterText {
            self.draw_noise(&mut canvas, rng, noise_color);
        }

        Ok((canvas.into_rgb(opts.smooth), boxes))
    }

    fn prepare<R: Rng>(&self, character: char, rng: &mut R) -> Result<PreparedGlyph> {
        let opts = &self.options;
        let font = rng.random_range(0..self.rasterizer.font_count());
        let size = opts.pick_font_size(rng);
        let bitmap =
            glyph::render_glyph(&self.rasterizer, character, font, size, opts.missing_glyph)?;

        let config = opts.distortion.sample(rng, bitmap.size());
        let map = ForwardMap::from_config(&config, bitmap.size());
        let color = opts.foreground.unwrap_or_else(|| random_ink(rng));

        Ok(PreparedGlyph {
            character,
            bitmap,
            map,
            color,
        })
    }

    fn draw_noise<R: Rng>(&self, canvas: &mut Canvas, rng: &mut R, color: Color) {
        let opts = &self.options;
        canvas.noise_dots(rng, color, opts.noise_dots, opts.dot_width);
        for _ in 0..opts.noise_curves {
            canvas.noise_curve(rng, color);
        }
    }
}

/// 深色、略透明的前景色
fn random_ink<R: Rng>(rng: &mut R) -> Color {
    Color::random(rng, 10, 200, Some((220, 255)))
}

/// 水平压缩所有字形与位置，画布尺寸不变
fn squeeze(glyphs: &mut [PreparedGlyph], placements: &mut [Placement], factor: f32) {
    for (glyph, placement) in glyphs.iter_mut().zip(placements.iter_mut()) {
        glyph.map = std::mem::take(&mut glyph.map).then_scale(factor, 1.0);
        placement.x = (placement.x as f32 * factor).floor() as i32;
    }
}
