/*!
 * 画布合成
 *
 * 背景、噪点噪线与变换后的字形都画在 tiny-skia 的 Pixmap 上，最后转成 RGB 图像。
 */

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};
use rand::Rng;
use tiny_skia::{IntSize, Paint, PathBuilder, Pixmap, PixmapPaint, Rect, Stroke, Transform};

use crate::bbox::CharacterBoundingBox;
use crate::error::{Error, Result};
use crate::glyph::GlyphBitmap;
use crate::layout::Placement;
use crate::options::Color;

/// 3×3 平滑核，中心权重 5；filter3x3 按核的总和归一化
const SMOOTH_KERNEL: [f32; 9] = [1.0, 1.0, 1.0, 1.0, 5.0, 1.0, 1.0, 1.0, 1.0];

/// 覆盖度增强：`min(255, c * 1.97)`，让抗锯齿边缘更实
fn boost(coverage: u8) -> u8 {
    (coverage as u32 * 197 / 100).min(255) as u8
}

fn mul_div_255(a: u8, b: u8) -> u8 {
    ((a as u32 * b as u32 + 127) / 255) as u8
}

pub(crate) struct Canvas {
    pixmap: Pixmap,
}

impl Canvas {
    pub fn new(width: u32, height: u32, background: Color) -> Result<Self> {
        let mut pixmap = Pixmap::new(width, height)
            .ok_or_else(|| Error::Render(format!("Failed to create {width}x{height} canvas")))?;
        pixmap.fill(background.to_skia());
        Ok(Self { pixmap })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// 以 alpha 混合的方式把字形贴到 `placement`，画布外的部分被裁掉
    pub fn paste(&mut self, glyph: &GlyphBitmap, placement: Placement, color: Color) -> Result<()> {
        if glyph.is_empty() {
            return Ok(());
        }

        let mut data = Vec::with_capacity(glyph.coverage.len() * 4);
        for &c in &glyph.coverage {
            // Pixmap 要求预乘颜色
            let a = mul_div_255(boost(c), color.a);
            data.extend_from_slice(&[
                mul_div_255(color.r, a),
                mul_div_255(color.g, a),
                mul_div_255(color.b, a),
                a,
            ]);
        }

        let size = IntSize::from_wh(glyph.width, glyph.height)
            .ok_or_else(|| Error::Render("Invalid glyph size".into()))?;
        let sprite = Pixmap::from_vec(data, size)
            .ok_or_else(|| Error::Render("Failed to create glyph buffer".into()))?;

        self.pixmap.draw_pixmap(
            placement.x,
            placement.y,
            sprite.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
        Ok(())
    }

    /// 随机短线段充当噪点
    pub fn noise_dots<R: Rng>(&mut self, rng: &mut R, color: Color, count: u32, width: f32) {
        let (w, h) = (self.width(), self.height());
        let paint = paint(color);
        let stroke = Stroke {
            width,
            ..Stroke::default()
        };

        for _ in 0..count {
            let x = rng.random_range(0..=w) as f32;
            let y = rng.random_range(0..=h) as f32;
            let mut pb = PathBuilder::new();
            pb.move_to(x, y);
            pb.line_to(x - 1.0, y - 1.0);
            if let Some(path) = pb.finish() {
                self.pixmap
                    .stroke_path(&path, &paint, &stroke, Transform::identity(), None);
            }
        }
    }

    /// 一段椭圆弧：起始角 `[0, 20]`，终止角 `[160, 200]`（度，顺时针）
    pub fn noise_curve<R: Rng>(&mut self, rng: &mut R, color: Color) {
        let (w, h) = (self.width(), self.height());
        let (w5, h5) = (w / 5, h / 5);

        let x1 = rng.random_range(0..=w5);
        let x2 = rng.random_range(w5..=w);
        let y1 = rng.random_range(h5..=h - h5);
        let y2 = rng.random_range(y1..=h - h5);
        let end = rng.random_range(160..=200);
        let start = rng.random_range(0..=20);

        let cx = (x1 + x2) as f32 / 2.0;
        let cy = (y1 + y2) as f32 / 2.0;
        let rx = (x2 - x1) as f32 / 2.0;
        let ry = (y2 - y1) as f32 / 2.0;

        let mut pb = PathBuilder::new();
        for (i, deg) in (start..=end).step_by(2).enumerate() {
            let (sin, cos) = (deg as f32).to_radians().sin_cos();
            let (px, py) = (cx + rx * cos, cy + ry * sin);
            if i == 0 {
                pb.move_to(px, py);
            } else {
                pb.line_to(px, py);
            }
        }

        if let Some(path) = pb.finish() {
            let stroke = Stroke {
                width: 1.0,
                ..Stroke::default()
            };
            self.pixmap
                .stroke_path(&path, &paint(color), &stroke, Transform::identity(), None);
        }
    }

    pub fn into_rgb(self, smooth: bool) -> RgbImage {
        let image = pixmap_to_rgb(&self.pixmap);
        if smooth { smoothed(&image) } else { image }
    }
}

fn paint(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(color.to_skia());
    paint.anti_alias = true;
    paint
}

fn pixmap_to_rgb(pixmap: &Pixmap) -> RgbImage {
    let width = pixmap.width();
    let pixels = pixmap.pixels();
    RgbImage::from_fn(width, pixmap.height(), |x, y| {
        let c = pixels[(y * width + x) as usize].demultiply();
        image::Rgb([c.red(), c.green(), c.blue()])
    })
}

fn rgb_to_pixmap(image: &RgbImage) -> Result<Pixmap> {
    let size = IntSize::from_wh(image.width(), image.height())
        .ok_or_else(|| Error::Render("Empty image".into()))?;
    let data = image
        .pixels()
        .flat_map(|p| [p[0], p[1], p[2], 255])
        .collect();
    Pixmap::from_vec(data, size)
        .ok_or_else(|| Error::Render("Failed to create pixel buffer".into()))
}

/// 编码为 PNG 字节
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| Error::Image(e.to_string()))?;
    Ok(buf)
}

/// 3×3 平滑；filter3x3 不处理最外圈像素，这里保留原值
fn smoothed(image: &RgbImage) -> RgbImage {
    let (w, h) = image.dimensions();
    let mut out = image::imageops::filter3x3(image, &SMOOTH_KERNEL);
    for y in 0..h {
        for x in 0..w {
            if x == 0 || y == 0 || x + 1 == w || y + 1 == h {
                out.put_pixel(x, y, *image.get_pixel(x, y));
            }
        }
    }
    out
}

/// 在图像副本上画出每个字符的包围盒，用于检查标注
pub fn annotate(image: &RgbImage, boxes: &[CharacterBoundingBox]) -> Result<RgbImage> {
    let mut pixmap = rgb_to_pixmap(image)?;
    let paint = paint(Color::rgb(255, 0, 0));
    let stroke = Stroke {
        width: 1.0,
        ..Stroke::default()
    };

    for item in boxes.iter().filter(|b| !b.bbox.is_empty()) {
        let b = item.bbox;
        // 描边落在像素中心，线条完整留在盒子里
        let Some(rect) = Rect::from_xywh(
            b.x as f32 + 0.5,
            b.y as f32 + 0.5,
            b.width.saturating_sub(1) as f32,
            b.height.saturating_sub(1) as f32,
        ) else {
            continue;
        };
        let path = PathBuilder::from_rect(rect);
        pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
    }

    Ok(pixmap_to_rgb(&pixmap))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::bbox::BBox;

    #[test]
    fn boost_saturates() {
        assert_eq!(boost(0), 0);
        assert_eq!(boost(100), 197);
        assert_eq!(boost(130), 255);
        assert_eq!(boost(255), 255);
    }

    #[test]
    fn paste_blends_and_clips() {
        let mut canvas = Canvas::new(10, 10, Color::WHITE).unwrap();
        canvas
            .paste(&GlyphBitmap::filled(4, 4), Placement::new(8, -2), Color::BLACK)
            .unwrap();
        let image = canvas.into_rgb(false);

        assert_eq!(image.get_pixel(9, 0).0, [0, 0, 0]);
        assert_eq!(image.get_pixel(8, 1).0, [0, 0, 0]);
        assert_eq!(image.get_pixel(8, 2).0, [255, 255, 255]);
        assert_eq!(image.get_pixel(7, 0).0, [255, 255, 255]);
    }

    #[test]
    fn paste_outside_canvas_is_noop() {
        let mut canvas = Canvas::new(10, 10, Color::WHITE).unwrap();
        canvas
            .paste(&GlyphBitmap::filled(4, 4), Placement::new(40, 40), Color::BLACK)
            .unwrap();
        let image = canvas.into_rgb(true);
        assert!(image.pixels().all(|p| p.0 == [255, 255, 255]));
    }

    #[test]
    fn noise_stays_on_canvas() {
        let mut canvas = Canvas::new(60, 30, Color::WHITE).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        canvas.noise_dots(&mut rng, Color::BLACK, 30, 3.0);
        canvas.noise_curve(&mut rng, Color::BLACK);
        let image = canvas.into_rgb(false);
        assert_eq!(image.dimensions(), (60, 30));
        assert!(image.pixels().any(|p| p.0 != [255, 255, 255]));
    }

    #[test]
    fn encodes_png() {
        let image = RgbImage::from_pixel(7, 3, image::Rgb([10, 20, 30]));
        let bytes = encode_png(&image).unwrap();
        assert!(bytes.starts_with(b"\x89PNG\r\n\x1a\n"));

        let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
        assert_eq!(decoded, image);
    }

    #[test]
    fn annotate_outlines_box() {
        let image = RgbImage::from_pixel(20, 20, image::Rgb([255, 255, 255]));
        let boxes = [CharacterBoundingBox {
            character: 'A',
            bbox: BBox::new(5, 5, 10, 8),
        }];
        let out = annotate(&image, &boxes).unwrap();
        let corner = out.get_pixel(5, 5).0;
        assert!(corner[0] > 200 && corner[1] < 64, "{corner:?}");
        assert_eq!(out.get_pixel(10, 9).0, [255, 255, 255]);
        assert_eq!(out.get_pixel(2, 2).0, [255, 255, 255]);
    }
}
