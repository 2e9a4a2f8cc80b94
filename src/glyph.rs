/*!
 * 字形光栅化
 *
 * 把单个字符渲染成独立的覆盖度位图（alpha 蒙版），并裁剪到墨迹范围。
 */

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use fontdue::{Font, FontSettings};
use serde::{Deserialize, Serialize};

use crate::Size;
use crate::error::{Error, Result};

// =============================================================================
// Glyph Bitmap
// =============================================================================

/// 单个字符的覆盖度位图，按行存储，每像素一个字节
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlyphBitmap {
    pub width: u32,
    pub height: u32,
    pub coverage: Vec<u8>,
}

impl GlyphBitmap {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            coverage: vec![0; width as usize * height as usize],
        }
    }

    /// 全覆盖的实心矩形
    pub fn filled(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            coverage: vec![255; width as usize * height as usize],
        }
    }

    pub fn from_coverage(width: u32, height: u32, coverage: Vec<u8>) -> Self {
        debug_assert_eq!(coverage.len(), width as usize * height as usize);
        Self {
            width,
            height,
            coverage,
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// 越界返回 0
    pub fn get(&self, x: i32, y: i32) -> u8 {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return 0;
        }
        self.coverage[y as usize * self.width as usize + x as usize]
    }

    /// 裁掉四周完全透明的行列；没有墨迹时返回 0×0 位图
    pub fn trim(self) -> Self {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut min_x = usize::MAX;
        let mut min_y = usize::MAX;
        let mut max_x = 0;
        let mut max_y = 0;

        for y in 0..h {
            for x in 0..w {
                if self.coverage[y * w + x] > 0 {
                    min_x = min_x.min(x);
                    min_y = min_y.min(y);
                    max_x = max_x.max(x);
                    max_y = max_y.max(y);
                }
            }
        }

        if min_x == usize::MAX {
            return Self::default();
        }
        if min_x == 0 && min_y == 0 && max_x + 1 == w && max_y + 1 == h {
            return self;
        }

        let new_w = max_x - min_x + 1;
        let new_h = max_y - min_y + 1;
        let mut coverage = Vec::with_capacity(new_w * new_h);
        for y in min_y..=max_y {
            coverage.extend_from_slice(&self.coverage[y * w + min_x..y * w + max_x + 1]);
        }
        Self::from_coverage(new_w as u32, new_h as u32, coverage)
    }

    /// 空心方框，用于替代缺失字形
    pub fn placeholder(size: f32) -> Self {
        let width = (size * 0.55).round().max(3.0) as u32;
        let height = (size * 0.7).round().max(3.0) as u32;
        let stroke = (size / 16.0).round().max(1.0) as u32;

        let mut bitmap = Self::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let edge = x < stroke
                    || y < stroke
                    || x >= width.saturating_sub(stroke)
                    || y >= height.saturating_sub(stroke);
                if edge {
                    bitmap.coverage[(y * width + x) as usize] = 255;
                }
            }
        }
        bitmap
    }
}

// =============================================================================
// Rasterizer Seam
// =============================================================================

/// 字形来源。生产实现是 [`FontSet`]，测试里可以替换成固定形状
pub trait GlyphRasterizer {
    fn font_count(&self) -> usize;

    fn has_glyph(&self, font: usize, ch: char) -> bool;

    /// 渲染未裁剪的字形位图
    fn rasterize(&self, font: usize, ch: char, size: f32) -> GlyphBitmap;
}

/// 所有字体都缺少字形时的处理方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingGlyphPolicy {
    /// 用空心方框代替，并记录警告
    #[default]
    Placeholder,
    /// 整个生成调用失败，返回 [`Error::UnsupportedCharacter`]
    Fail,
}

/// 先用首选字体，缺字时按顺序尝试其余字体
pub fn render_glyph<G: GlyphRasterizer + ?Sized>(
    rasterizer: &G,
    ch: char,
    preferred: usize,
    size: f32,
    policy: MissingGlyphPolicy,
) -> Result<GlyphBitmap> {
    let count = rasterizer.font_count();
    let candidates = std::iter::once(preferred).chain((0..count).filter(|&i| i != preferred));

    for font in candidates.filter(|&i| i < count) {
        if rasterizer.has_glyph(font, ch) {
            return Ok(rasterizer.rasterize(font, ch, size).trim());
        }
    }

    match policy {
        MissingGlyphPolicy::Fail => Err(Error::UnsupportedCharacter(ch)),
        MissingGlyphPolicy::Placeholder => {
            tracing::warn!(character = ?ch, "no font provides a glyph, using placeholder box");
            Ok(GlyphBitmap::placeholder(size))
        }
    }
}

// =============================================================================
// Font Sources
// =============================================================================

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontSource {
    /// TrueType / OpenType 文件路径
    Path(PathBuf),
    /// 系统字体族名，通过 fontdb 查找
    Family(String),
    /// 内存中的字体数据
    #[serde(skip)]
    Bytes(Arc<Vec<u8>>),
}

impl FontSource {
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(Arc::new(data.into()))
    }
}

impl fmt::Debug for FontSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Family(name) => f.debug_tuple("Family").field(name).finish(),
            Self::Bytes(data) => write!(f, "Bytes({} bytes)", data.len()),
        }
    }
}

#[cfg(feature = "bundled-font")]
fn bundled_font() -> Option<&'static [u8]> {
    Some(include_bytes!("../assets/DejaVuSans.ttf"))
}

#[cfg(not(feature = "bundled-font"))]
fn bundled_font() -> Option<&'static [u8]> {
    None
}

// =============================================================================
// Font Set
// =============================================================================

/// 已解析的字体列表
pub struct FontSet {
    fonts: Vec<Font>,
}

impl FontSet {
    pub fn load(sources: &[FontSource]) -> Result<Self> {
        if sources.is_empty() {
            let data = bundled_font().ok_or_else(|| {
                Error::InvalidConfiguration(
                    "font list is empty and no bundled font is available".into(),
                )
            })?;
            let font = parse_font(data, 0).map_err(|e| Error::Font(format!("bundled font: {e}")))?;
            return Ok(Self { fonts: vec![font] });
        }

        // 只有按族名查找时才扫描系统字体
        let mut system_db: Option<usvg::fontdb::Database> = None;
        let mut fonts = Vec::with_capacity(sources.len());

        for source in sources {
            let font = match source {
                FontSource::Path(path) => {
                    let data = std::fs::read(path)?;
                    parse_font(&data, 0)
                        .map_err(|e| Error::Font(format!("{}: {e}", path.display())))?
                }
                FontSource::Bytes(data) => {
                    parse_font(data, 0).map_err(|e| Error::Font(e.to_string()))?
                }
                FontSource::Family(name) => {
                    let db = system_db.get_or_insert_with(|| {
                        let mut db = usvg::fontdb::Database::new();
                        db.load_system_fonts();
                        db
                    });
                    load_family(db, name)?
                }
            };
            fonts.push(font);
        }

        Ok(Self { fonts })
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }
}

fn parse_font(data: &[u8], index: u32) -> Result<Font, &'static str> {
    Font::from_bytes(
        data,
        FontSettings {
            collection_index: index,
            ..FontSettings::default()
        },
    )
}

fn load_family(db: &usvg::fontdb::Database, name: &str) -> Result<Font> {
    let families = [usvg::fontdb::Family::Name(name)];
    let query = usvg::fontdb::Query {
        families: &families,
        ..Default::default()
    };
    let id = db
        .query(&query)
        .ok_or_else(|| Error::Font(format!("font family '{name}' not found")))?;

    db.with_face_data(id, |data, index| parse_font(data, index))
        .ok_or_else(|| Error::Font(format!("font family '{name}' could not be read")))?
        .map_err(|e| Error::Font(format!("{name}: {e}")))
}

impl GlyphRasterizer for FontSet {
    fn font_count(&self) -> usize {
        self.fonts.len()
    }

    fn has_glyph(&self, font: usize, ch: char) -> bool {
        self.fonts
            .get(font)
            .is_some_and(|f| f.lookup_glyph_index(ch) != 0)
    }

    fn rasterize(&self, font: usize, ch: char, size: f32) -> GlyphBitmap {
        let Some(font) = self.fonts.get(font) else {
            return GlyphBitmap::default();
        };
        let (metrics, bitmap) = font.rasterize(ch, size);
        GlyphBitmap::from_coverage(metrics.width as u32, metrics.height as u32, bitmap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OnlyDigits;

    impl GlyphRasterizer for OnlyDigits {
        fn font_count(&self) -> usize {
            2
        }

        fn has_glyph(&self, font: usize, ch: char) -> bool {
            font == 1 && ch.is_ascii_digit()
        }

        fn rasterize(&self, _font: usize, _ch: char, _size: f32) -> GlyphBitmap {
            let mut bitmap = GlyphBitmap::new(6, 6);
            for y in 2..4 {
                for x in 1..5 {
                    bitmap.coverage[y * 6 + x] = 200;
                }
            }
            bitmap
        }
    }

    #[test]
    fn trim_crops_to_ink() {
        let mut bitmap = GlyphBitmap::new(5, 4);
        bitmap.coverage[6] = 10; // (1, 1)
        bitmap.coverage[13] = 20; // (3, 2)

        let trimmed = bitmap.trim();
        assert_eq!(trimmed.size(), Size::new(3, 2));
        assert_eq!(trimmed.get(0, 0), 10);
        assert_eq!(trimmed.get(2, 1), 20);
    }

    #[test]
    fn trim_of_blank_bitmap_is_empty() {
        assert!(GlyphBitmap::new(7, 9).trim().is_empty());
    }

    #[test]
    fn falls_back_to_other_font() {
        let glyph = render_glyph(&OnlyDigits, '7', 0, 20.0, MissingGlyphPolicy::Fail).unwrap();
        assert_eq!(glyph.size(), Size::new(4, 2));
    }

    #[test]
    fn missing_glyph_policy() {
        let err = render_glyph(&OnlyDigits, 'x', 0, 20.0, MissingGlyphPolicy::Fail).unwrap_err();
        assert!(matches!(err, Error::UnsupportedCharacter('x')));

        let glyph =
            render_glyph(&OnlyDigits, 'x', 0, 20.0, MissingGlyphPolicy::Placeholder).unwrap();
        assert_eq!(glyph.size(), Size::new(11, 14));
        assert_eq!(glyph.get(0, 0), 255);
        assert_eq!(glyph.get(5, 7), 0);
    }

    #[cfg(feature = "bundled-font")]
    #[test]
    fn bundled_font_renders_latin() {
        let fonts = FontSet::load(&[]).unwrap();
        assert_eq!(fonts.len(), 1);
        assert!(fonts.has_glyph(0, 'A'));

        let glyph = render_glyph(&fonts, 'A', 0, 40.0, MissingGlyphPolicy::Fail).unwrap();
        assert!(glyph.width > 10 && glyph.height > 10);
        // 空格没有墨迹
        let space = render_glyph(&fonts, ' ', 0, 40.0, MissingGlyphPolicy::Fail).unwrap();
        assert!(space.is_empty());
    }
}
