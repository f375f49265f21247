//! Bitmap fonts for the 2D batch: a glyph table over a contiguous character
//! range plus the RGBA8 atlas the glyphs were packed into.

use glam::Vec2;

use super::material::{SubTexture, Texture};
use crate::asset::Handle;

const GLYPH_PADDING: u32 = 1; // pixels between glyphs in the atlas
const MAX_ATLAS_HEIGHT: u32 = 8192;

#[derive(Debug, thiserror::Error)]
pub enum FontError {
    #[error("font parse error: {0}")]
    Parse(String),
    #[error("glyph range {first:?}..={last:?} is empty")]
    EmptyRange { first: char, last: char },
    #[error("glyph {glyph:?} ({width}px wide) does not fit a {max_width}px atlas row")]
    GlyphTooWide {
        glyph: char,
        width: u32,
        max_width: u32,
    },
    #[error("glyphs need more than {MAX_ATLAS_HEIGHT}px of atlas height")]
    AtlasFull,
}

/// Metrics of one glyph, in pixels at the rasterised size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glyph {
    pub size: Vec2,
    /// Offset from the pen position to the bitmap's left edge (x) and top
    /// edge above the baseline (y).
    pub bearing: Vec2,
    pub advance: f32,
    pub uv_min: Vec2,
    pub uv_max: Vec2,
}

impl Glyph {
    /// Whether the glyph has a bitmap (whitespace does not).
    pub fn is_visible(&self) -> bool {
        self.size.x > 0.0 && self.size.y > 0.0
    }
}

/// Glyph table for characters `first_glyph..=last_glyph` of one atlas.
#[derive(Debug, Clone, PartialEq)]
pub struct Font {
    pub atlas: Handle<Texture>,
    pub first_glyph: char,
    pub last_glyph: char,
    pub glyphs: Vec<Glyph>,
    pub line_height: f32,
}

impl Font {
    /// Glyph for `c`, or `None` when `c` lies outside the font's range.
    pub fn glyph(&self, c: char) -> Option<&Glyph> {
        if c < self.first_glyph || c > self.last_glyph {
            return None;
        }
        let index = c as u32 - self.first_glyph as u32;
        self.glyphs.get(index as usize)
    }

    pub fn sub_texture(&self, glyph: &Glyph) -> SubTexture {
        SubTexture::new(self.atlas, glyph.uv_min, glyph.uv_max)
    }
}

/// A rasterised glyph waiting to be packed.
#[derive(Debug, Clone)]
pub(crate) struct RasterGlyph {
    pub glyph: char,
    pub width: u32,
    pub height: u32,
    pub xmin: i32,
    pub ymin: i32,
    pub advance: f32,
    /// `width * height` coverage values, top row first.
    pub coverage: Vec<u8>,
}

/// Shelf-packed RGBA8 glyph atlas (white, coverage in alpha).
#[derive(Debug, Clone)]
pub struct FontAtlas {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub first_glyph: char,
    pub last_glyph: char,
    pub glyphs: Vec<Glyph>,
    pub line_height: f32,
}

impl FontAtlas {
    /// Parses a TrueType/OpenType font and rasterises `first..=last`.
    pub fn from_bytes(
        bytes: &[u8],
        px: f32,
        first: char,
        last: char,
        atlas_width: u32,
    ) -> Result<Self, FontError> {
        let font = fontdue::Font::from_bytes(bytes, fontdue::FontSettings::default())
            .map_err(|e| FontError::Parse(e.to_string()))?;
        Self::rasterize(&font, px, first, last, atlas_width)
    }

    pub fn rasterize(
        font: &fontdue::Font,
        px: f32,
        first: char,
        last: char,
        atlas_width: u32,
    ) -> Result<Self, FontError> {
        if first > last {
            return Err(FontError::EmptyRange { first, last });
        }

        // Code points in the range that are not chars (surrogates) get an
        // empty glyph so indexing stays contiguous.
        let glyphs = (first as u32..=last as u32)
            .map(|code| {
                let Some(glyph) = char::from_u32(code) else {
                    return RasterGlyph {
                        glyph: char::REPLACEMENT_CHARACTER,
                        width: 0,
                        height: 0,
                        xmin: 0,
                        ymin: 0,
                        advance: 0.0,
                        coverage: Vec::new(),
                    };
                };
                let (metrics, coverage) = font.rasterize(glyph, px);
                RasterGlyph {
                    glyph,
                    width: metrics.width as u32,
                    height: metrics.height as u32,
                    xmin: metrics.xmin,
                    ymin: metrics.ymin,
                    advance: metrics.advance_width,
                    coverage,
                }
            })
            .collect();

        let line_height = font
            .horizontal_line_metrics(px)
            .map_or(px * 1.2, |m| m.new_line_size);

        let atlas = Self::pack(glyphs, first, last, atlas_width, line_height)?;
        log::info!(
            "Rasterised glyphs {:?}..={:?} at {}px into a {}x{} atlas",
            first,
            last,
            px,
            atlas.width,
            atlas.height
        );
        Ok(atlas)
    }

    pub(crate) fn pack(
        glyphs: Vec<RasterGlyph>,
        first: char,
        last: char,
        atlas_width: u32,
        line_height: f32,
    ) -> Result<Self, FontError> {
        // Place every glyph on a shelf first, then size the atlas to fit.
        let mut cursor_x = GLYPH_PADDING;
        let mut cursor_y = GLYPH_PADDING;
        let mut row_height = 0;
        let mut origins = Vec::with_capacity(glyphs.len());

        for g in &glyphs {
            if g.width == 0 || g.height == 0 {
                origins.push((0, 0));
                continue;
            }
            if g.width + 2 * GLYPH_PADDING > atlas_width {
                return Err(FontError::GlyphTooWide {
                    glyph: g.glyph,
                    width: g.width,
                    max_width: atlas_width,
                });
            }
            if cursor_x + g.width + GLYPH_PADDING > atlas_width {
                cursor_y += row_height + GLYPH_PADDING;
                cursor_x = GLYPH_PADDING;
                row_height = 0;
            }
            origins.push((cursor_x, cursor_y));
            cursor_x += g.width + GLYPH_PADDING;
            row_height = row_height.max(g.height);
        }

        let height = (cursor_y + row_height + GLYPH_PADDING).max(1);
        if height > MAX_ATLAS_HEIGHT {
            return Err(FontError::AtlasFull);
        }

        let mut pixels = vec![0u8; (atlas_width * height * 4) as usize];
        for texel in pixels.chunks_exact_mut(4) {
            texel[..3].fill(255);
        }

        let size = Vec2::new(atlas_width as f32, height as f32);
        let mut table = Vec::with_capacity(glyphs.len());
        for (g, &(gx, gy)) in glyphs.iter().zip(&origins) {
            for row in 0..g.height {
                for col in 0..g.width {
                    let src = (row * g.width + col) as usize;
                    let dst = (((gy + row) * atlas_width + gx + col) * 4 + 3) as usize;
                    pixels[dst] = g.coverage.get(src).copied().unwrap_or(0);
                }
            }

            // V is flipped so the quad's bottom edge samples the bitmap's bottom row.
            let (uv_min, uv_max) = if g.width == 0 || g.height == 0 {
                (Vec2::ZERO, Vec2::ZERO)
            } else {
                (
                    Vec2::new(gx as f32, (gy + g.height) as f32) / size,
                    Vec2::new((gx + g.width) as f32, gy as f32) / size,
                )
            };

            table.push(Glyph {
                size: Vec2::new(g.width as f32, g.height as f32),
                bearing: Vec2::new(g.xmin as f32, (g.ymin + g.height as i32) as f32),
                advance: g.advance,
                uv_min,
                uv_max,
            });
        }

        Ok(Self {
            width: atlas_width,
            height,
            pixels,
            first_glyph: first,
            last_glyph: last,
            glyphs: table,
            line_height,
        })
    }

    /// Glyph table bound to the texture the atlas pixels were uploaded to.
    pub fn font(&self, atlas: Handle<Texture>) -> Font {
        Font {
            atlas,
            first_glyph: self.first_glyph,
            last_glyph: self.last_glyph,
            glyphs: self.glyphs.clone(),
            line_height: self.line_height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raster(glyph: char, width: u32, height: u32, ymin: i32) -> RasterGlyph {
        RasterGlyph {
            glyph,
            width,
            height,
            xmin: 1,
            ymin,
            advance: width as f32 + 2.0,
            coverage: vec![200; (width * height) as usize],
        }
    }

    #[test]
    fn glyphs_wrap_onto_new_shelves() {
        let glyphs = vec![raster('a', 6, 4, 0), raster('b', 6, 8, -2), raster('c', 6, 3, 0)];
        let atlas = FontAtlas::pack(glyphs, 'a', 'c', 16, 10.0).unwrap();

        // Two glyphs per 16px row: 1 + 6 + 1 + 6 + 1 = 15.
        assert_eq!(atlas.height, 1 + 8 + 1 + 3 + 1);
        assert_eq!(atlas.pixels.len(), (16 * atlas.height * 4) as usize);

        let c = atlas.glyphs[2];
        assert!((c.uv_max.y * atlas.height as f32 - 10.0).abs() < 1e-4);
        assert_eq!(c.uv_min.x * 16.0, 1.0);
    }

    #[test]
    fn coverage_lands_in_alpha() {
        let atlas = FontAtlas::pack(vec![raster('x', 2, 2, 0)], 'x', 'x', 8, 4.0).unwrap();
        let texel = |x: u32, y: u32| {
            let i = ((y * 8 + x) * 4) as usize;
            &atlas.pixels[i..i + 4]
        };
        assert_eq!(texel(1, 1), &[255, 255, 255, 200]);
        assert_eq!(texel(0, 0), &[255, 255, 255, 0]);
    }

    #[test]
    fn bearing_is_top_above_baseline() {
        let atlas = FontAtlas::pack(vec![raster('g', 4, 8, -2)], 'g', 'g', 8, 4.0).unwrap();
        let g = atlas.glyphs[0];
        assert_eq!(g.bearing, Vec2::new(1.0, 6.0));
        assert_eq!(g.size, Vec2::new(4.0, 8.0));
        assert!(g.uv_min.y > g.uv_max.y);
    }

    #[test]
    fn whitespace_keeps_advance_without_bitmap() {
        let glyphs = vec![raster(' ', 0, 0, 0), raster('!', 2, 6, 0)];
        let atlas = FontAtlas::pack(glyphs, ' ', '!', 8, 4.0).unwrap();
        let font = atlas.font(Handle::new(3));

        let space = font.glyph(' ').unwrap();
        assert!(!space.is_visible());
        assert_eq!(space.advance, 2.0);
        assert!(font.glyph('!').unwrap().is_visible());
        assert!(font.glyph('"').is_none());
        assert!(font.glyph('\n').is_none());
    }

    #[test]
    fn oversized_glyph_is_rejected() {
        let err = FontAtlas::pack(vec![raster('W', 20, 4, 0)], 'W', 'W', 16, 4.0);
        assert!(matches!(err, Err(FontError::GlyphTooWide { glyph: 'W', .. })));
    }
}
