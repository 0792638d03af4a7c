//! Font loading and glyph outlines.
//!
//! Text arrives already shaped as positioned glyph ids, so fonts only need
//! to turn a glyph id into an outline.

use std::fmt;

use ttf_parser::{Face, GlyphId, OutlineBuilder};

use crate::core::error::{RenderError, RenderResult};
use crate::core::path::Path;

/// Source of glyph outlines in font units (y axis pointing up).
pub trait GlyphOutlines: fmt::Debug {
    fn units_per_em(&self) -> f64;

    /// Outline of `glyph`, or `None` for unknown or empty glyphs.
    fn outline(&self, glyph: u32) -> Option<Path>;
}

/// A TrueType/OpenType face that owns its bytes.
pub struct FontFace {
    data: Vec<u8>,
    index: u32,
    units_per_em: u16,
    glyph_count: u16,
}

impl fmt::Debug for FontFace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FontFace")
            .field("index", &self.index)
            .field("units_per_em", &self.units_per_em)
            .field("glyph_count", &self.glyph_count)
            .finish()
    }
}

impl FontFace {
    pub fn from_data(data: Vec<u8>, index: u32) -> RenderResult<Self> {
        let (units_per_em, glyph_count) = {
            let face = Face::parse(&data, index)
                .map_err(|e| RenderError::Font(format!("Failed to parse font: {}", e)))?;
            (face.units_per_em(), face.number_of_glyphs())
        };
        Ok(FontFace {
            data,
            index,
            units_per_em,
            glyph_count,
        })
    }

    pub fn glyph_count(&self) -> u16 {
        self.glyph_count
    }
}

impl GlyphOutlines for FontFace {
    fn units_per_em(&self) -> f64 {
        self.units_per_em as f64
    }

    fn outline(&self, glyph: u32) -> Option<Path> {
        let id = u16::try_from(glyph).ok()?;
        let face = Face::parse(&self.data, self.index).ok()?;
        let mut converter = PathConverter(Path::new());
        face.outline_glyph(GlyphId(id), &mut converter)?;
        Some(converter.0)
    }
}

struct PathConverter(Path);

impl OutlineBuilder for PathConverter {
    fn move_to(&mut self, x: f32, y: f32) {
        self.0.move_to(x as f64, y as f64);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.0.line_to(x as f64, y as f64);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.0.quad_to(x1 as f64, y1 as f64, x as f64, y as f64);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.0
            .curve_to(x1 as f64, y1 as f64, x2 as f64, y2 as f64, x as f64, y as f64);
    }

    fn close(&mut self) {
        self.0.close_path();
    }
}
