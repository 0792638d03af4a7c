//! Render configuration.

use serde::{Deserialize, Serialize};

use crate::core::style::Color;

/// CSS reference resolution in pixels per inch.
pub const CSS_DPI: f64 = 96.0;

/// Pixel layout of raster surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Premultiplied colour with alpha, starts transparent
    #[default]
    Argb32,
    /// Opaque colour, starts white
    Rgb24,
    /// Alpha only, starts transparent
    A8,
}

impl PixelFormat {
    pub fn has_alpha(&self) -> bool {
        !matches!(self, PixelFormat::Rgb24)
    }
}

/// Options that shape a render without being part of the scene itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Scale each page so its rounded device size is filled exactly
    pub stretch_to_fit: bool,

    /// Colour painted under raster output
    pub background: Option<Color>,

    /// Raster resolution; 96 renders one device pixel per user unit
    pub dpi: f64,

    pub pixel_format: PixelFormat,

    /// Producer string recorded in document metadata
    pub creator: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            stretch_to_fit: false,
            background: None,
            dpi: CSS_DPI,
            pixel_format: PixelFormat::Argb32,
            creator: format!("vgr {}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl RenderConfig {
    /// Device pixels per user unit for raster targets.
    pub fn raster_scale(&self) -> f64 {
        if self.dpi > 0.0 && self.dpi.is_finite() {
            self.dpi / CSS_DPI
        } else {
            1.0
        }
    }
}
