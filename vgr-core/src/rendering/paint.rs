//! Paint sources handed to backends for fills and strokes.

use smallvec::SmallVec;

use crate::core::document::{ImageData, SpreadMethod};
use crate::core::geom::Affine;
use crate::core::style::Color;

/// Gradient extension outside the [0, 1] range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadMode {
    Pad,
    Reflect,
    Repeat,
    /// Transparent outside the gradient vector
    None,
}

impl From<Option<SpreadMethod>> for SpreadMode {
    fn from(method: Option<SpreadMethod>) -> Self {
        match method {
            Some(SpreadMethod::Pad) => SpreadMode::Pad,
            Some(SpreadMethod::Reflect) => SpreadMode::Reflect,
            Some(SpreadMethod::Repeat) => SpreadMode::Repeat,
            None => SpreadMode::None,
        }
    }
}

/// A gradient stop with opacity already multiplied in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorStop {
    pub offset: f64,
    pub color: Color,
    pub alpha: f64,
}

pub type ColorStops = SmallVec<[ColorStop; 4]>;

/// What a fill or stroke paints with.
///
/// `matrix` maps user space into the source's own space, so a gradient
/// vector or tile origin is expressed in source coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum PaintSource {
    Solid {
        color: Color,
        alpha: f64,
    },
    LinearGradient {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        stops: ColorStops,
        spread: SpreadMode,
        matrix: Affine,
    },
    RadialGradient {
        fx: f64,
        fy: f64,
        fr: f64,
        cx: f64,
        cy: f64,
        r: f64,
        stops: ColorStops,
        spread: SpreadMode,
        matrix: Affine,
    },
    /// One tile of pixels repeated in both directions
    Tile {
        image: ImageData,
        matrix: Affine,
    },
}

impl PaintSource {
    pub fn solid(color: Color, alpha: f64) -> Self {
        PaintSource::Solid { color, alpha }
    }

    /// Short description used in operation logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            PaintSource::Solid { .. } => "solid",
            PaintSource::LinearGradient { .. } => "linear",
            PaintSource::RadialGradient { .. } => "radial",
            PaintSource::Tile { .. } => "tile",
        }
    }

    /// Paint space to user space, if the matrix is invertible.
    pub fn source_to_user(&self) -> Option<Affine> {
        match self {
            PaintSource::Solid { .. } => Some(Affine::IDENTITY),
            PaintSource::LinearGradient { matrix, .. }
            | PaintSource::RadialGradient { matrix, .. }
            | PaintSource::Tile { matrix, .. } => matrix.invert(),
        }
    }
}
