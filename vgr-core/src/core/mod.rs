pub mod config;
pub mod document;
pub mod error;
pub mod geom;
pub mod markers;
pub mod path;
pub mod pdf_writer;
pub mod style;

pub use config::{PixelFormat, RenderConfig, CSS_DPI};
pub use document::{
    Align, AspectRatio, ClipPathDef, Document, Glyph, GradientStop, HatchPath, ImageData, Item,
    ItemKind, MarkerDef, MarkerUnits, MaskDef, Metadata, Orient, Page, PaintServer, SpreadMethod,
    Units,
};
pub use error::{RenderError, RenderResult};
pub use geom::{Affine, Rect};
pub use markers::{MarkerPosition, MarkerVertex};
pub use path::{Path, PathBuilder, PathElement};
pub use style::{
    BlendMode, Color, FillRule, ImageRendering, LineCap, LineJoin, Overflow, Paint, PaintLayer,
    PaintOrder, StrokeProps, Style,
};
