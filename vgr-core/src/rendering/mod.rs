//! Rendering layer.
//!
//! A [`Renderer`] walks the item tree and drives a [`RenderContext`], which
//! keeps the state stack and composites layers onto a [`Backend`]:
//! - `RasterBackend` draws pixels with tiny-skia
//! - `PdfBackend` writes paginated vector output
//! - `RecordingBackend` records calls for tests

pub mod backend;
pub mod context;
pub mod font;
pub mod pages;
pub mod paint;
pub mod pdf_backend;
pub mod raster_backend;
pub mod renderer;
pub mod state;
pub mod tile;

// Re-export key types
pub use backend::{AlphaMask, Backend, ImageFilter, OperationLog, RecordingBackend, TargetKind};
pub use context::{ClipMode, PathPaintOrder, RenderContext, RenderDelegate, RenderMode};
pub use font::{FontFace, GlyphOutlines};
pub use pages::{PageGeometry, PageSequencer};
pub use paint::{ColorStop, PaintSource, SpreadMode};
pub use pdf_backend::PdfBackend;
pub use raster_backend::{encode_png, RasterBackend};
pub use renderer::Renderer;
pub use state::{ReferenceView, RenderState, StateStack};
pub use tile::PatternTileRenderer;
