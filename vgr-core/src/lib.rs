//! # VGR core: compositing renderer for vector scenes
//!
//! Renders a scene of shapes, text, images and nested groups to a raster
//! image or to paginated PDF. Items can carry clip paths, luminance masks,
//! group opacity and blend modes; fills and strokes can use gradients,
//! tiled patterns and hatches.
//!
//! ## Quick Start
//!
//! ```rust
//! use vgr_core::{Color, Document, Item, ItemKind, Paint, Renderer};
//!
//! let mut square = Item::new(ItemKind::Rect {
//!     x: 10.0,
//!     y: 10.0,
//!     width: 30.0,
//!     height: 30.0,
//!     rx: 0.0,
//!     ry: 0.0,
//! });
//! square.style.fill = Paint::Color(Color::red());
//! let doc = Document::new(50.0, 50.0, Item::group(vec![square]));
//!
//! let renderer = Renderer::new(&doc);
//! let mut ctx = renderer.create_context();
//! assert!(renderer.setup_document(&mut ctx, None));
//! assert!(renderer.render_pages(&mut ctx, false));
//! let image = ctx.snapshot().unwrap();
//! assert_eq!((image.width, image.height), (50, 50));
//! ```
//!
//! ## Architecture
//!
//! 1. **Document layer** (`core`): scene items, resources, styles, geometry
//! 2. **Context layer** (`rendering::context`): state stack, layers, clip and mask compositing
//! 3. **Paint layer** (`rendering::tile`): gradients, pattern and hatch tiles
//! 4. **Output layer**: raster and PDF backends, page sequencing
//!
//! Vector output goes through the same calls:
//!
//! ```rust
//! use vgr_core::{Document, Item, Renderer};
//!
//! let doc = Document::new(100.0, 100.0, Item::group(Vec::new()));
//! let renderer = Renderer::new(&doc);
//! let mut pdf = Vec::new();
//! {
//!     let mut ctx = renderer.create_context();
//!     ctx.set_vector_target(&mut pdf);
//!     assert!(renderer.setup_document(&mut ctx, None));
//!     assert!(renderer.render_pages(&mut ctx, false));
//!     ctx.finish()?;
//! }
//! assert!(pdf.starts_with(b"%PDF"));
//! # Ok::<(), vgr_core::RenderError>(())
//! ```

pub mod core;
pub mod rendering;

// Re-export main types for convenience
pub use core::{
    Affine, AspectRatio, BlendMode, ClipPathDef, Color, Document, FillRule, Glyph, GradientStop,
    HatchPath, ImageData, Item, ItemKind, MarkerDef, MaskDef, Metadata, Page, Paint, PaintServer,
    Path, PathBuilder, PixelFormat, Rect, RenderConfig, RenderError, RenderResult, SpreadMethod,
    Style, Units,
};

// Re-export rendering types
pub use rendering::{
    Backend, FontFace, GlyphOutlines, PageSequencer, PatternTileRenderer, RasterBackend,
    RecordingBackend, RenderContext, RenderMode, Renderer, TargetKind,
};
