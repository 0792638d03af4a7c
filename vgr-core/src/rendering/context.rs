//! Rendering context: one output surface, its render state stack and the
//! layer compositing used for opacity, clip paths and masks.

use std::fmt;
use std::io::Write;

use tracing::{debug, error, trace, warn};

use crate::core::config::PixelFormat;
use crate::core::document::{Glyph, ImageData, Metadata};
use crate::core::error::{RenderError, RenderResult};
use crate::core::geom::{Affine, Rect};
use crate::core::path::Path;
use crate::core::style::{BlendMode, Color, FillRule, Paint, PaintLayer, Style};
use crate::rendering::backend::{AlphaMask, Backend, ImageFilter, TargetKind};
use crate::rendering::font::GlyphOutlines;
use crate::rendering::paint::PaintSource;
use crate::rendering::pdf_backend::PdfBackend;
use crate::rendering::raster_backend::RasterBackend;
use crate::rendering::state::{ReferenceView, RenderState, StateStack};

/// CSS pixels to PDF points.
pub const PX_TO_PT: f64 = 0.75;

/// Mask surfaces of vector targets are rendered at 96 px/in instead of
/// 72 pt/in.
pub const MASK_DPI_CORRECTION: f64 = 96.0 / 72.0;

const EMPTY_GLYPH: u32 = 0x0FFF_FFFF;
const UNKNOWN_GLYPH_FLAG: u32 = 0x1000_0000;
const MIN_STROKE_WIDTH: f64 = 1e-9;

/// Luminance weights applied to premultiplied channels.
const LUMINANCE_R: f64 = 0.2125;
const LUMINANCE_G: f64 = 0.7154;
const LUMINANCE_B: f64 = 0.0721;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    #[default]
    Normal,
    /// Drawing clip path content: geometry only, no paint
    ClippingPass,
}

/// How clip content is collected during a [`RenderMode::ClippingPass`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClipMode {
    /// Union of device-space paths, intersected into the backend clip
    PathClip,
    /// Shapes filled into an alpha surface
    #[default]
    MaskBitmap,
}

/// Which of fill and stroke a path call draws, and in what order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathPaintOrder {
    #[default]
    StrokeOverFill,
    FillOverStroke,
    FillOnly,
    StrokeOnly,
}

/// Resolves clip paths, masks and paint servers for a context.
///
/// `user_space` is the transform clip or mask content is drawn under,
/// before object bounding box units are applied.
pub trait RenderDelegate {
    fn apply_clip_path(
        &self,
        ctx: &mut RenderContext<'_>,
        clip: &ReferenceView,
        user_space: &Affine,
    ) -> bool;

    fn apply_mask(
        &self,
        ctx: &mut RenderContext<'_>,
        mask: &ReferenceView,
        user_space: &Affine,
    ) -> bool;

    /// Paint source for the server `id`, or `None` if it cannot be built.
    fn paint_source(
        &self,
        ctx: &RenderContext<'_>,
        id: &str,
        bbox: Option<&Rect>,
        alpha: f64,
    ) -> Option<PaintSource>;
}

/// A drawing target together with the state of the item being rendered.
pub struct RenderContext<'r> {
    delegate: Option<&'r dyn RenderDelegate>,
    backend: Option<Box<dyn Backend + 'r>>,
    stream: Option<Box<dyn Write + 'r>>,
    target: TargetKind,
    format: PixelFormat,
    /// User units to device units at the base of the stack
    unit_scale: f64,
    width: f64,
    height: f64,
    render_mode: RenderMode,
    clip_mode: ClipMode,
    /// Alpha of shapes filled during a mask-bitmap clipping pass
    clip_fill_alpha: f64,
    pending_clip: Path,
    pending_clip_rule: FillRule,
    background: Option<Color>,
    compress: bool,
    metadata: Metadata,
    is_valid: bool,
    is_show_page: bool,
    states: StateStack,
}

impl fmt::Debug for RenderContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("target", &self.target)
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("render_mode", &self.render_mode)
            .field("clip_mode", &self.clip_mode)
            .field("is_valid", &self.is_valid)
            .field("depth", &self.states.depth())
            .finish()
    }
}

impl Default for RenderContext<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'r> RenderContext<'r> {
    /// An unbound ARGB32 raster context.
    pub fn new() -> Self {
        RenderContext {
            delegate: None,
            backend: None,
            stream: None,
            target: TargetKind::Raster,
            format: PixelFormat::Argb32,
            unit_scale: 1.0,
            width: 0.0,
            height: 0.0,
            render_mode: RenderMode::Normal,
            clip_mode: ClipMode::default(),
            clip_fill_alpha: 1.0,
            pending_clip: Path::new(),
            pending_clip_rule: FillRule::NonZero,
            background: None,
            compress: true,
            metadata: Metadata::default(),
            is_valid: false,
            is_show_page: false,
            states: StateStack::new(),
        }
    }

    pub fn with_delegate(delegate: &'r dyn RenderDelegate) -> Self {
        let mut ctx = Self::new();
        ctx.delegate = Some(delegate);
        ctx
    }

    /// Render into a pixel buffer of the given format.
    pub fn set_raster_target(&mut self, format: PixelFormat) -> bool {
        if self.is_valid {
            warn!("surface already bound, raster target ignored");
            return false;
        }
        self.target = TargetKind::Raster;
        self.format = format;
        self.stream = None;
        true
    }

    /// Render paginated vector output into `stream`.
    pub fn set_vector_target(&mut self, stream: impl Write + 'r) -> bool {
        if self.is_valid {
            warn!("surface already bound, vector target ignored");
            return false;
        }
        self.target = TargetKind::Vector;
        self.unit_scale = PX_TO_PT;
        self.stream = Some(Box::new(stream));
        true
    }

    /// Device pixels per user unit of raster targets.
    pub fn set_raster_scale(&mut self, scale: f64) {
        if self.target == TargetKind::Raster && scale > 0.0 && scale.is_finite() {
            self.unit_scale = scale;
        }
    }

    pub fn set_background(&mut self, background: Option<Color>) {
        self.background = background;
    }

    /// Compress vector content streams; on by default.
    pub fn set_compression(&mut self, compress: bool) {
        self.compress = compress;
    }

    /// Metadata handed to vector surfaces when they are set up.
    pub fn set_metadata(&mut self, metadata: Metadata) {
        self.metadata = metadata;
    }

    /// Create the backend surface. Sizes are in device units.
    pub fn setup_surface(&mut self, width: f64, height: f64) -> bool {
        if self.is_valid {
            return true;
        }
        if !(width > 0.0 && height > 0.0 && width.is_finite() && height.is_finite()) {
            warn!(width, height, "cannot create a surface of this size");
            return false;
        }

        let backend: Box<dyn Backend + 'r> = match self.target {
            TargetKind::Vector => {
                let Some(stream) = self.stream.take() else {
                    warn!("vector target has no output stream");
                    return false;
                };
                let mut pdf = PdfBackend::new(stream, width, height).with_compression(self.compress);
                pdf.set_metadata(&self.metadata);
                Box::new(pdf)
            }
            TargetKind::Raster => {
                let pixels_w = width.ceil() as u32;
                let pixels_h = height.ceil() as u32;
                match RasterBackend::new(pixels_w, pixels_h, self.format) {
                    Ok(raster) => Box::new(raster),
                    Err(e) => {
                        warn!(error = %e, "raster surface setup failed");
                        return false;
                    }
                }
            }
        };

        self.width = width;
        self.height = height;
        self.bind(backend);
        true
    }

    /// Bind an externally created backend.
    pub fn set_surface_target(&mut self, mut backend: Box<dyn Backend + 'r>, is_vector: bool) -> bool {
        if self.is_valid {
            warn!("surface already bound");
            return false;
        }
        self.target = if is_vector {
            TargetKind::Vector
        } else {
            TargetKind::Raster
        };
        if is_vector {
            self.unit_scale = PX_TO_PT;
            backend.set_metadata(&self.metadata);
        }
        let (width, height) = backend.size();
        self.width = width;
        self.height = height;
        self.bind(backend);
        true
    }

    fn bind(&mut self, backend: Box<dyn Backend + 'r>) {
        self.backend = Some(backend);
        self.is_valid = true;
        self.is_show_page = false;
        self.states.current_mut().transform = Affine::scale(self.unit_scale, self.unit_scale);

        if self.target == TargetKind::Raster {
            if let Some(color) = self.background {
                self.fill_surface(color);
            }
        }
    }

    /// Cover the whole surface with an opaque colour.
    fn fill_surface(&mut self, color: Color) {
        let rect = Path::from_rect(&Rect::from_xywh(0.0, 0.0, self.width, self.height));
        if let Some(backend) = self.backend.as_deref_mut() {
            backend.set_transform(&Affine::IDENTITY);
            backend.fill_path(
                &rect,
                FillRule::NonZero,
                &PaintSource::solid(color, 1.0),
                BlendMode::Normal,
            );
        }
    }

    /// An ARGB or alpha-only raster context for clip, mask or tile content,
    /// sharing this context's delegate.
    pub fn create_aux_context(
        &self,
        format: PixelFormat,
        width: f64,
        height: f64,
    ) -> Option<RenderContext<'r>> {
        let mut ctx = RenderContext::new();
        ctx.delegate = self.delegate;
        ctx.format = format;
        if !ctx.setup_surface(width, height) {
            warn!(width, height, "auxiliary surface setup failed");
            return None;
        }
        Some(ctx)
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn is_vector(&self) -> bool {
        self.target == TargetKind::Vector
    }

    pub fn target_kind(&self) -> TargetKind {
        self.target
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    pub fn unit_scale(&self) -> f64 {
        self.unit_scale
    }

    /// Surface size in device units.
    pub fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    pub fn render_mode(&self) -> RenderMode {
        self.render_mode
    }

    pub fn set_render_mode(&mut self, mode: RenderMode) {
        self.render_mode = mode;
    }

    pub fn clip_mode(&self) -> ClipMode {
        self.clip_mode
    }

    pub fn set_clip_mode(&mut self, mode: ClipMode) {
        self.clip_mode = mode;
    }

    pub fn push_state(&mut self) {
        if let Some(backend) = self.backend.as_deref_mut() {
            backend.save();
        }
        self.states.push();
    }

    pub fn pop_state(&mut self) {
        if self.states.pop() {
            if let Some(backend) = self.backend.as_deref_mut() {
                backend.restore();
            }
        }
    }

    pub fn current_state(&self) -> &RenderState {
        self.states.current()
    }

    pub fn current_state_mut(&mut self) -> &mut RenderState {
        self.states.current_mut()
    }

    pub fn parent_state(&self) -> &RenderState {
        self.states.parent()
    }

    /// Number of states pushed above the base state.
    pub fn state_depth(&self) -> usize {
        self.states.depth()
    }

    pub fn set_state_for_style(&mut self, style: &Style) {
        self.states.current_mut().set_for_style(style);
    }

    /// Apply `m` in the current user space.
    pub fn transform(&mut self, m: &Affine) {
        let state = self.states.current_mut();
        state.transform = state.transform.concat(m);
    }

    pub fn set_transform(&mut self, m: &Affine) {
        self.states.current_mut().transform = *m;
    }

    pub fn current_transform(&self) -> Affine {
        self.states.current().transform
    }

    pub fn parent_transform(&self) -> Affine {
        self.states.parent().transform
    }

    /// Intersect the clip with a user-space rectangle.
    pub fn add_clipping_rect(&mut self, x: f64, y: f64, width: f64, height: f64) {
        let transform = self.states.current().transform;
        let device = Path::from_rect(&Rect::from_xywh(x, y, width, height)).transform(&transform);
        if let Some(backend) = self.backend.as_deref_mut() {
            backend.clip(&device, FillRule::NonZero);
        }
    }

    /// Intersect the backend clip with the clip geometry collected so far
    /// and start a new collection.
    pub fn commit_clip(&mut self) {
        let path = std::mem::take(&mut self.pending_clip);
        let rule = self.pending_clip_rule;
        if let Some(backend) = self.backend.as_deref_mut() {
            backend.clip(&path, rule);
        }
    }

    /// Start an off-screen group for the current item.
    pub fn push_layer(&mut self) {
        if let Some(backend) = self.backend.as_deref_mut() {
            backend.push_group();
        }
    }

    /// End the current item's group and composite it with the item's
    /// opacity, clip path and mask.
    pub fn pop_layer(&mut self, op: BlendMode) {
        if self.backend.is_none() {
            return;
        }
        let state = self.states.current().clone();
        let in_clip_pass = self.render_mode == RenderMode::ClippingPass;
        let opacity = if in_clip_pass { 1.0 } else { state.opacity };
        let clip = state.clip_path.as_ref();
        let mask = if in_clip_pass {
            if state.mask.is_some() {
                trace!("mask ignored inside clip content");
            }
            None
        } else {
            state.mask.as_ref()
        };

        if clip.is_none() && mask.is_none() {
            self.pop_group();
            self.paint_source(opacity, op);
            return;
        }

        let mut clip_mask = None;
        if let Some(clip) = clip {
            if self.is_vector() {
                self.clip_mode = ClipMode::PathClip;
                if mask.is_none() {
                    self.pop_group();
                    self.apply_clip(clip);
                    self.paint_source(opacity, op);
                    return;
                }
            } else {
                let fill_alpha = if mask.is_none() { opacity } else { 1.0 };
                let Some(rendered) = self.render_clip_mask(clip, fill_alpha) else {
                    warn!(id = %clip.id, "clip surface unavailable, layer dropped");
                    self.pop_group();
                    return;
                };
                if mask.is_none() {
                    self.pop_group();
                    if let Some(backend) = self.backend.as_deref_mut() {
                        backend.mask(&rendered, op);
                    }
                    return;
                }
                clip_mask = Some(rendered);
            }
        }

        if let Some(mask) = mask {
            let Some(mut alpha) = self.render_luminance_mask(mask, opacity) else {
                warn!(id = %mask.id, "mask surface unavailable, layer dropped");
                self.pop_group();
                return;
            };
            if let Some(clip_mask) = &clip_mask {
                alpha.intersect(clip_mask);
            }
            self.pop_group();
            if let Some(clip) = clip {
                if self.is_vector() && self.clip_mode == ClipMode::PathClip {
                    self.apply_clip(clip);
                }
            }
            if let Some(backend) = self.backend.as_deref_mut() {
                backend.mask(&alpha, op);
            }
        }
    }

    fn pop_group(&mut self) {
        if let Some(backend) = self.backend.as_deref_mut() {
            backend.pop_group_to_source();
        }
    }

    fn paint_source(&mut self, alpha: f64, op: BlendMode) {
        if let Some(backend) = self.backend.as_deref_mut() {
            backend.paint(alpha, op);
        }
    }

    /// User space of the current item's clip and mask content.
    fn reference_user_space(&self) -> Affine {
        let state = self.states.current();
        if state.parent_has_userspace {
            self.states.parent().transform.concat(&state.item_transform)
        } else {
            state.transform
        }
    }

    fn apply_clip(&mut self, clip: &ReferenceView) {
        let Some(delegate) = self.delegate else {
            debug!(id = %clip.id, "no delegate to resolve clip path");
            return;
        };
        let user_space = self.reference_user_space();
        if !delegate.apply_clip_path(self, clip, &user_space) {
            debug!(id = %clip.id, "clip path not applied");
        }
    }

    /// Render clip content into an alpha surface the size of this one.
    fn render_clip_mask(&self, clip: &ReferenceView, fill_alpha: f64) -> Option<AlphaMask> {
        let delegate = self.delegate?;
        let user_space = self.reference_user_space();
        let mut clip_ctx = self.create_aux_context(PixelFormat::A8, self.width, self.height)?;
        clip_ctx.clip_mode = ClipMode::MaskBitmap;
        clip_ctx.clip_fill_alpha = fill_alpha;

        clip_ctx.push_state();
        delegate.apply_clip_path(&mut clip_ctx, clip, &user_space);
        clip_ctx.pop_state();

        let image = clip_ctx.snapshot()?;
        Some(AlphaMask {
            width: image.width,
            height: image.height,
            data: image.data.chunks_exact(4).map(|px| px[3]).collect(),
            scale: 1.0,
        })
    }

    /// Render mask content over opaque black and convert its luminance to
    /// alpha.
    fn render_luminance_mask(&self, mask: &ReferenceView, opacity: f64) -> Option<AlphaMask> {
        let delegate = self.delegate?;
        let aux_scale = if self.is_vector() {
            MASK_DPI_CORRECTION
        } else {
            1.0
        };
        let user_space = self.reference_user_space();
        let mut mask_ctx = self.create_aux_context(
            PixelFormat::Argb32,
            self.width * aux_scale,
            self.height * aux_scale,
        )?;
        mask_ctx.fill_surface(Color::black());

        let base = Affine::scale(aux_scale, aux_scale).concat(&user_space);
        delegate.apply_mask(&mut mask_ctx, mask, &base);

        let image = mask_ctx.snapshot()?;
        Some(AlphaMask {
            width: image.width,
            height: image.height,
            data: luminance_to_alpha(&image, opacity),
            scale: 1.0 / aux_scale,
        })
    }

    /// Resolve a fill or stroke paint into a backend paint source.
    fn resolve_paint(&self, paint: &Paint, alpha: f64, bbox: Option<&Rect>) -> Option<PaintSource> {
        match paint {
            Paint::None => None,
            Paint::Color(color) => Some(PaintSource::solid(*color, alpha)),
            Paint::Server { id, fallback } => {
                let source = self
                    .delegate
                    .and_then(|delegate| delegate.paint_source(self, id, bbox, alpha));
                match (source, fallback) {
                    (Some(source), _) => Some(source),
                    (None, Some(color)) => {
                        debug!(id = %id, "paint server unavailable, using fallback colour");
                        Some(PaintSource::solid(*color, alpha))
                    }
                    (None, None) => {
                        debug!(id = %id, "paint server unavailable, paint skipped");
                        None
                    }
                }
            }
        }
    }

    /// Add geometry to the clip being collected, or fill it into the clip
    /// surface.
    fn add_clip_geometry(&mut self, path: &Path, rule: FillRule) {
        let transform = self.states.current().transform;
        match self.clip_mode {
            ClipMode::PathClip => {
                self.pending_clip.extend(&path.transform(&transform));
                self.pending_clip_rule = rule;
            }
            ClipMode::MaskBitmap => {
                let source = PaintSource::solid(Color::white(), self.clip_fill_alpha);
                if let Some(backend) = self.backend.as_deref_mut() {
                    backend.set_transform(&transform);
                    backend.fill_path(path, rule, &source, BlendMode::Normal);
                }
            }
        }
    }

    fn fill(&mut self, path: &Path, rule: FillRule, source: &PaintSource) {
        let transform = self.states.current().transform;
        if let Some(backend) = self.backend.as_deref_mut() {
            backend.set_transform(&transform);
            backend.fill_path(path, rule, source, BlendMode::Normal);
        }
    }

    fn stroke(&mut self, path: &Path, style: &Style, source: &PaintSource) {
        let transform = self.states.current().transform;
        let mut props = style.stroke_props.clone();
        props.miter_limit = props.miter_limit.max(1.0);
        if let Some(backend) = self.backend.as_deref_mut() {
            backend.set_transform(&transform);
            backend.stroke_path(path, &props, source, BlendMode::Normal);
        }
    }

    fn backend_save(&mut self) {
        if let Some(backend) = self.backend.as_deref_mut() {
            backend.save();
        }
    }

    fn backend_restore(&mut self) {
        if let Some(backend) = self.backend.as_deref_mut() {
            backend.restore();
        }
    }

    /// Fill and stroke a user-space path.
    pub fn render_path_vector(
        &mut self,
        path: &Path,
        style: &Style,
        bbox: Option<&Rect>,
        order: PathPaintOrder,
    ) -> bool {
        if path.is_empty() {
            return true;
        }
        if self.render_mode == RenderMode::ClippingPass {
            self.add_clip_geometry(path, style.fill_rule);
            return true;
        }

        let props = &style.stroke_props;
        let no_fill =
            style.fill.is_none() || style.fill_opacity == 0.0 || order == PathPaintOrder::StrokeOnly;
        let no_stroke = style.stroke.is_none()
            || (!props.hairline && props.width < MIN_STROKE_WIDTH)
            || style.stroke_opacity == 0.0
            || order == PathPaintOrder::FillOnly;
        if no_fill && no_stroke {
            return true;
        }

        let state = self.states.current();
        let need_layer = (!state.merge_opacity
            && !state.need_layer
            && (state.opacity != 1.0 || state.clip_path.is_some() || state.mask.is_some()))
            || style.blend_mode != BlendMode::Normal;
        let opacity = if state.merge_opacity {
            state.opacity
        } else {
            1.0
        };

        let fill_source = if no_fill {
            None
        } else {
            self.resolve_paint(&style.fill, style.fill_opacity * opacity, bbox)
        };
        let stroke_source = if no_stroke {
            None
        } else {
            self.resolve_paint(&style.stroke, style.stroke_opacity * opacity, bbox)
        };

        self.backend_save();
        if need_layer {
            self.push_layer();
        }

        if matches!(order, PathPaintOrder::StrokeOverFill | PathPaintOrder::FillOnly) {
            if let Some(source) = &fill_source {
                self.fill(path, style.fill_rule, source);
            }
        }
        if let Some(source) = &stroke_source {
            self.stroke(path, style, source);
        }
        if order == PathPaintOrder::FillOverStroke {
            if let Some(source) = &fill_source {
                self.fill(path, style.fill_rule, source);
            }
        }

        if need_layer {
            self.pop_layer(style.blend_mode);
        }
        self.backend_restore();
        true
    }

    /// Draw `image` with its pixel grid mapped through `placement`.
    pub fn render_image(&mut self, image: &ImageData, placement: &Affine, style: &Style) -> bool {
        if self.render_mode == RenderMode::ClippingPass {
            return true;
        }
        let is_vector = self.is_vector();
        let transform = self.states.current().transform.concat(placement);
        let filter = if style.image_rendering.wants_nearest() {
            ImageFilter::Nearest
        } else {
            ImageFilter::Smooth
        };
        let Some(backend) = self.backend.as_deref_mut() else {
            return false;
        };

        backend.save();
        backend.set_transform(&transform);
        if is_vector {
            let bounds = Rect::from_xywh(0.0, 0.0, image.width as f64, image.height as f64);
            backend.clip(&Path::from_rect(&bounds).transform(&transform), FillRule::NonZero);
        }
        backend.draw_image(image, filter, style.blend_mode);
        backend.restore();
        true
    }

    /// Draw a positioned glyph run.
    ///
    /// Returns true when the fill still has to be drawn over the stroke in
    /// a second call with `second_pass` set.
    pub fn render_glyph_run(
        &mut self,
        font: &dyn GlyphOutlines,
        font_matrix: &Affine,
        glyphs: &[Glyph],
        style: &Style,
        second_pass: bool,
    ) -> bool {
        let outlines = glyph_run_path(font, font_matrix, glyphs);

        if self.render_mode == RenderMode::ClippingPass {
            if !outlines.is_empty() {
                self.add_clip_geometry(&outlines, style.fill_rule);
            }
            return false;
        }

        let has_fill = !style.fill.is_none();
        let has_stroke = !style.stroke.is_none();
        if !has_fill && !has_stroke {
            return false;
        }

        let order = &style.paint_order;
        let stroke_over_fill = order.position(PaintLayer::Stroke) > order.position(PaintLayer::Fill)
            || !has_fill
            || !has_stroke;
        let fill_pass = has_fill && stroke_over_fill != second_pass;
        let stroke_pass = has_stroke && !second_pass;

        if !outlines.is_empty() {
            let state = self.states.current();
            let opacity = if state.merge_opacity {
                state.opacity
            } else {
                1.0
            };
            if fill_pass {
                if let Some(source) =
                    self.resolve_paint(&style.fill, style.fill_opacity * opacity, None)
                {
                    self.fill(&outlines, style.fill_rule, &source);
                }
            }
            if stroke_pass {
                if let Some(source) =
                    self.resolve_paint(&style.stroke, style.stroke_opacity * opacity, None)
                {
                    self.stroke(&outlines, style, &source);
                }
            }
        }

        !stroke_over_fill && !second_pass
    }

    /// Start a hyperlink area.
    pub fn tag_begin(&mut self, href: &str) {
        if self.render_mode != RenderMode::Normal {
            return;
        }
        if let Some(backend) = self.backend.as_deref_mut() {
            backend.tag_begin_link(href);
        }
    }

    pub fn tag_end(&mut self) {
        if self.render_mode != RenderMode::Normal {
            return;
        }
        if let Some(backend) = self.backend.as_deref_mut() {
            backend.tag_end_link();
        }
    }

    /// Begin a page of `width × height` device units.
    pub fn next_page(&mut self, width: f64, height: f64, label: Option<&str>) -> bool {
        if !self.is_vector() {
            return false;
        }
        let Some(backend) = self.backend.as_deref_mut() else {
            return false;
        };
        backend.resize(width, height);
        if let Some(label) = label {
            backend.set_page_label(label);
        }
        self.width = width;
        self.height = height;
        self.is_show_page = false;
        true
    }

    /// Emit the current page once and report the backend status.
    pub fn finish_page(&mut self) -> bool {
        let Some(backend) = self.backend.as_deref_mut() else {
            return false;
        };
        if !self.is_show_page {
            backend.show_page();
            self.is_show_page = true;
        }
        match backend.status() {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "page output failed");
                false
            }
        }
    }

    /// Flush the surface. Vector targets emit a pending page first.
    pub fn finish(&mut self) -> RenderResult<()> {
        let is_vector = self.is_vector();
        let Some(backend) = self.backend.as_deref_mut() else {
            if is_vector && self.stream.is_none() {
                return Err(RenderError::MissingStream);
            }
            return Err(RenderError::NoSurface);
        };
        if is_vector && !self.is_show_page {
            backend.show_page();
            self.is_show_page = true;
        }
        backend.status()?;
        backend.finish()
    }

    /// Current pixels of a raster surface.
    pub fn snapshot(&self) -> Option<ImageData> {
        self.backend.as_deref()?.snapshot()
    }
}

/// Outlines of a glyph run in user space.
pub fn glyph_run_path(font: &dyn GlyphOutlines, font_matrix: &Affine, glyphs: &[Glyph]) -> Path {
    let mut path = Path::new();
    for glyph in glyphs {
        if glyph.id == EMPTY_GLYPH || glyph.id & UNKNOWN_GLYPH_FLAG != 0 {
            trace!(glyph = glyph.id, "skipping empty or unknown glyph");
            continue;
        }
        let Some(outline) = font.outline(glyph.id) else {
            continue;
        };
        let m = Affine::translate(glyph.x, glyph.y).concat(font_matrix);
        path.extend(&outline.transform(&m));
    }
    path
}

/// Alpha from the luminance of premultiplied pixels, scaled by `opacity`.
pub fn luminance_to_alpha(image: &ImageData, opacity: f64) -> Vec<u8> {
    let opacity = opacity.clamp(0.0, 1.0);
    image
        .data
        .chunks_exact(4)
        .map(|px| {
            let luminance = (px[0] as f64 * LUMINANCE_R
                + px[1] as f64 * LUMINANCE_G
                + px[2] as f64 * LUMINANCE_B)
                / 255.0;
            // The weights sum to one only up to rounding
            (255.0 * luminance * opacity + 1e-4).floor().clamp(0.0, 255.0) as u8
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::style::PaintOrder;
    use crate::rendering::backend::{OperationLog, RecordingBackend};

    #[derive(Debug)]
    struct SquareFont;

    impl GlyphOutlines for SquareFont {
        fn units_per_em(&self) -> f64 {
            1000.0
        }

        fn outline(&self, _glyph: u32) -> Option<Path> {
            let mut path = Path::new();
            path.rect(0.0, 0.0, 500.0, 700.0);
            Some(path)
        }
    }

    /// Clips to, or masks with, a fixed rectangle.
    struct RectDelegate {
        rect: Rect,
    }

    impl RenderDelegate for RectDelegate {
        fn apply_clip_path(
            &self,
            ctx: &mut RenderContext<'_>,
            _clip: &ReferenceView,
            user_space: &Affine,
        ) -> bool {
            let saved_mode = ctx.render_mode();
            let saved_transform = ctx.current_transform();
            ctx.set_render_mode(RenderMode::ClippingPass);
            ctx.set_transform(user_space);
            ctx.render_path_vector(
                &Path::from_rect(&self.rect),
                &Style::default(),
                None,
                PathPaintOrder::StrokeOverFill,
            );
            if ctx.clip_mode() == ClipMode::PathClip && saved_mode == RenderMode::Normal {
                ctx.commit_clip();
            }
            ctx.set_transform(&saved_transform);
            ctx.set_render_mode(saved_mode);
            true
        }

        fn apply_mask(
            &self,
            ctx: &mut RenderContext<'_>,
            _mask: &ReferenceView,
            user_space: &Affine,
        ) -> bool {
            ctx.set_transform(user_space);
            let style = Style {
                fill: Paint::Color(Color::white()),
                ..Style::default()
            };
            ctx.render_path_vector(
                &Path::from_rect(&self.rect),
                &style,
                None,
                PathPaintOrder::StrokeOverFill,
            );
            true
        }

        fn paint_source(
            &self,
            _ctx: &RenderContext<'_>,
            _id: &str,
            _bbox: Option<&Rect>,
            _alpha: f64,
        ) -> Option<PaintSource> {
            None
        }
    }

    fn recording_context(kind: TargetKind) -> (RenderContext<'static>, OperationLog) {
        let backend = RecordingBackend::new(kind, 100.0, 100.0);
        let log = backend.log();
        let mut ctx = RenderContext::new();
        assert!(ctx.set_surface_target(Box::new(backend), kind == TargetKind::Vector));
        (ctx, log)
    }

    fn red_square() -> (Path, Style) {
        let mut path = Path::new();
        path.rect(0.0, 0.0, 10.0, 10.0);
        let style = Style {
            fill: Paint::Color(Color::red()),
            ..Style::default()
        };
        (path, style)
    }

    fn count(log: &OperationLog, op: &str) -> usize {
        log.borrow().iter().filter(|o| o.starts_with(op)).count()
    }

    #[test]
    fn test_state_push_pop_balance() {
        let (mut ctx, log) = recording_context(TargetKind::Raster);
        ctx.push_state();
        ctx.transform(&Affine::scale(2.0, 2.0));
        ctx.push_state();
        assert_eq!(ctx.current_transform(), Affine::scale(2.0, 2.0));
        ctx.pop_state();
        ctx.pop_state();
        ctx.pop_state();
        assert_eq!(ctx.state_depth(), 0);
        assert_eq!(count(&log, "save"), 2);
        assert_eq!(count(&log, "restore"), 2);
    }

    #[test]
    fn test_plain_fill_has_no_layer() {
        let (mut ctx, log) = recording_context(TargetKind::Raster);
        let (path, style) = red_square();
        assert!(ctx.render_path_vector(&path, &style, None, PathPaintOrder::StrokeOverFill));
        assert_eq!(count(&log, "fill_path(NonZero, solid)"), 1);
        assert_eq!(count(&log, "push_group"), 0);
        assert_eq!(count(&log, "save"), count(&log, "restore"));
    }

    #[test]
    fn test_empty_or_unpainted_path_is_noop() {
        let (mut ctx, log) = recording_context(TargetKind::Raster);
        let (_, style) = red_square();
        assert!(ctx.render_path_vector(&Path::new(), &style, None, PathPaintOrder::StrokeOverFill));

        let (path, _) = red_square();
        let unpainted = Style {
            fill: Paint::None,
            ..Style::default()
        };
        assert!(ctx.render_path_vector(&path, &unpainted, None, PathPaintOrder::StrokeOverFill));

        let transparent = Style {
            fill_opacity: 0.0,
            ..Style::default()
        };
        assert!(ctx.render_path_vector(&path, &transparent, None, PathPaintOrder::StrokeOverFill));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_fill_over_stroke_order() {
        let (mut ctx, log) = recording_context(TargetKind::Raster);
        let (path, mut style) = red_square();
        style.stroke = Paint::Color(Color::blue());
        ctx.render_path_vector(&path, &style, None, PathPaintOrder::FillOverStroke);
        let ops = log.borrow();
        let stroke = ops.iter().position(|o| o.starts_with("stroke_path")).unwrap();
        let fill = ops.iter().position(|o| o.starts_with("fill_path")).unwrap();
        assert!(stroke < fill);
    }

    #[test]
    fn test_private_layer_for_unmerged_opacity() {
        let (mut ctx, log) = recording_context(TargetKind::Raster);
        ctx.push_state();
        ctx.current_state_mut().opacity = 0.5;
        ctx.current_state_mut().merge_opacity = false;
        let (path, style) = red_square();
        ctx.render_path_vector(&path, &style, None, PathPaintOrder::StrokeOverFill);
        ctx.pop_state();
        assert_eq!(count(&log, "push_group"), 1);
        assert_eq!(count(&log, "paint(0.5, Normal)"), 1);
    }

    #[test]
    fn test_blend_mode_forces_layer() {
        let (mut ctx, log) = recording_context(TargetKind::Raster);
        let (path, mut style) = red_square();
        style.blend_mode = BlendMode::Multiply;
        ctx.render_path_vector(&path, &style, None, PathPaintOrder::StrokeOverFill);
        assert_eq!(count(&log, "push_group"), 1);
        assert_eq!(count(&log, "paint(1, Multiply)"), 1);
    }

    #[test]
    fn test_path_clip_collects_geometry() {
        let (mut ctx, log) = recording_context(TargetKind::Vector);
        ctx.set_render_mode(RenderMode::ClippingPass);
        ctx.set_clip_mode(ClipMode::PathClip);
        let (path, style) = red_square();
        ctx.render_path_vector(&path, &style, None, PathPaintOrder::StrokeOverFill);
        assert_eq!(count(&log, "fill_path"), 0);
        ctx.commit_clip();
        assert_eq!(count(&log, "clip(NonZero)"), 1);
    }

    #[test]
    fn test_image_skipped_in_clipping_pass() {
        let (mut ctx, log) = recording_context(TargetKind::Raster);
        let image = ImageData::from_rgba(2, 2, vec![255; 16]).unwrap();
        ctx.set_render_mode(RenderMode::ClippingPass);
        assert!(ctx.render_image(&image, &Affine::IDENTITY, &Style::default()));
        assert!(log.borrow().is_empty());

        ctx.set_render_mode(RenderMode::Normal);
        let style = Style {
            image_rendering: crate::core::style::ImageRendering::Pixelated,
            ..Style::default()
        };
        ctx.render_image(&image, &Affine::IDENTITY, &style);
        assert_eq!(count(&log, "draw_image(2x2, Nearest"), 1);
    }

    #[test]
    fn test_vector_image_is_clipped_to_its_bounds() {
        let (mut ctx, log) = recording_context(TargetKind::Vector);
        let image = ImageData::from_rgba(1, 1, vec![0, 0, 0, 255]).unwrap();
        ctx.render_image(&image, &Affine::scale(10.0, 10.0), &Style::default());
        assert_eq!(count(&log, "clip(NonZero)"), 1);
        assert_eq!(count(&log, "draw_image(1x1, Smooth"), 1);
    }

    #[test]
    fn test_glyph_run_passes() {
        let (mut ctx, log) = recording_context(TargetKind::Raster);
        let glyphs = [
            Glyph { id: 3, x: 0.0, y: 10.0 },
            Glyph { id: EMPTY_GLYPH, x: 5.0, y: 10.0 },
        ];
        let matrix = Affine::scale(0.01, -0.01);
        let mut style = Style {
            stroke: Paint::Color(Color::blue()),
            ..Style::default()
        };

        assert!(!ctx.render_glyph_run(&SquareFont, &matrix, &glyphs, &style, false));
        assert_eq!(count(&log, "fill_path"), 1);
        assert_eq!(count(&log, "stroke_path"), 1);

        style.paint_order = PaintOrder([PaintLayer::Stroke, PaintLayer::Fill, PaintLayer::Markers]);
        log.borrow_mut().clear();
        assert!(ctx.render_glyph_run(&SquareFont, &matrix, &glyphs, &style, false));
        assert_eq!(count(&log, "fill_path"), 0);
        assert_eq!(count(&log, "stroke_path"), 1);
        assert!(!ctx.render_glyph_run(&SquareFont, &matrix, &glyphs, &style, true));
        assert_eq!(count(&log, "fill_path"), 1);
    }

    #[test]
    fn test_glyph_run_path_skips_flagged_ids() {
        let glyphs = [
            Glyph { id: 1, x: 0.0, y: 0.0 },
            Glyph { id: 0x1000_0005, x: 0.0, y: 0.0 },
            Glyph { id: EMPTY_GLYPH, x: 0.0, y: 0.0 },
        ];
        let path = glyph_run_path(&SquareFont, &Affine::scale(0.01, -0.01), &glyphs);
        let bbox = path.bounding_box().unwrap();
        assert!((bbox.width() - 5.0).abs() < 1e-9);
        assert!((bbox.top() + 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_setup_failures() {
        let mut ctx = RenderContext::new();
        assert!(!ctx.setup_surface(0.0, 10.0));
        assert!(!ctx.is_valid());

        let mut ctx = RenderContext::new();
        ctx.target = TargetKind::Vector;
        assert!(!ctx.setup_surface(10.0, 10.0));
    }

    #[test]
    fn test_vector_setup_scales_to_points() {
        let mut out = Vec::new();
        {
            let mut ctx = RenderContext::new();
            assert!(ctx.set_vector_target(&mut out));
            assert!(ctx.setup_surface(75.0, 75.0));
            assert!(ctx.setup_surface(1.0, 1.0));
            assert_eq!(ctx.current_transform(), Affine::scale(PX_TO_PT, PX_TO_PT));
            ctx.finish().unwrap();
        }
        assert!(out.starts_with(b"%PDF"));
    }

    #[test]
    fn test_finish_page_shows_once() {
        let (mut ctx, log) = recording_context(TargetKind::Vector);
        assert!(ctx.next_page(50.0, 60.0, Some("i")));
        assert!(ctx.finish_page());
        assert!(ctx.finish_page());
        ctx.finish().unwrap();
        assert_eq!(count(&log, "show_page"), 1);
        assert_eq!(count(&log, "page_label(i)"), 1);
        assert_eq!(ctx.size(), (50.0, 60.0));
    }

    #[test]
    fn test_luminance_to_alpha() {
        let image =
            ImageData::from_rgba(3, 1, vec![255, 255, 255, 255, 0, 0, 0, 255, 0, 0, 0, 0]).unwrap();
        assert_eq!(luminance_to_alpha(&image, 1.0), vec![255, 0, 0]);
        assert_eq!(luminance_to_alpha(&image, 0.5)[0], 127);
    }

    #[test]
    fn test_raster_clip_layer() {
        let delegate = RectDelegate {
            rect: Rect::new(0.0, 0.0, 5.0, 10.0),
        };
        let mut ctx = RenderContext::with_delegate(&delegate);
        assert!(ctx.setup_surface(10.0, 10.0));
        ctx.push_state();
        ctx.current_state_mut().clip_path = Some(ReferenceView::new("c", None));
        ctx.current_state_mut().need_layer = true;
        ctx.current_state_mut().merge_opacity = false;
        ctx.push_layer();
        let mut path = Path::new();
        path.rect(0.0, 0.0, 10.0, 10.0);
        let style = Style {
            fill: Paint::Color(Color::red()),
            ..Style::default()
        };
        ctx.render_path_vector(&path, &style, None, PathPaintOrder::StrokeOverFill);
        ctx.pop_layer(BlendMode::Normal);
        ctx.pop_state();

        let image = ctx.snapshot().unwrap();
        assert_eq!(image.pixel(2, 5), Some([255, 0, 0, 255]));
        assert_eq!(image.pixel(7, 5), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_raster_mask_layer() {
        let delegate = RectDelegate {
            rect: Rect::new(0.0, 0.0, 10.0, 5.0),
        };
        let mut ctx = RenderContext::with_delegate(&delegate);
        assert!(ctx.setup_surface(10.0, 10.0));
        ctx.push_state();
        ctx.current_state_mut().mask = Some(ReferenceView::new("m", None));
        ctx.current_state_mut().opacity = 0.5;
        ctx.current_state_mut().need_layer = true;
        ctx.current_state_mut().merge_opacity = false;
        ctx.push_layer();
        let mut path = Path::new();
        path.rect(0.0, 0.0, 10.0, 10.0);
        let style = Style {
            fill: Paint::Color(Color::red()),
            ..Style::default()
        };
        ctx.render_path_vector(&path, &style, None, PathPaintOrder::StrokeOverFill);
        ctx.pop_layer(BlendMode::Normal);
        ctx.pop_state();

        let image = ctx.snapshot().unwrap();
        let inside = image.pixel(5, 2).unwrap();
        assert!((inside[3] as i32 - 127).abs() <= 1);
        assert_eq!(image.pixel(5, 8).unwrap()[3], 0);
    }
}
