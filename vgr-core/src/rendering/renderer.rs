//! Walks a document's item tree and draws it into a [`RenderContext`].

use std::cell::Cell;

use tracing::{debug, error, trace, warn};

use crate::core::config::RenderConfig;
use crate::core::document::{Document, HatchPath, Item, ItemKind, Metadata, Page, Units};
use crate::core::geom::{Affine, Rect};
use crate::core::markers::{
    marker_content_transform, marker_placement, marker_vertices, marker_viewport, MarkerPosition,
};
use crate::core::path::Path;
use crate::core::style::{BlendMode, Overflow, Paint, PaintLayer, Style};
use crate::rendering::context::{
    glyph_run_path, ClipMode, PathPaintOrder, RenderContext, RenderDelegate, RenderMode,
};
use crate::rendering::paint::PaintSource;
use crate::rendering::pages::PageSequencer;
use crate::rendering::pdf_backend::pdf_date_from_epoch;
use crate::rendering::state::ReferenceView;
use crate::rendering::tile::{hatch_path_geometry, PatternTileRenderer};

/// Nesting limit for `use` references.
pub const MAX_USE_DEPTH: usize = 32;

/// Nesting limit for pattern tiles drawn inside pattern tiles.
const MAX_TILE_DEPTH: usize = 4;

/// Decrements a nesting counter when dropped.
#[derive(Debug)]
pub(crate) struct NestingGuard<'a>(&'a Cell<usize>);

impl<'a> NestingGuard<'a> {
    fn enter(counter: &'a Cell<usize>, limit: usize) -> Option<Self> {
        let depth = counter.get();
        if depth >= limit {
            return None;
        }
        counter.set(depth + 1);
        Some(NestingGuard(counter))
    }
}

impl Drop for NestingGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

/// Draws items of one document.
#[derive(Debug)]
pub struct Renderer<'d> {
    document: &'d Document,
    config: RenderConfig,
    use_depth: Cell<usize>,
    viewport_depth: Cell<usize>,
    tile_depth: Cell<usize>,
}

impl<'d> Renderer<'d> {
    /// A renderer using the document's own config, or the defaults.
    pub fn new(document: &'d Document) -> Self {
        let config = document.config.clone().unwrap_or_default();
        Self::with_config(document, config)
    }

    pub fn with_config(document: &'d Document, config: RenderConfig) -> Self {
        Renderer {
            document,
            config,
            use_depth: Cell::new(0),
            viewport_depth: Cell::new(0),
            tile_depth: Cell::new(0),
        }
    }

    pub fn document(&self) -> &'d Document {
        self.document
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub(crate) fn enter_tile(&self) -> Option<NestingGuard<'_>> {
        let guard = NestingGuard::enter(&self.tile_depth, MAX_TILE_DEPTH);
        if guard.is_none() {
            warn!("pattern tiles nested too deeply");
        }
        guard
    }

    /// A raster context configured from the render config. Call
    /// [`RenderContext::set_vector_target`] before setup for PDF output.
    pub fn create_context(&self) -> RenderContext<'_> {
        let mut ctx = RenderContext::with_delegate(self);
        ctx.set_raster_target(self.config.pixel_format);
        ctx.set_raster_scale(self.config.raster_scale());
        ctx.set_background(self.config.background);
        ctx
    }

    /// Document metadata with the creator and a reproducible creation date
    /// filled in.
    fn metadata(&self) -> Metadata {
        let mut metadata = self.document.metadata.clone();
        if metadata.creator.is_none() {
            metadata.creator = Some(self.config.creator.clone());
        }
        if metadata.creation_date.is_none() {
            metadata.creation_date = source_date_epoch().map(pdf_date_from_epoch);
        }
        metadata
    }

    /// Size the surface for the whole document, or for the bounds of
    /// `base` with its corner moved to the origin.
    pub fn setup_document(&self, ctx: &mut RenderContext<'_>, base: Option<&Item>) -> bool {
        let area = match base {
            Some(item) => match self.visual_bbox(item).map(|b| b.transform(&item.transform)) {
                Some(bounds) if !bounds.is_empty() => bounds,
                _ => {
                    warn!(id = ?item.id, "base item has no visible area");
                    return false;
                }
            },
            None => Rect::from_xywh(0.0, 0.0, self.document.width, self.document.height),
        };

        let scale = ctx.unit_scale();
        ctx.set_metadata(self.metadata());
        if !ctx.setup_surface(area.width() * scale, area.height() * scale) {
            return false;
        }
        if base.is_some() {
            ctx.transform(&Affine::translate(-area.left(), -area.top()));
        }
        true
    }

    /// Size the surface for a single page.
    pub fn setup_page(&self, ctx: &mut RenderContext<'_>, page: &Page, stretch_to_fit: bool) -> bool {
        let sequencer = PageSequencer::new(self.document.document_scale, stretch_to_fit);
        let geometry = sequencer.geometry(page, ctx.unit_scale());
        ctx.set_metadata(self.metadata());
        ctx.setup_surface(geometry.rounded.width(), geometry.rounded.height())
    }

    /// Render every page, or the whole root when the document has none.
    ///
    /// Raster targets hold a single page, so only the first one is drawn.
    pub fn render_pages(&self, ctx: &mut RenderContext<'_>, stretch_to_fit: bool) -> bool {
        let pages = self.document.pages.as_slice();
        if pages.is_empty() {
            self.render_item(ctx, &self.document.root, None, None);
            return true;
        }
        let pages = if ctx.is_vector() {
            pages
        } else {
            if pages.len() > 1 {
                debug!(count = pages.len(), "raster output holds the first page only");
            }
            &pages[..1]
        };

        let sequencer = PageSequencer::new(self.document.document_scale, stretch_to_fit);
        for page in pages {
            ctx.push_state();
            let rendered = self.render_page(ctx, page, stretch_to_fit);
            let finished = rendered && sequencer.finish_page(ctx);
            ctx.pop_state();
            if !finished {
                error!(label = ?page.label, "could not render page");
                return false;
            }
        }
        true
    }

    /// Render the root children overlapping `page`.
    pub fn render_page(&self, ctx: &mut RenderContext<'_>, page: &Page, stretch_to_fit: bool) -> bool {
        let root = &self.document.root;
        let sequencer = PageSequencer::new(self.document.document_scale, stretch_to_fit);
        let page_rect = sequencer.geometry(page, ctx.unit_scale()).user_rect;
        if !sequencer.begin_page(ctx, page, &root.transform) {
            return false;
        }

        let content = self.viewport_transform(root);
        let to_page = root.transform.concat(&content);
        ctx.push_state();
        ctx.transform(&content);
        for child in root.children() {
            let overlaps = self
                .visual_bbox(child)
                .map(|b| b.transform(&to_page.concat(&child.transform)).overlaps(&page_rect))
                .unwrap_or(true);
            if !overlaps {
                trace!(id = ?child.id, "item outside page");
                continue;
            }
            ctx.push_state();
            self.render_item(ctx, child, None, Some(page));
            ctx.pop_state();
        }
        ctx.pop_state();
        true
    }

    /// Render `item` and its subtree with its clip, mask and opacity.
    ///
    /// `origin` is the `use` item through which the subtree is reached.
    pub fn render_item(
        &self,
        ctx: &mut RenderContext<'_>,
        item: &Item,
        origin: Option<&Item>,
        page: Option<&Page>,
    ) {
        ctx.push_state();
        self.set_state_for_item(ctx, item);

        let group_like = matches!(
            item.kind,
            ItemKind::Root { .. } | ItemKind::Group { .. } | ItemKind::Symbol { .. } | ItemKind::Anchor { .. }
        );
        let blend = group_like && item.style.blend_mode != BlendMode::Normal;
        let state = ctx.current_state();
        let need_layer = match (ctx.render_mode(), ctx.clip_mode()) {
            (RenderMode::Normal, _) => {
                state.mask.is_some()
                    || state.clip_path.is_some()
                    || state.opacity != 1.0
                    || blend
            }
            (RenderMode::ClippingPass, ClipMode::MaskBitmap) => state.clip_path.is_some(),
            (RenderMode::ClippingPass, ClipMode::PathClip) => {
                if state.clip_path.is_some() {
                    debug!(id = ?item.id, "clip path inside clip content ignored");
                }
                false
            }
        };

        if need_layer {
            let state = ctx.current_state_mut();
            state.need_layer = true;
            state.merge_opacity = false;
            ctx.push_layer();
        }

        ctx.transform(&item.transform);
        self.do_render(ctx, item, origin, page);

        if need_layer {
            let op = if blend {
                item.style.blend_mode
            } else {
                BlendMode::Normal
            };
            ctx.pop_layer(op);
        }
        ctx.pop_state();
    }

    fn set_state_for_item(&self, ctx: &mut RenderContext<'_>, item: &Item) {
        ctx.set_state_for_style(&item.style);

        let clip_id = item.clip_path.as_deref().filter(|id| {
            let known = self.document.clip_paths.contains_key(*id);
            if !known {
                warn!(id = %id, "unknown clip path ignored");
            }
            known
        });
        let mask_id = item.mask.as_deref().filter(|id| {
            let known = self.document.masks.contains_key(*id);
            if !known {
                warn!(id = %id, "unknown mask ignored");
            }
            known
        });
        let bbox = if clip_id.is_some() || mask_id.is_some() {
            self.item_bbox(item)
        } else {
            None
        };

        let state = ctx.current_state_mut();
        state.clip_path = clip_id.map(|id| ReferenceView::new(id, bbox));
        state.mask = mask_id.map(|id| ReferenceView::new(id, bbox));
        state.item_transform = item.transform;
        state.parent_has_userspace = matches!(item.kind, ItemKind::Text { .. } | ItemKind::Image { .. });
    }

    fn do_render(
        &self,
        ctx: &mut RenderContext<'_>,
        item: &Item,
        origin: Option<&Item>,
        page: Option<&Page>,
    ) {
        if item.hidden {
            return;
        }
        if ctx.current_state().has_filter {
            trace!(id = ?item.id, "filter effects are not applied");
        }

        match &item.kind {
            ItemKind::Root { .. } => self.render_root(ctx, item, page),
            ItemKind::Group { children } => {
                for child in children {
                    self.render_item(ctx, child, origin, page);
                }
            }
            ItemKind::Anchor { href, children } => {
                ctx.tag_begin(href);
                for child in children {
                    self.render_item(ctx, child, origin, page);
                }
                ctx.tag_end();
            }
            ItemKind::Symbol { .. } => self.render_symbol(ctx, item, origin, page),
            ItemKind::Use { href, x, y } => self.render_use(ctx, item, href, *x, *y, page),
            ItemKind::Image { .. } => self.render_image(ctx, item),
            ItemKind::Text { .. } => self.render_text(ctx, item),
            _ => self.render_shape(ctx, item, page),
        }
    }

    /// Content-to-parent transform of viewport items.
    fn viewport_transform(&self, item: &Item) -> Affine {
        match &item.kind {
            ItemKind::Root {
                x,
                y,
                width,
                height,
                view_box,
                preserve_aspect_ratio,
                ..
            } => {
                let width = width.unwrap_or(self.document.width);
                let height = height.unwrap_or(self.document.height);
                match view_box {
                    Some(vb) => preserve_aspect_ratio
                        .view_box_transform(vb, &Rect::from_xywh(*x, *y, width, height)),
                    None => Affine::translate(*x, *y),
                }
            }
            ItemKind::Symbol {
                view_box: Some(vb),
                preserve_aspect_ratio,
                width,
                height,
                ..
            } => {
                let viewport = Rect::from_xywh(
                    0.0,
                    0.0,
                    width.unwrap_or(vb.width()),
                    height.unwrap_or(vb.height()),
                );
                preserve_aspect_ratio.view_box_transform(vb, &viewport)
            }
            _ => Affine::IDENTITY,
        }
    }

    fn render_root(&self, ctx: &mut RenderContext<'_>, item: &Item, page: Option<&Page>) {
        let ItemKind::Root {
            x,
            y,
            width,
            height,
            children,
            ..
        } = &item.kind
        else {
            return;
        };
        let nested = self.viewport_depth.get() > 0;
        if nested && ctx.current_state().has_overflow_clip {
            let width = width.unwrap_or(self.document.width);
            let height = height.unwrap_or(self.document.height);
            ctx.add_clipping_rect(*x, *y, width, height);
        }

        ctx.push_state();
        ctx.transform(&self.viewport_transform(item));
        self.viewport_depth.set(self.viewport_depth.get() + 1);
        for child in children {
            self.render_item(ctx, child, None, page);
        }
        self.viewport_depth.set(self.viewport_depth.get() - 1);
        ctx.pop_state();
    }

    fn render_symbol(
        &self,
        ctx: &mut RenderContext<'_>,
        item: &Item,
        origin: Option<&Item>,
        page: Option<&Page>,
    ) {
        if !matches!(origin.map(|o| &o.kind), Some(ItemKind::Use { .. })) {
            trace!(id = ?item.id, "symbol drawn only through use");
            return;
        }
        ctx.push_state();
        ctx.transform(&self.viewport_transform(item));
        for child in item.children() {
            self.render_item(ctx, child, origin, page);
        }
        ctx.pop_state();
    }

    fn render_use(
        &self,
        ctx: &mut RenderContext<'_>,
        item: &Item,
        href: &str,
        x: f64,
        y: f64,
        page: Option<&Page>,
    ) {
        let Some(target) = self.document.definitions.get(href) else {
            debug!(href = %href, "use target not found");
            return;
        };
        let Some(_guard) = NestingGuard::enter(&self.use_depth, MAX_USE_DEPTH) else {
            warn!(href = %href, "use references nested too deeply");
            return;
        };

        let translated = x != 0.0 || y != 0.0;
        if translated {
            ctx.push_state();
            ctx.transform(&Affine::translate(x, y));
        }
        self.render_item(ctx, target, Some(item), page);
        if translated {
            ctx.pop_state();
        }
    }

    fn render_image(&self, ctx: &mut RenderContext<'_>, item: &Item) {
        let ItemKind::Image {
            href,
            x,
            y,
            width,
            height,
            preserve_aspect_ratio,
        } = &item.kind
        else {
            return;
        };
        if *width <= 0.0 || *height <= 0.0 {
            return;
        }
        let Some(image) = self.document.images.get(href) else {
            debug!(href = %href, "image not loaded");
            return;
        };

        let viewport = Rect::from_xywh(*x, *y, *width, *height);
        let pixels = Rect::from_xywh(0.0, 0.0, image.width as f64, image.height as f64);
        if preserve_aspect_ratio.slice {
            ctx.add_clipping_rect(*x, *y, *width, *height);
        }
        let placement = preserve_aspect_ratio.view_box_transform(&pixels, &viewport);
        ctx.render_image(image, &placement, &item.style);
    }

    fn render_text(&self, ctx: &mut RenderContext<'_>, item: &Item) {
        let ItemKind::Text {
            font,
            font_size,
            glyphs,
        } = &item.kind
        else {
            return;
        };
        let Some(face) = self.document.font(font) else {
            warn!(font = %font, "font not loaded, text skipped");
            return;
        };
        let units_per_em = face.units_per_em();
        if glyphs.is_empty() || *font_size <= 0.0 || units_per_em <= 0.0 {
            return;
        }
        let s = font_size / units_per_em;
        let font_matrix = Affine::scale(s, -s);
        if ctx.render_glyph_run(face, &font_matrix, glyphs, &item.style, false) {
            ctx.render_glyph_run(face, &font_matrix, glyphs, &item.style, true);
        }
    }

    fn render_shape(&self, ctx: &mut RenderContext<'_>, item: &Item, page: Option<&Page>) {
        let Some(path) = item.shape_path() else {
            trace!(id = ?item.id, "shape has no geometry");
            return;
        };
        let style = &item.style;
        let bbox = path.bounding_box();
        let [first, second, third] = style.paint_order.0;

        let (before, after) = if first == PaintLayer::Markers {
            (None, paint_call(second, third))
        } else if second == PaintLayer::Markers {
            (paint_call(first, second), paint_call(second, third))
        } else {
            (paint_call(first, second), None)
        };

        if let Some(order) = before {
            ctx.render_path_vector(&path, style, bbox.as_ref(), order);
        }
        if style.has_markers() {
            self.render_markers(ctx, &path, style, page);
        }
        if let Some(order) = after {
            ctx.render_path_vector(&path, style, bbox.as_ref(), order);
        }
    }

    fn render_markers(
        &self,
        ctx: &mut RenderContext<'_>,
        path: &Path,
        style: &Style,
        page: Option<&Page>,
    ) {
        for vertex in marker_vertices(path) {
            let id = match vertex.position {
                MarkerPosition::Start => &style.marker_start,
                MarkerPosition::Mid => &style.marker_mid,
                MarkerPosition::End => &style.marker_end,
            };
            let Some(id) = id else {
                continue;
            };
            let Some(marker) = self.document.markers.get(id) else {
                debug!(id = %id, "unknown marker");
                continue;
            };
            if marker.children.is_empty() || marker.marker_width <= 0.0 || marker.marker_height <= 0.0 {
                continue;
            }

            ctx.push_state();
            ctx.transform(&marker_placement(marker, &vertex, style.stroke_props.width));
            if marker.overflow != Overflow::Visible {
                let viewport = marker_viewport(marker);
                ctx.add_clipping_rect(viewport.x0, viewport.y0, viewport.width(), viewport.height());
            }
            ctx.transform(&marker_content_transform(marker));
            for child in &marker.children {
                self.render_item(ctx, child, None, page);
            }
            ctx.pop_state();
        }
    }

    /// Draw the children of clip path `clip` as clip geometry.
    ///
    /// Intersects the backend clip when called from a normal pass with path
    /// clipping; otherwise the geometry joins the enclosing clip or mask.
    pub fn apply_clip_path(
        &self,
        ctx: &mut RenderContext<'_>,
        clip: &ReferenceView,
        user_space: &Affine,
    ) -> bool {
        let Some(def) = self.document.clip_paths.get(&clip.id) else {
            warn!(id = %clip.id, "unknown clip path");
            return false;
        };

        let saved_mode = ctx.render_mode();
        let saved_transform = ctx.current_transform();
        ctx.set_render_mode(RenderMode::ClippingPass);

        let mut base = *user_space;
        if def.units == Units::ObjectBoundingBox {
            match clip.bbox {
                Some(bbox) => base = base.concat(&bbox.unit_transform()),
                None => debug!(id = %clip.id, "bounding box units without a bounding box"),
            }
        }
        ctx.set_transform(&base);

        for child in &def.children {
            ctx.push_state();
            ctx.transform(&child.transform);
            self.set_state_for_item(ctx, child);
            self.do_render(ctx, child, None, None);
            ctx.pop_state();
        }

        if ctx.clip_mode() == ClipMode::PathClip && saved_mode == RenderMode::Normal {
            ctx.commit_clip();
        }
        ctx.set_transform(&saved_transform);
        ctx.set_render_mode(saved_mode);
        true
    }

    /// Draw the children of mask `mask` into a mask context.
    pub fn apply_mask(
        &self,
        ctx: &mut RenderContext<'_>,
        mask: &ReferenceView,
        user_space: &Affine,
    ) -> bool {
        let Some(def) = self.document.masks.get(&mask.id) else {
            warn!(id = %mask.id, "unknown mask");
            return false;
        };

        let mut base = *user_space;
        if def.content_units == Units::ObjectBoundingBox {
            match mask.bbox {
                Some(bbox) => base = base.concat(&bbox.unit_transform()),
                None => debug!(id = %mask.id, "bounding box units without a bounding box"),
            }
        }
        ctx.set_transform(&base);

        ctx.push_state();
        for child in &def.children {
            self.render_item(ctx, child, None, None);
        }
        ctx.pop_state();
        true
    }

    /// Stroke one hatch path across the strip `extents` (min y, max y).
    pub fn render_hatch_path(
        &self,
        ctx: &mut RenderContext<'_>,
        path: &HatchPath,
        extents: (f64, f64),
    ) {
        let style = Style {
            fill: Paint::None,
            stroke: path.stroke.clone(),
            stroke_opacity: path.stroke_opacity,
            stroke_props: path.stroke_style.clone(),
            ..Style::default()
        };
        ctx.push_state();
        ctx.set_state_for_style(&style);
        ctx.transform(&Affine::translate(path.offset, 0.0));
        let geometry = hatch_path_geometry(path, extents);
        ctx.render_path_vector(&geometry, &style, None, PathPaintOrder::StrokeOverFill);
        ctx.pop_state();
    }

    /// Geometric bounding box of `item` in its own user space.
    pub fn item_bbox(&self, item: &Item) -> Option<Rect> {
        self.bounds(item, false, 0)
    }

    /// Bounding box including stroke width.
    pub fn visual_bbox(&self, item: &Item) -> Option<Rect> {
        self.bounds(item, true, 0)
    }

    fn bounds(&self, item: &Item, visual: bool, depth: usize) -> Option<Rect> {
        if depth > MAX_USE_DEPTH {
            return None;
        }
        match &item.kind {
            ItemKind::Root { .. }
            | ItemKind::Group { .. }
            | ItemKind::Symbol { .. }
            | ItemKind::Anchor { .. } => {
                let content = self.viewport_transform(item);
                item.children()
                    .iter()
                    .filter(|child| !child.hidden)
                    .filter_map(|child| {
                        self.bounds(child, visual, depth + 1)
                            .map(|b| b.transform(&content.concat(&child.transform)))
                    })
                    .reduce(|a, b| a.union(&b))
            }
            ItemKind::Image {
                x,
                y,
                width,
                height,
                ..
            } => (*width > 0.0 && *height > 0.0).then(|| Rect::from_xywh(*x, *y, *width, *height)),
            ItemKind::Text {
                font,
                font_size,
                glyphs,
            } => {
                let face = self.document.font(font)?;
                let s = font_size / face.units_per_em();
                glyph_run_path(face, &Affine::scale(s, -s), glyphs).bounding_box()
            }
            ItemKind::Use { href, x, y } => {
                let target = self.document.definitions.get(href)?;
                let b = self.bounds(target, visual, depth + 1)?;
                Some(b.transform(&Affine::translate(*x, *y).concat(&target.transform)))
            }
            _ => {
                let b = item.shape_path()?.bounding_box()?;
                if visual && !item.style.stroke.is_none() {
                    let half = item.style.stroke_props.width / 2.0;
                    Some(Rect::new(b.x0 - half, b.y0 - half, b.x1 + half, b.y1 + half))
                } else {
                    Some(b)
                }
            }
        }
    }
}

impl RenderDelegate for Renderer<'_> {
    fn apply_clip_path(
        &self,
        ctx: &mut RenderContext<'_>,
        clip: &ReferenceView,
        user_space: &Affine,
    ) -> bool {
        Renderer::apply_clip_path(self, ctx, clip, user_space)
    }

    fn apply_mask(
        &self,
        ctx: &mut RenderContext<'_>,
        mask: &ReferenceView,
        user_space: &Affine,
    ) -> bool {
        Renderer::apply_mask(self, ctx, mask, user_space)
    }

    fn paint_source(
        &self,
        ctx: &RenderContext<'_>,
        id: &str,
        bbox: Option<&Rect>,
        alpha: f64,
    ) -> Option<PaintSource> {
        PatternTileRenderer::new(self).paint_source(ctx, id, bbox, alpha)
    }
}

/// Path paint call for two adjacent paint-order layers.
fn paint_call(a: PaintLayer, b: PaintLayer) -> Option<PathPaintOrder> {
    match (a, b) {
        (PaintLayer::Fill, PaintLayer::Stroke) => Some(PathPaintOrder::StrokeOverFill),
        (PaintLayer::Stroke, PaintLayer::Fill) => Some(PathPaintOrder::FillOverStroke),
        (PaintLayer::Fill, PaintLayer::Markers) | (PaintLayer::Markers, PaintLayer::Fill) => {
            Some(PathPaintOrder::FillOnly)
        }
        (PaintLayer::Stroke, PaintLayer::Markers) | (PaintLayer::Markers, PaintLayer::Stroke) => {
            Some(PathPaintOrder::StrokeOnly)
        }
        _ => None,
    }
}

/// `SOURCE_DATE_EPOCH`, for reproducible output.
fn source_date_epoch() -> Option<i64> {
    std::env::var("SOURCE_DATE_EPOCH").ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::document::{ClipPathDef, MarkerDef, MaskDef};
    use crate::core::style::{Color, PaintOrder};
    use crate::rendering::backend::{OperationLog, RecordingBackend, TargetKind};

    fn rect_item(x: f64, y: f64, w: f64, h: f64, color: Color) -> Item {
        let mut item = Item::new(ItemKind::Rect {
            x,
            y,
            width: w,
            height: h,
            rx: 0.0,
            ry: 0.0,
        });
        item.style.fill = Paint::Color(color);
        item
    }

    fn recorded<'r>(renderer: &'r Renderer<'r>, kind: TargetKind) -> (RenderContext<'r>, OperationLog) {
        let backend = RecordingBackend::new(kind, 100.0, 100.0);
        let log = backend.log();
        let mut ctx = renderer.create_context();
        assert!(ctx.set_surface_target(Box::new(backend), kind == TargetKind::Vector));
        (ctx, log)
    }

    fn count(log: &OperationLog, op: &str) -> usize {
        log.borrow().iter().filter(|o| o.starts_with(op)).count()
    }

    #[test]
    fn test_plain_item_has_no_layer() {
        let doc = Document::new(100.0, 100.0, Item::group(vec![rect_item(0.0, 0.0, 10.0, 10.0, Color::red())]));
        let renderer = Renderer::new(&doc);
        let (mut ctx, log) = recorded(&renderer, TargetKind::Raster);
        renderer.render_item(&mut ctx, &doc.root, None, None);
        assert_eq!(count(&log, "push_group"), 0);
        assert_eq!(count(&log, "fill_path"), 1);
        assert_eq!(count(&log, "save"), count(&log, "restore"));
        assert_eq!(ctx.state_depth(), 0);
    }

    #[test]
    fn test_opacity_pushes_layer() {
        let mut item = rect_item(0.0, 0.0, 10.0, 10.0, Color::red());
        item.style.opacity = 0.5;
        let doc = Document::new(100.0, 100.0, item);
        let renderer = Renderer::new(&doc);
        let (mut ctx, log) = recorded(&renderer, TargetKind::Raster);
        renderer.render_item(&mut ctx, &doc.root, None, None);
        assert_eq!(count(&log, "push_group"), 1);
        assert_eq!(count(&log, "paint(0.5, Normal)"), 1);
    }

    #[test]
    fn test_hidden_items_and_bare_symbols_are_skipped() {
        let mut hidden = rect_item(0.0, 0.0, 10.0, 10.0, Color::red());
        hidden.hidden = true;
        let symbol = Item::new(ItemKind::Symbol {
            view_box: None,
            preserve_aspect_ratio: Default::default(),
            width: None,
            height: None,
            children: vec![rect_item(0.0, 0.0, 5.0, 5.0, Color::blue())],
        });
        let mut doc = Document::new(100.0, 100.0, Item::group(vec![hidden, symbol.clone()]));
        doc.definitions.insert("s".to_string(), symbol);
        let renderer = Renderer::new(&doc);
        let (mut ctx, log) = recorded(&renderer, TargetKind::Raster);
        renderer.render_item(&mut ctx, &doc.root, None, None);
        assert_eq!(count(&log, "fill_path"), 0);

        let used = Item::new(ItemKind::Use {
            href: "s".to_string(),
            x: 5.0,
            y: 0.0,
        });
        renderer.render_item(&mut ctx, &used, None, None);
        assert_eq!(count(&log, "fill_path"), 1);
    }

    #[test]
    fn test_self_referencing_use_terminates() {
        let mut doc = Document::new(100.0, 100.0, Item::group(Vec::new()));
        let looped = Item::group(vec![
            rect_item(0.0, 0.0, 1.0, 1.0, Color::red()),
            Item::new(ItemKind::Use {
                href: "loop".to_string(),
                x: 1.0,
                y: 0.0,
            }),
        ]);
        doc.definitions.insert("loop".to_string(), looped);
        let start = Item::new(ItemKind::Use {
            href: "loop".to_string(),
            x: 0.0,
            y: 0.0,
        });
        let renderer = Renderer::new(&doc);
        let (mut ctx, log) = recorded(&renderer, TargetKind::Raster);
        renderer.render_item(&mut ctx, &start, None, None);
        assert_eq!(count(&log, "fill_path"), MAX_USE_DEPTH);
        assert_eq!(ctx.state_depth(), 0);
    }

    #[test]
    fn test_paint_order_splits_around_markers() {
        assert_eq!(
            paint_call(PaintLayer::Fill, PaintLayer::Markers),
            Some(PathPaintOrder::FillOnly)
        );
        assert_eq!(
            paint_call(PaintLayer::Markers, PaintLayer::Stroke),
            Some(PathPaintOrder::StrokeOnly)
        );
        assert_eq!(paint_call(PaintLayer::Markers, PaintLayer::Markers), None);

        let mut line = Item::new(ItemKind::Path {
            d: "M0 0 L10 0 L20 0".parse().unwrap(),
        });
        line.style.stroke = Paint::Color(Color::black());
        line.style.paint_order = PaintOrder([PaintLayer::Stroke, PaintLayer::Markers, PaintLayer::Fill]);
        line.style.marker_mid = Some("dot".to_string());
        let mut doc = Document::new(100.0, 100.0, line);
        doc.markers.insert(
            "dot".to_string(),
            MarkerDef {
                ref_x: 0.0,
                ref_y: 0.0,
                marker_width: 3.0,
                marker_height: 3.0,
                view_box: None,
                preserve_aspect_ratio: Default::default(),
                orient: Default::default(),
                units: Default::default(),
                overflow: Overflow::Hidden,
                children: vec![rect_item(0.0, 0.0, 1.0, 1.0, Color::blue())],
            },
        );
        let renderer = Renderer::new(&doc);
        let (mut ctx, log) = recorded(&renderer, TargetKind::Raster);
        renderer.render_item(&mut ctx, &doc.root, None, None);

        let ops = log.borrow();
        let kinds: Vec<&str> = ops
            .iter()
            .filter_map(|o| {
                if o.starts_with("stroke_path") {
                    Some("stroke")
                } else if o.starts_with("fill_path") {
                    Some("fill")
                } else if o.starts_with("clip") {
                    Some("clip")
                } else {
                    None
                }
            })
            .collect();
        assert_eq!(kinds, vec!["stroke", "clip", "fill", "fill"]);
    }

    #[test]
    fn test_vector_clip_uses_path_clipping() {
        let mut item = rect_item(0.0, 0.0, 50.0, 50.0, Color::red());
        item.clip_path = Some("c".to_string());
        let mut doc = Document::new(100.0, 100.0, item);
        doc.clip_paths.insert(
            "c".to_string(),
            ClipPathDef {
                units: Units::ObjectBoundingBox,
                children: vec![rect_item(0.0, 0.0, 0.5, 0.5, Color::black())],
            },
        );
        let renderer = Renderer::new(&doc);
        let (mut ctx, log) = recorded(&renderer, TargetKind::Vector);
        renderer.render_item(&mut ctx, &doc.root, None, None);
        assert_eq!(count(&log, "push_group"), 1);
        assert_eq!(count(&log, "clip(NonZero)"), 1);
        assert_eq!(count(&log, "paint(1, Normal)"), 1);
        // Clip content is geometry only
        assert_eq!(count(&log, "fill_path"), 1);
        assert_eq!(ctx.clip_mode(), ClipMode::PathClip);
    }

    #[test]
    fn test_unknown_references_are_ignored() {
        let mut item = rect_item(0.0, 0.0, 10.0, 10.0, Color::red());
        item.clip_path = Some("missing".to_string());
        item.mask = Some("missing".to_string());
        let doc = Document::new(100.0, 100.0, item);
        let renderer = Renderer::new(&doc);
        let (mut ctx, log) = recorded(&renderer, TargetKind::Raster);
        renderer.render_item(&mut ctx, &doc.root, None, None);
        assert_eq!(count(&log, "push_group"), 0);
        assert_eq!(count(&log, "fill_path"), 1);
    }

    #[test]
    fn test_mask_bbox_comes_from_referencing_item() {
        let mut item = rect_item(10.0, 20.0, 30.0, 40.0, Color::red());
        item.mask = Some("m".to_string());
        let mut doc = Document::new(100.0, 100.0, item.clone());
        doc.masks.insert(
            "m".to_string(),
            MaskDef {
                content_units: Units::ObjectBoundingBox,
                children: Vec::new(),
            },
        );
        let renderer = Renderer::new(&doc);
        let mut ctx = renderer.create_context();
        assert!(ctx.setup_surface(10.0, 10.0));
        ctx.push_state();
        renderer.set_state_for_item(&mut ctx, &item);
        let mask = ctx.current_state().mask.clone().unwrap();
        assert_eq!(mask.bbox, Some(Rect::new(10.0, 20.0, 40.0, 60.0)));
        ctx.pop_state();
    }

    #[test]
    fn test_render_pages_without_pages_renders_root() {
        let doc = Document::new(100.0, 100.0, Item::group(vec![rect_item(0.0, 0.0, 10.0, 10.0, Color::red())]));
        let renderer = Renderer::new(&doc);
        let (mut ctx, log) = recorded(&renderer, TargetKind::Vector);
        assert!(renderer.render_pages(&mut ctx, false));
        assert_eq!(count(&log, "fill_path"), 1);
        assert_eq!(count(&log, "show_page"), 0);
    }

    #[test]
    fn test_hatch_path_is_stroked() {
        let doc = Document::new(100.0, 100.0, Item::group(Vec::new()));
        let renderer = Renderer::new(&doc);
        let (mut ctx, log) = recorded(&renderer, TargetKind::Raster);
        let path = HatchPath {
            offset: 2.0,
            d: None,
            stroke: Paint::Color(Color::black()),
            stroke_opacity: 1.0,
            stroke_style: Default::default(),
        };
        renderer.render_hatch_path(&mut ctx, &path, (0.0, 10.0));
        assert_eq!(count(&log, "stroke_path"), 1);
        assert_eq!(count(&log, "fill_path"), 0);
        assert_eq!(ctx.state_depth(), 0);
    }
}
