//! Paint sources for paint servers: gradients, pattern tiles and hatches.
//!
//! Patterns and hatches are rendered once into an off-screen raster tile
//! which the backend repeats. The tile is oversampled relative to device
//! space so repeated content stays sharp.

use tracing::{debug, trace, warn};

use crate::core::config::PixelFormat;
use crate::core::document::{GradientStop, HatchPath, ImageData, PaintServer, Units};
use crate::core::geom::{Affine, Rect};
use crate::core::path::Path;
use crate::core::style::Overflow;
use crate::rendering::context::RenderContext;
use crate::rendering::paint::{ColorStop, ColorStops, PaintSource, SpreadMode};
use crate::rendering::renderer::Renderer;

/// Pattern tiles are rendered at this multiple of their device size.
pub const TILE_SUBPIXEL_SCALE: f64 = 4.0;

/// Hatch tiles are rendered at this many pixels per pattern unit.
pub const HATCH_SUBPIXEL_SCALE: f64 = 10.0;

/// Upper bound on either tile dimension in pixels.
pub const MAX_TILE_SIZE: f64 = 4096.0;

const MAX_HATCH_STEPS: usize = 1024;
const MAX_HATCH_PATH_REPEATS: usize = 10_000;

/// Builds [`PaintSource`]s for the paint servers of a document.
#[derive(Debug, Clone, Copy)]
pub struct PatternTileRenderer<'a> {
    renderer: &'a Renderer<'a>,
}

impl<'a> PatternTileRenderer<'a> {
    pub fn new(renderer: &'a Renderer<'a>) -> Self {
        PatternTileRenderer { renderer }
    }

    /// Paint source for server `id` painted on an object with bounding box
    /// `bbox`, with `alpha` applied on top of the server's own opacity.
    pub fn paint_source(
        &self,
        ctx: &RenderContext<'_>,
        id: &str,
        bbox: Option<&Rect>,
        alpha: f64,
    ) -> Option<PaintSource> {
        let Some(server) = self.renderer.document().paint_servers.get(id) else {
            debug!(id = %id, "unknown paint server");
            return None;
        };
        match server {
            PaintServer::Linear { .. } => self.linear_gradient(id, server, bbox, alpha),
            PaintServer::Radial { .. } => self.radial_gradient(id, server, bbox, alpha),
            PaintServer::Pattern { .. } => self.pattern(ctx, id, server, bbox, alpha),
            PaintServer::Hatch { .. } => self.hatch(ctx, id, server, bbox, alpha),
        }
    }

    fn stops(&self, id: &str, alpha: f64) -> ColorStops {
        gradient_color_stops(self.renderer.document().gradient_stops(id), alpha)
    }

    fn linear_gradient(
        &self,
        id: &str,
        server: &PaintServer,
        bbox: Option<&Rect>,
        alpha: f64,
    ) -> Option<PaintSource> {
        let PaintServer::Linear {
            x1,
            y1,
            x2,
            y2,
            units,
            gradient_transform,
            spread,
            ..
        } = server
        else {
            return None;
        };
        let stops = self.stops(id, alpha);
        if stops.is_empty() {
            debug!(id = %id, "gradient has no stops");
            return None;
        }

        let mut start = (*x1, *y1);
        let mut end = (*x2, *y2);
        let mut gradient_to_user = *gradient_transform;
        if *units == Units::ObjectBoundingBox {
            let bbox2user = object_bbox_transform(id, bbox)?;
            start = bbox2user.apply(start.0, start.1);
            end = bbox2user.apply(end.0, end.1);
            // The gradient transform applies in bounding box space
            if !gradient_transform.is_identity() {
                gradient_to_user = bbox2user
                    .concat(gradient_transform)
                    .concat(&bbox2user.invert()?);
            }
        }

        Some(PaintSource::LinearGradient {
            x1: start.0,
            y1: start.1,
            x2: end.0,
            y2: end.1,
            stops,
            spread: SpreadMode::from(*spread),
            matrix: invert_or_log(id, &gradient_to_user)?,
        })
    }

    fn radial_gradient(
        &self,
        id: &str,
        server: &PaintServer,
        bbox: Option<&Rect>,
        alpha: f64,
    ) -> Option<PaintSource> {
        let PaintServer::Radial {
            cx,
            cy,
            r,
            fx,
            fy,
            fr,
            units,
            gradient_transform,
            spread,
            ..
        } = server
        else {
            return None;
        };
        let stops = self.stops(id, alpha);
        if stops.is_empty() {
            debug!(id = %id, "gradient has no stops");
            return None;
        }

        let mut gradient_to_user = *gradient_transform;
        if *units == Units::ObjectBoundingBox {
            gradient_to_user = object_bbox_transform(id, bbox)?.concat(gradient_transform);
        }

        Some(PaintSource::RadialGradient {
            fx: fx.unwrap_or(*cx),
            fy: fy.unwrap_or(*cy),
            fr: *fr,
            cx: *cx,
            cy: *cy,
            r: *r,
            stops,
            spread: SpreadMode::from(*spread),
            matrix: invert_or_log(id, &gradient_to_user)?,
        })
    }

    fn pattern(
        &self,
        ctx: &RenderContext<'_>,
        id: &str,
        server: &PaintServer,
        bbox: Option<&Rect>,
        alpha: f64,
    ) -> Option<PaintSource> {
        let PaintServer::Pattern {
            x,
            y,
            width,
            height,
            units,
            content_units,
            pattern_transform,
            view_box,
            ..
        } = server
        else {
            return None;
        };
        if !(*width > 0.0 && *height > 0.0) {
            debug!(id = %id, "pattern has no area");
            return None;
        }
        let children = self.renderer.document().pattern_children(id);
        if children.is_empty() {
            trace!(id = %id, "pattern has no content");
            return None;
        }

        let needs_bbox =
            *units == Units::ObjectBoundingBox || *content_units == Units::ObjectBoundingBox;
        let bbox = if needs_bbox {
            Some(*bbox.filter(|b| !b.is_empty())?)
        } else {
            None
        };
        let (bw, bh, left, top) = bbox
            .map(|b| (b.width(), b.height(), b.left(), b.top()))
            .unwrap_or((1.0, 1.0, 0.0, 0.0));

        let (tile_x, tile_y, tile_w, tile_h) = if *units == Units::ObjectBoundingBox {
            (x * bw + left, y * bh + top, width * bw, height * bh)
        } else {
            (*x, *y, *width, *height)
        };

        // Pattern space to user space
        let ps2user = pattern_transform.concat(&Affine::translate(tile_x, tile_y));

        // Pattern content to pattern space
        let pcs2ps = match view_box {
            Some(vb) if !vb.is_empty() => {
                let sx = tile_w / vb.width();
                let sy = tile_h / vb.height();
                Affine::new(sx, 0.0, 0.0, sy, -vb.left() * sx, -vb.top() * sy)
            }
            _ if *content_units == Units::ObjectBoundingBox => Affine::scale(bw, bh),
            _ => Affine::IDENTITY,
        };

        let device = ctx.current_transform().concat(&ps2user);
        let (surface_w, surface_h) = tile_surface_size(
            tile_w,
            tile_h,
            axis_scale(&device, 0) * TILE_SUBPIXEL_SCALE,
            axis_scale(&device, 1) * TILE_SUBPIXEL_SCALE,
        );
        let scale_x = surface_w / tile_w;
        let scale_y = surface_h / tile_h;
        let pcs2dev = Affine::scale(scale_x, scale_y).concat(&pcs2ps);
        let pixels2user = ps2user.concat(&Affine::scale(1.0 / scale_x, 1.0 / scale_y));

        let _guard = self.renderer.enter_tile()?;
        let mut tile_ctx = ctx.create_aux_context(PixelFormat::Argb32, surface_w, surface_h)?;
        tile_ctx.set_transform(&pcs2dev);
        tile_ctx.push_state();
        for child in children {
            self.renderer.render_item(&mut tile_ctx, child, None, None);
        }
        tile_ctx.pop_state();

        let mut image = tile_ctx.snapshot()?;
        multiply_alpha(&mut image, alpha);
        Some(PaintSource::Tile {
            image,
            matrix: invert_or_log(id, &pixels2user)?,
        })
    }

    fn hatch(
        &self,
        ctx: &RenderContext<'_>,
        id: &str,
        server: &PaintServer,
        bbox: Option<&Rect>,
        alpha: f64,
    ) -> Option<PaintSource> {
        let PaintServer::Hatch {
            x,
            y,
            pitch,
            rotate,
            units,
            content_units,
            hatch_transform,
            overflow,
            ..
        } = server
        else {
            return None;
        };
        let paths = self.renderer.document().hatch_paths(id);
        if paths.is_empty() || *pitch <= 0.0 {
            debug!(id = %id, "hatch has no paths or pitch");
            return None;
        }
        let Some(bbox) = bbox.filter(|b| b.area() > 0.0) else {
            debug!(id = %id, "hatch needs an object with area");
            return None;
        };
        let (bw, bh) = (bbox.width(), bbox.height());
        let obb_units = *units == Units::ObjectBoundingBox;
        let obb_content = *content_units == Units::ObjectBoundingBox;

        let (tile_x, tile_y, tile_w) = if obb_units {
            (x * bw, y * bh, pitch * bw)
        } else {
            (*x, *y, *pitch)
        };
        let ps2user = hatch_transform
            .concat(&Affine::rotate_degrees(*rotate))
            .concat(&Affine::translate(tile_x, tile_y));
        let user2ps = invert_or_log(id, &ps2user)?;

        // Strip extents along the hatch direction, in pattern space
        let (mut y_min, mut y_max) = (f64::INFINITY, f64::NEG_INFINITY);
        for (cx, cy) in bbox.corners() {
            let (_, py) = user2ps.apply(cx, cy);
            y_min = y_min.min(py);
            y_max = y_max.max(py);
        }
        let tile_h = y_max - y_min;
        if !(tile_h > 0.0 && tile_h.is_finite()) {
            debug!(id = %id, "hatch strip is empty");
            return None;
        }
        let extents = if obb_content {
            (y_min / bh, y_max / bh)
        } else {
            (y_min, y_max)
        };
        let content2ps = if obb_content {
            Affine::scale(bw, bh)
        } else {
            Affine::IDENTITY
        };

        let (surface_w, surface_h) =
            tile_surface_size(tile_w, tile_h, HATCH_SUBPIXEL_SCALE, HATCH_SUBPIXEL_SCALE);
        let drawing = Affine::scale(surface_w / tile_w, surface_h / tile_h)
            .concat(&Affine::translate(0.0, -y_min));

        // Pattern-space horizontal offsets at which the paths are drawn
        let mut offsets = vec![0.0];
        if *overflow == Overflow::Visible {
            let content_w = if obb_content { bw } else { 1.0 };
            if let Some((lo, hi)) = hatch_bounds(paths) {
                let (lo, hi) = (lo * content_w, hi * content_w);
                let right_strip = (hi / tile_w).floor() * tile_w;
                let steps = (((right_strip - lo) / tile_w).ceil() as usize + 1).min(MAX_HATCH_STEPS);
                offsets = (0..steps)
                    .map(|k| -right_strip + k as f64 * tile_w)
                    .collect();
            }
        }

        let _guard = self.renderer.enter_tile()?;
        let mut tile_ctx = ctx.create_aux_context(PixelFormat::Argb32, surface_w, surface_h)?;
        tile_ctx.push_state();
        for dx in offsets {
            let step = drawing
                .concat(&Affine::translate(dx, 0.0))
                .concat(&content2ps);
            tile_ctx.set_transform(&step);
            for path in paths {
                self.renderer.render_hatch_path(&mut tile_ctx, path, extents);
            }
        }
        tile_ctx.pop_state();

        let mut image = tile_ctx.snapshot()?;
        multiply_alpha(&mut image, alpha);
        Some(PaintSource::Tile {
            image,
            matrix: drawing.concat(&user2ps),
        })
    }
}

/// Gradient stops with offsets clamped to be non-decreasing in [0, 1].
pub fn gradient_color_stops(stops: &[GradientStop], alpha: f64) -> ColorStops {
    let mut out = ColorStops::new();
    let mut last = 0.0f64;
    for stop in stops {
        let offset = stop.offset.clamp(0.0, 1.0).max(last);
        last = offset;
        out.push(ColorStop {
            offset,
            color: stop.color,
            alpha: (stop.opacity * alpha).clamp(0.0, 1.0),
        });
    }
    out
}

/// Unit square to bounding box, for object bounding box units.
fn object_bbox_transform(id: &str, bbox: Option<&Rect>) -> Option<Affine> {
    match bbox {
        Some(b) if b.area() > 0.0 => Some(b.unit_transform()),
        _ => {
            debug!(id = %id, "bounding box units on an object without area");
            None
        }
    }
}

fn invert_or_log(id: &str, m: &Affine) -> Option<Affine> {
    let inverse = m.invert();
    if inverse.is_none() {
        warn!(id = %id, "paint server transform is not invertible");
    }
    inverse
}

/// Length of the image of a unit vector along `axis` (0 = x, 1 = y).
fn axis_scale(m: &Affine, axis: usize) -> f64 {
    let [a, b, c, d, _, _] = m.0;
    if axis == 0 { a.hypot(b) } else { c.hypot(d) }
}

/// Pixel size of a tile of `width × height` units at the given scales.
fn tile_surface_size(width: f64, height: f64, scale_x: f64, scale_y: f64) -> (f64, f64) {
    let dim = |len: f64, scale: f64| {
        let pixels = (len * scale - 0.5).ceil();
        if pixels.is_finite() {
            pixels.clamp(1.0, MAX_TILE_SIZE)
        } else {
            1.0
        }
    };
    (dim(width, scale_x), dim(height, scale_y))
}

/// Scale every premultiplied channel by `alpha`.
fn multiply_alpha(image: &mut ImageData, alpha: f64) {
    let alpha = alpha.clamp(0.0, 1.0);
    if alpha >= 1.0 {
        return;
    }
    for channel in image.data.iter_mut() {
        *channel = (*channel as f64 * alpha).round() as u8;
    }
}

/// Horizontal extent of hatch paths including their stroke width, in hatch
/// content units.
pub fn hatch_bounds(paths: &[HatchPath]) -> Option<(f64, f64)> {
    paths
        .iter()
        .map(|path| {
            let half = path.stroke_style.width.max(0.0) / 2.0;
            let (lo, hi) = match path.d.as_ref().and_then(|d| d.bounding_box()) {
                Some(b) => (b.x0, b.x1),
                None => (0.0, 0.0),
            };
            (path.offset + lo - half, path.offset + hi + half)
        })
        .reduce(|a, b| (a.0.min(b.0), a.1.max(b.1)))
}

/// Geometry of one hatch path covering the strip `extents` (min y, max y).
///
/// Without path data this is a vertical line over the strip; path data is
/// repeated vertically, one copy per bounding box height.
pub fn hatch_path_geometry(path: &HatchPath, extents: (f64, f64)) -> Path {
    let (y_min, y_max) = extents;
    let mut out = Path::new();
    let Some(d) = &path.d else {
        out.move_to(0.0, y_min);
        out.line_to(0.0, y_max);
        return out;
    };
    let Some(bounds) = d.bounding_box() else {
        return out;
    };
    let period = bounds.height();
    if period <= 0.0 {
        return d.clone();
    }
    let mut k = ((y_min - bounds.y1) / period).floor();
    for _ in 0..MAX_HATCH_PATH_REPEATS {
        let shift = k * period;
        if bounds.y0 + shift > y_max {
            break;
        }
        out.extend(&d.transform(&Affine::translate(0.0, shift)));
        k += 1.0;
    }
    out
}
