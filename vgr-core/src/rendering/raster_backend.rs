//! A tiny-skia based raster backend.

use tiny_skia::{
    BlendMode as SkiaBlendMode, FillRule as SkiaFillRule, FilterQuality, GradientStop, IntSize,
    LineCap as SkiaLineCap, LineJoin as SkiaLineJoin, LinearGradient, Mask, Paint as SkiaPaint,
    PathBuilder, Pattern, Pixmap, PixmapPaint, Point, RadialGradient, SpreadMode as SkiaSpreadMode,
    Stroke, StrokeDash, Transform,
};
use tracing::{debug, warn};

use crate::core::config::PixelFormat;
use crate::core::document::ImageData;
use crate::core::error::{RenderError, RenderResult};
use crate::core::geom::Affine;
use crate::core::path::{Path, PathElement};
use crate::core::style::{BlendMode, Color, FillRule, LineCap, LineJoin, StrokeProps};
use crate::rendering::backend::{AlphaMask, Backend, ImageFilter, TargetKind};
use crate::rendering::paint::{ColorStop, PaintSource, SpreadMode};

// --- Conversion helpers ---

fn to_skia_transform(m: &Affine) -> Transform {
    let [a, b, c, d, e, f] = m.0;
    Transform::from_row(a as f32, b as f32, c as f32, d as f32, e as f32, f as f32)
}

fn to_skia_color(color: Color, alpha: f64) -> tiny_skia::Color {
    tiny_skia::Color::from_rgba(
        color.r.clamp(0.0, 1.0) as f32,
        color.g.clamp(0.0, 1.0) as f32,
        color.b.clamp(0.0, 1.0) as f32,
        alpha.clamp(0.0, 1.0) as f32,
    )
    .unwrap_or(tiny_skia::Color::BLACK)
}

pub(crate) fn to_skia_path(path: &Path) -> Option<tiny_skia::Path> {
    let mut pb = PathBuilder::new();
    for el in path.elements() {
        match *el {
            PathElement::MoveTo(x, y) => pb.move_to(x as f32, y as f32),
            PathElement::LineTo(x, y) => pb.line_to(x as f32, y as f32),
            PathElement::QuadTo(cx, cy, x, y) => {
                pb.quad_to(cx as f32, cy as f32, x as f32, y as f32)
            }
            PathElement::CurveTo(c1x, c1y, c2x, c2y, x, y) => pb.cubic_to(
                c1x as f32, c1y as f32, c2x as f32, c2y as f32, x as f32, y as f32,
            ),
            PathElement::ClosePath => pb.close(),
        }
    }
    pb.finish()
}

fn to_skia_fill_rule(fill_rule: FillRule) -> SkiaFillRule {
    match fill_rule {
        FillRule::NonZero => SkiaFillRule::Winding,
        FillRule::EvenOdd => SkiaFillRule::EvenOdd,
    }
}

fn to_skia_line_cap(line_cap: LineCap) -> SkiaLineCap {
    match line_cap {
        LineCap::Butt => SkiaLineCap::Butt,
        LineCap::Round => SkiaLineCap::Round,
        LineCap::Square => SkiaLineCap::Square,
    }
}

fn to_skia_line_join(line_join: LineJoin) -> SkiaLineJoin {
    match line_join {
        LineJoin::Miter => SkiaLineJoin::Miter,
        LineJoin::Round => SkiaLineJoin::Round,
        LineJoin::Bevel => SkiaLineJoin::Bevel,
    }
}

fn to_skia_stroke(props: &StrokeProps) -> Stroke {
    // An odd dash list is repeated to make it even
    let mut dashes: Vec<f32> = props.dash_array.iter().map(|d| d.max(0.0) as f32).collect();
    if dashes.len() % 2 == 1 {
        dashes.extend_from_within(..);
    }
    let dash = if dashes.is_empty() {
        None
    } else {
        StrokeDash::new(dashes, props.dash_offset as f32)
    };
    Stroke {
        // Zero width is tiny-skia's hairline
        width: if props.hairline { 0.0 } else { props.width as f32 },
        miter_limit: props.miter_limit.max(1.0) as f32,
        line_cap: to_skia_line_cap(props.line_cap),
        line_join: to_skia_line_join(props.line_join),
        dash,
    }
}

pub(crate) fn to_skia_blend_mode(op: BlendMode) -> SkiaBlendMode {
    match op {
        BlendMode::Normal => SkiaBlendMode::SourceOver,
        BlendMode::Multiply => SkiaBlendMode::Multiply,
        BlendMode::Screen => SkiaBlendMode::Screen,
        BlendMode::Overlay => SkiaBlendMode::Overlay,
        BlendMode::Darken => SkiaBlendMode::Darken,
        BlendMode::Lighten => SkiaBlendMode::Lighten,
        BlendMode::ColorDodge => SkiaBlendMode::ColorDodge,
        BlendMode::ColorBurn => SkiaBlendMode::ColorBurn,
        BlendMode::HardLight => SkiaBlendMode::HardLight,
        BlendMode::SoftLight => SkiaBlendMode::SoftLight,
        BlendMode::Difference => SkiaBlendMode::Difference,
        BlendMode::Exclusion => SkiaBlendMode::Exclusion,
        BlendMode::Hue => SkiaBlendMode::Hue,
        BlendMode::Saturation => SkiaBlendMode::Saturation,
        BlendMode::Color => SkiaBlendMode::Color,
        BlendMode::Luminosity => SkiaBlendMode::Luminosity,
    }
}

fn to_skia_spread(spread: SpreadMode) -> SkiaSpreadMode {
    match spread {
        SpreadMode::Pad => SkiaSpreadMode::Pad,
        SpreadMode::Reflect => SkiaSpreadMode::Reflect,
        SpreadMode::Repeat => SkiaSpreadMode::Repeat,
        SpreadMode::None => {
            debug!("gradient without spread method rendered as pad");
            SkiaSpreadMode::Pad
        }
    }
}

fn to_skia_stops(stops: &[ColorStop]) -> Vec<GradientStop> {
    stops
        .iter()
        .map(|s| GradientStop::new(s.offset.clamp(0.0, 1.0) as f32, to_skia_color(s.color, s.alpha)))
        .collect()
}

pub(crate) fn pixmap_from_image(image: &ImageData) -> Option<Pixmap> {
    let size = IntSize::from_wh(image.width, image.height)?;
    Pixmap::from_vec(image.data.clone(), size)
}

/// Build a skia paint. Tile sources borrow their pixmap from `tile`.
fn to_skia_paint<'a>(source: &PaintSource, tile: Option<&'a Pixmap>) -> Option<SkiaPaint<'a>> {
    let mut paint = SkiaPaint::default();
    paint.anti_alias = true;

    let source_to_user = match source.source_to_user() {
        Some(m) => to_skia_transform(&m),
        None => {
            debug!("paint source with singular matrix skipped");
            return None;
        }
    };

    match source {
        PaintSource::Solid { color, alpha } => {
            paint.set_color(to_skia_color(*color, *alpha));
        }
        PaintSource::LinearGradient {
            x1,
            y1,
            x2,
            y2,
            stops,
            spread,
            ..
        } => {
            let last = stops.last()?;
            match LinearGradient::new(
                Point::from_xy(*x1 as f32, *y1 as f32),
                Point::from_xy(*x2 as f32, *y2 as f32),
                to_skia_stops(stops),
                to_skia_spread(*spread),
                source_to_user,
            ) {
                Some(shader) => paint.shader = shader,
                None => paint.set_color(to_skia_color(last.color, last.alpha)),
            }
        }
        PaintSource::RadialGradient {
            fx,
            fy,
            fr,
            cx,
            cy,
            r,
            stops,
            spread,
            ..
        } => {
            let last = stops.last()?;
            if *fr > 0.0 {
                debug!("focal radius not supported by raster backend, using 0");
            }
            match RadialGradient::new(
                Point::from_xy(*fx as f32, *fy as f32),
                Point::from_xy(*cx as f32, *cy as f32),
                *r as f32,
                to_skia_stops(stops),
                to_skia_spread(*spread),
                source_to_user,
            ) {
                Some(shader) => paint.shader = shader,
                None => paint.set_color(to_skia_color(last.color, last.alpha)),
            }
        }
        PaintSource::Tile { .. } => {
            let pixmap = tile?;
            paint.shader = Pattern::new(
                pixmap.as_ref(),
                SkiaSpreadMode::Repeat,
                FilterQuality::Bicubic,
                1.0,
                source_to_user,
            );
        }
    }
    Some(paint)
}

#[derive(Clone)]
struct RasterState {
    transform: Affine,
    clip: Option<Mask>,
}

/// A pixel surface backed by tiny-skia pixmaps.
pub struct RasterBackend {
    format: PixelFormat,
    width: u32,
    height: u32,
    /// Surface at index 0, then one pixmap per open group
    layers: Vec<Pixmap>,
    state: RasterState,
    state_stack: Vec<RasterState>,
    source: Option<Pixmap>,
}

impl RasterBackend {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> RenderResult<Self> {
        let mut surface = Pixmap::new(width, height).ok_or(RenderError::InvalidSurface {
            width: width as f64,
            height: height as f64,
        })?;
        if format == PixelFormat::Rgb24 {
            surface.fill(tiny_skia::Color::WHITE);
        }
        Ok(RasterBackend {
            format,
            width,
            height,
            layers: vec![surface],
            state: RasterState {
                transform: Affine::IDENTITY,
                clip: None,
            },
            state_stack: Vec::new(),
            source: None,
        })
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    fn target(&mut self) -> &mut Pixmap {
        // Index 0 always exists
        let last = self.layers.len() - 1;
        &mut self.layers[last]
    }

    fn new_mask(&self) -> Option<Mask> {
        Mask::new(self.width, self.height)
    }
}

impl Backend for RasterBackend {
    fn kind(&self) -> TargetKind {
        TargetKind::Raster
    }

    fn size(&self) -> (f64, f64) {
        (self.width as f64, self.height as f64)
    }

    fn save(&mut self) {
        self.state_stack.push(self.state.clone());
    }

    fn restore(&mut self) {
        if let Some(state) = self.state_stack.pop() {
            self.state = state;
        }
    }

    fn transform(&self) -> Affine {
        self.state.transform
    }

    fn set_transform(&mut self, m: &Affine) {
        self.state.transform = *m;
    }

    fn push_group(&mut self) {
        self.save();
        match Pixmap::new(self.width, self.height) {
            Some(layer) => self.layers.push(layer),
            None => warn!("failed to allocate group layer"),
        }
    }

    fn pop_group_to_source(&mut self) {
        if self.layers.len() > 1 {
            self.source = self.layers.pop();
        }
        self.restore();
    }

    fn paint(&mut self, alpha: f64, op: BlendMode) {
        let Some(source) = self.source.take() else {
            return;
        };
        let paint = PixmapPaint {
            opacity: alpha.clamp(0.0, 1.0) as f32,
            blend_mode: to_skia_blend_mode(op),
            quality: FilterQuality::Nearest,
        };
        let clip = self.state.clip.clone();
        self.target().draw_pixmap(
            0,
            0,
            source.as_ref(),
            &paint,
            Transform::identity(),
            clip.as_ref(),
        );
    }

    fn mask(&mut self, mask: &AlphaMask, op: BlendMode) {
        let Some(source) = self.source.take() else {
            return;
        };
        let Some(mut combined) = self.new_mask() else {
            return;
        };
        {
            let width = self.width;
            let clip = self.state.clip.as_ref().map(|m| m.data());
            let data = combined.data_mut();
            for y in 0..self.height {
                for x in 0..width {
                    let idx = (y * width + x) as usize;
                    let mut a = mask.sample(x, y) as u32;
                    if let Some(clip) = clip {
                        a = (a * clip[idx] as u32 + 127) / 255;
                    }
                    data[idx] = a as u8;
                }
            }
        }
        let paint = PixmapPaint {
            opacity: 1.0,
            blend_mode: to_skia_blend_mode(op),
            quality: FilterQuality::Nearest,
        };
        self.target().draw_pixmap(
            0,
            0,
            source.as_ref(),
            &paint,
            Transform::identity(),
            Some(&combined),
        );
    }

    fn fill_path(&mut self, path: &Path, rule: FillRule, source: &PaintSource, op: BlendMode) {
        let Some(sk_path) = to_skia_path(path) else {
            return;
        };
        let tile = match source {
            PaintSource::Tile { image, .. } => pixmap_from_image(image),
            _ => None,
        };
        let Some(mut paint) = to_skia_paint(source, tile.as_ref()) else {
            return;
        };
        paint.blend_mode = to_skia_blend_mode(op);
        let ts = to_skia_transform(&self.state.transform);
        let clip = self.state.clip.clone();
        self.target()
            .fill_path(&sk_path, &paint, to_skia_fill_rule(rule), ts, clip.as_ref());
    }

    fn stroke_path(
        &mut self,
        path: &Path,
        stroke: &StrokeProps,
        source: &PaintSource,
        op: BlendMode,
    ) {
        let Some(sk_path) = to_skia_path(path) else {
            return;
        };
        let tile = match source {
            PaintSource::Tile { image, .. } => pixmap_from_image(image),
            _ => None,
        };
        let Some(mut paint) = to_skia_paint(source, tile.as_ref()) else {
            return;
        };
        paint.blend_mode = to_skia_blend_mode(op);
        let ts = to_skia_transform(&self.state.transform);
        let clip = self.state.clip.clone();
        self.target()
            .stroke_path(&sk_path, &paint, &to_skia_stroke(stroke), ts, clip.as_ref());
    }

    fn clip(&mut self, device_path: &Path, rule: FillRule) {
        let Some(mut mask) = self.new_mask() else {
            return;
        };
        if let Some(sk_path) = to_skia_path(device_path) {
            mask.fill_path(&sk_path, to_skia_fill_rule(rule), true, Transform::identity());
        }
        if let Some(old) = &self.state.clip {
            for (a, b) in mask.data_mut().iter_mut().zip(old.data()) {
                *a = ((*a as u32 * *b as u32 + 127) / 255) as u8;
            }
        }
        self.state.clip = Some(mask);
    }

    fn draw_image(&mut self, image: &ImageData, filter: ImageFilter, op: BlendMode) {
        let Some(pixmap) = pixmap_from_image(image) else {
            debug!("image with invalid size skipped");
            return;
        };
        let paint = PixmapPaint {
            opacity: 1.0,
            blend_mode: to_skia_blend_mode(op),
            quality: match filter {
                ImageFilter::Nearest => FilterQuality::Nearest,
                ImageFilter::Smooth => FilterQuality::Bicubic,
            },
        };
        let ts = to_skia_transform(&self.state.transform);
        let clip = self.state.clip.clone();
        self.target()
            .draw_pixmap(0, 0, pixmap.as_ref(), &paint, ts, clip.as_ref());
    }

    fn snapshot(&self) -> Option<ImageData> {
        let surface = self.layers.first()?;
        ImageData::from_premultiplied(self.width, self.height, surface.data().to_vec()).ok()
    }
}

/// Encode premultiplied pixels as PNG.
pub fn encode_png(image: &ImageData) -> RenderResult<Vec<u8>> {
    let pixmap = pixmap_from_image(image)
        .ok_or_else(|| RenderError::Image(format!("bad image size {}x{}", image.width, image.height)))?;
    pixmap
        .encode_png()
        .map_err(|e| RenderError::Encoding(format!("Failed to encode PNG: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: f64, y: f64, w: f64, h: f64) -> Path {
        let mut p = Path::new();
        p.rect(x, y, w, h);
        p
    }

    fn pixel(backend: &RasterBackend, x: u32, y: u32) -> [u8; 4] {
        backend.snapshot().unwrap().pixel(x, y).unwrap()
    }

    #[test]
    fn test_zero_size_fails() {
        assert!(matches!(
            RasterBackend::new(0, 10, PixelFormat::Argb32),
            Err(RenderError::InvalidSurface { .. })
        ));
    }

    #[test]
    fn test_rgb24_starts_white() {
        let backend = RasterBackend::new(4, 4, PixelFormat::Rgb24).unwrap();
        assert_eq!(pixel(&backend, 1, 1), [255, 255, 255, 255]);
        let backend = RasterBackend::new(4, 4, PixelFormat::Argb32).unwrap();
        assert_eq!(pixel(&backend, 1, 1), [0, 0, 0, 0]);
    }

    #[test]
    fn test_fill_with_transform() {
        let mut backend = RasterBackend::new(20, 20, PixelFormat::Argb32).unwrap();
        backend.set_transform(&Affine::scale(2.0, 2.0));
        backend.fill_path(
            &rect(0.0, 0.0, 5.0, 5.0),
            FillRule::NonZero,
            &PaintSource::solid(Color::red(), 1.0),
            BlendMode::Normal,
        );
        assert_eq!(pixel(&backend, 8, 8), [255, 0, 0, 255]);
        assert_eq!(pixel(&backend, 12, 12), [0, 0, 0, 0]);
    }

    #[test]
    fn test_clip_is_restored() {
        let mut backend = RasterBackend::new(10, 10, PixelFormat::Argb32).unwrap();
        backend.save();
        backend.clip(&rect(0.0, 0.0, 5.0, 10.0), FillRule::NonZero);
        backend.fill_path(
            &rect(0.0, 0.0, 10.0, 10.0),
            FillRule::NonZero,
            &PaintSource::solid(Color::blue(), 1.0),
            BlendMode::Normal,
        );
        backend.restore();
        assert_eq!(pixel(&backend, 2, 2), [0, 0, 255, 255]);
        assert_eq!(pixel(&backend, 7, 2), [0, 0, 0, 0]);
        assert!(backend.state.clip.is_none());
    }

    #[test]
    fn test_group_paint_with_alpha() {
        let mut backend = RasterBackend::new(4, 4, PixelFormat::Argb32).unwrap();
        backend.push_group();
        backend.fill_path(
            &rect(0.0, 0.0, 4.0, 4.0),
            FillRule::NonZero,
            &PaintSource::solid(Color::white(), 1.0),
            BlendMode::Normal,
        );
        backend.pop_group_to_source();
        backend.paint(0.5, BlendMode::Normal);
        let a = pixel(&backend, 1, 1)[3];
        assert!((126..=129).contains(&a), "alpha {}", a);
    }

    #[test]
    fn test_mask_composite() {
        let mut backend = RasterBackend::new(4, 1, PixelFormat::Argb32).unwrap();
        backend.push_group();
        backend.fill_path(
            &rect(0.0, 0.0, 4.0, 1.0),
            FillRule::NonZero,
            &PaintSource::solid(Color::red(), 1.0),
            BlendMode::Normal,
        );
        backend.pop_group_to_source();
        let mask = AlphaMask {
            width: 4,
            height: 1,
            data: vec![255, 255, 0, 0],
            scale: 1.0,
        };
        backend.mask(&mask, BlendMode::Normal);
        assert_eq!(pixel(&backend, 0, 0), [255, 0, 0, 255]);
        assert_eq!(pixel(&backend, 3, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn test_encode_png_signature() {
        let backend = RasterBackend::new(2, 2, PixelFormat::Rgb24).unwrap();
        let png = encode_png(&backend.snapshot().unwrap()).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
