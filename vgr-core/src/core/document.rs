//! Scene document model.
//!
//! A [`Document`] is a read-only tree of styled items plus the id-indexed
//! resources they reference: clip paths, masks, paint servers, markers,
//! `use` definitions, images and fonts. Scene files are JSON.

use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::core::config::RenderConfig;
use crate::core::error::{RenderError, RenderResult};
use crate::core::geom::{Affine, Rect};
use crate::core::path::Path;
use crate::core::style::{Color, Overflow, Paint, StrokeProps, Style};
use crate::rendering::font::GlyphOutlines;

/// Longest `href` chain followed when resolving inherited resources.
const MAX_HREF_CHAIN: usize = 32;

/// Coordinate system of referenced content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Units {
    UserSpaceOnUse,
    ObjectBoundingBox,
}

fn user_space() -> Units {
    Units::UserSpaceOnUse
}

fn object_bbox() -> Units {
    Units::ObjectBoundingBox
}

fn one() -> f64 {
    1.0
}

/// Alignment part of `preserveAspectRatio`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    None,
    XMinYMin,
    XMidYMin,
    XMaxYMin,
    XMinYMid,
    XMidYMid,
    XMaxYMid,
    XMinYMax,
    XMidYMax,
    XMaxYMax,
}

/// How a view box is fitted into a viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AspectRatio {
    pub align: Align,
    pub slice: bool,
}

impl Default for AspectRatio {
    fn default() -> Self {
        AspectRatio {
            align: Align::XMidYMid,
            slice: false,
        }
    }
}

const ALIGN_NAMES: [(&str, Align); 10] = [
    ("none", Align::None),
    ("xMinYMin", Align::XMinYMin),
    ("xMidYMin", Align::XMidYMin),
    ("xMaxYMin", Align::XMaxYMin),
    ("xMinYMid", Align::XMinYMid),
    ("xMidYMid", Align::XMidYMid),
    ("xMaxYMid", Align::XMaxYMid),
    ("xMinYMax", Align::XMinYMax),
    ("xMidYMax", Align::XMidYMax),
    ("xMaxYMax", Align::XMaxYMax),
];

impl TryFrom<String> for AspectRatio {
    type Error = RenderError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let mut words = value.split_whitespace();
        let align_word = words.next().unwrap_or("xMidYMid");
        let align = ALIGN_NAMES
            .iter()
            .find(|(name, _)| *name == align_word)
            .map(|(_, align)| *align)
            .ok_or_else(|| {
                RenderError::InvalidDocument(format!("invalid preserveAspectRatio '{}'", value))
            })?;
        let slice = match words.next() {
            None | Some("meet") => false,
            Some("slice") => true,
            Some(other) => {
                return Err(RenderError::InvalidDocument(format!(
                    "invalid meetOrSlice '{}'",
                    other
                )));
            }
        };
        Ok(AspectRatio { align, slice })
    }
}

impl From<AspectRatio> for String {
    fn from(ar: AspectRatio) -> Self {
        let name = ALIGN_NAMES
            .iter()
            .find(|(_, align)| *align == ar.align)
            .map(|(name, _)| *name)
            .unwrap_or("xMidYMid");
        if ar.slice {
            format!("{} slice", name)
        } else {
            name.to_string()
        }
    }
}

impl AspectRatio {
    /// Transform mapping `view_box` into `viewport`.
    pub fn view_box_transform(&self, view_box: &Rect, viewport: &Rect) -> Affine {
        if view_box.is_empty() {
            return Affine::translate(viewport.x0, viewport.y0);
        }
        let sx = viewport.width() / view_box.width();
        let sy = viewport.height() / view_box.height();
        if self.align == Align::None {
            return Affine::new(
                sx,
                0.0,
                0.0,
                sy,
                viewport.x0 - view_box.x0 * sx,
                viewport.y0 - view_box.y0 * sy,
            );
        }
        let s = if self.slice { sx.max(sy) } else { sx.min(sy) };
        let free_x = viewport.width() - view_box.width() * s;
        let free_y = viewport.height() - view_box.height() * s;
        let (fx, fy) = match self.align {
            Align::XMinYMin => (0.0, 0.0),
            Align::XMidYMin => (0.5, 0.0),
            Align::XMaxYMin => (1.0, 0.0),
            Align::XMinYMid => (0.0, 0.5),
            Align::XMidYMid | Align::None => (0.5, 0.5),
            Align::XMaxYMid => (1.0, 0.5),
            Align::XMinYMax => (0.0, 1.0),
            Align::XMidYMax => (0.5, 1.0),
            Align::XMaxYMax => (1.0, 1.0),
        };
        Affine::new(
            s,
            0.0,
            0.0,
            s,
            viewport.x0 + free_x * fx - view_box.x0 * s,
            viewport.y0 + free_y * fy - view_box.y0 * s,
        )
    }
}

/// Decoded raster image, premultiplied RGBA8.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawImage", into = "RawImage")]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl fmt::Debug for ImageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageData")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Straight-alpha RGBA as found in scene files.
#[derive(Serialize, Deserialize)]
struct RawImage {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl TryFrom<RawImage> for ImageData {
    type Error = RenderError;

    fn try_from(raw: RawImage) -> Result<Self, Self::Error> {
        ImageData::from_rgba(raw.width, raw.height, raw.rgba)
    }
}

impl From<ImageData> for RawImage {
    fn from(image: ImageData) -> Self {
        RawImage {
            width: image.width,
            height: image.height,
            rgba: image.to_straight_rgba(),
        }
    }
}

impl ImageData {
    /// Build from straight (non-premultiplied) RGBA bytes.
    pub fn from_rgba(width: u32, height: u32, mut rgba: Vec<u8>) -> RenderResult<Self> {
        check_len(width, height, rgba.len())?;
        for px in rgba.chunks_exact_mut(4) {
            let a = px[3] as u16;
            if a < 255 {
                px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
                px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
                px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
            }
        }
        Ok(ImageData {
            width,
            height,
            data: rgba,
        })
    }

    pub fn from_premultiplied(width: u32, height: u32, data: Vec<u8>) -> RenderResult<Self> {
        check_len(width, height, data.len())?;
        Ok(ImageData {
            width,
            height,
            data,
        })
    }

    pub fn to_straight_rgba(&self) -> Vec<u8> {
        let mut out = self.data.clone();
        for px in out.chunks_exact_mut(4) {
            let a = px[3] as u16;
            if a > 0 && a < 255 {
                px[0] = ((px[0] as u16 * 255 + a / 2) / a).min(255) as u8;
                px[1] = ((px[1] as u16 * 255 + a / 2) / a).min(255) as u8;
                px[2] = ((px[2] as u16 * 255 + a / 2) / a).min(255) as u8;
            }
        }
        out
    }

    pub fn has_alpha(&self) -> bool {
        self.data.chunks_exact(4).any(|px| px[3] != 255)
    }

    /// Premultiplied RGBA at (x, y).
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        Some([
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ])
    }
}

fn check_len(width: u32, height: u32, len: usize) -> RenderResult<()> {
    let expected = width as usize * height as usize * 4;
    if width == 0 || height == 0 || len != expected {
        return Err(RenderError::Image(format!(
            "{}x{} image needs {} bytes, got {}",
            width, height, expected, len
        )));
    }
    Ok(())
}

/// A positioned glyph.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Glyph {
    pub id: u32,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

/// A scene item: common attributes plus a kind-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub transform: Affine,
    #[serde(default)]
    pub style: Style,
    #[serde(default)]
    pub clip_path: Option<String>,
    #[serde(default)]
    pub mask: Option<String>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(flatten)]
    pub kind: ItemKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ItemKind {
    /// Viewport establishing a new user space
    Root {
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
        width: Option<f64>,
        height: Option<f64>,
        #[serde(default)]
        view_box: Option<Rect>,
        #[serde(default)]
        preserve_aspect_ratio: AspectRatio,
        #[serde(default)]
        children: Vec<Item>,
    },
    Group {
        #[serde(default)]
        children: Vec<Item>,
    },
    Rect {
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
        width: f64,
        height: f64,
        #[serde(default)]
        rx: f64,
        #[serde(default)]
        ry: f64,
    },
    Circle {
        cx: f64,
        cy: f64,
        r: f64,
    },
    Ellipse {
        cx: f64,
        cy: f64,
        rx: f64,
        ry: f64,
    },
    Line {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
    },
    Path {
        d: Path,
    },
    Image {
        href: String,
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
        width: f64,
        height: f64,
        #[serde(default)]
        preserve_aspect_ratio: AspectRatio,
    },
    /// Pre-shaped glyph run
    Text {
        font: String,
        font_size: f64,
        glyphs: Vec<Glyph>,
    },
    Use {
        href: String,
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
    },
    /// Template content, only drawn through `use`
    Symbol {
        #[serde(default)]
        view_box: Option<Rect>,
        #[serde(default)]
        preserve_aspect_ratio: AspectRatio,
        #[serde(default)]
        width: Option<f64>,
        #[serde(default)]
        height: Option<f64>,
        #[serde(default)]
        children: Vec<Item>,
    },
    /// Hyperlink around its children
    Anchor {
        href: String,
        #[serde(default)]
        children: Vec<Item>,
    },
}

impl Item {
    pub fn new(kind: ItemKind) -> Self {
        Item {
            id: None,
            transform: Affine::IDENTITY,
            style: Style::default(),
            clip_path: None,
            mask: None,
            hidden: false,
            kind,
        }
    }

    pub fn group(children: Vec<Item>) -> Self {
        Item::new(ItemKind::Group { children })
    }

    pub fn children(&self) -> &[Item] {
        match &self.kind {
            ItemKind::Root { children, .. }
            | ItemKind::Group { children }
            | ItemKind::Symbol { children, .. }
            | ItemKind::Anchor { children, .. } => children,
            _ => &[],
        }
    }

    /// Geometry of shape items.
    pub fn shape_path(&self) -> Option<Path> {
        let path = match &self.kind {
            ItemKind::Rect {
                x,
                y,
                width,
                height,
                rx,
                ry,
            } => rounded_rect(*x, *y, *width, *height, *rx, *ry)?,
            ItemKind::Circle { cx, cy, r } => {
                if *r <= 0.0 {
                    return None;
                }
                Path::from_ellipse(*cx, *cy, *r, *r)
            }
            ItemKind::Ellipse { cx, cy, rx, ry } => {
                if *rx <= 0.0 || *ry <= 0.0 {
                    return None;
                }
                Path::from_ellipse(*cx, *cy, *rx, *ry)
            }
            ItemKind::Line { x1, y1, x2, y2 } => {
                let mut path = Path::new();
                path.move_to(*x1, *y1);
                path.line_to(*x2, *y2);
                path
            }
            ItemKind::Path { d } => d.clone(),
            _ => return None,
        };
        Some(path)
    }

    pub fn is_shape(&self) -> bool {
        matches!(
            self.kind,
            ItemKind::Rect { .. }
                | ItemKind::Circle { .. }
                | ItemKind::Ellipse { .. }
                | ItemKind::Line { .. }
                | ItemKind::Path { .. }
        )
    }
}

fn rounded_rect(x: f64, y: f64, w: f64, h: f64, rx: f64, ry: f64) -> Option<Path> {
    if w <= 0.0 || h <= 0.0 {
        return None;
    }
    // A single given radius applies to both axes
    let (rx, ry) = match (rx > 0.0, ry > 0.0) {
        (true, false) => (rx, rx),
        (false, true) => (ry, ry),
        _ => (rx, ry),
    };
    let rx = rx.clamp(0.0, w / 2.0);
    let ry = ry.clamp(0.0, h / 2.0);
    let mut path = Path::new();
    if rx <= 0.0 || ry <= 0.0 {
        path.rect(x, y, w, h);
        return Some(path);
    }
    let k = 0.552_284_749_830_793_4;
    let (kx, ky) = (rx * k, ry * k);
    path.move_to(x + rx, y);
    path.line_to(x + w - rx, y);
    path.curve_to(x + w - rx + kx, y, x + w, y + ry - ky, x + w, y + ry);
    path.line_to(x + w, y + h - ry);
    path.curve_to(x + w, y + h - ry + ky, x + w - rx + kx, y + h, x + w - rx, y + h);
    path.line_to(x + rx, y + h);
    path.curve_to(x + rx - kx, y + h, x, y + h - ry + ky, x, y + h - ry);
    path.line_to(x, y + ry);
    path.curve_to(x, y + ry - ky, x + rx - kx, y, x + rx, y);
    path.close_path();
    Some(path)
}

/// Clip path resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipPathDef {
    #[serde(default = "user_space")]
    pub units: Units,
    #[serde(default)]
    pub children: Vec<Item>,
}

/// Luminance mask resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskDef {
    #[serde(default = "user_space")]
    pub content_units: Units,
    #[serde(default)]
    pub children: Vec<Item>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpreadMethod {
    Pad,
    Reflect,
    Repeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientStop {
    pub offset: f64,
    pub color: Color,
    #[serde(default = "one")]
    pub opacity: f64,
}

/// One stroked line of a hatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HatchPath {
    #[serde(default)]
    pub offset: f64,
    /// Line shape; a vertical line through the strip when absent
    #[serde(default)]
    pub d: Option<Path>,
    #[serde(default = "black_paint")]
    pub stroke: Paint,
    #[serde(default = "one")]
    pub stroke_opacity: f64,
    #[serde(default)]
    pub stroke_style: StrokeProps,
}

fn black_paint() -> Paint {
    Paint::Color(Color::black())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PaintServer {
    Linear {
        #[serde(default)]
        x1: f64,
        #[serde(default)]
        y1: f64,
        #[serde(default = "one")]
        x2: f64,
        #[serde(default)]
        y2: f64,
        #[serde(default = "object_bbox")]
        units: Units,
        #[serde(default)]
        gradient_transform: Affine,
        #[serde(default)]
        spread: Option<SpreadMethod>,
        #[serde(default)]
        stops: Vec<GradientStop>,
        #[serde(default)]
        href: Option<String>,
    },
    Radial {
        #[serde(default = "half")]
        cx: f64,
        #[serde(default = "half")]
        cy: f64,
        #[serde(default = "half")]
        r: f64,
        #[serde(default)]
        fx: Option<f64>,
        #[serde(default)]
        fy: Option<f64>,
        #[serde(default)]
        fr: f64,
        #[serde(default = "object_bbox")]
        units: Units,
        #[serde(default)]
        gradient_transform: Affine,
        #[serde(default)]
        spread: Option<SpreadMethod>,
        #[serde(default)]
        stops: Vec<GradientStop>,
        #[serde(default)]
        href: Option<String>,
    },
    Pattern {
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
        width: f64,
        height: f64,
        #[serde(default = "object_bbox")]
        units: Units,
        #[serde(default = "user_space")]
        content_units: Units,
        #[serde(default)]
        pattern_transform: Affine,
        #[serde(default)]
        view_box: Option<Rect>,
        #[serde(default)]
        children: Vec<Item>,
        #[serde(default)]
        href: Option<String>,
    },
    Hatch {
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
        pitch: f64,
        #[serde(default)]
        rotate: f64,
        #[serde(default = "object_bbox")]
        units: Units,
        #[serde(default = "user_space")]
        content_units: Units,
        #[serde(default)]
        hatch_transform: Affine,
        #[serde(default = "hidden_overflow")]
        overflow: Overflow,
        #[serde(default)]
        paths: Vec<HatchPath>,
        #[serde(default)]
        href: Option<String>,
    },
}

fn half() -> f64 {
    0.5
}

fn hidden_overflow() -> Overflow {
    Overflow::Hidden
}

impl PaintServer {
    pub fn href(&self) -> Option<&str> {
        match self {
            PaintServer::Linear { href, .. }
            | PaintServer::Radial { href, .. }
            | PaintServer::Pattern { href, .. }
            | PaintServer::Hatch { href, .. } => href.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Orient {
    Auto,
    AutoStartReverse,
    #[serde(untagged)]
    Angle(f64),
}

impl Default for Orient {
    fn default() -> Self {
        Orient::Angle(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkerUnits {
    #[default]
    StrokeWidth,
    UserSpaceOnUse,
}

/// Marker resource drawn at path vertices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerDef {
    #[serde(default)]
    pub ref_x: f64,
    #[serde(default)]
    pub ref_y: f64,
    #[serde(default = "three")]
    pub marker_width: f64,
    #[serde(default = "three")]
    pub marker_height: f64,
    #[serde(default)]
    pub view_box: Option<Rect>,
    #[serde(default)]
    pub preserve_aspect_ratio: AspectRatio,
    #[serde(default)]
    pub orient: Orient,
    #[serde(default)]
    pub units: MarkerUnits,
    #[serde(default = "hidden_overflow")]
    pub overflow: Overflow,
    #[serde(default)]
    pub children: Vec<Item>,
}

fn three() -> f64 {
    3.0
}

/// A page of paginated output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Page area including bleed, in document units
    pub bleed: Rect,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub copyright: Option<String>,
    pub creator: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
}

/// A complete scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub width: f64,
    pub height: f64,
    /// Document units to user units
    #[serde(default = "one")]
    pub document_scale: f64,
    #[serde(default)]
    pub metadata: Metadata,
    pub root: Item,
    #[serde(default)]
    pub pages: Vec<Page>,
    #[serde(default)]
    pub clip_paths: FxHashMap<String, ClipPathDef>,
    #[serde(default)]
    pub masks: FxHashMap<String, MaskDef>,
    #[serde(default)]
    pub paint_servers: FxHashMap<String, PaintServer>,
    #[serde(default)]
    pub markers: FxHashMap<String, MarkerDef>,
    /// Targets of `use` items
    #[serde(default)]
    pub definitions: FxHashMap<String, Item>,
    #[serde(default)]
    pub images: FxHashMap<String, ImageData>,
    /// Font files by id, loaded by the caller
    #[serde(default, rename = "fonts")]
    pub font_files: FxHashMap<String, String>,
    #[serde(default)]
    pub config: Option<RenderConfig>,
    #[serde(skip)]
    fonts: FxHashMap<String, Rc<dyn GlyphOutlines>>,
}

impl Document {
    pub fn new(width: f64, height: f64, root: Item) -> Self {
        Document {
            width,
            height,
            document_scale: 1.0,
            metadata: Metadata::default(),
            root,
            pages: Vec::new(),
            clip_paths: FxHashMap::default(),
            masks: FxHashMap::default(),
            paint_servers: FxHashMap::default(),
            markers: FxHashMap::default(),
            definitions: FxHashMap::default(),
            images: FxHashMap::default(),
            font_files: FxHashMap::default(),
            config: None,
            fonts: FxHashMap::default(),
        }
    }

    pub fn from_json(text: &str) -> RenderResult<Self> {
        let doc: Document = serde_json::from_str(text)?;
        if !(doc.width > 0.0 && doc.height > 0.0 && doc.width.is_finite() && doc.height.is_finite())
        {
            return Err(RenderError::InvalidDocument(format!(
                "document size must be positive, got {}x{}",
                doc.width, doc.height
            )));
        }
        if !(doc.document_scale > 0.0 && doc.document_scale.is_finite()) {
            return Err(RenderError::InvalidDocument(format!(
                "invalid document scale {}",
                doc.document_scale
            )));
        }
        Ok(doc)
    }

    pub fn add_font(&mut self, id: impl Into<String>, font: Rc<dyn GlyphOutlines>) {
        self.fonts.insert(id.into(), font);
    }

    pub fn font(&self, id: &str) -> Option<&dyn GlyphOutlines> {
        self.fonts.get(id).map(|f| f.as_ref())
    }

    pub fn insert_image(&mut self, href: impl Into<String>, image: ImageData) {
        self.images.insert(href.into(), image);
    }

    /// Every image href referenced by the item tree and definitions.
    pub fn image_hrefs(&self) -> Vec<String> {
        fn walk(item: &Item, out: &mut Vec<String>) {
            if let ItemKind::Image { href, .. } = &item.kind {
                if !out.contains(href) {
                    out.push(href.clone());
                }
            }
            for child in item.children() {
                walk(child, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.root, &mut out);
        for def in self.definitions.values() {
            walk(def, &mut out);
        }
        for pattern in self.paint_servers.values() {
            if let PaintServer::Pattern { children, .. } = pattern {
                for child in children {
                    walk(child, &mut out);
                }
            }
        }
        out
    }

    /// Walk the `href` chain starting at `id`, returning the first server
    /// for which `pick` yields a value.
    fn inherited<'a, T>(
        &'a self,
        id: &str,
        pick: impl Fn(&'a PaintServer) -> Option<T>,
    ) -> Option<T> {
        let mut current = self.paint_servers.get(id)?;
        for _ in 0..MAX_HREF_CHAIN {
            if let Some(found) = pick(current) {
                return Some(found);
            }
            current = self.paint_servers.get(current.href()?)?;
        }
        None
    }

    /// Children of the first pattern in the chain that has any.
    pub fn pattern_children(&self, id: &str) -> &[Item] {
        self.inherited(id, |server| match server {
            PaintServer::Pattern { children, .. } if !children.is_empty() => {
                Some(children.as_slice())
            }
            _ => None,
        })
        .unwrap_or(&[])
    }

    /// Stops of the first gradient in the chain that has any.
    pub fn gradient_stops(&self, id: &str) -> &[GradientStop] {
        self.inherited(id, |server| match server {
            PaintServer::Linear { stops, .. } | PaintServer::Radial { stops, .. }
                if !stops.is_empty() =>
            {
                Some(stops.as_slice())
            }
            _ => None,
        })
        .unwrap_or(&[])
    }

    /// Paths of the first hatch in the chain that has any.
    pub fn hatch_paths(&self, id: &str) -> &[HatchPath] {
        self.inherited(id, |server| match server {
            PaintServer::Hatch { paths, .. } if !paths.is_empty() => Some(paths.as_slice()),
            _ => None,
        })
        .unwrap_or(&[])
    }
}
