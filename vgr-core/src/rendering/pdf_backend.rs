//! A paginated PDF backend.
//!
//! Drawing happens in a y-down device space measured in points. Each page
//! content stream starts with a flip so that device space lands on the PDF
//! page. Groups become transparency form XObjects, masks become luminosity
//! soft masks, gradients become shading patterns and tiles become tiling
//! patterns. All objects are buffered and written by [`Backend::finish`].

use std::collections::BTreeMap;
use std::io::Write;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::core::document::{ImageData, Metadata};
use crate::core::error::{RenderError, RenderResult};
use crate::core::geom::{Affine, Rect};
use crate::core::path::{Path, PathElement};
use crate::core::pdf_writer::{dict, format_number, text_string, ObjRef, PdfObject, PdfWriter};
use crate::core::style::{BlendMode, FillRule, LineCap, LineJoin, StrokeProps};
use crate::rendering::backend::{AlphaMask, Backend, ImageFilter, TargetKind};
use crate::rendering::paint::{ColorStop, PaintSource, SpreadMode};

#[derive(Debug, Clone, Copy)]
struct PdfState {
    ctm: Affine,
    /// Whether entering this state wrote a `q`
    emitted: bool,
}

/// Resource dictionary shared by every page and form.
#[derive(Debug, Default)]
struct Resources {
    ext_gstates: BTreeMap<String, PdfObject>,
    xobjects: BTreeMap<String, PdfObject>,
    patterns: BTreeMap<String, PdfObject>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ResourceKind {
    ExtGState,
    XObject,
    Pattern,
}

/// How a fill or stroke picks its colour.
struct PaintSetup {
    /// Graphics state entries set before the CTM change
    gstate: BTreeMap<String, PdfObject>,
    /// Colour operators set after the CTM change
    color_ops: String,
}

pub struct PdfBackend<'w> {
    out: Box<dyn Write + 'w>,
    writer: PdfWriter,
    compress: bool,
    width: f64,
    height: f64,
    pages_ref: ObjRef,
    resources_ref: ObjRef,
    page_refs: Vec<ObjRef>,
    labels: Vec<(usize, String)>,
    annots: Vec<ObjRef>,
    /// Content of the page at index 0, then one buffer per open group
    frames: Vec<String>,
    state: PdfState,
    state_stack: Vec<PdfState>,
    source: Option<String>,
    resources: Resources,
    gstate_cache: FxHashMap<String, String>,
    counters: FxHashMap<ResourceKind, usize>,
    link: Option<(String, Option<Rect>)>,
    metadata: Option<Metadata>,
    page_dirty: bool,
    error: Option<String>,
    finished: bool,
}

impl<'w> PdfBackend<'w> {
    /// Create a backend writing to `out`, first page `width` x `height` points.
    pub fn new(out: Box<dyn Write + 'w>, width: f64, height: f64) -> Self {
        let mut writer = PdfWriter::new();
        let pages_ref = writer.allocate();
        let resources_ref = writer.allocate();
        PdfBackend {
            out,
            writer,
            compress: true,
            width,
            height,
            pages_ref,
            resources_ref,
            page_refs: Vec::new(),
            labels: Vec::new(),
            annots: Vec::new(),
            frames: vec![String::new()],
            state: PdfState {
                ctm: Affine::IDENTITY,
                emitted: false,
            },
            state_stack: Vec::new(),
            source: None,
            resources: Resources::default(),
            gstate_cache: FxHashMap::default(),
            counters: FxHashMap::default(),
            link: None,
            metadata: None,
            page_dirty: false,
            error: None,
            finished: false,
        }
    }

    /// Disable Flate compression of content streams.
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    fn fail(&mut self, message: String) {
        warn!("{}", message);
        if self.error.is_none() {
            self.error = Some(message);
        }
    }

    fn emit(&mut self, ops: &str) {
        if let Some(frame) = self.frames.last_mut() {
            frame.push_str(ops);
            frame.push('\n');
        }
        self.page_dirty = true;
    }

    fn in_form(&self) -> bool {
        self.frames.len() > 1
    }

    /// Device space to the space patterns are defined against.
    fn pattern_base(&self) -> Affine {
        if self.in_form() {
            Affine::IDENTITY
        } else {
            self.page_flip()
        }
    }

    fn page_flip(&self) -> Affine {
        Affine::new(1.0, 0.0, 0.0, -1.0, 0.0, self.height)
    }

    fn device_box(&self) -> PdfObject {
        PdfObject::numbers(&[0.0, 0.0, self.width, self.height])
    }

    fn add_stream(&mut self, dict: BTreeMap<String, PdfObject>, data: &[u8]) -> Option<ObjRef> {
        let stream = if self.compress {
            match PdfObject::flate_stream(dict, data) {
                Ok(stream) => stream,
                Err(e) => {
                    self.fail(format!("Failed to compress stream: {}", e));
                    return None;
                }
            }
        } else {
            PdfObject::Stream {
                dict,
                data: data.to_vec(),
            }
        };
        Some(self.writer.add(stream))
    }

    /// Register a resource and return its name.
    fn add_resource(&mut self, kind: ResourceKind, obj: PdfObject) -> String {
        let counter = self.counters.entry(kind).or_insert(0);
        *counter += 1;
        let (prefix, map) = match kind {
            ResourceKind::ExtGState => ("G", &mut self.resources.ext_gstates),
            ResourceKind::XObject => ("X", &mut self.resources.xobjects),
            ResourceKind::Pattern => ("P", &mut self.resources.patterns),
        };
        let name = format!("{}{}", prefix, counter);
        map.insert(name.clone(), obj);
        name
    }

    /// Name of an ExtGState with the given entries, shared when identical.
    fn ext_gstate(&mut self, entries: BTreeMap<String, PdfObject>) -> String {
        let mut key = Vec::new();
        let obj = PdfObject::Dictionary(entries);
        if PdfWriter::write_object(&mut key, &obj).is_err() {
            return self.add_resource(ResourceKind::ExtGState, obj);
        }
        let key = String::from_utf8_lossy(&key).into_owned();
        if let Some(name) = self.gstate_cache.get(&key) {
            return name.clone();
        }
        let name = self.add_resource(ResourceKind::ExtGState, obj);
        self.gstate_cache.insert(key, name.clone());
        name
    }

    fn gstate_ops(&mut self, entries: BTreeMap<String, PdfObject>) -> String {
        if entries.is_empty() {
            return String::new();
        }
        format!("/{} gs ", self.ext_gstate(entries))
    }

    fn track_link_area(&mut self, device_rect: Option<Rect>) {
        if let (Some((_, area)), Some(rect)) = (self.link.as_mut(), device_rect) {
            *area = Some(match *area {
                Some(existing) => existing.union(&rect),
                None => rect,
            });
        }
    }

    /// Image XObject with an optional soft mask for alpha.
    fn image_xobject(&mut self, image: &ImageData, interpolate: bool) -> Option<ObjRef> {
        let straight = image.to_straight_rgba();
        let mut rgb = Vec::with_capacity(straight.len() / 4 * 3);
        let mut alpha = Vec::with_capacity(straight.len() / 4);
        for px in straight.chunks_exact(4) {
            rgb.extend_from_slice(&px[..3]);
            alpha.push(px[3]);
        }

        let mut image_dict = dict([
            ("Type", PdfObject::name("XObject")),
            ("Subtype", PdfObject::name("Image")),
            ("Width", PdfObject::Number(image.width as f64)),
            ("Height", PdfObject::Number(image.height as f64)),
            ("ColorSpace", PdfObject::name("DeviceRGB")),
            ("BitsPerComponent", PdfObject::Number(8.0)),
            ("Interpolate", PdfObject::Boolean(interpolate)),
        ]);
        if image.has_alpha() {
            let smask = self.gray_image(image.width, image.height, &alpha, interpolate)?;
            image_dict.insert("SMask".to_string(), smask.into());
        }
        self.add_stream(image_dict, &rgb)
    }

    fn gray_image(&mut self, width: u32, height: u32, data: &[u8], interpolate: bool) -> Option<ObjRef> {
        let gray = dict([
            ("Type", PdfObject::name("XObject")),
            ("Subtype", PdfObject::name("Image")),
            ("Width", PdfObject::Number(width as f64)),
            ("Height", PdfObject::Number(height as f64)),
            ("ColorSpace", PdfObject::name("DeviceGray")),
            ("BitsPerComponent", PdfObject::Number(8.0)),
            ("Interpolate", PdfObject::Boolean(interpolate)),
        ]);
        self.add_stream(gray, data)
    }

    /// A transparency group form covering the page in device space.
    fn form_xobject(&mut self, content: &str, colorspace: Option<&str>) -> Option<ObjRef> {
        let mut group = dict([
            ("Type", PdfObject::name("Group")),
            ("S", PdfObject::name("Transparency")),
        ]);
        if let Some(cs) = colorspace {
            group.insert("CS".to_string(), PdfObject::name(cs));
        }
        let form = dict([
            ("Type", PdfObject::name("XObject")),
            ("Subtype", PdfObject::name("Form")),
            ("BBox", self.device_box()),
            ("Group", PdfObject::Dictionary(group)),
            ("Resources", self.resources_ref.into()),
        ]);
        self.add_stream(form, content.as_bytes())
    }

    /// Luminosity soft mask whose form paints `content` in device space.
    fn luminosity_smask(&mut self, content: &str) -> Option<PdfObject> {
        let form = self.form_xobject(content, Some("DeviceGray"))?;
        Some(PdfObject::Dictionary(dict([
            ("Type", PdfObject::name("Mask")),
            ("S", PdfObject::name("Luminosity")),
            ("G", form.into()),
        ])))
    }

    fn shading(&self, source: &PaintSource, alpha_channel: bool) -> Option<PdfObject> {
        let (shading_type, coords, stops, spread) = match source {
            PaintSource::LinearGradient {
                x1,
                y1,
                x2,
                y2,
                stops,
                spread,
                ..
            } => (2.0, vec![*x1, *y1, *x2, *y2], stops, *spread),
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
            } => (3.0, vec![*fx, *fy, *fr, *cx, *cy, *r], stops, *spread),
            _ => return None,
        };
        let extend = match spread {
            SpreadMode::Pad => true,
            SpreadMode::None => false,
            SpreadMode::Repeat | SpreadMode::Reflect => {
                warn!("{:?} gradient spread is not supported in PDF output, padding", spread);
                true
            }
        };
        let function = if alpha_channel {
            stop_function(stops, |s| vec![s.alpha])
        } else {
            stop_function(stops, |s| vec![s.color.r, s.color.g, s.color.b])
        }?;
        Some(PdfObject::Dictionary(dict([
            ("ShadingType", PdfObject::Number(shading_type)),
            (
                "ColorSpace",
                PdfObject::name(if alpha_channel { "DeviceGray" } else { "DeviceRGB" }),
            ),
            ("Coords", PdfObject::numbers(&coords)),
            ("Function", function),
            (
                "Extend",
                PdfObject::Array(vec![PdfObject::Boolean(extend), PdfObject::Boolean(extend)]),
            ),
        ])))
    }

    /// Resolve a paint source into graphics state entries and colour operators.
    fn paint_setup(&mut self, source: &PaintSource, stroke: bool) -> Option<PaintSetup> {
        let alpha_keys: &[&str] = if stroke { &["CA"] } else { &["ca"] };
        let mut gstate = BTreeMap::new();
        let color_ops = match source {
            PaintSource::Solid { color, alpha } => {
                if *alpha < 1.0 {
                    for key in alpha_keys {
                        gstate.insert(key.to_string(), PdfObject::Number(alpha.max(0.0)));
                    }
                }
                let op = if stroke { "RG" } else { "rg" };
                format!(
                    "{} {} {} {}",
                    format_number(color.r),
                    format_number(color.g),
                    format_number(color.b),
                    op
                )
            }
            PaintSource::LinearGradient { stops, .. }
            | PaintSource::RadialGradient { stops, .. } => {
                let source_to_user = source.source_to_user()?;
                let shading = self.shading(source, false)?;
                let pattern = PdfObject::Dictionary(dict([
                    ("PatternType", PdfObject::Number(2.0)),
                    ("Shading", shading),
                    (
                        "Matrix",
                        PdfObject::numbers(
                            &self
                                .pattern_base()
                                .concat(&self.state.ctm)
                                .concat(&source_to_user)
                                .0,
                        ),
                    ),
                ]));
                let name = self.add_resource(ResourceKind::Pattern, pattern);

                let first_alpha = stops.first().map(|s| s.alpha).unwrap_or(1.0);
                if stops.iter().all(|s| (s.alpha - first_alpha).abs() < 1e-6) {
                    if first_alpha < 1.0 {
                        for key in alpha_keys {
                            gstate.insert(key.to_string(), PdfObject::Number(first_alpha.max(0.0)));
                        }
                    }
                } else if let Some(alpha_shading) = self.shading(source, true) {
                    let shading_name = "Sh1";
                    let matrix = self.state.ctm.concat(&source_to_user);
                    let content = format!("{} cm /{} sh", matrix_ops(&matrix), shading_name);
                    let form = dict([
                        ("Type", PdfObject::name("XObject")),
                        ("Subtype", PdfObject::name("Form")),
                        ("BBox", self.device_box()),
                        (
                            "Group",
                            PdfObject::Dictionary(dict([
                                ("S", PdfObject::name("Transparency")),
                                ("CS", PdfObject::name("DeviceGray")),
                            ])),
                        ),
                        (
                            "Resources",
                            PdfObject::Dictionary(dict([(
                                "Shading",
                                PdfObject::Dictionary(dict([(shading_name, alpha_shading)])),
                            )])),
                        ),
                    ]);
                    let form = self.add_stream(form, content.as_bytes())?;
                    gstate.insert(
                        "SMask".to_string(),
                        PdfObject::Dictionary(dict([
                            ("Type", PdfObject::name("Mask")),
                            ("S", PdfObject::name("Luminosity")),
                            ("G", form.into()),
                        ])),
                    );
                }
                pattern_color_ops(&name, stroke)
            }
            PaintSource::Tile { image, .. } => {
                let source_to_user = source.source_to_user()?;
                let tile_image = self.image_xobject(image, true)?;
                let image_name = self.add_resource(ResourceKind::XObject, tile_image.into());
                let (w, h) = (image.width as f64, image.height as f64);
                let content = format!(
                    "q {} 0 0 {} 0 {} cm /{} Do Q",
                    format_number(w),
                    format_number(-h),
                    format_number(h),
                    image_name
                );
                let tiling = dict([
                    ("Type", PdfObject::name("Pattern")),
                    ("PatternType", PdfObject::Number(1.0)),
                    ("PaintType", PdfObject::Number(1.0)),
                    ("TilingType", PdfObject::Number(1.0)),
                    ("BBox", PdfObject::numbers(&[0.0, 0.0, w, h])),
                    ("XStep", PdfObject::Number(w)),
                    ("YStep", PdfObject::Number(h)),
                    (
                        "Matrix",
                        PdfObject::numbers(
                            &self
                                .pattern_base()
                                .concat(&self.state.ctm)
                                .concat(&source_to_user)
                                .0,
                        ),
                    ),
                    ("Resources", self.resources_ref.into()),
                ]);
                let tiling = self.add_stream(tiling, content.as_bytes())?;
                let name = self.add_resource(ResourceKind::Pattern, tiling.into());
                pattern_color_ops(&name, stroke)
            }
        };
        Some(PaintSetup { gstate, color_ops })
    }

    fn draw_path(&mut self, path: &Path, source: &PaintSource, op: BlendMode, paint_op: &str, stroke: Option<&StrokeProps>) {
        let Some(mut setup) = self.paint_setup(source, stroke.is_some()) else {
            debug!("unusable paint source skipped");
            return;
        };
        if op != BlendMode::Normal {
            setup
                .gstate
                .insert("BM".to_string(), PdfObject::name(op.pdf_name()));
        }
        let gs = self.gstate_ops(setup.gstate);
        let stroke_ops = stroke.map(stroke_ops).unwrap_or_default();
        let ops = format!(
            "q {}{} cm {}{}\n{} {}\nQ",
            gs,
            matrix_ops(&self.state.ctm),
            stroke_ops,
            setup.color_ops,
            path_ops(path),
            paint_op
        );
        self.emit(&ops);

        let grow = stroke.map(|s| s.width / 2.0).unwrap_or(0.0);
        let area = path.bounding_box().map(|b| {
            Rect::new(b.x0 - grow, b.y0 - grow, b.x1 + grow, b.y1 + grow).transform(&self.state.ctm)
        });
        self.track_link_area(area);
    }

    /// Write the current page and start a new one.
    fn emit_page(&mut self) {
        let content = match self.frames.first_mut() {
            Some(frame) => std::mem::take(frame),
            None => String::new(),
        };
        let data = format!(
            "1 0 0 -1 0 {} cm\n{}",
            format_number(self.height),
            content
        );
        let Some(contents) = self.add_stream(BTreeMap::new(), data.as_bytes()) else {
            return;
        };
        let mut page = dict([
            ("Type", PdfObject::name("Page")),
            ("Parent", self.pages_ref.into()),
            ("MediaBox", self.device_box()),
            ("Contents", contents.into()),
            ("Resources", self.resources_ref.into()),
        ]);
        if !self.annots.is_empty() {
            let annots = std::mem::take(&mut self.annots);
            page.insert(
                "Annots".to_string(),
                PdfObject::Array(annots.into_iter().map(PdfObject::from).collect()),
            );
        }
        let page_ref = self.writer.add(PdfObject::Dictionary(page));
        self.page_refs.push(page_ref);
        self.page_dirty = false;
    }

    fn info_dict(&self) -> Option<PdfObject> {
        let metadata = self.metadata.as_ref()?;
        let mut info = BTreeMap::new();
        let text_entries = [
            ("Title", &metadata.title),
            ("Author", &metadata.author),
            ("Subject", &metadata.subject),
            ("Keywords", &metadata.keywords),
            ("Creator", &metadata.creator),
            ("Copyright", &metadata.copyright),
        ];
        for (key, value) in text_entries {
            if let Some(value) = value {
                info.insert(key.to_string(), text_string(value));
            }
        }
        let date_entries = [
            ("CreationDate", &metadata.creation_date),
            ("ModDate", &metadata.modification_date),
        ];
        for (key, value) in date_entries {
            if let Some(date) = value.as_deref().and_then(pdf_date) {
                info.insert(key.to_string(), PdfObject::text(&date));
            }
        }
        if info.is_empty() {
            None
        } else {
            Some(PdfObject::Dictionary(info))
        }
    }

    fn write_output(&mut self) -> RenderResult<()> {
        if self.page_dirty || self.page_refs.is_empty() {
            self.emit_page();
        }

        let resources = std::mem::take(&mut self.resources);
        let mut res_dict = BTreeMap::new();
        for (key, entries) in [
            ("ExtGState", resources.ext_gstates),
            ("XObject", resources.xobjects),
            ("Pattern", resources.patterns),
        ] {
            if !entries.is_empty() {
                res_dict.insert(key.to_string(), PdfObject::Dictionary(entries));
            }
        }
        self.writer
            .set(self.resources_ref, PdfObject::Dictionary(res_dict));

        self.writer.set(
            self.pages_ref,
            PdfObject::Dictionary(dict([
                ("Type", PdfObject::name("Pages")),
                (
                    "Kids",
                    PdfObject::Array(self.page_refs.iter().copied().map(PdfObject::from).collect()),
                ),
                ("Count", PdfObject::Number(self.page_refs.len() as f64)),
            ])),
        );

        let mut catalog = dict([
            ("Type", PdfObject::name("Catalog")),
            ("Pages", self.pages_ref.into()),
        ]);
        if !self.labels.is_empty() {
            let mut nums = Vec::new();
            for (index, label) in &self.labels {
                nums.push(PdfObject::Number(*index as f64));
                nums.push(PdfObject::Dictionary(dict([("P", text_string(label))])));
            }
            catalog.insert(
                "PageLabels".to_string(),
                PdfObject::Dictionary(dict([("Nums", PdfObject::Array(nums))])),
            );
        }
        let catalog = self.writer.add(PdfObject::Dictionary(catalog));
        let info = self.info_dict().map(|info| self.writer.add(info));

        if let Some(message) = &self.error {
            return Err(RenderError::Backend(message.clone()));
        }
        self.writer.write_document(&mut self.out, catalog, info)?;
        self.out.flush()?;
        Ok(())
    }
}

impl Backend for PdfBackend<'_> {
    fn kind(&self) -> TargetKind {
        TargetKind::Vector
    }

    fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    fn save(&mut self) {
        self.state_stack.push(self.state);
        self.state.emitted = true;
        self.emit("q");
    }

    fn restore(&mut self) {
        let emitted = self.state.emitted;
        if let Some(state) = self.state_stack.pop() {
            self.state = state;
            if emitted {
                self.emit("Q");
            }
        }
    }

    fn transform(&self) -> Affine {
        self.state.ctm
    }

    fn set_transform(&mut self, m: &Affine) {
        self.state.ctm = *m;
    }

    fn push_group(&mut self) {
        self.state_stack.push(self.state);
        self.state.emitted = false;
        self.frames.push(String::new());
    }

    fn pop_group_to_source(&mut self) {
        if self.in_form() {
            let content = self.frames.pop().unwrap_or_default();
            self.source = self
                .form_xobject(&content, None)
                .map(|form| self.add_resource(ResourceKind::XObject, form.into()));
        }
        if let Some(state) = self.state_stack.pop() {
            self.state = state;
        }
    }

    fn paint(&mut self, alpha: f64, op: BlendMode) {
        let Some(source) = self.source.take() else {
            return;
        };
        let mut gstate = BTreeMap::new();
        if alpha < 1.0 {
            gstate.insert("ca".to_string(), PdfObject::Number(alpha.max(0.0)));
            gstate.insert("CA".to_string(), PdfObject::Number(alpha.max(0.0)));
        }
        if op != BlendMode::Normal {
            gstate.insert("BM".to_string(), PdfObject::name(op.pdf_name()));
        }
        let gs = self.gstate_ops(gstate);
        self.emit(&format!("q {}/{} Do Q", gs, source));
    }

    fn mask(&mut self, mask: &AlphaMask, op: BlendMode) {
        let Some(source) = self.source.take() else {
            return;
        };
        let Some(gray) = self.gray_image(mask.width, mask.height, &mask.data, true) else {
            return;
        };
        let gray_name = self.add_resource(ResourceKind::XObject, gray.into());
        let (w, h) = (
            mask.width as f64 * mask.scale,
            mask.height as f64 * mask.scale,
        );
        let content = format!(
            "q {} 0 0 {} 0 {} cm /{} Do Q",
            format_number(w),
            format_number(-h),
            format_number(h),
            gray_name
        );
        let Some(smask) = self.luminosity_smask(&content) else {
            return;
        };
        let mut gstate = dict([("SMask", smask)]);
        if op != BlendMode::Normal {
            gstate.insert("BM".to_string(), PdfObject::name(op.pdf_name()));
        }
        let gs = self.gstate_ops(gstate);
        self.emit(&format!("q {}/{} Do Q", gs, source));
    }

    fn fill_path(&mut self, path: &Path, rule: FillRule, source: &PaintSource, op: BlendMode) {
        let paint_op = match rule {
            FillRule::NonZero => "f",
            FillRule::EvenOdd => "f*",
        };
        self.draw_path(path, source, op, paint_op, None);
    }

    fn stroke_path(&mut self, path: &Path, stroke: &StrokeProps, source: &PaintSource, op: BlendMode) {
        self.draw_path(path, source, op, "S", Some(stroke));
    }

    fn clip(&mut self, device_path: &Path, rule: FillRule) {
        let clip_op = match rule {
            FillRule::NonZero => "W n",
            FillRule::EvenOdd => "W* n",
        };
        if device_path.is_empty() {
            self.emit(&format!("0 0 0 0 re {}", clip_op));
        } else {
            self.emit(&format!("{}\n{}", path_ops(device_path), clip_op));
        }
    }

    fn draw_image(&mut self, image: &ImageData, filter: ImageFilter, op: BlendMode) {
        let Some(xobject) = self.image_xobject(image, filter == ImageFilter::Smooth) else {
            return;
        };
        let name = self.add_resource(ResourceKind::XObject, xobject.into());
        let mut gstate = BTreeMap::new();
        if op != BlendMode::Normal {
            gstate.insert("BM".to_string(), PdfObject::name(op.pdf_name()));
        }
        let gs = self.gstate_ops(gstate);
        let (w, h) = (image.width as f64, image.height as f64);
        let placement = self.state.ctm.concat(&Affine::new(w, 0.0, 0.0, -h, 0.0, h));
        self.emit(&format!("q {}{} cm /{} Do Q", gs, matrix_ops(&placement), name));
        let area = Rect::from_xywh(0.0, 0.0, w, h).transform(&self.state.ctm);
        self.track_link_area(Some(area));
    }

    fn resize(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
    }

    fn set_page_label(&mut self, label: &str) {
        self.labels.push((self.page_refs.len(), label.to_string()));
    }

    fn show_page(&mut self) {
        // Groups left open by a failed layer are dropped
        self.frames.truncate(1);
        self.emit_page();
    }

    fn set_metadata(&mut self, metadata: &Metadata) {
        self.metadata = Some(metadata.clone());
    }

    fn tag_begin_link(&mut self, href: &str) {
        self.link = Some((href.to_string(), None));
    }

    fn tag_end_link(&mut self) {
        let Some((href, Some(area))) = self.link.take() else {
            return;
        };
        // Annotation rectangles are in unflipped page space
        let rect = area.transform(&self.page_flip());
        let annot = dict([
            ("Type", PdfObject::name("Annot")),
            ("Subtype", PdfObject::name("Link")),
            ("Rect", PdfObject::numbers(&[rect.x0, rect.y0, rect.x1, rect.y1])),
            ("Border", PdfObject::numbers(&[0.0, 0.0, 0.0])),
            (
                "A",
                PdfObject::Dictionary(dict([
                    ("S", PdfObject::name("URI")),
                    ("URI", PdfObject::text(&href)),
                ])),
            ),
        ]);
        let annot = self.writer.add(PdfObject::Dictionary(annot));
        self.annots.push(annot);
    }

    fn status(&self) -> RenderResult<()> {
        match &self.error {
            Some(message) => Err(RenderError::Backend(message.clone())),
            None => Ok(()),
        }
    }

    fn finish(&mut self) -> RenderResult<()> {
        if self.finished {
            return self.status();
        }
        self.finished = true;
        self.write_output()
    }
}

fn matrix_ops(m: &Affine) -> String {
    m.0.iter()
        .map(|v| format_number(*v))
        .collect::<Vec<_>>()
        .join(" ")
}

fn pattern_color_ops(name: &str, stroke: bool) -> String {
    if stroke {
        format!("/Pattern CS /{} SCN", name)
    } else {
        format!("/Pattern cs /{} scn", name)
    }
}

fn stroke_ops(stroke: &StrokeProps) -> String {
    let cap = match stroke.line_cap {
        LineCap::Butt => 0,
        LineCap::Round => 1,
        LineCap::Square => 2,
    };
    let join = match stroke.line_join {
        LineJoin::Miter => 0,
        LineJoin::Round => 1,
        LineJoin::Bevel => 2,
    };
    let width = if stroke.hairline { 0.0 } else { stroke.width };
    let dashes = stroke
        .dash_array
        .iter()
        .map(|d| format_number(*d))
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "{} w {} J {} j {} M [{}] {} d ",
        format_number(width),
        cap,
        join,
        format_number(stroke.miter_limit.max(1.0)),
        dashes,
        format_number(stroke.dash_offset)
    )
}

/// Path construction operators. Quadratic segments are raised to cubics.
fn path_ops(path: &Path) -> String {
    let mut ops = Vec::with_capacity(path.len());
    let mut current = (0.0, 0.0);
    let mut start = (0.0, 0.0);
    let n = format_number;
    for el in path.elements() {
        match *el {
            PathElement::MoveTo(x, y) => {
                ops.push(format!("{} {} m", n(x), n(y)));
                current = (x, y);
                start = (x, y);
            }
            PathElement::LineTo(x, y) => {
                ops.push(format!("{} {} l", n(x), n(y)));
                current = (x, y);
            }
            PathElement::QuadTo(cx, cy, x, y) => {
                let c1 = (
                    current.0 + 2.0 / 3.0 * (cx - current.0),
                    current.1 + 2.0 / 3.0 * (cy - current.1),
                );
                let c2 = (x + 2.0 / 3.0 * (cx - x), y + 2.0 / 3.0 * (cy - y));
                ops.push(format!(
                    "{} {} {} {} {} {} c",
                    n(c1.0),
                    n(c1.1),
                    n(c2.0),
                    n(c2.1),
                    n(x),
                    n(y)
                ));
                current = (x, y);
            }
            PathElement::CurveTo(c1x, c1y, c2x, c2y, x, y) => {
                ops.push(format!(
                    "{} {} {} {} {} {} c",
                    n(c1x),
                    n(c1y),
                    n(c2x),
                    n(c2y),
                    n(x),
                    n(y)
                ));
                current = (x, y);
            }
            PathElement::ClosePath => {
                ops.push("h".to_string());
                current = start;
            }
        }
    }
    ops.join(" ")
}

/// Interpolation function over gradient stops, stitched when more than two.
fn stop_function(stops: &[ColorStop], values: impl Fn(&ColorStop) -> Vec<f64>) -> Option<PdfObject> {
    let first = stops.first()?;
    let last = stops.last()?;
    let mut points: Vec<(f64, Vec<f64>)> = Vec::with_capacity(stops.len() + 2);
    if first.offset > 0.0 {
        points.push((0.0, values(first)));
    }
    let mut previous = 0.0_f64;
    for stop in stops {
        let offset = stop.offset.clamp(previous, 1.0);
        points.push((offset, values(stop)));
        previous = offset;
    }
    if last.offset < 1.0 {
        points.push((1.0, values(last)));
    }
    if points.len() == 1 {
        points.push((1.0, points[0].1.clone()));
    }

    let segment = |a: &[f64], b: &[f64]| {
        PdfObject::Dictionary(dict([
            ("FunctionType", PdfObject::Number(2.0)),
            ("Domain", PdfObject::numbers(&[0.0, 1.0])),
            ("C0", PdfObject::numbers(a)),
            ("C1", PdfObject::numbers(b)),
            ("N", PdfObject::Number(1.0)),
        ]))
    };
    if points.len() == 2 {
        return Some(segment(&points[0].1, &points[1].1));
    }
    let functions = points
        .windows(2)
        .map(|w| segment(&w[0].1, &w[1].1))
        .collect();
    let bounds: Vec<f64> = points[1..points.len() - 1].iter().map(|p| p.0).collect();
    let encode: Vec<f64> = (0..points.len() - 1).flat_map(|_| [0.0, 1.0]).collect();
    Some(PdfObject::Dictionary(dict([
        ("FunctionType", PdfObject::Number(3.0)),
        ("Domain", PdfObject::numbers(&[0.0, 1.0])),
        ("Functions", PdfObject::Array(functions)),
        ("Bounds", PdfObject::numbers(&bounds)),
        ("Encode", PdfObject::numbers(&encode)),
    ])))
}

/// Convert a date string to PDF date syntax `D:YYYYMMDDHHmmSS`.
///
/// Accepts values already in PDF syntax or ISO 8601 style strings; only the
/// digits are kept.
pub fn pdf_date(value: &str) -> Option<String> {
    if value.starts_with("D:") {
        return Some(value.to_string());
    }
    let digits: String = value
        .chars()
        .take_while(|c| *c != '+' && *c != 'Z')
        .filter(|c| c.is_ascii_digit())
        .take(14)
        .collect();
    if digits.len() < 4 {
        return None;
    }
    Some(format!("D:{}", digits))
}

/// PDF date for a Unix timestamp, in UTC.
pub fn pdf_date_from_epoch(secs: i64) -> String {
    let days = secs.div_euclid(86_400);
    let rem = secs.rem_euclid(86_400);
    // Civil date from days since 1970-01-01
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };
    format!(
        "D:{:04}{:02}{:02}{:02}{:02}{:02}Z",
        year,
        month,
        day,
        rem / 3600,
        rem % 3600 / 60,
        rem % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::style::Color;
    use smallvec::smallvec;

    fn render(f: impl FnOnce(&mut PdfBackend)) -> String {
        let mut out = Vec::new();
        {
            let mut backend = PdfBackend::new(Box::new(&mut out), 100.0, 50.0).with_compression(false);
            f(&mut backend);
            backend.finish().unwrap();
        }
        String::from_utf8_lossy(&out).into_owned()
    }

    fn square() -> Path {
        let mut p = Path::new();
        p.rect(0.0, 0.0, 10.0, 10.0);
        p
    }

    #[test]
    fn test_empty_document_has_one_page() {
        let pdf = render(|_| {});
        assert!(pdf.starts_with("%PDF-1.7"));
        assert!(pdf.contains("/Count 1"));
        assert!(pdf.contains("/MediaBox [0 0 100 50]"));
        assert!(pdf.contains("1 0 0 -1 0 50 cm"));
    }

    #[test]
    fn test_fill_uses_ctm() {
        let pdf = render(|b| {
            b.set_transform(&Affine::scale(0.75, 0.75));
            b.fill_path(
                &square(),
                FillRule::EvenOdd,
                &PaintSource::solid(Color::red(), 1.0),
                BlendMode::Normal,
            );
        });
        assert!(pdf.contains("q 0.75 0 0 0.75 0 0 cm 1 0 0 rg\n0 0 m 10 0 l 10 10 l 0 10 l h f*\nQ"));
    }

    #[test]
    fn test_translucent_fill_uses_ext_gstate() {
        let pdf = render(|b| {
            b.fill_path(
                &square(),
                FillRule::NonZero,
                &PaintSource::solid(Color::blue(), 0.5),
                BlendMode::Multiply,
            );
        });
        assert!(pdf.contains("/G1 gs"));
        assert!(pdf.contains("/BM /Multiply"));
        assert!(pdf.contains("/ca 0.5"));
    }

    #[test]
    fn test_group_becomes_form() {
        let pdf = render(|b| {
            b.push_group();
            b.fill_path(
                &square(),
                FillRule::NonZero,
                &PaintSource::solid(Color::green(), 1.0),
                BlendMode::Normal,
            );
            b.pop_group_to_source();
            b.paint(0.25, BlendMode::Normal);
        });
        assert!(pdf.contains("/Subtype /Form"));
        assert!(pdf.contains("/S /Transparency"));
        assert!(pdf.contains("q /G1 gs /X1 Do Q"));
        assert!(pdf.contains("/CA 0.25"));
    }

    #[test]
    fn test_mask_is_luminosity_smask() {
        let pdf = render(|b| {
            b.push_group();
            b.pop_group_to_source();
            let mask = AlphaMask {
                width: 2,
                height: 2,
                data: vec![255, 0, 0, 255],
                scale: 0.75,
            };
            b.mask(&mask, BlendMode::Normal);
        });
        assert!(pdf.contains("/S /Luminosity"));
        assert!(pdf.contains("/ColorSpace /DeviceGray"));
        assert!(pdf.contains("1.5 0 0 -1.5 0 1.5 cm"));
    }

    #[test]
    fn test_clip_and_restore() {
        let pdf = render(|b| {
            b.save();
            b.clip(&square(), FillRule::NonZero);
            b.restore();
        });
        assert!(pdf.contains("q\n0 0 m 10 0 l 10 10 l 0 10 l h\nW n\nQ"));
    }

    #[test]
    fn test_gradient_shading_pattern() {
        let source = PaintSource::LinearGradient {
            x1: 0.0,
            y1: 0.0,
            x2: 10.0,
            y2: 0.0,
            stops: smallvec![
                ColorStop { offset: 0.0, color: Color::red(), alpha: 1.0 },
                ColorStop { offset: 0.5, color: Color::green(), alpha: 1.0 },
                ColorStop { offset: 1.0, color: Color::blue(), alpha: 1.0 },
            ],
            spread: SpreadMode::Pad,
            matrix: Affine::IDENTITY,
        };
        let pdf = render(|b| b.fill_path(&square(), FillRule::NonZero, &source, BlendMode::Normal));
        assert!(pdf.contains("/Pattern cs /P1 scn"));
        assert!(pdf.contains("/ShadingType 2"));
        assert!(pdf.contains("/FunctionType 3"));
        assert!(pdf.contains("/Bounds [0.5]"));
        assert!(pdf.contains("/Extend [true true]"));
        // Page patterns include the page flip
        assert!(pdf.contains("/Matrix [1 0 0 -1 0 50]"));
    }

    #[test]
    fn test_varying_stop_alpha_uses_soft_mask() {
        let source = PaintSource::RadialGradient {
            fx: 5.0,
            fy: 5.0,
            fr: 0.0,
            cx: 5.0,
            cy: 5.0,
            r: 5.0,
            stops: smallvec![
                ColorStop { offset: 0.0, color: Color::red(), alpha: 1.0 },
                ColorStop { offset: 1.0, color: Color::red(), alpha: 0.0 },
            ],
            spread: SpreadMode::None,
            matrix: Affine::IDENTITY,
        };
        let pdf = render(|b| b.fill_path(&square(), FillRule::NonZero, &source, BlendMode::Normal));
        assert!(pdf.contains("/ShadingType 3"));
        assert!(pdf.contains("/SMask"));
        assert!(pdf.contains("/Sh1 sh"));
        assert!(pdf.contains("/Extend [false false]"));
    }

    #[test]
    fn test_pages_labels_and_metadata() {
        let pdf = render(|b| {
            b.set_page_label("cover");
            b.fill_path(
                &square(),
                FillRule::NonZero,
                &PaintSource::solid(Color::black(), 1.0),
                BlendMode::Normal,
            );
            b.show_page();
            b.resize(200.0, 100.0);
            b.set_page_label("two");
            b.fill_path(
                &square(),
                FillRule::NonZero,
                &PaintSource::solid(Color::black(), 1.0),
                BlendMode::Normal,
            );
            b.set_metadata(&Metadata {
                title: Some("Scene".to_string()),
                creation_date: Some("2024-05-06T07:08:09".to_string()),
                ..Metadata::default()
            });
        });
        assert!(pdf.contains("/Count 2"));
        assert!(pdf.contains("/MediaBox [0 0 200 100]"));
        assert!(pdf.contains("/Nums [0 <</P (cover) >> 1 <</P (two) >>]"));
        assert!(pdf.contains("/Title (Scene)"));
        assert!(pdf.contains("/CreationDate (D:20240506070809)"));
    }

    #[test]
    fn test_link_annotation_rect() {
        let pdf = render(|b| {
            b.tag_begin_link("https://example.com");
            b.fill_path(
                &square(),
                FillRule::NonZero,
                &PaintSource::solid(Color::black(), 1.0),
                BlendMode::Normal,
            );
            b.tag_end_link();
        });
        assert!(pdf.contains("/Subtype /Link"));
        assert!(pdf.contains("/Rect [0 40 10 50]"));
        assert!(pdf.contains("/URI (https://example.com)"));
        assert!(pdf.contains("/Annots ["));
    }

    #[test]
    fn test_pdf_dates() {
        assert_eq!(pdf_date("D:2020"), Some("D:2020".to_string()));
        assert_eq!(pdf_date("1999-12-31"), Some("D:19991231".to_string()));
        assert_eq!(pdf_date("soon"), None);
        assert_eq!(pdf_date_from_epoch(0), "D:19700101000000Z");
        assert_eq!(pdf_date_from_epoch(951_782_400), "D:20000229000000Z");
    }
}
