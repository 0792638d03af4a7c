//! Backend trait for output surface abstraction.
//!
//! A [`Backend`] owns one output surface, either a pixel buffer or a
//! paginated vector stream, and exposes cairo-like drawing primitives: a
//! current transform and clip under save/restore, off-screen groups that
//! become the paint source when popped, and fill/stroke/paint/mask calls.

use std::cell::RefCell;
use std::rc::Rc;

use crate::core::document::{ImageData, Metadata};
use crate::core::error::RenderResult;
use crate::core::geom::Affine;
use crate::core::path::Path;
use crate::core::style::{BlendMode, FillRule, StrokeProps};
use crate::rendering::paint::PaintSource;

/// Kind of output surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// Pixel buffer
    Raster,
    /// Page-structured vector stream
    Vector,
}

/// Image sampling filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFilter {
    Nearest,
    Smooth,
}

/// An alpha-only bitmap in device space.
///
/// Mask pixel `(i, j)` covers the device square starting at
/// `(i * scale, j * scale)`.
#[derive(Debug, Clone, PartialEq)]
pub struct AlphaMask {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub scale: f64,
}

impl AlphaMask {
    /// Alpha covering device pixel (x, y); zero outside the mask.
    pub fn sample(&self, x: u32, y: u32) -> u8 {
        let mx = ((x as f64 + 0.5) / self.scale).floor();
        let my = ((y as f64 + 0.5) / self.scale).floor();
        if mx < 0.0 || my < 0.0 || mx >= self.width as f64 || my >= self.height as f64 {
            return 0;
        }
        self.data[my as usize * self.width as usize + mx as usize]
    }

    /// Multiply by another mask, sampling it at this mask's pixel centers.
    pub fn intersect(&mut self, other: &AlphaMask) {
        for j in 0..self.height {
            for i in 0..self.width {
                let dx = ((i as f64 + 0.5) * self.scale) as u32;
                let dy = ((j as f64 + 0.5) * self.scale) as u32;
                let idx = j as usize * self.width as usize + i as usize;
                let a = self.data[idx] as u32 * other.sample(dx, dy) as u32;
                self.data[idx] = ((a + 127) / 255) as u8;
            }
        }
    }
}

/// An output surface that can draw paths, images and composited groups.
///
/// Paths passed to fill, stroke and image calls are in user space and go
/// through the current transform. Clip paths are already in device space.
pub trait Backend {
    fn kind(&self) -> TargetKind;

    /// Surface size in device units.
    fn size(&self) -> (f64, f64);

    /// Save transform and clip.
    fn save(&mut self);

    /// Restore transform and clip.
    fn restore(&mut self);

    fn transform(&self) -> Affine;

    fn set_transform(&mut self, m: &Affine);

    /// Redirect drawing to a transparent off-screen group; implies a save.
    fn push_group(&mut self);

    /// End the innermost group and make it the paint source; implies a restore.
    fn pop_group_to_source(&mut self);

    /// Composite the paint source under the current clip.
    fn paint(&mut self, alpha: f64, op: BlendMode);

    /// Composite the paint source through an alpha mask.
    fn mask(&mut self, mask: &AlphaMask, op: BlendMode);

    fn fill_path(&mut self, path: &Path, rule: FillRule, paint: &PaintSource, op: BlendMode);

    fn stroke_path(&mut self, path: &Path, stroke: &StrokeProps, paint: &PaintSource, op: BlendMode);

    /// Intersect the clip with a device-space path.
    fn clip(&mut self, device_path: &Path, rule: FillRule);

    /// Draw `image` into the user-space rectangle `(0, 0, width, height)`.
    fn draw_image(&mut self, image: &ImageData, filter: ImageFilter, op: BlendMode);

    /// Change the size of the next page.
    fn resize(&mut self, _width: f64, _height: f64) {}

    fn set_page_label(&mut self, _label: &str) {}

    /// Emit the current page.
    fn show_page(&mut self) {}

    fn set_metadata(&mut self, _metadata: &Metadata) {}

    /// Start a hyperlink region; drawing until `tag_end_link` is the link area.
    fn tag_begin_link(&mut self, _href: &str) {}

    fn tag_end_link(&mut self) {}

    /// Error state accumulated by earlier calls.
    fn status(&self) -> RenderResult<()> {
        Ok(())
    }

    /// Flush all output.
    fn finish(&mut self) -> RenderResult<()> {
        Ok(())
    }

    /// Current pixels, premultiplied RGBA, for raster targets.
    fn snapshot(&self) -> Option<ImageData> {
        None
    }
}

/// Shared handle to a [`RecordingBackend`]'s operation log.
pub type OperationLog = Rc<RefCell<Vec<String>>>;

/// A backend that records operations as strings and draws nothing.
///
/// Useful for testing call sequences and save/restore balance.
#[derive(Debug)]
pub struct RecordingBackend {
    kind: TargetKind,
    width: f64,
    height: f64,
    transform_stack: Vec<Affine>,
    ctm: Affine,
    operations: OperationLog,
}

impl RecordingBackend {
    pub fn new(kind: TargetKind, width: f64, height: f64) -> Self {
        RecordingBackend {
            kind,
            width,
            height,
            transform_stack: Vec::new(),
            ctm: Affine::IDENTITY,
            operations: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Handle that stays readable after the backend is moved into a context.
    pub fn log(&self) -> OperationLog {
        Rc::clone(&self.operations)
    }

    fn record(&self, op: String) {
        self.operations.borrow_mut().push(op);
    }
}

impl Backend for RecordingBackend {
    fn kind(&self) -> TargetKind {
        self.kind
    }

    fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    fn save(&mut self) {
        self.transform_stack.push(self.ctm);
        self.record("save".to_string());
    }

    fn restore(&mut self) {
        if let Some(ctm) = self.transform_stack.pop() {
            self.ctm = ctm;
        }
        self.record("restore".to_string());
    }

    fn transform(&self) -> Affine {
        self.ctm
    }

    fn set_transform(&mut self, m: &Affine) {
        self.ctm = *m;
        self.record(format!("set_transform({:?})", m.0));
    }

    fn push_group(&mut self) {
        self.transform_stack.push(self.ctm);
        self.record("push_group".to_string());
    }

    fn pop_group_to_source(&mut self) {
        if let Some(ctm) = self.transform_stack.pop() {
            self.ctm = ctm;
        }
        self.record("pop_group_to_source".to_string());
    }

    fn paint(&mut self, alpha: f64, op: BlendMode) {
        self.record(format!("paint({}, {:?})", alpha, op));
    }

    fn mask(&mut self, mask: &AlphaMask, op: BlendMode) {
        self.record(format!("mask({}x{}, {:?})", mask.width, mask.height, op));
    }

    fn fill_path(&mut self, _path: &Path, rule: FillRule, paint: &PaintSource, _op: BlendMode) {
        self.record(format!("fill_path({:?}, {})", rule, paint.kind_name()));
    }

    fn stroke_path(
        &mut self,
        _path: &Path,
        _stroke: &StrokeProps,
        paint: &PaintSource,
        _op: BlendMode,
    ) {
        self.record(format!("stroke_path({})", paint.kind_name()));
    }

    fn clip(&mut self, _device_path: &Path, rule: FillRule) {
        self.record(format!("clip({:?})", rule));
    }

    fn draw_image(&mut self, image: &ImageData, filter: ImageFilter, op: BlendMode) {
        self.record(format!(
            "draw_image({}x{}, {:?}, {:?})",
            image.width, image.height, filter, op
        ));
    }

    fn resize(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
        self.record(format!("resize({},{})", width, height));
    }

    fn set_page_label(&mut self, label: &str) {
        self.record(format!("page_label({})", label));
    }

    fn show_page(&mut self) {
        self.record("show_page".to_string());
    }

    fn set_metadata(&mut self, metadata: &Metadata) {
        self.record(format!(
            "metadata({})",
            metadata.title.as_deref().unwrap_or_default()
        ));
    }

    fn tag_begin_link(&mut self, href: &str) {
        self.record(format!("tag_begin({})", href));
    }

    fn tag_end_link(&mut self) {
        self.record("tag_end".to_string());
    }

    fn finish(&mut self) -> RenderResult<()> {
        self.record("finish".to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_operations() {
        let mut backend = RecordingBackend::new(TargetKind::Vector, 100.0, 100.0);
        let log = backend.log();

        let mut path = Path::new();
        path.rect(0.0, 0.0, 10.0, 10.0);
        backend.save();
        backend.fill_path(
            &path,
            FillRule::EvenOdd,
            &PaintSource::solid(crate::core::style::Color::red(), 1.0),
            BlendMode::Normal,
        );
        backend.restore();

        let ops = log.borrow();
        assert_eq!(ops[0], "save");
        assert_eq!(ops[1], "fill_path(EvenOdd, solid)");
        assert_eq!(ops[2], "restore");
    }

    #[test]
    fn test_state_save_restore() {
        let mut backend = RecordingBackend::new(TargetKind::Raster, 10.0, 10.0);
        backend.save();
        backend.set_transform(&Affine::scale(2.0, 2.0));
        backend.restore();
        assert_eq!(backend.transform(), Affine::IDENTITY);

        backend.push_group();
        backend.set_transform(&Affine::scale(3.0, 3.0));
        backend.pop_group_to_source();
        assert_eq!(backend.transform(), Affine::IDENTITY);
    }

    #[test]
    fn test_alpha_mask_sampling() {
        let mask = AlphaMask {
            width: 2,
            height: 1,
            data: vec![255, 0],
            scale: 2.0,
        };
        assert_eq!(mask.sample(0, 0), 255);
        assert_eq!(mask.sample(1, 1), 255);
        assert_eq!(mask.sample(2, 0), 0);
        assert_eq!(mask.sample(10, 0), 0);
    }

    #[test]
    fn test_alpha_mask_intersect() {
        let mut a = AlphaMask {
            width: 2,
            height: 1,
            data: vec![255, 255],
            scale: 1.0,
        };
        let b = AlphaMask {
            width: 2,
            height: 1,
            data: vec![128, 0],
            scale: 1.0,
        };
        a.intersect(&b);
        assert_eq!(a.data, vec![128, 0]);
    }
}
