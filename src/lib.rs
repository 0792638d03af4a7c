//! Scene loading and one-call rendering on top of `vgr-core`.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};
use vgr_core::rendering::encode_png;
use vgr_core::{Document, FontFace, ImageData, Renderer};

pub use vgr_core;

/// Output file kinds the renderer can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Pdf,
}

impl OutputFormat {
    /// Guess the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(OutputFormat::Png),
            "pdf" => Some(OutputFormat::Pdf),
            _ => None,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "png" => Some(OutputFormat::Png),
            "pdf" => Some(OutputFormat::Pdf),
            _ => None,
        }
    }
}

/// Read a JSON scene and load the fonts and images it references.
///
/// Relative resource paths are resolved against the scene's directory.
/// Images that cannot be decoded are left out and skipped when drawn.
pub fn load_document(path: &Path) -> Result<Document> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read scene {}", path.display()))?;
    let mut doc = Document::from_json(&text)
        .with_context(|| format!("invalid scene {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    let fonts: Vec<(String, String)> = doc
        .font_files
        .iter()
        .map(|(id, file)| (id.clone(), file.clone()))
        .collect();
    for (id, file) in fonts {
        let font_path = resolve(base, &file);
        let data = std::fs::read(&font_path)
            .with_context(|| format!("failed to read font {}", font_path.display()))?;
        let face = FontFace::from_data(data, 0)
            .with_context(|| format!("failed to parse font {}", font_path.display()))?;
        debug!(id = %id, glyphs = face.glyph_count(), "font loaded");
        doc.add_font(id, Rc::new(face));
    }

    for href in doc.image_hrefs() {
        if doc.images.contains_key(&href) {
            continue;
        }
        match load_image(&resolve(base, &href)) {
            Ok(image) => doc.insert_image(href, image),
            Err(e) => warn!(href = %href, error = %e, "image not loaded"),
        }
    }
    Ok(doc)
}

fn resolve(base: &Path, file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Decode an image file into premultiplied pixels.
pub fn load_image(path: &Path) -> Result<ImageData> {
    let decoded = image::open(path)
        .with_context(|| format!("failed to decode {}", path.display()))?
        .to_rgba8();
    let (width, height) = decoded.dimensions();
    Ok(ImageData::from_rgba(width, height, decoded.into_raw())?)
}

/// Render to PNG bytes. With `page`, only that page is drawn and the image
/// takes its size; otherwise the whole document is drawn, ignoring pages.
pub fn render_png(doc: &Document, page: Option<usize>) -> Result<Vec<u8>> {
    let renderer = Renderer::new(doc);
    let mut ctx = renderer.create_context();
    let stretch = renderer.config().stretch_to_fit;

    match page {
        Some(index) => {
            let Some(page) = doc.pages.get(index) else {
                bail!("page {} out of range, document has {}", index + 1, doc.pages.len());
            };
            if !renderer.setup_page(&mut ctx, page, stretch) {
                bail!("could not create a surface for page {}", index + 1);
            }
            ctx.push_state();
            let ok = renderer.render_page(&mut ctx, page, stretch);
            ctx.pop_state();
            if !ok {
                bail!("rendering page {} failed", index + 1);
            }
        }
        None => {
            if !renderer.setup_document(&mut ctx, None) {
                bail!("could not create a {}x{} surface", doc.width, doc.height);
            }
            renderer.render_item(&mut ctx, &doc.root, None, None);
        }
    }

    ctx.finish()?;
    let image = ctx.snapshot().context("raster surface has no pixels")?;
    info!(width = image.width, height = image.height, "rendered raster");
    Ok(encode_png(&image)?)
}

/// Render every page to PDF bytes.
pub fn render_pdf(doc: &Document) -> Result<Vec<u8>> {
    let renderer = Renderer::new(doc);
    let stretch = renderer.config().stretch_to_fit;
    let mut out = Vec::new();
    {
        let mut ctx = renderer.create_context();
        ctx.set_vector_target(&mut out);
        if !renderer.setup_document(&mut ctx, None) {
            bail!("could not create a {}x{} document", doc.width, doc.height);
        }
        if !renderer.render_pages(&mut ctx, stretch) {
            bail!("rendering failed");
        }
        ctx.finish()?;
    }
    info!(bytes = out.len(), pages = doc.pages.len().max(1), "rendered pdf");
    Ok(out)
}
