//! End-to-end tests: scene files on disk through the library and the
//! `vgr-render` binary.

use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::TempDir;
use vgr::{OutputFormat, load_document, render_pdf, render_png};

const SCENE: &str = r##"{
    "width": 40,
    "height": 20,
    "metadata": {"title": "Sample"},
    "root": {
        "type": "group",
        "children": [
            {"type": "rect", "x": 0, "y": 0, "width": 20, "height": 20,
             "style": {"fill": "#ff0000"}},
            {"type": "image", "href": "pixel.png", "x": 20, "y": 0, "width": 20, "height": 20}
        ]
    },
    "pages": [
        {"bleed": {"x": 0, "y": 0, "width": 20, "height": 20}, "label": "left"},
        {"bleed": {"x": 20, "y": 0, "width": 20, "height": 20}, "label": "right"}
    ]
}"##;

/// Write the sample scene and a 1x1 blue PNG next to it.
fn write_scene(dir: &Path) -> std::path::PathBuf {
    let pixel = image::RgbaImage::from_pixel(1, 1, image::Rgba([0, 0, 255, 255]));
    pixel.save(dir.join("pixel.png")).unwrap();
    let scene = dir.join("scene.json");
    fs::write(&scene, SCENE).unwrap();
    scene
}

#[test]
fn test_load_resolves_images() {
    let dir = TempDir::new().unwrap();
    let doc = load_document(&write_scene(dir.path())).unwrap();
    let image = doc.images.get("pixel.png").unwrap();
    assert_eq!((image.width, image.height), (1, 1));
    assert_eq!(image.pixel(0, 0), Some([0, 0, 255, 255]));
}

#[test]
fn test_missing_image_is_not_fatal() {
    let dir = TempDir::new().unwrap();
    let scene = dir.path().join("scene.json");
    fs::write(&scene, SCENE).unwrap();
    let doc = load_document(&scene).unwrap();
    assert!(doc.images.is_empty());
    assert!(render_pdf(&doc).is_ok());
}

#[test]
fn test_png_page_selection() {
    let dir = TempDir::new().unwrap();
    let doc = load_document(&write_scene(dir.path())).unwrap();

    let bytes = render_png(&doc, Some(1)).unwrap();
    let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
    assert_eq!(decoded.dimensions(), (20, 20));
    assert_eq!(decoded.get_pixel(10, 10).0, [0, 0, 255, 255]);

    assert!(render_png(&doc, Some(5)).is_err());
}

#[test]
fn test_png_without_page_draws_whole_document() {
    let dir = TempDir::new().unwrap();
    let doc = load_document(&write_scene(dir.path())).unwrap();

    let bytes = render_png(&doc, None).unwrap();
    let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
    assert_eq!(decoded.dimensions(), (40, 20));
    assert_eq!(decoded.get_pixel(10, 10).0, [255, 0, 0, 255]);
    // Content on the second page is kept
    assert_eq!(decoded.get_pixel(30, 10).0, [0, 0, 255, 255]);
}

#[test]
fn test_pdf_bytes() {
    let dir = TempDir::new().unwrap();
    let doc = load_document(&write_scene(dir.path())).unwrap();
    let pdf = render_pdf(&doc).unwrap();
    assert!(pdf.starts_with(b"%PDF"));
    assert!(pdf.ends_with(b"%%EOF\n") || pdf.ends_with(b"%%EOF"));
}

#[test]
fn test_binary_writes_png() {
    let dir = TempDir::new().unwrap();
    let scene = write_scene(dir.path());
    let out = dir.path().join("out.png");
    let status = Command::new(env!("CARGO_BIN_EXE_vgr-render"))
        .arg(&scene)
        .arg("-o")
        .arg(&out)
        .args(["--dpi", "192", "--background", "white"])
        .status()
        .unwrap();
    assert!(status.success());

    let decoded = image::open(&out).unwrap().to_rgba8();
    assert_eq!(decoded.dimensions(), (80, 40));
    assert_eq!(decoded.get_pixel(10, 10).0, [255, 0, 0, 255]);
}

#[test]
fn test_binary_rejects_bad_arguments() {
    let dir = TempDir::new().unwrap();
    let scene = write_scene(dir.path());

    let no_output = Command::new(env!("CARGO_BIN_EXE_vgr-render"))
        .arg(&scene)
        .output()
        .unwrap();
    assert!(!no_output.status.success());
    assert!(String::from_utf8_lossy(&no_output.stderr).contains("-o"));

    let unknown = Command::new(env!("CARGO_BIN_EXE_vgr-render"))
        .arg(&scene)
        .args(["-o", "out.svg"])
        .output()
        .unwrap();
    assert!(!unknown.status.success());
    assert_eq!(OutputFormat::from_path(Path::new("out.svg")), None);
}
