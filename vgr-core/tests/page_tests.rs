//! Paginated PDF output, page selection for raster output and document
//! metadata.


use test_utils::*;
use vgr_core::core::*;
use vgr_core::rendering::{PageSequencer, RecordingBackend, Renderer, TargetKind};

/// Two 50x50 pages side by side: blue content on the first, red on the
/// second.
fn two_page_scene() -> Document {
    let mut doc = scene(
        100.0,
        50.0,
        vec![
            filled_rect(10.0, 10.0, 30.0, 30.0, Color::blue()),
            filled_rect(60.0, 10.0, 30.0, 30.0, Color::red()),
        ],
    );
    doc.pages = vec![
        Page {
            bleed: Rect::from_xywh(0.0, 0.0, 50.0, 50.0),
            label: Some("front".to_string()),
        },
        Page {
            bleed: Rect::from_xywh(50.0, 0.0, 50.0, 50.0),
            label: Some("back".to_string()),
        },
    ];
    doc
}

#[test]
fn test_pdf_has_one_page_per_descriptor() {
    let pdf = pdf_text(&render_pdf(&two_page_scene()));
    assert!(pdf.contains("/Count 2"));
    // 50 user units are 37.5pt, rounded out to whole points
    assert!(pdf.contains("/MediaBox [0 0 38 38]"));
    assert!(pdf.contains("(front)"));
    assert!(pdf.contains("(back)"));
}

#[test]
fn test_pages_skip_items_outside_them() {
    let doc = two_page_scene();
    let renderer = Renderer::new(&doc);
    let backend = RecordingBackend::new(TargetKind::Vector, 75.0, 37.5);
    let log = backend.log();
    let mut ctx = renderer.create_context();
    assert!(ctx.set_surface_target(Box::new(backend), true));
    assert!(renderer.render_pages(&mut ctx, false));

    let ops = log.borrow();
    let pages: Vec<Vec<&String>> = ops
        .split(|op| op == "show_page")
        .map(|page| page.iter().filter(|op| op.starts_with("fill_path")).collect())
        .collect();
    // One fill per page, then the trailing slice after the last page
    assert_eq!(pages.len(), 3);
    assert_eq!(pages[0].len(), 1);
    assert_eq!(pages[1].len(), 1);
    assert!(pages[2].is_empty());
}

#[test]
fn test_raster_renders_first_page_only() {
    let image = render_raster(&two_page_scene());
    assert_eq!((image.width, image.height), (100, 50));
    assert_pixel(&image, 20, 20, [0, 0, 255, 255]);
    assert_pixel(&image, 70, 20, CLEAR);
}

#[test]
fn test_page_surface_for_single_page() {
    let doc = two_page_scene();
    let renderer = Renderer::new(&doc);
    let mut ctx = renderer.create_context();
    assert!(renderer.setup_page(&mut ctx, &doc.pages[0], false));
    assert_eq!(ctx.size(), (50.0, 50.0));
}

#[test]
fn test_document_scale_maps_pages() {
    let mut doc = two_page_scene();
    doc.document_scale = 2.0;
    let sequencer = PageSequencer::new(doc.document_scale, false);
    let geometry = sequencer.geometry(&doc.pages[1], 1.0);
    assert_eq!(geometry.user_rect, Rect::from_xywh(25.0, 0.0, 25.0, 25.0));
    assert_eq!(geometry.rounded, Rect::from_xywh(50.0, 0.0, 50.0, 50.0));
}

#[test]
fn test_empty_page_fails_render() {
    let mut doc = two_page_scene();
    doc.pages[1].bleed = Rect::from_xywh(50.0, 0.0, 0.0, 50.0);
    let renderer = Renderer::new(&doc);
    let backend = RecordingBackend::new(TargetKind::Vector, 10.0, 10.0);
    let mut ctx = renderer.create_context();
    assert!(ctx.set_surface_target(Box::new(backend), true));
    assert!(!renderer.render_pages(&mut ctx, false));
    assert_eq!(ctx.state_depth(), 0);
}

#[test]
fn test_metadata_and_creator() {
    let mut doc = scene(10.0, 10.0, Vec::new());
    doc.metadata.title = Some("Poster".to_string());
    doc.metadata.author = Some("Studio".to_string());
    let pdf = pdf_text(&render_pdf(&doc));
    assert!(pdf.contains("/Title (Poster)"));
    assert!(pdf.contains("/Author (Studio)"));
    assert!(pdf.contains("/Creator (vgr "));
}

#[test]
fn test_anchor_becomes_link() {
    let link = Item::new(ItemKind::Anchor {
        href: "https://example.com/a".to_string(),
        children: vec![filled_rect(0.0, 0.0, 10.0, 10.0, Color::blue())],
    });
    let pdf = pdf_text(&render_pdf(&scene(20.0, 20.0, vec![link])));
    assert!(pdf.contains("/Subtype /Link"));
    assert!(pdf.contains("/URI (https://example.com/a)"));
}

#[test]
fn test_finish_without_surface_errors() {
    let doc = scene(10.0, 10.0, Vec::new());
    let renderer = Renderer::new(&doc);
    let mut ctx = renderer.create_context();
    assert!(matches!(ctx.finish(), Err(RenderError::NoSurface)));
}
