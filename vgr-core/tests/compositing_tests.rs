//! Group opacity, blend modes, clip paths and masks on raster and vector
//! targets.


use test_utils::*;
use vgr_core::core::*;
use vgr_core::rendering::{RecordingBackend, Renderer, TargetKind};

fn clip_def(units: Units, children: Vec<Item>) -> ClipPathDef {
    ClipPathDef { units, children }
}

fn with_clip(mut item: Item, id: &str) -> Item {
    item.clip_path = Some(id.to_string());
    item
}

fn with_mask(mut item: Item, id: &str) -> Item {
    item.mask = Some(id.to_string());
    item
}

#[test]
fn test_group_opacity_composites_once() {
    let mut group = Item::group(vec![
        filled_rect(0.0, 0.0, 30.0, 30.0, Color::red()),
        filled_rect(10.0, 10.0, 30.0, 30.0, Color::red()),
    ]);
    group.style.opacity = 0.5;
    let image = render_raster(&scene(40.0, 40.0, vec![group]));

    // The overlap is no more opaque than either rectangle alone
    let overlap = alpha(&image, 20, 20);
    let single = alpha(&image, 5, 5);
    assert!(near(overlap, 128, 2), "overlap alpha {}", overlap);
    assert_eq!(overlap, single);
    assert_eq!(alpha(&image, 35, 5), 0);
}

#[test]
fn test_item_opacity_multiplies_fill_opacity() {
    let mut rect = filled_rect(0.0, 0.0, 10.0, 10.0, Color::red());
    rect.style.opacity = 0.5;
    rect.style.fill_opacity = 0.5;
    let image = render_raster(&scene(10.0, 10.0, vec![rect]));
    assert!(near(alpha(&image, 5, 5), 64, 2));
}

#[test]
fn test_multiply_blend_group() {
    let mut overlay = Item::group(vec![filled_rect(0.0, 0.0, 20.0, 20.0, Color::blue())]);
    overlay.style.blend_mode = BlendMode::Multiply;
    let doc = scene(
        20.0,
        20.0,
        vec![filled_rect(0.0, 0.0, 20.0, 10.0, Color::red()), overlay],
    );
    let image = render_raster(&doc);
    // Red times blue is black where both exist
    assert_pixel(&image, 10, 5, [0, 0, 0, 255]);
    assert_pixel(&image, 10, 15, [0, 0, 255, 255]);
}

#[test]
fn test_user_space_clip_path() {
    let mut doc = scene(
        50.0,
        50.0,
        vec![with_clip(filled_rect(0.0, 0.0, 50.0, 50.0, Color::red()), "half")],
    );
    doc.clip_paths.insert(
        "half".to_string(),
        clip_def(
            Units::UserSpaceOnUse,
            vec![filled_rect(0.0, 0.0, 25.0, 50.0, Color::black())],
        ),
    );
    let image = render_raster(&doc);
    assert_pixel(&image, 10, 10, RED);
    assert_pixel(&image, 40, 10, CLEAR);
}

#[test]
fn test_bounding_box_clip_follows_item_transform() {
    let mut item = filled_rect(0.0, 0.0, 20.0, 20.0, Color::red());
    item.transform = Affine::translate(10.0, 10.0);
    let mut doc = scene(40.0, 40.0, vec![with_clip(item, "quarter")]);
    doc.clip_paths.insert(
        "quarter".to_string(),
        clip_def(
            Units::ObjectBoundingBox,
            vec![filled_rect(0.0, 0.0, 0.5, 0.5, Color::black())],
        ),
    );
    let image = render_raster(&doc);
    assert_pixel(&image, 15, 15, RED);
    assert_pixel(&image, 25, 25, CLEAR);
    assert_pixel(&image, 5, 5, CLEAR);
}

#[test]
fn test_clip_with_opacity() {
    let mut item = with_clip(filled_rect(0.0, 0.0, 20.0, 20.0, Color::red()), "left");
    item.style.opacity = 0.5;
    let mut doc = scene(20.0, 20.0, vec![item]);
    doc.clip_paths.insert(
        "left".to_string(),
        clip_def(
            Units::UserSpaceOnUse,
            vec![filled_rect(0.0, 0.0, 10.0, 20.0, Color::black())],
        ),
    );
    let image = render_raster(&doc);
    assert!(near(alpha(&image, 5, 5), 128, 2));
    assert_eq!(alpha(&image, 15, 5), 0);
}

#[test]
fn test_luminance_mask() {
    let mut doc = scene(
        40.0,
        20.0,
        vec![with_mask(filled_rect(0.0, 0.0, 40.0, 20.0, Color::red()), "fade")],
    );
    doc.masks.insert(
        "fade".to_string(),
        MaskDef {
            content_units: Units::UserSpaceOnUse,
            children: vec![
                filled_rect(0.0, 0.0, 10.0, 20.0, Color::white()),
                filled_rect(10.0, 0.0, 10.0, 20.0, Color::new(0.5, 0.5, 0.5)),
            ],
        },
    );
    let image = render_raster(&doc);
    assert_pixel(&image, 5, 10, RED);
    assert!(near(alpha(&image, 15, 10), 127, 3), "{:?}", pixel(&image, 15, 10));
    assert_pixel(&image, 30, 10, CLEAR);
}

#[test]
fn test_clip_and_mask_intersect() {
    let item = with_mask(
        with_clip(filled_rect(0.0, 0.0, 40.0, 40.0, Color::red()), "top"),
        "left",
    );
    let mut doc = scene(40.0, 40.0, vec![item]);
    doc.clip_paths.insert(
        "top".to_string(),
        clip_def(
            Units::UserSpaceOnUse,
            vec![filled_rect(0.0, 0.0, 40.0, 20.0, Color::black())],
        ),
    );
    doc.masks.insert(
        "left".to_string(),
        MaskDef {
            content_units: Units::UserSpaceOnUse,
            children: vec![filled_rect(0.0, 0.0, 20.0, 40.0, Color::white())],
        },
    );
    let image = render_raster(&doc);
    assert_pixel(&image, 10, 10, RED);
    assert_pixel(&image, 30, 10, CLEAR);
    assert_pixel(&image, 10, 30, CLEAR);
    assert_pixel(&image, 30, 30, CLEAR);
}

#[test]
fn test_clip_on_group_children() {
    let group = with_clip(
        Item::group(vec![
            filled_rect(0.0, 0.0, 20.0, 20.0, Color::red()),
            filled_rect(20.0, 0.0, 20.0, 20.0, Color::blue()),
        ]),
        "middle",
    );
    let mut doc = scene(40.0, 20.0, vec![group]);
    doc.clip_paths.insert(
        "middle".to_string(),
        clip_def(
            Units::UserSpaceOnUse,
            vec![filled_rect(10.0, 0.0, 20.0, 20.0, Color::black())],
        ),
    );
    let image = render_raster(&doc);
    assert_pixel(&image, 5, 10, CLEAR);
    assert_pixel(&image, 15, 10, RED);
    assert_pixel(&image, 25, 10, [0, 0, 255, 255]);
    assert_pixel(&image, 35, 10, CLEAR);
}

#[test]
fn test_vector_clip_and_mask_sequence() {
    let item = with_mask(
        with_clip(filled_rect(0.0, 0.0, 40.0, 40.0, Color::red()), "c"),
        "m",
    );
    let mut doc = scene(40.0, 40.0, vec![item]);
    doc.clip_paths.insert(
        "c".to_string(),
        clip_def(
            Units::UserSpaceOnUse,
            vec![filled_rect(0.0, 0.0, 40.0, 20.0, Color::black())],
        ),
    );
    doc.masks.insert(
        "m".to_string(),
        MaskDef {
            content_units: Units::UserSpaceOnUse,
            children: vec![filled_rect(0.0, 0.0, 20.0, 40.0, Color::white())],
        },
    );

    let renderer = Renderer::new(&doc);
    let backend = RecordingBackend::new(TargetKind::Vector, 30.0, 30.0);
    let log = backend.log();
    let mut ctx = renderer.create_context();
    assert!(ctx.set_surface_target(Box::new(backend), true));
    assert!(renderer.render_pages(&mut ctx, false));

    let ops = log.borrow();
    let position = |op: &str| ops.iter().position(|o| o.starts_with(op));
    let pop = position("pop_group_to_source").unwrap();
    let clip = position("clip(").unwrap();
    let mask = position("mask(").unwrap();
    assert!(pop < clip && clip < mask, "{:?}", ops);
    assert_eq!(
        ops.iter().filter(|o| *o == "save").count(),
        ops.iter().filter(|o| *o == "restore").count()
    );
}

#[test]
fn test_pdf_clip_and_mask_output() {
    let item = with_mask(
        with_clip(filled_rect(0.0, 0.0, 40.0, 40.0, Color::red()), "c"),
        "m",
    );
    let mut doc = scene(40.0, 40.0, vec![item]);
    doc.clip_paths.insert(
        "c".to_string(),
        clip_def(
            Units::UserSpaceOnUse,
            vec![filled_rect(0.0, 0.0, 40.0, 20.0, Color::black())],
        ),
    );
    doc.masks.insert(
        "m".to_string(),
        MaskDef {
            content_units: Units::UserSpaceOnUse,
            children: vec![filled_rect(0.0, 0.0, 20.0, 40.0, Color::white())],
        },
    );
    let pdf = pdf_text(&render_pdf(&doc));
    assert!(pdf.starts_with("%PDF"));
    assert!(pdf.contains("W n"));
    assert!(pdf.contains("/SMask"));
}

#[test]
fn test_half_opaque_rect_through_circle_mask() {
    let mut rect = with_mask(filled_rect(0.0, 0.0, 40.0, 20.0, Color::red()), "spot");
    rect.style.opacity = 0.5;
    let mut doc = scene(40.0, 20.0, vec![rect]);
    let mut circle = Item::new(ItemKind::Circle {
        cx: 10.0,
        cy: 10.0,
        r: 8.0,
    });
    circle.style.fill = Paint::Color(Color::white());
    doc.masks.insert(
        "spot".to_string(),
        MaskDef {
            content_units: Units::UserSpaceOnUse,
            children: vec![circle],
        },
    );
    let image = render_raster(&doc);
    assert!(near(alpha(&image, 10, 10), 127, 3), "{:?}", pixel(&image, 10, 10));
    assert_eq!(alpha(&image, 30, 10), 0);
    assert_eq!(alpha(&image, 1, 1), 0);
}

#[test]
fn test_nested_clips_intersect() {
    let inner = with_clip(filled_rect(0.0, 0.0, 40.0, 40.0, Color::red()), "right");
    let outer = with_clip(Item::group(vec![inner]), "top");
    let mut doc = scene(40.0, 40.0, vec![outer]);
    doc.clip_paths.insert(
        "top".to_string(),
        clip_def(
            Units::UserSpaceOnUse,
            vec![filled_rect(0.0, 0.0, 40.0, 20.0, Color::black())],
        ),
    );
    doc.clip_paths.insert(
        "right".to_string(),
        clip_def(
            Units::UserSpaceOnUse,
            vec![filled_rect(20.0, 0.0, 20.0, 40.0, Color::black())],
        ),
    );
    let image = render_raster(&doc);
    assert_pixel(&image, 30, 10, RED);
    assert_pixel(&image, 10, 10, CLEAR);
    assert_pixel(&image, 30, 30, CLEAR);
    assert_pixel(&image, 10, 30, CLEAR);
}

#[test]
fn test_bounding_box_clip_scales_with_item() {
    let clip = clip_def(
        Units::ObjectBoundingBox,
        vec![filled_rect(0.0, 0.0, 0.5, 1.0, Color::black())],
    );
    let small = with_clip(filled_rect(0.0, 0.0, 20.0, 20.0, Color::red()), "left");
    let mut large = with_clip(filled_rect(0.0, 0.0, 20.0, 20.0, Color::red()), "left");
    large.transform = Affine::scale(2.0, 2.0);

    for (item, visible_x, hidden_x) in [(small, 5, 15), (large, 15, 25)] {
        let mut doc = scene(40.0, 40.0, vec![item]);
        doc.clip_paths.insert("left".to_string(), clip.clone());
        let image = render_raster(&doc);
        assert_pixel(&image, visible_x, 5, RED);
        assert_pixel(&image, hidden_x, 5, CLEAR);
    }
}

#[test]
fn test_repeated_renders_are_identical() {
    let mut group = Item::group(vec![
        filled_rect(0.0, 0.0, 30.0, 30.0, Color::red()),
        filled_rect(10.0, 10.0, 30.0, 30.0, Color::blue()),
    ]);
    group.style.opacity = 0.7;
    let mut doc = scene(40.0, 40.0, vec![with_clip(group, "c")]);
    doc.clip_paths.insert(
        "c".to_string(),
        clip_def(
            Units::UserSpaceOnUse,
            vec![filled_rect(5.0, 5.0, 30.0, 30.0, Color::black())],
        ),
    );
    assert_eq!(render_raster(&doc).data, render_raster(&doc).data);
}
