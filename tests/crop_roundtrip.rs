use std::sync::Arc;

use stepdoc::geom::{ActiveCrop, CropViewport, DisplayPoint, StoredPoint, StoredRect};
use stepdoc::model::{LayerBody, LayerTarget, MarkerAppearance, Project};
use stepdoc::render::raster::{FlattenParams, flatten_step};
use stepdoc::render::scene::SceneRenderer;

#[test]
fn stored_display_roundtrip_under_crop() {
    let crop = CropViewport::new(100, 100, 500, 400);
    let c = ActiveCrop::resolve(Some(&crop), 1920, 1080);

    let stored = StoredRect::new(150, 150, 250, 250);
    let display = c.to_display_rect(stored);
    assert_eq!((display.x0, display.y0, display.x1, display.y1), (50, 50, 150, 150));
    assert_eq!(c.to_stored_rect(display), stored);

    let drawn = DisplayPoint::new(0, 0);
    assert_eq!(c.to_stored(drawn), StoredPoint::new(100, 100));
}

#[test]
fn flatten_applies_crop_last() {
    let image = image::RgbaImage::from_pixel(200, 120, image::Rgba([90, 90, 90, 255]));
    let mut p = Project::new();
    // Click parked bottom-right so the marker stays clear of both probes.
    p.append_step(Arc::new(image), 185, 105, "");
    p.crop = Some(CropViewport::new(100, 20, 200, 120));

    // Stored geometry stays full-image even though the output is cropped.
    p.add_layer(
        LayerTarget::Step(0),
        LayerBody::spotlight(StoredRect::from_origin_size(120, 40, 40, 40)),
        None,
    )
    .unwrap();

    let mut scene = SceneRenderer::new();
    let marker = MarkerAppearance::default();
    let layers = p.layers_for_step(0).unwrap();
    let out = flatten_step(
        &mut scene,
        &p.steps[0].image,
        &layers,
        FlattenParams {
            marker: &marker,
            step_number: 1,
            crop: p.crop.as_ref(),
            watermark: None,
        },
    )
    .unwrap();

    assert_eq!(out.dimensions(), (100, 100));
    // Spotlight hole at stored (120..160, 40..80) lands at (20..60, 20..60)
    // in the cropped output: inside stays bright, outside is dimmed.
    let inside = out.get_pixel(40, 40);
    let outside = out.get_pixel(5, 5);
    assert_eq!(inside.0[0], 90);
    assert!(outside.0[0] < 90);
}

#[test]
fn degenerate_crop_exports_full_image() {
    let image = image::RgbaImage::from_pixel(64, 48, image::Rgba([10, 10, 10, 255]));
    let mut p = Project::new();
    p.append_step(Arc::new(image), 5, 5, "");
    p.crop = Some(CropViewport::new(500, 500, 600, 600));

    let mut scene = SceneRenderer::new();
    let marker = MarkerAppearance::default();
    let layers = p.layers_for_step(0).unwrap();
    let out = flatten_step(
        &mut scene,
        &p.steps[0].image,
        &layers,
        FlattenParams {
            marker: &marker,
            step_number: 1,
            crop: p.crop.as_ref(),
            watermark: None,
        },
    )
    .unwrap();
    assert_eq!(out.dimensions(), (64, 48));
}
