use std::sync::Arc;

use stepdoc::export::{ExportOptions, export_images};
use stepdoc::geom::{StoredPoint, StoredRect};
use stepdoc::model::{LayerBody, LayerTarget, MarkerAppearance, Project};
use stepdoc::render::raster::{FlattenParams, flatten_step};
use stepdoc::render::scene::SceneRenderer;

fn flatten_one(p: &Project, idx: usize) -> image::RgbaImage {
    let mut scene = SceneRenderer::new();
    let marker = MarkerAppearance::default();
    let layers = p.layers_for_step(idx).unwrap();
    flatten_step(
        &mut scene,
        &p.steps[idx].image,
        &layers,
        FlattenParams {
            marker: &marker,
            step_number: p.step_number(idx),
            crop: p.crop.as_ref(),
            watermark: None,
        },
    )
    .unwrap()
}

#[test]
fn click_marker_paints_rings_at_the_click_point() {
    let image = image::RgbaImage::from_pixel(160, 120, image::Rgba([255, 255, 255, 255]));
    let mut p = Project::new();
    p.append_step(Arc::new(image), 80, 60, "");

    let out = flatten_one(&p, 0);
    assert_eq!(out.dimensions(), (160, 120));
    // The filled disc covers the click point; far corners are untouched.
    assert_ne!(out.get_pixel(80, 60).0, [255, 255, 255, 255]);
    assert_eq!(out.get_pixel(2, 2).0, [255, 255, 255, 255]);
}

#[test]
fn blur_is_confined_to_its_region() {
    // Sharp vertical edge down the middle of the blur region.
    let mut image = image::RgbaImage::from_pixel(120, 80, image::Rgba([0, 0, 0, 255]));
    for y in 0..80 {
        for x in 60..120 {
            image.put_pixel(x, y, image::Rgba([255, 255, 255, 255]));
        }
    }

    let mut p = Project::new();
    // Park the click marker far from the edge under test.
    p.append_step(Arc::new(image), 10, 70, "");
    p.add_layer(
        LayerTarget::Step(0),
        LayerBody::Blur {
            rect: StoredRect::new(40, 10, 80, 40),
            strength: 21,
        },
        None,
    )
    .unwrap();

    let out = flatten_one(&p, 0);
    // Inside the region the edge is softened.
    let inside = out.get_pixel(59, 25).0[0];
    assert!(inside > 0, "edge inside the blur region must bleed");
    // Below the region the edge stays sharp.
    assert_eq!(out.get_pixel(59, 60).0[0], 0);
    assert_eq!(out.get_pixel(61, 60).0[0], 255);
}

#[test]
fn zoom_inset_copies_magnified_pixels() {
    // A lone green dot at the zoom target, on black. Green so the inset's
    // own chrome (white frame, red center ring) cannot satisfy the probe.
    let mut image = image::RgbaImage::from_pixel(200, 150, image::Rgba([0, 0, 0, 255]));
    image.put_pixel(150, 100, image::Rgba([0, 255, 0, 255]));

    let mut p = Project::new();
    p.append_step(Arc::new(image), 10, 140, "");
    p.add_layer(
        LayerTarget::Step(0),
        LayerBody::zoom(
            StoredRect::from_origin_size(10, 10, 60, 60),
            StoredPoint::new(150, 100),
        ),
        None,
    )
    .unwrap();

    let out = flatten_one(&p, 0);
    // The inset magnifies a patch centered on the target, so the dot shows
    // up inside the box far from its stored position.
    let mut green_in_inset = false;
    for y in 10..70u32 {
        for x in 10..70u32 {
            let px = out.get_pixel(x, y).0;
            if px[1] > 128 && px[0] < 64 && px[2] < 64 {
                green_in_inset = true;
            }
        }
    }
    assert!(green_in_inset, "magnified source pixels must appear in the inset");
}

#[test]
fn export_writes_numbered_images_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut p = Project::new();
    for n in 0..3 {
        p.append_step(
            Arc::new(image::RgbaImage::from_pixel(
                64,
                48,
                image::Rgba([n * 40, 0, 0, 255]),
            )),
            10,
            10,
            format!("step {n}"),
        );
    }

    let opts = ExportOptions {
        out_dir: dir.path().join("out"),
        watermark: false,
    };
    let marker = MarkerAppearance::default();
    let mut ticks = Vec::new();
    let written = export_images(&p, &marker, &opts, |done, total| ticks.push((done, total))).unwrap();

    assert_eq!(ticks, vec![(1, 3), (2, 3), (3, 3)]);
    let names: Vec<_> = written
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["step_01.png", "step_02.png", "step_03.png"]);
    for path in &written {
        let img = image::open(path).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (64, 48));
    }
}

#[test]
fn export_rejects_an_empty_project() {
    let dir = tempfile::tempdir().unwrap();
    let opts = ExportOptions {
        out_dir: dir.path().to_path_buf(),
        watermark: false,
    };
    let p = Project::new();
    let marker = MarkerAppearance::default();
    assert!(export_images(&p, &marker, &opts, |_, _| {}).is_err());
}
