//! Flatten compositor. Bakes a step's base capture plus its layer stack
//! into one final image by walking the paint plans in z-order: contiguous
//! vector ops run as one vello_cpu pass, pixel-patch ops (blur, magnify,
//! dim) are applied to the buffer between passes, so a later layer always
//! sees the pixels earlier layers produced.

use image::{RgbaImage, imageops};
use kurbo::Rect;

use crate::{
    blur,
    error::StepdocResult,
    geom::{ActiveCrop, CropViewport, StoredRect},
    model::{HAlign, Layer, MarkerAppearance, SpotlightShape, VAlign},
    paint::{self, PaintCtx, PaintOp, PaintTarget, TextOp},
};

use super::scene::SceneRenderer;

#[derive(Clone, Copy, Debug)]
pub struct FlattenParams<'a> {
    pub marker: &'a MarkerAppearance,
    /// 1-based step number painted into the click marker.
    pub step_number: u32,
    pub crop: Option<&'a CropViewport>,
    /// Top-right attribution text, if any.
    pub watermark: Option<&'a str>,
}

/// Flatten one step. `layers` must already be in z-order (globals first,
/// then step-local, insertion order within each).
pub fn flatten_step(
    scene: &mut SceneRenderer,
    image: &RgbaImage,
    layers: &[&Layer],
    params: FlattenParams<'_>,
) -> StepdocResult<RgbaImage> {
    let mut canvas = image.clone();
    let ctx = PaintCtx {
        marker: params.marker,
        step_number: params.step_number,
        target: PaintTarget::Flatten,
    };

    let mut run: Vec<PaintOp> = Vec::new();
    for layer in layers {
        for op in paint::plan_layer(layer, ctx) {
            match op {
                PaintOp::BlurPatch { rect, strength } => {
                    flush(scene, &mut canvas, &mut run)?;
                    blur::blur_region(&mut canvas, rect, strength)?;
                }
                PaintOp::MagnifyPatch { src, dst } => {
                    flush(scene, &mut canvas, &mut run)?;
                    magnify(&mut canvas, src, dst)?;
                }
                PaintOp::DimOutside {
                    hole,
                    shape,
                    color,
                    opacity,
                } => {
                    flush(scene, &mut canvas, &mut run)?;
                    dim_outside(&mut canvas, hole, shape, color, opacity);
                }
                vector => run.push(vector),
            }
        }
    }
    flush(scene, &mut canvas, &mut run)?;

    let crop = ActiveCrop::resolve(params.crop, canvas.width(), canvas.height());
    if crop.width != canvas.width() || crop.height != canvas.height() || !crop.is_identity() {
        canvas = imageops::crop_imm(
            &canvas,
            crop.offset_x as u32,
            crop.offset_y as u32,
            crop.width,
            crop.height,
        )
        .to_image();
    }

    if let Some(text) = params.watermark {
        stamp_watermark(scene, &mut canvas, text)?;
    }
    Ok(canvas)
}

fn flush(
    scene: &mut SceneRenderer,
    canvas: &mut RgbaImage,
    run: &mut Vec<PaintOp>,
) -> StepdocResult<()> {
    if run.is_empty() {
        return Ok(());
    }
    scene.render_over(canvas, run)?;
    run.clear();
    Ok(())
}

/// 2x-style magnification: copy `src` scaled into `dst`, aspect preserved
/// and centered, the source clamped to the image.
fn magnify(canvas: &mut RgbaImage, src: Rect, dst: Rect) -> StepdocResult<()> {
    let (iw, ih) = (canvas.width() as i32, canvas.height() as i32);
    let sx0 = (src.x0.floor() as i32).clamp(0, iw);
    let sy0 = (src.y0.floor() as i32).clamp(0, ih);
    let sx1 = (src.x1.ceil() as i32).clamp(0, iw);
    let sy1 = (src.y1.ceil() as i32).clamp(0, ih);
    let (sw, sh) = ((sx1 - sx0) as u32, (sy1 - sy0) as u32);
    if sw == 0 || sh == 0 || dst.width() < 1.0 || dst.height() < 1.0 {
        return Ok(());
    }

    let scale = (dst.width() / f64::from(sw)).min(dst.height() / f64::from(sh));
    let (tw, th) = (
        ((f64::from(sw) * scale).round() as u32).max(1),
        ((f64::from(sh) * scale).round() as u32).max(1),
    );

    let patch = imageops::crop_imm(canvas, sx0 as u32, sy0 as u32, sw, sh).to_image();
    let scaled = imageops::resize(&patch, tw, th, imageops::FilterType::Triangle);

    let ox = (dst.x0 + (dst.width() - f64::from(tw)) / 2.0).round() as i64;
    let oy = (dst.y0 + (dst.height() - f64::from(th)) / 2.0).round() as i64;
    imageops::replace(canvas, &scaled, ox, oy);
    Ok(())
}

/// Blend `color` at `opacity` over every pixel outside the hole.
pub(crate) fn dim_outside(
    canvas: &mut RgbaImage,
    hole: StoredRect,
    shape: SpotlightShape,
    color: crate::color::Rgba8,
    opacity: f32,
) {
    let t = opacity.clamp(0.0, 1.0);
    if t == 0.0 {
        return;
    }
    let cx = f64::from(hole.x0 + hole.x1) / 2.0;
    let cy = f64::from(hole.y0 + hole.y1) / 2.0;
    let rx = f64::from(hole.width()) / 2.0;
    let ry = f64::from(hole.height()) / 2.0;

    for (x, y, px) in canvas.enumerate_pixels_mut() {
        let (xi, yi) = (x as i32, y as i32);
        let inside = match shape {
            SpotlightShape::Rect => {
                xi >= hole.x0 && xi < hole.x1 && yi >= hole.y0 && yi < hole.y1
            }
            SpotlightShape::Ellipse => {
                if rx <= 0.0 || ry <= 0.0 {
                    false
                } else {
                    let dx = (f64::from(xi) + 0.5 - cx) / rx;
                    let dy = (f64::from(yi) + 0.5 - cy) / ry;
                    dx * dx + dy * dy <= 1.0
                }
            }
        };
        if inside {
            continue;
        }
        let blend = |c: u8, o: u8| -> u8 {
            (f32::from(c) * (1.0 - t) + f32::from(o) * t).round() as u8
        };
        px.0 = [
            blend(px.0[0], color.r),
            blend(px.0[1], color.g),
            blend(px.0[2], color.b),
            px.0[3],
        ];
    }
}

fn stamp_watermark(
    scene: &mut SceneRenderer,
    canvas: &mut RgbaImage,
    text: &str,
) -> StepdocResult<()> {
    let w = f64::from(canvas.width());
    let h = f64::from(canvas.height());
    // Frames too small to hold the line go out unstamped.
    if text.is_empty() || w < 40.0 || h < 24.0 {
        return Ok(());
    }
    let op = PaintOp::Text(TextOp {
        rect: Rect::new(10.0, 6.0, w - 10.0, 24.0),
        text: text.to_string(),
        font: crate::color::FontSpec::new("Segoe UI", 14),
        color: crate::color::Rgba8::new(255, 255, 255, 200),
        wrap: false,
        h_align: HAlign::Right,
        v_align: VAlign::Top,
        outline: true,
    });
    scene.render_over(canvas, &[op])
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        color::Rgba8,
        geom::StoredPoint,
        model::{Layer, LayerBody},
    };

    fn base(w: u32, h: u32) -> Arc<RgbaImage> {
        Arc::new(RgbaImage::from_fn(w, h, |x, y| {
            if (x / 4 + y / 4) % 2 == 0 {
                image::Rgba([230, 230, 230, 255])
            } else {
                image::Rgba([30, 30, 30, 255])
            }
        }))
    }

    fn params<'a>(marker: &'a MarkerAppearance) -> FlattenParams<'a> {
        FlattenParams {
            marker,
            step_number: 1,
            crop: None,
            watermark: None,
        }
    }

    #[test]
    fn flatten_without_layers_returns_base_copy() {
        let img = base(32, 32);
        let marker = MarkerAppearance::default();
        let mut scene = SceneRenderer::new();
        let out = flatten_step(&mut scene, &img, &[], params(&marker)).unwrap();
        assert_eq!(out, *img);
    }

    #[test]
    fn blur_layer_softens_only_its_region() {
        let img = base(48, 48);
        let marker = MarkerAppearance::default();
        let mut scene = SceneRenderer::new();
        let layer = Layer::new(
            LayerBody::Blur {
                rect: StoredRect::new(8, 8, 40, 40),
                strength: 15,
            },
            "Blur",
            false,
        );
        let out = flatten_step(&mut scene, &img, &[&layer], params(&marker)).unwrap();

        assert_eq!(out.get_pixel(0, 0), img.get_pixel(0, 0));
        // Inside the region checkerboard edges average out.
        let p = out.get_pixel(24, 24).0;
        assert!(p[0] > 40 && p[0] < 220, "expected blurred pixel, got {p:?}");
    }

    #[test]
    fn spotlight_dims_outside_and_preserves_hole() {
        let img = Arc::new(RgbaImage::from_pixel(
            32,
            32,
            image::Rgba([200, 200, 200, 255]),
        ));
        let marker = MarkerAppearance::default();
        let mut scene = SceneRenderer::new();
        let layer = Layer::new(
            LayerBody::spotlight(StoredRect::new(8, 8, 24, 24)),
            "Spotlight",
            false,
        );
        let out = flatten_step(&mut scene, &img, &[&layer], params(&marker)).unwrap();

        assert_eq!(out.get_pixel(16, 16).0, [200, 200, 200, 255]);
        let dimmed = out.get_pixel(2, 2).0;
        assert_eq!(dimmed[0], 80); // 200 * 0.4 + 0 * 0.6
    }

    #[test]
    fn crop_is_applied_after_annotations() {
        let img = base(64, 64);
        let marker = MarkerAppearance::default();
        let mut scene = SceneRenderer::new();
        let crop = CropViewport::new(16, 16, 48, 40);
        let p = FlattenParams {
            marker: &marker,
            step_number: 1,
            crop: Some(&crop),
            watermark: None,
        };
        let out = flatten_step(&mut scene, &img, &[], p).unwrap();
        assert_eq!((out.width(), out.height()), (32, 24));
        assert_eq!(out.get_pixel(0, 0), img.get_pixel(16, 16));
    }

    #[test]
    fn magnify_fills_destination_box() {
        let mut canvas = RgbaImage::from_pixel(64, 64, image::Rgba([10, 10, 10, 255]));
        // Bright source square so the magnified copy is detectable.
        for y in 14..18 {
            for x in 14..18 {
                canvas.put_pixel(x, y, image::Rgba([250, 0, 0, 255]));
            }
        }
        magnify(
            &mut canvas,
            Rect::new(8.0, 8.0, 24.0, 24.0),
            Rect::new(32.0, 32.0, 64.0, 64.0),
        )
        .unwrap();
        assert_eq!(canvas.get_pixel(48, 48).0[0], 250);
    }

    #[test]
    fn watermark_is_skipped_on_tiny_frames() {
        let img = Arc::new(RgbaImage::from_pixel(16, 12, image::Rgba([50, 50, 50, 255])));
        let marker = MarkerAppearance::default();
        let mut scene = SceneRenderer::new();
        let p = FlattenParams {
            marker: &marker,
            step_number: 1,
            crop: None,
            watermark: Some("Created with ClickStep Guide"),
        };
        let out = flatten_step(&mut scene, &img, &[], p).unwrap();
        assert_eq!(out, *img);
    }

    #[test]
    fn arrow_layer_paints_into_canvas() {
        let img = Arc::new(RgbaImage::from_pixel(
            64,
            64,
            image::Rgba([0, 0, 0, 255]),
        ));
        let marker = MarkerAppearance::default();
        let mut scene = SceneRenderer::new();
        let layer = Layer::new(
            LayerBody::Arrow {
                start: StoredPoint::new(8, 32),
                end: StoredPoint::new(56, 32),
                color: Rgba8::RED,
                width: 4,
            },
            "Arrow",
            false,
        );
        let out = flatten_step(&mut scene, &img, &[&layer], params(&marker)).unwrap();
        let mid = out.get_pixel(32, 32).0;
        assert!(mid[0] > 200, "expected red shaft, got {mid:?}");
    }
}
