//! Rendering backends. `scene` runs the vector ops (paths, text) through
//! vello_cpu; `raster` is the flatten compositor that interleaves vector
//! runs with direct pixel work (blur, magnify, dim) to bake a step into a
//! final image.

pub mod raster;
pub mod scene;

pub use raster::{FlattenParams, flatten_step};
pub use scene::SceneRenderer;

use kurbo::Vec2;

use crate::paint::{PaintOp, TextOp};

/// Straight-alpha RGBA8 to premultiplied, the form vello_cpu pixmaps hold.
pub(crate) fn premul_rgba8(r: u8, g: u8, b: u8, a: u8) -> [u8; 4] {
    let af = (a as u16) + 1;
    let premul = |c: u8| -> u8 { (((c as u16) * af) >> 8) as u8 };
    [premul(r), premul(g), premul(b), a]
}

pub(crate) fn unpremul_rgba8(px: [u8; 4]) -> [u8; 4] {
    let a = px[3];
    if a == 0 || a == 255 {
        return px;
    }
    let un = |c: u8| -> u8 {
        let v = (u16::from(c) * 255 + u16::from(a) / 2) / u16::from(a);
        v.min(255) as u8
    };
    [un(px[0]), un(px[1]), un(px[2]), a]
}

/// Source-over of a premultiplied RGBA8 buffer (a rendered vello_cpu pixmap)
/// onto a straight-alpha canvas of the same dimensions.
pub(crate) fn premul_over_canvas(canvas: &mut image::RgbaImage, src: &[u8]) {
    for (s, px) in src.chunks_exact(4).zip(canvas.pixels_mut()) {
        let sa = u16::from(s[3]);
        if sa == 0 {
            continue;
        }
        if sa == 255 {
            px.0 = unpremul_rgba8([s[0], s[1], s[2], s[3]]);
            continue;
        }
        let [r, g, b, a] = px.0;
        let d = premul_rgba8(r, g, b, a);
        let inv = 255 - sa;
        let over = |sc: u8, dc: u8| sc.saturating_add(((u16::from(dc) * inv + 127) / 255) as u8);
        px.0 = unpremul_rgba8([
            over(s[0], d[0]),
            over(s[1], d[1]),
            over(s[2], d[2]),
            over(s[3], d[3]),
        ]);
    }
}

/// Shift an op from stored space into a translated frame (the crop view).
/// Raster-patch rects shift by the rounded offset; path and text geometry
/// shifts exactly.
pub(crate) fn translate_op(op: &PaintOp, d: Vec2) -> PaintOp {
    let di = (d.x.round() as i32, d.y.round() as i32);
    match op {
        PaintOp::FillPath { path, color } => {
            let mut moved = path.clone();
            moved.apply_affine(kurbo::Affine::translate(d));
            PaintOp::FillPath {
                path: moved,
                color: *color,
            }
        }
        PaintOp::BlurPatch { rect, strength } => PaintOp::BlurPatch {
            rect: rect.translated(di.0, di.1),
            strength: *strength,
        },
        PaintOp::MagnifyPatch { src, dst } => PaintOp::MagnifyPatch {
            src: *src + d,
            dst: *dst + d,
        },
        PaintOp::DimOutside {
            hole,
            shape,
            color,
            opacity,
        } => PaintOp::DimOutside {
            hole: hole.translated(di.0, di.1),
            shape: *shape,
            color: *color,
            opacity: *opacity,
        },
        PaintOp::Text(t) => PaintOp::Text(TextOp {
            rect: t.rect + d,
            ..t.clone()
        }),
        PaintOp::Badge { pos, text } => PaintOp::Badge {
            pos: *pos + d,
            text: text.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn premul_is_identity_for_opaque_pixels() {
        assert_eq!(premul_rgba8(10, 20, 30, 255), [10, 20, 30, 255]);
        assert_eq!(premul_rgba8(10, 20, 30, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn unpremul_inverts_premul_within_rounding() {
        for (r, g, b, a) in [(200u8, 100u8, 50u8, 128u8), (255, 255, 255, 10)] {
            let p = premul_rgba8(r, g, b, a);
            let u = unpremul_rgba8(p);
            assert!((i16::from(u[0]) - i16::from(r)).abs() <= 2);
            assert!((i16::from(u[1]) - i16::from(g)).abs() <= 3);
            assert!((i16::from(u[2]) - i16::from(b)).abs() <= 6);
            assert_eq!(u[3], a);
        }
    }

    #[test]
    fn premul_over_blends_covered_pixels_and_skips_clear_ones() {
        let mut canvas = image::RgbaImage::from_pixel(2, 1, image::Rgba([100, 100, 100, 255]));
        // Half-alpha white over the left pixel, nothing over the right.
        let src = [128u8, 128, 128, 128, 0, 0, 0, 0];
        premul_over_canvas(&mut canvas, &src);

        let left = canvas.get_pixel(0, 0).0;
        assert!(left[0] > 100 && left[0] < 255);
        assert_eq!(left[3], 255);
        assert_eq!(canvas.get_pixel(1, 0).0, [100, 100, 100, 255]);
    }

    #[test]
    fn translate_shifts_patch_rects() {
        let op = PaintOp::BlurPatch {
            rect: crate::geom::StoredRect::new(10, 10, 20, 20),
            strength: 41,
        };
        let moved = translate_op(&op, Vec2::new(-5.0, 3.0));
        match moved {
            PaintOp::BlurPatch { rect, .. } => {
                assert_eq!(rect, crate::geom::StoredRect::new(5, 13, 15, 23));
            }
            _ => panic!("op kind changed"),
        }
    }
}
