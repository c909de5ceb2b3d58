//! Canonical paint plans. Each annotation kind lowers to a backend-neutral
//! op list in stored-image space; the interactive surface and the flatten
//! compositor both consume the same plan, so the edited view and the
//! exported frame cannot drift apart.

use kurbo::{BezPath, Circle, Point, Rect, RoundedRect, Shape, Stroke};

use crate::{
    color::{FontSpec, Rgba8},
    geom::StoredRect,
    model::{HAlign, Layer, LayerBody, MarkerAppearance, SpotlightShape, VAlign},
};

const STROKE_TOLERANCE: f64 = 0.1;

/// Which consumer the plan is built for. The two differ only where pixel
/// output must (icon glyph coverage) or should (editing affordances) differ.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaintTarget {
    Interactive,
    Flatten,
}

/// Text placement box plus styling, resolved by the backend's text engine.
#[derive(Clone, Debug)]
pub struct TextOp {
    /// Layout box in stored space. For unwrapped text only the origin is
    /// significant.
    pub rect: Rect,
    pub text: String,
    pub font: FontSpec,
    pub color: Rgba8,
    /// Wrap lines to the box width.
    pub wrap: bool,
    pub h_align: HAlign,
    pub v_align: VAlign,
    /// Paint a dark halo pass behind the fill so text stays legible on any
    /// screenshot background.
    pub outline: bool,
}

/// One backend-neutral drawing instruction, in stored-image coordinates.
#[derive(Clone, Debug)]
pub enum PaintOp {
    /// Filled region. Strokes are lowered to fills before reaching here, so
    /// backends never need a stroker.
    FillPath { path: BezPath, color: Rgba8 },
    /// Gaussian-blur the pixels inside `rect` in place.
    BlurPatch { rect: StoredRect, strength: u32 },
    /// Copy `src` pixels magnified into `dst` (2x, aspect preserved).
    MagnifyPatch { src: Rect, dst: Rect },
    /// Darken everything outside the hole.
    DimOutside {
        hole: StoredRect,
        shape: SpotlightShape,
        color: Rgba8,
        opacity: f32,
    },
    Text(TextOp),
    /// Small editing badge (e.g. the global-layer tag). Interactive only.
    Badge { pos: Point, text: String },
}

/// Everything a plan needs besides the layer itself.
#[derive(Clone, Copy, Debug)]
pub struct PaintCtx<'a> {
    pub marker: &'a MarkerAppearance,
    /// 1-based number painted into the click marker.
    pub step_number: u32,
    pub target: PaintTarget,
}

/// Lower one layer to its op list. Ops are emitted back-to-front.
pub fn plan_layer(layer: &Layer, ctx: PaintCtx<'_>) -> Vec<PaintOp> {
    let mut ops = match &layer.body {
        LayerBody::Click { x, y } => plan_click(*x, *y, ctx),
        LayerBody::Blur { rect, strength } => vec![PaintOp::BlurPatch {
            rect: *rect,
            strength: *strength,
        }],
        LayerBody::Zoom {
            rect,
            target,
            color,
        } => plan_zoom(*rect, Point::new(target.x as f64, target.y as f64), *color),
        LayerBody::Arrow {
            start,
            end,
            color,
            width,
        } => plan_arrow(
            Point::new(start.x as f64, start.y as f64),
            Point::new(end.x as f64, end.y as f64),
            *color,
            *width as f64,
        ),
        LayerBody::Icon {
            pos,
            w,
            h,
            symbol,
            color,
        } => plan_icon(*pos, *w, *h, *symbol, *color, ctx.target),
        LayerBody::InfoBox {
            rect,
            target,
            text,
            border_color,
            bg_color,
            text_color,
            border_width,
            corner_radius,
            h_align,
            v_align,
            font,
        } => plan_info_box(InfoBoxPlan {
            rect: *rect,
            target: Point::new(target.x as f64, target.y as f64),
            text,
            border_color: *border_color,
            bg_color: *bg_color,
            text_color: *text_color,
            border_width: *border_width as f64,
            corner_radius: *corner_radius as f64,
            h_align: *h_align,
            v_align: *v_align,
            font,
        }),
        LayerBody::Spotlight {
            rect,
            dim_opacity,
            shape,
            color,
        } => vec![PaintOp::DimOutside {
            hole: *rect,
            shape: *shape,
            color: *color,
            opacity: *dim_opacity,
        }],
        LayerBody::Text {
            pos,
            text,
            color,
            font,
        } => vec![PaintOp::Text(TextOp {
            rect: Rect::new(pos.x as f64, pos.y as f64, pos.x as f64, pos.y as f64),
            text: text.clone(),
            font: font.clone(),
            color: *color,
            wrap: false,
            h_align: HAlign::Left,
            v_align: VAlign::Top,
            outline: ctx.target == PaintTarget::Flatten,
        })],
    };

    if ctx.target == PaintTarget::Interactive && layer.is_global {
        if let Some(pos) = badge_anchor(&layer.body) {
            ops.push(PaintOp::Badge {
                pos,
                text: "GLOBAL".to_string(),
            });
        }
    }
    ops
}

fn badge_anchor(body: &LayerBody) -> Option<Point> {
    let r = match body {
        LayerBody::Blur { rect, .. }
        | LayerBody::Zoom { rect, .. }
        | LayerBody::InfoBox { rect, .. }
        | LayerBody::Spotlight { rect, .. } => *rect,
        LayerBody::Icon { pos, w, h, .. } => {
            StoredRect::from_origin_size(pos.x, pos.y, *w, *h)
        }
        LayerBody::Arrow { start, .. } => StoredRect::new(start.x, start.y, start.x, start.y),
        LayerBody::Text { pos, .. } => StoredRect::new(pos.x, pos.y, pos.x, pos.y),
        LayerBody::Click { .. } => return None,
    };
    Some(Point::new(r.x0 as f64, r.y0 as f64 - 14.0))
}

fn plan_click(x: i32, y: i32, ctx: PaintCtx<'_>) -> Vec<PaintOp> {
    let m = ctx.marker;
    let c = Point::new(x as f64, y as f64);
    let inner = m.size as f64 * 0.6;
    let glow = m.size as f64 * 0.9;
    let transparent = m.color.is_transparent();

    let mut ops = Vec::with_capacity(5);
    if !transparent {
        ops.push(PaintOp::FillPath {
            path: Circle::new((c.x + 2.0, c.y + 2.0), inner * 0.85).to_path(STROKE_TOLERANCE),
            color: Rgba8::new(0, 0, 0, 100),
        });
        if m.show_glow {
            ops.push(PaintOp::FillPath {
                path: Circle::new(c, glow).to_path(STROKE_TOLERANCE),
                color: m.color.with_alpha(60),
            });
        }
        ops.push(PaintOp::FillPath {
            path: Circle::new(c, inner).to_path(STROKE_TOLERANCE),
            color: m.color,
        });
    }
    // White ring stays even for a transparent marker.
    ops.push(PaintOp::FillPath {
        path: stroke_to_fill(
            &Circle::new(c, inner).to_path(STROKE_TOLERANCE),
            m.border_width as f64,
            None,
            false,
        ),
        color: Rgba8::WHITE,
    });

    let number = ctx.step_number.to_string();
    let half = m.size as f64;
    ops.push(PaintOp::Text(TextOp {
        rect: Rect::new(c.x - half, c.y - half, c.x + half, c.y + half),
        text: number,
        font: FontSpec::new("Segoe UI", m.number_size).bold(),
        color: m.text_color,
        wrap: false,
        h_align: HAlign::Center,
        v_align: VAlign::Center,
        outline: false,
    }));
    ops
}

fn plan_zoom(rect: StoredRect, target: Point, color: Rgba8) -> Vec<PaintOp> {
    let dst = Rect::new(rect.x0 as f64, rect.y0 as f64, rect.x1 as f64, rect.y1 as f64);
    let center = dst.center();
    let mut ops = Vec::with_capacity(5);

    // Dashed connector from box center toward the target, stopped 35px
    // short so it never crosses the click marker's number.
    let vec = center - target;
    let len = vec.hypot();
    if len > 30.0 {
        let start = target + vec * (35.0 / len);
        let mut line = BezPath::new();
        line.move_to(center);
        line.line_to(start);
        ops.push(PaintOp::FillPath {
            path: stroke_to_fill(&line, 3.0, Some(&[12.0, 6.0]), false),
            color: color.with_alpha(200),
        });
    }

    ops.push(PaintOp::FillPath {
        path: dst.to_path(STROKE_TOLERANCE),
        color: Rgba8::rgb(20, 20, 20),
    });

    // 2x magnification: source side is half the box side, centered on the
    // target.
    let src_sz = dst.width() / 2.0;
    let src = Rect::new(
        target.x - src_sz / 2.0,
        target.y - src_sz / 2.0,
        target.x + src_sz / 2.0,
        target.y + src_sz / 2.0,
    );
    ops.push(PaintOp::MagnifyPatch { src, dst });

    ops.push(PaintOp::FillPath {
        path: stroke_to_fill(&dst.to_path(STROKE_TOLERANCE), 3.0, None, false),
        color,
    });

    // Red ring marking the magnified point.
    ops.push(PaintOp::FillPath {
        path: stroke_to_fill(
            &Circle::new(center, 8.0).to_path(STROKE_TOLERANCE),
            2.0,
            None,
            false,
        ),
        color: Rgba8::RED,
    });
    ops
}

fn plan_arrow(start: Point, end: Point, color: Rgba8, width: f64) -> Vec<PaintOp> {
    let vec = end - start;
    let len = vec.hypot();
    let angle = vec.y.atan2(vec.x);
    let head = 15.0 + width;

    // Shaft stops inside the head so the round cap never pokes past the tip.
    let shorten = if len > 10.0 { len.min(head * 0.6) } else { 0.0 };
    let shaft_end = Point::new(end.x - angle.cos() * shorten, end.y - angle.sin() * shorten);

    let mut ops = Vec::with_capacity(2);
    let mut shaft = BezPath::new();
    shaft.move_to(start);
    shaft.line_to(shaft_end);
    ops.push(PaintOp::FillPath {
        path: stroke_to_fill(&shaft, width, None, true),
        color,
    });

    if len > 10.0 {
        let base = std::f64::consts::FRAC_PI_6;
        let p1 = Point::new(
            end.x - (angle - base).cos() * head,
            end.y - (angle - base).sin() * head,
        );
        let p2 = Point::new(
            end.x - (angle + base).cos() * head,
            end.y - (angle + base).sin() * head,
        );
        let mut tri = BezPath::new();
        tri.move_to(end);
        tri.line_to(p1);
        tri.line_to(p2);
        tri.close_path();
        ops.push(PaintOp::FillPath { path: tri, color });
    }
    ops
}

fn plan_icon(
    pos: crate::geom::StoredPoint,
    w: i32,
    h: i32,
    symbol: crate::model::IconKind,
    color: Rgba8,
    target: PaintTarget,
) -> Vec<PaintOp> {
    let rect = Rect::new(
        pos.x as f64,
        pos.y as f64,
        (pos.x + w) as f64,
        (pos.y + h) as f64,
    );
    let text = match target {
        PaintTarget::Interactive => symbol.glyph().to_string(),
        PaintTarget::Flatten => symbol.ascii().to_string(),
    };
    // Glyph sized to 80% of the box's short side.
    let font = FontSpec::new("Segoe UI", ((w.min(h) * 4) / 5).max(1) as u32).bold();

    let centered = |r: Rect, color: Rgba8| {
        PaintOp::Text(TextOp {
            rect: r,
            text: text.clone(),
            font: font.clone(),
            color,
            wrap: false,
            h_align: HAlign::Center,
            v_align: VAlign::Center,
            outline: false,
        })
    };

    let mut ops = Vec::with_capacity(3);
    // ASCII substitutes are easy to misread, so the flatten pass circles them.
    if target == PaintTarget::Flatten {
        let radius = (w.min(h) as f64) / 2.0;
        ops.push(PaintOp::FillPath {
            path: stroke_to_fill(
                &Circle::new(rect.center(), radius).to_path(STROKE_TOLERANCE),
                2.0,
                None,
                false,
            ),
            color,
        });
    }
    ops.push(centered(rect + kurbo::Vec2::new(2.0, 2.0), Rgba8::new(0, 0, 0, 150)));
    ops.push(centered(rect, color));
    ops
}

struct InfoBoxPlan<'a> {
    rect: StoredRect,
    target: Point,
    text: &'a str,
    border_color: Rgba8,
    bg_color: Rgba8,
    text_color: Rgba8,
    border_width: f64,
    corner_radius: f64,
    h_align: HAlign,
    v_align: VAlign,
    font: &'a FontSpec,
}

fn plan_info_box(p: InfoBoxPlan<'_>) -> Vec<PaintOp> {
    let rect = Rect::new(
        p.rect.x0 as f64,
        p.rect.y0 as f64,
        p.rect.x1 as f64,
        p.rect.y1 as f64,
    );
    let center = rect.center();
    let mut ops = Vec::with_capacity(5);

    // Connector leaves the box at the border, not the center: scale the
    // center-to-target vector so it first touches an edge.
    let vec = p.target - center;
    let start = if vec.x == 0.0 && vec.y == 0.0 {
        center
    } else {
        let tx = if vec.x != 0.0 {
            (rect.width() / 2.0) / vec.x.abs()
        } else {
            f64::INFINITY
        };
        let ty = if vec.y != 0.0 {
            (rect.height() / 2.0) / vec.y.abs()
        } else {
            f64::INFINITY
        };
        center + vec * tx.min(ty)
    };

    let dist = (p.target.x - start.x).abs() + (p.target.y - start.y).abs();
    if dist > 10.0 {
        let mut line = BezPath::new();
        line.move_to(start);
        line.line_to(p.target);
        ops.push(PaintOp::FillPath {
            path: stroke_to_fill(&line, 2.0, Some(&[8.0, 4.0]), false),
            color: p.border_color.with_alpha(200),
        });
        ops.push(PaintOp::FillPath {
            path: Circle::new(p.target, 4.0).to_path(STROKE_TOLERANCE),
            color: p.border_color,
        });
    }

    let rounded = RoundedRect::from_rect(rect, p.corner_radius).to_path(STROKE_TOLERANCE);
    ops.push(PaintOp::FillPath {
        path: rounded.clone(),
        color: p.bg_color,
    });
    if p.border_width > 0.0 {
        ops.push(PaintOp::FillPath {
            path: stroke_to_fill(&rounded, p.border_width, None, false),
            color: p.border_color,
        });
    }

    // 10px text padding on all sides.
    ops.push(PaintOp::Text(TextOp {
        rect: rect.inset(-10.0),
        text: p.text.to_string(),
        font: p.font.clone(),
        color: p.text_color,
        wrap: true,
        h_align: p.h_align,
        v_align: p.v_align,
        outline: false,
    }));
    ops
}

/// Lower a stroked outline to a fillable path so both backends stay
/// fill-only, the way the compositor consumes paths.
fn stroke_to_fill(
    path: &BezPath,
    width: f64,
    dashes: Option<&[f64]>,
    round_cap: bool,
) -> BezPath {
    let mut style = Stroke::new(width);
    if round_cap {
        style = style.with_caps(kurbo::Cap::Round).with_join(kurbo::Join::Round);
    }
    if let Some(pattern) = dashes {
        style = style.with_dashes(0.0, pattern.iter().copied());
    }
    kurbo::stroke(
        path.iter(),
        &style,
        &kurbo::StrokeOpts::default(),
        STROKE_TOLERANCE,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::StoredPoint;
    use crate::model::{IconKind, Layer};

    fn ctx<'a>(marker: &'a MarkerAppearance, target: PaintTarget) -> PaintCtx<'a> {
        PaintCtx {
            marker,
            step_number: 3,
            target,
        }
    }

    fn text_ops(ops: &[PaintOp]) -> Vec<&TextOp> {
        ops.iter()
            .filter_map(|op| match op {
                PaintOp::Text(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn click_plan_carries_step_number_and_ring() {
        let marker = MarkerAppearance::default();
        let layer = Layer::new(LayerBody::Click { x: 100, y: 80 }, "Click", false);
        let ops = plan_layer(&layer, ctx(&marker, PaintTarget::Flatten));

        // shadow, glow, fill, ring, number
        assert_eq!(ops.len(), 5);
        let texts = text_ops(&ops);
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].text, "3");
        assert!(texts[0].font.bold);
    }

    #[test]
    fn transparent_marker_keeps_only_ring_and_number() {
        let marker = MarkerAppearance {
            color: Rgba8::new(0, 0, 0, 0),
            ..MarkerAppearance::default()
        };
        let layer = Layer::new(LayerBody::Click { x: 0, y: 0 }, "Click", false);
        let ops = plan_layer(&layer, ctx(&marker, PaintTarget::Flatten));
        assert_eq!(ops.len(), 2);
    }

    #[test]
    fn zoom_source_is_half_box_centered_on_target() {
        let marker = MarkerAppearance::default();
        let layer = Layer::new(
            LayerBody::zoom(
                StoredRect::from_origin_size(300, 300, 200, 200),
                StoredPoint::new(50, 50),
            ),
            "Zoom",
            false,
        );
        let ops = plan_layer(&layer, ctx(&marker, PaintTarget::Flatten));
        let magnify = ops
            .iter()
            .find_map(|op| match op {
                PaintOp::MagnifyPatch { src, dst } => Some((*src, *dst)),
                _ => None,
            })
            .unwrap();
        assert_eq!(magnify.0.width(), 100.0);
        assert_eq!(magnify.0.center(), Point::new(50.0, 50.0));
        assert_eq!(magnify.1.width(), 200.0);
    }

    #[test]
    fn short_arrow_has_no_head() {
        let marker = MarkerAppearance::default();
        let layer = Layer::new(
            LayerBody::Arrow {
                start: StoredPoint::new(0, 0),
                end: StoredPoint::new(5, 0),
                color: Rgba8::RED,
                width: 4,
            },
            "Arrow",
            false,
        );
        let ops = plan_layer(&layer, ctx(&marker, PaintTarget::Flatten));
        assert_eq!(ops.len(), 1);
    }

    #[test]
    fn icon_uses_glyph_interactively_and_ascii_when_flattening() {
        let marker = MarkerAppearance::default();
        let layer = Layer::new(
            LayerBody::Icon {
                pos: StoredPoint::new(10, 10),
                w: 60,
                h: 60,
                symbol: IconKind::Check,
                color: Rgba8::RED,
            },
            "Icon",
            false,
        );
        let interactive = plan_layer(&layer, ctx(&marker, PaintTarget::Interactive));
        let flat = plan_layer(&layer, ctx(&marker, PaintTarget::Flatten));
        assert_eq!(text_ops(&interactive)[1].text, "\u{2714}");
        assert_eq!(text_ops(&flat)[1].text, "OK");
    }

    #[test]
    fn flattened_icon_gets_an_outline_circle() {
        let marker = MarkerAppearance::default();
        let layer = Layer::new(
            LayerBody::Icon {
                pos: StoredPoint::new(10, 10),
                w: 60,
                h: 60,
                symbol: IconKind::Star,
                color: Rgba8::RED,
            },
            "Icon",
            false,
        );
        let interactive = plan_layer(&layer, ctx(&marker, PaintTarget::Interactive));
        let flat = plan_layer(&layer, ctx(&marker, PaintTarget::Flatten));
        // The circle rings the ASCII substitute; the live glyph needs none.
        assert!(flat
            .iter()
            .any(|op| matches!(op, PaintOp::FillPath { color, .. } if *color == Rgba8::RED)));
        assert!(!interactive
            .iter()
            .any(|op| matches!(op, PaintOp::FillPath { .. })));
    }

    #[test]
    fn global_layers_get_a_badge_only_interactively() {
        let marker = MarkerAppearance::default();
        let layer = Layer::new(
            LayerBody::Blur {
                rect: StoredRect::new(0, 0, 50, 50),
                strength: 40,
            },
            "Blur",
            true,
        );
        let interactive = plan_layer(&layer, ctx(&marker, PaintTarget::Interactive));
        let flat = plan_layer(&layer, ctx(&marker, PaintTarget::Flatten));
        assert!(interactive
            .iter()
            .any(|op| matches!(op, PaintOp::Badge { text, .. } if text == "GLOBAL")));
        assert!(!flat.iter().any(|op| matches!(op, PaintOp::Badge { .. })));
    }

    #[test]
    fn info_box_connector_starts_on_border() {
        let marker = MarkerAppearance::default();
        let layer = Layer::new(
            LayerBody::info_box(
                StoredRect::from_origin_size(100, 100, 200, 100),
                StoredPoint::new(400, 150),
                "hello",
            ),
            "InfoBox",
            false,
        );
        let ops = plan_layer(&layer, ctx(&marker, PaintTarget::Flatten));
        // connector, target dot, bg, border, text
        assert_eq!(ops.len(), 5);
        let texts = text_ops(&ops);
        assert!(texts[0].wrap);
        assert_eq!(texts[0].rect, Rect::new(110.0, 110.0, 290.0, 190.0));
    }
}
