//! Vector pass: runs FillPath/Text/Badge ops through vello_cpu on top of an
//! existing canvas. Pixel-patch ops (blur, magnify, dim) never reach this
//! module; the flatten compositor applies those directly.

use image::RgbaImage;
use kurbo::Shape;

use crate::{
    color::{FontSpec, Rgba8},
    error::{StepdocError, StepdocResult},
    model::{HAlign, VAlign},
    paint::{PaintOp, TextOp},
    text::{TextBrush, TextLayoutEngine},
};

use super::premul_over_canvas;

const BADGE_FONT_SIZE: u32 = 9;
const BADGE_PAD: f64 = 3.0;

pub struct SceneRenderer {
    text: TextLayoutEngine,
}

impl Default for SceneRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneRenderer {
    pub fn new() -> Self {
        Self {
            text: TextLayoutEngine::new(),
        }
    }

    /// Draw a run of vector ops over `canvas` in place; whatever is already
    /// on the canvas shows through where the ops leave coverage gaps.
    pub fn render_over(&mut self, canvas: &mut RgbaImage, ops: &[PaintOp]) -> StepdocResult<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let width: u16 = canvas
            .width()
            .try_into()
            .map_err(|_| StepdocError::render("canvas width exceeds u16"))?;
        let height: u16 = canvas
            .height()
            .try_into()
            .map_err(|_| StepdocError::render("canvas height exceeds u16"))?;

        // vello_cpu renders into a fresh buffer rather than compositing over
        // existing pixmap content, so the ops run over transparent and the
        // result is alpha-blended onto the canvas afterwards.
        let mut pixmap = vello_cpu::Pixmap::new(width, height);
        let mut ctx = vello_cpu::RenderContext::new(width, height);
        for op in ops {
            self.draw_op(&mut ctx, op)?;
        }
        ctx.flush();
        ctx.render_to_pixmap(&mut pixmap);

        premul_over_canvas(canvas, pixmap.data_as_u8_slice());
        Ok(())
    }

    fn draw_op(&mut self, ctx: &mut vello_cpu::RenderContext, op: &PaintOp) -> StepdocResult<()> {
        ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
        match op {
            PaintOp::FillPath { path, color } => {
                ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
                ctx.set_paint(peniko_color(*color));
                ctx.fill_path(&bezpath_to_cpu(path));
                Ok(())
            }
            PaintOp::Text(t) => self.draw_text(ctx, t),
            PaintOp::Badge { pos, text } => {
                let font = FontSpec::new("Segoe UI", BADGE_FONT_SIZE).bold();
                let (tw, th) = self.text.measure(text, &font, None)?;
                let rect = kurbo::Rect::new(
                    pos.x,
                    pos.y,
                    pos.x + f64::from(tw) + 2.0 * BADGE_PAD,
                    pos.y + f64::from(th) + 2.0 * BADGE_PAD,
                );
                ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
                ctx.set_paint(peniko_color(Rgba8::new(255, 140, 0, 230)));
                ctx.fill_path(&bezpath_to_cpu(
                    &kurbo::RoundedRect::from_rect(rect, 2.0).to_path(0.1),
                ));
                self.draw_text(
                    ctx,
                    &TextOp {
                        rect: rect.inset(-BADGE_PAD),
                        text: text.clone(),
                        font,
                        color: Rgba8::WHITE,
                        wrap: false,
                        h_align: HAlign::Left,
                        v_align: VAlign::Top,
                        outline: false,
                    },
                )
            }
            PaintOp::BlurPatch { .. } | PaintOp::MagnifyPatch { .. } | PaintOp::DimOutside { .. } => {
                Err(StepdocError::render(
                    "pixel-patch op reached the vector pass",
                ))
            }
        }
    }

    fn draw_text(&mut self, ctx: &mut vello_cpu::RenderContext, t: &TextOp) -> StepdocResult<()> {
        if t.text.is_empty() {
            return Ok(());
        }
        let max_width = t
            .wrap
            .then_some(t.rect.width() as f32)
            .filter(|w| *w > 0.0);
        let layout = self
            .text
            .layout(&t.text, &t.font, TextBrush::from(t.color), max_width, t.h_align)?;

        // Horizontal placement: parley aligns inside max_width when
        // wrapping; unwrapped runs are placed from the measured width.
        let x = if t.wrap {
            t.rect.x0
        } else {
            match t.h_align {
                HAlign::Left => t.rect.x0,
                HAlign::Center => t.rect.center().x - f64::from(layout.width()) / 2.0,
                HAlign::Right => t.rect.x1 - f64::from(layout.width()),
            }
        };
        let y = match t.v_align {
            VAlign::Top => t.rect.y0,
            VAlign::Center => t.rect.center().y - f64::from(layout.height()) / 2.0,
            VAlign::Bottom => t.rect.y1 - f64::from(layout.height()),
        };

        if t.outline {
            for (dx, dy) in [(-1.0, 0.0), (1.0, 0.0), (0.0, -1.0), (0.0, 1.0)] {
                draw_layout(ctx, &layout, x + dx, y + dy, Some(Rgba8::BLACK));
            }
        }
        draw_layout(ctx, &layout, x, y, None);
        Ok(())
    }
}

/// Paint a shaped layout at an origin. `override_color` replaces every
/// brush, used for the halo pass.
fn draw_layout(
    ctx: &mut vello_cpu::RenderContext,
    layout: &parley::Layout<TextBrush>,
    x: f64,
    y: f64,
    override_color: Option<Rgba8>,
) {
    ctx.set_transform(vello_cpu::kurbo::Affine::translate((x, y)));
    for line in layout.lines() {
        for item in line.items() {
            let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                continue;
            };

            let color = override_color.map_or_else(
                || {
                    let b = run.style().brush;
                    Rgba8::new(b.r, b.g, b.b, b.a)
                },
                |c| c,
            );
            ctx.set_paint(peniko_color(color));

            let font = run.run().font().clone();
            let glyphs = run.glyphs().map(|g| vello_cpu::Glyph {
                id: g.id,
                x: g.x,
                y: g.y,
            });
            ctx.glyph_run(&font)
                .font_size(run.run().font_size())
                .fill_glyphs(glyphs);
        }
    }
    ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
}

fn peniko_color(c: Rgba8) -> vello_cpu::peniko::Color {
    vello_cpu::peniko::Color::from_rgba8(c.r, c.g, c.b, c.a)
}

fn bezpath_to_cpu(path: &kurbo::BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;

    let point = |p: kurbo::Point| vello_cpu::kurbo::Point::new(p.x, p.y);
    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(point(p)),
            PathEl::LineTo(p) => out.line_to(point(p)),
            PathEl::QuadTo(p1, p2) => out.quad_to(point(p1), point(p2)),
            PathEl::CurveTo(p1, p2, p3) => {
                out.curve_to(point(p1), point(p2), point(p3));
            }
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}
