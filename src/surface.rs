//! Interactive editing surface. Pointer events come in display-space
//! (crop-viewport) coordinates; everything that lands in the model is
//! converted to stored space first. The surface renders the same paint
//! plans the flatten compositor consumes, so what the editor shows is what
//! the export bakes.

use image::{RgbaImage, imageops};
use kurbo::{Shape, Vec2};

use crate::{
    blur,
    error::{StepdocError, StepdocResult},
    geom::{ActiveCrop, CropViewport, DisplayPoint, DisplayRect, StoredPoint, StoredRect},
    model::{IconKind, Layer, LayerBody, LayerId, MarkerAppearance, Project},
    paint::{self, PaintCtx, PaintOp, PaintTarget},
    render::{SceneRenderer, translate_op},
};

/// Minimum committed size for dragged shapes.
const MIN_SHAPE_SIZE: i32 = 20;
/// Zoom insets need room for the magnified patch.
const MIN_ZOOM_SIZE: i32 = 50;
const ICON_DEFAULT_SIZE: i32 = 60;
const HANDLE_HIT_RADIUS: i32 = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tool {
    Select,
    Blur,
    Zoom,
    Arrow,
    Icon(IconKind),
    InfoBox,
    Spotlight,
    Text,
    Crop,
}

/// Resize / endpoint handles on the selected layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handle {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    /// Arrow start point.
    Start,
    /// Arrow end point.
    End,
    /// Info-box connector target.
    Target,
}

#[derive(Clone, Debug)]
enum ToolState {
    Idle,
    /// Rubber-band drag of a new annotation.
    Drawing {
        anchor: DisplayPoint,
        current: DisplayPoint,
    },
    /// Moving the selected layer.
    Moving {
        uid: LayerId,
        last: DisplayPoint,
    },
    /// Dragging a handle of the selected layer.
    Resizing {
        uid: LayerId,
        handle: Handle,
    },
    /// Geometry committed, waiting for modal text entry.
    AwaitingText {
        pending: PendingText,
    },
}

#[derive(Clone, Debug)]
enum PendingText {
    InfoBox {
        rect: StoredRect,
        target: StoredPoint,
    },
    Text {
        pos: StoredPoint,
    },
}

/// What a pointer-release produced. The caller owns undo checkpoints and
/// decides where new layers land (step-local vs global).
#[derive(Clone, Debug, PartialEq)]
pub enum SurfaceAction {
    None,
    /// Add this body to the current step (or global set).
    AddLayer(LayerBody),
    /// Crop tool committed a viewport.
    SetCrop(CropViewport),
    /// InfoBox/Text geometry placed; call [`EditSurface::submit_text`].
    TextPending,
    SelectionChanged(Option<LayerId>),
    /// A move or resize of this layer finished.
    LayerEdited(LayerId),
}

/// One row of the layer registry, mirrored from the model.
#[derive(Clone, Debug, PartialEq)]
pub struct RegistryEntry {
    pub uid: LayerId,
    pub label: String,
    pub kind: &'static str,
    pub is_global: bool,
    pub selected: bool,
}

pub struct EditSurface {
    scene: SceneRenderer,
    tool: Tool,
    state: ToolState,
    selection: Option<LayerId>,
}

impl Default for EditSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl EditSurface {
    pub fn new() -> Self {
        Self {
            scene: SceneRenderer::new(),
            tool: Tool::Select,
            state: ToolState::Idle,
            selection: None,
        }
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    /// Switching tools aborts any drag in progress; a pending text modal
    /// stays open until submitted or cancelled.
    pub fn set_tool(&mut self, tool: Tool) {
        if !matches!(self.state, ToolState::AwaitingText { .. }) {
            self.state = ToolState::Idle;
        }
        self.tool = tool;
    }

    pub fn selection(&self) -> Option<LayerId> {
        self.selection
    }

    /// Select from the registry side. Unknown uids clear the selection.
    pub fn select(&mut self, project: &Project, uid: Option<LayerId>) {
        self.selection = uid.filter(|u| project.find_layer(*u).is_some());
    }

    /// Drop state that refers to layers no longer in the model (undo,
    /// deletion, step switch).
    pub fn reconcile(&mut self, project: &Project) {
        if let Some(uid) = self.selection
            && project.find_layer(uid).is_none()
        {
            self.selection = None;
        }
        match &self.state {
            ToolState::Moving { uid, .. } | ToolState::Resizing { uid, .. }
                if project.find_layer(*uid).is_none() =>
            {
                self.state = ToolState::Idle;
            }
            _ => {}
        }
    }

    /// Registry rows for the current step, in z-order.
    pub fn registry(&self, project: &Project) -> StepdocResult<Vec<RegistryEntry>> {
        Ok(project
            .layers_for_step(project.current_step)?
            .iter()
            .map(|l| RegistryEntry {
                uid: l.uid,
                label: l.label.clone(),
                kind: l.body.kind_name(),
                is_global: l.is_global,
                selected: self.selection == Some(l.uid),
            })
            .collect())
    }

    pub fn pointer_down(&mut self, project: &Project, p: DisplayPoint) -> SurfaceAction {
        if matches!(self.state, ToolState::AwaitingText { .. }) {
            return SurfaceAction::None;
        }
        match self.tool {
            Tool::Select => self.press_select(project, p),
            _ => {
                self.state = ToolState::Drawing {
                    anchor: p,
                    current: p,
                };
                SurfaceAction::None
            }
        }
    }

    pub fn pointer_move(&mut self, project: &mut Project, p: DisplayPoint) {
        match &mut self.state {
            ToolState::Drawing { current, .. } => *current = p,
            ToolState::Moving { uid, last } => {
                let (dx, dy) = (p.x - last.x, p.y - last.y);
                let uid = *uid;
                *last = p;
                move_layer(project, uid, dx, dy);
            }
            ToolState::Resizing { uid, handle } => {
                let (uid, handle) = (*uid, *handle);
                let crop = active_crop(project);
                resize_layer(project, uid, handle, crop.to_stored(p));
            }
            _ => {}
        }
    }

    pub fn pointer_up(&mut self, project: &Project, p: DisplayPoint) -> SurfaceAction {
        let state = std::mem::replace(&mut self.state, ToolState::Idle);
        match state {
            ToolState::Drawing { anchor, .. } => self.finish_drawing(project, anchor, p),
            ToolState::Moving { uid, .. } | ToolState::Resizing { uid, .. } => {
                SurfaceAction::LayerEdited(uid)
            }
            ToolState::AwaitingText { pending } => {
                self.state = ToolState::AwaitingText { pending };
                SurfaceAction::None
            }
            ToolState::Idle => SurfaceAction::None,
        }
    }

    /// Complete a pending InfoBox/Text placement. Empty text cancels, the
    /// way dismissing the dialog does.
    pub fn submit_text(&mut self, text: &str) -> SurfaceAction {
        let ToolState::AwaitingText { pending } =
            std::mem::replace(&mut self.state, ToolState::Idle)
        else {
            return SurfaceAction::None;
        };
        if text.is_empty() {
            return SurfaceAction::None;
        }
        match pending {
            PendingText::InfoBox { rect, target } => {
                SurfaceAction::AddLayer(LayerBody::info_box(rect, target, text))
            }
            PendingText::Text { pos } => SurfaceAction::AddLayer(LayerBody::Text {
                pos,
                text: text.to_string(),
                color: crate::color::Rgba8::WHITE,
                font: crate::color::FontSpec::text_default(),
            }),
        }
    }

    pub fn cancel_text(&mut self) {
        if matches!(self.state, ToolState::AwaitingText { .. }) {
            self.state = ToolState::Idle;
        }
    }

    pub fn text_pending(&self) -> bool {
        matches!(self.state, ToolState::AwaitingText { .. })
    }

    fn press_select(&mut self, project: &Project, p: DisplayPoint) -> SurfaceAction {
        let crop = active_crop(project);

        // Handles of the current selection win over body hits.
        if let Some(uid) = self.selection
            && let Some((layer, _)) = project.find_layer(uid)
            && let Some(handle) = handle_at(layer, &crop, p)
        {
            self.state = ToolState::Resizing { uid, handle };
            return SurfaceAction::None;
        }

        let hit = hit_test(project, &crop, p);
        let changed = hit != self.selection;
        self.selection = hit;
        if let Some(uid) = hit {
            self.state = ToolState::Moving { uid, last: p };
        }
        if changed {
            SurfaceAction::SelectionChanged(hit)
        } else {
            SurfaceAction::None
        }
    }

    fn finish_drawing(
        &mut self,
        project: &Project,
        anchor: DisplayPoint,
        p: DisplayPoint,
    ) -> SurfaceAction {
        let crop = active_crop(project);
        let rect = crop.to_stored_rect(DisplayRect::new(anchor.x, anchor.y, p.x, p.y));
        let point = crop.to_stored(p);

        match self.tool {
            Tool::Select => SurfaceAction::None,
            Tool::Blur => SurfaceAction::AddLayer(LayerBody::Blur {
                rect: clamp_min(rect, MIN_SHAPE_SIZE),
                strength: 40,
            }),
            Tool::Zoom => {
                let rect = square_clamp_min(rect, MIN_ZOOM_SIZE);
                let target = project
                    .steps
                    .get(project.current_step)
                    .map(|s| StoredPoint::new(s.click_x, s.click_y))
                    .unwrap_or(rect.center());
                SurfaceAction::AddLayer(LayerBody::zoom(rect, target))
            }
            Tool::Arrow => {
                let start = crop.to_stored(anchor);
                SurfaceAction::AddLayer(LayerBody::Arrow {
                    start,
                    end: point,
                    color: crate::color::Rgba8::RED,
                    width: 4,
                })
            }
            Tool::Icon(kind) => SurfaceAction::AddLayer(LayerBody::Icon {
                pos: StoredPoint::new(
                    point.x - ICON_DEFAULT_SIZE / 2,
                    point.y - ICON_DEFAULT_SIZE / 2,
                ),
                w: ICON_DEFAULT_SIZE,
                h: ICON_DEFAULT_SIZE,
                symbol: kind,
                color: crate::color::Rgba8::RED,
            }),
            Tool::InfoBox => {
                let rect = clamp_min(rect, MIN_SHAPE_SIZE);
                let target = project
                    .steps
                    .get(project.current_step)
                    .map(|s| StoredPoint::new(s.click_x, s.click_y))
                    .unwrap_or(rect.center());
                self.state = ToolState::AwaitingText {
                    pending: PendingText::InfoBox { rect, target },
                };
                SurfaceAction::TextPending
            }
            Tool::Spotlight => {
                SurfaceAction::AddLayer(LayerBody::spotlight(clamp_min(rect, MIN_SHAPE_SIZE)))
            }
            Tool::Text => {
                self.state = ToolState::AwaitingText {
                    pending: PendingText::Text { pos: point },
                };
                SurfaceAction::TextPending
            }
            Tool::Crop => {
                if rect.width() < MIN_SHAPE_SIZE || rect.height() < MIN_SHAPE_SIZE {
                    SurfaceAction::None
                } else {
                    SurfaceAction::SetCrop(CropViewport { rect })
                }
            }
        }
    }

    /// Render the current step into a display-space image: cropped base,
    /// then the z-ordered layer plans, then editing chrome (rubber band,
    /// selection outline, handles).
    pub fn render(
        &mut self,
        project: &Project,
        marker: &MarkerAppearance,
    ) -> StepdocResult<RgbaImage> {
        let step = project
            .steps
            .get(project.current_step)
            .ok_or_else(|| StepdocError::validation("no step to render"))?;
        let crop = active_crop(project);
        let shift = Vec2::new(-f64::from(crop.offset_x), -f64::from(crop.offset_y));

        let mut canvas = if crop.is_identity()
            && crop.width == step.image.width()
            && crop.height == step.image.height()
        {
            (*step.image).clone()
        } else {
            imageops::crop_imm(
                &*step.image,
                crop.offset_x as u32,
                crop.offset_y as u32,
                crop.width,
                crop.height,
            )
            .to_image()
        };

        let ctx = PaintCtx {
            marker,
            step_number: project.step_number(project.current_step),
            target: PaintTarget::Interactive,
        };

        let mut run: Vec<PaintOp> = Vec::new();
        for layer in project.layers_for_step(project.current_step)? {
            for op in paint::plan_layer(layer, ctx) {
                let op = translate_op(&op, shift);
                match op {
                    PaintOp::BlurPatch { rect, strength } => {
                        self.flush(&mut canvas, &mut run)?;
                        blur::blur_region(&mut canvas, rect, strength)?;
                    }
                    PaintOp::MagnifyPatch { src, dst } => {
                        // Magnified content must come from uncropped pixels;
                        // pull the patch in stored space, then place it.
                        self.flush(&mut canvas, &mut run)?;
                        magnify_from(&mut canvas, &step.image, src - shift, dst)?;
                    }
                    PaintOp::DimOutside {
                        hole,
                        shape,
                        color,
                        opacity,
                    } => {
                        self.flush(&mut canvas, &mut run)?;
                        crate::render::raster::dim_outside(&mut canvas, hole, shape, color, opacity);
                    }
                    vector => run.push(vector),
                }
            }
        }

        run.extend(self.chrome_ops(project, &crop));
        self.flush(&mut canvas, &mut run)?;
        Ok(canvas)
    }

    fn flush(&mut self, canvas: &mut RgbaImage, run: &mut Vec<PaintOp>) -> StepdocResult<()> {
        if run.is_empty() {
            return Ok(());
        }
        self.scene.render_over(canvas, run)?;
        run.clear();
        Ok(())
    }

    /// Editing chrome: rubber band while drawing, dashed outline plus
    /// handles on the selection.
    fn chrome_ops(&self, project: &Project, crop: &ActiveCrop) -> Vec<PaintOp> {
        let mut ops = Vec::new();

        if let ToolState::Drawing { anchor, current } = &self.state {
            let r = kurbo::Rect::new(
                f64::from(anchor.x.min(current.x)),
                f64::from(anchor.y.min(current.y)),
                f64::from(anchor.x.max(current.x)),
                f64::from(anchor.y.max(current.y)),
            );
            ops.push(dashed_outline(r, crate::color::Rgba8::new(0, 175, 255, 255)));
        }

        if let Some(uid) = self.selection
            && let Some((layer, _)) = project.find_layer(uid)
        {
            let b = layer_bounds(layer);
            let d = crop.to_display_rect(b);
            ops.push(dashed_outline(
                d.to_kurbo().inset(4.0),
                crate::color::Rgba8::WHITE,
            ));
            for (_, hp) in handle_points(layer, crop) {
                ops.push(PaintOp::FillPath {
                    path: kurbo::Circle::new((f64::from(hp.x), f64::from(hp.y)), 5.0).to_path(0.1),
                    color: crate::color::Rgba8::new(0, 175, 255, 255),
                });
            }
        }
        ops
    }
}

fn dashed_outline(r: kurbo::Rect, color: crate::color::Rgba8) -> PaintOp {
    let style = kurbo::Stroke::new(2.0).with_dashes(0.0, [6.0, 4.0]);
    PaintOp::FillPath {
        path: kurbo::stroke(
            r.to_path(0.1).iter(),
            &style,
            &kurbo::StrokeOpts::default(),
            0.1,
        ),
        color,
    }
}

fn active_crop(project: &Project) -> ActiveCrop {
    let (w, h) = project
        .steps
        .get(project.current_step)
        .map(|s| (s.image.width(), s.image.height()))
        .unwrap_or((0, 0));
    ActiveCrop::resolve(project.crop.as_ref(), w, h)
}

/// Stored-space bounding box of a layer, for hit tests and the selection
/// outline.
fn layer_bounds(layer: &Layer) -> StoredRect {
    match &layer.body {
        LayerBody::Click { x, y } => StoredRect::new(x - 30, y - 30, x + 30, y + 30),
        LayerBody::Blur { rect, .. }
        | LayerBody::Zoom { rect, .. }
        | LayerBody::InfoBox { rect, .. }
        | LayerBody::Spotlight { rect, .. } => *rect,
        LayerBody::Arrow { start, end, .. } => StoredRect::new(start.x, start.y, end.x, end.y),
        LayerBody::Icon { pos, w, h, .. } => StoredRect::from_origin_size(pos.x, pos.y, *w, *h),
        LayerBody::Text { pos, text, font, .. } => {
            // Cheap estimate; precise bounds would need shaping.
            let w = (text.chars().count() as i32) * (font.size as i32) * 3 / 5;
            StoredRect::from_origin_size(pos.x, pos.y, w.max(10), (font.size as i32 * 3 / 2).max(10))
        }
    }
}

/// Topmost layer under the pointer.
fn hit_test(project: &Project, crop: &ActiveCrop, p: DisplayPoint) -> Option<LayerId> {
    let stored = crop.to_stored(p);
    let layers = project.layers_for_step(project.current_step).ok()?;
    layers
        .iter()
        .rev()
        .find(|l| match &l.body {
            LayerBody::Arrow { start, end, .. } => {
                segment_distance(*start, *end, stored) <= f64::from(HANDLE_HIT_RADIUS)
            }
            _ => {
                let b = layer_bounds(l);
                stored.x >= b.x0 && stored.x < b.x1 && stored.y >= b.y0 && stored.y < b.y1
            }
        })
        .map(|l| l.uid)
}

fn segment_distance(a: StoredPoint, b: StoredPoint, p: StoredPoint) -> f64 {
    let (ax, ay) = (f64::from(a.x), f64::from(a.y));
    let (bx, by) = (f64::from(b.x), f64::from(b.y));
    let (px, py) = (f64::from(p.x), f64::from(p.y));
    let (dx, dy) = (bx - ax, by - ay);
    let len2 = dx * dx + dy * dy;
    let t = if len2 == 0.0 {
        0.0
    } else {
        (((px - ax) * dx + (py - ay) * dy) / len2).clamp(0.0, 1.0)
    };
    let (cx, cy) = (ax + t * dx, ay + t * dy);
    ((px - cx).powi(2) + (py - cy).powi(2)).sqrt()
}

fn handle_points(layer: &Layer, crop: &ActiveCrop) -> Vec<(Handle, DisplayPoint)> {
    match &layer.body {
        LayerBody::Arrow { start, end, .. } => vec![
            (Handle::Start, crop.to_display(*start)),
            (Handle::End, crop.to_display(*end)),
        ],
        LayerBody::InfoBox { rect, target, .. } => {
            let mut v = corner_handles(*rect, crop);
            v.push((Handle::Target, crop.to_display(*target)));
            v
        }
        LayerBody::Blur { rect, .. }
        | LayerBody::Zoom { rect, .. }
        | LayerBody::Spotlight { rect, .. } => corner_handles(*rect, crop),
        LayerBody::Icon { pos, w, h, .. } => {
            corner_handles(StoredRect::from_origin_size(pos.x, pos.y, *w, *h), crop)
        }
        LayerBody::Click { .. } | LayerBody::Text { .. } => Vec::new(),
    }
}

fn corner_handles(rect: StoredRect, crop: &ActiveCrop) -> Vec<(Handle, DisplayPoint)> {
    let d = crop.to_display_rect(rect);
    vec![
        (Handle::TopLeft, DisplayPoint::new(d.x0, d.y0)),
        (Handle::TopRight, DisplayPoint::new(d.x1, d.y0)),
        (Handle::BottomLeft, DisplayPoint::new(d.x0, d.y1)),
        (Handle::BottomRight, DisplayPoint::new(d.x1, d.y1)),
    ]
}

fn handle_at(layer: &Layer, crop: &ActiveCrop, p: DisplayPoint) -> Option<Handle> {
    handle_points(layer, crop)
        .into_iter()
        .find(|(_, hp)| (hp.x - p.x).abs() + (hp.y - p.y).abs() <= HANDLE_HIT_RADIUS * 2)
        .map(|(h, _)| h)
}

/// Translate a layer's geometry in stored space. A moved click marker also
/// updates the step's click point and drags zoom targets with it.
fn move_layer(project: &mut Project, uid: LayerId, dx: i32, dy: i32) {
    let Some((_, owner)) = project.find_layer(uid) else {
        return;
    };
    let layers: &mut Vec<Layer> = match owner {
        crate::model::LayerOwner::Step(idx) => &mut project.steps[idx].layers,
        crate::model::LayerOwner::Global => &mut project.global_layers,
    };
    let Some(layer) = layers.iter_mut().find(|l| l.uid == uid) else {
        return;
    };

    let mut moved_click = None;
    match &mut layer.body {
        LayerBody::Click { x, y } => {
            *x += dx;
            *y += dy;
            moved_click = Some(StoredPoint::new(*x, *y));
        }
        LayerBody::Blur { rect, .. }
        | LayerBody::Zoom { rect, .. }
        | LayerBody::InfoBox { rect, .. }
        | LayerBody::Spotlight { rect, .. } => *rect = rect.translated(dx, dy),
        LayerBody::Arrow { start, end, .. } => {
            *start = StoredPoint::new(start.x + dx, start.y + dy);
            *end = StoredPoint::new(end.x + dx, end.y + dy);
        }
        LayerBody::Icon { pos, .. } | LayerBody::Text { pos, .. } => {
            *pos = StoredPoint::new(pos.x + dx, pos.y + dy);
        }
    }

    if let (Some(click), crate::model::LayerOwner::Step(idx)) = (moved_click, owner) {
        let step = &mut project.steps[idx];
        step.click_x = click.x;
        step.click_y = click.y;
        for l in &mut step.layers {
            if let LayerBody::Zoom { target, .. } = &mut l.body {
                *target = click;
            }
        }
    }
}

fn resize_layer(project: &mut Project, uid: LayerId, handle: Handle, p: StoredPoint) {
    let Some((_, owner)) = project.find_layer(uid) else {
        return;
    };
    let layers: &mut Vec<Layer> = match owner {
        crate::model::LayerOwner::Step(idx) => &mut project.steps[idx].layers,
        crate::model::LayerOwner::Global => &mut project.global_layers,
    };
    let Some(layer) = layers.iter_mut().find(|l| l.uid == uid) else {
        return;
    };

    match &mut layer.body {
        LayerBody::Arrow { start, end, .. } => match handle {
            Handle::Start => *start = p,
            Handle::End => *end = p,
            _ => {}
        },
        LayerBody::InfoBox { rect, target, .. } => match handle {
            Handle::Target => *target = p,
            _ => *rect = clamp_min(corner_resize(*rect, handle, p), MIN_SHAPE_SIZE),
        },
        LayerBody::Zoom { rect, .. } => {
            *rect = square_clamp_min(corner_resize(*rect, handle, p), MIN_ZOOM_SIZE);
        }
        LayerBody::Blur { rect, .. } | LayerBody::Spotlight { rect, .. } => {
            *rect = clamp_min(corner_resize(*rect, handle, p), MIN_SHAPE_SIZE);
        }
        LayerBody::Icon { pos, w, h, .. } => {
            let r = clamp_min(
                corner_resize(StoredRect::from_origin_size(pos.x, pos.y, *w, *h), handle, p),
                MIN_SHAPE_SIZE,
            );
            *pos = StoredPoint::new(r.x0, r.y0);
            *w = r.width();
            *h = r.height();
        }
        LayerBody::Click { .. } | LayerBody::Text { .. } => {}
    }
}

fn corner_resize(rect: StoredRect, handle: Handle, p: StoredPoint) -> StoredRect {
    let (mut x0, mut y0, mut x1, mut y1) = (rect.x0, rect.y0, rect.x1, rect.y1);
    match handle {
        Handle::TopLeft => {
            x0 = p.x;
            y0 = p.y;
        }
        Handle::TopRight => {
            x1 = p.x;
            y0 = p.y;
        }
        Handle::BottomLeft => {
            x0 = p.x;
            y1 = p.y;
        }
        Handle::BottomRight => {
            x1 = p.x;
            y1 = p.y;
        }
        _ => {}
    }
    StoredRect::new(x0, y0, x1, y1)
}

/// Grow an undersized rect to the minimum, keeping its origin.
fn clamp_min(rect: StoredRect, min: i32) -> StoredRect {
    let w = rect.width().max(min);
    let h = rect.height().max(min);
    StoredRect::from_origin_size(rect.x0, rect.y0, w, h)
}

/// Zoom insets stay square: the larger dragged side wins.
fn square_clamp_min(rect: StoredRect, min: i32) -> StoredRect {
    let side = rect.width().max(rect.height()).max(min);
    StoredRect::from_origin_size(rect.x0, rect.y0, side, side)
}

/// Magnify for the interactive view: the source patch comes from the full
/// uncropped capture, the destination is display-space.
fn magnify_from(
    canvas: &mut RgbaImage,
    full: &RgbaImage,
    src: kurbo::Rect,
    dst: kurbo::Rect,
) -> StepdocResult<()> {
    let (iw, ih) = (full.width() as i32, full.height() as i32);
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
    let patch = imageops::crop_imm(full, sx0 as u32, sy0 as u32, sw, sh).to_image();
    let scaled = imageops::resize(&patch, tw, th, imageops::FilterType::Triangle);
    let ox = (dst.x0 + (dst.width() - f64::from(tw)) / 2.0).round() as i64;
    let oy = (dst.y0 + (dst.height() - f64::from(th)) / 2.0).round() as i64;
    imageops::replace(canvas, &scaled, ox, oy);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::LayerTarget;

    fn project() -> Project {
        let img = Arc::new(RgbaImage::from_pixel(
            200,
            150,
            image::Rgba([120, 120, 120, 255]),
        ));
        let mut p = Project::new();
        p.append_step(img, 100, 75, "step");
        p
    }

    fn drag(surface: &mut EditSurface, project: &Project, from: (i32, i32), to: (i32, i32)) -> SurfaceAction {
        surface.pointer_down(project, DisplayPoint::new(from.0, from.1));
        // pointer_move needs &mut Project only for edits; drawing ignores it.
        surface.pointer_up(project, DisplayPoint::new(to.0, to.1))
    }

    #[test]
    fn blur_drag_commits_clamped_rect() {
        let mut s = EditSurface::new();
        let p = project();
        s.set_tool(Tool::Blur);
        let action = drag(&mut s, &p, (10, 10), (15, 12));
        match action {
            SurfaceAction::AddLayer(LayerBody::Blur { rect, strength }) => {
                assert_eq!(rect, StoredRect::from_origin_size(10, 10, 20, 20));
                assert_eq!(strength, 40);
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn zoom_drag_is_square_with_min_50_and_targets_click() {
        let mut s = EditSurface::new();
        let p = project();
        s.set_tool(Tool::Zoom);
        let action = drag(&mut s, &p, (10, 10), (70, 40));
        match action {
            SurfaceAction::AddLayer(LayerBody::Zoom { rect, target, .. }) => {
                assert_eq!(rect.width(), 60);
                assert_eq!(rect.height(), 60);
                assert_eq!(target, StoredPoint::new(100, 75));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn drawing_converts_display_to_stored_under_crop() {
        let mut s = EditSurface::new();
        let mut p = project();
        p.crop = Some(CropViewport::new(50, 30, 180, 130));
        s.set_tool(Tool::Spotlight);
        let action = drag(&mut s, &p, (10, 10), (60, 50));
        match action {
            SurfaceAction::AddLayer(LayerBody::Spotlight { rect, .. }) => {
                assert_eq!(rect, StoredRect::new(60, 40, 110, 80));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn text_tool_enters_modal_state_and_empty_text_cancels() {
        let mut s = EditSurface::new();
        let p = project();
        s.set_tool(Tool::Text);
        assert_eq!(drag(&mut s, &p, (40, 40), (40, 40)), SurfaceAction::TextPending);
        assert!(s.text_pending());
        assert_eq!(s.submit_text(""), SurfaceAction::None);
        assert!(!s.text_pending());
    }

    #[test]
    fn info_box_submit_creates_layer_with_defaults() {
        let mut s = EditSurface::new();
        let p = project();
        s.set_tool(Tool::InfoBox);
        drag(&mut s, &p, (10, 10), (120, 60));
        let action = s.submit_text("read this");
        match action {
            SurfaceAction::AddLayer(LayerBody::InfoBox {
                rect,
                text,
                border_width,
                corner_radius,
                ..
            }) => {
                assert_eq!(rect, StoredRect::new(10, 10, 120, 60));
                assert_eq!(text, "read this");
                assert_eq!(border_width, 2);
                assert_eq!(corner_radius, 5);
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn select_hit_move_updates_geometry() {
        let mut s = EditSurface::new();
        let mut p = project();
        let uid = p
            .add_layer(
                LayerTarget::Step(0),
                LayerBody::spotlight(StoredRect::new(20, 20, 60, 60)),
                None,
            )
            .unwrap();

        s.set_tool(Tool::Select);
        let action = s.pointer_down(&p, DisplayPoint::new(40, 40));
        assert_eq!(action, SurfaceAction::SelectionChanged(Some(uid)));
        s.pointer_move(&mut p, DisplayPoint::new(50, 45));
        let action = s.pointer_up(&p, DisplayPoint::new(50, 45));
        assert_eq!(action, SurfaceAction::LayerEdited(uid));

        let (layer, _) = p.find_layer(uid).unwrap();
        match &layer.body {
            LayerBody::Spotlight { rect, .. } => {
                assert_eq!(*rect, StoredRect::new(30, 25, 70, 65));
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn moving_click_marker_drags_zoom_targets() {
        let mut s = EditSurface::new();
        let mut p = project();
        let zoom = p
            .add_layer(
                LayerTarget::Step(0),
                LayerBody::zoom(
                    StoredRect::from_origin_size(10, 10, 60, 60),
                    StoredPoint::new(100, 75),
                ),
                None,
            )
            .unwrap();
        let click = p.steps[0].click_layer().unwrap().uid;

        move_layer(&mut p, click, 10, -5);
        assert_eq!((p.steps[0].click_x, p.steps[0].click_y), (110, 70));
        let (layer, _) = p.find_layer(zoom).unwrap();
        match &layer.body {
            LayerBody::Zoom { target, .. } => assert_eq!(*target, StoredPoint::new(110, 70)),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn reconcile_clears_stale_selection() {
        let mut s = EditSurface::new();
        let mut p = project();
        let uid = p
            .add_layer(
                LayerTarget::Step(0),
                LayerBody::spotlight(StoredRect::new(0, 0, 40, 40)),
                None,
            )
            .unwrap();
        s.select(&p, Some(uid));
        assert_eq!(s.selection(), Some(uid));

        p.remove_layer(uid);
        s.reconcile(&p);
        assert_eq!(s.selection(), None);
    }

    #[test]
    fn registry_mirrors_layers_and_selection() {
        let mut s = EditSurface::new();
        let mut p = project();
        let uid = p
            .add_layer(
                LayerTarget::Global,
                LayerBody::Blur {
                    rect: StoredRect::new(0, 0, 30, 30),
                    strength: 40,
                },
                None,
            )
            .unwrap();
        s.select(&p, Some(uid));

        let rows = s.registry(&p).unwrap();
        assert_eq!(rows.len(), 2); // global blur + click
        let blur_row = rows.iter().find(|r| r.uid == uid).unwrap();
        assert!(blur_row.is_global);
        assert!(blur_row.selected);
        assert_eq!(blur_row.kind, "blur");
    }

    #[test]
    fn render_produces_crop_sized_canvas() {
        let mut s = EditSurface::new();
        let mut p = project();
        p.crop = Some(CropViewport::new(20, 10, 120, 90));
        let marker = MarkerAppearance::default();
        let out = s.render(&p, &marker).unwrap();
        assert_eq!((out.width(), out.height()), (100, 80));
    }
}
