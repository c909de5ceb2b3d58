use std::sync::Arc;

use image::RgbaImage;
use uuid::Uuid;

use crate::{
    color::{FontSpec, Rgba8},
    error::{StepdocError, StepdocResult},
    geom::{CropViewport, StoredPoint, StoredRect},
};

/// Stable layer identity. Generated once, preserved across serialization,
/// undo, and promotion; never derived from position or object address.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct LayerId(pub Uuid);

impl LayerId {
    pub fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum IconKind {
    Check,
    Cross,
    Warn,
    Info,
    Star,
    Idea,
    ArrowUp,
    ArrowDown,
    Heart,
}

impl IconKind {
    /// Glyph for the interactive surface.
    pub fn glyph(self) -> &'static str {
        match self {
            Self::Check => "\u{2714}",
            Self::Cross => "\u{2716}",
            Self::Warn => "\u{26A0}",
            Self::Info => "\u{2139}",
            Self::Star => "\u{2605}",
            Self::Idea => "\u{1F4A1}",
            Self::ArrowUp => "\u{2B06}",
            Self::ArrowDown => "\u{2B07}",
            Self::Heart => "\u{2764}",
        }
    }

    /// ASCII substitute for the flatten backend, where glyph coverage of the
    /// export text path is not guaranteed.
    pub fn ascii(self) -> &'static str {
        match self {
            Self::Check => "OK",
            Self::Cross => "X",
            Self::Warn => "!",
            Self::Info => "i",
            Self::Star => "*",
            Self::Idea => "?",
            Self::ArrowUp => "^",
            Self::ArrowDown => "v",
            Self::Heart => "<3",
        }
    }

    /// Wire name used in the project file.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Check => "check",
            Self::Cross => "cross",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Star => "star",
            Self::Idea => "idea",
            Self::ArrowUp => "arrow_up",
            Self::ArrowDown => "arrow_down",
            Self::Heart => "heart",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        Some(match name {
            "check" => Self::Check,
            "cross" => Self::Cross,
            "warn" => Self::Warn,
            "info" => Self::Info,
            "star" => Self::Star,
            "idea" => Self::Idea,
            "arrow_up" => Self::ArrowUp,
            "arrow_down" => Self::ArrowDown,
            "heart" => Self::Heart,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum HAlign {
    Left,
    Center,
    Right,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum VAlign {
    Top,
    Center,
    Bottom,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SpotlightShape {
    Rect,
    Ellipse,
}

/// Kind-specific annotation payload. All geometry is stored-space
/// ([`StoredPoint`]/[`StoredRect`]), never display-space; the crop viewport
/// is purely a rendering-time concern.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum LayerBody {
    Click {
        x: i32,
        y: i32,
    },
    Blur {
        rect: StoredRect,
        /// Gaussian kernel basis; forced odd (`strength | 1`) at paint time.
        strength: u32,
    },
    Zoom {
        /// Square inset box: origin plus side length.
        rect: StoredRect,
        target: StoredPoint,
        color: Rgba8,
    },
    Arrow {
        start: StoredPoint,
        end: StoredPoint,
        color: Rgba8,
        width: u32,
    },
    Icon {
        pos: StoredPoint,
        w: i32,
        h: i32,
        symbol: IconKind,
        color: Rgba8,
    },
    InfoBox {
        rect: StoredRect,
        target: StoredPoint,
        text: String,
        border_color: Rgba8,
        bg_color: Rgba8,
        text_color: Rgba8,
        border_width: u32,
        corner_radius: u32,
        h_align: HAlign,
        v_align: VAlign,
        font: FontSpec,
    },
    Spotlight {
        rect: StoredRect,
        dim_opacity: f32,
        shape: SpotlightShape,
        color: Rgba8,
    },
    Text {
        pos: StoredPoint,
        text: String,
        color: Rgba8,
        font: FontSpec,
    },
}

impl LayerBody {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Click { .. } => "click",
            Self::Blur { .. } => "blur",
            Self::Zoom { .. } => "zoom",
            Self::Arrow { .. } => "arrow",
            Self::Icon { .. } => "icon",
            Self::InfoBox { .. } => "infobox",
            Self::Spotlight { .. } => "spotlight",
            Self::Text { .. } => "text",
        }
    }

    pub fn is_click(&self) -> bool {
        matches!(self, Self::Click { .. })
    }

    /// Zoom inset with the stock white frame.
    pub fn zoom(rect: StoredRect, target: StoredPoint) -> Self {
        Self::Zoom {
            rect,
            target,
            color: Rgba8::WHITE,
        }
    }

    /// Info box with the stock dark translucent styling.
    pub fn info_box(rect: StoredRect, target: StoredPoint, text: impl Into<String>) -> Self {
        Self::InfoBox {
            rect,
            target,
            text: text.into(),
            border_color: Rgba8::WHITE,
            bg_color: Rgba8::new(40, 40, 40, 220),
            text_color: Rgba8::WHITE,
            border_width: 2,
            corner_radius: 5,
            h_align: HAlign::Left,
            v_align: VAlign::Top,
            font: FontSpec::info_box_default(),
        }
    }

    /// Spotlight with the stock 60% black dim.
    pub fn spotlight(rect: StoredRect) -> Self {
        Self::Spotlight {
            rect,
            dim_opacity: 0.6,
            shape: SpotlightShape::Rect,
            color: Rgba8::BLACK,
        }
    }
}

/// One annotation: stable identity plus kind-specific payload.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Layer {
    pub uid: LayerId,
    pub label: String,
    pub is_global: bool,
    pub body: LayerBody,
}

impl Layer {
    pub fn new(body: LayerBody, label: impl Into<String>, is_global: bool) -> Self {
        Self {
            uid: LayerId::fresh(),
            label: label.into(),
            is_global,
            body,
        }
    }

    /// Default display label for a body, matching the layer list.
    pub fn default_label(body: &LayerBody) -> &'static str {
        match body {
            LayerBody::Click { .. } => "Click",
            LayerBody::Blur { .. } => "Blur",
            LayerBody::Zoom { .. } => "Zoom",
            LayerBody::Arrow { .. } => "Arrow",
            LayerBody::Icon { .. } => "Icon",
            LayerBody::InfoBox { .. } => "InfoBox",
            LayerBody::Spotlight { .. } => "Spotlight",
            LayerBody::Text { .. } => "Text",
        }
    }
}

/// Process-wide click-marker appearance. A plain value handed to both
/// renderer backends at call time; load/save lifecycle belongs to the
/// application shell.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MarkerAppearance {
    pub color: Rgba8,
    pub text_color: Rgba8,
    /// Radius basis in pixels; every ring scales from this.
    pub size: u32,
    pub border_width: u32,
    pub show_glow: bool,
    pub number_size: u32,
}

impl Default for MarkerAppearance {
    fn default() -> Self {
        Self {
            color: Rgba8::rgb(0, 168, 255),
            text_color: Rgba8::WHITE,
            size: 40,
            border_width: 3,
            show_glow: true,
            number_size: 16,
        }
    }
}

impl MarkerAppearance {
    /// Parse the settings file, tolerating the legacy 3-element color form
    /// and missing fields (every field falls back to its default).
    pub fn from_json(v: &serde_json::Value) -> Self {
        let d = Self::default();
        Self {
            color: v.get("color").and_then(Rgba8::from_json).unwrap_or(d.color),
            text_color: v
                .get("text_color")
                .and_then(Rgba8::from_json)
                .unwrap_or(d.text_color),
            size: v
                .get("size")
                .and_then(serde_json::Value::as_u64)
                .map(|n| n as u32)
                .unwrap_or(d.size),
            border_width: v
                .get("border_width")
                .and_then(serde_json::Value::as_u64)
                .map(|n| n as u32)
                .unwrap_or(d.border_width),
            show_glow: v
                .get("show_glow")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(d.show_glow),
            number_size: v
                .get("number_size")
                .and_then(serde_json::Value::as_u64)
                .map(|n| n as u32)
                .unwrap_or(d.number_size),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "color": [self.color.r, self.color.g, self.color.b, self.color.a],
            "text_color": [self.text_color.r, self.text_color.g, self.text_color.b],
            "size": self.size,
            "border_width": self.border_width,
            "show_glow": self.show_glow,
            "number_size": self.number_size,
        })
    }

    pub fn load(path: &std::path::Path) -> StepdocResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| StepdocError::serde(format!("read marker settings: {e}")))?;
        let v: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| StepdocError::serde(format!("parse marker settings: {e}")))?;
        Ok(Self::from_json(&v))
    }

    pub fn save(&self, path: &std::path::Path) -> StepdocResult<()> {
        let text = serde_json::to_string_pretty(&self.to_json())
            .map_err(|e| StepdocError::serde(format!("encode marker settings: {e}")))?;
        std::fs::write(path, text)
            .map_err(|e| StepdocError::serde(format!("write marker settings: {e}")))?;
        Ok(())
    }
}

/// One recorded interaction: the captured frame, the click point, and the
/// step-local annotation layers. The image buffer is immutable once captured
/// and shared by reference (undo snapshots, thumbnails).
#[derive(Clone, Debug)]
pub struct Step {
    pub image: Arc<RgbaImage>,
    pub click_x: i32,
    pub click_y: i32,
    pub description: String,
    pub layers: Vec<Layer>,
}

impl Step {
    /// A step always carries exactly one Click layer, created here.
    pub fn new(image: Arc<RgbaImage>, x: i32, y: i32, description: impl Into<String>) -> Self {
        Self {
            image,
            click_x: x,
            click_y: y,
            description: description.into(),
            layers: vec![Layer::new(LayerBody::Click { x, y }, "Click", false)],
        }
    }

    pub fn click_layer(&self) -> Option<&Layer> {
        self.layers.iter().find(|l| l.body.is_click())
    }
}

/// Where a layer currently lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerOwner {
    Step(usize),
    Global,
}

/// Target set for [`Project::add_layer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerTarget {
    Step(usize),
    Global,
}

/// The full editable document: ordered steps, the global layer set, the crop
/// viewport, and the step currently shown.
#[derive(Clone, Debug, Default)]
pub struct Project {
    pub steps: Vec<Step>,
    pub global_layers: Vec<Layer>,
    pub crop: Option<CropViewport>,
    pub current_step: usize,
}

impl Project {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture boundary: append a freshly recorded step. The mandatory Click
    /// layer is seeded by [`Step::new`]. Returns the new step index.
    pub fn append_step(
        &mut self,
        image: Arc<RgbaImage>,
        x: i32,
        y: i32,
        label: impl Into<String>,
    ) -> usize {
        self.steps.push(Step::new(image, x, y, label));
        self.steps.len() - 1
    }

    /// 1-based number painted into the click marker.
    pub fn step_number(&self, idx: usize) -> u32 {
        idx as u32 + 1
    }

    pub fn delete_step(&mut self, idx: usize) -> StepdocResult<()> {
        if self.steps.len() <= 1 {
            return Err(StepdocError::validation(
                "a project must keep at least one step",
            ));
        }
        if idx >= self.steps.len() {
            return Err(StepdocError::validation("step index out of bounds"));
        }
        self.steps.remove(idx);
        if self.current_step >= self.steps.len() {
            self.current_step = self.steps.len() - 1;
        }
        Ok(())
    }

    pub fn reorder_step(&mut self, from: usize, to: usize) -> StepdocResult<()> {
        if from >= self.steps.len() || to >= self.steps.len() {
            return Err(StepdocError::validation("step index out of bounds"));
        }
        let step = self.steps.remove(from);
        self.steps.insert(to, step);
        Ok(())
    }

    pub fn set_description(&mut self, idx: usize, text: impl Into<String>) -> StepdocResult<()> {
        let step = self
            .steps
            .get_mut(idx)
            .ok_or_else(|| StepdocError::validation("step index out of bounds"))?;
        step.description = text.into();
        Ok(())
    }

    /// Append a new layer with a fresh uid to a step's list or the global
    /// set; insertion order is the z-order.
    pub fn add_layer(
        &mut self,
        target: LayerTarget,
        body: LayerBody,
        label: Option<String>,
    ) -> StepdocResult<LayerId> {
        let label = label.unwrap_or_else(|| Layer::default_label(&body).to_string());
        match target {
            LayerTarget::Step(idx) => {
                let step = self
                    .steps
                    .get_mut(idx)
                    .ok_or_else(|| StepdocError::validation("step index out of bounds"))?;
                let layer = Layer::new(body, label, false);
                let uid = layer.uid;
                step.layers.push(layer);
                Ok(uid)
            }
            LayerTarget::Global => {
                let layer = Layer::new(body, label, true);
                let uid = layer.uid;
                self.global_layers.push(layer);
                Ok(uid)
            }
        }
    }

    pub fn find_layer(&self, uid: LayerId) -> Option<(&Layer, LayerOwner)> {
        for (idx, step) in self.steps.iter().enumerate() {
            if let Some(l) = step.layers.iter().find(|l| l.uid == uid) {
                return Some((l, LayerOwner::Step(idx)));
            }
        }
        self.global_layers
            .iter()
            .find(|l| l.uid == uid)
            .map(|l| (l, LayerOwner::Global))
    }

    /// Remove a layer from whichever set owns it. Removing a Click layer is
    /// a silent no-op: the click marker is protected.
    pub fn remove_layer(&mut self, uid: LayerId) {
        for step in &mut self.steps {
            if let Some(pos) = step.layers.iter().position(|l| l.uid == uid) {
                if step.layers[pos].body.is_click() {
                    tracing::debug!(%uid, "ignoring removal of protected click layer");
                    return;
                }
                step.layers.remove(pos);
                return;
            }
        }
        if let Some(pos) = self.global_layers.iter().position(|l| l.uid == uid) {
            self.global_layers.remove(pos);
        }
    }

    /// Move a step-local layer into the global set, keeping its uid. Click
    /// layers cannot be promoted.
    pub fn promote_to_global(&mut self, uid: LayerId) -> StepdocResult<()> {
        for step in &mut self.steps {
            if let Some(pos) = step.layers.iter().position(|l| l.uid == uid) {
                if step.layers[pos].body.is_click() {
                    return Err(StepdocError::validation(
                        "the click marker cannot be promoted to global",
                    ));
                }
                let mut layer = step.layers.remove(pos);
                layer.is_global = true;
                self.global_layers.push(layer);
                return Ok(());
            }
        }
        Err(StepdocError::validation("no step-local layer with that uid"))
    }

    /// Move a global layer back to a specific step's list, keeping its uid.
    pub fn demote_to_local(&mut self, uid: LayerId, step_index: usize) -> StepdocResult<()> {
        if step_index >= self.steps.len() {
            return Err(StepdocError::validation("step index out of bounds"));
        }
        let pos = self
            .global_layers
            .iter()
            .position(|l| l.uid == uid)
            .ok_or_else(|| StepdocError::validation("no global layer with that uid"))?;
        let mut layer = self.global_layers.remove(pos);
        layer.is_global = false;
        self.steps[step_index].layers.push(layer);
        Ok(())
    }

    /// Layers visible on a step: the global set first (backdrop annotations
    /// like blurs), then the step-local list, each in insertion order.
    /// Later entries draw on top.
    pub fn layers_for_step(&self, idx: usize) -> StepdocResult<Vec<&Layer>> {
        let step = self
            .steps
            .get(idx)
            .ok_or_else(|| StepdocError::validation("step index out of bounds"))?;
        let mut out: Vec<&Layer> = self.global_layers.iter().collect();
        out.extend(step.layers.iter());
        Ok(out)
    }

    /// Update a global layer's payload in place, keyed by uid, so an edit
    /// made while viewing one step is reflected on every other step.
    pub fn update_global_layer(&mut self, uid: LayerId, body: LayerBody, label: Option<String>) {
        if let Some(existing) = self.global_layers.iter_mut().find(|l| l.uid == uid) {
            existing.body = body;
            if let Some(label) = label {
                existing.label = label;
            }
        }
    }

    pub fn validate(&self) -> StepdocResult<()> {
        for (idx, step) in self.steps.iter().enumerate() {
            let clicks = step.layers.iter().filter(|l| l.body.is_click()).count();
            if clicks != 1 {
                return Err(StepdocError::validation(format!(
                    "step {idx} has {clicks} click layers, expected exactly 1"
                )));
            }
        }
        if !self.steps.is_empty() && self.current_step >= self.steps.len() {
            return Err(StepdocError::validation("current step index out of bounds"));
        }
        for l in &self.global_layers {
            if !l.is_global {
                return Err(StepdocError::validation(format!(
                    "layer {} is in the global set but not flagged global",
                    l.uid
                )));
            }
            if l.body.is_click() {
                return Err(StepdocError::validation(
                    "a click layer can never be global",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_image() -> Arc<RgbaImage> {
        Arc::new(RgbaImage::from_pixel(64, 48, image::Rgba([9, 9, 9, 255])))
    }

    fn two_step_project() -> Project {
        let mut p = Project::new();
        p.append_step(test_image(), 10, 10, "first");
        p.append_step(test_image(), 20, 20, "second");
        p
    }

    #[test]
    fn append_step_seeds_exactly_one_click() {
        let p = two_step_project();
        for step in &p.steps {
            assert_eq!(step.layers.iter().filter(|l| l.body.is_click()).count(), 1);
        }
        p.validate().unwrap();
    }

    #[test]
    fn remove_layer_never_touches_click() {
        let mut p = two_step_project();
        let click_uid = p.steps[0].click_layer().unwrap().uid;
        p.remove_layer(click_uid);
        p.remove_layer(click_uid);
        assert_eq!(
            p.steps[0]
                .layers
                .iter()
                .filter(|l| l.body.is_click())
                .count(),
            1
        );
    }

    #[test]
    fn delete_last_step_is_rejected() {
        let mut p = Project::new();
        p.append_step(test_image(), 0, 0, "only");
        assert!(p.delete_step(0).is_err());
        assert_eq!(p.steps.len(), 1);
    }

    #[test]
    fn delete_step_clamps_current_index() {
        let mut p = two_step_project();
        p.current_step = 1;
        p.delete_step(1).unwrap();
        assert_eq!(p.current_step, 0);
    }

    #[test]
    fn promote_demote_preserves_uid_and_payload() {
        let mut p = two_step_project();
        let body = LayerBody::zoom(
            StoredRect::from_origin_size(5, 5, 100, 100),
            StoredPoint::new(32, 24),
        );
        let uid = p
            .add_layer(LayerTarget::Step(0), body.clone(), None)
            .unwrap();

        p.promote_to_global(uid).unwrap();
        assert!(matches!(p.find_layer(uid), Some((_, LayerOwner::Global))));
        assert!(p.layers_for_step(1).unwrap().iter().any(|l| l.uid == uid));

        p.demote_to_local(uid, 0).unwrap();
        let (layer, owner) = p.find_layer(uid).unwrap();
        assert_eq!(owner, LayerOwner::Step(0));
        assert!(!layer.is_global);
        assert_eq!(layer.body, body);
        assert!(!p.layers_for_step(1).unwrap().iter().any(|l| l.uid == uid));
    }

    #[test]
    fn click_cannot_be_promoted() {
        let mut p = two_step_project();
        let click_uid = p.steps[0].click_layer().unwrap().uid;
        assert!(p.promote_to_global(click_uid).is_err());
    }

    #[test]
    fn layers_for_step_orders_globals_below_locals() {
        let mut p = two_step_project();
        let g = p
            .add_layer(
                LayerTarget::Global,
                LayerBody::Blur {
                    rect: StoredRect::new(0, 0, 8, 8),
                    strength: 40,
                },
                None,
            )
            .unwrap();
        let l = p
            .add_layer(
                LayerTarget::Step(0),
                LayerBody::Arrow {
                    start: StoredPoint::new(0, 0),
                    end: StoredPoint::new(10, 10),
                    color: Rgba8::RED,
                    width: 4,
                },
                None,
            )
            .unwrap();
        let order: Vec<LayerId> = p
            .layers_for_step(0)
            .unwrap()
            .iter()
            .map(|x| x.uid)
            .collect();
        let gi = order.iter().position(|u| *u == g).unwrap();
        let li = order.iter().position(|u| *u == l).unwrap();
        assert!(gi < li);
    }

    #[test]
    fn marker_appearance_roundtrip_and_legacy_colors() {
        let m = MarkerAppearance {
            color: Rgba8::new(1, 2, 3, 128),
            ..MarkerAppearance::default()
        };
        let back = MarkerAppearance::from_json(&m.to_json());
        assert_eq!(back, m);

        // Legacy writers stored 3-element RGB arrays.
        let legacy = serde_json::json!({ "color": [9, 8, 7], "size": 32 });
        let parsed = MarkerAppearance::from_json(&legacy);
        assert_eq!(parsed.color, Rgba8::rgb(9, 8, 7));
        assert_eq!(parsed.size, 32);
        assert_eq!(parsed.border_width, 3);
    }
}
