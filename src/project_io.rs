//! Project persistence. The on-disk layout is one directory per project:
//! `project.json` plus an `images/` folder holding each step's capture as
//! `step_{i}.png` (0-based). The JSON schema is the legacy tagged-record
//! form: every layer is `{"type": ..., "data": {...}, "label": ...}`, with
//! per-kind data keys; global layers additionally carry their uid.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    color::{FontSpec, Rgba8},
    error::{StepdocError, StepdocResult},
    geom::{CropViewport, StoredPoint, StoredRect},
    model::{
        HAlign, IconKind, Layer, LayerBody, LayerId, Project, SpotlightShape, Step, VAlign,
    },
};

pub fn save_project(project: &Project, root: &Path, name: &str) -> StepdocResult<PathBuf> {
    let base = root.join(name);
    let img_dir = base.join("images");
    std::fs::create_dir_all(&img_dir)
        .map_err(|e| StepdocError::serde(format!("create project dir: {e}")))?;

    let mut steps = Vec::with_capacity(project.steps.len());
    for (i, step) in project.steps.iter().enumerate() {
        let filename = format!("step_{i}.png");
        step.image
            .save(img_dir.join(&filename))
            .map_err(|e| StepdocError::serde(format!("write {filename}: {e}")))?;
        steps.push(json!({
            "image": filename,
            "description": step.description,
            "layers": step.layers.iter().map(|l| encode_layer(l, false)).collect::<Vec<_>>(),
        }));
    }

    let data = json!({
        "global_crop": project.crop.map(|c| json!([c.rect.x0, c.rect.y0, c.rect.x1, c.rect.y1])),
        "global_layers": project
            .global_layers
            .iter()
            .map(|l| encode_layer(l, true))
            .collect::<Vec<_>>(),
        "steps": steps,
    });

    let path = base.join("project.json");
    // 4-space indent, matching files written by earlier versions.
    let mut buf = Vec::new();
    let fmt = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, fmt);
    serde::Serialize::serialize(&data, &mut ser)
        .map_err(|e| StepdocError::serde(format!("encode project: {e}")))?;
    std::fs::write(&path, buf)
        .map_err(|e| StepdocError::serde(format!("write project.json: {e}")))?;
    tracing::info!(project = name, steps = project.steps.len(), "project saved");
    Ok(path)
}

pub fn load_project(root: &Path, name: &str) -> StepdocResult<Project> {
    let base = root.join(name);
    let text = std::fs::read_to_string(base.join("project.json"))
        .map_err(|e| StepdocError::serde(format!("read project.json: {e}")))?;
    let data: Value = serde_json::from_str(&text)
        .map_err(|e| StepdocError::serde(format!("parse project.json: {e}")))?;

    let mut project = Project::new();

    project.crop = data.get("global_crop").and_then(|v| {
        let arr = v.as_array()?;
        let n = |i: usize| -> Option<i32> { arr.get(i)?.as_i64().map(|x| x as i32) };
        Some(CropViewport::new(n(0)?, n(1)?, n(2)?, n(3)?))
    });

    for entry in data
        .get("global_layers")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        match decode_layer(entry, true) {
            Ok(layer) => project.global_layers.push(layer),
            Err(e) => tracing::warn!(error = %e, "skipping unreadable global layer"),
        }
    }

    let img_dir = base.join("images");
    for step_data in data
        .get("steps")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let filename = step_data
            .get("image")
            .and_then(Value::as_str)
            .ok_or_else(|| StepdocError::serde("step record missing image filename"))?;
        let image = match image::open(img_dir.join(filename)) {
            Ok(img) => img.to_rgba8(),
            Err(e) => {
                tracing::warn!(image = filename, error = %e, "skipping step with unreadable image");
                continue;
            }
        };

        let mut layers = Vec::new();
        for entry in step_data
            .get("layers")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            match decode_layer(entry, false) {
                Ok(layer) => layers.push(layer),
                Err(e) => tracing::warn!(error = %e, "skipping unreadable layer"),
            }
        }

        let (x, y) = layers
            .iter()
            .find_map(|l| match l.body {
                LayerBody::Click { x, y } => Some((x, y)),
                _ => None,
            })
            .unwrap_or((0, 0));

        let mut step = Step {
            image: Arc::new(image),
            click_x: x,
            click_y: y,
            description: step_data
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            layers,
        };
        // Older files can lack the click record; every step must have one.
        if step.click_layer().is_none() {
            step.layers
                .insert(0, Layer::new(LayerBody::Click { x, y }, "Click", false));
        }
        project.steps.push(step);
    }

    project.validate()?;
    Ok(project)
}

fn encode_layer(layer: &Layer, with_uid: bool) -> Value {
    let (kind, data) = encode_body(&layer.body);
    let mut obj = json!({
        "type": kind,
        "data": data,
        "label": layer.label,
    });
    if with_uid {
        obj["uid"] = json!(layer.uid.0.to_string());
    }
    obj
}

fn encode_body(body: &LayerBody) -> (&'static str, Value) {
    match body {
        LayerBody::Click { x, y } => ("click", json!({ "x": x, "y": y })),
        LayerBody::Blur { rect, strength } => (
            "blur",
            json!({
                "coords": [rect.x0, rect.y0, rect.x1, rect.y1],
                "strength": strength,
            }),
        ),
        LayerBody::Zoom {
            rect,
            target,
            color,
        } => (
            "zoom",
            json!({
                "x": rect.x0, "y": rect.y0, "size": rect.width(),
                "target_x": target.x, "target_y": target.y,
                "color": color.to_json(),
            }),
        ),
        LayerBody::Arrow {
            start,
            end,
            color,
            width,
        } => (
            "arrow",
            json!({
                "sx": start.x, "sy": start.y, "ex": end.x, "ey": end.y,
                "color": color.to_json(), "width": width,
            }),
        ),
        LayerBody::Icon {
            pos,
            w,
            h,
            symbol,
            color,
        } => (
            "icon",
            json!({
                "x": pos.x, "y": pos.y, "w": w, "h": h,
                "type": symbol.wire_name(), "color": color.to_json(),
            }),
        ),
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
        } => (
            "infobox",
            json!({
                "x": rect.x0, "y": rect.y0, "w": rect.width(), "h": rect.height(),
                "target_x": target.x, "target_y": target.y,
                "text": text,
                "color": border_color.to_json(),
                "bg_color": [bg_color.r, bg_color.g, bg_color.b, bg_color.a],
                "text_color": text_color.to_json(),
                "border_width": border_width,
                "corner_radius": corner_radius,
                "h_align": h_align_name(*h_align),
                "v_align": v_align_name(*v_align),
                "font": encode_font(font),
            }),
        ),
        LayerBody::Spotlight {
            rect,
            dim_opacity,
            shape,
            color,
        } => (
            "spotlight",
            json!({
                "x": rect.x0, "y": rect.y0, "w": rect.width(), "h": rect.height(),
                "opacity": dim_opacity,
                "shape": match shape { SpotlightShape::Rect => "rect", SpotlightShape::Ellipse => "ellipse" },
                "color": color.to_json(),
            }),
        ),
        LayerBody::Text {
            pos,
            text,
            color,
            font,
        } => (
            "text",
            json!({
                "text": text, "x": pos.x, "y": pos.y,
                "color": color.to_json(),
                "font": encode_font(font),
            }),
        ),
    }
}

fn decode_layer(entry: &Value, with_uid: bool) -> StepdocResult<Layer> {
    let kind = entry
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| StepdocError::serde("layer record missing type"))?;
    let data = entry
        .get("data")
        .ok_or_else(|| StepdocError::serde("layer record missing data"))?;
    let body = decode_body(kind, data)?;

    let label = entry
        .get("label")
        .and_then(Value::as_str)
        .unwrap_or(Layer::default_label(&body))
        .to_string();

    let uid = entry
        .get("uid")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .map(LayerId)
        .unwrap_or_else(LayerId::fresh);

    Ok(Layer {
        uid,
        label,
        is_global: with_uid,
        body,
    })
}

fn decode_body(kind: &str, d: &Value) -> StepdocResult<LayerBody> {
    let int = |key: &str| -> StepdocResult<i32> {
        d.get(key)
            .and_then(Value::as_i64)
            .map(|v| v as i32)
            .ok_or_else(|| StepdocError::serde(format!("{kind} record missing '{key}'")))
    };
    let int_or = |key: &str, default: i32| -> i32 {
        d.get(key).and_then(Value::as_i64).map_or(default, |v| v as i32)
    };
    let color_or = |key: &str, default: Rgba8| -> Rgba8 {
        d.get(key).and_then(Rgba8::from_json).unwrap_or(default)
    };

    Ok(match kind {
        "click" => LayerBody::Click {
            x: int("x")?,
            y: int("y")?,
        },
        "blur" => {
            let coords = d
                .get("coords")
                .and_then(Value::as_array)
                .ok_or_else(|| StepdocError::serde("blur record missing 'coords'"))?;
            let n = |i: usize| -> StepdocResult<i32> {
                coords
                    .get(i)
                    .and_then(Value::as_i64)
                    .map(|v| v as i32)
                    .ok_or_else(|| StepdocError::serde("blur coords must be 4 integers"))
            };
            LayerBody::Blur {
                rect: StoredRect::new(n(0)?, n(1)?, n(2)?, n(3)?),
                strength: int_or("strength", 40).max(1) as u32,
            }
        }
        "zoom" => {
            let size = int("size")?;
            LayerBody::Zoom {
                rect: StoredRect::from_origin_size(int("x")?, int("y")?, size, size),
                target: StoredPoint::new(int("target_x")?, int("target_y")?),
                color: color_or("color", Rgba8::WHITE),
            }
        }
        "arrow" => LayerBody::Arrow {
            start: StoredPoint::new(int("sx")?, int("sy")?),
            end: StoredPoint::new(int("ex")?, int("ey")?),
            color: color_or("color", Rgba8::RED),
            width: int_or("width", 4).max(1) as u32,
        },
        "icon" => {
            // Older writers stored a single 'size' instead of w/h.
            let fallback = int_or("size", 60);
            LayerBody::Icon {
                pos: StoredPoint::new(int("x")?, int("y")?),
                w: int_or("w", fallback),
                h: int_or("h", fallback),
                symbol: d
                    .get("type")
                    .and_then(Value::as_str)
                    .and_then(IconKind::from_wire)
                    .unwrap_or(IconKind::Info),
                color: color_or("color", Rgba8::RED),
            }
        }
        "infobox" => LayerBody::InfoBox {
            rect: StoredRect::from_origin_size(int("x")?, int("y")?, int("w")?, int("h")?),
            target: StoredPoint::new(int_or("target_x", 0), int_or("target_y", 0)),
            text: d
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            border_color: color_or("color", Rgba8::WHITE),
            bg_color: color_or("bg_color", Rgba8::new(40, 40, 40, 220)),
            text_color: color_or("text_color", Rgba8::WHITE),
            border_width: int_or("border_width", 2).max(0) as u32,
            corner_radius: int_or("corner_radius", 5).max(0) as u32,
            h_align: h_align_from(d.get("h_align").and_then(Value::as_str)),
            v_align: v_align_from(d.get("v_align").and_then(Value::as_str)),
            font: decode_font(d.get("font"), FontSpec::info_box_default()),
        },
        "spotlight" => LayerBody::Spotlight {
            rect: StoredRect::from_origin_size(int("x")?, int("y")?, int("w")?, int("h")?),
            dim_opacity: d
                .get("opacity")
                .and_then(Value::as_f64)
                .unwrap_or(0.6)
                .clamp(0.0, 1.0) as f32,
            shape: match d.get("shape").and_then(Value::as_str) {
                Some("ellipse") => SpotlightShape::Ellipse,
                _ => SpotlightShape::Rect,
            },
            color: color_or("color", Rgba8::BLACK),
        },
        "text" => LayerBody::Text {
            pos: StoredPoint::new(int("x")?, int("y")?),
            text: d
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            color: color_or("color", Rgba8::WHITE),
            font: decode_font(d.get("font"), FontSpec::text_default()),
        },
        other => {
            return Err(StepdocError::serde(format!("unknown layer type '{other}'")));
        }
    })
}

fn encode_font(f: &FontSpec) -> Value {
    json!({
        "family": f.family,
        "size": f.size,
        "bold": f.bold,
        "italic": f.italic,
        "underline": f.underline,
    })
}

fn decode_font(v: Option<&Value>, default: FontSpec) -> FontSpec {
    let Some(v) = v else { return default };
    FontSpec {
        family: v
            .get("family")
            .and_then(Value::as_str)
            .unwrap_or(&default.family)
            .to_string(),
        size: v
            .get("size")
            .and_then(Value::as_u64)
            .map(|n| n as u32)
            .filter(|n| *n > 0)
            .unwrap_or(default.size),
        bold: v.get("bold").and_then(Value::as_bool).unwrap_or(default.bold),
        italic: v
            .get("italic")
            .and_then(Value::as_bool)
            .unwrap_or(default.italic),
        underline: v
            .get("underline")
            .and_then(Value::as_bool)
            .unwrap_or(default.underline),
    }
}

fn h_align_name(a: HAlign) -> &'static str {
    match a {
        HAlign::Left => "left",
        HAlign::Center => "center",
        HAlign::Right => "right",
    }
}

fn h_align_from(s: Option<&str>) -> HAlign {
    match s {
        Some("center") => HAlign::Center,
        Some("right") => HAlign::Right,
        _ => HAlign::Left,
    }
}

fn v_align_name(a: VAlign) -> &'static str {
    match a {
        VAlign::Top => "top",
        VAlign::Center => "center",
        VAlign::Bottom => "bottom",
    }
}

fn v_align_from(s: Option<&str>) -> VAlign {
    match s {
        Some("center") => VAlign::Center,
        Some("bottom") => VAlign::Bottom,
        _ => VAlign::Top,
    }
}
