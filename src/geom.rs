//! Integer geometry in two distinct coordinate spaces.
//!
//! Every coordinate persisted in the model lives in *stored* space: the pixel
//! grid of the full, uncropped capture. The renderer and the editable surface
//! work in *display* space: the pixel grid of the crop viewport. The two are
//! separate types so a display-space value can never leak into the model; the
//! only way across is [`ActiveCrop`].

/// Point in full-original-image space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StoredPoint {
    pub x: i32,
    pub y: i32,
}

impl StoredPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in full-original-image space, kept normalized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StoredRect {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl StoredRect {
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn from_origin_size(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self::new(x, y, x + w, y + h)
    }

    pub fn width(&self) -> i32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> i32 {
        self.y1 - self.y0
    }

    pub fn center(&self) -> StoredPoint {
        StoredPoint::new((self.x0 + self.x1) / 2, (self.y0 + self.y1) / 2)
    }

    pub fn translated(&self, dx: i32, dy: i32) -> Self {
        Self {
            x0: self.x0 + dx,
            y0: self.y0 + dy,
            x1: self.x1 + dx,
            y1: self.y1 + dy,
        }
    }

    pub fn to_kurbo(&self) -> kurbo::Rect {
        kurbo::Rect::new(
            f64::from(self.x0),
            f64::from(self.y0),
            f64::from(self.x1),
            f64::from(self.y1),
        )
    }
}

/// Point in cropped display space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisplayPoint {
    pub x: i32,
    pub y: i32,
}

impl DisplayPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Rectangle in cropped display space, kept normalized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisplayRect {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl DisplayRect {
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn from_origin_size(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self::new(x, y, x + w, y + h)
    }

    pub fn width(&self) -> i32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> i32 {
        self.y1 - self.y0
    }

    pub fn center(&self) -> DisplayPoint {
        DisplayPoint::new((self.x0 + self.x1) / 2, (self.y0 + self.y1) / 2)
    }

    pub fn to_kurbo(&self) -> kurbo::Rect {
        kurbo::Rect::new(
            f64::from(self.x0),
            f64::from(self.y0),
            f64::from(self.x1),
            f64::from(self.y1),
        )
    }
}

/// User-drawn crop viewport, stored-space, as drawn (not yet clamped).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CropViewport {
    pub rect: StoredRect,
}

impl CropViewport {
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self {
            rect: StoredRect::new(x0, y0, x1, y1),
        }
    }
}

/// Crop resolved against a concrete image: the offset subtracted from stored
/// coordinates before painting and added back before persisting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActiveCrop {
    pub offset_x: i32,
    pub offset_y: i32,
    pub width: u32,
    pub height: u32,
}

impl ActiveCrop {
    /// Identity transform covering the whole image.
    pub fn full(image_w: u32, image_h: u32) -> Self {
        Self {
            offset_x: 0,
            offset_y: 0,
            width: image_w,
            height: image_h,
        }
    }

    /// Resolve an optional viewport against image bounds. The viewport is
    /// clamped into the image; a viewport that clamps to zero or negative
    /// area falls back to the full image rather than erroring.
    pub fn resolve(crop: Option<&CropViewport>, image_w: u32, image_h: u32) -> Self {
        let Some(crop) = crop else {
            return Self::full(image_w, image_h);
        };
        let r = crop.rect;
        let x0 = r.x0.max(0);
        let y0 = r.y0.max(0);
        let x1 = r.x1.min(image_w as i32);
        let y1 = r.y1.min(image_h as i32);
        if x1 <= x0 || y1 <= y0 {
            return Self::full(image_w, image_h);
        }
        Self {
            offset_x: x0,
            offset_y: y0,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.offset_x == 0 && self.offset_y == 0
    }

    pub fn to_display(&self, p: StoredPoint) -> DisplayPoint {
        DisplayPoint::new(p.x - self.offset_x, p.y - self.offset_y)
    }

    pub fn to_display_rect(&self, r: StoredRect) -> DisplayRect {
        DisplayRect {
            x0: r.x0 - self.offset_x,
            y0: r.y0 - self.offset_y,
            x1: r.x1 - self.offset_x,
            y1: r.y1 - self.offset_y,
        }
    }

    pub fn to_stored(&self, p: DisplayPoint) -> StoredPoint {
        StoredPoint::new(p.x + self.offset_x, p.y + self.offset_y)
    }

    pub fn to_stored_rect(&self, r: DisplayRect) -> StoredRect {
        StoredRect {
            x0: r.x0 + self.offset_x,
            y0: r.y0 + self.offset_y,
            x1: r.x1 + self.offset_x,
            y1: r.y1 + self.offset_y,
        }
    }
}
