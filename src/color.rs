/// Straight-alpha RGBA8 color. Premultiplication happens at the raster
/// boundary, never in the model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const WHITE: Self = Self::rgb(255, 255, 255);
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    pub const RED: Self = Self::rgb(255, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    pub fn is_transparent(&self) -> bool {
        self.a == 0
    }

    /// Project file array form: `[r,g,b]` when fully opaque, `[r,g,b,a]`
    /// otherwise (the legacy writer only kept alpha where it mattered).
    pub fn to_json(&self) -> serde_json::Value {
        if self.a == 255 {
            serde_json::json!([self.r, self.g, self.b])
        } else {
            serde_json::json!([self.r, self.g, self.b, self.a])
        }
    }

    /// Accepts both the 3-element (opaque) and 4-element array forms.
    pub fn from_json(v: &serde_json::Value) -> Option<Self> {
        let arr = v.as_array()?;
        let ch = |i: usize| -> Option<u8> { arr.get(i)?.as_u64().map(|n| n.min(255) as u8) };
        match arr.len() {
            3 => Some(Self::rgb(ch(0)?, ch(1)?, ch(2)?)),
            4 => Some(Self::new(ch(0)?, ch(1)?, ch(2)?, ch(3)?)),
            _ => None,
        }
    }
}

/// Font request carried by text-bearing layers. Resolved against the system
/// font collection at paint time; `family` is a hint, not a guarantee.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FontSpec {
    pub family: String,
    pub size: u32,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub underline: bool,
}

impl FontSpec {
    pub fn new(family: impl Into<String>, size: u32) -> Self {
        Self {
            family: family.into(),
            size,
            bold: false,
            italic: false,
            underline: false,
        }
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    /// Default for info-box bodies.
    pub fn info_box_default() -> Self {
        Self::new("Segoe UI", 12)
    }

    /// Default for free-standing text layers.
    pub fn text_default() -> Self {
        Self::new("Segoe UI", 18).bold()
    }
}
