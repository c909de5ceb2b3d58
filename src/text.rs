use crate::{
    color::{FontSpec, Rgba8},
    error::{StepdocError, StepdocResult},
    model::HAlign,
};

/// RGBA8 brush color carried through Parley layouts into glyph runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextBrush {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl From<Rgba8> for TextBrush {
    fn from(c: Rgba8) -> Self {
        Self {
            r: c.r,
            g: c.g,
            b: c.b,
            a: c.a,
        }
    }
}

/// Stateful helper for building Parley text layouts against the system font
/// collection. One instance per renderer; the contexts cache shaping state.
pub struct TextLayoutEngine {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrush>,
}

impl Default for TextLayoutEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TextLayoutEngine {
    pub fn new() -> Self {
        Self {
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
        }
    }

    /// Shape and lay out plain text with a [`FontSpec`]. `max_width_px`
    /// enables wrapping and horizontal alignment inside that width; `None`
    /// lays out a single unconstrained line run.
    pub fn layout(
        &mut self,
        text: &str,
        font: &FontSpec,
        brush: TextBrush,
        max_width_px: Option<f32>,
        align: HAlign,
    ) -> StepdocResult<parley::Layout<TextBrush>> {
        if font.size == 0 {
            return Err(StepdocError::validation("text size must be > 0"));
        }

        // Fall back through sans-serif when the named family is missing on
        // this machine.
        let stack = format!("{}, sans-serif", font.family);

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(stack)),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(font.size as f32));
        builder.push_default(parley::style::StyleProperty::Brush(brush));
        if font.bold {
            builder.push_default(parley::style::StyleProperty::FontWeight(
                parley::style::FontWeight::BOLD,
            ));
        }
        if font.italic {
            builder.push_default(parley::style::StyleProperty::FontStyle(
                parley::style::FontStyle::Italic,
            ));
        }
        if font.underline {
            builder.push_default(parley::style::StyleProperty::Underline(true));
        }

        let mut layout: parley::Layout<TextBrush> = builder.build(text);
        if let Some(w) = max_width_px {
            layout.break_all_lines(Some(w));
            layout.align(Some(w), parley_alignment(align), parley::AlignmentOptions::default());
        } else {
            layout.break_all_lines(None);
        }

        Ok(layout)
    }

    /// Shaped size of a text run, used to place anchored labels.
    pub fn measure(
        &mut self,
        text: &str,
        font: &FontSpec,
        max_width_px: Option<f32>,
    ) -> StepdocResult<(f32, f32)> {
        let layout = self.layout(text, font, TextBrush::default(), max_width_px, HAlign::Left)?;
        Ok((layout.width(), layout.height()))
    }
}

fn parley_alignment(align: HAlign) -> parley::Alignment {
    match align {
        HAlign::Left => parley::Alignment::Start,
        HAlign::Center => parley::Alignment::Center,
        HAlign::Right => parley::Alignment::End,
    }
}
