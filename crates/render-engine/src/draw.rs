//! Drawing-context abstraction used by the compositor.
//!
//! The compositor only needs a handful of 2D primitives. Anything that can
//! provide them (the software [`RasterCanvas`](crate::raster::RasterCanvas),
//! a GPU target, a command recorder for tests) can render a frame.

use std::sync::Arc;

use clipforge_project_model::TextAlign;
use image::RgbaImage;

/// A decoded bitmap shared between the asset cache and draw calls.
pub type Bitmap = Arc<RgbaImage>;

/// Straight (non-premultiplied) RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::rgb(255, 255, 255);
    pub const BLACK: Rgba = Rgba::rgb(0, 0, 0);
    pub const TRANSPARENT: Rgba = Rgba {
        r: 0,
        g: 0,
        b: 0,
        a: 0,
    };

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse `#rgb`, `#rrggbb`, `#rrggbbaa` or a handful of CSS names.
    pub fn parse(input: &str) -> Option<Self> {
        let s = input.trim();
        if let Some(hex) = s.strip_prefix('#') {
            let digit = |i: usize| u8::from_str_radix(hex.get(i..i + 1)?, 16).ok();
            let pair = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
            return match hex.len() {
                3 => Some(Self::rgb(digit(0)? * 17, digit(1)? * 17, digit(2)? * 17)),
                6 => Some(Self::rgb(pair(0)?, pair(2)?, pair(4)?)),
                8 => Some(Self {
                    r: pair(0)?,
                    g: pair(2)?,
                    b: pair(4)?,
                    a: pair(6)?,
                }),
                _ => None,
            };
        }
        match s.to_ascii_lowercase().as_str() {
            "white" => Some(Self::WHITE),
            "black" => Some(Self::BLACK),
            "red" => Some(Self::rgb(255, 0, 0)),
            "green" => Some(Self::rgb(0, 128, 0)),
            "blue" => Some(Self::rgb(0, 0, 255)),
            "transparent" => Some(Self::TRANSPARENT),
            _ => None,
        }
    }

    /// Parse, falling back to `fallback` for malformed input.
    pub fn parse_or(input: &str, fallback: Rgba) -> Self {
        Self::parse(input).unwrap_or_else(|| {
            tracing::debug!(color = input, "Unrecognized color, using fallback");
            fallback
        })
    }

    /// `0xRRGGBB` form used by encoder filter arguments.
    pub fn to_hex(self) -> String {
        format!("0x{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Raw font file bytes.
#[derive(Debug)]
pub struct FontData {
    pub bytes: Vec<u8>,
    pub index: u32,
}

impl FontData {
    /// Accepts the bytes only if they parse as a font face.
    pub fn from_bytes(bytes: Vec<u8>) -> Option<Self> {
        ttf_parser::Face::parse(&bytes, 0).ok()?;
        Some(Self { bytes, index: 0 })
    }

    pub fn face(&self) -> Option<ttf_parser::Face<'_>> {
        ttf_parser::Face::parse(&self.bytes, self.index).ok()
    }
}

/// Font selection for text calls.
#[derive(Debug, Clone, Default)]
pub struct FontSpec {
    pub family: String,
    pub size: f64,
    pub bold: bool,
    pub italic: bool,
    pub face: Option<Arc<FontData>>,
}

/// Measured extent of a line of text.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TextMetrics {
    pub width: f64,
    pub ascent: f64,
    pub descent: f64,
}

/// The primitive operations the compositor draws with.
///
/// Transform calls post-multiply the current matrix; `save`/`restore`
/// push and pop the whole drawing state (matrix, alpha, colors, font).
pub trait DrawContext {
    fn save(&mut self);
    fn restore(&mut self);

    fn translate(&mut self, x: f64, y: f64);
    /// Clockwise rotation in radians.
    fn rotate(&mut self, radians: f64);
    fn scale(&mut self, x: f64, y: f64);

    /// Set global alpha to an absolute value in `[0, 1]`.
    fn set_alpha(&mut self, alpha: f64);
    fn multiply_alpha(&mut self, factor: f64);

    fn set_fill_color(&mut self, color: Rgba);
    fn set_stroke_color(&mut self, color: Rgba);
    fn set_line_width(&mut self, width: f64);

    fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64);
    fn stroke_rect(&mut self, x: f64, y: f64, w: f64, h: f64);
    /// Fill a closed polygon with the fill color.
    fn fill_polygon(&mut self, points: &[(f64, f64)]);
    fn fill_circle(&mut self, cx: f64, cy: f64, radius: f64);
    /// Draw `image` stretched into the destination rectangle.
    fn draw_image(&mut self, image: &RgbaImage, x: f64, y: f64, w: f64, h: f64);

    fn set_font(&mut self, font: FontSpec);
    fn set_text_align(&mut self, align: TextAlign);
    fn set_letter_spacing(&mut self, spacing: f64);
    fn fill_text(&mut self, text: &str, x: f64, y: f64);
    fn stroke_text(&mut self, text: &str, x: f64, y: f64);
    fn measure_text(&self, text: &str) -> TextMetrics;
}

/// Approximate metrics when no font face is loaded.
pub(crate) fn fallback_metrics(text: &str, font: &FontSpec, letter_spacing: f64) -> TextMetrics {
    let chars = text.chars().count() as f64;
    TextMetrics {
        width: chars * (font.size * 0.5 + letter_spacing),
        ascent: font.size * 0.8,
        descent: font.size * 0.2,
    }
}

/// One recorded call on a [`RecordingContext`].
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Save,
    Restore,
    Translate(f64, f64),
    Rotate(f64),
    Scale(f64, f64),
    SetAlpha(f64),
    MultiplyAlpha(f64),
    FillColor(Rgba),
    StrokeColor(Rgba),
    LineWidth(f64),
    FillRect(f64, f64, f64, f64),
    StrokeRect(f64, f64, f64, f64),
    FillPolygon(Vec<(f64, f64)>),
    FillCircle(f64, f64, f64),
    DrawImage {
        image_size: (u32, u32),
        x: f64,
        y: f64,
        w: f64,
        h: f64,
    },
    Font(String, f64),
    TextAlign(TextAlign),
    LetterSpacing(f64),
    FillText(String, f64, f64),
    StrokeText(String, f64, f64),
}

/// A draw context that records calls instead of painting.
///
/// Text is measured with a fixed advance of half the font size per char.
#[derive(Debug, Default)]
pub struct RecordingContext {
    pub commands: Vec<DrawCommand>,
    font: FontSpec,
    letter_spacing: f64,
    state_stack: Vec<(FontSpec, f64)>,
}

impl RecordingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&DrawCommand) -> bool) -> usize {
        self.commands.iter().filter(|c| pred(c)).count()
    }
}

impl DrawContext for RecordingContext {
    fn save(&mut self) {
        self.state_stack
            .push((self.font.clone(), self.letter_spacing));
        self.commands.push(DrawCommand::Save);
    }

    fn restore(&mut self) {
        if let Some((font, spacing)) = self.state_stack.pop() {
            self.font = font;
            self.letter_spacing = spacing;
        }
        self.commands.push(DrawCommand::Restore);
    }

    fn translate(&mut self, x: f64, y: f64) {
        self.commands.push(DrawCommand::Translate(x, y));
    }

    fn rotate(&mut self, radians: f64) {
        self.commands.push(DrawCommand::Rotate(radians));
    }

    fn scale(&mut self, x: f64, y: f64) {
        self.commands.push(DrawCommand::Scale(x, y));
    }

    fn set_alpha(&mut self, alpha: f64) {
        self.commands.push(DrawCommand::SetAlpha(alpha));
    }

    fn multiply_alpha(&mut self, factor: f64) {
        self.commands.push(DrawCommand::MultiplyAlpha(factor));
    }

    fn set_fill_color(&mut self, color: Rgba) {
        self.commands.push(DrawCommand::FillColor(color));
    }

    fn set_stroke_color(&mut self, color: Rgba) {
        self.commands.push(DrawCommand::StrokeColor(color));
    }

    fn set_line_width(&mut self, width: f64) {
        self.commands.push(DrawCommand::LineWidth(width));
    }

    fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
        self.commands.push(DrawCommand::FillRect(x, y, w, h));
    }

    fn stroke_rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
        self.commands.push(DrawCommand::StrokeRect(x, y, w, h));
    }

    fn fill_polygon(&mut self, points: &[(f64, f64)]) {
        self.commands.push(DrawCommand::FillPolygon(points.to_vec()));
    }

    fn fill_circle(&mut self, cx: f64, cy: f64, radius: f64) {
        self.commands.push(DrawCommand::FillCircle(cx, cy, radius));
    }

    fn draw_image(&mut self, image: &RgbaImage, x: f64, y: f64, w: f64, h: f64) {
        self.commands.push(DrawCommand::DrawImage {
            image_size: image.dimensions(),
            x,
            y,
            w,
            h,
        });
    }

    fn set_font(&mut self, font: FontSpec) {
        self.commands
            .push(DrawCommand::Font(font.family.clone(), font.size));
        self.font = font;
    }

    fn set_text_align(&mut self, align: TextAlign) {
        self.commands.push(DrawCommand::TextAlign(align));
    }

    fn set_letter_spacing(&mut self, spacing: f64) {
        self.letter_spacing = spacing;
        self.commands.push(DrawCommand::LetterSpacing(spacing));
    }

    fn fill_text(&mut self, text: &str, x: f64, y: f64) {
        self.commands
            .push(DrawCommand::FillText(text.to_string(), x, y));
    }

    fn stroke_text(&mut self, text: &str, x: f64, y: f64) {
        self.commands
            .push(DrawCommand::StrokeText(text.to_string(), x, y));
    }

    fn measure_text(&self, text: &str) -> TextMetrics {
        fallback_metrics(text, &self.font, self.letter_spacing)
    }
}
