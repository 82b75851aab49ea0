//! Timeline elements.
//!
//! Every element shares placement, geometry and animation fields; the
//! `filetype` tag selects the type-specific payload. Field names follow the
//! persisted camelCase format so `timeline.json` round-trips verbatim.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::animation::{AnimatedProperty, Animations, Axis, SCALE_CURVE_UNIT};

/// Map key of an element inside the timeline.
pub type ElementId = String;

/// Marker used by text elements that are not attached to another element.
pub const STANDALONE_PARENT: &str = "standalone";

/// Font path meaning "use the configured default font".
pub const DEFAULT_FONT: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
}

/// Sub-range of the source media that plays, in milliseconds into the source.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrimWindow {
    #[serde(rename = "startTime")]
    pub start_ms: f64,
    #[serde(rename = "endTime")]
    pub end_ms: f64,
}

impl TrimWindow {
    pub fn new(start_ms: f64, end_ms: f64) -> Self {
        Self { start_ms, end_ms }
    }

    pub fn len_ms(&self) -> f64 {
        self.end_ms - self.start_ms
    }
}

/// A timed, positioned item on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Mirrors the timeline map key.
    #[serde(default)]
    pub key: ElementId,

    /// Placement on the timeline (ms). Negative only while dragging.
    #[serde(rename = "startTime")]
    pub start_time: f64,

    /// Length of the element on the timeline (ms).
    pub duration: f64,

    #[serde(default)]
    pub location: Location,

    #[serde(default)]
    pub width: f64,

    #[serde(default)]
    pub height: f64,

    /// Degrees, clockwise.
    #[serde(default)]
    pub rotation: f64,

    /// 0 (transparent) to 100 (opaque).
    #[serde(default = "default_opacity")]
    pub opacity: f64,

    /// Paint order; lower paints first.
    #[serde(default)]
    pub priority: i64,

    #[serde(default)]
    pub animation: Animations,

    #[serde(flatten)]
    pub kind: ElementKind,

    /// Top-level persisted fields this version does not model, written back
    /// unchanged on save.
    #[serde(skip)]
    pub extra: Map<String, Value>,
}

fn default_opacity() -> f64 {
    100.0
}

fn default_speed() -> f64 {
    1.0
}

/// Type-specific element payload, tagged by `filetype`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "filetype", rename_all = "lowercase")]
pub enum ElementKind {
    Video(VideoElement),
    Image(ImageElement),
    Gif(GifElement),
    Audio(AudioElement),
    Text(TextElement),
    Shape(ShapeElement),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoElement {
    pub localpath: String,
    pub trim: TrimWindow,
    #[serde(default = "default_speed")]
    pub speed: f64,
    #[serde(rename = "isExistAudio", default)]
    pub is_exist_audio: bool,
    #[serde(default)]
    pub codec: Codec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Codec {
    pub video: String,
    pub audio: String,
}

impl Default for Codec {
    fn default() -> Self {
        Self {
            video: "default".to_string(),
            audio: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioElement {
    pub localpath: String,
    pub trim: TrimWindow,
    #[serde(default = "default_speed")]
    pub speed: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageElement {
    pub localpath: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GifElement {
    pub localpath: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextElement {
    pub text: String,
    #[serde(default)]
    pub fontname: String,
    #[serde(default = "default_font_path")]
    pub fontpath: String,
    pub fontsize: f64,
    pub textcolor: String,
    #[serde(default)]
    pub background: TextBackground,
    #[serde(default)]
    pub options: TextOptions,
    #[serde(rename = "letterSpacing", default)]
    pub letter_spacing: f64,
    /// Measured width of the rendered text, used to centre `drawtext` output.
    #[serde(rename = "widthInner", default)]
    pub width_inner: f64,
    #[serde(rename = "parentKey", default = "default_parent")]
    pub parent_key: String,
}

fn default_font_path() -> String {
    DEFAULT_FONT.to_string()
}

fn default_parent() -> String {
    STANDALONE_PARENT.to_string()
}

impl TextElement {
    /// Element this text is attached to, if any.
    pub fn parent(&self) -> Option<&str> {
        match self.parent_key.as_str() {
            "" | STANDALONE_PARENT => None,
            key => Some(key),
        }
    }

    pub fn uses_default_font(&self) -> bool {
        self.fontpath.is_empty() || self.fontpath == DEFAULT_FONT
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBackground {
    pub enable: bool,
    pub color: String,
}

impl Default for TextBackground {
    fn default() -> Self {
        Self {
            enable: false,
            color: "#000000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TextOptions {
    #[serde(default)]
    pub align: TextAlign,
    #[serde(rename = "isBold", default)]
    pub is_bold: bool,
    #[serde(rename = "isItalic", default)]
    pub is_italic: bool,
    #[serde(default)]
    pub outline: TextOutline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextOutline {
    pub enable: bool,
    pub size: f64,
    pub color: String,
}

impl Default for TextOutline {
    fn default() -> Self {
        Self {
            enable: false,
            size: 0.0,
            color: "#000000".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeElement {
    /// Polygon points in the shape's original coordinate space.
    pub shape: Vec<[f64; 2]>,
    /// Width the points were authored at.
    #[serde(rename = "oWidth")]
    pub o_width: f64,
    #[serde(rename = "oHeight", default)]
    pub o_height: f64,
    #[serde(default)]
    pub option: ShapeOption,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeOption {
    #[serde(rename = "fillColor")]
    pub fill_color: String,
}

impl Default for ShapeOption {
    fn default() -> Self {
        Self {
            fill_color: "#ffffff".to_string(),
        }
    }
}

/// Field-less mirror of [`ElementKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Video,
    Image,
    Gif,
    Audio,
    Text,
    Shape,
}

impl ElementType {
    pub fn as_str(self) -> &'static str {
        match self {
            ElementType::Video => "video",
            ElementType::Image => "image",
            ElementType::Gif => "gif",
            ElementType::Audio => "audio",
            ElementType::Text => "text",
            ElementType::Shape => "shape",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected element contents.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ElementError {
    #[error("duration must be positive, got {0}")]
    NonPositiveDuration(f64),

    #[error("opacity {0} outside 0..=100")]
    OpacityOutOfRange(f64),

    #[error("negative size {width}x{height}")]
    NegativeSize { width: f64, height: f64 },

    #[error("trim {start}..{end} does not fit in duration {duration}")]
    TrimOutOfRange { start: f64, end: f64, duration: f64 },

    #[error("playback speed must be positive, got {0}")]
    InvalidSpeed(f64),

    #[error("shape needs at least 3 points and a positive oWidth")]
    DegenerateShape,

    #[error("non-finite value in {0}")]
    NonFinite(&'static str),
}

impl Element {
    /// New element with default geometry, full opacity and no animation.
    pub fn new(kind: ElementKind, start_time: f64, duration: f64) -> Self {
        Self {
            key: ElementId::new(),
            start_time,
            duration,
            location: Location::default(),
            width: 0.0,
            height: 0.0,
            rotation: 0.0,
            opacity: 100.0,
            priority: 0,
            animation: Animations::default(),
            kind,
            extra: Map::new(),
        }
    }

    /// Parse one persisted element, keeping fields it does not recognise.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let mut element = Element::deserialize(&value)?;
        if let (Value::Object(raw), Value::Object(known)) = (value, serde_json::to_value(&element)?) {
            element.extra = raw
                .into_iter()
                .filter(|(name, _)| !known.contains_key(name))
                .collect();
        }
        Ok(element)
    }

    /// Persisted form, including the preserved unknown fields.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            for (name, field) in &self.extra {
                map.entry(name.clone()).or_insert_with(|| field.clone());
            }
        }
        Ok(value)
    }

    pub fn with_location(mut self, x: f64, y: f64) -> Self {
        self.location = Location { x, y };
        self
    }

    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn element_type(&self) -> ElementType {
        match &self.kind {
            ElementKind::Video(_) => ElementType::Video,
            ElementKind::Image(_) => ElementType::Image,
            ElementKind::Gif(_) => ElementType::Gif,
            ElementKind::Audio(_) => ElementType::Audio,
            ElementKind::Text(_) => ElementType::Text,
            ElementKind::Shape(_) => ElementType::Shape,
        }
    }

    /// Trim window for time-trimmed types (video, audio).
    pub fn trim(&self) -> Option<&TrimWindow> {
        match &self.kind {
            ElementKind::Video(v) => Some(&v.trim),
            ElementKind::Audio(a) => Some(&a.trim),
            _ => None,
        }
    }

    pub fn trim_mut(&mut self) -> Option<&mut TrimWindow> {
        match &mut self.kind {
            ElementKind::Video(v) => Some(&mut v.trim),
            ElementKind::Audio(a) => Some(&mut a.trim),
            _ => None,
        }
    }

    /// Playback rate multiplier; 1 for types without media playback.
    pub fn speed(&self) -> f64 {
        match &self.kind {
            ElementKind::Video(v) => v.speed,
            ElementKind::Audio(a) => a.speed,
            _ => 1.0,
        }
    }

    /// Source file backing the element, if any.
    pub fn localpath(&self) -> Option<&str> {
        match &self.kind {
            ElementKind::Video(v) => Some(&v.localpath),
            ElementKind::Audio(a) => Some(&a.localpath),
            ElementKind::Image(i) => Some(&i.localpath),
            ElementKind::Gif(g) => Some(&g.localpath),
            ElementKind::Text(_) | ElementKind::Shape(_) => None,
        }
    }

    /// Whether the element paints pixels.
    pub fn is_visual(&self) -> bool {
        !matches!(self.kind, ElementKind::Audio(_))
    }

    /// Whether the element contributes to the exported audio mix.
    pub fn has_audio(&self) -> bool {
        match &self.kind {
            ElementKind::Audio(_) => true,
            ElementKind::Video(v) => v.is_exist_audio,
            _ => false,
        }
    }

    /// Text parent id, if this is an attached text element.
    pub fn parent_key(&self) -> Option<&str> {
        match &self.kind {
            ElementKind::Text(t) => t.parent(),
            _ => None,
        }
    }

    /// Static value used when `property` is not animated.
    ///
    /// Scale has no static field and is `1.0`, expressed in curve units.
    pub fn static_value(&self, property: AnimatedProperty, axis: Axis) -> f64 {
        match (property, axis) {
            (AnimatedProperty::Position, Axis::X) => self.location.x,
            (AnimatedProperty::Position, Axis::Y) => self.location.y,
            (AnimatedProperty::Rotation, _) => self.rotation,
            (AnimatedProperty::Scale, _) => SCALE_CURVE_UNIT,
            (AnimatedProperty::Opacity, _) => self.opacity,
        }
    }

    /// Check the invariants enforced at the mutation boundary.
    pub fn validate(&self) -> Result<(), ElementError> {
        if !self.start_time.is_finite() {
            return Err(ElementError::NonFinite("startTime"));
        }
        if !(self.duration.is_finite() && self.duration > 0.0) {
            return Err(ElementError::NonPositiveDuration(self.duration));
        }
        if !(0.0..=100.0).contains(&self.opacity) {
            return Err(ElementError::OpacityOutOfRange(self.opacity));
        }
        if self.width < 0.0 || self.height < 0.0 {
            return Err(ElementError::NegativeSize {
                width: self.width,
                height: self.height,
            });
        }
        if let Some(trim) = self.trim() {
            check_trim(trim, self.duration)?;
            let speed = self.speed();
            if !(speed.is_finite() && speed > 0.0) {
                return Err(ElementError::InvalidSpeed(speed));
            }
        }
        if let ElementKind::Shape(shape) = &self.kind {
            if shape.shape.len() < 3 || shape.o_width <= 0.0 {
                return Err(ElementError::DegenerateShape);
            }
        }
        Ok(())
    }
}

pub(crate) fn check_trim(trim: &TrimWindow, duration: f64) -> Result<(), ElementError> {
    if trim.start_ms < 0.0 || trim.start_ms >= trim.end_ms || trim.end_ms > duration {
        return Err(ElementError::TrimOutOfRange {
            start: trim.start_ms,
            end: trim.end_ms,
            duration,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(trim: TrimWindow) -> Element {
        Element::new(
            ElementKind::Video(VideoElement {
                localpath: "/media/clip.mp4".to_string(),
                trim,
                speed: 1.0,
                is_exist_audio: true,
                codec: Codec::default(),
            }),
            0.0,
            1000.0,
        )
        .with_size(640.0, 360.0)
    }

    #[test]
    fn test_parse_persisted_video() {
        let json = r#"{
            "filetype": "video", "key": "v1", "priority": 2, "blob": "blob:x",
            "startTime": 120, "duration": 4000,
            "location": {"x": 10, "y": 20}, "width": 640, "height": 360,
            "ratio": 1.77, "opacity": 80, "rotation": 0,
            "localpath": "/media/clip.mp4",
            "trim": {"startTime": 200, "endTime": 800},
            "isExistAudio": true, "codec": {"video": "h264", "audio": "aac"},
            "speed": 1.5,
            "animation": {}
        }"#;
        let element: Element = serde_json::from_str(json).unwrap();
        assert_eq!(element.element_type(), ElementType::Video);
        assert_eq!(element.trim(), Some(&TrimWindow::new(200.0, 800.0)));
        assert_eq!(element.speed(), 1.5);
        assert!(element.has_audio());
        assert_eq!(element.localpath(), Some("/media/clip.mp4"));
        assert_eq!(element.opacity, 80.0);

        let back = serde_json::to_value(&element).unwrap();
        assert_eq!(back["filetype"], "video");
        assert_eq!(back["trim"]["startTime"], 200.0);
        assert_eq!(back["isExistAudio"], true);
    }

    #[test]
    fn test_text_defaults() {
        let json = r##"{
            "filetype": "text", "startTime": 0, "duration": 1000,
            "text": "hello", "fontsize": 48, "textcolor": "#ffffff"
        }"##;
        let element: Element = serde_json::from_str(json).unwrap();
        let ElementKind::Text(text) = &element.kind else {
            panic!("expected text");
        };
        assert!(text.uses_default_font());
        assert_eq!(text.parent(), None);
        assert_eq!(text.options.align, TextAlign::Left);
        assert_eq!(element.opacity, 100.0);
        assert!(element.is_visual());
        assert!(!element.has_audio());
    }

    #[test]
    fn test_video_without_audio_is_silent() {
        let mut element = video(TrimWindow::new(0.0, 1000.0));
        if let ElementKind::Video(v) = &mut element.kind {
            v.is_exist_audio = false;
        }
        assert!(!element.has_audio());
    }

    #[test]
    fn test_validate_trim() {
        assert!(video(TrimWindow::new(200.0, 800.0)).validate().is_ok());
        assert!(matches!(
            video(TrimWindow::new(200.0, 1200.0)).validate(),
            Err(ElementError::TrimOutOfRange { .. })
        ));
        assert!(video(TrimWindow::new(800.0, 200.0)).validate().is_err());
        assert!(video(TrimWindow::new(-1.0, 200.0)).validate().is_err());
    }

    #[test]
    fn test_validate_common_fields() {
        let mut element = video(TrimWindow::new(0.0, 500.0));
        element.opacity = 120.0;
        assert_eq!(
            element.validate(),
            Err(ElementError::OpacityOutOfRange(120.0))
        );

        let mut element = video(TrimWindow::new(0.0, 500.0));
        element.duration = 0.0;
        assert!(element.validate().is_err());

        let shape = Element::new(
            ElementKind::Shape(ShapeElement {
                shape: vec![[0.0, 0.0], [10.0, 0.0]],
                o_width: 10.0,
                o_height: 10.0,
                option: ShapeOption::default(),
            }),
            0.0,
            100.0,
        );
        assert_eq!(shape.validate(), Err(ElementError::DegenerateShape));
    }

    #[test]
    fn test_static_values() {
        let element = video(TrimWindow::new(0.0, 500.0)).with_location(5.0, 6.0);
        assert_eq!(element.static_value(AnimatedProperty::Position, Axis::Y), 6.0);
        assert_eq!(element.static_value(AnimatedProperty::Scale, Axis::X), 10.0);
        assert_eq!(element.static_value(AnimatedProperty::Opacity, Axis::X), 100.0);
    }
}
