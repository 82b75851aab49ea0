//! Per-property animation tracks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::curve::KeyframeList;

/// Scale curves store tenths: a keyframe value of `10` means 1.0x.
pub const SCALE_CURVE_UNIT: f64 = 10.0;

/// An element property that can carry keyframes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimatedProperty {
    Position,
    Rotation,
    Scale,
    Opacity,
}

impl AnimatedProperty {
    pub const ALL: [AnimatedProperty; 4] = [
        AnimatedProperty::Position,
        AnimatedProperty::Rotation,
        AnimatedProperty::Scale,
        AnimatedProperty::Opacity,
    ];

    /// Whether the property has a second (`y`) curve.
    pub fn has_y(self) -> bool {
        matches!(self, AnimatedProperty::Position)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AnimatedProperty::Position => "position",
            AnimatedProperty::Rotation => "rotation",
            AnimatedProperty::Scale => "scale",
            AnimatedProperty::Opacity => "opacity",
        }
    }
}

impl fmt::Display for AnimatedProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnimatedProperty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "position" => Ok(AnimatedProperty::Position),
            "rotation" => Ok(AnimatedProperty::Rotation),
            "scale" => Ok(AnimatedProperty::Scale),
            "opacity" => Ok(AnimatedProperty::Opacity),
            other => Err(format!("unknown animated property: {other}")),
        }
    }
}

/// Which curve of a track an edit addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
}

impl FromStr for Axis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x" => Ok(Axis::X),
            "y" => Ok(Axis::Y),
            other => Err(format!("unknown axis: {other}")),
        }
    }
}

/// Keyframes for one property plus its activation flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimationTrack {
    #[serde(rename = "isActivate", default)]
    pub is_active: bool,

    #[serde(default)]
    pub x: KeyframeList,

    /// Only used by `position`.
    #[serde(default, skip_serializing_if = "KeyframeList::is_empty")]
    pub y: KeyframeList,
}

impl AnimationTrack {
    pub fn list(&self, axis: Axis) -> &KeyframeList {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
        }
    }

    pub fn list_mut(&mut self, axis: Axis) -> &mut KeyframeList {
        match axis {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty() && self.y.is_empty()
    }
}

/// All animation tracks of an element; absent tracks are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Animations {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<AnimationTrack>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<AnimationTrack>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<AnimationTrack>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opacity: Option<AnimationTrack>,
}

impl Animations {
    pub fn track(&self, property: AnimatedProperty) -> Option<&AnimationTrack> {
        match property {
            AnimatedProperty::Position => self.position.as_ref(),
            AnimatedProperty::Rotation => self.rotation.as_ref(),
            AnimatedProperty::Scale => self.scale.as_ref(),
            AnimatedProperty::Opacity => self.opacity.as_ref(),
        }
    }

    /// Track for `property`, created empty and inactive when absent.
    pub fn track_mut(&mut self, property: AnimatedProperty) -> &mut AnimationTrack {
        let slot = match property {
            AnimatedProperty::Position => &mut self.position,
            AnimatedProperty::Rotation => &mut self.rotation,
            AnimatedProperty::Scale => &mut self.scale,
            AnimatedProperty::Opacity => &mut self.opacity,
        };
        slot.get_or_insert_with(AnimationTrack::default)
    }

    /// The curve to evaluate for `property`, only when its track is active.
    ///
    /// An inactive track yields `None` even if it still holds keyframes;
    /// callers then use the element's static field.
    pub fn active_list(&self, property: AnimatedProperty, axis: Axis) -> Option<&KeyframeList> {
        self.track(property)
            .filter(|track| track.is_active)
            .map(|track| track.list(axis))
    }

    pub fn is_animated(&self) -> bool {
        AnimatedProperty::ALL
            .iter()
            .filter_map(|p| self.track(*p))
            .any(|t| t.is_active && !t.is_empty())
    }
}
