//! The timeline document: element id -> element.
//!
//! All mutations go through methods that validate first and only then swap
//! the new state in, so a rejected edit leaves the timeline untouched.

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::ser::{Error as _, SerializeMap};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::animation::{AnimatedProperty, Axis};
use crate::curve::{CurveError, Handle, KeyframeList, TIME_TOLERANCE_MS};
use crate::element::{check_trim, Element, ElementError, ElementId, TrimWindow};

/// Errors from timeline mutations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimelineError {
    #[error("element not found: {0}")]
    NotFound(ElementId),

    #[error("element id already in use: {0}")]
    DuplicateId(ElementId),

    #[error("invalid element {id}: {source}")]
    Invalid {
        id: ElementId,
        #[source]
        source: ElementError,
    },

    #[error("{property} has no {axis:?} curve")]
    NoSuchCurve {
        property: AnimatedProperty,
        axis: Axis,
    },

    #[error("keyframe edit on {id}.{property}: {source}")]
    Curve {
        id: ElementId,
        property: AnimatedProperty,
        #[source]
        source: CurveError,
    },
}

/// Element map ordered by id. Paint order is decided by `priority`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    elements: BTreeMap<ElementId, Element>,
}

impl Serialize for Timeline {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.elements.len()))?;
        for (id, element) in &self.elements {
            let value = element.to_value().map_err(S::Error::custom)?;
            map.serialize_entry(id, &value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Timeline {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<ElementId, serde_json::Value>::deserialize(deserializer)?;
        let mut elements = BTreeMap::new();
        for (id, value) in raw {
            let mut element = Element::from_value(value)
                .map_err(|e| D::Error::custom(format!("element '{id}': {e}")))?;
            element.key.clone_from(&id);
            elements.insert(id, element);
        }
        Ok(Self { elements })
    }
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Element> {
        self.elements.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.elements.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ElementId, &Element)> {
        self.elements.iter()
    }

    /// Insert under a fresh random id.
    pub fn insert(&mut self, element: Element) -> Result<ElementId, TimelineError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.insert_with_id(id.clone(), element)?;
        Ok(id)
    }

    /// Insert under a caller-chosen id.
    pub fn insert_with_id(
        &mut self,
        id: impl Into<ElementId>,
        mut element: Element,
    ) -> Result<(), TimelineError> {
        let id = id.into();
        if self.elements.contains_key(&id) {
            return Err(TimelineError::DuplicateId(id));
        }
        element
            .validate()
            .map_err(|source| TimelineError::Invalid {
                id: id.clone(),
                source,
            })?;
        element.key.clone_from(&id);
        tracing::debug!(id = %id, filetype = %element.element_type(), "Inserted element");
        self.elements.insert(id, element);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Option<Element> {
        self.elements.remove(id)
    }

    /// Drop every element, e.g. before loading another project.
    pub fn clear(&mut self) {
        self.elements.clear();
    }

    /// Elements in paint order: priority ascending, ties broken by id.
    pub fn by_priority(&self) -> Vec<(&ElementId, &Element)> {
        let mut entries: Vec<_> = self.elements.iter().collect();
        entries.sort_by(|(a_id, a), (b_id, b)| a.priority.cmp(&b.priority).then(a_id.cmp(b_id)));
        entries
    }

    /// Audio-bearing elements (audio, video with audio) in paint order.
    pub fn audio_sources(&self) -> Vec<(&ElementId, &Element)> {
        self.by_priority()
            .into_iter()
            .filter(|(_, element)| element.has_audio())
            .collect()
    }

    /// Check every element, e.g. after loading a hand-edited file.
    pub fn validate(&self) -> Result<(), TimelineError> {
        for (id, element) in &self.elements {
            element.validate().map_err(|source| TimelineError::Invalid {
                id: id.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Apply an arbitrary edit; it is kept only if the result validates.
    pub fn update<F>(&mut self, id: &str, edit: F) -> Result<(), TimelineError>
    where
        F: FnOnce(&mut Element),
    {
        let current = self.lookup(id)?;
        let mut next = current.clone();
        edit(&mut next);
        next.key = id.to_string();
        next.validate().map_err(|source| TimelineError::Invalid {
            id: id.to_string(),
            source,
        })?;
        self.elements.insert(id.to_string(), next);
        Ok(())
    }

    /// Move an element during a drag. The start may go negative until
    /// [`Timeline::commit_start_time`] is called.
    pub fn move_element(&mut self, id: &str, start_time: f64) -> Result<(), TimelineError> {
        if !start_time.is_finite() {
            return Err(TimelineError::Invalid {
                id: id.to_string(),
                source: ElementError::NonFinite("startTime"),
            });
        }
        self.lookup_mut(id)?.start_time = start_time;
        Ok(())
    }

    /// Finish a drag: clamp the start time to zero and return it.
    pub fn commit_start_time(&mut self, id: &str) -> Result<f64, TimelineError> {
        let element = self.lookup_mut(id)?;
        element.start_time = element.start_time.max(0.0);
        Ok(element.start_time)
    }

    /// Replace the trim window of a video or audio element.
    pub fn set_trim(&mut self, id: &str, trim: TrimWindow) -> Result<(), TimelineError> {
        let element = self.lookup_mut(id)?;
        check_trim(&trim, element.duration).map_err(|source| TimelineError::Invalid {
            id: id.to_string(),
            source,
        })?;
        match element.trim_mut() {
            Some(slot) => {
                *slot = trim;
                Ok(())
            }
            None => Err(TimelineError::Invalid {
                id: id.to_string(),
                source: ElementError::TrimOutOfRange {
                    start: trim.start_ms,
                    end: trim.end_ms,
                    duration: 0.0,
                },
            }),
        }
    }

    pub fn set_track_active(
        &mut self,
        id: &str,
        property: AnimatedProperty,
        active: bool,
    ) -> Result<(), TimelineError> {
        self.lookup_mut(id)?.animation.track_mut(property).is_active = active;
        Ok(())
    }

    /// Add an anchor to one curve of an element and activate the track.
    ///
    /// The first keyframe on an empty curve is preceded by an anchor at
    /// time 0 holding the property's static value, so the animation starts
    /// from where the element currently is. `time` is relative to the
    /// element start. A second call at the same time is rejected. A first
    /// keyframe close enough to zero takes the place of the seeded anchor.
    pub fn add_keyframe(
        &mut self,
        id: &str,
        property: AnimatedProperty,
        axis: Axis,
        time: f64,
        value: f64,
    ) -> Result<usize, TimelineError> {
        check_axis(property, axis)?;
        let element = self.lookup(id)?;
        let current = element
            .animation
            .track(property)
            .map(|track| track.list(axis).clone())
            .unwrap_or_default();

        let curve_err = |source| TimelineError::Curve {
            id: id.to_string(),
            property,
            source,
        };
        let seeded = if current.is_empty() && time.abs() >= TIME_TOLERANCE_MS {
            current
                .with_anchor(0.0, element.static_value(property, axis))
                .map_err(curve_err)?
        } else {
            current
        };
        let next = seeded.with_anchor(time, value).map_err(curve_err)?;
        let index = next.position_of(time).unwrap_or(0);

        self.swap_curve(id, property, axis, next, true)?;
        Ok(index)
    }

    pub fn remove_keyframe(
        &mut self,
        id: &str,
        property: AnimatedProperty,
        axis: Axis,
        index: usize,
    ) -> Result<(), TimelineError> {
        let next = self
            .curve(id, property, axis)?
            .without_point(index)
            .map_err(|source| TimelineError::Curve {
                id: id.to_string(),
                property,
                source,
            })?;
        self.swap_curve(id, property, axis, next, false)
    }

    /// Drag one point of a keyframe. Repeating the same call is a no-op.
    #[allow(clippy::too_many_arguments)]
    pub fn move_keyframe(
        &mut self,
        id: &str,
        property: AnimatedProperty,
        axis: Axis,
        index: usize,
        handle: Handle,
        time: f64,
        value: f64,
    ) -> Result<(), TimelineError> {
        let next = self
            .curve(id, property, axis)?
            .with_moved_point(index, handle, time, value)
            .map_err(|source| TimelineError::Curve {
                id: id.to_string(),
                property,
                source,
            })?;
        self.swap_curve(id, property, axis, next, false)
    }

    /// Swap in a curve produced elsewhere (e.g. by an editor).
    pub fn replace_keyframes(
        &mut self,
        id: &str,
        property: AnimatedProperty,
        axis: Axis,
        list: KeyframeList,
    ) -> Result<(), TimelineError> {
        check_axis(property, axis)?;
        self.swap_curve(id, property, axis, list, false)
    }

    fn curve(
        &self,
        id: &str,
        property: AnimatedProperty,
        axis: Axis,
    ) -> Result<KeyframeList, TimelineError> {
        check_axis(property, axis)?;
        Ok(self
            .lookup(id)?
            .animation
            .track(property)
            .map(|track| track.list(axis).clone())
            .unwrap_or_default())
    }

    fn swap_curve(
        &mut self,
        id: &str,
        property: AnimatedProperty,
        axis: Axis,
        list: KeyframeList,
        activate: bool,
    ) -> Result<(), TimelineError> {
        let track = self.lookup_mut(id)?.animation.track_mut(property);
        tracing::trace!(
            id,
            property = %property,
            revision = list.revision(),
            len = list.len(),
            "Swapped keyframe curve"
        );
        *track.list_mut(axis) = list;
        if activate {
            track.is_active = true;
        }
        Ok(())
    }

    fn lookup(&self, id: &str) -> Result<&Element, TimelineError> {
        self.elements
            .get(id)
            .ok_or_else(|| TimelineError::NotFound(id.to_string()))
    }

    fn lookup_mut(&mut self, id: &str) -> Result<&mut Element, TimelineError> {
        self.elements
            .get_mut(id)
            .ok_or_else(|| TimelineError::NotFound(id.to_string()))
    }
}

fn check_axis(property: AnimatedProperty, axis: Axis) -> Result<(), TimelineError> {
    if axis == Axis::Y && !property.has_y() {
        return Err(TimelineError::NoSuchCurve { property, axis });
    }
    Ok(())
}
