//! Frame compositor: paints every visible element of the timeline at one
//! instant onto a [`DrawContext`].
//!
//! The same pass drives the interactive preview and the headless frame
//! export, so both see identical geometry.

use clipforge_project_model::{Element, ElementId, Timeline};
use clipforge_resolver::{
    effective_start, is_visible_at_time, resolve_transform_in, source_time_ms, transform_steps,
    TransformStep,
};

use crate::assets::AssetSource;
use crate::draw::{DrawContext, Rgba};
use crate::paint::{paint_element, paint_selection_outline, ElementClock, PaintEnv};
use crate::raster::RasterCanvas;

/// Canvas-wide settings for one frame.
#[derive(Debug, Clone)]
pub struct FrameSettings {
    pub background: Rgba,
    pub width: u32,
    pub height: u32,
    /// Whether the transport is playing (resumes paused video media).
    pub playing: bool,
}

/// Selection decoration for the element being edited.
#[derive(Debug, Clone, Default)]
pub struct OutlineOptions {
    pub enabled: bool,
    pub active_id: Option<ElementId>,
}

impl OutlineOptions {
    pub fn for_element(id: impl Into<ElementId>) -> Self {
        Self {
            enabled: true,
            active_id: Some(id.into()),
        }
    }

    fn applies_to(&self, id: &str) -> bool {
        self.enabled && self.active_id.as_deref() == Some(id)
    }
}

/// Summary of one composited frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub painted: usize,
    pub hidden: usize,
}

/// Apply the transform drawing steps to a context.
pub fn apply_steps<C: DrawContext + ?Sized>(ctx: &mut C, steps: &[TransformStep]) {
    for step in steps {
        match *step {
            TransformStep::Translate { x, y } => ctx.translate(x, y),
            TransformStep::Rotate { radians } => ctx.rotate(radians),
            TransformStep::Scale { x, y } => ctx.scale(x, y),
            TransformStep::MultiplyAlpha(factor) => ctx.multiply_alpha(factor),
        }
    }
}

/// Paint the frame at `time_ms`.
///
/// Elements are painted in priority order; audio and elements outside
/// their visibility window are skipped. `on_element` runs after each
/// painted element with the drawing state restored.
pub fn render_frame<C, F>(
    ctx: &mut C,
    timeline: &Timeline,
    time_ms: f64,
    assets: &dyn AssetSource,
    frame: &FrameSettings,
    outline: &OutlineOptions,
    mut on_element: F,
) -> FrameStats
where
    C: DrawContext + ?Sized,
    F: FnMut(&ElementId, &Element),
{
    ctx.save();
    ctx.set_alpha(1.0);
    ctx.set_fill_color(frame.background);
    ctx.fill_rect(0.0, 0.0, frame.width as f64, frame.height as f64);
    ctx.restore();

    let env = PaintEnv {
        assets,
        playing: frame.playing,
    };
    let mut stats = FrameStats::default();

    for (id, element) in timeline.by_priority() {
        if !element.is_visual() {
            continue;
        }
        if !is_visible_at_time(timeline, element, time_ms) {
            stats.hidden += 1;
            continue;
        }

        let resolved = resolve_transform_in(timeline, element, time_ms);
        let clock = ElementClock {
            elapsed_ms: time_ms - effective_start(timeline, element),
            source_ms: source_time_ms(timeline, element, time_ms),
        };

        ctx.save();
        apply_steps(ctx, &transform_steps(&resolved, element.width, element.height));
        paint_element(ctx, element, clock, &env);
        if outline.applies_to(id) {
            paint_selection_outline(ctx, element.width, element.height);
        }
        ctx.restore();

        stats.painted += 1;
        on_element(id, element);
    }

    tracing::trace!(time_ms, painted = stats.painted, hidden = stats.hidden, "Composited frame");
    stats
}

/// Render one frame into a fresh software canvas, without selection.
pub fn render_to_canvas(
    timeline: &Timeline,
    time_ms: f64,
    assets: &dyn AssetSource,
    frame: &FrameSettings,
) -> RasterCanvas {
    let mut canvas = RasterCanvas::new(frame.width, frame.height);
    render_frame(
        &mut canvas,
        timeline,
        time_ms,
        assets,
        frame,
        &OutlineOptions::default(),
        |_, _| {},
    );
    canvas
}
