//! Per-kind element painters.
//!
//! Every painter draws in the element's local box `(0, 0, width, height)`;
//! the compositor has already applied the element transform.

use clipforge_project_model::{
    Element, ElementKind, ShapeElement, TextAlign, TextElement, VideoElement,
};

use crate::assets::{AssetLookup, AssetSource};
use crate::draw::{DrawContext, FontSpec, Rgba, TextMetrics};

/// Padding around each line of a text background panel.
pub const TEXT_PANEL_PADDING: f64 = 12.0;

pub const OUTLINE_LINE_WIDTH: f64 = 3.0;
pub const OUTLINE_HANDLE_SIZE: f64 = 20.0;
/// Distance of the rotation handle above the top edge.
pub const ROTATE_HANDLE_OFFSET: f64 = 50.0;
pub const ROTATE_HANDLE_RADIUS: f64 = 15.0;

/// Timing of one element within the frame being painted.
#[derive(Debug, Clone, Copy)]
pub struct ElementClock {
    /// Milliseconds since the element's effective start.
    pub elapsed_ms: f64,
    /// Position in the source media (speed applied).
    pub source_ms: f64,
}

/// Shared inputs for painting one frame.
pub struct PaintEnv<'a> {
    pub assets: &'a dyn AssetSource,
    /// Global transport state; paused media is resumed while playing.
    pub playing: bool,
}

/// Paint an element by kind. Audio has no visual and paints nothing.
pub fn paint_element<C: DrawContext + ?Sized>(
    ctx: &mut C,
    element: &Element,
    clock: ElementClock,
    env: &PaintEnv<'_>,
) {
    let (w, h) = (element.width, element.height);
    match &element.kind {
        ElementKind::Image(image) => {
            if let AssetLookup::Ready(bitmap) = env.assets.image(&image.localpath) {
                ctx.draw_image(&bitmap, 0.0, 0.0, w, h);
            }
        }
        ElementKind::Gif(gif) => {
            if let AssetLookup::Ready(frames) = env.assets.gif(&gif.localpath) {
                if let Some(frame) = frames.frame_at(clock.elapsed_ms) {
                    ctx.draw_image(frame, 0.0, 0.0, w, h);
                }
            }
        }
        ElementKind::Video(video) => paint_video(ctx, video, w, h, clock, env),
        ElementKind::Text(text) => paint_text(ctx, text, w, h, env),
        ElementKind::Shape(shape) => paint_shape(ctx, shape, w),
        ElementKind::Audio(_) => {}
    }
}

fn paint_video<C: DrawContext + ?Sized>(
    ctx: &mut C,
    video: &VideoElement,
    w: f64,
    h: f64,
    clock: ElementClock,
    env: &PaintEnv<'_>,
) {
    let path = video.localpath.as_str();
    if env.playing && env.assets.video_paused(path) {
        env.assets.resume_video(path, clock.source_ms);
    }
    let frame = match env.assets.video_frame(path, clock.source_ms) {
        AssetLookup::Ready(frame) => Some(frame),
        AssetLookup::Pending => env.assets.last_video_frame(path),
        AssetLookup::Missing | AssetLookup::Failed => None,
    };
    if let Some(frame) = frame {
        ctx.draw_image(&frame, 0.0, 0.0, w, h);
    }
}

/// Greedy word wrap: a word joins the current line while the candidate
/// stays narrower than `width`. A word wider than the box gets its own line.
pub fn wrap_text<C: DrawContext + ?Sized>(
    ctx: &C,
    text: &str,
    width: f64,
) -> Vec<(String, TextMetrics)> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split(' ') {
        let candidate = if line.is_empty() {
            word.to_string()
        } else {
            format!("{line} {word}")
        };
        if line.is_empty() || ctx.measure_text(&candidate).width < width {
            line = candidate;
        } else {
            let metrics = ctx.measure_text(&line);
            lines.push((std::mem::replace(&mut line, word.to_string()), metrics));
        }
    }
    let metrics = ctx.measure_text(&line);
    lines.push((line, metrics));
    lines
}

fn paint_text<C: DrawContext + ?Sized>(
    ctx: &mut C,
    text: &TextElement,
    w: f64,
    h: f64,
    env: &PaintEnv<'_>,
) {
    let options = &text.options;
    ctx.set_font(FontSpec {
        family: text.fontname.clone(),
        size: text.fontsize,
        bold: options.is_bold,
        italic: options.is_italic,
        face: env.assets.font(&text.fontpath),
    });
    ctx.set_letter_spacing(text.letter_spacing);
    ctx.set_text_align(options.align);

    let text_color = Rgba::parse_or(&text.textcolor, Rgba::WHITE);
    let panel_color = Rgba::parse_or(&text.background.color, Rgba::BLACK);
    let outline_color = Rgba::parse_or(&options.outline.color, Rgba::BLACK);

    let text_x = match options.align {
        TextAlign::Left => 0.0,
        TextAlign::Center => w / 2.0,
        TextAlign::Right => w,
    };
    let mut text_y = text.fontsize;
    for (line, metrics) in wrap_text(ctx, &text.text, w) {
        if text.background.enable {
            let panel_x = match options.align {
                TextAlign::Left => -TEXT_PANEL_PADDING,
                TextAlign::Center => text_x - metrics.width / 2.0 - TEXT_PANEL_PADDING,
                TextAlign::Right => text_x - metrics.width - TEXT_PANEL_PADDING,
            };
            ctx.set_fill_color(panel_color);
            ctx.fill_rect(
                panel_x,
                text_y - metrics.ascent - TEXT_PANEL_PADDING,
                metrics.width + 2.0 * TEXT_PANEL_PADDING,
                metrics.ascent + metrics.descent + 2.0 * TEXT_PANEL_PADDING,
            );
        }
        if options.outline.enable {
            ctx.set_stroke_color(outline_color);
            ctx.set_line_width(options.outline.size);
            ctx.stroke_text(&line, text_x, text_y);
        }
        ctx.set_fill_color(text_color);
        ctx.fill_text(&line, text_x, text_y);
        text_y += h;
    }
}

/// Shape points are authored against `oWidth` and scaled to the box.
fn paint_shape<C: DrawContext + ?Sized>(ctx: &mut C, shape: &ShapeElement, w: f64) {
    let ratio = shape.o_width / w;
    if !ratio.is_finite() || ratio <= 0.0 || shape.shape.len() < 3 {
        return;
    }
    let points: Vec<(f64, f64)> = shape
        .shape
        .iter()
        .map(|&[x, y]| (x / ratio, y / ratio))
        .collect();
    ctx.set_fill_color(Rgba::parse_or(&shape.option.fill_color, Rgba::WHITE));
    ctx.fill_polygon(&points);
}

/// Selection decoration: box, four corner handles, rotation handle.
pub fn paint_selection_outline<C: DrawContext + ?Sized>(ctx: &mut C, w: f64, h: f64) {
    let half = OUTLINE_HANDLE_SIZE / 2.0;
    ctx.set_alpha(1.0);
    ctx.set_stroke_color(Rgba::WHITE);
    ctx.set_line_width(OUTLINE_LINE_WIDTH);
    ctx.stroke_rect(0.0, 0.0, w, h);

    ctx.set_fill_color(Rgba::WHITE);
    for (cx, cy) in [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)] {
        ctx.fill_rect(cx - half, cy - half, OUTLINE_HANDLE_SIZE, OUTLINE_HANDLE_SIZE);
    }
    ctx.fill_circle(w / 2.0, -ROTATE_HANDLE_OFFSET, ROTATE_HANDLE_RADIUS);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{GifFrames, MemoryAssets};
    use crate::draw::{DrawCommand, RecordingContext};
    use clipforge_project_model::{
        GifElement, ShapeOption, TextBackground, TextOptions, TextOutline,
    };
    use image::RgbaImage;
    use std::sync::Arc;

    fn clock(elapsed_ms: f64) -> ElementClock {
        ElementClock {
            elapsed_ms,
            source_ms: elapsed_ms,
        }
    }

    fn text_element(text: &str, align: TextAlign) -> Element {
        Element::new(
            ElementKind::Text(TextElement {
                text: text.to_string(),
                fontname: "Sans".to_string(),
                fontpath: "default".to_string(),
                fontsize: 20.0,
                textcolor: "#ffffff".to_string(),
                background: TextBackground {
                    enable: true,
                    color: "#000000".to_string(),
                },
                options: TextOptions {
                    align,
                    outline: TextOutline {
                        enable: true,
                        size: 4.0,
                        color: "#ff0000".to_string(),
                    },
                    ..TextOptions::default()
                },
                letter_spacing: 0.0,
                width_inner: 0.0,
                parent_key: "standalone".to_string(),
            }),
            0.0,
            1000.0,
        )
        .with_size(100.0, 30.0)
    }

    #[test]
    fn test_wrap_keeps_candidate_while_narrower() {
        let mut ctx = RecordingContext::new();
        ctx.set_font(FontSpec {
            size: 20.0,
            ..FontSpec::default()
        });
        // 10 px per char: "aaaa bbbb" = 90 < 100, adding " cc" = 120.
        let lines = wrap_text(&ctx, "aaaa bbbb cc", 100.0);
        let text: Vec<&str> = lines.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(text, vec!["aaaa bbbb", "cc"]);
        assert_eq!(lines[0].1.width, 90.0);

        let long = wrap_text(&ctx, "abcdefghijklmnop", 50.0);
        assert_eq!(long.len(), 1);
    }

    #[test]
    fn test_text_panel_outline_then_fill_per_line() {
        let assets = MemoryAssets::new();
        let env = PaintEnv {
            assets: &assets,
            playing: false,
        };
        let element = text_element("aaaa bbbb cc", TextAlign::Center);
        let mut ctx = RecordingContext::new();
        paint_element(&mut ctx, &element, clock(0.0), &env);

        let draws: Vec<&DrawCommand> = ctx
            .commands
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    DrawCommand::FillRect(..) | DrawCommand::StrokeText(..) | DrawCommand::FillText(..)
                )
            })
            .collect();
        // Centre align: text_x = 50, first line 90 px wide, ascent 16, descent 4.
        assert_eq!(draws[0], &DrawCommand::FillRect(-7.0, -8.0, 114.0, 44.0));
        assert_eq!(draws[1], &DrawCommand::StrokeText("aaaa bbbb".into(), 50.0, 20.0));
        assert_eq!(draws[2], &DrawCommand::FillText("aaaa bbbb".into(), 50.0, 20.0));
        // Second line advances by the element height.
        assert_eq!(draws[5], &DrawCommand::FillText("cc".into(), 50.0, 50.0));
    }

    #[test]
    fn test_right_aligned_panel_offset() {
        let assets = MemoryAssets::new();
        let env = PaintEnv {
            assets: &assets,
            playing: false,
        };
        let element = text_element("abcd", TextAlign::Right);
        let mut ctx = RecordingContext::new();
        paint_element(&mut ctx, &element, clock(0.0), &env);
        assert!(ctx
            .commands
            .contains(&DrawCommand::FillRect(48.0, -8.0, 64.0, 44.0)));
    }

    #[test]
    fn test_shape_points_scaled_by_authoring_width() {
        let assets = MemoryAssets::new();
        let env = PaintEnv {
            assets: &assets,
            playing: false,
        };
        let element = Element::new(
            ElementKind::Shape(ShapeElement {
                shape: vec![[0.0, 0.0], [200.0, 0.0], [200.0, 100.0]],
                o_width: 200.0,
                o_height: 100.0,
                option: ShapeOption {
                    fill_color: "#00ff00".to_string(),
                },
            }),
            0.0,
            1000.0,
        )
        .with_size(100.0, 50.0);
        let mut ctx = RecordingContext::new();
        paint_element(&mut ctx, &element, clock(0.0), &env);
        assert!(ctx.commands.contains(&DrawCommand::FillColor(Rgba::rgb(0, 255, 0))));
        assert!(ctx.commands.contains(&DrawCommand::FillPolygon(vec![
            (0.0, 0.0),
            (100.0, 0.0),
            (100.0, 50.0)
        ])));
    }

    #[test]
    fn test_gif_frame_selected_by_elapsed_time() {
        let mut assets = MemoryAssets::new();
        let frames = (1..=3)
            .map(|w| Arc::new(RgbaImage::new(w, 1)))
            .collect();
        assets.insert_gif("loop.gif", GifFrames::new(frames, 100.0));
        let env = PaintEnv {
            assets: &assets,
            playing: false,
        };
        let element = Element::new(
            ElementKind::Gif(GifElement {
                localpath: "loop.gif".to_string(),
            }),
            0.0,
            5000.0,
        )
        .with_size(10.0, 10.0);
        let mut ctx = RecordingContext::new();
        paint_element(&mut ctx, &element, clock(450.0), &env);
        // floor(450 / 100) mod 3 = 1, the 2 px wide frame.
        assert!(matches!(
            ctx.commands[0],
            DrawCommand::DrawImage {
                image_size: (2, 1),
                ..
            }
        ));
    }

    #[test]
    fn test_video_resumes_when_playing() {
        let mut assets = MemoryAssets::new();
        assets.insert_video_frame("clip.mp4", RgbaImage::new(4, 4));
        let env = PaintEnv {
            assets: &assets,
            playing: true,
        };
        let element = Element::new(
            ElementKind::Video(VideoElement {
                localpath: "clip.mp4".to_string(),
                trim: clipforge_project_model::TrimWindow::new(0.0, 1000.0),
                speed: 1.0,
                is_exist_audio: false,
                codec: Default::default(),
            }),
            0.0,
            1000.0,
        )
        .with_size(4.0, 4.0);
        let mut ctx = RecordingContext::new();
        paint_element(
            &mut ctx,
            &element,
            ElementClock {
                elapsed_ms: 250.0,
                source_ms: 500.0,
            },
            &env,
        );
        assert_eq!(assets.resumed_at("clip.mp4"), Some(500.0));
        assert_eq!(ctx.count(|c| matches!(c, DrawCommand::DrawImage { .. })), 1);
    }

    #[test]
    fn test_selection_outline_geometry() {
        let mut ctx = RecordingContext::new();
        paint_selection_outline(&mut ctx, 200.0, 100.0);
        assert_eq!(ctx.commands[0], DrawCommand::SetAlpha(1.0));
        assert!(ctx
            .commands
            .contains(&DrawCommand::StrokeRect(0.0, 0.0, 200.0, 100.0)));
        assert!(ctx.commands.contains(&DrawCommand::LineWidth(3.0)));
        assert!(ctx
            .commands
            .contains(&DrawCommand::FillRect(190.0, 90.0, 20.0, 20.0)));
        assert!(ctx
            .commands
            .contains(&DrawCommand::FillCircle(100.0, -50.0, 15.0)));
        assert_eq!(ctx.count(|c| matches!(c, DrawCommand::FillRect(..))), 4);
    }
}
