//! Filter graph backend.
//!
//! The whole edit becomes a single encoder invocation:
//!
//! ```text
//! background.png ─loop─▶ scale ─▶ [tmp]
//! media k ─▶ setpts ─▶ scale ─▶ rotate ─▶ alpha ─▶ overlay(enable=between) ─┐
//! text ────────────────────────────────▶ drawtext(enable=between) ─────────┤
//! shape.png ─loop─▶ format ────────────▶ overlay(enable=between) ──────────┤
//!                                                                          ▼
//!                                                                       [vout]
//! audio k ─▶ atempo ─▶ adelay ─▶ amix ─▶ [aout]
//! ```
//!
//! Placement is literal: each element is resolved once at the start of its
//! visible window. Keyframed motion is only reproduced by frame streaming.
//! Shapes have no filter equivalent, so each one is rasterised once onto a
//! transparent frame-sized PNG and overlaid like an image.

use std::f64::consts::TAU;

use clipforge_common::error::{ClipforgeError, ClipforgeResult};
use clipforge_project_model::{Element, ElementKind, TextElement};
use clipforge_resolver::{
    resolve_transform_in, transform_steps, visible_window, Affine, VisibleWindow,
};
use image::RgbaImage;

use super::audio::{plan_audio, push_audio_mix, MixStyle};
use super::filter_graph::{fmt_num, Filter, FilterChain, FilterGraph};
use super::{codec_args, EncoderInput, EncoderPlan, ExportBackend, ExportJob, TempAsset};
use crate::assets::MemoryAssets;
use crate::compositor::apply_steps;
use crate::draw::Rgba;
use crate::paint::{paint_element, ElementClock, PaintEnv, TEXT_PANEL_PADDING};
use crate::raster::RasterCanvas;

/// Side of the generated background image; the graph scales it up.
const BACKGROUND_TILE: u32 = 16;

/// Describes the composition as an encoder filter graph.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterGraphBackend;

/// `enable='between(t,start,end)'` for a visibility window.
pub fn enable_between(window: &VisibleWindow) -> String {
    format!(
        "between(t,{},{})",
        fmt_num(window.start_ms / 1000.0),
        fmt_num(window.end_ms / 1000.0)
    )
}

/// Split a playback speed into `atempo` factors within its accepted range.
pub fn atempo_factors(speed: f64) -> Vec<f64> {
    let mut factors = Vec::new();
    if !(speed.is_finite() && speed > 0.0) || (speed - 1.0).abs() < f64::EPSILON {
        return factors;
    }
    let mut remaining = speed;
    while remaining > 2.0 {
        factors.push(2.0);
        remaining /= 2.0;
    }
    while remaining < 0.5 {
        factors.push(0.5);
        remaining /= 0.5;
    }
    factors.push(remaining);
    factors
}

fn background_png(color: Rgba) -> ClipforgeResult<Vec<u8>> {
    let tile = RgbaImage::from_pixel(
        BACKGROUND_TILE,
        BACKGROUND_TILE,
        image::Rgba([color.r, color.g, color.b, 255]),
    );
    let mut bytes = Vec::new();
    tile.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|e| ClipforgeError::export(format!("Failed to encode background: {e}")))?;
    Ok(bytes)
}

struct GraphBuilder<'a> {
    job: &'a ExportJob<'a>,
    args: Vec<String>,
    graph: FilterGraph,
    next_input: usize,
    current: String,
    overlays: usize,
    texts: usize,
    shapes: usize,
    temp_files: Vec<TempAsset>,
}

impl<'a> GraphBuilder<'a> {
    fn new(job: &'a ExportJob<'a>) -> Self {
        Self {
            job,
            args: Vec::new(),
            graph: FilterGraph::new(),
            next_input: 0,
            current: "tmp".to_string(),
            overlays: 0,
            texts: 0,
            shapes: 0,
            temp_files: Vec::new(),
        }
    }

    fn add_input(&mut self, mut input_args: Vec<String>) -> usize {
        self.args.append(&mut input_args);
        let index = self.next_input;
        self.next_input += 1;
        index
    }

    fn next_label(&mut self) -> String {
        format!("tmp{}", self.overlays + self.texts + 1)
    }

    fn looped_input(&self, path: String) -> Vec<String> {
        vec![
            "-loop".to_string(),
            "1".to_string(),
            "-t".to_string(),
            fmt_num(self.job.settings.duration_secs()),
            "-i".to_string(),
            path,
        ]
    }

    fn media(&mut self, element: &Element) {
        let job = self.job;
        let window = visible_window(job.timeline, element);
        let Some(localpath) = element.localpath() else {
            return;
        };
        let path = job.media_path(localpath).display().to_string();
        let start_secs = window.start_ms / 1000.0;
        let mut filters = Vec::new();

        let input_args = match &element.kind {
            ElementKind::Image(_) => self.looped_input(path),
            ElementKind::Gif(_) => {
                filters.push(
                    Filter::new("setpts").arg(format!("PTS-STARTPTS+{}/TB", fmt_num(start_secs))),
                );
                vec![
                    "-ignore_loop".to_string(),
                    "0".to_string(),
                    "-t".to_string(),
                    fmt_num(job.settings.duration_secs()),
                    "-i".to_string(),
                    path,
                ]
            }
            ElementKind::Video(video) => {
                let speed = element.speed();
                filters.push(Filter::new("setpts").arg(format!(
                    "(PTS-STARTPTS)/{}+{}/TB",
                    fmt_num(speed),
                    fmt_num(start_secs)
                )));
                vec![
                    "-ss".to_string(),
                    fmt_num(video.trim.start_ms * speed / 1000.0),
                    "-t".to_string(),
                    fmt_num(video.trim.len_ms() * speed / 1000.0),
                    "-i".to_string(),
                    path,
                ]
            }
            _ => return,
        };
        let index = self.add_input(input_args);

        let resolved = resolve_transform_in(job.timeline, element, window.start_ms);
        let (matrix, alpha) =
            Affine::from_steps(&transform_steps(&resolved, element.width, element.height));
        let bounds = matrix.bounding_box(element.width, element.height);

        let scaled_w = (element.width * resolved.scale).round().max(1.0);
        let scaled_h = (element.height * resolved.scale).round().max(1.0);
        filters.push(
            Filter::new("scale")
                .arg(fmt_num(scaled_w))
                .arg(fmt_num(scaled_h)),
        );
        let radians = resolved.rotation.to_radians() % TAU;
        if radians.abs() > 1e-6 {
            let angle = fmt_num(radians);
            filters.push(
                Filter::new("rotate")
                    .opt("a", angle.clone())
                    .opt("c", "none")
                    .opt("ow", format!("rotw({angle})"))
                    .opt("oh", format!("roth({angle})")),
            );
        }
        if alpha < 1.0 {
            filters.push(Filter::new("format").arg("rgba"));
            filters.push(Filter::new("colorchannelmixer").opt("aa", fmt_num(alpha)));
        }

        self.overlay(index, filters, bounds.x, bounds.y, &window);
    }

    /// Chain `filters` on input `index` and overlay the result at `(x, y)`.
    fn overlay(
        &mut self,
        index: usize,
        filters: Vec<Filter>,
        x: f64,
        y: f64,
        window: &VisibleWindow,
    ) {
        let media_label = format!("m{index}");
        let source = format!("{index}:v");
        self.graph
            .push(FilterChain::new(&[source.as_str()], filters, &media_label));

        let output = self.next_label();
        let overlay = Filter::new("overlay")
            .opt("x", fmt_num(x.round()))
            .opt("y", fmt_num(y.round()))
            .opt("enable", enable_between(window));
        self.graph.push(FilterChain::single(
            &[self.current.as_str(), media_label.as_str()],
            overlay,
            &output,
        ));
        self.current = output;
        self.overlays += 1;
    }

    /// Rasterise a shape at its first visible instant onto a transparent
    /// frame-sized layer.
    fn shape(&mut self, element: &Element) -> ClipforgeResult<()> {
        let job = self.job;
        let settings = job.settings;
        let window = visible_window(job.timeline, element);
        let resolved = resolve_transform_in(job.timeline, element, window.start_ms);

        let mut canvas = RasterCanvas::new(settings.width, settings.height);
        let assets = MemoryAssets::new();
        let env = PaintEnv {
            assets: &assets,
            playing: false,
        };
        let clock = ElementClock {
            elapsed_ms: 0.0,
            source_ms: 0.0,
        };
        apply_steps(
            &mut canvas,
            &transform_steps(&resolved, element.width, element.height),
        );
        paint_element(&mut canvas, element, clock, &env);
        let bytes = canvas
            .encode_png()
            .map_err(|e| ClipforgeError::export(format!("Failed to encode shape layer: {e}")))?;

        let path = job
            .output
            .with_extension(format!("shape{}.png", self.shapes));
        let index = self.add_input(self.looped_input(path.display().to_string()));
        self.temp_files.push(TempAsset { path, bytes });
        self.overlay(
            index,
            vec![Filter::new("format").arg("rgba")],
            0.0,
            0.0,
            &window,
        );
        self.shapes += 1;
        Ok(())
    }

    fn text(&mut self, element: &Element, text: &TextElement) {
        let job = self.job;
        let window = visible_window(job.timeline, element);
        let resolved = resolve_transform_in(job.timeline, element, window.start_ms);
        let color = Rgba::parse_or(&text.textcolor, Rgba::WHITE);

        let mut drawtext = Filter::new("drawtext");
        let font = if text.uses_default_font() {
            job.settings.default_font.clone()
        } else {
            Some(job.media_path(&text.fontpath))
        };
        if let Some(font) = font {
            drawtext = drawtext.opt("fontfile", font.display().to_string());
        }
        drawtext = drawtext
            .opt("expansion", "none")
            .opt("text", text.text.clone())
            .opt("fontsize", fmt_num(text.fontsize * resolved.scale))
            .opt(
                "fontcolor",
                format!("{}@{}", color.to_hex(), fmt_num(resolved.alpha())),
            )
            .opt(
                "x",
                fmt_num(resolved.x + (element.width - text.width_inner) / 2.0),
            )
            .opt("y", fmt_num(resolved.y));
        if text.background.enable {
            let panel = Rgba::parse_or(&text.background.color, Rgba::BLACK);
            drawtext = drawtext
                .opt("box", "1")
                .opt("boxcolor", panel.to_hex())
                .opt("boxborderw", fmt_num(TEXT_PANEL_PADDING));
        }
        if text.options.outline.enable {
            let outline = Rgba::parse_or(&text.options.outline.color, Rgba::BLACK);
            drawtext = drawtext
                .opt("borderw", fmt_num(text.options.outline.size))
                .opt("bordercolor", outline.to_hex());
        }
        drawtext = drawtext.opt("enable", enable_between(&window));

        let output = self.next_label();
        self.graph
            .push(FilterChain::single(&[self.current.as_str()], drawtext, &output));
        self.current = output;
        self.texts += 1;
    }
}

impl ExportBackend for FilterGraphBackend {
    fn name(&self) -> &'static str {
        "filter-graph"
    }

    fn build_plan(&self, job: &ExportJob<'_>) -> ClipforgeResult<EncoderPlan> {
        let settings = job.settings;
        let background_path = job.output.with_extension("background.png");
        let mut builder = GraphBuilder::new(job);

        let mut args = vec!["-y".to_string(), "-hide_banner".to_string()];
        let background_input = builder.looped_input(background_path.display().to_string());
        builder.add_input(background_input);
        builder.graph.push(FilterChain::single(
            &["0:v"],
            Filter::new("scale")
                .arg(settings.width.to_string())
                .arg(settings.height.to_string()),
            "tmp",
        ));

        for (id, element) in job.timeline.by_priority() {
            match &element.kind {
                ElementKind::Image(_) | ElementKind::Gif(_) | ElementKind::Video(_) => {
                    builder.media(element)
                }
                ElementKind::Text(text) => builder.text(element, text),
                ElementKind::Shape(_) => {
                    tracing::debug!(id = %id, "Rasterising shape layer");
                    builder.shape(element)?;
                }
                ElementKind::Audio(_) => {}
            }
        }
        let last = builder.current.clone();
        builder
            .graph
            .push(FilterChain::single(&[last.as_str()], Filter::new("null"), "vout"));

        let mut audio = plan_audio(job.timeline);
        let mut labels = Vec::with_capacity(audio.len());
        for (i, placement) in audio.iter_mut().enumerate() {
            placement.path = job.media_path(&placement.path).display().to_string();
            let index = builder.add_input(placement.input_args());
            let mut filters: Vec<Filter> = atempo_factors(placement.speed)
                .into_iter()
                .map(|factor| Filter::new("atempo").arg(fmt_num(factor)))
                .collect();
            filters.push(placement.adelay());
            let label = format!("audio{i}");
            let source = format!("{index}:a");
            builder
                .graph
                .push(FilterChain::new(&[source.as_str()], filters, &label));
            labels.push(label);
        }
        push_audio_mix(
            &mut builder.graph,
            &labels,
            settings.duration_secs(),
            MixStyle::Longest,
        );

        args.append(&mut builder.args);
        let graph = builder.graph;
        args.extend([
            "-filter_complex".to_string(),
            graph.to_string(),
            "-map".to_string(),
            "[vout]".to_string(),
            "-map".to_string(),
            "[aout]".to_string(),
            "-r".to_string(),
            settings.fps.max(1).to_string(),
        ]);
        args.extend(codec_args(settings));
        args.push(job.output.display().to_string());

        let debug_report = format!(
            "backend={}\nduration_secs={:.3}\noverlays={}\ntexts={}\nshapes={}\naudio_sources={}\nfilter_len={}\nargs={}\n",
            self.name(),
            settings.duration_secs(),
            builder.overlays,
            builder.texts,
            builder.shapes,
            audio.len(),
            graph.to_string().len(),
            args.join(" "),
        );
        tracing::info!(
            overlays = builder.overlays,
            texts = builder.texts,
            shapes = builder.shapes,
            audio_sources = audio.len(),
            "Filter graph plan built"
        );

        let mut temp_files = vec![TempAsset {
            path: background_path,
            bytes: background_png(settings.background)?,
        }];
        temp_files.append(&mut builder.temp_files);

        Ok(EncoderPlan {
            args,
            graph,
            input: EncoderInput::None,
            audio,
            temp_files,
            debug_report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportSettings;
    use clipforge_project_model::{
        AudioElement, ImageElement, ShapeElement, ShapeOption, TextBackground, TextOptions,
        Timeline, TrimWindow,
    };
    use std::path::Path;
    use std::time::Duration;

    fn settings() -> ExportSettings {
        ExportSettings {
            width: 1280,
            height: 720,
            fps: 30,
            duration_ms: 4000.0,
            video_bitrate_kbps: 4000,
            background: Rgba::rgb(0, 0, 255),
            encoder_binary: "ffmpeg".to_string(),
            watchdog: Duration::from_secs(30),
            frame_queue_depth: 4,
            default_font: Some("/fonts/Default.ttf".into()),
        }
    }

    fn build(timeline: &Timeline) -> EncoderPlan {
        let settings = settings();
        let job = ExportJob {
            timeline,
            settings: &settings,
            project_root: Path::new("/project"),
            output: Path::new("/out/final.partial.mp4"),
        };
        FilterGraphBackend.build_plan(&job).unwrap()
    }

    fn image(rotation: f64, opacity: f64) -> Element {
        let mut element = Element::new(
            ElementKind::Image(ImageElement {
                localpath: "logo.png".to_string(),
            }),
            1000.0,
            2000.0,
        )
        .with_size(200.0, 100.0)
        .with_location(10.0, 20.0);
        element.rotation = rotation;
        element.opacity = opacity;
        element
    }

    #[test]
    fn test_background_scaled_and_looped() {
        let plan = build(&Timeline::new());
        let joined = plan.args.join(" ");
        assert!(joined.contains("-loop 1 -t 4 -i /out/final.partial.background.png"));
        assert!(plan.graph.to_string().starts_with("[0:v]scale=1280:720[tmp]"));
        assert!(plan.graph.to_string().contains("[tmp]null[vout]"));
        assert_eq!(plan.temp_files.len(), 1);
        assert_eq!(&plan.temp_files[0].bytes[1..4], b"PNG");
        assert_eq!(plan.input, EncoderInput::None);
        assert!(joined.contains("-r 30"));
    }

    #[test]
    fn test_image_overlay_gated_by_window() {
        let mut timeline = Timeline::new();
        timeline.insert_with_id("logo", image(0.0, 100.0)).unwrap();
        let graph = build(&timeline).graph.to_string();
        assert!(graph.contains("[1:v]scale=200:100[m1]"));
        assert!(graph.contains("[tmp][m1]overlay=x=10:y=20:enable='between(t,1,3)'[tmp1]"));
        assert!(!graph.contains("rotate"));
        assert!(!graph.contains("colorchannelmixer"));
    }

    #[test]
    fn test_rotation_and_alpha_nodes() {
        let mut timeline = Timeline::new();
        timeline.insert_with_id("logo", image(90.0, 50.0)).unwrap();
        let graph = build(&timeline).graph;
        let rotate = graph.filters_named("rotate").next().unwrap();
        assert_eq!(rotate.get("a"), Some("1.571"));
        assert_eq!(rotate.get("c"), Some("none"));
        let mixer = graph.filters_named("colorchannelmixer").next().unwrap();
        assert_eq!(mixer.get("aa"), Some("0.5"));
        // A quarter turn about the centre swaps the box: 100x200 at (60, -30).
        let overlay = graph.filters_named("overlay").next().unwrap();
        assert_eq!(overlay.get("x"), Some("60"));
        assert_eq!(overlay.get("y"), Some("-30"));
    }

    #[test]
    fn test_drawtext_centres_inner_width() {
        let mut timeline = Timeline::new();
        let text = Element::new(
            ElementKind::Text(TextElement {
                text: "Hello: it's".to_string(),
                fontname: "Sans".to_string(),
                fontpath: "default".to_string(),
                fontsize: 32.0,
                textcolor: "#ff0000".to_string(),
                background: TextBackground::default(),
                options: TextOptions::default(),
                letter_spacing: 0.0,
                width_inner: 120.0,
                parent_key: "standalone".to_string(),
            }),
            500.0,
            1000.0,
        )
        .with_size(300.0, 40.0)
        .with_location(100.0, 50.0);
        timeline.insert_with_id("title", text).unwrap();
        let graph = build(&timeline).graph;
        let drawtext = graph.filters_named("drawtext").next().unwrap();
        assert_eq!(drawtext.get("x"), Some("190"));
        assert_eq!(drawtext.get("y"), Some("50"));
        assert_eq!(drawtext.get("fontfile"), Some("/fonts/Default.ttf"));
        assert_eq!(drawtext.get("fontcolor"), Some("0xff0000@1"));
        assert_eq!(drawtext.get("enable"), Some("between(t,0.5,1.5)"));
        assert!(graph.to_string().contains("text='Hello\\: it\\'\\''s'"));
    }

    #[test]
    fn test_audio_tempo_and_longest_mix() {
        let mut timeline = Timeline::new();
        for (id, speed) in [("a", 1.0), ("b", 3.0)] {
            timeline
                .insert_with_id(
                    id,
                    Element::new(
                        ElementKind::Audio(AudioElement {
                            localpath: format!("{id}.wav"),
                            trim: TrimWindow::new(0.0, 1000.0),
                            speed,
                        }),
                        0.0,
                        1000.0,
                    ),
                )
                .unwrap();
        }
        let graph = build(&timeline).graph.to_string();
        assert!(graph.contains("[1:a]adelay=0|0[audio0]"));
        assert!(graph.contains("[2:a]atempo=2,atempo=1.5,adelay=0|0[audio1]"));
        assert!(graph.contains("amix=inputs=2:duration=longest:dropout_transition=0[aout]"));
    }

    #[test]
    fn test_shape_rasterised_and_overlaid() {
        let mut timeline = Timeline::new();
        let option = ShapeOption {
            fill_color: "#ff0000".to_string(),
        };
        timeline
            .insert_with_id(
                "tri",
                Element::new(
                    ElementKind::Shape(ShapeElement {
                        shape: vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]],
                        o_width: 1.0,
                        o_height: 1.0,
                        option,
                    }),
                    500.0,
                    1000.0,
                )
                .with_size(100.0, 100.0)
                .with_location(40.0, 60.0),
            )
            .unwrap();
        let plan = build(&timeline);
        let joined = plan.args.join(" ");
        let graph = plan.graph.to_string();

        assert!(joined.contains("-loop 1 -t 4 -i /out/final.partial.shape0.png"));
        assert!(graph.contains("[1:v]format=rgba[m1]"));
        assert!(graph.contains("[tmp][m1]overlay=x=0:y=0:enable='between(t,0.5,1.5)'[tmp1]"));
        assert!(graph.contains("[tmp1]null[vout]"));
        assert!(plan.debug_report.contains("shapes=1"));

        assert_eq!(plan.temp_files.len(), 2);
        let layer = &plan.temp_files[1];
        assert_eq!(layer.path, Path::new("/out/final.partial.shape0.png"));
        let decoded = image::load_from_memory(&layer.bytes).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (1280, 720));
        // Inside the triangle near its right-angle corner, and outside it.
        assert_eq!(decoded.get_pixel(50, 70).0, [255, 0, 0, 255]);
        assert_eq!(decoded.get_pixel(130, 150).0[3], 0);
    }

    #[test]
    fn test_atempo_factor_split() {
        assert!(atempo_factors(1.0).is_empty());
        assert_eq!(atempo_factors(0.25), vec![0.5, 0.5]);
        assert_eq!(atempo_factors(1.5), vec![1.5]);
    }
}
