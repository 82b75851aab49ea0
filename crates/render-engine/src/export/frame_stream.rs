//! Frame streaming backend.
//!
//! ```text
//! compositor ──PNG──▶ pipe:0 ─────────────┐
//!                                         ├── [0:v]null[vout]
//! audio k ──-ss/-t──▶ adelay ─▶ [audioN] ─┤
//!                                         └── amix/aresample ─▶ [aout]
//! ```

use clipforge_common::clock::FrameClock;
use clipforge_common::error::ClipforgeResult;

use super::audio::{plan_audio, push_audio_mix, MixStyle};
use super::filter_graph::{Filter, FilterChain, FilterGraph};
use super::{codec_args, EncoderInput, EncoderPlan, ExportBackend, ExportJob};

/// Streams composited frames to the encoder's stdin.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameStreamBackend;

impl ExportBackend for FrameStreamBackend {
    fn name(&self) -> &'static str {
        "frame-stream"
    }

    fn build_plan(&self, job: &ExportJob<'_>) -> ClipforgeResult<EncoderPlan> {
        let settings = job.settings;
        let clock = FrameClock::new(settings.fps);
        let total_frames = clock.total_frames(settings.duration_ms);

        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-f".to_string(),
            "image2pipe".to_string(),
            "-vcodec".to_string(),
            "png".to_string(),
            "-r".to_string(),
            clock.fps().to_string(),
            "-i".to_string(),
            "pipe:0".to_string(),
        ];

        let mut audio = plan_audio(job.timeline);
        let mut graph = FilterGraph::new();
        let mut labels = Vec::with_capacity(audio.len());
        for (i, placement) in audio.iter_mut().enumerate() {
            placement.path = job.media_path(&placement.path).display().to_string();
            args.extend(placement.input_args());
            let label = format!("audio{i}");
            let input = format!("{}:a", i + 1);
            graph.push(FilterChain::single(&[input.as_str()], placement.adelay(), &label));
            labels.push(label);
        }
        push_audio_mix(&mut graph, &labels, settings.duration_secs(), MixStyle::Plain);
        graph.push(FilterChain::single(&["0:v"], Filter::new("null"), "vout"));

        args.extend([
            "-filter_complex".to_string(),
            graph.to_string(),
            "-map".to_string(),
            "[vout]".to_string(),
            "-map".to_string(),
            "[aout]".to_string(),
        ]);
        args.extend(codec_args(settings));
        args.push(job.output.display().to_string());

        let debug_report = format!(
            "backend={}\nduration_secs={:.3}\nframes={}\nfps={}\naudio_sources={}\nfilter_len={}\nargs={}\n",
            self.name(),
            settings.duration_secs(),
            total_frames,
            clock.fps(),
            audio.len(),
            graph.to_string().len(),
            args.join(" "),
        );

        tracing::info!(
            frames = total_frames,
            audio_sources = audio.len(),
            "Frame stream plan built"
        );

        Ok(EncoderPlan {
            args,
            graph,
            input: EncoderInput::Frames { total_frames },
            audio,
            temp_files: Vec::new(),
            debug_report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw::Rgba;
    use crate::export::ExportSettings;
    use clipforge_project_model::{
        AudioElement, Element, ElementKind, ImageElement, Timeline, TrimWindow,
    };
    use std::path::Path;
    use std::time::Duration;

    fn settings(duration_ms: f64) -> ExportSettings {
        ExportSettings {
            width: 320,
            height: 240,
            fps: 60,
            duration_ms,
            video_bitrate_kbps: 5500,
            background: Rgba::BLACK,
            encoder_binary: "ffmpeg".to_string(),
            watchdog: Duration::from_secs(30),
            frame_queue_depth: 4,
            default_font: None,
        }
    }

    fn audio(path: &str, start: f64) -> Element {
        Element::new(
            ElementKind::Audio(AudioElement {
                localpath: path.to_string(),
                trim: TrimWindow::new(0.0, 2000.0),
                speed: 1.0,
            }),
            start,
            2000.0,
        )
    }

    fn plan(timeline: &Timeline, duration_ms: f64) -> EncoderPlan {
        let settings = settings(duration_ms);
        let job = ExportJob {
            timeline,
            settings: &settings,
            project_root: Path::new("/project"),
            output: Path::new("/out/video.partial.mp4"),
        };
        FrameStreamBackend.build_plan(&job).unwrap()
    }

    #[test]
    fn test_overlapping_audio_mixes_once() {
        let mut timeline = Timeline::new();
        timeline.insert_with_id("a", audio("a.wav", 0.0)).unwrap();
        timeline.insert_with_id("b", audio("/abs/b.wav", 500.0)).unwrap();
        let plan = plan(&timeline, 5000.0);

        let amix: Vec<_> = plan.graph.filters_named("amix").collect();
        assert_eq!(amix.len(), 1);
        assert_eq!(amix[0].get("inputs"), Some("2"));
        assert_eq!(plan.graph.filters_named("anullsrc").count(), 0);
        assert!(plan.args.contains(&"/project/a.wav".to_string()));
        assert!(plan.args.contains(&"/abs/b.wav".to_string()));
        assert!(plan
            .graph
            .to_string()
            .starts_with("[1:a]adelay=0|0[audio0];[2:a]adelay=500|500[audio1];[audio0][audio1]amix=inputs=2[aout]"));
    }

    #[test]
    fn test_no_audio_gets_one_silent_track() {
        let mut timeline = Timeline::new();
        timeline
            .insert_with_id(
                "img",
                Element::new(
                    ElementKind::Image(ImageElement {
                        localpath: "a.png".to_string(),
                    }),
                    0.0,
                    1000.0,
                ),
            )
            .unwrap();
        let plan = plan(&timeline, 5000.0);
        let silence: Vec<_> = plan.graph.filters_named("anullsrc").collect();
        assert_eq!(silence.len(), 1);
        assert_eq!(silence[0].get("d"), Some("5"));
        assert_eq!(plan.graph.filters_named("amix").count(), 0);
        assert_eq!(plan.input, EncoderInput::Frames { total_frames: 300 });
    }

    #[test]
    fn test_encoder_arguments() {
        let plan = plan(&Timeline::new(), 2500.0);
        let joined = plan.args.join(" ");
        assert!(joined.starts_with("-y -hide_banner -f image2pipe -vcodec png -r 60 -i pipe:0"));
        assert!(joined.contains("-map [vout] -map [aout]"));
        assert!(joined.contains("-t 2.5 -b:v 5500k -pix_fmt yuv420p"));
        assert_eq!(plan.args.last().map(String::as_str), Some("/out/video.partial.mp4"));
        assert!(plan.graph.to_string().ends_with("[0:v]null[vout]"));
    }
}
