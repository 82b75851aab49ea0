//! Audio placement shared by both export strategies.
//!
//! Each audio-bearing element becomes one encoder input, seeked into the
//! source and delayed onto the output timeline. Elements dragged before
//! zero are pulled back: the part that would fall before the output start
//! is skipped by seeking further into the source instead of delaying.

use clipforge_project_model::{Element, ElementId, Timeline};

use super::filter_graph::{fmt_num, Filter, FilterChain, FilterGraph};

/// Sample rate of the generated silence track.
pub const SILENCE_SAMPLE_RATE: u32 = 44_100;

/// Where one audio source lands in the output.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioPlacement {
    pub element_id: ElementId,
    pub path: String,
    /// Seek into the source before reading (ms).
    pub seek_ms: f64,
    /// Amount of source read (ms).
    pub duration_ms: f64,
    /// Offset of the first sample on the output timeline (ms).
    pub delay_ms: f64,
    pub speed: f64,
}

impl AudioPlacement {
    /// Delay in whole milliseconds as written to `adelay`.
    pub fn delay_whole_ms(&self) -> i64 {
        self.delay_ms.round() as i64
    }

    /// `-ss <seek> -t <duration> -i <path>` arguments.
    pub fn input_args(&self) -> Vec<String> {
        vec![
            "-ss".to_string(),
            fmt_num(self.seek_ms / 1000.0),
            "-t".to_string(),
            fmt_num(self.duration_ms / 1000.0),
            "-i".to_string(),
            self.path.clone(),
        ]
    }

    pub fn adelay(&self) -> Filter {
        let d = self.delay_whole_ms();
        Filter::new("adelay").arg(format!("{d}|{d}"))
    }
}

/// Compute the placement of one element, or `None` if it carries no audio.
pub fn place_audio(element: &Element) -> Option<AudioPlacement> {
    if !element.has_audio() {
        return None;
    }
    let trim = element.trim()?;
    let path = element.localpath()?.to_string();
    let speed = element.speed();

    let mut seek_ms = trim.start_ms * speed;
    let duration_ms = trim.end_ms - trim.start_ms;
    let track_delay = element.start_time;

    let delay_ms = if seek_ms >= 0.0 && track_delay >= 0.0 {
        element.start_time + seek_ms
    } else if track_delay < 0.0 {
        let shifted = seek_ms - track_delay.abs();
        if shifted >= 0.0 {
            shifted
        } else {
            seek_ms = trim.start_ms * speed + shifted.abs();
            0.0
        }
    } else {
        element.start_time.max(0.0)
    };

    Some(AudioPlacement {
        element_id: element.key.clone(),
        path,
        seek_ms,
        duration_ms,
        delay_ms,
        speed,
    })
}

/// Placements for every audio source, in paint order.
pub fn plan_audio(timeline: &Timeline) -> Vec<AudioPlacement> {
    timeline
        .audio_sources()
        .into_iter()
        .filter_map(|(_, element)| place_audio(element))
        .collect()
}

/// How per-source branches are combined into `[aout]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixStyle {
    /// `amix=inputs=N`
    Plain,
    /// `amix=inputs=N:duration=longest:dropout_transition=0`
    Longest,
}

/// Combine labelled audio branches into `[aout]`.
///
/// No branches yields a silent stereo track of `duration_secs`; one branch
/// is resampled; several are mixed.
pub fn push_audio_mix(
    graph: &mut FilterGraph,
    labels: &[String],
    duration_secs: f64,
    style: MixStyle,
) {
    let mut labels: Vec<String> = labels.to_vec();
    if labels.is_empty() {
        graph.push(FilterChain::single(
            &[],
            Filter::new("anullsrc")
                .opt("channel_layout", "stereo")
                .opt("sample_rate", SILENCE_SAMPLE_RATE.to_string())
                .opt("d", fmt_num(duration_secs)),
            "silent",
        ));
        labels.push("silent".to_string());
    }

    let inputs: Vec<&str> = labels.iter().map(String::as_str).collect();
    if labels.len() > 1 {
        let mut amix = Filter::new("amix").opt("inputs", labels.len().to_string());
        if style == MixStyle::Longest {
            amix = amix
                .opt("duration", "longest")
                .opt("dropout_transition", "0");
        }
        graph.push(FilterChain::single(&inputs, amix, "aout"));
    } else {
        graph.push(FilterChain::single(
            &inputs,
            Filter::new("aresample").opt("async", "1"),
            "aout",
        ));
    }
}
