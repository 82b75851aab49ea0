//! Render a single frame.

use std::path::PathBuf;

use clipforge_render_engine::{
    render_frame, DiskAssets, FrameSettings, LoadMode, OutlineOptions, RasterCanvas, Rgba,
};

use super::{export_settings, load_project};

pub fn run(
    path: PathBuf,
    time: f64,
    output: PathBuf,
    select: Option<String>,
) -> anyhow::Result<()> {
    let project = load_project(&path)?;
    let settings = export_settings(&project);

    let assets = DiskAssets::new(&project.root, LoadMode::Blocking)
        .with_encoder_binary(settings.encoder_binary.clone())
        .with_fps(settings.fps)
        .with_default_font(settings.default_font.clone());
    let frame = FrameSettings {
        background: Rgba::parse_or(&project.options.background_color, Rgba::BLACK),
        width: settings.width,
        height: settings.height,
        playing: false,
    };
    let outline = match select {
        Some(id) => OutlineOptions::for_element(id),
        None => OutlineOptions::default(),
    };

    let mut canvas = RasterCanvas::new(frame.width, frame.height);
    let stats = render_frame(
        &mut canvas,
        &project.timeline,
        time,
        &assets,
        &frame,
        &outline,
        |id, _| tracing::debug!(id = %id, "Painted element"),
    );

    std::fs::write(&output, canvas.encode_png()?)?;
    println!(
        "Rendered {}ms to {} ({} painted, {} hidden)",
        time,
        output.display(),
        stats.painted,
        stats.hidden
    );
    Ok(())
}
