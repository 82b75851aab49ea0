//! Export a project to video.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clipforge_render_engine::export::EventSink;
use clipforge_render_engine::{ExportCoordinator, ExportEvent, ExportRequest, ExportStrategy};

use super::{export_settings, load_project};

pub async fn run(
    path: PathBuf,
    output: Option<PathBuf>,
    strategy: ExportStrategy,
) -> anyhow::Result<()> {
    println!("Exporting project at: {}", path.display());

    let project = load_project(&path)?;
    let settings = export_settings(&project);
    let destination = output.unwrap_or_else(|| {
        project.resolve(&project.options.video_destination.to_string_lossy())
    });

    println!("  Output: {}", destination.display());
    println!("  Strategy: {strategy}");
    println!(
        "  Resolution: {}x{} @ {}fps, {:.1}s",
        settings.width,
        settings.height,
        settings.fps,
        settings.duration_secs()
    );

    let sink: EventSink = Arc::new(|event: ExportEvent| match event {
        ExportEvent::Progress(p) => {
            print!(
                "\r  Progress: {:>3}% ({}/{} frames, ETA: {:.0}s)  ",
                p.percent(),
                p.frames_rendered,
                p.total_frames,
                p.eta_secs,
            );
            std::io::stdout().flush().ok();
        }
        ExportEvent::Finish(path) => println!("\nExport complete: {}", path.display()),
        ExportEvent::Error(message) => println!("\nExport failed: {message}"),
    });

    let coordinator = ExportCoordinator::new();
    let handle = coordinator.start(
        ExportRequest {
            timeline: project.timeline.clone(),
            settings,
            strategy,
            destination,
            project_root: project.root.clone(),
        },
        sink,
    )?;

    let cancel = handle.cancel_handle();
    let wait = handle.wait();
    tokio::pin!(wait);
    let result = tokio::select! {
        result = &mut wait => result,
        _ = tokio::signal::ctrl_c() => {
            println!("\nCancelling export...");
            cancel.cancel();
            wait.await
        }
    };

    result
        .map(|_| ())
        .map_err(|e| anyhow::anyhow!("Export failed: {e}"))
}
