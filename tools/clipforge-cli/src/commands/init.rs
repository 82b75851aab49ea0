//! Initialize a new ClipForge project.

use std::path::PathBuf;

use clipforge_project_model::{PreviewSize, ProjectBundle, RenderOptions};

pub fn run(
    name: String,
    output: PathBuf,
    width: u32,
    height: u32,
    duration: f64,
    fps: u32,
) -> anyhow::Result<()> {
    let project_dir = output.join(&name);
    println!("Creating project '{}' at {}", name, project_dir.display());

    let options = RenderOptions {
        video_duration: duration,
        preview_ratio: f64::from(width) / f64::from(height.max(1)),
        preview_size: PreviewSize { w: width, h: height },
        fps,
        video_destination: project_dir.join("output.mp4"),
        ..RenderOptions::default()
    };
    let project = ProjectBundle::create(&project_dir, &name, options)
        .map_err(|e| anyhow::anyhow!("Failed to create project: {e}"))?;

    println!("Project created successfully:");
    println!("  Directory: {}", project.root.display());
    println!("  Resolution: {}x{}", width, height);
    println!("  Duration: {duration}s @ {fps}fps");
    println!();
    println!("Directory structure:");
    println!("  {}/", name);
    println!("  ├── manifest.json       (name, id, timestamps)");
    println!("  ├── renderOptions.json  (output size, duration, bitrate)");
    println!("  └── timeline.json       (elements and keyframes)");

    Ok(())
}
