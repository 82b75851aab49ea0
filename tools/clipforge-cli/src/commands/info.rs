//! Show project information.

use std::path::PathBuf;

use clipforge_resolver::{timeline_end_ms, visible_window};

use super::load_project;

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    let project = load_project(&path)?;
    let m = &project.manifest;
    let o = &project.options;

    println!("Project: {}", m.name);
    println!("  ID: {}", m.id);
    println!("  Created: {}", m.created_at);
    println!("  Modified: {}", m.modified_at);
    println!();

    println!("Output:");
    println!(
        "  Resolution: {}x{} @ {}fps",
        o.preview_size.w, o.preview_size.h, o.fps
    );
    println!("  Duration: {:.1}s", o.video_duration);
    println!("  Bitrate: {}k", o.video_bitrate);
    println!("  Background: {}", o.background_color);
    println!("  Destination: {}", o.video_destination.display());
    println!();

    println!("Timeline ({} elements):", project.timeline.len());
    for (id, element) in project.timeline.by_priority() {
        let window = visible_window(&project.timeline, element);
        let animated: Vec<&str> = clipforge_project_model::AnimatedProperty::ALL
            .iter()
            .filter(|p| {
                element
                    .animation
                    .track(**p)
                    .is_some_and(|t| t.is_active && !t.is_empty())
            })
            .map(|p| p.as_str())
            .collect();
        println!(
            "  [{:>3}] {:<6} {}  {:.0}..{:.0}ms{}",
            element.priority,
            element.element_type(),
            id,
            window.start_ms,
            window.end_ms,
            if animated.is_empty() {
                String::new()
            } else {
                format!("  animated: {}", animated.join(", "))
            }
        );
    }
    println!(
        "  Last visible frame ends at {:.0}ms",
        timeline_end_ms(&project.timeline)
    );

    Ok(())
}
