//! Validate a ClipForge project bundle.

use std::path::PathBuf;

use super::load_project;

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    println!("Validating project at: {}", path.display());

    let project = load_project(&path)?;

    println!("  Name: {}", project.manifest.name);
    println!("  Version: {}", project.manifest.version);
    println!(
        "  Resolution: {}x{}",
        project.options.preview_size.w, project.options.preview_size.h
    );
    println!("  FPS: {}", project.options.fps);
    println!("  Elements: {}", project.timeline.len());

    let mut errors = Vec::new();
    if let Err(e) = project.options.validate() {
        errors.push(e.to_string());
    }
    if let Err(e) = project.timeline.validate() {
        errors.push(e.to_string());
    }
    errors.extend(project.validate_sources());

    if errors.is_empty() {
        println!("  Sources: All present");
        println!("\nProject is valid.");
    } else {
        println!("\nValidation issues:");
        for error in &errors {
            println!("  - {error}");
        }
        println!(
            "\n{} issue(s) found. Project may not be fully usable.",
            errors.len()
        );
    }

    Ok(())
}
