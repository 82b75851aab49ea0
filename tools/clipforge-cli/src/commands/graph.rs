//! Print the encoder invocation an export would run.

use std::path::PathBuf;

use clipforge_render_engine::export::{partial_path, ExportJob};
use clipforge_render_engine::ExportStrategy;

use super::{export_settings, load_project};

pub fn run(path: PathBuf, strategy: ExportStrategy, json: bool) -> anyhow::Result<()> {
    let project = load_project(&path)?;
    let settings = export_settings(&project);
    let destination = project.resolve(&project.options.video_destination.to_string_lossy());
    let output = partial_path(&destination);

    let job = ExportJob {
        timeline: &project.timeline,
        settings: &settings,
        project_root: &project.root,
        output: &output,
    };
    let plan = strategy.backend().build_plan(&job)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan.args)?);
        return Ok(());
    }

    println!("Strategy: {strategy}");
    println!("Encoder: {}", settings.encoder_binary);
    println!();
    println!("Filter graph:");
    for chain in plan.graph.chains() {
        println!("  {chain}");
    }
    println!();
    println!("Report:");
    for line in plan.debug_report.lines() {
        println!("  {line}");
    }
    Ok(())
}
