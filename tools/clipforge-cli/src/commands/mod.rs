pub mod add;
pub mod export;
pub mod graph;
pub mod info;
pub mod init;
pub mod keyframe;
pub mod preview;
pub mod validate;

use std::path::Path;

use clipforge_common::config::AppConfig;
use clipforge_project_model::ProjectBundle;
use clipforge_render_engine::ExportSettings;

pub fn load_project(path: &Path) -> anyhow::Result<ProjectBundle> {
    ProjectBundle::load(path).map_err(|e| anyhow::anyhow!("Failed to load project: {e}"))
}

/// Export settings from the project's render options and the user config.
pub fn export_settings(project: &ProjectBundle) -> ExportSettings {
    ExportSettings::from_project(&project.options, &AppConfig::load().export)
}
