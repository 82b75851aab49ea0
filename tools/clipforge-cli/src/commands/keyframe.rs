//! Edit keyframe curves.

use std::path::PathBuf;

use clipforge_project_model::{AnimatedProperty, Axis};

use super::load_project;

pub fn run(
    path: PathBuf,
    id: String,
    property: String,
    axis: String,
    time: Option<f64>,
    value: Option<f64>,
    remove: Option<usize>,
) -> anyhow::Result<()> {
    let mut project = load_project(&path)?;
    let property: AnimatedProperty = property.parse().map_err(anyhow::Error::msg)?;
    let axis: Axis = axis.parse().map_err(anyhow::Error::msg)?;

    match (remove, time, value) {
        (Some(index), _, _) => {
            project
                .timeline
                .remove_keyframe(&id, property, axis, index)?;
            println!("Removed keyframe {index} from {id}.{property}");
        }
        (None, Some(time), Some(value)) => {
            let index = project
                .timeline
                .add_keyframe(&id, property, axis, time, value)?;
            println!("Added keyframe {index} to {id}.{property} at {time}ms = {value}");
        }
        _ => anyhow::bail!("--time and --value are required unless --remove is given"),
    }

    project
        .commit()
        .map_err(|e| anyhow::anyhow!("Failed to save project: {e}"))?;
    Ok(())
}
