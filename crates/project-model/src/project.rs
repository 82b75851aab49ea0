//! Project bundle and render options.
//!
//! A project is a directory holding the serialized timeline, the render
//! options used for preview and export, and a small manifest.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::element::ElementKind;
use crate::timeline::Timeline;

pub const TIMELINE_FILE: &str = "timeline.json";
pub const RENDER_OPTIONS_FILE: &str = "renderOptions.json";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Output pixel size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewSize {
    pub w: u32,
    pub h: u32,
}

impl Default for PreviewSize {
    fn default() -> Self {
        Self { w: 1920, h: 1080 }
    }
}

/// Output settings (`renderOptions.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderOptions {
    /// Output duration in seconds.
    pub video_duration: f64,

    /// Preview aspect ratio (width / height).
    pub preview_ratio: f64,

    /// Destination file of the export.
    pub video_destination: PathBuf,

    pub background_color: String,

    pub preview_size: PreviewSize,

    /// Video bitrate in kbps.
    pub video_bitrate: u32,

    pub fps: u32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            video_duration: 10.0,
            preview_ratio: 16.0 / 9.0,
            video_destination: PathBuf::from("output.mp4"),
            background_color: "#000000".to_string(),
            preview_size: PreviewSize::default(),
            video_bitrate: 5500,
            fps: 60,
        }
    }
}

impl RenderOptions {
    pub fn duration_ms(&self) -> f64 {
        self.video_duration * 1000.0
    }

    pub fn validate(&self) -> Result<(), ProjectError> {
        if !(self.video_duration.is_finite() && self.video_duration > 0.0) {
            return Err(ProjectError::ValidationError {
                message: format!("videoDuration must be positive, got {}", self.video_duration),
            });
        }
        if self.preview_size.w == 0 || self.preview_size.h == 0 {
            return Err(ProjectError::ValidationError {
                message: "previewSize must be non-zero".to_string(),
            });
        }
        if self.fps == 0 {
            return Err(ProjectError::ValidationError {
                message: "fps must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Bundle metadata (`manifest.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Schema version.
    pub version: String,

    /// Human-readable project name.
    pub name: String,

    /// Unique project identifier (UUID).
    pub id: String,

    /// Creation timestamp (RFC 3339).
    pub created_at: String,

    /// Last modified timestamp (RFC 3339).
    pub modified_at: String,
}

impl Manifest {
    pub fn new(name: impl Into<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            version: "1.0".to_string(),
            name: name.into(),
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now.clone(),
            modified_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.modified_at = chrono::Utc::now().to_rfc3339();
    }
}

/// A project loaded from disk.
#[derive(Debug, Clone)]
pub struct ProjectBundle {
    /// Bundle directory.
    pub root: PathBuf,

    pub manifest: Manifest,

    pub options: RenderOptions,

    pub timeline: Timeline,
}

impl ProjectBundle {
    /// Load a bundle directory. A missing manifest is recreated from the
    /// directory name so bare `timeline.json` + `renderOptions.json` pairs load.
    pub fn load(root: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let root = root.as_ref().to_path_buf();

        let timeline: Timeline = read_json(&root.join(TIMELINE_FILE))?;
        let options_path = root.join(RENDER_OPTIONS_FILE);
        let options: RenderOptions = if options_path.exists() {
            read_json(&options_path)?
        } else {
            RenderOptions::default()
        };
        let manifest_path = root.join(MANIFEST_FILE);
        let manifest = if manifest_path.exists() {
            read_json(&manifest_path)?
        } else {
            let name = root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "untitled".to_string());
            Manifest::new(name)
        };

        tracing::debug!(
            root = %root.display(),
            elements = timeline.len(),
            "Loaded project bundle"
        );

        Ok(Self {
            root,
            manifest,
            options,
            timeline,
        })
    }

    /// Write all bundle files.
    pub fn save(&self) -> Result<(), ProjectError> {
        std::fs::create_dir_all(&self.root).map_err(|e| ProjectError::IoError {
            path: self.root.clone(),
            source: e,
        })?;
        write_json(&self.root.join(TIMELINE_FILE), &self.timeline)?;
        write_json(&self.root.join(RENDER_OPTIONS_FILE), &self.options)?;
        write_json(&self.root.join(MANIFEST_FILE), &self.manifest)?;
        Ok(())
    }

    /// Create an empty project on disk.
    pub fn create(
        root: impl AsRef<Path>,
        name: impl Into<String>,
        options: RenderOptions,
    ) -> Result<Self, ProjectError> {
        options.validate()?;
        let bundle = Self {
            root: root.as_ref().to_path_buf(),
            manifest: Manifest::new(name),
            options,
            timeline: Timeline::new(),
        };
        bundle.save()?;
        Ok(bundle)
    }

    /// Update the modification time and save.
    pub fn commit(&mut self) -> Result<(), ProjectError> {
        self.manifest.touch();
        self.save()
    }

    /// Report referenced source files that do not exist.
    pub fn validate_sources(&self) -> Vec<String> {
        let mut errors = vec![];
        for (id, element) in self.timeline.iter() {
            if let Some(path) = element.localpath() {
                if !self.resolve(path).exists() {
                    errors.push(format!("{} {id} source missing: {path}", element.element_type()));
                }
            }
            if let ElementKind::Text(text) = &element.kind {
                if !text.uses_default_font() && !self.resolve(&text.fontpath).exists() {
                    errors.push(format!("text {id} font missing: {}", text.fontpath));
                }
                if let Some(parent) = text.parent() {
                    if !self.timeline.contains(parent) {
                        errors.push(format!("text {id} parent missing: {parent}"));
                    }
                }
            }
        }
        errors
    }

    /// Resolve a possibly relative media path against the bundle root.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ProjectError> {
    let content = std::fs::read_to_string(path).map_err(|e| ProjectError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&content).map_err(|e| ProjectError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ProjectError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| ProjectError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })?;
    std::fs::write(path, json).map_err(|e| ProjectError::IoError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Errors that can occur when working with projects.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid project: {message}")]
    ValidationError { message: String },
}
