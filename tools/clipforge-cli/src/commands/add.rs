//! Add an element to a project's timeline.

use std::path::PathBuf;

use clap::ValueEnum;
use clipforge_project_model::{
    AudioElement, Codec, Element, ElementKind, GifElement, ImageElement, TextBackground,
    TextElement, TextOptions, TrimWindow, VideoElement, DEFAULT_FONT, STANDALONE_PARENT,
};

use super::load_project;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AddKind {
    Video,
    Audio,
    Image,
    Gif,
    Text,
}

pub struct AddArgs {
    pub path: PathBuf,
    pub kind: AddKind,
    pub src: Option<String>,
    pub text: Option<String>,
    pub start: f64,
    pub duration: f64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub priority: i64,
    pub id: Option<String>,
    pub parent: Option<String>,
    pub no_audio: bool,
}

fn build_kind(args: &AddArgs) -> anyhow::Result<ElementKind> {
    let src = || {
        args.src
            .clone()
            .ok_or_else(|| anyhow::anyhow!("--src is required for {:?} elements", args.kind))
    };
    let trim = TrimWindow::new(0.0, args.duration);
    Ok(match args.kind {
        AddKind::Video => ElementKind::Video(VideoElement {
            localpath: src()?,
            trim,
            speed: 1.0,
            is_exist_audio: !args.no_audio,
            codec: Codec::default(),
        }),
        AddKind::Audio => ElementKind::Audio(AudioElement {
            localpath: src()?,
            trim,
            speed: 1.0,
        }),
        AddKind::Image => ElementKind::Image(ImageElement { localpath: src()? }),
        AddKind::Gif => ElementKind::Gif(GifElement { localpath: src()? }),
        AddKind::Text => ElementKind::Text(TextElement {
            text: args
                .text
                .clone()
                .ok_or_else(|| anyhow::anyhow!("--text is required for text elements"))?,
            fontname: "Default".to_string(),
            fontpath: DEFAULT_FONT.to_string(),
            fontsize: 48.0,
            textcolor: "#ffffff".to_string(),
            background: TextBackground::default(),
            options: TextOptions::default(),
            letter_spacing: 0.0,
            width_inner: args.width,
            parent_key: args
                .parent
                .clone()
                .unwrap_or_else(|| STANDALONE_PARENT.to_string()),
        }),
    })
}

pub fn run(args: AddArgs) -> anyhow::Result<()> {
    let mut project = load_project(&args.path)?;

    let element = Element::new(build_kind(&args)?, args.start, args.duration)
        .with_location(args.x, args.y)
        .with_size(args.width, args.height)
        .with_priority(args.priority);

    let id = match &args.id {
        Some(id) => {
            project.timeline.insert_with_id(id.clone(), element)?;
            id.clone()
        }
        None => project.timeline.insert(element)?,
    };
    project
        .commit()
        .map_err(|e| anyhow::anyhow!("Failed to save project: {e}"))?;

    println!("Added {:?} element {id}", args.kind);
    Ok(())
}
