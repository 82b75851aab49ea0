//! ClipForge CLI: create, edit, preview, and export timeline projects.
//!
//! Usage:
//!   clipforge init <NAME>              Create an empty project
//!   clipforge info <PATH>              Show project information
//!   clipforge validate <PATH>          Validate a project bundle
//!   clipforge add <PATH> <KIND>        Add an element to the timeline
//!   clipforge keyframe <PATH> <ID> ... Add or remove a keyframe
//!   clipforge preview <PATH>           Render one frame to PNG
//!   clipforge graph <PATH>             Print the encoder invocation
//!   clipforge export <PATH>            Export a project to video

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clipforge_common::config::AppConfig;
use clipforge_render_engine::ExportStrategy;

mod commands;

use commands::add::AddKind;

#[derive(Parser)]
#[command(
    name = "clipforge",
    about = "Keyframe timeline editor with ffmpeg export",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new empty project
    Init {
        /// Project name
        name: String,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Output width
        #[arg(long, default_value = "1920")]
        width: u32,

        /// Output height
        #[arg(long, default_value = "1080")]
        height: u32,

        /// Output duration in seconds
        #[arg(long, default_value = "10")]
        duration: f64,

        /// Output frame rate
        #[arg(long, default_value = "60")]
        fps: u32,
    },

    /// Show project information
    Info {
        /// Path to the project directory
        path: PathBuf,
    },

    /// Validate a project bundle
    Validate {
        /// Path to the project directory
        path: PathBuf,
    },

    /// Add an element to the timeline
    Add {
        /// Path to the project directory
        path: PathBuf,

        /// Element type
        #[arg(value_enum)]
        kind: AddKind,

        /// Media file (video, audio, image, gif)
        #[arg(long)]
        src: Option<String>,

        /// Text content (text)
        #[arg(long)]
        text: Option<String>,

        /// Start time on the timeline (ms)
        #[arg(long, default_value = "0")]
        start: f64,

        /// Duration (ms)
        #[arg(long, default_value = "3000")]
        duration: f64,

        #[arg(long, default_value = "0")]
        x: f64,

        #[arg(long, default_value = "0")]
        y: f64,

        #[arg(long, default_value = "320")]
        width: f64,

        #[arg(long, default_value = "180")]
        height: f64,

        /// Paint order; higher paints later
        #[arg(long, default_value = "0")]
        priority: i64,

        /// Element id (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Parent element of a text caption
        #[arg(long)]
        parent: Option<String>,

        /// The video has no audio stream
        #[arg(long)]
        no_audio: bool,
    },

    /// Add or remove a keyframe on an element's curve
    Keyframe {
        /// Path to the project directory
        path: PathBuf,

        /// Element id
        id: String,

        /// position | rotation | scale | opacity
        property: String,

        /// Curve axis (y only exists for position)
        #[arg(long, default_value = "x")]
        axis: String,

        /// Time relative to the element start (ms)
        #[arg(long, required_unless_present = "remove")]
        time: Option<f64>,

        /// Value at that time (scale in tenths: 10 = 1.0x)
        #[arg(long, required_unless_present = "remove")]
        value: Option<f64>,

        /// Remove the keyframe at this index instead
        #[arg(long, conflicts_with_all = ["time", "value"])]
        remove: Option<usize>,
    },

    /// Render one frame to a PNG file
    Preview {
        /// Path to the project directory
        path: PathBuf,

        /// Timeline position (ms)
        #[arg(short, long, default_value = "0")]
        time: f64,

        /// Output image
        #[arg(short, long, default_value = "preview.png")]
        output: PathBuf,

        /// Draw the selection outline around this element
        #[arg(long)]
        select: Option<String>,
    },

    /// Print the encoder invocation an export would run
    Graph {
        /// Path to the project directory
        path: PathBuf,

        /// frames | graph
        #[arg(long, default_value = "frames")]
        strategy: ExportStrategy,

        /// Print the arguments as a JSON array
        #[arg(long)]
        json: bool,
    },

    /// Export a project to video
    Export {
        /// Path to the project directory
        path: PathBuf,

        /// Output file path (defaults to the project's videoDestination)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// frames | graph
        #[arg(long, default_value = "frames")]
        strategy: ExportStrategy,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut logging = AppConfig::load().logging;
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    clipforge_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Init {
            name,
            output,
            width,
            height,
            duration,
            fps,
        } => commands::init::run(name, output, width, height, duration, fps),
        Commands::Info { path } => commands::info::run(path),
        Commands::Validate { path } => commands::validate::run(path),
        Commands::Add {
            path,
            kind,
            src,
            text,
            start,
            duration,
            x,
            y,
            width,
            height,
            priority,
            id,
            parent,
            no_audio,
        } => commands::add::run(commands::add::AddArgs {
            path,
            kind,
            src,
            text,
            start,
            duration,
            x,
            y,
            width,
            height,
            priority,
            id,
            parent,
            no_audio,
        }),
        Commands::Keyframe {
            path,
            id,
            property,
            axis,
            time,
            value,
            remove,
        } => commands::keyframe::run(path, id, property, axis, time, value, remove),
        Commands::Preview {
            path,
            time,
            output,
            select,
        } => commands::preview::run(path, time, output, select),
        Commands::Graph {
            path,
            strategy,
            json,
        } => commands::graph::run(path, strategy, json),
        Commands::Export {
            path,
            output,
            strategy,
        } => commands::export::run(path, output, strategy).await,
    }
}
