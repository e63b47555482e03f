use std::{io, path::PathBuf, sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use color_eyre as ey;
use ey::eyre::{eyre, Context};
use fern::colors::{Color, ColoredLevelConfig};
use flipm_content::{
    default_encoder_path, AssetEvent, AssetPipeline, AssetWatcher, ChangeKind, Encoder, Event, Settings, DEFAULT_RESOURCE_DIR,
};
use flipm_shared::log::{self, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Flip'M Tools - Resource Watcher", long_about = None)]
struct CommandLineArguments {
    /// Directory that contains the source assets
    #[arg(short, long, default_value = DEFAULT_RESOURCE_DIR)]
    res: PathBuf,

    /// Path of the gameplay encoder executable
    #[arg(short, long, default_value = default_encoder_path())]
    encoder: PathBuf,

    /// Time in milliseconds to wait for further changes of a file before it is processed
    #[arg(long, default_value_t = 1000)]
    debounce_ms: u64,

    /// Process outdated assets when the watcher starts
    #[arg(long)]
    scan: bool,

    #[clap(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand, Debug, Clone)]
enum Mode {
    /// Watch the resource directory until the process is terminated
    Watch,
    /// Run the pipeline for a single source file and exit
    Process {
        /// Source file (.fbx or .ttf)
        file: PathBuf,
    },
}

fn main() -> ey::Result<()> {
    // Setup logging
    let colors = ColoredLevelConfig::new()
        .info(Color::Green)
        .debug(Color::BrightBlack)
        .trace(Color::BrightBlack);
    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                flipm_shared::chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                colors.color(record.level()),
                message
            ))
        })
        .level(log::LevelFilter::Info)
        .level_for("flipm_content", log::LevelFilter::Trace)
        .chain(io::stdout())
        .apply()
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;

    let command_line_arguments = CommandLineArguments::parse();

    info!("Flip'M Tools - Resource Watcher");
    info!("Platform: {}", std::env::consts::OS);
    info!("Resource directory: {}", command_line_arguments.res.display());
    info!("Encoder: {}", command_line_arguments.encoder.display());

    let mut settings = Settings::new(&command_line_arguments.res, command_line_arguments.encoder.clone())
        .wrap_err_with(|| format!("Failed to open resource directory '{}'", command_line_arguments.res.display()))?;
    settings.debounce = Duration::from_millis(command_line_arguments.debounce_ms);
    settings.scan_on_start = command_line_arguments.scan;

    let encoder = Arc::new(Encoder::new(settings.encoder_path()));
    let pipeline = AssetPipeline::new(settings, encoder);

    match command_line_arguments.mode.unwrap_or(Mode::Watch) {
        Mode::Watch => watch(pipeline),
        Mode::Process { file } => process(&pipeline, file),
    }
}

fn watch(pipeline: AssetPipeline) -> ey::Result<()> {
    let mut asset_watcher = AssetWatcher::new(pipeline).wrap_err("Failed to start the resource watcher")?;
    let receiver = asset_watcher.observe();
    info!("Watching for changes. Press Ctrl-C to stop.");

    let (mut processed, mut failed) = (0usize, 0usize);
    for event in receiver.iter() {
        match event {
            Event::Processed(_) => processed += 1,
            Event::Failed(_, _) => failed += 1,
            Event::Ignored(_) | Event::Removed(_) => continue,
        }
        info!("Assets processed: {processed}, failed: {failed}");
    }
    Ok(())
}

fn process(pipeline: &AssetPipeline, file: PathBuf) -> ey::Result<()> {
    let file = file
        .canonicalize()
        .wrap_err_with(|| format!("Failed to find source file '{}'", file.display()))?;
    let kind = AssetEvent::new(&file, ChangeKind::Changed)
        .kind()
        .ok_or_else(|| eyre!("No pipeline for '{}'", file.display()))?;

    info!("Processing {kind} asset: {}", file.display());
    pipeline
        .run(kind, &file)
        .wrap_err_with(|| format!("Failed to process '{}'", file.display()))?;
    info!("Done: {}", file.display());
    Ok(())
}
