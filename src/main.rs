use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, info, warn};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode, WriteLogger};

use pdfview::pdf::{FileSource, MupdfEngine, PixelSurface, Session, SessionState};
use pdfview::settings::Settings;

/// Open a PDF headlessly, navigate, and export the rendered page
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path or file:// URL of the PDF
    locator: String,

    /// Page to show, as typed into a page field
    #[arg(long)]
    page: Option<String>,

    /// Zoom in this many steps
    #[arg(long, default_value_t = 0)]
    zoom_in: u32,

    /// Zoom out this many steps
    #[arg(long, default_value_t = 0)]
    zoom_out: u32,

    /// Write the rendered page to this PNG file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Settings file (defaults to the platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    /// Print the session snapshot as JSON
    #[arg(long)]
    json: bool,

    /// Give up waiting for the load and render after this many seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

fn init_logging(cli: &Cli, settings: &Settings) -> Result<()> {
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        settings.log_level_filter()
    };

    match &cli.log_file {
        Some(path) => WriteLogger::init(
            level,
            Config::default(),
            File::create(path).with_context(|| format!("creating log file {path:?}"))?,
        )?,
        None => TermLogger::init(
            level,
            Config::default(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        )?,
    }
    Ok(())
}

fn print_state(state: &SessionState, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(state)?);
        return Ok(());
    }

    println!("phase: {}", state.phase.as_str());
    if let Some(locator) = &state.locator {
        println!("locator: {locator}");
    }
    if let Some(label) = state.page_label() {
        println!("{label}");
    }
    println!("zoom: {}%", state.zoom_percent());
    if let Some(error) = &state.error {
        println!("error ({}): {}", error.kind, error.message);
    }
    Ok(())
}

fn main() -> Result<()> {
    better_panic::install();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    init_logging(&cli, &settings)?;

    let source = match &settings.source_root {
        Some(root) => FileSource::with_root(root),
        None => FileSource::new(),
    };
    let config = settings.session_config()?;
    let timeout = Duration::from_secs(cli.timeout_secs);

    info!("Starting pdfview for {}", cli.locator);
    let mut session = Session::with_locator(
        config,
        Arc::new(source),
        Arc::new(MupdfEngine::new()),
        PixelSurface::new(),
        &cli.locator,
    )?;

    if !session.wait_idle(timeout) {
        bail!("timed out after {}s waiting for {}", cli.timeout_secs, cli.locator);
    }

    if let Some(text) = &cli.page {
        if let Err(e) = session.submit_page_input(text) {
            warn!("{e}; staying on page {}", session.state().current_page);
        }
    }
    for _ in 0..cli.zoom_in {
        session.zoom_in();
    }
    for _ in 0..cli.zoom_out {
        session.zoom_out();
    }
    if !session.wait_idle(timeout) {
        bail!("timed out after {}s waiting for render", cli.timeout_secs);
    }

    let state = session.state();
    print_state(&state, cli.json)?;

    if let Some(path) = &cli.output {
        let image = session.surface().and_then(PixelSurface::to_image);
        match image {
            Some(image) => {
                image
                    .save(path)
                    .with_context(|| format!("writing {path:?}"))?;
                info!("Wrote {path:?}");
            }
            None => warn!("Nothing rendered; {path:?} not written"),
        }
    }

    session.close();
    info!("Shutting down pdfview");

    if state.error.as_ref().is_some_and(|e| e.kind.is_terminal()) {
        std::process::exit(1);
    }
    Ok(())
}
