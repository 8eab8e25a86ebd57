use std::io::{Error, ErrorKind};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Mutex, mpsc};

mod api;
mod controller;
mod domain;
mod inputter;
mod model;
mod record;
mod session;
mod ui;
mod view;

use clap::Parser;
use directories::ProjectDirs;
use tracing::info;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use controller::Controller;
use domain::{PvConfig, PvError};
use model::{Model, Status};
use session::TokenStore;
use ui::PvUI;

#[derive(Parser, Debug)]
#[command(version, about = "A tui based product inventory viewer.")]
struct Cli {
    /// Base URL of the products API
    #[arg(long, default_value = "https://dummyjson.com")]
    api_base: String,

    /// Shared session file, also watched for changes made by other
    /// instances. Defaults to a file in the user data directory.
    #[arg(long)]
    session_file: Option<String>,

    /// Log file, the terminal is taken over by the UI
    #[arg(long, default_value = "pv.log")]
    log_file: String,
}

fn main() -> ExitCode {
    let result = run();
    ratatui::restore();
    match result {
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn run() -> Result<(), PvError> {
    let cli = Cli::parse();

    let session_path = match &cli.session_file {
        Some(path) => PathBuf::from(expand(path)?),
        None => default_session_path(),
    };
    init_logging(&PathBuf::from(expand(&cli.log_file)?))?;
    info!(
        "Starting pv! api: {}, session: {}",
        cli.api_base,
        session_path.display()
    );

    let config = PvConfig::default()
        .api_base(cli.api_base)
        .session_path(session_path);

    let (tx, rx) = mpsc::channel();
    let mut model = Model::init(&config, tx.clone())?;
    // Must outlive the loop, dropping it stops the notifications.
    let _watcher = session::watch_store(&TokenStore::new(&config.session_path), tx)?;

    let mut ui = PvUI::new(&config);
    let controller = Controller::new(&config);
    let mut terminal = ratatui::init();

    while model.status != Status::QUITTING {
        // Render the current view
        terminal.draw(|f| ui.draw(model.get_uidata(), f))?;

        // Apply everything the workers and the watcher posted since the
        // last pass, then handle at most one key event.
        while let Ok(message) = rx.try_recv() {
            model.update(message)?;
        }
        if let Some(message) = controller.handle_event(&model)? {
            model.update(message)?;
        }
    }

    Ok(())
}

fn expand(path: &str) -> Result<String, PvError> {
    shellexpand::full(path)
        .map(|expanded| expanded.into_owned())
        .map_err(|e| Error::new(ErrorKind::InvalidInput, format!("Bad path {path}: {e}")).into())
}

fn default_session_path() -> PathBuf {
    ProjectDirs::from("", "", "pv")
        .map(|dirs| dirs.data_dir().join("session.json"))
        .unwrap_or_else(|| PathBuf::from("pv_session.json"))
}

fn init_logging(path: &PathBuf) -> Result<(), PvError> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .with(ErrorLayer::default())
        .init();
    Ok(())
}
