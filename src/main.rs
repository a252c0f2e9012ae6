use std::{fs::OpenOptions, path::PathBuf, sync::Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use steamy::library::scan_libraries;
use steamy::menu::App;
use steamy::storage::{ConfigStore, format_duration, playtime_report};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const LOG_FILE_NAME: &str = "steamy.log";
const LOG_ENV_VAR: &str = "STEAMY_LOG";

#[derive(Parser, Debug)]
#[command(author, version, about = "Steam game launcher with playtime tracking", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open the interactive launcher (default command)
    Menu,
    /// Print recorded playtime per game to stdout
    Report,
    /// Export recorded playtime to CSV
    ExportCsv {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let store = ConfigStore::new()?;
    init_logging(&store);

    let result = match cli.command.unwrap_or(Command::Menu) {
        Command::Menu => run_menu(store),
        Command::Report => run_report(&store),
        Command::ExportCsv { path } => export_csv(&store, path),
    };
    if let Err(err) = &result {
        error!("Exiting with error: {err:#}");
    }
    result
}

/// Logs go to a file next to the config so they never tear the menus.
fn init_logging(store: &ConfigStore) {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"));
    let path = store.data_dir().join(LOG_FILE_NAME);
    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .try_init();
        }
        Err(err) => {
            eprintln!("Logging disabled, could not open {}: {err}", path.display());
        }
    }
}

fn run_menu(store: ConfigStore) -> Result<()> {
    info!("Using config at {}", store.config_file().display());
    let mut app = App::new(store)?;
    app.run()
}

fn run_report(store: &ConfigStore) -> Result<()> {
    let config = store.load()?;
    let titles = scan_libraries(&config.library_paths);
    let entries = playtime_report(&config, &titles);
    if entries.is_empty() {
        println!("No playtime recorded yet.");
        return Ok(());
    }
    let total: f64 = entries.iter().map(|entry| entry.seconds).sum();
    println!(
        "Playtime Summary\n\nTotal playtime: {} across {} games\n",
        format_duration(total),
        entries.len()
    );
    for (idx, entry) in entries.iter().enumerate() {
        let last_played = entry
            .last_played
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            " {:>2}. {:<40} {:>10}   last played {}",
            idx + 1,
            entry.name,
            format_duration(entry.seconds),
            last_played
        );
    }
    Ok(())
}

fn export_csv(store: &ConfigStore, path: PathBuf) -> Result<()> {
    let config = store.load()?;
    let titles = scan_libraries(&config.library_paths);
    let (written, actual_path) = store
        .export_csv(&path, &config, &titles)
        .with_context(|| format!("Failed to export playtime to {}", path.display()))?;
    println!("Exported {written} games to {}", actual_path.display());
    Ok(())
}
