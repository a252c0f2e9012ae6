use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::library::{InstalledTitle, title_name};
use crate::settings::MonitorSettings;

const CONFIG_DIR_NAME: &str = "Steamy";
const CONFIG_FILE_NAME: &str = "steamy_config.json";

/// The single persisted document: libraries, account selection and the playtime ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    pub library_paths: Vec<PathBuf>,
    pub current_user: String,
    #[serde(alias = "steam_usernames")]
    pub account_usernames: BTreeMap<String, String>,
    pub playtime: BTreeMap<String, f64>,
    pub last_played: BTreeMap<String, DateTime<Local>>,
    pub monitor: MonitorSettings,
}

impl LauncherConfig {
    pub fn playtime_seconds(&self, title_id: &str) -> f64 {
        self.playtime.get(title_id).copied().unwrap_or(0.0)
    }

    /// Adds `seconds` to the title's total and returns the new total. Negative
    /// or non-finite amounts are ignored so totals never decrease.
    pub fn add_playtime(&mut self, title_id: &str, seconds: f64, at: DateTime<Local>) -> f64 {
        let entry = self.playtime.entry(title_id.to_string()).or_insert(0.0);
        if seconds.is_finite() && seconds > 0.0 {
            *entry += seconds;
            self.last_played.insert(title_id.to_string(), at);
        }
        *entry
    }

    pub fn username_for(&self, account_id: &str) -> Option<&str> {
        self.account_usernames
            .get(account_id)
            .map(String::as_str)
            .filter(|name| !name.trim().is_empty())
    }
}

/// Durable per-title playtime totals. The monitor only ever proposes increments.
pub trait PlaytimeLedger {
    fn total_seconds(&self, title_id: &str) -> Result<f64>;

    /// Merges `seconds` into the stored total and returns the new total.
    fn add_seconds(&mut self, title_id: &str, seconds: f64) -> Result<f64>;
}

pub struct ConfigStore {
    data_dir: PathBuf,
    config_file: PathBuf,
}

impl ConfigStore {
    /// Resolves `<Documents>/Steamy/steamy_config.json`, falling back to the
    /// working directory when no documents folder is available.
    pub fn new() -> Result<Self> {
        match documents_data_dir() {
            Some(data_dir) => match fs::create_dir_all(&data_dir) {
                Ok(()) => Ok(Self::in_dir(data_dir)),
                Err(err) => {
                    warn!("Failed to create {}: {err}", data_dir.display());
                    Self::in_working_dir()
                }
            },
            None => {
                warn!("No documents directory available, keeping config in working directory");
                Self::in_working_dir()
            }
        }
    }

    pub fn in_dir(data_dir: PathBuf) -> Self {
        let config_file = data_dir.join(CONFIG_FILE_NAME);
        Self {
            data_dir,
            config_file,
        }
    }

    fn in_working_dir() -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to resolve working directory")?;
        Ok(Self::in_dir(cwd))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Loads the document, writing a default one first if none exists yet.
    pub fn open(&self) -> Result<LauncherConfig> {
        if self.config_file.exists() {
            return self.load();
        }
        info!(
            "Config file not found. Creating new config at {}",
            self.config_file.display()
        );
        let config = LauncherConfig::default();
        self.save(&config)?;
        Ok(config)
    }

    pub fn load(&self) -> Result<LauncherConfig> {
        if !self.config_file.exists() {
            return Ok(LauncherConfig::default());
        }
        let content = fs::read_to_string(&self.config_file)
            .with_context(|| format!("Failed to read {}", self.config_file.display()))?;
        let mut config: LauncherConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.config_file.display()))?;
        config.monitor.sanitize();
        Ok(config)
    }

    /// Copies the current document aside as `steamy_config.json.bak` so a
    /// later save cannot destroy a file that failed to load.
    pub fn backup_unreadable(&self) -> Result<PathBuf> {
        let backup = self.config_file.with_extension("json.bak");
        fs::copy(&self.config_file, &backup)
            .with_context(|| format!("Failed to back up {}", self.config_file.display()))?;
        Ok(backup)
    }

    /// Writes to a sibling temp file and renames it over the document.
    pub fn save(&self, config: &LauncherConfig) -> Result<()> {
        fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("Failed to create {}", self.data_dir.display()))?;
        let payload = serde_json::to_string_pretty(config)?;
        let staging = self.config_file.with_extension("json.tmp");
        fs::write(&staging, payload)
            .with_context(|| format!("Failed to write {}", staging.display()))?;
        fs::rename(&staging, &self.config_file)
            .with_context(|| format!("Failed to write {}", self.config_file.display()))
    }

    pub fn export_csv(
        &self,
        path: &Path,
        config: &LauncherConfig,
        titles: &[InstalledTitle],
    ) -> Result<(usize, PathBuf)> {
        let mut out_path = path.to_path_buf();
        if out_path.extension().map(|ext| ext != "csv").unwrap_or(true) {
            out_path.set_extension("csv");
        }
        let mut file = fs::File::create(&out_path)
            .with_context(|| format!("Failed to create {}", out_path.display()))?;
        writeln!(file, "title_id,name,seconds,last_played")?;
        let entries = playtime_report(config, titles);
        for entry in &entries {
            let name = entry.name.replace('"', "'");
            let last_played = entry
                .last_played
                .map(|at| at.to_rfc3339())
                .unwrap_or_default();
            writeln!(
                file,
                "{},\"{}\",{:.0},{}",
                entry.title_id, name, entry.seconds, last_played
            )?;
        }
        Ok((entries.len(), out_path))
    }
}

impl PlaytimeLedger for ConfigStore {
    fn total_seconds(&self, title_id: &str) -> Result<f64> {
        Ok(self.load()?.playtime_seconds(title_id))
    }

    fn add_seconds(&mut self, title_id: &str, seconds: f64) -> Result<f64> {
        let mut config = self.load()?;
        let total = config.add_playtime(title_id, seconds, Local::now());
        self.save(&config)?;
        Ok(total)
    }
}

fn documents_data_dir() -> Option<PathBuf> {
    let dirs = UserDirs::new()?;
    let documents = dirs
        .document_dir()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| dirs.home_dir().join("Documents"));
    Some(documents.join(CONFIG_DIR_NAME))
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaytimeEntry {
    pub title_id: String,
    pub name: String,
    pub seconds: f64,
    pub last_played: Option<DateTime<Local>>,
}

/// Ledger entries with resolved names, most played first.
pub fn playtime_report(config: &LauncherConfig, titles: &[InstalledTitle]) -> Vec<PlaytimeEntry> {
    let mut entries: Vec<PlaytimeEntry> = config
        .playtime
        .iter()
        .map(|(title_id, seconds)| PlaytimeEntry {
            title_id: title_id.clone(),
            name: title_name(titles, title_id),
            seconds: *seconds,
            last_played: config.last_played.get(title_id).copied(),
        })
        .collect();
    entries.sort_by(|a, b| b.seconds.total_cmp(&a.seconds).then(a.name.cmp(&b.name)));
    entries
}

/// `Xm Ys` below an hour, `Xh Ym` from an hour up.
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() {
        seconds.max(0.0) as u64
    } else {
        0
    };
    if total < 3600 {
        format!("{}m {}s", total / 60, total % 60)
    } else {
        format!("{}h {}m", total / 3600, (total % 3600) / 60)
    }
}

pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.1} MB", bytes_to_megabytes(bytes))
}

pub fn bytes_to_megabytes(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
