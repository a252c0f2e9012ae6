//! Interactive menus and the launch flow.

use anyhow::Result;
use crossterm::style::Stylize;
use tracing::{info, warn};

use crate::accounts::{Account, account_name, discover_accounts};
use crate::error::{LaunchError, LibraryPathError};
use crate::launcher::ClientLauncher;
use crate::library::{InstalledTitle, detect_libraries, scan_libraries, validate_library_dir};
use crate::monitor::{Monitor, SystemClock};
use crate::process::SysinfoProbe;
use crate::storage::{ConfigStore, LauncherConfig};
use crate::ui::{self, GRID_COLUMNS, Key, MainMenuView, RawModeGuard, TerminalConsole};

pub const WINDOW_TITLE: &str = "Steamy - Steam Game Launcher";
const CONTINUE_PROMPT: &str = "Press any key to continue...";

/// Grid navigation: Left/Right step by one title, Up/Down by one row.
pub fn move_selection(selected: usize, count: usize, key: Key) -> usize {
    if count == 0 {
        return 0;
    }
    let selected = selected.min(count - 1);
    match key {
        Key::Left => selected.saturating_sub(1),
        Key::Right if selected + 1 < count => selected + 1,
        Key::Up if selected >= GRID_COLUMNS => selected - GRID_COLUMNS,
        Key::Down if selected + GRID_COLUMNS < count => selected + GRID_COLUMNS,
        _ => selected,
    }
}

/// Up/Down through a vertical list, wrapping at both ends.
fn cycle(selected: usize, count: usize, key: Key) -> usize {
    match key {
        Key::Up => (selected + count - 1) % count,
        Key::Down => (selected + 1) % count,
        _ => selected,
    }
}

/// Adds every path not already configured and returns the ones added.
pub fn merge_library_paths(
    config: &mut LauncherConfig,
    found: Vec<std::path::PathBuf>,
) -> Vec<std::path::PathBuf> {
    let mut added = Vec::new();
    for path in found {
        if !config.library_paths.contains(&path) {
            config.library_paths.push(path.clone());
            added.push(path);
        }
    }
    added
}

pub struct App {
    store: ConfigStore,
    config: LauncherConfig,
    titles: Vec<InstalledTitle>,
    accounts: Vec<Account>,
    selected: usize,
    startup_notice: Option<String>,
}

impl App {
    /// An unreadable config is reported and replaced by defaults for this run.
    pub fn new(store: ConfigStore) -> Result<Self> {
        let (config, startup_notice) = match store.open() {
            Ok(config) => (config, None),
            Err(err) => {
                warn!("Using default settings, config could not be loaded: {err:#}");
                let mut notice = format!("Could not load settings, using defaults: {err:#}");
                match store.backup_unreadable() {
                    Ok(backup) => {
                        info!("Backed up unreadable config to {}", backup.display());
                        notice.push_str(&format!("\nThe old file was saved as {}", backup.display()));
                    }
                    Err(err) => warn!("{err:#}"),
                }
                (LauncherConfig::default(), Some(notice))
            }
        };
        let mut app = Self {
            store,
            config,
            titles: Vec::new(),
            accounts: Vec::new(),
            selected: 0,
            startup_notice,
        };
        app.rescan();
        Ok(app)
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    pub fn startup_notice(&self) -> Option<&str> {
        self.startup_notice.as_deref()
    }

    fn rescan(&mut self) {
        self.titles = scan_libraries(&self.config.library_paths);
        self.accounts = discover_accounts(&self.config.library_paths);
        self.selected = self.selected.min(self.titles.len().saturating_sub(1));
        info!(
            "Found {} titles and {} accounts in {} libraries",
            self.titles.len(),
            self.accounts.len(),
            self.config.library_paths.len()
        );
    }

    fn save(&self) -> Result<()> {
        self.store.save(&self.config)
    }

    pub fn run(&mut self) -> Result<()> {
        ui::set_console_title(WINDOW_TITLE);
        ui::set_console_size(120, 40);
        let _raw = RawModeGuard::enter()?;
        if let Some(notice) = self.startup_notice.take() {
            self.report_error(&notice)?;
        }

        loop {
            if !self.config.library_paths.is_empty() && self.config.current_user.is_empty() {
                ui::draw_frame(&ui::account_needed_lines())?;
                match ui::read_key()? {
                    key if key.is_char('q') || key == Key::Interrupt => return Ok(()),
                    key if key.is_char('s') => self.settings_menu()?,
                    _ => self.select_account()?,
                }
                self.rescan();
                continue;
            }

            let view = MainMenuView {
                titles: &self.titles,
                selected: self.selected,
                library_count: self.config.library_paths.len(),
                account_name: account_name(&self.accounts, &self.config.current_user),
            };
            ui::draw_frame(&ui::main_menu_lines(&view))?;
            let prompt = if self.titles.is_empty() {
                "Press a key to select an action: "
            } else {
                "Use arrow keys to select a game, Enter to launch, or quick action keys: "
            };
            ui::print_inline(&format!("\n{}", prompt.blue()))?;

            let has_libraries = !self.config.library_paths.is_empty();
            match ui::read_key()? {
                key if key.is_char('q') || key == Key::Interrupt => return Ok(()),
                key if key.is_char('s') => {
                    self.settings_menu()?;
                    self.rescan();
                }
                key if key.is_char('r') && has_libraries => self.rescan(),
                key if key.is_char('a') && !has_libraries => {
                    let added = merge_library_paths(&mut self.config, detect_libraries());
                    if !added.is_empty() {
                        self.save_or_report()?;
                        self.rescan();
                    }
                }
                Key::Enter if !self.titles.is_empty() => {
                    if let Err(err) = self.launch(self.selected) {
                        warn!("Launch failed: {err:#}");
                        self.report_error(&format!("{err:#}"))?;
                    }
                }
                key => self.selected = move_selection(self.selected, self.titles.len(), key),
            }
        }
    }

    fn report_error(&self, message: &str) -> Result<()> {
        ui::print_inline(&format!("\n{}\n", message.red()))?;
        ui::wait_for_key(CONTINUE_PROMPT)
    }

    /// A failed save is shown rather than ending the program.
    fn save_or_report(&self) -> Result<()> {
        if let Err(err) = self.save() {
            warn!("Failed to save config: {err:#}");
            self.report_error(&format!("Error saving config: {err:#}"))?;
        }
        Ok(())
    }

    /// Returns the chosen index, or `None` on Esc.
    fn pick_from_list(&self, heading: &str, options: &[String]) -> Result<Option<usize>> {
        if options.is_empty() {
            return Ok(None);
        }
        let mut selected = 0;
        loop {
            ui::draw_frame(&ui::list_menu_lines(heading, options, selected))?;
            ui::print_inline(&format!(
                "\n{}",
                "Use arrow keys to navigate, Enter to select: ".blue()
            ))?;
            match ui::read_key()? {
                Key::Enter => return Ok(Some(selected)),
                Key::Esc | Key::Interrupt => return Ok(None),
                key => selected = cycle(selected, options.len(), key),
            }
        }
    }

    fn settings_menu(&mut self) -> Result<()> {
        let options = [
            "Manage Library Paths".to_string(),
            "Select Steam User".to_string(),
            "Back to Main Menu".to_string(),
        ];
        loop {
            match self.pick_from_list("SETTINGS MENU", &options)? {
                Some(0) => self.manage_library_paths()?,
                Some(1) => self.select_account()?,
                _ => return Ok(()),
            }
        }
    }

    fn manage_library_paths(&mut self) -> Result<()> {
        loop {
            ui::draw_frame(&ui::library_paths_lines(&self.config.library_paths))?;
            ui::print_inline(&format!("\n{}", "Press a key: ".blue()))?;
            match ui::read_key()? {
                Key::Char('1') => self.add_library_path()?,
                Key::Char('2') => self.remove_library_path()?,
                Key::Char('3') => self.auto_detect_libraries()?,
                Key::Char('4') | Key::Esc | Key::Interrupt => {
                    self.rescan();
                    return Ok(());
                }
                _ => {}
            }
        }
    }

    fn add_library_path(&mut self) -> Result<()> {
        let input = ui::prompt_line(&format!(
            "Enter new library path (e.g., {}):",
            example_library_path()
        ))?;
        let validated = validate_library_dir(&input).and_then(|path| {
            if self.config.library_paths.contains(&path) {
                Err(LibraryPathError::AlreadyConfigured(path))
            } else {
                Ok(path)
            }
        });
        match validated {
            Ok(path) => {
                info!("Adding library {}", path.display());
                self.config.library_paths.push(path);
                match self.save() {
                    Ok(()) => ui::print_inline(&format!("{}\n", "Path added successfully!".green()))?,
                    Err(err) => {
                        warn!("Failed to save config: {err:#}");
                        ui::print_inline(&format!("{}\n", format!("Error saving config: {err:#}").red()))?
                    }
                }
            }
            Err(err) => {
                ui::print_inline(&format!("{}\n", err.to_string().red()))?;
                if !matches!(err, LibraryPathError::Empty | LibraryPathError::AlreadyConfigured(_)) {
                    ui::print_inline(&format!(
                        "{}\n",
                        "Please verify the path and try again.".yellow()
                    ))?;
                }
            }
        }
        ui::wait_for_key(CONTINUE_PROMPT)
    }

    fn remove_library_path(&mut self) -> Result<()> {
        if self.config.library_paths.is_empty() {
            return self.report_error("No paths to remove.");
        }
        ui::print_inline(&format!(
            "\n{}",
            "Enter the number of the path to remove: ".yellow()
        ))?;
        match ui::read_number()? {
            Some(number) if (1..=self.config.library_paths.len()).contains(&number) => {
                let removed = self.config.library_paths.remove(number - 1);
                info!("Removed library {}", removed.display());
                self.save_or_report()?;
                ui::print_inline(&format!(
                    "{}\n",
                    format!("Removed: {}", removed.display()).green()
                ))?;
                ui::wait_for_key(CONTINUE_PROMPT)
            }
            Some(_) => self.report_error("Invalid number."),
            None => Ok(()),
        }
    }

    fn auto_detect_libraries(&mut self) -> Result<()> {
        let found = detect_libraries();
        if found.is_empty() {
            return self.report_error("No Steam libraries found.");
        }
        ui::print_inline(&format!("\n{}\n", "Found Steam libraries:".green()))?;
        let added = merge_library_paths(&mut self.config, found);
        for path in &added {
            ui::print_inline(&format!("Added: {}\n", path.display()))?;
        }
        if added.is_empty() {
            ui::print_inline("All detected libraries are already configured.\n")?;
        } else {
            self.save_or_report()?;
        }
        ui::wait_for_key(CONTINUE_PROMPT)
    }

    fn select_account(&mut self) -> Result<()> {
        self.accounts = discover_accounts(&self.config.library_paths);
        if self.accounts.is_empty() {
            return self.report_error("No Steam users found.");
        }
        let names: Vec<String> = self.accounts.iter().map(|a| a.name.clone()).collect();
        let Some(idx) = self.pick_from_list("SELECT STEAM USER", &names)? else {
            return Ok(());
        };
        let account = self.accounts[idx].clone();
        let username = ui::prompt_line(&format!(
            "Please enter your Steam account username (NOT display name) for {}:",
            account.name
        ))?;

        self.config.current_user = account.id.clone();
        if !username.is_empty() {
            self.config
                .account_usernames
                .insert(account.id.clone(), username.clone());
        }
        self.save_or_report()?;
        info!("Selected account {}", account.id);

        ui::print_inline(&format!(
            "\n{}\n",
            format!("Selected user: {}", account.name).green()
        ))?;
        if !username.is_empty() {
            ui::print_inline(&format!(
                "{}\n",
                format!("Steam username saved: {username}").green()
            ))?;
        }
        ui::wait_for_key(CONTINUE_PROMPT)
    }

    /// Logs in if needed, launches the title and watches it until the session ends.
    fn launch(&mut self, idx: usize) -> Result<()> {
        let Some(title) = self.titles.get(idx).cloned() else {
            return Ok(());
        };
        ui::print_inline(&format!(
            "\n{}\n",
            "=== Starting Game Launch Process ===".cyan()
        ))?;

        let account_id = self.config.current_user.clone();
        if account_name(&self.accounts, &account_id).is_none() {
            return Err(LaunchError::UnknownAccount(account_id).into());
        }
        let launcher = ClientLauncher::locate(&self.config.library_paths)?;
        let settings = self.config.monitor.clone();
        let mut probe = SysinfoProbe::new(settings.cpu_sample_window());

        if launcher.needs_login(&mut probe, &account_id) {
            let username = match self.config.username_for(&account_id) {
                Some(username) => username.to_string(),
                None => {
                    let username = ui::prompt_line(
                        "Please enter your Steam account username (NOT display name):",
                    )?;
                    if username.is_empty() {
                        return Err(LaunchError::MissingUsername.into());
                    }
                    self.config
                        .account_usernames
                        .insert(account_id.clone(), username.clone());
                    self.save_or_report()?;
                    username
                }
            };
            ui::print_inline(&format!("Logging in as {username}...\n"))?;
            launcher.restart_with_login(&mut probe, &username, &settings)?;
        }

        ui::print_inline(&format!("Launching {}...\n", title.name))?;
        launcher.launch_title(&title.app_id)?;
        if !settings.track_sessions {
            info!("Session tracking disabled, not monitoring {}", title.app_id);
            return Ok(());
        }

        let summary = Monitor::new(settings).run(
            &title,
            &mut probe,
            &mut self.store,
            &mut TerminalConsole,
            &SystemClock,
        );
        info!(
            "Session for {} finished as {:?} after {:.0}s",
            summary.title_id, summary.final_state, summary.session_seconds
        );

        match self.store.load() {
            Ok(config) => self.config = config,
            Err(err) => warn!("Failed to reload config after session: {err:#}"),
        }
        ui::draw_frame(&ui::session_ended_lines(&summary))?;
        ui::wait_for_key("Press any key to return to menu...")
    }
}

fn example_library_path() -> &'static str {
    if cfg!(windows) {
        r"D:\Steam\steamapps"
    } else {
        "~/.steam/steam/steamapps"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use test_case::test_case;

    #[test_case(0, 7, Key::Left, 0 ; "left stops at first")]
    #[test_case(4, 7, Key::Left, 3 ; "left steps back")]
    #[test_case(5, 7, Key::Right, 6 ; "right steps forward")]
    #[test_case(6, 7, Key::Right, 6 ; "right stops at last")]
    #[test_case(2, 7, Key::Up, 2 ; "up stays in first row")]
    #[test_case(5, 7, Key::Up, 2 ; "up moves a row")]
    #[test_case(3, 7, Key::Down, 6 ; "down moves a row")]
    #[test_case(4, 7, Key::Down, 4 ; "down needs a title below")]
    #[test_case(9, 7, Key::Char('x'), 6 ; "stale selection is clamped")]
    #[test_case(0, 0, Key::Down, 0 ; "empty grid")]
    fn grid_navigation(selected: usize, count: usize, key: Key, expected: usize) {
        assert_eq!(move_selection(selected, count, key), expected);
    }

    #[test]
    fn list_navigation_wraps() {
        assert_eq!(cycle(0, 3, Key::Up), 2);
        assert_eq!(cycle(2, 3, Key::Down), 0);
        assert_eq!(cycle(1, 3, Key::Enter), 1);
    }

    #[test]
    fn unreadable_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::in_dir(dir.path().to_path_buf());
        std::fs::write(store.config_file(), "{ not json").unwrap();
        let backup = store.config_file().with_extension("json.bak");

        let app = App::new(store).unwrap();

        assert_eq!(app.config(), &LauncherConfig::default());
        assert!(app.config().library_paths.is_empty());
        assert!(app.startup_notice().unwrap().contains("using defaults"));
        assert_eq!(std::fs::read_to_string(backup).unwrap(), "{ not json");
    }

    #[test]
    fn readable_config_is_used_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::in_dir(dir.path().to_path_buf());
        let mut config = LauncherConfig::default();
        config.current_user = "42".into();
        store.save(&config).unwrap();

        let app = App::new(store).unwrap();

        assert_eq!(app.config().current_user, "42");
        assert_eq!(app.startup_notice(), None);
    }

    #[test]
    fn merging_skips_known_libraries() {
        let mut config = LauncherConfig {
            library_paths: vec![PathBuf::from("/games/a")],
            ..LauncherConfig::default()
        };
        let added = merge_library_paths(
            &mut config,
            vec![PathBuf::from("/games/a"), PathBuf::from("/games/b")],
        );
        assert_eq!(added, vec![PathBuf::from("/games/b")]);
        assert_eq!(
            config.library_paths,
            vec![PathBuf::from("/games/a"), PathBuf::from("/games/b")]
        );
    }
}
