//! Starting the client, switching accounts and launching titles.

use std::{
    path::{Path, PathBuf},
    process::{Command, Stdio},
    thread,
};

use tracing::{debug, info, warn};

use crate::error::LaunchError;
use crate::library::client_root;
use crate::process::{CLIENT_PROCESS_NAME, ProcessProbe};
use crate::registry;
use crate::settings::MonitorSettings;

#[cfg(windows)]
const CLIENT_EXECUTABLES: [&str; 1] = ["steam.exe"];
#[cfg(not(windows))]
const CLIENT_EXECUTABLES: [&str; 2] = ["steam.sh", "steam"];

/// A located client executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientLauncher {
    exe: PathBuf,
}

impl ClientLauncher {
    /// Looks for the client next to the registry install dir, under each
    /// library's client root, then in the usual install locations.
    pub fn locate(library_paths: &[PathBuf]) -> Result<Self, LaunchError> {
        let mut roots: Vec<PathBuf> = registry::client_install_dir().into_iter().collect();
        roots.extend(
            library_paths
                .iter()
                .filter_map(|library| client_root(library).map(Path::to_path_buf)),
        );
        Self::locate_in(&roots).or_else(|_| Self::locate_well_known())
    }

    pub fn locate_in(roots: &[PathBuf]) -> Result<Self, LaunchError> {
        roots
            .iter()
            .find_map(|root| executable_in(root))
            .map(|exe| {
                debug!("Using client at {}", exe.display());
                Self { exe }
            })
            .ok_or(LaunchError::ClientNotFound)
    }

    #[cfg(windows)]
    fn locate_well_known() -> Result<Self, LaunchError> {
        let mut roots = Vec::new();
        for drive in 'C'..='Z' {
            for dir in [r"Program Files (x86)\Steam", r"Program Files\Steam", "Steam"] {
                roots.push(PathBuf::from(format!(r"{drive}:\{dir}")));
            }
        }
        Self::locate_in(&roots)
    }

    #[cfg(not(windows))]
    fn locate_well_known() -> Result<Self, LaunchError> {
        let mut roots = vec![PathBuf::from("/usr/bin"), PathBuf::from("/usr/games")];
        if let Some(dirs) = directories::BaseDirs::new() {
            roots.insert(0, dirs.home_dir().join(".steam/steam"));
        }
        Self::locate_in(&roots)
    }

    pub fn exe(&self) -> &Path {
        &self.exe
    }

    /// True when the client is not running or is logged into another account.
    pub fn needs_login<P: ProcessProbe + ?Sized>(&self, probe: &mut P, account_id: &str) -> bool {
        probe.refresh();
        let client_running = probe.find_by_name(CLIENT_PROCESS_NAME).is_some();
        let active = registry::active_account_id();
        debug!("Client running: {client_running}, active account: {active:?}");
        login_required(client_running, active.as_deref(), account_id)
    }

    /// Kills any running client and starts it again logged in as `username`.
    pub fn restart_with_login<P: ProcessProbe + ?Sized>(
        &self,
        probe: &mut P,
        username: &str,
        settings: &MonitorSettings,
    ) -> Result<(), LaunchError> {
        probe.refresh();
        let running = probe.processes_named(CLIENT_PROCESS_NAME);
        if !running.is_empty() {
            info!("Closing {} client process(es) before login", running.len());
            for handle in &running {
                if !probe.terminate(handle, false) {
                    warn!("Failed to close client process {}", handle.pid);
                }
            }
            thread::sleep(settings.client_restart_delay());
        }

        info!("Starting client with login for {username}");
        self.spawn(&["-login", username])?;
        thread::sleep(settings.login_delay());
        Ok(())
    }

    pub fn launch_title(&self, app_id: &str) -> Result<(), LaunchError> {
        info!("Launching app {app_id}");
        self.spawn(&["-applaunch", app_id])
    }

    fn spawn(&self, args: &[&str]) -> Result<(), LaunchError> {
        Command::new(&self.exe)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|child| debug!("Spawned client pid {}", child.id()))
            .map_err(|source| LaunchError::Spawn {
                exe: self.exe.clone(),
                source,
            })
    }
}

fn executable_in(root: &Path) -> Option<PathBuf> {
    CLIENT_EXECUTABLES
        .iter()
        .map(|name| root.join(name))
        .find(|path| path.is_file())
}

fn login_required(client_running: bool, active_account: Option<&str>, wanted: &str) -> bool {
    !client_running || active_account != Some(wanted)
}
