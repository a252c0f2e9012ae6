use std::{thread, time::Duration};

use sysinfo::{MINIMUM_CPU_UPDATE_INTERVAL, Pid, Process, Signal, System};
use tracing::{debug, trace};

/// Process name of the client itself.
pub const CLIENT_PROCESS_NAME: &str = "steam.exe";

/// Client children that are never the launched title.
const HELPER_PROCESS_NAMES: [&str; 4] = [
    "steamservice.exe",
    "steamwebhelper.exe",
    "steamerrorreporter.exe",
    "gameoverlayui.exe",
];

/// A process observed on one refresh. Never kept beyond the tick that found it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSample {
    pub cpu_percent: f32,
    pub resident_memory_bytes: u64,
}

/// OS process enumeration. Every method reports a vanished process as absence.
pub trait ProcessProbe {
    /// Takes a fresh snapshot of the process table.
    fn refresh(&mut self);

    fn processes_named(&self, name: &str) -> Vec<ProcessHandle>;

    fn find_by_name(&self, name: &str) -> Option<ProcessHandle> {
        self.processes_named(name).into_iter().next()
    }

    fn children(&self, parent: &ProcessHandle) -> Vec<ProcessHandle>;

    /// CPU over a short blocking window, plus resident memory.
    fn sample(&mut self, handle: &ProcessHandle) -> Option<ResourceSample>;

    fn memory(&mut self, handle: &ProcessHandle) -> Option<u64>;

    /// Returns whether the signal was delivered.
    fn terminate(&mut self, handle: &ProcessHandle, graceful: bool) -> bool;

    fn is_alive(&mut self, handle: &ProcessHandle) -> bool;
}

/// Case-insensitive, ignoring a trailing `.exe` on either side.
pub fn names_match(actual: &str, wanted: &str) -> bool {
    strip_exe(actual).eq_ignore_ascii_case(strip_exe(wanted))
}

fn strip_exe(name: &str) -> &str {
    let len = name.len();
    if len > 4 && name.is_char_boundary(len - 4) && name[len - 4..].eq_ignore_ascii_case(".exe") {
        &name[..len - 4]
    } else {
        name
    }
}

pub fn is_helper_process(name: &str) -> bool {
    HELPER_PROCESS_NAMES
        .iter()
        .any(|helper| names_match(name, helper))
}

/// Executable names a title is known to run under.
pub fn title_process_names(app_id: &str) -> [String; 3] {
    [
        format!("steam_{app_id}.exe"),
        format!("game_{app_id}.exe"),
        format!("app_{app_id}.exe"),
    ]
}

/// Finds the process believed to be the running title: a known executable
/// name first, otherwise the first non-helper child of the client.
pub fn resolve_title_process<P: ProcessProbe + ?Sized>(
    probe: &P,
    app_id: &str,
) -> Option<ProcessHandle> {
    for name in title_process_names(app_id) {
        if let Some(handle) = probe.find_by_name(&name) {
            trace!("Matched title process by name {name}");
            return Some(handle);
        }
    }
    let client = probe.find_by_name(CLIENT_PROCESS_NAME)?;
    probe
        .children(&client)
        .into_iter()
        .find(|child| !is_helper_process(&child.name))
}

pub struct SysinfoProbe {
    system: System,
    cpu_window: Duration,
}

impl SysinfoProbe {
    pub fn new(cpu_window: Duration) -> Self {
        Self {
            system: System::new(),
            cpu_window,
        }
    }

    fn handle(process: &Process) -> ProcessHandle {
        ProcessHandle {
            pid: process.pid().as_u32(),
            name: process.name().to_string(),
        }
    }
}

impl ProcessProbe for SysinfoProbe {
    fn refresh(&mut self) {
        self.system.refresh_processes();
    }

    fn processes_named(&self, name: &str) -> Vec<ProcessHandle> {
        let mut found: Vec<ProcessHandle> = self
            .system
            .processes()
            .values()
            .filter(|process| names_match(process.name(), name))
            .map(Self::handle)
            .collect();
        found.sort_by_key(|handle| handle.pid);
        found
    }

    fn children(&self, parent: &ProcessHandle) -> Vec<ProcessHandle> {
        let parent_pid = Pid::from_u32(parent.pid);
        let mut found: Vec<ProcessHandle> = self
            .system
            .processes()
            .values()
            .filter(|process| process.parent() == Some(parent_pid))
            .map(Self::handle)
            .collect();
        found.sort_by_key(|handle| handle.pid);
        found
    }

    fn sample(&mut self, handle: &ProcessHandle) -> Option<ResourceSample> {
        let pid = Pid::from_u32(handle.pid);
        if !self.system.refresh_process(pid) {
            return None;
        }
        thread::sleep(self.cpu_window.max(MINIMUM_CPU_UPDATE_INTERVAL));
        if !self.system.refresh_process(pid) {
            return None;
        }
        let process = self.system.process(pid)?;
        Some(ResourceSample {
            cpu_percent: process.cpu_usage(),
            resident_memory_bytes: process.memory(),
        })
    }

    fn memory(&mut self, handle: &ProcessHandle) -> Option<u64> {
        let pid = Pid::from_u32(handle.pid);
        if !self.system.refresh_process(pid) {
            return None;
        }
        self.system.process(pid).map(Process::memory)
    }

    fn terminate(&mut self, handle: &ProcessHandle, graceful: bool) -> bool {
        let Some(process) = self.system.process(Pid::from_u32(handle.pid)) else {
            debug!("Process {} already gone", handle.pid);
            return false;
        };
        if graceful {
            // Platforms without SIGTERM fall back to a hard kill
            process.kill_with(Signal::Term).unwrap_or_else(|| process.kill())
        } else {
            process.kill()
        }
    }

    fn is_alive(&mut self, handle: &ProcessHandle) -> bool {
        let pid = Pid::from_u32(handle.pid);
        self.system.refresh_process(pid) && self.system.process(pid).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("steam_440.exe", "steam_440.exe", true)]
    #[test_case("STEAM_440.EXE", "steam_440.exe", true)]
    #[test_case("steam", "steam.exe", true)]
    #[test_case("steam.exe", "steam", true)]
    #[test_case("steamwebhelper", "steam.exe", false)]
    #[test_case(".exe", ".exe", true)]
    fn matches_process_names(actual: &str, wanted: &str, expected: bool) {
        assert_eq!(names_match(actual, wanted), expected);
    }

    #[test]
    fn recognizes_helpers_on_every_platform() {
        assert!(is_helper_process("steamwebhelper.exe"));
        assert!(is_helper_process("steamwebhelper"));
        assert!(is_helper_process("SteamService.exe"));
        assert!(!is_helper_process("hl2.exe"));
    }

    #[test]
    fn title_names_embed_the_app_id() {
        assert_eq!(
            title_process_names("440"),
            [
                "steam_440.exe".to_string(),
                "game_440.exe".to_string(),
                "app_440.exe".to_string()
            ]
        );
    }
}
