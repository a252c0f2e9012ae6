use std::{thread, time::Duration};

use anyhow::Result;
use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::library::InstalledTitle;
use crate::process::{ProcessProbe, resolve_title_process};
use crate::session::{Observation, Session, SessionState, SessionSummary, StatusView};
use crate::settings::MonitorSettings;
use crate::storage::PlaytimeLedger;

/// Source of wall-clock time and of the loop's sleeps.
pub trait Clock {
    fn now(&self) -> DateTime<Local>;
    fn sleep(&self, duration: Duration);
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorCommand {
    /// Ask the title to exit, then kill it after the grace period.
    ForceQuit,
    Kill,
    Back,
    /// Run the next tick right away.
    Refresh,
}

/// Where the live status goes and where control keys come from.
pub trait MonitorConsole {
    fn draw(&mut self, status: &StatusView) -> Result<()>;

    /// Must not block when no key is waiting.
    fn poll_command(&mut self) -> Result<Option<MonitorCommand>>;
}

pub struct Monitor {
    settings: MonitorSettings,
}

impl Monitor {
    pub fn new(settings: MonitorSettings) -> Self {
        Self {
            settings: settings.sanitized(),
        }
    }

    /// Watches `title` until its process exits or the user leaves, then
    /// returns the session totals. Playtime is checkpointed into `ledger`
    /// along the way and flushed once more on the way out.
    pub fn run<P, L, C, K>(
        &self,
        title: &InstalledTitle,
        probe: &mut P,
        ledger: &mut L,
        console: &mut C,
        clock: &K,
    ) -> SessionSummary
    where
        P: ProcessProbe + ?Sized,
        L: PlaytimeLedger + ?Sized,
        C: MonitorConsole + ?Sized,
        K: Clock + ?Sized,
    {
        let prior_seconds = match ledger.total_seconds(&title.app_id) {
            Ok(seconds) => seconds,
            Err(err) => {
                warn!("Failed to read playtime for {}: {err:#}", title.app_id);
                0.0
            }
        };

        clock.sleep(self.settings.launch_delay());

        let mut session = Session::start(
            title.app_id.clone(),
            title.name.clone(),
            prior_seconds,
            self.settings.clone(),
            clock.now(),
        );
        info!(
            "Monitoring {} ({}) every {}ms",
            title.name, title.app_id, self.settings.tick_millis
        );

        let mut pending: Option<MonitorCommand> = None;
        loop {
            let now = clock.now();

            if let Some(command) = pending.take() {
                info!("Leaving monitor for {} on {command:?}", title.app_id);
                self.stop_title(command, &title.app_id, probe, clock);
                return session.finish(now, ledger);
            }

            probe.refresh();
            let observation = match resolve_title_process(&*probe, &title.app_id) {
                Some(handle) if session.cpu_sample_due(now) => match probe.sample(&handle) {
                    Some(sample) => Observation::present(
                        Some(sample.cpu_percent),
                        Some(sample.resident_memory_bytes),
                    ),
                    None => Observation::present(None, None),
                },
                Some(handle) => Observation::present(None, probe.memory(&handle)),
                None => Observation::absent(),
            };

            let state = session.observe(now, observation);
            session.checkpoint_if_due(now, ledger);
            if state == SessionState::Ended {
                let summary = session.finish(now, ledger);
                info!("Monitor loop exited normally.");
                return summary;
            }

            if let Err(err) = console.draw(&session.status(now)) {
                warn!("Failed to draw session status: {err:#}");
            }

            match console.poll_command() {
                Ok(Some(MonitorCommand::Refresh)) => continue,
                Ok(command) => pending = command,
                Err(err) => warn!("Failed to read input: {err:#}"),
            }

            let spent = (clock.now() - now).to_std().unwrap_or_default();
            clock.sleep(self.settings.tick().saturating_sub(spent));
        }
    }

    /// Best effort: a title that cannot be signalled is left alone.
    fn stop_title<P, K>(&self, command: MonitorCommand, app_id: &str, probe: &mut P, clock: &K)
    where
        P: ProcessProbe + ?Sized,
        K: Clock + ?Sized,
    {
        if !matches!(command, MonitorCommand::ForceQuit | MonitorCommand::Kill) {
            return;
        }
        probe.refresh();
        let Some(handle) = resolve_title_process(&*probe, app_id) else {
            debug!("No running process to stop for {app_id}");
            return;
        };

        if command == MonitorCommand::ForceQuit {
            if !probe.terminate(&handle, true) {
                warn!("Failed to ask {} ({}) to exit", handle.name, handle.pid);
            }
            clock.sleep(self.settings.force_quit_grace());
            if !probe.is_alive(&handle) {
                return;
            }
        }
        if !probe.terminate(&handle, false) {
            warn!("Failed to kill {} ({})", handle.name, handle.pid);
        }
    }
}
