use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing knobs for launching and monitoring a title. Stored under `monitor`
/// in the config document; absent fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub tick_millis: u64,
    pub launch_delay_secs: u64,
    pub checkpoint_interval_secs: u64,
    pub min_running_secs: u64,
    pub cpu_history_len: usize,
    pub cpu_sample_interval_millis: u64,
    pub cpu_sample_window_millis: u64,
    pub force_quit_grace_millis: u64,
    pub client_restart_delay_secs: u64,
    pub login_delay_secs: u64,
    pub track_sessions: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            tick_millis: 1000,
            launch_delay_secs: 5,
            checkpoint_interval_secs: 300,
            min_running_secs: 15,
            cpu_history_len: 10,
            cpu_sample_interval_millis: 1000,
            cpu_sample_window_millis: 100,
            force_quit_grace_millis: 1000,
            client_restart_delay_secs: 3,
            login_delay_secs: 5,
            track_sessions: true,
        }
    }
}

impl MonitorSettings {
    pub fn sanitize(&mut self) {
        self.tick_millis = self.tick_millis.clamp(100, 10_000);
        self.launch_delay_secs = self.launch_delay_secs.min(120);
        self.checkpoint_interval_secs = self.checkpoint_interval_secs.clamp(10, 3600);
        self.min_running_secs = self.min_running_secs.min(600);
        self.cpu_history_len = self.cpu_history_len.clamp(1, 120);
        self.cpu_sample_interval_millis = self.cpu_sample_interval_millis.clamp(100, 60_000);
        self.cpu_sample_window_millis = self.cpu_sample_window_millis.clamp(10, 900);
        self.force_quit_grace_millis = self.force_quit_grace_millis.min(30_000);
        self.client_restart_delay_secs = self.client_restart_delay_secs.min(60);
        self.login_delay_secs = self.login_delay_secs.min(120);
    }

    pub fn sanitized(mut self) -> Self {
        self.sanitize();
        self
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }

    pub fn launch_delay(&self) -> Duration {
        Duration::from_secs(self.launch_delay_secs)
    }

    pub fn cpu_sample_window(&self) -> Duration {
        Duration::from_millis(self.cpu_sample_window_millis)
    }

    pub fn force_quit_grace(&self) -> Duration {
        Duration::from_millis(self.force_quit_grace_millis)
    }

    pub fn client_restart_delay(&self) -> Duration {
        Duration::from_secs(self.client_restart_delay_secs)
    }

    pub fn login_delay(&self) -> Duration {
        Duration::from_secs(self.login_delay_secs)
    }
}
