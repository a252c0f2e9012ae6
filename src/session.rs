//! Playtime accounting for one launched title.
//!
//! A [`Session`] is a pure state machine: the monitor loop feeds it the
//! current wall-clock time and what the process probe saw, and it decides
//! state transitions, CPU smoothing and when to flush playtime into the
//! ledger. Keeping the clock outside makes every timing rule testable.

use std::collections::VecDeque;

use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::settings::MonitorSettings;
use crate::storage::PlaytimeLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingProcess,
    Running,
    Ended,
    Canceled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Ended | SessionState::Canceled)
    }
}

/// Bounded window of recent CPU readings; the oldest is dropped first.
#[derive(Debug, Clone)]
pub struct CpuHistory {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl CpuHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: f32) {
        let sample = if sample.is_finite() { sample.max(0.0) } else { 0.0 };
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn average(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f32>() / self.samples.len() as f32
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// What one tick's process lookup produced.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Observation {
    pub detected: bool,
    pub cpu_percent: Option<f32>,
    pub memory_bytes: Option<u64>,
}

impl Observation {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn present(cpu_percent: Option<f32>, memory_bytes: Option<u64>) -> Self {
        Self {
            detected: true,
            cpu_percent,
            memory_bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Performance {
    pub average_cpu: f32,
    pub memory_bytes: u64,
}

/// Everything the status screen shows for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusView {
    pub title_name: String,
    pub detected: bool,
    pub session_seconds: f64,
    pub total_seconds: f64,
    pub performance: Option<Performance>,
    pub notice: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub title_id: String,
    pub title_name: String,
    pub final_state: SessionState,
    pub session_seconds: f64,
    /// Time the process was seen running on consecutive ticks.
    pub running_seconds: f64,
    /// Seconds actually committed to the ledger this session.
    pub flushed_seconds: f64,
    pub persistence_error: Option<String>,
}

pub struct Session {
    title_id: String,
    title_name: String,
    started_at: DateTime<Local>,
    last_checkpoint: DateTime<Local>,
    prior_seconds: f64,
    settings: MonitorSettings,
    state: SessionState,
    was_running: bool,
    running_seconds: f64,
    last_seen: Option<DateTime<Local>>,
    detected: bool,
    cpu: CpuHistory,
    last_cpu_sample: Option<DateTime<Local>>,
    memory_bytes: u64,
    flushed_seconds: f64,
    persistence_error: Option<String>,
}

fn seconds_between(from: DateTime<Local>, to: DateTime<Local>) -> f64 {
    ((to - from).num_milliseconds() as f64 / 1000.0).max(0.0)
}

impl Session {
    /// `prior_seconds` is the ledger total read once at session start.
    pub fn start(
        title_id: impl Into<String>,
        title_name: impl Into<String>,
        prior_seconds: f64,
        settings: MonitorSettings,
        now: DateTime<Local>,
    ) -> Self {
        let cpu = CpuHistory::new(settings.cpu_history_len);
        Self {
            title_id: title_id.into(),
            title_name: title_name.into(),
            started_at: now,
            last_checkpoint: now,
            prior_seconds: if prior_seconds.is_finite() {
                prior_seconds.max(0.0)
            } else {
                0.0
            },
            settings,
            state: SessionState::AwaitingProcess,
            was_running: false,
            running_seconds: 0.0,
            last_seen: None,
            detected: false,
            cpu,
            last_cpu_sample: None,
            memory_bytes: 0,
            flushed_seconds: 0.0,
            persistence_error: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn elapsed_seconds(&self, now: DateTime<Local>) -> f64 {
        seconds_between(self.started_at, now)
    }

    /// Sum of the gaps between consecutive ticks that both saw the process.
    pub fn running_seconds(&self) -> f64 {
        self.running_seconds
    }

    pub fn cpu_history(&self) -> &CpuHistory {
        &self.cpu
    }

    /// CPU is sampled at most once per `cpu_sample_interval_millis`.
    pub fn cpu_sample_due(&self, now: DateTime<Local>) -> bool {
        match self.last_cpu_sample {
            None => true,
            Some(last) => {
                (now - last).num_milliseconds() >= self.settings.cpu_sample_interval_millis as i64
            }
        }
    }

    /// Applies one tick's lookup result and returns the resulting state.
    pub fn observe(&mut self, now: DateTime<Local>, observation: Observation) -> SessionState {
        if self.state.is_terminal() {
            return self.state;
        }

        let seen_last_tick = self.detected;
        self.detected = observation.detected;
        if observation.detected {
            if let (true, Some(last)) = (seen_last_tick, self.last_seen) {
                self.running_seconds += seconds_between(last, now);
            }
            self.was_running = true;
            self.last_seen = Some(now);
            if let Some(cpu) = observation.cpu_percent {
                self.cpu.push(cpu);
                self.last_cpu_sample = Some(now);
            }
            self.memory_bytes = observation.memory_bytes.unwrap_or(0);
            if self.state == SessionState::AwaitingProcess {
                info!("Detected process for {} ({})", self.title_name, self.title_id);
            }
            self.state = SessionState::Running;
        } else if self.was_running && self.running_seconds >= self.settings.min_running_secs as f64
        {
            info!("Process for {} ({}) exited", self.title_name, self.title_id);
            self.state = SessionState::Ended;
        } else {
            self.state = SessionState::AwaitingProcess;
        }
        self.state
    }

    /// Flushes the unsaved delta once `checkpoint_interval_secs` have passed
    /// since the last checkpoint. Returns the seconds handed to the ledger.
    pub fn checkpoint_if_due<L: PlaytimeLedger + ?Sized>(
        &mut self,
        now: DateTime<Local>,
        ledger: &mut L,
    ) -> Option<f64> {
        if self.state.is_terminal() {
            return None;
        }
        let delta = seconds_between(self.last_checkpoint, now);
        if delta < self.settings.checkpoint_interval_secs as f64 {
            return None;
        }
        self.flush(now, delta, ledger);
        Some(delta)
    }

    fn flush<L: PlaytimeLedger + ?Sized>(&mut self, now: DateTime<Local>, delta: f64, ledger: &mut L) {
        // The checkpoint clock resets even on failure; that slice is lost.
        self.last_checkpoint = now;
        if delta <= 0.0 {
            return;
        }
        match ledger.add_seconds(&self.title_id, delta) {
            Ok(total) => {
                self.flushed_seconds += delta;
                self.persistence_error = None;
                info!(
                    "Saved {delta:.0}s of playtime for {} (total {total:.0}s)",
                    self.title_id
                );
            }
            Err(err) => {
                warn!("Failed to save playtime for {}: {err:#}", self.title_id);
                self.persistence_error = Some(format!("Failed to save playtime: {err:#}"));
            }
        }
    }

    /// Ends the session and flushes whatever has not been checkpointed yet.
    /// A session that already reached `Ended` keeps that state; otherwise it
    /// is recorded as `Canceled`.
    pub fn finish<L: PlaytimeLedger + ?Sized>(
        mut self,
        now: DateTime<Local>,
        ledger: &mut L,
    ) -> SessionSummary {
        if self.state != SessionState::Ended {
            self.state = SessionState::Canceled;
        }
        let delta = seconds_between(self.last_checkpoint, now);
        self.flush(now, delta, ledger);
        SessionSummary {
            session_seconds: self.elapsed_seconds(now),
            running_seconds: self.running_seconds,
            title_id: self.title_id,
            title_name: self.title_name,
            final_state: self.state,
            flushed_seconds: self.flushed_seconds,
            persistence_error: self.persistence_error,
        }
    }

    pub fn status(&self, now: DateTime<Local>) -> StatusView {
        let session_seconds = self.elapsed_seconds(now);
        StatusView {
            title_name: self.title_name.clone(),
            detected: self.detected,
            session_seconds,
            total_seconds: self.prior_seconds + session_seconds,
            performance: self.detected.then(|| Performance {
                average_cpu: self.cpu.average(),
                memory_bytes: self.memory_bytes,
            }),
            notice: self.persistence_error.clone(),
        }
    }
}
