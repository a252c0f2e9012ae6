use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    ops::Range,
    rc::Rc,
    time::Duration,
};

use anyhow::{Result, bail};
use chrono::{DateTime, Local, TimeDelta, TimeZone};
use pretty_assertions::assert_eq;
use steamy::library::InstalledTitle;
use steamy::monitor::{Clock, Monitor, MonitorCommand, MonitorConsole};
use steamy::process::{
    ProcessHandle, ProcessProbe, ResourceSample, names_match, resolve_title_process,
};
use steamy::session::{SessionState, StatusView};
use steamy::settings::MonitorSettings;
use steamy::storage::PlaytimeLedger;

const TITLE_PID: u32 = 4242;
const LAUNCH_DELAY_SECS: i64 = 5;

type SharedTime = Rc<Cell<DateTime<Local>>>;

fn launch_time() -> DateTime<Local> {
    Local.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap()
}

/// Seconds since the session started, i.e. since the launch delay elapsed.
fn session_secs(now: &SharedTime) -> i64 {
    (now.get() - launch_time()).num_seconds() - LAUNCH_DELAY_SECS
}

struct FakeClock {
    now: SharedTime,
    sleeps: RefCell<Vec<Duration>>,
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Local> {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
        self.now
            .set(self.now.get() + TimeDelta::from_std(duration).unwrap());
    }
}

/// A single title process that exists during the given session windows.
struct FakeProbe {
    now: SharedTime,
    present: Vec<Range<i64>>,
    alive: bool,
    ignores_term: bool,
    signals: Vec<(u32, bool)>,
}

impl FakeProbe {
    fn title_handle() -> ProcessHandle {
        ProcessHandle {
            pid: TITLE_PID,
            name: "steam_440.exe".into(),
        }
    }

    fn visible(&self) -> bool {
        let secs = session_secs(&self.now);
        self.alive && self.present.iter().any(|window| window.contains(&secs))
    }
}

impl ProcessProbe for FakeProbe {
    fn refresh(&mut self) {}

    fn processes_named(&self, name: &str) -> Vec<ProcessHandle> {
        let handle = Self::title_handle();
        if self.visible() && names_match(&handle.name, name) {
            vec![handle]
        } else {
            Vec::new()
        }
    }

    fn children(&self, _parent: &ProcessHandle) -> Vec<ProcessHandle> {
        Vec::new()
    }

    fn sample(&mut self, _handle: &ProcessHandle) -> Option<ResourceSample> {
        self.visible().then_some(ResourceSample {
            cpu_percent: 40.0,
            resident_memory_bytes: 512 * 1024 * 1024,
        })
    }

    fn memory(&mut self, _handle: &ProcessHandle) -> Option<u64> {
        self.visible().then_some(512 * 1024 * 1024)
    }

    fn terminate(&mut self, handle: &ProcessHandle, graceful: bool) -> bool {
        self.signals.push((handle.pid, graceful));
        if !graceful || !self.ignores_term {
            self.alive = false;
        }
        true
    }

    fn is_alive(&mut self, _handle: &ProcessHandle) -> bool {
        self.visible()
    }
}

/// Hands out commands on the ticks they are scripted for and keeps every frame.
struct ScriptedConsole {
    now: SharedTime,
    commands: HashMap<i64, MonitorCommand>,
    frames: Vec<StatusView>,
}

impl MonitorConsole for ScriptedConsole {
    fn draw(&mut self, status: &StatusView) -> Result<()> {
        self.frames.push(status.clone());
        Ok(())
    }

    fn poll_command(&mut self) -> Result<Option<MonitorCommand>> {
        Ok(self.commands.remove(&session_secs(&self.now)))
    }
}

#[derive(Default)]
struct MemoryLedger {
    totals: HashMap<String, f64>,
    writes: Vec<f64>,
    fail_writes: bool,
}

impl PlaytimeLedger for MemoryLedger {
    fn total_seconds(&self, title_id: &str) -> Result<f64> {
        Ok(self.totals.get(title_id).copied().unwrap_or(0.0))
    }

    fn add_seconds(&mut self, title_id: &str, seconds: f64) -> Result<f64> {
        if self.fail_writes {
            bail!("disk full");
        }
        self.writes.push(seconds);
        let total = self.totals.entry(title_id.to_string()).or_insert(0.0);
        *total += seconds;
        Ok(*total)
    }
}

struct Harness {
    clock: FakeClock,
    probe: FakeProbe,
    console: ScriptedConsole,
    ledger: MemoryLedger,
}

impl Harness {
    fn new(present: Vec<Range<i64>>, commands: &[(i64, MonitorCommand)]) -> Self {
        let now: SharedTime = Rc::new(Cell::new(launch_time()));
        Self {
            clock: FakeClock {
                now: now.clone(),
                sleeps: RefCell::new(Vec::new()),
            },
            probe: FakeProbe {
                now: now.clone(),
                present,
                alive: true,
                ignores_term: false,
                signals: Vec::new(),
            },
            console: ScriptedConsole {
                now,
                commands: commands.iter().copied().collect(),
                frames: Vec::new(),
            },
            ledger: MemoryLedger::default(),
        }
    }

    fn run(&mut self) -> steamy::session::SessionSummary {
        let title = InstalledTitle {
            name: "Team Fortress 2".into(),
            app_id: "440".into(),
            install_dir: "Team Fortress 2".into(),
        };
        Monitor::new(MonitorSettings::default()).run(
            &title,
            &mut self.probe,
            &mut self.ledger,
            &mut self.console,
            &self.clock,
        )
    }

    fn total(&self) -> f64 {
        self.ledger.total_seconds("440").unwrap()
    }
}

#[test]
fn leaving_a_running_session_adds_elapsed_time_to_prior_total() {
    // Detected from t=2, user presses Back during t=11 and the loop stops at t=12
    let mut harness = Harness::new(vec![2..1000], &[(11, MonitorCommand::Back)]);
    harness.ledger.totals.insert("440".into(), 600.0);

    let summary = harness.run();

    assert_eq!(summary.final_state, SessionState::Canceled);
    assert_eq!(summary.session_seconds, 12.0);
    assert_eq!(harness.total(), 612.0);
    assert!(harness.probe.signals.is_empty());

    let last = harness.console.frames.last().unwrap();
    assert_eq!(last.session_seconds, 11.0);
    assert_eq!(last.total_seconds, 611.0);
    assert!(last.detected);
    assert!(!harness.console.frames[1].detected);
    assert!(harness.console.frames[2].detected);
}

#[test]
fn session_without_a_process_still_counts_until_cancel() {
    let mut harness = Harness::new(Vec::new(), &[(19, MonitorCommand::Back)]);

    let summary = harness.run();

    assert_eq!(summary.final_state, SessionState::Canceled);
    assert_eq!(summary.running_seconds, 0.0);
    assert_eq!(harness.total(), 20.0);
    assert!(
        harness
            .console
            .frames
            .iter()
            .all(|frame| !frame.detected && frame.performance.is_none())
    );
}

#[test]
fn long_session_checkpoints_then_flushes_remainder_on_exit() {
    let mut harness = Harness::new(vec![0..310], &[]);

    let summary = harness.run();

    assert_eq!(summary.final_state, SessionState::Ended);
    assert_eq!(summary.session_seconds, 310.0);
    assert_eq!(summary.flushed_seconds, 310.0);
    assert_eq!(harness.ledger.writes, vec![300.0, 10.0]);
    assert_eq!(harness.total(), 310.0);
    assert_eq!(harness.console.frames.len(), 310);
}

#[test]
fn launch_delay_precedes_the_first_tick() {
    let mut harness = Harness::new(Vec::new(), &[(0, MonitorCommand::Back)]);

    harness.run();

    let sleeps = harness.clock.sleeps.borrow();
    assert_eq!(sleeps[0], Duration::from_secs(5));
    assert_eq!(sleeps[1], Duration::from_secs(1));
    assert_eq!(harness.total(), 1.0);
}

#[test]
fn brief_process_does_not_end_the_session() {
    let mut harness = Harness::new(vec![0..8], &[(29, MonitorCommand::Back)]);

    let summary = harness.run();

    assert_eq!(summary.final_state, SessionState::Canceled);
    assert_eq!(summary.running_seconds, 7.0);
    assert_eq!(harness.total(), 30.0);
    assert!(!harness.console.frames.last().unwrap().detected);
}

#[test]
fn force_quit_escalates_to_kill_after_grace_period() {
    let mut harness = Harness::new(vec![0..1000], &[(20, MonitorCommand::ForceQuit)]);
    harness.probe.ignores_term = true;

    let summary = harness.run();

    assert_eq!(
        harness.probe.signals,
        vec![(TITLE_PID, true), (TITLE_PID, false)]
    );
    assert_eq!(
        harness.clock.sleeps.borrow().last().copied(),
        Some(Duration::from_millis(1000))
    );
    assert_eq!(summary.final_state, SessionState::Canceled);
    assert_eq!(harness.total(), 21.0);
}

#[test]
fn force_quit_stops_at_terminate_when_the_title_exits() {
    let mut harness = Harness::new(vec![0..1000], &[(20, MonitorCommand::ForceQuit)]);

    harness.run();

    assert_eq!(harness.probe.signals, vec![(TITLE_PID, true)]);
}

#[test]
fn kill_skips_the_grace_period() {
    let mut harness = Harness::new(vec![0..1000], &[(5, MonitorCommand::Kill)]);

    let summary = harness.run();

    assert_eq!(harness.probe.signals, vec![(TITLE_PID, false)]);
    assert_eq!(summary.final_state, SessionState::Canceled);
    assert_eq!(harness.total(), 6.0);
}

#[test]
fn refresh_runs_the_next_tick_without_sleeping() {
    let mut harness = Harness::new(
        vec![0..1000],
        &[(3, MonitorCommand::Refresh), (6, MonitorCommand::Back)],
    );

    harness.run();

    let at_three = harness
        .console
        .frames
        .iter()
        .filter(|frame| frame.session_seconds == 3.0)
        .count();
    assert_eq!(at_three, 2);
    assert_eq!(harness.total(), 7.0);
}

#[test]
fn failed_writes_surface_on_screen_and_in_summary() {
    let mut harness = Harness::new(vec![0..310], &[]);
    harness.ledger.fail_writes = true;

    let summary = harness.run();

    assert_eq!(summary.final_state, SessionState::Ended);
    assert_eq!(summary.flushed_seconds, 0.0);
    assert!(summary.persistence_error.unwrap().contains("disk full"));
    assert!(harness.console.frames[299].notice.is_none());
    assert!(harness.console.frames[300].notice.is_some());
}

#[test]
fn performance_reports_smoothed_cpu_and_memory() {
    let mut harness = Harness::new(vec![0..1000], &[(4, MonitorCommand::Back)]);

    harness.run();

    let performance = harness.console.frames[4].performance.clone().unwrap();
    assert_eq!(performance.average_cpu, 40.0);
    assert_eq!(performance.memory_bytes, 512 * 1024 * 1024);
}

/// Fixed process table for lookup rules.
struct TableProbe {
    processes: Vec<(ProcessHandle, Option<u32>)>,
}

impl TableProbe {
    fn new(rows: &[(u32, &str, Option<u32>)]) -> Self {
        Self {
            processes: rows
                .iter()
                .map(|(pid, name, parent)| {
                    (
                        ProcessHandle {
                            pid: *pid,
                            name: name.to_string(),
                        },
                        *parent,
                    )
                })
                .collect(),
        }
    }
}

impl ProcessProbe for TableProbe {
    fn refresh(&mut self) {}

    fn processes_named(&self, name: &str) -> Vec<ProcessHandle> {
        self.processes
            .iter()
            .filter(|(handle, _)| names_match(&handle.name, name))
            .map(|(handle, _)| handle.clone())
            .collect()
    }

    fn children(&self, parent: &ProcessHandle) -> Vec<ProcessHandle> {
        self.processes
            .iter()
            .filter(|(_, ppid)| *ppid == Some(parent.pid))
            .map(|(handle, _)| handle.clone())
            .collect()
    }

    fn sample(&mut self, _handle: &ProcessHandle) -> Option<ResourceSample> {
        None
    }

    fn memory(&mut self, _handle: &ProcessHandle) -> Option<u64> {
        None
    }

    fn terminate(&mut self, _handle: &ProcessHandle, _graceful: bool) -> bool {
        false
    }

    fn is_alive(&mut self, _handle: &ProcessHandle) -> bool {
        false
    }
}

#[test]
fn known_executable_names_win_over_client_children() {
    let probe = TableProbe::new(&[
        (10, "steam.exe", None),
        (11, "hl2.exe", Some(10)),
        (12, "game_440.exe", None),
    ]);
    assert_eq!(resolve_title_process(&probe, "440").unwrap().pid, 12);
}

#[test]
fn client_helpers_are_never_taken_for_the_title() {
    let probe = TableProbe::new(&[
        (10, "steam.exe", None),
        (11, "steamwebhelper.exe", Some(10)),
        (12, "steamservice.exe", Some(10)),
        (13, "gameoverlayui.exe", Some(10)),
        (14, "hl2.exe", Some(10)),
    ]);
    assert_eq!(resolve_title_process(&probe, "440").unwrap().name, "hl2.exe");

    let helpers_only = TableProbe::new(&[
        (10, "steam.exe", None),
        (11, "steamwebhelper.exe", Some(10)),
    ]);
    assert_eq!(resolve_title_process(&helpers_only, "440"), None);
}

#[test]
fn no_client_means_no_title() {
    let probe = TableProbe::new(&[(11, "hl2.exe", Some(10))]);
    assert_eq!(resolve_title_process(&probe, "440"), None);
}
