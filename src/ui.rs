//! Terminal plumbing and screen layouts.
//!
//! Layout functions return plain lines so they can be checked without a
//! terminal; [`draw_frame`] is the only place that writes to stdout.

use std::io::{self, Write, stdout};
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    cursor::MoveTo,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute, queue,
    style::{Color, Stylize},
    terminal::{self, Clear, ClearType, SetSize, SetTitle},
};

use crate::library::InstalledTitle;
use crate::monitor::{MonitorCommand, MonitorConsole};
use crate::session::{SessionState, SessionSummary, StatusView};
use crate::storage::{bytes_to_megabytes, format_duration, format_megabytes};

const FRAME_WIDTH: usize = 118;
const PANEL_WIDTH: usize = 50;
const PANEL_LABEL_WIDTH: usize = 12;
const TITLE_COLUMN_WIDTH: usize = 35;
pub const GRID_COLUMNS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    Enter,
    Backspace,
    Esc,
    /// Ctrl+C, which raw mode delivers as a key instead of a signal.
    Interrupt,
    Char(char),
}

impl Key {
    /// Letter keys compare case-insensitively.
    pub fn is_char(self, wanted: char) -> bool {
        matches!(self, Key::Char(c) if c.eq_ignore_ascii_case(&wanted))
    }
}

/// Raw mode for the lifetime of the guard.
pub struct RawModeGuard;

impl RawModeGuard {
    pub fn enter() -> Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

fn decode(event: Event) -> Option<Key> {
    let Event::Key(KeyEvent {
        code,
        modifiers,
        kind,
        ..
    }) = event
    else {
        return None;
    };
    if kind == KeyEventKind::Release {
        return None;
    }
    Some(match code {
        KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => Key::Interrupt,
        KeyCode::Up => Key::Up,
        KeyCode::Down => Key::Down,
        KeyCode::Left => Key::Left,
        KeyCode::Right => Key::Right,
        KeyCode::Enter => Key::Enter,
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Esc => Key::Esc,
        KeyCode::Char(c) => Key::Char(c),
        _ => return None,
    })
}

/// Blocks until a key is pressed.
pub fn read_key() -> Result<Key> {
    loop {
        if let Some(key) = decode(event::read()?) {
            return Ok(key);
        }
    }
}

/// Returns a buffered key press, if any, without waiting.
pub fn poll_key() -> Result<Option<Key>> {
    while event::poll(Duration::ZERO)? {
        if let Some(key) = decode(event::read()?) {
            return Ok(Some(key));
        }
    }
    Ok(None)
}

pub fn wait_for_key(message: &str) -> Result<()> {
    print_inline(&format!("\r\n{message}"))?;
    read_key()?;
    Ok(())
}

pub fn print_inline(text: &str) -> Result<()> {
    let mut out = stdout();
    write!(out, "{}", text.replace('\n', "\r\n"))?;
    out.flush()?;
    Ok(())
}

/// Reads a full line in cooked mode, restoring raw mode afterwards.
pub fn prompt_line(prompt: &str) -> Result<String> {
    print_inline(&format!("\r\n{}\r\n", prompt.yellow()))?;
    terminal::disable_raw_mode()?;
    let mut line = String::new();
    let read = io::stdin().read_line(&mut line);
    terminal::enable_raw_mode()?;
    read?;
    Ok(line.trim().to_string())
}

/// Digits echoed as typed; Enter confirms, Esc aborts.
pub fn read_number() -> Result<Option<usize>> {
    let mut digits = String::new();
    loop {
        match read_key()? {
            Key::Enter => break,
            Key::Esc | Key::Interrupt => return Ok(None),
            Key::Backspace => {
                if digits.pop().is_some() {
                    print_inline("\u{8} \u{8}")?;
                }
            }
            Key::Char(c) if c.is_ascii_digit() => {
                digits.push(c);
                print_inline(&c.to_string())?;
            }
            _ => {}
        }
    }
    print_inline("\n")?;
    Ok(digits.parse().ok())
}

pub fn draw_frame(lines: &[String]) -> Result<()> {
    let mut out = stdout();
    queue!(out, Clear(ClearType::All), MoveTo(0, 0))?;
    for line in lines {
        write!(out, "{line}\r\n")?;
    }
    out.flush()?;
    Ok(())
}

pub fn set_console_title(title: &str) {
    let _ = execute!(stdout(), SetTitle(title));
}

pub fn set_console_size(columns: u16, rows: u16) {
    let _ = execute!(stdout(), SetSize(columns, rows));
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn pad_to(visible: usize, width: usize) -> String {
    " ".repeat(width.saturating_sub(visible))
}

// FRAMES -------------------------------------------------------------------------------
fn frame_top() -> String {
    format!("┌{}", "─".repeat(FRAME_WIDTH)).blue().to_string()
}

fn frame_rule() -> String {
    format!("├{}", "─".repeat(FRAME_WIDTH)).blue().to_string()
}

fn frame_bottom() -> String {
    format!("└{}", "─".repeat(FRAME_WIDTH)).blue().to_string()
}

fn frame_blank() -> String {
    "│".blue().to_string()
}

fn frame_line(content: String) -> String {
    format!("{} {content}", "│".blue())
}

fn frame_heading(heading: &str) -> Vec<String> {
    let indent = (FRAME_WIDTH.saturating_sub(heading.chars().count())) / 2;
    vec![
        frame_top(),
        frame_blank(),
        format!("{}{}{}", "│".blue(), " ".repeat(indent), heading.white().bold()),
        frame_blank(),
        frame_rule(),
    ]
}

/// A titled list with the selected option highlighted.
pub fn list_menu_lines(heading: &str, options: &[String], selected: usize) -> Vec<String> {
    let mut lines = frame_heading(heading);
    for (idx, option) in options.iter().enumerate() {
        if idx == selected {
            lines.push(frame_line(format!("> {option}").white().bold().to_string()));
        } else {
            lines.push(frame_line(format!("  {option}")));
        }
    }
    lines.push(frame_bottom());
    lines
}

pub fn library_paths_lines(paths: &[std::path::PathBuf]) -> Vec<String> {
    let mut lines = frame_heading("LIBRARY PATH MANAGEMENT");
    lines.push(frame_line("Current Library Paths:".blue().to_string()));
    if paths.is_empty() {
        lines.push(frame_line("No paths configured".red().to_string()));
    }
    for (idx, path) in paths.iter().enumerate() {
        lines.push(frame_line(format!("{}. {}", idx + 1, path.display())));
    }
    lines.push(frame_rule());
    for (key, action) in [
        ("1", "Add new path"),
        ("2", "Remove path"),
        ("3", "Auto-detect paths"),
        ("4", "Back"),
    ] {
        lines.push(frame_line(format!("{} - {action}", key.white().bold())));
    }
    lines.push(frame_bottom());
    lines
}

/// State shown by the main menu.
pub struct MainMenuView<'a> {
    pub titles: &'a [InstalledTitle],
    pub selected: usize,
    pub library_count: usize,
    pub account_name: Option<String>,
}

pub fn main_menu_lines(view: &MainMenuView<'_>) -> Vec<String> {
    let mut lines = vec![
        String::new(),
        format!("{}{}", " ".repeat(45), "S  T  E  A  M  Y".blue().bold()),
        format!("{}{}", " ".repeat(44), "Steam library launcher".white()),
        String::new(),
        frame_top(),
    ];

    if view.library_count == 0 {
        lines.push(frame_blank());
        lines.push(frame_line(format!("{}{}", " ".repeat(34), "Welcome to Steamy!".yellow())));
        lines.push(frame_line(format!(
            "{}{}",
            " ".repeat(24),
            "To get started, configure your Steam libraries using the options below."
        )));
        lines.push(frame_line(format!(
            "{}{}",
            " ".repeat(29),
            "Press [S] for Settings or [A] to Auto-detect libraries."
        )));
        lines.push(frame_blank());
    } else if view.titles.is_empty() {
        lines.push(frame_blank());
        lines.push(frame_line(format!(
            "{}{}",
            " ".repeat(24),
            "No games found in your configured libraries.".red()
        )));
        lines.push(frame_line(format!(
            "{}{}",
            " ".repeat(24),
            "Press [R] to refresh or [S] to check library paths in Settings."
        )));
        lines.push(frame_blank());
    } else {
        lines.push(frame_line("Installed Games".blue().to_string()));
        lines.push(frame_rule());
        for (row, chunk) in view.titles.chunks(GRID_COLUMNS).enumerate() {
            let cells: Vec<String> = chunk
                .iter()
                .enumerate()
                .map(|(column, title)| {
                    let idx = row * GRID_COLUMNS + column;
                    grid_cell(idx, &title.name, idx == view.selected)
                })
                .collect();
            lines.push(frame_line(cells.join(" ")));
        }
    }

    lines.push(frame_rule());
    let account = match &view.account_name {
        Some(name) => name.clone().blue().to_string(),
        None => "No User Selected".blue().to_string(),
    };
    lines.push(frame_line(format!(
        "{}{}{account}",
        "Quick Actions:".blue(),
        " ".repeat(70)
    )));
    let actions = if view.library_count == 0 {
        [("S", "Settings"), ("A", "Auto-detect"), ("Q", "Quit")]
    } else {
        [("S", "Settings"), ("R", "Refresh"), ("Q", "Quit")]
    };
    let actions: Vec<String> = actions
        .iter()
        .map(|(key, label)| format!("{} {label}", format!("[{key}]").yellow()))
        .collect();
    lines.push(frame_line(actions.join(" | ")));
    lines.push(format!(
        "{}  {}",
        frame_bottom(),
        format!("Libraries: {}", view.library_count).blue()
    ));
    lines
}

/// Shown when libraries exist but no account has been picked yet.
pub fn account_needed_lines() -> Vec<String> {
    vec![
        frame_top(),
        frame_blank(),
        frame_line(format!("{}{}", " ".repeat(34), "Almost there!".yellow())),
        frame_line(format!(
            "{}{}",
            " ".repeat(24),
            "Please select a Steam user to continue."
        )),
        frame_blank(),
        frame_line(format!(
            "{} Select user | {} Settings | {} Quit",
            "[Enter]".yellow(),
            "[S]".yellow(),
            "[Q]".yellow()
        )),
        frame_bottom(),
    ]
}

fn grid_cell(idx: usize, name: &str, selected: bool) -> String {
    let name = format!("{:<width$}", truncate(name, TITLE_COLUMN_WIDTH), width = TITLE_COLUMN_WIDTH);
    if selected {
        format!("> {:2}. {name}", idx + 1).cyan().to_string()
    } else {
        format!("  {:2}. {name}", idx + 1).white().to_string()
    }
}

// SESSION PANEL ------------------------------------------------------------------------
fn panel_top() -> String {
    format!("╔{}╗", "═".repeat(PANEL_WIDTH)).blue().to_string()
}

fn panel_rule() -> String {
    format!("╠{}╣", "═".repeat(PANEL_WIDTH)).blue().to_string()
}

fn panel_bottom() -> String {
    format!("╚{}╝", "═".repeat(PANEL_WIDTH)).blue().to_string()
}

fn panel_text(text: &str, color: Color, centered: bool) -> String {
    let visible = text.chars().count().min(PANEL_WIDTH - 1);
    let text = truncate(text, PANEL_WIDTH - 1);
    let (left, right) = if centered {
        let left = (PANEL_WIDTH - visible) / 2;
        (left, PANEL_WIDTH - visible - left)
    } else {
        (1, PANEL_WIDTH - visible - 1)
    };
    format!(
        "{}{}{}{}{}",
        "║".blue(),
        " ".repeat(left),
        text.with(color),
        " ".repeat(right),
        "║".blue()
    )
}

fn panel_row(label: &str, value: &str, color: Color) -> String {
    let value = truncate(value, PANEL_WIDTH - PANEL_LABEL_WIDTH - 2);
    let label = format!("{label:<width$}", width = PANEL_LABEL_WIDTH);
    let visible = 1 + label.chars().count() + value.chars().count();
    format!(
        "{} {}{}{}{}",
        "║".blue(),
        label.white(),
        value.with(color),
        pad_to(visible, PANEL_WIDTH),
        "║".blue()
    )
}

pub fn cpu_color(average_cpu: f32) -> Color {
    if average_cpu < 50.0 {
        Color::Green
    } else if average_cpu < 80.0 {
        Color::Yellow
    } else {
        Color::Red
    }
}

pub fn memory_color(megabytes: f64) -> Color {
    if megabytes < 1024.0 {
        Color::Green
    } else if megabytes < 2048.0 {
        Color::Yellow
    } else {
        Color::Red
    }
}

pub fn status_lines(status: &StatusView) -> Vec<String> {
    let title = truncate(&status.title_name, TITLE_COLUMN_WIDTH);
    let (state_text, state_color) = if status.detected {
        ("Running", Color::Green)
    } else {
        ("Starting/Not detected", Color::Red)
    };

    let mut lines = vec![
        String::new(),
        panel_top(),
        panel_text("Game Session Monitor", Color::Cyan, true),
        panel_rule(),
        panel_row("Game:", &title, Color::Yellow),
        panel_row("Status:", state_text, state_color),
        panel_rule(),
        panel_text("Time Tracking", Color::Cyan, false),
        panel_row(
            "Session:",
            &format_duration(status.session_seconds),
            Color::Yellow,
        ),
        panel_row("Total:", &format_duration(status.total_seconds), Color::Yellow),
    ];

    if let Some(performance) = &status.performance {
        let megabytes = bytes_to_megabytes(performance.memory_bytes);
        lines.push(panel_rule());
        lines.push(panel_text("Performance Metrics", Color::Cyan, false));
        lines.push(panel_row(
            "CPU Usage:",
            &format!("{:.1}%", performance.average_cpu),
            cpu_color(performance.average_cpu),
        ));
        lines.push(panel_row(
            "Memory:",
            &format_megabytes(performance.memory_bytes),
            memory_color(megabytes),
        ));
    }

    if let Some(notice) = &status.notice {
        lines.push(panel_rule());
        lines.push(panel_text(notice, Color::Red, false));
    }

    lines.push(panel_rule());
    lines.push(panel_text("Controls", Color::Cyan, false));
    for (key, action) in [
        ("[Q]", "Force quit game"),
        ("[K]", "Kill game process"),
        ("[R]", "Refresh stats"),
        ("[B]", "Back to menu"),
    ] {
        let visible = 1 + key.len() + 1 + action.len();
        lines.push(format!(
            "{} {} {}{}{}",
            "║".blue(),
            key.yellow(),
            action.white(),
            pad_to(visible, PANEL_WIDTH),
            "║".blue()
        ));
    }
    lines.push(panel_bottom());
    lines
}

pub fn session_ended_lines(summary: &SessionSummary) -> Vec<String> {
    // A title that exited on its own is credited up to its last sighting
    let (heading, played) = match summary.final_state {
        SessionState::Ended => ("Game Session Ended", summary.running_seconds),
        _ => ("Game Session Closed", summary.session_seconds),
    };
    let mut lines = vec![
        String::new(),
        panel_top(),
        panel_text(heading, Color::Cyan, true),
        panel_rule(),
        panel_row(
            "Game:",
            &truncate(&summary.title_name, TITLE_COLUMN_WIDTH),
            Color::Yellow,
        ),
        panel_row(
            "Played for:",
            &format_duration(played),
            Color::Green,
        ),
    ];
    if let Some(error) = &summary.persistence_error {
        lines.push(panel_text(error, Color::Red, false));
    }
    lines.push(panel_text("", Color::White, false));
    lines.push(panel_text("Hope you enjoyed playing!", Color::Cyan, false));
    lines.push(panel_bottom());
    lines
}

pub fn command_for_key(key: Key) -> Option<MonitorCommand> {
    match key {
        Key::Esc | Key::Interrupt => Some(MonitorCommand::Back),
        Key::Char(c) => match c.to_ascii_lowercase() {
            'q' => Some(MonitorCommand::ForceQuit),
            'k' => Some(MonitorCommand::Kill),
            'b' => Some(MonitorCommand::Back),
            'r' => Some(MonitorCommand::Refresh),
            _ => None,
        },
        _ => None,
    }
}

/// The live session screen on the real terminal.
pub struct TerminalConsole;

impl MonitorConsole for TerminalConsole {
    fn draw(&mut self, status: &StatusView) -> Result<()> {
        draw_frame(&status_lines(status))
    }

    fn poll_command(&mut self) -> Result<Option<MonitorCommand>> {
        Ok(poll_key()?.and_then(command_for_key))
    }
}
