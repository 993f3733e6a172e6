// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Style};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use resume_app::{LoadingState, Project, Session, truncate};
use resume_fetch::{ExecutorError, FetchBridge, LoadedEvent, MessagesLookup};
use std::collections::BTreeMap;
use std::io;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use time::macros::format_description;

pub const SPINNER_FRAMES: [&str; 8] = ["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"];
const TICK: Duration = Duration::from_millis(100);
const SESSION_ID_CHARS: usize = 12;
const SUMMARY_CHARS: usize = 60;
const APP_TITLE: &str = "claude-resume";

/// The session the user chose to resume, and the directory to resume it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeTarget {
    pub session_id: String,
    pub project_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Screen {
    #[default]
    Projects,
    Sessions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum KeyOutcome {
    Continue,
    Quit,
    Resume(ResumeTarget),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct ViewData {
    screen: Screen,
    projects: Vec<Project>,
    project_cursor: usize,
    project: Option<Project>,
    sessions: Vec<Session>,
    session_cursor: usize,
    messages: Vec<String>,
    messages_for: Option<String>,
    summaries: BTreeMap<String, String>,
    status_line: Option<String>,
    spinner: usize,
}

impl ViewData {
    fn selected_project(&self) -> Option<&Project> {
        self.projects.get(self.project_cursor)
    }

    fn selected_session(&self) -> Option<&Session> {
        self.sessions.get(self.session_cursor)
    }

    fn project_path(&self) -> Option<&str> {
        self.project.as_ref().map(|project| project.path.as_str())
    }
}

/// Runs the browser until the user quits (`None`) or picks a session.
pub fn run_app(bridge: &mut FetchBridge) -> Result<Option<ResumeTarget>> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::default();
    start(bridge, &mut view_data);

    let mut result = Ok(None);
    let mut last_tick = Instant::now();
    loop {
        process_loaded_events(bridge, &mut view_data);

        let loading = bridge.loading_state();
        if let Err(error) = terminal.draw(|frame| render(frame, loading, &view_data)) {
            result = Err(error).context("draw frame");
            break;
        }

        match next_key(TICK.saturating_sub(last_tick.elapsed())) {
            Ok(Some(key)) => match handle_key_event(bridge, &mut view_data, key) {
                KeyOutcome::Continue => {}
                KeyOutcome::Quit => break,
                KeyOutcome::Resume(target) => {
                    result = Ok(Some(target));
                    break;
                }
            },
            Ok(None) => {}
            Err(error) => {
                result = Err(error);
                break;
            }
        }

        if last_tick.elapsed() >= TICK {
            view_data.spinner = (view_data.spinner + 1) % SPINNER_FRAMES.len();
            last_tick = Instant::now();
        }
    }

    bridge.shutdown();
    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

fn next_key(timeout: Duration) -> Result<Option<KeyEvent>> {
    if !event::poll(timeout).context("poll event")? {
        return Ok(None);
    }
    match event::read().context("read event")? {
        Event::Key(key) if key.kind == KeyEventKind::Press => Ok(Some(key)),
        _ => Ok(None),
    }
}

fn start(bridge: &mut FetchBridge, view_data: &mut ViewData) {
    let submitted = bridge.load_projects();
    note_submit_error(view_data, submitted, "load projects");
}

fn note_submit_error<T>(
    view_data: &mut ViewData,
    submitted: Result<T, ExecutorError>,
    what: &str,
) -> Option<T> {
    match submitted {
        Ok(value) => Some(value),
        Err(error) => {
            view_data.status_line = Some(format!("{what} failed: {error}"));
            None
        }
    }
}

fn process_loaded_events(bridge: &mut FetchBridge, view_data: &mut ViewData) {
    while let Some(event) = bridge.try_next() {
        apply_loaded_event(bridge, view_data, event);
    }
    bridge.poll_cancellation();
}

fn apply_loaded_event(bridge: &mut FetchBridge, view_data: &mut ViewData, event: LoadedEvent) {
    match event {
        LoadedEvent::ProjectsLoaded {
            result: Ok(projects),
            ..
        } => {
            view_data.projects = projects;
            view_data.project_cursor =
                clamp_cursor(view_data.project_cursor, view_data.projects.len());
            view_data.status_line = None;
        }
        LoadedEvent::SessionsLoaded {
            project_path,
            result: Ok(sessions),
            ..
        } => {
            if view_data.project_path() != Some(project_path.as_str()) {
                return;
            }
            view_data.sessions = sessions;
            view_data.session_cursor =
                clamp_cursor(view_data.session_cursor, view_data.sessions.len());
            view_data.status_line = None;
            request_summaries(bridge, view_data);
            show_selected_session(bridge, view_data);
        }
        LoadedEvent::MessagesLoaded {
            session_id,
            result: Ok(messages),
            ..
        } => {
            let selected = view_data
                .selected_session()
                .map(|session| session.session_id.as_str());
            if selected != Some(session_id.as_str()) {
                return;
            }
            view_data.messages = messages;
            view_data.messages_for = Some(session_id);
        }
        LoadedEvent::SummariesLoaded {
            project_path,
            result,
            ..
        } => {
            if view_data.project_path() != Some(project_path.as_str()) {
                return;
            }
            match result {
                Ok(summaries) => view_data.summaries.extend(summaries),
                Err(error) => view_data.status_line = Some(error.to_string()),
            }
        }
        LoadedEvent::ProjectsLoaded {
            result: Err(error), ..
        }
        | LoadedEvent::SessionsLoaded {
            result: Err(error), ..
        }
        | LoadedEvent::MessagesLoaded {
            result: Err(error), ..
        } => {
            tracing::debug!(%error, "keeping previous data after failed load");
        }
    }
}

fn request_summaries(bridge: &mut FetchBridge, view_data: &mut ViewData) {
    let Some(project_path) = view_data.project_path().map(str::to_owned) else {
        return;
    };
    let session_ids = view_data
        .sessions
        .iter()
        .map(|session| session.session_id.clone())
        .collect::<Vec<_>>();
    if session_ids.is_empty() {
        return;
    }
    let submitted = bridge.load_summaries(&project_path, &session_ids);
    if let Some(batch) = note_submit_error(view_data, submitted, "load summaries") {
        view_data.summaries.extend(batch.cached);
    }
}

fn show_selected_session(bridge: &mut FetchBridge, view_data: &mut ViewData) {
    let Some(session_id) = view_data
        .selected_session()
        .map(|session| session.session_id.clone())
    else {
        return;
    };
    let submitted = bridge.select_session(&session_id);
    if let Some(MessagesLookup::Cached(messages)) =
        note_submit_error(view_data, submitted, "load messages")
    {
        view_data.messages = messages;
        view_data.messages_for = Some(session_id);
    }
}

fn handle_key_event(
    bridge: &mut FetchBridge,
    view_data: &mut ViewData,
    key: KeyEvent,
) -> KeyOutcome {
    if matches!(bridge.loading_state(), LoadingState::Error { .. }) {
        bridge.dismiss_error();
        if key.code == KeyCode::Char('r') {
            reload(bridge, view_data);
        }
        return KeyOutcome::Continue;
    }

    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return KeyOutcome::Quit;
    }

    match key.code {
        KeyCode::Char('q') => KeyOutcome::Quit,
        KeyCode::Up | KeyCode::Char('k') => {
            move_cursor(bridge, view_data, -1);
            KeyOutcome::Continue
        }
        KeyCode::Down | KeyCode::Char('j') => {
            move_cursor(bridge, view_data, 1);
            KeyOutcome::Continue
        }
        KeyCode::Enter => handle_enter(bridge, view_data),
        KeyCode::Esc => {
            if bridge.loading_state().is_loading() {
                bridge.cancel();
            } else {
                go_back(bridge, view_data);
            }
            KeyOutcome::Continue
        }
        KeyCode::Backspace => {
            go_back(bridge, view_data);
            KeyOutcome::Continue
        }
        KeyCode::Char('r') => {
            reload(bridge, view_data);
            KeyOutcome::Continue
        }
        _ => KeyOutcome::Continue,
    }
}

fn move_cursor(bridge: &mut FetchBridge, view_data: &mut ViewData, delta: isize) {
    match view_data.screen {
        Screen::Projects => {
            view_data.project_cursor =
                step_cursor(view_data.project_cursor, delta, view_data.projects.len());
        }
        Screen::Sessions => {
            let next = step_cursor(view_data.session_cursor, delta, view_data.sessions.len());
            if next != view_data.session_cursor {
                view_data.session_cursor = next;
                show_selected_session(bridge, view_data);
            }
        }
    }
}

fn handle_enter(bridge: &mut FetchBridge, view_data: &mut ViewData) -> KeyOutcome {
    match view_data.screen {
        Screen::Projects => {
            open_selected_project(bridge, view_data);
            KeyOutcome::Continue
        }
        Screen::Sessions => match view_data.selected_session() {
            Some(session) => KeyOutcome::Resume(ResumeTarget {
                session_id: session.session_id.clone(),
                project_path: session.project_path.clone(),
            }),
            None => KeyOutcome::Continue,
        },
    }
}

fn open_selected_project(bridge: &mut FetchBridge, view_data: &mut ViewData) {
    let Some(project) = view_data.selected_project().cloned() else {
        return;
    };
    let project_path = project.path.clone();
    view_data.screen = Screen::Sessions;
    view_data.project = Some(project);
    clear_sessions(view_data);

    let submitted = bridge.load_sessions(&project_path);
    note_submit_error(view_data, submitted, "load sessions");
}

fn go_back(bridge: &mut FetchBridge, view_data: &mut ViewData) {
    if view_data.screen != Screen::Sessions {
        return;
    }
    bridge.leave_project();
    view_data.screen = Screen::Projects;
    view_data.project = None;
    clear_sessions(view_data);
}

fn clear_sessions(view_data: &mut ViewData) {
    view_data.sessions.clear();
    view_data.session_cursor = 0;
    view_data.messages.clear();
    view_data.messages_for = None;
    view_data.summaries.clear();
    view_data.status_line = None;
}

fn reload(bridge: &mut FetchBridge, view_data: &mut ViewData) {
    let project_path = view_data.project_path().map(str::to_owned);
    match (view_data.screen, project_path) {
        (Screen::Sessions, Some(project_path)) => {
            let submitted = bridge.load_sessions(&project_path);
            note_submit_error(view_data, submitted, "load sessions");
        }
        _ => start(bridge, view_data),
    }
}

fn step_cursor(cursor: usize, delta: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    cursor.saturating_add_signed(delta).min(len - 1)
}

fn clamp_cursor(cursor: usize, len: usize) -> usize {
    cursor.min(len.saturating_sub(1))
}

fn render(frame: &mut ratatui::Frame<'_>, loading: &LoadingState, view_data: &ViewData) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(2),
        ])
        .split(frame.area());

    let header = Paragraph::new(render_header_text(loading, view_data))
        .block(Block::default().title(APP_TITLE).borders(Borders::ALL));
    frame.render_widget(header, layout[0]);

    match view_data.screen {
        Screen::Projects => {
            let projects = Paragraph::new(render_projects_text(view_data))
                .block(Block::default().title("projects").borders(Borders::ALL));
            frame.render_widget(projects, layout[1]);
        }
        Screen::Sessions => {
            let columns = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
                .split(layout[1]);
            let sessions = Paragraph::new(render_sessions_text(view_data))
                .block(Block::default().title("sessions").borders(Borders::ALL));
            frame.render_widget(sessions, columns[0]);
            let messages = Paragraph::new(render_messages_text(loading, view_data))
                .wrap(Wrap { trim: false })
                .block(Block::default().title("messages").borders(Borders::ALL));
            frame.render_widget(messages, columns[1]);
        }
    }

    let color = if matches!(loading, LoadingState::Error { .. }) {
        Color::Red
    } else {
        Color::Yellow
    };
    let status = Paragraph::new(status_text(loading, view_data))
        .style(Style::default().fg(color))
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(status, layout[2]);
}

fn render_header_text(loading: &LoadingState, view_data: &ViewData) -> String {
    let location = match (view_data.screen, &view_data.project) {
        (Screen::Sessions, Some(project)) => format!("{} ({})", project.name, project.path),
        _ => format!("{} projects", view_data.projects.len()),
    };
    if loading.is_loading() {
        let frame = SPINNER_FRAMES[view_data.spinner % SPINNER_FRAMES.len()];
        return format!("{location} | {frame} {}... [esc to cancel]", loading.label());
    }
    if *loading == LoadingState::Cancelling {
        return format!("{location} | cancelling…");
    }
    location
}

fn render_projects_text(view_data: &ViewData) -> String {
    if view_data.projects.is_empty() {
        return "no projects found".to_owned();
    }
    view_data
        .projects
        .iter()
        .enumerate()
        .map(|(index, project)| {
            format!(
                "{} {}  {} sessions  {}  {}",
                cursor_marker(index == view_data.project_cursor),
                project.name,
                project.session_count,
                format_timestamp(project.last_activity),
                project.path,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_sessions_text(view_data: &ViewData) -> String {
    if view_data.sessions.is_empty() {
        return "no sessions".to_owned();
    }
    view_data
        .sessions
        .iter()
        .enumerate()
        .map(|(index, session)| {
            let summary = view_data
                .summaries
                .get(&session.session_id)
                .or(session.summary.as_ref())
                .map(|summary| truncate(summary, SUMMARY_CHARS))
                .unwrap_or_else(|| "…".to_owned());
            let resumed = if session.is_resumed { " [resumed]" } else { "" };
            format!(
                "{} {}  {}{resumed}  {summary}",
                cursor_marker(index == view_data.session_cursor),
                format_timestamp(session.last_activity),
                short_session_id(&session.session_id),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_messages_text(loading: &LoadingState, view_data: &ViewData) -> String {
    let Some(session) = view_data.selected_session() else {
        return String::new();
    };
    if view_data.messages_for.as_deref() == Some(session.session_id.as_str()) {
        if view_data.messages.is_empty() {
            return "(no messages)".to_owned();
        }
        return view_data.messages.join("\n");
    }
    if *loading == LoadingState::LoadingMessages {
        return "loading messages...".to_owned();
    }
    String::new()
}

fn status_text(loading: &LoadingState, view_data: &ViewData) -> String {
    if let LoadingState::Error { message } = loading {
        return format!("error: {message} | any key to dismiss, r to retry");
    }
    let hints = match view_data.screen {
        Screen::Projects => "j/k move | enter open | r reload | q quit",
        Screen::Sessions => "j/k move | enter resume | esc back | r reload | q quit",
    };
    match &view_data.status_line {
        Some(status) => format!("{status} | {hints}"),
        None => hints.to_owned(),
    }
}

fn cursor_marker(selected: bool) -> &'static str {
    if selected { ">" } else { " " }
}

fn short_session_id(session_id: &str) -> String {
    session_id.chars().take(SESSION_ID_CHARS).collect()
}

fn format_timestamp(value: OffsetDateTime) -> String {
    value
        .format(&format_description!("[year]-[month]-[day] [hour]:[minute]"))
        .unwrap_or_else(|_| value.to_string())
}
