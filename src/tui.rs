use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use chrono::Utc;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use ratatui::Frame;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};
use tracing::{info, warn};

use crate::clipboard::{ClipboardSource, SystemClipboard, image_dimensions};
use crate::config::AppPaths;
use crate::errors::{ClipError, Result};
use crate::history::HistoryManager;
use crate::notify::spawn_listener;
use crate::storage::HistoryStore;
use crate::storage::models::{ClipboardItem, ContentKind};
use crate::storage::sqlite::SqliteStorage;
use crate::watcher;

#[derive(Debug, PartialEq)]
enum Mode {
    Normal,
    Search,
    ConfirmDelete(i64),
}

struct App {
    items: Vec<ClipboardItem>,
    total: i64,
    list_state: ListState,
    mode: Mode,
    search_query: String,
    status: String,
    status_time: Option<Instant>,
    preview_scroll: u16,
    should_quit: bool,
}

impl App {
    fn new() -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(0));
        Self {
            items: Vec::new(),
            total: 0,
            list_state,
            mode: Mode::Normal,
            search_query: String::new(),
            status: String::new(),
            status_time: None,
            preview_scroll: 0,
            should_quit: false,
        }
    }

    fn set_status(&mut self, msg: String) {
        self.status = msg;
        self.status_time = Some(Instant::now());
    }

    fn selected_item(&self) -> Option<&ClipboardItem> {
        self.list_state.selected().and_then(|i| self.items.get(i))
    }

    fn select_by(&mut self, delta: isize) {
        if self.items.is_empty() {
            return;
        }
        let current = self.list_state.selected().unwrap_or(0) as isize;
        let new = (current + delta).clamp(0, self.items.len() as isize - 1) as usize;
        self.list_state.select(Some(new));
        self.preview_scroll = 0;
    }

    fn select_first(&mut self) {
        if !self.items.is_empty() {
            self.list_state.select(Some(0));
            self.preview_scroll = 0;
        }
    }

    fn select_last(&mut self) {
        if !self.items.is_empty() {
            self.list_state.select(Some(self.items.len() - 1));
            self.preview_scroll = 0;
        }
    }

    fn refresh<S: HistoryStore>(&mut self, history: &HistoryManager<S>, update_count: bool) {
        match history.items(update_count) {
            Ok(items) => self.items = items,
            Err(e) => self.set_status(format!("Error: {e}")),
        }
        self.total = history.total_count();

        if self.items.is_empty() {
            self.list_state.select(None);
        } else if let Some(i) = self.list_state.selected() {
            if i >= self.items.len() {
                self.list_state.select(Some(self.items.len() - 1));
            }
        } else {
            self.list_state.select(Some(0));
        }
    }

    /// The watcher stored something new: re-read and jump to the top.
    fn on_history_changed<S: HistoryStore>(&mut self, history: &HistoryManager<S>) {
        self.refresh(history, true);
        self.select_first();
    }

    fn search<S: HistoryStore>(&mut self, history: &HistoryManager<S>) {
        history.set_search_filter(&self.search_query);
        self.refresh(history, false);
        self.select_first();
    }

    fn copy_selected<S: HistoryStore>(
        &mut self,
        history: &HistoryManager<S>,
        clipboard: &dyn ClipboardSource,
    ) {
        let Some(id) = self.selected_item().map(|item| item.id) else {
            return;
        };
        match history.copy_back(id, clipboard) {
            Ok(()) => {
                self.set_status(format!("Copied #{id}"));
                self.refresh(history, false);
                self.select_first();
            }
            Err(e) => self.set_status(format!("Copy failed: {e}")),
        }
    }

    fn request_delete(&mut self) {
        let Some(id) = self.selected_item().map(|item| item.id) else {
            return;
        };
        self.mode = Mode::ConfirmDelete(id);
        self.set_status(format!("Delete #{id}? [y/n]"));
    }

    fn confirm_delete<S: HistoryStore>(&mut self, history: &HistoryManager<S>, id: i64) {
        match history.delete(id) {
            Ok(true) => {
                self.set_status(format!("Deleted #{id}"));
                self.refresh(history, true);
            }
            Ok(false) => self.set_status(format!("#{id} not found")),
            Err(e) => self.set_status(format!("Delete error: {e}")),
        }
    }
}

fn format_age(dt: chrono::DateTime<Utc>) -> String {
    let dur = Utc::now() - dt;
    if dur.num_seconds() < 60 {
        "now".to_string()
    } else if dur.num_minutes() < 60 {
        format!("{}m", dur.num_minutes())
    } else if dur.num_hours() < 24 {
        format!("{}h", dur.num_hours())
    } else {
        format!("{}d", dur.num_days())
    }
}

fn format_bytes(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    let mut chars = s.chars();
    let truncated: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{truncated}…")
    } else {
        truncated
    }
}

fn row_preview(item: &ClipboardItem) -> String {
    match item.kind {
        ContentKind::Text => truncate_chars(&item.content.replace('\n', "↵"), 30),
        ContentKind::Image => "image".to_string(),
    }
}

// ── UI rendering ───────────────────────────────────────────────────

fn draw(frame: &mut Frame, app: &mut App, paths: &AppPaths) {
    let [title_area, body_area, help_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Fill(1),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    let watcher_info = match watcher::watcher_status(paths) {
        Ok(Some(pid)) => format!("watcher: running (pid {pid})"),
        _ => "watcher: not running".to_string(),
    };
    let title = format!(
        " Clipwatch — {} / {} — {watcher_info} ",
        app.items.len(),
        app.total
    );
    frame.render_widget(
        Paragraph::new(title).style(Style::new().fg(Color::Black).bg(Color::Cyan)),
        title_area,
    );

    let [list_area, preview_area] =
        Layout::horizontal([Constraint::Percentage(40), Constraint::Percentage(60)])
            .areas(body_area);

    let rows: Vec<ListItem> = app
        .items
        .iter()
        .map(|item| {
            let kind = match item.kind {
                ContentKind::Text => "T",
                ContentKind::Image => "I",
            };
            let age = format_age(item.captured_at);
            ListItem::new(format!("{:>4} {} {:>4}  {}", item.id, kind, age, row_preview(item)))
        })
        .collect();

    let list_title = if app.mode == Mode::Search {
        format!("Search: {}_", app.search_query)
    } else if !app.search_query.is_empty() {
        format!("History [{}]", app.search_query)
    } else {
        "History".to_string()
    };

    let list = List::new(rows)
        .block(Block::default().borders(Borders::ALL).title(list_title))
        .highlight_style(
            Style::new()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▸ ");

    frame.render_stateful_widget(list, list_area, &mut app.list_state);

    let preview_content = match app.selected_item() {
        Some(item) => {
            let mut lines = vec![
                Line::from(vec![
                    Span::styled("ID:       ", Style::new().fg(Color::DarkGray)),
                    Span::raw(item.id.to_string()),
                ]),
                Line::from(vec![
                    Span::styled("Kind:     ", Style::new().fg(Color::DarkGray)),
                    Span::raw(item.kind.as_str()),
                ]),
                Line::from(vec![
                    Span::styled("Captured: ", Style::new().fg(Color::DarkGray)),
                    Span::raw(item.captured_at.format("%Y-%m-%d %H:%M:%S").to_string()),
                ]),
                Line::raw("─────────────────────────"),
            ];
            match item.kind {
                ContentKind::Text => {
                    for line in item.content.lines() {
                        lines.push(Line::raw(line.to_string()));
                    }
                }
                ContentKind::Image => {
                    let dims = image_dimensions(&item.content)
                        .map(|(w, h)| format!("{w}x{h}"))
                        .unwrap_or_else(|| "unreadable".to_string());
                    lines.push(Line::from(vec![
                        Span::styled("Dims:     ", Style::new().fg(Color::DarkGray)),
                        Span::raw(dims),
                    ]));
                    lines.push(Line::from(vec![
                        Span::styled("Stored:   ", Style::new().fg(Color::DarkGray)),
                        Span::raw(format_bytes(item.content.len())),
                    ]));
                }
            }
            lines
        }
        None => vec![Line::raw("No history")],
    };

    let preview_title = if app.preview_scroll > 0 {
        format!("Preview [scroll: {}]", app.preview_scroll)
    } else {
        "Preview".to_string()
    };

    let preview = Paragraph::new(preview_content)
        .block(Block::default().borders(Borders::ALL).title(preview_title))
        .wrap(Wrap { trim: false })
        .scroll((app.preview_scroll, 0));

    frame.render_widget(preview, preview_area);

    if let Some(t) = app.status_time
        && t.elapsed() > Duration::from_secs(3)
    {
        app.status.clear();
        app.status_time = None;
    }

    let help_text = match app.mode {
        Mode::Normal | Mode::ConfirmDelete(_) => {
            if app.status.is_empty() {
                " [q]uit [/]search [Enter]copy [d]elete [r]efresh [J/K]scroll".to_string()
            } else {
                format!(" {} ", app.status)
            }
        }
        Mode::Search => " Type to search (live) · [Enter] done · [Esc] clear".to_string(),
    };

    frame.render_widget(
        Paragraph::new(help_text).style(Style::new().fg(Color::Black).bg(Color::White)),
        help_area,
    );
}

// ── Event handling ─────────────────────────────────────────────────

fn handle_event<S: HistoryStore>(
    app: &mut App,
    history: &HistoryManager<S>,
    clipboard: &dyn ClipboardSource,
    signals: &Receiver<()>,
) -> std::io::Result<()> {
    // Signals coalesce: one re-read covers any number of them.
    if signals.try_iter().count() > 0 {
        app.on_history_changed(history);
    }

    if !event::poll(Duration::from_millis(250))? {
        return Ok(());
    }

    let Event::Key(key) = event::read()? else {
        return Ok(());
    };
    if key.kind != KeyEventKind::Press {
        return Ok(());
    }

    match app.mode {
        Mode::Normal => {
            let shifted = key.modifiers.contains(KeyModifiers::SHIFT);
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => app.should_quit = true,
                KeyCode::Char('J') if shifted => {
                    app.preview_scroll = app.preview_scroll.saturating_add(1);
                }
                KeyCode::Char('K') if shifted => {
                    app.preview_scroll = app.preview_scroll.saturating_sub(1);
                }
                KeyCode::Char('j') | KeyCode::Down => app.select_by(1),
                KeyCode::Char('k') | KeyCode::Up => app.select_by(-1),
                KeyCode::PageDown => app.select_by(10),
                KeyCode::PageUp => app.select_by(-10),
                KeyCode::Char('g') | KeyCode::Home => app.select_first(),
                KeyCode::Char('G') | KeyCode::End => app.select_last(),
                KeyCode::Enter => app.copy_selected(history, clipboard),
                KeyCode::Char('d') | KeyCode::Delete => app.request_delete(),
                KeyCode::Char('/') => {
                    app.mode = Mode::Search;
                    app.status.clear();
                    app.status_time = None;
                }
                KeyCode::Char('r') => {
                    app.refresh(history, true);
                    app.set_status("Refreshed".to_string());
                }
                _ => {}
            }
        }
        Mode::ConfirmDelete(id) => {
            app.mode = Mode::Normal;
            if key.code == KeyCode::Char('y') {
                app.confirm_delete(history, id);
            } else {
                app.set_status("Delete cancelled".to_string());
            }
        }
        Mode::Search => match key.code {
            KeyCode::Esc => {
                app.mode = Mode::Normal;
                app.search_query.clear();
                app.search(history);
            }
            KeyCode::Enter => app.mode = Mode::Normal,
            KeyCode::Backspace => {
                app.search_query.pop();
                app.search(history);
            }
            KeyCode::Char(c) => {
                app.search_query.push(c);
                app.search(history);
            }
            _ => {}
        },
    }

    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────

pub fn run(paths: &AppPaths) -> Result<()> {
    let history = HistoryManager::new(SqliteStorage::open(&paths.db_path)?);

    // Bind before starting the watcher so its first signal has a listener.
    let (tx, signals) = mpsc::channel();
    if let Err(e) = spawn_listener(&paths.socket_path, tx) {
        warn!(error = %e, "live updates disabled");
    }
    if let Err(e) = watcher::ensure_watcher(paths) {
        warn!(error = %e, "could not start watcher");
    }

    let clipboard = SystemClipboard::new();
    let mut app = App::new();
    app.refresh(&history, true);

    let mut terminal = ratatui::init();

    let result = (|| {
        loop {
            terminal.draw(|frame| draw(frame, &mut app, paths))?;
            handle_event(&mut app, &history, &clipboard, &signals)?;
            if app.should_quit {
                break;
            }
        }
        Ok::<(), std::io::Error>(())
    })();

    ratatui::restore();

    if let Err(e) = history.compact() {
        warn!(error = %e, "compaction on exit failed");
    }
    info!("viewer closed");

    result.map_err(|e| ClipError::Watcher(e.to_string()))
}
