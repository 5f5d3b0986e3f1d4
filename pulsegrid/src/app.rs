//! App state and main loop: input handling, notices, redraw on snapshot change.

use std::{
    io,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    Terminal,
};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::info;

use crate::api::HttpApi;
use crate::config::Config;
use crate::notify::{ChannelNotifier, LogNotifier, Notice};
use crate::session::Session;
use crate::store::{Snapshot, StoreHandle};
use crate::types::MetricKind;
use crate::ui::{
    header::{draw_footer, draw_header},
    series::draw_series,
    servers::draw_servers,
};
use crate::ws::FeedState;

const TICK: Duration = Duration::from_millis(250);
const INPUT_POLL: Duration = Duration::from_millis(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    Continue,
    Reload,
    ReloadServer(String),
    Quit,
}

pub struct App {
    // index into the (sorted) server list
    selected: usize,
    last_notice: Option<String>,
    should_quit: bool,
}

impl App {
    pub fn new() -> Self {
        Self {
            selected: 0,
            last_notice: None,
            should_quit: false,
        }
    }

    pub async fn run(&mut self, cfg: &Config) -> Result<()> {
        let api = HttpApi::new(&cfg.api_url).context("building history client")?;
        let (notifier, notices) = ChannelNotifier::new();
        let session = Session::start(cfg, Arc::new(api), Arc::new(notifier));

        // Terminal setup
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let res = self.event_loop(&mut terminal, &session, notices).await;

        // Teardown
        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        session.shutdown().await;
        res
    }

    async fn event_loop<B: ratatui::backend::Backend>(
        &mut self,
        terminal: &mut Terminal<B>,
        session: &Session,
        mut notices: mpsc::UnboundedReceiver<Notice>,
    ) -> Result<()> {
        let mut snaps = session.store().subscribe();
        let mut feed = session.feed_state();
        let mut dirty = true;
        let mut last_draw = Instant::now();

        loop {
            // Input (non-blocking)
            while event::poll(Duration::ZERO)? {
                if let Event::Key(k) = event::read()? {
                    if k.kind != KeyEventKind::Press {
                        continue;
                    }
                    let snap = session.store().snapshot();
                    match self.handle_key(k.code, &snap, session.store())? {
                        KeyOutcome::Quit => self.should_quit = true,
                        KeyOutcome::Reload => {
                            let _ = session.reload();
                        }
                        KeyOutcome::ReloadServer(server_id) => {
                            let _ = session.reload_server(&server_id);
                        }
                        KeyOutcome::Continue => {}
                    }
                    dirty = true;
                }
            }
            if self.should_quit {
                break;
            }

            while let Ok(n) = notices.try_recv() {
                self.last_notice = Some(n.text);
                dirty = true;
            }
            if snaps.has_changed().unwrap_or(false) {
                snaps.borrow_and_update();
                dirty = true;
            }
            if feed.has_changed().unwrap_or(false) {
                feed.borrow_and_update();
                dirty = true;
            }

            if dirty || last_draw.elapsed() >= TICK {
                let snap = snaps.borrow().clone();
                let state = *feed.borrow();
                terminal.draw(|f| self.draw(f, &snap, state))?;
                last_draw = Instant::now();
                dirty = false;
            }

            sleep(INPUT_POLL).await;
        }

        Ok(())
    }

    /// Apply one key press. Store-changing keys dispatch actions; the rest
    /// only touch local UI state.
    pub fn handle_key(
        &mut self,
        code: KeyCode,
        snap: &Snapshot,
        store: &StoreHandle,
    ) -> Result<KeyOutcome> {
        let out = match code {
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => KeyOutcome::Quit,
            KeyCode::Char('c') => toggle(store, MetricKind::Cpu)?,
            KeyCode::Char('m') => toggle(store, MetricKind::Memory)?,
            KeyCode::Char('d') => toggle(store, MetricKind::Disk)?,
            KeyCode::Char('n') => toggle(store, MetricKind::Network)?,
            KeyCode::Char('v') => {
                store.set_view_mode(snap.filters.view_mode.toggled())?;
                KeyOutcome::Continue
            }
            KeyCode::Up => {
                self.selected = self.selected.saturating_sub(1);
                KeyOutcome::Continue
            }
            KeyCode::Down => {
                self.selected = (self.selected + 1).min(snap.servers.len().saturating_sub(1));
                KeyOutcome::Continue
            }
            KeyCode::Char('h') => {
                if let Some(entry) = snap.servers.values().nth(self.selected) {
                    store.set_visibility(entry.server_id.clone(), !entry.is_hidden)?;
                }
                KeyOutcome::Continue
            }
            KeyCode::Char('r') => KeyOutcome::Reload,
            KeyCode::Char('l') => match snap.servers.keys().nth(self.selected) {
                Some(server_id) => KeyOutcome::ReloadServer(server_id.clone()),
                None => KeyOutcome::Continue,
            },
            _ => KeyOutcome::Continue,
        };
        Ok(out)
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn draw(&mut self, f: &mut ratatui::Frame<'_>, snap: &Snapshot, feed: FeedState) {
        self.selected = self.selected.min(snap.servers.len().saturating_sub(1));

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(2), // header
                Constraint::Min(4),    // body
                Constraint::Length(1), // footer
            ])
            .split(f.area());

        draw_header(f, rows[0], snap, feed);

        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(28), Constraint::Min(20)])
            .split(rows[1]);
        draw_servers(f, body[0], snap, self.selected);
        draw_series(f, body[1], snap);

        draw_footer(f, rows[2], self.last_notice.as_deref());
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

fn toggle(store: &StoreHandle, kind: MetricKind) -> Result<KeyOutcome> {
    store.toggle_metric_filter(kind)?;
    Ok(KeyOutcome::Continue)
}

/// Run the session without a terminal UI, logging a summary line per snapshot
/// change until Ctrl-C.
pub async fn run_headless(cfg: &Config) -> Result<()> {
    let api = HttpApi::new(&cfg.api_url).context("building history client")?;
    let session = Session::start(cfg, Arc::new(api), Arc::new(LogNotifier));
    let mut snaps = session.store().subscribe();
    let mut feed = session.feed_state();

    info!(ws = %cfg.ws_url, api = %cfg.api_url, "headless session started");
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            r = snaps.changed() => {
                if r.is_err() {
                    break;
                }
                let snap = snaps.borrow_and_update().clone();
                log_summary(&snap);
            }
            r = feed.changed() => {
                if r.is_err() {
                    break;
                }
                let state = *feed.borrow_and_update();
                info!(state = ?state, "feed state");
            }
        }
    }

    session.shutdown().await;
    Ok(())
}

fn log_summary(snap: &Snapshot) {
    let series: usize = snap.servers.values().map(|s| s.tags.len()).sum();
    let hidden = snap.servers.values().filter(|s| s.is_hidden).count();
    let newest = snap
        .servers
        .values()
        .flat_map(|s| s.tags.values())
        .filter_map(|t| t.latest())
        .max_by_key(|s| s.timestamp);
    match newest {
        Some(s) => info!(
            servers = snap.servers.len(),
            hidden,
            series,
            loading = snap.is_loading,
            latest = %s.key(),
            cpu = s.cpu_usage,
            mem = s.memory_usage,
            "snapshot"
        ),
        None => info!(
            servers = snap.servers.len(),
            hidden,
            series,
            loading = snap.is_loading,
            "snapshot"
        ),
    }
}
