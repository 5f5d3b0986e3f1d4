//! Top header: connection status, loading indicator, active filters and view mode.

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

use crate::store::{BackfillPolicy, Snapshot, ViewMode};
use crate::types::MetricKind;
use crate::ui::theme::metric_color;
use crate::ws::FeedState;

pub fn draw_header(f: &mut ratatui::Frame<'_>, area: Rect, snap: &Snapshot, feed: FeedState) {
    let (status, color) = match feed {
        FeedState::Connected => ("● live", Color::Green),
        FeedState::Connecting => ("◌ connecting...", Color::Yellow),
        FeedState::ReconnectPending => ("○ reconnecting...", Color::Red),
        FeedState::Disconnected => ("○ offline", Color::DarkGray),
    };

    let mut spans = vec![
        Span::raw("pulsegrid | "),
        Span::styled(status, Style::default().fg(color)),
    ];
    if snap.is_loading {
        spans.push(Span::styled("  loading history", Style::default().fg(Color::Yellow)));
    }
    spans.push(Span::raw("  |"));
    for kind in MetricKind::ALL {
        let style = if snap.filters.shows(kind) {
            Style::default().fg(metric_color(kind))
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(format!(" {}", kind.label()), style));
    }
    let mode = match snap.filters.view_mode {
        ViewMode::Grid => "grid",
        ViewMode::List => "list",
    };
    let backfill = match snap.backfill_policy() {
        BackfillPolicy::Replace => "replace",
        BackfillPolicy::Merge => "merge",
    };
    spans.push(Span::raw(format!("  | view: {mode}  backfill: {backfill}  (press 'q' to quit)")));

    f.render_widget(
        Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::BOTTOM)),
        area,
    );
}

pub fn draw_footer(f: &mut ratatui::Frame<'_>, area: Rect, notice: Option<&str>) {
    let help = "c/m/d/n: metrics  v: view  ↑/↓: server  h: hide  l: reload server  r: reload all  q: quit";
    let line = match notice {
        Some(text) => Line::from(vec![
            Span::styled(text.to_string(), Style::default().fg(Color::Yellow)),
            Span::raw("  ·  "),
            Span::styled(help, Style::default().fg(Color::DarkGray)),
        ]),
        None => Line::from(Span::styled(help, Style::default().fg(Color::DarkGray))),
    };
    f.render_widget(Paragraph::new(line), area);
}
