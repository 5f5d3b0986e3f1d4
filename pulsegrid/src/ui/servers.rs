//! Server sidebar: every known server, hidden ones dimmed, selection highlighted.

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

use crate::store::Snapshot;
use crate::ui::theme::{HIDDEN_FG, SELECTED_BG};
use crate::ui::util::truncate_middle;

pub fn draw_servers(f: &mut ratatui::Frame<'_>, area: Rect, snap: &Snapshot, selected: usize) {
    let width = area.width.saturating_sub(6) as usize;
    let lines: Vec<Line> = snap
        .servers
        .values()
        .enumerate()
        .map(|(i, s)| {
            let mark = if s.is_hidden { "◌" } else { "●" };
            let text = format!("{mark} {} ({})", truncate_middle(&s.server_id, width), s.tags.len());
            let mut style = Style::default();
            if s.is_hidden {
                style = style.fg(HIDDEN_FG);
            }
            if i == selected {
                style = style.bg(SELECTED_BG).add_modifier(Modifier::BOLD);
            }
            Line::from(Span::styled(text, style))
        })
        .collect();

    let title = format!("Servers ({})", snap.servers.len());
    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title)),
        area,
    );
}
