//! Series panels: a grid of sparkline cards, or a table with one row per series.

use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Row, Sparkline, Table},
};

use crate::store::{Series, Snapshot, ViewMode};
use crate::types::MetricKind;
use crate::ui::theme::metric_color;
use crate::ui::util::{clock, metric_value, spark_points, truncate_middle};

struct Entry<'a> {
    server_id: &'a str,
    tag: &'a str,
    series: &'a Series,
}

fn visible_entries(snap: &Snapshot) -> Vec<Entry<'_>> {
    snap.visible_servers()
        .flat_map(|s| {
            s.tags.iter().map(move |(tag, series)| Entry {
                server_id: &s.server_id,
                tag,
                series,
            })
        })
        .collect()
}

fn short(kind: MetricKind) -> &'static str {
    match kind {
        MetricKind::Cpu => "cpu",
        MetricKind::Memory => "mem",
        MetricKind::Disk => "disk",
        MetricKind::Network => "net",
    }
}

pub fn draw_series(f: &mut ratatui::Frame<'_>, area: Rect, snap: &Snapshot) {
    let entries = visible_entries(snap);
    if entries.is_empty() {
        let msg = if snap.is_loading { "Loading..." } else { "No series yet" };
        f.render_widget(
            Paragraph::new(msg).block(Block::default().borders(Borders::ALL).title("Series")),
            area,
        );
        return;
    }
    let kinds: Vec<MetricKind> = snap.filters.visible_kinds().collect();
    match snap.filters.view_mode {
        ViewMode::Grid => draw_grid(f, area, &entries, &kinds),
        ViewMode::List => draw_list(f, area, &entries, &kinds, snap.window()),
    }
}

fn draw_grid(f: &mut ratatui::Frame<'_>, area: Rect, entries: &[Entry<'_>], kinds: &[MetricKind]) {
    let cols = if area.width >= 120 {
        3
    } else if area.width >= 70 {
        2
    } else {
        1
    };
    // borders + two lines per chart
    let cell_h = (2 + 2 * kinds.len().max(1)) as u16;
    let fit_rows = (area.height / cell_h).max(1) as usize;
    let shown = entries.len().min(fit_rows * cols);
    let n_rows = shown.div_ceil(cols);

    let row_areas = Layout::vertical(vec![Constraint::Length(cell_h); n_rows]).split(area);
    for (r, row_area) in row_areas.iter().enumerate() {
        let col_areas =
            Layout::horizontal(vec![Constraint::Ratio(1, cols as u32); cols]).split(*row_area);
        for (c, cell) in col_areas.iter().enumerate() {
            let i = r * cols + c;
            if i >= shown {
                break;
            }
            draw_card(f, *cell, &entries[i], kinds);
        }
    }
}

fn draw_card(f: &mut ratatui::Frame<'_>, area: Rect, e: &Entry<'_>, kinds: &[MetricKind]) {
    let label = truncate_middle(&format!("{}/{}", e.server_id, e.tag), area.width.saturating_sub(16) as usize);
    let title = match e.series.latest() {
        Some(s) => format!("{label} · {}", clock(s.timestamp)),
        None => format!("{label} · waiting"),
    };
    let block = Block::default().borders(Borders::ALL).title(title);
    let inner = block.inner(area);
    f.render_widget(block, area);
    if kinds.is_empty() || inner.height == 0 {
        return;
    }

    let parts = Layout::vertical(vec![Constraint::Ratio(1, kinds.len() as u32); kinds.len()]).split(inner);
    for (kind, part) in kinds.iter().zip(parts.iter()) {
        let h = Layout::horizontal([Constraint::Min(4), Constraint::Length(12)]).split(*part);

        let max_points = h[0].width as usize;
        let start = e.series.history.len().saturating_sub(max_points);
        let data = spark_points(*kind, e.series.history.iter().skip(start));
        let color = metric_color(*kind);
        let mut spark = Sparkline::default().data(&data).style(Style::default().fg(color));
        if kind.is_percentage() {
            spark = spark.max(100);
        }
        f.render_widget(spark, h[0]);

        let now = e
            .series
            .latest()
            .map(|s| metric_value(*kind, s))
            .unwrap_or_else(|| "-".into());
        let text = format!("{:<5}{:>7}", short(*kind), now);
        let line = Line::from(Span::styled(text, Style::default().fg(color).add_modifier(Modifier::BOLD)));
        f.render_widget(Paragraph::new(line).right_aligned(), h[1]);
    }
}

fn draw_list(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    entries: &[Entry<'_>],
    kinds: &[MetricKind],
    window: usize,
) {
    let mut header: Vec<String> = vec!["Server".into(), "Tag".into()];
    let mut widths = vec![Constraint::Percentage(25), Constraint::Percentage(15)];
    for k in kinds {
        header.push(k.label().to_string());
        widths.push(Constraint::Length(9));
    }
    header.push("Updated".into());
    widths.push(Constraint::Length(10));
    header.push("Points".into());
    widths.push(Constraint::Length(9));

    let rows: Vec<Row> = entries
        .iter()
        .map(|e| {
            let latest = e.series.latest();
            let mut cells: Vec<String> = vec![e.server_id.to_string(), e.tag.to_string()];
            for k in kinds {
                cells.push(latest.map(|s| metric_value(*k, s)).unwrap_or_else(|| "-".into()));
            }
            cells.push(latest.map(|s| clock(s.timestamp)).unwrap_or_else(|| "-".into()));
            cells.push(format!("{}/{window}", e.series.history.len()));
            Row::new(cells)
        })
        .collect();

    let table = Table::new(rows, widths)
        .header(Row::new(header).style(Style::default().add_modifier(Modifier::BOLD)))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Series ({})", entries.len())),
        );
    f.render_widget(table, area);
}
