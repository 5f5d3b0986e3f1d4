//! Shared UI theme constants.

use ratatui::style::Color;

use crate::types::MetricKind;

pub const SELECTED_BG: Color = Color::Rgb(60, 60, 70);
pub const HIDDEN_FG: Color = Color::DarkGray;

pub fn metric_color(kind: MetricKind) -> Color {
    match kind {
        MetricKind::Cpu => Color::Rgb(14, 165, 233),
        MetricKind::Memory => Color::Rgb(139, 92, 246),
        MetricKind::Disk => Color::Rgb(249, 115, 22),
        MetricKind::Network => Color::Rgb(16, 185, 129),
    }
}
