//! Small UI helpers: human-readable sizes, percentages, times, truncation.

use chrono::{Local, TimeZone};

use crate::types::{MetricKind, Sample};

pub fn human(b: u64) -> String {
    const K: f64 = 1024.0;
    let b = b as f64;
    if b < K { return format!("{b:.0}B"); }
    let kb = b / K;
    if kb < K { return format!("{kb:.1}KB"); }
    let mb = kb / K;
    if mb < K { return format!("{mb:.1}MB"); }
    let gb = mb / K;
    if gb < K { return format!("{gb:.1}GB"); }
    let tb = gb / K;
    format!("{tb:.2}TB")
}

pub fn pct(v: f64) -> String {
    format!("{}%", v.round() as i64)
}

pub fn metric_value(kind: MetricKind, s: &Sample) -> String {
    let v = s.value(kind);
    if kind.is_percentage() {
        pct(v)
    } else {
        human(v.max(0.0) as u64)
    }
}

/// Local wall-clock time of an epoch-millis stamp, `HH:MM:SS`.
pub fn clock(ts_ms: i64) -> String {
    match Local.timestamp_millis_opt(ts_ms).single() {
        Some(t) => t.format("%H:%M:%S").to_string(),
        None => "--:--:--".into(),
    }
}

pub fn truncate_middle(s: &str, max: usize) -> String {
    let n = s.chars().count();
    if n <= max { return s.to_string(); }
    if max <= 3 { return "...".into(); }
    let keep = max - 3;
    let left = keep / 2;
    let right = keep - left;
    let head: String = s.chars().take(left).collect();
    let tail: String = s.chars().skip(n - right).collect();
    format!("{head}...{tail}")
}

/// Chart points for one metric: percentages clamp to 0..=100, bytes pass through.
pub fn spark_points<'a, I>(kind: MetricKind, samples: I) -> Vec<u64>
where
    I: IntoIterator<Item = &'a Sample>,
{
    samples
        .into_iter()
        .map(|s| {
            let v = s.value(kind);
            if kind.is_percentage() {
                v.clamp(0.0, 100.0).round() as u64
            } else {
                v.max(0.0).round() as u64
            }
        })
        .collect()
}
