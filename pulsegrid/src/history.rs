//! Small utilities to manage bounded history buffers for charts.

use std::collections::{BTreeMap, VecDeque};

use crate::types::Sample;

pub fn push_capped<T>(dq: &mut VecDeque<T>, v: T, cap: usize) {
    while dq.len() >= cap.max(1) {
        dq.pop_front();
    }
    dq.push_back(v);
}

/// Build a window from an arbitrary batch: oldest first, newest `cap` kept.
pub fn window_from(mut samples: Vec<Sample>, cap: usize) -> VecDeque<Sample> {
    // stable, so equal timestamps keep arrival order
    samples.sort_by_key(|s| s.timestamp);
    let skip = samples.len().saturating_sub(cap.max(1));
    samples.into_iter().skip(skip).collect()
}

/// Union of two windows keyed by timestamp. On a tie the entry from `newer` wins.
pub fn merge_by_timestamp(
    existing: &VecDeque<Sample>,
    newer: Vec<Sample>,
    cap: usize,
) -> VecDeque<Sample> {
    let mut by_ts: BTreeMap<i64, Sample> = existing
        .iter()
        .map(|s| (s.timestamp, s.clone()))
        .collect();
    by_ts.extend(newer.into_iter().map(|s| (s.timestamp, s)));
    let skip = by_ts.len().saturating_sub(cap.max(1));
    by_ts.into_values().skip(skip).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ts: i64, cpu: f64) -> Sample {
        Sample {
            server_id: "s1".into(),
            tag: "prod".into(),
            cpu_usage: cpu,
            memory_usage: 0.0,
            disk_usage: 0.0,
            network_usage: 0.0,
            timestamp: ts,
        }
    }

    #[test]
    fn push_capped_evicts_oldest() {
        let mut dq = VecDeque::new();
        for i in 0..5 {
            push_capped(&mut dq, i, 3);
        }
        assert_eq!(dq, VecDeque::from(vec![2, 3, 4]));
    }

    #[test]
    fn push_capped_shrinks_oversized_buffer() {
        let mut dq: VecDeque<u32> = (0..10).collect();
        push_capped(&mut dq, 10, 4);
        assert_eq!(dq, VecDeque::from(vec![7, 8, 9, 10]));
    }

    #[test]
    fn window_sorts_and_keeps_newest() {
        let w = window_from(vec![at(30, 3.0), at(10, 1.0), at(20, 2.0)], 2);
        let ts: Vec<i64> = w.iter().map(|s| s.timestamp).collect();
        assert_eq!(ts, vec![20, 30]);
    }

    #[test]
    fn merge_dedups_and_prefers_newer_batch() {
        let existing: VecDeque<Sample> = vec![at(10, 1.0), at(40, 4.0)].into();
        let merged = merge_by_timestamp(&existing, vec![at(10, 9.0), at(20, 2.0)], 10);
        let ts: Vec<i64> = merged.iter().map(|s| s.timestamp).collect();
        assert_eq!(ts, vec![10, 20, 40]);
        assert_eq!(merged[0].cpu_usage, 9.0);
    }

    #[test]
    fn merge_keeps_newest_within_cap() {
        let existing: VecDeque<Sample> = (0..50).map(|i| at(i * 10, 0.0)).collect();
        let newer: Vec<Sample> = (0..50).rev().map(|i| at(i * 10 + 5, 1.0)).collect();
        let merged = merge_by_timestamp(&existing, newer, 4);
        let ts: Vec<i64> = merged.iter().map(|s| s.timestamp).collect();
        assert_eq!(ts, vec![480, 485, 490, 495]);
    }
}
