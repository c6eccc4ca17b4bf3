//! Multi-criteria ranking of competing workloads.

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::{Measured, Metric};

/// 0-based positions of a result in the per-metric orderings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRanks {
    pub min: usize,
    pub avg: usize,
    pub max: usize,
    pub total: usize,
    pub tcp: usize,
}

impl MetricRanks {
    /// Position of the result when ordered by `metric`.
    pub fn get(&self, metric: Metric) -> usize {
        match metric {
            Metric::Min => self.min,
            Metric::Avg => self.avg,
            Metric::Max => self.max,
            Metric::Total => self.total,
            Metric::Tcp => self.tcp,
        }
    }

    fn set(&mut self, metric: Metric, position: usize) {
        let slot = match metric {
            Metric::Min => &mut self.min,
            Metric::Avg => &mut self.avg,
            Metric::Max => &mut self.max,
            Metric::Total => &mut self.total,
            Metric::Tcp => &mut self.tcp,
        };
        *slot = position;
    }

    /// Sum of the five positions.
    pub fn sum(&self) -> usize {
        Metric::iter().map(|metric| self.get(metric)).sum()
    }
}

/// A result together with its rank positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult<R> {
    /// The ranked record.
    pub result: R,
    /// Per-metric positions.
    pub ranks: MetricRanks,
    /// Composite order, the sum of `ranks`. Lower is better.
    pub order: usize,
}

impl<R: Measured> RankedResult<R> {
    /// Name of the ranked workload.
    pub fn name(&self) -> &str {
        self.result.name()
    }
}

/// Ranks `results` along every [`Metric`] and sums the positions.
///
/// Each metric is sorted ascending with a stable sort, so equal values keep
/// their input order. The output is in input order; use [`sort_by_order`] for
/// a leaderboard.
pub fn rank<R: Measured + Clone>(results: &[R]) -> Vec<RankedResult<R>> {
    let mut ranks = vec![MetricRanks::default(); results.len()];

    for metric in Metric::iter() {
        let mut sorted: Vec<usize> = (0..results.len()).collect();
        sorted.sort_by(|&a, &b| {
            results[a]
                .metric(metric)
                .total_cmp(&results[b].metric(metric))
        });

        for (position, index) in sorted.into_iter().enumerate() {
            ranks[index].set(metric, position);
        }
    }

    results
        .iter()
        .cloned()
        .zip(ranks)
        .map(|(result, ranks)| RankedResult {
            result,
            order: ranks.sum(),
            ranks,
        })
        .collect()
}

/// Stable sort by composite order, best first.
pub fn sort_by_order<R>(mut ranked: Vec<RankedResult<R>>) -> Vec<RankedResult<R>> {
    ranked.sort_by_key(|r| r.order);
    ranked
}
