//! Measurement records produced by sampling passes and launch aggregation.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::EnumIter;

/// The five criteria results are ranked by. Lower is better for all of them.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, strum::Display, Serialize, Deserialize,
)]
pub enum Metric {
    /// Fastest single invocation.
    Min,
    /// Mean invocation latency.
    Avg,
    /// Slowest single invocation.
    Max,
    /// Wall clock time of the whole parallel batch.
    Total,
    /// Connections opened by the batch.
    Tcp,
}

/// A record that can be ranked.
pub trait Measured {
    /// Name of the workload the record belongs to.
    fn name(&self) -> &str;

    /// Value of `metric`, in milliseconds for latencies.
    fn metric(&self, metric: Metric) -> f64;
}

/// Outcome of one sampling pass of one workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleResult {
    /// Workload name.
    pub name: String,
    /// Fastest invocation in milliseconds.
    pub min: f64,
    /// Mean invocation latency in milliseconds.
    pub avg: f64,
    /// Slowest invocation in milliseconds.
    pub max: f64,
    /// Wall clock duration of the whole batch in milliseconds.
    pub total: f64,
    /// Increase of the ambient connection counter, clamped at zero.
    pub tcp: u64,
    /// Distinct identifiers of the workers that ran invocations, ascending.
    pub threads: Vec<usize>,
}

impl SampleResult {
    /// Summarizes the individual invocation timings of a batch, `None` when
    /// there are no timings.
    pub(crate) fn from_timings(
        name: impl Into<String>,
        timings: &[Duration],
        total: Duration,
        tcp: u64,
        mut threads: Vec<usize>,
    ) -> Option<Self> {
        if timings.is_empty() {
            return None;
        }

        let millis = timings.iter().map(|t| as_millis(*t));
        let (min, max, sum) = millis.fold((f64::INFINITY, f64::NEG_INFINITY, 0.0), |acc, t| {
            (acc.0.min(t), acc.1.max(t), acc.2 + t)
        });
        // Summation error can push the mean just outside the observed range.
        let avg = (sum / timings.len() as f64).clamp(min, max);

        threads.sort_unstable();
        threads.dedup();

        Some(Self {
            name: name.into(),
            min,
            avg,
            max,
            total: as_millis(total),
            tcp,
            threads,
        })
    }
}

impl Measured for SampleResult {
    fn name(&self) -> &str {
        &self.name
    }

    fn metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Min => self.min,
            Metric::Avg => self.avg,
            Metric::Max => self.max,
            Metric::Total => self.total,
            Metric::Tcp => self.tcp as f64,
        }
    }
}

impl fmt::Display for SampleResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_metrics(f, self.min, self.avg, self.max, self.total, self.tcp)
    }
}

/// Per-metric medians of one workload across several launches.
///
/// Every field is chosen independently, so the values need not come from the
/// same launch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    /// Workload name.
    pub name: String,
    /// Median of the per-launch minimums.
    pub min: f64,
    /// Median of the per-launch averages.
    pub avg: f64,
    /// Median of the per-launch maximums.
    pub max: f64,
    /// Median of the per-launch totals.
    pub total: f64,
    /// Median of the per-launch connection deltas.
    pub tcp: u64,
    /// Number of launches the medians were taken over.
    pub launches: usize,
}

impl Measured for AggregatedResult {
    fn name(&self) -> &str {
        &self.name
    }

    fn metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Min => self.min,
            Metric::Avg => self.avg,
            Metric::Max => self.max,
            Metric::Total => self.total,
            Metric::Tcp => self.tcp as f64,
        }
    }
}

impl fmt::Display for AggregatedResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_metrics(f, self.min, self.avg, self.max, self.total, self.tcp)
    }
}

fn write_metrics(
    f: &mut fmt::Formatter<'_>,
    min: f64,
    avg: f64,
    max: f64,
    total: f64,
    tcp: u64,
) -> fmt::Result {
    let (min, avg, max, total) = (
        one_decimal(min),
        one_decimal(avg),
        one_decimal(max),
        one_decimal(total),
    );
    write!(
        f,
        "Min: {min:.1}, Avg: {avg:.1}, Max: {max:.1}, Total: {total:.1}, Tcp: {tcp}"
    )
}

/// Rounds to one decimal with halves away from zero; `{:.1}` alone rounds
/// exact halves to even.
pub(crate) fn one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn as_millis(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use test_strategy::proptest;

    use super::*;

    #[test]
    fn summarizes_timings() {
        let timings = [
            Duration::from_millis(30),
            Duration::from_millis(10),
            Duration::from_millis(20),
        ];
        let result = SampleResult::from_timings(
            "sampled",
            &timings,
            Duration::from_millis(35),
            2,
            vec![3, 1, 3, 2, 1],
        )
        .unwrap();

        assert_eq!(result.name, "sampled");
        assert_eq!(result.min, 10.0);
        assert_eq!(result.max, 30.0);
        assert!((result.avg - 20.0).abs() < 1e-9);
        assert_eq!(result.total, 35.0);
        assert_eq!(result.tcp, 2);
        assert_eq!(result.threads, vec![1, 2, 3]);
    }

    #[test]
    fn display_uses_one_decimal() {
        let result = SampleResult {
            name: "x".to_owned(),
            min: 1.04,
            avg: 2.26,
            max: 3.0,
            total: 10.96,
            tcp: 4,
            threads: vec![0],
        };
        assert_eq!(
            result.to_string(),
            "Min: 1.0, Avg: 2.3, Max: 3.0, Total: 11.0, Tcp: 4"
        );
    }

    #[test]
    fn no_timings_no_result() {
        assert!(SampleResult::from_timings("none", &[], Duration::ZERO, 0, Vec::new()).is_none());
    }

    #[test]
    fn display_rounds_halves_away_from_zero() {
        let result = SampleResult {
            name: "x".to_owned(),
            min: 0.25,
            avg: 1.75,
            max: 2.5,
            total: 10.25,
            tcp: 0,
            threads: vec![0],
        };
        assert_eq!(
            result.to_string(),
            "Min: 0.3, Avg: 1.8, Max: 2.5, Total: 10.3, Tcp: 0"
        );
    }

    #[test]
    fn mean_of_equal_timings_stays_in_range() {
        let timings = vec![Duration::from_nanos(100_001); 3];
        let result =
            SampleResult::from_timings("eq", &timings, Duration::ZERO, 0, vec![0]).unwrap();
        assert!(result.min <= result.avg && result.avg <= result.max);
    }

    #[proptest]
    fn min_avg_max_are_ordered(
        #[strategy(proptest::collection::vec(0u64..10_000_000_000, 1..64))] nanos: Vec<u64>,
    ) {
        let timings: Vec<_> = nanos.into_iter().map(Duration::from_nanos).collect();
        let result =
            SampleResult::from_timings("p", &timings, Duration::ZERO, 0, vec![0]).unwrap();
        proptest::prop_assert!(result.min <= result.avg);
        proptest::prop_assert!(result.avg <= result.max);
    }
}
