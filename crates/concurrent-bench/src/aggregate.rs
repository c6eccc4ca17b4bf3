//! Combines repeated launches into one median summary per workload.

use std::cmp::Ordering;

use crate::{AggregatedResult, SampleResult};

/// Collects the results of every launch of a run.
#[derive(Debug, Clone, Default)]
pub struct LaunchAggregator {
    launches: Vec<Vec<SampleResult>>,
}

impl LaunchAggregator {
    /// An aggregator without launches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the results of one finished launch.
    pub fn record(&mut self, results: Vec<SampleResult>) {
        self.launches.push(results);
    }

    /// Number of launches recorded so far.
    pub fn launch_count(&self) -> usize {
        self.launches.len()
    }

    /// The per-launch results in launch order.
    pub fn launches(&self) -> &[Vec<SampleResult>] {
        &self.launches
    }

    /// Cross-launch summary, or `None` when fewer than two launches ran and
    /// the single launch stands on its own.
    pub fn summary(&self) -> Option<Vec<AggregatedResult>> {
        (self.launches.len() > 1).then(|| self.aggregate())
    }

    /// One [`AggregatedResult`] per workload name, in order of first
    /// appearance.
    ///
    /// Every field is the upper median (index `count / 2` after an ascending
    /// sort) of that field over the launches in which the workload produced a
    /// result.
    pub fn aggregate(&self) -> Vec<AggregatedResult> {
        let mut names: Vec<&str> = Vec::new();
        for result in self.launches.iter().flatten() {
            if !names.contains(&result.name.as_str()) {
                names.push(&result.name);
            }
        }

        names
            .into_iter()
            .filter_map(|name| {
                let samples: Vec<&SampleResult> = self
                    .launches
                    .iter()
                    .flatten()
                    .filter(|r| r.name == name)
                    .collect();
                aggregate_samples(name, &samples)
            })
            .collect()
    }
}

fn aggregate_samples(name: &str, samples: &[&SampleResult]) -> Option<AggregatedResult> {
    let latency = |field: fn(&SampleResult) -> f64| {
        upper_median(samples.iter().map(|s| field(s)).collect(), f64::total_cmp)
    };

    Some(AggregatedResult {
        name: name.to_owned(),
        min: latency(|s| s.min)?,
        avg: latency(|s| s.avg)?,
        max: latency(|s| s.max)?,
        total: latency(|s| s.total)?,
        tcp: upper_median(samples.iter().map(|s| s.tcp).collect(), u64::cmp)?,
        launches: samples.len(),
    })
}

/// Element at index `len / 2` after sorting, i.e. the upper median for even
/// lengths.
pub fn upper_median<T: Copy>(
    mut values: Vec<T>,
    compare: impl Fn(&T, &T) -> Ordering,
) -> Option<T> {
    values.sort_by(compare);
    values.get(values.len() / 2).copied()
}

#[cfg(test)]
mod tests {
    use proptest::prop_assert_eq;
    use test_strategy::proptest;

    use super::*;

    fn sample(name: &str, min: f64, avg: f64, max: f64, total: f64, tcp: u64) -> SampleResult {
        SampleResult {
            name: name.to_owned(),
            min,
            avg,
            max,
            total,
            tcp,
            threads: vec![0],
        }
    }

    #[test]
    fn median_of_three_is_the_middle_value() {
        assert_eq!(upper_median(vec![5.0, 1.0, 3.0], f64::total_cmp), Some(3.0));
        assert_eq!(upper_median(vec![1.0, 3.0, 5.0], f64::total_cmp), Some(3.0));
        assert_eq!(upper_median(vec![3.0, 5.0, 1.0], f64::total_cmp), Some(3.0));
    }

    #[test]
    fn even_counts_take_the_upper_median() {
        assert_eq!(upper_median(vec![4u64, 1, 3, 2], u64::cmp), Some(3));
        assert_eq!(upper_median(vec![2.0, 1.0], f64::total_cmp), Some(2.0));
    }

    #[test]
    fn empty_input_has_no_median() {
        assert_eq!(upper_median(Vec::<u64>::new(), u64::cmp), None);
    }

    #[test]
    fn fields_are_aggregated_independently() {
        let mut aggregator = LaunchAggregator::new();
        aggregator.record(vec![sample("a", 5.0, 10.0, 90.0, 100.0, 2)]);
        aggregator.record(vec![sample("a", 1.0, 30.0, 70.0, 300.0, 0)]);
        aggregator.record(vec![sample("a", 3.0, 20.0, 80.0, 200.0, 7)]);

        let summary = aggregator.summary().unwrap();
        assert_eq!(
            summary,
            vec![AggregatedResult {
                name: "a".to_owned(),
                min: 3.0,
                avg: 20.0,
                max: 80.0,
                total: 200.0,
                tcp: 2,
                launches: 3,
            }]
        );
    }

    #[test]
    fn groups_by_name_in_first_seen_order() {
        let mut aggregator = LaunchAggregator::new();
        aggregator.record(vec![
            sample("beta", 2.0, 2.0, 2.0, 2.0, 0),
            sample("alpha", 1.0, 1.0, 1.0, 1.0, 0),
        ]);
        aggregator.record(vec![
            sample("alpha", 3.0, 3.0, 3.0, 3.0, 1),
            sample("beta", 4.0, 4.0, 4.0, 4.0, 1),
        ]);

        let summary = aggregator.aggregate();
        let names: Vec<_> = summary.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["beta", "alpha"]);
        assert_eq!(summary[0].min, 4.0);
        assert_eq!(summary[1].min, 3.0);
    }

    #[test]
    fn workloads_missing_from_a_launch_use_the_launches_they_have() {
        let mut aggregator = LaunchAggregator::new();
        aggregator.record(vec![sample("a", 1.0, 1.0, 1.0, 1.0, 0)]);
        aggregator.record(vec![
            sample("a", 9.0, 9.0, 9.0, 9.0, 0),
            sample("b", 4.0, 4.0, 4.0, 4.0, 0),
        ]);

        let summary = aggregator.aggregate();
        assert_eq!(summary[0].launches, 2);
        assert_eq!(summary[0].min, 9.0);
        assert_eq!(summary[1].launches, 1);
        assert_eq!(summary[1].min, 4.0);
    }

    #[test]
    fn single_launch_has_no_summary() {
        let mut aggregator = LaunchAggregator::new();
        assert!(aggregator.summary().is_none());
        aggregator.record(vec![sample("a", 1.0, 1.0, 1.0, 1.0, 0)]);
        assert!(aggregator.summary().is_none());
        assert_eq!(aggregator.launch_count(), 1);
    }

    #[proptest]
    fn median_ignores_launch_order(
        #[strategy(proptest::collection::vec(0u32..10_000, 1..12))] mins: Vec<u32>,
        rotation: usize,
    ) {
        let build = |values: &[u32]| {
            let mut aggregator = LaunchAggregator::new();
            for &min in values {
                let min = f64::from(min);
                aggregator.record(vec![sample("w", min, min, min, min, 0)]);
            }
            aggregator.aggregate()
        };

        let mut rotated = mins.clone();
        let len = rotated.len();
        rotated.rotate_left(rotation % len);

        let mut sorted = mins.clone();
        sorted.sort_unstable();

        let summary = build(&mins);
        prop_assert_eq!(summary[0].min, f64::from(sorted[sorted.len() / 2]));
        prop_assert_eq!(summary, build(&rotated));
    }
}
