use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use concurrent_bench::{available_parallelism, FailurePolicy, ReportFormat, DEFAULT_TARGET_PORT};
use reqwest::Url;
use strum::IntoEnumIterator;

use crate::strategies::Strategy;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// URL requested by every invocation.
    #[arg(long, env = "BENCH_URL")]
    pub url: Url,

    /// Number of launches. With more than one, a median summary is reported at the end.
    #[arg(long, env = "BENCH_LAUNCH_COUNT", default_value_t = 3)]
    pub launch_count: usize,

    /// Invocations per workload and launch [default: 4 x parallelism].
    #[arg(long, env = "BENCH_TARGET_COUNT")]
    pub target_count: Option<usize>,

    /// Worker threads running the invocations [default: available processing units].
    #[arg(long, env = "BENCH_PARALLELISM")]
    pub parallelism: Option<usize>,

    /// Remote port whose connections are counted [default: the URL's port].
    #[arg(long, env = "BENCH_TARGET_PORT")]
    pub target_port: Option<u16>,

    /// Pause between two workloads.
    #[arg(long, env = "BENCH_COOLDOWN", value_parser = humantime::parse_duration, default_value = "500ms")]
    pub cooldown: Duration,

    /// Timeout of a single request.
    #[arg(long, env = "BENCH_REQUEST_TIMEOUT", value_parser = humantime::parse_duration, default_value = "30s")]
    pub request_timeout: Duration,

    /// What to do when a workload fails.
    #[arg(long, env = "BENCH_ON_FAILURE", value_enum, default_value_t = OnFailure::Continue)]
    pub on_failure: OnFailure,

    /// Layout of the ranking summaries.
    #[arg(long, env = "BENCH_FORMAT", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Also write the run summary as JSON to this file.
    #[arg(long, env = "BENCH_JSON")]
    pub json: Option<PathBuf>,

    /// Comma separated strategies to compare [default: all].
    #[arg(long, env = "BENCH_STRATEGIES", value_enum, value_delimiter = ',')]
    pub strategies: Vec<Strategy>,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum OnFailure {
    /// Report the failed workload and go on with the next one.
    Continue,
    /// Stop at the first failed workload.
    Abort,
}

impl From<OnFailure> for FailurePolicy {
    fn from(value: OnFailure) -> Self {
        match value {
            OnFailure::Continue => FailurePolicy::Continue,
            OnFailure::Abort => FailurePolicy::Abort,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum OutputFormat {
    /// Parser-friendly lines.
    Text,
    /// Aligned tables.
    Table,
}

impl From<OutputFormat> for ReportFormat {
    fn from(value: OutputFormat) -> Self {
        match value {
            OutputFormat::Text => ReportFormat::Text,
            OutputFormat::Table => ReportFormat::Table,
        }
    }
}

impl Args {
    pub fn parallelism(&self) -> usize {
        self.parallelism.unwrap_or_else(available_parallelism)
    }

    pub fn target_count(&self) -> usize {
        self.target_count.unwrap_or_else(|| self.parallelism() * 4)
    }

    pub fn target_port(&self) -> u16 {
        self.target_port
            .or_else(|| self.url.port_or_known_default())
            .unwrap_or(DEFAULT_TARGET_PORT)
    }

    /// Selected strategies without repetitions, all of them when none was given.
    pub fn strategies(&self) -> Vec<Strategy> {
        if self.strategies.is_empty() {
            return Strategy::iter().collect();
        }
        let mut selected = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            if !selected.contains(strategy) {
                selected.push(*strategy);
            }
        }
        selected
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("client-reuse-bench").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn command_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn defaults() {
        let args = parse(&["--url", "http://localhost:8080/delay"]);
        assert_eq!(args.launch_count, 3);
        assert_eq!(args.cooldown, Duration::from_millis(500));
        assert_eq!(args.request_timeout, Duration::from_secs(30));
        assert_eq!(args.on_failure, OnFailure::Continue);
        assert_eq!(args.format, OutputFormat::Text);
        assert_eq!(args.target_port(), 8080);
        assert_eq!(args.target_count(), args.parallelism() * 4);
        assert_eq!(args.strategies().len(), 6);
        assert!(args.json.is_none());
    }

    #[test]
    fn target_port_follows_the_scheme() {
        assert_eq!(parse(&["--url", "http://example.com/"]).target_port(), 80);
        assert_eq!(parse(&["--url", "https://example.com/"]).target_port(), 443);
        let explicit = parse(&["--url", "https://example.com/", "--target-port", "8443"]);
        assert_eq!(explicit.target_port(), 8443);
    }

    #[test]
    fn explicit_values() {
        let args = parse(&[
            "--url",
            "http://127.0.0.1:3000/",
            "--launch-count",
            "5",
            "--parallelism",
            "2",
            "--cooldown",
            "1s 250ms",
            "--on-failure",
            "abort",
            "--format",
            "table",
            "--json",
            "summary.json",
        ]);
        assert_eq!(args.launch_count, 5);
        assert_eq!(args.parallelism(), 2);
        assert_eq!(args.target_count(), 8);
        assert_eq!(args.cooldown, Duration::from_millis(1250));
        assert_eq!(FailurePolicy::from(args.on_failure), FailurePolicy::Abort);
        assert_eq!(ReportFormat::from(args.format), ReportFormat::Table);
        assert_eq!(args.json, Some(PathBuf::from("summary.json")));
    }

    #[test]
    fn strategies_are_deduplicated_in_order() {
        let args = parse(&[
            "--url",
            "http://127.0.0.1/",
            "--strategies",
            "new-no-idle-client,shared-keep-alive-client,new-no-idle-client",
        ]);
        assert_eq!(
            args.strategies(),
            vec![Strategy::NewNoIdleClient, Strategy::SharedKeepAliveClient]
        );
    }

    #[test]
    fn unknown_strategies_are_rejected() {
        let result = Args::try_parse_from([
            "client-reuse-bench",
            "--url",
            "http://127.0.0.1/",
            "--strategies",
            "carrier-pigeon",
        ]);
        assert!(result.is_err());
    }
}
