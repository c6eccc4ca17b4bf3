//! Human-readable progress and ranking output.

use std::fmt::Display;
use std::io::{self, Write};

use prettytable::{row, Table};

use crate::result::one_decimal;
use crate::{BenchError, Measured, Metric, RankedResult, SampleResult};

/// How ranking summaries are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    /// One line per entry: `<order>: <name> => <min>+<avg>+<max>+<total>+<tcp> ; <result>`.
    #[default]
    Text,
    /// Aligned tables.
    Table,
}

/// Writes the benchmark report to a line-oriented sink.
#[derive(Debug)]
pub struct Reporter<W> {
    out: W,
    format: ReportFormat,
}

impl Reporter<io::Stdout> {
    /// Reports to standard output.
    pub fn stdout(format: ReportFormat) -> Self {
        Self::new(io::stdout(), format)
    }
}

impl<W: Write> Reporter<W> {
    /// Reports to `out` in `format`.
    pub fn new(out: W, format: ReportFormat) -> Self {
        Self { out, format }
    }

    /// Consumes the reporter and returns the sink.
    pub fn into_inner(self) -> W {
        self.out
    }

    pub(crate) fn launch_started(&mut self) -> io::Result<()> {
        self.header("TARGET START")
    }

    pub(crate) fn workload_started(&mut self, name: &str) -> io::Result<()> {
        writeln!(self.out, "{name}...")?;
        self.out.flush()
    }

    pub(crate) fn workload_finished(&mut self, result: &SampleResult) -> io::Result<()> {
        let threads: Vec<String> = result.threads.iter().map(ToString::to_string).collect();
        writeln!(self.out, "{result} Threads: [{}]", threads.join(","))
    }

    pub(crate) fn workload_failed(&mut self, name: &str, error: &BenchError) -> io::Result<()> {
        writeln!(self.out, "{name} failed: {error}")
    }

    pub(crate) fn launch_summary(&mut self, ranked: &[RankedResult<SampleResult>]) -> io::Result<()> {
        self.header("TARGET SUMMARY")?;
        self.ranking(ranked)
    }

    pub(crate) fn run_summary<R>(&mut self, ranked: &[RankedResult<R>]) -> io::Result<()>
    where
        R: Measured + Display,
    {
        self.header("LAUNCH SUMMARY")?;
        self.ranking(ranked)
    }

    fn header(&mut self, title: &str) -> io::Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "--- {title} ---")
    }

    /// `ranked` is expected to be sorted already.
    fn ranking<R>(&mut self, ranked: &[RankedResult<R>]) -> io::Result<()>
    where
        R: Measured + Display,
    {
        match self.format {
            ReportFormat::Text => {
                for entry in ranked {
                    writeln!(self.out, "{}", rank_line(entry))?;
                }
            }
            ReportFormat::Table => {
                ranking_table(ranked).print(&mut self.out)?;
            }
        }
        self.out.flush()
    }
}

/// Formats one leaderboard entry.
pub fn rank_line<R: Measured + Display>(entry: &RankedResult<R>) -> String {
    let ranks = &entry.ranks;
    format!(
        "{}: {} => {}+{}+{}+{}+{} ; {}",
        entry.order,
        entry.name(),
        ranks.min,
        ranks.avg,
        ranks.max,
        ranks.total,
        ranks.tcp,
        entry.result
    )
}

fn ranking_table<R: Measured>(ranked: &[RankedResult<R>]) -> Table {
    let mut table = Table::new();
    table.set_titles(row!["Order", "Workload", "Min", "Avg", "Max", "Total", "Tcp"]);

    for entry in ranked {
        let cell = |metric: Metric| {
            let value = entry.result.metric(metric);
            let rank = entry.ranks.get(metric);
            match metric {
                Metric::Tcp => format!("{value} (#{rank})"),
                _ => format!("{:.1} ms (#{rank})", one_decimal(value)),
            }
        };
        table.add_row(row![
            entry.order,
            entry.name(),
            cell(Metric::Min),
            cell(Metric::Avg),
            cell(Metric::Max),
            cell(Metric::Total),
            cell(Metric::Tcp)
        ]);
    }

    table
}
