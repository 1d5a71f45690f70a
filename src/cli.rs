//! Command-line interface argument parsing.
//!
//! Every flag is optional; unset values fall back to `.order-insights.toml`
//! and then to built-in defaults.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use clap::Parser;
use order_insights::{AggregateOp, Analysis};
use std::path::PathBuf;

/// order-insights - ranked summaries of an e-commerce order-lines CSV
///
/// Examples:
///   order-insights --data orders.csv
///   order-insights --data orders.csv --analysis revenue --start 2018-01-01 --end 2018-03-31
///   order-insights --data orders.csv --dimension seller_id --measure freight_value --agg sum
///   order-insights --data missing.csv --fallback -  < orders.csv
///   order-insights --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// CSV file with the order lines
    #[arg(short, long, value_name = "FILE", env = "ORDER_INSIGHTS_DATA")]
    pub data: Option<PathBuf>,

    /// File to load when --data does not exist (`-` reads stdin)
    #[arg(long, value_name = "FILE")]
    pub fallback: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .order-insights.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Views to compute (repeatable or comma-separated; `all` for every view)
    ///
    /// Values: average-price, revenue, popularity, top-sellers,
    /// price-histogram, weight-freight, all
    #[arg(short, long, value_name = "NAME", value_delimiter = ',')]
    pub analysis: Vec<String>,

    /// First shipping date to include (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub start: Option<NaiveDate>,

    /// Last shipping date to include, whole day (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub end: Option<NaiveDate>,

    /// Number of ranked rows per view
    #[arg(short = 'n', long, value_name = "N")]
    pub top_n: Option<usize>,

    /// Output format (text, json)
    #[arg(long, default_value = "text", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Write the report to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Print the first N rows of the dataset before the views
    #[arg(long, value_name = "N")]
    pub preview: Option<usize>,

    /// Skip rows whose field count does not match the header instead of failing
    #[arg(long)]
    pub lenient: bool,

    /// Custom ranked view: dimension column
    #[arg(long, value_name = "COLUMN", requires = "measure")]
    pub dimension: Option<String>,

    /// Custom ranked view: measure column
    #[arg(long, value_name = "COLUMN", requires = "dimension")]
    pub measure: Option<String>,

    /// Custom ranked view: mean, sum or count
    #[arg(long, value_name = "OP", default_value = "mean")]
    pub agg: AggregateOp,

    /// Read commands from stdin after the initial report
    #[arg(short, long)]
    pub interactive: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .order-insights.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Terminal charts (default)
    #[default]
    Text,
    /// Chart specifications as JSON
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.top_n == Some(0) {
            return Err("--top-n must be at least 1".to_string());
        }

        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(format!(
                    "--start ({}) is after --end ({})",
                    start, end
                ));
            }
        }

        if self.is_custom_group() && !self.analysis.is_empty() {
            return Err("--analysis cannot be combined with --dimension/--measure".to_string());
        }

        self.selected_analyses(&[]).map(|_| ())
    }

    /// True when a custom ranked view was requested
    pub fn is_custom_group(&self) -> bool {
        self.dimension.is_some() && self.measure.is_some()
    }

    /// Views named on the command line, or `fallback` when none were given
    pub fn selected_analyses(&self, fallback: &[Analysis]) -> Result<Vec<Analysis>, String> {
        if self.analysis.is_empty() {
            return Ok(fallback.to_vec());
        }
        parse_analyses(&self.analysis)
    }

    /// Inclusive timestamp bounds; the end date covers the whole day.
    ///
    /// `None` when neither bound is set. A missing side is open.
    pub fn date_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        if self.start.is_none() && self.end.is_none() {
            return None;
        }
        let start = self
            .start
            .map_or(NaiveDateTime::MIN, |d| d.and_time(NaiveTime::default()));
        let end = self.end.map_or(NaiveDateTime::MAX, end_of_day);
        Some((start, end))
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

/// Last representable instant of `date`
pub fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_nano_opt(23, 59, 59, 999_999_999)
        .unwrap_or_else(|| date.and_time(NaiveTime::default()))
}

/// Parses view names; `all` expands to the whole catalogue. Order is kept, duplicates dropped.
pub fn parse_analyses(names: &[String]) -> Result<Vec<Analysis>, String> {
    let mut out: Vec<Analysis> = Vec::new();
    for name in names {
        if name.trim().eq_ignore_ascii_case("all") {
            for a in Analysis::ALL {
                if !out.contains(&a) {
                    out.push(a);
                }
            }
            continue;
        }
        let a: Analysis = name.parse()?;
        if !out.contains(&a) {
            out.push(a);
        }
    }
    Ok(out)
}
