//! Dataset acquisition, report assembly and the interactive command loop.

use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveDateTime;
use order_insights::render::{self, ChartSpec};
use order_insights::{
    AggregateOp, Analysis, Dataset, GroupSpec, LoadOptions, ParseSummary, ProcessorError, QueryCache, Theme,
    analysis,
};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::Path;
use std::rc::Rc;
use tracing::{error, info, warn};

use crate::cli::{OutputFormat, end_of_day, parse_analyses};
use crate::config::Config;

const MAX_REPORTED_PARSE_ERRORS: usize = 5;
const PROMPT: &str = "order-insights> ";

/// Loads the configured file; when it is missing, falls back to `fallback`
/// (`-` is stdin) or, on a terminal, asks for another path until one loads.
pub fn load_dataset(config: &Config, fallback: Option<&str>) -> Result<Dataset> {
    let options = config.load_options();
    let path = Path::new(&config.data.path);

    if path.exists() {
        return load_path(path, &options);
    }

    warn!("Data file not found: {}", path.display());

    match fallback {
        Some("-") => {
            info!("Reading CSV from stdin");
            let mut dataset = Dataset::new();
            let summary = dataset
                .load_reader(io::stdin().lock(), &options)
                .context("Failed to load CSV from stdin")?;
            report_summary(&summary);
            Ok(dataset)
        }
        Some(other) => load_path(Path::new(other), &options),
        None if io::stdin().is_terminal() => {
            let stdin = io::stdin();
            let mut stderr = io::stderr();
            prompt_for_dataset(stdin.lock(), &mut stderr, &options)?
                .ok_or_else(|| anyhow!("No dataset loaded"))
        }
        None => bail!(
            "Data file not found: {} (use --fallback FILE or --fallback - to read stdin)",
            path.display()
        ),
    }
}

fn load_path(path: &Path, options: &LoadOptions) -> Result<Dataset> {
    let mut dataset = Dataset::new();
    let summary = dataset
        .load_csv_with(path, options)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    info!(
        "Loaded {} rows x {} columns from {}",
        dataset.row_count(),
        dataset.headers().len(),
        path.display()
    );
    report_summary(&summary);
    Ok(dataset)
}

fn report_summary(summary: &ParseSummary) {
    if summary.errors.is_empty() {
        return;
    }
    warn!("{} rows could not be parsed", summary.errors.len());
    for e in summary.errors.iter().take(MAX_REPORTED_PARSE_ERRORS) {
        warn!("  line {}: {}", e.line, e.reason);
    }
}

/// Asks for CSV paths until one loads. `Ok(None)` on end of input or an empty answer.
pub fn prompt_for_dataset<R: BufRead, W: Write>(
    mut input: R,
    prompt: &mut W,
    options: &LoadOptions,
) -> Result<Option<Dataset>> {
    let mut line = String::new();
    loop {
        write!(prompt, "Path to a CSV file (empty to quit): ")?;
        prompt.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let answer = line.trim();
        if answer.is_empty() {
            return Ok(None);
        }

        match load_path(Path::new(answer), options) {
            Ok(dataset) => return Ok(Some(dataset)),
            Err(e) => {
                warn!("{:#}", e);
                writeln!(prompt, "Could not load {}: {:#}", answer, e)?;
            }
        }
    }
}

/// Charts from one round of views plus how many views failed
#[derive(Debug, Default)]
pub struct Report {
    pub charts: Vec<ChartSpec>,
    pub schema_failures: usize,
    pub failures: usize,
}

impl Report {
    fn record_failure(&mut self, name: &str, err: &ProcessorError) {
        match err {
            ProcessorError::EmptyInput => {
                warn!("{}: no rows left after filtering, nothing to chart", name);
            }
            e if e.is_schema_error() => {
                error!("{}: {}", name, e);
                self.schema_failures += 1;
            }
            e => error!("{}: {}", name, e),
        }
        self.failures += 1;
    }

    pub fn render(&self, format: OutputFormat, theme: &Theme) -> Result<String> {
        match format {
            OutputFormat::Json => {
                let mut s = render::render_json(&self.charts).context("Failed to encode charts")?;
                s.push('\n');
                Ok(s)
            }
            OutputFormat::Text => Ok(self
                .charts
                .iter()
                .map(|c| render::render_text(c, theme))
                .collect::<Vec<_>>()
                .join("\n")),
        }
    }
}

pub fn build_report(
    views: &[Analysis],
    dataset: &Rc<Dataset>,
    cache: &Rc<QueryCache>,
    config: &Config,
    range: Option<(NaiveDateTime, NaiveDateTime)>,
) -> Report {
    let params = config.params(range);
    let mut report = Report::default();
    for (view, result) in analysis::run_all(views, dataset, Some(cache), &params) {
        match result {
            Ok(output) => report.charts.push(render::to_chart_spec(
                view,
                output,
                &config.theme,
                params.top_n,
            )),
            Err(e) => report.record_failure(view.name(), &e),
        }
    }
    report
}

pub fn build_group_report(
    spec: &GroupSpec,
    dataset: &Rc<Dataset>,
    cache: &Rc<QueryCache>,
    config: &Config,
    range: Option<(NaiveDateTime, NaiveDateTime)>,
) -> Report {
    let params = config.params(range);
    let mut report = Report::default();
    match analysis::run_group(spec, dataset, Some(cache), &params) {
        Ok(result) => report.charts.push(render::group_chart_spec(
            result,
            &config.theme,
            params.top_n,
        )),
        Err(e) => report.record_failure(&format!("{}({})", spec.op, spec.measure), &e),
    }
    report
}

/// First `n` rows as a pipe-separated table; nulls print empty.
pub fn format_preview(dataset: &Dataset, n: usize) -> String {
    let mut out = dataset.headers().join(" | ");
    out.push('\n');
    for row in (0..n.min(dataset.row_count())).filter_map(|i| dataset.row(i)) {
        let cells: Vec<String> = row
            .into_iter()
            .map(|cell| cell.map(|v| v.to_string()).unwrap_or_default())
            .collect();
        out.push_str(&cells.join(" | "));
        out.push('\n');
    }
    out.push_str(&format!(
        "({} of {} rows)\n",
        n.min(dataset.row_count()),
        dataset.row_count()
    ));
    out
}

/// Line-oriented stand-in for the dashboard's widgets.
pub struct Session {
    dataset: Rc<Dataset>,
    cache: Rc<QueryCache>,
    config: Config,
    range: Option<(NaiveDateTime, NaiveDateTime)>,
    format: OutputFormat,
}

const HELP: &str = "\
commands:
  show <view|all>...              compute and draw views
  group <dim> <measure> [op]      custom ranked view (op: mean, sum, count)
  range [<start> <end>|clear]     show or set the shipping date range (YYYY-MM-DD)
  top <n>                         ranked rows per view
  head [n]                        preview the first rows
  schema                          column names, types and null counts
  views                           list view names
  help                            this text
  quit                            leave";

impl Session {
    pub fn new(
        dataset: Rc<Dataset>,
        cache: Rc<QueryCache>,
        config: Config,
        range: Option<(NaiveDateTime, NaiveDateTime)>,
        format: OutputFormat,
    ) -> Self {
        Self {
            dataset,
            cache,
            config,
            range,
            format,
        }
    }

    /// Reads commands from `input` until `quit` or end of input.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> Result<()> {
        writeln!(out, "Type 'help' for commands.")?;
        for line in input.lines() {
            if !self.handle_line(&line?, out)? {
                break;
            }
        }
        Ok(())
    }

    /// Terminal loop with line editing and history.
    pub fn run_terminal(&mut self) -> Result<()> {
        let mut rl = DefaultEditor::new()?;
        let mut out = io::stdout();
        writeln!(out, "Type 'help' for commands.")?;

        loop {
            let line = match rl.readline(PROMPT) {
                Ok(line) => line,
                // Ctrl-C drops the line being edited
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(e) => return Err(e).context("Failed to read command"),
            };

            let trimmed = line.trim();
            if !trimmed.is_empty() {
                let _ = rl.add_history_entry(trimmed);
            }
            if !self.handle_line(trimmed, &mut out)? {
                break;
            }
            out.flush()?;
        }
        Ok(())
    }

    /// Runs one command line. `false` once the user asked to leave.
    fn handle_line<W: Write>(&mut self, line: &str, out: &mut W) -> Result<bool> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&command, rest)) = words.split_first() else {
            return Ok(true);
        };
        if matches!(command, "quit" | "exit" | "q") {
            return Ok(false);
        }
        if let Err(e) = self.dispatch(command, rest, out) {
            writeln!(out, "error: {:#}", e)?;
        }
        Ok(true)
    }

    fn dispatch<W: Write>(&mut self, command: &str, rest: &[&str], out: &mut W) -> Result<()> {
        match command {
            "help" | "?" => writeln!(out, "{}", HELP)?,
            "views" => {
                for a in Analysis::ALL {
                    writeln!(out, "  {}", a)?;
                }
            }
            "show" => {
                let names: Vec<String> = if rest.is_empty() {
                    vec!["all".to_string()]
                } else {
                    rest.iter().map(|s| s.to_string()).collect()
                };
                let views = parse_analyses(&names).map_err(|e| anyhow!(e))?;
                let report = build_report(
                    &views,
                    &self.dataset,
                    &self.cache,
                    &self.config,
                    self.range,
                );
                self.emit(&report, out)?;
            }
            "group" => {
                let (dimension, measure) = match rest {
                    [d, m, ..] => (d.to_string(), m.to_string()),
                    _ => bail!("usage: group <dimension> <measure> [mean|sum|count]"),
                };
                let op = match rest.get(2) {
                    Some(op) => op.parse::<AggregateOp>()?,
                    None => AggregateOp::Mean,
                };
                let spec = GroupSpec {
                    dimension,
                    measure,
                    op,
                };
                let report = build_group_report(
                    &spec,
                    &self.dataset,
                    &self.cache,
                    &self.config,
                    self.range,
                );
                self.emit(&report, out)?;
            }
            "range" => self.range_command(rest, out)?,
            "top" => {
                let n: usize = rest
                    .first()
                    .ok_or_else(|| anyhow!("usage: top <n>"))?
                    .parse()
                    .context("top expects a positive integer")?;
                if n == 0 {
                    bail!("top expects a positive integer");
                }
                self.config.analysis.top_n = n;
                writeln!(out, "top_n = {}", n)?;
            }
            "head" => {
                let n = match rest.first() {
                    Some(n) => n.parse().context("head expects a row count")?,
                    None => 20,
                };
                write!(out, "{}", format_preview(&self.dataset, n))?;
            }
            "schema" => {
                for (name, ty) in self.dataset.schema() {
                    let nulls = self.dataset.get_col(name)?.null_count();
                    writeln!(out, "  {:<30} {:<10} {} null", name, ty.name(), nulls)?;
                }
            }
            other => bail!("unknown command '{}' (try 'help')", other),
        }
        Ok(())
    }

    fn range_command<W: Write>(&mut self, rest: &[&str], out: &mut W) -> Result<()> {
        let column = self.config.columns.timestamp.clone();
        match rest {
            [] => {
                match self.dataset.timestamp_domain(&column)? {
                    Some((lo, hi)) => writeln!(out, "{} spans {} .. {}", column, lo, hi)?,
                    None => writeln!(out, "{} has no timestamps", column)?,
                }
                match self.range {
                    Some((start, end)) => writeln!(out, "selected: {} .. {}", start, end)?,
                    None => writeln!(out, "selected: everything")?,
                }
            }
            ["clear"] | ["reset"] => {
                self.range = None;
                writeln!(out, "range cleared")?;
            }
            [start, end] => {
                let start = parse_date(start)?;
                let end = parse_date(end)?;
                if start > end {
                    bail!("start {} is after end {}", start, end);
                }
                let range = (start.and_time(chrono::NaiveTime::default()), end_of_day(end));
                self.range = Some(range);
                writeln!(out, "selected: {} .. {}", range.0, range.1)?;
            }
            _ => bail!("usage: range [<start> <end>|clear]"),
        }
        Ok(())
    }

    fn emit<W: Write>(&self, report: &Report, out: &mut W) -> Result<()> {
        if report.charts.is_empty() && report.failures > 0 {
            writeln!(out, "no charts ({} view(s) failed)", report.failures)?;
            return Ok(());
        }
        write!(out, "{}", report.render(self.format, &self.config.theme)?)?;
        Ok(())
    }
}

fn parse_date(s: &str) -> Result<chrono::NaiveDate> {
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{}', expected YYYY-MM-DD", s))
}
