//! Chart specifications and the sinks that draw them.
//!
//! Nothing here computes; a [`ChartSpec`] is the result of a view plus the
//! labels and styling from an explicit [`Theme`].

use serde::{Deserialize, Serialize};
use std::fmt::Write;

use crate::analysis::{Analysis, AnalysisOutput};
use crate::processor::AggregationResult;
use crate::processor::stats::{Histogram, Scatter};

const MAX_LABEL_WIDTH: usize = 32;
const BAR: char = '█';

/// Palette name per chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Palettes {
    #[serde(default = "default_average_price_palette")]
    pub average_price: String,
    #[serde(default = "default_revenue_palette")]
    pub revenue: String,
    #[serde(default = "default_popularity_palette")]
    pub popularity: String,
    #[serde(default = "default_top_sellers_palette")]
    pub top_sellers: String,
    #[serde(default = "default_histogram_palette")]
    pub histogram: String,
    #[serde(default = "default_scatter_palette")]
    pub scatter: String,
}

impl Default for Palettes {
    fn default() -> Self {
        Self {
            average_price: default_average_price_palette(),
            revenue: default_revenue_palette(),
            popularity: default_popularity_palette(),
            top_sellers: default_top_sellers_palette(),
            histogram: default_histogram_palette(),
            scatter: default_scatter_palette(),
        }
    }
}

fn default_average_price_palette() -> String {
    "Oranges_d".to_string()
}

fn default_revenue_palette() -> String {
    "Greens_r".to_string()
}

fn default_popularity_palette() -> String {
    "Blues_d".to_string()
}

fn default_top_sellers_palette() -> String {
    "Purples_d".to_string()
}

fn default_histogram_palette() -> String {
    "steelblue".to_string()
}

fn default_scatter_palette() -> String {
    "teal".to_string()
}

/// Styling handed to every render call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    #[serde(default = "default_style")]
    pub style: String,

    #[serde(default = "default_context")]
    pub context: String,

    /// Point opacity for scatter charts
    #[serde(default = "default_scatter_alpha")]
    pub scatter_alpha: f64,

    /// Longest bar, in terminal cells
    #[serde(default = "default_width")]
    pub width: usize,

    #[serde(default)]
    pub palettes: Palettes,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            style: default_style(),
            context: default_context(),
            scatter_alpha: default_scatter_alpha(),
            width: default_width(),
            palettes: Palettes::default(),
        }
    }
}

fn default_style() -> String {
    "whitegrid".to_string()
}

fn default_context() -> String {
    "talk".to_string()
}

fn default_scatter_alpha() -> f64 {
    0.5
}

fn default_width() -> usize {
    40
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Histogram,
    Scatter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub palette: String,
    pub style: String,
    pub context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alpha: Option<f64>,
    pub data: AnalysisOutput,
}

/// Labels a catalogue view's output. `top_n` only feeds the title.
pub fn to_chart_spec(
    analysis: Analysis,
    output: AnalysisOutput,
    theme: &Theme,
    top_n: usize,
) -> ChartSpec {
    let p = &theme.palettes;
    let (title, x_label, y_label, palette) = match analysis {
        Analysis::AveragePrice => (
            format!("Average Product Price per Category (Top {})", top_n),
            "Average price (USD)",
            "Product category",
            &p.average_price,
        ),
        Analysis::Revenue => (
            format!("Highest Revenue per Product Category (Top {})", top_n),
            "Total revenue (USD)",
            "Product category",
            &p.revenue,
        ),
        Analysis::Popularity => (
            format!("Most Popular Product Categories (Top {})", top_n),
            "Order lines",
            "Product category",
            &p.popularity,
        ),
        Analysis::TopSellers => (
            format!("Top Sellers by Sales (Top {})", top_n),
            "Total sales (USD)",
            "Seller",
            &p.top_sellers,
        ),
        Analysis::PriceHistogram => (
            "Price Distribution".to_string(),
            "Price (USD)",
            "Frequency",
            &p.histogram,
        ),
        Analysis::WeightFreight => (
            "Product Weight vs Freight Value".to_string(),
            "Product weight (g)",
            "Freight value (USD)",
            &p.scatter,
        ),
    };
    let kind = kind_of(&output);
    ChartSpec {
        kind,
        title,
        x_label: x_label.to_string(),
        y_label: y_label.to_string(),
        palette: palette.clone(),
        style: theme.style.clone(),
        context: theme.context.clone(),
        alpha: (kind == ChartKind::Scatter).then_some(theme.scatter_alpha),
        data: output,
    }
}

/// Labels a custom ranked view straight from its result
pub fn group_chart_spec(result: AggregationResult, theme: &Theme, top_n: usize) -> ChartSpec {
    ChartSpec {
        kind: ChartKind::Bar,
        title: format!(
            "{} of {} by {} (Top {})",
            result.op, result.measure, result.dimension, top_n
        ),
        x_label: format!("{}({})", result.op, result.measure),
        y_label: result.dimension.clone(),
        palette: theme.palettes.average_price.clone(),
        style: theme.style.clone(),
        context: theme.context.clone(),
        alpha: None,
        data: AnalysisOutput::Ranked(result),
    }
}

fn kind_of(output: &AnalysisOutput) -> ChartKind {
    match output {
        AnalysisOutput::Ranked(_) => ChartKind::Bar,
        AnalysisOutput::Histogram(_) => ChartKind::Histogram,
        AnalysisOutput::Scatter(_) => ChartKind::Scatter,
    }
}

pub fn render_json(charts: &[ChartSpec]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(charts)
}

/// Plain-text rendering for a terminal
pub fn render_text(chart: &ChartSpec, theme: &Theme) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", chart.title);
    let _ = writeln!(out, "{}", "=".repeat(chart.title.chars().count()));

    match &chart.data {
        AnalysisOutput::Ranked(result) => render_bars(&mut out, chart, result, theme.width),
        AnalysisOutput::Histogram(hist) => render_histogram(&mut out, chart, hist, theme.width),
        AnalysisOutput::Scatter(scatter) => render_scatter(&mut out, chart, scatter),
    }
    out
}

fn render_bars(out: &mut String, chart: &ChartSpec, result: &AggregationResult, width: usize) {
    if result.is_empty() {
        let _ = writeln!(out, "(no data)");
        return;
    }
    let labels: Vec<String> = result.rows.iter().map(|r| truncate(&r.key)).collect();
    let label_width = labels
        .iter()
        .map(|l| l.chars().count())
        .max()
        .unwrap_or(0)
        .max(chart.y_label.chars().count().min(MAX_LABEL_WIDTH));
    let max = result.rows.iter().map(|r| r.value).fold(0.0, f64::max);

    let _ = writeln!(
        out,
        "{:<label_width$}  {}",
        truncate(&chart.y_label),
        chart.x_label
    );
    for (label, row) in labels.iter().zip(&result.rows) {
        let _ = writeln!(
            out,
            "{:<label_width$}  {} {:.2}",
            label,
            bar(row.value, max, width),
            row.value
        );
    }
}

fn render_histogram(out: &mut String, chart: &ChartSpec, hist: &Histogram, width: usize) {
    let max = hist.bins.iter().map(|b| b.count).max().unwrap_or(0) as f64;
    let _ = writeln!(out, "{} / {}", chart.x_label, chart.y_label);
    let last = hist.bins.len().saturating_sub(1);
    for (i, b) in hist.bins.iter().enumerate() {
        let close = if i == last { ']' } else { ')' };
        let _ = writeln!(
            out,
            "[{:>10.2}, {:>10.2}{} {} {}",
            b.start,
            b.end,
            close,
            bar(b.count as f64, max, width),
            b.count
        );
    }
    let _ = writeln!(out, "total: {}", hist.total());
}

fn render_scatter(out: &mut String, chart: &ChartSpec, scatter: &Scatter) {
    let (x_lo, x_hi) = extent(scatter.points.iter().map(|p| p.0));
    let (y_lo, y_hi) = extent(scatter.points.iter().map(|p| p.1));
    let _ = writeln!(out, "points: {}", scatter.points.len());
    let _ = writeln!(out, "{}: {:.2} .. {:.2}", chart.x_label, x_lo, x_hi);
    let _ = writeln!(out, "{}: {:.2} .. {:.2}", chart.y_label, y_lo, y_hi);
    match scatter.correlation {
        Some(r) => {
            let _ = writeln!(out, "pearson r: {:.3}", r);
        }
        None => {
            let _ = writeln!(out, "pearson r: n/a");
        }
    }
}

fn bar(value: f64, max: f64, width: usize) -> String {
    if max <= 0.0 || value <= 0.0 {
        return String::new();
    }
    let len = ((value / max) * width as f64).round() as usize;
    BAR.to_string().repeat(len.max(1))
}

fn extent(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

fn truncate(label: &str) -> String {
    if label.chars().count() <= MAX_LABEL_WIDTH {
        label.to_string()
    } else {
        let mut s: String = label.chars().take(MAX_LABEL_WIDTH - 1).collect();
        s.push('…');
        s
    }
}
