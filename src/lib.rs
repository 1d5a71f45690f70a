//! # order-insights
//!
//! `order-insights` loads an e-commerce order-line CSV into typed, nullable
//! columns and answers a fixed set of dashboard questions over it: which
//! categories earn the most, which sellers sell the most, how prices are
//! distributed and how freight relates to weight.
//!
//! - Memory-mapped CSV loading with parallel chunk parsing
//! - Schema inference (int, float, string, timestamp) with null awareness
//! - One filter → group → rank pipeline behind every ranked view
//! - Derived revenue columns (`order_count`, `revenue`)
//! - Histogram and scatter statistics
//! - Session-local LRU cache of ranked results
//!
//! # Example
//!
//! ```rust,no_run
//! use order_insights::{AggregateOp, Dataset, LoadOptions, group_and_rank};
//! use std::path::Path;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut dataset = Dataset::new();
//!     let summary = dataset.load_csv_with(Path::new("orders.csv"), &LoadOptions::default())?;
//!     println!("loaded {} rows", summary.rows_processed);
//!
//!     let top = group_and_rank(&dataset, "product_category_name", "price", AggregateOp::Mean, 10)?;
//!     for row in &top.rows {
//!         println!("{:<30} {:>10.2}", row.key, row.value);
//!     }
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod processor;
pub mod render;

pub use analysis::{Analysis, AnalysisOutput, AnalysisParams, ColumnMap, GroupSpec};
pub use processor::column::{Column, ColumnType};
pub use processor::dataset::{Dataset, LoadOptions, parse_timestamp};
pub use processor::pipeline::{DEFAULT_TOP_N, compute_revenue, group_and_rank, rank_revenue};
pub use processor::query_builder::{QueryBuilder, QueryCache};
pub use processor::stats::{Histogram, HistogramBin, Scatter, histogram, pearson, scatter};
pub use processor::{
    AggregateOp, AggregationResult, FilterPredicate, ParseError, ParseSummary, ProcessorError,
    RankedRow, Value,
};
pub use render::{ChartKind, ChartSpec, Theme};
