//! The fixed catalogue of dashboard views.
//!
//! Each view is a parameterisation of the same filter → group → rank
//! pipeline (or of the histogram/scatter statistics); nothing here
//! aggregates on its own.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use tracing::debug;

use crate::processor::{
    AggregateOp, AggregationResult, ProcessorError,
    dataset::Dataset,
    pipeline::{DEFAULT_TOP_N, REVENUE_COL},
    query_builder::QueryCache,
    stats::{self, DEFAULT_BINS, Histogram, Scatter},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Analysis {
    AveragePrice,
    Revenue,
    Popularity,
    TopSellers,
    PriceHistogram,
    WeightFreight,
}

impl Analysis {
    pub const ALL: [Analysis; 6] = [
        Analysis::AveragePrice,
        Analysis::Revenue,
        Analysis::Popularity,
        Analysis::TopSellers,
        Analysis::PriceHistogram,
        Analysis::WeightFreight,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Analysis::AveragePrice => "average-price",
            Analysis::Revenue => "revenue",
            Analysis::Popularity => "popularity",
            Analysis::TopSellers => "top-sellers",
            Analysis::PriceHistogram => "price-histogram",
            Analysis::WeightFreight => "weight-freight",
        }
    }
}

impl fmt::Display for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Analysis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Analysis::ALL
            .into_iter()
            .find(|a| a.name() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = Analysis::ALL.iter().map(|a| a.name()).collect();
                format!("unknown analysis '{}' (expected one of: {})", s, names.join(", "))
            })
    }
}

/// Dataset column names the views read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMap {
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_price")]
    pub price: String,
    #[serde(default = "default_order_id")]
    pub order_id: String,
    #[serde(default = "default_seller")]
    pub seller: String,
    #[serde(default = "default_weight")]
    pub weight: String,
    #[serde(default = "default_freight")]
    pub freight: String,
    #[serde(default = "default_timestamp")]
    pub timestamp: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            category: default_category(),
            price: default_price(),
            order_id: default_order_id(),
            seller: default_seller(),
            weight: default_weight(),
            freight: default_freight(),
            timestamp: default_timestamp(),
        }
    }
}

fn default_category() -> String {
    "product_category_name".to_string()
}

fn default_price() -> String {
    "price".to_string()
}

fn default_order_id() -> String {
    "order_id".to_string()
}

fn default_seller() -> String {
    "seller_id".to_string()
}

fn default_weight() -> String {
    "product_weight_g".to_string()
}

fn default_freight() -> String {
    "freight_value".to_string()
}

fn default_timestamp() -> String {
    "shipping_limit_date".to_string()
}

/// Per-request knobs shared by every view
#[derive(Debug, Clone)]
pub struct AnalysisParams {
    pub columns: ColumnMap,
    pub top_n: usize,
    pub bins: usize,
    /// Inclusive range over `columns.timestamp`; `None` keeps every row
    pub range: Option<(NaiveDateTime, NaiveDateTime)>,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            columns: ColumnMap::default(),
            top_n: DEFAULT_TOP_N,
            bins: DEFAULT_BINS,
            range: None,
        }
    }
}

/// What a view hands to the renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisOutput {
    Ranked(AggregationResult),
    Histogram(Histogram),
    Scatter(Scatter),
}

/// Custom ranked view: any dimension, measure and op
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSpec {
    pub dimension: String,
    pub measure: String,
    pub op: AggregateOp,
}

/// Runs one view. Ranked views go through the query builder so repeated
/// requests in a session are served from `cache`.
pub fn run(
    analysis: Analysis,
    dataset: &Rc<Dataset>,
    cache: Option<&Rc<QueryCache>>,
    params: &AnalysisParams,
) -> Result<AnalysisOutput, ProcessorError> {
    debug!(%analysis, "running analysis");
    let cols = &params.columns;

    let ranked = |spec: GroupSpec, revenue: bool| -> Result<AnalysisOutput, ProcessorError> {
        let mut query = match cache {
            Some(cache) => dataset.query_with_cache(cache),
            None => dataset.query(),
        };
        if let Some((start, end)) = params.range {
            query = query.between(&cols.timestamp, start, end);
        }
        if revenue {
            query = query.revenue(&cols.price, &cols.order_id);
        }
        query
            .group_by(&spec.dimension)
            .aggregate(&spec.measure, spec.op)
            .limit(params.top_n)
            .execute()
            .map(AnalysisOutput::Ranked)
    };

    match analysis {
        Analysis::AveragePrice => ranked(
            GroupSpec {
                dimension: cols.category.clone(),
                measure: cols.price.clone(),
                op: AggregateOp::Mean,
            },
            false,
        ),
        Analysis::Revenue => ranked(
            GroupSpec {
                dimension: cols.category.clone(),
                measure: REVENUE_COL.to_string(),
                op: AggregateOp::Sum,
            },
            true,
        ),
        Analysis::Popularity => ranked(
            GroupSpec {
                dimension: cols.category.clone(),
                measure: cols.order_id.clone(),
                op: AggregateOp::Count,
            },
            false,
        ),
        Analysis::TopSellers => ranked(
            GroupSpec {
                dimension: cols.seller.clone(),
                measure: cols.price.clone(),
                op: AggregateOp::Sum,
            },
            false,
        ),
        Analysis::PriceHistogram => {
            let view = in_range(dataset, params)?;
            stats::histogram(&view, &cols.price, params.bins).map(AnalysisOutput::Histogram)
        }
        Analysis::WeightFreight => {
            let view = in_range(dataset, params)?;
            stats::scatter(&view, &cols.weight, &cols.freight).map(AnalysisOutput::Scatter)
        }
    }
}

/// Runs a custom ranked view with the same range and limit handling as the catalogue
pub fn run_group(
    spec: &GroupSpec,
    dataset: &Rc<Dataset>,
    cache: Option<&Rc<QueryCache>>,
    params: &AnalysisParams,
) -> Result<AggregationResult, ProcessorError> {
    let mut query = match cache {
        Some(cache) => dataset.query_with_cache(cache),
        None => dataset.query(),
    };
    if let Some((start, end)) = params.range {
        query = query.between(&params.columns.timestamp, start, end);
    }
    query
        .group_by(&spec.dimension)
        .aggregate(&spec.measure, spec.op)
        .limit(params.top_n)
        .execute()
}

fn in_range<'a>(
    dataset: &'a Dataset,
    params: &AnalysisParams,
) -> Result<Cow<'a, Dataset>, ProcessorError> {
    match params.range {
        Some((start, end)) => dataset
            .filter_date_range(&params.columns.timestamp, start, end)
            .map(Cow::Owned),
        None => Ok(Cow::Borrowed(dataset)),
    }
}

/// Runs several views independently; one failing does not stop the others.
pub fn run_all(
    analyses: &[Analysis],
    dataset: &Rc<Dataset>,
    cache: Option<&Rc<QueryCache>>,
    params: &AnalysisParams,
) -> Vec<(Analysis, Result<AnalysisOutput, ProcessorError>)> {
    analyses
        .iter()
        .map(|&a| (a, run(a, dataset, cache, params)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::dataset::{LoadOptions, parse_timestamp};

    const ORDERS: &str = "order_id,seller_id,product_category_name,price,freight_value,product_weight_g,shipping_limit_date\n\
        o1,s1,toys,10.0,5.0,100,2018-01-05 10:00:00\n\
        o1,s2,toys,30.0,7.5,300,2018-01-05 10:00:00\n\
        o2,s1,garden,20.0,6.0,200,2018-02-10 08:30:00\n\
        o3,s3,books,50.0,12.0,800,2018-03-01 12:00:00\n";

    fn make_dataset(csv: &str) -> Rc<Dataset> {
        let mut dataset = Dataset::new();
        dataset
            .load_reader(csv.as_bytes(), &LoadOptions::default())
            .unwrap();
        Rc::new(dataset)
    }

    #[test]
    fn test_parse_analysis_names() {
        assert_eq!("revenue".parse::<Analysis>(), Ok(Analysis::Revenue));
        assert_eq!(
            "Weight_Freight".parse::<Analysis>(),
            Ok(Analysis::WeightFreight)
        );
        assert!("pie".parse::<Analysis>().is_err());
        for a in Analysis::ALL {
            assert_eq!(a.name().parse::<Analysis>(), Ok(a));
        }
    }

    #[test]
    fn test_every_view_runs_on_full_schema() {
        let dataset = make_dataset(ORDERS);
        let params = AnalysisParams::default();
        for (analysis, result) in run_all(&Analysis::ALL, &dataset, None, &params) {
            assert!(result.is_ok(), "{} failed: {:?}", analysis, result);
        }
    }

    #[test]
    fn test_average_price_view() {
        let dataset = make_dataset(ORDERS);
        let out = run(
            Analysis::AveragePrice,
            &dataset,
            None,
            &AnalysisParams::default(),
        )
        .unwrap();
        match out {
            AnalysisOutput::Ranked(r) => {
                assert_eq!(r.keys().collect::<Vec<_>>(), vec!["books", "toys", "garden"]);
                assert_eq!(r.get("toys"), Some(20.0));
            }
            other => panic!("expected ranked output, got {:?}", other),
        }
    }

    #[test]
    fn test_range_applies_to_every_view() {
        let dataset = make_dataset(ORDERS);
        let params = AnalysisParams {
            range: Some((
                parse_timestamp(b"2018-01-01").unwrap(),
                parse_timestamp(b"2018-01-31 23:59:59").unwrap(),
            )),
            ..AnalysisParams::default()
        };
        match run(Analysis::Revenue, &dataset, None, &params).unwrap() {
            AnalysisOutput::Ranked(r) => {
                // both o1 lines survive: (10 + 30) * 2
                assert_eq!(r.rows.len(), 1);
                assert_eq!(r.get("toys"), Some(80.0));
            }
            other => panic!("expected ranked output, got {:?}", other),
        }
        match run(Analysis::WeightFreight, &dataset, None, &params).unwrap() {
            AnalysisOutput::Scatter(s) => assert_eq!(s.points.len(), 2),
            other => panic!("expected scatter output, got {:?}", other),
        }
    }

    #[test]
    fn test_schema_error_is_per_view() {
        let dataset = make_dataset("order_id,product_category_name,price\no1,toys,10\n");
        let results = run_all(&Analysis::ALL, &dataset, None, &AnalysisParams::default());
        let failed: Vec<Analysis> = results
            .iter()
            .filter(|(_, r)| r.as_ref().is_err_and(|e| e.is_schema_error()))
            .map(|(a, _)| *a)
            .collect();
        assert_eq!(failed, vec![Analysis::TopSellers, Analysis::WeightFreight]);
        assert!(results[0].1.is_ok());
    }

    #[test]
    fn test_custom_group_uses_cache() {
        let dataset = make_dataset(ORDERS);
        let cache = Rc::new(QueryCache::new());
        let spec = GroupSpec {
            dimension: "seller_id".into(),
            measure: "freight_value".into(),
            op: AggregateOp::Sum,
        };
        let params = AnalysisParams::default();
        let first = run_group(&spec, &dataset, Some(&cache), &params).unwrap();
        let second = run_group(&spec, &dataset, Some(&cache), &params).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
        assert_eq!(first.keys().next(), Some("s3"));
    }
}
