//! Grouped aggregation and top-N ranking.
//!
//! Every chart of the dashboard is one call into this module with a different
//! (dimension, measure, op) triple; revenue is the only derived measure.

use indexmap::IndexMap;
use std::borrow::Cow;
use std::collections::HashMap;
use tracing::debug;

use crate::processor::{
    AggregateOp, AggregationResult, ProcessorError, RankedRow, column::Column, dataset::Dataset,
};

pub const DEFAULT_TOP_N: usize = 10;
pub const ORDER_COUNT_COL: &str = "order_count";
pub const REVENUE_COL: &str = "revenue";

/// Running state of one dimension value
#[derive(Debug, Default)]
struct Partition {
    rows: usize,
    non_null: usize,
    sum: f64,
}

impl Partition {
    fn finish(&self, op: AggregateOp) -> f64 {
        match op {
            AggregateOp::Mean => self.sum / self.non_null as f64,
            AggregateOp::Sum => self.sum,
            AggregateOp::Count => self.rows as f64,
        }
    }
}

/// Partitions `dataset` by `dimension_col`, reduces `measure_col` with `op`
/// in each partition and returns the `top_n` largest results, descending.
///
/// Ties keep the order in which their dimension values first appear. Rows
/// with a null dimension belong to no partition, and partitions whose
/// measure is null on every row are left out.
///
/// # Errors
/// - [`ProcessorError::MissingColumn`] if either column is absent
/// - [`ProcessorError::ColumnType`] if `op` needs a numeric measure and it is not
/// - [`ProcessorError::EmptyInput`] if the dataset has no rows
/// - [`ProcessorError::InvalidArgument`] if `top_n` is zero
///
/// # Example
/// ```rust
/// # use order_insights::{AggregateOp, Dataset, LoadOptions, group_and_rank};
/// let mut dataset = Dataset::new();
/// let csv: &[u8] = b"category,price\nA,10\nA,30\nB,20\n";
/// dataset.load_reader(csv, &LoadOptions::default()).unwrap();
///
/// let top = group_and_rank(&dataset, "category", "price", AggregateOp::Mean, 10).unwrap();
/// assert_eq!(top.keys().collect::<Vec<_>>(), vec!["A", "B"]);
/// ```
pub fn group_and_rank(
    dataset: &Dataset,
    dimension_col: &str,
    measure_col: &str,
    op: AggregateOp,
    top_n: usize,
) -> Result<AggregationResult, ProcessorError> {
    if top_n == 0 {
        return Err(ProcessorError::InvalidArgument(
            "top_n must be at least 1".into(),
        ));
    }

    let dim = dataset.get_col(dimension_col)?;
    let measure = match op {
        AggregateOp::Count => dataset.get_col(measure_col)?,
        AggregateOp::Mean | AggregateOp::Sum => dataset.numeric_col(measure_col)?,
    };

    if dataset.is_empty() {
        return Err(ProcessorError::EmptyInput);
    }

    // IndexMap keeps first-appearance order for the stable sort below
    let mut partitions: IndexMap<Cow<'_, str>, Partition> = IndexMap::new();
    for row in 0..dataset.row_count() {
        let Some(key) = dataset.key_at(dim, row) else {
            continue;
        };
        let part = partitions.entry(key).or_default();
        part.rows += 1;

        match op {
            AggregateOp::Count => {
                if !measure.is_null(row) {
                    part.non_null += 1;
                }
            }
            AggregateOp::Mean | AggregateOp::Sum => {
                if let Some(v) = measure.f64_at(row) {
                    part.sum += v;
                    part.non_null += 1;
                }
            }
        }
    }

    let groups = partitions.len();
    let mut rows: Vec<RankedRow> = partitions
        .into_iter()
        .filter(|(_, part)| part.non_null > 0)
        .map(|(key, part)| RankedRow {
            key: key.into_owned(),
            value: part.finish(op),
        })
        .collect();

    // sort_by is stable
    rows.sort_by(|a, b| b.value.total_cmp(&a.value));
    rows.truncate(top_n);

    debug!(
        dimension = dimension_col,
        measure = measure_col,
        %op,
        groups,
        kept = rows.len(),
        "group_and_rank"
    );

    Ok(AggregationResult {
        dimension: dimension_col.to_string(),
        measure: measure_col.to_string(),
        op,
        rows,
    })
}

/// Adds `order_count` (rows sharing the record's order id) and
/// `revenue = price * order_count` to every record.
///
/// This is the line-count weighted price used by the revenue chart, not an
/// order total. A null price or order id gives a null revenue.
pub fn compute_revenue(
    dataset: &Dataset,
    price_col: &str,
    order_id_col: &str,
) -> Result<Dataset, ProcessorError> {
    let price = dataset.numeric_col(price_col)?;
    let order = dataset.get_col(order_id_col)?;

    let keys: Vec<Option<Cow<'_, str>>> = (0..dataset.row_count())
        .map(|row| dataset.key_at(order, row))
        .collect();

    let mut counts: HashMap<&str, i64> = HashMap::new();
    for key in keys.iter().flatten() {
        *counts.entry(&**key).or_default() += 1;
    }

    let order_count: Vec<Option<i64>> = keys
        .iter()
        .map(|key| key.as_ref().map(|k| counts[&**k]))
        .collect();

    let revenue: Vec<Option<f64>> = order_count
        .iter()
        .enumerate()
        .map(|(row, count)| {
            price
                .f64_at(row)
                .zip(*count)
                .map(|(p, c)| p * c as f64)
        })
        .collect();

    debug!(orders = counts.len(), rows = keys.len(), "computed revenue");

    dataset
        .with_column(ORDER_COUNT_COL, Column::Int64(order_count))?
        .with_column(REVENUE_COL, Column::Float64(revenue))
}

/// Revenue per dimension value: [`compute_revenue`] then a summed [`group_and_rank`].
pub fn rank_revenue(
    dataset: &Dataset,
    dimension_col: &str,
    price_col: &str,
    order_id_col: &str,
    top_n: usize,
) -> Result<AggregationResult, ProcessorError> {
    let with_revenue = compute_revenue(dataset, price_col, order_id_col)?;
    group_and_rank(&with_revenue, dimension_col, REVENUE_COL, AggregateOp::Sum, top_n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::dataset::{LoadOptions, parse_timestamp};

    fn dataset_from_str(csv: &str) -> Dataset {
        let mut dataset = Dataset::new();
        dataset
            .load_reader(csv.as_bytes(), &LoadOptions::default())
            .unwrap();
        dataset
    }

    fn pairs(result: &AggregationResult) -> Vec<(&str, f64)> {
        result
            .rows
            .iter()
            .map(|r| (r.key.as_str(), r.value))
            .collect()
    }

    const ORDERS: &str = "order_id,product_category_name,price,seller_id\n\
                          o1,toys,10,s1\n\
                          o1,toys,30,s2\n\
                          o2,garden,20,s1\n\
                          o3,toys,5,s3\n\
                          o3,books,50,s3\n\
                          o3,books,,s3\n\
                          o4,,100,s2\n\
                          o5,auto,,s1\n";

    #[test]
    fn test_mean_tie_keeps_first_appearance() {
        let dataset = dataset_from_str("category,price\nA,10\nA,30\nB,20\n");
        let result = group_and_rank(&dataset, "category", "price", AggregateOp::Mean, 10).unwrap();
        assert_eq!(pairs(&result), vec![("A", 20.0), ("B", 20.0)]);
        assert_eq!(result.dimension, "category");
        assert_eq!(result.measure, "price");
    }

    #[test]
    fn test_tie_order_follows_input_not_key() {
        let dataset = dataset_from_str("category,price\nB,20\nA,10\nA,30\n");
        let result = group_and_rank(&dataset, "category", "price", AggregateOp::Mean, 10).unwrap();
        assert_eq!(pairs(&result), vec![("B", 20.0), ("A", 20.0)]);
    }

    #[test]
    fn test_mean_ignores_nulls_and_drops_all_null_partitions() {
        let dataset = dataset_from_str(ORDERS);
        let result = group_and_rank(
            &dataset,
            "product_category_name",
            "price",
            AggregateOp::Mean,
            10,
        )
        .unwrap();
        // books: only 50 is non-null; auto: every price null; o4 has no category
        assert_eq!(
            pairs(&result),
            vec![("books", 50.0), ("garden", 20.0), ("toys", 15.0)]
        );
    }

    #[test]
    fn test_sum_and_count() {
        let dataset = dataset_from_str(ORDERS);
        let sums = group_and_rank(
            &dataset,
            "product_category_name",
            "price",
            AggregateOp::Sum,
            10,
        )
        .unwrap();
        assert_eq!(
            pairs(&sums),
            vec![("books", 50.0), ("toys", 45.0), ("garden", 20.0)]
        );

        let counts = group_and_rank(
            &dataset,
            "product_category_name",
            "order_id",
            AggregateOp::Count,
            10,
        )
        .unwrap();
        assert_eq!(
            pairs(&counts),
            vec![("toys", 3.0), ("books", 2.0), ("garden", 1.0), ("auto", 1.0)]
        );
    }

    #[test]
    fn test_top_n_truncates_and_sorts_descending() {
        let dataset = dataset_from_str(ORDERS);
        let result =
            group_and_rank(&dataset, "seller_id", "price", AggregateOp::Sum, 2).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(pairs(&result), vec![("s2", 130.0), ("s3", 55.0)]);
    }

    #[test]
    fn test_result_invariants_hold() {
        let dataset = dataset_from_str(ORDERS);
        for op in [AggregateOp::Mean, AggregateOp::Sum, AggregateOp::Count] {
            for top_n in 1..6 {
                let result = group_and_rank(&dataset, "seller_id", "price", op, top_n).unwrap();
                assert!(result.len() <= top_n);
                for pair in result.rows.windows(2) {
                    assert!(pair[0].value >= pair[1].value);
                }
                let mut keys: Vec<&str> = result.keys().collect();
                keys.sort_unstable();
                keys.dedup();
                assert_eq!(keys.len(), result.len());

                let again = group_and_rank(&dataset, "seller_id", "price", op, top_n).unwrap();
                assert_eq!(result, again);
            }
        }
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let dataset = dataset_from_str(ORDERS);
        let err = group_and_rank(&dataset, "nonexistent_col", "price", AggregateOp::Mean, 10)
            .unwrap_err();
        assert!(matches!(err, ProcessorError::MissingColumn(ref c) if c == "nonexistent_col"));

        let err = group_and_rank(
            &dataset,
            "product_category_name",
            "nonexistent_col",
            AggregateOp::Sum,
            10,
        )
        .unwrap_err();
        assert!(err.is_schema_error());
    }

    #[test]
    fn test_mean_of_string_column_is_rejected() {
        let dataset = dataset_from_str(ORDERS);
        let err = group_and_rank(
            &dataset,
            "product_category_name",
            "seller_id",
            AggregateOp::Mean,
            10,
        )
        .unwrap_err();
        assert!(matches!(err, ProcessorError::ColumnType { .. }));
    }

    #[test]
    fn test_empty_after_filtering() {
        let dataset = dataset_from_str(
            "shipping_limit_date,category,price\n2018-01-01 10:00:00,A,1\n",
        );
        let start = parse_timestamp(b"2019-01-01").unwrap();
        let end = parse_timestamp(b"2019-12-31").unwrap();
        let filtered = dataset
            .filter_date_range("shipping_limit_date", start, end)
            .unwrap();
        let err = group_and_rank(&filtered, "category", "price", AggregateOp::Mean, 10)
            .unwrap_err();
        assert!(matches!(err, ProcessorError::EmptyInput));
    }

    #[test]
    fn test_zero_top_n_is_rejected() {
        let dataset = dataset_from_str(ORDERS);
        assert!(matches!(
            group_and_rank(&dataset, "seller_id", "price", AggregateOp::Sum, 0),
            Err(ProcessorError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_revenue_is_price_times_order_line_count() {
        let dataset = dataset_from_str(ORDERS);
        let with_revenue = compute_revenue(&dataset, "price", "order_id").unwrap();
        let price = with_revenue.get_col("price").unwrap();
        let counts = with_revenue.get_col(ORDER_COUNT_COL).unwrap();
        let revenue = with_revenue.get_col(REVENUE_COL).unwrap();

        let expected_counts = [2.0, 2.0, 1.0, 3.0, 3.0, 3.0, 1.0, 1.0];
        for (row, expected) in expected_counts.iter().enumerate() {
            assert_eq!(counts.f64_at(row), Some(*expected));
            assert_eq!(
                revenue.f64_at(row),
                price.f64_at(row).map(|p| p * expected)
            );
        }
    }

    #[test]
    fn test_revenue_counts_within_filtered_rows() {
        let dataset = dataset_from_str(
            "order_id,shipping_limit_date,price\n\
             o1,2018-01-01 00:00:00,10\n\
             o1,2018-06-01 00:00:00,10\n",
        );
        let start = parse_timestamp(b"2018-01-01").unwrap();
        let end = parse_timestamp(b"2018-01-31").unwrap();
        let filtered = dataset
            .filter_date_range("shipping_limit_date", start, end)
            .unwrap();
        let with_revenue = compute_revenue(&filtered, "price", "order_id").unwrap();
        assert_eq!(with_revenue.get_col(REVENUE_COL).unwrap().f64_at(0), Some(10.0));
    }

    #[test]
    fn test_rank_revenue() {
        let dataset = dataset_from_str(ORDERS);
        let result =
            rank_revenue(&dataset, "product_category_name", "price", "order_id", 10).unwrap();
        // toys: 10*2 + 30*2 + 5*3 = 95; books: 50*3 = 150; garden: 20
        assert_eq!(
            pairs(&result),
            vec![("books", 150.0), ("toys", 95.0), ("garden", 20.0)]
        );
        assert_eq!(result.measure, REVENUE_COL);
        assert_eq!(result.op, AggregateOp::Sum);
    }
}
