use chrono::NaiveDateTime;
use lru::LruCache;
use tracing::trace;

use crate::processor::dataset::Dataset;
use crate::processor::pipeline::{DEFAULT_TOP_N, compute_revenue, group_and_rank};
use crate::processor::{AggregateOp, AggregationResult, FilterPredicate, ProcessorError};
use std::borrow::Cow;
use std::cell::RefCell;
use std::num::NonZeroUsize;
use std::rc::Rc;

const DEFAULT_CACHE_CAPACITY: usize = 128;

/// Everything that determines the result of a query
#[derive(Debug, Hash, Eq, PartialEq, Clone)]
pub struct QueryKey {
    filters: Vec<(String, FilterPredicate)>,
    range: Option<(String, NaiveDateTime, NaiveDateTime)>,
    revenue: Option<(String, String)>,
    group_col: String,
    agg_col: String,
    op: AggregateOp,
    limit: usize,
}

/// Session-local memo of ranked results
#[derive(Debug)]
pub struct QueryCache {
    cache: RefCell<LruCache<QueryKey, AggregationResult>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// A zero capacity is bumped to one entry
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: RefCell::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &QueryKey) -> Option<AggregationResult> {
        self.cache.borrow_mut().get(key).cloned()
    }

    pub fn put(&self, key: QueryKey, value: AggregationResult) {
        self.cache.borrow_mut().put(key, value);
    }

    pub fn len(&self) -> usize {
        self.cache.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Fluent filter → derive → group → rank query over a shared dataset
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    dataset: Rc<Dataset>,
    cache: Option<Rc<QueryCache>>,
    filters: Vec<(String, FilterPredicate)>,
    range: Option<(String, NaiveDateTime, NaiveDateTime)>,
    revenue: Option<(String, String)>,
    group_by_column: Option<String>,
    aggregation: Option<(String, AggregateOp)>,
    limit: usize,
}

impl QueryBuilder {
    pub fn new(dataset: Rc<Dataset>, cache: Option<Rc<QueryCache>>) -> Self {
        Self {
            dataset,
            cache,
            filters: Vec::new(),
            range: None,
            revenue: None,
            group_by_column: None,
            aggregation: None,
            limit: DEFAULT_TOP_N,
        }
    }

    /// Add a filter condition
    pub fn filter(mut self, column: &str, predicate: FilterPredicate) -> Self {
        self.filters.push((column.to_string(), predicate));
        self
    }

    /// Keep rows whose timestamp in `column` lies in `[start, end]`
    pub fn between(mut self, column: &str, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        self.range = Some((column.to_string(), start, end));
        self
    }

    /// Derive `order_count` and `revenue` columns before grouping
    pub fn revenue(mut self, price_col: &str, order_id_col: &str) -> Self {
        self.revenue = Some((price_col.to_string(), order_id_col.to_string()));
        self
    }

    /// Set the dimension column
    pub fn group_by(mut self, column: &str) -> Self {
        self.group_by_column = Some(column.to_string());
        self
    }

    /// Set the measure column and how it is reduced
    pub fn aggregate(mut self, column: &str, op: AggregateOp) -> Self {
        self.aggregation = Some((column.to_string(), op));
        self
    }

    /// Limit number of results
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = n;
        self
    }

    fn key(&self) -> Result<QueryKey, ProcessorError> {
        match (&self.group_by_column, &self.aggregation) {
            (Some(group_col), Some((agg_col, op))) => Ok(QueryKey {
                filters: self.filters.clone(),
                range: self.range.clone(),
                revenue: self.revenue.clone(),
                group_col: group_col.clone(),
                agg_col: agg_col.clone(),
                op: *op,
                limit: self.limit,
            }),
            _ => Err(ProcessorError::InvalidArgument(
                "Invalid query combination: need group_by and aggregate".into(),
            )),
        }
    }

    /// Execute the query, serving it from the cache when possible
    pub fn execute(self) -> Result<AggregationResult, ProcessorError> {
        let key = self.key()?;

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&key) {
                trace!(group = %key.group_col, measure = %key.agg_col, "query cache hit");
                return Ok(hit);
            }
        }

        let result = self.run(&key)?;

        if let Some(cache) = &self.cache {
            cache.put(key, result.clone());
        }
        Ok(result)
    }

    fn run(&self, key: &QueryKey) -> Result<AggregationResult, ProcessorError> {
        let mut view: Cow<'_, Dataset> = match self.apply_filters()? {
            Some(rows) => Cow::Owned(self.dataset.take(&rows)),
            None => Cow::Borrowed(self.dataset.as_ref()),
        };

        if let Some((column, start, end)) = &key.range {
            view = Cow::Owned(view.filter_date_range(column, *start, *end)?);
        }

        if let Some((price_col, order_id_col)) = &key.revenue {
            view = Cow::Owned(compute_revenue(&view, price_col, order_id_col)?);
        }

        group_and_rank(&view, &key.group_col, &key.agg_col, key.op, key.limit)
    }

    /// Apply all filters and return filtered row indices
    fn apply_filters(&self) -> Result<Option<Vec<usize>>, ProcessorError> {
        let mut filtered_rows: Option<Vec<usize>> = None;

        for (column, predicate) in &self.filters {
            let current_filter = self.dataset.filter(column, predicate)?;

            filtered_rows = Some(match filtered_rows {
                None => current_filter,
                Some(existing) => intersect_sorted_vecs(existing, current_filter),
            });
        }

        Ok(filtered_rows)
    }
}

/// Helper function to intersect ascending vectors
fn intersect_sorted_vecs(a: Vec<usize>, b: Vec<usize>) -> Vec<usize> {
    let mut result = Vec::with_capacity(a.len().min(b.len()));
    let mut i = 0;
    let mut j = 0;

    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Equal => {
                result.push(a[i]);
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
        }
    }

    result
}

impl Dataset {
    pub fn query(self: &Rc<Self>) -> QueryBuilder {
        QueryBuilder::new(Rc::clone(self), None)
    }

    pub fn query_with_cache(self: &Rc<Self>, cache: &Rc<QueryCache>) -> QueryBuilder {
        QueryBuilder::new(Rc::clone(self), Some(Rc::clone(cache)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::Value;
    use crate::processor::dataset::{LoadOptions, parse_timestamp};
    use crate::processor::pipeline::{REVENUE_COL, rank_revenue};

    const ORDERS: &str = "order_id,product_category_name,price,shipping_limit_date\n\
                          o1,toys,10,2018-01-05 10:00:00\n\
                          o1,toys,30,2018-01-05 10:00:00\n\
                          o2,garden,20,2018-02-10 08:30:00\n\
                          o3,books,50,2018-03-01 12:00:00\n\
                          o3,toys,5,2018-03-01 12:00:00\n";

    fn make_dataset() -> Rc<Dataset> {
        let mut dataset = Dataset::new();
        dataset
            .load_reader(ORDERS.as_bytes(), &LoadOptions::default())
            .unwrap();
        Rc::new(dataset)
    }

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s.as_bytes()).unwrap()
    }

    #[test]
    fn test_cached_matches_uncached() {
        let dataset = make_dataset();
        let cache = Rc::new(QueryCache::new());

        let uncached = dataset
            .query()
            .group_by("product_category_name")
            .aggregate("price", AggregateOp::Mean)
            .execute()
            .unwrap();
        let first = dataset
            .query_with_cache(&cache)
            .group_by("product_category_name")
            .aggregate("price", AggregateOp::Mean)
            .execute()
            .unwrap();
        let second = dataset
            .query_with_cache(&cache)
            .group_by("product_category_name")
            .aggregate("price", AggregateOp::Mean)
            .execute()
            .unwrap(); // from cache

        assert_eq!(uncached, first);
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_between_then_group() {
        let dataset = make_dataset();
        let result = dataset
            .query()
            .between(
                "shipping_limit_date",
                ts("2018-01-01 00:00:00"),
                ts("2018-02-28 23:59:59"),
            )
            .group_by("product_category_name")
            .aggregate("price", AggregateOp::Sum)
            .execute()
            .unwrap();
        assert_eq!(result.keys().collect::<Vec<_>>(), vec!["toys", "garden"]);
        assert_eq!(result.get("toys"), Some(40.0));
    }

    #[test]
    fn test_revenue_through_builder_matches_pipeline() {
        let dataset = make_dataset();
        let built = dataset
            .query()
            .revenue("price", "order_id")
            .group_by("product_category_name")
            .aggregate(REVENUE_COL, AggregateOp::Sum)
            .limit(2)
            .execute()
            .unwrap();
        let direct = rank_revenue(&dataset, "product_category_name", "price", "order_id", 2)
            .unwrap();
        assert_eq!(built, direct);
    }

    #[test]
    fn test_filters_intersect() {
        let dataset = make_dataset();
        let result = dataset
            .query()
            .filter("price", FilterPredicate::GreaterThan(Value::Int(5)))
            .filter(
                "product_category_name",
                FilterPredicate::Equals(Value::Str("toys".into())),
            )
            .group_by("order_id")
            .aggregate("price", AggregateOp::Count)
            .execute()
            .unwrap();
        assert_eq!(result.keys().collect::<Vec<_>>(), vec!["o1"]);
        assert_eq!(result.get("o1"), Some(2.0));
    }

    #[test]
    fn test_incomplete_query_is_rejected() {
        let dataset = make_dataset();
        assert!(matches!(
            dataset.query().group_by("order_id").execute(),
            Err(ProcessorError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_errors_are_not_cached() {
        let dataset = make_dataset();
        let cache = Rc::new(QueryCache::with_capacity(4));
        let err = dataset
            .query_with_cache(&cache)
            .group_by("missing")
            .aggregate("price", AggregateOp::Sum)
            .execute()
            .unwrap_err();
        assert!(err.is_schema_error());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_intersect_sorted_vecs() {
        assert_eq!(
            intersect_sorted_vecs(vec![1, 3, 5, 7], vec![2, 3, 4, 7]),
            vec![3, 7]
        );
    }
}
