use std::rc::Rc;
use std::time::Instant;

use crate::utils::sample_csv_path;
use order_insights::{AggregateOp, Dataset, QueryCache};
mod utils;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = sample_csv_path();
    let mut dataset = Dataset::new();
    let cache = Rc::new(QueryCache::new());
    dataset.load_csv(path.as_path())?;
    let dataset = Rc::new(dataset);

    // First run (grouping + ranking)
    let start = Instant::now();
    let result = dataset
        .query_with_cache(&cache)
        .group_by("seller_id")
        .aggregate("price", AggregateOp::Sum)
        .limit(5)
        .execute()?;
    println!(
        "First run: {:?}, elapsed: {:?}",
        result.rows,
        start.elapsed()
    );

    // Second run (should be cached)
    let start = Instant::now();
    let cached = dataset
        .query_with_cache(&cache)
        .group_by("seller_id")
        .aggregate("price", AggregateOp::Sum)
        .limit(5)
        .execute()?;
    println!(
        "Cached run: {:?}, elapsed: {:?}",
        cached.rows,
        start.elapsed()
    );

    Ok(())
}
