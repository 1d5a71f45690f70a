use crate::utils::sample_csv_path;
use order_insights::{Dataset, compute_revenue, parse_timestamp, rank_revenue};
mod utils;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = sample_csv_path();

    let mut dataset = Dataset::new();
    dataset.load_csv(path.as_path())?;

    let with_revenue = compute_revenue(&dataset, "price", "order_id")?;
    println!("columns: {:?}", with_revenue.headers());

    let ranked = rank_revenue(&dataset, "product_category_name", "price", "order_id", 5)?;
    println!("All dates:");
    for row in &ranked.rows {
        println!("  {:<25} {:>10.2}", row.key, row.value);
    }

    // Same ranking restricted to the first quarter of 2018
    let start = parse_timestamp(b"2018-01-01").ok_or("bad start date")?;
    let end = parse_timestamp(b"2018-03-31 23:59:59").ok_or("bad end date")?;
    let q1 = dataset.filter_date_range("shipping_limit_date", start, end)?;
    match rank_revenue(&q1, "product_category_name", "price", "order_id", 5) {
        Ok(ranked) => {
            println!("Q1 2018:");
            for row in &ranked.rows {
                println!("  {:<25} {:>10.2}", row.key, row.value);
            }
        }
        Err(e) => println!("Q1 2018: {}", e),
    }

    Ok(())
}
