use crate::utils::sample_csv_path;
use order_insights::{AggregateOp, Dataset, group_and_rank};
mod utils;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = sample_csv_path();

    let mut dataset = Dataset::new();
    dataset.load_csv(path.as_path())?;

    // Average price per category, highest first
    let ranked = group_and_rank(&dataset, "product_category_name", "price", AggregateOp::Mean, 10)?;
    for row in &ranked.rows {
        println!("{:<25} {:>10.2}", row.key, row.value);
    }

    // Line count per seller
    let busiest = group_and_rank(&dataset, "seller_id", "order_id", AggregateOp::Count, 3)?;
    for row in &busiest.rows {
        println!("Seller {} => {} lines", row.key, row.value);
    }

    Ok(())
}
