//! Writes a synthetic order-lines CSV.
//!
//! Usage: data_generator [ROWS] [PATH]

use chrono::{Duration, NaiveDate};
use rand::Rng;
use std::fs::File;
use std::io::{BufWriter, Write};

const CATEGORIES: [&str; 12] = [
    "bed_bath_table",
    "health_beauty",
    "sports_leisure",
    "furniture_decor",
    "computers_accessories",
    "housewares",
    "watches_gifts",
    "telephony",
    "garden_tools",
    "auto",
    "toys",
    "cool_stuff",
];

fn main() -> std::io::Result<()> {
    let mut argv = std::env::args().skip(1);
    let rows: usize = argv
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1_000_000);
    let path = argv.next().unwrap_or_else(|| "data/orders.csv".to_string());

    if let Some(dir) = std::path::Path::new(&path).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    let mut writer = BufWriter::new(File::create(&path)?);

    writeln!(
        writer,
        "order_id,order_item_id,product_id,seller_id,shipping_limit_date,price,freight_value,product_category_name,product_weight_g"
    )?;

    let epoch = NaiveDate::from_ymd_opt(2017, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default();
    let sellers = (rows / 50).max(10);
    let products = (rows / 10).max(10);

    let mut rng = rand::rng();
    let mut order = 0usize;
    let mut written = 0usize;
    while written < rows {
        // most orders have one line, some up to four
        let lines = match rng.random_range(0..100) {
            0..=84 => 1,
            85..=94 => 2,
            95..=98 => 3,
            _ => 4,
        };
        let shipped = epoch + Duration::seconds(rng.random_range(0..(2 * 365 * 24 * 3600)));
        for item in 1..=lines {
            if written == rows {
                break;
            }
            let category = CATEGORIES[rng.random_range(0..CATEGORIES.len())];
            let price = rng.random_range(5.0..500.0f64);
            let weight = rng.random_range(50..30_000);
            let freight = 5.0 + weight as f64 / 1000.0 * rng.random_range(0.8..1.6f64);
            // a few gaps, like real exports
            let category = if rng.random_bool(0.01) { "" } else { category };
            let weight = if rng.random_bool(0.005) {
                String::new()
            } else {
                weight.to_string()
            };
            writeln!(
                writer,
                "ord{:08},{},prod{:06},sel{:05},{},{:.2},{:.2},{},{}",
                order,
                item,
                rng.random_range(0..products),
                rng.random_range(0..sellers),
                shipped.format("%Y-%m-%d %H:%M:%S"),
                price,
                freight,
                category,
                weight
            )?;
            written += 1;
        }
        order += 1;
    }
    writer.flush()?;

    println!("Sample CSV generated: {} ({} rows)", path, rows);
    Ok(())
}
