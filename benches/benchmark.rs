use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use order_insights::{
    AggregateOp, Dataset, LoadOptions, QueryCache, group_and_rank, histogram, rank_revenue,
};
use rand::Rng;
use std::io::{BufWriter, Write};
use std::rc::Rc;
use tempfile::NamedTempFile;

const ROWS: usize = 200_000;
const CATEGORIES: [&str; 8] = [
    "bed_bath_table",
    "health_beauty",
    "sports_leisure",
    "furniture_decor",
    "housewares",
    "watches_gifts",
    "telephony",
    "toys",
];

fn write_orders(rows: usize) -> NamedTempFile {
    let tmp = NamedTempFile::new().unwrap();
    let mut w = BufWriter::new(tmp.reopen().unwrap());
    writeln!(
        w,
        "order_id,seller_id,shipping_limit_date,price,freight_value,product_category_name,product_weight_g"
    )
    .unwrap();
    let mut rng = rand::rng();
    for i in 0..rows {
        writeln!(
            w,
            "o{},s{},2018-{:02}-{:02} 10:00:00,{:.2},{:.2},{},{}",
            i / 2,
            rng.random_range(0..500),
            rng.random_range(1..13),
            rng.random_range(1..29),
            rng.random_range(5.0..500.0f64),
            rng.random_range(3.0..60.0f64),
            CATEGORIES[rng.random_range(0..CATEGORIES.len())],
            rng.random_range(50..30_000)
        )
        .unwrap();
    }
    w.flush().unwrap();
    tmp
}

fn load(path: &std::path::Path) -> Dataset {
    let mut dataset = Dataset::new();
    dataset
        .load_csv_with(path, &LoadOptions::default())
        .unwrap();
    dataset
}

fn pipeline(c: &mut Criterion) {
    let file = write_orders(ROWS);
    let path = file.path();

    let mut group = c.benchmark_group("order-insights");
    group.sample_size(10);
    group.throughput(Throughput::Elements(ROWS as u64));

    group.bench_function("load_csv", |b| b.iter(|| load(path)));

    let dataset = load(path);

    group.bench_function("group_and_rank_mean_price", |b| {
        b.iter(|| {
            group_and_rank(&dataset, "product_category_name", "price", AggregateOp::Mean, 10)
                .unwrap()
        })
    });

    group.bench_function("rank_revenue", |b| {
        b.iter(|| {
            rank_revenue(&dataset, "product_category_name", "price", "order_id", 10).unwrap()
        })
    });

    group.bench_function("top_sellers", |b| {
        b.iter(|| group_and_rank(&dataset, "seller_id", "price", AggregateOp::Sum, 10).unwrap())
    });

    group.bench_function("price_histogram", |b| {
        b.iter(|| histogram(&dataset, "price", 50).unwrap())
    });

    // Same query served from the LRU cache
    let shared = Rc::new(dataset);
    let cache = Rc::new(QueryCache::new());
    group.bench_function("top_sellers_cached", |b| {
        b.iter(|| {
            shared
                .query_with_cache(&cache)
                .group_by("seller_id")
                .aggregate("price", AggregateOp::Sum)
                .execute()
                .unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, pipeline);
criterion_main!(benches);
