use criterion::{Criterion, criterion_group, criterion_main};
use order_insights::{AggregateOp, Dataset, group_and_rank};
use rand::Rng;
use rayon::ThreadPoolBuilder;
use std::io::{BufWriter, Write};
use tempfile::NamedTempFile;

fn write_orders(rows: usize) -> NamedTempFile {
    let tmp = NamedTempFile::new().unwrap();
    let mut w = BufWriter::new(tmp.reopen().unwrap());
    writeln!(w, "order_id,product_category_name,price,shipping_limit_date").unwrap();
    let mut rng = rand::rng();
    for i in 0..rows {
        writeln!(
            w,
            "o{},cat{},{:.2},2018-01-{:02} 00:00:00",
            i,
            rng.random_range(0..40),
            rng.random_range(5.0..500.0f64),
            rng.random_range(1..29)
        )
        .unwrap();
    }
    w.flush().unwrap();
    tmp
}

fn bench_scalability(c: &mut Criterion) {
    let sizes = [100_000usize, 1_000_000];

    for &rows in &sizes {
        let file = write_orders(rows);
        let path = file.path();

        for threads in [1usize, 8] {
            let id = format!("load_rank_{}rows_{}threads", rows, threads);
            let pool = ThreadPoolBuilder::new().num_threads(threads).build().unwrap();
            c.bench_function(&id, |b| {
                pool.install(|| {
                    b.iter(|| {
                        let mut dataset = Dataset::new();
                        dataset.load_csv(path).unwrap();
                        group_and_rank(
                            &dataset,
                            "product_category_name",
                            "price",
                            AggregateOp::Mean,
                            10,
                        )
                        .unwrap()
                    })
                })
            });
        }
    }
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_scalability
}
criterion_main!(benches);
