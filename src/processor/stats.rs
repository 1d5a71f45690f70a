use serde::{Deserialize, Serialize};

use crate::processor::{ProcessorError, dataset::Dataset};

pub const DEFAULT_BINS: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

/// Equal-width histogram of one numeric column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub column: String,
    pub bins: Vec<HistogramBin>,
}

impl Histogram {
    pub fn total(&self) -> usize {
        self.bins.iter().map(|b| b.count).sum()
    }
}

/// Paired non-null values of two numeric columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scatter {
    pub x: String,
    pub y: String,
    pub points: Vec<(f64, f64)>,
    pub correlation: Option<f64>,
}

/// Buckets the non-null values of `column` into `bins` equal-width bins
/// spanning `[min, max]`; the last bin is closed on the right. A column
/// holding a single distinct value is spread over `[v - 0.5, v + 0.5]`.
pub fn histogram(
    dataset: &Dataset,
    column: &str,
    bins: usize,
) -> Result<Histogram, ProcessorError> {
    if bins == 0 {
        return Err(ProcessorError::InvalidArgument(
            "histogram needs at least one bin".into(),
        ));
    }
    let col = dataset.numeric_col(column)?;
    let values: Vec<f64> = (0..dataset.row_count())
        .filter_map(|row| col.f64_at(row))
        .collect();

    if values.is_empty() {
        return Err(ProcessorError::EmptyInput);
    }

    let (mut lo, mut hi) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }

    let width = (hi - lo) / bins as f64;
    let mut counts = vec![0usize; bins];
    for v in values {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }

    Ok(Histogram {
        column: column.to_string(),
        bins: counts
            .into_iter()
            .enumerate()
            .map(|(i, count)| HistogramBin {
                start: lo + width * i as f64,
                end: if i + 1 == bins {
                    hi
                } else {
                    lo + width * (i + 1) as f64
                },
                count,
            })
            .collect(),
    })
}

/// Rows where both `x` and `y` are present, with their Pearson correlation
pub fn scatter(dataset: &Dataset, x: &str, y: &str) -> Result<Scatter, ProcessorError> {
    let xs = dataset.numeric_col(x)?;
    let ys = dataset.numeric_col(y)?;

    let points: Vec<(f64, f64)> = (0..dataset.row_count())
        .filter_map(|row| xs.f64_at(row).zip(ys.f64_at(row)))
        .collect();

    if points.is_empty() {
        return Err(ProcessorError::EmptyInput);
    }

    Ok(Scatter {
        x: x.to_string(),
        y: y.to_string(),
        correlation: pearson(&points),
        points,
    })
}

/// Pearson correlation coefficient; `None` for fewer than two points or zero variance
pub fn pearson(points: &[(f64, f64)]) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let (sum_x, sum_y) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), &(x, y)| (sx + x, sy + y));
    let (mean_x, mean_y) = (sum_x / n, sum_y / n);

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for &(x, y) in points {
        let (dx, dy) = (x - mean_x, y - mean_y);
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::dataset::LoadOptions;

    fn dataset_from_str(csv: &str) -> Dataset {
        let mut dataset = Dataset::new();
        dataset
            .load_reader(csv.as_bytes(), &LoadOptions::default())
            .unwrap();
        dataset
    }

    #[test]
    fn test_histogram_edges_and_counts() {
        let dataset = dataset_from_str("price\n0\n1\n2\n3\n4\n\n10\n");
        let hist = histogram(&dataset, "price", 5).unwrap();
        assert_eq!(hist.bins.len(), 5);
        assert_eq!(hist.bins[0].start, 0.0);
        assert_eq!(hist.bins[4].end, 10.0);
        // width 2: [0,2) [2,4) [4,6) [6,8) [8,10]
        let counts: Vec<usize> = hist.bins.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![2, 2, 1, 0, 1]);
        assert_eq!(hist.total(), 6);
    }

    #[test]
    fn test_histogram_constant_column() {
        let dataset = dataset_from_str("price\n7\n7\n");
        let hist = histogram(&dataset, "price", DEFAULT_BINS).unwrap();
        assert_eq!(hist.bins.len(), DEFAULT_BINS);
        assert_eq!(hist.bins[0].start, 6.5);
        assert_eq!(hist.bins[DEFAULT_BINS - 1].end, 7.5);
        assert_eq!(hist.total(), 2);
    }

    #[test]
    fn test_histogram_errors() {
        let dataset = dataset_from_str("price,name\n,a\n");
        assert!(matches!(
            histogram(&dataset, "name", 10),
            Err(ProcessorError::ColumnType { .. })
        ));
        assert!(matches!(
            histogram(&dataset, "price", 0),
            Err(ProcessorError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_scatter_skips_incomplete_pairs() {
        let dataset = dataset_from_str(
            "product_weight_g,freight_value\n100,10.0\n200,20.0\n,5.0\n300,\n400,40.0\n",
        );
        let s = scatter(&dataset, "product_weight_g", "freight_value").unwrap();
        assert_eq!(s.points, vec![(100.0, 10.0), (200.0, 20.0), (400.0, 40.0)]);
        let r = s.correlation.unwrap();
        assert!((r - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pearson() {
        assert_eq!(pearson(&[(1.0, 2.0)]), None);
        assert_eq!(pearson(&[(1.0, 2.0), (1.0, 3.0)]), None);
        let r = pearson(&[(1.0, 3.0), (2.0, 2.0), (3.0, 1.0)]).unwrap();
        assert!((r + 1.0).abs() < 1e-12);
    }
}
