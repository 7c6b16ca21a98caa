use std::fmt::Display;

use average::{self, concatenate, Estimate, Mean, Variance};

use readable::num::*;

concatenate!(AggStats, [Mean, mean], [Variance, sample_variance]);

pub fn aggregate_measurements<'a>(measurements: impl Iterator<Item = &'a f64>) -> Stats {
    let s: AggStats = measurements.collect();
    let len = s.mean.len() as usize;
    // The sample variance of a single value is undefined
    let stddev = if len < 2 {
        0.0
    } else {
        s.sample_variance().sqrt()
    };
    Stats {
        mean: s.mean(),
        stddev,
        len,
    }
}

#[derive(Debug)]
pub struct Stats {
    pub mean: f64,
    pub stddev: f64,
    pub len: usize,
}

impl Display for Stats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "μ: {} σ: {} n: {}",
            Float::from(self.mean),
            Float::from(self.stddev),
            Unsigned::from(self.len),
        )
    }
}

/// Pearson product-moment correlation of two equally long series.
///
/// Returns NaN if the lengths differ, if there are fewer than two pairs, or if
/// either series has zero variance.
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.len() < 2 {
        return f64::NAN;
    }

    let variance_a: Variance = a.iter().collect();
    let variance_b: Variance = b.iter().collect();
    if variance_a.population_variance() == 0.0 || variance_b.population_variance() == 0.0 {
        return f64::NAN;
    }

    let mean_a: Mean = a.iter().collect();
    let mean_b: Mean = b.iter().collect();
    let (mean_a, mean_b) = (mean_a.mean(), mean_b.mean());

    let (sum_ab, sum_aa, sum_bb) = a.iter().zip(b).fold(
        (0.0, 0.0, 0.0),
        |(sum_ab, sum_aa, sum_bb), (x, y)| {
            let (dx, dy) = (x - mean_a, y - mean_b);
            (sum_ab + dx * dy, sum_aa + dx * dx, sum_bb + dy * dy)
        },
    );

    (sum_ab / (sum_aa * sum_bb).sqrt()).clamp(-1.0, 1.0)
}
