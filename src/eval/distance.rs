use std::fmt;

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Pairwise distance between two embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Cosine,
    Euclidean,
    /// Fraction of differing components.
    Hamming,
    Chebyshev,
    /// Relative entropy of the two vectors normalised to sum to one.
    Kl,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Cosine => "cosine",
            Metric::Euclidean => "euclidean",
            Metric::Hamming => "hamming",
            Metric::Chebyshev => "chebyshev",
            Metric::Kl => "kl",
        };
        write!(f, "{name}")
    }
}

impl Metric {
    pub fn distance(&self, u: ArrayView1<f32>, v: ArrayView1<f32>) -> f64 {
        let pairs = u.iter().zip(v.iter()).map(|(&a, &b)| (a as f64, b as f64));
        match self {
            Metric::Cosine => {
                let (mut dot, mut nu, mut nv) = (0.0, 0.0, 0.0);
                for (a, b) in pairs {
                    dot += a * b;
                    nu += a * a;
                    nv += b * b;
                }
                1.0 - dot / (nu.sqrt() * nv.sqrt())
            }
            Metric::Euclidean => pairs.map(|(a, b)| (a - b).powi(2)).sum::<f64>().sqrt(),
            Metric::Hamming => {
                let n = u.len();
                if n == 0 {
                    return 0.0;
                }
                pairs.filter(|(a, b)| a != b).count() as f64 / n as f64
            }
            Metric::Chebyshev => pairs.map(|(a, b)| (a - b).abs()).fold(0.0, f64::max),
            Metric::Kl => {
                let su: f64 = u.iter().map(|&a| a as f64).sum();
                let sv: f64 = v.iter().map(|&b| b as f64).sum();
                pairs
                    .map(|(a, b)| {
                        let (p, q) = (a / su, b / sv);
                        if p == 0.0 {
                            0.0
                        } else {
                            p * (p / q).ln()
                        }
                    })
                    .sum()
            }
        }
    }
}

/// Condensed pairwise distances: `d(0,1), d(0,2), …, d(0,n-1), d(1,2), …`.
pub fn pdist(matrix: ArrayView2<f32>, metric: Metric) -> Vec<f64> {
    let n = matrix.nrows();
    let mut out = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            out.push(metric.distance(matrix.row(i), matrix.row(j)));
        }
    }
    out
}

/// Index of pair `(i, j)`, `i < j`, in a condensed vector over `n` items.
pub fn condensed_index(n: usize, i: usize, j: usize) -> usize {
    debug_assert!(i < j && j < n);
    n * i - i * (i + 1) / 2 + (j - i - 1)
}

/// Per-column mean and variance normalisation.
///
/// Columns with zero variance are only centred.
pub fn mean_variance_normalise(matrix: &Array2<f32>) -> Array2<f32> {
    let Some(mean) = matrix.mean_axis(Axis(0)) else {
        return matrix.clone();
    };
    let std = matrix
        .std_axis(Axis(0), 0.0)
        .mapv(|s| if s > 0.0 { s } else { 1.0 });
    (matrix - &mean) / &std
}
