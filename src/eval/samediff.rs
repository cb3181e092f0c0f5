use std::fmt;

use anyhow::{ensure, Result};
use log::info;
use serde::Serialize;

use super::distance::{condensed_index, mean_variance_normalise, pdist, Metric};
use crate::data::loader::Embeddings;

/// Same-value indicator for every pair `i < j`, in condensed order.
pub fn matches_array<S: AsRef<str>>(values: &[S]) -> Vec<bool> {
    let n = values.len();
    let mut out = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            out.push(values[i].as_ref() == values[j].as_ref());
        }
    }
    out
}

/// Average precision and precision-recall breakeven of ranking `pos`
/// distances ahead of `neg` distances.
///
/// Distances are ranked ascending with a stable sort over `pos ++ neg`, so
/// ties resolve in favour of positives. AP averages the raw precision at each
/// positive. The breakeven is taken on interpolated precision (the running
/// maximum from the end of the ranking) at the first rank where it is closest
/// to recall. With no positives both scores are 0.
pub fn average_precision(pos: &[f64], neg: &[f64]) -> (f64, f64) {
    let n_pos = pos.len();
    if n_pos == 0 {
        return (0.0, 0.0);
    }

    let mut ranked: Vec<(f64, bool)> = pos
        .iter()
        .map(|&d| (d, true))
        .chain(neg.iter().map(|&d| (d, false)))
        .collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut hits = 0usize;
    let mut ap = 0.0;
    let mut precision = Vec::with_capacity(ranked.len());
    let mut recall = Vec::with_capacity(ranked.len());
    for (rank, &(_, is_match)) in ranked.iter().enumerate() {
        if is_match {
            hits += 1;
        }
        let p = hits as f64 / (rank + 1) as f64;
        if is_match {
            ap += p;
        }
        precision.push(p);
        recall.push(hits as f64 / n_pos as f64);
    }

    for i in (0..precision.len().saturating_sub(1)).rev() {
        precision[i] = precision[i].max(precision[i + 1]);
    }

    let mut best_gap = f64::INFINITY;
    let mut prb = 0.0;
    for (&p, &r) in precision.iter().zip(&recall) {
        let gap = (r - p).abs();
        if gap < best_gap {
            best_gap = gap;
            prb = (p + r) / 2.0;
        }
    }
    (ap / n_pos as f64, prb)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SwdpScores {
    pub sw_ap: f64,
    pub sw_prb: f64,
    /// Scores with same-word-different-speaker pairs as the only positives.
    pub swdp_ap: f64,
    pub swdp_prb: f64,
}

/// Same-word scores, and the same scores ignoring same-speaker pairs.
pub fn average_precision_swdp(sw_sp: &[f64], sw_dp: &[f64], dw: &[f64]) -> SwdpScores {
    let same_word: Vec<f64> = sw_sp.iter().chain(sw_dp).copied().collect();
    let (sw_ap, sw_prb) = average_precision(&same_word, dw);
    let (swdp_ap, swdp_prb) = average_precision(sw_dp, dw);
    SwdpScores {
        sw_ap,
        sw_prb,
        swdp_ap,
        swdp_prb,
    }
}

/// Mean over queries of the AP / breakeven obtained by ranking every other
/// item by distance to the query. Queries without a same-label partner are
/// skipped.
pub fn mean_average_precision<S: AsRef<str>>(distances: &[f64], labels: &[S]) -> (f64, f64) {
    let n = labels.len();
    let mut ap_sum = 0.0;
    let mut prb_sum = 0.0;
    let mut n_queries = 0usize;

    for query in 0..n {
        let mut pos = Vec::new();
        let mut neg = Vec::new();
        for other in (0..n).filter(|&o| o != query) {
            let (i, j) = if query < other { (query, other) } else { (other, query) };
            let d = distances[condensed_index(n, i, j)];
            if labels[query].as_ref() == labels[other].as_ref() {
                pos.push(d);
            } else {
                neg.push(d);
            }
        }
        if pos.is_empty() {
            continue;
        }
        let (ap, prb) = average_precision(&pos, &neg);
        ap_sum += ap;
        prb_sum += prb;
        n_queries += 1;
    }

    if n_queries == 0 {
        return (0.0, 0.0);
    }
    (ap_sum / n_queries as f64, prb_sum / n_queries as f64)
}

// ---------------------------------------------------------------------------
// Full evaluation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct SameDiffOptions {
    pub metric: Metric,
    pub mvn: bool,
    /// Also compute per-query mean average precision. Considerably slower.
    pub mean_ap: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SameDiffReport {
    pub metric: Metric,
    pub n_embeddings: usize,
    pub dim: usize,
    pub n_same_word_pairs: usize,
    pub n_same_speaker_pairs: usize,
    pub scores: SwdpScores,
    /// `(mean AP, mean precision-recall breakeven)` when requested.
    pub mean_ap: Option<(f64, f64)>,
}

impl fmt::Display for SameDiffReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "-".repeat(79);
        writeln!(f, "No. embeddings: {}", self.n_embeddings)?;
        writeln!(f, "Embedding dimensionality: {}", self.dim)?;
        writeln!(f, "Metric: {}", self.metric)?;
        if let Some((mean_ap, mean_prb)) = self.mean_ap {
            writeln!(f, "Mean average precision: {mean_ap:.8}")?;
            writeln!(f, "Mean precision-recall breakeven: {mean_prb:.8}")?;
        }
        writeln!(f, "No. same-word pairs: {}", self.n_same_word_pairs)?;
        writeln!(f, "No. same-speaker pairs: {}", self.n_same_speaker_pairs)?;
        writeln!(f, "{rule}")?;
        writeln!(f, "Average precision: {:.8}", self.scores.sw_ap)?;
        writeln!(f, "Precision-recall breakeven: {:.8}", self.scores.sw_prb)?;
        writeln!(f, "SWDP average precision: {:.8}", self.scores.swdp_ap)?;
        writeln!(f, "SWDP precision-recall breakeven: {:.8}", self.scores.swdp_prb)?;
        write!(f, "{rule}")
    }
}

/// Same-different evaluation of fixed-dimensional embeddings.
pub fn evaluate(embeddings: &Embeddings, options: SameDiffOptions) -> Result<SameDiffReport> {
    ensure!(
        embeddings.len() >= 2,
        "same-different evaluation needs at least two embeddings, got {}",
        embeddings.len()
    );

    let matrix = if options.mvn {
        mean_variance_normalise(&embeddings.matrix)
    } else {
        embeddings.matrix.clone()
    };

    info!("Calculating distances ({})", options.metric);
    let distances = pdist(matrix.view(), options.metric);

    let mean_ap = options.mean_ap.then(|| {
        info!("Calculating mean average precision");
        mean_average_precision(&distances, &embeddings.labels)
    });

    info!("Calculating average precision");
    let word_matches = matches_array(&embeddings.labels);
    let speaker_matches = matches_array(&embeddings.speakers);

    let mut sw_sp = Vec::new();
    let mut sw_dp = Vec::new();
    let mut dw = Vec::new();
    for ((&d, &same_word), &same_speaker) in distances.iter().zip(&word_matches).zip(&speaker_matches) {
        match (same_word, same_speaker) {
            (true, true) => sw_sp.push(d),
            (true, false) => sw_dp.push(d),
            (false, _) => dw.push(d),
        }
    }

    Ok(SameDiffReport {
        metric: options.metric,
        n_embeddings: embeddings.len(),
        dim: embeddings.dim(),
        n_same_word_pairs: sw_sp.len() + sw_dp.len(),
        n_same_speaker_pairs: speaker_matches.iter().filter(|&&m| m).count(),
        scores: average_precision_swdp(&sw_sp, &sw_dp, &dw),
        mean_ap,
    })
}
