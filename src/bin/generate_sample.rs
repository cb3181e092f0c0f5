use std::fs::File;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float32Builder, ListBuilder, StringArray};
use arrow::record_batch::RecordBatch;
use ndarray::{Array1, Array2, Axis};
use ndarray_npy::NpzWriter;
use parquet::arrow::ArrowWriter;

const D_FRAME: usize = 13;

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn range(&mut self, lo: usize, hi: usize) -> usize {
        lo + (self.next_u64() % (hi - lo) as u64) as usize
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// MFCC-like frames drifting around a per-word template.
fn generate_segment(template: &[f64], n_frames: usize, rng: &mut SimpleRng) -> Array2<f32> {
    Array2::from_shape_fn((n_frames, D_FRAME), |(t, d)| {
        let drift = (t as f64 / n_frames as f64 * std::f64::consts::PI).sin();
        (template[d] * (0.5 + drift) + rng.gauss(0.0, 0.1)) as f32
    })
}

fn main() -> Result<()> {
    let mut rng = SimpleRng::new(42);

    let words = ["apple", "banana", "cherry", "grape", "lemon", "melon"];
    let speakers = ["s01", "s02", "s03"];
    // Rare words exercise the label-frequency filter.
    let tokens_per_word = [6, 5, 4, 3, 2, 1];

    let mut segments: Vec<(String, Array2<f32>)> = Vec::new();
    let mut utt = 0usize;
    for (word, &n_tokens) in words.iter().zip(&tokens_per_word) {
        let template: Vec<f64> = (0..D_FRAME).map(|_| rng.gauss(0.0, 1.0)).collect();
        for token in 0..n_tokens {
            let speaker = speakers[token % speakers.len()];
            let n_frames = rng.range(20, 140);
            let key = format!("{word}_{speaker}_utt{utt:04}_{n_frames:03}");
            segments.push((key, generate_segment(&template, n_frames, &mut rng)));
            utt += 1;
        }
    }

    // Feature archive (.npz)
    let npz_path = "sample_features.npz";
    let mut npz = NpzWriter::new(File::create(npz_path).context("creating npz")?);
    for (key, frames) in &segments {
        npz.add_array(key.as_str(), frames)?;
    }
    npz.finish()?;

    // Same archive as Parquet: key + List<List<Float32>>
    let mut frames_builder = ListBuilder::new(ListBuilder::new(Float32Builder::new()));
    for (_, frames) in &segments {
        let rows = frames_builder.values();
        for frame in frames.rows() {
            for &v in frame {
                rows.values().append_value(v);
            }
            rows.append(true);
        }
        frames_builder.append(true);
    }
    let keys = StringArray::from(segments.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>());
    let batch = RecordBatch::try_from_iter(vec![
        ("key", Arc::new(keys) as ArrayRef),
        ("frames", Arc::new(frames_builder.finish()) as ArrayRef),
    ])?;

    let parquet_path = "sample_features.parquet";
    let file = File::create(parquet_path).context("creating parquet")?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(&batch)?;
    writer.close()?;

    // Mean-pooled segments as a stand-in for learned embeddings (.npz)
    let embed_path = "sample_embeddings.npz";
    let mut npz = NpzWriter::new(File::create(embed_path).context("creating npz")?);
    for (key, frames) in &segments {
        let pooled: Array1<f32> = frames
            .mean_axis(Axis(0))
            .context("empty segment")?;
        npz.add_array(key.as_str(), &pooled)?;
    }
    npz.finish()?;

    println!(
        "Wrote {} segments ({D_FRAME}-dim frames) to {npz_path}, {parquet_path} and {embed_path}",
        segments.len()
    );
    Ok(())
}
