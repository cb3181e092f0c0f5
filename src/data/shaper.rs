use std::borrow::Borrow;
use std::ops::Range;

use log::debug;
use ndarray::{s, Array2, Array3};
use num_traits::{One, Zero};

use super::error::{DataError, DataResult};
use super::model::{Dataset, PaddedBatch};

// ---------------------------------------------------------------------------
// Truncation
// ---------------------------------------------------------------------------

/// Keep at most `max_length` frames and `d_frame` feature columns of every
/// item; lengths become `min(length, max_length)`.
pub fn truncate(dataset: Dataset, max_length: usize, d_frame: usize) -> Dataset {
    let items = dataset
        .items
        .into_iter()
        .map(|mut item| {
            item.sample = limit(item.sample, max_length, d_frame);
            item.length = item.length.min(max_length);
            item
        })
        .collect();
    debug!("Truncated to max_length={max_length}, d_frame={d_frame}");
    Dataset::new(items)
}

/// [`truncate`] over raw parallel `samples` / `lengths` sequences.
pub fn truncate_samples(
    samples: Vec<Array2<f32>>,
    lengths: Vec<usize>,
    max_length: usize,
    d_frame: usize,
) -> (Vec<Array2<f32>>, Vec<usize>) {
    let samples = samples
        .into_iter()
        .map(|sample| limit(sample, max_length, d_frame))
        .collect();
    let lengths = lengths.into_iter().map(|l| l.min(max_length)).collect();
    (samples, lengths)
}

fn limit(sample: Array2<f32>, max_rows: usize, max_cols: usize) -> Array2<f32> {
    let rows = sample.nrows().min(max_rows);
    let cols = sample.ncols().min(max_cols);
    sample.slice_move(s![..rows, ..cols])
}

// ---------------------------------------------------------------------------
// Padding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadOptions {
    /// Center short samples (and crop long ones around the middle) instead
    /// of aligning them at frame 0.
    pub center: bool,
    pub return_mask: bool,
}

impl Default for PadOptions {
    fn default() -> Self {
        Self {
            center: true,
            return_mask: false,
        }
    }
}

/// Offset of a centered sample inside an `n_padded` buffer.
///
/// Negative when the sample is longer than the buffer. Ties round half to
/// even, so `2.5 → 2` and `-2.5 → -2`.
pub fn centered_padding(length: usize, n_padded: usize) -> i64 {
    let diff = n_padded as i64 - length as i64;
    (diff as f64 / 2.0).round_ties_even() as i64
}

/// Pad (or crop) every sample to exactly `n_padded` frames.
///
/// The feature dimension is taken from the first sample with at least one
/// frame and every other non-empty sample must match it. `T` is the element
/// type of the output tensors.
pub fn pad<T, A>(samples: &[A], n_padded: usize, options: PadOptions) -> DataResult<PaddedBatch<T>>
where
    T: Copy + Zero + One + From<f32>,
    A: Borrow<Array2<f32>>,
{
    if n_padded == 0 {
        return Err(DataError::InvalidArgument("n_padded must be positive".into()));
    }

    let n = samples.len();
    // Zero-frame samples may report any column count, e.g. `(0, 0)` from parquet.
    let d_frame = samples
        .iter()
        .map(|s| -> &Array2<f32> { s.borrow() })
        .find(|s| s.nrows() > 0)
        .or_else(|| samples.first().map(|s| -> &Array2<f32> { s.borrow() }))
        .map(|s| s.ncols())
        .unwrap_or(0);
    for (index, sample) in samples.iter().enumerate() {
        let sample = sample.borrow();
        let found = sample.ncols();
        if sample.nrows() > 0 && found != d_frame {
            return Err(DataError::FeatureDim {
                index,
                expected: d_frame,
                found,
            });
        }
    }

    let mut x = Array3::<T>::zeros((n, n_padded, d_frame));
    let mut mask = options
        .return_mask
        .then(|| Array2::<T>::zeros((n, n_padded)));
    let mut lengths = Vec::with_capacity(n);

    for (i, sample) in samples.iter().enumerate() {
        let sample = sample.borrow();
        let (src, dst) = placement(sample.nrows(), n_padded, options.center)?;

        if !src.is_empty() {
            x.slice_mut(s![i, dst.clone(), ..])
                .zip_mut_with(&sample.slice(s![src, ..]), |out, &v| *out = T::from(v));
        }
        if let Some(mask) = mask.as_mut() {
            mask.slice_mut(s![i, dst.clone()]).fill(T::one());
        }
        lengths.push(dst.len());
    }

    Ok(PaddedBatch { x, lengths, mask })
}

/// Source rows of the sample and destination rows of the buffer.
fn placement(
    length: usize,
    n_padded: usize,
    center: bool,
) -> DataResult<(Range<usize>, Range<usize>)> {
    if !center {
        let n = length.min(n_padded);
        return Ok((0..n, 0..n));
    }

    let padding = centered_padding(length, n_padded);
    if length <= n_padded {
        let start = usize::try_from(padding).unwrap_or(usize::MAX);
        if start.saturating_add(length) > n_padded {
            return Err(DataError::InvalidArgument(format!(
                "centered placement at {padding} overflows {n_padded} frames"
            )));
        }
        Ok((0..length, start..start + length))
    } else {
        let start = usize::try_from(-padding).unwrap_or(usize::MAX);
        if start.saturating_add(n_padded) > length {
            return Err(DataError::InvalidArgument(format!(
                "crop window at {start} exceeds sample of {length} frames"
            )));
        }
        Ok((start..start + n_padded, 0..n_padded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Item;
    use ndarray::Array;
    use proptest::prelude::*;

    /// `(length, d)` sample whose row `r` is filled with `r + 1`.
    fn ramp(length: usize, d: usize) -> Array2<f32> {
        Array::from_shape_fn((length, d), |(r, _)| (r + 1) as f32)
    }

    fn with_mask() -> PadOptions {
        PadOptions {
            center: true,
            return_mask: true,
        }
    }

    #[test]
    fn centered_short_sample() {
        let batch = pad::<f32, _>(&[ramp(4, 2)], 10, with_mask()).unwrap();
        assert_eq!(batch.x.dim(), (1, 10, 2));
        assert_eq!(batch.lengths, vec![4]);

        let col: Vec<f32> = batch.x.slice(s![0, .., 0]).to_vec();
        assert_eq!(col, vec![0., 0., 0., 1., 2., 3., 4., 0., 0., 0.]);
        let mask = batch.mask.unwrap();
        assert_eq!(mask.row(0).to_vec(), vec![0., 0., 0., 1., 1., 1., 1., 0., 0., 0.]);
    }

    #[test]
    fn left_aligned_short_sample() {
        let options = PadOptions {
            center: false,
            return_mask: true,
        };
        let batch = pad::<f32, _>(&[ramp(4, 2)], 10, options).unwrap();
        let col: Vec<f32> = batch.x.slice(s![0, .., 1]).to_vec();
        assert_eq!(col, vec![1., 2., 3., 4., 0., 0., 0., 0., 0., 0.]);
        assert_eq!(
            batch.mask.unwrap().row(0).to_vec(),
            vec![1., 1., 1., 1., 0., 0., 0., 0., 0., 0.]
        );
    }

    #[test]
    fn centered_long_sample_is_cropped() {
        let batch = pad::<f32, _>(&[ramp(12, 1)], 10, with_mask()).unwrap();
        assert_eq!(batch.lengths, vec![10]);
        let col: Vec<f32> = batch.x.slice(s![0, .., 0]).to_vec();
        assert_eq!(col, (2..=11).map(|v| v as f32).collect::<Vec<_>>());
        assert!(batch.mask.unwrap().iter().all(|&m| m == 1.0));
    }

    #[test]
    fn left_aligned_long_sample_keeps_head() {
        let options = PadOptions {
            center: false,
            return_mask: false,
        };
        let batch = pad::<f32, _>(&[ramp(12, 1)], 10, options).unwrap();
        let col: Vec<f32> = batch.x.slice(s![0, .., 0]).to_vec();
        assert_eq!(col, (1..=10).map(|v| v as f32).collect::<Vec<_>>());
        assert!(batch.mask.is_none());
    }

    #[test]
    fn padding_rounds_half_to_even() {
        assert_eq!(centered_padding(4, 10), 3);
        assert_eq!(centered_padding(5, 10), 2);
        assert_eq!(centered_padding(3, 10), 4);
        assert_eq!(centered_padding(12, 10), -1);
        assert_eq!(centered_padding(15, 10), -2);
        assert_eq!(centered_padding(13, 10), -2);
    }

    #[test]
    fn odd_gap_places_by_rounded_offset() {
        let batch = pad::<f32, _>(&[ramp(5, 1)], 10, with_mask()).unwrap();
        let mask = batch.mask.unwrap();
        assert_eq!(mask.row(0).to_vec(), vec![0., 0., 1., 1., 1., 1., 1., 0., 0., 0.]);

        let batch = pad::<f32, _>(&[ramp(15, 1)], 10, PadOptions::default()).unwrap();
        assert_eq!(batch.x[[0, 0, 0]], 3.0);
        assert_eq!(batch.x[[0, 9, 0]], 12.0);
    }

    #[test]
    fn output_dtype_is_injected() {
        let batch = pad::<f64, _>(&[ramp(2, 3)], 4, with_mask()).unwrap();
        assert_eq!(batch.x[[0, 1, 2]], 1.0f64);
        assert_eq!(batch.mask.unwrap()[[0, 2]], 1.0f64);
    }

    #[test]
    fn mixed_feature_dims_are_rejected() {
        let err = pad::<f32, _>(&[ramp(3, 2), ramp(3, 4)], 5, PadOptions::default()).unwrap_err();
        assert_eq!(
            err,
            DataError::FeatureDim {
                index: 1,
                expected: 2,
                found: 4
            }
        );
    }

    #[test]
    fn zero_frame_samples_do_not_fix_feature_dim() {
        let samples = vec![Array2::<f32>::zeros((0, 0)), ramp(4, 3), Array2::zeros((0, 5))];
        let batch = pad::<f32, _>(&samples, 6, with_mask()).unwrap();
        assert_eq!(batch.x.dim(), (3, 6, 3));
        assert_eq!(batch.lengths, vec![0, 4, 0]);
        let mask = batch.mask.unwrap();
        assert!(mask.row(0).iter().all(|&m| m == 0.0));
        assert_eq!(mask.row(1).to_vec(), vec![0., 1., 1., 1., 1., 0.]);
    }

    #[test]
    fn only_empty_samples_use_first_dim() {
        let samples = vec![Array2::<f32>::zeros((0, 2)), Array2::zeros((0, 7))];
        let batch = pad::<f32, _>(&samples, 3, PadOptions::default()).unwrap();
        assert_eq!(batch.x.dim(), (2, 3, 2));
        assert!(batch.x.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn zero_target_length_is_rejected() {
        let err = pad::<f32, _>(&[ramp(3, 2)], 0, PadOptions::default()).unwrap_err();
        assert!(matches!(err, DataError::InvalidArgument(_)));
    }

    #[test]
    fn empty_input_gives_empty_batch() {
        let samples: Vec<Array2<f32>> = Vec::new();
        let batch = pad::<f32, _>(&samples, 7, with_mask()).unwrap();
        assert_eq!(batch.x.dim(), (0, 7, 0));
        assert!(batch.is_empty());
        assert_eq!(batch.mask.unwrap().dim(), (0, 7));
    }

    #[test]
    fn accepts_borrowed_samples() {
        let ds = Dataset::new(vec![Item::from_key("a_s1", ramp(3, 2)).unwrap()]);
        let batch = pad::<f32, _>(&ds.samples(), 4, PadOptions::default()).unwrap();
        assert_eq!(batch.lengths, vec![3]);
    }

    #[test]
    fn truncate_limits_rows_and_columns() {
        let ds = Dataset::new(vec![
            Item::from_key("a_s1", ramp(8, 5)).unwrap(),
            Item::from_key("b_s1", ramp(2, 2)).unwrap(),
        ]);
        let ds = truncate(ds, 4, 3);
        assert_eq!(ds.items[0].sample.dim(), (4, 3));
        assert_eq!(ds.items[1].sample.dim(), (2, 2));
        assert_eq!(ds.lengths(), vec![4, 2]);
        assert_eq!(ds.items[0].sample[[3, 0]], 4.0);
    }

    #[test]
    fn truncate_samples_keeps_alignment() {
        let (samples, lengths) = truncate_samples(vec![ramp(6, 4), ramp(1, 4)], vec![6, 1], 3, 2);
        assert_eq!(samples[0].dim(), (3, 2));
        assert_eq!(samples[1].dim(), (1, 2));
        assert_eq!(lengths, vec![3, 1]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn pad_shape_invariant(
            lens in prop::collection::vec(0usize..40, 1..12),
            d in 1usize..6,
            n_padded in 1usize..30,
            center in any::<bool>(),
        ) {
            let samples: Vec<Array2<f32>> = lens.iter().map(|&l| ramp(l, d)).collect();
            let options = PadOptions { center, return_mask: true };
            let batch = pad::<f32, _>(&samples, n_padded, options).unwrap();

            prop_assert_eq!(batch.x.dim(), (lens.len(), n_padded, d));
            let mask = batch.mask.unwrap();
            for (i, &l) in lens.iter().enumerate() {
                prop_assert_eq!(batch.lengths[i], l.min(n_padded));
                let ones = mask.row(i).iter().filter(|&&m| m == 1.0).count();
                prop_assert_eq!(ones, l.min(n_padded));
            }
        }

        #[test]
        fn truncate_shape_invariant(
            dims in prop::collection::vec((0usize..20, 1usize..8), 0..10),
            max_length in 0usize..15,
            d_frame in 0usize..6,
        ) {
            let samples: Vec<Array2<f32>> = dims.iter().map(|&(r, c)| ramp(r, c)).collect();
            let lengths: Vec<usize> = dims.iter().map(|&(r, _)| r).collect();
            let (samples, truncated) = truncate_samples(samples, lengths.clone(), max_length, d_frame);
            for (i, sample) in samples.iter().enumerate() {
                prop_assert!(sample.nrows() <= max_length);
                prop_assert!(sample.ncols() <= d_frame);
                prop_assert_eq!(truncated[i], lengths[i].min(max_length));
            }
        }
    }
}
