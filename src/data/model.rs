use std::collections::BTreeMap;

use ndarray::{Array2, Array3};

use super::error::{DataError, DataResult};

// ---------------------------------------------------------------------------
// Item – one keyed utterance segment
// ---------------------------------------------------------------------------

/// A single archive entry: a `(time steps, feature dim)` sample plus the
/// label and speaker encoded in its key.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// Full archive key, `<label>_<speaker>_<...>`.
    pub key: String,
    /// First key segment (the word type).
    pub label: String,
    /// Second key segment.
    pub speaker: String,
    /// Number of valid time steps. Equals `sample.nrows()` at load time.
    pub length: usize,
    /// Feature frames, shape `(time steps, d_frame)`.
    pub sample: Array2<f32>,
}

impl Item {
    /// Build an item from its archive key, parsing label and speaker.
    pub fn from_key(key: &str, sample: Array2<f32>) -> DataResult<Self> {
        let (label, speaker) = parse_key(key)?;
        Ok(Item {
            key: key.to_string(),
            label: label.to_string(),
            speaker: speaker.to_string(),
            length: sample.nrows(),
            sample,
        })
    }

    /// Feature dimension (column count) of the sample.
    pub fn d_frame(&self) -> usize {
        self.sample.ncols()
    }
}

/// Split `<label>_<speaker>_<...>` into `(label, speaker)`.
pub fn parse_key(key: &str) -> DataResult<(&str, &str)> {
    let mut segments = key.split('_');
    match (segments.next(), segments.next()) {
        (Some(label), Some(speaker)) => Ok((label, speaker)),
        _ => Err(DataError::MalformedKey(key.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Dataset – ordered collection of items
// ---------------------------------------------------------------------------

/// An ordered set of items. Index `i` of every parallel view refers to the
/// same item; the views can only be produced together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub items: Vec<Item>,
}

impl Dataset {
    pub fn new(items: Vec<Item>) -> Self {
        Dataset { items }
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn samples(&self) -> Vec<&Array2<f32>> {
        self.items.iter().map(|it| &it.sample).collect()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.items.iter().map(|it| it.label.as_str()).collect()
    }

    pub fn lengths(&self) -> Vec<usize> {
        self.items.iter().map(|it| it.length).collect()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.items.iter().map(|it| it.key.as_str()).collect()
    }

    pub fn speakers(&self) -> Vec<&str> {
        self.items.iter().map(|it| it.speaker.as_str()).collect()
    }

    /// Number of occurrences of every distinct label, sorted by label.
    pub fn label_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for item in &self.items {
            *counts.entry(item.label.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Decompose into owned `(samples, labels, lengths, keys, speakers)`.
    pub fn into_parts(self) -> DatasetParts {
        let n = self.items.len();
        let mut parts = DatasetParts {
            samples: Vec::with_capacity(n),
            labels: Vec::with_capacity(n),
            lengths: Vec::with_capacity(n),
            keys: Vec::with_capacity(n),
            speakers: Vec::with_capacity(n),
        };
        for item in self.items {
            parts.samples.push(item.sample);
            parts.labels.push(item.label);
            parts.lengths.push(item.length);
            parts.keys.push(item.key);
            parts.speakers.push(item.speaker);
        }
        parts
    }
}

/// The five parallel sequences of a [`Dataset`].
#[derive(Debug, Clone, Default)]
pub struct DatasetParts {
    pub samples: Vec<Array2<f32>>,
    pub labels: Vec<String>,
    pub lengths: Vec<usize>,
    pub keys: Vec<String>,
    pub speakers: Vec<String>,
}

// ---------------------------------------------------------------------------
// PaddedBatch – fixed-shape output of the shaper
// ---------------------------------------------------------------------------

/// Dense batch of padded sequences.
#[derive(Debug, Clone, PartialEq)]
pub struct PaddedBatch<T> {
    /// Shape `(N, n_padded, d_frame)`, zero outside the copied spans.
    pub x: Array3<T>,
    /// Effective length per item, each `<= n_padded`.
    pub lengths: Vec<usize>,
    /// Shape `(N, n_padded)`, one on valid positions. Only when requested.
    pub mask: Option<Array2<T>>,
}

impl<T> PaddedBatch<T> {
    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    pub fn n_padded(&self) -> usize {
        self.x.shape()[1]
    }

    pub fn d_frame(&self) -> usize {
        self.x.shape()[2]
    }
}
