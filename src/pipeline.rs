use std::path::Path;

use anyhow::{Context, Result};
use log::info;

use crate::config::PrepConfig;
use crate::data::filter::filter_by_label_count;
use crate::data::loader::load_dataset;
use crate::data::model::{Dataset, PaddedBatch};
use crate::data::shaper::{pad, truncate};

// ---------------------------------------------------------------------------
// Prep pipeline
// ---------------------------------------------------------------------------

/// A shaped dataset: the surviving items and their padded tensors.
#[derive(Debug, Clone)]
pub struct Prepared {
    /// Items after filtering and truncation, in batch order.
    pub dataset: Dataset,
    pub batch: PaddedBatch<f32>,
}

/// Load `archive` and run filter → truncate → pad with `config`.
pub fn prepare(archive: &Path, config: &PrepConfig) -> Result<Prepared> {
    config.validate()?;

    let dataset = load_dataset(archive, config.min_length)?;
    let dataset = filter_by_label_count(dataset, config.min_tokens_per_type);
    let dataset = truncate(dataset, config.max_length, config.d_frame);

    let batch = pad::<f32, _>(&dataset.samples(), config.n_padded, config.pad_options())
        .context("padding samples")?;
    info!(
        "Padded {} items to {} frames of dimension {}",
        batch.len(),
        batch.n_padded(),
        batch.d_frame()
    );

    Ok(Prepared { dataset, batch })
}
