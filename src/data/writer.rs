use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{ensure, Context, Result};
use log::info;
use ndarray::Array1;
use ndarray_npy::{NpzWriter, WritableElement};
use serde::Serialize;

use super::model::{Dataset, PaddedBatch};

// ---------------------------------------------------------------------------
// Padded tensors → .npz
// ---------------------------------------------------------------------------

/// Write `x`, `lengths` (int64) and, when present, `mask` to an `.npz` file.
pub fn write_padded_npz<T: WritableElement>(path: &Path, batch: &PaddedBatch<T>) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut npz = NpzWriter::new(BufWriter::new(file));

    npz.add_array("x", &batch.x).context("writing 'x'")?;
    let lengths: Array1<i64> = batch.lengths.iter().map(|&l| l as i64).collect();
    npz.add_array("lengths", &lengths).context("writing 'lengths'")?;
    if let Some(mask) = &batch.mask {
        npz.add_array("mask", mask).context("writing 'mask'")?;
    }
    npz.finish().context("finalising npz")?;

    info!("Wrote {:?} batch to {}", batch.x.dim(), path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Item manifest → .csv
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ManifestRow<'a> {
    index: usize,
    key: &'a str,
    label: &'a str,
    speaker: &'a str,
    length: usize,
}

/// One CSV row per item: `index,key,label,speaker,length`.
///
/// `lengths` are the effective lengths of the padded batch built from
/// `dataset`, in the same order.
pub fn write_manifest_csv(path: &Path, dataset: &Dataset, lengths: &[usize]) -> Result<()> {
    ensure!(
        dataset.len() == lengths.len(),
        "manifest has {} items but {} lengths",
        dataset.len(),
        lengths.len()
    );

    let mut writer = csv::Writer::from_path(path).context("opening manifest CSV")?;
    for (index, (item, &length)) in dataset.items.iter().zip(lengths).enumerate() {
        writer
            .serialize(ManifestRow {
                index,
                key: &item.key,
                label: &item.label,
                speaker: &item.speaker,
                length,
            })
            .with_context(|| format!("writing manifest row {index}"))?;
    }
    writer.flush().context("flushing manifest CSV")?;
    Ok(())
}
