use std::collections::BTreeSet;

use log::info;

use super::model::Dataset;

// ---------------------------------------------------------------------------
// Label-frequency filter
// ---------------------------------------------------------------------------

/// Keep only items whose label occurs at least `min_tokens_per_type` times.
///
/// * `None` → the dataset is returned untouched.
/// * Relative order of the surviving items is preserved.
/// * If no label reaches the threshold the result is empty.
pub fn filter_by_label_count(dataset: Dataset, min_tokens_per_type: Option<usize>) -> Dataset {
    let Some(min_tokens) = min_tokens_per_type else {
        return dataset;
    };
    info!("Minimum tokens per type: {min_tokens}");

    let valid = valid_types(&dataset, min_tokens);
    info!("No. types: {}", valid.len());

    let items = dataset
        .items
        .into_iter()
        .filter(|item| valid.contains(&item.label))
        .collect();
    Dataset::new(items)
}

/// Labels whose count over the whole dataset is `>= min_tokens`.
pub fn valid_types(dataset: &Dataset, min_tokens: usize) -> BTreeSet<String> {
    dataset
        .label_counts()
        .into_iter()
        .filter(|(_, count)| *count >= min_tokens)
        .map(|(label, _)| label.to_string())
        .collect()
}
