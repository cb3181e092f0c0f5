//! Loading and shaping of keyed acoustic feature archives for
//! acoustic word embedding training, plus same-different evaluation of the
//! resulting embeddings.

pub mod config;
pub mod data;
pub mod eval;
pub mod pipeline;

pub use data::error::DataError;
pub use data::filter::filter_by_label_count;
pub use data::loader::{load_dataset, load_embeddings, read_archive};
pub use data::model::{Dataset, Item, PaddedBatch};
pub use data::shaper::{pad, truncate, PadOptions};
