use thiserror::Error;

/// Errors raised by the data layer itself (as opposed to I/O or format
/// plumbing, which is reported through `anyhow` with context).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DataError {
    /// Key does not contain at least `<label>_<speaker>`.
    #[error("malformed key '{0}': expected at least two '_'-separated segments")]
    MalformedKey(String),

    #[error("array '{key}' has {found} dimensions, expected {expected}")]
    Rank {
        key: String,
        expected: usize,
        found: usize,
    },

    /// Samples in one batch disagree on their feature dimension.
    #[error("sample {index} has feature dimension {found}, expected {expected}")]
    FeatureDim {
        index: usize,
        expected: usize,
        found: usize,
    },

    /// The same key appears twice in one archive.
    #[error("duplicate key '{0}'")]
    DuplicateKey(String),

    #[error("ragged nested array under key '{0}'")]
    Ragged(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type DataResult<T> = std::result::Result<T, DataError>;
