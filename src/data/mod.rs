/// Data layer: core types, loading, filtering, shaping and writing.
///
/// Architecture:
/// ```text
///  .npz / .json / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse archive → Dataset (sorted by key)
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  drop items whose label is too rare
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  shaper   │  truncate → pad/crop → PaddedBatch (+ mask)
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  writer   │  .npz tensors + .csv manifest
///   └──────────┘
/// ```

pub mod error;
pub mod filter;
pub mod loader;
pub mod model;
pub mod shaper;
pub mod writer;
