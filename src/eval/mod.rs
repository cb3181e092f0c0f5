//! Same-different evaluation of fixed-dimensional acoustic word embeddings.

pub mod distance;
pub mod samediff;
