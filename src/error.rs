//! Crate-wide error type.
//!
//! Structural errors (not-found, invalid topology, singular matrices) are
//! returned to the caller. Convergence and detection outcomes are data,
//! not errors — see `PowerFlowReport`, `DetectionResult`,
//! `GraphDetectionResult` (spec.md §7).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GridError>;

#[derive(Debug, Error, PartialEq)]
pub enum GridError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: u32 },

    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    #[error("matrix singular even after regularization")]
    Singular,
}
