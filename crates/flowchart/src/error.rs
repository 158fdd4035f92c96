//! Error types for flowchart operations.
//!
//! This module provides the main error type [`FlowchartError`]. Validation
//! failures abort the single command that caused them; unresolved references
//! and layout non-convergence are not errors and never surface here.

use std::io;

use thiserror::Error;

/// The main error type for flowchart operations.
#[derive(Debug, Error)]
pub enum FlowchartError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Do not allow `{ch}` in element id `{id}`")]
    InvalidId { id: String, ch: char },

    #[error("Unknown element type `{0}`")]
    UnknownType(String),

    #[error("Unknown element `{0}`")]
    UnknownElement(String),

    #[error("Invalid relation: {0}")]
    InvalidRelation(String),

    #[error("Invalid endpoint reference `{0}`")]
    InvalidReference(String),

    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl FlowchartError {
    /// Create a new `InvalidValue` error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
