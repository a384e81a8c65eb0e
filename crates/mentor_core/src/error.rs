use thiserror::Error;

/// Rejected entity operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("{variant} journal entry has no content")]
    EmptyContent { variant: &'static str },

    #[error("milestone index {index} out of range (goal has {len})")]
    MilestoneOutOfRange { index: usize, len: usize },
}
