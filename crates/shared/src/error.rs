//! Error types for ScaleHub shared types

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScaleHubError {
    #[error("Unknown feature: {0}")]
    UnknownFeature(String),

    #[error("Unknown plan: {0}")]
    UnknownPlan(String),

    #[error("Validation error: {0}")]
    Validation(String),
}
