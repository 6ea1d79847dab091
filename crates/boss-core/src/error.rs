// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use thiserror::Error;

/// Error taxonomy shared by every boss-rs crate.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BossError {
    /// Invalid word/alphabet/window sizes, contracts or other settings,
    /// detected before any building begins.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Input data that does not satisfy the classifier's capabilities.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Input that is well-formed but cannot produce a meaningful transform.
    #[error("degenerate input: {0}")]
    DegenerateInput(String),
    /// Training finished without keeping a single ensemble member.
    #[error("empty ensemble: {0}")]
    EmptyEnsemble(String),
    #[error("numerical issue: {0}")]
    NumericalIssue(String),
    /// Snapshot encode/decode or persistence failure.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),
    #[error("resource limit exceeded: {0}")]
    ResourceLimit(String),
}

impl BossError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn degenerate_input(message: impl Into<String>) -> Self {
        Self::DegenerateInput(message.into())
    }

    pub fn empty_ensemble(message: impl Into<String>) -> Self {
        Self::EmptyEnsemble(message.into())
    }

    pub fn numerical_issue(message: impl Into<String>) -> Self {
        Self::NumericalIssue(message.into())
    }

    pub fn checkpoint(message: impl Into<String>) -> Self {
        Self::Checkpoint(message.into())
    }

    pub fn resource_limit(message: impl Into<String>) -> Self {
        Self::ResourceLimit(message.into())
    }

    /// Returns true for errors raised while validating settings.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::BossError;

    #[test]
    fn display_prefixes_identify_the_taxonomy() {
        assert_eq!(
            BossError::configuration("word_len must be >= 2").to_string(),
            "configuration error: word_len must be >= 2"
        );
        assert_eq!(
            BossError::empty_ensemble("no members").to_string(),
            "empty ensemble: no members"
        );
        assert_eq!(
            BossError::resource_limit("counter overflow").to_string(),
            "resource limit exceeded: counter overflow"
        );
    }

    #[test]
    fn is_configuration_only_matches_configuration_variant() {
        assert!(BossError::configuration("x").is_configuration());
        assert!(!BossError::invalid_input("x").is_configuration());
        assert!(!BossError::checkpoint("x").is_configuration());
    }
}
