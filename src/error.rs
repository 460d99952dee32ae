use std::path::PathBuf;

use crate::types::{Category, Period};

pub type Result<T, E = HaircutError> = std::result::Result<T, E>;

/// Errors surfaced to the shell. None of them are fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum HaircutError {
    #[error("network error fetching {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("no known file convention matches {url}: {reason}")]
    FormatMismatch { url: String, reason: String },

    #[error("downloaded content from {url} failed validation: {reason}")]
    Validation { url: String, reason: String },

    #[error("no {category} haircuts published for {period}")]
    NotPublished { category: Category, period: Period },

    #[error("invalid period `{0}` (expected YYYY-MM)")]
    InvalidPeriod(String),

    #[error("invalid category `{0}` (expected Repos-BR or External-Debt)")]
    InvalidCategory(String),

    #[error("preview unavailable: {0}")]
    Preview(String),

    #[error("cache I/O on {}: {source}", path.display())]
    Cache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt cache metadata {}: {source}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("configuration: {0}")]
    Config(String),
}

impl HaircutError {
    pub fn network(url: impl ToString, reason: impl ToString) -> Self {
        HaircutError::Network {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn cache(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HaircutError::Cache {
            path: path.into(),
            source,
        }
    }

    /// Short stable label used when reporting the error to a user.
    pub fn kind(&self) -> &'static str {
        match self {
            HaircutError::Network { .. } => "network",
            HaircutError::FormatMismatch { .. } => "format-mismatch",
            HaircutError::Validation { .. } => "validation",
            HaircutError::NotPublished { .. } => "not-published",
            HaircutError::InvalidPeriod(_) | HaircutError::InvalidCategory(_) => "input",
            HaircutError::Preview(_) => "preview",
            HaircutError::Cache { .. } | HaircutError::Metadata { .. } => "cache",
            HaircutError::Config(_) => "config",
        }
    }
}
