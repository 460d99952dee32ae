use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::convention::{extension_of, Convention};
use crate::types::{suggested_name, Category, Period};

pub mod staging;
pub mod store;

pub use staging::Staging;
pub use store::CacheStore;

/// A downloaded, validated file and its metadata (`meta.json`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub category: Category,
    pub period: Period,
    pub source_url: String,
    pub file_name: String,
    pub convention: Convention,
    pub retrieved_at: DateTime<Utc>,
    pub size_bytes: u64,
    /// Location of the data file; filled in by the store, not persisted.
    #[serde(skip)]
    pub path: PathBuf,
}

impl CacheEntry {
    pub fn extension(&self) -> String {
        extension_of(&self.file_name).unwrap_or_else(|| "bin".to_string())
    }

    /// Export name, e.g. `haircuts-repos-febrero-2024.xlsx`.
    pub fn suggested_name(&self) -> String {
        suggested_name(self.category, self.period, &self.extension())
    }
}
