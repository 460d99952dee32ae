pub mod cache;
pub mod config;
pub mod convention;
pub mod error;
pub mod fetch;
pub mod manager;
pub mod preview;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheEntry, CacheStore};
pub use config::Config;
pub use convention::Convention;
pub use error::{HaircutError, Result};
pub use fetch::{HttpPublisher, Publisher};
pub use manager::Manager;
pub use types::{Category, Period, RemoteFile, ValidatedFile};
