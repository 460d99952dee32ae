//! The fetch-and-cache manager: the only thing the shell talks to.

use chrono::Utc;
use futures::{stream, Stream, StreamExt};
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};
use url::Url;

use crate::cache::{CacheEntry, CacheStore};
use crate::convention::{self, Convention};
use crate::error::{HaircutError, Result};
use crate::fetch::{urls, Publisher};
use crate::preview::{self, Table};
use crate::types::{Category, Period, RemoteFile, ValidatedFile};

/// Owns the cache and a publisher. Mutating operations take `&mut self`,
/// so only one download is ever in flight per manager.
pub struct Manager<P> {
    publisher: P,
    store: CacheStore,
    listing_url: Url,
    conventions: Vec<Convention>,
}

impl<P: Publisher> Manager<P> {
    pub fn new(publisher: P, store: CacheStore, listing_url: Url) -> Self {
        Self {
            publisher,
            store,
            listing_url,
            conventions: Convention::ORDERED.to_vec(),
        }
    }

    /// Replace the convention set. Order matters: first match wins.
    pub fn with_conventions(mut self, conventions: Vec<Convention>) -> Self {
        self.conventions = conventions;
        self
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Remote files for `category`, newest first.
    ///
    /// The listing page is fetched up front; each detail page is only
    /// requested when the stream is polled for that entry.
    pub async fn list_remote(
        &self,
        category: Category,
    ) -> Result<impl Stream<Item = Result<RemoteFile>> + '_> {
        let entries = urls::list_entries(&self.publisher, &self.listing_url, category).await?;
        Ok(stream::iter(entries).then(move |entry| urls::resolve(&self.publisher, entry)))
    }

    /// Match a remote record against the configured conventions.
    pub fn validate(&self, remote: &RemoteFile) -> Result<ValidatedFile> {
        convention::validate(remote, &self.conventions)
    }

    /// Download and cache `file` unless its pair is already cached.
    #[instrument(level = "info", skip(self, file), fields(category = %file.category, period = %file.period))]
    pub async fn fetch(&mut self, file: &ValidatedFile) -> Result<CacheEntry> {
        if let Some(entry) = self.store.get(file.category, file.period) {
            info!("already cached");
            return Ok(entry.clone());
        }
        self.download(file).await
    }

    /// Cached file for the pair, fetching it on a miss.
    #[instrument(level = "info", skip(self))]
    pub async fn get(&mut self, category: Category, period: Period) -> Result<CacheEntry> {
        if let Some(entry) = self.store.get(category, period) {
            return Ok(entry.clone());
        }
        info!("cache miss");
        let file = self.locate(category, period).await?;
        self.fetch(&file).await
    }

    /// Re-download a published period even if cached. The cached entry is
    /// replaced only if the new download validates.
    #[instrument(level = "info", skip(self))]
    pub async fn refresh(&mut self, category: Category, period: Period) -> Result<CacheEntry> {
        let file = self.locate(category, period).await?;
        self.download(&file).await
    }

    /// Cached periods for `category`, newest first. No network access.
    pub fn list_available(&self, category: Category) -> impl Iterator<Item = Period> + '_ {
        self.store.periods(category)
    }

    pub fn read(&self, entry: &CacheEntry) -> Result<Vec<u8>> {
        self.store.read(entry)
    }

    pub fn preview(&self, entry: &CacheEntry, rows: usize) -> Result<Table> {
        let bytes = self.store.read(entry)?;
        preview::preview(&bytes, &entry.extension(), rows)
    }

    /// Copy a cached file out. A directory destination gets the suggested name.
    pub fn export(&self, entry: &CacheEntry, dest: &Path) -> Result<PathBuf> {
        let target = if dest.is_dir() {
            dest.join(entry.suggested_name())
        } else {
            dest.to_path_buf()
        };
        std::fs::copy(&entry.path, &target).map_err(|e| HaircutError::cache(&target, e))?;
        info!(to = %target.display(), "exported");
        Ok(target)
    }

    pub fn evict(&mut self, category: Category, period: Period) -> Result<Option<CacheEntry>> {
        self.store.evict(category, period)
    }

    /// Find, resolve and validate the remote file for a pair.
    async fn locate(&self, category: Category, period: Period) -> Result<ValidatedFile> {
        let entries = urls::list_entries(&self.publisher, &self.listing_url, category).await?;
        let entry = entries
            .into_iter()
            .find(|e| e.period == period)
            .ok_or(HaircutError::NotPublished { category, period })?;
        let remote = urls::resolve(&self.publisher, entry).await?;
        self.validate(&remote)
    }

    async fn download(&mut self, file: &ValidatedFile) -> Result<CacheEntry> {
        // Dropping `staging` on any early return discards the partial download.
        let staging = self.store.stage(file.category, file.period)?;
        let dest = staging.file(&file.file_name);

        let size_bytes = match self.publisher.download(&file.file_url, &dest).await {
            Ok(n) => n,
            Err(e) => {
                warn!(url = %file.file_url, error = %e, "download failed; cache untouched");
                return Err(e);
            }
        };

        let bytes = tokio::fs::read(&dest)
            .await
            .map_err(|e| HaircutError::cache(&dest, e))?;
        if let Err(reason) = file.convention.check_content(&file.file_name, &bytes) {
            warn!(url = %file.file_url, %reason, "content failed validation; cache untouched");
            return Err(HaircutError::Validation {
                url: file.file_url.to_string(),
                reason,
            });
        }

        let entry = CacheEntry {
            category: file.category,
            period: file.period,
            source_url: file.file_url.to_string(),
            file_name: file.file_name.clone(),
            convention: file.convention,
            retrieved_at: Utc::now(),
            size_bytes,
            path: PathBuf::new(),
        };
        self.store.commit(staging, entry)
    }
}
