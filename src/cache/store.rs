use chrono::Utc;
use glob::{glob, Pattern};
use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, error, info, warn};

use super::{CacheEntry, Staging};
use crate::error::{HaircutError, Result};
use crate::types::{Category, Period};

const META_FILE: &str = "meta.json";
const STAGING_DIR: &str = ".staging";

/// Directory-backed cache of the latest known-good file per `(category, period)`.
///
/// Layout: `<root>/<category-slug>/<YYYY-MM>/{meta.json, <file>}`. New content
/// is written under `<root>/.staging/` and swapped in by directory rename, so
/// an entry directory is either the old version or the new one, never a mix.
/// The index is rebuilt from `meta.json` files when the store is opened.
pub struct CacheStore {
    root: PathBuf,
    index: BTreeMap<(Category, Period), CacheEntry>,
}

impl CacheStore {
    /// Open (creating if needed) the store at `root` and load its index.
    /// Leftover staging directories from an interrupted run are purged.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root: PathBuf = root.into();
        fs::create_dir_all(&root).map_err(|e| HaircutError::cache(&root, e))?;

        let staging_root = root.join(STAGING_DIR);
        if staging_root.exists() {
            fs::remove_dir_all(&staging_root).map_err(|e| HaircutError::cache(&staging_root, e))?;
        }
        fs::create_dir_all(&staging_root).map_err(|e| HaircutError::cache(&staging_root, e))?;

        let mut index = BTreeMap::new();
        let pattern = format!(
            "{}/*/*/{}",
            Pattern::escape(&root.display().to_string()),
            META_FILE
        );
        let entries = glob(&pattern)
            .map_err(|e| HaircutError::Config(format!("cache glob `{pattern}`: {e}")))?;

        for entry in entries {
            let meta_path = match entry {
                Ok(p) => p,
                Err(e) => {
                    warn!("cannot read cache entry: {:?}", e);
                    continue;
                }
            };
            match load_entry(&meta_path) {
                Ok(Some(cached)) => {
                    index.insert((cached.category, cached.period), cached);
                }
                Ok(None) => {}
                Err(e) => error!("Skipping corrupt {:?}: {}", meta_path, e),
            }
        }

        debug!(root = %root.display(), entries = index.len(), "cache opened");
        Ok(Self { root, index })
    }

    pub fn get(&self, category: Category, period: Period) -> Option<&CacheEntry> {
        self.index.get(&(category, period))
    }

    pub fn contains(&self, category: Category, period: Period) -> bool {
        self.index.contains_key(&(category, period))
    }

    /// Cached periods for `category`, newest first.
    pub fn periods(&self, category: Category) -> impl Iterator<Item = Period> + '_ {
        self.index
            .keys()
            .rev()
            .filter(move |(c, _)| *c == category)
            .map(|(_, p)| *p)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Create a fresh staging directory for a download of `(category, period)`.
    pub fn stage(&self, category: Category, period: Period) -> Result<Staging> {
        let name = format!(
            "{}-{}-{}",
            category.slug(),
            period,
            Utc::now().timestamp_micros()
        );
        let dir = self.root.join(STAGING_DIR).join(name);
        fs::create_dir_all(&dir).map_err(|e| HaircutError::cache(&dir, e))?;
        Ok(Staging::new(dir))
    }

    /// Promote a staged download to the live entry for its pair, replacing
    /// any previous entry. `entry.file_name` must exist inside `staging`.
    pub fn commit(&mut self, mut staging: Staging, mut entry: CacheEntry) -> Result<CacheEntry> {
        let data = staging.file(&entry.file_name);
        if !data.is_file() {
            return Err(HaircutError::cache(
                &data,
                std::io::Error::new(std::io::ErrorKind::NotFound, "staged file missing"),
            ));
        }

        let meta_path = staging.file(META_FILE);
        let file = File::create(&meta_path).map_err(|e| HaircutError::cache(&meta_path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &entry).map_err(|source| {
            HaircutError::Metadata {
                path: meta_path.clone(),
                source,
            }
        })?;
        writer
            .flush()
            .map_err(|e| HaircutError::cache(&meta_path, e))?;
        drop(writer);

        let target = self.entry_dir(entry.category, entry.period);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| HaircutError::cache(parent, e))?;
        }

        // Move the previous version aside first so the swap is two renames.
        let retired = if target.exists() {
            let aside = staging.dir().with_extension("old");
            fs::rename(&target, &aside).map_err(|e| HaircutError::cache(&target, e))?;
            Some(aside)
        } else {
            None
        };

        if let Err(e) = fs::rename(staging.dir(), &target) {
            if let Some(aside) = &retired {
                if let Err(restore) = fs::rename(aside, &target) {
                    error!(target = %target.display(), error = %restore, "failed to restore previous entry");
                }
            }
            self.forget_if_missing(entry.category, entry.period);
            return Err(HaircutError::cache(&target, e));
        }
        staging.mark_committed();

        if let Some(aside) = retired {
            if let Err(e) = fs::remove_dir_all(&aside) {
                warn!(dir = %aside.display(), error = %e, "could not remove retired entry");
            }
        }

        entry.path = target.join(&entry.file_name);
        info!(
            category = %entry.category,
            period = %entry.period,
            convention = entry.convention.version(),
            bytes = entry.size_bytes,
            "cached"
        );
        self.index
            .insert((entry.category, entry.period), entry.clone());
        Ok(entry)
    }

    /// Read a cached file's bytes.
    pub fn read(&self, entry: &CacheEntry) -> Result<Vec<u8>> {
        fs::read(&entry.path).map_err(|e| HaircutError::cache(&entry.path, e))
    }

    /// Drop the entry for `(category, period)`, returning it if it existed.
    pub fn evict(&mut self, category: Category, period: Period) -> Result<Option<CacheEntry>> {
        if !self.index.contains_key(&(category, period)) {
            return Ok(None);
        }
        let dir = self.entry_dir(category, period);
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|e| HaircutError::cache(&dir, e))?;
        }
        let entry = self.index.remove(&(category, period));
        info!(%category, %period, "evicted");
        Ok(entry)
    }

    /// Drop the index entry for a pair whose data file is no longer on disk.
    fn forget_if_missing(&mut self, category: Category, period: Period) {
        let gone = self
            .index
            .get(&(category, period))
            .is_some_and(|entry| !entry.path.is_file());
        if gone {
            warn!(%category, %period, "cached entry lost during replacement");
            self.index.remove(&(category, period));
        }
    }

    fn entry_dir(&self, category: Category, period: Period) -> PathBuf {
        self.root.join(category.slug()).join(period.to_string())
    }
}

/// Load one `meta.json`. `Ok(None)` means the directory is not a usable entry.
fn load_entry(meta_path: &Path) -> Result<Option<CacheEntry>> {
    let file = File::open(meta_path).map_err(|e| HaircutError::cache(meta_path, e))?;
    let mut entry: CacheEntry =
        serde_json::from_reader(file).map_err(|source| HaircutError::Metadata {
            path: meta_path.to_path_buf(),
            source,
        })?;

    let Some(dir) = meta_path.parent() else {
        return Ok(None);
    };
    let expected = Path::new(entry.category.slug()).join(entry.period.to_string());
    if !dir.ends_with(&expected) {
        warn!(dir = %dir.display(), "metadata does not match its directory; ignoring");
        return Ok(None);
    }

    let data = dir.join(&entry.file_name);
    if !data.is_file() {
        warn!(file = %data.display(), "cached data file missing; ignoring entry");
        return Ok(None);
    }
    entry.path = data;
    Ok(Some(entry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convention::Convention;
    use tempfile::tempdir;

    fn period(s: &str) -> Period {
        s.parse().unwrap()
    }

    fn put(store: &mut CacheStore, category: Category, p: &str, body: &[u8]) -> CacheEntry {
        let staging = store.stage(category, period(p)).unwrap();
        fs::write(staging.file("hc.xlsx"), body).unwrap();
        store
            .commit(
                staging,
                CacheEntry {
                    category,
                    period: period(p),
                    source_url: "https://www.banrep.gov.co/sites/default/files/hc.xlsx".into(),
                    file_name: "hc.xlsx".into(),
                    convention: Convention::V1_03,
                    retrieved_at: Utc::now(),
                    size_bytes: body.len() as u64,
                    path: PathBuf::new(),
                },
            )
            .unwrap()
    }

    #[test]
    fn commit_then_read() {
        let tmp = tempdir().unwrap();
        let mut store = CacheStore::open(tmp.path()).unwrap();
        let entry = put(&mut store, Category::RepoBr, "2024-02", b"v1");

        assert!(store.contains(Category::RepoBr, period("2024-02")));
        assert!(!store.contains(Category::ExternalDebt, period("2024-02")));
        assert_eq!(store.read(&entry).unwrap(), b"v1");
        assert_eq!(
            entry.path,
            tmp.path().join("haircuts-repos").join("2024-02").join("hc.xlsx")
        );
    }

    #[test]
    fn newer_commit_replaces_older() {
        let tmp = tempdir().unwrap();
        let mut store = CacheStore::open(tmp.path()).unwrap();
        put(&mut store, Category::RepoBr, "2024-02", b"old");
        let entry = put(&mut store, Category::RepoBr, "2024-02", b"new");

        assert_eq!(store.len(), 1);
        assert_eq!(store.read(&entry).unwrap(), b"new");
        // nothing left behind in staging
        let leftovers = fs::read_dir(tmp.path().join(STAGING_DIR)).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn periods_are_newest_first_per_category() {
        let tmp = tempdir().unwrap();
        let mut store = CacheStore::open(tmp.path()).unwrap();
        for p in ["2024-01", "2023-11", "2024-02"] {
            put(&mut store, Category::RepoBr, p, b"x");
        }
        put(&mut store, Category::ExternalDebt, "2024-03", b"x");

        let repos: Vec<String> = store
            .periods(Category::RepoBr)
            .map(|p| p.to_string())
            .collect();
        assert_eq!(repos, ["2024-02", "2024-01", "2023-11"]);
        assert_eq!(store.periods(Category::ExternalDebt).count(), 1);
    }

    #[test]
    fn dropped_staging_is_discarded() {
        let tmp = tempdir().unwrap();
        let store = CacheStore::open(tmp.path()).unwrap();
        let dir = {
            let staging = store.stage(Category::RepoBr, period("2024-02")).unwrap();
            fs::write(staging.file("partial.xlsx"), b"PK").unwrap();
            staging.dir().to_path_buf()
        };
        assert!(!dir.exists());
        assert!(store.is_empty());
    }

    #[test]
    fn index_survives_reopen_and_skips_corrupt_meta() {
        let tmp = tempdir().unwrap();
        {
            let mut store = CacheStore::open(tmp.path()).unwrap();
            put(&mut store, Category::ExternalDebt, "2023-12", b"kept");
        }
        let bad = tmp.path().join("haircuts-repos").join("2024-01");
        fs::create_dir_all(&bad).unwrap();
        fs::write(bad.join(META_FILE), b"{ not json").unwrap();

        let store = CacheStore::open(tmp.path()).unwrap();
        assert_eq!(store.len(), 1);
        let entry = store
            .get(Category::ExternalDebt, period("2023-12"))
            .unwrap();
        assert_eq!(store.read(entry).unwrap(), b"kept");
    }

    #[test]
    fn evict_removes_files() {
        let tmp = tempdir().unwrap();
        let mut store = CacheStore::open(tmp.path()).unwrap();
        let entry = put(&mut store, Category::RepoBr, "2024-02", b"x");
        let removed = store.evict(Category::RepoBr, period("2024-02")).unwrap();
        assert_eq!(removed, Some(entry.clone()));
        assert!(!entry.path.exists());
        assert!(store
            .evict(Category::RepoBr, period("2024-02"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn failed_evict_keeps_the_index_entry() {
        let tmp = tempdir().unwrap();
        let mut store = CacheStore::open(tmp.path()).unwrap();
        put(&mut store, Category::RepoBr, "2024-02", b"v1");

        // a plain file where the entry directory should be cannot be removed as a tree
        let dir = tmp.path().join("haircuts-repos").join("2024-02");
        fs::remove_dir_all(&dir).unwrap();
        fs::write(&dir, b"not a directory").unwrap();

        let err = store.evict(Category::RepoBr, period("2024-02")).unwrap_err();
        assert_eq!(err.kind(), "cache");
        assert!(store.contains(Category::RepoBr, period("2024-02")));
    }

    #[test]
    fn entry_lost_on_disk_is_dropped_from_index() {
        let tmp = tempdir().unwrap();
        let mut store = CacheStore::open(tmp.path()).unwrap();
        put(&mut store, Category::RepoBr, "2024-02", b"v1");
        put(&mut store, Category::RepoBr, "2024-03", b"v1");

        fs::remove_dir_all(tmp.path().join("haircuts-repos").join("2024-02")).unwrap();
        store.forget_if_missing(Category::RepoBr, period("2024-02"));
        store.forget_if_missing(Category::RepoBr, period("2024-03"));

        assert!(!store.contains(Category::RepoBr, period("2024-02")));
        assert!(store.contains(Category::RepoBr, period("2024-03")));
    }
}
