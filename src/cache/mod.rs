//! Content cache — `ContentId` → finished DCA file.
//!
//! ```text
//! <root>/
//! ├── dQw4w9WgXcQ.dca                  ← registered, complete
//! ├── 9bZkp7q19f0.dca
//! └── .jNQXAC9IVRw.4f1c….part          ← staging, never visible to lookups
//! ```
//!
//! Converters write to a staging path and only [`ContentCache::register`]
//! once the file has been synced and renamed into place, so a lookup can
//! never hand out a file that is still being written.

use std::{
    fs, io,
    path::{Path, PathBuf},
    str::FromStr,
    sync::LazyLock,
};

use dashmap::DashMap;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::{common::errors::AcquisitionError, configs::CacheConfig};

static CONTENT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("valid content id pattern"));

const STAGING_SUFFIX: &str = ".part";

/// Stable 11-character token naming one piece of source audio.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn parse(raw: &str) -> Result<Self, AcquisitionError> {
        if CONTENT_ID_RE.is_match(raw) {
            Ok(Self(raw.to_owned()))
        } else {
            Err(AcquisitionError::InvalidContentId(raw.to_owned()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ContentId {
    type Err = AcquisitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::ops::Deref for ContentId {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct ContentCache {
    root: PathBuf,
    extension: String,
    file_re: Regex,
    entries: DashMap<ContentId, PathBuf>,
}

impl ContentCache {
    /// Creates `root` if needed, clears staging files an interrupted run left
    /// behind and indexes whatever is already in it.
    pub fn open(config: &CacheConfig) -> io::Result<Self> {
        fs::create_dir_all(&config.directory)?;
        let root = fs::canonicalize(&config.directory)?;

        remove_stale_staging(&root)?;
        let cache = Self::empty(root.clone(), &config.extension);
        let loaded = cache.rebuild(&root)?;
        info!(
            "Loaded {} audio files into cache from {}",
            loaded,
            root.display()
        );
        Ok(cache)
    }

    /// An index over `root` with nothing loaded yet.
    pub fn empty(root: PathBuf, extension: &str) -> Self {
        let file_re = Regex::new(&format!(r"^([A-Za-z0-9_-]{{11}})\.{}$", regex::escape(extension)))
            .expect("escaped extension forms a valid pattern");

        Self {
            root,
            extension: extension.to_owned(),
            file_re,
            entries: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn lookup(&self, id: &ContentId) -> Option<PathBuf> {
        self.entries.get(id).map(|entry| entry.value().clone())
    }

    /// Only call once the file at `path` is complete and closed.
    pub fn register(&self, id: ContentId, path: PathBuf) {
        debug!("Cached audio for {} at {}", id, path.display());
        self.entries.insert(id, path);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Final location of `id`'s file.
    pub fn path_for(&self, id: &ContentId) -> PathBuf {
        self.root.join(format!("{}.{}", id, self.extension))
    }

    /// A fresh staging path for one conversion of `id`. Concurrent
    /// conversions of the same id never share one.
    pub fn staging_path_for(&self, id: &ContentId) -> PathBuf {
        self.root
            .join(format!(".{}.{}{}", id, uuid::Uuid::new_v4(), STAGING_SUFFIX))
    }

    /// Indexes every `<id>.<ext>` file in `directory`. Returns how many
    /// entries were added. Staging files are left alone, since live
    /// conversions may still own them.
    pub fn rebuild(&self, directory: &Path) -> io::Result<usize> {
        let mut added = 0;

        for entry in fs::read_dir(directory)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }

            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };

            let Some(id) = self
                .file_re
                .captures(name)
                .and_then(|caps| caps.get(1))
                .and_then(|m| ContentId::parse(m.as_str()).ok())
            else {
                continue;
            };

            let path = fs::canonicalize(entry.path()).unwrap_or_else(|_| entry.path());
            debug!("Cached audio file for video ID {}: {}", id, name);
            if self.entries.insert(id, path).is_none() {
                added += 1;
            }
        }

        Ok(added)
    }
}

fn is_staging(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(STAGING_SUFFIX)
}

/// Deletes `.<id>.<uuid>.part` files. Only safe before any conversion runs.
fn remove_stale_staging(root: &Path) -> io::Result<()> {
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str().filter(|n| is_staging(n)) else {
            continue;
        };
        match fs::remove_file(entry.path()) {
            Ok(()) => debug!("Removed stale staging file {}", name),
            Err(e) => warn!("Failed to remove stale staging file {}: {}", name, e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use tempfile::TempDir;

    use super::*;

    fn id(raw: &str) -> ContentId {
        ContentId::parse(raw).unwrap()
    }

    #[test]
    fn content_ids_are_eleven_url_safe_chars() {
        assert!(ContentId::parse("dQw4w9WgXcQ").is_ok());
        assert!(ContentId::parse("a-b_c-d_e-f").is_ok());
        assert!(ContentId::parse("dQw4w9WgXc").is_err());
        assert!(ContentId::parse("dQw4w9WgXcQQ").is_err());
        assert!(ContentId::parse("dQw4w9WgX/Q").is_err());
        assert!(ContentId::parse("ééééééééééé").is_err());
        assert!(ContentId::parse("dQw4w9WgXcé").is_err());
        assert!("".parse::<ContentId>().is_err());
    }

    #[test]
    fn lookup_misses_until_registered() {
        let dir = TempDir::new().unwrap();
        let cache = ContentCache::empty(dir.path().to_path_buf(), "dca");
        let rick = id("dQw4w9WgXcQ");

        assert!(cache.lookup(&rick).is_none());

        let path = cache.path_for(&rick);
        cache.register(rick.clone(), path.clone());
        assert_eq!(cache.lookup(&rick), Some(path.clone()));
        assert_eq!(cache.lookup(&rick), Some(path));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn paths_follow_the_layout() {
        let cache = ContentCache::empty(PathBuf::from("/srv/audio"), "dca");
        let rick = id("dQw4w9WgXcQ");

        assert_eq!(cache.path_for(&rick), PathBuf::from("/srv/audio/dQw4w9WgXcQ.dca"));

        let a = cache.staging_path_for(&rick);
        let b = cache.staging_path_for(&rick);
        assert_ne!(a, b);
        let name = a.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(".dQw4w9WgXcQ."));
        assert!(name.ends_with(".part"));
    }

    #[test]
    fn rebuild_indexes_matching_files_only() -> io::Result<()> {
        let dir = TempDir::new()?;
        fs::write(dir.path().join("dQw4w9WgXcQ.dca"), b"")?;
        fs::write(dir.path().join("9bZkp7q19f0.dca"), b"")?;
        fs::write(dir.path().join("short.dca"), b"")?;
        fs::write(dir.path().join("jNQXAC9IVRw.webm"), b"")?;
        fs::write(dir.path().join("notes.txt"), b"")?;
        fs::create_dir(dir.path().join("kJQP7kiw5Fk.dca"))?;
        fs::write(dir.path().join(".jNQXAC9IVRw.1234.part"), b"half")?;

        let cache = ContentCache::empty(dir.path().to_path_buf(), "dca");
        assert_eq!(cache.rebuild(dir.path())?, 2);

        assert!(cache.lookup(&id("dQw4w9WgXcQ")).is_some());
        assert!(cache.lookup(&id("9bZkp7q19f0")).is_some());
        assert!(cache.lookup(&id("jNQXAC9IVRw")).is_none());
        assert!(cache.lookup(&id("kJQP7kiw5Fk")).is_none());
        // A conversion may still be writing it.
        assert!(dir.path().join(".jNQXAC9IVRw.1234.part").exists());
        Ok(())
    }

    #[test]
    fn open_creates_the_root_and_recovers_entries() -> io::Result<()> {
        let dir = TempDir::new()?;
        let root = dir.path().join("nested").join("audio");
        fs::create_dir_all(&root)?;
        fs::write(root.join("dQw4w9WgXcQ.dca"), b"\x01\x00\x00")?;
        fs::write(root.join(".jNQXAC9IVRw.1234.part"), b"half")?;

        let cache = ContentCache::open(&CacheConfig {
            directory: root.clone(),
            extension: "dca".into(),
        })?;

        let path = cache.lookup(&id("dQw4w9WgXcQ")).expect("recovered entry");
        assert!(path.is_absolute());
        assert_eq!(fs::read(path)?, b"\x01\x00\x00");
        assert!(!root.join(".jNQXAC9IVRw.1234.part").exists());
        assert!(cache.lookup(&id("jNQXAC9IVRw")).is_none());
        Ok(())
    }

    #[test]
    fn concurrent_registration_is_safe() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(ContentCache::empty(dir.path().to_path_buf(), "dca"));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        let key = id(&format!("t{t}-{i:08}"));
                        cache.register(key.clone(), cache.path_for(&key));
                        assert!(cache.lookup(&key).is_some());
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.len(), 400);
    }
}
