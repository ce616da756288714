use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use fs4::FileExt;
use gapi_domain::Fingerprint;
use sha2::{Digest, Sha256, Sha512};

const STALE_WORKSPACE_AGE: Duration = Duration::from_secs(24 * 60 * 60);
const RETIRED_PREFIX: &str = ".retired-";

/// Scratch directory that is removed on drop unless [`TempWorkspace::persist`]
/// moves it into its final location.
#[derive(Debug)]
pub struct TempWorkspace {
    inner: Option<tempfile::TempDir>,
    path: PathBuf,
}

impl TempWorkspace {
    pub fn new_in(root: &Path, prefix: &str) -> Result<Self> {
        fs::create_dir_all(root).with_context(|| format!("failed to create {}", root.display()))?;
        prune_stale_workspaces(root, prefix, STALE_WORKSPACE_AGE);
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(root)
            .with_context(|| format!("failed to create temp dir under {}", root.display()))?;
        let path = dir.path().to_path_buf();
        Ok(Self {
            inner: Some(dir),
            path,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Renames the workspace to `dest`, replacing whatever was there.
    ///
    /// An existing `dest` is first moved aside into a `.retired-*` sibling and
    /// restored if the swap fails, so `dest` never holds a half-deleted tree.
    pub fn persist(mut self, dest: &Path) -> Result<PathBuf> {
        let parent = dest.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
        let Some(dir) = self.inner.take() else {
            anyhow::bail!("workspace {} was already persisted", self.path.display());
        };

        let retired = if dest.exists() {
            prune_stale_workspaces(parent, RETIRED_PREFIX, STALE_WORKSPACE_AGE);
            let holder = tempfile::Builder::new()
                .prefix(RETIRED_PREFIX)
                .tempdir_in(parent)
                .with_context(|| format!("failed to create temp dir under {}", parent.display()))?;
            let aside = holder.path().join("previous");
            fs::rename(dest, &aside)
                .with_context(|| format!("failed to move stale {} aside", dest.display()))?;
            Some((holder, aside))
        } else {
            None
        };

        let path = dir.keep();
        if let Err(err) = fs::rename(&path, dest) {
            let _ = fs::remove_dir_all(&path);
            if let Some((_, aside)) = &retired {
                let _ = fs::rename(aside, dest);
            }
            return Err(err).with_context(|| {
                format!(
                    "failed to move workspace into place ({} -> {})",
                    path.display(),
                    dest.display()
                )
            });
        }
        drop(retired);
        fsync_dir(parent).ok();
        Ok(dest.to_path_buf())
    }
}

impl Drop for TempWorkspace {
    fn drop(&mut self) {
        let Some(dir) = self.inner.take() else {
            return;
        };
        let path = dir.keep();
        let _ = fs::remove_dir_all(&path);
    }
}

fn prune_stale_workspaces(root: &Path, prefix: &str, max_age: Duration) {
    let Ok(entries) = fs::read_dir(root) else {
        return;
    };
    let now = SystemTime::now();
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.starts_with(prefix) {
            continue;
        }
        let Some(modified) = entry.metadata().ok().and_then(|meta| meta.modified().ok()) else {
            continue;
        };
        if now.duration_since(modified).unwrap_or_default() < max_age {
            continue;
        }
        let _ = fs::remove_dir_all(entry.path());
    }
}

/// In-process mutex per key; threads of one run serialize on the same key
/// while distinct keys proceed in parallel.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the mutex for `key`. Slots nobody else holds are dropped on the
    /// way, so the map stays as large as the set of keys in use.
    #[must_use]
    pub fn slot(&self, key: &str) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.retain(|existing, slot| existing == key || Arc::strong_count(slot) > 1);
        Arc::clone(slots.entry(key.to_string()).or_default())
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Cross-process exclusive lock held for as long as the returned file lives.
pub fn acquire_lock(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create lock directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("failed to open lock {}", path.display()))?;
    file.lock_exclusive()
        .with_context(|| format!("failed to lock {}", path.display()))?;
    Ok(file)
}

/// Lock file name safe for any key.
#[must_use]
pub fn lock_file_name(key: &str) -> String {
    let sanitized: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{sanitized}.lock")
}

pub fn compute_sha256(path: &Path) -> Result<String> {
    digest_file::<Sha256>(path)
}

pub fn compute_sha512(path: &Path) -> Result<String> {
    digest_file::<Sha512>(path)
}

fn digest_file<D: Digest + Write>(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut hasher = D::new();
    io::copy(&mut file, &mut hasher)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Writes `bytes` next to `dest` and renames it into place.
pub fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<()> {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("failed to write temp file for {}", dest.display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("failed to flush temp file for {}", dest.display()))?;
    tmp.persist(dest)
        .with_context(|| format!("failed to move {} into place", dest.display()))?;
    Ok(())
}

/// Forwards writes while hashing them.
pub struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    pub fn finish(self) -> io::Result<(W, Fingerprint)> {
        let Self { mut inner, hasher } = self;
        inner.flush()?;
        Ok((inner, Fingerprint::from_digest(&hasher.finalize())))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(unix)]
fn fsync_dir(path: &Path) -> Result<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn fsync_dir(_path: &Path) -> Result<()> {
    Ok(())
}
