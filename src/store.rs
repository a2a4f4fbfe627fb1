use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};

/// What the file looked like when this process last read or wrote it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: SystemTime,
    len: u64,
}

fn file_stamp(path: &Path) -> Option<FileStamp> {
    let meta = fs::metadata(path).ok()?;
    Some(FileStamp {
        modified: meta.modified().ok()?,
        len: meta.len(),
    })
}

struct Document<T> {
    value: T,
    stamp: Option<FileStamp>,
}

/// A serde document kept in memory behind a lock and, when backed by a path,
/// rewritten to disk on every committed transaction.
///
/// Another process (the offline admin commands) may rewrite the file. Such a
/// change is picked up before the next read or transaction, so a later commit
/// never overwrites it with a stale copy.
pub struct JsonStore<T> {
    data: RwLock<Document<T>>,
    path: Option<PathBuf>,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Clone + Default,
{
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let document = if path.exists() {
            let stamp = file_stamp(&path);
            Document {
                value: load_from_disk(&path)?,
                stamp,
            }
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            Document {
                value: T::default(),
                stamp: None,
            }
        };

        Ok(Self {
            data: RwLock::new(document),
            path: Some(path),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            data: RwLock::new(Document {
                value: T::default(),
                stamp: None,
            }),
            path: None,
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, T> {
        let document = self.data.read().await;
        let document = if self.changed_on_disk(&document) {
            drop(document);
            let mut document = self.data.write().await;
            self.reload(&mut document);
            document.downgrade()
        } else {
            document
        };
        RwLockReadGuard::map(document, |d| &d.value)
    }

    /// Takes the write lock and hands out a working copy. Nothing is visible
    /// to other requests until [`Transaction::commit`]; dropping the
    /// transaction discards the copy.
    pub async fn begin(&self) -> Transaction<'_, T> {
        let mut guard = self.data.write().await;
        self.reload(&mut guard);
        let draft = guard.value.clone();
        Transaction {
            guard,
            draft,
            path: self.path.as_deref(),
        }
    }

    fn changed_on_disk(&self, document: &Document<T>) -> bool {
        match &self.path {
            Some(path) => file_stamp(path) != document.stamp,
            None => false,
        }
    }

    /// Re-reads the file if it changed. A file that cannot be parsed leaves
    /// the in-memory copy in place.
    fn reload(&self, document: &mut Document<T>) {
        let Some(path) = &self.path else {
            return;
        };
        let stamp = file_stamp(path);
        if stamp == document.stamp || stamp.is_none() {
            return;
        }

        match load_from_disk(path) {
            Ok(value) => {
                info!(path = %path.display(), "Reloaded store changed on disk");
                document.value = value;
                document.stamp = stamp;
            }
            Err(e) => warn!(path = %path.display(), error = %format!("{e:#}"), "Ignoring unreadable store file"),
        }
    }
}

pub struct Transaction<'a, T> {
    guard: RwLockWriteGuard<'a, Document<T>>,
    draft: T,
    path: Option<&'a Path>,
}

impl<T: Serialize> Transaction<'_, T> {
    /// Persists the working copy, then publishes it. If the write fails the
    /// in-memory state is left untouched.
    pub fn commit(self) -> Result<()> {
        let Transaction {
            mut guard,
            draft,
            path,
        } = self;

        if let Some(path) = path {
            save_to_disk(path, &draft)?;
            guard.stamp = file_stamp(path);
        }
        guard.value = draft;
        Ok(())
    }
}

impl<T> Deref for Transaction<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.draft
    }
}

impl<T> DerefMut for Transaction<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.draft
    }
}

fn load_from_disk<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

fn save_to_disk<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).context("Failed to serialize store")?;
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, json)
        .with_context(|| format!("Failed to write to {}", staging.display()))?;
    fs::rename(&staging, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
