//! Persistence seam for per-user bandit documents.
//!
//! One [`BanditDocument`] per user id, fully overwritten on every save.  The
//! manager is the only writer for a user within a process, and it orders its
//! own writes, so last-writer-wins at the document level is enough.
//!
//! Two backends ship with the crate:
//! - [`InMemoryStore`]: `DashMap`-backed, for tests and development.  No persistence.
//! - [`JsonFileStore`]: one pretty-printed JSON file per user in a directory,
//!   replaced atomically (temp file + rename).

use async_trait::async_trait;
use dashmap::DashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::BanditDocument;

/// Async document store keyed by user id.
#[async_trait]
pub trait BanditStore: Send + Sync {
    /// `Ok(None)` when the user has no document yet.
    async fn load(&self, user_id: &str) -> StoreResult<Option<BanditDocument>>;

    /// Replace the user's document.
    async fn save(&self, user_id: &str, doc: &BanditDocument) -> StoreResult<()>;

    /// `true` if a document existed.
    async fn delete(&self, user_id: &str) -> StoreResult<bool>;
}

#[async_trait]
impl<S: BanditStore + ?Sized> BanditStore for std::sync::Arc<S> {
    async fn load(&self, user_id: &str) -> StoreResult<Option<BanditDocument>> {
        (**self).load(user_id).await
    }

    async fn save(&self, user_id: &str, doc: &BanditDocument) -> StoreResult<()> {
        (**self).save(user_id, doc).await
    }

    async fn delete(&self, user_id: &str) -> StoreResult<bool> {
        (**self).delete(user_id).await
    }
}

/// In-memory store. Data is lost on drop.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    docs: DashMap<String, BanditDocument>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous peek at a stored document.
    pub fn get(&self, user_id: &str) -> Option<BanditDocument> {
        self.docs.get(user_id).map(|d| d.value().clone())
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

#[async_trait]
impl BanditStore for InMemoryStore {
    async fn load(&self, user_id: &str) -> StoreResult<Option<BanditDocument>> {
        Ok(self.get(user_id))
    }

    async fn save(&self, user_id: &str, doc: &BanditDocument) -> StoreResult<()> {
        self.docs.insert(user_id.to_string(), doc.clone());
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> StoreResult<bool> {
        Ok(self.docs.remove(user_id).is_some())
    }
}

/// Directory of `<user_id>.json` documents.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    tmp_seq: AtomicU64,
}

impl JsonFileStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            tmp_seq: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, user_id: &str) -> StoreResult<PathBuf> {
        let bad = user_id.is_empty()
            || user_id.starts_with('.')
            || user_id
                .chars()
                .any(|c| matches!(c, '/' | '\\' | '\0') || c.is_control());
        if bad {
            return Err(StoreError::InvalidKey(user_id.to_string()));
        }
        Ok(self.dir.join(format!("{user_id}.json")))
    }
}

#[async_trait]
impl BanditStore for JsonFileStore {
    async fn load(&self, user_id: &str) -> StoreResult<Option<BanditDocument>> {
        let path = self.path_for(user_id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, user_id: &str, doc: &BanditDocument) -> StoreResult<()> {
        let path = self.path_for(user_id)?;
        let bytes = serde_json::to_vec_pretty(doc)?;
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .dir
            .join(format!(".{user_id}.{}.{seq}.tmp", std::process::id()));
        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(user_id, path = %path.display(), "bandit document written");
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> StoreResult<bool> {
        let path = self.path_for(user_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
