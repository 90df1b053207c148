use bytes::Bytes;
use chrono::{DateTime, Utc};
use quire_core::MediaKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

use crate::preview::PreviewHandle;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Failed to prepare preview directory {path}: {source}")]
    PreviewDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write preview: {0}")]
    PreviewWrite(#[source] std::io::Error),
}

impl From<RegistryError> for quire_core::AppError {
    fn from(err: RegistryError) -> Self {
        quire_core::AppError::Internal(err.to_string())
    }
}

/// Opaque token identifying a staged asset until it is uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PendingId(Uuid);

impl PendingId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PendingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PendingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PendingId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Staged, waiting for a save.
    Created,
    /// Handed to an upload batch that has not finished yet.
    Draining,
}

#[derive(Debug)]
pub struct PendingMediaEntry {
    pub id: PendingId,
    pub payload: Bytes,
    pub kind: MediaKind,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    pub state: EntryState,
    preview: PreviewHandle,
}

impl PendingMediaEntry {
    pub fn preview_uri(&self) -> &str {
        self.preview.uri()
    }

    pub fn preview_path(&self) -> Option<&Path> {
        self.preview.path()
    }
}

/// What the caller gets back when media is staged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedMedia {
    pub id: PendingId,
    pub preview_uri: String,
    pub kind: MediaKind,
    pub content_type: String,
}

/// One entry handed out by [`PendingMediaRegistry::drain`].
#[derive(Debug, Clone)]
pub struct UploadTicket {
    pub id: PendingId,
    /// 1-based position in registration order.
    pub position: usize,
    pub payload: Bytes,
    pub kind: MediaKind,
    pub content_type: String,
}

impl UploadTicket {
    /// Remote file name: `{pendingId}.{ext}`.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.id, extension_for(&self.content_type))
    }
}

/// File extension for a staged content type.
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type.trim().to_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        "video/x-matroska" => "mkv",
        _ => "bin",
    }
}

/// Staging map from pending id to encoded bytes and a local preview.
///
/// Owned by one editing session and driven through `&mut`; iteration follows
/// registration order.
#[derive(Debug)]
pub struct PendingMediaRegistry {
    preview_dir: PathBuf,
    entries: HashMap<PendingId, PendingMediaEntry>,
    order: Vec<PendingId>,
}

impl PendingMediaRegistry {
    pub fn new(preview_dir: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let preview_dir = preview_dir.into();
        std::fs::create_dir_all(&preview_dir).map_err(|source| RegistryError::PreviewDir {
            path: preview_dir.clone(),
            source,
        })?;

        Ok(Self {
            preview_dir,
            entries: HashMap::new(),
            order: Vec::new(),
        })
    }

    pub fn preview_dir(&self) -> &Path {
        &self.preview_dir
    }

    /// Stage encoded bytes and create their preview.
    pub fn add(
        &mut self,
        payload: Bytes,
        kind: MediaKind,
        content_type: &str,
    ) -> Result<StagedMedia, RegistryError> {
        let id = PendingId::new();
        let preview = PreviewHandle::create(&self.preview_dir, extension_for(content_type), &payload)
            .map_err(RegistryError::PreviewWrite)?;

        let staged = StagedMedia {
            id,
            preview_uri: preview.uri().to_string(),
            kind,
            content_type: content_type.to_string(),
        };

        tracing::debug!(
            pending_id = %id,
            kind = kind.as_str(),
            size_bytes = payload.len(),
            "Media staged"
        );

        self.entries.insert(
            id,
            PendingMediaEntry {
                id,
                payload,
                kind,
                content_type: content_type.to_string(),
                created_at: Utc::now(),
                state: EntryState::Created,
                preview,
            },
        );
        self.order.push(id);

        Ok(staged)
    }

    /// Remove one entry and release its preview. Unknown ids return `false`.
    pub fn remove(&mut self, id: &PendingId) -> bool {
        match self.entries.remove(id) {
            Some(mut entry) => {
                entry.preview.release();
                self.order.retain(|existing| existing != id);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &PendingId) -> Option<&PendingMediaEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &PendingId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &PendingMediaEntry> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    /// Mark every entry `Draining` and return upload tickets in registration order.
    ///
    /// Entries stay in the registry until [`release_resolved`](Self::release_resolved)
    /// or go back to `Created` through [`restore_drained`](Self::restore_drained).
    pub fn drain(&mut self) -> Vec<UploadTicket> {
        let mut tickets = Vec::with_capacity(self.order.len());
        for (index, id) in self.order.iter().enumerate() {
            if let Some(entry) = self.entries.get_mut(id) {
                entry.state = EntryState::Draining;
                tickets.push(UploadTicket {
                    id: entry.id,
                    position: index + 1,
                    payload: entry.payload.clone(),
                    kind: entry.kind,
                    content_type: entry.content_type.clone(),
                });
            }
        }
        tickets
    }

    /// Put every draining entry back to `Created` after a failed batch.
    pub fn restore_drained(&mut self) -> usize {
        let mut restored = 0;
        for entry in self.entries.values_mut() {
            if entry.state == EntryState::Draining {
                entry.state = EntryState::Created;
                restored += 1;
            }
        }
        restored
    }

    /// Drop entries whose uploads were resolved into the document.
    pub fn release_resolved<'a>(&mut self, ids: impl IntoIterator<Item = &'a PendingId>) -> usize {
        ids.into_iter().filter(|id| self.remove(id)).count()
    }

    /// Release every entry and its preview.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        for (_, mut entry) in self.entries.drain() {
            entry.preview.release();
        }
        self.order.clear();
        count
    }
}
