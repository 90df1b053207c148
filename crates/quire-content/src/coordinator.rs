use quire_storage::{Storage, StorageError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::registry::{PendingId, PendingMediaRegistry};

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Upload of asset {id} (position {position}) failed: {source}")]
    EntryFailed {
        id: PendingId,
        position: usize,
        #[source]
        source: StorageError,
    },

    #[error("Upload cancelled before asset {id} (position {position}) completed")]
    Cancelled { id: PendingId, position: usize },
}

impl UploadError {
    /// Pending id of the asset the batch stopped on.
    pub fn pending_id(&self) -> PendingId {
        match self {
            UploadError::EntryFailed { id, .. } | UploadError::Cancelled { id, .. } => *id,
        }
    }

    pub fn position(&self) -> usize {
        match self {
            UploadError::EntryFailed { position, .. } | UploadError::Cancelled { position, .. } => {
                *position
            }
        }
    }
}

impl From<UploadError> for quire_core::AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::EntryFailed {
                id,
                position,
                source,
            } => quire_core::AppError::UploadFailed {
                asset: format!("{} (position {})", id, position),
                reason: source.to_string(),
            },
            cancelled @ UploadError::Cancelled { .. } => {
                quire_core::AppError::Cancelled(cancelled.to_string())
            }
        }
    }
}

/// Per-entry outcome of an upload batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum UploadOutcome {
    Uploaded { url: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    pub pending_id: PendingId,
    #[serde(flatten)]
    pub outcome: UploadOutcome,
}

/// Pending id to upload outcome, iterated in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadResultMap {
    records: Vec<UploadRecord>,
}

impl UploadResultMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the outcome for `id`, keeping its original position.
    pub fn insert(&mut self, id: PendingId, outcome: UploadOutcome) {
        match self.records.iter_mut().find(|r| r.pending_id == id) {
            Some(record) => record.outcome = outcome,
            None => self.records.push(UploadRecord {
                pending_id: id,
                outcome,
            }),
        }
    }

    pub fn get(&self, id: &PendingId) -> Option<&UploadOutcome> {
        self.records
            .iter()
            .find(|r| &r.pending_id == id)
            .map(|r| &r.outcome)
    }

    /// Final URL when the entry uploaded successfully.
    pub fn url_for(&self, id: &PendingId) -> Option<&str> {
        match self.get(id) {
            Some(UploadOutcome::Uploaded { url }) => Some(url),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &UploadRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn uploaded_ids(&self) -> impl Iterator<Item = &PendingId> {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, UploadOutcome::Uploaded { .. }))
            .map(|r| &r.pending_id)
    }
}

/// Uploads every staged entry, one at a time, in registration order.
///
/// A batch is all-or-nothing from the caller's point of view: the first failure
/// discards the URLs gathered so far and returns every entry to `Created`.
/// Objects already written by the backend are not deleted, so a retried save
/// uploads them again.
#[derive(Clone)]
pub struct UploadCoordinator {
    storage: Arc<dyn Storage>,
    folder: String,
}

impl UploadCoordinator {
    pub fn new(storage: Arc<dyn Storage>, folder: impl Into<String>) -> Self {
        Self {
            storage,
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &str {
        &self.folder
    }

    pub async fn upload_all(
        &self,
        registry: &mut PendingMediaRegistry,
        cancel: &CancellationToken,
    ) -> Result<UploadResultMap, UploadError> {
        let tickets = registry.drain();
        let total = tickets.len();
        let start = std::time::Instant::now();
        let mut results = UploadResultMap::new();

        for ticket in tickets {
            let file_name = ticket.file_name();

            let uploaded = if cancel.is_cancelled() {
                None
            } else {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    result = self.storage.upload(
                        &self.folder,
                        &file_name,
                        &ticket.content_type,
                        ticket.payload.clone(),
                    ) => Some(result),
                }
            };

            match uploaded {
                Some(Ok(stored)) => {
                    tracing::info!(
                        pending_id = %ticket.id,
                        position = ticket.position,
                        total = total,
                        storage_key = %stored.key,
                        size_bytes = ticket.payload.len(),
                        "Asset uploaded"
                    );
                    results.insert(ticket.id, UploadOutcome::Uploaded { url: stored.url });
                }
                Some(Err(source)) => {
                    let restored = registry.restore_drained();
                    tracing::error!(
                        pending_id = %ticket.id,
                        position = ticket.position,
                        total = total,
                        discarded = results.len(),
                        restored = restored,
                        error = %source,
                        "Upload batch aborted"
                    );
                    return Err(UploadError::EntryFailed {
                        id: ticket.id,
                        position: ticket.position,
                        source,
                    });
                }
                None => {
                    let restored = registry.restore_drained();
                    tracing::warn!(
                        pending_id = %ticket.id,
                        position = ticket.position,
                        discarded = results.len(),
                        restored = restored,
                        "Upload batch cancelled"
                    );
                    return Err(UploadError::Cancelled {
                        id: ticket.id,
                        position: ticket.position,
                    });
                }
            }
        }

        tracing::info!(
            uploaded = results.len(),
            folder = %self.folder,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Upload batch completed"
        );

        Ok(results)
    }
}
