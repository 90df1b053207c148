use serde_json::Value;
use std::fmt;

use crate::coordinator::{UploadOutcome, UploadResultMap};
use crate::document::{ContentDocument, PENDING_ID_FIELD};
use crate::registry::PendingId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnresolvedReason {
    /// No outcome for this id; the block references an asset that was never
    /// staged, was discarded, or has a malformed id.
    NotInResults,
    UploadFailed(String),
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnresolvedReason::NotInResults => write!(f, "not in upload results"),
            UnresolvedReason::UploadFailed(reason) => write!(f, "upload failed: {}", reason),
        }
    }
}

/// A block whose pending reference could not be rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedReference {
    pub block_index: usize,
    pub block_id: Option<String>,
    pub pending_id: String,
    pub reason: UnresolvedReason,
}

impl fmt::Display for UnresolvedReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "block {} ({}) references {}: {}",
            self.block_index,
            self.block_id.as_deref().unwrap_or("no id"),
            self.pending_id,
            self.reason
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("{} unresolved reference(s) left in document", .0.len())]
    Unresolved(Vec<UnresolvedReference>),
}

impl From<ResolveError> for quire_core::AppError {
    fn from(err: ResolveError) -> Self {
        quire_core::AppError::UnresolvedReference(err.to_string())
    }
}

/// Rewritten document plus what could and could not be resolved.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub document: ContentDocument,
    /// Ids whose blocks now carry their final URL, in block order.
    pub resolved: Vec<PendingId>,
    pub unresolved: Vec<UnresolvedReference>,
}

impl Resolution {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }

    /// Fail on any unresolved reference instead of returning it as a warning.
    pub fn into_strict(self) -> Result<ContentDocument, ResolveError> {
        if self.unresolved.is_empty() {
            Ok(self.document)
        } else {
            Err(ResolveError::Unresolved(self.unresolved))
        }
    }
}

/// Replace pending references with final URLs.
///
/// For each block whose `data.file.pendingId` has an `Uploaded` outcome, sets
/// `data.file.url` and drops `pendingId`. Everything else is left untouched.
/// The input is not modified, and resolving an already resolved document
/// returns it unchanged.
pub fn resolve(document: &ContentDocument, results: &UploadResultMap) -> Resolution {
    let mut output = document.clone();
    let mut resolved = Vec::new();
    let mut unresolved = Vec::new();

    for (index, block) in output.blocks.iter_mut().enumerate() {
        let Some(reference) = block.pending_ref().map(str::to_string) else {
            continue;
        };

        let outcome = reference
            .parse::<PendingId>()
            .ok()
            .and_then(|id| results.get(&id).map(|outcome| (id, outcome)));

        let reason = match outcome {
            Some((id, UploadOutcome::Uploaded { url })) => {
                if let Some(file) = block.file_mut() {
                    file.insert("url".to_string(), Value::String(url.clone()));
                    file.remove(PENDING_ID_FIELD);
                }
                resolved.push(id);
                continue;
            }
            Some((_, UploadOutcome::Failed { reason })) => {
                UnresolvedReason::UploadFailed(reason.clone())
            }
            None => UnresolvedReason::NotInResults,
        };

        tracing::warn!(
            block_index = index,
            block_id = block.id.as_deref().unwrap_or(""),
            pending_id = %reference,
            reason = %reason,
            "Unresolved media reference left in document"
        );
        unresolved.push(UnresolvedReference {
            block_index: index,
            block_id: block.id.clone(),
            pending_id: reference,
            reason,
        });
    }

    tracing::debug!(
        resolved = resolved.len(),
        unresolved = unresolved.len(),
        "Document references resolved"
    );

    Resolution {
        document: output,
        resolved,
        unresolved,
    }
}
