//! Quire Content Library
//!
//! Deferred publishing for block documents: processed media is staged locally
//! with a preview, referenced from the document by a pending id, uploaded in one
//! batch on save, and the document is rewritten to point at the final URLs.

pub mod coordinator;
pub mod document;
pub mod preview;
pub mod registry;
pub mod resolver;
pub mod session;

// Re-export commonly used types
pub use coordinator::{UploadCoordinator, UploadError, UploadOutcome, UploadRecord, UploadResultMap};
pub use document::{Block, ContentDocument};
pub use preview::PreviewHandle;
pub use registry::{
    EntryState, PendingId, PendingMediaEntry, PendingMediaRegistry, RegistryError, StagedMedia,
    UploadTicket,
};
pub use resolver::{resolve, Resolution, ResolveError, UnresolvedReason, UnresolvedReference};
pub use session::{EditingSession, SaveReport, SessionError, StagedImage};
