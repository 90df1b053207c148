//! Domain models shared by the processing, staging and storage crates.

pub mod geometry;
pub mod media;

pub use geometry::{CropRegion, GeometryError, Rotation};
pub use media::{MediaKind, OutputFormat, ProcessedAsset, ProcessingOptions};
