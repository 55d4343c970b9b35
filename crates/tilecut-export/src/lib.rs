//! tilecut-export: Pure serializers for slice output (sans-IO)
//!
//! Encodes slice buffers as PNG, names them deterministically from
//! their grid position, and describes the whole set in a JSON manifest.
//! Nothing here touches the filesystem; callers write the bytes.

pub mod manifest;
pub mod png;

pub use manifest::{Manifest, ManifestEntry};
pub use png::{ExportedFile, encode_png, export_slices, slice_file_name};

/// Errors that can occur while serializing slices.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// PNG encoding failed.
    #[error("failed to encode PNG: {0}")]
    Encode(#[from] image::ImageError),

    /// Manifest serialization failed.
    #[error("failed to serialize manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}
