//! Remote store abstraction.
//!
//! Everything the engine persists goes through [`RemoteStore`]. Calls are
//! independent of each other and keyed by entity id; the engine never orders
//! one write after another.

mod memory;

pub use memory::{ExportedDocument, ExportedImage, ExportedPage, ExportedStroke, MemoryRemote};

use crate::objects::{ImageId, ImageTransform, NewImage, PlacedImage};
use crate::strokes::{Stroke, StrokeId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Remote store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Transient transport failure.
    #[error("Network error: {0}")]
    Network(String),
    /// Validation or business refusal, such as an exhausted quota.
    #[error("Rejected: {0}")]
    Rejected(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Boxed future for remote calls. Not `Send`: the engine runs on one thread.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Server-assigned document identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "document#{}", self.0)
    }
}

/// Kind of remote call, used to tag tracked tasks and failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteOp {
    CreateStroke,
    ListStrokes,
    DeleteStroke,
    ClearStrokes,
    ListImages,
    FetchImage,
    CreateImage,
    UpdateImage,
    DeleteImage,
    FetchRaster,
    Export,
    /// Composite reload of strokes, raster and images.
    LoadPage,
}

impl RemoteOp {
    /// Whether the call mutates remote state.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            RemoteOp::CreateStroke
                | RemoteOp::DeleteStroke
                | RemoteOp::ClearStrokes
                | RemoteOp::CreateImage
                | RemoteOp::UpdateImage
                | RemoteOp::DeleteImage
        )
    }
}

impl fmt::Display for RemoteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RemoteOp::CreateStroke => "create stroke",
            RemoteOp::ListStrokes => "list strokes",
            RemoteOp::DeleteStroke => "delete stroke",
            RemoteOp::ClearStrokes => "clear page strokes",
            RemoteOp::ListImages => "list page images",
            RemoteOp::FetchImage => "fetch image bytes",
            RemoteOp::CreateImage => "create image",
            RemoteOp::UpdateImage => "update image transform",
            RemoteOp::DeleteImage => "delete image",
            RemoteOp::FetchRaster => "fetch page raster",
            RemoteOp::Export => "export document",
            RemoteOp::LoadPage => "load page",
        };
        f.write_str(name)
    }
}

/// Persistence backend for strokes, images and page rasters.
///
/// Futures borrow the store only; implementations copy whatever they need
/// from the other arguments before returning.
pub trait RemoteStore {
    /// Persist a stroke and return its assigned id.
    fn create_stroke(&self, document: DocumentId, stroke: &Stroke) -> BoxFuture<'_, RemoteResult<StrokeId>>;

    /// Strokes of a page in creation order.
    fn list_strokes(&self, document: DocumentId, page: u32) -> BoxFuture<'_, RemoteResult<Vec<Stroke>>>;

    fn delete_stroke(&self, id: StrokeId) -> BoxFuture<'_, RemoteResult<()>>;

    fn clear_page_strokes(&self, document: DocumentId, page: u32) -> BoxFuture<'_, RemoteResult<()>>;

    fn list_page_images(&self, document: DocumentId, page: u32) -> BoxFuture<'_, RemoteResult<Vec<PlacedImage>>>;

    fn fetch_image_bytes(&self, id: ImageId) -> BoxFuture<'_, RemoteResult<Vec<u8>>>;

    /// Persist a new image and return its assigned id.
    fn create_image(&self, document: DocumentId, image: &NewImage) -> BoxFuture<'_, RemoteResult<ImageId>>;

    fn update_image_transform(&self, id: ImageId, transform: ImageTransform) -> BoxFuture<'_, RemoteResult<()>>;

    fn delete_image(&self, id: ImageId) -> BoxFuture<'_, RemoteResult<()>>;

    /// Encoded raster of a page rendered at `dpi`.
    fn fetch_page_raster(&self, document: DocumentId, page: u32, dpi: u32) -> BoxFuture<'_, RemoteResult<Vec<u8>>>;

    /// Finished document with every persisted annotation applied.
    fn export_document(&self, document: DocumentId) -> BoxFuture<'_, RemoteResult<Vec<u8>>>;
}

/// Run a future on a current-thread runtime inside a `LocalSet`.
#[cfg(test)]
pub(crate) fn run_local<F: Future>(future: F) -> F::Output {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("build test runtime");
    tokio::task::LocalSet::new().block_on(&runtime, future)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_classification() {
        assert!(RemoteOp::CreateStroke.is_write());
        assert!(RemoteOp::UpdateImage.is_write());
        assert!(RemoteOp::ClearStrokes.is_write());
        assert!(!RemoteOp::ListStrokes.is_write());
        assert!(!RemoteOp::LoadPage.is_write());
        assert!(!RemoteOp::Export.is_write());
    }

    #[test]
    fn test_error_messages() {
        let err = RemoteError::Rejected("Insufficient quota".into());
        assert_eq!(err.to_string(), "Rejected: Insufficient quota");
        assert_eq!(RemoteOp::UpdateImage.to_string(), "update image transform");
    }

    #[test]
    fn test_run_local_allows_spawn_local() {
        let value = run_local(async {
            let handle = tokio::task::spawn_local(async { 21 * 2 });
            handle.await.unwrap()
        });
        assert_eq!(value, 42);
    }
}
