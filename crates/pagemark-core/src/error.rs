//! Engine errors.

use thiserror::Error;

/// Errors returned synchronously by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid page number {page}. Must be 1~{page_count}")]
    InvalidPage { page: u32, page_count: u32 },
    #[error("Page is still loading")]
    NotReady,
    #[error("Unsupported image format")]
    UnsupportedImage,
    #[error("Invalid image size")]
    InvalidImageSize,
    #[error("No image selected")]
    NothingSelected,
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
