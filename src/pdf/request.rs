//! Render request and response types

use std::sync::Arc;

use super::types::PageImage;

/// Unique identifier for render requests
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

impl RequestId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Parameters for rendering a page
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderParams {
    /// Scale applied to page units (1.0 = 72 dpi)
    pub scale: f32,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            scale: super::DEFAULT_RENDER_SCALE,
        }
    }
}

/// Request sent to the render worker
#[derive(Debug)]
pub enum RenderRequest {
    /// Rasterize a page (1-based)
    Page {
        id: RequestId,
        page: usize,
        params: RenderParams,
    },

    /// Drop a request if it has not been served yet
    Cancel(RequestId),

    /// Shutdown the worker
    Shutdown,
}

/// Errors from render workers
#[derive(Debug, thiserror::Error)]
pub enum WorkerFault {
    #[error("PDF engine: {0}")]
    Pdf(#[from] mupdf::error::Error),

    #[error("cannot decode document: {detail}")]
    Decode { detail: String },

    #[error("page {page} is outside 1..={total}")]
    PageOutOfRange { page: usize, total: usize },

    #[error("{detail}")]
    Generic { detail: String },
}

impl WorkerFault {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic { detail: msg.into() }
    }

    pub fn decode(err: impl ToString) -> Self {
        Self::Decode {
            detail: err.to_string(),
        }
    }
}

/// Response from the render worker
#[derive(Debug)]
pub enum RenderResponse {
    /// Rendered page raster
    Page {
        id: RequestId,
        page: usize,
        image: Arc<PageImage>,
    },

    /// Request was cancelled before it was served
    Cancelled(RequestId),

    /// Error during rendering
    Error {
        id: RequestId,
        page: usize,
        error: WorkerFault,
    },
}

impl RenderResponse {
    #[must_use]
    pub fn id(&self) -> RequestId {
        match self {
            Self::Page { id, .. } | Self::Cancelled(id) | Self::Error { id, .. } => *id,
        }
    }
}
