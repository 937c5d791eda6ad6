//! Error taxonomy for the grading workspace
//!
//! Every variant is recoverable: the workspace reports it through its
//! notification queue and stays open.

use crate::pdf::WorkerFault;

/// Errors surfaced by workspace operations
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    /// Transport failure or non-success status while fetching a document or
    /// its metadata
    #[error("failed to fetch {resource}: {detail}")]
    Fetch { resource: String, detail: String },

    /// The byte stream could not be parsed as a paged document
    #[error("failed to decode document: {detail}")]
    Decode { detail: String },

    /// Page index out of range or page content could not be rasterized
    #[error("failed to render page {page}: {detail}")]
    Render { page: usize, detail: String },

    /// Navigation past the last or before the first page
    #[error("page {requested} is outside 1..={total}")]
    Boundary { requested: usize, total: usize },

    /// An operation needed a loaded document
    #[error("no document is loaded")]
    NotLoaded,

    /// A second load was started while one is still running
    #[error("a document load is already in flight")]
    LoadInFlight,
}

impl WorkspaceError {
    pub fn fetch(resource: impl Into<String>, detail: impl ToString) -> Self {
        Self::Fetch {
            resource: resource.into(),
            detail: detail.to_string(),
        }
    }

    pub fn decode(detail: impl ToString) -> Self {
        Self::Decode {
            detail: detail.to_string(),
        }
    }

    pub fn render(page: usize, detail: impl ToString) -> Self {
        Self::Render {
            page,
            detail: detail.to_string(),
        }
    }

    /// Short category label used in notifications and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "fetch",
            Self::Decode { .. } => "decode",
            Self::Render { .. } => "render",
            Self::Boundary { .. } => "boundary",
            Self::NotLoaded => "not-loaded",
            Self::LoadInFlight => "load-in-flight",
        }
    }
}

impl WorkspaceError {
    pub(crate) fn from_worker(page: usize, fault: WorkerFault) -> Self {
        match fault {
            WorkerFault::Decode { detail } => Self::Decode { detail },
            other => Self::render(page, other),
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkspaceError>;
