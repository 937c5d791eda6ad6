//! Immutable paged-document handle
//!
//! The handle owns the raw source bytes for the lifetime of a workspace
//! session. MuPDF documents are not `Send`, so every thread that needs the
//! decoded form (loader, render worker, geometry lookups) re-opens it from
//! the shared bytes.

use std::path::PathBuf;
use std::sync::Arc;

use log::debug;

use super::request::WorkerFault;
use super::types::PageGeometry;

/// MIME hint handed to MuPDF when opening from memory
const PDF_MAGIC: &str = "application/pdf";

/// Where the document bytes come from
#[derive(Clone, Debug)]
pub enum DocumentSource {
    /// Opaque sheet identifier resolved against the sheet service
    Remote { sheet: String },
    /// Local file, mostly for offline review and tooling
    File { path: PathBuf },
    /// Bytes already in memory
    Memory { label: String, bytes: Arc<[u8]> },
}

impl DocumentSource {
    pub fn remote(sheet: impl Into<String>) -> Self {
        Self::Remote {
            sheet: sheet.into(),
        }
    }

    pub fn memory(label: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::Memory {
            label: label.into(),
            bytes: bytes.into(),
        }
    }

    /// Identifier used for logging and the verdict handoff
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Remote { sheet } => sheet.clone(),
            Self::File { path } => path.display().to_string(),
            Self::Memory { label, .. } => label.clone(),
        }
    }
}

/// Decoded paged document
#[derive(Clone)]
pub struct Document {
    sheet: String,
    bytes: Arc<[u8]>,
    page_count: usize,
}

impl Document {
    /// Decode `bytes` and capture the page count.
    ///
    /// Fails with [`WorkerFault::Decode`] when MuPDF cannot parse the stream
    /// or the document has no pages.
    pub fn decode(sheet: impl Into<String>, bytes: Arc<[u8]>) -> Result<Self, WorkerFault> {
        let sheet = sheet.into();
        let doc = open_bytes(&bytes)?;
        let page_count = doc.page_count().map_err(WorkerFault::decode)?;
        if page_count <= 0 {
            return Err(WorkerFault::decode("document has no pages"));
        }

        debug!(
            "Decoded {sheet}: {page_count} pages, {} bytes",
            bytes.len()
        );

        Ok(Self {
            sheet,
            bytes,
            page_count: page_count as usize,
        })
    }

    #[must_use]
    pub fn sheet(&self) -> &str {
        &self.sheet
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Shared source bytes, handed to render workers
    #[must_use]
    pub fn source_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    #[must_use]
    pub fn contains_page(&self, page: usize) -> bool {
        (1..=self.page_count).contains(&page)
    }

    /// Look up the unscaled geometry of `page` (1-based)
    pub fn page_geometry(&self, page: usize) -> Result<PageGeometry, WorkerFault> {
        if !self.contains_page(page) {
            return Err(WorkerFault::PageOutOfRange {
                page,
                total: self.page_count,
            });
        }
        let doc = open_bytes(&self.bytes)?;
        let bounds = doc.load_page((page - 1) as i32)?.bounds()?;
        Ok(PageGeometry {
            width: bounds.x1 - bounds.x0,
            height: bounds.y1 - bounds.y0,
        })
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("sheet", &self.sheet)
            .field("page_count", &self.page_count)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

pub(crate) fn open_bytes(bytes: &[u8]) -> Result<mupdf::Document, WorkerFault> {
    mupdf::Document::from_bytes(bytes, PDF_MAGIC).map_err(WorkerFault::decode)
}
