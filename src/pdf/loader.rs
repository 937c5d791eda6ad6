//! Document loader - fetch and decode off the event thread

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, TryRecvError};
use log::{info, warn};

use super::document::{Document, DocumentSource};
use crate::error::{Result, WorkspaceError};
use crate::fetch::SheetClient;

struct InFlight {
    label: String,
    rx: Receiver<Result<Document>>,
    handle: JoinHandle<()>,
}

/// Loads at most one document at a time.
///
/// There is no retry policy; a failed load is reported once and the caller
/// decides whether to start another.
pub struct DocumentLoader {
    client: Option<SheetClient>,
    in_flight: Option<InFlight>,
}

impl DocumentLoader {
    /// `client` is only needed for [`DocumentSource::Remote`]
    #[must_use]
    pub fn new(client: Option<SheetClient>) -> Self {
        Self {
            client,
            in_flight: None,
        }
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Begin loading `source` on a background thread
    pub fn start(&mut self, source: DocumentSource) -> Result<()> {
        if self.in_flight.is_some() {
            return Err(WorkspaceError::LoadInFlight);
        }

        let label = source.label();
        let client = self.client.clone();
        let (tx, rx) = flume::bounded(1);

        info!("Loading document {label}");
        let handle = std::thread::Builder::new()
            .name("inkgrade-loader".to_string())
            .spawn(move || {
                let outcome = load_blocking(client.as_ref(), source);
                let _ = tx.send(outcome);
            })
            .map_err(|e| WorkspaceError::fetch(&label, e))?;

        self.in_flight = Some(InFlight { label, rx, handle });
        Ok(())
    }

    /// Non-blocking check for a finished load
    pub fn poll(&mut self) -> Option<Result<Document>> {
        let in_flight = self.in_flight.as_ref()?;
        match in_flight.rx.try_recv() {
            Ok(outcome) => Some(self.finish(outcome)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(self.finish_disconnected()),
        }
    }

    /// Block up to `timeout` for the load to finish
    pub fn wait(&mut self, timeout: Duration) -> Option<Result<Document>> {
        let in_flight = self.in_flight.as_ref()?;
        match in_flight.rx.recv_timeout(timeout) {
            Ok(outcome) => Some(self.finish(outcome)),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(self.finish_disconnected()),
        }
    }

    fn finish(&mut self, outcome: Result<Document>) -> Result<Document> {
        if let Some(in_flight) = self.in_flight.take() {
            let _ = in_flight.handle.join();
            match &outcome {
                Ok(doc) => info!("Loaded {} ({} pages)", in_flight.label, doc.page_count()),
                Err(e) => warn!("Loading {} failed: {e}", in_flight.label),
            }
        }
        outcome
    }

    fn finish_disconnected(&mut self) -> Result<Document> {
        let label = self
            .in_flight
            .take()
            .map(|in_flight| {
                let _ = in_flight.handle.join();
                in_flight.label
            })
            .unwrap_or_default();
        Err(WorkspaceError::fetch(label, "loader thread exited without a result"))
    }
}

/// Fetch and decode synchronously
pub fn load_blocking(client: Option<&SheetClient>, source: DocumentSource) -> Result<Document> {
    let label = source.label();
    let bytes: Arc<[u8]> = match source {
        DocumentSource::Remote { sheet } => {
            let client = client.ok_or_else(|| {
                WorkspaceError::fetch(&sheet, "no sheet service client configured")
            })?;
            client.fetch_document(&sheet)?.into()
        }
        DocumentSource::File { path } => std::fs::read(&path)
            .map_err(|e| WorkspaceError::fetch(path.display().to_string(), e))?
            .into(),
        DocumentSource::Memory { bytes, .. } => bytes,
    };

    Document::decode(label, bytes).map_err(WorkspaceError::decode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_load_is_rejected_while_first_runs() {
        let mut loader = DocumentLoader::new(None);
        loader
            .start(DocumentSource::memory("a", vec![0u8; 16]))
            .unwrap();
        let second = loader.start(DocumentSource::memory("b", vec![0u8; 16]));
        // The first load may already be finished but not yet polled
        assert!(matches!(second, Err(WorkspaceError::LoadInFlight)));

        let outcome = loader.wait(Duration::from_secs(5)).unwrap();
        assert!(matches!(outcome, Err(WorkspaceError::Decode { .. })));
        assert!(!loader.is_loading());
    }

    #[test]
    fn remote_without_client_is_fetch_error() {
        let err = load_blocking(None, DocumentSource::remote("S-9")).unwrap_err();
        assert!(matches!(err, WorkspaceError::Fetch { .. }));
    }

    #[test]
    fn missing_file_is_fetch_error() {
        let err = load_blocking(
            None,
            DocumentSource::File {
                path: "/nonexistent/sheet.pdf".into(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, WorkspaceError::Fetch { .. }));
    }
}
