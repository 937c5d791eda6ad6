//! Render service - owns the worker thread and the page cache

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender};
use log::{debug, warn};

use super::cache::{CacheKey, PageCache};
use super::request::{RenderParams, RenderRequest, RenderResponse, RequestId};
use super::worker::render_worker;

/// Rasterizes pages off the event thread.
///
/// A single worker keeps requests in submission order; the caller polls
/// responses from its own thread and decides which ones are still wanted.
pub struct RenderService {
    request_tx: Sender<RenderRequest>,
    response_rx: Receiver<RenderResponse>,
    next_request_id: u64,
    pending: HashMap<RequestId, usize>,
    cache: Arc<Mutex<PageCache>>,
    worker: Option<JoinHandle<()>>,
}

impl RenderService {
    #[must_use]
    pub fn new(bytes: Arc<[u8]>, cache_size: usize) -> Self {
        let cache = Arc::new(Mutex::new(PageCache::new(cache_size)));
        let (request_tx, request_rx) = flume::unbounded();
        let (response_tx, response_rx) = flume::unbounded();

        let worker_cache = Arc::clone(&cache);
        let worker = std::thread::Builder::new()
            .name("inkgrade-render".to_string())
            .spawn(move || render_worker(bytes, request_rx, response_tx, worker_cache))
            .map_err(|e| warn!("Failed to spawn render worker: {e}"))
            .ok();

        Self {
            request_tx,
            response_rx,
            next_request_id: 1,
            pending: HashMap::new(),
            cache,
            worker,
        }
    }

    /// Queue a page (1-based) for rendering
    pub fn request_page(&mut self, page: usize, params: RenderParams) -> RequestId {
        let id = self.next_id();
        if self
            .request_tx
            .send(RenderRequest::Page { id, page, params })
            .is_err()
        {
            warn!("Render worker is gone; page {page} will not be rendered");
        }
        self.pending.insert(id, page);
        debug!("Requested page {page} as {id:?}");
        id
    }

    /// Ask the worker to skip `id` if it has not started on it yet.
    ///
    /// Responses for a cancelled id may still arrive; callers must compare
    /// ids before using a response.
    pub fn cancel(&mut self, id: RequestId) {
        if self.pending.remove(&id).is_some() {
            let _ = self.request_tx.send(RenderRequest::Cancel(id));
        }
    }

    #[must_use]
    pub fn is_pending(&self, id: RequestId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Drain completed responses without blocking
    pub fn poll_responses(&mut self) -> Vec<RenderResponse> {
        let mut responses = vec![];
        while let Ok(response) = self.response_rx.try_recv() {
            self.pending.remove(&response.id());
            responses.push(response);
        }
        responses
    }

    /// Block up to `timeout` for the next response
    pub fn wait_response(&mut self, timeout: Duration) -> Option<RenderResponse> {
        match self.response_rx.recv_timeout(timeout) {
            Ok(response) => {
                self.pending.remove(&response.id());
                Some(response)
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    #[must_use]
    pub fn is_page_cached(&self, page: usize, params: &RenderParams) -> bool {
        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains(&CacheKey::from_params(page, params))
    }

    /// Drop every cached raster
    pub fn invalidate_cache(&self) {
        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .invalidate_all();
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Stop the worker and wait for it to exit. Safe to call more than once.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };
        let _ = self.request_tx.send(RenderRequest::Shutdown);
        if handle.join().is_err() {
            warn!("Render worker panicked during shutdown");
        }
        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .invalidate_all();
    }

    fn next_id(&mut self) -> RequestId {
        let id = RequestId::new(self.next_request_id);
        self.next_request_id += 1;
        id
    }
}

impl Drop for RenderService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
