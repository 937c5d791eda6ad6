//! Page render worker - runs in a dedicated thread

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use flume::{Receiver, Sender};
use log::{debug, warn};
use mupdf::{Colorspace, Document, Matrix, Pixmap};

use super::cache::{CacheKey, PageCache};
use super::document::open_bytes;
use super::request::{RenderParams, RenderRequest, RenderResponse, RequestId, WorkerFault};
use super::types::PageImage;

/// Main worker function.
///
/// Requests are served in FIFO order. Before each page is rasterized the
/// queue is drained so a `Cancel` that arrived behind its `Page` request
/// still prevents the render.
#[expect(
    clippy::needless_pass_by_value,
    reason = "Values moved into thread, need ownership"
)]
pub fn render_worker(
    bytes: Arc<[u8]>,
    requests: Receiver<RenderRequest>,
    responses: Sender<RenderResponse>,
    cache: Arc<Mutex<PageCache>>,
) {
    let doc = match open_bytes(&bytes) {
        Ok(d) => d,
        Err(e) => {
            warn!("Render worker could not open document: {e}");
            // Answer every page request with the decode failure until shutdown
            for request in requests {
                match request {
                    RenderRequest::Page { id, page, .. } => {
                        let _ = responses.send(RenderResponse::Error {
                            id,
                            page,
                            error: WorkerFault::decode(&e),
                        });
                    }
                    RenderRequest::Cancel(id) => {
                        let _ = responses.send(RenderResponse::Cancelled(id));
                    }
                    RenderRequest::Shutdown => break,
                }
            }
            return;
        }
    };

    let mut backlog: VecDeque<RenderRequest> = VecDeque::new();
    let mut cancelled: HashSet<RequestId> = HashSet::new();

    loop {
        let request = match backlog.pop_front() {
            Some(r) => r,
            None => match requests.recv() {
                Ok(r) => r,
                Err(_) => break,
            },
        };

        match request {
            RenderRequest::Page { id, page, params } => {
                for queued in requests.try_iter() {
                    if let RenderRequest::Cancel(cancel_id) = queued {
                        cancelled.insert(cancel_id);
                    }
                    backlog.push_back(queued);
                }

                if cancelled.contains(&id) {
                    debug!("Skipping cancelled render of page {page} ({id:?})");
                    let _ = responses.send(RenderResponse::Cancelled(id));
                    continue;
                }

                handle_page_request(&doc, id, page, params, &cache, &responses);
            }

            RenderRequest::Cancel(id) => {
                if !cancelled.remove(&id) {
                    debug!("Cancel for {id:?} arrived after it was served");
                }
            }

            RenderRequest::Shutdown => break,
        }
    }
}

fn handle_page_request(
    doc: &Document,
    id: RequestId,
    page: usize,
    params: RenderParams,
    cache: &Arc<Mutex<PageCache>>,
    responses: &Sender<RenderResponse>,
) {
    let key = CacheKey::from_params(page, &params);

    let cached = cache
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .get(&key);
    if let Some(image) = cached {
        let _ = responses.send(RenderResponse::Page { id, page, image });
        return;
    }

    match render_page(doc, page, &params) {
        Ok(image) => {
            let image = cache
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .insert(key, image);
            let _ = responses.send(RenderResponse::Page { id, page, image });
        }
        Err(error) => {
            let _ = responses.send(RenderResponse::Error { id, page, error });
        }
    }
}

/// Rasterize a single page (1-based) at `params.scale`
pub fn render_page(
    doc: &Document,
    page: usize,
    params: &RenderParams,
) -> Result<PageImage, WorkerFault> {
    let total = doc.page_count()?.max(0) as usize;
    if page == 0 || page > total {
        return Err(WorkerFault::PageOutOfRange { page, total });
    }

    let mupdf_page = doc.load_page((page - 1) as i32)?;
    let transform = Matrix::new_scale(params.scale, params.scale);
    let rgb = Colorspace::device_rgb();
    let pixmap = mupdf_page.to_pixmap(&transform, &rgb, false, false)?;

    let pixels = pixmap_to_rgba(&pixmap)?;

    Ok(PageImage {
        page,
        pixels,
        width: pixmap.width(),
        height: pixmap.height(),
    })
}

fn pixmap_to_rgba(pixmap: &Pixmap) -> Result<Vec<u8>, WorkerFault> {
    let n = pixmap.n() as usize;
    if n < 3 {
        return Err(WorkerFault::generic(format!(
            "Unsupported pixmap format: {n} channels"
        )));
    }

    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    let row_bytes = width * n;
    let expected_min = stride.saturating_mul(height);
    if samples.len() < expected_min || row_bytes > stride {
        return Err(WorkerFault::generic("Pixmap buffer size mismatch"));
    }

    let mut out = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        let row_start = y * stride;
        let row = &samples[row_start..row_start + row_bytes];
        for px in row.chunks_exact(n) {
            out.extend_from_slice(&px[..3]);
            out.push(u8::MAX);
        }
    }

    Ok(out)
}
