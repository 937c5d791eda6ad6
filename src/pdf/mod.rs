//! Paged-document infrastructure: decoding, loading and rasterization

mod cache;
mod document;
mod loader;
mod request;
mod service;
mod state;
mod types;
mod worker;

pub use cache::{CacheKey, PageCache};
pub use document::{Document, DocumentSource};
pub use loader::{DocumentLoader, load_blocking};
pub use request::{RenderParams, RenderRequest, RenderResponse, RequestId, WorkerFault};
pub use service::RenderService;
pub use state::{Command, Effect, MIN_SCALE, RenderState};
pub use types::*;
pub use worker::render_page;

/// Default rasterization scale for answer sheets
pub const DEFAULT_RENDER_SCALE: f32 = 1.5;

/// Default number of base rasters kept per session
pub const DEFAULT_CACHE_SIZE: usize = 8;
