//! Grading workspace session
//!
//! Wires the loader, the render service, the annotation store, the tool
//! machine, navigation and the score ledger. Everything here runs on the
//! caller's thread; loading and rasterization happen on worker threads and
//! are picked up by [`Workspace::poll`] or [`Workspace::block_until_idle`].
//!
//! Pointer input is gated on the surface: until the base raster of the
//! displayed page has arrived (and the surface has been resized to it),
//! gestures are discarded rather than interpreted against stale dimensions.

use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::annotations::AnnotationStore;
use crate::compose::Compositor;
use crate::error::{Result, WorkspaceError};
use crate::fetch::{QuestionSchema, SheetClient};
use crate::navigation::NavigationController;
use crate::notification::NotificationManager;
use crate::pdf::{
    Command, Document, DocumentLoader, DocumentSource, Effect, PageImage, RenderResponse,
    RenderService, RenderState, RequestId, SurfaceSize,
};
use crate::probe::ConnectivityProbe;
use crate::score::{MarkValue, ScoreEntry, ScoreLedger, Verdict, VerdictHandoff, VerdictSink};
use crate::settings::Settings;
use crate::tools::{Gesture, NoPrompt, StoreChange, TextPrompt, Tool, ToolContext, ToolMachine};

/// Longest single wait inside [`Workspace::block_until_idle`]
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// What happened to a pointer gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureOutcome {
    /// The surface was not ready for the displayed page
    Discarded,
    /// Accepted by the tool machine without touching the store
    Consumed,
    /// The store changed
    Changed(StoreChange),
}

pub struct Workspace {
    settings: Settings,
    client: Option<SheetClient>,
    loader: DocumentLoader,
    document: Option<Document>,
    renderer: Option<RenderService>,
    render_state: RenderState,
    pending: Option<RequestId>,
    base: Option<Arc<PageImage>>,
    surface: Option<PageImage>,
    surface_size: SurfaceSize,
    nav: NavigationController,
    store: AnnotationStore,
    tools: ToolMachine,
    ledger: ScoreLedger,
    compositor: Compositor,
    notifications: NotificationManager,
    probe: Option<ConnectivityProbe>,
    torn_down: bool,
}

impl Workspace {
    /// Create an empty session.
    ///
    /// Starts the connectivity probe unless `probe_interval_secs` is 0.
    pub fn new(settings: Settings) -> Result<Self> {
        let client = SheetClient::new(&settings)?;
        let mut notifications = NotificationManager::new();

        let probe = if settings.probe_interval_secs > 0 {
            match ConnectivityProbe::start(
                settings.server_url.clone(),
                Duration::from_secs(settings.probe_interval_secs),
                Duration::from_secs(settings.request_timeout_secs.max(1)),
            ) {
                Ok(probe) => Some(probe),
                Err(e) => {
                    warn!("Connectivity probe not started: {e}");
                    notifications.report(&e);
                    None
                }
            }
        } else {
            None
        };

        info!(
            "Workspace created (scale {}, undo scope {})",
            settings.render_scale,
            settings.undo_scope.as_str()
        );

        Ok(Self {
            render_state: RenderState::new(settings.render_scale),
            nav: NavigationController::new(settings.count_failed_navigation),
            ledger: ScoreLedger::from_schema(&[], settings.clamp_awarded_marks),
            loader: DocumentLoader::new(Some(client.clone())),
            client: Some(client),
            document: None,
            renderer: None,
            pending: None,
            base: None,
            surface: None,
            surface_size: SurfaceSize::default(),
            store: AnnotationStore::new(0),
            tools: ToolMachine::new(),
            compositor: Compositor::new(),
            notifications,
            probe,
            torn_down: false,
            settings,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Begin loading a document. Completion is picked up by `poll`.
    pub fn open(&mut self, source: DocumentSource) -> Result<()> {
        self.loader.start(source).inspect_err(|e| self.notifications.report(e))
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loader.is_loading()
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    /// Fetch the question schema for `sheet` and seed the ledger
    pub fn load_questions(&mut self, sheet: &str) -> Result<()> {
        let client = self.client.as_ref().ok_or_else(|| {
            WorkspaceError::fetch(sheet, "no sheet service client configured")
        })?;
        match client.fetch_questions(sheet) {
            Ok(questions) => {
                self.set_questions(&questions);
                Ok(())
            }
            Err(e) => {
                warn!("Question schema for {sheet} unavailable: {e}");
                self.notifications.report(&e);
                Err(e)
            }
        }
    }

    /// Seed the ledger from an already available schema
    pub fn set_questions(&mut self, questions: &[QuestionSchema]) {
        self.ledger = ScoreLedger::from_schema(questions, self.settings.clamp_awarded_marks);
    }

    /// Process finished loads and renders without blocking
    pub fn poll(&mut self) {
        if let Some(outcome) = self.loader.poll() {
            self.finish_load(outcome);
        }
        let responses = self
            .renderer
            .as_mut()
            .map(RenderService::poll_responses)
            .unwrap_or_default();
        for response in responses {
            self.handle_response(response);
        }
    }

    /// Wait until no load or render is outstanding.
    ///
    /// Returns false if `timeout` elapsed first.
    pub fn block_until_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.poll();
            let remaining = deadline.saturating_duration_since(Instant::now());

            if self.loader.is_loading() {
                if remaining.is_zero() {
                    return false;
                }
                if let Some(outcome) = self.loader.wait(remaining.min(WAIT_SLICE)) {
                    self.finish_load(outcome);
                }
                continue;
            }

            if self.pending.is_some() {
                let Some(renderer) = self.renderer.as_mut() else {
                    self.pending = None;
                    continue;
                };
                if remaining.is_zero() {
                    return false;
                }
                if let Some(response) = renderer.wait_response(remaining.min(WAIT_SLICE)) {
                    self.handle_response(response);
                }
                continue;
            }

            return true;
        }
    }

    fn finish_load(&mut self, outcome: Result<Document>) {
        let document = match outcome {
            Ok(document) => document,
            Err(e) => {
                self.notifications.report(&e);
                return;
            }
        };

        if self.document.is_some() {
            self.unload();
        }

        let page_count = document.page_count();
        info!("Workspace opened {} with {page_count} pages", document.sheet());
        self.nav.load(page_count);
        self.store = AnnotationStore::new(page_count);
        self.renderer = Some(RenderService::new(
            document.source_bytes(),
            self.settings.cache_size,
        ));
        self.document = Some(document);
        self.apply(Command::DocumentLoaded { page_count });
    }

    fn unload(&mut self) {
        self.apply(Command::Unload);
        if let Some(mut renderer) = self.renderer.take() {
            renderer.shutdown();
        }
        self.document = None;
        self.nav.unload();
        self.store = AnnotationStore::new(0);
        self.ledger = ScoreLedger::from_schema(&[], self.settings.clamp_awarded_marks);
    }

    fn handle_response(&mut self, response: RenderResponse) {
        if self.pending != Some(response.id()) {
            debug!("Dropping stale render response {:?}", response.id());
            return;
        }
        self.pending = None;

        match response {
            RenderResponse::Page { page, image, .. } => {
                // The surface takes the raster's size before anything is drawn
                self.surface_size = image.size();
                self.base = Some(image);
                self.apply(Command::PageRendered { page });
            }
            RenderResponse::Error { page, error, .. } => {
                let err = WorkspaceError::from_worker(page, error);
                warn!("{err}");
                self.notifications.report(&err);
                self.apply(Command::RenderFailed { page });
            }
            RenderResponse::Cancelled(id) => {
                debug!("Render {id:?} was cancelled");
            }
        }
    }

    fn apply(&mut self, command: Command) {
        let effects = self.render_state.apply(command);
        for effect in effects {
            self.run_effect(effect);
        }
    }

    fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::CancelPending => {
                if let (Some(id), Some(renderer)) = (self.pending.take(), self.renderer.as_mut()) {
                    renderer.cancel(id);
                }
            }
            Effect::InvalidateCache => {
                if let Some(renderer) = &self.renderer {
                    renderer.invalidate_cache();
                }
            }
            Effect::ClearSurface => {
                self.base = None;
                self.surface = None;
                self.surface_size = SurfaceSize::default();
                self.tools.reset_gesture();
            }
            Effect::RenderCurrentPage => {
                let page = self.render_state.current_page;
                let params = self.render_state.render_params();
                if let Some(renderer) = self.renderer.as_mut() {
                    self.pending = Some(renderer.request_page(page, params));
                }
            }
            Effect::Recompose => self.recompose(),
        }
    }

    fn recompose(&mut self) {
        let Some(base) = self.base.as_ref() else {
            return;
        };
        let page = self.render_state.current_page;
        match self
            .compositor
            .compose(base, self.store.records_for_page(page))
        {
            Ok(image) => self.surface = Some(image),
            Err(e) => {
                self.notifications.report(&e);
                self.surface = None;
            }
        }
    }

    /// Whether pointer input is currently accepted
    #[must_use]
    pub fn is_surface_ready(&self) -> bool {
        self.surface.is_some() && self.pending.is_none()
    }

    pub fn surface(&self) -> Option<&PageImage> {
        self.surface.as_ref()
    }

    #[must_use]
    pub fn surface_size(&self) -> SurfaceSize {
        self.surface_size
    }

    /// Current composited page encoded as PNG
    pub fn composed_png(&self) -> Result<Vec<u8>> {
        let surface = self.surface.as_ref().ok_or(WorkspaceError::NotLoaded)?;
        let image =
            image::RgbaImage::from_raw(surface.width, surface.height, surface.pixels.clone())
                .ok_or_else(|| WorkspaceError::render(surface.page, "surface size mismatch"))?;
        let mut out = Cursor::new(Vec::new());
        image
            .write_to(&mut out, image::ImageFormat::Png)
            .map_err(|e| WorkspaceError::render(surface.page, e))?;
        Ok(out.into_inner())
    }

    /// Change the rasterization scale; the current page is rendered again
    pub fn set_scale(&mut self, scale: f32) {
        self.apply(Command::SetScale(scale));
    }

    // Navigation

    pub fn navigation(&self) -> &NavigationController {
        &self.nav
    }

    #[must_use]
    pub fn current_page(&self) -> usize {
        self.nav.current_page()
    }

    pub fn next_page(&mut self) -> Result<usize> {
        let outcome = self.nav.next();
        self.after_navigation(outcome)
    }

    pub fn prev_page(&mut self) -> Result<usize> {
        let outcome = self.nav.prev();
        self.after_navigation(outcome)
    }

    pub fn go_to_page(&mut self, page: usize) -> Result<usize> {
        let outcome = self.nav.go_to(page);
        self.after_navigation(outcome)
    }

    fn after_navigation(&mut self, outcome: Result<usize>) -> Result<usize> {
        match outcome {
            Ok(page) => {
                debug!("Navigated to page {page}");
                self.apply(Command::GoToPage(page));
                Ok(page)
            }
            Err(e) => {
                self.notifications.report(&e);
                Err(e)
            }
        }
    }

    // Tools

    pub fn tools(&self) -> &ToolMachine {
        &self.tools
    }

    /// Select a tool; `Undo` and `Clear` act immediately
    pub fn select_tool(&mut self, tool: Tool) -> Result<Vec<StoreChange>> {
        let mut ctx = ToolContext {
            store: &mut self.store,
            page: self.render_state.current_page,
            surface: self.surface_size,
            undo_scope: self.settings.undo_scope,
        };
        let changes = self.tools.select(tool, &mut ctx)?;
        for change in &changes {
            self.apply(Command::AnnotationsChanged {
                page: change.page(),
            });
        }
        Ok(changes)
    }

    /// Feed a pointer gesture; text labels are cancelled
    pub fn pointer(&mut self, gesture: Gesture) -> Result<GestureOutcome> {
        self.pointer_with_prompt(gesture, &mut NoPrompt)
    }

    /// Feed a pointer gesture, asking `prompt` for text-label input
    pub fn pointer_with_prompt(
        &mut self,
        gesture: Gesture,
        prompt: &mut dyn TextPrompt,
    ) -> Result<GestureOutcome> {
        if !self.is_surface_ready() {
            debug!("Discarding {gesture:?}: surface not ready");
            return Ok(GestureOutcome::Discarded);
        }

        let mut ctx = ToolContext {
            store: &mut self.store,
            page: self.render_state.current_page,
            surface: self.surface_size,
            undo_scope: self.settings.undo_scope,
        };
        match self.tools.handle(gesture, &mut ctx, prompt)? {
            Some(change) => {
                self.apply(Command::AnnotationsChanged {
                    page: change.page(),
                });
                Ok(GestureOutcome::Changed(change))
            }
            None => Ok(GestureOutcome::Consumed),
        }
    }

    pub fn annotations(&self) -> &AnnotationStore {
        &self.store
    }

    // Scores

    pub fn ledger(&self) -> &ScoreLedger {
        &self.ledger
    }

    pub fn focus_question(&mut self, question_id: &str) -> bool {
        self.ledger.focus(question_id)
    }

    /// Apply a palette value to the focused question
    pub fn select_mark(&mut self, value: MarkValue) -> Option<&ScoreEntry> {
        self.ledger.select(value)
    }

    pub fn award(&mut self, question_id: &str, value: MarkValue) -> Option<&ScoreEntry> {
        self.ledger.award(question_id, value)
    }

    // Ancillary

    pub fn notifications(&self) -> &NotificationManager {
        &self.notifications
    }

    /// Probe result, `None` when the probe is disabled
    #[must_use]
    pub fn is_online(&self) -> Option<bool> {
        self.probe.as_ref().map(ConnectivityProbe::is_online)
    }

    /// End the session with `verdict` and return what must be persisted
    pub fn conclude(mut self, verdict: Verdict) -> Result<VerdictHandoff> {
        let document = self.document.as_ref().ok_or(WorkspaceError::NotLoaded)?;
        let handoff = VerdictHandoff {
            sheet: document.sheet().to_string(),
            verdict,
            total: self.ledger.total(),
            scores: self.ledger.entries().to_vec(),
            annotation_count: self.store.len(),
            concluded_at: chrono::Utc::now(),
        };
        info!(
            "Concluded {} with {:?} ({})",
            handoff.sheet, handoff.verdict, handoff.total
        );
        self.teardown();
        Ok(handoff)
    }

    /// Conclude and hand the verdict to `sink`
    pub fn conclude_into(
        self,
        verdict: Verdict,
        sink: &mut dyn VerdictSink,
    ) -> anyhow::Result<VerdictHandoff> {
        let handoff = self.conclude(verdict)?;
        sink.deliver(&handoff)?;
        Ok(handoff)
    }

    /// Release the probe, the render worker and the document bytes
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if let Some(mut probe) = self.probe.take() {
            probe.dispose();
        }
        if let Some(mut renderer) = self.renderer.take() {
            renderer.shutdown();
        }
        self.pending = None;
        self.base = None;
        self.surface = None;
        self.document = None;
        debug!("Workspace torn down");
    }

    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.teardown();
    }
}
