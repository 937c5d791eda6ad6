//! Render state management
//!
//! Pure state core: commands go in, effects come out. The workspace executes
//! the effects against the render service and the drawing surface.

use super::request::RenderParams;

/// Smallest rasterization scale accepted
pub const MIN_SCALE: f32 = 0.1;

/// Which page the surface should show and at what scale
#[derive(Clone, Debug)]
pub struct RenderState {
    /// Displayed page (1-based), 0 while no document is loaded
    pub current_page: usize,

    /// Total page count
    pub page_count: usize,

    /// Rasterization scale
    pub scale: f32,
}

impl RenderState {
    #[must_use]
    pub fn new(scale: f32) -> Self {
        Self {
            current_page: 0,
            page_count: 0,
            scale: scale.max(MIN_SCALE),
        }
    }

    /// Apply a command and return resulting effects
    #[must_use]
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        match cmd {
            Command::DocumentLoaded { page_count } => {
                self.page_count = page_count;
                self.current_page = if page_count > 0 { 1 } else { 0 };
                if page_count > 0 {
                    vec![
                        Effect::InvalidateCache,
                        Effect::ClearSurface,
                        Effect::RenderCurrentPage,
                    ]
                } else {
                    vec![Effect::ClearSurface]
                }
            }

            Command::Unload => {
                self.page_count = 0;
                self.current_page = 0;
                vec![
                    Effect::CancelPending,
                    Effect::ClearSurface,
                    Effect::InvalidateCache,
                ]
            }

            Command::GoToPage(page) => {
                if page == 0 || page > self.page_count || page == self.current_page {
                    return vec![];
                }
                self.current_page = page;
                vec![
                    Effect::CancelPending,
                    Effect::ClearSurface,
                    Effect::RenderCurrentPage,
                ]
            }

            Command::SetScale(scale) => {
                let clamped = scale.max(MIN_SCALE);
                if (self.scale - clamped).abs() > f32::EPSILON {
                    self.scale = clamped;
                    if self.current_page > 0 {
                        return vec![
                            Effect::CancelPending,
                            Effect::InvalidateCache,
                            Effect::ClearSurface,
                            Effect::RenderCurrentPage,
                        ];
                    }
                }
                vec![]
            }

            Command::AnnotationsChanged { page } => {
                if page == self.current_page && page > 0 {
                    vec![Effect::Recompose]
                } else {
                    vec![]
                }
            }

            Command::PageRendered { page } => {
                if page == self.current_page {
                    vec![Effect::Recompose]
                } else {
                    vec![]
                }
            }

            Command::RenderFailed { page } => {
                if page == self.current_page {
                    vec![Effect::ClearSurface]
                } else {
                    vec![]
                }
            }
        }
    }

    #[must_use]
    pub fn render_params(&self) -> RenderParams {
        RenderParams { scale: self.scale }
    }
}

/// Commands that modify render state
#[derive(Clone, Debug)]
pub enum Command {
    /// A document with `page_count` pages became available
    DocumentLoaded { page_count: usize },
    /// The document is being discarded
    Unload,
    /// Show a different page
    GoToPage(usize),
    /// Change the rasterization scale
    SetScale(f32),
    /// Records for `page` were added or removed
    AnnotationsChanged { page: usize },
    /// A base raster for `page` arrived
    PageRendered { page: usize },
    /// Rendering `page` failed
    RenderFailed { page: usize },
}

/// Effects produced by state changes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Cancel the in-flight render, its result is no longer wanted
    CancelPending,
    /// Drop every cached raster
    InvalidateCache,
    /// Blank the surface and gate pointer input
    ClearSurface,
    /// Request the current page from the renderer
    RenderCurrentPage,
    /// Redraw the base raster and replay the page's records
    Recompose,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(pages: usize) -> RenderState {
        let mut state = RenderState::new(1.5);
        let _ = state.apply(Command::DocumentLoaded { page_count: pages });
        state
    }

    #[test]
    fn load_starts_on_first_page() {
        let mut state = RenderState::new(1.5);
        let effects = state.apply(Command::DocumentLoaded { page_count: 3 });
        assert_eq!(state.current_page, 1);
        assert_eq!(
            effects,
            vec![
                Effect::InvalidateCache,
                Effect::ClearSurface,
                Effect::RenderCurrentPage
            ]
        );
    }

    #[test]
    fn go_to_page_cancels_before_rendering() {
        let mut state = loaded(3);
        let effects = state.apply(Command::GoToPage(2));
        assert_eq!(state.current_page, 2);
        assert_eq!(
            effects,
            vec![
                Effect::CancelPending,
                Effect::ClearSurface,
                Effect::RenderCurrentPage
            ]
        );
    }

    #[test]
    fn go_to_invalid_or_same_page_is_noop() {
        let mut state = loaded(3);
        assert!(state.apply(Command::GoToPage(1)).is_empty());
        assert!(state.apply(Command::GoToPage(0)).is_empty());
        assert!(state.apply(Command::GoToPage(4)).is_empty());
        assert_eq!(state.current_page, 1);
    }

    #[test]
    fn annotation_changes_only_recompose_displayed_page() {
        let mut state = loaded(3);
        assert_eq!(
            state.apply(Command::AnnotationsChanged { page: 1 }),
            vec![Effect::Recompose]
        );
        assert!(state.apply(Command::AnnotationsChanged { page: 2 }).is_empty());
    }

    #[test]
    fn late_render_for_other_page_is_ignored() {
        let mut state = loaded(3);
        let _ = state.apply(Command::GoToPage(3));
        assert!(state.apply(Command::PageRendered { page: 1 }).is_empty());
        assert_eq!(
            state.apply(Command::PageRendered { page: 3 }),
            vec![Effect::Recompose]
        );
    }

    #[test]
    fn render_failure_blanks_displayed_page_only() {
        let mut state = loaded(3);
        assert_eq!(
            state.apply(Command::RenderFailed { page: 1 }),
            vec![Effect::ClearSurface]
        );
        assert!(state.apply(Command::RenderFailed { page: 2 }).is_empty());
    }

    #[test]
    fn scale_is_never_below_minimum() {
        assert!((RenderState::new(0.0).scale - MIN_SCALE).abs() < f32::EPSILON);
        assert!((RenderState::new(-2.0).scale - MIN_SCALE).abs() < f32::EPSILON);
        let mut state = loaded(1);
        let _ = state.apply(Command::SetScale(-1.0));
        assert!((state.scale - MIN_SCALE).abs() < f32::EPSILON);
    }

    #[test]
    fn set_scale_rerenders() {
        let mut state = loaded(2);
        let effects = state.apply(Command::SetScale(2.0));
        assert!(effects.contains(&Effect::InvalidateCache));
        assert!(effects.contains(&Effect::RenderCurrentPage));
        assert!(state.apply(Command::SetScale(2.0)).is_empty());
    }
}
