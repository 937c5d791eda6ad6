//! Page navigation bounds and visit counting

use log::debug;

use crate::error::{Result, WorkspaceError};

/// Tracks the displayed page and rejects moves outside the document
#[derive(Debug, Clone, Default)]
pub struct NavigationController {
    current_page: usize,
    total_pages: usize,
    visited_count: usize,
    count_failed: bool,
}

impl NavigationController {
    /// `count_failed` also counts rejected forward moves as visits
    #[must_use]
    pub fn new(count_failed: bool) -> Self {
        Self {
            count_failed,
            ..Self::default()
        }
    }

    /// Reset for a freshly loaded document, starting on page 1
    pub fn load(&mut self, total_pages: usize) {
        self.total_pages = total_pages;
        self.current_page = usize::from(total_pages > 0);
        self.visited_count = self.current_page;
    }

    pub fn unload(&mut self) {
        self.total_pages = 0;
        self.current_page = 0;
        self.visited_count = 0;
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.total_pages > 0
    }

    /// Displayed page (1-based), 0 before a document is loaded
    #[must_use]
    pub fn current_page(&self) -> usize {
        self.current_page
    }

    #[must_use]
    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    #[must_use]
    pub fn visited_count(&self) -> usize {
        self.visited_count
    }

    #[must_use]
    pub fn can_next(&self) -> bool {
        self.is_loaded() && self.current_page < self.total_pages
    }

    /// Whether a backward move is offered at all
    #[must_use]
    pub fn can_prev(&self) -> bool {
        self.current_page > 1
    }

    /// Advance one page
    pub fn next(&mut self) -> Result<usize> {
        self.ensure_loaded()?;
        let requested = self.current_page + 1;
        if requested > self.total_pages {
            if self.count_failed {
                self.visited_count += 1;
            }
            debug!("Rejected next past page {}", self.total_pages);
            return Err(self.boundary(requested));
        }
        self.current_page = requested;
        self.visited_count += 1;
        Ok(self.current_page)
    }

    /// Go back one page
    pub fn prev(&mut self) -> Result<usize> {
        self.ensure_loaded()?;
        if !self.can_prev() {
            return Err(self.boundary(0));
        }
        self.current_page -= 1;
        Ok(self.current_page)
    }

    /// Jump to `page`; moving to the displayed page is a no-op
    pub fn go_to(&mut self, page: usize) -> Result<usize> {
        self.ensure_loaded()?;
        if page == 0 || page > self.total_pages {
            return Err(self.boundary(page));
        }
        if page != self.current_page {
            self.current_page = page;
            self.visited_count += 1;
        }
        Ok(self.current_page)
    }

    fn ensure_loaded(&self) -> Result<()> {
        if self.is_loaded() {
            Ok(())
        } else {
            Err(WorkspaceError::NotLoaded)
        }
    }

    fn boundary(&self, requested: usize) -> WorkspaceError {
        WorkspaceError::Boundary {
            requested,
            total: self.total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(pages: usize, count_failed: bool) -> NavigationController {
        let mut nav = NavigationController::new(count_failed);
        nav.load(pages);
        nav
    }

    #[test]
    fn unloaded_rejects_moves() {
        let mut nav = NavigationController::new(false);
        assert!(matches!(nav.next(), Err(WorkspaceError::NotLoaded)));
        assert!(matches!(nav.prev(), Err(WorkspaceError::NotLoaded)));
        assert_eq!(nav.current_page(), 0);
    }

    #[test]
    fn next_walks_to_last_page_then_stops() {
        let mut nav = loaded(3, false);
        assert_eq!(nav.next().unwrap(), 2);
        assert_eq!(nav.next().unwrap(), 3);
        assert!(!nav.can_next());

        let err = nav.next().unwrap_err();
        assert!(matches!(
            err,
            WorkspaceError::Boundary {
                requested: 4,
                total: 3
            }
        ));
        assert_eq!(nav.current_page(), 3);
        assert_eq!(nav.visited_count(), 3);
    }

    #[test]
    fn failed_next_counts_when_configured() {
        let mut nav = loaded(1, true);
        assert!(nav.next().is_err());
        assert!(nav.next().is_err());
        assert_eq!(nav.visited_count(), 3);
        assert_eq!(nav.current_page(), 1);
    }

    #[test]
    fn prev_is_not_offered_on_first_page() {
        let mut nav = loaded(2, false);
        assert!(!nav.can_prev());
        assert!(nav.prev().is_err());
        nav.next().unwrap();
        assert!(nav.can_prev());
        assert_eq!(nav.prev().unwrap(), 1);
        assert_eq!(nav.visited_count(), 2);
    }

    #[test]
    fn go_to_respects_bounds() {
        let mut nav = loaded(5, false);
        assert_eq!(nav.go_to(4).unwrap(), 4);
        assert!(nav.go_to(0).is_err());
        assert!(nav.go_to(6).is_err());
        assert_eq!(nav.go_to(4).unwrap(), 4);
        assert_eq!(nav.current_page(), 4);
        assert_eq!(nav.visited_count(), 2);
    }

    #[test]
    fn reload_resets_state() {
        let mut nav = loaded(3, false);
        nav.next().unwrap();
        nav.load(2);
        assert_eq!(nav.current_page(), 1);
        assert_eq!(nav.total_pages(), 2);
        assert_eq!(nav.visited_count(), 1);
        nav.unload();
        assert!(!nav.is_loaded());
    }
}
