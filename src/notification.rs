//! Non-blocking notifications for recoverable workspace errors

use crate::error::WorkspaceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub message: String,
    pub level: NotificationLevel,
    /// Error category, see [`WorkspaceError::kind`]
    pub kind: &'static str,
}

/// Newest-first queue of notifications
#[derive(Debug, Default)]
pub struct NotificationManager {
    notifications: Vec<Notification>,
}

impl NotificationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a workspace error. Boundary hits are warnings, the rest errors.
    pub fn report(&mut self, err: &WorkspaceError) {
        let level = match err {
            WorkspaceError::Boundary { .. } => NotificationLevel::Warning,
            _ => NotificationLevel::Error,
        };
        self.notifications.insert(
            0,
            Notification {
                message: err.to_string(),
                level,
                kind: err.kind(),
            },
        );
    }

    pub fn current(&self) -> Option<&Notification> {
        self.notifications.first()
    }

    pub fn all(&self) -> &[Notification] {
        &self.notifications
    }

    /// Notifications raised for errors of `kind`
    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Notification> {
        self.notifications.iter().filter(move |n| n.kind == kind)
    }

    pub fn count(&self) -> usize {
        self.notifications.len()
    }
}
