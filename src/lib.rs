// Export modules for use in tests and the CLI
pub mod annotations;
pub mod compose;
pub mod error;
pub mod fetch;
pub mod navigation;
pub mod notification;
pub mod panic_handler;
pub mod pdf;
pub mod probe;
pub mod score;
pub mod script;
pub mod settings;
pub mod tools;
pub mod workspace;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export the session surface
pub use error::{Result, WorkspaceError};
pub use workspace::{GestureOutcome, Workspace};
