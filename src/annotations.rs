//! Examiner markup records and the per-document annotation log
//!
//! All records live in one sequence ordered by commit. The sequence number
//! is shared across pages, so "newest record" is a property of the log
//! itself rather than something reconstructed from per-page lists.

use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkspaceError};
use crate::pdf::Point;

/// Correct / incorrect stamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkKind {
    Correct,
    Incorrect,
}

/// What a record draws
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnnotationKind {
    Mark { value: MarkKind, anchor: Point },
    Text { value: String, anchor: Point },
    Stroke { polyline: Vec<Point> },
}

impl AnnotationKind {
    pub fn label(&self) -> &'static str {
        match self {
            AnnotationKind::Mark { .. } => "mark",
            AnnotationKind::Text { .. } => "text",
            AnnotationKind::Stroke { .. } => "stroke",
        }
    }
}

/// Stable record identifier, never reused within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnnotationId(pub u64);

/// One committed unit of examiner markup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub id: AnnotationId,
    /// Page (1-based) the record is anchored to
    pub page: usize,
    #[serde(flatten)]
    pub kind: AnnotationKind,
    /// Commit order across the whole document
    pub sequence: u64,
}

/// Ordered log of committed records for one document
#[derive(Debug, Default)]
pub struct AnnotationStore {
    records: Vec<AnnotationRecord>,
    page_count: usize,
    next_sequence: u64,
}

impl AnnotationStore {
    #[must_use]
    pub fn new(page_count: usize) -> Self {
        Self {
            records: Vec::new(),
            page_count,
            next_sequence: 1,
        }
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Commit a record for `page`. Returns the record's sequence number.
    pub fn append(&mut self, page: usize, kind: AnnotationKind) -> Result<u64> {
        if page == 0 || page > self.page_count {
            return Err(WorkspaceError::Boundary {
                requested: page,
                total: self.page_count,
            });
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        log::debug!("Committed {} #{sequence} on page {page}", kind.label());
        self.records.push(AnnotationRecord {
            id: AnnotationId(sequence),
            page,
            kind,
            sequence,
        });
        Ok(sequence)
    }

    /// Remove the record with the highest sequence number in the document
    pub fn undo_last(&mut self) -> Option<AnnotationRecord> {
        // Records are appended in sequence order, so the newest is last
        self.records.pop()
    }

    /// Remove the newest record on `page`
    pub fn undo_last_on_page(&mut self, page: usize) -> Option<AnnotationRecord> {
        let idx = self.records.iter().rposition(|r| r.page == page)?;
        Some(self.records.remove(idx))
    }

    /// Remove every record on `page`, returning how many were removed
    pub fn clear_page(&mut self, page: usize) -> usize {
        let before = self.records.len();
        self.records.retain(|r| r.page != page);
        before - self.records.len()
    }

    /// Records of `page` in ascending sequence order (draw order)
    pub fn records_for_page(&self, page: usize) -> impl Iterator<Item = &AnnotationRecord> {
        self.records.iter().filter(move |r| r.page == page)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnnotationRecord> {
        self.records.iter()
    }

    #[must_use]
    pub fn last(&self) -> Option<&AnnotationRecord> {
        self.records.last()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
