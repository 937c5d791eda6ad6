//! Tool state machine
//!
//! Exactly one tool is active. Each tool variant owns its gesture sub-state,
//! so switching tools can never leave a half-built stroke attached to some
//! other mode. Gestures are dispatched with one exhaustive match.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::annotations::{AnnotationKind, AnnotationStore, MarkKind};
use crate::error::Result;
use crate::pdf::{Point, SurfaceSize};
use crate::settings::UndoScope;

/// Tool palette entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tool {
    MarkCorrect,
    MarkIncorrect,
    TextLabel,
    FreehandPen,
    Undo,
    Clear,
}

/// Observable phase of the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolPhase {
    Idle,
    MarkPlacing,
    TextPrompting,
    StrokeDrawing,
}

/// Pointer input in surface coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gesture {
    PointerDown(Point),
    PointerMove(Point),
    PointerUp,
    /// The pointer left the surface mid-gesture
    PointerLeave,
    /// A completed down/up at one location
    Click(Point),
}

/// Source of text for the text-label tool.
///
/// Called synchronously; `None` means the examiner cancelled.
pub trait TextPrompt {
    fn prompt(&mut self, anchor: Point) -> Option<String>;
}

impl<F> TextPrompt for F
where
    F: FnMut(Point) -> Option<String>,
{
    fn prompt(&mut self, anchor: Point) -> Option<String> {
        self(anchor)
    }
}

/// Prompt that always cancels
pub struct NoPrompt;

impl TextPrompt for NoPrompt {
    fn prompt(&mut self, _anchor: Point) -> Option<String> {
        None
    }
}

/// Store mutation caused by a tool, used to decide what to redraw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChange {
    Appended { page: usize, sequence: u64 },
    Removed { page: usize, sequence: u64 },
    Cleared { page: usize, count: usize },
}

impl StoreChange {
    #[must_use]
    pub fn page(&self) -> usize {
        match self {
            Self::Appended { page, .. } | Self::Removed { page, .. } | Self::Cleared { page, .. } => {
                *page
            }
        }
    }
}

/// What the machine needs from the workspace for one event
pub struct ToolContext<'a> {
    pub store: &'a mut AnnotationStore,
    /// Displayed page (1-based)
    pub page: usize,
    /// Current surface size, used to clamp coordinates
    pub surface: SurfaceSize,
    pub undo_scope: UndoScope,
}

#[derive(Debug, Clone, PartialEq)]
enum Mode {
    None,
    Mark(MarkKind),
    Text { prompting: bool },
    Pen { stroke: Option<Vec<Point>> },
    Undo,
    Clear,
}

#[derive(Debug)]
pub struct ToolMachine {
    mode: Mode,
}

impl Default for ToolMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolMachine {
    #[must_use]
    pub fn new() -> Self {
        Self { mode: Mode::None }
    }

    /// Active tool, `None` until one is selected
    #[must_use]
    pub fn selection(&self) -> Option<Tool> {
        match &self.mode {
            Mode::None => None,
            Mode::Mark(MarkKind::Correct) => Some(Tool::MarkCorrect),
            Mode::Mark(MarkKind::Incorrect) => Some(Tool::MarkIncorrect),
            Mode::Text { .. } => Some(Tool::TextLabel),
            Mode::Pen { .. } => Some(Tool::FreehandPen),
            Mode::Undo => Some(Tool::Undo),
            Mode::Clear => Some(Tool::Clear),
        }
    }

    #[must_use]
    pub fn phase(&self) -> ToolPhase {
        match &self.mode {
            Mode::Mark(_) => ToolPhase::MarkPlacing,
            Mode::Text { prompting: true } => ToolPhase::TextPrompting,
            Mode::Pen { stroke: Some(_) } => ToolPhase::StrokeDrawing,
            Mode::None
            | Mode::Text { prompting: false }
            | Mode::Pen { stroke: None }
            | Mode::Undo
            | Mode::Clear => ToolPhase::Idle,
        }
    }

    /// Points of the stroke being drawn, if any
    #[must_use]
    pub fn stroke_in_progress(&self) -> Option<&[Point]> {
        match &self.mode {
            Mode::Pen { stroke: Some(points) } => Some(points),
            _ => None,
        }
    }

    /// Select a tool.
    ///
    /// Selection alone does not touch the store, except that a stroke still
    /// in progress is committed first, and `Undo`/`Clear` act immediately.
    pub fn select(&mut self, tool: Tool, ctx: &mut ToolContext<'_>) -> Result<Vec<StoreChange>> {
        let mut changes = Vec::new();
        if let Some(change) = self.finish_stroke(ctx)? {
            changes.push(change);
        }

        debug!("Tool selected: {tool:?}");
        self.mode = match tool {
            Tool::MarkCorrect => Mode::Mark(MarkKind::Correct),
            Tool::MarkIncorrect => Mode::Mark(MarkKind::Incorrect),
            Tool::TextLabel => Mode::Text { prompting: false },
            Tool::FreehandPen => Mode::Pen { stroke: None },
            Tool::Undo => Mode::Undo,
            Tool::Clear => Mode::Clear,
        };

        match tool {
            Tool::Undo => changes.extend(undo(ctx)),
            Tool::Clear => changes.extend(clear(ctx)),
            Tool::MarkCorrect | Tool::MarkIncorrect | Tool::TextLabel | Tool::FreehandPen => {}
        }
        Ok(changes)
    }

    /// Interpret one pointer gesture under the active tool
    pub fn handle(
        &mut self,
        gesture: Gesture,
        ctx: &mut ToolContext<'_>,
        prompt: &mut dyn TextPrompt,
    ) -> Result<Option<StoreChange>> {
        let surface = ctx.surface;
        match (&mut self.mode, gesture) {
            (Mode::Pen { stroke }, Gesture::PointerDown(p)) => {
                let previous = stroke.replace(vec![p.clamped_to(surface)]);
                match previous {
                    // A down without an up; keep what was drawn
                    Some(points) => commit_stroke(ctx, points).map(Some),
                    None => Ok(None),
                }
            }
            (Mode::Pen { stroke: Some(points) }, Gesture::PointerMove(p)) => {
                points.push(p.clamped_to(surface));
                Ok(None)
            }
            (Mode::Pen { stroke }, Gesture::PointerUp | Gesture::PointerLeave) => {
                match stroke.take() {
                    Some(points) => commit_stroke(ctx, points).map(Some),
                    None => Ok(None),
                }
            }

            (Mode::Mark(kind), Gesture::Click(p)) => {
                let kind = AnnotationKind::Mark {
                    value: *kind,
                    anchor: p.clamped_to(surface),
                };
                let sequence = ctx.store.append(ctx.page, kind)?;
                Ok(Some(StoreChange::Appended {
                    page: ctx.page,
                    sequence,
                }))
            }

            (Mode::Text { prompting }, Gesture::Click(p)) => {
                let anchor = p.clamped_to(surface);
                *prompting = true;
                let answer = prompt.prompt(anchor);
                *prompting = false;

                let Some(value) = answer.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
                else {
                    debug!("Text prompt cancelled or empty");
                    return Ok(None);
                };
                let sequence = ctx
                    .store
                    .append(ctx.page, AnnotationKind::Text { value, anchor })?;
                Ok(Some(StoreChange::Appended {
                    page: ctx.page,
                    sequence,
                }))
            }

            (
                Mode::None
                | Mode::Mark(_)
                | Mode::Text { .. }
                | Mode::Pen { .. }
                | Mode::Undo
                | Mode::Clear,
                _,
            ) => Ok(None),
        }
    }

    /// Abandon any in-progress gesture without committing it
    pub fn reset_gesture(&mut self) {
        match &mut self.mode {
            Mode::Pen { stroke } => {
                if stroke.take().is_some() {
                    debug!("Discarded stroke in progress");
                }
            }
            Mode::Text { prompting } => *prompting = false,
            Mode::None | Mode::Mark(_) | Mode::Undo | Mode::Clear => {}
        }
    }

    fn finish_stroke(&mut self, ctx: &mut ToolContext<'_>) -> Result<Option<StoreChange>> {
        let Mode::Pen { stroke } = &mut self.mode else {
            return Ok(None);
        };
        match stroke.take() {
            Some(points) => commit_stroke(ctx, points).map(Some),
            None => Ok(None),
        }
    }
}

fn commit_stroke(ctx: &mut ToolContext<'_>, polyline: Vec<Point>) -> Result<StoreChange> {
    let sequence = ctx
        .store
        .append(ctx.page, AnnotationKind::Stroke { polyline })?;
    Ok(StoreChange::Appended {
        page: ctx.page,
        sequence,
    })
}

fn undo(ctx: &mut ToolContext<'_>) -> Option<StoreChange> {
    let removed = match ctx.undo_scope {
        UndoScope::Document => ctx.store.undo_last(),
        UndoScope::Page => ctx.store.undo_last_on_page(ctx.page),
    };
    match removed {
        Some(record) => {
            debug!(
                "Undid {} #{} on page {}",
                record.kind.label(),
                record.sequence,
                record.page
            );
            Some(StoreChange::Removed {
                page: record.page,
                sequence: record.sequence,
            })
        }
        None => {
            debug!("Nothing to undo");
            None
        }
    }
}

fn clear(ctx: &mut ToolContext<'_>) -> Option<StoreChange> {
    let count = ctx.store.clear_page(ctx.page);
    (count > 0).then_some(StoreChange::Cleared {
        page: ctx.page,
        count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SURFACE: SurfaceSize = SurfaceSize::new(200, 300);

    struct Harness {
        store: AnnotationStore,
        machine: ToolMachine,
        page: usize,
        undo_scope: UndoScope,
    }

    impl Harness {
        fn new(pages: usize) -> Self {
            Self {
                store: AnnotationStore::new(pages),
                machine: ToolMachine::new(),
                page: 1,
                undo_scope: UndoScope::Document,
            }
        }

        fn select(&mut self, tool: Tool) -> Vec<StoreChange> {
            let mut ctx = ToolContext {
                store: &mut self.store,
                page: self.page,
                surface: SURFACE,
                undo_scope: self.undo_scope,
            };
            self.machine.select(tool, &mut ctx).unwrap()
        }

        fn gesture(&mut self, gesture: Gesture) -> Option<StoreChange> {
            self.gesture_with(gesture, &mut NoPrompt)
        }

        fn gesture_with(
            &mut self,
            gesture: Gesture,
            prompt: &mut dyn TextPrompt,
        ) -> Option<StoreChange> {
            let mut ctx = ToolContext {
                store: &mut self.store,
                page: self.page,
                surface: SURFACE,
                undo_scope: self.undo_scope,
            };
            self.machine.handle(gesture, &mut ctx, prompt).unwrap()
        }
    }

    #[test]
    fn default_selection_is_none() {
        let machine = ToolMachine::new();
        assert_eq!(machine.selection(), None);
        assert_eq!(machine.phase(), ToolPhase::Idle);
    }

    #[test]
    fn freehand_gesture_commits_one_stroke() {
        let mut h = Harness::new(1);
        h.select(Tool::FreehandPen);

        assert!(h.gesture(Gesture::PointerDown(Point::new(10.0, 10.0))).is_none());
        assert_eq!(h.machine.phase(), ToolPhase::StrokeDrawing);
        h.gesture(Gesture::PointerMove(Point::new(20.0, 10.0)));
        h.gesture(Gesture::PointerMove(Point::new(20.0, 20.0)));
        assert_eq!(h.machine.stroke_in_progress().map(<[Point]>::len), Some(3));
        let change = h.gesture(Gesture::PointerUp);

        assert!(matches!(change, Some(StoreChange::Appended { page: 1, .. })));
        assert_eq!(h.store.len(), 1);
        assert_eq!(
            h.store.last().unwrap().kind,
            AnnotationKind::Stroke {
                polyline: vec![
                    Point::new(10.0, 10.0),
                    Point::new(20.0, 10.0),
                    Point::new(20.0, 20.0)
                ]
            }
        );
        assert_eq!(h.machine.phase(), ToolPhase::Idle);
        assert_eq!(h.machine.selection(), Some(Tool::FreehandPen));
    }

    #[test]
    fn leaving_the_surface_commits_the_stroke() {
        let mut h = Harness::new(1);
        h.select(Tool::FreehandPen);
        h.gesture(Gesture::PointerDown(Point::new(5.0, 5.0)));
        h.gesture(Gesture::PointerMove(Point::new(250.0, 5.0)));
        h.gesture(Gesture::PointerLeave);

        let AnnotationKind::Stroke { polyline } = &h.store.last().unwrap().kind else {
            panic!("expected a stroke");
        };
        assert_eq!(polyline[1], Point::new(200.0, 5.0));
    }

    #[test]
    fn moves_without_pointer_down_are_ignored() {
        let mut h = Harness::new(1);
        h.select(Tool::FreehandPen);
        assert!(h.gesture(Gesture::PointerMove(Point::new(1.0, 1.0))).is_none());
        assert!(h.gesture(Gesture::PointerUp).is_none());
        assert!(h.store.is_empty());
    }

    #[test]
    fn switching_tool_mid_stroke_commits_it() {
        let mut h = Harness::new(1);
        h.select(Tool::FreehandPen);
        h.gesture(Gesture::PointerDown(Point::new(1.0, 1.0)));
        let changes = h.select(Tool::MarkCorrect);

        assert_eq!(changes.len(), 1);
        assert_eq!(h.store.len(), 1);
        assert_eq!(h.machine.phase(), ToolPhase::MarkPlacing);
    }

    #[test]
    fn marks_repeat_while_selected() {
        let mut h = Harness::new(1);
        h.select(Tool::MarkCorrect);
        h.gesture(Gesture::Click(Point::new(50.0, 50.0)));
        h.gesture(Gesture::Click(Point::new(70.0, 50.0)));
        assert_eq!(h.store.len(), 2);
        assert_eq!(h.machine.selection(), Some(Tool::MarkCorrect));
    }

    #[test]
    fn undo_after_two_marks_keeps_the_first() {
        let mut h = Harness::new(1);
        h.select(Tool::MarkCorrect);
        h.gesture(Gesture::Click(Point::new(50.0, 50.0)));
        h.select(Tool::MarkIncorrect);
        h.gesture(Gesture::Click(Point::new(60.0, 60.0)));

        let changes = h.select(Tool::Undo);
        assert_eq!(changes, vec![StoreChange::Removed { page: 1, sequence: 2 }]);

        let left: Vec<_> = h.store.iter().collect();
        assert_eq!(left.len(), 1);
        assert_eq!(
            left[0].kind,
            AnnotationKind::Mark {
                value: MarkKind::Correct,
                anchor: Point::new(50.0, 50.0)
            }
        );
    }

    #[test]
    fn undo_reaches_other_pages_by_default() {
        let mut h = Harness::new(2);
        h.page = 2;
        h.select(Tool::MarkCorrect);
        h.gesture(Gesture::Click(Point::new(1.0, 1.0)));
        h.page = 1;

        let changes = h.select(Tool::Undo);
        assert_eq!(changes, vec![StoreChange::Removed { page: 2, sequence: 1 }]);
        assert!(h.store.is_empty());
    }

    #[test]
    fn page_scoped_undo_leaves_other_pages() {
        let mut h = Harness::new(2);
        h.undo_scope = UndoScope::Page;
        h.page = 2;
        h.select(Tool::MarkCorrect);
        h.gesture(Gesture::Click(Point::new(1.0, 1.0)));
        h.page = 1;

        assert!(h.select(Tool::Undo).is_empty());
        assert_eq!(h.store.len(), 1);
    }

    #[test]
    fn clear_removes_current_page_only() {
        let mut h = Harness::new(2);
        h.select(Tool::MarkCorrect);
        h.gesture(Gesture::Click(Point::new(1.0, 1.0)));
        h.gesture(Gesture::Click(Point::new(2.0, 2.0)));
        h.page = 2;
        h.gesture(Gesture::Click(Point::new(3.0, 3.0)));
        h.page = 1;

        let changes = h.select(Tool::Clear);
        assert_eq!(changes, vec![StoreChange::Cleared { page: 1, count: 2 }]);
        assert_eq!(h.store.len(), 1);
        assert_eq!(h.machine.selection(), Some(Tool::Clear));
        assert!(h.gesture(Gesture::Click(Point::new(4.0, 4.0))).is_none());
    }

    #[test]
    fn text_label_commits_non_empty_input() {
        let mut h = Harness::new(1);
        h.select(Tool::TextLabel);

        let mut answer = |_anchor: Point| Some("  partial credit ".to_string());
        let change = h.gesture_with(Gesture::Click(Point::new(30.0, 40.0)), &mut answer);
        assert!(change.is_some());
        assert_eq!(
            h.store.last().unwrap().kind,
            AnnotationKind::Text {
                value: "partial credit".to_string(),
                anchor: Point::new(30.0, 40.0)
            }
        );
    }

    #[test]
    fn text_label_ignores_empty_or_cancelled_input() {
        let mut h = Harness::new(1);
        h.select(Tool::TextLabel);

        let mut empty = |_anchor: Point| Some("   ".to_string());
        assert!(h
            .gesture_with(Gesture::Click(Point::new(1.0, 1.0)), &mut empty)
            .is_none());
        assert!(h.gesture(Gesture::Click(Point::new(1.0, 1.0))).is_none());
        assert!(h.store.is_empty());
        assert_eq!(h.machine.phase(), ToolPhase::Idle);
    }

    #[test]
    fn clicks_are_clamped_to_surface() {
        let mut h = Harness::new(1);
        h.select(Tool::MarkIncorrect);
        h.gesture(Gesture::Click(Point::new(-10.0, 400.0)));
        assert_eq!(
            h.store.last().unwrap().kind,
            AnnotationKind::Mark {
                value: MarkKind::Incorrect,
                anchor: Point::new(0.0, 300.0)
            }
        );
    }

    #[test]
    fn reset_gesture_discards_stroke() {
        let mut h = Harness::new(1);
        h.select(Tool::FreehandPen);
        h.gesture(Gesture::PointerDown(Point::new(1.0, 1.0)));
        h.machine.reset_gesture();
        assert!(h.machine.stroke_in_progress().is_none());
        assert!(h.gesture(Gesture::PointerUp).is_none());
        assert!(h.store.is_empty());
    }
}
