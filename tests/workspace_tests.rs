use std::time::Duration;

use inkgrade::annotations::{AnnotationKind, MarkKind};
use inkgrade::compose::pixel_at;
use inkgrade::pdf::{DocumentSource, Point, SurfaceSize};
use inkgrade::score::{MarkValue, MemorySink, Verdict};
use inkgrade::settings::{Settings, UndoScope};
use inkgrade::test_utils::{PAGE_HEIGHT, PAGE_WIDTH, sample_pdf, sample_questions};
use inkgrade::tools::{Gesture, StoreChange, Tool};
use inkgrade::{GestureOutcome, Workspace, WorkspaceError};

const WAIT: Duration = Duration::from_secs(30);

fn open_workspace(pages: usize, settings: Settings) -> Workspace {
    let mut ws = Workspace::new(settings).unwrap();
    ws.open(DocumentSource::memory("sheet-1", sample_pdf(pages)))
        .unwrap();
    assert!(ws.block_until_idle(WAIT), "document did not load in time");
    assert!(ws.is_surface_ready());
    ws
}

fn settle(ws: &mut Workspace) {
    assert!(ws.block_until_idle(WAIT), "render did not finish in time");
}

fn click(ws: &mut Workspace, x: f32, y: f32) -> GestureOutcome {
    ws.pointer(Gesture::Click(Point::new(x, y))).unwrap()
}

#[test]
fn surface_takes_the_scaled_page_size() {
    let ws = open_workspace(2, Settings::offline());
    let expected = SurfaceSize::new(PAGE_WIDTH * 3 / 2, PAGE_HEIGHT * 3 / 2);
    assert_eq!(ws.surface_size(), expected);
    let surface = ws.surface().unwrap();
    assert_eq!((surface.width, surface.height), (expected.width, expected.height));
    assert_eq!(ws.navigation().current_page(), 1);
    assert_eq!(ws.navigation().total_pages(), 2);
}

#[test]
fn redraw_without_mutation_is_idempotent() {
    let mut ws = open_workspace(2, Settings::offline());
    ws.select_tool(Tool::MarkCorrect).unwrap();
    click(&mut ws, 50.0, 50.0);
    ws.select_tool(Tool::FreehandPen).unwrap();
    ws.pointer(Gesture::PointerDown(Point::new(10.0, 100.0))).unwrap();
    ws.pointer(Gesture::PointerMove(Point::new(120.0, 140.0))).unwrap();
    ws.pointer(Gesture::PointerUp).unwrap();

    let first = ws.surface().unwrap().clone();

    ws.next_page().unwrap();
    settle(&mut ws);
    ws.prev_page().unwrap();
    settle(&mut ws);

    let second = ws.surface().unwrap();
    assert_eq!(second.page, 1);
    assert!(first.pixels == second.pixels, "redraw changed the page");
}

#[test]
fn marks_are_drawn_onto_the_surface() {
    let mut ws = open_workspace(1, Settings::offline());
    let before = pixel_at(ws.surface().unwrap(), 60, 60).unwrap();
    assert_eq!(before, [255, 255, 255, 255]);

    ws.select_tool(Tool::MarkIncorrect).unwrap();
    assert!(matches!(
        click(&mut ws, 60.0, 60.0),
        GestureOutcome::Changed(StoreChange::Appended { page: 1, sequence: 1 })
    ));

    let after = pixel_at(ws.surface().unwrap(), 60, 60).unwrap();
    assert_ne!(after, before);
}

#[test]
fn stroke_gesture_commits_three_point_polyline() {
    let mut ws = open_workspace(1, Settings::offline());
    ws.select_tool(Tool::FreehandPen).unwrap();
    ws.pointer(Gesture::PointerDown(Point::new(10.0, 10.0))).unwrap();
    ws.pointer(Gesture::PointerMove(Point::new(20.0, 10.0))).unwrap();
    ws.pointer(Gesture::PointerMove(Point::new(20.0, 20.0))).unwrap();
    ws.pointer(Gesture::PointerUp).unwrap();

    let records: Vec<_> = ws.annotations().iter().collect();
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].kind,
        AnnotationKind::Stroke {
            polyline: vec![
                Point::new(10.0, 10.0),
                Point::new(20.0, 10.0),
                Point::new(20.0, 20.0),
            ]
        }
    );
}

#[test]
fn undo_after_two_marks_keeps_only_the_first() {
    let mut ws = open_workspace(1, Settings::offline());
    ws.select_tool(Tool::MarkCorrect).unwrap();
    click(&mut ws, 50.0, 50.0);
    ws.select_tool(Tool::MarkIncorrect).unwrap();
    click(&mut ws, 60.0, 60.0);

    ws.select_tool(Tool::Undo).unwrap();

    let records: Vec<_> = ws.annotations().iter().collect();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].sequence, 1);
    assert_eq!(
        records[0].kind,
        AnnotationKind::Mark {
            value: MarkKind::Correct,
            anchor: Point::new(50.0, 50.0),
        }
    );
}

#[test]
fn undo_removes_newest_record_across_pages() {
    let mut ws = open_workspace(3, Settings::offline());
    ws.select_tool(Tool::MarkCorrect).unwrap();
    click(&mut ws, 10.0, 10.0);
    ws.go_to_page(3).unwrap();
    settle(&mut ws);
    click(&mut ws, 20.0, 20.0);
    ws.prev_page().unwrap();
    settle(&mut ws);
    click(&mut ws, 30.0, 30.0);
    ws.go_to_page(1).unwrap();
    settle(&mut ws);

    let changes = ws.select_tool(Tool::Undo).unwrap();
    assert_eq!(changes, vec![StoreChange::Removed { page: 2, sequence: 3 }]);

    let left: Vec<(usize, u64)> = ws.annotations().iter().map(|r| (r.page, r.sequence)).collect();
    assert_eq!(left, vec![(1, 1), (3, 2)]);
}

#[test]
fn page_scoped_undo_only_touches_displayed_page() {
    let settings = Settings {
        undo_scope: UndoScope::Page,
        ..Settings::offline()
    };
    let mut ws = open_workspace(2, settings);
    ws.select_tool(Tool::MarkCorrect).unwrap();
    click(&mut ws, 10.0, 10.0);
    ws.next_page().unwrap();
    settle(&mut ws);
    click(&mut ws, 20.0, 20.0);
    ws.prev_page().unwrap();
    settle(&mut ws);

    ws.select_tool(Tool::Undo).unwrap();
    let left: Vec<usize> = ws.annotations().iter().map(|r| r.page).collect();
    assert_eq!(left, vec![2]);
}

#[test]
fn clear_empties_the_displayed_page() {
    let mut ws = open_workspace(2, Settings::offline());
    ws.select_tool(Tool::MarkCorrect).unwrap();
    click(&mut ws, 10.0, 10.0);
    click(&mut ws, 40.0, 10.0);
    let marked = ws.surface().unwrap().clone();

    ws.select_tool(Tool::Clear).unwrap();
    assert!(ws.annotations().is_empty());
    assert!(ws.surface().unwrap().pixels != marked.pixels);
}

#[test]
fn next_on_last_page_reports_one_boundary_error() {
    let mut ws = open_workspace(2, Settings::offline());
    assert_eq!(ws.next_page().unwrap(), 2);
    settle(&mut ws);

    let err = ws.next_page().unwrap_err();
    assert!(matches!(err, WorkspaceError::Boundary { requested: 3, total: 2 }));
    assert_eq!(ws.current_page(), 2);
    assert_eq!(ws.notifications().of_kind("boundary").count(), 1);
    assert_eq!(ws.navigation().visited_count(), 2);
    assert!(ws.is_surface_ready());
}

#[test]
fn failed_navigation_counts_when_configured() {
    let settings = Settings {
        count_failed_navigation: true,
        ..Settings::offline()
    };
    let mut ws = open_workspace(1, settings);
    assert!(ws.next_page().is_err());
    assert_eq!(ws.navigation().visited_count(), 2);
}

#[test]
fn gestures_are_discarded_until_the_page_is_rendered() {
    let mut ws = open_workspace(2, Settings::offline());
    ws.select_tool(Tool::MarkCorrect).unwrap();
    ws.next_page().unwrap();

    assert!(!ws.is_surface_ready());
    assert_eq!(click(&mut ws, 10.0, 10.0), GestureOutcome::Discarded);
    assert!(ws.annotations().is_empty());

    settle(&mut ws);
    assert!(matches!(click(&mut ws, 10.0, 10.0), GestureOutcome::Changed(_)));
    assert_eq!(ws.annotations().last().unwrap().page, 2);
}

#[test]
fn late_render_does_not_replace_the_next_page() {
    let mut ws = open_workspace(4, Settings::offline());
    ws.go_to_page(2).unwrap();
    ws.go_to_page(3).unwrap();
    ws.go_to_page(4).unwrap();
    settle(&mut ws);

    assert_eq!(ws.surface().unwrap().page, 4);
    assert_eq!(ws.current_page(), 4);
}

#[test]
fn malformed_document_is_reported_and_workspace_stays_open() {
    let mut ws = Workspace::new(Settings::offline()).unwrap();
    ws.open(DocumentSource::memory("junk", b"not a paged document".to_vec()))
        .unwrap();
    assert!(ws.block_until_idle(WAIT));

    assert!(ws.document().is_none());
    assert!(ws.surface().is_none());
    assert_eq!(ws.notifications().of_kind("decode").count(), 1);
    assert!(matches!(ws.next_page(), Err(WorkspaceError::NotLoaded)));

    ws.open(DocumentSource::memory("sheet-2", sample_pdf(1)))
        .unwrap();
    assert!(ws.block_until_idle(WAIT));
    assert!(ws.is_surface_ready());
}

#[test]
fn totals_and_verdict_handoff() {
    let mut ws = open_workspace(2, Settings::offline());
    ws.set_questions(&sample_questions());
    ws.award("Q1", MarkValue::whole(4).unwrap());
    ws.award("Q2", MarkValue::whole(6).unwrap());
    ws.award("Q3", MarkValue::Zero);
    assert_eq!(ws.ledger().total().to_string(), "10 / 30");
    assert_eq!(ws.ledger().total_for_page(1).to_string(), "10 / 20");

    ws.select_tool(Tool::MarkCorrect).unwrap();
    click(&mut ws, 10.0, 10.0);

    let mut sink = MemorySink::default();
    let handoff = ws.conclude_into(Verdict::Accept, &mut sink).unwrap();
    assert_eq!(handoff.sheet, "sheet-1");
    assert_eq!(handoff.verdict, Verdict::Accept);
    assert_eq!(handoff.total.to_string(), "10 / 30");
    assert_eq!(handoff.annotation_count, 1);
    assert_eq!(sink.delivered.len(), 1);

    let json = serde_json::to_value(&handoff).unwrap();
    assert_eq!(json["verdict"], "accept");
    assert_eq!(json["scores"][0]["selection"], "4");
}

#[test]
fn conclude_without_document_is_rejected() {
    let ws = Workspace::new(Settings::offline()).unwrap();
    assert!(matches!(
        ws.conclude(Verdict::Reject),
        Err(WorkspaceError::NotLoaded)
    ));
}

#[test]
fn teardown_is_idempotent() {
    let mut ws = open_workspace(1, Settings::offline());
    ws.teardown();
    assert!(ws.is_torn_down());
    assert!(ws.document().is_none());
    ws.teardown();
    assert!(ws.is_torn_down());
}

#[test]
fn reopening_a_document_starts_a_fresh_ledger() {
    let mut ws = open_workspace(2, Settings::offline());
    ws.set_questions(&sample_questions());
    ws.award("Q1", MarkValue::whole(4).unwrap());
    ws.select_tool(Tool::MarkCorrect).unwrap();
    click(&mut ws, 10.0, 10.0);

    ws.open(DocumentSource::memory("sheet-2", sample_pdf(1)))
        .unwrap();
    assert!(ws.block_until_idle(WAIT));

    assert!(ws.ledger().entries().is_empty());
    assert!(ws.annotations().is_empty());
    let handoff = ws.conclude(Verdict::Accept).unwrap();
    assert_eq!(handoff.sheet, "sheet-2");
    assert_eq!(handoff.total.to_string(), "0 / 0");
    assert!(handoff.scores.is_empty());
}

#[test]
fn teardown_disposes_the_running_probe() {
    let settings = Settings {
        // Nothing listens on the discard port
        server_url: "http://127.0.0.1:9".to_string(),
        probe_interval_secs: 60,
        request_timeout_secs: 1,
        ..Settings::offline()
    };
    let mut ws = Workspace::new(settings).unwrap();
    assert_eq!(ws.is_online(), Some(false));

    ws.teardown();
    assert_eq!(ws.is_online(), None);
    ws.teardown();
    assert!(ws.is_torn_down());
}

#[test]
fn changing_scale_rerenders_the_page() {
    let mut ws = open_workspace(1, Settings::offline());
    ws.select_tool(Tool::MarkCorrect).unwrap();
    click(&mut ws, 10.0, 10.0);

    ws.set_scale(1.0);
    assert!(!ws.is_surface_ready());
    settle(&mut ws);

    assert_eq!(ws.surface_size(), SurfaceSize::new(PAGE_WIDTH, PAGE_HEIGHT));
    assert_eq!(ws.annotations().len(), 1);
    assert!(ws.is_surface_ready());
}

#[test]
fn composed_png_is_a_png() {
    let mut ws = open_workspace(1, Settings::offline());
    ws.select_tool(Tool::MarkCorrect).unwrap();
    click(&mut ws, 40.0, 40.0);

    let png = ws.composed_png().unwrap();
    assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
}

#[test]
fn text_labels_use_the_prompt_answer() {
    let mut ws = open_workspace(1, Settings::offline());
    ws.select_tool(Tool::TextLabel).unwrap();

    let mut answer = |_at: Point| Some("method ok".to_string());
    let outcome = ws
        .pointer_with_prompt(Gesture::Click(Point::new(20.0, 30.0)), &mut answer)
        .unwrap();
    assert!(matches!(outcome, GestureOutcome::Changed(_)));

    let mut cancel = |_at: Point| -> Option<String> { None };
    let outcome = ws
        .pointer_with_prompt(Gesture::Click(Point::new(20.0, 60.0)), &mut cancel)
        .unwrap();
    assert_eq!(outcome, GestureOutcome::Consumed);
    assert_eq!(ws.annotations().len(), 1);
}
