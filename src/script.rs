//! Scripted grading sessions
//!
//! A script is a YAML file naming a document, optionally an inline question
//! schema, and a list of steps replayed against a [`Workspace`]:
//!
//! ```yaml
//! source:
//!   file: answers.pdf
//! steps:
//!   - tool: freehand-pen
//!   - down: [10, 10]
//!   - move: [20, 10]
//!   - up
//!   - award: { question: Q1, value: "4" }
//!   - next
//! verdict: accept
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use log::{info, warn};
use serde::Deserialize;

use crate::fetch::QuestionSchema;
use crate::pdf::{DocumentSource, Point};
use crate::score::{MarkValue, ScoreTotal, Verdict, VerdictHandoff};
use crate::settings::Settings;
use crate::tools::{Gesture, Tool};
use crate::workspace::{GestureOutcome, Workspace};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptSource {
    /// Sheet id fetched from the sheet service
    Sheet(String),
    /// Local file, relative paths resolve against the script's directory
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Award {
    pub question: String,
    pub value: MarkValue,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TextAnswer {
    pub at: Point,
    /// `None` behaves like a cancelled prompt
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Tool(Tool),
    Down(Point),
    Move(Point),
    Up,
    Leave,
    Click(Point),
    /// Click with the text-label tool, answering the prompt with `value`
    Text(TextAnswer),
    Next,
    Prev,
    GoTo(usize),
    Focus(String),
    /// Palette value for the focused question
    Mark(MarkValue),
    Award(Award),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Script {
    pub source: ScriptSource,
    #[serde(default)]
    pub questions: Option<Vec<QuestionSchema>>,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub verdict: Option<Verdict>,
    /// Seconds to wait for each load or render
    #[serde(default = "default_wait_secs")]
    pub wait_secs: u64,
}

fn default_wait_secs() -> u64 {
    30
}

impl Script {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading script {}", path.display()))?;
        let script = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing script {}", path.display()))?;
        Ok(script)
    }

    fn document_source(&self, base_dir: &Path) -> DocumentSource {
        match &self.source {
            ScriptSource::Sheet(sheet) => DocumentSource::remote(sheet.clone()),
            ScriptSource::File(path) if path.is_relative() => DocumentSource::File {
                path: base_dir.join(path),
            },
            ScriptSource::File(path) => DocumentSource::File { path: path.clone() },
        }
    }
}

/// Outcome of a replayed session
#[derive(Debug)]
pub struct ScriptReport {
    pub page: usize,
    pub total_pages: usize,
    pub visited_count: usize,
    pub annotation_count: usize,
    pub total: ScoreTotal,
    /// Per-page totals for pages that carry questions
    pub page_totals: Vec<(usize, ScoreTotal)>,
    pub over_awarded: Vec<String>,
    /// Messages of every notification raised, oldest first
    pub notices: Vec<String>,
    pub discarded_gestures: usize,
    /// Composited final page
    pub png: Option<Vec<u8>>,
    pub handoff: Option<VerdictHandoff>,
}

/// Replay `script` in a fresh workspace
pub fn run(script: &Script, settings: Settings, base_dir: &Path) -> anyhow::Result<ScriptReport> {
    let wait = Duration::from_secs(script.wait_secs.max(1));
    let mut workspace = Workspace::new(settings)?;

    workspace.open(script.document_source(base_dir))?;
    if !workspace.block_until_idle(wait) {
        bail!("timed out loading the document");
    }
    let Some(document) = workspace.document() else {
        let reason = workspace
            .notifications()
            .current()
            .map(|n| n.message.clone())
            .unwrap_or_else(|| "unknown error".to_string());
        bail!("document did not load: {reason}");
    };
    info!("Replaying {} steps on {}", script.steps.len(), document.sheet());

    match (&script.questions, &script.source) {
        (Some(questions), _) => workspace.set_questions(questions),
        (None, ScriptSource::Sheet(sheet)) => {
            // Reported through notifications; grading can go on without scores
            let _ = workspace.load_questions(sheet);
        }
        (None, ScriptSource::File(_)) => {}
    }

    let mut discarded_gestures = 0;
    for step in &script.steps {
        let discarded = apply_step(&mut workspace, step);
        if discarded {
            discarded_gestures += 1;
        }
        if !workspace.block_until_idle(wait) {
            warn!("Timed out waiting after {step:?}");
        }
    }

    let ledger = workspace.ledger();
    let mut pages: Vec<usize> = ledger.entries().iter().filter_map(|e| e.page).collect();
    pages.sort_unstable();
    pages.dedup();

    let png = match workspace.composed_png() {
        Ok(png) => Some(png),
        Err(e) => {
            warn!("No composited page to export: {e}");
            None
        }
    };

    let nav = workspace.navigation();
    let mut report = ScriptReport {
        page: nav.current_page(),
        total_pages: nav.total_pages(),
        visited_count: nav.visited_count(),
        annotation_count: workspace.annotations().len(),
        total: ledger.total(),
        page_totals: pages
            .into_iter()
            .map(|page| (page, ledger.total_for_page(page)))
            .collect(),
        over_awarded: ledger
            .over_awarded()
            .map(|e| e.question_id.clone())
            .collect(),
        notices: workspace
            .notifications()
            .all()
            .iter()
            .rev()
            .map(|n| n.message.clone())
            .collect(),
        discarded_gestures,
        png,
        handoff: None,
    };

    if let Some(verdict) = script.verdict {
        report.handoff = Some(workspace.conclude(verdict)?);
    }
    Ok(report)
}

/// Apply one step. Returns true if a gesture was discarded.
fn apply_step(workspace: &mut Workspace, step: &Step) -> bool {
    let gesture = match step {
        Step::Tool(tool) => {
            if let Err(e) = workspace.select_tool(*tool) {
                warn!("Selecting {tool:?} failed: {e}");
            }
            return false;
        }
        Step::Down(p) => Gesture::PointerDown(*p),
        Step::Move(p) => Gesture::PointerMove(*p),
        Step::Up => Gesture::PointerUp,
        Step::Leave => Gesture::PointerLeave,
        Step::Click(p) => Gesture::Click(*p),
        Step::Text(answer) => {
            let value = answer.value.clone();
            let mut prompt = move |_at: Point| value.clone();
            return gesture_discarded(
                workspace.pointer_with_prompt(Gesture::Click(answer.at), &mut prompt),
            );
        }
        Step::Next => {
            let _ = workspace.next_page();
            return false;
        }
        Step::Prev => {
            let _ = workspace.prev_page();
            return false;
        }
        Step::GoTo(page) => {
            let _ = workspace.go_to_page(*page);
            return false;
        }
        Step::Focus(question) => {
            workspace.focus_question(question);
            return false;
        }
        Step::Mark(value) => {
            if workspace.select_mark(*value).is_none() {
                warn!("No focused question for mark {value}");
            }
            return false;
        }
        Step::Award(award) => {
            if workspace.award(&award.question, award.value).is_none() {
                warn!("Unknown question {}", award.question);
            }
            return false;
        }
    };
    gesture_discarded(workspace.pointer(gesture))
}

fn gesture_discarded(outcome: crate::error::Result<GestureOutcome>) -> bool {
    match outcome {
        Ok(GestureOutcome::Discarded) => true,
        Ok(GestureOutcome::Consumed | GestureOutcome::Changed(_)) => false,
        Err(e) => {
            warn!("Gesture failed: {e}");
            false
        }
    }
}
