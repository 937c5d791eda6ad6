//! Score ledger, mark palette and verdict handoff

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::fetch::QuestionSchema;

/// Whole marks on the palette, 1 through 10.
///
/// Only [`WholeMarks::new`] and the palette itself construct one:
///
/// ```compile_fail
/// let _ = inkgrade::score::WholeMarks(42);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WholeMarks(u8);

impl WholeMarks {
    pub const MAX: u8 = 10;

    #[must_use]
    pub fn new(marks: u8) -> Option<Self> {
        (1..=Self::MAX).contains(&marks).then_some(Self(marks))
    }

    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }
}

/// One entry of the discrete mark palette
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkValue {
    Zero,
    Quarter,
    Half,
    Whole(WholeMarks),
    /// Question not applicable to this candidate
    NotApplicable,
}

impl MarkValue {
    /// Palette in display order
    pub const PALETTE: [MarkValue; 14] = [
        MarkValue::Zero,
        MarkValue::Quarter,
        MarkValue::Half,
        MarkValue::Whole(WholeMarks(1)),
        MarkValue::Whole(WholeMarks(2)),
        MarkValue::Whole(WholeMarks(3)),
        MarkValue::Whole(WholeMarks(4)),
        MarkValue::Whole(WholeMarks(5)),
        MarkValue::Whole(WholeMarks(6)),
        MarkValue::Whole(WholeMarks(7)),
        MarkValue::Whole(WholeMarks(8)),
        MarkValue::Whole(WholeMarks(9)),
        MarkValue::Whole(WholeMarks(10)),
        MarkValue::NotApplicable,
    ];

    /// Whole-mark palette entry, `None` outside 1..=10
    #[must_use]
    pub fn whole(marks: u8) -> Option<Self> {
        WholeMarks::new(marks).map(MarkValue::Whole)
    }

    /// Numeric value, `None` for NA
    #[must_use]
    pub fn marks(self) -> Option<f64> {
        match self {
            MarkValue::Zero => Some(0.0),
            MarkValue::Quarter => Some(0.25),
            MarkValue::Half => Some(0.5),
            MarkValue::Whole(n) => Some(f64::from(n.get())),
            MarkValue::NotApplicable => None,
        }
    }
}

impl fmt::Display for MarkValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkValue::Zero => write!(f, "0"),
            MarkValue::Quarter => write!(f, "1/4"),
            MarkValue::Half => write!(f, "1/2"),
            MarkValue::Whole(n) => write!(f, "{}", n.get()),
            MarkValue::NotApplicable => write!(f, "NA"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not on the mark palette")]
pub struct NotOnPalette(pub String);

impl FromStr for MarkValue {
    type Err = NotOnPalette;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed {
            "0" => return Ok(MarkValue::Zero),
            "1/4" | "0.25" => return Ok(MarkValue::Quarter),
            "1/2" | "0.5" => return Ok(MarkValue::Half),
            _ => {}
        }
        if trimmed.eq_ignore_ascii_case("na") {
            return Ok(MarkValue::NotApplicable);
        }
        trimmed
            .parse::<u8>()
            .ok()
            .and_then(MarkValue::whole)
            .ok_or_else(|| NotOnPalette(s.to_string()))
    }
}

impl Serialize for MarkValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Accepts palette strings ("1/4", "NA") as well as bare numbers
impl<'de> Deserialize<'de> for MarkValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PaletteVisitor;

        impl serde::de::Visitor<'_> for PaletteVisitor {
            type Value = MarkValue;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mark palette value")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<MarkValue, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<MarkValue, E> {
                self.visit_str(&v.to_string())
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<MarkValue, E> {
                self.visit_str(&v.to_string())
            }

            fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<MarkValue, E> {
                self.visit_str(&v.to_string())
            }
        }

        deserializer.deserialize_any(PaletteVisitor)
    }
}

/// Maximum and awarded marks for one question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub question_id: String,
    pub max_marks: f64,
    /// Page (1-based) the answer is on, when the schema says so
    pub page: Option<usize>,
    /// Last palette selection
    pub selection: Option<MarkValue>,
    /// Marks counted toward the total
    pub awarded_marks: f64,
}

impl ScoreEntry {
    #[must_use]
    pub fn is_not_applicable(&self) -> bool {
        self.selection == Some(MarkValue::NotApplicable)
    }

    #[must_use]
    pub fn is_over_awarded(&self) -> bool {
        self.awarded_marks > self.max_marks
    }
}

/// Awarded marks against available marks
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreTotal {
    pub awarded: f64,
    pub max: f64,
}

impl fmt::Display for ScoreTotal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", format_marks(self.awarded), format_marks(self.max))
    }
}

fn format_marks(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        let s = format!("{value:.2}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Per-question bookkeeping for one sheet
#[derive(Debug, Clone, Default)]
pub struct ScoreLedger {
    entries: Vec<ScoreEntry>,
    focused: Option<usize>,
    clamp: bool,
}

impl ScoreLedger {
    /// Seed the ledger from the read-only question schema
    #[must_use]
    pub fn from_schema(questions: &[QuestionSchema], clamp: bool) -> Self {
        let entries = questions
            .iter()
            .map(|q| ScoreEntry {
                question_id: q.id.clone(),
                max_marks: q.max_marks,
                page: q.page,
                selection: None,
                awarded_marks: 0.0,
            })
            .collect::<Vec<_>>();
        debug!("Score ledger seeded with {} questions", entries.len());
        Self {
            focused: (!entries.is_empty()).then_some(0),
            entries,
            clamp,
        }
    }

    pub fn entries(&self) -> &[ScoreEntry] {
        &self.entries
    }

    #[must_use]
    pub fn entry(&self, question_id: &str) -> Option<&ScoreEntry> {
        self.entries.iter().find(|e| e.question_id == question_id)
    }

    /// Question the palette currently applies to
    #[must_use]
    pub fn focused(&self) -> Option<&ScoreEntry> {
        self.focused.and_then(|idx| self.entries.get(idx))
    }

    /// Move palette focus to `question_id`. Returns false if unknown.
    pub fn focus(&mut self, question_id: &str) -> bool {
        match self.index_of(question_id) {
            Some(idx) => {
                self.focused = Some(idx);
                true
            }
            None => {
                warn!("Unknown question {question_id}");
                false
            }
        }
    }

    /// Apply a palette selection to the focused question
    pub fn select(&mut self, value: MarkValue) -> Option<&ScoreEntry> {
        let idx = self.focused?;
        self.apply(idx, value);
        self.entries.get(idx)
    }

    /// Apply a palette selection to `question_id`
    pub fn award(&mut self, question_id: &str, value: MarkValue) -> Option<&ScoreEntry> {
        let idx = self.index_of(question_id)?;
        self.focused = Some(idx);
        self.apply(idx, value);
        self.entries.get(idx)
    }

    fn apply(&mut self, idx: usize, value: MarkValue) {
        let clamp = self.clamp;
        let Some(entry) = self.entries.get_mut(idx) else {
            return;
        };
        let marks = value.marks().unwrap_or(0.0);
        entry.selection = Some(value);
        entry.awarded_marks = if clamp { marks.min(entry.max_marks) } else { marks };
        if marks > entry.max_marks {
            if clamp {
                debug!(
                    "Clamped {} from {marks} to {}",
                    entry.question_id, entry.max_marks
                );
            } else {
                warn!(
                    "{} awarded {marks} over its maximum of {}",
                    entry.question_id, entry.max_marks
                );
            }
        }
    }

    /// Questions whose awarded marks exceed their maximum
    pub fn over_awarded(&self) -> impl Iterator<Item = &ScoreEntry> {
        self.entries.iter().filter(|e| e.is_over_awarded())
    }

    /// Sum over every question
    #[must_use]
    pub fn total(&self) -> ScoreTotal {
        sum(self.entries.iter())
    }

    /// Sum over questions answered on `page`
    #[must_use]
    pub fn total_for_page(&self, page: usize) -> ScoreTotal {
        sum(self.entries.iter().filter(|e| e.page == Some(page)))
    }

    fn index_of(&self, question_id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.question_id == question_id)
    }
}

fn sum<'a>(entries: impl Iterator<Item = &'a ScoreEntry>) -> ScoreTotal {
    entries
        .filter(|e| !e.is_not_applicable())
        .fold(ScoreTotal { awarded: 0.0, max: 0.0 }, |acc, e| ScoreTotal {
            awarded: acc.awarded + e.awarded_marks,
            max: acc.max + e.max_marks,
        })
}

/// Terminal action on a sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    #[serde(alias = "finish")]
    Accept,
    Reject,
}

/// What a concluded session hands to the persistence collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictHandoff {
    pub sheet: String,
    pub verdict: Verdict,
    pub total: ScoreTotal,
    pub scores: Vec<ScoreEntry>,
    pub annotation_count: usize,
    pub concluded_at: chrono::DateTime<chrono::Utc>,
}

/// Receives the verdict of a concluded session
pub trait VerdictSink {
    fn deliver(&mut self, handoff: &VerdictHandoff) -> anyhow::Result<()>;
}

/// Collects handoffs in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pub delivered: Vec<VerdictHandoff>,
}

impl VerdictSink for MemorySink {
    fn deliver(&mut self, handoff: &VerdictHandoff) -> anyhow::Result<()> {
        self.delivered.push(handoff.clone());
        Ok(())
    }
}

/// Writes each handoff as pretty JSON to a file
#[derive(Debug)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl VerdictSink for JsonFileSink {
    fn deliver(&mut self, handoff: &VerdictHandoff) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(handoff)?;
        fs::write(&self.path, content)?;
        info!("Verdict for {} written to {:?}", handoff.sheet, self.path);
        Ok(())
    }
}
