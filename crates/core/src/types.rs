use std::{fmt, path::PathBuf};

/// One slide's narration, numbered from 1 in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideNote {
    pub slide_number: usize,
    pub title: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Ja,
    En,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::Ja, Language::En];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Ja => "ja",
            Language::En => "en",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlideStatus {
    Created(PathBuf),
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideOutcome {
    pub slide_number: usize,
    pub status: SlideStatus,
}

impl SlideOutcome {
    pub fn created(slide_number: usize, path: PathBuf) -> Self {
        Self {
            slide_number,
            status: SlideStatus::Created(path),
        }
    }

    pub fn skipped(slide_number: usize, reason: impl Into<String>) -> Self {
        Self {
            slide_number,
            status: SlideStatus::Skipped(reason.into()),
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self.status, SlideStatus::Created(_))
    }
}

/// Per-slide results of one best-effort loop, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub outcomes: Vec<SlideOutcome>,
}

impl BatchReport {
    pub fn push(&mut self, outcome: SlideOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn created(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_created()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.created()
    }

    pub fn created_paths(&self) -> Vec<PathBuf> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.status {
                SlideStatus::Created(path) => Some(path.clone()),
                SlideStatus::Skipped(_) => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConcatOutcome {
    Created(PathBuf),
    /// No per-slide clips existed for the language.
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackReport {
    pub language: Language,
    pub audio: BatchReport,
    pub clips: BatchReport,
    pub combined: ConcatOutcome,
}
