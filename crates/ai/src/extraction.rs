//! Brain-dump entity extraction.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::result::AiError;

/// Entities pulled out of free-form notes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedEntities {
    pub projects: Vec<String>,
    pub action_items: Vec<String>,
    pub deadlines: Vec<String>,
}

/// An action item attached to its project and deadline, when one can be inferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredTask {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<String>,
}

impl ExtractedEntities {
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty() && self.action_items.is_empty() && self.deadlines.is_empty()
    }

    /// Turn raw action items into tasks.
    ///
    /// A single project in the notes is assumed to own every task; with several
    /// projects the task is left unassigned.
    pub fn tasks(&self) -> Vec<StructuredTask> {
        let project = match self.projects.as_slice() {
            [only] => Some(only.clone()),
            _ => None,
        };

        self.action_items
            .iter()
            .map(|item| StructuredTask {
                description: item.clone(),
                project: project.clone(),
                due: find_deadline(item),
            })
            .collect()
    }
}

/// Parses raw brain-dump text into entities.
///
/// Implementations may be rule based or backed by a model; in the latter case
/// provider errors surface as [`AiError`] and are classified like any other call.
pub trait EntityExtractor: Send + Sync + 'static {
    fn extract(&self, text: &str) -> Result<ExtractedEntities, AiError>;
}

impl<X> EntityExtractor for Arc<X>
where
    X: EntityExtractor + ?Sized,
{
    fn extract(&self, text: &str) -> Result<ExtractedEntities, AiError> {
        (**self).extract(text)
    }
}

static PROJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[Pp]roject\s+([A-Z][\w-]*)").expect("project pattern compiles")
});

static ACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:action(?:\s+item)?|todo|task)\s*:\s*([^.;\n]+)").expect("action pattern compiles")
});

static DEADLINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:by|before|due)\s+(monday|tuesday|wednesday|thursday|friday|saturday|sunday|today|tomorrow|eod|end of (?:day|week|month)|next week|\d{4}-\d{2}-\d{2})\b",
    )
    .expect("deadline pattern compiles")
});

fn find_deadline(text: &str) -> Option<String> {
    DEADLINE.captures(text).map(|c| c[1].to_string())
}

fn push_unique(into: &mut Vec<String>, value: String) {
    if !into.contains(&value) {
        into.push(value);
    }
}

/// Deterministic extractor used when no model-backed extractor is configured.
///
/// Recognises "Project X" mentions, "Action:/TODO:/Task:" items and
/// "by <day>" deadlines.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleBasedExtractor;

impl EntityExtractor for RuleBasedExtractor {
    fn extract(&self, text: &str) -> Result<ExtractedEntities, AiError> {
        let mut out = ExtractedEntities::default();

        for c in PROJECT.captures_iter(text) {
            push_unique(&mut out.projects, format!("Project {}", &c[1]));
        }

        for c in ACTION.captures_iter(text) {
            let item = c[1].trim();
            if !item.is_empty() {
                push_unique(&mut out.action_items, item.to_string());
            }
        }

        for c in DEADLINE.captures_iter(text) {
            push_unique(&mut out.deadlines, c[1].to_string());
        }

        Ok(out)
    }
}
