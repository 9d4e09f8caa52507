//! User feedback on AI output.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};
use crate::id::{ContentId, FeedbackId, OutputId, UserId};

/// How long (in hours) after creation the submitting user may still edit feedback.
pub const FEEDBACK_EDIT_WINDOW_HOURS: i64 = 24;

/// A correction submitted against an input/output pair.
///
/// Immutable once created, except for edits by the owner inside
/// [`FEEDBACK_EDIT_WINDOW_HOURS`] and the `learned_at` stamp written by the learning job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub id: FeedbackId,
    pub user_id: UserId,
    /// The input side of the pair.
    pub content_id: ContentId,
    /// The AI output being corrected.
    pub output_id: OutputId,
    pub correction: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learned_at: Option<DateTime<Utc>>,
}

impl Feedback {
    pub fn new(
        user_id: UserId,
        content_id: ContentId,
        output_id: OutputId,
        correction: JsonValue,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: FeedbackId::new(),
            user_id,
            content_id,
            output_id,
            correction,
            created_at: now,
            updated_at: now,
            learned_at: None,
        }
    }

    pub fn is_editable(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at <= Duration::hours(FEEDBACK_EDIT_WINDOW_HOURS)
    }

    /// Replace the correction payload.
    pub fn edit(&mut self, actor: UserId, correction: JsonValue, now: DateTime<Utc>) -> DomainResult<()> {
        if actor != self.user_id {
            return Err(DomainError::Unauthorized);
        }
        if !self.is_editable(now) {
            return Err(DomainError::conflict("feedback edit window has closed"));
        }
        self.correction = correction;
        self.updated_at = now;
        // An edited correction has not been learned yet.
        self.learned_at = None;
        Ok(())
    }

    /// Entities the user corrected, read from `correction.corrected_entities`.
    ///
    /// Accepts either plain strings or objects; anything else is ignored.
    pub fn corrected_entities(&self) -> Vec<JsonValue> {
        self.correction
            .get("corrected_entities")
            .and_then(JsonValue::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter(|v| v.is_string() || v.is_object())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_learned(&self) -> bool {
        self.learned_at.is_some()
    }
}

impl Entity for Feedback {
    type Id = FeedbackId;

    fn id(&self) -> FeedbackId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feedback(now: DateTime<Utc>) -> Feedback {
        Feedback::new(
            UserId::new(),
            ContentId::new(),
            OutputId::new(),
            json!({"corrected_entities": ["Project Alpha", {"type": "deadline", "value": "Friday"}, 7]}),
            now,
        )
    }

    #[test]
    fn extracts_corrected_entities() {
        let fb = feedback(Utc::now());
        let entities = fb.corrected_entities();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0], json!("Project Alpha"));
    }

    #[test]
    fn owner_can_edit_inside_window() {
        let now = Utc::now();
        let mut fb = feedback(now);
        fb.learned_at = Some(now);

        fb.edit(fb.user_id, json!({"corrected_entities": []}), now + Duration::hours(1))
            .unwrap();
        assert!(fb.corrected_entities().is_empty());
        assert!(!fb.is_learned());
    }

    #[test]
    fn edits_are_rejected_for_others_and_after_window() {
        let now = Utc::now();
        let mut fb = feedback(now);

        assert_eq!(fb.edit(UserId::new(), json!({}), now), Err(DomainError::Unauthorized));
        assert!(matches!(
            fb.edit(fb.user_id, json!({}), now + Duration::hours(25)),
            Err(DomainError::Conflict(_))
        ));
    }
}
