//! Journal entries and mood pulses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ModelError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalVariant {
    #[default]
    QuickNote,
    /// Question-and-answer reflection, optionally tied to a habit.
    Guided,
    /// Filled-in template; content is derived from the fields.
    Structured,
}

impl JournalVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            JournalVariant::QuickNote => "quick note",
            JournalVariant::Guided => "guided",
            JournalVariant::Structured => "structured",
        }
    }
}

/// One labelled field of a structured entry, or one Q&A pair of a guided one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryField {
    pub label: String,
    pub value: String,
}

impl EntryField {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "JournalDocument")]
pub struct JournalEntry {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub variant: JournalVariant,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EntryField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub linked_goal_ids: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_habit_id: Option<Uuid>,
}

impl JournalEntry {
    pub fn quick_note(content: impl Into<String>, now: DateTime<Utc>) -> Result<Self, ModelError> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(ModelError::EmptyContent {
                variant: JournalVariant::QuickNote.as_str(),
            });
        }
        Ok(Self::with_content(JournalVariant::QuickNote, content, Vec::new(), now))
    }

    /// Guided reflection from question/answer pairs. Unanswered questions are dropped.
    pub fn guided(answers: Vec<EntryField>, now: DateTime<Utc>) -> Result<Self, ModelError> {
        let content = render_fields(&answers, "\n");
        if content.is_empty() {
            return Err(ModelError::EmptyContent {
                variant: JournalVariant::Guided.as_str(),
            });
        }
        Ok(Self::with_content(JournalVariant::Guided, content, answers, now))
    }

    /// Structured-template entry. Content is rendered from the non-blank fields.
    pub fn structured(fields: Vec<EntryField>, now: DateTime<Utc>) -> Result<Self, ModelError> {
        let content = render_fields(&fields, ": ");
        if content.is_empty() {
            return Err(ModelError::EmptyContent {
                variant: JournalVariant::Structured.as_str(),
            });
        }
        Ok(Self::with_content(JournalVariant::Structured, content, fields, now))
    }

    fn with_content(
        variant: JournalVariant,
        content: String,
        fields: Vec<EntryField>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            variant,
            content,
            fields,
            linked_goal_ids: Vec::new(),
            linked_habit_id: None,
        }
    }

    pub fn with_habit_link(mut self, habit_id: Uuid) -> Self {
        self.linked_habit_id = Some(habit_id);
        self
    }

    /// First `max_words` words of the content on a single line.
    pub fn excerpt(&self, max_words: usize) -> String {
        let words: Vec<&str> = self.content.split_whitespace().collect();
        if words.len() <= max_words {
            words.join(" ")
        } else {
            format!("{}…", words[..max_words].join(" "))
        }
    }
}

fn render_fields(fields: &[EntryField], separator: &str) -> String {
    fields
        .iter()
        .filter(|f| !f.value.trim().is_empty())
        .map(|f| format!("{}{}{}", f.label.trim(), separator, f.value.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Deserialize)]
struct JournalDocument {
    id: Uuid,
    created_at: DateTime<Utc>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    variant: JournalVariant,
    #[serde(default)]
    content: String,
    #[serde(default)]
    fields: Vec<EntryField>,
    #[serde(default)]
    linked_goal_ids: Vec<Uuid>,
    #[serde(default)]
    linked_habit_id: Option<Uuid>,
}

impl From<JournalDocument> for JournalEntry {
    fn from(doc: JournalDocument) -> Self {
        // Structured and guided entries saved with blank content are rebuilt from their fields.
        let content = if doc.content.trim().is_empty() {
            match doc.variant {
                JournalVariant::Structured => render_fields(&doc.fields, ": "),
                JournalVariant::Guided => render_fields(&doc.fields, "\n"),
                JournalVariant::QuickNote => doc.content,
            }
        } else {
            doc.content
        };
        JournalEntry {
            id: doc.id,
            created_at: doc.created_at,
            updated_at: doc.updated_at.unwrap_or(doc.created_at),
            variant: doc.variant,
            content,
            fields: doc.fields,
            linked_goal_ids: doc.linked_goal_ids,
            linked_habit_id: doc.linked_habit_id,
        }
    }
}

// ============================================================================
// Pulse (mood check-in)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulseEntry {
    pub id: Uuid,
    pub recorded_at: DateTime<Utc>,
    /// 1 (low) to 5 (high).
    pub mood: u8,
    #[serde(default)]
    pub energy: Option<u8>,
    #[serde(default)]
    pub note: Option<String>,
}

impl PulseEntry {
    pub fn new(mood: u8, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            recorded_at: now,
            mood: mood.clamp(1, 5),
            energy: None,
            note: None,
        }
    }

    pub fn with_energy(mut self, energy: u8) -> Self {
        self.energy = Some(energy.clamp(1, 5));
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 20, 0, 0).unwrap()
    }

    #[test]
    fn test_structured_content_derived_from_fields() {
        let entry = JournalEntry::structured(
            vec![
                EntryField::new("Grateful for", "a quiet morning"),
                EntryField::new("Struggled with", "  "),
                EntryField::new("Tomorrow", "call mum"),
            ],
            now(),
        )
        .unwrap();
        assert_eq!(entry.content, "Grateful for: a quiet morning\nTomorrow: call mum");
        assert_eq!(entry.variant, JournalVariant::Structured);
    }

    #[test]
    fn test_structured_all_blank_rejected() {
        let err = JournalEntry::structured(vec![EntryField::new("Mood", "")], now()).unwrap_err();
        assert_eq!(err, ModelError::EmptyContent { variant: "structured" });
        assert!(JournalEntry::quick_note("   ", now()).is_err());
    }

    #[test]
    fn test_blank_structured_document_is_repaired_on_load() {
        let json = r#"{
            "id": "0b7c6f8e-2d7a-4f55-8f0e-6a3e1d2c9b44",
            "created_at": "2026-02-01T08:00:00Z",
            "variant": "structured",
            "content": "",
            "fields": [{"label": "Win", "value": "finished the draft"}]
        }"#;
        let entry: JournalEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.content, "Win: finished the draft");
        assert_eq!(entry.updated_at, entry.created_at);
    }

    #[test]
    fn test_excerpt() {
        let entry = JournalEntry::quick_note("one two three four five", now()).unwrap();
        assert_eq!(entry.excerpt(3), "one two three…");
        assert_eq!(entry.excerpt(10), "one two three four five");
    }

    #[test]
    fn test_pulse_clamped() {
        let pulse = PulseEntry::new(9, now()).with_energy(0);
        assert_eq!(pulse.mood, 5);
        assert_eq!(pulse.energy, Some(1));
    }
}
