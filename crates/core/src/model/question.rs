use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{Difficulty, QuestionId, UnitId};

/// A practice question as served by the Question Service.
///
/// The engine only reads `id`, `difficulty` and `unit_id`. Every other field
/// (stem, options, code snippets, ...) is kept verbatim in `payload` and handed
/// to the presentation layer untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,
    pub difficulty: Difficulty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<UnitId>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Question {
    #[must_use]
    pub fn new(id: QuestionId, difficulty: Difficulty, unit_id: Option<UnitId>) -> Self {
        Self {
            id,
            difficulty,
            unit_id,
            payload: Map::new(),
        }
    }

    /// Attach an opaque presentation field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Read a string field from the presentation payload.
    #[must_use]
    pub fn text_field(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_fields_land_in_payload() {
        let json = r#"{
            "id": "q1",
            "difficulty": "MEDIUM",
            "unitId": "unit-4",
            "questionText": "What does this loop print?",
            "options": ["A", "B"]
        }"#;
        let question: Question = serde_json::from_str(json).unwrap();

        assert_eq!(question.id, QuestionId::new("q1"));
        assert_eq!(question.difficulty, Difficulty::Medium);
        assert_eq!(question.unit_id, Some(UnitId::new("unit-4")));
        assert_eq!(
            question.text_field("questionText"),
            Some("What does this loop print?")
        );
        assert!(question.payload.contains_key("options"));
        assert!(!question.payload.contains_key("id"));
    }

    #[test]
    fn unit_is_optional() {
        let question: Question =
            serde_json::from_str(r#"{"id": "q2", "difficulty": "EASY"}"#).unwrap();
        assert!(question.unit_id.is_none());
        assert!(question.payload.is_empty());
    }
}
