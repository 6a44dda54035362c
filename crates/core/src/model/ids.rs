use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error type for parsing an ID from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    kind: &'static str,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} cannot be empty", self.kind)
    }
}

impl std::error::Error for ParseIdError {}

// Identifiers are issued by the Question Service and are opaque to the engine,
// so they are kept as trimmed, non-empty strings.
macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new id from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the underlying string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err(ParseIdError {
                        kind: stringify!($name),
                    });
                }
                Ok(Self(trimmed.to_owned()))
            }
        }
    };
}

opaque_id!(
    /// Identifier of a practice session, issued on session start.
    SessionId
);

opaque_id!(
    /// Identifier of a question in the question bank.
    QuestionId
);

opaque_id!(
    /// Identifier of a curriculum unit (e.g. `unit-3`).
    UnitId
);

opaque_id!(
    /// Identifier of the learner the session belongs to.
    UserId
);

/// Key under which a session snapshot is persisted.
///
/// One key exists per unit plus one for mixed mode, so at most one resumable
/// session exists for each.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotKey(String);

impl SnapshotKey {
    const PREFIX: &'static str = "practice-session";

    #[must_use]
    pub fn for_unit(unit_id: &UnitId) -> Self {
        Self(format!("{}:unit:{}", Self::PREFIX, unit_id))
    }

    #[must_use]
    pub fn mixed() -> Self {
        Self(format!("{}:mixed", Self::PREFIX))
    }

    /// Rehydrate a key read back from storage.
    #[must_use]
    pub fn from_persisted(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SnapshotKey({})", self.0)
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_id_display_is_raw_value() {
        let id = QuestionId::new("q-42");
        assert_eq!(id.to_string(), "q-42");
        assert_eq!(format!("{id:?}"), "QuestionId(q-42)");
    }

    #[test]
    fn parsing_trims_and_rejects_blank() {
        let id: UnitId = "  unit-2 ".parse().unwrap();
        assert_eq!(id.as_str(), "unit-2");

        let err = "   ".parse::<SessionId>().unwrap_err();
        assert_eq!(err.to_string(), "SessionId cannot be empty");
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let json = serde_json::to_string(&QuestionId::new("abc")).unwrap();
        assert_eq!(json, "\"abc\"");
    }

    #[test]
    fn snapshot_keys_are_distinct_per_unit_and_mixed() {
        let unit_one = SnapshotKey::for_unit(&UnitId::new("1"));
        let unit_two = SnapshotKey::for_unit(&UnitId::new("2"));
        assert_ne!(unit_one, unit_two);
        assert_ne!(unit_one, SnapshotKey::mixed());
        assert_eq!(SnapshotKey::mixed().as_str(), "practice-session:mixed");
    }
}
