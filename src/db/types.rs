use serde::{Deserialize, Serialize};
use sqlx::Type;

/// Author of a single transcript message. Stored inside the `messages` JSONB array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "gradeoutcome", rename_all = "snake_case")]
pub(crate) enum GradeOutcome {
    #[default]
    NotGraded,
    Correct,
    Incorrect,
}

impl GradeOutcome {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::NotGraded => "not_graded",
            Self::Correct => "correct",
            Self::Incorrect => "incorrect",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_outcome_uses_snake_case() {
        let value = serde_json::to_value(GradeOutcome::NotGraded).unwrap();
        assert_eq!(value, "not_graded");
        let parsed: GradeOutcome = serde_json::from_value("incorrect".into()).unwrap();
        assert_eq!(parsed, GradeOutcome::Incorrect);
    }

    #[test]
    fn message_role_rejects_unknown_values() {
        assert!(serde_json::from_value::<MessageRole>("tool".into()).is_err());
    }
}
