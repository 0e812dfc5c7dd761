use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use survey_contracts::{Answers, DEFAULT_SOURCE};

use crate::error::SurveyError;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct SubmitRequest {
    #[serde(default)]
    answers: Option<Value>,
    #[serde(default, deserialize_with = "scalar_text")]
    metadata: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    email: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    source: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct SubmitResponse {
    pub(super) ok: bool,
    pub(super) id: i64,
}

/// A submission that passed boundary validation, with defaults applied.
#[derive(Debug, PartialEq)]
pub(super) struct Submission {
    pub(super) answers: Answers,
    pub(super) metadata: String,
    pub(super) email: String,
    pub(super) source: String,
}

impl SubmitRequest {
    pub(super) fn into_submission(self) -> Result<Submission, SurveyError> {
        let Some(Value::Object(answers)) = self.answers else {
            return Err(SurveyError::Validation("missing answers".to_string()));
        };

        Ok(Submission {
            answers,
            metadata: self.metadata.unwrap_or_default(),
            email: self.email.unwrap_or_default(),
            source: self
                .source
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
        })
    }
}

/// Accepts a JSON string, number or boolean as text; `null` counts as absent.
fn scalar_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Array(_) | Value::Object(_) => Err(D::Error::custom(
            "expected a string, number or boolean",
        )),
    }
}
