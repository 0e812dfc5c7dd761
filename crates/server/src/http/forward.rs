use askama::Template;
use serde::{Deserialize, Serialize};
use survey_contracts::Response;
use survey_contracts::answers::answer_lines;

use crate::error::SurveyError;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct ForwardRequest {
    #[serde(default)]
    pub(super) to: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct ForwardResponse {
    pub(super) ok: bool,
    #[serde(rename = "messageId")]
    pub(super) message_id: String,
}

struct AnswerItem {
    question: String,
    lines: Vec<String>,
}

#[derive(Template)]
#[template(path = "forward.html")]
struct ForwardTemplate<'a> {
    id: i64,
    created_at: &'a str,
    metadata: &'a str,
    has_metadata: bool,
    items: Vec<AnswerItem>,
}

impl ForwardRequest {
    /// Trimmed recipient, rejected when missing or blank.
    pub(super) fn recipient(&self) -> Result<String, SurveyError> {
        self.to
            .as_deref()
            .map(str::trim)
            .filter(|to| !to.is_empty())
            .map(str::to_string)
            .ok_or_else(|| SurveyError::Validation("missing to".to_string()))
    }
}

pub(super) fn parse_response_id(raw: &str) -> Result<i64, SurveyError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| SurveyError::Validation("invalid response id".to_string()))
}

pub(super) fn forward_subject(id: i64) -> String {
    format!("Survey response #{}", id)
}

/// Question/answer table for one response. Every interpolated value is
/// HTML-escaped; line breaks inside an answer become `<br>`.
pub(super) fn render_forward_html(response: &Response) -> Result<String, SurveyError> {
    let items = response
        .answers
        .iter()
        .map(|(question, value)| AnswerItem {
            question: question.clone(),
            lines: answer_lines(value),
        })
        .collect();

    ForwardTemplate {
        id: response.id,
        created_at: &response.created_at,
        metadata: &response.metadata,
        has_metadata: !response.metadata.is_empty(),
        items,
    }
    .render()
    .map_err(|err| SurveyError::Internal(format!("failed to render forward template: {}", err)))
}
