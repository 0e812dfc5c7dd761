use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod answers;

/// Ordered question → answer mapping, in the order the client submitted it.
pub type Answers = Map<String, Value>;

pub const DEFAULT_SOURCE: &str = "web";

/// Column order of the CSV export, also the field order of [`Response::csv_record`].
pub const CSV_COLUMNS: [&str; 7] = [
    "id",
    "created_at",
    "source",
    "metadata",
    "email",
    "ip",
    "answers",
];

/// One persisted survey submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: i64,
    pub created_at: String,
    pub source: String,
    pub metadata: String,
    pub answers: Answers,
    pub email: String,
    pub ip: String,
}

impl Response {
    pub fn answers_text(&self) -> Result<String, serde_json::Error> {
        answers::encode_answers(&self.answers)
    }

    pub fn csv_record(&self) -> Result<[String; 7], serde_json::Error> {
        Ok([
            self.id.to_string(),
            self.created_at.clone(),
            self.source.clone(),
            self.metadata.clone(),
            self.email.clone(),
            self.ip.clone(),
            self.answers_text()?,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Response {
        let Value::Object(answers) = serde_json::json!({"Q1": "foo bar", "Q2": "baz"}) else {
            panic!("fixture must be an object");
        };

        Response {
            id: 7,
            created_at: "2026-01-02T03:04:05.006Z".to_string(),
            source: DEFAULT_SOURCE.to_string(),
            metadata: "Jane, 2 Jan".to_string(),
            answers,
            email: "jane@example.com".to_string(),
            ip: "127.0.0.1".to_string(),
        }
    }

    #[test]
    fn response_serializes_answers_as_mapping() {
        let value = serde_json::to_value(sample()).expect("serialize should succeed");
        assert_eq!(value["id"], 7);
        assert_eq!(value["created_at"], "2026-01-02T03:04:05.006Z");
        assert_eq!(value["answers"]["Q1"], "foo bar");
        assert!(value["answers"].is_object());
    }

    #[test]
    fn csv_record_follows_column_order() {
        let record = sample().csv_record().expect("record should encode");
        assert_eq!(record.len(), CSV_COLUMNS.len());
        assert_eq!(record[0], "7");
        assert_eq!(record[3], "Jane, 2 Jan");
        assert_eq!(record[6], r#"{"Q1":"foo bar","Q2":"baz"}"#);
    }
}
