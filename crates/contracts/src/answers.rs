use serde_json::Value;

use crate::Answers;

/// Serializes answers to the compact JSON text stored in the `answers` column.
///
/// Question order is the order the client submitted them in, so encoding the
/// same mapping twice always yields the same bytes.
pub fn encode_answers(answers: &Answers) -> Result<String, serde_json::Error> {
    serde_json::to_string(answers)
}

pub fn decode_answers(raw: &str) -> Result<Answers, serde_json::Error> {
    serde_json::from_str::<Answers>(raw)
}

/// Text form of a single answer value.
pub fn answer_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(v) => v.clone(),
        other => other.to_string(),
    }
}

pub fn normalize_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

/// Splits an answer into display lines, accepting CRLF, CR and LF breaks.
pub fn answer_lines(value: &Value) -> Vec<String> {
    normalize_line_endings(&answer_text(value))
        .split('\n')
        .map(|line| line.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answers(value: Value) -> Answers {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn encode_keeps_submission_order() {
        let input = answers(serde_json::json!({
            "Why did you sign up?": "friends",
            "Age": "30",
            "Anything else?": "no"
        }));

        assert_eq!(
            encode_answers(&input).expect("encode should succeed"),
            r#"{"Why did you sign up?":"friends","Age":"30","Anything else?":"no"}"#
        );
    }

    #[test]
    fn decode_restores_the_encoded_mapping() {
        let input = answers(serde_json::json!({"b": "2", "a": "line1\nline2"}));
        let decoded = decode_answers(&encode_answers(&input).expect("encode should succeed"))
            .expect("decode should succeed");
        assert_eq!(decoded, input);
        assert_eq!(
            decoded.keys().collect::<Vec<_>>(),
            vec!["b", "a"],
            "key order must survive storage"
        );
    }

    #[test]
    fn encode_never_substitutes_an_empty_mapping() {
        let input = answers(serde_json::json!({"nested": {"a": [1, 2.5, null]}, "n": 3}));
        let encoded = encode_answers(&input).expect("encode should succeed");
        assert_ne!(encoded, "{}");
        assert_eq!(decode_answers(&encoded).expect("decode should succeed"), input);
    }

    #[test]
    fn decode_rejects_non_object_text() {
        assert!(decode_answers("[1,2]").is_err());
        assert!(decode_answers("not json").is_err());
    }

    #[test]
    fn answer_text_renders_scalars() {
        assert_eq!(answer_text(&Value::Null), "");
        assert_eq!(answer_text(&serde_json::json!("yes")), "yes");
        assert_eq!(answer_text(&serde_json::json!(4)), "4");
        assert_eq!(answer_text(&serde_json::json!(true)), "true");
        assert_eq!(answer_text(&serde_json::json!(["a", "b"])), r#"["a","b"]"#);
    }

    #[test]
    fn answer_lines_split_on_every_line_ending() {
        let lines = answer_lines(&serde_json::json!("one\r\ntwo\rthree\nfour"));
        assert_eq!(lines, vec!["one", "two", "three", "four"]);
    }
}
