use survey_contracts::{CSV_COLUMNS, Response};

use crate::error::SurveyError;

pub(super) const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";
pub(super) const CSV_DISPOSITION: &str = "attachment; filename=\"responses.csv\"";

/// Header row plus one row per response, in the order given. Fields are quoted
/// only when they contain a delimiter, quote or line break; rows end in `\n`.
pub(super) fn render_csv(responses: &[Response]) -> Result<Vec<u8>, SurveyError> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(CSV_COLUMNS).map_err(csv_failure)?;
    for response in responses {
        let record = response.csv_record().map_err(|err| {
            SurveyError::Internal(format!("failed to encode response {}: {}", response.id, err))
        })?;
        writer.write_record(record).map_err(csv_failure)?;
    }

    writer
        .into_inner()
        .map_err(|err| csv_failure(csv::Error::from(err.into_error())))
}

fn csv_failure(err: csv::Error) -> SurveyError {
    SurveyError::Internal(format!("failed to render csv: {}", err))
}
