use axum::extract::Query;
use axum::extract::rejection::QueryRejection;
use axum::http::HeaderMap;
use serde::Deserialize;

use crate::error::SurveyError;

pub(super) const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Query parameters shared by the admin routes.
#[derive(Debug, Default, Deserialize)]
pub(super) struct AdminQuery {
    #[serde(default)]
    pub(super) token: Option<String>,
    #[serde(default)]
    pub(super) q: Option<String>,
}

/// Gate for every admin operation. The header wins over the `token` query
/// parameter when both are sent; the value must equal the configured secret
/// byte for byte.
pub(super) fn require_admin(
    headers: &HeaderMap,
    query_token: Option<&str>,
    expected: &str,
) -> Result<(), SurveyError> {
    let header_token = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());

    let provided = header_token
        .or_else(|| query_token.filter(|v| !v.is_empty()))
        .ok_or(SurveyError::Unauthorized)?;

    if provided != expected {
        return Err(SurveyError::Unauthorized);
    }

    Ok(())
}

/// Authorizes the caller and hands back the parsed query. A query string that
/// fails to parse can still be authorized by header, and is then rejected as
/// invalid input.
pub(super) fn authorize(
    headers: &HeaderMap,
    query: Result<Query<AdminQuery>, QueryRejection>,
    expected: &str,
) -> Result<AdminQuery, SurveyError> {
    match query {
        Ok(Query(query)) => {
            require_admin(headers, query.token.as_deref(), expected)?;
            Ok(query)
        }
        Err(_) => {
            require_admin(headers, None, expected)?;
            Err(SurveyError::Validation("invalid query string".to_string()))
        }
    }
}
