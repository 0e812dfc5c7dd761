use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use survey_mailer::{Mailer, OutgoingMail, SmtpMailer};
use survey_store::{NewResponse, ResponseStore};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tracing::Instrument;
use ulid::Ulid;

use crate::config::{CorsOrigin, ServerConfig, StartupError};
use crate::error::SurveyError;

mod admin;
mod export;
mod forward;
mod submit;

use self::admin::{ADMIN_TOKEN_HEADER, AdminQuery, authorize};
use self::export::{CSV_CONTENT_TYPE, CSV_DISPOSITION, render_csv};
use self::forward::{
    ForwardRequest, ForwardResponse, forward_subject, parse_response_id, render_forward_html,
};
use self::submit::{SubmitRequest, SubmitResponse};

const REQUEST_ID_HEADER: &str = "x-request-id";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    store: ResponseStore,
    mailer: Option<Arc<dyn Mailer>>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        store: ResponseStore,
        mailer: Option<Arc<dyn Mailer>>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            mailer,
        }
    }

    pub fn store(&self) -> &ResponseStore {
        &self.store
    }
}

/// Opens the store and, when SMTP settings are complete, the mail relay.
pub async fn build_state(config: ServerConfig) -> Result<AppState, StartupError> {
    let store = ResponseStore::open_and_migrate(
        &config.db_file,
        Duration::from_millis(config.store_timeout_ms),
    )
    .await
    .map_err(|err| StartupError {
        code: "ERR_STORE_UNAVAILABLE",
        message: format!("failed to initialize response store: {}", err),
    })?;

    let mailer = match config.mail.as_ref() {
        Some(mail) => {
            let mailer = SmtpMailer::new(mail).map_err(|err| StartupError {
                code: "ERR_INVALID_CONFIG",
                message: format!("failed to initialize mail relay: {}", err),
            })?;
            Some(Arc::new(mailer) as Arc<dyn Mailer>)
        }
        None => {
            tracing::info!("smtp settings incomplete; forwarding disabled");
            None
        }
    };

    Ok(AppState::new(config, store, mailer))
}

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origin);
    let admin_assets = ServeDir::new(&state.config.admin_dir);

    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/submit", post(submit))
        .route("/api/responses", get(list_responses))
        .route("/api/export.csv", get(export_csv))
        .route("/api/responses/{id}/forward", post(forward_response))
        .nest_service("/admin", admin_assets)
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origin: &CorsOrigin) -> CorsLayer {
    let allow_origin = match origin {
        CorsOrigin::Any => AllowOrigin::any(),
        CorsOrigin::List(origins) => AllowOrigin::list(
            origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok()),
        ),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(ADMIN_TOKEN_HEADER),
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
}

async fn root() -> &'static str {
    "survey intake is running"
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct ReadyzResponse {
    status: &'static str,
    checks: BTreeMap<&'static str, bool>,
}

async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let mut checks = BTreeMap::new();
    checks.insert("store", state.store.ping().await.is_ok());

    let all_ready = checks.values().all(|ok| *ok);
    let status = if all_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyzResponse {
            status: if all_ready { "ready" } else { "not_ready" },
            checks,
        }),
    )
}

async fn metrics(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<AdminQuery>, QueryRejection>,
) -> Response {
    if let Err(err) = authorize(&headers, query, &state.config.admin_token) {
        return err.into_response();
    }

    match crate::metrics::render() {
        Ok((body, content_type)) => {
            let mut headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(content_type.as_str()) {
                headers.insert(header::CONTENT_TYPE, value);
            }
            (headers, body).into_response()
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn submit(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    req: Result<Json<SubmitRequest>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request_id = extract_request_id(&headers);
    let ip = client_ip(&headers, peer, state.config.trust_forwarded_for);

    let span = tracing::info_span!(
        "survey.submit",
        request_id = %request_id,
        ip = %ip,
        source = tracing::field::Empty,
        response_id = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
        outcome = tracing::field::Empty,
    );

    let result = async {
        let Json(req) =
            req.map_err(|_| SurveyError::Validation("invalid JSON body".to_string()))?;
        let submission = req.into_submission()?;
        tracing::Span::current().record("source", submission.source.as_str());

        let created_at = now_rfc3339();
        let id = state
            .store
            .insert(NewResponse {
                created_at: &created_at,
                source: &submission.source,
                metadata: &submission.metadata,
                answers: &submission.answers,
                email: &submission.email,
                ip: &ip,
            })
            .await?;

        tracing::Span::current().record("response_id", id);
        crate::metrics::inc_submission();
        tracing::info!("response stored");

        Ok::<_, SurveyError>(Json(SubmitResponse { ok: true, id }))
    }
    .instrument(span.clone())
    .await;

    complete(&span, "/submit", "POST", started, result, json_error)
}

#[derive(Debug, Serialize)]
struct ListResponse {
    ok: bool,
    items: Vec<survey_contracts::Response>,
}

async fn list_responses(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<AdminQuery>, QueryRejection>,
) -> Response {
    let started = Instant::now();
    let request_id = extract_request_id(&headers);

    let span = tracing::info_span!(
        "survey.list",
        request_id = %request_id,
        filtered = tracing::field::Empty,
        items = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
        outcome = tracing::field::Empty,
    );

    let result = async {
        let query = authorize(&headers, query, &state.config.admin_token)?;
        let filter = query.q.as_deref().filter(|q| !q.is_empty());
        tracing::Span::current().record("filtered", filter.is_some());

        let items = state.store.list_all(filter).await?;
        tracing::Span::current().record("items", items.len());

        Ok::<_, SurveyError>(Json(ListResponse { ok: true, items }))
    }
    .instrument(span.clone())
    .await;

    complete(&span, "/api/responses", "GET", started, result, json_error)
}

async fn export_csv(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<AdminQuery>, QueryRejection>,
) -> Response {
    let started = Instant::now();
    let request_id = extract_request_id(&headers);

    let span = tracing::info_span!(
        "survey.export",
        request_id = %request_id,
        rows = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
        outcome = tracing::field::Empty,
    );

    let result = async {
        authorize(&headers, query, &state.config.admin_token)?;

        let responses = state.store.list_all(None).await?;
        tracing::Span::current().record("rows", responses.len());

        let body = render_csv(&responses)?;

        Ok::<_, SurveyError>((
            [
                (header::CONTENT_TYPE, CSV_CONTENT_TYPE),
                (header::CONTENT_DISPOSITION, CSV_DISPOSITION),
            ],
            body,
        ))
    }
    .instrument(span.clone())
    .await;

    complete(
        &span,
        "/api/export.csv",
        "GET",
        started,
        result,
        SurveyError::into_text_response,
    )
}

async fn forward_response(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
    query: Result<Query<AdminQuery>, QueryRejection>,
    req: Result<Json<ForwardRequest>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request_id = extract_request_id(&headers);

    let span = tracing::info_span!(
        "survey.forward",
        request_id = %request_id,
        response_id = tracing::field::Empty,
        message_id = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
        outcome = tracing::field::Empty,
    );

    let result = async {
        authorize(&headers, query, &state.config.admin_token)?;

        let id = parse_response_id(&raw_id)?;
        tracing::Span::current().record("response_id", id);

        let Json(req) =
            req.map_err(|_| SurveyError::Validation("invalid JSON body".to_string()))?;
        let to = req.recipient()?;

        let mailer = state
            .mailer
            .clone()
            .ok_or_else(|| SurveyError::Configuration("mail not available".to_string()))?;

        let response = state
            .store
            .get_by_id(id)
            .await?
            .ok_or(SurveyError::NotFound)?;
        let html = render_forward_html(&response)?;

        let sent = mailer
            .send(OutgoingMail {
                to,
                subject: forward_subject(id),
                html,
            })
            .await;

        match sent {
            Ok(message_id) => {
                crate::metrics::observe_forward("sent");
                tracing::Span::current().record("message_id", message_id.as_str());
                tracing::info!("response forwarded");
                Ok::<_, SurveyError>(Json(ForwardResponse {
                    ok: true,
                    message_id,
                }))
            }
            Err(err) => {
                crate::metrics::observe_forward("failed");
                Err(SurveyError::from(err))
            }
        }
    }
    .instrument(span.clone())
    .await;

    complete(
        &span,
        "/api/responses/{id}/forward",
        "POST",
        started,
        result,
        json_error,
    )
}

fn json_error(err: SurveyError) -> Response {
    err.into_response()
}

/// Turns a handler result into a response, recording latency and outcome on the
/// span and in the request metrics.
fn complete<T: IntoResponse>(
    span: &tracing::Span,
    route: &'static str,
    method: &'static str,
    started: Instant,
    result: Result<T, SurveyError>,
    on_error: fn(SurveyError) -> Response,
) -> Response {
    let response = match result {
        Ok(ok) => {
            span.record("outcome", "ok");
            ok.into_response()
        }
        Err(err) => {
            span.in_scope(|| err.log());
            span.record("outcome", err.code());
            on_error(err)
        }
    };

    let elapsed = started.elapsed();
    span.record("latency_ms", elapsed_ms(elapsed));
    crate::metrics::observe_http_request(route, method, response.status().as_u16(), elapsed);

    response
}

fn elapsed_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

fn extract_request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .and_then(sanitize_request_id)
        .unwrap_or_else(|| Ulid::new().to_string())
}

fn sanitize_request_id(raw: &str) -> Option<String> {
    const MAX_LEN: usize = 64;
    let mut out = String::with_capacity(raw.len().min(MAX_LEN));

    for ch in raw.chars() {
        if out.len() >= MAX_LEN {
            break;
        }
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
            out.push(ch);
        }
    }

    (!out.is_empty()).then_some(out)
}

/// Socket peer address, or the first `x-forwarded-for` hop when the deployment
/// sits behind a trusted proxy.
fn client_ip(headers: &HeaderMap, peer: SocketAddr, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for
        && let Some(hop) = headers
            .get(FORWARDED_FOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
    {
        return hop.to_canonical().to_string();
    }

    peer.ip().to_canonical().to_string()
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
