use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;

use crucible_compile::Language;
use crucible_contract::ValidationReport;
use crucible_service::{ServiceError, ServiceStats};
use crucible_types::{AliasRecord, EventRecord};

use crate::error::{ServerError, ServerResult};
use crate::router::AppState;

fn header_value(value: &str) -> HeaderValue {
    // Hash and JSON-escaped header payloads are always representable; the
    // fallback keeps response building total.
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static(""))
}

// ---- Compile and validate ----

pub async fn compile(
    State(state): State<AppState>,
    Path(language): Path<String>,
    body: Bytes,
) -> ServerResult<Response> {
    let outcome = state.service.compile(&language, &body).await?;

    let valid = outcome.validation.valid;
    let errors = outcome.validation.errors.clone();
    let warnings = outcome.validation.warnings.clone();

    let mut response = (StatusCode::OK, outcome.bytes).into_response();
    let headers = response.headers_mut();
    headers.insert("Content-Type", HeaderValue::from_static("application/wasm"));
    headers.insert("X-Input-Hash", header_value(&outcome.input_hash.to_hex()));
    headers.insert("X-Output-Hash", header_value(&outcome.output_hash.to_hex()));
    headers.insert(
        "X-Contract-Valid",
        HeaderValue::from_static(if valid { "true" } else { "false" }),
    );
    if !errors.is_empty() {
        let encoded = serde_json::to_string(&errors).unwrap_or_default();
        headers.insert("X-Contract-Errors", header_value(&encoded));
    }
    if !warnings.is_empty() {
        let encoded = serde_json::to_string(&warnings).unwrap_or_default();
        headers.insert("X-Contract-Warnings", header_value(&encoded));
    }
    Ok(response)
}

pub async fn validate(
    State(state): State<AppState>,
    body: Bytes,
) -> Json<ValidationReport> {
    Json(state.service.validate(&body))
}

// ---- Run ----

#[derive(Debug, Deserialize)]
pub struct RunQuery {
    /// Source the input from a stored blob instead of the request body.
    pub input: Option<String>,
}

pub async fn run(
    State(state): State<AppState>,
    Path(reference): Path<String>,
    Query(query): Query<RunQuery>,
    body: Bytes,
) -> ServerResult<Response> {
    let input = match &query.input {
        Some(input_ref) => state.service.fetch_blob(input_ref)?.data,
        None => body.to_vec(),
    };
    if input.len() > state.config.max_input_bytes {
        return Err(ServerError::InputTooLarge {
            max: state.config.max_input_bytes,
        });
    }

    let outcome = state.service.run(&reference, &input).await?;

    let mut response = (StatusCode::OK, outcome.output).into_response();
    let headers = response.headers_mut();
    headers.insert(
        "Content-Type",
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert("X-Module-Hash", header_value(&outcome.module_hash.to_hex()));
    headers.insert("X-Input-Hash", header_value(&outcome.input_hash.to_hex()));
    headers.insert("X-Output-Hash", header_value(&outcome.output_hash.to_hex()));
    Ok(response)
}

// ---- Blobs ----

pub async fn blob(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> ServerResult<Response> {
    let fetched = state.service.fetch_blob(&reference)?;
    let via_alias = fetched.alias.is_some();

    let mut response = (StatusCode::OK, fetched.data).into_response();
    let headers = response.headers_mut();
    headers.insert(
        "Content-Type",
        HeaderValue::from_static("application/octet-stream"),
    );
    if via_alias {
        headers.insert("X-Resolved-Hash", header_value(&fetched.hash.to_hex()));
    }
    Ok(response)
}

// ---- Aliases ----

#[derive(Debug, Deserialize)]
pub struct SetAliasBody {
    pub hash: String,
}

pub async fn list_aliases(
    State(state): State<AppState>,
) -> ServerResult<Json<Vec<AliasRecord>>> {
    Ok(Json(state.service.list_aliases()?))
}

pub async fn get_alias(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ServerResult<Json<AliasRecord>> {
    state
        .service
        .alias(&name)?
        .map(Json)
        .ok_or_else(|| ServerError::Service(ServiceError::AliasNotFound(name)))
}

pub async fn put_alias(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<SetAliasBody>,
) -> ServerResult<Json<AliasRecord>> {
    Ok(Json(state.service.set_alias(&name, &body.hash)?))
}

pub async fn delete_alias(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ServerResult<Json<serde_json::Value>> {
    if state.service.delete_alias(&name)? {
        Ok(Json(json!({ "deleted": name })))
    } else {
        Err(ServerError::Service(ServiceError::AliasNotFound(name)))
    }
}

// ---- Introspection ----

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
}

pub async fn events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> ServerResult<Json<Vec<EventRecord>>> {
    Ok(Json(state.service.events(query.limit)?))
}

pub async fn stats(State(state): State<AppState>) -> ServerResult<Json<ServiceStats>> {
    Ok(Json(state.service.stats()?))
}

pub async fn languages(State(state): State<AppState>) -> Json<Vec<Language>> {
    Json(state.service.languages())
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
