use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use lkv_gateway::LedgerClient;

use crate::error::{ServerError, ServerResult};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub client: Arc<LedgerClient>,
}

impl AppState {
    pub fn new(client: Arc<LedgerClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PutValueBody {
    pub key: Option<String>,
    pub value: Option<String>,
}

/// Body of the private-message endpoints. `Debug` omits the message.
#[derive(Default, Deserialize)]
#[serde(default)]
pub struct PrivateMessageBody {
    pub collection: Option<String>,
    pub message: Option<String>,
}

impl std::fmt::Debug for PrivateMessageBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateMessageBody")
            .field("collection", &self.collection)
            .field("message", &self.message.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ServerResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ServerError::BadRequest(format!("Invalid request body: {}", rejection.body_text())))
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Like [`present`], but whitespace is a valid value.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "OK", "message": "API is running" }))
}

pub async fn get_value(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ServerResult<Json<Value>> {
    fetch_value(&state, key).await
}

/// `GET /api/kv/private` reads the public key `private`; the static route
/// would otherwise shadow `/api/kv/:key`.
pub async fn get_value_named_private(State(state): State<AppState>) -> ServerResult<Json<Value>> {
    fetch_value(&state, "private".to_string()).await
}

async fn fetch_value(state: &AppState, key: String) -> ServerResult<Json<Value>> {
    if key.trim().is_empty() {
        return Err(ServerError::BadRequest("Key parameter is required".into()));
    }
    info!(key = %key, "fetching value");
    let value = state
        .client
        .get_value(&key)
        .await
        .map_err(ServerError::gateway("get value"))?
        .ok_or_else(|| ServerError::NotFound("Key not found".into()))?;
    Ok(Json(json!({ "key": key, "value": value })))
}

pub async fn put_value(
    State(state): State<AppState>,
    payload: Result<Json<PutValueBody>, JsonRejection>,
) -> ServerResult<Response> {
    let body = body(payload)?;
    let (Some(key), Some(value)) = (present(body.key), non_empty(body.value)) else {
        return Err(ServerError::BadRequest("Both key and value are required".into()));
    };
    info!(key = %key, "storing value");
    let response = state
        .client
        .put_value(&key, &value)
        .await
        .map_err(ServerError::gateway("store key-value pair"))?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "key": key, "value": value, "response": response })),
    )
        .into_response())
}

pub async fn put_private_message(
    State(state): State<AppState>,
    payload: Result<Json<PrivateMessageBody>, JsonRejection>,
) -> ServerResult<Response> {
    let body = body(payload)?;
    let (Some(collection), Some(message)) = (present(body.collection), present(body.message)) else {
        return Err(ServerError::BadRequest("Both collection and message are required".into()));
    };
    info!(collection = %collection, "storing private message");
    let response = state
        .client
        .put_private_message(&collection, &message)
        .await
        .map_err(ServerError::gateway("store private message"))?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "collection": collection, "response": response })),
    )
        .into_response())
}

pub async fn get_private_message(
    State(state): State<AppState>,
    Path(collection): Path<String>,
) -> ServerResult<Json<Value>> {
    fetch_private_message(&state, collection).await
}

/// `GET /api/kv/private/verify` reads the collection named `verify`.
pub async fn get_private_message_named_verify(
    State(state): State<AppState>,
) -> ServerResult<Json<Value>> {
    fetch_private_message(&state, "verify".to_string()).await
}

async fn fetch_private_message(state: &AppState, collection: String) -> ServerResult<Json<Value>> {
    if collection.trim().is_empty() {
        return Err(ServerError::BadRequest("Collection parameter is required".into()));
    }
    info!(collection = %collection, "fetching private message");
    let message = state
        .client
        .get_private_message(&collection)
        .await
        .map_err(ServerError::gateway("get private message"))?
        .ok_or_else(|| ServerError::NotFound("Private message not found".into()))?;
    Ok(Json(json!({ "collection": collection, "message": message })))
}

pub async fn verify_private_message(
    State(state): State<AppState>,
    payload: Result<Json<PrivateMessageBody>, JsonRejection>,
) -> ServerResult<Response> {
    let body = body(payload)?;
    let (Some(collection), Some(message)) = (present(body.collection), present(body.message)) else {
        return Err(ServerError::BadRequest("Both collection and message are required".into()));
    };
    info!(collection = %collection, "verifying private message");
    let verified = state
        .client
        .verify_private_message(&collection, &message)
        .await
        .map_err(ServerError::gateway("verify private message"))?;
    let response = if verified {
        (
            StatusCode::OK,
            Json(json!({ "verified": true, "collection": collection })),
        )
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "verified": false, "message": "Message verification failed" })),
        )
    };
    Ok(response.into_response())
}

pub async fn not_found_handler() -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Route not found" })))
}
