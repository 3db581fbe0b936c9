//! Admin token surface: CRUD by opaque tokenId, export/import, and rotation
//! hot-reload. Raw refresh tokens appear only in add/import/export bodies,
//! never in list responses.

use super::{admin_err, admin_ok};
use crate::accounts::{Account, AccountPatch, RotationStrategy, VariantKind};
use crate::config::RotationStrategyName;
use crate::server::router::CastorState;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::Deserialize;
use serde_json::{Value, json};

pub fn router() -> Router<CastorState> {
    Router::new()
        .route(
            "/admin/tokens/{variant}",
            get(list_tokens).post(add_token),
        )
        .route("/admin/tokens/{variant}/export", get(export_tokens))
        .route("/admin/tokens/{variant}/import", post(import_tokens))
        .route(
            "/admin/tokens/{variant}/{token_id}",
            put(update_token).delete(delete_token),
        )
        .route(
            "/admin/tokens/{variant}/{token_id}/refresh",
            post(refresh_token),
        )
        .route(
            "/admin/tokens/{variant}/{token_id}/project-id",
            post(fetch_project_id),
        )
        .route("/admin/rotation", post(update_rotation))
}

fn parse_variant(raw: &str) -> Result<VariantKind, Response> {
    match raw {
        "antigravity" => Ok(VariantKind::Antigravity),
        "geminicli" => Ok(VariantKind::GeminiCli),
        other => Err((
            StatusCode::NOT_FOUND,
            Json(admin_err(format!("unknown variant: {other}"))),
        )
            .into_response()),
    }
}

fn reply(result: Result<Value, String>) -> Response {
    match result {
        Ok(data) => (StatusCode::OK, Json(admin_ok(data))).into_response(),
        Err(message) => (StatusCode::BAD_REQUEST, Json(admin_err(message))).into_response(),
    }
}

async fn list_tokens(
    State(state): State<CastorState>,
    Path(variant): Path<String>,
) -> Response {
    let kind = match parse_variant(&variant) {
        Ok(kind) => kind,
        Err(resp) => return resp,
    };
    let result = state
        .channel(kind)
        .manager
        .list_accounts()
        .await
        .map(|accounts| json!(accounts))
        .map_err(|e| e.to_string());
    reply(result)
}

#[derive(Debug, Deserialize)]
struct AddTokenBody {
    refresh_token: String,
    #[serde(default, rename = "projectId")]
    project_id: Option<String>,
}

async fn add_token(
    State(state): State<CastorState>,
    Path(variant): Path<String>,
    Json(body): Json<AddTokenBody>,
) -> Response {
    let kind = match parse_variant(&variant) {
        Ok(kind) => kind,
        Err(resp) => return resp,
    };
    let result = state
        .channel(kind)
        .manager
        .add_account(body.refresh_token, body.project_id)
        .await
        .map(|token_id| json!({"tokenId": token_id}))
        .map_err(|e| e.to_string());
    reply(result)
}

async fn update_token(
    State(state): State<CastorState>,
    Path((variant, token_id)): Path<(String, String)>,
    Json(patch): Json<AccountPatch>,
) -> Response {
    let kind = match parse_variant(&variant) {
        Ok(kind) => kind,
        Err(resp) => return resp,
    };
    let result = state
        .channel(kind)
        .manager
        .update_account(token_id, patch)
        .await
        .map(|()| Value::Null)
        .map_err(|e| e.to_string());
    reply(result)
}

async fn delete_token(
    State(state): State<CastorState>,
    Path((variant, token_id)): Path<(String, String)>,
) -> Response {
    let kind = match parse_variant(&variant) {
        Ok(kind) => kind,
        Err(resp) => return resp,
    };
    let result = state
        .channel(kind)
        .manager
        .delete_account(token_id)
        .await
        .map(|()| Value::Null)
        .map_err(|e| e.to_string());
    reply(result)
}

async fn refresh_token(
    State(state): State<CastorState>,
    Path((variant, token_id)): Path<(String, String)>,
) -> Response {
    let kind = match parse_variant(&variant) {
        Ok(kind) => kind,
        Err(resp) => return resp,
    };
    let result = state
        .channel(kind)
        .manager
        .refresh_account(token_id)
        .await
        .map(|()| Value::Null)
        .map_err(|e| e.to_string());
    reply(result)
}

async fn fetch_project_id(
    State(state): State<CastorState>,
    Path((variant, token_id)): Path<(String, String)>,
) -> Response {
    let kind = match parse_variant(&variant) {
        Ok(kind) => kind,
        Err(resp) => return resp,
    };
    let result = state
        .channel(kind)
        .manager
        .fetch_project_id(token_id)
        .await
        .map(|project_id| json!({"projectId": project_id}))
        .map_err(|e| e.to_string());
    reply(result)
}

async fn export_tokens(
    State(state): State<CastorState>,
    Path(variant): Path<String>,
) -> Response {
    let kind = match parse_variant(&variant) {
        Ok(kind) => kind,
        Err(resp) => return resp,
    };
    let result = state
        .channel(kind)
        .manager
        .export_accounts()
        .await
        .map(|accounts| json!(accounts))
        .map_err(|e| e.to_string());
    reply(result)
}

async fn import_tokens(
    State(state): State<CastorState>,
    Path(variant): Path<String>,
    Json(accounts): Json<Vec<Account>>,
) -> Response {
    let kind = match parse_variant(&variant) {
        Ok(kind) => kind,
        Err(resp) => return resp,
    };
    let result = state
        .channel(kind)
        .manager
        .import_accounts(accounts)
        .await
        .map(|imported| json!({"imported": imported}))
        .map_err(|e| e.to_string());
    reply(result)
}

#[derive(Debug, Deserialize)]
struct RotationBody {
    strategy: RotationStrategyName,
    #[serde(default = "default_request_count")]
    request_count: u32,
}

fn default_request_count() -> u32 {
    10
}

/// Rotation config hot-reload; applies to both pools and clears request
/// counters only.
async fn update_rotation(
    State(state): State<CastorState>,
    Json(body): Json<RotationBody>,
) -> Response {
    let strategy = RotationStrategy::from_config(body.strategy, body.request_count);
    for kind in [VariantKind::Antigravity, VariantKind::GeminiCli] {
        state.channel(kind).manager.update_rotation(strategy);
    }
    reply(Ok(json!({"strategy": body.strategy, "request_count": body.request_count})))
}
