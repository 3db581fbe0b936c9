use crate::accounts::VariantKind;
use crate::server::router::CastorState;
use axum::{Json, extract::State};
use serde_json::{Value, json};

pub async fn health(State(state): State<CastorState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime_secs": state.uptime().as_secs(),
    }))
}

/// Pool and counter snapshot. The per-token request counters here are the
/// only accounting the proxy keeps.
pub async fn memory(State(state): State<CastorState>) -> Json<Value> {
    let mut pools = serde_json::Map::new();
    for kind in [VariantKind::Antigravity, VariantKind::GeminiCli] {
        let channel = state.channel(kind);
        let accounts = channel.manager.list_accounts().await.unwrap_or_default();
        let active = accounts.iter().filter(|a| a.enable).count();
        let requests: u64 = accounts.iter().map(|a| u64::from(a.request_count)).sum();
        pools.insert(
            channel.variant.name.to_string(),
            json!({
                "accounts": accounts.len(),
                "active": active,
                "requests": requests,
            }),
        );
    }

    Json(json!({
        "uptime_secs": state.uptime().as_secs(),
        "pools": pools,
    }))
}
