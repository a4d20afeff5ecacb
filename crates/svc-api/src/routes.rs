use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use titan_storage::heartbeat::heartbeat_key;
use titan_storage::repos::{
    alerts, outcomes, settings as settings_repo, token_risk, trades, wallets,
};
use titan_storage::streams::{
    pending_count, STREAM_DECODED_TRADES, STREAM_RAW_EVENTS, STREAM_RISK_JOBS,
};
use titan_storage::RedisConn;

use crate::AppState;

pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({"detail": self.1}))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %err, "api query failed");
        ApiError(StatusCode::INTERNAL_SERVER_ERROR, "internal error".into())
    }
}

fn not_found(what: &str) -> ApiError {
    ApiError(StatusCode::NOT_FOUND, format!("{what} not found"))
}

type ApiResult = Result<Json<Value>, ApiError>;

#[derive(Deserialize)]
struct PageParams {
    chain: Option<String>,
    tier: Option<String>,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    50
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn list_alerts(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> ApiResult {
    let limit = params.limit.clamp(1, 500);
    let rows = alerts::list(&state.pool, params.chain.as_deref(), limit, params.offset.max(0))
        .await?;
    Ok(Json(json!({"alerts": rows, "limit": limit, "offset": params.offset})))
}

async fn get_alert(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult {
    let alert = alerts::get(&state.pool, id).await?.ok_or(not_found("alert"))?;
    Ok(Json(serde_json::to_value(alert).map_err(anyhow::Error::from)?))
}

async fn list_wallets(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> ApiResult {
    let limit = params.limit.clamp(1, 500);
    let rows =
        wallets::list_by_tier(&state.pool, params.tier.as_deref(), limit, params.offset.max(0))
            .await?;
    Ok(Json(json!({"wallets": rows, "limit": limit, "offset": params.offset})))
}

async fn get_wallet(
    State(state): State<AppState>,
    Path((chain, address)): Path<(String, String)>,
) -> ApiResult {
    let chain = chain.to_lowercase();
    let address = address.to_lowercase();
    let wallet = wallets::get(&state.pool, &chain, &address)
        .await?
        .ok_or(not_found("wallet"))?;
    let metric =
        titan_storage::repos::wallet_metrics::get(&state.pool, &chain, &address).await?;
    Ok(Json(json!({"wallet": wallet, "metric": metric})))
}

async fn get_token_risk(
    State(state): State<AppState>,
    Path((chain, address)): Path<(String, String)>,
) -> ApiResult {
    let risk = token_risk::get(&state.pool, &chain.to_lowercase(), &address.to_lowercase())
        .await?
        .ok_or(not_found("token risk"))?;
    Ok(Json(serde_json::to_value(risk).map_err(anyhow::Error::from)?))
}

async fn get_regime(State(state): State<AppState>) -> ApiResult {
    let stored = settings_repo::get(&state.pool, "regime").await?;
    let regime = stored
        .map(|row| row.value)
        .unwrap_or_else(|| json!({"regime": "neutral"}));
    Ok(Json(regime))
}

async fn heartbeat_age(redis: &mut RedisConn, worker: &str) -> Option<i64> {
    let raw = titan_storage::cache::get_string(redis, &heartbeat_key(worker))
        .await
        .ok()
        .flatten()?;
    let beat: i64 = raw.parse().ok()?;
    Some((Utc::now().timestamp() - beat).max(0))
}

async fn ops_health(State(state): State<AppState>) -> ApiResult {
    let mut redis = state.redis.clone();

    let mut heartbeats = serde_json::Map::new();
    for worker in [
        "listener", "decoder", "risk", "profiler", "alerts", "outcomes", "autopilot",
    ] {
        let age = heartbeat_age(&mut redis, worker).await;
        heartbeats.insert(worker.into(), json!({"age_seconds": age, "alive": age.is_some()}));
    }

    let mut pending = serde_json::Map::new();
    for (stream, group) in [
        (STREAM_RAW_EVENTS, titan_decode::worker::GROUP_NAME),
        (STREAM_DECODED_TRADES, titan_risk::worker::ENQUEUE_GROUP),
        (STREAM_RISK_JOBS, titan_risk::worker::SCORE_GROUP),
    ] {
        let count = pending_count(&mut redis, stream, group).await.ok();
        pending.insert(format!("{stream}:{group}"), json!(count));
    }

    let chains: Vec<&String> = state.settings.chain_config.keys().collect();
    Ok(Json(json!({
        "chains": chains,
        "heartbeats": Value::Object(heartbeats),
        "pending": Value::Object(pending),
    })))
}

async fn ops_metrics(State(state): State<AppState>) -> ApiResult {
    let alerts_by_type = alerts::counts_by_type(&state.pool).await?;
    let trap_rate = outcomes::trap_rate(&state.pool).await?;
    let net_by_horizon = outcomes::avg_net_return_by_horizon(&state.pool).await?;
    let top_wallets = wallets::top_by_merit(&state.pool, 10).await?;
    let top_pairs = trades::top_pairs_by_trade_count(&state.pool, 10).await?;

    Ok(Json(json!({
        "alerts_by_type": alerts_by_type,
        "trap_rate": trap_rate,
        "avg_net_return_by_horizon": net_by_horizon,
        "top_wallets_by_merit": top_wallets,
        "top_pairs_by_trade_count": top_pairs,
    })))
}

async fn get_setting(State(state): State<AppState>, Path(key): Path<String>) -> ApiResult {
    let row = settings_repo::get(&state.pool, &key)
        .await?
        .ok_or(not_found("setting"))?;
    Ok(Json(serde_json::to_value(row).map_err(anyhow::Error::from)?))
}

async fn put_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(value): Json<Value>,
) -> ApiResult {
    settings_repo::put(&state.pool, &key, &value).await?;
    Ok(Json(json!({"key": key, "value": value})))
}

/// Shows what a tuning change would store without persisting it.
async fn preview_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(proposed): Json<Value>,
) -> ApiResult {
    let current = settings_repo::get(&state.pool, &key).await?.map(|row| row.value);
    Ok(Json(json!({
        "key": key,
        "current": current,
        "proposed": proposed,
    })))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/alerts", get(list_alerts))
        .route("/alerts/:id", get(get_alert))
        .route("/wallets", get(list_wallets))
        .route("/wallets/:chain/:address", get(get_wallet))
        .route("/token-risk/:chain/:address", get(get_token_risk))
        .route("/regime", get(get_regime))
        .route("/ops/health", get(ops_health))
        .route("/ops/metrics", get(ops_metrics))
        .route("/settings/:key", get(get_setting).put(put_setting))
        .route("/settings/:key/preview", put(preview_setting))
        .with_state(state)
}
