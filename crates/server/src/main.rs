use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use controller::{
    Controller, ControllerError, CurveUpdate, NewCurveRequest, SyncReport, TickReport,
    WebhookNotifier,
};
use hue_gateway::{DeviceGateway, HueGateway, UnconfiguredGateway};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{
        Curve, CurveId, CurveKind, Group, GroupId, InsertSide, Light, LightId, LightUpdate,
        Settings, Status,
    },
    error::{ApiError, ErrorCode},
};
use storage::Storage;
use tracing::{error, info, warn};

mod config;
mod jobs;

use config::{load_settings, prepare_database_url};

#[derive(Clone)]
struct AppState {
    controller: Controller,
}

type HttpError = (StatusCode, Json<ApiError>);
type HttpResult<T> = Result<T, HttpError>;

#[derive(Debug, Deserialize)]
struct CurveListQuery {
    kind: Option<CurveKind>,
}

#[derive(Debug, Deserialize)]
struct CurveValueQuery {
    x: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CurveValue {
    curve_id: CurveId,
    value: f64,
}

#[derive(Debug, Deserialize)]
struct InsertPointRequest {
    side: InsertSide,
}

#[derive(Debug, Deserialize)]
struct UpdatePointRequest {
    x: i32,
    y: f64,
}

#[derive(Debug, Deserialize)]
struct ReconcileRequest {
    #[serde(default)]
    force_disable: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_settings()?;
    tracing_subscriber::fmt()
        .with_env_filter(settings.log_filter.as_str())
        .init();

    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let timeout = Duration::from_secs(settings.http_timeout_seconds);
    let gateway: Arc<dyn DeviceGateway> = match settings.bridge() {
        Some((bridge_url, username)) => {
            info!(%bridge_url, "hue bridge configured");
            Arc::new(HueGateway::new(bridge_url, username, timeout)?)
        }
        None => {
            warn!("no hue bridge configured; run `tools pair` and set HUE_BRIDGE_URL / HUE_USERNAME");
            Arc::new(UnconfiguredGateway)
        }
    };

    let mut controller = Controller::new(storage, gateway);
    if !settings.webhooks.is_empty() {
        info!(webhooks = settings.webhooks.len(), "webhook notifications enabled");
        controller = controller.with_notifier(Arc::new(WebhookNotifier::new(
            settings.webhooks.clone(),
            timeout,
        )?));
    }

    let _reconcile = jobs::spawn_reconcile_loop(
        controller.clone(),
        Duration::from_secs(settings.tick_seconds),
    );
    let _daily = jobs::spawn_daily_reset(controller.clone(), settings.daily_reset_hour);

    let app = build_router(Arc::new(AppState { controller }));
    let addr: SocketAddr = settings.bind_addr.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/curves", get(list_curves).post(create_curve))
        .route(
            "/curves/:curve_id",
            get(get_curve).put(update_curve).delete(delete_curve),
        )
        .route("/curves/:curve_id/default", post(set_default_curve))
        .route("/curves/:curve_id/value", get(curve_value))
        .route(
            "/curves/:curve_id/points/:index",
            post(insert_point).put(update_point).delete(delete_point),
        )
        .route("/lights", get(list_lights))
        .route("/lights/:light_id", get(get_light).put(update_light))
        .route("/groups", get(list_groups))
        .route("/groups/:group_id", get(get_group).put(update_group))
        .route("/status", get(get_status).put(update_status))
        .route("/settings", get(get_settings).put(update_settings))
        .route("/sync", post(sync_lights))
        .route("/reconcile", post(run_reconcile))
        .with_state(state)
}

fn http_error(err: ControllerError) -> HttpError {
    let body = ApiError::from(err);
    let status =
        StatusCode::from_u16(body.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body))
}

/// Pushes an edit out to the lights right away. The edit itself has already
/// been stored, so a failing pass is only logged.
async fn apply_edit(state: &AppState) {
    if let Err(error) = state.controller.reconcile(true).await {
        warn!(%error, "reconcile after edit failed");
    }
}

async fn healthz(State(state): State<Arc<AppState>>) -> HttpResult<&'static str> {
    state.controller.storage().health_check().await.map_err(|e| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new(ErrorCode::Internal, format!("{e:#}"))),
        )
    })?;
    Ok("ok")
}

async fn list_curves(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CurveListQuery>,
) -> HttpResult<Json<Vec<Curve>>> {
    let curves = state
        .controller
        .list_curves(query.kind)
        .await
        .map_err(http_error)?;
    Ok(Json(curves))
}

async fn create_curve(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewCurveRequest>,
) -> HttpResult<(StatusCode, Json<Curve>)> {
    let curve = state.controller.create_curve(req).await.map_err(http_error)?;
    Ok((StatusCode::CREATED, Json(curve)))
}

async fn get_curve(
    State(state): State<Arc<AppState>>,
    Path(curve_id): Path<i64>,
) -> HttpResult<Json<Curve>> {
    let curve = state
        .controller
        .curve(CurveId(curve_id))
        .await
        .map_err(http_error)?;
    Ok(Json(curve))
}

async fn update_curve(
    State(state): State<Arc<AppState>>,
    Path(curve_id): Path<i64>,
    Json(update): Json<CurveUpdate>,
) -> HttpResult<Json<Curve>> {
    let curve = state
        .controller
        .update_curve(CurveId(curve_id), update)
        .await
        .map_err(http_error)?;
    apply_edit(&state).await;
    Ok(Json(curve))
}

async fn delete_curve(
    State(state): State<Arc<AppState>>,
    Path(curve_id): Path<i64>,
) -> HttpResult<StatusCode> {
    state
        .controller
        .delete_curve(CurveId(curve_id))
        .await
        .map_err(http_error)?;
    apply_edit(&state).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_default_curve(
    State(state): State<Arc<AppState>>,
    Path(curve_id): Path<i64>,
) -> HttpResult<Json<Curve>> {
    let curve = state
        .controller
        .set_default_curve(CurveId(curve_id))
        .await
        .map_err(http_error)?;
    apply_edit(&state).await;
    Ok(Json(curve))
}

async fn curve_value(
    State(state): State<Arc<AppState>>,
    Path(curve_id): Path<i64>,
    Query(query): Query<CurveValueQuery>,
) -> HttpResult<Json<CurveValue>> {
    let curve_id = CurveId(curve_id);
    let value = state
        .controller
        .evaluate_curve(curve_id, query.x)
        .await
        .map_err(http_error)?;
    Ok(Json(CurveValue { curve_id, value }))
}

async fn insert_point(
    State(state): State<Arc<AppState>>,
    Path((curve_id, index)): Path<(i64, usize)>,
    Json(req): Json<InsertPointRequest>,
) -> HttpResult<Json<Curve>> {
    let curve = state
        .controller
        .insert_point(CurveId(curve_id), index, req.side)
        .await
        .map_err(http_error)?;
    apply_edit(&state).await;
    Ok(Json(curve))
}

async fn update_point(
    State(state): State<Arc<AppState>>,
    Path((curve_id, index)): Path<(i64, usize)>,
    Json(req): Json<UpdatePointRequest>,
) -> HttpResult<Json<Curve>> {
    let curve = state
        .controller
        .update_point(CurveId(curve_id), index, req.x, req.y)
        .await
        .map_err(http_error)?;
    apply_edit(&state).await;
    Ok(Json(curve))
}

async fn delete_point(
    State(state): State<Arc<AppState>>,
    Path((curve_id, index)): Path<(i64, usize)>,
) -> HttpResult<Json<Curve>> {
    let curve = state
        .controller
        .delete_point(CurveId(curve_id), index)
        .await
        .map_err(http_error)?;
    apply_edit(&state).await;
    Ok(Json(curve))
}

async fn list_lights(State(state): State<Arc<AppState>>) -> HttpResult<Json<Vec<Light>>> {
    let lights = state.controller.list_lights().await.map_err(http_error)?;
    Ok(Json(lights))
}

async fn get_light(
    State(state): State<Arc<AppState>>,
    Path(light_id): Path<i64>,
) -> HttpResult<Json<Light>> {
    let light = state
        .controller
        .light(LightId(light_id))
        .await
        .map_err(http_error)?;
    Ok(Json(light))
}

async fn update_light(
    State(state): State<Arc<AppState>>,
    Path(light_id): Path<i64>,
    Json(update): Json<LightUpdate>,
) -> HttpResult<Json<Light>> {
    let light = state
        .controller
        .update_light(LightId(light_id), update)
        .await
        .map_err(http_error)?;
    apply_edit(&state).await;
    Ok(Json(light))
}

async fn list_groups(State(state): State<Arc<AppState>>) -> HttpResult<Json<Vec<Group>>> {
    let groups = state.controller.list_groups().await.map_err(http_error)?;
    Ok(Json(groups))
}

async fn get_group(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<i64>,
) -> HttpResult<Json<Group>> {
    let group = state
        .controller
        .group(GroupId(group_id))
        .await
        .map_err(http_error)?;
    Ok(Json(group))
}

async fn update_group(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<i64>,
    Json(update): Json<LightUpdate>,
) -> HttpResult<Json<Group>> {
    let group = state
        .controller
        .update_group(GroupId(group_id), update)
        .await
        .map_err(http_error)?;
    apply_edit(&state).await;
    Ok(Json(group))
}

async fn get_status(State(state): State<Arc<AppState>>) -> HttpResult<Json<Status>> {
    let status = state.controller.status().await.map_err(http_error)?;
    Ok(Json(status))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Json(status): Json<Status>,
) -> HttpResult<Json<Status>> {
    let status = state
        .controller
        .set_status(status.enabled)
        .await
        .map_err(http_error)?;
    Ok(Json(status))
}

async fn get_settings(State(state): State<Arc<AppState>>) -> HttpResult<Json<Settings>> {
    let settings = state.controller.settings().await.map_err(http_error)?;
    Ok(Json(settings))
}

async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<Settings>,
) -> HttpResult<Json<Settings>> {
    let settings = state
        .controller
        .set_smart_off(settings.smart_off)
        .await
        .map_err(http_error)?;
    Ok(Json(settings))
}

async fn sync_lights(State(state): State<Arc<AppState>>) -> HttpResult<Json<SyncReport>> {
    let report = state.controller.sync_inventory().await.map_err(http_error)?;
    Ok(Json(report))
}

async fn run_reconcile(
    State(state): State<Arc<AppState>>,
    body: Option<Json<ReconcileRequest>>,
) -> HttpResult<Json<TickReport>> {
    let force_disable = body.is_some_and(|Json(req)| req.force_disable);
    let report = state
        .controller
        .reconcile(force_disable)
        .await
        .map_err(http_error)?;
    Ok(Json(report))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
