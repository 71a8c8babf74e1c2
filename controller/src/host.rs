use std::{
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::{net::TcpListener, sync::Mutex, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, warn};

use irrigation_common::{
    layout::EEPROM_SIZE, ControlError, ControllerConfig, DstRules, Irrigator, LocalTime,
    LocalZone, RuntimeConfig, TimeSync, WaterCycle, ZoneId,
};

use crate::{
    actuator::LoggingActuator,
    eeprom::FileEeprom,
    ntp::{NtpClient, SyncError},
    zone::build_zone,
};

type Core = Irrigator<FileEeprom, LoggingActuator>;

#[derive(Clone)]
struct AppState {
    core: Arc<Mutex<Core>>,
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
    eeprom_path: Arc<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct ScheduleView {
    #[serde(rename = "nextEventStart")]
    next_event_start: Option<LocalTime>,
    events: Vec<irrigation_common::Event>,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    if let Ok(server) = std::env::var("NTP_SERVER") {
        runtime.ntp_server = server;
    }
    runtime.sanitize();
    let controller = runtime.controller.clone();

    let zone = build_zone(&runtime.timezone).unwrap_or_else(|err| {
        warn!("falling back to US Eastern time rules: {err:#}");
        Box::new(DstRules::us_eastern()) as Box<dyn LocalZone>
    });
    let mut time = TimeSync::new(
        zone,
        Duration::from_secs(controller.time_sync_interval_secs),
        Duration::from_secs(controller.sync_retry_secs),
    );

    let ntp = NtpClient::bind(runtime.ntp_server.clone(), Duration::from_millis(controller.ntp_timeout_ms))
        .await
        .context("failed to bind ntp client socket")?;
    info!(server = ntp.server(), "ntp client ready");

    // Reset time is only meaningful once the clock is known.
    let result = ntp.fetch_unix_secs().await;
    apply_sync(&mut time, result, Instant::now());

    let eeprom = FileEeprom::open(store.eeprom_path.as_ref(), EEPROM_SIZE)?;
    info!(path = %eeprom.path().display(), "eeprom image opened");
    let actuator = LoggingActuator::new(Duration::from_millis(controller.settle_ms));
    let core = tokio::task::block_in_place(|| {
        Irrigator::boot(eeprom, actuator, time, &runtime.zone_names)
    })
    .context("failed to boot controller core")?;

    let app_state = AppState {
        core: Arc::new(Mutex::new(core)),
    };

    let control = spawn_control_loop(app_state.clone(), ntp, controller);

    let app = router(app_state.clone());

    let port = std::env::var("CONTROLLER_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for shutdown signal: {err}");
                std::future::pending::<()>().await;
            }
            info!("shutdown requested");
        })
        .await?;

    release_valves(&app_state, control).await;
    Ok(())
}

/// Stops the control loop, then leaves every valve closed. The loop must be
/// gone first or its next tick could reopen a scheduled zone.
async fn release_valves(app_state: &AppState, control: JoinHandle<()>) {
    control.abort();
    if let Err(err) = control.await {
        if !err.is_cancelled() {
            warn!("control loop ended abnormally: {err}");
        }
    }

    let mut core = app_state.core.lock().await;
    tokio::task::block_in_place(|| core.manual_all_off(Instant::now()));
    info!("all zones released");
}

fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/cycle", get(handle_get_cycle).put(handle_put_cycle))
        .route("/api/schedule", get(handle_get_schedule))
        .route("/api/log", get(handle_get_log).delete(handle_clear_log))
        .route("/api/zones/off", post(handle_all_off))
        .route("/api/zones/{id}/on", post(handle_zone_on))
        .route("/api/zones/{id}/off", post(handle_zone_off))
        .with_state(app_state)
}

fn spawn_control_loop(
    app_state: AppState,
    ntp: NtpClient,
    controller: ControllerConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let deadline = Duration::from_millis(controller.liveness_deadline_ms);
        let mut interval = tokio::time::interval(Duration::from_millis(controller.tick_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let started = Instant::now();

            let sync_due = app_state.core.lock().await.time().needs_sync(started);
            if sync_due {
                // The exchange runs without the core lock held.
                let result = ntp.fetch_unix_secs().await;
                let mut core = app_state.core.lock().await;
                apply_sync(core.time_mut(), result, Instant::now());
            }

            {
                let mut core = app_state.core.lock().await;
                let result = tokio::task::block_in_place(|| core.tick(Instant::now()));
                if let Err(err) = result {
                    warn!("control tick failed: {err}");
                }
                debug!(energized = ?core.actuator().energized(), "control tick");
            }

            let elapsed = started.elapsed();
            if elapsed > deadline {
                warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    deadline_ms = controller.liveness_deadline_ms,
                    "control tick overran liveness deadline"
                );
            }
        }
    })
}

fn apply_sync(time: &mut TimeSync, result: Result<u32, SyncError>, at: Instant) {
    match result {
        Ok(unix_secs) => time.record_sync(unix_secs as i64, at),
        Err(err) => {
            warn!("ntp sync failed: {err}");
            time.record_failure(at);
        }
    }
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let core = state.core.lock().await;
    Json(core.status(Instant::now()))
}

async fn handle_get_cycle(State(state): State<AppState>) -> impl IntoResponse {
    let cycle = state.core.lock().await.cycle().clone();
    Json(cycle)
}

async fn handle_put_cycle(
    State(state): State<AppState>,
    Json(cycle): Json<WaterCycle>,
) -> impl IntoResponse {
    let result = state.core.lock().await.update_cycle(cycle, Instant::now());
    if let Err(err) = result {
        warn!("cycle update rejected: {err}");
        return control_error_response(&err);
    }

    handle_get_cycle(State(state)).await.into_response()
}

async fn handle_get_schedule(State(state): State<AppState>) -> impl IntoResponse {
    let core = state.core.lock().await;
    let events = core.events().to_vec();
    Json(ScheduleView {
        next_event_start: events.first().map(|event| event.start),
        events,
    })
}

async fn handle_get_log(State(state): State<AppState>) -> impl IntoResponse {
    let entries = state.core.lock().await.log_entries();
    match entries {
        Ok(entries) => Json(entries).into_response(),
        Err(err) => {
            warn!("failed to read activity log: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read activity log")
        }
    }
}

async fn handle_clear_log(State(state): State<AppState>) -> impl IntoResponse {
    let result = state.core.lock().await.clear_log();
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            warn!("failed to clear activity log: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to clear activity log")
        }
    }
}

async fn handle_zone_on(
    State(state): State<AppState>,
    Path(id): Path<u8>,
) -> impl IntoResponse {
    let result = {
        let mut core = state.core.lock().await;
        tokio::task::block_in_place(|| core.manual_on(ZoneId(id), Instant::now()))
    };
    if let Err(err) = result {
        return control_error_response(&err);
    }

    handle_get_status(State(state)).await.into_response()
}

async fn handle_zone_off(
    State(state): State<AppState>,
    Path(id): Path<u8>,
) -> impl IntoResponse {
    let result = {
        let mut core = state.core.lock().await;
        tokio::task::block_in_place(|| core.manual_off(ZoneId(id), Instant::now()))
    };
    if let Err(err) = result {
        return control_error_response(&err);
    }

    handle_get_status(State(state)).await.into_response()
}

async fn handle_all_off(State(state): State<AppState>) -> impl IntoResponse {
    {
        let mut core = state.core.lock().await;
        tokio::task::block_in_place(|| core.manual_all_off(Instant::now()));
    }

    handle_get_status(State(state)).await.into_response()
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("IRRIGATION_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.irrigation"));

        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            eeprom_path: Arc::new(data_dir.join("eeprom.bin")),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }
}

fn control_error_response(err: &ControlError) -> axum::response::Response {
    let status = match err {
        ControlError::UnknownZone(_) => StatusCode::NOT_FOUND,
        ControlError::Cycle(_) => StatusCode::BAD_REQUEST,
        ControlError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, &err.to_string())
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
