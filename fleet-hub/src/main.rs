use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Duration;
use clap::Parser;
use fleet_core::{AgentRecord, FaultRequest, RegistryError, TelemetryPayload};
use fleet_registry::{CommandDispatcher, HealthThresholds, Registry, RegistryConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug)]
struct Config {
    addr: String,
    default_fault_duration_s: i64,
    recovery_timeout_s: i64,
}

#[derive(Parser, Debug)]
#[command(name = "fleet-hub")]
struct Args {
    #[arg(long, default_value = "")]
    addr: String,
    /// Fault duration used when a caller omits `duration_seconds`.
    #[arg(long)]
    default_fault_duration: Option<i64>,
    /// How long RECOVERING resists automatic downgrade.
    #[arg(long)]
    recovery_timeout: Option<i64>,
}

#[tokio::main]
async fn main() {
    let config = load_config();
    init_logging();

    let addr: SocketAddr = match config.addr.parse() {
        Ok(value) => value,
        Err(err) => {
            error!(event = "invalid_addr", error = %err, addr = %config.addr);
            return;
        }
    };

    let registry = Arc::new(Registry::new(RegistryConfig {
        thresholds: HealthThresholds::default(),
        recovery_timeout: Duration::seconds(config.recovery_timeout_s),
    }));
    let dispatcher = Arc::new(CommandDispatcher::new(
        registry,
        config.default_fault_duration_s,
    ));

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/v1/telemetry", post(ingest_telemetry))
        .route("/api/v1/agents", get(list_agents))
        .route("/api/v1/agents/:agent_id", get(get_agent))
        .route("/api/v1/agents/:agent_id/fault", post(inject_fault))
        .route("/api/v1/agents/:agent_id/recover", post(recover_agent))
        .with_state(dispatcher);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(value) => value,
        Err(err) => {
            error!(event = "hub_error", error = %err, addr = %config.addr);
            return;
        }
    };

    info!(event = "hub_start", addr = %config.addr);

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!(event = "hub_shutdown");
    };

    if let Err(err) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
        error!(event = "hub_error", error = %err);
    }
}

async fn ingest_telemetry(
    State(dispatcher): State<Arc<CommandDispatcher>>,
    Json(payload): Json<TelemetryPayload>,
) -> Result<Json<AgentRecord>, ApiError> {
    Ok(Json(dispatcher.ingest(&payload)?))
}

async fn list_agents(State(dispatcher): State<Arc<CommandDispatcher>>) -> Json<Vec<AgentRecord>> {
    Json(dispatcher.list())
}

async fn get_agent(
    State(dispatcher): State<Arc<CommandDispatcher>>,
    Path(agent_id): Path<String>,
) -> Result<Json<AgentRecord>, ApiError> {
    Ok(Json(dispatcher.get(&agent_id)?))
}

async fn inject_fault(
    State(dispatcher): State<Arc<CommandDispatcher>>,
    Path(agent_id): Path<String>,
    Json(request): Json<FaultRequest>,
) -> Result<Json<AgentRecord>, ApiError> {
    Ok(Json(dispatcher.inject_fault(&agent_id, &request)?))
}

async fn recover_agent(
    State(dispatcher): State<Arc<CommandDispatcher>>,
    Path(agent_id): Path<String>,
) -> Result<Json<AgentRecord>, ApiError> {
    Ok(Json(dispatcher.recover(&agent_id)?))
}

struct ApiError(RegistryError);

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RegistryError::NotFound { .. } => StatusCode::NOT_FOUND,
            RegistryError::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
        };
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

fn load_config() -> Config {
    let args = Args::parse();
    Config {
        addr: resolve_addr(&args.addr),
        default_fault_duration_s: resolve_seconds(
            args.default_fault_duration,
            "FLEET_DEFAULT_FAULT_DURATION",
            60,
        ),
        recovery_timeout_s: resolve_seconds(args.recovery_timeout, "FLEET_RECOVERY_TIMEOUT", 30),
    }
}

fn resolve_seconds(flag: Option<i64>, env_key: &str, default: i64) -> i64 {
    if let Some(value) = flag {
        return value;
    }
    if let Ok(value) = std::env::var(env_key) {
        if let Ok(parsed) = value.trim().parse() {
            return parsed;
        }
    }
    default
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn resolve_addr(addr_flag: &str) -> String {
    if !addr_flag.trim().is_empty() {
        return addr_flag.to_string();
    }
    if let Ok(value) = std::env::var("FLEET_HUB_ADDR") {
        if !value.trim().is_empty() {
            return value;
        }
    }
    "127.0.0.1:8000".to_string()
}
