use clap::Parser;
use fleet_core::{AgentConfig, AgentMetrics, AgentRecord, FaultType, TelemetryPayload};
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const BASE_LATENCY_MS: f64 = 100.0;
const LATENCY_FAULT_PENALTY_MS: f64 = 2_000.0;
const REQUEST_TIMEOUT_SECS: u64 = 5;

#[derive(Parser, Debug)]
#[command(name = "fleet-sidecar")]
struct Args {
    #[arg(long, default_value = "")]
    agent_id: String,
    #[arg(long, default_value = "")]
    service_name: String,
    #[arg(long, default_value = "")]
    hub_url: String,
    #[arg(long)]
    heartbeat_interval: Option<u64>,
    #[arg(long, default_value = "us-central1")]
    region: String,
    #[arg(long, default_value = "gcr.io/demo/agent:v1")]
    image: String,
    #[arg(long, default_value = "1.0.0")]
    version: String,
}

#[derive(Clone, Debug)]
struct Config {
    agent_id: String,
    service_name: String,
    hub_url: String,
    heartbeat_interval: Duration,
    agent_config: AgentConfig,
}

#[tokio::main]
async fn main() {
    let config = load_config();
    init_logging();

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
    {
        Ok(value) => value,
        Err(err) => {
            warn!(event = "client_build_failed", error = %err);
            return;
        }
    };

    info!(
        event = "sidecar_start",
        agent_id = %config.agent_id,
        hub_url = %config.hub_url
    );

    let mut jitter = Jitter::new(u64::from(std::process::id()));
    let mut ticker = tokio::time::interval(config.heartbeat_interval);
    let mut active_faults: Vec<FaultType> = Vec::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                active_faults = poll_active_faults(&client, &config)
                    .await
                    .unwrap_or(active_faults);
                push_telemetry(&client, &config, &active_faults, &mut jitter).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!(event = "sidecar_shutdown", agent_id = %config.agent_id);
                return;
            }
        }
    }
}

/// Learns the faults currently injected against this agent so the next
/// synthesized sample reflects them. Failures keep the previous fault view.
async fn poll_active_faults(client: &reqwest::Client, config: &Config) -> Option<Vec<FaultType>> {
    let url = format!("{}/api/v1/agents/{}", config.hub_url, config.agent_id);
    let response = match client.get(&url).send().await {
        Ok(value) => value,
        Err(err) => {
            debug!(event = "fault_poll_failed", error = %err);
            return None;
        }
    };
    if !response.status().is_success() {
        // 404 until the first telemetry push registers the agent.
        debug!(event = "fault_poll_miss", status = %response.status());
        return None;
    }
    match response.json::<AgentRecord>().await {
        Ok(record) => {
            if !record.active_faults.is_empty() {
                info!(
                    event = "faults_detected",
                    agent_id = %config.agent_id,
                    faults = ?record.active_faults
                );
            }
            Some(record.active_faults)
        }
        Err(err) => {
            debug!(event = "fault_poll_failed", error = %err);
            None
        }
    }
}

async fn push_telemetry(
    client: &reqwest::Client,
    config: &Config,
    active_faults: &[FaultType],
    jitter: &mut Jitter,
) {
    let payload = TelemetryPayload {
        agent_id: config.agent_id.clone(),
        service_name: config.service_name.clone(),
        metrics: synthesize_metrics(active_faults, jitter),
        config: Some(config.agent_config.clone()),
    };
    let url = format!("{}/api/v1/telemetry", config.hub_url);
    match client.post(&url).json(&payload).send().await {
        Ok(response) if response.status().is_success() => {
            debug!(event = "telemetry_pushed", agent_id = %config.agent_id);
        }
        Ok(response) => {
            warn!(event = "telemetry_rejected", status = %response.status());
        }
        Err(err) => {
            warn!(event = "telemetry_push_failed", error = %err);
        }
    }
}

/// Produces one telemetry sample, degraded according to the faults the hub
/// currently holds against this agent.
fn synthesize_metrics(active_faults: &[FaultType], jitter: &mut Jitter) -> AgentMetrics {
    let mut latency_ms = BASE_LATENCY_MS + jitter.range(-20.0, 20.0);
    if active_faults.contains(&FaultType::Latency) {
        latency_ms += LATENCY_FAULT_PENALTY_MS;
    }
    let error_rate = if active_faults.contains(&FaultType::Error) {
        1.0
    } else {
        0.0
    };
    AgentMetrics {
        latency_ms,
        error_rate,
        cpu_usage: jitter.range(0.1, 0.4),
        memory_usage: jitter.range(0.2, 0.5),
    }
}

/// Cheap xorshift source for metric wobble. Simulated noise does not need
/// cryptographic quality, only variation between samples.
struct Jitter {
    state: u64,
}

impl Jitter {
    fn new(seed: u64) -> Self {
        Self {
            state: seed | 0x9e37_79b9_7f4a_7c15,
        }
    }

    fn next_unit(&mut self) -> f64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        (x >> 11) as f64 / (1u64 << 53) as f64
    }

    fn range(&mut self, low: f64, high: f64) -> f64 {
        low + (high - low) * self.next_unit()
    }
}

fn load_config() -> Config {
    let args = Args::parse();
    let agent_id = resolve(&args.agent_id, "FLEET_AGENT_ID", "agent-default-001");
    let service_name = resolve(&args.service_name, "FLEET_SERVICE_NAME", "demo-agent-service");
    let hub_url = resolve(&args.hub_url, "FLEET_HUB_URL", "http://127.0.0.1:8000");
    let heartbeat_interval =
        resolve_seconds(args.heartbeat_interval, "FLEET_HEARTBEAT_INTERVAL", 5).max(1);
    Config {
        agent_id,
        service_name,
        hub_url: hub_url.trim_end_matches('/').to_string(),
        heartbeat_interval: Duration::from_secs(heartbeat_interval),
        agent_config: AgentConfig {
            region: args.region,
            image: args.image,
            version: args.version,
        },
    }
}

fn resolve_seconds(flag: Option<u64>, env_key: &str, default: u64) -> u64 {
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

fn resolve(flag: &str, env_key: &str, default: &str) -> String {
    if !flag.trim().is_empty() {
        return flag.to_string();
    }
    if let Ok(value) = std::env::var(env_key) {
        if !value.trim().is_empty() {
            return value;
        }
    }
    default.to_string()
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_sample_stays_within_healthy_thresholds() {
        let mut jitter = Jitter::new(7);
        let metrics = synthesize_metrics(&[], &mut jitter);
        assert!(metrics.latency_ms >= 80.0 && metrics.latency_ms <= 120.0);
        assert_eq!(metrics.error_rate, 0.0);
        assert!(metrics.validate().is_ok());
    }

    #[test]
    fn latency_fault_pushes_latency_past_the_degraded_threshold() {
        let mut jitter = Jitter::new(7);
        let metrics = synthesize_metrics(&[FaultType::Latency], &mut jitter);
        assert!(metrics.latency_ms > 1_000.0);
        assert_eq!(metrics.error_rate, 0.0);
    }

    #[test]
    fn error_fault_saturates_the_error_rate() {
        let mut jitter = Jitter::new(7);
        let metrics = synthesize_metrics(&[FaultType::Error], &mut jitter);
        assert_eq!(metrics.error_rate, 1.0);
    }

    #[test]
    fn heartbeat_resolution_prefers_flag_then_env_then_default() {
        assert_eq!(resolve_seconds(Some(10), "FLEET_SIDECAR_TEST_UNSET", 5), 10);
        assert_eq!(resolve_seconds(None, "FLEET_SIDECAR_TEST_UNSET", 5), 5);

        std::env::set_var("FLEET_SIDECAR_TEST_HEARTBEAT", "9");
        assert_eq!(resolve_seconds(None, "FLEET_SIDECAR_TEST_HEARTBEAT", 5), 9);
        std::env::remove_var("FLEET_SIDECAR_TEST_HEARTBEAT");
    }

    #[test]
    fn jitter_stays_inside_the_requested_range() {
        let mut jitter = Jitter::new(42);
        for _ in 0..1_000 {
            let value = jitter.range(0.1, 0.4);
            assert!((0.1..=0.4).contains(&value));
        }
    }
}
