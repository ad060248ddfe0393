use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown agent: {agent_id}")]
    NotFound { agent_id: String },
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },
}

impl RegistryError {
    pub fn not_found(agent_id: &str) -> Self {
        Self::NotFound {
            agent_id: agent_id.to_string(),
        }
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Recovering,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Healthy => "HEALTHY",
            AgentStatus::Degraded => "DEGRADED",
            AgentStatus::Unhealthy => "UNHEALTHY",
            AgentStatus::Recovering => "RECOVERING",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaultType {
    Latency,
    Error,
}

impl FaultType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultType::Latency => "LATENCY",
            FaultType::Error => "ERROR",
        }
    }
}

impl fmt::Display for FaultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FaultType {
    type Err = RegistryError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_uppercase().as_str() {
            "LATENCY" => Ok(FaultType::Latency),
            "ERROR" => Ok(FaultType::Error),
            other => Err(RegistryError::invalid_argument(format!(
                "unknown fault type: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentMetrics {
    pub latency_ms: f64,
    pub error_rate: f64,
    #[serde(default)]
    pub cpu_usage: f64,
    #[serde(default)]
    pub memory_usage: f64,
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self {
            latency_ms: 0.0,
            error_rate: 0.0,
            cpu_usage: 0.0,
            memory_usage: 0.0,
        }
    }
}

impl AgentMetrics {
    /// Range checks for ingested samples. The registry never stores a sample
    /// that fails these, so the evaluator can assume well-formed inputs.
    pub fn validate(&self) -> Result<(), RegistryError> {
        if !self.latency_ms.is_finite() || self.latency_ms < 0.0 {
            return Err(RegistryError::invalid_argument(format!(
                "latency_ms must be a non-negative number, got {}",
                self.latency_ms
            )));
        }
        for (name, value) in [
            ("error_rate", self.error_rate),
            ("cpu_usage", self.cpu_usage),
            ("memory_usage", self.memory_usage),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(RegistryError::invalid_argument(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentConfig {
    pub region: String,
    pub image: String,
    pub version: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            region: "unknown".to_string(),
            image: "unknown".to_string(),
            version: "0.0.0".to_string(),
        }
    }
}

/// One consistent view of an agent, as produced by a single registry
/// evaluation and as serialized on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: String,
    pub service_name: String,
    pub status: AgentStatus,
    pub last_heartbeat: DateTime<Utc>,
    pub metrics: AgentMetrics,
    pub active_faults: Vec<FaultType>,
    pub config: AgentConfig,
}

/// Telemetry sample pushed by a sidecar. First sight of an `agent_id`
/// registers the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryPayload {
    pub agent_id: String,
    pub service_name: String,
    pub metrics: AgentMetrics,
    #[serde(default)]
    pub config: Option<AgentConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultRequest {
    pub fault_type: String,
    #[serde(default)]
    pub duration_seconds: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_as_screaming_case() {
        let json = serde_json::to_string(&AgentStatus::Recovering).expect("serialize");
        assert_eq!(json, "\"RECOVERING\"");
        let parsed: AgentStatus = serde_json::from_str("\"DEGRADED\"").expect("deserialize");
        assert_eq!(parsed, AgentStatus::Degraded);
    }

    #[test]
    fn fault_type_parses_case_insensitively() {
        assert_eq!(
            "latency".parse::<FaultType>().expect("parse"),
            FaultType::Latency
        );
        assert_eq!(
            " ERROR ".parse::<FaultType>().expect("parse"),
            FaultType::Error
        );
        assert!(matches!(
            "CRASH".parse::<FaultType>(),
            Err(RegistryError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn metrics_validation_rejects_out_of_range_values() {
        let mut metrics = AgentMetrics {
            latency_ms: 50.0,
            error_rate: 0.0,
            cpu_usage: 0.2,
            memory_usage: 0.3,
        };
        assert!(metrics.validate().is_ok());

        metrics.error_rate = 1.5;
        assert!(metrics.validate().is_err());

        metrics.error_rate = 0.0;
        metrics.latency_ms = -1.0;
        assert!(metrics.validate().is_err());

        metrics.latency_ms = f64::NAN;
        assert!(metrics.validate().is_err());
    }

    #[test]
    fn telemetry_payload_tolerates_missing_optional_fields() {
        let raw = r#"{
            "agent_id": "agent-1",
            "service_name": "demo",
            "metrics": {"latency_ms": 80.0, "error_rate": 0.01}
        }"#;
        let payload: TelemetryPayload = serde_json::from_str(raw).expect("deserialize");
        assert!(payload.config.is_none());
        assert_eq!(payload.metrics.cpu_usage, 0.0);
    }
}
