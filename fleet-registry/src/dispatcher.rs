use crate::registry::Registry;
use chrono::{Duration, Utc};
use fleet_core::{AgentRecord, FaultRequest, FaultType, RegistryError, TelemetryPayload};
use std::sync::Arc;
use tracing::info;

/// Validating front door for the registry. Each call resolves `Utc::now()`
/// exactly once so a single operation sees a single consistent timestamp,
/// and every mutation returns the post-mutation record so callers never need
/// a follow-up read.
pub struct CommandDispatcher {
    registry: Arc<Registry>,
    default_fault_duration: Duration,
}

impl CommandDispatcher {
    pub fn new(registry: Arc<Registry>, default_fault_duration_s: i64) -> Self {
        Self {
            registry,
            default_fault_duration: Duration::seconds(default_fault_duration_s),
        }
    }

    pub fn ingest(&self, payload: &TelemetryPayload) -> Result<AgentRecord, RegistryError> {
        let record = self.registry.ingest_telemetry(payload, Utc::now())?;
        info!(
            event = "telemetry_ingested",
            agent_id = %record.agent_id,
            status = %record.status
        );
        Ok(record)
    }

    pub fn list(&self) -> Vec<AgentRecord> {
        self.registry.snapshot(Utc::now())
    }

    pub fn get(&self, agent_id: &str) -> Result<AgentRecord, RegistryError> {
        self.registry.get(agent_id, Utc::now())
    }

    pub fn inject_fault(
        &self,
        agent_id: &str,
        request: &FaultRequest,
    ) -> Result<AgentRecord, RegistryError> {
        let fault_type: FaultType = request.fault_type.parse()?;
        let seconds = match request.duration_seconds {
            Some(seconds) if seconds <= 0 => {
                return Err(RegistryError::invalid_argument(format!(
                    "duration_seconds must be positive, got {seconds}"
                )));
            }
            // try_seconds turns values past chrono's bound into a typed
            // rejection instead of a panic inside the handler task.
            Some(seconds) => Duration::try_seconds(seconds).ok_or_else(|| {
                RegistryError::invalid_argument(format!(
                    "duration_seconds out of range: {seconds}"
                ))
            })?,
            None => self.default_fault_duration,
        };
        let record = self
            .registry
            .inject_fault(agent_id, fault_type, seconds, Utc::now())?;
        info!(
            event = "fault_injected",
            agent_id = %record.agent_id,
            fault = %fault_type,
            duration_s = seconds.num_seconds(),
            status = %record.status
        );
        Ok(record)
    }

    pub fn recover(&self, agent_id: &str) -> Result<AgentRecord, RegistryError> {
        let record = self.registry.recover(agent_id, Utc::now())?;
        info!(
            event = "recover_issued",
            agent_id = %record.agent_id,
            status = %record.status
        );
        Ok(record)
    }
}
