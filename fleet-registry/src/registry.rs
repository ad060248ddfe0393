use crate::faults::FaultSet;
use crate::health::{self, HealthThresholds};
use chrono::{DateTime, Duration, Utc};
use fleet_core::{
    AgentConfig, AgentMetrics, AgentRecord, AgentStatus, FaultType, RegistryError,
    TelemetryPayload,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub thresholds: HealthThresholds,
    /// How long RECOVERING resists automatic downgrade.
    pub recovery_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            thresholds: HealthThresholds::default(),
            recovery_timeout: Duration::seconds(30),
        }
    }
}

#[derive(Debug)]
struct AgentEntry {
    service_name: String,
    status: AgentStatus,
    last_heartbeat: DateTime<Utc>,
    metrics: AgentMetrics,
    faults: FaultSet,
    config: AgentConfig,
    recovering_until: Option<DateTime<Utc>>,
}

impl AgentEntry {
    fn new(
        service_name: String,
        metrics: AgentMetrics,
        config: AgentConfig,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            service_name,
            status: AgentStatus::Healthy,
            last_heartbeat: now,
            metrics,
            faults: FaultSet::default(),
            config,
            recovering_until: None,
        }
    }

    /// Re-runs the evaluator against the current metrics and fault set.
    /// `fresh_sample` marks a telemetry update; only a fresh healthy sample
    /// may close the RECOVERING window early, reads and fault changes cannot.
    fn evaluate(&mut self, agent_id: &str, thresholds: &HealthThresholds, now: DateTime<Utc>, fresh_sample: bool) {
        let expired = self.faults.prune(now);
        if expired > 0 {
            debug!(event = "faults_expired", agent_id = agent_id, count = expired);
        }
        let kinds = self.faults.kinds();
        let raw = health::evaluate(&self.metrics, &kinds, thresholds);
        self.status = match self.recovering_until {
            Some(until) if now >= until => {
                self.recovering_until = None;
                raw
            }
            Some(_) if fresh_sample && kinds.is_empty() && raw == AgentStatus::Healthy => {
                self.recovering_until = None;
                AgentStatus::Healthy
            }
            Some(_) => AgentStatus::Recovering,
            None => raw,
        };
    }

    fn record(&self, agent_id: &str) -> AgentRecord {
        AgentRecord {
            agent_id: agent_id.to_string(),
            service_name: self.service_name.clone(),
            status: self.status,
            last_heartbeat: self.last_heartbeat,
            metrics: self.metrics.clone(),
            active_faults: self.faults.kinds().into_iter().collect(),
            config: self.config.clone(),
        }
    }
}

type SharedEntry = Arc<Mutex<AgentEntry>>;

/// Authoritative owner of all agent and fault records. Operations on one
/// agent serialize on that agent's entry lock; the outer map lock is held
/// only long enough to resolve the entry, so distinct agents proceed in
/// parallel and no I/O ever happens under either lock.
pub struct Registry {
    thresholds: HealthThresholds,
    recovery_timeout: Duration,
    agents: RwLock<BTreeMap<String, SharedEntry>>,
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            thresholds: config.thresholds,
            recovery_timeout: config.recovery_timeout,
            agents: RwLock::new(BTreeMap::new()),
        }
    }

    fn entry(&self, agent_id: &str) -> Result<SharedEntry, RegistryError> {
        self.agents
            .read()
            .expect("agent map lock poisoned")
            .get(agent_id)
            .cloned()
            .ok_or_else(|| RegistryError::not_found(agent_id))
    }

    /// Upserts an agent from a sidecar telemetry push. Unknown agents are
    /// registered on first sight; `config` is immutable after registration.
    pub fn ingest_telemetry(
        &self,
        payload: &TelemetryPayload,
        now: DateTime<Utc>,
    ) -> Result<AgentRecord, RegistryError> {
        if payload.agent_id.trim().is_empty() {
            return Err(RegistryError::invalid_argument("agent_id is required"));
        }
        payload.metrics.validate()?;

        let entry = match self.entry(&payload.agent_id) {
            Ok(entry) => entry,
            Err(_) => {
                let mut agents = self.agents.write().expect("agent map lock poisoned");
                agents
                    .entry(payload.agent_id.clone())
                    .or_insert_with(|| {
                        Arc::new(Mutex::new(AgentEntry::new(
                            payload.service_name.clone(),
                            payload.metrics.clone(),
                            payload.config.clone().unwrap_or_default(),
                            now,
                        )))
                    })
                    .clone()
            }
        };

        let mut entry = entry.lock().expect("agent entry lock poisoned");
        entry.service_name = payload.service_name.clone();
        entry.metrics = payload.metrics.clone();
        entry.last_heartbeat = now;
        entry.evaluate(&payload.agent_id, &self.thresholds, now, true);
        Ok(entry.record(&payload.agent_id))
    }

    /// Applies a telemetry sample to a known agent and returns the freshly
    /// evaluated status.
    pub fn update_telemetry(
        &self,
        agent_id: &str,
        metrics: AgentMetrics,
        heartbeat: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<AgentStatus, RegistryError> {
        metrics.validate()?;
        let entry = self.entry(agent_id)?;
        let mut entry = entry.lock().expect("agent entry lock poisoned");
        entry.metrics = metrics;
        entry.last_heartbeat = heartbeat;
        entry.evaluate(agent_id, &self.thresholds, now, true);
        Ok(entry.status)
    }

    /// Consistent view of the whole fleet, ordered by agent id. Each record
    /// reflects one evaluation; expired faults are pruned before it is built.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Vec<AgentRecord> {
        let entries: Vec<(String, SharedEntry)> = self
            .agents
            .read()
            .expect("agent map lock poisoned")
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect();

        entries
            .into_iter()
            .map(|(agent_id, entry)| {
                let mut entry = entry.lock().expect("agent entry lock poisoned");
                entry.evaluate(&agent_id, &self.thresholds, now, false);
                entry.record(&agent_id)
            })
            .collect()
    }

    pub fn get(&self, agent_id: &str, now: DateTime<Utc>) -> Result<AgentRecord, RegistryError> {
        let entry = self.entry(agent_id)?;
        let mut entry = entry.lock().expect("agent entry lock poisoned");
        entry.evaluate(agent_id, &self.thresholds, now, false);
        Ok(entry.record(agent_id))
    }

    /// Inserts or refreshes a fault injection and re-evaluates the agent.
    /// The effect is visible to every subsequent read, with no propagation
    /// delay.
    pub fn inject_fault(
        &self,
        agent_id: &str,
        fault_type: FaultType,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<AgentRecord, RegistryError> {
        if duration <= Duration::zero() {
            return Err(RegistryError::invalid_argument(
                "fault duration must be positive",
            ));
        }
        let expires_at = now.checked_add_signed(duration).ok_or_else(|| {
            RegistryError::invalid_argument("fault duration overflows the expiry timestamp")
        })?;
        let entry = self.entry(agent_id)?;
        let mut entry = entry.lock().expect("agent entry lock poisoned");
        entry.faults.inject(fault_type, expires_at);
        entry.evaluate(agent_id, &self.thresholds, now, false);
        Ok(entry.record(agent_id))
    }

    /// Clears all active faults, enters RECOVERING and opens the recovery
    /// window. Idempotent: recovering an already-clean agent succeeds and
    /// produces the same result.
    pub fn recover(
        &self,
        agent_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AgentRecord, RegistryError> {
        let entry = self.entry(agent_id)?;
        let mut entry = entry.lock().expect("agent entry lock poisoned");
        entry.faults.clear();
        entry.status = AgentStatus::Recovering;
        entry.recovering_until = Some(now + self.recovery_timeout);
        Ok(entry.record(agent_id))
    }
}
