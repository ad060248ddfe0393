use fleet_core::{AgentRecord, FaultRequest};
use std::time::Duration;
use thiserror::Error;

const COMMAND_TIMEOUT_SECS: u64 = 5;

/// Failure classes on the observer side. Transient fetch failures are
/// swallowed by the poll loop and retried on the next tick; command failures
/// are surfaced to the caller and never retried automatically, since the
/// caller owns the retry decision.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("snapshot fetch failed: {0}")]
    Transient(String),
    #[error("command failed: {0}")]
    Command(String),
}

/// Thin typed wrapper over the hub HTTP API.
pub struct HubClient {
    base_url: String,
    client: reqwest::Client,
}

impl HubClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(COMMAND_TIMEOUT_SECS))
            .build()
            .map_err(|err| ClientError::Transient(err.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub async fn list_agents(&self) -> Result<Vec<AgentRecord>, ClientError> {
        let url = format!("{}/api/v1/agents", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| ClientError::Transient(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ClientError::Transient(format!(
                "hub returned {}",
                response.status()
            )));
        }
        response
            .json::<Vec<AgentRecord>>()
            .await
            .map_err(|err| ClientError::Transient(err.to_string()))
    }

    pub async fn inject_fault(
        &self,
        agent_id: &str,
        fault_type: &str,
        duration_seconds: Option<i64>,
    ) -> Result<AgentRecord, ClientError> {
        let url = format!("{}/api/v1/agents/{agent_id}/fault", self.base_url);
        let request = FaultRequest {
            fault_type: fault_type.to_string(),
            duration_seconds,
        };
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|err| ClientError::Command(err.to_string()))?;
        Self::command_record(response).await
    }

    pub async fn recover(&self, agent_id: &str) -> Result<AgentRecord, ClientError> {
        let url = format!("{}/api/v1/agents/{agent_id}/recover", self.base_url);
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|err| ClientError::Command(err.to_string()))?;
        Self::command_record(response).await
    }

    async fn command_record(response: reqwest::Response) -> Result<AgentRecord, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("(no body)"));
            return Err(ClientError::Command(format!("hub returned {status}: {detail}")));
        }
        response
            .json::<AgentRecord>()
            .await
            .map_err(|err| ClientError::Command(err.to_string()))
    }
}
