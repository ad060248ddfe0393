use chrono::{DateTime, Utc};
use fleet_core::AgentRecord;
use tracing::{debug, warn};

/// Observer-side merge point for snapshot fetches. Admission control is a
/// single in-flight slot: a tick that fires while a fetch is outstanding is
/// skipped, so at most one fetch runs at a time and a stale response can
/// never be applied out of order. A failed fetch keeps the last good view.
#[derive(Debug, Default)]
pub struct FleetView {
    agents: Vec<AgentRecord>,
    in_flight: bool,
    refresh_deferred: bool,
    last_synced_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl FleetView {
    /// Claims the in-flight slot. Returns `false` when a fetch is already
    /// outstanding; the caller must then skip this tick.
    pub fn try_begin_fetch(&mut self) -> bool {
        if self.in_flight {
            debug!(event = "poll_skipped");
            return false;
        }
        self.in_flight = true;
        true
    }

    /// Command-triggered out-of-band refresh. Starts immediately when the
    /// slot is free; otherwise the refresh is deferred until the in-flight
    /// fetch settles. Because the command already completed server-side,
    /// either ordering makes the refreshed view include the command's own
    /// effect.
    pub fn request_refresh(&mut self) -> bool {
        if self.in_flight {
            debug!(event = "refresh_deferred");
            self.refresh_deferred = true;
            return false;
        }
        self.in_flight = true;
        true
    }

    /// Claims the slot for a refresh deferred by `request_refresh`. Called
    /// after a fetch settles; returns `true` exactly once per deferral.
    pub fn take_deferred_refresh(&mut self) -> bool {
        if !self.refresh_deferred || self.in_flight {
            return false;
        }
        self.refresh_deferred = false;
        self.in_flight = true;
        true
    }

    /// Replaces the local view wholesale. The server snapshot is already
    /// internally consistent, so no per-field merging is needed.
    pub fn complete_success(&mut self, agents: Vec<AgentRecord>, synced_at: DateTime<Utc>) {
        self.agents = agents;
        self.in_flight = false;
        self.last_synced_at = Some(synced_at);
        self.last_error = None;
    }

    /// Releases the slot without touching the view; stale-but-present beats
    /// blanking the display. The next tick retries.
    pub fn complete_failure(&mut self, error: String) {
        warn!(event = "poll_failed", error = %error);
        self.in_flight = false;
        self.last_error = Some(error);
    }

    pub fn agents(&self) -> &[AgentRecord] {
        &self.agents
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}
