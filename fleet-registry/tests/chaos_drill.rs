use chrono::{DateTime, Duration, TimeZone, Utc};
use fleet_core::{AgentMetrics, AgentStatus, FaultType, TelemetryPayload};
use fleet_registry::{Registry, RegistryConfig};

fn ts(sec: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 23, 9, 0, 0)
        .single()
        .expect("valid timestamp")
        + Duration::seconds(sec)
}

fn clean_metrics() -> AgentMetrics {
    AgentMetrics {
        latency_ms: 50.0,
        error_rate: 0.0,
        cpu_usage: 0.2,
        memory_usage: 0.3,
    }
}

fn telemetry(agent_id: &str) -> TelemetryPayload {
    TelemetryPayload {
        agent_id: agent_id.to_string(),
        service_name: format!("{agent_id}-service"),
        metrics: clean_metrics(),
        config: None,
    }
}

/// Walks one full chaos drill across two agents: inject, lazy expiry,
/// recover, sticky recovery, and the healing sample, asserting the fleet
/// snapshot stays consistent throughout.
#[test]
fn full_chaos_drill_round_trip() {
    let registry = Registry::new(RegistryConfig {
        recovery_timeout: Duration::seconds(30),
        ..RegistryConfig::default()
    });

    registry
        .ingest_telemetry(&telemetry("a1"), ts(0))
        .expect("ingest a1");
    registry
        .ingest_telemetry(&telemetry("a2"), ts(0))
        .expect("ingest a2");

    // Short latency fault on a1: degraded now, healthy again after expiry
    // with no timer in between.
    let record = registry
        .inject_fault("a1", FaultType::Latency, Duration::seconds(1), ts(1))
        .expect("inject latency");
    assert_eq!(record.status, AgentStatus::Degraded);
    assert_eq!(record.active_faults, vec![FaultType::Latency]);

    let snapshot = registry.snapshot(ts(3));
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[0].agent_id, "a1");
    assert_eq!(snapshot[0].status, AgentStatus::Healthy);
    assert!(snapshot[0].active_faults.is_empty());

    // a2 is untouched by everything that happens to a1.
    assert_eq!(snapshot[1].agent_id, "a2");
    assert_eq!(snapshot[1].status, AgentStatus::Healthy);

    // Long error fault on a1, then an operator-issued recovery.
    let record = registry
        .inject_fault("a1", FaultType::Error, Duration::seconds(60), ts(4))
        .expect("inject error");
    assert_eq!(record.status, AgentStatus::Unhealthy);

    let record = registry.recover("a1", ts(5)).expect("recover");
    assert_eq!(record.status, AgentStatus::Recovering);
    assert!(record.active_faults.is_empty());

    // Sticky within the window, even though the last sample predates the
    // fault and a plain read re-runs the evaluator.
    let record = registry.get("a1", ts(10)).expect("get");
    assert_eq!(record.status, AgentStatus::Recovering);

    // A fresh healthy sample closes the window and the fleet is green again.
    let status = registry
        .update_telemetry("a1", clean_metrics(), ts(12), ts(12))
        .expect("update");
    assert_eq!(status, AgentStatus::Healthy);

    let snapshot = registry.snapshot(ts(13));
    assert!(snapshot
        .iter()
        .all(|record| record.status == AgentStatus::Healthy && record.active_faults.is_empty()));
}
