use fleet_core::{AgentMetrics, AgentStatus, FaultType};
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct HealthThresholds {
    /// Error rate above which an agent is unhealthy outright.
    pub error_rate_high: f64,
    /// Error rate above which an agent is degraded.
    pub error_rate_elevated: f64,
    /// Latency above which an agent is degraded.
    pub latency_elevated_ms: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            error_rate_high: 0.5,
            error_rate_elevated: 0.1,
            latency_elevated_ms: 1_000.0,
        }
    }
}

/// Maps a telemetry sample plus the currently active faults to a status.
/// Pure over its inputs; RECOVERING stickiness is layered on top by the
/// registry, which owns the transition history.
pub fn evaluate(
    metrics: &AgentMetrics,
    active_faults: &BTreeSet<FaultType>,
    thresholds: &HealthThresholds,
) -> AgentStatus {
    if active_faults.contains(&FaultType::Error) || metrics.error_rate > thresholds.error_rate_high
    {
        return AgentStatus::Unhealthy;
    }
    if active_faults.contains(&FaultType::Latency)
        || metrics.latency_ms > thresholds.latency_elevated_ms
        || metrics.error_rate > thresholds.error_rate_elevated
    {
        return AgentStatus::Degraded;
    }
    AgentStatus::Healthy
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(latency_ms: f64, error_rate: f64) -> AgentMetrics {
        AgentMetrics {
            latency_ms,
            error_rate,
            cpu_usage: 0.2,
            memory_usage: 0.3,
        }
    }

    #[test]
    fn clean_sample_without_faults_is_healthy() {
        let status = evaluate(
            &metrics(50.0, 0.0),
            &BTreeSet::new(),
            &HealthThresholds::default(),
        );
        assert_eq!(status, AgentStatus::Healthy);
    }

    #[test]
    fn error_fault_dominates_latency_fault() {
        let faults = BTreeSet::from([FaultType::Latency, FaultType::Error]);
        let status = evaluate(&metrics(50.0, 0.0), &faults, &HealthThresholds::default());
        assert_eq!(status, AgentStatus::Unhealthy);
    }

    #[test]
    fn latency_fault_degrades_even_with_clean_metrics() {
        let faults = BTreeSet::from([FaultType::Latency]);
        let status = evaluate(&metrics(50.0, 0.0), &faults, &HealthThresholds::default());
        assert_eq!(status, AgentStatus::Degraded);
    }

    #[test]
    fn high_error_rate_is_unhealthy_without_any_fault() {
        let status = evaluate(
            &metrics(50.0, 0.6),
            &BTreeSet::new(),
            &HealthThresholds::default(),
        );
        assert_eq!(status, AgentStatus::Unhealthy);
    }

    #[test]
    fn elevated_metrics_are_degraded() {
        let thresholds = HealthThresholds::default();
        assert_eq!(
            evaluate(&metrics(1_500.0, 0.0), &BTreeSet::new(), &thresholds),
            AgentStatus::Degraded
        );
        assert_eq!(
            evaluate(&metrics(50.0, 0.2), &BTreeSet::new(), &thresholds),
            AgentStatus::Degraded
        );
    }

    #[test]
    fn thresholds_are_exclusive_bounds() {
        let thresholds = HealthThresholds::default();
        assert_eq!(
            evaluate(&metrics(1_000.0, 0.1), &BTreeSet::new(), &thresholds),
            AgentStatus::Healthy
        );
        assert_eq!(
            evaluate(&metrics(50.0, 0.5), &BTreeSet::new(), &thresholds),
            AgentStatus::Degraded
        );
    }
}
