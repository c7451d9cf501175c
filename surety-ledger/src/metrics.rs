//! Metrics collection for observability
//!
//! Prometheus metrics on a private registry, so several ledgers can live in
//! one process.
//!
//! # Metrics
//!
//! - `surety_commands_total{command, outcome}` - Commands by result kind
//! - `surety_events_total` - Events appended to the log
//! - `surety_oracle_responses_total{outcome}` - Oracle responses by outcome
//! - `surety_payouts_total` - Payout transfers executed
//! - `surety_pool_balance` - Pool balance after the last commit, in whole units

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Commands by name and outcome
    pub commands_total: IntCounterVec,

    /// Total events appended
    pub events_total: IntCounter,

    /// Oracle responses by outcome
    pub oracle_responses_total: IntCounterVec,

    /// Executed payout transfers
    pub payouts_total: IntCounter,

    /// Pool balance (truncated to whole units)
    pub pool_balance: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("events_total", &self.events_total.get())
            .field("payouts_total", &self.payouts_total.get())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let commands_total = IntCounterVec::new(
            Opts::new("surety_commands_total", "Commands processed by outcome"),
            &["command", "outcome"],
        )?;
        registry.register(Box::new(commands_total.clone()))?;

        let events_total = IntCounter::new("surety_events_total", "Total number of events appended")?;
        registry.register(Box::new(events_total.clone()))?;

        let oracle_responses_total = IntCounterVec::new(
            Opts::new("surety_oracle_responses_total", "Oracle responses by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(oracle_responses_total.clone()))?;

        let payouts_total = IntCounter::new("surety_payouts_total", "Payout transfers executed")?;
        registry.register(Box::new(payouts_total.clone()))?;

        let pool_balance = IntGauge::new("surety_pool_balance", "Pool balance in whole units")?;
        registry.register(Box::new(pool_balance.clone()))?;

        Ok(Self {
            commands_total,
            events_total,
            oracle_responses_total,
            payouts_total,
            pool_balance,
            registry,
        })
    }

    /// Record a processed command; `outcome` is `ok` or an error kind
    pub fn record_command(&self, command: &str, outcome: &str) {
        self.commands_total.with_label_values(&[command, outcome]).inc();
    }

    /// Record appended events
    pub fn record_events(&self, count: usize) {
        self.events_total.inc_by(count as u64);
    }

    /// Record an oracle response outcome
    pub fn record_oracle_response(&self, outcome: &str) {
        self.oracle_responses_total.with_label_values(&[outcome]).inc();
    }

    /// Record executed payouts
    pub fn record_payouts(&self, count: usize) {
        self.payouts_total.inc_by(count as u64);
    }

    /// Update pool balance gauge
    pub fn update_pool_balance(&self, whole_units: i64) {
        self.pool_balance.set(whole_units);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.events_total.get(), 0);
        assert_eq!(metrics.payouts_total.get(), 0);
    }

    #[test]
    fn test_independent_registries() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.record_events(3);
        assert_eq!(a.events_total.get(), 3);
        assert_eq!(b.events_total.get(), 0);
    }

    #[test]
    fn test_record_command() {
        let metrics = Metrics::new().unwrap();
        metrics.record_command("fund_airline", "ok");
        metrics.record_command("fund_airline", "ok");
        metrics.record_command("fund_airline", "precondition_failed");

        assert_eq!(
            metrics
                .commands_total
                .with_label_values(&["fund_airline", "ok"])
                .get(),
            2
        );
        assert!(metrics
            .registry()
            .gather()
            .iter()
            .any(|family| family.get_name() == "surety_commands_total"));
    }
}
