//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//! Each ledger owns its registry, so several ledgers can live in one process.
//!
//! # Metrics
//!
//! - `tab_ledger_operations_total{kind}` - Operations appended
//! - `tab_ledger_recompute_duration_seconds` - Histogram of balance rebuilds
//! - `tab_ledger_compactions_total{kind}` - Compactions that changed the log
//! - `tab_ledger_compacted_clients_total` - Clients rewritten by compaction
//! - `tab_ledger_outstanding_clients` - Clients with a nonzero balance

use crate::compaction::CompactionOutcome;
use crate::types::OperationKind;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Operations appended, by kind
    pub operations_total: IntCounterVec,

    /// Balance rebuild duration histogram
    pub recompute_duration: Histogram,

    /// Compactions that rewrote at least one client, by kind
    pub compactions_total: IntCounterVec,

    /// Clients rewritten by compaction
    pub compacted_clients: IntCounter,

    /// Clients with a nonzero balance
    pub outstanding_clients: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("outstanding_clients", &self.outstanding_clients.get())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let operations_total = IntCounterVec::new(
            Opts::new("tab_ledger_operations_total", "Operations appended"),
            &["kind"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let recompute_duration = Histogram::with_opts(
            HistogramOpts::new(
                "tab_ledger_recompute_duration_seconds",
                "Histogram of balance rebuild latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(recompute_duration.clone()))?;

        let compactions_total = IntCounterVec::new(
            Opts::new(
                "tab_ledger_compactions_total",
                "Compactions that rewrote at least one client",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(compactions_total.clone()))?;

        let compacted_clients = IntCounter::new(
            "tab_ledger_compacted_clients_total",
            "Clients rewritten by compaction",
        )?;
        registry.register(Box::new(compacted_clients.clone()))?;

        let outstanding_clients = IntGauge::new(
            "tab_ledger_outstanding_clients",
            "Clients with a nonzero balance",
        )?;
        registry.register(Box::new(outstanding_clients.clone()))?;

        Ok(Self {
            operations_total,
            recompute_duration,
            compactions_total,
            compacted_clients,
            outstanding_clients,
            registry,
        })
    }

    /// Record operation append
    pub fn record_operation(&self, kind: OperationKind) {
        self.operations_total.with_label_values(&[kind.as_str()]).inc();
    }

    /// Record balance rebuild
    pub fn record_recompute(&self, duration_seconds: f64, outstanding: usize) {
        self.recompute_duration.observe(duration_seconds);
        self.outstanding_clients.set(outstanding as i64);
    }

    /// Record compaction
    pub fn record_compaction(&self, outcome: &CompactionOutcome) {
        if outcome.changed() {
            self.compactions_total
                .with_label_values(&[outcome.kind.as_str()])
                .inc();
            self.compacted_clients
                .inc_by((outcome.settled + outcome.collapsed) as u64);
        }
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render the text exposition format
    pub fn encode_text(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
