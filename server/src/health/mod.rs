//! Health Monitor
//!
//! Independent checks for the engine, the data directory, memory pressure and
//! the control context. Overall health is the conjunction of all four.

mod memory;

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub use memory::{read_memory, read_rss_bytes, MemoryReading};

use crate::control::ControlHandle;
use crate::engine::PermissionEngine;
use crate::util::format_timestamp;

pub const DEFAULT_MEMORY_THRESHOLD_PERCENT: f64 = 90.0;

const HEALTH_TEST_FILE: &str = ".health_test";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentHealth {
    pub healthy: bool,
    pub detail: serde_json::Value,
}

impl ComponentHealth {
    fn new(healthy: bool, detail: serde_json::Value) -> Self {
        Self { healthy, detail }
    }
}

/// Result of one health check run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub healthy: bool,
    pub checked_at: String,
    pub components: BTreeMap<&'static str, ComponentHealth>,
}

impl HealthSnapshot {
    /// Multi-line report for operators.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Tierward health: {} (checked {})\n",
            if self.healthy { "OK" } else { "DEGRADED" },
            self.checked_at
        );
        for (name, component) in &self.components {
            let _ = writeln!(
                out,
                "  {name}: {} {}",
                if component.healthy { "ok" } else { "FAIL" },
                component.detail
            );
        }
        out
    }
}

pub struct HealthMonitor {
    engine: Arc<PermissionEngine>,
    control: ControlHandle,
    data_dir: PathBuf,
    memory_threshold_percent: f64,
    memory_probe: fn() -> Option<MemoryReading>,
    last: RwLock<Option<HealthSnapshot>>,
}

impl HealthMonitor {
    pub fn new(engine: Arc<PermissionEngine>, control: ControlHandle, data_dir: PathBuf) -> Self {
        Self {
            engine,
            control,
            data_dir,
            memory_threshold_percent: DEFAULT_MEMORY_THRESHOLD_PERCENT,
            memory_probe: read_memory,
            last: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn with_memory_threshold(mut self, percent: f64) -> Self {
        self.memory_threshold_percent = percent;
        self
    }

    /// Replace the memory reading source.
    #[must_use]
    pub fn with_memory_probe(mut self, probe: fn() -> Option<MemoryReading>) -> Self {
        self.memory_probe = probe;
        self
    }

    /// Run every check and return overall health.
    pub async fn check(&self) -> bool {
        self.run().await.healthy
    }

    /// Run every check, store and return the snapshot.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self) -> HealthSnapshot {
        let mut components = BTreeMap::new();
        components.insert("engine", self.check_engine().await);
        components.insert("storage", self.check_storage().await);
        components.insert("memory", self.check_memory());
        components.insert("components", self.check_components().await);

        let healthy = components.values().all(|c| c.healthy);
        let snapshot = HealthSnapshot {
            healthy,
            checked_at: format_timestamp(chrono::Utc::now()),
            components,
        };

        if healthy {
            info!("Health check passed");
        } else {
            let failing: Vec<&str> = snapshot
                .components
                .iter()
                .filter(|(_, c)| !c.healthy)
                .map(|(name, _)| *name)
                .collect();
            warn!(failing = ?failing, "Health check failed");
        }

        *self.last.write().await = Some(snapshot.clone());
        snapshot
    }

    /// Most recent snapshot, if a check has run.
    pub async fn last(&self) -> Option<HealthSnapshot> {
        self.last.read().await.clone()
    }

    async fn check_engine(&self) -> ComponentHealth {
        let probe = self.engine.probe().await;
        ComponentHealth::new(
            probe.reachable,
            json!({ "reachable": probe.reachable, "version": probe.version }),
        )
    }

    async fn check_storage(&self) -> ComponentHealth {
        let path = self.data_dir.join(HEALTH_TEST_FILE);
        let result = async {
            tokio::fs::create_dir_all(&self.data_dir).await?;
            tokio::fs::write(&path, b"ok").await?;
            tokio::fs::remove_file(&path).await
        }
        .await;
        match result {
            Ok(()) => ComponentHealth::new(
                true,
                json!({ "data_dir": self.data_dir.display().to_string() }),
            ),
            Err(e) => ComponentHealth::new(
                false,
                json!({ "data_dir": self.data_dir.display().to_string(), "error": e.to_string() }),
            ),
        }
    }

    fn check_memory(&self) -> ComponentHealth {
        match (self.memory_probe)() {
            Some(reading) => ComponentHealth::new(
                reading.percent < self.memory_threshold_percent,
                json!({
                    "used_bytes": reading.used_bytes,
                    "limit_bytes": reading.limit_bytes,
                    "percent": (reading.percent * 10.0).round() / 10.0,
                    "threshold_percent": self.memory_threshold_percent,
                }),
            ),
            None => ComponentHealth::new(true, json!({ "reading": null })),
        }
    }

    async fn check_components(&self) -> ComponentHealth {
        let counts = self
            .control
            .call(|core| (core.store.total(), core.audit.len()))
            .await;
        match counts {
            Ok((players, audit_entries)) => ComponentHealth::new(
                true,
                json!({ "players": players, "audit_entries": audit_entries }),
            ),
            Err(e) => ComponentHealth::new(false, json!({ "error": e.to_string() })),
        }
    }
}

/// Run [`HealthMonitor::run`] every `interval`.
pub fn spawn_health_task(monitor: Arc<HealthMonitor>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // consume immediate first tick
        loop {
            ticker.tick().await;
            monitor.run().await;
        }
    })
}
