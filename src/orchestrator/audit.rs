//! Orchestration audit log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::VersionStamp;

/// Which optional learners were wired in when an event was logged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentAvailability {
    pub bayesian_optimizer: bool,
    pub anomaly_detector: bool,
    pub rl_agent: bool,
    /// No optional dependency, always true
    pub adaptive_manager: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationLogEntry {
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub data: serde_json::Value,
    pub version: VersionStamp,
    pub components: ComponentAvailability,
}

/// Append-only, explicitly clearable event buffer owned by one orchestrator
#[derive(Debug, Default)]
pub struct AuditLog {
    entries: Mutex<Vec<OrchestrationLogEntry>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<OrchestrationLogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, entry: OrchestrationLogEntry) {
        self.entries().push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn snapshot(&self) -> Vec<OrchestrationLogEntry> {
        self.entries().clone()
    }

    pub fn latest(&self) -> Option<OrchestrationLogEntry> {
        self.entries().last().cloned()
    }

    pub fn by_event_type(&self, event_type: &str) -> Vec<OrchestrationLogEntry> {
        self.entries()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    /// The whole log as a JSON array.
    pub fn export_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(&*self.entries())
    }
}
