//! Error sink used by the store on the failure path.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::error;

/// Fire-and-forget error reporting. Implementations must not block.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, message: &str, extra: &BTreeMap<String, Value>);
}

/// Default sink, writes reports into the log stream.
#[derive(Debug, Clone, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, message: &str, extra: &BTreeMap<String, Value>) {
        let extra = serde_json::to_string(extra).unwrap_or_default();
        error!(extra = %extra, "{}", message);
    }
}

/// Keeps every report in memory, handy for tests and diagnostics endpoints.
#[derive(Debug, Clone, Default)]
pub struct MemoryReporter {
    reports: Arc<Mutex<Vec<(String, BTreeMap<String, Value>)>>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<(String, BTreeMap<String, Value>)> {
        self.reports
            .lock()
            .map(|reports| reports.clone())
            .unwrap_or_default()
    }
}

impl ErrorReporter for MemoryReporter {
    fn report(&self, message: &str, extra: &BTreeMap<String, Value>) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push((message.to_owned(), extra.clone()));
        }
    }
}
