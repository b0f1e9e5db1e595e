//! Bounded in-memory service-error history
//!
//! Recent failures (database checks, raw-query errors) are kept in a small
//! ring owned by the application state and surfaced through the diagnostics
//! endpoint, so operators can see what went wrong without scraping logs.

use crate::util::utc_now_iso;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

const DEFAULT_HISTORY_LIMIT: usize = 50;

/// One recorded service error
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub timestamp: String,
    pub source: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
}

/// Ring buffer of recent service errors
pub struct ErrorHistory {
    entries: Mutex<VecDeque<ErrorRecord>>,
    limit: usize,
}

impl ErrorHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            limit: limit.max(1),
        }
    }

    /// Build with the limit taken from `ERROR_HISTORY_LIMIT` when set.
    pub fn from_env() -> Self {
        let limit = std::env::var("ERROR_HISTORY_LIMIT")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|v| *v >= 1)
            .unwrap_or(DEFAULT_HISTORY_LIMIT);
        Self::new(limit)
    }

    /// Record an error, evicting the oldest entry when full.
    pub fn record(&self, source: &str, message: &str, exception: Option<&str>) {
        let record = ErrorRecord {
            timestamp: utc_now_iso(),
            source: source.to_string(),
            message: message.to_string(),
            exception: exception.map(str::to_string),
        };
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() >= self.limit {
            entries.pop_front();
        }
        entries.push_back(record);
    }

    /// Most recent entries, oldest first.
    pub fn recent(&self, limit: Option<usize>) -> Vec<ErrorRecord> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match limit {
            Some(0) => Vec::new(),
            Some(n) => entries.iter().skip(entries.len().saturating_sub(n)).cloned().collect(),
            None => entries.iter().cloned().collect(),
        }
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}
