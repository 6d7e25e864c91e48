//! Statistics accumulated over one sync invocation

use std::time::{Duration, Instant};

use serde::Serialize;

/// Immutable snapshot of one completed sync run.
///
/// Returned by `sync` even when every draft failed; callers inspect
/// the counters and the recorded messages to decide success.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SyncStatistics {
    /// Drafts taken from the input, including failed ones.
    pub processed: usize,
    /// Records created because no existing record matched the key.
    pub created: usize,
    /// Records updated with a non-empty action list.
    pub updated: usize,
    /// Records whose diff was empty.
    pub up_to_date: usize,
    /// Drafts that failed at any pipeline stage.
    pub failed: usize,
    /// Formatted messages of every handled failure, in input order.
    pub error_messages: Vec<String>,
    /// Warning messages, e.g. optional references left unresolved.
    pub warning_messages: Vec<String>,
    /// Wall-clock duration of the run.
    pub duration: Duration,
}

impl SyncStatistics {
    /// One-line human-readable summary of the run.
    pub fn summary(&self) -> String {
        format!(
            "Processed {} records: {} created, {} updated, {} up to date, {} failed in {:.2}s",
            self.processed,
            self.created,
            self.updated,
            self.up_to_date,
            self.failed,
            self.duration.as_secs_f64()
        )
    }
}

/// Mutable accumulator owned by the orchestrator for the lifetime of
/// one invocation; finalized into a `SyncStatistics` snapshot.
#[derive(Debug)]
pub struct SyncStatisticsBuilder {
    processed: usize,
    created: usize,
    updated: usize,
    up_to_date: usize,
    failed: usize,
    error_messages: Vec<String>,
    warning_messages: Vec<String>,
    started: Instant,
}

impl Default for SyncStatisticsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncStatisticsBuilder {
    pub fn new() -> Self {
        Self {
            processed: 0,
            created: 0,
            updated: 0,
            up_to_date: 0,
            failed: 0,
            error_messages: Vec::new(),
            warning_messages: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn increment_processed(&mut self) {
        self.processed += 1;
    }

    pub fn increment_created(&mut self) {
        self.created += 1;
    }

    pub fn increment_updated(&mut self) {
        self.updated += 1;
    }

    pub fn increment_up_to_date(&mut self) {
        self.up_to_date += 1;
    }

    pub fn increment_failed(&mut self) {
        self.failed += 1;
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.error_messages.push(message.into());
    }

    pub fn record_warning(&mut self, message: impl Into<String>) {
        self.warning_messages.push(message.into());
    }

    /// Finalize into an immutable snapshot.
    pub fn build(self) -> SyncStatistics {
        SyncStatistics {
            processed: self.processed,
            created: self.created,
            updated: self.updated,
            up_to_date: self.up_to_date,
            failed: self.failed,
            error_messages: self.error_messages,
            warning_messages: self.warning_messages,
            duration: self.started.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_into_snapshot() {
        let mut builder = SyncStatisticsBuilder::new();
        builder.increment_processed();
        builder.increment_processed();
        builder.increment_created();
        builder.increment_failed();
        builder.record_error("create failed");

        let stats = builder.build();
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.created, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.updated, 0);
        assert_eq!(stats.error_messages, vec!["create failed".to_string()]);
    }

    #[test]
    fn summary_names_every_counter() {
        let mut builder = SyncStatisticsBuilder::new();
        builder.increment_processed();
        builder.increment_up_to_date();

        let summary = builder.build().summary();
        assert!(summary.contains("Processed 1 records"));
        assert!(summary.contains("1 up to date"));
    }
}
