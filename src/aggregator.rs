//! Result aggregation: drains the results channel into one `ResultSet`.

use crate::CaptureOutcome;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounters {
    pub processed: usize,
    pub succeeded: usize,
}

impl RunCounters {
    pub fn failed(&self) -> usize {
        self.processed - self.succeeded
    }
}

/// Fixed-width report row for one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultRecord {
    pub title: String,
    pub status_code: String,
    pub screenshot_ref: String,
    pub response_summary: String,
    pub success: bool,
}

impl ResultRecord {
    pub fn from_outcome(outcome: &CaptureOutcome) -> Self {
        // Failed rows show the error where the response would be.
        let response_summary = if outcome.success {
            outcome.response_summary.clone()
        } else {
            outcome.error_detail.clone()
        };
        Self {
            title: outcome.title.clone(),
            status_code: outcome.status_code.clone(),
            screenshot_ref: outcome.screenshot_ref.clone(),
            response_summary,
            success: outcome.success,
        }
    }

    /// `[title, status, screenshot, response]`, the column order reports use.
    pub fn columns(&self) -> [&str; 4] {
        [
            &self.title,
            &self.status_code,
            &self.screenshot_ref,
            &self.response_summary,
        ]
    }
}

/// Endpoint URL to its record. Duplicate URLs keep the last outcome.
pub type ResultSet = HashMap<String, ResultRecord>;

/// Final state of one batch, handed to the report collaborator.
#[derive(Debug, Clone, Default)]
pub struct BatchResults {
    pub results: ResultSet,
    pub counters: RunCounters,
}

/// Receives progress signals. Implementations must return quickly.
pub trait ProgressSink: Send + Sync {
    fn on_outcome(&self, outcome: &CaptureOutcome);
    fn on_progress(&self, current: usize, total: usize);
    fn finish(&self) {}
}

#[derive(Default)]
struct AggregatorState {
    results: ResultSet,
    counters: RunCounters,
}

pub struct ResultAggregator {
    state: Mutex<AggregatorState>,
    progress: Arc<dyn ProgressSink>,
}

impl ResultAggregator {
    pub fn new(progress: Arc<dyn ProgressSink>) -> Self {
        Self {
            state: Mutex::new(AggregatorState::default()),
            progress,
        }
    }

    /// Consume `results` until every sender is dropped, then return a snapshot.
    ///
    /// `total` only feeds progress events; termination depends on the channel
    /// closing, never on a count.
    pub async fn consume(
        &self,
        mut results: mpsc::Receiver<CaptureOutcome>,
        total: usize,
    ) -> BatchResults {
        self.reset();

        while let Some(outcome) = results.recv().await {
            self.record(outcome, total);
        }

        self.progress.finish();
        self.snapshot()
    }

    pub fn record(&self, outcome: CaptureOutcome, total: usize) {
        let record = ResultRecord::from_outcome(&outcome);
        let processed = {
            let mut state = self.lock();
            state.counters.processed += 1;
            if outcome.success {
                state.counters.succeeded += 1;
            }
            if state.results.insert(outcome.url.clone(), record).is_some() {
                debug!(url = %outcome.url, "duplicate endpoint, keeping latest outcome");
            }
            state.counters.processed
        };

        self.progress.on_outcome(&outcome);
        self.progress.on_progress(processed, total);
    }

    pub fn counters(&self) -> RunCounters {
        self.lock().counters
    }

    pub fn snapshot(&self) -> BatchResults {
        let state = self.lock();
        BatchResults {
            results: state.results.clone(),
            counters: state.counters,
        }
    }

    fn reset(&self) {
        *self.lock() = AggregatorState::default();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AggregatorState> {
        // The state stays consistent even if a holder panicked mid-update.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
