//! # Progress Tracking Module
//!
//! Tracker thread-safe condiviso dai worker: aggiorna i totali del run sotto
//! mutua esclusione e pilota la progress bar con un messaggio per file.

use crate::job::{FileOutcome, OptimizationResult};
use crate::progress::ProgressManager;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Running totals mutated by every worker
#[derive(Debug, Default, Clone)]
pub struct RunningTotals {
    pub processed_count: usize,
    pub optimized: usize,
    pub kept_original: usize,
    pub errors: usize,
    pub total_original_bytes: u64,
    pub total_saved_bytes: u64,
}

/// Shared per-run progress tracker
#[derive(Clone)]
pub struct ProgressTracker {
    pub total_files: usize,
    totals: Arc<Mutex<RunningTotals>>,
    progress: ProgressManager,
}

impl ProgressTracker {
    /// Crea un nuovo tracker
    pub fn new(total_files: usize) -> Self {
        Self {
            total_files,
            totals: Arc::new(Mutex::new(RunningTotals::default())),
            progress: ProgressManager::new(total_files as u64),
        }
    }

    /// Records one completed file: updates the shared totals and advances the
    /// progress bar with a per-file message.
    pub async fn record(&self, result: &OptimizationResult) {
        let file_name = result
            .source_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        let mut totals = self.totals.lock().await;
        totals.processed_count += 1;
        totals.total_original_bytes += result.original_size;

        let message = match &result.outcome {
            FileOutcome::Optimized => {
                totals.optimized += 1;
                totals.total_saved_bytes += result.bytes_saved;
                format!("[OK] {}: {:.1}% saved", file_name, result.reduction_percent())
            }
            FileOutcome::KeptOriginal => {
                totals.kept_original += 1;
                format!("[SKIP] {}: already optimal", file_name)
            }
            FileOutcome::Failed(kind) => {
                totals.errors += 1;
                format!("[ERROR] {}: {}", file_name, kind.diagnostic())
            }
        };
        drop(totals);

        self.progress.update(&message);
    }

    /// Snapshot of the totals accumulated so far
    pub async fn totals(&self) -> RunningTotals {
        self.totals.lock().await.clone()
    }

    /// Finalizza la progress bar
    pub fn finish(&self, summary: &str) {
        self.progress.finish(summary);
    }
}
