//! # Batch Orchestrator Module
//!
//! Orchestratore principale: fan-out dei file su un pool di worker limitato,
//! aggregazione dei totali e raccolta degli esiti in un `BatchJob` finale.
//!
//! ## Garanzie:
//! - Pool limitato da un semaforo (default: min(parallelismo hardware, 8))
//! - Nessun ordinamento tra file; gli esiti arrivano in ordine di completamento
//! - Contatore e totali condivisi aggiornati solo via atomics/mutex
//! - La cancellazione è osservata tra un file e l'altro: i task in volo
//!   completano, nessun nuovo file viene avviato
//! - Gli errori per-file non fermano mai il batch; solo gli errori di
//!   configurazione abortiscono il run prima di processare

use crate::config::{OptimizationConfig, MAX_WORKERS};
use crate::engine::RecompressionEngine;
use crate::file_manager::FileManager;
use crate::job::{BatchJob, FileCounter, OptimizationResult};
use crate::optimizer::path_resolver::PathResolver;
use crate::optimizer::progress_tracker::ProgressTracker;
use crate::platform::PlatformCommands;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, Semaphore};
use tracing::{error, info};

/// Orchestrates one optimization run over a set of inputs
pub struct BatchOptimizer {
    config: OptimizationConfig,
}

impl BatchOptimizer {
    /// Builds the orchestrator; configuration errors abort here, before any
    /// file is touched.
    pub fn new(config: OptimizationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Runs the whole batch to completion.
    pub async fn run(&self, inputs: &[PathBuf]) -> Result<BatchJob> {
        // a receiver nobody signals: the run is simply never cancelled
        let (_sender, receiver) = broadcast::channel(1);
        self.run_with_cancellation(inputs, receiver).await
    }

    /// Runs the batch with a cancellation channel. After a signal is observed
    /// no new file starts; in-flight files finish and their results remain
    /// valid.
    pub async fn run_with_cancellation(
        &self,
        inputs: &[PathBuf],
        mut stop: broadcast::Receiver<()>,
    ) -> Result<BatchJob> {
        let start_time = std::time::Instant::now();

        let files = FileManager::find_jpeg_files(inputs)?;
        if files.is_empty() {
            return Err(anyhow::anyhow!(
                "No JPEG files found in the given inputs"
            ));
        }

        self.log_configuration(&files);
        self.report_available_tools().await;

        let engine = Arc::new(RecompressionEngine::new(self.config.clone()).await);
        let resolver = Arc::new(PathResolver::new(self.config.clone(), inputs));
        let counter = Arc::new(FileCounter::new());
        let tracker = ProgressTracker::new(files.len());
        let results: Arc<Mutex<Vec<OptimizationResult>>> =
            Arc::new(Mutex::new(Vec::with_capacity(files.len())));

        let workers = self.config.workers.clamp(1, MAX_WORKERS);
        let semaphore = Arc::new(Semaphore::new(workers));

        let mut tasks = Vec::new();
        let mut cancelled = false;

        for file_path in &files {
            if should_stop(&mut stop) {
                info!("Cancellation observed, starting no further files");
                cancelled = true;
                break;
            }

            let permit = semaphore.clone().acquire_owned().await?;
            let engine = engine.clone();
            let resolver = resolver.clone();
            let counter = counter.clone();
            let tracker = tracker.clone();
            let results = results.clone();
            let file_path = file_path.clone();

            tasks.push(tokio::spawn(async move {
                let _permit = permit;
                let result = process_one(&engine, &resolver, &counter, &file_path).await;
                tracker.record(&result).await;
                results.lock().await.push(result);
            }));
        }

        // Aspetta tutti i task in volo
        for task in tasks {
            if let Err(e) = task.await {
                error!("Worker task panicked: {e}");
            }
        }

        let totals = tracker.totals().await;
        let results = std::mem::take(&mut *results.lock().await);
        let job = BatchJob {
            files,
            results,
            total_original_bytes: totals.total_original_bytes,
            total_saved_bytes: totals.total_saved_bytes,
            processed_count: totals.processed_count,
            error_count: totals.errors,
            cancelled,
        };

        tracker.finish(&job.format_summary());
        self.log_final_stats(&job, start_time.elapsed().as_secs_f64());
        Ok(job)
    }

    /// Logga la configurazione del run
    fn log_configuration(&self, files: &[PathBuf]) {
        info!("Found {} JPEG files to optimize", files.len());
        info!("Mode: {}", self.config.mode);
        if self.config.mode == crate::config::OptimizationMode::Balanced {
            info!("Quality: {}", self.config.quality);
        }
        if self.config.remove_metadata {
            info!("Metadata: EXIF stripped (ICC profiles always kept)");
        } else {
            info!("Metadata: EXIF and ICC preserved");
        }
        if self.config.overwrite_in_place {
            info!("Output: overwriting source files in place");
        } else if let Some(ref output_root) = self.config.output_root {
            info!("Output directory: {}", output_root.display());
        } else {
            info!("Output: next to each source file");
        }
        info!(
            "Workers: {}",
            self.config.workers.clamp(1, MAX_WORKERS)
        );
    }

    /// Stampa quali tool esterni sono disponibili
    async fn report_available_tools(&self) {
        let platform = PlatformCommands::instance();
        info!("🔧 Checking external JPEG tools:");

        let tools = [
            ("jpegtran", "lossless structural transcode"),
            ("cjpeg", "external encoder"),
            ("djpeg", "external decoder"),
        ];
        for (tool, description) in &tools {
            let available = platform.is_command_available(tool).await;
            let status = if available { "✅" } else { "❌" };
            info!("  {} {} - {}", status, tool, description);
        }
    }

    /// Stampa statistiche finali
    fn log_final_stats(&self, job: &BatchJob, duration: f64) {
        info!("=== Optimization Complete ===");
        info!("Files processed: {}", job.processed_count);
        info!("Errors: {}", job.error_count);
        info!(
            "Original bytes: {}",
            FileManager::format_size(job.total_original_bytes)
        );
        info!(
            "Bytes saved: {} ({:.2}%)",
            FileManager::format_size(job.total_saved_bytes),
            job.overall_reduction_percent()
        );
        info!("Duration: {:.1}s", duration);
        if job.cancelled {
            info!("Run was cancelled before all files were started");
        }
    }
}

/// One worker unit: resolve the destination, run the engine, capture any
/// error into the file's result. Never propagates.
async fn process_one(
    engine: &RecompressionEngine,
    resolver: &PathResolver,
    counter: &FileCounter,
    file_path: &PathBuf,
) -> OptimizationResult {
    let original_size = FileManager::file_size(file_path).await.unwrap_or(0);

    let destination = match resolver.resolve(file_path, counter).await {
        Ok(destination) => destination,
        Err(e) => {
            error!("Failed to resolve output for {}: {e}", file_path.display());
            return OptimizationResult::failed(file_path, original_size, &e);
        }
    };

    match engine.process_file(file_path, &destination).await {
        Ok(result) => result,
        Err(e) => {
            error!("Failed to optimize {}: {e}", file_path.display());
            OptimizationResult::failed(file_path, original_size, &e)
        }
    }
}

/// Non-blocking cancellation probe on the broadcast channel
fn should_stop(stop: &mut broadcast::Receiver<()>) -> bool {
    match stop.try_recv() {
        Ok(_) => true,
        Err(broadcast::error::TryRecvError::Lagged(_)) => true,
        Err(broadcast::error::TryRecvError::Empty) => false,
        Err(broadcast::error::TryRecvError::Closed) => false,
    }
}
