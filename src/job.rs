//! # Batch Job and Result Types
//!
//! Valori espliciti, posseduti dal chiamante, che attraversano l'intera
//! pipeline: nessuno stato mutabile a livello di processo.
//!
//! ## Strutture dati:
//! - `FileCounter`: contatore condiviso monotono per i template di naming
//! - `OptimizationResult`: esito immutabile di un singolo file
//! - `FailureKind`: tassonomia degli errori per-file
//! - `BatchJob`: aggregato finale di un run (totali + risultati)

use crate::error::OptimizeError;
use crate::file_manager::FileManager;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counter shared by every worker of a run.
///
/// Values start at 1 and never repeat, regardless of pool size: claiming is
/// a single atomic increment, never a read-modify-write.
#[derive(Debug, Default)]
pub struct FileCounter(AtomicU64);

impl FileCounter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Claims the next counter value (1-based)
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Highest value claimed so far (0 when untouched)
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Structured reason a single file failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// Unreadable or non-JPEG source
    Input(String),
    /// External transcoder/encoder exited non-zero or timed out
    Tool(String),
    /// Destination directory or file could not be created/written
    Filesystem(String),
}

impl FailureKind {
    /// Maps a pipeline error onto the per-file failure taxonomy
    pub fn from_error(error: &OptimizeError) -> Self {
        match error {
            OptimizeError::Tool(_) | OptimizeError::MissingDependency(_) => {
                Self::Tool(error.to_string())
            }
            OptimizeError::Filesystem(_) => Self::Filesystem(error.to_string()),
            _ => Self::Input(error.to_string()),
        }
    }

    /// Human-readable diagnostic for reporting
    pub fn diagnostic(&self) -> &str {
        match self {
            Self::Input(msg) | Self::Tool(msg) | Self::Filesystem(msg) => msg,
        }
    }
}

/// What happened to one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Recompressed bytes were written to the destination
    Optimized,
    /// Recompression did not shrink the file; the original bytes were kept
    KeptOriginal,
    /// The file could not be processed; its original is untouched
    Failed(FailureKind),
}

/// Immutable outcome of one file. `final_size <= original_size` always holds
/// for non-failed results.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub source_path: PathBuf,
    pub destination_path: Option<PathBuf>,
    pub original_size: u64,
    pub final_size: u64,
    pub bytes_saved: u64,
    pub outcome: FileOutcome,
}

impl OptimizationResult {
    /// A file that was recompressed and written smaller
    pub fn optimized(
        source_path: &Path,
        destination_path: &Path,
        original_size: u64,
        final_size: u64,
    ) -> Self {
        Self {
            source_path: source_path.to_path_buf(),
            destination_path: Some(destination_path.to_path_buf()),
            original_size,
            final_size,
            bytes_saved: original_size.saturating_sub(final_size),
            outcome: FileOutcome::Optimized,
        }
    }

    /// A file the size guard rejected: the original bytes stand, zero saved
    pub fn kept_original(source_path: &Path, destination_path: &Path, original_size: u64) -> Self {
        Self {
            source_path: source_path.to_path_buf(),
            destination_path: Some(destination_path.to_path_buf()),
            original_size,
            final_size: original_size,
            bytes_saved: 0,
            outcome: FileOutcome::KeptOriginal,
        }
    }

    /// A file that failed; no destination was written
    pub fn failed(source_path: &Path, original_size: u64, error: &OptimizeError) -> Self {
        Self {
            source_path: source_path.to_path_buf(),
            destination_path: None,
            original_size,
            final_size: original_size,
            bytes_saved: 0,
            outcome: FileOutcome::Failed(FailureKind::from_error(error)),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self.outcome, FileOutcome::Failed(_))
    }

    pub fn reduction_percent(&self) -> f64 {
        if self.original_size > 0 {
            (self.bytes_saved as f64 / self.original_size as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// Finalized, read-only aggregate of one optimization run
#[derive(Debug, Default)]
pub struct BatchJob {
    /// Every JPEG discovered for this run
    pub files: Vec<PathBuf>,
    /// Per-file outcomes in completion order
    pub results: Vec<OptimizationResult>,
    pub total_original_bytes: u64,
    pub total_saved_bytes: u64,
    pub processed_count: usize,
    pub error_count: usize,
    /// True when the run was cancelled before all files were started
    pub cancelled: bool,
}

impl BatchJob {
    pub fn overall_reduction_percent(&self) -> f64 {
        if self.total_original_bytes > 0 {
            (self.total_saved_bytes as f64 / self.total_original_bytes as f64) * 100.0
        } else {
            0.0
        }
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Processed: {} files | Errors: {} | Total saved: {} ({:.2}%)",
            self.processed_count,
            self.error_count,
            FileManager::format_size(self.total_saved_bytes),
            self.overall_reduction_percent()
        )
    }
}
