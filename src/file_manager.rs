//! # File Management Module
//!
//! Questo modulo gestisce la discovery dei file JPEG e le utilità sui file.
//!
//! ## Responsabilità:
//! - Discovery dei sorgenti: file espliciti + scansione ricorsiva delle directory
//! - Riconoscimento estensioni JPEG (case-insensitive)
//! - Lettura dimensioni file
//! - Formattazione human-readable delle dimensioni

use anyhow::Result;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;
use walkdir::WalkDir;

/// Manages file operations and JPEG discovery
pub struct FileManager;

impl FileManager {
    /// Get the size in bytes of a file
    pub async fn file_size(path: &Path) -> Result<u64> {
        let metadata = fs::metadata(path).await?;
        Ok(metadata.len())
    }

    /// Collects every JPEG reachable from the given inputs: files are taken
    /// as-is, directories are walked recursively. Inputs that do not exist
    /// are skipped with a warning.
    pub fn find_jpeg_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for input in inputs {
            if input.is_file() {
                if Self::is_jpeg(input) {
                    files.push(input.clone());
                } else {
                    warn!("Skipping non-JPEG input: {}", input.display());
                }
            } else if input.is_dir() {
                for entry in WalkDir::new(input)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                {
                    let path = entry.path();
                    if Self::is_jpeg(path) {
                        files.push(path.to_path_buf());
                    }
                }
            } else {
                warn!("Input does not exist: {}", input.display());
            }
        }

        Ok(files)
    }

    /// Check if a file has a JPEG extension
    pub fn is_jpeg(path: &Path) -> bool {
        if let Some(ext) = path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            matches!(ext_lower.as_str(), "jpg" | "jpeg")
        } else {
            false
        }
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }
}
