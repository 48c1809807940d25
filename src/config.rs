//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione di un run di ottimizzazione.
//!
//! ## Responsabilità:
//! - Definisce la struct `OptimizationConfig` con tutti i parametri per-run
//! - Fornisce validazione robusta dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `mode`: Lossless, Balanced o Maximum
//! - `quality`: Qualità JPEG (60-100, usata solo in modalità Balanced)
//! - `remove_metadata`: Elimina EXIF dall'output (il profilo ICC non viene mai toccato)
//! - `use_external_encoder`: Preferisce cjpeg/djpeg esterni al codec in-process
//! - `naming_template`: Template nome output con {name}, {date}, {counter}
//! - `output_root`: Directory di output (default: None = accanto al sorgente)
//! - `preserve_subfolders`: Rispecchia le sottocartelle sotto output_root
//! - `overwrite_in_place`: Sovrascrive i file sorgente
//! - `workers`: Numero di worker paralleli
//!
//! ## Validazione:
//! - Controlla che quality sia 60-100
//! - Controlla che workers sia > 0
//! - Controlla che il template contenga solo placeholder riconosciuti
//! - Controlla che output_root esista e sia una directory

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The upper cap on concurrent workers, regardless of hardware parallelism.
pub const MAX_WORKERS: usize = 8;

/// Quality bounds accepted for Balanced mode.
pub const MIN_QUALITY: u8 = 60;
pub const MAX_QUALITY: u8 = 100;

/// Default pool size: hardware parallelism bounded by [`MAX_WORKERS`].
pub fn default_workers() -> usize {
    num_cpus::get().min(MAX_WORKERS)
}

/// How aggressively each file gets recompressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationMode {
    /// Structural transcode only: Huffman optimization + progressive rewrite,
    /// pixel data untouched
    Lossless,
    /// Decode and re-encode at the configured quality
    Balanced,
    /// Decode and re-encode at quality 70 with coarse chroma subsampling
    Maximum,
}

impl std::fmt::Display for OptimizationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lossless => write!(f, "Lossless"),
            Self::Balanced => write!(f, "Balanced"),
            Self::Maximum => write!(f, "Maximum"),
        }
    }
}

/// Immutable per-run settings for JPEG optimization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationConfig {
    /// Compression mode applied to every file of the run
    pub mode: OptimizationMode,
    /// JPEG quality (60-100), meaningful in Balanced mode only
    pub quality: u8,
    /// Strip EXIF from the output (ICC color profiles are always kept)
    pub remove_metadata: bool,
    /// Prefer the external cjpeg/djpeg pair when available
    pub use_external_encoder: bool,
    /// Output filename template with {name}, {date}, {counter} placeholders
    pub naming_template: String,
    /// Output directory (None = each file's own directory)
    pub output_root: Option<PathBuf>,
    /// Mirror the source subfolder layout under the output root
    pub preserve_subfolders: bool,
    /// Write results over the source files, bypassing naming and conflicts
    pub overwrite_in_place: bool,
    /// Number of parallel workers
    pub workers: usize,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            mode: OptimizationMode::Balanced,
            quality: 85,
            remove_metadata: false,
            use_external_encoder: true,
            naming_template: "{name}_optimized".to_string(),
            output_root: None,
            preserve_subfolders: true,
            overwrite_in_place: false,
            workers: default_workers(),
        }
    }
}

impl OptimizationConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.quality < MIN_QUALITY || self.quality > MAX_QUALITY {
            return Err(anyhow::anyhow!(
                "JPEG quality must be between {} and {}",
                MIN_QUALITY,
                MAX_QUALITY
            ));
        }

        if self.workers == 0 {
            return Err(anyhow::anyhow!("Number of workers must be greater than 0"));
        }

        Self::validate_template(&self.naming_template)?;

        // Validate output root if specified
        if let Some(ref output_root) = self.output_root {
            if !output_root.exists() {
                return Err(anyhow::anyhow!(
                    "Output path does not exist: {}",
                    output_root.display()
                ));
            }
            if !output_root.is_dir() {
                return Err(anyhow::anyhow!(
                    "Output path is not a directory: {}",
                    output_root.display()
                ));
            }
        }

        Ok(())
    }

    /// Checks that a naming template only uses recognized placeholders and
    /// cannot produce an empty or path-traversing filename.
    fn validate_template(template: &str) -> Result<()> {
        if template.trim().is_empty() {
            return Err(anyhow::anyhow!("Naming template must not be empty"));
        }
        if template.contains('/') || template.contains('\\') {
            return Err(anyhow::anyhow!(
                "Naming template must not contain path separators: {template}"
            ));
        }

        let mut rest = template;
        while let Some(open) = rest.find('{') {
            let Some(close) = rest[open..].find('}') else {
                return Err(anyhow::anyhow!(
                    "Unterminated placeholder in naming template: {template}"
                ));
            };
            let token = &rest[open + 1..open + close];
            if !matches!(token, "name" | "date" | "counter") {
                return Err(anyhow::anyhow!(
                    "Unknown placeholder {{{token}}} in naming template (expected {{name}}, {{date}} or {{counter}})"
                ));
            }
            rest = &rest[open + close + 1..];
        }

        Ok(())
    }

    /// Load configuration from file
    pub async fn from_file(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: OptimizationConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &PathBuf) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
