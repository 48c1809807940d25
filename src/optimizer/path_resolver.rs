//! # Path Resolution Module
//!
//! Centralizza il calcolo deterministico delle destinazioni di output:
//! template di naming, mirroring delle sottocartelle, risoluzione conflitti.
//! Il controllo collisioni è serializzato tramite un set di prenotazioni,
//! così due worker non possono mai scegliere lo stesso path disambiguato.

use crate::config::OptimizationConfig;
use crate::error::OptimizeError;
use crate::job::FileCounter;
use chrono::Local;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// Computes a unique destination for every source file of one run.
pub struct PathResolver {
    config: OptimizationConfig,
    /// Run timestamp substituted for `{date}`, fixed at construction
    run_stamp: String,
    /// Canonicalized directory inputs, used for subfolder mirroring
    roots: Vec<PathBuf>,
    /// Destinations already promised to workers this run
    reserved: Mutex<HashSet<PathBuf>>,
}

impl PathResolver {
    /// Builds the resolver for one run. `inputs` are the originally selected
    /// paths; their directories become the mirroring roots.
    pub fn new(config: OptimizationConfig, inputs: &[PathBuf]) -> Self {
        let roots = inputs
            .iter()
            .filter(|path| path.is_dir())
            .map(|path| path.canonicalize().unwrap_or_else(|_| path.clone()))
            .collect();

        Self {
            config,
            run_stamp: Local::now().format("%Y%m%d_%H%M%S").to_string(),
            roots,
            reserved: Mutex::new(HashSet::new()),
        }
    }

    /// Resolves the destination for one source file.
    ///
    /// The shared counter is claimed atomically; the collision check runs
    /// under the reservation lock so concurrent workers always end up with
    /// distinct paths.
    pub async fn resolve(
        &self,
        source: &Path,
        counter: &FileCounter,
    ) -> Result<PathBuf, OptimizeError> {
        if self.config.overwrite_in_place {
            return Ok(source.to_path_buf());
        }

        let stem = source
            .file_stem()
            .ok_or_else(|| {
                OptimizeError::Input(format!("invalid file name: {}", source.display()))
            })?
            .to_string_lossy()
            .to_string();
        let extension = source.extension().and_then(|e| e.to_str()).unwrap_or("jpg");

        let output_dir = self.output_dir_for(source);
        let counter_value = counter.next();
        let name = self
            .config
            .naming_template
            .replace("{name}", &stem)
            .replace("{date}", &self.run_stamp)
            .replace("{counter}", &format!("{counter_value:04}"));

        let mut reserved = self.reserved.lock().await;
        let mut destination = output_dir.join(format!("{name}.{extension}"));
        let mut suffix = 1;
        while destination != source && (destination.exists() || reserved.contains(&destination)) {
            destination = output_dir.join(format!("{name}_{suffix}.{extension}"));
            suffix += 1;
        }
        reserved.insert(destination.clone());

        debug!(
            "Resolved output path: {} -> {}",
            source.display(),
            destination.display()
        );
        Ok(destination)
    }

    /// Picks the destination directory: the output root (optionally mirroring
    /// the source position under its selected root) or the source's own
    /// directory.
    fn output_dir_for(&self, source: &Path) -> PathBuf {
        let source_dir = source.parent().unwrap_or(Path::new("")).to_path_buf();
        let Some(ref output_root) = self.config.output_root else {
            return source_dir;
        };

        if self.config.preserve_subfolders {
            let canonical = source.canonicalize().unwrap_or_else(|_| source.to_path_buf());
            for root in &self.roots {
                if let Ok(relative) = canonical.strip_prefix(root) {
                    let relative_dir = relative.parent().unwrap_or(Path::new(""));
                    return output_root.join(relative_dir);
                }
            }
        }
        output_root.clone()
    }
}
