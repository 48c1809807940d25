//! # JPG Optimizer Pro - Main Entry Point
//!
//! Punto di ingresso dell'applicazione CLI.
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI (input, modalità, qualità, template, etc.)
//! 2. Configura il logging (INFO o DEBUG a seconda del flag verbose)
//! 3. Valida che gli input esistano e crea la directory di output se serve
//! 4. Costruisce `OptimizationConfig` e avvia il `BatchOptimizer`
//!
//! ## Esempio di utilizzo:
//! ```bash
//! jpg-optimizer ./photos --mode balanced --quality 85 --output ./optimized
//! ```

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::info;

use jpg_optimizer_pro::{
    config::default_workers, BatchOptimizer, OptimizationConfig, OptimizationMode,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Huffman optimization + progressive rewrite, no quality loss
    Lossless,
    /// Re-encode at the configured quality
    Balanced,
    /// Re-encode at quality 70 with coarse chroma subsampling
    Maximum,
}

impl From<ModeArg> for OptimizationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Lossless => Self::Lossless,
            ModeArg::Balanced => Self::Balanced,
            ModeArg::Maximum => Self::Maximum,
        }
    }
}

#[derive(Parser)]
#[command(name = "jpg-optimizer")]
#[command(about = "Recompress JPEG images, preserving ICC color profiles and (optionally) EXIF")]
struct Args {
    /// JPEG files or directories to optimize
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Optimization mode
    #[arg(short, long, value_enum, default_value = "balanced")]
    mode: ModeArg,

    /// JPEG quality for balanced mode (60-100)
    #[arg(short, long, default_value = "85")]
    quality: u8,

    /// Strip EXIF metadata (ICC color profiles are always kept)
    #[arg(long)]
    remove_metadata: bool,

    /// Do not use the external cjpeg/djpeg encoder even when installed
    #[arg(long)]
    no_external_encoder: bool,

    /// Output filename template; placeholders: {name}, {date}, {counter}
    #[arg(short, long, default_value = "{name}_optimized")]
    template: String,

    /// Output directory (default: next to each source file)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Do not mirror source subfolders under the output directory
    #[arg(long)]
    flatten: bool,

    /// Overwrite the source files in place
    #[arg(long)]
    overwrite: bool,

    /// Number of parallel workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    // Validate arguments
    for input in &args.inputs {
        if !input.exists() {
            return Err(anyhow::anyhow!("Input does not exist: {}", input.display()));
        }
    }

    // Validate and create output directory if specified
    if let Some(ref output_dir) = args.output {
        if !output_dir.exists() {
            std::fs::create_dir_all(output_dir)?;
            info!("Created output directory: {}", output_dir.display());
        }
        if !output_dir.is_dir() {
            return Err(anyhow::anyhow!(
                "Output path is not a directory: {}",
                output_dir.display()
            ));
        }
    }

    let config = OptimizationConfig {
        mode: args.mode.into(),
        quality: args.quality,
        remove_metadata: args.remove_metadata,
        use_external_encoder: !args.no_external_encoder,
        naming_template: args.template,
        output_root: args.output,
        preserve_subfolders: !args.flatten,
        overwrite_in_place: args.overwrite,
        workers: args.workers.unwrap_or_else(default_workers),
    };

    let optimizer = BatchOptimizer::new(config)?;
    optimizer.run(&args.inputs).await?;

    Ok(())
}
