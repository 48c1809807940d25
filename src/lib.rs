//! # JPG Optimizer Pro Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Configurazione per-run e validazione parametri
//! - `error`: Tipi di errore custom per le diverse operazioni
//! - `metadata`: Preservazione ICC (chunking APP2) e passthrough EXIF
//! - `compressor`: Capacità di encode (in-process / tool esterni) + jpegtran
//! - `engine`: Macchina a stati delle modalità + size-guard
//! - `job`: Valori espliciti di risultato e aggregato del batch
//! - `optimizer`: Orchestratore del batch, path resolver, progress tracker
//! - `file_manager`: Discovery file JPEG e utilità
//! - `platform`: Risoluzione cross-platform dei tool esterni
//! - `progress`: Progress bar
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use jpg_optimizer_pro::{BatchOptimizer, OptimizationConfig};
//!
//! let config = OptimizationConfig::default();
//! let optimizer = BatchOptimizer::new(config)?;
//! let job = optimizer.run(&paths).await?;
//! println!("saved {} bytes", job.total_saved_bytes);
//! ```

pub mod compressor;
pub mod config;
pub mod engine;
pub mod error;
pub mod file_manager;
pub mod job;
pub mod metadata;
pub mod optimizer;
pub mod platform;
pub mod progress;
pub mod utils;

pub use config::{OptimizationConfig, OptimizationMode};
pub use engine::{RecompressionEngine, SourceImage};
pub use error::OptimizeError;
pub use job::{BatchJob, FailureKind, FileCounter, FileOutcome, OptimizationResult};
pub use optimizer::BatchOptimizer;
