//! # Optimizer Module
//!
//! Modulo che separa le responsabilità dell'orchestrazione in sottomoduli:
//! - `batch_optimizer`: Orchestratore del run (pool di worker, aggregazione)
//! - `progress_tracker`: Totali condivisi + progress bar
//! - `path_resolver`: Calcolo deterministico delle destinazioni

pub mod batch_optimizer;
pub mod path_resolver;
pub mod progress_tracker;

pub use batch_optimizer::BatchOptimizer;
pub use path_resolver::PathResolver;
pub use progress_tracker::ProgressTracker;
