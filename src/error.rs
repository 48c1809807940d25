//! # Error Types Module
//!
//! Questo modulo definisce i tipi di errore custom dell'applicazione.
//!
//! ## Categorie di errori:
//! - `Io` / `Image` / `Input`: sorgente illeggibile o non-JPEG (abortisce solo quel file)
//! - `Tool`: transcoder/encoder esterno fallito o in timeout (abortisce solo quel file)
//! - `Metadata`: lettura/scrittura ICC/EXIF fallita (mai fatale, degrada in silenzio)
//! - `Filesystem`: destinazione non creabile o non scrivibile (abortisce solo quel file)
//! - `MissingDependency`: tool esterno mancante
//! - `Validation`: configurazione non valida (abortisce l'intero run prima di processare)

/// Custom error types for JPEG optimization
#[derive(thiserror::Error, Debug)]
pub enum OptimizeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image decode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("unreadable input: {0}")]
    Input(String),

    #[error("external tool failed: {0}")]
    Tool(String),

    #[error("metadata error: {0}")]
    Metadata(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("dependency missing: {0}")]
    MissingDependency(String),

    #[error("configuration error: {0}")]
    Validation(String),
}
