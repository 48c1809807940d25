//! # Recompression Engine Module
//!
//! Il cuore della pipeline: macchina a stati delle tre modalità + size-guard.
//!
//! ## Pipeline per singolo file:
//! 1. Lettura e probe del sorgente (`SourceImage`): byte, dimensioni, ICC,
//!    EXIF — tutto estratto dai byte *originali*, prima di qualsiasi decode
//!    esterno che eliminerebbe i metadati
//! 2. Ricompressione secondo la modalità configurata
//! 3. Riparazione metadati: EXIF secondo configurazione, poi ICC come ultima
//!    trasformazione
//! 4. Size-guard: se il candidato non è più piccolo, vincono i byte originali
//! 5. Scrittura della destinazione
//!
//! ## Modalità:
//! - **Lossless**: jpegtran `-optimize -progressive -copy all|none`; con
//!   `-copy none` il profilo ICC viene re-iniettato a valle. Fallback senza
//!   jpegtran: re-encode in-process a qualità 100
//! - **Balanced**: decode → unsharp opzionale → encode alla qualità scelta
//! - **Maximum**: come Balanced con qualità fissa 70 e chroma 4:2:0

use crate::compressor::{self, Compressor, EncodeParams};
use crate::config::{OptimizationConfig, OptimizationMode};
use crate::error::OptimizeError;
use crate::job::OptimizationResult;
use crate::metadata;
use image::ImageDecoder;
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, warn};

/// Quality used by Maximum mode
pub const MAXIMUM_MODE_QUALITY: u8 = 70;

/// Quality used when Lossless mode falls back to a decode/re-encode
const LOSSLESS_FALLBACK_QUALITY: u8 = 100;

/// Read-only view of one input, built once per file before any encode step.
#[derive(Debug, Clone)]
pub struct SourceImage {
    /// The untouched source stream
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// ICC profile extracted from the original bytes
    pub icc_profile: Option<Vec<u8>>,
    /// Raw EXIF blob extracted from the original bytes
    pub exif: Option<Vec<u8>>,
}

impl SourceImage {
    /// Reads and probes one input file. Fails before any encode attempt when
    /// the file is unreadable or not a JPEG.
    pub async fn read(path: &Path) -> Result<Self, OptimizeError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| OptimizeError::Input(format!("failed to read {}: {e}", path.display())))?;
        Self::from_bytes(bytes)
    }

    /// Builds the view from in-memory bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, OptimizeError> {
        if bytes.len() < 2 || bytes[..2] != metadata::SOI {
            return Err(OptimizeError::Input(
                "not a JPEG stream (missing SOI marker)".to_string(),
            ));
        }

        // header-only probe; corrupt streams fail here, not mid-encode
        let decoder = image::codecs::jpeg::JpegDecoder::new(Cursor::new(&bytes))?;
        let (width, height) = decoder.dimensions();

        let icc_profile = metadata::extract_icc(&bytes);
        let exif = metadata::extract_exif(&bytes);

        Ok(Self {
            bytes,
            width,
            height,
            icc_profile,
            exif,
        })
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Per-run engine: one mode, one compressor, applied independently per file.
pub struct RecompressionEngine {
    config: OptimizationConfig,
    compressor: Compressor,
}

impl RecompressionEngine {
    /// Builds the engine, probing tool availability once for the whole run.
    pub async fn new(config: OptimizationConfig) -> Self {
        let compressor = Compressor::select(&config).await;
        Self { config, compressor }
    }

    /// Full pipeline for one file on disk.
    pub async fn process_file(
        &self,
        source_path: &Path,
        destination: &Path,
    ) -> Result<OptimizationResult, OptimizeError> {
        let source = SourceImage::read(source_path).await?;
        self.process_source(&source, source_path, destination).await
    }

    /// Full pipeline for an already-loaded source (also the entry point for
    /// in-memory inputs).
    pub async fn process_source(
        &self,
        source: &SourceImage,
        source_path: &Path,
        destination: &Path,
    ) -> Result<OptimizationResult, OptimizeError> {
        let candidate = match self.config.mode {
            OptimizationMode::Lossless => self.recompress_lossless(source).await?,
            OptimizationMode::Balanced => {
                self.recompress_lossy(source, self.config.quality).await?
            }
            OptimizationMode::Maximum => {
                self.recompress_lossy(source, MAXIMUM_MODE_QUALITY).await?
            }
        };

        self.publish(source, source_path, destination, candidate)
            .await
    }

    /// Lossless mode: structural transcode, falling back to a maximum-quality
    /// re-encode when jpegtran is not installed.
    async fn recompress_lossless(&self, source: &SourceImage) -> Result<Vec<u8>, OptimizeError> {
        if compressor::jpegtran_available().await {
            let keep_markers = !self.config.remove_metadata;
            let mut out = compressor::lossless_transcode(&source.bytes, keep_markers).await?;
            if !keep_markers {
                // `-copy none` also dropped the color profile; put it back
                if let Some(ref icc) = source.icc_profile {
                    out = metadata::inject_icc(&out, icc);
                }
            }
            return Ok(out);
        }

        warn!("jpegtran not found, falling back to in-process re-encode at quality 100");
        self.recompress_lossy_with(Compressor::Library, source, LOSSLESS_FALLBACK_QUALITY)
            .await
    }

    /// Lossy path shared by Balanced and Maximum: encode, then repair the
    /// metadata the encode path stripped.
    async fn recompress_lossy(
        &self,
        source: &SourceImage,
        quality: u8,
    ) -> Result<Vec<u8>, OptimizeError> {
        self.recompress_lossy_with(self.compressor, source, quality)
            .await
    }

    async fn recompress_lossy_with(
        &self,
        compressor: Compressor,
        source: &SourceImage,
        quality: u8,
    ) -> Result<Vec<u8>, OptimizeError> {
        let params = EncodeParams::for_quality(quality);
        let encoded = compressor.recompress(&source.bytes, params).await?;

        let with_exif =
            metadata::preserve_exif(self.config.remove_metadata, source.exif.as_deref(), &encoded);
        // ICC re-injection is the last transformation before the size guard
        Ok(match source.icc_profile {
            Some(ref icc) => metadata::inject_icc(&with_exif, icc),
            None => with_exif,
        })
    }

    /// Size-guard + write: the candidate only wins when strictly smaller than
    /// the original; otherwise the original bytes stand and zero savings are
    /// reported.
    async fn publish(
        &self,
        source: &SourceImage,
        source_path: &Path,
        destination: &Path,
        candidate: Vec<u8>,
    ) -> Result<OptimizationResult, OptimizeError> {
        let original_size = source.size();
        let candidate_size = candidate.len() as u64;

        if candidate_size >= original_size {
            debug!(
                "Recompression did not shrink {} ({} -> {} bytes), keeping the original",
                source_path.display(),
                original_size,
                candidate_size
            );
            if destination != source_path {
                write_output(destination, &source.bytes).await?;
            }
            // in-place: the source file is simply left untouched
            return Ok(OptimizationResult::kept_original(
                source_path,
                destination,
                original_size,
            ));
        }

        write_output(destination, &candidate).await?;
        Ok(OptimizationResult::optimized(
            source_path,
            destination,
            original_size,
            candidate_size,
        ))
    }
}

/// Writes final bytes, creating parent directories as needed. Failures here
/// are filesystem errors for that file only.
async fn write_output(path: &Path, bytes: &[u8]) -> Result<(), OptimizeError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                OptimizeError::Filesystem(format!(
                    "failed to create directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| OptimizeError::Filesystem(format!("failed to write {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::encode_rgb;
    use crate::job::FileOutcome;
    use image::RgbImage;
    use tempfile::TempDir;

    fn library_config(mode: OptimizationMode) -> OptimizationConfig {
        OptimizationConfig {
            mode,
            use_external_encoder: false,
            ..Default::default()
        }
    }

    fn gradient_jpeg(width: u32, height: u32, quality: u8) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
        });
        encode_rgb(&img, EncodeParams::for_quality(quality)).unwrap()
    }

    const EXIF_FIXTURE: &[u8] = &[
        0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00, 0x01, 0x00, 0x0F, 0x01, 0x02, 0x00, 0x04,
        0x00, 0x00, 0x00, 0x61, 0x62, 0x63, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];

    #[test]
    fn test_source_image_rejects_non_jpeg() {
        assert!(SourceImage::from_bytes(b"plain text".to_vec()).is_err());
        assert!(SourceImage::from_bytes(Vec::new()).is_err());
        // SOI followed by garbage still fails the header probe
        let mut broken = vec![0xFF, 0xD8];
        broken.extend_from_slice(&[0x00; 32]);
        assert!(SourceImage::from_bytes(broken).is_err());
    }

    #[test]
    fn test_source_image_probes_dimensions_and_metadata() {
        let bare = gradient_jpeg(48, 32, 85);
        let tagged = metadata::inject_icc(
            &metadata::preserve_exif(false, Some(EXIF_FIXTURE), &bare),
            b"fake-icc-profile-payload",
        );

        let source = SourceImage::from_bytes(tagged).unwrap();
        assert_eq!((source.width, source.height), (48, 32));
        assert_eq!(source.icc_profile.as_deref(), Some(&b"fake-icc-profile-payload"[..]));
        assert_eq!(source.exif.as_deref(), Some(EXIF_FIXTURE));
    }

    #[tokio::test]
    async fn test_balanced_mode_shrinks_high_quality_input() {
        let temp = TempDir::new().unwrap();
        let source_path = temp.path().join("photo.jpg");
        let dest_path = temp.path().join("photo_optimized.jpg");
        tokio::fs::write(&source_path, gradient_jpeg(256, 256, 100))
            .await
            .unwrap();

        let engine = RecompressionEngine::new(OptimizationConfig {
            quality: 70,
            ..library_config(OptimizationMode::Balanced)
        })
        .await;
        let result = engine.process_file(&source_path, &dest_path).await.unwrap();

        assert_eq!(result.outcome, FileOutcome::Optimized);
        assert!(result.final_size < result.original_size);
        assert_eq!(
            tokio::fs::metadata(&dest_path).await.unwrap().len(),
            result.final_size
        );
    }

    #[tokio::test]
    async fn test_size_guard_invariant_holds_on_recompressed_input() {
        let temp = TempDir::new().unwrap();
        let first_dest = temp.path().join("pass1.jpg");
        let second_dest = temp.path().join("pass2.jpg");
        let source_path = temp.path().join("photo.jpg");
        tokio::fs::write(&source_path, gradient_jpeg(200, 200, 95))
            .await
            .unwrap();

        let engine = RecompressionEngine::new(library_config(OptimizationMode::Maximum)).await;
        engine.process_file(&source_path, &first_dest).await.unwrap();

        // second pass over already-optimized output: never grows
        let result = engine.process_file(&first_dest, &second_dest).await.unwrap();
        assert!(result.final_size <= result.original_size);
        if result.outcome == FileOutcome::KeptOriginal {
            let original = tokio::fs::read(&first_dest).await.unwrap();
            let published = tokio::fs::read(&second_dest).await.unwrap();
            assert_eq!(original, published);
            assert_eq!(result.bytes_saved, 0);
        }
    }

    #[tokio::test]
    async fn test_size_guard_leaves_in_place_source_untouched() {
        let temp = TempDir::new().unwrap();
        let source_path = temp.path().join("tiny.jpg");
        // a 1x1 input: recompression overhead cannot beat it
        tokio::fs::write(&source_path, gradient_jpeg(1, 1, 70))
            .await
            .unwrap();
        let before = tokio::fs::read(&source_path).await.unwrap();

        let engine = RecompressionEngine::new(OptimizationConfig {
            quality: 100,
            overwrite_in_place: true,
            ..library_config(OptimizationMode::Balanced)
        })
        .await;
        let result = engine.process_file(&source_path, &source_path).await.unwrap();

        let after = tokio::fs::read(&source_path).await.unwrap();
        assert!(result.final_size <= result.original_size);
        if result.outcome == FileOutcome::KeptOriginal {
            assert_eq!(before, after);
        }
    }

    #[tokio::test]
    async fn test_exif_kept_and_icc_always_survives() {
        let temp = TempDir::new().unwrap();
        let source_path = temp.path().join("tagged.jpg");
        let bare = gradient_jpeg(300, 300, 100);
        let tagged = metadata::inject_icc(
            &metadata::preserve_exif(false, Some(EXIF_FIXTURE), &bare),
            b"srgb-profile-bytes",
        );
        tokio::fs::write(&source_path, &tagged).await.unwrap();

        // keep metadata
        let keep_dest = temp.path().join("keep.jpg");
        let engine = RecompressionEngine::new(OptimizationConfig {
            quality: 60,
            ..library_config(OptimizationMode::Balanced)
        })
        .await;
        let result = engine.process_file(&source_path, &keep_dest).await.unwrap();
        assert_eq!(result.outcome, FileOutcome::Optimized);

        let published = tokio::fs::read(&keep_dest).await.unwrap();
        assert_eq!(metadata::extract_exif(&published).as_deref(), Some(EXIF_FIXTURE));
        assert_eq!(
            metadata::extract_icc(&published).as_deref(),
            Some(&b"srgb-profile-bytes"[..])
        );

        // remove metadata: EXIF gone, ICC still present
        let strip_dest = temp.path().join("strip.jpg");
        let engine = RecompressionEngine::new(OptimizationConfig {
            quality: 60,
            remove_metadata: true,
            ..library_config(OptimizationMode::Balanced)
        })
        .await;
        let result = engine.process_file(&source_path, &strip_dest).await.unwrap();
        assert_eq!(result.outcome, FileOutcome::Optimized);

        let published = tokio::fs::read(&strip_dest).await.unwrap();
        assert_eq!(metadata::extract_exif(&published), None);
        assert_eq!(
            metadata::extract_icc(&published).as_deref(),
            Some(&b"srgb-profile-bytes"[..])
        );
    }

    #[tokio::test]
    async fn test_corrupt_input_fails_before_encode() {
        let temp = TempDir::new().unwrap();
        let source_path = temp.path().join("corrupt.jpg");
        let dest_path = temp.path().join("out.jpg");
        tokio::fs::write(&source_path, b"\xFF\xD8 truncated nonsense")
            .await
            .unwrap();

        let engine = RecompressionEngine::new(library_config(OptimizationMode::Balanced)).await;
        let result = engine.process_file(&source_path, &dest_path).await;

        assert!(result.is_err());
        assert!(!dest_path.exists());
    }
}
