//! # Compressor Module
//!
//! Questo modulo incapsula i collaboratori di encode/decode come una capacità
//! polimorfa con due varianti, selezionata una volta per run:
//!
//! - **Library**: decode con il crate `image` + encode in-process con il
//!   crate `mozjpeg` (qualità, subsampling e progressive controllabili),
//!   eseguito dentro `spawn_blocking`
//! - **ExternalTool**: coppia djpeg/cjpeg esterna con file PPM intermedio,
//!   preferita quando disponibile perché produce output più piccoli a parità
//!   di qualità percepita
//!
//! Qui vive anche il transcoder lossless (`jpegtran`) usato dalla modalità
//! Lossless. Ogni invocazione esterna ha un timeout e pulisce i propri file
//! temporanei tramite `TempDir` sia in successo che in errore.
//!
//! Nessuna variante scrive metadati: EXIF e ICC vengono riparati a valle dal
//! modulo `metadata` sui byte finali.

use crate::args;
use crate::config::OptimizationConfig;
use crate::error::OptimizeError;
use crate::platform::PlatformCommands;
use image::RgbImage;
use mozjpeg::{ColorSpace, Compress};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Deadline for every external tool invocation; exceeding it is a failure,
/// not a hang.
pub const EXTERNAL_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// Quality at and above which chroma keeps full resolution
pub const FULL_CHROMA_QUALITY: u8 = 90;

/// Unsharp mask compensating for 4:2:0 softening (applied below quality 90)
const UNSHARP_SIGMA: f32 = 0.5;
const UNSHARP_THRESHOLD: i32 = 2;

/// Chroma resolution written by the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromaSubsampling {
    /// 4:4:4, full color resolution
    Full,
    /// 4:2:0, quarter color resolution
    Quarter,
}

/// Per-encode parameters derived from the effective quality
#[derive(Debug, Clone, Copy)]
pub struct EncodeParams {
    pub quality: u8,
    pub subsampling: ChromaSubsampling,
    pub sharpen: bool,
}

impl EncodeParams {
    /// Cross-mode policy: quality >= 90 keeps 4:4:4 chroma and skips
    /// sharpening; anything below subsamples to 4:2:0 and applies a light
    /// unsharp mask to counteract the perceptual softening.
    pub fn for_quality(quality: u8) -> Self {
        if quality >= FULL_CHROMA_QUALITY {
            Self {
                quality,
                subsampling: ChromaSubsampling::Full,
                sharpen: false,
            }
        } else {
            Self {
                quality,
                subsampling: ChromaSubsampling::Quarter,
                sharpen: true,
            }
        }
    }
}

/// The lossy encode capability, selected once per run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compressor {
    /// In-process decode/encode via the `image` and `mozjpeg` crates
    Library,
    /// External djpeg/cjpeg pair with a PPM intermediate
    ExternalTool,
}

impl Compressor {
    /// Picks the variant from configuration and probed tool availability.
    pub async fn select(config: &OptimizationConfig) -> Self {
        if config.use_external_encoder {
            let platform = PlatformCommands::instance();
            if platform.is_command_available("cjpeg").await
                && platform.is_command_available("djpeg").await
            {
                info!("🚀 Using the external cjpeg/djpeg encoder pair");
                return Self::ExternalTool;
            }
            warn!("cjpeg/djpeg not found, using the in-process codec");
        }
        Self::Library
    }

    /// Decodes the original stream and re-encodes it with the given
    /// parameters. The result carries no metadata segments.
    pub async fn recompress(
        &self,
        original: &[u8],
        params: EncodeParams,
    ) -> Result<Vec<u8>, OptimizeError> {
        match self {
            Self::Library => {
                let bytes = original.to_vec();
                tokio::task::spawn_blocking(move || encode_in_process(&bytes, params))
                    .await
                    .map_err(|e| OptimizeError::Input(format!("JPEG codec task failed: {e}")))?
            }
            Self::ExternalTool => encode_with_tools(original, params).await,
        }
    }
}

/// In-process pipeline: decode, normalize the color mode, optionally sharpen,
/// encode.
fn encode_in_process(original: &[u8], params: EncodeParams) -> Result<Vec<u8>, OptimizeError> {
    let decoded = image::load_from_memory_with_format(original, image::ImageFormat::Jpeg)?;
    // Alpha, palette and CMYK inputs all land here as non-RGB buffers; the
    // output container only supports plain three-channel color.
    let mut rgb = decoded.into_rgb8();
    if params.sharpen {
        rgb = image::imageops::unsharpen(&rgb, UNSHARP_SIGMA, UNSHARP_THRESHOLD);
    }
    encode_rgb(&rgb, params)
}

/// Encodes an RGB buffer with mozjpeg: progressive scans, optimized Huffman
/// tables, explicit chroma sampling.
pub(crate) fn encode_rgb(rgb: &RgbImage, params: EncodeParams) -> Result<Vec<u8>, OptimizeError> {
    let (width, height) = rgb.dimensions();

    let mut compress = Compress::new(ColorSpace::JCS_RGB);
    compress.set_size(width as usize, height as usize);
    compress.set_quality(params.quality as f32);
    compress.set_progressive_mode();
    compress.set_optimize_scans(true);
    let sampling = match params.subsampling {
        ChromaSubsampling::Full => ((1, 1), (1, 1)),
        ChromaSubsampling::Quarter => ((2, 2), (2, 2)),
    };
    compress.set_chroma_sampling_pixel_sizes(sampling.0, sampling.1);

    let mut started = compress
        .start_compress(Vec::new())
        .map_err(|e| OptimizeError::Input(format!("failed to start JPEG encode: {e}")))?;
    started
        .write_scanlines(rgb.as_raw())
        .map_err(|e| OptimizeError::Input(format!("failed to write scanlines: {e}")))?;
    started
        .finish()
        .map_err(|e| OptimizeError::Input(format!("failed to finish JPEG encode: {e}")))
}

/// External pipeline: djpeg decodes to a temporary PPM, cjpeg re-encodes it.
/// All intermediates live in a scoped temp directory.
async fn encode_with_tools(
    original: &[u8],
    params: EncodeParams,
) -> Result<Vec<u8>, OptimizeError> {
    let platform = PlatformCommands::instance();
    let workdir = tempfile::tempdir()?;
    let input = workdir.path().join("input.jpg");
    let pixmap = workdir.path().join("decoded.ppm");
    let output = workdir.path().join("output.jpg");

    tokio::fs::write(&input, original).await?;

    // decode first: djpeg drops every metadata segment along the way
    let djpeg = platform.resolve_tool("djpeg");
    run_tool(
        "djpeg",
        &djpeg,
        &args!["-outfile", pixmap.display(), input.display()],
    )
    .await?;

    let cjpeg = platform.resolve_tool("cjpeg");
    let mut cjpeg_args = args!["-quality", params.quality];
    if params.subsampling == ChromaSubsampling::Full {
        cjpeg_args.extend(args!["-sample", "1x1"]);
    }
    cjpeg_args.extend(args![
        "-progressive",
        "-optimize",
        "-outfile",
        output.display(),
        pixmap.display()
    ]);
    run_tool("cjpeg", &cjpeg, &cjpeg_args).await?;

    Ok(tokio::fs::read(&output).await?)
}

/// Checks whether the lossless transcoder can be invoked.
pub async fn jpegtran_available() -> bool {
    PlatformCommands::instance()
        .is_command_available("jpegtran")
        .await
}

/// Structural transcode of a compressed stream: Huffman optimization +
/// progressive rewrite, no pixel decode. `keep_markers` maps to jpegtran's
/// `-copy all`/`-copy none`; `none` also strips the ICC profile, which the
/// caller re-injects afterwards.
pub async fn lossless_transcode(
    original: &[u8],
    keep_markers: bool,
) -> Result<Vec<u8>, OptimizeError> {
    let platform = PlatformCommands::instance();
    if !platform.is_command_available("jpegtran").await {
        return Err(OptimizeError::MissingDependency("jpegtran".to_string()));
    }

    let workdir = tempfile::tempdir()?;
    let input = workdir.path().join("input.jpg");
    let output = workdir.path().join("output.jpg");
    tokio::fs::write(&input, original).await?;

    let copy_mode = if keep_markers { "all" } else { "none" };
    let jpegtran = platform.resolve_tool("jpegtran");
    run_tool(
        "jpegtran",
        &jpegtran,
        &args![
            "-optimize",
            "-progressive",
            "-copy",
            copy_mode,
            "-outfile",
            output.display(),
            input.display()
        ],
    )
    .await?;

    Ok(tokio::fs::read(&output).await?)
}

/// Runs one external tool under the shared timeout. Non-zero exit and
/// timeouts both surface as `Tool` failures carrying the diagnostic.
async fn run_tool(name: &str, tool: &Path, tool_args: &[String]) -> Result<(), OptimizeError> {
    debug!("Running {} {:?}", tool.display(), tool_args);

    let child = Command::new(tool)
        .args(tool_args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| OptimizeError::Tool(format!("failed to spawn {name}: {e}")))?;

    let output = tokio::time::timeout(EXTERNAL_TOOL_TIMEOUT, child.wait_with_output())
        .await
        .map_err(|_| {
            OptimizeError::Tool(format!(
                "{name} timed out after {}s",
                EXTERNAL_TOOL_TIMEOUT.as_secs()
            ))
        })?
        .map_err(|e| OptimizeError::Tool(format!("{name} did not complete: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(OptimizeError::Tool(format!(
            "{name} exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([
                (x % 256) as u8,
                (y % 256) as u8,
                ((x + y) % 256) as u8,
            ])
        })
    }

    #[test]
    fn test_encode_params_policy() {
        let high = EncodeParams::for_quality(90);
        assert_eq!(high.subsampling, ChromaSubsampling::Full);
        assert!(!high.sharpen);

        let low = EncodeParams::for_quality(89);
        assert_eq!(low.subsampling, ChromaSubsampling::Quarter);
        assert!(low.sharpen);
    }

    #[test]
    fn test_quality_70_beats_quality_95_on_gradient() {
        let img = gradient(1000, 1000);
        let q70 = encode_rgb(&img, EncodeParams::for_quality(70)).unwrap();
        let q95 = encode_rgb(&img, EncodeParams::for_quality(95)).unwrap();
        assert!(q70.len() < q95.len());
    }

    #[test]
    fn test_encoded_output_is_jpeg() {
        let img = gradient(32, 32);
        let bytes = encode_rgb(&img, EncodeParams::for_quality(85)).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        // decodes back to the same dimensions
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.width(), 32);
        assert_eq!(decoded.height(), 32);
    }

    #[tokio::test]
    async fn test_library_recompress_round_trip() {
        let img = gradient(64, 64);
        let original = encode_rgb(&img, EncodeParams::for_quality(95)).unwrap();

        let recompressed = Compressor::Library
            .recompress(&original, EncodeParams::for_quality(70))
            .await
            .unwrap();
        assert_eq!(&recompressed[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn test_library_recompress_rejects_garbage() {
        let result = Compressor::Library
            .recompress(b"not a jpeg at all", EncodeParams::for_quality(80))
            .await;
        assert!(result.is_err());
    }
}
