//! # Metadata Preservation Module
//!
//! Questo modulo garantisce che i metadati critici sopravvivano alla
//! ricompressione, anche quando i passaggi di decode/encode esterni li
//! eliminano dal container.
//!
//! ## Responsabilità:
//! - Estrazione del profilo colore ICC dai byte originali (scansione marker)
//! - Ricostruzione dei segmenti `APP2` multi-chunk e re-iniezione dopo SOI
//! - Passthrough EXIF (`APP1`) governato dalla configurazione
//! - Validazione dei blob EXIF con `kamadak-exif` prima della re-iniezione
//!
//! ## Regole:
//! - L'estrazione ICC avviene sui byte *originali*, prima di qualsiasi decode
//!   esterno che lo eliminerebbe
//! - L'iniezione ICC avviene sui byte *finali*, come ultima trasformazione
//!   prima del confronto dimensioni
//! - Ogni fallimento di lettura/scrittura metadata degrada in silenzio a
//!   "nessun metadata in output", mai un errore fatale
//!
//! ## Formato segmento ICC (`APP2`):
//! ```text
//! FFE2 | length (2 byte, include se stesso) | "ICC_PROFILE\0" (12 byte)
//!      | numero chunk (1 byte, da 1) | totale chunk (1 byte) | dati (<= 65519)
//! ```

use crate::error::OptimizeError;
use tracing::{debug, warn};

/// Start-Of-Image marker: every valid JPEG stream begins with these two bytes.
pub const SOI: [u8; 2] = [0xFF, 0xD8];

const APP1: u8 = 0xE1;
const APP2: u8 = 0xE2;
const SOS: u8 = 0xDA;
const EOI: u8 = 0xD9;

/// Signature opening every ICC `APP2` payload, NUL terminator included.
const ICC_SIGNATURE: &[u8] = b"ICC_PROFILE\0";

/// Identifier opening every EXIF `APP1` payload.
const EXIF_SIGNATURE: &[u8] = b"Exif\0\0";

/// Maximum profile data per ICC chunk: the 16-bit segment length counts
/// itself (2 bytes) plus the 14-byte signature/sequence/total header.
pub const MAX_ICC_CHUNK: usize = 65519;

/// The chunk-count field is a single byte, so a profile can span at most
/// 255 chunks (~16 MB, far beyond any real-world profile).
const MAX_ICC_CHUNKS: usize = 255;

/// Walks the marker segments between SOI and the start of entropy-coded data,
/// returning `(marker, payload)` pairs. Tolerates fill bytes and standalone
/// markers; stops silently on anything malformed.
fn scan_segments(bytes: &[u8]) -> Vec<(u8, &[u8])> {
    let mut segments = Vec::new();
    if bytes.len() < 4 || bytes[..2] != SOI {
        return segments;
    }

    let mut pos = 2;
    while pos + 2 <= bytes.len() {
        if bytes[pos] != 0xFF {
            break;
        }
        let marker = bytes[pos + 1];
        if marker == 0xFF {
            // fill byte before the real marker
            pos += 1;
            continue;
        }
        if marker == SOS || marker == EOI {
            break;
        }
        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            // standalone markers carry no length field
            pos += 2;
            continue;
        }
        if pos + 4 > bytes.len() {
            break;
        }
        let length = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        if length < 2 || pos + 2 + length > bytes.len() {
            break;
        }
        segments.push((marker, &bytes[pos + 4..pos + 2 + length]));
        pos += 2 + length;
    }

    segments
}

/// Extracts the embedded ICC profile from a JPEG stream, reassembling
/// multi-chunk `APP2` payloads in ascending sequence order.
///
/// Returns `None` when no profile is present or the stream is malformed;
/// never fails.
pub fn extract_icc(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut chunks: Vec<(u8, &[u8])> = Vec::new();

    for (marker, payload) in scan_segments(bytes) {
        if marker == APP2 && payload.len() >= 14 && payload[..12] == *ICC_SIGNATURE {
            let sequence = payload[12];
            if sequence == 0 {
                // sequence numbers are 1-based; zero means a broken writer
                continue;
            }
            chunks.push((sequence, &payload[14..]));
        }
    }

    if chunks.is_empty() {
        return None;
    }

    chunks.sort_by_key(|(sequence, _)| *sequence);
    let mut profile = Vec::with_capacity(chunks.iter().map(|(_, d)| d.len()).sum());
    for (_, data) in chunks {
        profile.extend_from_slice(data);
    }
    Some(profile)
}

/// Extracts the raw EXIF blob (TIFF-ordered, identifier stripped) from the
/// first `APP1` segment carrying one. Returns `None` on absence; never fails.
pub fn extract_exif(bytes: &[u8]) -> Option<Vec<u8>> {
    for (marker, payload) in scan_segments(bytes) {
        if marker == APP1 && payload.len() > EXIF_SIGNATURE.len() && payload[..6] == *EXIF_SIGNATURE
        {
            return Some(payload[EXIF_SIGNATURE.len()..].to_vec());
        }
    }
    None
}

/// Builds the complete `APP2` marker block for a profile as a pure function
/// over explicit chunk boundaries.
///
/// Chunks carry an incrementing 1-based sequence number and a shared total
/// count, each at most [`MAX_ICC_CHUNK`] data bytes, concatenated in ascending
/// order. Returns `None` for an empty profile or one that would exceed the
/// 255-chunk limit.
pub fn build_icc_segments(profile: &[u8]) -> Option<Vec<u8>> {
    if profile.is_empty() {
        return None;
    }
    let total_chunks = profile.len().div_ceil(MAX_ICC_CHUNK);
    if total_chunks > MAX_ICC_CHUNKS {
        warn!(
            "ICC profile of {} bytes exceeds the {}-chunk limit, not embedding",
            profile.len(),
            MAX_ICC_CHUNKS
        );
        return None;
    }

    let mut block = Vec::with_capacity(profile.len() + total_chunks * 18);
    for (index, chunk) in profile.chunks(MAX_ICC_CHUNK).enumerate() {
        let segment_length = (2 + ICC_SIGNATURE.len() + 2 + chunk.len()) as u16;
        block.extend_from_slice(&[0xFF, APP2]);
        block.extend_from_slice(&segment_length.to_be_bytes());
        block.extend_from_slice(ICC_SIGNATURE);
        block.push((index + 1) as u8);
        block.push(total_chunks as u8);
        block.extend_from_slice(chunk);
    }
    Some(block)
}

/// Inserts an ICC profile into a JPEG stream immediately after SOI.
///
/// Metadata-only: pixel data is never touched, so the operation is lossless.
/// Input that does not begin with SOI is returned unchanged (a guard, not an
/// error). Callers apply this once per output; re-applying would duplicate
/// the markers.
pub fn inject_icc(jpeg: &[u8], profile: &[u8]) -> Vec<u8> {
    if jpeg.len() < 2 || jpeg[..2] != SOI {
        return jpeg.to_vec();
    }
    let Some(block) = build_icc_segments(profile) else {
        return jpeg.to_vec();
    };

    debug!(
        "Embedding {}-byte ICC profile ({} chunk segments)",
        profile.len(),
        profile.len().div_ceil(MAX_ICC_CHUNK)
    );
    let mut out = Vec::with_capacity(jpeg.len() + block.len());
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(&block);
    out.extend_from_slice(&jpeg[2..]);
    out
}

/// Inserts a raw EXIF blob as a single `APP1` segment after SOI.
///
/// EXIF has no chunking protocol, so a blob too large for one segment is
/// dropped with a warning. Non-JPEG input is returned unchanged.
fn inject_exif(jpeg: &[u8], blob: &[u8]) -> Vec<u8> {
    if jpeg.len() < 2 || jpeg[..2] != SOI {
        return jpeg.to_vec();
    }
    let payload_length = EXIF_SIGNATURE.len() + blob.len();
    if payload_length + 2 > u16::MAX as usize {
        warn!(
            "EXIF blob of {} bytes does not fit a single APP1 segment, dropping it",
            blob.len()
        );
        return jpeg.to_vec();
    }

    let mut out = Vec::with_capacity(jpeg.len() + payload_length + 4);
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(&[0xFF, APP1]);
    out.extend_from_slice(&((payload_length + 2) as u16).to_be_bytes());
    out.extend_from_slice(EXIF_SIGNATURE);
    out.extend_from_slice(blob);
    out.extend_from_slice(&jpeg[2..]);
    out
}

/// Checks that a candidate EXIF blob actually parses before committing it to
/// an output container.
fn validate_exif(blob: &[u8]) -> Result<(), OptimizeError> {
    exif::Reader::new()
        .read_raw(blob.to_vec())
        .map(|_| ())
        .map_err(|e| OptimizeError::Metadata(format!("EXIF blob does not parse: {e}")))
}

/// Applies the EXIF decision to freshly encoded output.
///
/// With `remove_metadata` set nothing is written regardless of the source.
/// Otherwise the source blob is validated and re-wrapped into the target;
/// any failure degrades silently to "no EXIF in output".
pub fn preserve_exif(remove_metadata: bool, source_exif: Option<&[u8]>, target: &[u8]) -> Vec<u8> {
    if remove_metadata {
        return target.to_vec();
    }
    let Some(blob) = source_exif else {
        return target.to_vec();
    };
    if let Err(e) = validate_exif(blob) {
        warn!("{e}, dropping EXIF from the output");
        return target.to_vec();
    }
    inject_exif(target, blob)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Minimal valid JPEG (1x1 pixel) used as an injection target.
    const MINIMAL_JPEG: &[u8] = &[
        0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01, 0x01, 0x00, 0x00,
        0x01, 0x00, 0x01, 0x00, 0x00, 0xFF, 0xDB, 0x00, 0x43, 0x00, 0x08, 0x06, 0x06, 0x07, 0x06,
        0x05, 0x08, 0x07, 0x07, 0x07, 0x09, 0x09, 0x08, 0x0A, 0x0C, 0x14, 0x0D, 0x0C, 0x0B, 0x0B,
        0x0C, 0x19, 0x12, 0x13, 0x0F, 0x14, 0x1D, 0x1A, 0x1F, 0x1E, 0x1D, 0x1A, 0x1C, 0x1C, 0x20,
        0x24, 0x2E, 0x27, 0x20, 0x22, 0x2C, 0x23, 0x1C, 0x1C, 0x28, 0x37, 0x29, 0x2C, 0x30, 0x31,
        0x34, 0x34, 0x34, 0x1F, 0x27, 0x39, 0x3D, 0x38, 0x32, 0x3C, 0x2E, 0x33, 0x34, 0x32, 0xFF,
        0xC0, 0x00, 0x0B, 0x08, 0x00, 0x01, 0x00, 0x01, 0x01, 0x01, 0x11, 0x00, 0xFF, 0xC4, 0x00,
        0x1F, 0x00, 0x00, 0x01, 0x05, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B,
        0xFF, 0xC4, 0x00, 0xB5, 0x10, 0x00, 0x02, 0x01, 0x03, 0x03, 0x02, 0x04, 0x03, 0x05, 0x05,
        0x04, 0x04, 0x00, 0x00, 0x01, 0x7D, 0x01, 0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12, 0x21,
        0x31, 0x41, 0x06, 0x13, 0x51, 0x61, 0x07, 0x22, 0x71, 0x14, 0x32, 0x81, 0x91, 0xA1, 0x08,
        0x23, 0x42, 0xB1, 0xC1, 0x15, 0x52, 0xD1, 0xF0, 0x24, 0x33, 0x62, 0x72, 0x82, 0x09, 0x0A,
        0x16, 0x17, 0x18, 0x19, 0x1A, 0x25, 0x26, 0x27, 0x28, 0x29, 0x2A, 0x34, 0x35, 0x36, 0x37,
        0x38, 0x39, 0x3A, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0x4A, 0x53, 0x54, 0x55, 0x56,
        0x57, 0x58, 0x59, 0x5A, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69, 0x6A, 0x73, 0x74, 0x75,
        0x76, 0x77, 0x78, 0x79, 0x7A, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89, 0x8A, 0x92, 0x93,
        0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9A, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7, 0xA8, 0xA9,
        0xAA, 0xB2, 0xB3, 0xB4, 0xB5, 0xB6, 0xB7, 0xB8, 0xB9, 0xBA, 0xC2, 0xC3, 0xC4, 0xC5, 0xC6,
        0xC7, 0xC8, 0xC9, 0xCA, 0xD2, 0xD3, 0xD4, 0xD5, 0xD6, 0xD7, 0xD8, 0xD9, 0xDA, 0xE1, 0xE2,
        0xE3, 0xE4, 0xE5, 0xE6, 0xE7, 0xE8, 0xE9, 0xEA, 0xF1, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6, 0xF7,
        0xF8, 0xF9, 0xFA, 0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00, 0xFB, 0xD5,
        0xDB, 0x20, 0xA8, 0xF1, 0x7E, 0xFF, 0xD9,
    ];

    // Smallest meaningful EXIF body: TIFF header + one ASCII Make entry.
    const EXIF_FIXTURE: &[u8] = &[
        0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00, // II, 42, IFD at 8
        0x01, 0x00, // one entry
        0x0F, 0x01, 0x02, 0x00, 0x04, 0x00, 0x00, 0x00, // Make, ASCII, count 4
        0x61, 0x62, 0x63, 0x00, // "abc\0" inline
        0x00, 0x00, 0x00, 0x00, // no next IFD
    ];

    fn sample_profile(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_icc_round_trip_single_chunk() {
        let profile = sample_profile(1024);
        let tagged = inject_icc(MINIMAL_JPEG, &profile);

        assert_eq!(tagged[..2], SOI);
        // the APP2 block sits immediately after SOI
        assert_eq!(tagged[2], 0xFF);
        assert_eq!(tagged[3], APP2);
        assert_eq!(extract_icc(&tagged), Some(profile));
    }

    #[test]
    fn test_icc_round_trip_multi_chunk() {
        let profile = sample_profile(150_000); // forces three chunks
        let tagged = inject_icc(MINIMAL_JPEG, &profile);
        assert_eq!(extract_icc(&tagged), Some(profile));
    }

    #[test]
    fn test_chunk_builder_boundaries() {
        let single = build_icc_segments(&sample_profile(MAX_ICC_CHUNK)).unwrap();
        assert_eq!(single[12 + 4], 1); // sequence
        assert_eq!(single[13 + 4], 1); // total
        assert_eq!(single.len(), 4 + 14 + MAX_ICC_CHUNK);

        let double = build_icc_segments(&sample_profile(MAX_ICC_CHUNK + 1)).unwrap();
        let first_segment_len = 4 + 14 + MAX_ICC_CHUNK;
        assert_eq!(double[16], 1);
        assert_eq!(double[17], 2);
        assert_eq!(double[first_segment_len + 16], 2);
        assert_eq!(double[first_segment_len + 17], 2);
        assert_eq!(double.len(), first_segment_len + 4 + 14 + 1);
    }

    #[test]
    fn test_chunk_builder_rejects_oversized_profile() {
        assert!(build_icc_segments(&sample_profile(MAX_ICC_CHUNK * 256)).is_none());
        assert!(build_icc_segments(&[]).is_none());
    }

    #[test]
    fn test_inject_icc_requires_soi() {
        let not_jpeg = b"definitely not a jpeg".to_vec();
        assert_eq!(inject_icc(&not_jpeg, &sample_profile(64)), not_jpeg);
        assert_eq!(inject_icc(&[], &sample_profile(64)), Vec::<u8>::new());
    }

    #[test]
    fn test_extract_icc_absent() {
        assert_eq!(extract_icc(MINIMAL_JPEG), None);
        assert_eq!(extract_icc(b"garbage"), None);
    }

    #[test]
    fn test_exif_round_trip() {
        let tagged = inject_exif(MINIMAL_JPEG, EXIF_FIXTURE);
        assert_eq!(extract_exif(&tagged).as_deref(), Some(EXIF_FIXTURE));
        assert_eq!(extract_exif(MINIMAL_JPEG), None);
    }

    #[test]
    fn test_preserve_exif_remove_mode() {
        let out = preserve_exif(true, Some(EXIF_FIXTURE), MINIMAL_JPEG);
        assert_eq!(out, MINIMAL_JPEG);
        assert_eq!(extract_exif(&out), None);
    }

    #[test]
    fn test_preserve_exif_keeps_valid_blob() {
        let out = preserve_exif(false, Some(EXIF_FIXTURE), MINIMAL_JPEG);
        assert_eq!(extract_exif(&out).as_deref(), Some(EXIF_FIXTURE));
    }

    #[test]
    fn test_preserve_exif_drops_unparsable_blob() {
        let out = preserve_exif(false, Some(b"not exif data"), MINIMAL_JPEG);
        assert_eq!(out, MINIMAL_JPEG);
    }

    #[test]
    fn test_icc_survives_exif_injection() {
        let profile = sample_profile(2048);
        let with_exif = preserve_exif(false, Some(EXIF_FIXTURE), MINIMAL_JPEG);
        let with_both = inject_icc(&with_exif, &profile);

        assert_eq!(extract_icc(&with_both), Some(profile));
        assert_eq!(extract_exif(&with_both).as_deref(), Some(EXIF_FIXTURE));
    }
}
