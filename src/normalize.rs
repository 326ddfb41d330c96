//! Intake normalization: decode, constrain, re-encode, preview.
//!
//! Every submitted file passes through [`normalize`] exactly once. The
//! output payload is what gets shipped to the analysis provider; the
//! preview is a small rendition for display, owned by the item until
//! removal.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

use crate::error::IntakeError;
use crate::types::{RawImage, MAX_DIMENSION};

/// Longest side of the preview rendition.
const PREVIEW_DIMENSION: u32 = 256;

/// Tunables for one intake path.
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Larger dimension is scaled down to this bound; images already
    /// within bounds are not upscaled.
    pub max_dimension: u32,
    /// JPEG quality factor, 1-100. A transport-size tunable, not a
    /// correctness requirement.
    pub quality: u8,
}

impl NormalizeOptions {
    /// Batch file intake: quality 70.
    pub fn batch() -> Self {
        Self {
            max_dimension: MAX_DIMENSION,
            quality: 70,
        }
    }

    /// Live-capture intake: quality 80.
    pub fn capture() -> Self {
        Self {
            max_dimension: MAX_DIMENSION,
            quality: 80,
        }
    }
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self::batch()
    }
}

/// Owning guard over a displayable preview rendition.
///
/// Deliberately not `Clone`: the owning item releases the preview exactly
/// once, when the handle drops at item removal or batch clear.
#[derive(Debug)]
pub struct PreviewHandle {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
    released: Arc<AtomicBool>,
}

/// Observer for a preview's release, detached from the handle's lifetime.
#[derive(Debug, Clone)]
pub struct PreviewProbe {
    released: Arc<AtomicBool>,
}

impl PreviewProbe {
    /// Whether the observed preview has been released.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl PreviewHandle {
    fn new(bytes: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            bytes,
            width,
            height,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Encoded JPEG bytes of the preview.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Probe that outlives the handle and flips when it is released.
    pub fn probe(&self) -> PreviewProbe {
        PreviewProbe {
            released: Arc::clone(&self.released),
        }
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// A normalized intake: transport payload plus preview.
#[derive(Debug)]
pub struct NormalizedImage {
    /// Re-encoded JPEG payload for the provider call.
    pub payload: Vec<u8>,
    pub preview: PreviewHandle,
    /// Dimensions after the resize policy was applied.
    pub width: u32,
    pub height: u32,
}

/// Normalize one raw input into `(payload, preview)`.
///
/// Rejects non-image content types before decoding. Preserves aspect
/// ratio; if either dimension exceeds `max_dimension` the image is scaled
/// so the larger dimension equals the bound. No preview is allocated when
/// decoding fails.
pub fn normalize(
    raw: &RawImage,
    options: &NormalizeOptions,
) -> Result<NormalizedImage, IntakeError> {
    if !raw.mime.trim().starts_with("image/") {
        return Err(IntakeError::InvalidInput(raw.mime.clone()));
    }

    let decoded =
        image::load_from_memory(&raw.bytes).map_err(|e| IntakeError::Decode(e.to_string()))?;

    let (w, h) = (decoded.width(), decoded.height());
    let constrained = if w.max(h) > options.max_dimension {
        decoded.resize(
            options.max_dimension,
            options.max_dimension,
            FilterType::Triangle,
        )
    } else {
        decoded
    };

    let payload = encode_jpeg(&constrained, options.quality)?;

    let thumb = constrained.thumbnail(PREVIEW_DIMENSION, PREVIEW_DIMENSION);
    let preview_bytes = encode_jpeg(&thumb, options.quality)?;
    let preview = PreviewHandle::new(preview_bytes, thumb.width(), thumb.height());

    Ok(NormalizedImage {
        payload,
        width: constrained.width(),
        height: constrained.height(),
        preview,
    })
}

fn encode_jpeg(img: &image::DynamicImage, quality: u8) -> Result<Vec<u8>, IntakeError> {
    let mut cursor = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut cursor, quality);
    // JPEG has no alpha channel; flatten first.
    img.to_rgb8()
        .write_with_encoder(encoder)
        .map_err(|e| IntakeError::Encode(e.to_string()))?;
    Ok(cursor.into_inner())
}
