//! Pre-upload image normalization.
//!
//! The coordinator only needs `normalize(bytes) -> bytes`; the default
//! implementation shrinks images to fit a bounding box and re-encodes them as
//! RGB JPEG.

use async_trait::async_trait;
use bytes::Bytes;
use image::{ImageError, codecs::jpeg::JpegEncoder, imageops::FilterType};
use thiserror::Error;

use crate::config::NormalizerConfig;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("empty input")]
    Empty,
    #[error("image could not be processed: {0}")]
    Image(#[from] ImageError),
    #[error("normalization task failed: {0}")]
    Task(String),
}

#[async_trait]
pub trait Normalizer: Send + Sync {
    async fn normalize(&self, input: Bytes) -> Result<Bytes, NormalizeError>;

    /// Content type of everything this normalizer emits, if it re-encodes.
    fn output_content_type(&self) -> Option<&str> {
        None
    }

    /// File extension matching `output_content_type`, without the dot.
    fn output_extension(&self) -> Option<&str> {
        None
    }
}

/// Resize-to-fit and JPEG re-encode using the `image` crate.
#[derive(Clone, Debug)]
pub struct ImageNormalizer {
    config: NormalizerConfig,
}

impl ImageNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    fn normalize_blocking(config: &NormalizerConfig, input: &[u8]) -> Result<Vec<u8>, NormalizeError> {
        if input.is_empty() {
            return Err(NormalizeError::Empty);
        }
        let mut img = image::load_from_memory(input)?;
        if img.width() > config.max_width || img.height() > config.max_height {
            img = img.resize(config.max_width, config.max_height, FilterType::Lanczos3);
        }

        let rgb = img.to_rgb8();
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, config.jpeg_quality).encode_image(&rgb)?;
        Ok(out)
    }
}

#[async_trait]
impl Normalizer for ImageNormalizer {
    async fn normalize(&self, input: Bytes) -> Result<Bytes, NormalizeError> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || Self::normalize_blocking(&config, &input))
            .await
            .map_err(|err| NormalizeError::Task(err.to_string()))?
            .map(Bytes::from)
    }

    fn output_content_type(&self) -> Option<&str> {
        Some("image/jpeg")
    }

    fn output_extension(&self) -> Option<&str> {
        Some("jpg")
    }
}
