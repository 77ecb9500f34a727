//! Profile photo validation and normalization.
//!
//! An accepted upload is decoded, scaled and center-cropped to a square
//! when either side exceeds the configured dimension, then re-encoded as
//! JPEG. The result stays in memory; writing it out is the job of
//! [`ProfileForm::save`](crate::profile::ProfileForm::save).

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use phonebook_core::{PhonebookError, PhonebookResult, Settings, ValidationError};
use phonebook_forms::UploadedFile;

/// Message for uploads that are neither PNG nor JPEG.
pub const INVALID_TYPE_MESSAGE: &str = "Images must be either PNG or JPG.";

/// Message for uploads whose bytes do not decode as the claimed format.
pub const INVALID_IMAGE_MESSAGE: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";

/// Limits applied to profile photos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhotoConfig {
    /// Largest accepted upload, in bytes.
    pub max_upload_size: u64,
    /// Side length of the square larger photos are cropped to.
    pub dimension: u32,
    /// JPEG quality (1-100) of the re-encoded photo.
    pub jpeg_quality: u8,
}

impl PhotoConfig {
    /// Reads the photo limits from settings.
    pub const fn from_settings(settings: &Settings) -> Self {
        Self {
            max_upload_size: settings.max_photo_upload_size,
            dimension: settings.photo_dimension,
            jpeg_quality: settings.photo_jpeg_quality,
        }
    }
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// A validated photo, re-encoded as JPEG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedPhoto {
    /// JPEG bytes.
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Builds the "too large" message for a byte limit.
///
/// The megabyte figure is `max / 1024 / 1024 - 1` in integer arithmetic,
/// so an 8 MiB limit reads "smaller than 7MB".
pub fn size_limit_message(max_upload_size: u64) -> String {
    let megabytes = i64::try_from(max_upload_size / 1024 / 1024).unwrap_or(i64::MAX) - 1;
    format!("Please use images smaller than {megabytes}MB.")
}

/// Validates an optional upload and normalizes it.
///
/// Returns `Ok(None)` when nothing was uploaded. User-facing rejections
/// come back as [`PhonebookError::ValidationError`]; any other error means
/// the processing itself failed.
pub async fn clean_photo(
    file: Option<&UploadedFile>,
    config: &PhotoConfig,
) -> PhonebookResult<Option<ProcessedPhoto>> {
    let Some(file) = file else {
        return Ok(None);
    };

    let format = match file.content_type.as_str() {
        "image/png" => ImageFormat::Png,
        "image/jpeg" => ImageFormat::Jpeg,
        _ => return Err(ValidationError::new(INVALID_TYPE_MESSAGE, "invalid_type").into()),
    };

    if u64::try_from(file.size).unwrap_or(u64::MAX) > config.max_upload_size {
        return Err(ValidationError::new(size_limit_message(config.max_upload_size), "too_large")
            .with_param("max_bytes", config.max_upload_size.to_string())
            .into());
    }

    let content = file.content.clone();
    let config = *config;
    let photo = tokio::task::spawn_blocking(move || normalize(&content, format, &config))
        .await
        .map_err(|e| PhonebookError::ImageError(format!("photo task failed: {e}")))??;

    tracing::debug!(
        name = %file.name,
        bytes = photo.bytes.len(),
        width = photo.width,
        height = photo.height,
        "processed profile photo"
    );
    Ok(Some(photo))
}

/// Decodes, crops and re-encodes. Runs on a blocking thread.
fn normalize(
    content: &[u8],
    format: ImageFormat,
    config: &PhotoConfig,
) -> PhonebookResult<ProcessedPhoto> {
    let image = image::load_from_memory_with_format(content, format)
        .map_err(|_| ValidationError::new(INVALID_IMAGE_MESSAGE, "invalid_image"))?;

    let side = config.dimension;
    let image: DynamicImage = if image.width() > side || image.height() > side {
        image.resize_to_fill(side, side, FilterType::Lanczos3)
    } else {
        image
    };

    let rgb = image.to_rgb8();
    let mut bytes = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, config.jpeg_quality))
        .map_err(|e| PhonebookError::ImageError(format!("JPEG encoding failed: {e}")))?;

    Ok(ProcessedPhoto {
        bytes,
        width: rgb.width(),
        height: rgb.height(),
    })
}
