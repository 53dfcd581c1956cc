//! Decoding, orientation fixes and re-encoding of photos.
//!
//! Everything leaves this module as JPEG at [`JPEG_QUALITY`], with any EXIF
//! block dropped by the re-encode.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use tracing::{debug, warn};

use crate::error::{CodecError, InputError};

pub const JPEG_QUALITY: u8 = 95;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_bytes: usize,
    pub max_dimension: u32,
}

impl Default for UploadLimits {
    fn default() -> Self {
        UploadLimits {
            max_bytes: 10 * 1024 * 1024,
            max_dimension: 1024,
        }
    }
}

/// Result of [`normalize_orientation`]. When `warning` is set the bytes are
/// the caller's input, untouched.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub bytes: Vec<u8>,
    pub orientation: Option<Orientation>,
    pub warning: Option<CodecError>,
}

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    infer::get(data).map(|kind| kind.mime_type().to_string())
}

fn reader_for(bytes: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>, CodecError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err| CodecError::Decode(err.to_string()))
}

fn decode(bytes: &[u8]) -> Result<DynamicImage, CodecError> {
    reader_for(bytes)?
        .decode()
        .map_err(|err| CodecError::Decode(err.to_string()))
}

fn decode_oriented(bytes: &[u8]) -> Result<(DynamicImage, Orientation), CodecError> {
    let mut decoder = reader_for(bytes)?
        .into_decoder()
        .map_err(|err| CodecError::Decode(err.to_string()))?;
    // Missing or unparsable EXIF leaves the pixels as stored.
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut image =
        DynamicImage::from_decoder(decoder).map_err(|err| CodecError::Decode(err.to_string()))?;
    if orientation != Orientation::NoTransforms {
        debug!("Applying EXIF orientation {:?}", orientation);
        image.apply_orientation(orientation);
    }
    Ok((image, orientation))
}

pub fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>, CodecError> {
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut output = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut output, JPEG_QUALITY);
    rgb.write_with_encoder(encoder)
        .map_err(|err| CodecError::Encode(err.to_string()))?;
    Ok(output.into_inner())
}

/// Applies the EXIF orientation (if any) and re-encodes without metadata.
/// Never fails: undecodable input comes back unchanged with a warning.
pub fn normalize_orientation(bytes: &[u8]) -> NormalizedImage {
    let result = decode_oriented(bytes)
        .and_then(|(image, orientation)| encode_jpeg(&image).map(|out| (out, orientation)));
    match result {
        Ok((out, orientation)) => NormalizedImage {
            bytes: out,
            orientation: Some(orientation),
            warning: None,
        },
        Err(err) => NormalizedImage {
            bytes: bytes.to_vec(),
            orientation: None,
            warning: Some(err),
        },
    }
}

/// Rotates 90° clockwise on an expanded canvas. Compensates the generation
/// service returning results turned 90° counter-clockwise.
pub fn rotate_clockwise_90(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    let image = decode(bytes)?;
    encode_jpeg(&image.rotate90())
}

/// Validates an incoming photo and shrinks it to fit `limits.max_dimension`.
/// Images already within bounds are returned as received.
pub fn prepare_upload(bytes: &[u8], limits: UploadLimits) -> Result<Vec<u8>, InputError> {
    if bytes.is_empty() {
        return Err(InputError::EmptyImage);
    }
    if bytes.len() > limits.max_bytes {
        return Err(InputError::TooLarge {
            size: bytes.len(),
            limit: limits.max_bytes,
        });
    }

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err| InputError::InvalidImage(err.to_string()))?;
    let format = reader.format();
    let image = reader
        .decode()
        .map_err(|err| InputError::InvalidImage(err.to_string()))?;

    if image.width() <= limits.max_dimension && image.height() <= limits.max_dimension {
        return Ok(bytes.to_vec());
    }

    let resized = image.resize(limits.max_dimension, limits.max_dimension, FilterType::Lanczos3);
    debug!(
        "Downsized upload from {}x{} to {}x{}",
        image.width(),
        image.height(),
        resized.width(),
        resized.height()
    );

    let format = format.unwrap_or(ImageFormat::Jpeg);
    if format != ImageFormat::Jpeg {
        let mut output = Cursor::new(Vec::new());
        match resized.write_to(&mut output, format) {
            Ok(()) => return Ok(output.into_inner()),
            Err(err) => warn!("Re-encoding as {:?} failed, falling back to JPEG: {err}", format),
        }
    }
    encode_jpeg(&resized).map_err(|err| InputError::InvalidImage(err.to_string()))
}
