//! Still-image transforms: NV21 to JPEG compression and thumbnail generation.
//!
//! Both collaborators are pure functions of the raw frame and their
//! parameters, exposed as traits so the notifier can be driven with other
//! encoders (or failing ones in tests).

use crate::error::{EncodeError, EncodeResult};
use crate::exif::ExifData;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, RgbImage};

/// JPEG start-of-image marker.
const SOI_MARKER: [u8; 2] = [0xFF, 0xD8];

/// Compresses a raw still frame into a JPEG image.
pub trait JpegCompressor: Send + Sync {
    /// Compress `frame` at `quality` (1..=100), embedding `exif` when given.
    fn compress(
        &self,
        frame: &[u8],
        width: u32,
        height: u32,
        quality: u8,
        exif: Option<&ExifData>,
    ) -> EncodeResult<Vec<u8>>;
}

/// Produces a downscaled JPEG thumbnail of a raw still frame.
pub trait ThumbnailGenerator: Send + Sync {
    /// Scale `frame` to `thumb_width`x`thumb_height` and compress it.
    #[allow(clippy::too_many_arguments)]
    fn generate(
        &self,
        frame: &[u8],
        width: u32,
        height: u32,
        thumb_width: u32,
        thumb_height: u32,
        quality: u8,
    ) -> EncodeResult<Vec<u8>>;
}

/// JPEG compressor for NV21 frames (Y plane followed by interleaved V/U at
/// quarter resolution).
#[derive(Debug, Clone, Copy, Default)]
pub struct Nv21JpegCompressor;

impl JpegCompressor for Nv21JpegCompressor {
    fn compress(
        &self,
        frame: &[u8],
        width: u32,
        height: u32,
        quality: u8,
        exif: Option<&ExifData>,
    ) -> EncodeResult<Vec<u8>> {
        let rgb = nv21_to_rgb(frame, width, height)?;
        let jpeg = encode_rgb(&rgb, width, height, quality)?;
        match exif {
            Some(exif) => {
                let mut exif = exif.clone();
                exif.image_size = Some((width, height));
                Ok(insert_app1(&jpeg, &exif.to_app1()?))
            }
            None => Ok(jpeg),
        }
    }
}

/// Thumbnail generator for NV21 frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct Nv21Thumbnailer;

impl ThumbnailGenerator for Nv21Thumbnailer {
    fn generate(
        &self,
        frame: &[u8],
        width: u32,
        height: u32,
        thumb_width: u32,
        thumb_height: u32,
        quality: u8,
    ) -> EncodeResult<Vec<u8>> {
        if thumb_width == 0 || thumb_height == 0 {
            return Err(EncodeError::InvalidDimensions {
                width: thumb_width,
                height: thumb_height,
            });
        }
        let rgb = nv21_to_rgb(frame, width, height)?;
        let image = RgbImage::from_raw(width, height, rgb)
            .ok_or(EncodeError::InvalidDimensions { width, height })?;
        let thumb = imageops::resize(&image, thumb_width, thumb_height, FilterType::Triangle);
        encode_rgb(thumb.as_raw(), thumb_width, thumb_height, quality)
    }
}

/// Size in bytes of an NV21 frame.
#[must_use]
pub const fn nv21_frame_size(width: u32, height: u32) -> usize {
    let luma = width as usize * height as usize;
    luma + luma / 2
}

/// Convert an NV21 frame to packed 24-bit RGB.
pub fn nv21_to_rgb(frame: &[u8], width: u32, height: u32) -> EncodeResult<Vec<u8>> {
    if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
        return Err(EncodeError::InvalidDimensions { width, height });
    }
    let expected = nv21_frame_size(width, height);
    if frame.len() < expected {
        return Err(EncodeError::FrameTooSmall {
            expected,
            actual: frame.len(),
        });
    }

    let w = width as usize;
    let h = height as usize;
    let (luma, chroma) = frame.split_at(w * h);
    let mut rgb = Vec::with_capacity(w * h * 3);

    for (row, luma_row) in luma.chunks_exact(w).enumerate() {
        let chroma_row = chroma.get((row / 2) * w..(row / 2 + 1) * w).unwrap_or_default();
        for (col, &y) in luma_row.iter().enumerate() {
            let pair = col & !1;
            // NV21 stores V before U.
            let v = chroma_row.get(pair).copied().unwrap_or(128);
            let u = chroma_row.get(pair + 1).copied().unwrap_or(128);
            let (r, g, b) = yuv_to_rgb(y, u, v);
            rgb.extend_from_slice(&[r, g, b]);
        }
    }

    Ok(rgb)
}

fn encode_rgb(rgb: &[u8], width: u32, height: u32, quality: u8) -> EncodeResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    encoder.encode(rgb, width, height, ExtendedColorType::Rgb8)?;
    Ok(out)
}

/// Splice an APP1 segment in directly after the SOI marker.
fn insert_app1(jpeg: &[u8], app1: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(jpeg.len() + app1.len());
    match jpeg.strip_prefix(&SOI_MARKER) {
        Some(rest) => {
            out.extend_from_slice(&SOI_MARKER);
            out.extend_from_slice(app1);
            out.extend_from_slice(rest);
        }
        None => out.extend_from_slice(jpeg),
    }
    out
}

/// Convert YUV values to RGB.
///
/// Uses the ITU-R BT.601 conversion formula.
#[must_use]
#[allow(clippy::many_single_char_names)]
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y_f = f32::from(y);
    let u_f = f32::from(u) - 128.0;
    let v_f = f32::from(v) - 128.0;

    let r = 1.402f32.mul_add(v_f, y_f);
    let g = 0.714_14f32.mul_add(-v_f, 0.344_14f32.mul_add(-u_f, y_f));
    let b = 1.772f32.mul_add(u_f, y_f);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let clamp = |val: f32| -> u8 { val.clamp(0.0, 255.0) as u8 };

    (clamp(r), clamp(g), clamp(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::CameraParameters;

    fn solid_nv21(width: u32, height: u32, y: u8, u: u8, v: u8) -> Vec<u8> {
        let luma = (width * height) as usize;
        let mut frame = vec![y; luma];
        for _ in 0..luma / 4 {
            frame.extend_from_slice(&[v, u]);
        }
        frame
    }

    #[test]
    fn test_frame_size() {
        assert_eq!(nv21_frame_size(640, 480), 460_800);
    }

    #[test]
    fn test_gray_converts_to_gray() {
        let frame = solid_nv21(4, 2, 128, 128, 128);
        let rgb = nv21_to_rgb(&frame, 4, 2).expect("conversion should succeed");
        assert_eq!(rgb.len(), 4 * 2 * 3);
        assert!(rgb.iter().all(|&c| c == 128));
    }

    #[test]
    fn test_chroma_order_is_v_then_u() {
        // Strong V (red difference) with neutral U must come out red.
        let frame = solid_nv21(2, 2, 81, 90, 240);
        let rgb = nv21_to_rgb(&frame, 2, 2).expect("conversion should succeed");
        let (r, g, b) = (rgb[0], rgb[1], rgb[2]);
        assert!(r > 200 && g < 60 && b < 60, "expected red, got ({r}, {g}, {b})");
    }

    #[test]
    fn test_rejects_short_frame() {
        let result = nv21_to_rgb(&[0; 10], 4, 4);
        assert!(matches!(
            result,
            Err(EncodeError::FrameTooSmall {
                expected: 24,
                actual: 10
            })
        ));
    }

    #[test]
    fn test_rejects_odd_dimensions() {
        let result = nv21_to_rgb(&[0; 64], 3, 4);
        assert!(matches!(result, Err(EncodeError::InvalidDimensions { .. })));
    }

    #[test]
    fn test_compress_produces_decodable_jpeg() {
        let frame = solid_nv21(32, 16, 200, 128, 128);
        let jpeg = Nv21JpegCompressor
            .compress(&frame, 32, 16, 90, None)
            .expect("compression should succeed");
        assert_eq!(jpeg[..2], SOI_MARKER);
        assert_eq!(jpeg[jpeg.len() - 2..], [0xFF, 0xD9]);

        let decoded = image::load_from_memory(&jpeg).expect("decodable JPEG");
        assert_eq!((decoded.width(), decoded.height()), (32, 16));
    }

    #[test]
    fn test_compress_embeds_exif_after_soi() {
        let frame = solid_nv21(16, 16, 60, 128, 128);
        let exif = ExifData::from_parameters(&CameraParameters::new());
        let jpeg = Nv21JpegCompressor
            .compress(&frame, 16, 16, 75, Some(&exif))
            .expect("compression should succeed");
        assert_eq!(jpeg[..4], [0xFF, 0xD8, 0xFF, 0xE1]);
        assert_eq!(&jpeg[6..12], b"Exif\0\0");
        assert!(image::load_from_memory(&jpeg).is_ok());
    }

    #[test]
    fn test_thumbnail_dimensions() {
        let frame = solid_nv21(64, 48, 100, 128, 128);
        let thumb = Nv21Thumbnailer
            .generate(&frame, 64, 48, 16, 12, 90)
            .expect("thumbnail should succeed");
        let decoded = image::load_from_memory(&thumb).expect("decodable thumbnail");
        assert_eq!((decoded.width(), decoded.height()), (16, 12));
    }

    #[test]
    fn test_thumbnail_rejects_zero_size() {
        let frame = solid_nv21(8, 8, 100, 128, 128);
        let result = Nv21Thumbnailer.generate(&frame, 8, 8, 0, 4, 90);
        assert!(matches!(result, Err(EncodeError::InvalidDimensions { .. })));
    }

    #[test]
    fn test_insert_app1_without_soi_leaves_input() {
        let data = [1u8, 2, 3];
        assert_eq!(insert_app1(&data, &[0xFF, 0xE1, 0, 2]), data.to_vec());
    }
}
