//! Image decoding and objective quality metrics.
//!
//! Everything here is pure and synchronous. Callers on the async runtime
//! should run [`analyze`] inside `spawn_blocking`.

use image::{DynamicImage, GenericImageView, ImageFormat};
use tracing::warn;

use crate::models::target::ImageMetrics;

/// Raw Laplacian variance is divided by this to keep scores in a readable range.
const BLUR_NORMALIZATION: f64 = 1000.0;

/// Images with a longer side than this are flagged in the logs.
const LARGE_IMAGE_DIM: u32 = 2000;

/// Upper bound on pixels inspected for colour depth.
const COLOR_DEPTH_SAMPLES: usize = 1000;

const LAPLACIAN: [[f64; 3]; 3] = [[0.0, 1.0, 0.0], [1.0, -4.0, 1.0], [0.0, 1.0, 0.0]];

/// Codecs tried in order when the format cannot be sniffed.
const FALLBACK_FORMATS: [ImageFormat; 3] = [ImageFormat::Jpeg, ImageFormat::Png, ImageFormat::WebP];

/// Decode bytes into an image, returning it with the name of the codec used.
pub fn decode(bytes: &[u8]) -> Result<(DynamicImage, String), CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::Empty);
    }

    let generic_err = match image::guess_format(bytes) {
        Ok(format) => match image::load_from_memory_with_format(bytes, format) {
            Ok(img) => return Ok((img, format_name(format))),
            Err(e) => e,
        },
        Err(e) => e,
    };

    for format in FALLBACK_FORMATS {
        if let Ok(img) = image::load_from_memory_with_format(bytes, format) {
            return Ok((img, format_name(format)));
        }
    }

    Err(CodecError::Decode(generic_err))
}

fn format_name(format: ImageFormat) -> String {
    match format {
        ImageFormat::Jpeg => "jpeg".to_string(),
        ImageFormat::Png => "png".to_string(),
        ImageFormat::WebP => "webp".to_string(),
        other => other
            .extensions_str()
            .first()
            .map(|ext| ext.to_string())
            .unwrap_or_else(|| format!("{:?}", other).to_lowercase()),
    }
}

/// Decode and compute `{format, width, height, blurScore, colorDepth}`.
pub fn analyze(bytes: &[u8]) -> Result<ImageMetrics, CodecError> {
    let (img, format) = decode(bytes)?;
    Ok(metrics_for(&img, format))
}

/// Compute metrics for an already decoded image.
pub fn metrics_for(img: &DynamicImage, format: String) -> ImageMetrics {
    let (width, height) = img.dimensions();
    if width.max(height) > LARGE_IMAGE_DIM {
        warn!(width, height, "Large image, consider downsizing before analysis");
    }

    ImageMetrics {
        format,
        width,
        height,
        blur_score: blur_score(img),
        color_depth: color_depth(img),
    }
}

/// Row-major Rec. 709 luminance of every pixel.
fn luminance(img: &DynamicImage) -> (Vec<f64>, usize, usize) {
    let rgba = img.to_rgba8();
    let (w, h) = (rgba.width() as usize, rgba.height() as usize);
    let gray = rgba
        .pixels()
        .map(|p| 0.2126 * p[0] as f64 + 0.7152 * p[1] as f64 + 0.0722 * p[2] as f64)
        .collect();
    (gray, w, h)
}

/// Variance of the 3x3 Laplacian response over interior pixels.
///
/// Returns 0 when the image has no interior (either side under 3 px).
pub fn laplacian_variance(gray: &[f64], w: usize, h: usize) -> f64 {
    if w < 3 || h < 3 {
        return 0.0;
    }

    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let mut count = 0usize;

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let mut val = 0.0;
            for (ky, row) in LAPLACIAN.iter().enumerate() {
                for (kx, k) in row.iter().enumerate() {
                    if *k != 0.0 {
                        val += k * gray[(y + ky - 1) * w + (x + kx - 1)];
                    }
                }
            }
            sum += val;
            sum_sq += val * val;
            count += 1;
        }
    }

    let n = count as f64;
    let mean = sum / n;
    sum_sq / n - mean * mean
}

/// Normalised Laplacian variance. Higher is sharper; never NaN or infinite.
pub fn blur_score(img: &DynamicImage) -> f64 {
    let (gray, w, h) = luminance(img);
    let score = laplacian_variance(&gray, w, h) / BLUR_NORMALIZATION;
    if score.is_finite() {
        score
    } else {
        0.0
    }
}

/// Bits per channel: 16 if any sampled channel exceeds the 8-bit range once
/// expressed in a 16-bit colour model, else 8.
///
/// 8-bit sources are widened by replication (`v * 257`), so any non-zero
/// colour channel in the sample reports 16.
pub fn color_depth(img: &DynamicImage) -> u8 {
    let (w, h) = img.dimensions();
    let max = match img {
        DynamicImage::ImageLuma16(buf) => buf
            .pixels()
            .take(COLOR_DEPTH_SAMPLES)
            .map(|p| p[0])
            .max(),
        DynamicImage::ImageLumaA16(buf) => buf
            .pixels()
            .take(COLOR_DEPTH_SAMPLES)
            .map(|p| p[0])
            .max(),
        DynamicImage::ImageRgb16(buf) => buf
            .pixels()
            .take(COLOR_DEPTH_SAMPLES)
            .flat_map(|p| p.0)
            .max(),
        DynamicImage::ImageRgba16(buf) => buf
            .pixels()
            .take(COLOR_DEPTH_SAMPLES)
            .flat_map(|p| [p[0], p[1], p[2]])
            .max(),
        _ => (0..h)
            .flat_map(|y| (0..w).map(move |x| (x, y)))
            .take(COLOR_DEPTH_SAMPLES)
            .flat_map(|(x, y)| {
                let p = img.get_pixel(x, y);
                [p[0], p[1], p[2]]
            })
            .map(|v| u16::from(v) * 257)
            .max(),
    };

    match max {
        Some(v) if v > u8::MAX as u16 => 16,
        _ => 8,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Image body is empty")]
    Empty,

    #[error("Failed to decode image with any supported codec: {0}")]
    Decode(#[from] image::ImageError),
}
