//! Output-format resolution and image encoding.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tiff::TiffEncoder;
use image::{ColorType, ImageEncoder};
use ndarray::{Array2, Array3};
use tracing::debug;

use tiler_common::{TilerError, TilerResult};

const DEFAULT_JPEG_QUALITY: u8 = 85;
const DEFAULT_WEBP_QUALITY: f32 = 75.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Png,
    Jpeg,
    WebP,
    Tiff,
}

impl Format {
    pub fn from_ext(ext: &str) -> TilerResult<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Ok(Format::Png),
            "jpg" | "jpeg" => Ok(Format::Jpeg),
            "webp" => Ok(Format::WebP),
            "tif" | "tiff" => Ok(Format::Tiff),
            other => Err(TilerError::UnsupportedFormat(format!(
                "unknown image format '{}'",
                other
            ))),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Format::Png => "image/png",
            Format::Jpeg => "image/jpeg",
            Format::WebP => "image/webp",
            Format::Tiff => "image/tiff",
        }
    }

    pub fn ext(&self) -> &'static str {
        match self {
            Format::Png => "png",
            Format::Jpeg => "jpg",
            Format::WebP => "webp",
            Format::Tiff => "tif",
        }
    }
}

/// Explicit extension wins; otherwise PNG whenever alpha is needed (a
/// masked pixel or a 4-band RGBA array), JPEG when fully opaque.
pub fn resolve_format(explicit: Option<Format>, bands: usize, mask: &Array2<bool>) -> Format {
    if let Some(format) = explicit {
        return format;
    }
    if bands != 4 && mask.iter().all(|&valid| valid) {
        Format::Jpeg
    } else {
        Format::Png
    }
}

fn quality_from_env(var: &str, default: f32) -> f32 {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Interleave `(bands, h, w)` planes plus the mask into RGBA bytes. A
/// 4-band input keeps its own alpha ANDed with the mask.
fn to_rgba(data: &Array3<u8>, mask: &Array2<bool>) -> TilerResult<Vec<u8>> {
    let (bands, height, width) = data.dim();
    let mut out = Vec::with_capacity(height * width * 4);
    for y in 0..height {
        for x in 0..width {
            let (r, g, b, a) = match bands {
                1 => {
                    let v = data[[0, y, x]];
                    (v, v, v, 255)
                }
                3 => (data[[0, y, x]], data[[1, y, x]], data[[2, y, x]], 255),
                4 => (
                    data[[0, y, x]],
                    data[[1, y, x]],
                    data[[2, y, x]],
                    data[[3, y, x]],
                ),
                n => {
                    return Err(TilerError::UnsupportedBandCountForFormat {
                        format: "rgba".into(),
                        bands: n,
                    })
                }
            };
            let alpha = if mask[[y, x]] { a } else { 0 };
            out.extend_from_slice(&[r, g, b, alpha]);
        }
    }
    Ok(out)
}

/// Interleave into RGB or grayscale with masked pixels composited white.
fn to_opaque(data: &Array3<u8>, mask: &Array2<bool>) -> TilerResult<(Vec<u8>, ColorType)> {
    let (bands, height, width) = data.dim();
    match bands {
        1 => {
            let mut out = Vec::with_capacity(height * width);
            for y in 0..height {
                for x in 0..width {
                    out.push(if mask[[y, x]] { data[[0, y, x]] } else { 255 });
                }
            }
            Ok((out, ColorType::L8))
        }
        3 => {
            let mut out = Vec::with_capacity(height * width * 3);
            for y in 0..height {
                for x in 0..width {
                    if mask[[y, x]] {
                        out.extend_from_slice(&[
                            data[[0, y, x]],
                            data[[1, y, x]],
                            data[[2, y, x]],
                        ]);
                    } else {
                        out.extend_from_slice(&[255, 255, 255]);
                    }
                }
            }
            Ok((out, ColorType::Rgb8))
        }
        n => Err(TilerError::UnsupportedBandCountForFormat {
            format: "jpeg".into(),
            bands: n,
        }),
    }
}

/// Serialize a u8 pixel array plus mask into compressed image bytes.
pub fn encode(data: &Array3<u8>, mask: &Array2<bool>, format: Format) -> TilerResult<Vec<u8>> {
    let (bands, height, width) = data.dim();
    let (w, h) = (width as u32, height as u32);
    debug!(bands, width, height, format = format.ext(), "encoding tile");

    let mut buffer = Cursor::new(Vec::new());
    match format {
        Format::Png => {
            let rgba = to_rgba(data, mask)?;
            PngEncoder::new(&mut buffer)
                .write_image(&rgba, w, h, ColorType::Rgba8)
                .map_err(|e| TilerError::Internal(format!("png encode: {}", e)))?;
        }
        Format::Jpeg => {
            let (pixels, color) = to_opaque(data, mask)?;
            let quality =
                quality_from_env("JPEG_QUALITY", DEFAULT_JPEG_QUALITY as f32).round() as u8;
            JpegEncoder::new_with_quality(&mut buffer, quality)
                .write_image(&pixels, w, h, color)
                .map_err(|e| TilerError::Internal(format!("jpeg encode: {}", e)))?;
        }
        Format::WebP => {
            let rgba = to_rgba(data, mask)?;
            let quality = quality_from_env("WEBP_QUALITY", DEFAULT_WEBP_QUALITY);
            let encoded = webp::Encoder::from_rgba(&rgba, w, h).encode(quality);
            return Ok(encoded.to_vec());
        }
        Format::Tiff => {
            let rgba = to_rgba(data, mask)?;
            TiffEncoder::new(&mut buffer)
                .write_image(&rgba, w, h, ColorType::Rgba8)
                .map_err(|e| TilerError::Internal(format!("tiff encode: {}", e)))?;
        }
    }
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opaque_mask(h: usize, w: usize) -> Array2<bool> {
        Array2::from_elem((h, w), true)
    }

    #[test]
    fn test_from_ext() {
        assert_eq!(Format::from_ext("PNG").unwrap(), Format::Png);
        assert_eq!(Format::from_ext("jpeg").unwrap(), Format::Jpeg);
        assert_eq!(Format::from_ext("tiff").unwrap(), Format::Tiff);
        assert!(Format::from_ext("bmp").is_err());
    }

    #[test]
    fn test_auto_selection() {
        let mut mask = opaque_mask(2, 2);
        assert_eq!(resolve_format(None, 3, &mask), Format::Jpeg);
        mask[[0, 0]] = false;
        assert_eq!(resolve_format(None, 3, &mask), Format::Png);
        assert_eq!(resolve_format(Some(Format::WebP), 3, &mask), Format::WebP);
    }

    #[test]
    fn test_auto_selection_rgba_needs_png() {
        // A colormap produces RGBA even when every pixel is valid.
        assert_eq!(resolve_format(None, 4, &opaque_mask(2, 2)), Format::Png);
        assert_eq!(
            resolve_format(Some(Format::WebP), 4, &opaque_mask(2, 2)),
            Format::WebP
        );
    }

    #[test]
    fn test_png_roundtrip_carries_alpha() {
        let data = Array3::from_elem((3, 2, 2), 100u8);
        let mut mask = opaque_mask(2, 2);
        mask[[1, 1]] = false;

        let bytes = encode(&data, &mask, Format::Png).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (2, 2));
        assert_eq!(decoded.get_pixel(0, 0)[3], 255);
        assert_eq!(decoded.get_pixel(1, 1)[3], 0);
    }

    #[test]
    fn test_jpeg_single_and_three_bands() {
        let gray = Array3::from_elem((1, 4, 4), 128u8);
        assert!(encode(&gray, &opaque_mask(4, 4), Format::Jpeg).is_ok());

        let rgb = Array3::from_elem((3, 4, 4), 128u8);
        assert!(encode(&rgb, &opaque_mask(4, 4), Format::Jpeg).is_ok());
    }

    #[test]
    fn test_jpeg_rejects_rgba() {
        let rgba = Array3::from_elem((4, 2, 2), 128u8);
        let err = encode(&rgba, &opaque_mask(2, 2), Format::Jpeg).unwrap_err();
        assert!(matches!(
            err,
            TilerError::UnsupportedBandCountForFormat { .. }
        ));
    }

    #[test]
    fn test_webp_produces_bytes() {
        let rgb = Array3::from_elem((3, 8, 8), 64u8);
        let bytes = encode(&rgb, &opaque_mask(8, 8), Format::WebP).unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn test_two_bands_unsupported_everywhere() {
        let two = Array3::from_elem((2, 2, 2), 0u8);
        assert!(encode(&two, &opaque_mask(2, 2), Format::Png).is_err());
    }
}
