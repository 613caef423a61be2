//! Tile rendering pipeline.
//!
//! Turns a [`RasterWindow`] plus request parameters into encoded image
//! bytes: band selection or band-math expression, nodata masking, rescale
//! to the display range, optional color formula and color map, then
//! format-aware encoding.

pub mod bands;
pub mod color;
pub mod color_formula;
pub mod colormap;
pub mod encode;
pub mod expression;
pub mod mask;
pub mod stats;

use ndarray::Array3;

use tiler_common::{RasterWindow, TilerError, TilerResult};

pub use encode::Format;

/// Rendering parameters, already parsed from the query string.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub indexes: Option<Vec<usize>>,
    pub expression: Option<String>,
    /// Request-level nodata override.
    pub nodata: Option<f64>,
    pub rescale: Option<Vec<(f64, f64)>>,
    pub color_formula: Option<String>,
    pub color_map: Option<String>,
    pub format: Option<Format>,
}

#[derive(Debug)]
pub struct RenderedTile {
    pub bytes: Vec<u8>,
    pub format: Format,
}

/// Run the full pipeline over one window.
pub fn render(
    window: &RasterWindow,
    dataset_nodata: Option<f64>,
    options: &RenderOptions,
) -> TilerResult<RenderedTile> {
    if options.indexes.is_some() && options.expression.is_some() {
        return Err(TilerError::InvalidParameter {
            param: "indexes".into(),
            message: "indexes and expr are mutually exclusive".into(),
        });
    }

    // Nodata is matched against the source bands; band math runs on
    // already-masked data, so a derived value never un-masks a pixel.
    let nodata = mask::resolve_nodata(options.nodata, dataset_nodata);
    let source_valid =
        mask::build_mask(&window.data, &window.mask, nodata, window.dtype.is_float());

    let data = match (&options.indexes, &options.expression) {
        (Some(indexes), None) => bands::select_bands(&window.data, indexes)?,
        (None, Some(expr)) => expression::evaluate_expression(expr, &window.data)?,
        _ => window.data.clone(),
    };

    // Non-finite fallout of the expression (division by zero) also masks.
    let mut valid = mask::build_mask(&data, &source_valid, None, true);

    let mut display = color::to_display(&data, options.rescale.as_deref())?;

    if let Some(formula) = &options.color_formula {
        let ops = color_formula::parse_color_formula(formula)?;
        if display.dim().0 == 1 {
            display = replicate_to_rgb(&display);
        }
        display = color_formula::apply_color_formula(&display, &ops)?;
    }
    if let Some(raw) = &options.color_map {
        let cmap = colormap::parse_color_map(raw)?;
        let (colored, colored_mask) = colormap::apply_color_map(&display, &valid, &cmap)?;
        display = colored;
        valid = colored_mask;
    }

    let format = encode::resolve_format(options.format, display.dim().0, &valid);
    let bytes = encode::encode(&display, &valid, format)?;
    Ok(RenderedTile { bytes, format })
}

fn replicate_to_rgb(data: &Array3<u8>) -> Array3<u8> {
    let (_, height, width) = data.dim();
    Array3::from_shape_fn((3, height, width), |(_, y, x)| data[[0, y, x]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};
    use tiler_common::{BoundingBox, DataType};

    fn window(bands: usize, nodata_hole: bool) -> RasterWindow {
        let mut data = Array3::from_shape_fn((bands, 8, 8), |(b, y, x)| {
            (b * 10 + y + x) as f64 * 4.0
        });
        let mask = Array2::from_elem((8, 8), true);
        if nodata_hole {
            data[[0, 0, 0]] = -9999.0;
        }
        RasterWindow {
            data,
            dtype: DataType::Int16,
            mask,
            bounds: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
        }
    }

    #[test]
    fn test_opaque_tile_defaults_to_jpeg() {
        let out = render(&window(3, false), None, &RenderOptions::default()).unwrap();
        assert_eq!(out.format, Format::Jpeg);
        assert!(!out.bytes.is_empty());
    }

    #[test]
    fn test_nodata_hole_forces_png() {
        let options = RenderOptions {
            nodata: Some(-9999.0),
            ..Default::default()
        };
        let out = render(&window(1, true), None, &options).unwrap();
        assert_eq!(out.format, Format::Png);
    }

    #[test]
    fn test_dataset_nodata_applies_without_override() {
        let out = render(&window(1, true), Some(-9999.0), &RenderOptions::default()).unwrap();
        assert_eq!(out.format, Format::Png);
    }

    #[test]
    fn test_indexes_and_expression_conflict() {
        let options = RenderOptions {
            indexes: Some(vec![1]),
            expression: Some("b1".into()),
            ..Default::default()
        };
        let err = render(&window(3, false), None, &options).unwrap_err();
        assert!(matches!(err, TilerError::InvalidParameter { .. }));
    }

    #[test]
    fn test_expression_with_colormap() {
        let options = RenderOptions {
            expression: Some("(b2-b1)/(b2+b1)".into()),
            rescale: Some(vec![(0.0, 1.0)]),
            color_map: Some("viridis".into()),
            ..Default::default()
        };
        let out = render(&window(2, false), None, &options).unwrap();
        assert_eq!(out.format, Format::Png);
        assert!(!out.bytes.is_empty());
    }

    #[test]
    fn test_nodata_masks_source_before_expression() {
        // b1*2 turns the -9999 pixel into -19998; the mask must still
        // catch it because nodata applies to the source band values.
        let options = RenderOptions {
            expression: Some("b1*2".into()),
            nodata: Some(-9999.0),
            ..Default::default()
        };
        let out = render(&window(1, true), None, &options).unwrap();
        assert_eq!(out.format, Format::Png);
    }

    #[test]
    fn test_formula_applies_before_colormap() {
        // Both steps run in order; the formula's RGB output then fails the
        // colormap's single-band requirement instead of being dropped.
        let options = RenderOptions {
            color_formula: Some("gamma rgb 1.5".into()),
            color_map: Some("viridis".into()),
            ..Default::default()
        };
        let err = render(&window(1, false), None, &options).unwrap_err();
        assert!(matches!(err, TilerError::ColorMapBandMismatch(3)));
    }

    #[test]
    fn test_colormap_needs_single_band() {
        let options = RenderOptions {
            color_map: Some("viridis".into()),
            ..Default::default()
        };
        let err = render(&window(3, false), None, &options).unwrap_err();
        assert!(matches!(err, TilerError::ColorMapBandMismatch(3)));
    }

    #[test]
    fn test_color_formula_on_single_band_replicates() {
        let options = RenderOptions {
            color_formula: Some("gamma rgb 1.5".into()),
            format: Some(Format::Png),
            ..Default::default()
        };
        let out = render(&window(1, false), None, &options).unwrap();
        assert_eq!(out.format, Format::Png);
    }

    #[test]
    fn test_explicit_format_wins() {
        let options = RenderOptions {
            format: Some(Format::WebP),
            ..Default::default()
        };
        let out = render(&window(3, false), None, &options).unwrap();
        assert_eq!(out.format, Format::WebP);
    }
}
