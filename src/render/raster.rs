//! Vector-markup to raster conversion.
//!
//! Generated SVG markup becomes PNG bytes at a fixed target resolution.
//! Conversion is pure and deterministic: the same markup at the same
//! resolution yields the same pixmap. Malformed markup is rejected before
//! rendering and reported separately from converter-internal failures.

use crate::error::ConversionError;

/// Converts standalone SVG markup to PNG bytes.
#[derive(Debug, Clone)]
pub struct RasterConverter {
    width: u32,
    height: u32,
}

impl Default for RasterConverter {
    fn default() -> Self {
        Self { width: 1200, height: 900 }
    }
}

impl RasterConverter {
    /// Creates a converter with the given target resolution.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width: width.max(1), height: height.max(1) }
    }

    /// Target resolution as (width, height).
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Converts markup to PNG bytes at the target resolution.
    pub fn convert(&self, markup: &str) -> Result<Vec<u8>, ConversionError> {
        let tree = parse_markup(markup)?;

        let size = tree.size();
        let (content_w, content_h) = (size.width(), size.height());
        if !content_w.is_finite() || !content_h.is_finite() || content_w <= 0.0 || content_h <= 0.0
        {
            return Err(ConversionError::MalformedInput(
                "markup has no positive content size".to_string(),
            ));
        }

        let mut pixmap = tiny_skia::Pixmap::new(self.width, self.height).ok_or_else(|| {
            ConversionError::BackendFailure("failed to allocate pixmap".to_string())
        })?;
        pixmap.fill(tiny_skia::Color::WHITE);

        // Stretch content to fill the target resolution exactly; diagrams
        // are sized by the generation rules, so aspect distortion is
        // bounded and exact output dimensions are the contract.
        let transform = tiny_skia::Transform::from_scale(
            self.width as f32 / content_w,
            self.height as f32 / content_h,
        );
        resvg::render(&tree, transform, &mut pixmap.as_mut());

        pixmap
            .encode_png()
            .map_err(|e| ConversionError::BackendFailure(format!("PNG encoding failed: {e}")))
    }
}

/// Parses markup, mapping any parse failure to `MalformedInput`.
fn parse_markup(markup: &str) -> Result<usvg::Tree, ConversionError> {
    if !markup.trim_start().starts_with('<') {
        return Err(ConversionError::MalformedInput(
            "markup does not start with an XML element".to_string(),
        ));
    }

    let options = usvg::Options::default();
    usvg::Tree::from_str(markup, &options)
        .map_err(|e| ConversionError::MalformedInput(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 80">
        <rect x="10" y="10" width="80" height="60" fill="none" stroke="black"/>
        <text x="50" y="45" text-anchor="middle" font-size="10">R1</text>
    </svg>"#;

    #[test]
    fn converts_valid_markup_to_png() {
        let converter = RasterConverter::default();
        let bytes = converter.convert(VALID_SVG).expect("conversion should succeed");
        assert!(bytes.starts_with(b"\x89PNG\r\n\x1a\n"));
    }

    #[test]
    fn output_dimensions_match_target_resolution() {
        let converter = RasterConverter::new(640, 480);
        let bytes = converter.convert(VALID_SVG).expect("conversion should succeed");

        let decoded = image::load_from_memory(&bytes).expect("PNG decodes");
        assert_eq!(decoded.width(), 640);
        assert_eq!(decoded.height(), 480);
    }

    #[test]
    fn conversion_is_deterministic() {
        let converter = RasterConverter::new(320, 240);
        let first = converter.convert(VALID_SVG).expect("first conversion");
        let second = converter.convert(VALID_SVG).expect("second conversion");
        assert_eq!(first, second);
    }

    #[test]
    fn malformed_markup_is_rejected() {
        let converter = RasterConverter::default();

        let err = converter.convert("this is not markup").unwrap_err();
        assert!(matches!(err, ConversionError::MalformedInput(_)));

        let err = converter.convert("<svg><unclosed").unwrap_err();
        assert!(matches!(err, ConversionError::MalformedInput(_)));
    }

    #[test]
    fn zero_size_markup_is_malformed_not_backend_failure() {
        let converter = RasterConverter::default();
        let err = converter
            .convert(r#"<svg xmlns="http://www.w3.org/2000/svg" width="0" height="0"/>"#)
            .unwrap_err();
        assert!(matches!(err, ConversionError::MalformedInput(_)));
    }
}
