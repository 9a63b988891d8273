use resvg::tiny_skia::{Color, Pixmap, Transform};
use tracing::debug;

use super::ExportError;

pub const PIXEL_DENSITY: f32 = 2.0;

/// Renders serialized SVG onto an opaque white pixmap scaled by `density` and
/// returns the encoded PNG bytes.
pub fn rasterize_svg(svg: &str, density: f32) -> Result<Vec<u8>, ExportError> {
    let mut options = usvg::Options::default();
    options.fontdb_mut().load_system_fonts();

    let tree = usvg::Tree::from_str(svg, &options).map_err(ExportError::SvgParse)?;
    let size = tree.size();
    let width = (size.width() * density).ceil() as u32;
    let height = (size.height() * density).ceil() as u32;

    let mut pixmap = Pixmap::new(width, height).ok_or(ExportError::Pixmap { width, height })?;
    pixmap.fill(Color::WHITE);
    resvg::render(
        &tree,
        Transform::from_scale(density, density),
        &mut pixmap.as_mut(),
    );
    debug!(width, height, "rasterized scene");

    pixmap
        .encode_png()
        .map_err(|error| ExportError::PngEncode(error.to_string()))
}
