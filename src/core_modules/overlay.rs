// THEORY:
// An `Overlay` is a purely visual annotation pinned to one cell: a label, an
// optional fill colour that replaces the value-derived background, and a font.
// Overlays never feed back into cell arithmetic and are only ever cleared
// wholesale by `GridManager::reset_grids`.

use crate::core_modules::cell::Rgb;
use serde::{Deserialize, Serialize};

/// Label size as a fraction of the cell pitch.
const FONT_TO_CELL_RATIO: f32 = 0.25;
const DEFAULT_FONT_FAMILY: &str = "monospace";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Font {
    pub size_px: f32,
    pub family: String,
}

impl Font {
    pub fn new(size_px: f32, family: impl Into<String>) -> Self {
        Self {
            size_px,
            family: family.into(),
        }
    }

    /// A monospace font scaled to fit labels inside a cell of `cell_size` pixels.
    pub fn relative_to(cell_size: u32) -> Self {
        Self::new(cell_size as f32 * FONT_TO_CELL_RATIO, DEFAULT_FONT_FAMILY)
    }
}

impl Default for Font {
    fn default() -> Self {
        Self::new(12.0, DEFAULT_FONT_FAMILY)
    }
}

/// A transient per-cell annotation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Overlay {
    /// The label drawn centred in the cell.
    pub text: String,
    /// Replaces the value-derived background when set.
    pub fill_color: Option<Rgb>,
    pub font: Font,
}

impl Overlay {
    pub fn new(text: impl Into<String>, fill_color: Option<Rgb>, font: Font) -> Self {
        Self {
            text: text.into(),
            fill_color,
            font,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn font_scales_with_cell_pitch() {
        assert_eq!(Font::relative_to(40).size_px, 10.0);
        assert_eq!(Font::relative_to(40).family, "monospace");
    }
}
