use crate::autofit::{self, MIN_FONT_SIZE};
use crate::error::LaurelError;
use crate::font::FontResource;
use crate::template::TemplatePage;
use crate::types::{Cm, Color};

/// Where and how large the name lands on the page. `anchor_y` is measured
/// from the bottom edge, the certificate-design convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementSpec {
    pub anchor_x: Cm,
    pub anchor_y: Cm,
    pub desired_font_size: f32,
    pub max_width: Cm,
    pub dpi: u32,
}

impl Default for PlacementSpec {
    fn default() -> Self {
        // The layout the source templates were tuned against.
        Self {
            anchor_x: Cm(10.46),
            anchor_y: Cm(16.50),
            desired_font_size: 19.0,
            max_width: Cm(16.0),
            dpi: 300,
        }
    }
}

impl PlacementSpec {
    pub fn validate(&self) -> Result<(), LaurelError> {
        if !(self.max_width.0 > 0.0) {
            return Err(LaurelError::InvalidPlacement(format!(
                "max_width must be > 0, got {}",
                self.max_width.0
            )));
        }
        if !(self.desired_font_size > 0.0) {
            return Err(LaurelError::InvalidPlacement(format!(
                "desired_font_size must be > 0, got {}",
                self.desired_font_size
            )));
        }
        if self.dpi == 0 {
            return Err(LaurelError::InvalidPlacement(
                "dpi must be > 0".to_string(),
            ));
        }
        if !self.anchor_x.0.is_finite() || !self.anchor_y.0.is_finite() {
            return Err(LaurelError::InvalidPlacement(
                "anchor coordinates must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

pub(crate) const FILL_COLOR: Color = Color::BLACK;
pub(crate) const OUTLINE_COLOR: Color = Color::WHITE;

/// One fully fitted name, still in point units; backends convert to their
/// surface's native unit and derive the draw origin from the anchor.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TextLayout {
    pub(crate) size: f32,
    pub(crate) width_pt: f32,
    pub(crate) height_pt: f32,
    pub(crate) ascent_ratio: f32,
}

pub(crate) fn layout_name(
    name: &str,
    placement: &PlacementSpec,
    font: &FontResource,
) -> TextLayout {
    let fitted = autofit::fit(
        font,
        name,
        placement.desired_font_size,
        placement.max_width.to_points(),
        MIN_FONT_SIZE,
    );
    let ascent_ratio = font
        .metrics()
        .map(|m| m.ascent as f32 / 1000.0)
        // Heuristic box: cap-ish ascent, matching the height = size fallback.
        .unwrap_or(0.8);
    TextLayout {
        size: fitted.size,
        width_pt: fitted.width.to_f32(),
        height_pt: fitted.height.to_f32(),
        ascent_ratio,
    }
}

/// A rendering backend. Implementations never mutate shared template state;
/// each call works on a private copy of the page surface and returns the
/// finished single-page PDF bytes.
pub trait NameRenderer: Sync {
    fn render(
        &self,
        template: &TemplatePage,
        name: &str,
        placement: &PlacementSpec,
        font: &FontResource,
    ) -> Result<Vec<u8>, LaurelError>;
}
