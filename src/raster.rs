use crate::error::LaurelError;
use crate::font::FontResource;
use crate::render::{FILL_COLOR, NameRenderer, OUTLINE_COLOR, PlacementSpec, TextLayout, layout_name};
use crate::template::TemplatePage;
use crate::types::{Color, PageGeometry};
use lopdf::{Document as LoDocument, Object as LoObject, Stream as LoStream, dictionary};
use tiny_skia::{FillRule, Paint, Path, PathBuilder, Pixmap, Transform};
use ttf_parser::{GlyphId, OutlineBuilder};

/// Raster backend: clones the template's raster base, paints outlined glyphs
/// at device resolution, then wraps the surface as a full-page image in a
/// fresh single-page PDF.
pub struct RasterComposite;

// White halo ±1 device pixel in each cardinal direction, then black fill.
const OUTLINE_OFFSETS: [(f32, f32); 4] = [(-1.0, 0.0), (1.0, 0.0), (0.0, -1.0), (0.0, 1.0)];

impl NameRenderer for RasterComposite {
    fn render(
        &self,
        template: &TemplatePage,
        name: &str,
        placement: &PlacementSpec,
        font: &FontResource,
    ) -> Result<Vec<u8>, LaurelError> {
        placement.validate()?;
        let geometry = *template.geometry();
        let mut surface = template.raster_base()?.clone();
        let layout = layout_name(name, placement, font);
        let frame = position_text(&geometry, placement, &layout);

        let (paths, rule) = glyph_paths(font, name, frame.size_px, frame.origin_x, frame.baseline)
            .unwrap_or_else(|| fallback_box_paths(name, frame.size_px, frame.origin_x, frame.baseline));
        paint_outlined(&mut surface, &paths, rule);
        encode_page_pdf(&surface, &geometry)
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct RasterFrame {
    pub(crate) size_px: f32,
    pub(crate) width_px: f32,
    pub(crate) height_px: f32,
    pub(crate) anchor_x: f32,
    pub(crate) anchor_y: f32,
    pub(crate) origin_x: f32,
    pub(crate) baseline: f32,
}

/// Center the measured text box on the anchor, in device pixels with a
/// top-left origin (anchor_y is given from the bottom edge).
pub(crate) fn position_text(
    geometry: &PageGeometry,
    placement: &PlacementSpec,
    layout: &TextLayout,
) -> RasterFrame {
    let scale = placement.dpi as f32 / 72.0;
    let size_px = layout.size * scale;
    let width_px = layout.width_pt * scale;
    let height_px = layout.height_pt * scale;
    let anchor_x = placement.anchor_x.to_pixels(placement.dpi) as f32;
    let anchor_y = geometry.height_px as f32 - placement.anchor_y.to_pixels(placement.dpi) as f32;
    let origin_x = anchor_x - width_px / 2.0;
    let top = anchor_y - height_px / 2.0;
    RasterFrame {
        size_px,
        width_px,
        height_px,
        anchor_x,
        anchor_y,
        origin_x,
        baseline: top + layout.ascent_ratio * size_px,
    }
}

fn paint_outlined(pixmap: &mut Pixmap, paths: &[Path], rule: FillRule) {
    let outline = color_paint(OUTLINE_COLOR);
    for (dx, dy) in OUTLINE_OFFSETS {
        let offset = Transform::from_translate(dx, dy);
        for path in paths {
            pixmap.fill_path(path, &outline, rule, offset, None);
        }
    }
    let fill = color_paint(FILL_COLOR);
    for path in paths {
        pixmap.fill_path(path, &fill, rule, Transform::identity(), None);
    }
}

fn color_paint(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(
        tiny_skia::Color::from_rgba(color.r, color.g, color.b, 1.0)
            .unwrap_or_else(|| tiny_skia::Color::from_rgba8(0, 0, 0, 255)),
    );
    paint.anti_alias = true;
    paint
}

fn glyph_paths(
    font: &FontResource,
    name: &str,
    size_px: f32,
    origin_x: f32,
    baseline: f32,
) -> Option<(Vec<Path>, FillRule)> {
    let data = font.data()?;
    let face = ttf_parser::Face::parse(data, 0).ok()?;
    let (units_per_em, glyphs) = font.shaped_glyphs(name)?;
    let scale = size_px / units_per_em.max(1) as f32;

    let mut paths = Vec::new();
    let mut pen_x = origin_x;
    for glyph in glyphs {
        let gx = pen_x + glyph.x_offset as f32 * scale;
        let gy = baseline - glyph.y_offset as f32 * scale;
        let mut builder = GlyphPathBuilder::new(gx, gy, scale);
        if face
            .outline_glyph(GlyphId(glyph.glyph_id), &mut builder)
            .is_some()
        {
            if let Some(path) = builder.finish() {
                paths.push(path);
            }
        }
        // Spaces and contour-less glyphs still advance the pen.
        pen_x += glyph.x_advance as f32 * scale;
    }
    Some((paths, FillRule::Winding))
}

// Degraded path when no face resolved: legible .notdef-style frames, one per
// visible character, matching the heuristic half-em advance.
fn fallback_box_paths(
    name: &str,
    size_px: f32,
    origin_x: f32,
    baseline: f32,
) -> (Vec<Path>, FillRule) {
    let advance = 0.5 * size_px;
    let height = 0.7 * size_px;
    let inset = (0.07 * size_px).max(1.0);
    let mut paths = Vec::new();
    let mut pen_x = origin_x;
    for ch in name.chars() {
        if !ch.is_whitespace() {
            let mut builder = PathBuilder::new();
            if let Some(outer) = tiny_skia::Rect::from_xywh(
                pen_x + 0.05 * size_px,
                baseline - height,
                advance - 0.1 * size_px,
                height,
            ) {
                builder.push_rect(outer);
                if let Some(inner) = tiny_skia::Rect::from_xywh(
                    outer.x() + inset,
                    outer.y() + inset,
                    outer.width() - 2.0 * inset,
                    outer.height() - 2.0 * inset,
                ) {
                    builder.push_rect(inner);
                }
                if let Some(path) = builder.finish() {
                    paths.push(path);
                }
            }
        }
        pen_x += advance;
    }
    (paths, FillRule::EvenOdd)
}

struct GlyphPathBuilder {
    builder: PathBuilder,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

impl GlyphPathBuilder {
    fn new(origin_x: f32, origin_y: f32, scale: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            origin_x,
            origin_y,
            scale,
        }
    }

    fn finish(self) -> Option<Path> {
        self.builder.finish()
    }
}

// Glyph outlines are y-up; the pixmap is y-down, so flip around the baseline.
impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        self.builder.move_to(
            self.origin_x + x * self.scale,
            self.origin_y - y * self.scale,
        );
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.builder.line_to(
            self.origin_x + x * self.scale,
            self.origin_y - y * self.scale,
        );
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.builder.quad_to(
            self.origin_x + x1 * self.scale,
            self.origin_y - y1 * self.scale,
            self.origin_x + x * self.scale,
            self.origin_y - y * self.scale,
        );
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.builder.cubic_to(
            self.origin_x + x1 * self.scale,
            self.origin_y - y1 * self.scale,
            self.origin_x + x2 * self.scale,
            self.origin_y - y2 * self.scale,
            self.origin_x + x * self.scale,
            self.origin_y - y * self.scale,
        );
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

fn encode_page_pdf(pixmap: &Pixmap, geometry: &PageGeometry) -> Result<Vec<u8>, LaurelError> {
    let mut rgb = Vec::with_capacity((pixmap.width() * pixmap.height() * 3) as usize);
    for px in pixmap.pixels() {
        let c = px.demultiply();
        rgb.extend_from_slice(&[c.red(), c.green(), c.blue()]);
    }

    let mut doc = LoDocument::with_version("1.7");
    let pages_id = doc.new_object_id();
    let image_id = doc.add_object(LoStream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => geometry.width_px as i64,
            "Height" => geometry.height_px as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        rgb,
    ));
    let content = format!(
        "q {:.4} 0 0 {:.4} 0 0 cm /Im0 Do Q\n",
        geometry.width_pt, geometry.height_pt
    )
    .into_bytes();
    let content_id = doc.add_object(LoStream::new(dictionary! {}, content));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        },
        "MediaBox" => vec![
            0.into(),
            0.into(),
            geometry.width_pt.into(),
            geometry.height_pt.into(),
        ],
    });
    doc.objects.insert(
        pages_id,
        LoObject::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![LoObject::Reference(page_id)],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|err| LaurelError::Render(format!("pdf serialize failed: {err}")))?;
    Ok(out)
}
