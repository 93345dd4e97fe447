use crate::error::LaurelError;
use crate::font::FontResource;
use crate::render::{NameRenderer, PlacementSpec, TextLayout, layout_name};
use crate::template::{TemplatePage, first_page_id, page_resources_dict};
use std::fmt::Write as _;

use lopdf::{
    Dictionary as LoDictionary, Document as LoDocument, Object as LoObject, ObjectId,
    Stream as LoStream, dictionary,
};

/// Vector backend: keeps the template page content untouched and appends an
/// overlay content stream drawing the name with an embedded TrueType font.
pub struct VectorOverlay;

const FONT_RESOURCE: &str = "LaurelF1";

// White halo ±1 pt in each cardinal direction, then black fill.
const OUTLINE_OFFSETS: [(f32, f32); 4] = [(-1.0, 0.0), (1.0, 0.0), (0.0, -1.0), (0.0, 1.0)];

impl NameRenderer for VectorOverlay {
    fn render(
        &self,
        template: &TemplatePage,
        name: &str,
        placement: &PlacementSpec,
        font: &FontResource,
    ) -> Result<Vec<u8>, LaurelError> {
        placement.validate()?;
        // Private copy per call; the shared template bytes are never mutated.
        let mut doc = LoDocument::load_mem(template.bytes())
            .map_err(|err| LaurelError::Render(format!("template reload failed: {err}")))?;
        let page_id = first_page_id(&doc)?;
        keep_single_page(&mut doc, page_id)?;

        let layout = layout_name(name, placement, font);
        let frame = position_text(placement, &layout);

        let font_id = embed_font(&mut doc, font);
        install_font_resource(&mut doc, page_id, font_id)?;

        let (literal, replaced) = encode_winansi_literal(name);
        if replaced > 0 {
            log::debug!("{replaced} character(s) outside WinAnsi replaced for {name:?}");
        }
        let content = overlay_content(&frame, &literal);
        doc.add_page_contents(page_id, content)
            .map_err(|err| LaurelError::Render(format!("overlay append failed: {err}")))?;

        doc.prune_objects();
        doc.renumber_objects();
        doc.compress();
        let mut out = Vec::new();
        doc.save_to(&mut out)
            .map_err(|err| LaurelError::Render(format!("pdf serialize failed: {err}")))?;
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct OverlayFrame {
    pub(crate) size: f32,
    pub(crate) width_pt: f32,
    pub(crate) height_pt: f32,
    pub(crate) anchor_x: f32,
    pub(crate) anchor_y: f32,
    pub(crate) origin_x: f32,
    pub(crate) baseline: f32,
}

/// Center the measured text box on the anchor in PDF points. PDF space is
/// already bottom-origin, so `anchor_y` maps directly.
pub(crate) fn position_text(placement: &PlacementSpec, layout: &TextLayout) -> OverlayFrame {
    let anchor_x = placement.anchor_x.to_points().to_f32();
    let anchor_y = placement.anchor_y.to_points().to_f32();
    let origin_x = anchor_x - layout.width_pt / 2.0;
    let bottom = anchor_y - layout.height_pt / 2.0;
    // The baseline sits one descent above the bottom of the measured box.
    let baseline = bottom + (layout.height_pt - layout.ascent_ratio * layout.size);
    OverlayFrame {
        size: layout.size,
        width_pt: layout.width_pt,
        height_pt: layout.height_pt,
        anchor_x,
        anchor_y,
        origin_x,
        baseline,
    }
}

fn overlay_content(frame: &OverlayFrame, literal: &str) -> Vec<u8> {
    let mut content = String::new();
    content.push_str("q\n1 1 1 rg\n");
    for (dx, dy) in OUTLINE_OFFSETS {
        let _ = writeln!(
            content,
            "BT /{} {:.2} Tf {:.2} {:.2} Td ({}) Tj ET",
            FONT_RESOURCE,
            frame.size,
            frame.origin_x + dx,
            frame.baseline + dy,
            literal
        );
    }
    content.push_str("0 0 0 rg\n");
    let _ = writeln!(
        content,
        "BT /{} {:.2} Tf {:.2} {:.2} Td ({}) Tj ET",
        FONT_RESOURCE, frame.size, frame.origin_x, frame.baseline, literal
    );
    content.push_str("Q\n");
    content.into_bytes()
}

fn embed_font(doc: &mut LoDocument, font: &FontResource) -> ObjectId {
    let (Some(data), Some(metrics)) = (font.data(), font.metrics()) else {
        // Degraded path: viewer-supplied base-14 face, nothing to embed.
        return doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
    };

    let file_id = doc.add_object(LoStream::new(
        dictionary! { "Length1" => data.len() as i64 },
        data.to_vec(),
    ));
    let mut flags: i64 = 32;
    if metrics.is_fixed_pitch {
        flags |= 1;
    }
    let descriptor_id = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => LoObject::Name(metrics.base_name.clone().into_bytes()),
        "Flags" => flags,
        "FontBBox" => vec![
            (metrics.bbox.0 as i64).into(),
            (metrics.bbox.1 as i64).into(),
            (metrics.bbox.2 as i64).into(),
            (metrics.bbox.3 as i64).into(),
        ],
        "ItalicAngle" => metrics.italic_angle as i64,
        "Ascent" => metrics.ascent as i64,
        "Descent" => metrics.descent as i64,
        "CapHeight" => metrics.cap_height as i64,
        "StemV" => 80,
        "MissingWidth" => metrics.missing_width as i64,
        "FontFile2" => file_id,
    });
    let widths: Vec<LoObject> = metrics
        .widths
        .iter()
        .map(|w| LoObject::Integer(*w as i64))
        .collect();
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "TrueType",
        "BaseFont" => LoObject::Name(metrics.base_name.clone().into_bytes()),
        "FirstChar" => metrics.first_char as i64,
        "LastChar" => metrics.last_char as i64,
        "Widths" => widths,
        "FontDescriptor" => descriptor_id,
        "Encoding" => "WinAnsiEncoding",
    })
}

fn install_font_resource(
    doc: &mut LoDocument,
    page_id: ObjectId,
    font_id: ObjectId,
) -> Result<(), LaurelError> {
    let page = doc
        .get_object(page_id)
        .and_then(LoObject::as_dict)
        .map_err(|err| LaurelError::Render(format!("unreadable page: {err}")))?
        .clone();
    let mut resources = page_resources_dict(&page, doc);
    let mut fonts = match resources.get(b"Font") {
        Ok(LoObject::Dictionary(dict)) => dict.clone(),
        Ok(LoObject::Reference(id)) => doc
            .get_object(*id)
            .ok()
            .and_then(|obj| obj.as_dict().ok())
            .cloned()
            .unwrap_or_default(),
        _ => LoDictionary::new(),
    };
    fonts.set(FONT_RESOURCE, LoObject::Reference(font_id));
    resources.set("Font", LoObject::Dictionary(fonts));

    let page_mut = doc
        .get_object_mut(page_id)
        .and_then(LoObject::as_dict_mut)
        .map_err(|err| LaurelError::Render(format!("unreadable page: {err}")))?;
    page_mut.set("Resources", LoObject::Dictionary(resources));
    Ok(())
}

// Restructure the Pages tree around the first page only; prune_objects()
// drops the rest afterwards.
fn keep_single_page(doc: &mut LoDocument, target_page_id: ObjectId) -> Result<(), LaurelError> {
    let root_ref = doc
        .trailer
        .get(b"Root")
        .map_err(|err| LaurelError::Render(format!("no document root: {err}")))?;
    let catalog_id = match root_ref {
        LoObject::Reference(id) => *id,
        _ => {
            return Err(LaurelError::Render(
                "document root is not a reference".to_string(),
            ));
        }
    };
    let pages_id = {
        let catalog = doc
            .get_object(catalog_id)
            .and_then(LoObject::as_dict)
            .map_err(|err| LaurelError::Render(format!("unreadable catalog: {err}")))?;
        match catalog.get(b"Pages") {
            Ok(LoObject::Reference(id)) => *id,
            _ => {
                return Err(LaurelError::Render(
                    "catalog has no pages reference".to_string(),
                ));
            }
        }
    };

    if let Ok(LoObject::Dictionary(pages)) = doc.get_object_mut(pages_id) {
        pages.set(
            "Kids",
            LoObject::Array(vec![LoObject::Reference(target_page_id)]),
        );
        pages.set("Count", LoObject::Integer(1));
    }
    if let Ok(LoObject::Dictionary(page)) = doc.get_object_mut(target_page_id) {
        page.set("Parent", LoObject::Reference(pages_id));
    }
    Ok(())
}

pub(crate) fn encode_winansi_literal(input: &str) -> (String, usize) {
    let mut out = String::new();
    let mut replaced = 0usize;
    for ch in input.chars() {
        let byte = match ch {
            '\u{0000}'..='\u{007F}' => ch as u8,
            '\u{00A0}'..='\u{00FF}' => ch as u8,
            // The cp1252 extensions names actually hit.
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{0152}' => 0x8C,
            '\u{0153}' => 0x9C,
            '\u{0160}' => 0x8A,
            '\u{0161}' => 0x9A,
            '\u{0178}' => 0x9F,
            '\u{017D}' => 0x8E,
            '\u{017E}' => 0x9E,
            _ => {
                replaced += 1;
                b'?'
            }
        };
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b if b < 0x20 || b >= 0x7f => {
                let _ = write!(out, "\\{:03o}", b);
            }
            b => out.push(b as char),
        }
    }
    (out, replaced)
}
