use crate::error::LaurelError;
use crate::types::PageGeometry;
use lopdf::content::Content;
use lopdf::{Dictionary as LoDictionary, Document as LoDocument, Object as LoObject, ObjectId};
use std::sync::OnceLock;
use tiny_skia::{Pixmap, PixmapPaint, Transform};

// Raster surfaces above this edge length are almost certainly a bad DPI or a
// corrupt page box, not a real certificate.
const MAX_RASTER_EDGE_PX: i64 = 20_000;

/// The first page of a template document, prepared once per group and shared
/// read-only across every name rendered from it.
#[derive(Debug)]
pub struct TemplatePage {
    bytes: Vec<u8>,
    geometry: PageGeometry,
    dpi: u32,
    raster_base: OnceLock<Pixmap>,
}

impl TemplatePage {
    pub fn prepare(bytes: &[u8], dpi: u32) -> Result<Self, LaurelError> {
        if dpi == 0 {
            return Err(LaurelError::InvalidPlacement(
                "dpi must be > 0".to_string(),
            ));
        }
        let doc = LoDocument::load_mem(bytes)
            .map_err(|err| LaurelError::Template(format!("invalid template pdf: {err}")))?;
        if doc.is_encrypted() {
            return Err(LaurelError::Template(
                "template pdf is encrypted".to_string(),
            ));
        }
        let page_id = first_page_id(&doc)?;
        let page = doc
            .get_object(page_id)
            .and_then(LoObject::as_dict)
            .map_err(|err| LaurelError::Template(format!("unreadable template page: {err}")))?;
        let (width_pt, height_pt) = page_box_size(&doc, page);
        if width_pt <= 0.0 || height_pt <= 0.0 {
            return Err(LaurelError::Template(format!(
                "degenerate page box {width_pt}x{height_pt}"
            )));
        }
        let width_px = pt_to_px_dim(width_pt, dpi)?;
        let height_px = pt_to_px_dim(height_pt, dpi)?;

        Ok(Self {
            bytes: bytes.to_vec(),
            geometry: PageGeometry {
                width_px,
                height_px,
                width_pt,
                height_pt,
            },
            dpi,
            raster_base: OnceLock::new(),
        })
    }

    pub fn geometry(&self) -> &PageGeometry {
        &self.geometry
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The rasterized page background: white base plus the page's placed
    /// image XObjects. Built once, then cloned per render.
    pub(crate) fn raster_base(&self) -> Result<&Pixmap, LaurelError> {
        if self.raster_base.get().is_none() {
            let pixmap = self.rasterize()?;
            let _ = self.raster_base.set(pixmap);
        }
        self.raster_base
            .get()
            .ok_or_else(|| LaurelError::Render("raster base unavailable".to_string()))
    }

    fn rasterize(&self) -> Result<Pixmap, LaurelError> {
        let mut pixmap = Pixmap::new(self.geometry.width_px, self.geometry.height_px)
            .ok_or_else(|| {
                LaurelError::Template(format!(
                    "invalid raster size {}x{} at {} dpi",
                    self.geometry.width_px, self.geometry.height_px, self.dpi
                ))
            })?;
        pixmap.fill(tiny_skia::Color::from_rgba8(255, 255, 255, 255));

        // The template was already validated in prepare(); a load failure
        // here would be a caller bug, not bad input.
        let doc = LoDocument::load_mem(&self.bytes)
            .map_err(|err| LaurelError::Template(format!("invalid template pdf: {err}")))?;
        let page_id = first_page_id(&doc)?;
        let Ok(raw_content) = doc.get_page_content(page_id) else {
            return Ok(pixmap);
        };
        let Ok(content) = Content::decode(&raw_content) else {
            log::debug!("template content stream undecodable, rendering white base");
            return Ok(pixmap);
        };

        let page = match doc.get_object(page_id).and_then(LoObject::as_dict) {
            Ok(dict) => dict.clone(),
            Err(_) => return Ok(pixmap),
        };
        let resources = page_resources_dict(&page, &doc);
        let xobjects = page_xobject_dict(&resources, &doc);

        let scale = self.dpi as f32 / 72.0;
        let base = Transform::from_row(
            scale,
            0.0,
            0.0,
            -scale,
            0.0,
            self.geometry.height_pt * scale,
        );

        let mut ctm = Matrix::identity();
        let mut stack: Vec<Matrix> = Vec::new();
        for op in &content.operations {
            match op.operator.as_str() {
                "q" => stack.push(ctm),
                "Q" => ctm = stack.pop().unwrap_or_else(Matrix::identity),
                "cm" => {
                    if op.operands.len() == 6 {
                        let mut values = [0.0f32; 6];
                        let mut ok = true;
                        for (slot, operand) in values.iter_mut().zip(op.operands.iter()) {
                            match object_f32(operand) {
                                Some(value) => *slot = value,
                                None => ok = false,
                            }
                        }
                        if ok {
                            let m = Matrix::from_operands(
                                values[0], values[1], values[2], values[3], values[4], values[5],
                            );
                            ctm = m.concat(ctm);
                        }
                    }
                }
                "Do" => {
                    let Some(LoObject::Name(name)) = op.operands.first() else {
                        continue;
                    };
                    let Some(image) = lookup_image(&doc, &xobjects, name) else {
                        continue;
                    };
                    draw_image(&mut pixmap, &image, ctm, base);
                }
                _ => {}
            }
        }

        Ok(pixmap)
    }
}

pub(crate) fn first_page_id(doc: &LoDocument) -> Result<ObjectId, LaurelError> {
    doc.get_pages()
        .values()
        .next()
        .copied()
        .ok_or_else(|| LaurelError::Template("template has no pages".to_string()))
}

fn pt_to_px_dim(pt: f32, dpi: u32) -> Result<u32, LaurelError> {
    let px = (pt as f64 * dpi as f64 / 72.0).round() as i64;
    if px <= 0 || px > MAX_RASTER_EDGE_PX {
        return Err(LaurelError::Template(format!(
            "raster dimension out of range: {px} px from {pt} pt at {dpi} dpi"
        )));
    }
    Ok(px as u32)
}

fn page_box_size(doc: &LoDocument, page: &LoDictionary) -> (f32, f32) {
    let boxed = page_box(doc, page);
    if boxed.len() != 4 {
        return (612.0, 792.0);
    }
    let values: Vec<f32> = boxed.iter().filter_map(object_f32).collect();
    if values.len() != 4 {
        return (612.0, 792.0);
    }
    ((values[2] - values[0]).abs(), (values[3] - values[1]).abs())
}

fn page_box(doc: &LoDocument, page: &LoDictionary) -> Vec<LoObject> {
    for key in [b"CropBox".as_slice(), b"MediaBox".as_slice()] {
        match page.get(key) {
            Ok(LoObject::Array(arr)) => return arr.clone(),
            Ok(LoObject::Reference(id)) => {
                if let Ok(LoObject::Array(arr)) = doc.get_object(*id) {
                    return arr.clone();
                }
            }
            _ => {}
        }
    }
    // Walk up the page tree; MediaBox is frequently inherited.
    if let Ok(LoObject::Reference(parent_id)) = page.get(b"Parent") {
        if let Ok(parent) = doc.get_object(*parent_id).and_then(LoObject::as_dict) {
            return page_box(doc, parent);
        }
    }
    vec![0.into(), 0.into(), 612.into(), 792.into()]
}

pub(crate) fn page_resources_dict(page: &LoDictionary, doc: &LoDocument) -> LoDictionary {
    match page.get(b"Resources") {
        Ok(LoObject::Dictionary(dict)) => dict.clone(),
        Ok(LoObject::Reference(id)) => doc
            .get_object(*id)
            .ok()
            .and_then(|obj| obj.as_dict().ok())
            .cloned()
            .unwrap_or_default(),
        _ => LoDictionary::new(),
    }
}

fn page_xobject_dict(resources: &LoDictionary, doc: &LoDocument) -> LoDictionary {
    match resources.get(b"XObject") {
        Ok(LoObject::Dictionary(dict)) => dict.clone(),
        Ok(LoObject::Reference(id)) => doc
            .get_object(*id)
            .ok()
            .and_then(|obj| obj.as_dict().ok())
            .cloned()
            .unwrap_or_default(),
        _ => LoDictionary::new(),
    }
}

pub(crate) fn object_f32(object: &LoObject) -> Option<f32> {
    match object {
        LoObject::Integer(value) => Some(*value as f32),
        LoObject::Real(value) => Some(*value),
        _ => None,
    }
}

fn lookup_image(doc: &LoDocument, xobjects: &LoDictionary, name: &[u8]) -> Option<Pixmap> {
    let id = match xobjects.get(name).ok()? {
        LoObject::Reference(id) => *id,
        _ => return None,
    };
    let stream = doc.get_object(id).ok()?.as_stream().ok()?;
    image_xobject_pixmap(stream)
}

fn image_xobject_pixmap(stream: &lopdf::Stream) -> Option<Pixmap> {
    let dict = &stream.dict;
    match dict.get(b"Subtype") {
        Ok(LoObject::Name(name)) if name == b"Image" => {}
        _ => return None,
    }
    let width = dict.get(b"Width").ok().and_then(object_i64)?;
    let height = dict.get(b"Height").ok().and_then(object_i64)?;
    if width <= 0 || height <= 0 {
        return None;
    }
    let (width, height) = (width as u32, height as u32);

    if stream_filters(dict).iter().any(|f| f == b"DCTDecode") {
        let decoded =
            image::load_from_memory_with_format(&stream.content, image::ImageFormat::Jpeg).ok()?;
        return pixmap_from_rgba(&decoded.to_rgba8());
    }

    let bpc = dict.get(b"BitsPerComponent").ok().and_then(object_i64)?;
    if bpc != 8 {
        return None;
    }
    let data = stream.decompressed_content().ok()?;
    let channels = match dict.get(b"ColorSpace") {
        Ok(LoObject::Name(name)) if name == b"DeviceRGB" => 3usize,
        Ok(LoObject::Name(name)) if name == b"DeviceGray" => 1usize,
        _ => return None,
    };
    let expected = (width as usize) * (height as usize) * channels;
    if data.len() < expected {
        return None;
    }
    let mut pixmap = Pixmap::new(width, height)?;
    let dst = pixmap.data_mut();
    for (index, px) in dst.chunks_exact_mut(4).enumerate() {
        let offset = index * channels;
        let (r, g, b) = if channels == 3 {
            (data[offset], data[offset + 1], data[offset + 2])
        } else {
            let v = data[offset];
            (v, v, v)
        };
        px[0] = r;
        px[1] = g;
        px[2] = b;
        px[3] = 255;
    }
    Some(pixmap)
}

fn stream_filters(dict: &LoDictionary) -> Vec<Vec<u8>> {
    match dict.get(b"Filter") {
        Ok(LoObject::Name(name)) => vec![name.clone()],
        Ok(LoObject::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                LoObject::Name(name) => Some(name.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn object_i64(object: &LoObject) -> Option<i64> {
    match object {
        LoObject::Integer(value) => Some(*value),
        LoObject::Real(value) => Some(*value as i64),
        _ => None,
    }
}

fn pixmap_from_rgba(rgba: &image::RgbaImage) -> Option<Pixmap> {
    let (width, height) = rgba.dimensions();
    let mut pixmap = Pixmap::new(width, height)?;
    let src = rgba.as_raw();
    let dst = pixmap.data_mut();
    for (src_px, dst_px) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
        let a = src_px[3];
        dst_px[0] = premul_u8(src_px[0], a);
        dst_px[1] = premul_u8(src_px[1], a);
        dst_px[2] = premul_u8(src_px[2], a);
        dst_px[3] = a;
    }
    Some(pixmap)
}

fn premul_u8(channel: u8, alpha: u8) -> u8 {
    let prod = (channel as u16) * (alpha as u16) + 127;
    ((prod + (prod >> 8)) >> 8) as u8
}

fn draw_image(pixmap: &mut Pixmap, image: &Pixmap, ctm: Matrix, base: Transform) {
    let src_w = image.width() as f32;
    let src_h = image.height() as f32;
    if src_w <= 0.0 || src_h <= 0.0 {
        return;
    }
    // Image space is the unit square with row 0 at the visual top; map pixel
    // coordinates into it, then through the CTM, then into device pixels.
    let unit = Transform::from_row(1.0 / src_w, 0.0, 0.0, -1.0 / src_h, 0.0, 1.0);
    let ctm_sk = Transform::from_row(ctm.a, ctm.b, ctm.c, ctm.d, ctm.e, ctm.f);
    let total = base.pre_concat(ctm_sk).pre_concat(unit);
    let mut paint = PixmapPaint::default();
    paint.quality = tiny_skia::FilterQuality::Bilinear;
    pixmap.draw_pixmap(0, 0, image.as_ref(), &paint, total, None);
}

#[derive(Clone, Copy, Debug)]
struct Matrix {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
}

impl Matrix {
    fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: 0.0,
            f: 0.0,
        }
    }

    fn from_operands(a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) -> Self {
        Self { a, b, c, d, e, f }
    }

    // Apply self, then rhs.
    fn concat(self, rhs: Self) -> Self {
        Self {
            a: self.a * rhs.a + self.b * rhs.c,
            b: self.a * rhs.b + self.b * rhs.d,
            c: self.c * rhs.a + self.d * rhs.c,
            d: self.c * rhs.b + self.d * rhs.d,
            e: self.e * rhs.a + self.f * rhs.c + rhs.e,
            f: self.e * rhs.b + self.f * rhs.d + rhs.f,
        }
    }
}
