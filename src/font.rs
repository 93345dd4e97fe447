use crate::error::LaurelError;
use crate::types::Pt;
use rustybuzz::{Face as HbFace, UnicodeBuffer};
use std::path::{Path, PathBuf};

/// Which resolution strategy produced the font actually in use. Explicit so
/// callers and tests can tell a real face from the degraded built-in path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontOrigin {
    Custom,
    System,
    Builtin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsSource {
    GlyphTables,
    Heuristic,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextSize {
    pub width: Pt,
    pub height: Pt,
}

pub trait TextMeasure {
    fn measure(&self, text: &str, size: f32) -> TextSize;
    fn source(&self) -> MetricsSource;
}

#[derive(Debug)]
pub(crate) struct FaceMetrics {
    // All vertical metrics and widths are scaled to a 1000-unit em.
    pub(crate) ascent: i16,
    pub(crate) descent: i16,
    pub(crate) cap_height: i16,
    pub(crate) italic_angle: i16,
    pub(crate) bbox: (i16, i16, i16, i16),
    pub(crate) widths: Vec<u16>,
    pub(crate) first_char: u8,
    pub(crate) last_char: u8,
    pub(crate) missing_width: u16,
    pub(crate) is_fixed_pitch: bool,
    pub(crate) base_name: String,
}

impl FaceMetrics {
    fn from_face(face: &ttf_parser::Face<'_>, source_name: &str) -> Self {
        let units_per_em = face.units_per_em().max(1);
        let scale = 1000.0 / units_per_em as f32;
        let first_char = 32u8;
        let last_char = 255u8;

        let mut widths = Vec::with_capacity((last_char - first_char + 1) as usize);
        for code in first_char..=last_char {
            let width = char::from_u32(code as u32)
                .and_then(|ch| face.glyph_index(ch))
                .and_then(|id| face.glyph_hor_advance(id))
                .unwrap_or(0);
            let scaled = (width as f32 * scale).round() as i32;
            widths.push(scaled.clamp(0, u16::MAX as i32) as u16);
        }
        let missing_width = widths.first().copied().unwrap_or(0);

        let ascent = scale_i16(face.ascender(), scale);
        let descent = scale_i16(face.descender(), scale);
        let cap_height = face
            .capital_height()
            .map(|value| scale_i16(value, scale))
            .unwrap_or(ascent);
        let bbox = face.global_bounding_box();
        let bbox = (
            scale_i16(bbox.x_min, scale),
            scale_i16(bbox.y_min, scale),
            scale_i16(bbox.x_max, scale),
            scale_i16(bbox.y_max, scale),
        );
        let italic_angle = face
            .italic_angle()
            .map(|value| value.round() as i16)
            .unwrap_or(0);

        Self {
            ascent,
            descent,
            cap_height,
            italic_angle,
            bbox,
            widths,
            first_char,
            last_char,
            missing_width,
            is_fixed_pitch: face.is_monospaced(),
            base_name: base_font_name(face, source_name),
        }
    }
}

/// A resolved font passed by reference through the render chain. Never a
/// process-global: concurrent batches each hold their own resource.
#[derive(Debug)]
pub struct FontResource {
    data: Option<Vec<u8>>,
    metrics: Option<FaceMetrics>,
    origin: FontOrigin,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct GlyphPlacement {
    pub(crate) glyph_id: u16,
    pub(crate) x_advance: i32,
    pub(crate) x_offset: i32,
    pub(crate) y_offset: i32,
}

impl FontResource {
    pub fn from_bytes(data: Vec<u8>, origin: FontOrigin) -> Result<Self, LaurelError> {
        let Ok(face) = ttf_parser::Face::parse(&data, 0) else {
            return Err(LaurelError::Render("invalid font data".to_string()));
        };
        let metrics = FaceMetrics::from_face(&face, "Embedded");
        Ok(Self {
            data: Some(data),
            metrics: Some(metrics),
            origin,
        })
    }

    /// The minimal degraded resource: heuristic metrics, no outlines.
    pub fn builtin() -> Self {
        Self {
            data: None,
            metrics: None,
            origin: FontOrigin::Builtin,
        }
    }

    /// Ordered resolution: caller bytes, then a system face, then built-in.
    /// A failing strategy logs and falls through rather than erroring.
    pub fn resolve(custom: Option<Vec<u8>>) -> Self {
        if let Some(bytes) = custom {
            match Self::from_bytes(bytes, FontOrigin::Custom) {
                Ok(resource) => return resource,
                Err(err) => {
                    log::warn!("custom font rejected, trying system fonts: {err}");
                }
            }
        }
        if let Some(bytes) = load_system_sans() {
            if let Ok(resource) = Self::from_bytes(bytes, FontOrigin::System) {
                return resource;
            }
        }
        log::warn!("no usable font face found, degrading to built-in metrics");
        Self::builtin()
    }

    pub fn origin(&self) -> FontOrigin {
        self.origin
    }

    pub fn has_face(&self) -> bool {
        self.data.is_some()
    }

    pub(crate) fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    pub(crate) fn metrics(&self) -> Option<&FaceMetrics> {
        self.metrics.as_ref()
    }

    /// Shape `text` into positioned glyphs in font units. `None` without a face.
    pub(crate) fn shaped_glyphs(&self, text: &str) -> Option<(u16, Vec<GlyphPlacement>)> {
        let data = self.data.as_deref()?;
        let face = HbFace::from_slice(data, 0)?;
        let units_per_em = face.units_per_em().max(1) as u16;

        let mut buffer = UnicodeBuffer::new();
        buffer.push_str(text);
        let output = rustybuzz::shape(&face, &[], buffer);
        let infos = output.glyph_infos();
        let positions = output.glyph_positions();
        let mut placements = Vec::with_capacity(infos.len());
        for (info, pos) in infos.iter().zip(positions.iter()) {
            placements.push(GlyphPlacement {
                glyph_id: info.glyph_id.min(u16::MAX as u32) as u16,
                x_advance: pos.x_advance,
                x_offset: pos.x_offset,
                y_offset: pos.y_offset,
            });
        }
        Some((units_per_em, placements))
    }

    fn measure_shaped(&self, text: &str, size: f32) -> Option<TextSize> {
        let metrics = self.metrics.as_ref()?;
        let (units_per_em, placements) = self.shaped_glyphs(text)?;
        if placements.is_empty() {
            return None;
        }
        let upem = units_per_em.max(1) as i64;
        let mut total_units: i32 = 0;
        for placement in &placements {
            let adv = ((placement.x_advance as i64) * 1000 + (upem / 2)) / upem;
            total_units = total_units.saturating_add(adv as i32);
        }
        let size_pt = Pt::from_f32(size);
        Some(TextSize {
            width: size_pt.mul_ratio(total_units.max(0), 1000),
            height: size_pt.mul_ratio(metrics.ascent as i32 - metrics.descent as i32, 1000),
        })
    }

    fn measure_advances(&self, text: &str, size: f32) -> Option<TextSize> {
        let metrics = self.metrics.as_ref()?;
        let data = self.data.as_deref()?;
        let face = ttf_parser::Face::parse(data, 0).ok()?;
        let upem = face.units_per_em().max(1) as i64;
        let mut total_units: i32 = 0;
        for ch in text.chars() {
            let adv = face
                .glyph_index(ch)
                .and_then(|id| face.glyph_hor_advance(id))
                .unwrap_or(metrics.missing_width) as i64;
            let scaled = (adv * 1000 + (upem / 2)) / upem;
            total_units = total_units.saturating_add(scaled as i32);
        }
        let size_pt = Pt::from_f32(size);
        Some(TextSize {
            width: size_pt.mul_ratio(total_units.max(0), 1000),
            height: size_pt.mul_ratio(metrics.ascent as i32 - metrics.descent as i32, 1000),
        })
    }

    fn measure_heuristic(text: &str, size: f32) -> TextSize {
        let count = text.chars().count() as f32;
        TextSize {
            width: Pt::from_f32(0.5 * size * count),
            height: Pt::from_f32(size),
        }
    }
}

impl TextMeasure for FontResource {
    fn measure(&self, text: &str, size: f32) -> TextSize {
        if let Some(measured) = self.measure_shaped(text, size) {
            return measured;
        }
        if let Some(measured) = self.measure_advances(text, size) {
            return measured;
        }
        Self::measure_heuristic(text, size)
    }

    fn source(&self) -> MetricsSource {
        if self.has_face() {
            MetricsSource::GlyphTables
        } else {
            MetricsSource::Heuristic
        }
    }
}

fn scale_i16(value: i16, scale: f32) -> i16 {
    let scaled = (value as f32 * scale).round() as i32;
    scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn base_font_name(face: &ttf_parser::Face<'_>, source_name: &str) -> String {
    use ttf_parser::name::name_id;

    let mut family = None;
    let mut full = None;
    let mut post = None;
    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::POST_SCRIPT_NAME => {
                if post.is_none() {
                    post = Some(name);
                }
            }
            name_id::FULL_NAME => {
                if full.is_none() {
                    full = Some(name);
                }
            }
            name_id::TYPOGRAPHIC_FAMILY | name_id::FAMILY => {
                if family.is_none() {
                    family = Some(name);
                }
            }
            _ => {}
        }
    }
    let raw = post
        .or(full)
        .or(family)
        .unwrap_or_else(|| source_name.to_string());
    sanitize_base_name(&raw)
}

pub(crate) fn sanitize_base_name(name: &str) -> String {
    let out: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '+')
        .collect();
    if out.is_empty() {
        "Embedded".to_string()
    } else {
        out
    }
}

// Plain regular sans faces only; certificates in the source tool never select
// styled variants.
const SYSTEM_SANS_CANDIDATES: &[&str] = &[
    "DejaVuSans.ttf",
    "LiberationSans-Regular.ttf",
    "NotoSans-Regular.ttf",
    "arial.ttf",
    "Arial.ttf",
    "segoeui.ttf",
];

fn load_system_sans() -> Option<Vec<u8>> {
    for dir in system_font_dirs() {
        for candidate in SYSTEM_SANS_CANDIDATES {
            let path = dir.join(candidate);
            let Ok(bytes) = std::fs::read(&path) else {
                continue;
            };
            if ttf_parser::Face::parse(&bytes, 0).is_ok() {
                log::debug!("system font selected: {}", path.display());
                return Some(bytes);
            }
        }
        // Fonts on Linux commonly sit one directory level down.
        if let Some(bytes) = scan_subdirs(&dir) {
            return Some(bytes);
        }
    }
    None
}

fn scan_subdirs(dir: &Path) -> Option<Vec<u8>> {
    let entries = std::fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        for candidate in SYSTEM_SANS_CANDIDATES {
            let file = path.join(candidate);
            let Ok(bytes) = std::fs::read(&file) else {
                continue;
            };
            if ttf_parser::Face::parse(&bytes, 0).is_ok() {
                log::debug!("system font selected: {}", file.display());
                return Some(bytes);
            }
        }
    }
    None
}

fn system_font_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    #[cfg(target_os = "windows")]
    {
        dirs.push(PathBuf::from(r"C:\Windows\Fonts"));
        if let Ok(windir) = std::env::var("WINDIR") {
            dirs.push(PathBuf::from(windir).join("Fonts"));
        }
    }

    #[cfg(target_os = "linux")]
    {
        dirs.push(PathBuf::from("/usr/share/fonts/truetype/dejavu"));
        dirs.push(PathBuf::from("/usr/share/fonts/truetype/liberation"));
        dirs.push(PathBuf::from("/usr/share/fonts/truetype"));
        dirs.push(PathBuf::from("/usr/share/fonts"));
        dirs.push(PathBuf::from("/usr/local/share/fonts"));
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(home).join(".fonts"));
        }
    }

    #[cfg(target_os = "macos")]
    {
        dirs.push(PathBuf::from("/System/Library/Fonts"));
        dirs.push(PathBuf::from("/Library/Fonts"));
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(home).join("Library/Fonts"));
        }
    }

    if let Ok(extra) = std::env::var("LAUREL_FONT_DIR") {
        for path in std::env::split_paths(&extra) {
            if !path.as_os_str().is_empty() {
                dirs.push(path);
            }
        }
    }

    dirs
}
