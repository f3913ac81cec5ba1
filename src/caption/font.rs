use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::sync::Arc;
use ttf_parser::name_id;
use ttf_parser::Face;
use usvg::fontdb;

/// Parsed face data plus the handful of metrics the solver needs. The
/// measurement path is deterministic for a given face, but never assumed
/// pixel-identical across platforms.
#[derive(Clone)]
pub struct CaptionFont {
    data: Arc<Vec<u8>>,
    units_per_em: u16,
    space_advance: u16,
    ascender: i16,
    descender: i16,
    family: Option<String>,
    face_index: u32,
}

impl CaptionFont {
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }
}

pub struct ResolvedFont {
    pub metrics: CaptionFont,
    pub family: String,
}

#[cfg(target_os = "macos")]
pub(crate) fn fallback_families() -> &'static [&'static str] {
    &["NotoSans", "Hiragino Sans", "sans-serif"]
}

#[cfg(target_os = "windows")]
pub(crate) fn fallback_families() -> &'static [&'static str] {
    &["NotoSans", "Arial Unicode", "sans-serif"]
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub(crate) fn fallback_families() -> &'static [&'static str] {
    &["NotoSans", "sans-serif"]
}

pub fn load_caption_font(path: &Path) -> Result<CaptionFont> {
    let data =
        std::fs::read(path).with_context(|| format!("failed to read font: {}", path.display()))?;
    load_font_from_data(&data, None)
        .map_err(|err| anyhow!("failed to parse font: {} ({})", path.display(), err))
}

/// Resolves the caption face: explicit path first, then the configured
/// family, then the per-OS fallback chain, all queried at `weight`.
pub fn resolve_caption_font(
    font_path: Option<&Path>,
    font_family: Option<&str>,
    weight: u16,
) -> Result<ResolvedFont> {
    if let Some(path) = font_path {
        let metrics = load_caption_font(path)?;
        let family = metrics
            .family()
            .map(|name| name.to_string())
            .or_else(|| font_family.map(|name| name.to_string()))
            .unwrap_or_else(|| "sans-serif".to_string());
        return Ok(ResolvedFont { metrics, family });
    }

    let mut db = fontdb::Database::new();
    db.load_system_fonts();

    if let Some(family) = font_family {
        return load_font_from_family(&db, family, weight);
    }

    for candidate in fallback_families() {
        if let Ok(resolved) = load_font_from_family(&db, candidate, weight) {
            return Ok(resolved);
        }
    }

    Err(anyhow!("no fallback fonts found"))
}

/// Font pixel size for a caption on a stage: a percentage of the longer
/// side, floored at a legible minimum.
pub fn font_px_for(size_pct: f32, stage_w: f32, stage_h: f32) -> f32 {
    (size_pct / 100.0 * stage_w.max(stage_h)).max(10.0).round()
}

pub(crate) fn measure_line_px(text: &str, font_px: f32, font: Option<&CaptionFont>) -> f32 {
    if let Some(font) = font {
        if let Ok(face) = Face::parse(&font.data, font.face_index) {
            let mut advance = 0u32;
            for ch in text.chars() {
                if ch == '\n' {
                    continue;
                }
                if ch == ' ' {
                    advance = advance.saturating_add(font.space_advance as u32);
                    continue;
                }
                if let Some(glyph) = face.glyph_index(ch) {
                    let glyph_advance = face.glyph_hor_advance(glyph).unwrap_or(font.space_advance);
                    advance = advance.saturating_add(glyph_advance as u32);
                } else {
                    advance = advance.saturating_add(font.space_advance as u32);
                }
            }
            let units = font.units_per_em.max(1) as f32;
            return advance as f32 * (font_px / units);
        }
    }
    estimate_text_width_units(text) * font_px
}

/// Ascent + descent for one line. Without a face this degrades to
/// `0.8 + 0.2` of the font size.
pub(crate) fn line_height_px(font_px: f32, font: Option<&CaptionFont>) -> f32 {
    if let Some(font) = font {
        let units = font.units_per_em.max(1) as f32;
        let extent = (font.ascender as f32 - font.descender as f32).max(1.0);
        return extent * (font_px / units);
    }
    0.8 * font_px + 0.2 * font_px
}

pub(crate) fn ascent_px(font_px: f32, font: Option<&CaptionFont>) -> f32 {
    if let Some(font) = font {
        let units = font.units_per_em.max(1) as f32;
        return font.ascender as f32 * (font_px / units);
    }
    0.8 * font_px
}

/// Measured bounding box of a caption's one or two stacked lines.
#[derive(Debug, Clone, Copy)]
pub struct TextBlockPx {
    pub width: f32,
    pub height: f32,
}

/// Small line runs at 80% of the title size, separated by an 18% gap.
pub(crate) const SMALL_LINE_SCALE: f32 = 0.8;
pub(crate) const LINE_GAP_SCALE: f32 = 0.18;

pub(crate) fn measure_block(
    title: &str,
    small: Option<&str>,
    font_px: f32,
    font: Option<&CaptionFont>,
) -> TextBlockPx {
    let mut width = measure_line_px(title, font_px, font);
    let mut height = line_height_px(font_px, font);
    if let Some(small) = small {
        let small_px = font_px * SMALL_LINE_SCALE;
        width = width.max(measure_line_px(small, small_px, font));
        height += font_px * LINE_GAP_SCALE + line_height_px(small_px, font);
    }
    TextBlockPx {
        width: width.max(1.0),
        height: height.max(1.0),
    }
}

fn estimate_char_units(ch: char) -> f32 {
    if ch.is_whitespace() {
        0.25
    } else if ch.is_ascii_alphanumeric() {
        0.55
    } else if ch.is_ascii() {
        0.35
    } else if matches!(
        ch as u32,
        0x4E00..=0x9FFF | 0x3040..=0x30FF | 0x31F0..=0x31FF
    ) {
        1.0
    } else {
        0.9
    }
}

fn estimate_text_width_units(text: &str) -> f32 {
    text.chars().map(estimate_char_units).sum()
}

fn load_font_from_data(data: &[u8], preferred_family: Option<&str>) -> Result<CaptionFont> {
    let mut fallback = None;
    let count = ttf_parser::fonts_in_collection(data).unwrap_or(1);
    for index in 0..count {
        if let Ok(face) = Face::parse(data, index) {
            let family = extract_family_name(&face);
            let units_per_em = face.units_per_em().max(1);
            let space_advance = face
                .glyph_index(' ')
                .and_then(|id| face.glyph_hor_advance(id))
                .unwrap_or(units_per_em / 2);
            let metrics = CaptionFont {
                data: Arc::new(data.to_vec()),
                units_per_em,
                space_advance,
                ascender: face.ascender(),
                descender: face.descender(),
                family: family.clone(),
                face_index: index,
            };
            if let (Some(preferred), Some(found)) = (preferred_family, &family) {
                if found.eq_ignore_ascii_case(preferred) {
                    return Ok(metrics);
                }
            }
            if fallback.is_none() {
                fallback = Some(metrics);
            }
        }
    }
    if preferred_family.is_some() {
        return Err(anyhow!("font family not found in font file"));
    }
    fallback.ok_or_else(|| anyhow!("failed to parse font data"))
}

fn load_font_from_family(db: &fontdb::Database, family: &str, weight: u16) -> Result<ResolvedFont> {
    let is_sans = family.eq_ignore_ascii_case("sans-serif");
    let families = if is_sans {
        vec![fontdb::Family::SansSerif]
    } else {
        vec![fontdb::Family::Name(family)]
    };
    let query = fontdb::Query {
        families: &families,
        weight: fontdb::Weight(weight),
        ..Default::default()
    };
    let id = db
        .query(&query)
        .ok_or_else(|| anyhow!("font not found: {}", family))?;
    let (data, _face_index) = db
        .with_face_data(id, |data, index| (data.to_vec(), index))
        .ok_or_else(|| anyhow!("failed to load font data: {}", family))?;
    let metrics = load_font_from_data(&data, None)?;
    let resolved_family = metrics
        .family()
        .map(|name| name.to_string())
        .unwrap_or_else(|| family.to_string());
    Ok(ResolvedFont {
        metrics,
        family: resolved_family,
    })
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn font_px_tracks_the_longer_side() {
        assert_eq!(font_px_for(10.0, 1000.0, 800.0), 100.0);
        assert_eq!(font_px_for(10.0, 800.0, 1000.0), 100.0);
    }

    #[test]
    fn font_px_has_a_legible_floor() {
        assert_eq!(font_px_for(1.0, 100.0, 100.0), 10.0);
    }

    #[test]
    fn estimate_width_without_a_face() {
        // "Hello" is five ASCII alphanumerics at 0.55 units each.
        let width = measure_line_px("Hello", 100.0, None);
        assert!((width - 275.0).abs() < 0.01);
    }

    #[test]
    fn estimate_height_without_a_face() {
        assert!((line_height_px(100.0, None) - 100.0).abs() < 0.01);
        assert!((ascent_px(100.0, None) - 80.0).abs() < 0.01);
    }

    #[test]
    fn block_grows_for_a_small_line() {
        let title_only = measure_block("Hello", None, 100.0, None);
        let with_small = measure_block("Hello", Some("May"), 100.0, None);
        assert!(with_small.height > title_only.height);
        // gap (18) + small line height (80)
        assert!((with_small.height - (100.0 + 18.0 + 80.0)).abs() < 0.01);
    }

    #[test]
    fn block_width_is_the_widest_line() {
        let block = measure_block("Hi", Some("a much longer second line"), 100.0, None);
        let small_width = measure_line_px("a much longer second line", 80.0, None);
        assert!((block.width - small_width).abs() < 0.01);
    }
}
