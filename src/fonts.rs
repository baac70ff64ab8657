//! Font loading and glyph outlines for raster text.
//!
//! Text painted into pixel buffers (watermarks, scene text) is turned into
//! closed contours and filled by [`crate::raster`]. A TrueType/OpenType
//! face loaded with [`FontManager::load_font`] is outlined through
//! `ttf-parser`. Without one, a built-in 5×7 block font covers printable
//! ASCII so output stays reproducible on machines with no fonts installed.

use std::collections::HashMap;

use crate::raster::{Contour, Vec2};

/// Block-font cell grid.
const BLOCK_COLS: usize = 5;
const BLOCK_ROWS: usize = 7;
/// Cell size as a fraction of the font size.
const BLOCK_CELL_EM: f32 = 0.1;
/// Advance in cells (glyph width + one column of spacing).
const BLOCK_ADVANCE_CELLS: f32 = 6.0;
/// Builtin ascender, Helvetica-like.
const BUILTIN_ASCENDER_EM: f32 = 0.75;

/// Curve flattening steps for quadratic and cubic segments.
const CURVE_STEPS: usize = 8;

/// A loaded font face with metrics.
#[derive(Clone)]
pub struct FontData {
    /// Raw font bytes (kept alive for ttf-parser's zero-copy API).
    /// Empty for the builtin block font.
    pub bytes: Vec<u8>,
    pub units_per_em: f32,
    pub ascender: f32,
    pub descender: f32,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct FontKey {
    pub family: String,
    pub bold: bool,
}

/// Text converted to contours, in pixels, origin at the top-left of the
/// text's line box.
#[derive(Debug, Clone, Default)]
pub struct TextOutline {
    pub contours: Vec<Contour>,
    pub width: f32,
    pub height: f32,
    /// Non-whitespace characters the font has no glyph for, in text order.
    pub missing: Vec<char>,
}

impl TextOutline {
    pub fn is_empty(&self) -> bool {
        self.contours.is_empty()
    }
}

/// Manages loaded fonts.
pub struct FontManager {
    fonts: HashMap<FontKey, FontData>,
    default_key: FontKey,
}

impl FontManager {
    pub fn new() -> Self {
        Self {
            fonts: HashMap::new(),
            default_key: FontKey {
                family: "builtin".to_string(),
                bold: false,
            },
        }
    }

    /// Load a TTF/OTF font from bytes. The first font loaded becomes the
    /// default for unknown families.
    pub fn load_font(&mut self, family: &str, bold: bool, bytes: Vec<u8>) -> Result<(), String> {
        let face = ttf_parser::Face::parse(&bytes, 0).map_err(|e| format!("Failed to parse font: {e}"))?;

        let data = FontData {
            units_per_em: face.units_per_em() as f32,
            ascender: face.ascender() as f32,
            descender: face.descender() as f32,
            bytes,
        };

        let key = FontKey {
            family: family.to_string(),
            bold,
        };
        if !self.has_real_fonts() {
            self.default_key = key.clone();
        }
        self.fonts.insert(key, data);
        Ok(())
    }

    /// Register the builtin block font under the default key.
    pub fn ensure_default(&mut self) {
        self.fonts.entry(self.default_key.clone()).or_insert(FontData {
            bytes: Vec::new(),
            units_per_em: 1000.0,
            ascender: BUILTIN_ASCENDER_EM * 1000.0,
            descender: -250.0,
        });
    }

    /// Get font data for a family, falling back to the default.
    fn get(&self, family: &str, bold: bool) -> Option<&FontData> {
        let key = FontKey {
            family: family.to_string(),
            bold,
        };
        self.fonts.get(&key).or_else(|| self.fonts.get(&self.default_key))
    }

    /// Family used when a caller has no preference: the first loaded face,
    /// or `builtin` when none is loaded.
    pub fn default_family(&self) -> &str {
        &self.default_key.family
    }

    /// Check if real font bytes are loaded for the default font.
    pub fn has_real_fonts(&self) -> bool {
        self.fonts
            .get(&self.default_key)
            .map(|d| !d.bytes.is_empty())
            .unwrap_or(false)
    }

    /// Measure the advance width of a string at `font_size` px.
    pub fn measure_text_width(&self, text: &str, font_size: f32, family: &str) -> f32 {
        self.outline_text(text, font_size, family).width
    }

    /// Outline a single line of text at `font_size` px.
    ///
    /// Characters with no glyph in the selected font advance the pen but
    /// produce no contours; they are listed in [`TextOutline::missing`].
    pub fn outline_text(&self, text: &str, font_size: f32, family: &str) -> TextOutline {
        let Some(data) = self.get(family, false) else {
            return outline_block_text(text, font_size);
        };
        if data.bytes.is_empty() {
            return outline_block_text(text, font_size);
        }
        match ttf_parser::Face::parse(&data.bytes, 0) {
            Ok(face) => outline_face_text(&face, data, text, font_size),
            Err(e) => {
                log::warn!("loaded font no longer parses ({e}); using builtin glyphs");
                outline_block_text(text, font_size)
            }
        }
    }
}

impl Default for FontManager {
    fn default() -> Self {
        let mut mgr = Self::new();
        mgr.ensure_default();
        mgr
    }
}

// ---------------------------------------------------------------------------
// TrueType outlines
// ---------------------------------------------------------------------------

/// Collects glyph outlines into flattened pixel-space contours.
struct ContourBuilder {
    scale: f32,
    origin_x: f32,
    baseline: f32,
    contours: Vec<Contour>,
    current: Contour,
    last: Vec2,
}

impl ContourBuilder {
    fn map(&self, x: f32, y: f32) -> Vec2 {
        Vec2::new(self.origin_x + x * self.scale, self.baseline - y * self.scale)
    }

    fn finish_contour(&mut self) {
        if self.current.len() >= 3 {
            self.contours.push(std::mem::take(&mut self.current));
        } else {
            self.current.clear();
        }
    }
}

impl ttf_parser::OutlineBuilder for ContourBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        self.finish_contour();
        let p = self.map(x, y);
        self.current.push(p);
        self.last = p;
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let p = self.map(x, y);
        self.current.push(p);
        self.last = p;
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let p0 = self.last;
        let c = self.map(x1, y1);
        let p1 = self.map(x, y);
        for i in 1..=CURVE_STEPS {
            let t = i as f32 / CURVE_STEPS as f32;
            let mt = 1.0 - t;
            self.current.push(Vec2::new(
                mt * mt * p0.x + 2.0 * mt * t * c.x + t * t * p1.x,
                mt * mt * p0.y + 2.0 * mt * t * c.y + t * t * p1.y,
            ));
        }
        self.last = p1;
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let p0 = self.last;
        let c1 = self.map(x1, y1);
        let c2 = self.map(x2, y2);
        let p1 = self.map(x, y);
        for i in 1..=CURVE_STEPS {
            let t = i as f32 / CURVE_STEPS as f32;
            let mt = 1.0 - t;
            let a = mt * mt * mt;
            let b = 3.0 * mt * mt * t;
            let c = 3.0 * mt * t * t;
            let d = t * t * t;
            self.current.push(Vec2::new(
                a * p0.x + b * c1.x + c * c2.x + d * p1.x,
                a * p0.y + b * c1.y + c * c2.y + d * p1.y,
            ));
        }
        self.last = p1;
    }

    fn close(&mut self) {
        self.finish_contour();
    }
}

fn outline_face_text(face: &ttf_parser::Face<'_>, data: &FontData, text: &str, font_size: f32) -> TextOutline {
    let scale = font_size / data.units_per_em;
    let mut builder = ContourBuilder {
        scale,
        origin_x: 0.0,
        baseline: data.ascender * scale,
        contours: Vec::new(),
        current: Vec::new(),
        last: Vec2::new(0.0, 0.0),
    };
    let mut pen_x = 0.0f32;
    let mut missing = Vec::new();
    for ch in text.chars() {
        match face.glyph_index(ch) {
            Some(gid) => {
                builder.origin_x = pen_x;
                face.outline_glyph(gid, &mut builder);
                builder.finish_contour();
                pen_x += face.glyph_hor_advance(gid).unwrap_or(0) as f32 * scale;
            }
            None => {
                if !ch.is_whitespace() {
                    missing.push(ch);
                }
                pen_x += font_size * 0.5;
            }
        }
    }
    TextOutline {
        contours: builder.contours,
        width: pen_x,
        height: (data.ascender - data.descender) * scale,
        missing,
    }
}

// ---------------------------------------------------------------------------
// Builtin block font
// ---------------------------------------------------------------------------

/// Rows of a 5×7 glyph, MSB of the low five bits = leftmost column.
fn block_glyph(ch: char) -> Option<[u8; BLOCK_ROWS]> {
    let rows = match ch.to_ascii_uppercase() {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x0A, 0x04, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        ' ' => [0x00; BLOCK_ROWS],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        ',' => [0x00, 0x00, 0x00, 0x00, 0x0C, 0x04, 0x08],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '+' => [0x00, 0x04, 0x04, 0x1F, 0x04, 0x04, 0x00],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '!' => [0x04, 0x04, 0x04, 0x04, 0x04, 0x00, 0x04],
        '?' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04],
        '\'' => [0x04, 0x04, 0x08, 0x00, 0x00, 0x00, 0x00],
        '/' => [0x01, 0x01, 0x02, 0x04, 0x08, 0x10, 0x10],
        '&' => [0x0C, 0x12, 0x14, 0x08, 0x15, 0x12, 0x0D],
        '#' => [0x0A, 0x0A, 0x1F, 0x0A, 0x1F, 0x0A, 0x0A],
        '@' => [0x0E, 0x11, 0x17, 0x15, 0x17, 0x10, 0x0F],
        '(' => [0x02, 0x04, 0x08, 0x08, 0x08, 0x04, 0x02],
        ')' => [0x08, 0x04, 0x02, 0x02, 0x02, 0x04, 0x08],
        _ => return None,
    };
    Some(rows)
}

fn outline_block_text(text: &str, font_size: f32) -> TextOutline {
    let cell = font_size * BLOCK_CELL_EM;
    // Glyph top sits so the bottom row rests on the builtin baseline.
    let top = font_size * BUILTIN_ASCENDER_EM - BLOCK_ROWS as f32 * cell;
    let mut contours = Vec::new();
    let mut missing = Vec::new();
    let mut pen_x = 0.0f32;

    for ch in text.chars() {
        if let Some(rows) = block_glyph(ch) {
            for (r, bits) in rows.iter().enumerate() {
                // Merge horizontal runs of lit cells into one rectangle.
                let mut col = 0;
                while col < BLOCK_COLS {
                    if bits & (1 << (BLOCK_COLS - 1 - col)) == 0 {
                        col += 1;
                        continue;
                    }
                    let start = col;
                    while col < BLOCK_COLS && bits & (1 << (BLOCK_COLS - 1 - col)) != 0 {
                        col += 1;
                    }
                    let x0 = pen_x + start as f32 * cell;
                    let x1 = pen_x + col as f32 * cell;
                    let y0 = top + r as f32 * cell;
                    let y1 = y0 + cell;
                    contours.push(vec![
                        Vec2::new(x0, y0),
                        Vec2::new(x1, y0),
                        Vec2::new(x1, y1),
                        Vec2::new(x0, y1),
                    ]);
                }
            }
        } else if !ch.is_whitespace() {
            missing.push(ch);
        }
        pen_x += BLOCK_ADVANCE_CELLS * cell;
    }

    // Drop the trailing spacing column so centred text is centred on ink.
    let width = if text.is_empty() { 0.0 } else { pen_x - cell };
    TextOutline {
        contours,
        width,
        height: font_size,
        missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_text_width() {
        let mgr = FontManager::default();
        let w = mgr.measure_text_width("Hello", 10.0, "builtin");
        // 5 glyphs × 6 cells − 1 trailing cell = 29 cells of 1 px
        assert!((w - 29.0).abs() < 1e-4, "{w}");
    }

    #[test]
    fn builtin_glyphs_are_case_insensitive() {
        let mgr = FontManager::default();
        let upper = mgr.outline_text("A", 20.0, "builtin");
        let lower = mgr.outline_text("a", 20.0, "builtin");
        assert_eq!(upper.contours.len(), lower.contours.len());
        assert!(!upper.is_empty());
    }

    #[test]
    fn unknown_glyphs_advance_without_ink() {
        let mgr = FontManager::default();
        let outline = mgr.outline_text("\u{2603}\u{2603}", 20.0, "builtin");
        assert!(outline.is_empty());
        assert!(outline.width > 0.0);
        assert_eq!(outline.missing, vec!['\u{2603}', '\u{2603}']);
    }

    #[test]
    fn accented_letters_are_reported_missing() {
        let mgr = FontManager::default();
        let outline = mgr.outline_text("ÉBAUCHE v2", 20.0, "builtin");
        assert!(!outline.is_empty());
        assert_eq!(outline.missing, vec!['É']);
    }

    #[test]
    fn first_loaded_face_becomes_the_default_family() {
        let mut mgr = FontManager::default();
        assert_eq!(mgr.default_family(), "builtin");
        mgr.load_font("Square", false, square_glyph_font()).unwrap();
        mgr.load_font("Other", false, square_glyph_font()).unwrap();
        assert_eq!(mgr.default_family(), "Square");
        assert!(mgr.has_real_fonts());

        let builtin = mgr.outline_text("AB", 100.0, "builtin");
        let face = mgr.outline_text("AB", 100.0, mgr.default_family());
        // One closed square per letter, 600 units advance each.
        assert_eq!(face.contours.len(), 2);
        assert!((face.width - 120.0).abs() < 1e-3, "{}", face.width);
        assert_ne!(builtin.contours.len(), face.contours.len());
    }

    #[test]
    fn loaded_face_reports_characters_outside_its_cmap() {
        let mut mgr = FontManager::default();
        mgr.load_font("Square", false, square_glyph_font()).unwrap();
        let outline = mgr.outline_text("A-Z", 50.0, "Square");
        assert_eq!(outline.contours.len(), 2);
        assert_eq!(outline.missing, vec!['-']);
    }

    #[test]
    fn glyph_rows_sit_above_baseline() {
        let outline = outline_block_text("I", 100.0);
        let max_y = outline
            .contours
            .iter()
            .flatten()
            .map(|p| p.y)
            .fold(f32::MIN, f32::max);
        assert!((max_y - 75.0).abs() < 1e-3, "{max_y}");
    }

    #[test]
    fn unparseable_font_bytes_are_rejected() {
        let mut mgr = FontManager::default();
        assert!(mgr.load_font("Broken", false, vec![0, 1, 2, 3]).is_err());
        assert!(!mgr.has_real_fonts());
    }
}

/// A tiny TrueType face: glyphs for `A`..=`Z`, each a filled 400×700 unit
/// square on a 1000 unit em with a 600 unit advance.
#[cfg(test)]
pub(crate) fn square_glyph_font() -> Vec<u8> {
    const GLYPHS: u16 = 27;

    fn be16(out: &mut Vec<u8>, v: u16) {
        out.extend_from_slice(&v.to_be_bytes());
    }
    fn be32(out: &mut Vec<u8>, v: u32) {
        out.extend_from_slice(&v.to_be_bytes());
    }

    let mut cmap = Vec::new();
    for v in [0u16, 1, 0, 3, 0, 12] {
        be16(&mut cmap, v);
    }
    // Format 4: 'A'..='Z' map to glyphs 1..=26, plus the 0xFFFF terminator.
    for v in [4u16, 32, 0, 4, 4, 1, 0, 0x5A, 0xFFFF, 0, 0x41, 0xFFFF] {
        be16(&mut cmap, v);
    }
    be16(&mut cmap, 1u16.wrapping_sub(0x41));
    for v in [1u16, 0, 0] {
        be16(&mut cmap, v);
    }

    let mut square = Vec::new();
    for v in [1u16, 100, 0, 500, 700, 3, 0] {
        be16(&mut square, v);
    }
    square.extend_from_slice(&[1, 1, 1, 1]);
    for v in [100i16, 400, 0, -400, 0, 0, 700, 0] {
        be16(&mut square, v as u16);
    }
    let mut glyf = Vec::new();
    let mut loca = Vec::new();
    be32(&mut loca, 0);
    be32(&mut loca, 0);
    for _ in 1..GLYPHS {
        glyf.extend_from_slice(&square);
        be32(&mut loca, glyf.len() as u32);
    }

    let mut head = Vec::new();
    be32(&mut head, 0x0001_0000);
    be32(&mut head, 0x0001_0000);
    be32(&mut head, 0);
    be32(&mut head, 0x5F0F_3CF5);
    be16(&mut head, 0);
    be16(&mut head, 1000);
    head.extend_from_slice(&[0; 16]);
    for v in [0u16, 0, 600, 700, 0, 8, 2] {
        be16(&mut head, v);
    }
    be16(&mut head, 1); // long loca offsets
    be16(&mut head, 0);

    let mut hhea = Vec::new();
    be32(&mut hhea, 0x0001_0000);
    for v in [800i16, -200, 0] {
        be16(&mut hhea, v as u16);
    }
    be16(&mut hhea, 600);
    for v in [0u16, 0, 500, 1, 0, 0, 0, 0, 0, 0, 0] {
        be16(&mut hhea, v);
    }
    be16(&mut hhea, GLYPHS);

    let mut hmtx = Vec::new();
    for _ in 0..GLYPHS {
        be16(&mut hmtx, 600);
        be16(&mut hmtx, 0);
    }

    let mut maxp = Vec::new();
    be32(&mut maxp, 0x0000_5000);
    be16(&mut maxp, GLYPHS);

    let tables: [(&[u8; 4], Vec<u8>); 7] = [
        (b"cmap", cmap),
        (b"glyf", glyf),
        (b"head", head),
        (b"hhea", hhea),
        (b"hmtx", hmtx),
        (b"loca", loca),
        (b"maxp", maxp),
    ];
    let mut font = Vec::new();
    be32(&mut font, 0x0001_0000);
    for v in [tables.len() as u16, 64, 2, 48] {
        be16(&mut font, v);
    }
    let mut offset = 12 + 16 * tables.len();
    for (tag, data) in &tables {
        font.extend_from_slice(*tag);
        be32(&mut font, 0);
        be32(&mut font, offset as u32);
        be32(&mut font, data.len() as u32);
        offset += data.len().next_multiple_of(4);
    }
    for (_, data) in &tables {
        font.extend_from_slice(data);
        font.resize(font.len().next_multiple_of(4), 0);
    }
    font
}
