use ab_glyph::{point, Font, FontArc, GlyphId, ScaleFont};
use image::RgbaImage;

/// Font families tried, in order, for the preview header band.
const UI_FAMILIES: &[&str] = &[
    "DejaVu Sans",
    "Liberation Sans",
    "Noto Sans",
    "Arial",
    "Helvetica",
    "Segoe UI",
];

/// Lay out a single line of text left-aligned at x = 0.
/// Returns `(glyphs, total_width)`, each glyph as `(id, x)`.
pub fn layout_line(font: &FontArc, text: &str, font_size: f32) -> (Vec<(GlyphId, f32)>, f32) {
    let scaled = font.as_scaled(font_size);
    let mut glyphs = Vec::with_capacity(text.len());
    let mut cursor_x = 0.0f32;
    let mut last_glyph: Option<GlyphId> = None;

    for ch in text.chars() {
        let glyph_id = font.glyph_id(ch);
        if let Some(prev) = last_glyph {
            cursor_x += scaled.kern(prev, glyph_id);
        }
        glyphs.push((glyph_id, cursor_x));
        cursor_x += scaled.h_advance(glyph_id);
        last_glyph = Some(glyph_id);
    }

    (glyphs, cursor_x)
}

/// Rasterize one line of text straight into `img`, alpha-blending `color`
/// by glyph coverage. `baseline_y` is the baseline in image coordinates.
/// Pixels falling outside the image are dropped.
pub fn draw_line(
    img: &mut RgbaImage,
    font: &FontArc,
    text: &str,
    font_size: f32,
    origin_x: f32,
    baseline_y: f32,
    color: [u8; 3],
) {
    let (w, h) = img.dimensions();
    let (glyphs, _) = layout_line(font, text, font_size);

    for (glyph_id, gx) in glyphs {
        let glyph = glyph_id.with_scale_and_position(font_size, point(origin_x + gx, baseline_y));
        let Some(outlined) = font.outline_glyph(glyph) else {
            continue; // whitespace
        };
        let bounds = outlined.px_bounds();
        outlined.draw(|px, py, cov| {
            let x = bounds.min.x as i32 + px as i32;
            let y = bounds.min.y as i32 + py as i32;
            if x < 0 || y < 0 || x as u32 >= w || y as u32 >= h {
                return;
            }
            let cov = cov.clamp(0.0, 1.0);
            let dst = img.get_pixel_mut(x as u32, y as u32);
            for c in 0..3 {
                let v = dst[c] as f32 * (1.0 - cov) + color[c] as f32 * cov;
                dst[c] = v.round().clamp(0.0, 255.0) as u8;
            }
        });
    }
}

/// Load the first available UI font from the system.
/// Returns `None` when none of the families can be found (headless hosts).
pub fn load_ui_font() -> Option<FontArc> {
    UI_FAMILIES.iter().find_map(|family| load_system_font(family))
}

/// Load a regular-weight font by family name from the system.
pub fn load_system_font(family: &str) -> Option<FontArc> {
    use font_kit::family_name::FamilyName;
    use font_kit::properties::Properties;
    use font_kit::source::SystemSource;

    let handle = SystemSource::new()
        .select_best_match(&[FamilyName::Title(family.to_string())], &Properties::new())
        .ok()?;

    let font_data = handle.load().ok()?;
    let bytes: Vec<u8> = (*font_data.copy_font_data()?).clone();
    FontArc::try_from_vec(bytes).ok()
}
