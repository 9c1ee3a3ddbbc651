// ============================================================================
// Preview renderer — downscaled tinted frame with a status header band
// ============================================================================

use ab_glyph::FontArc;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::layers::Region;
use crate::ops::mask::BinaryMask;
use crate::ops::overlay::{tint_in_place, KEEP_ORIGINAL};
use crate::ops::text;

/// Default width of the live preview.
pub const DEFAULT_DISPLAY_WIDTH: u32 = 1280;
/// Height of the black status band placed above the image.
pub const HEADER_HEIGHT: u32 = 70;
/// Command legend shown on the second status line.
pub const LEGEND: &str = "[ S ] Save    [ N ] Next layer    [ Q ] Quit";

const OUTLINE_COLOR: Rgba<u8> = Rgba([255, 255, 0, 255]);
const OUTLINE_THICKNESS: u32 = 2;
const HEADER_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);
const TITLE_COLOR: [u8; 3] = [255, 255, 0];
const LEGEND_COLOR: [u8; 3] = [255, 255, 255];

/// One rendered frame plus the text drawn into its header.
pub struct PreviewFrame {
    /// `display_width × (HEADER_HEIGHT + display_height)` pixels.
    pub image: RgbaImage,
    pub header_height: u32,
    /// Coverage of the full-resolution mask, one decimal.
    pub coverage: f64,
    /// Status lines in header order.
    pub lines: [String; 2],
    /// `false` when no font was available and the lines still need drawing by the host.
    pub text_drawn: bool,
}

/// Holds the downscaled copy of the source image for the session.
pub struct PreviewRenderer {
    display: RgbaImage,
    font: Option<FontArc>,
}

impl PreviewRenderer {
    /// Downscale `source` once to `display_width` (aspect preserved).
    pub fn new(source: &RgbaImage, display_width: u32, font: Option<FontArc>) -> Self {
        let (sw, sh) = source.dimensions();
        let display = if sw == 0 || sh == 0 {
            RgbaImage::new(0, 0)
        } else {
            let dw = display_width.max(1);
            let dh = ((sh as u64 * dw as u64) / sw as u64).max(1) as u32;
            if (dw, dh) == (sw, sh) {
                source.clone()
            } else {
                imageops::resize(source, dw, dh, FilterType::Triangle)
            }
        };
        Self { display, font }
    }

    pub fn display_size(&self) -> (u32, u32) {
        self.display.dimensions()
    }

    pub fn status_lines(name: &str, coverage: f64) -> [String; 2] {
        [
            format!("Layer: {}   Coverage: {:.1}%", name, coverage),
            LEGEND.to_string(),
        ]
    }

    /// Render `mask` (full resolution) tinted with `tint`, outline `region`,
    /// and write the status header.
    pub fn render(&self, mask: &BinaryMask, tint: [u8; 3], region: &Region, name: &str) -> PreviewFrame {
        let (dw, dh) = self.display.dimensions();
        let coverage = mask.coverage_percent();

        let mut body = self.display.clone();
        let small = mask.resize_nearest(dw, dh);
        tint_in_place(&mut body, &small, tint, KEEP_ORIGINAL);
        draw_region_outline(&mut body, region);

        let mut image = RgbaImage::from_pixel(dw, dh + HEADER_HEIGHT, HEADER_COLOR);
        imageops::replace(&mut image, &body, 0, HEADER_HEIGHT as i64);

        let lines = Self::status_lines(name, coverage);
        let text_drawn = match &self.font {
            Some(font) => {
                text::draw_line(&mut image, font, &lines[0], 26.0, 10.0, 28.0, TITLE_COLOR);
                text::draw_line(&mut image, font, &lines[1], 22.0, 10.0, 58.0, LEGEND_COLOR);
                true
            }
            None => false,
        };

        PreviewFrame {
            image,
            header_height: HEADER_HEIGHT,
            coverage,
            lines,
            text_drawn,
        }
    }
}

/// Draw the region rectangle as an outline on `img`.
pub fn draw_region_outline(img: &mut RgbaImage, region: &Region) {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let at = |pct: u8, extent: u32| ((extent as u64 * pct.min(100) as u64) / 100).min(extent as u64 - 1) as u32;
    let (xa, xb) = (at(region.x.min, w), at(region.x.max, w));
    let (ya, yb) = (at(region.y.min, h), at(region.y.max, h));
    let (x0, x1) = (xa.min(xb), xa.max(xb));
    let (y0, y1) = (ya.min(yb), ya.max(yb));

    for t in 0..OUTLINE_THICKNESS {
        for x in x0..=x1 {
            img.put_pixel(x, (y0 + t).min(h - 1), OUTLINE_COLOR);
            img.put_pixel(x, y1.saturating_sub(t), OUTLINE_COLOR);
        }
        for y in y0..=y1 {
            img.put_pixel((x0 + t).min(w - 1), y, OUTLINE_COLOR);
            img.put_pixel(x1.saturating_sub(t), y, OUTLINE_COLOR);
        }
    }
}
