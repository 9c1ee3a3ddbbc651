use serde::Serialize;

use crate::ops::mask::{BBox, BinaryMask};

/// Default width of the front-end SVG view box.
pub const DEFAULT_SVG_WIDTH: u32 = 900;
/// Number of row samples used when tracing a hitbox outline.
const HITBOX_ROWS: u32 = 8;

/// `[min, max]` pairs per axis, inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct AxisBox {
    pub x: [u32; 2],
    pub y: [u32; 2],
}

impl AxisBox {
    fn from_bbox(bbox: Option<BBox>) -> Self {
        match bbox {
            Some(b) => Self { x: [b.x0, b.x1], y: [b.y0, b.y1] },
            None => Self { x: [0, 0], y: [0, 0] },
        }
    }
}

/// Pixel → SVG unit mapping, uniform on both axes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SvgScale {
    #[serde(rename = "viewBox")]
    pub view_box: [u32; 4],
    pub scale: f64,
}

impl SvgScale {
    pub fn new(image_width: u32, image_height: u32, svg_width: u32) -> Self {
        let scale = if image_width == 0 {
            0.0
        } else {
            svg_width as f64 / image_width as f64
        };
        let svg_height = (image_height as f64 * scale).round() as u32;
        Self {
            view_box: [0, 0, svg_width, svg_height],
            scale,
        }
    }

    #[inline]
    pub fn map(&self, px: u32) -> u32 {
        (px as f64 * self.scale).round() as u32
    }

    pub fn map_box(&self, b: &AxisBox) -> AxisBox {
        AxisBox {
            x: [self.map(b.x[0]), self.map(b.x[1])],
            y: [self.map(b.y[0]), self.map(b.y[1])],
        }
    }
}

/// Per-layer entry of the export report.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LayerReport {
    pub layer: String,
    pub pct: f64,
    pub px_bbox: AxisBox,
    pub svg_bbox: AxisBox,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hitbox: Option<String>,
    pub note: String,
}

impl LayerReport {
    pub fn new(name: &str, note: &str, mask: &BinaryMask, scale: &SvgScale) -> Self {
        let px_bbox = AxisBox::from_bbox(mask.bbox());
        Self {
            layer: name.to_string(),
            pct: mask.coverage_percent(),
            svg_bbox: scale.map_box(&px_bbox),
            px_bbox,
            hitbox: hitbox_path(mask, scale),
            note: note.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

/// Contents of `report.json`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExportReport {
    pub image: ImageSize,
    pub svg: SvgScale,
    pub layers: Vec<LayerReport>,
    /// Pixels no layer selected (before refinement).
    pub uncategorised: LayerReport,
}

/// Trace a simplified closed outline around the mask in SVG units.
///
/// Every `max(1, span / 8)` rows of the occupied row span contribute their
/// leftmost and rightmost set pixel; the path runs down the left edge and
/// back up the right edge. `None` for an empty mask.
pub fn hitbox_path(mask: &BinaryMask, scale: &SvgScale) -> Option<String> {
    let bbox = mask.bbox()?;
    let step = ((bbox.y1 - bbox.y0) / HITBOX_ROWS).max(1) as usize;

    let mut left = Vec::new();
    let mut right = Vec::new();
    for y in (bbox.y0..=bbox.y1).step_by(step) {
        let row = mask.rows().nth(y as usize)?;
        let (Some(first), Some(last)) = (row.iter().position(|&b| b), row.iter().rposition(|&b| b)) else {
            continue;
        };
        let sy = scale.map(y);
        left.push((scale.map(first as u32), sy));
        right.push((scale.map(last as u32), sy));
    }
    if left.is_empty() {
        return None;
    }

    let points: Vec<String> = left
        .into_iter()
        .chain(right.into_iter().rev())
        .map(|(x, y)| format!("{},{}", x, y))
        .collect();
    Some(format!("M{} Z", points.join(" L")))
}
