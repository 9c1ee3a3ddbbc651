// ============================================================================
// Layer descriptors — named HSV + position selection rules
// ============================================================================
//
// All hue values use the 8-bit half-degree convention of `ops::color`
// (H 0–179, S 0–255, V 0–255). Position bounds are percentages of the image
// height (y) and width (x).

use std::fmt;
use std::ops::Range;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LayerError, Result};
use crate::ops::color::{HUE_MAX, SV_MAX};

/// Largest position bound (percent).
pub const POSITION_MAX: u8 = 100;

// ============================================================================
// Bounds
// ============================================================================

/// Inclusive `[min, max]` pair. An inverted pair (`min > max`) selects nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: u8,
    pub max: u8,
}

impl Bounds {
    pub const fn new(min: u8, max: u8) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn contains(&self, value: u8) -> bool {
        value >= self.min && value <= self.max
    }

    fn clamped(self, max: u8) -> Self {
        Self::new(self.min.min(max), self.max.min(max))
    }
}

/// One inclusive band per HSV channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvRanges {
    pub h: Bounds,
    pub s: Bounds,
    pub v: Bounds,
}

impl HsvRanges {
    pub const fn new(h: (u8, u8), s: (u8, u8), v: (u8, u8)) -> Self {
        Self {
            h: Bounds::new(h.0, h.1),
            s: Bounds::new(s.0, s.1),
            v: Bounds::new(v.0, v.1),
        }
    }

    /// Hue bounds inside `0..=HUE_MAX`.
    pub fn hue_in_domain(&self) -> bool {
        self.h.min <= HUE_MAX && self.h.max <= HUE_MAX
    }

    #[inline]
    pub fn contains(&self, [h, s, v]: [u8; 3]) -> bool {
        self.h.contains(h) && self.s.contains(s) && self.v.contains(v)
    }
}

/// Position rectangle in percent of the image size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub y: Bounds,
    pub x: Bounds,
}

impl Region {
    pub const FULL: Region = Region {
        y: Bounds::new(0, POSITION_MAX),
        x: Bounds::new(0, POSITION_MAX),
    };

    /// Pixel rows covered by the vertical bounds for an image `height` tall.
    pub fn rows(&self, height: u32) -> Range<u32> {
        span(self.y, height)
    }

    /// Pixel columns covered by the horizontal bounds for an image `width` wide.
    pub fn cols(&self, width: u32) -> Range<u32> {
        span(self.x, width)
    }

    /// Copy with both axes clamped to `0..=100`.
    pub fn clamped(self) -> Self {
        Self {
            y: self.y.clamped(POSITION_MAX),
            x: self.x.clamped(POSITION_MAX),
        }
    }
}

/// `floor(extent · min / 100) .. floor(extent · max / 100)`, empty when inverted.
fn span(bounds: Bounds, extent: u32) -> Range<u32> {
    let at = |pct: u8| (extent as u64 * pct.min(POSITION_MAX) as u64 / 100) as u32;
    let start = at(bounds.min);
    let end = at(bounds.max);
    start..end.max(start)
}

// ============================================================================
// Controls
// ============================================================================

/// One adjustable parameter of a layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Control {
    HMin,
    HMax,
    SMin,
    SMax,
    VMin,
    VMax,
    YMin,
    YMax,
    XMin,
    XMax,
}

impl Control {
    pub const ALL: [Control; 10] = [
        Control::HMin,
        Control::HMax,
        Control::SMin,
        Control::SMax,
        Control::VMin,
        Control::VMax,
        Control::YMin,
        Control::YMax,
        Control::XMin,
        Control::XMax,
    ];

    /// Key used in parameter dumps.
    pub fn key(self) -> &'static str {
        match self {
            Control::HMin => "H_min",
            Control::HMax => "H_max",
            Control::SMin => "S_min",
            Control::SMax => "S_max",
            Control::VMin => "V_min",
            Control::VMax => "V_max",
            Control::YMin => "y_min",
            Control::YMax => "y_max",
            Control::XMin => "x_min",
            Control::XMax => "x_max",
        }
    }

    /// Upper end of the control's domain; the lower end is always 0.
    pub fn domain_max(self) -> u8 {
        match self {
            Control::HMin | Control::HMax => HUE_MAX,
            Control::SMin | Control::SMax | Control::VMin | Control::VMax => SV_MAX,
            Control::YMin | Control::YMax | Control::XMin | Control::XMax => POSITION_MAX,
        }
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// ============================================================================
// Parameters
// ============================================================================

/// The ten tunable values of a layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerParams {
    pub hsv: HsvRanges,
    pub region: Region,
}

impl LayerParams {
    pub const fn new(h: (u8, u8), s: (u8, u8), v: (u8, u8), y: (u8, u8), x: (u8, u8)) -> Self {
        Self {
            hsv: HsvRanges {
                h: Bounds::new(h.0, h.1),
                s: Bounds::new(s.0, s.1),
                v: Bounds::new(v.0, v.1),
            },
            region: Region {
                y: Bounds::new(y.0, y.1),
                x: Bounds::new(x.0, x.1),
            },
        }
    }

    pub fn get(&self, control: Control) -> u8 {
        match control {
            Control::HMin => self.hsv.h.min,
            Control::HMax => self.hsv.h.max,
            Control::SMin => self.hsv.s.min,
            Control::SMax => self.hsv.s.max,
            Control::VMin => self.hsv.v.min,
            Control::VMax => self.hsv.v.max,
            Control::YMin => self.region.y.min,
            Control::YMax => self.region.y.max,
            Control::XMin => self.region.x.min,
            Control::XMax => self.region.x.max,
        }
    }

    /// Set a control, clamping `value` into the control's domain.
    pub fn set(&mut self, control: Control, value: i32) {
        let value = value.clamp(0, control.domain_max() as i32) as u8;
        let slot = match control {
            Control::HMin => &mut self.hsv.h.min,
            Control::HMax => &mut self.hsv.h.max,
            Control::SMin => &mut self.hsv.s.min,
            Control::SMax => &mut self.hsv.s.max,
            Control::VMin => &mut self.hsv.v.min,
            Control::VMax => &mut self.hsv.v.max,
            Control::YMin => &mut self.region.y.min,
            Control::YMax => &mut self.region.y.max,
            Control::XMin => &mut self.region.x.min,
            Control::XMax => &mut self.region.x.max,
        };
        *slot = value;
    }
}

/// Transcribable `key: value` listing of a layer's parameters.
pub struct ParamDump<'a> {
    pub name: &'a str,
    pub params: &'a LayerParams,
}

impl fmt::Display for ParamDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Params [{}] ---", self.name)?;
        for control in Control::ALL {
            writeln!(f, "  {}: {}", control.key(), self.params.get(control))?;
        }
        Ok(())
    }
}

// ============================================================================
// Refinement settings
// ============================================================================

/// Save-time cleanup applied to a raw mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefineParams {
    /// Disk radius of the gap-closing pass (0 = skip).
    pub close_radius: u32,
    /// Disk radius of the growth pass (0 = skip).
    pub dilate_radius: u32,
    /// Keep at most this many connected blobs (`None` = keep all).
    pub max_blobs: Option<usize>,
    /// Blobs smaller than this are discarded.
    pub min_area: usize,
}

impl RefineParams {
    pub const NONE: RefineParams = RefineParams {
        close_radius: 0,
        dilate_radius: 0,
        max_blobs: None,
        min_area: 0,
    };

    pub const fn new(close_radius: u32, dilate_radius: u32, max_blobs: Option<usize>, min_area: usize) -> Self {
        Self { close_radius, dilate_radius, max_blobs, min_area }
    }

    pub fn filters_blobs(&self) -> bool {
        self.max_blobs.is_some() || self.min_area > 0
    }
}

impl Default for RefineParams {
    fn default() -> Self {
        RefineParams::new(15, 9, None, 0)
    }
}

// ============================================================================
// Descriptors
// ============================================================================

/// A named region-selection rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerDescriptor {
    pub name: String,
    /// Tint used for previews and proof images (RGB).
    pub color: [u8; 3],
    pub params: LayerParams,
    /// Extra HSV bands that also select a pixel (inside the same region) in batch export.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<HsvRanges>,
    #[serde(default)]
    pub refine: RefineParams,
    /// Names of earlier layers whose raw masks are removed from this one in batch export.
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub note: String,
}

impl LayerDescriptor {
    fn preset(name: &str, color: [u8; 3], params: LayerParams, refine: RefineParams) -> Self {
        Self {
            name: name.to_string(),
            color,
            params,
            alternatives: Vec::new(),
            refine,
            exclude: Vec::new(),
            note: String::new(),
        }
    }

    fn or_bands(mut self, bands: &[HsvRanges]) -> Self {
        self.alternatives = bands.to_vec();
        self
    }

    fn excluding(mut self, names: &[&str]) -> Self {
        self.exclude = names.iter().map(|n| n.to_string()).collect();
        self
    }

    fn noted(mut self, note: &str) -> Self {
        self.note = note.to_string();
        self
    }
}

/// Built-in descriptor catalogues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Preset {
    /// Four hand-tuned layers: clouds, trunk, roots, grass.
    #[default]
    Tuner,
    /// Nine semantic layers from sky down to grass.
    Semantic,
}

/// Ordered list of layer descriptors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSet {
    pub layers: Vec<LayerDescriptor>,
}

impl LayerSet {
    pub fn preset(preset: Preset) -> Self {
        match preset {
            Preset::Tuner => Self::tuner(),
            Preset::Semantic => Self::semantic(),
        }
    }

    pub fn tuner() -> Self {
        Self {
            layers: vec![
                LayerDescriptor::preset(
                    "1_clouds",
                    [255, 230, 200],
                    LayerParams::new((85, 115), (0, 85), (220, 255), (0, 22), (0, 100)),
                    RefineParams::new(25, 12, Some(2), 20_000),
                )
                .noted("The two large clouds along the top edge"),
                LayerDescriptor::preset(
                    "2_trunk",
                    [200, 100, 140],
                    LayerParams::new((18, 44), (55, 110), (115, 220), (40, 84), (44, 56)),
                    RefineParams::new(10, 6, Some(1), 2_000),
                )
                .noted("Trunk bark column"),
                LayerDescriptor::preset(
                    "3_roots",
                    [255, 120, 40],
                    LayerParams::new((30, 46), (145, 225), (100, 158), (84, 97), (22, 78)),
                    RefineParams::new(15, 9, Some(8), 1_500),
                )
                .noted("Saturated dark roots below the trunk"),
                LayerDescriptor::preset(
                    "4_grass",
                    [80, 220, 50],
                    LayerParams::new((35, 62), (148, 255), (95, 255), (55, 100), (0, 100)),
                    RefineParams::new(25, 15, None, 0),
                )
                .noted("Vivid green ground cover"),
            ],
        }
    }

    pub fn semantic() -> Self {
        let full = (0, 100);
        Self {
            layers: vec![
                LayerDescriptor::preset(
                    "sky",
                    [135, 206, 250],
                    LayerParams::new((95, 115), (0, 140), (153, 255), full, full),
                    RefineParams::NONE,
                )
                .or_bands(&[HsvRanges::new((0, 179), (0, 25), (217, 255))])
                .noted("Sky background"),
                LayerDescriptor::preset(
                    "clouds",
                    [255, 255, 255],
                    LayerParams::new((0, 179), (0, 71), (199, 255), full, full),
                    RefineParams::NONE,
                )
                .or_bands(&[HsvRanges::new((88, 107), (0, 101), (179, 255))])
                .excluding(&["sky"])
                .noted("Cloud puffs"),
                LayerDescriptor::preset(
                    "rain",
                    [30, 144, 255],
                    LayerParams::new((95, 120), (13, 115), (140, 242), (0, 40), (45, 100)),
                    RefineParams::NONE,
                )
                .noted("Rain (right cloud zone)"),
                LayerDescriptor::preset(
                    "wind",
                    [0, 255, 220],
                    LayerParams::new((75, 105), (13, 140), (128, 255), (0, 50), (0, 40)),
                    RefineParams::NONE,
                )
                .excluding(&["clouds", "sky"])
                .noted("Wind (left cloud zone)"),
                LayerDescriptor::preset(
                    "canopy",
                    [34, 139, 34],
                    LayerParams::new((25, 82), (46, 255), (31, 224), full, full),
                    RefineParams::NONE,
                )
                .noted("Canopy / leaves"),
                LayerDescriptor::preset(
                    "branches",
                    [139, 90, 43],
                    LayerParams::new((6, 21), (56, 209), (56, 184), full, full),
                    RefineParams::NONE,
                )
                .excluding(&["canopy"])
                .noted("Branches"),
                LayerDescriptor::preset(
                    "trunk",
                    [80, 40, 10],
                    LayerParams::new((4, 25), (31, 204), (20, 128), full, full),
                    RefineParams::NONE,
                )
                .excluding(&["canopy"])
                .noted("Trunk (full vertical)"),
                LayerDescriptor::preset(
                    "roots",
                    [180, 100, 0],
                    LayerParams::new((4, 25), (31, 204), (20, 128), (55, 100), full),
                    RefineParams::NONE,
                )
                .excluding(&["canopy"])
                .noted("Roots (trunk in lower zone)"),
                LayerDescriptor::preset(
                    "grass",
                    [0, 80, 0],
                    LayerParams::new((30, 68), (38, 255), (0, 140), (58, 100), full),
                    RefineParams::NONE,
                )
                .or_bands(&[HsvRanges::new((9, 32), (46, 255), (0, 114))])
                .noted("Grass & ground"),
            ],
        }
    }

    /// Load and validate a layer set from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let mut set: LayerSet = serde_json::from_str(text)?;
        for layer in &mut set.layers {
            layer.params.region = layer.params.region.clamped();
        }
        set.validate()?;
        Ok(set)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Non-empty, unique names, hue bounds inside `0..=HUE_MAX`, and every
    /// exclusion names an earlier layer.
    pub fn validate(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(LayerError::InvalidLayers("the layer list is empty".into()));
        }
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.name.trim().is_empty() {
                return Err(LayerError::InvalidLayers(format!("layer {} has no name", i + 1)));
            }
            let mut bands = std::iter::once(&layer.params.hsv).chain(&layer.alternatives);
            if let Some(bad) = bands.find(|b| !b.hue_in_domain()) {
                return Err(LayerError::InvalidLayers(format!(
                    "layer '{}' has hue bounds {}..{} outside 0..{} (hue is in half-degrees)",
                    layer.name, bad.h.min, bad.h.max, HUE_MAX
                )));
            }
            let earlier = &self.layers[..i];
            if earlier.iter().any(|l| l.name == layer.name) {
                return Err(LayerError::InvalidLayers(format!(
                    "duplicate layer name '{}'",
                    layer.name
                )));
            }
            for name in &layer.exclude {
                if !earlier.iter().any(|l| &l.name == name) {
                    return Err(LayerError::InvalidLayers(format!(
                        "layer '{}' excludes '{}', which is not an earlier layer",
                        layer.name, name
                    )));
                }
            }
        }
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&LayerDescriptor> {
        self.layers.get(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.layers.iter().position(|l| l.name == name)
    }

    /// Map a 1-based user selection onto a valid 0-based index.
    pub fn start_index(&self, one_based: Option<i64>) -> usize {
        let last = self.layers.len().saturating_sub(1) as i64;
        match one_based {
            Some(n) => (n - 1).clamp(0, last) as usize,
            None => 0,
        }
    }

    /// Startup listing with the selected layer marked.
    pub fn listing(&self, selected: usize) -> String {
        let mut out = String::new();
        for (i, layer) in self.layers.iter().enumerate() {
            let marker = if i == selected { ">>>" } else { "   " };
            out.push_str(&format!("  {} [{}] {}\n", marker, i + 1, layer.name));
        }
        out
    }
}
