// ============================================================================
// Batch export — every layer of a set in one pass, no GUI
// ============================================================================

use std::path::{Path, PathBuf};

use image::RgbaImage;
use log::info;

use crate::error::Result;
use crate::io;
use crate::layers::LayerSet;
use crate::ops::color::HsvPlanes;
use crate::ops::mask::{self, BinaryMask};
use crate::ops::overlay;
use crate::ops::refine;
use crate::ops::report::{ExportReport, ImageSize, LayerReport, SvgScale, DEFAULT_SVG_WIDTH};

/// File name of the all-layers composite.
pub const COMPOSITE_NAME: &str = "0_ALL_LAYERS.png";
/// File name of the JSON report.
pub const REPORT_NAME: &str = "report.json";
/// Name of the pseudo-layer holding pixels no rule selected.
pub const UNCATEGORISED: &str = "uncategorised";

#[derive(Clone, Debug)]
pub struct ExportOptions {
    pub svg_width: u32,
    pub write_report: bool,
    pub write_composite: bool,
    pub write_uncategorised: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            svg_width: DEFAULT_SVG_WIDTH,
            write_report: true,
            write_composite: true,
            write_uncategorised: true,
        }
    }
}

/// One exported layer: its refined mask and the files written for it.
pub struct ExportedLayer {
    pub name: String,
    pub mask: BinaryMask,
    pub overlay_path: PathBuf,
    pub cutout_path: PathBuf,
}

pub struct ExportOutcome {
    pub layers: Vec<ExportedLayer>,
    pub report: ExportReport,
}

/// Raw masks for every layer in order, with each layer's exclusions removed.
///
/// A layer's raw mask is its primary bands plus any alternative bands.
/// Exclusions use the other layer's raw mask (before its own exclusions).
pub fn layer_masks(hsv: &HsvPlanes, layers: &LayerSet) -> Vec<BinaryMask> {
    let raw: Vec<BinaryMask> = layers
        .layers
        .iter()
        .map(|layer| mask::evaluate_any(hsv, &layer.params, &layer.alternatives))
        .collect();

    layers
        .layers
        .iter()
        .zip(&raw)
        .map(|(layer, own)| {
            let mut m = own.clone();
            for name in &layer.exclude {
                if let Some(other) = layers.index_of(name) {
                    m.subtract(&raw[other]);
                }
            }
            m
        })
        .collect()
}

/// Pixels selected by none of `masks`.
pub fn uncategorised(masks: &[BinaryMask], width: u32, height: u32) -> BinaryMask {
    let mut matched = BinaryMask::new(width, height);
    for m in masks {
        matched.union(m);
    }
    matched.inverted()
}

/// Export every layer of `layers` for `source` into `out_dir`:
/// `<n>_<name>.png` proof overlays, `cut_<name>.png` transparent cut-outs,
/// and optionally the composite, the `0_uncategorised.png` cut-out and
/// `report.json`.
pub fn export_layers(source: &RgbaImage, layers: &LayerSet, out_dir: &Path, options: &ExportOptions) -> Result<ExportOutcome> {
    layers.validate()?;
    std::fs::create_dir_all(out_dir)?;

    let (w, h) = source.dimensions();
    let hsv = HsvPlanes::from_rgba(source);
    let scale = SvgScale::new(w, h, options.svg_width);

    let mut exported = Vec::with_capacity(layers.len());
    let mut reports = Vec::with_capacity(layers.len());

    let masks = layer_masks(&hsv, layers);
    for ((index, layer), raw) in layers.layers.iter().enumerate().zip(&masks) {
        let refined = refine::refine(raw, &layer.refine);

        let overlay_path = io::layer_png_path(out_dir, &format!("{}_{}", index + 1, layer.name));
        io::write_png(&overlay::tinted(source, &refined, layer.color), &overlay_path)?;

        let cutout_path = io::layer_png_path(out_dir, &format!("cut_{}", layer.name));
        io::write_png(&overlay::cutout(source, &refined), &cutout_path)?;

        let report = LayerReport::new(&layer.name, &layer.note, &refined, &scale);
        info!(
            "[{:<12}] {:5.1}%  px_y:{:?}  px_x:{:?}",
            layer.name, report.pct, report.px_bbox.y, report.px_bbox.x
        );
        reports.push(report);

        exported.push(ExportedLayer {
            name: layer.name.clone(),
            mask: refined,
            overlay_path,
            cutout_path,
        });
    }

    if options.write_composite {
        let stack: Vec<(&BinaryMask, [u8; 3])> = exported
            .iter()
            .zip(&layers.layers)
            .map(|(e, l)| (&e.mask, l.color))
            .collect();
        io::write_png(&overlay::composite(source, &stack), &out_dir.join(COMPOSITE_NAME))?;
    }

    let leftover = uncategorised(&masks, w, h);
    let leftover_report = LayerReport::new(UNCATEGORISED, "Pixels not matched by any rule", &leftover, &scale);
    info!("[{:<12}] {:5.1}%", UNCATEGORISED, leftover_report.pct);
    if options.write_uncategorised {
        let path = io::layer_png_path(out_dir, &format!("0_{}", UNCATEGORISED));
        io::write_png(&overlay::cutout(source, &leftover), &path)?;
    }

    let report = ExportReport {
        image: ImageSize { width: w, height: h },
        svg: scale,
        layers: reports,
        uncategorised: leftover_report,
    };
    if options.write_report {
        io::write_json(&report, &out_dir.join(REPORT_NAME))?;
    }

    Ok(ExportOutcome {
        layers: exported,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{Bounds, LayerDescriptor, LayerParams, RefineParams};
    use image::Rgba;

    fn two_tone() -> RgbaImage {
        // Left half white, right half pure blue.
        RgbaImage::from_fn(20, 10, |x, _| {
            if x < 10 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        })
    }

    fn layer(name: &str, params: LayerParams, exclude: &[&str]) -> LayerDescriptor {
        LayerDescriptor {
            name: name.into(),
            color: [255, 0, 0],
            params,
            alternatives: Vec::new(),
            refine: RefineParams::NONE,
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
            note: String::new(),
        }
    }

    #[test]
    fn exclusions_remove_earlier_raw_masks() {
        let everything = LayerParams::new((0, 179), (0, 255), (0, 255), (0, 100), (0, 100));
        let mut blue = everything;
        blue.hsv.h = Bounds::new(115, 125);
        let set = LayerSet {
            layers: vec![layer("blue", blue, &[]), layer("rest", everything, &["blue"])],
        };
        let masks = layer_masks(&HsvPlanes::from_rgba(&two_tone()), &set);
        assert_eq!(masks[0].count(), 100);
        assert_eq!(masks[1].count(), 100);
        assert!(masks[1].get(0, 0));
        assert!(!masks[1].get(15, 0));
    }

    #[test]
    fn export_writes_every_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let src = two_tone();
        let outcome = export_layers(&src, &LayerSet::semantic(), dir.path(), &ExportOptions::default()).unwrap();
        assert_eq!(outcome.layers.len(), 9);
        assert!(dir.path().join("1_sky.png").exists());
        assert!(dir.path().join("cut_grass.png").exists());
        assert!(dir.path().join(COMPOSITE_NAME).exists());
        assert!(dir.path().join("0_uncategorised.png").exists());

        let text = std::fs::read_to_string(dir.path().join(REPORT_NAME)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["image"]["width"], 20);
        assert_eq!(json["layers"].as_array().unwrap().len(), 9);
        assert_eq!(json["svg"]["viewBox"][3], 450);
        assert_eq!(json["uncategorised"]["layer"], UNCATEGORISED);
    }

    #[test]
    fn near_white_is_sky_not_clouds() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([250, 250, 250, 255]));
        let set = LayerSet::semantic();
        let masks = layer_masks(&HsvPlanes::from_rgba(&img), &set);
        let count = |name: &str| set.index_of(name).map(|i| masks[i].count());
        assert_eq!(count("sky"), Some(16));
        assert_eq!(count("clouds"), Some(0));
        assert_eq!(count("wind"), Some(0));
    }

    #[test]
    fn earthy_brown_counts_as_grass_low_in_the_frame() {
        // (100, 80, 40): H 40° -> 20, S 0.6 -> 153, V 0.39 -> 100.
        let img = RgbaImage::from_pixel(10, 10, Rgba([100, 80, 40, 255]));
        let set = LayerSet::semantic();
        let masks = layer_masks(&HsvPlanes::from_rgba(&img), &set);
        let grass = &masks[set.index_of("grass").unwrap()];
        // Ground zone starts at 58% of the height: rows 5..10.
        assert_eq!(grass.count(), 50);
        assert!(!grass.get(0, 4));
    }

    #[test]
    fn uncategorised_is_the_complement_of_every_layer() {
        let mut a = BinaryMask::new(4, 1);
        a.set(0, 0, true);
        let mut b = BinaryMask::new(4, 1);
        b.set(2, 0, true);
        let rest = uncategorised(&[a, b], 4, 1);
        assert_eq!(rest.bits(), &[false, true, false, true]);
    }
}
