// ============================================================================
// Zone sampling — HSV percentiles of fixed image zones, for picking thresholds
// ============================================================================

use std::fmt;

use rayon::prelude::*;
use serde::Serialize;

use crate::layers::{Bounds, Region};
use crate::ops::color::HsvPlanes;

/// File name of the zone sample dump written next to the batch outputs.
pub const SAMPLES_NAME: &str = "samples.json";

/// A named rectangle, in percent of the image size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Zone {
    pub name: &'static str,
    pub region: Region,
}

const fn zone(name: &'static str, y: (u8, u8), x: (u8, u8)) -> Zone {
    Zone {
        name,
        region: Region {
            y: Bounds::new(y.0, y.1),
            x: Bounds::new(x.0, x.1),
        },
    }
}

/// Zones where each part of the tree scene is expected to sit.
pub const DEFAULT_ZONES: [Zone; 5] = [
    zone("Rain zone (top-right)", (0, 30), (55, 100)),
    zone("Wind zone (top-left)", (0, 35), (0, 35)),
    zone("Canopy center", (20, 60), (30, 70)),
    zone("Trunk center", (50, 90), (40, 60)),
    zone("Root/ground", (75, 100), (30, 70)),
];

/// 5th, 25th, 50th, 75th and 95th percentile, linearly interpolated.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Percentiles {
    pub p5: f64,
    pub p25: f64,
    pub median: f64,
    pub p75: f64,
    pub p95: f64,
}

impl Percentiles {
    /// Sorts `values` in place. `None` when empty.
    pub fn of(values: &mut [u8]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        values.par_sort_unstable();
        let at = |p: f64| {
            let pos = p / 100.0 * (values.len() - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let (a, b) = (values[lo] as f64, values[hi] as f64);
            a + (b - a) * (pos - lo as f64)
        };
        Some(Self {
            p5: at(5.0),
            p25: at(25.0),
            median: at(50.0),
            p75: at(75.0),
            p95: at(95.0),
        })
    }
}

impl fmt::Display for Percentiles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "p5={:.1}  p25={:.1}  median={:.1}  p75={:.1}  p95={:.1}",
            self.p5, self.p25, self.median, self.p75, self.p95
        )
    }
}

/// HSV distribution of one zone, in the 8-bit channel convention.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ZoneSample {
    pub name: String,
    /// Pixel rows `[start, end)`.
    pub rows: [u32; 2],
    /// Pixel columns `[start, end)`.
    pub cols: [u32; 2],
    pub h: Percentiles,
    pub s: Percentiles,
    pub v: Percentiles,
}

impl fmt::Display for ZoneSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "  [{}] ({}:{}, {}:{})",
            self.name, self.rows[0], self.rows[1], self.cols[0], self.cols[1]
        )?;
        writeln!(f, "    H: {}", self.h)?;
        writeln!(f, "    S: {}", self.s)?;
        writeln!(f, "    V: {}", self.v)
    }
}

/// Sample the pixels of `region`. `None` when the region covers no pixels.
pub fn sample_region(hsv: &HsvPlanes, name: &str, region: &Region) -> Option<ZoneSample> {
    let rows = region.rows(hsv.height);
    let cols = region.cols(hsv.width);
    let w = hsv.width as usize;

    let mut h = Vec::new();
    let mut s = Vec::new();
    let mut v = Vec::new();
    for y in rows.clone() {
        let base = y as usize * w;
        let span = base + cols.start as usize..base + cols.end as usize;
        h.extend_from_slice(&hsv.h[span.clone()]);
        s.extend_from_slice(&hsv.s[span.clone()]);
        v.extend_from_slice(&hsv.v[span]);
    }

    Some(ZoneSample {
        name: name.to_string(),
        rows: [rows.start, rows.end],
        cols: [cols.start, cols.end],
        h: Percentiles::of(&mut h)?,
        s: Percentiles::of(&mut s)?,
        v: Percentiles::of(&mut v)?,
    })
}

/// Sample every zone; empty zones are skipped.
pub fn sample_zones(hsv: &HsvPlanes, zones: &[Zone]) -> Vec<ZoneSample> {
    zones
        .iter()
        .filter_map(|z| sample_region(hsv, z.name, &z.region))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn percentiles_interpolate_linearly() {
        let mut values: Vec<u8> = (0..=100).rev().collect();
        let p = Percentiles::of(&mut values).unwrap();
        assert_eq!(p.p5, 5.0);
        assert_eq!(p.median, 50.0);
        assert_eq!(p.p95, 95.0);

        let mut pair = vec![10u8, 20];
        let p = Percentiles::of(&mut pair).unwrap();
        assert_eq!(p.p25, 12.5);
        assert_eq!(p.median, 15.0);
        assert!(Percentiles::of(&mut []).is_none());
    }

    #[test]
    fn zone_reads_only_its_rectangle() {
        // Top half blue, bottom half green.
        let img = RgbaImage::from_fn(20, 20, |_, y| {
            if y < 10 {
                Rgba([0, 0, 255, 255])
            } else {
                Rgba([0, 255, 0, 255])
            }
        });
        let hsv = HsvPlanes::from_rgba(&img);
        let region = Region {
            y: Bounds::new(50, 100),
            x: Bounds::new(0, 50),
        };
        let sample = sample_region(&hsv, "ground", &region).unwrap();
        assert_eq!(sample.rows, [10, 20]);
        assert_eq!(sample.cols, [0, 10]);
        assert_eq!(sample.h.p5, 60.0);
        assert_eq!(sample.h.p95, 60.0);
        assert_eq!(sample.s.median, 255.0);
        assert!(sample.to_string().contains("    H: p5=60.0  p25=60.0  median=60.0"));
    }

    #[test]
    fn empty_zones_are_skipped() {
        let hsv = HsvPlanes::from_rgba(&RgbaImage::new(3, 3));
        let samples = sample_zones(&hsv, &DEFAULT_ZONES);
        // 3 px is too small for the 40-60% trunk column.
        assert!(samples.iter().all(|s| s.name != "Trunk center"));
        assert!(samples.iter().any(|s| s.name == "Canopy center"));
    }
}
