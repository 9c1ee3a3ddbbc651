use image::{GrayImage, Luma};
use rayon::prelude::*;

use crate::error::{LayerError, Result};
use crate::layers::{HsvRanges, LayerParams};
use crate::ops::color::HsvPlanes;

/// Row-major boolean grid with the same dimensions as its source image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryMask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

/// Inclusive pixel bounding box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BBox {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl BBox {
    pub fn width(&self) -> u32 {
        self.x1 - self.x0 + 1
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0 + 1
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Grow by `by` pixels on every side, clipped to a `width`×`height` image.
    pub fn expanded(&self, by: u32, width: u32, height: u32) -> BBox {
        BBox {
            x0: self.x0.saturating_sub(by),
            y0: self.y0.saturating_sub(by),
            x1: (self.x1 + by).min(width.saturating_sub(1)),
            y1: (self.y1 + by).min(height.saturating_sub(1)),
        }
    }

    pub fn contains(&self, other: &BBox) -> bool {
        other.x0 >= self.x0 && other.y0 >= self.y0 && other.x1 <= self.x1 && other.y1 <= self.y1
    }
}

impl BinaryMask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![false; width as usize * height as usize],
        }
    }

    pub fn from_bits(width: u32, height: u32, bits: Vec<bool>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if bits.len() != expected {
            return Err(LayerError::Dimensions { expected, actual: bits.len() });
        }
        Ok(Self { width, height, bits })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    #[inline]
    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.bits[(y * self.width + x) as usize]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, on: bool) {
        self.bits[(y * self.width + x) as usize] = on;
    }

    /// Mark every pixel of the inclusive rectangle.
    pub fn fill_rect(&mut self, x0: u32, y0: u32, x1: u32, y1: u32) {
        for y in y0..=y1.min(self.height.saturating_sub(1)) {
            for x in x0..=x1.min(self.width.saturating_sub(1)) {
                self.set(x, y, true);
            }
        }
    }

    pub fn count(&self) -> usize {
        self.bits.par_iter().filter(|&&b| b).count()
    }

    /// Share of set pixels in percent, rounded to one decimal.
    pub fn coverage_percent(&self) -> f64 {
        if self.bits.is_empty() {
            return 0.0;
        }
        let pct = self.count() as f64 / self.bits.len() as f64 * 100.0;
        (pct * 10.0).round() / 10.0
    }

    pub fn rows(&self) -> std::slice::ChunksExact<'_, bool> {
        self.bits.chunks_exact(self.width.max(1) as usize)
    }

    /// Tight bounding box of the set pixels, `None` when nothing is set.
    pub fn bbox(&self) -> Option<BBox> {
        let mut found: Option<BBox> = None;
        for (y, row) in self.rows().enumerate() {
            let Some(first) = row.iter().position(|&b| b) else {
                continue;
            };
            let last = row.iter().rposition(|&b| b).unwrap_or(first);
            let (y, first, last) = (y as u32, first as u32, last as u32);
            found = Some(match found {
                None => BBox { x0: first, y0: y, x1: last, y1: y },
                Some(b) => BBox {
                    x0: b.x0.min(first),
                    y0: b.y0,
                    x1: b.x1.max(last),
                    y1: y,
                },
            });
        }
        found
    }

    /// Clear every pixel that is set in `other`.
    pub fn subtract(&mut self, other: &BinaryMask) {
        debug_assert_eq!(self.bits.len(), other.bits.len());
        self.bits
            .par_iter_mut()
            .zip(other.bits.par_iter())
            .for_each(|(a, &b)| *a &= !b);
    }

    /// Set every pixel that is set in `other`.
    pub fn union(&mut self, other: &BinaryMask) {
        debug_assert_eq!(self.bits.len(), other.bits.len());
        self.bits
            .par_iter_mut()
            .zip(other.bits.par_iter())
            .for_each(|(a, &b)| *a |= b);
    }

    /// Copy onto a larger canvas with `by` unset pixels on every side.
    pub fn padded(&self, by: u32) -> BinaryMask {
        let mut out = BinaryMask::new(self.width + 2 * by, self.height + 2 * by);
        let (w, ow) = (self.width as usize, out.width as usize);
        for (y, row) in self.rows().enumerate().take(self.height as usize) {
            let start = (y + by as usize) * ow + by as usize;
            out.bits[start..start + w].copy_from_slice(row);
        }
        out
    }

    /// Inverse of [`padded`](Self::padded): drop `by` pixels from every side.
    pub fn cropped(&self, by: u32) -> BinaryMask {
        let w = self.width.saturating_sub(2 * by);
        let h = self.height.saturating_sub(2 * by);
        let mut out = BinaryMask::new(w, h);
        if out.is_empty() {
            return out;
        }
        let sw = self.width as usize;
        for (y, row) in out.bits.chunks_exact_mut(w as usize).enumerate() {
            let start = (y + by as usize) * sw + by as usize;
            row.copy_from_slice(&self.bits[start..start + w as usize]);
        }
        out
    }

    /// 8-bit single-channel copy: 255 where set, 0 elsewhere.
    pub fn to_gray(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| Luma([if self.get(x, y) { 255 } else { 0 }]))
    }

    /// Pixel-wise complement.
    pub fn inverted(&self) -> BinaryMask {
        BinaryMask {
            width: self.width,
            height: self.height,
            bits: self.bits.par_iter().map(|&b| !b).collect(),
        }
    }

    /// Nearest-neighbour resample to `width`×`height` (keeps hard edges).
    pub fn resize_nearest(&self, width: u32, height: u32) -> BinaryMask {
        let mut out = BinaryMask::new(width, height);
        if width == 0 || height == 0 || self.is_empty() {
            return out;
        }
        let (sw, sh) = (self.width as u64, self.height as u64);
        out.bits
            .par_chunks_mut(width as usize)
            .enumerate()
            .for_each(|(y, row)| {
                let sy = ((y as u64 * sh) / height as u64).min(sh - 1) as usize;
                let src = &self.bits[sy * sw as usize..(sy + 1) * sw as usize];
                for (x, px) in row.iter_mut().enumerate() {
                    let sx = ((x as u64 * sw) / width as u64).min(sw - 1) as usize;
                    *px = src[sx];
                }
            });
        out
    }
}

/// Select every pixel whose HSV triple lies inside the channel bands and
/// whose position lies inside the region rectangle.
///
/// Pure: the result depends only on `hsv` and `params`.
pub fn evaluate(hsv: &HsvPlanes, params: &LayerParams) -> BinaryMask {
    evaluate_any(hsv, params, &[])
}

/// Like [`evaluate`], but a pixel also qualifies when its HSV triple lies in
/// any of `alternatives`. The region rectangle applies to every band.
pub fn evaluate_any(hsv: &HsvPlanes, params: &LayerParams, alternatives: &[HsvRanges]) -> BinaryMask {
    let mut mask = BinaryMask::new(hsv.width, hsv.height);
    if mask.is_empty() {
        return mask;
    }

    let w = hsv.width as usize;
    let rows = params.region.rows(hsv.height);
    let cols = params.region.cols(hsv.width);
    let ranges = params.hsv;

    mask.bits.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        if !rows.contains(&(y as u32)) {
            return;
        }
        let base = y * w;
        for x in cols.start as usize..cols.end as usize {
            let i = base + x;
            let px = [hsv.h[i], hsv.s[i], hsv.v[i]];
            row[x] = ranges.contains(px) || alternatives.iter().any(|alt| alt.contains(px));
        }
    });

    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{Bounds, Control};
    use image::{Rgba, RgbaImage};

    fn striped() -> HsvPlanes {
        // Columns cycle red, green, blue, white.
        let palette = [
            Rgba([255, 0, 0, 255]),
            Rgba([0, 255, 0, 255]),
            Rgba([0, 0, 255, 255]),
            Rgba([255, 255, 255, 255]),
        ];
        let img = RgbaImage::from_fn(40, 20, |x, _| palette[(x % 4) as usize]);
        HsvPlanes::from_rgba(&img)
    }

    fn everything() -> LayerParams {
        LayerParams::new((0, 179), (0, 255), (0, 255), (0, 100), (0, 100))
    }

    #[test]
    fn full_ranges_select_every_pixel() {
        let hsv = striped();
        assert_eq!(evaluate(&hsv, &everything()).count(), 800);
    }

    #[test]
    fn hue_band_selects_matching_columns_only() {
        let hsv = striped();
        let mut p = everything();
        p.hsv.h = Bounds::new(55, 65);
        p.hsv.s = Bounds::new(200, 255);
        let mask = evaluate(&hsv, &p);
        assert_eq!(mask.count(), 200);
        assert!(mask.get(1, 0));
        assert!(!mask.get(0, 0));
        assert!(!mask.get(3, 0));
    }

    #[test]
    fn evaluation_is_repeatable() {
        let hsv = striped();
        let mut p = everything();
        p.set(Control::YMin, 25);
        p.set(Control::XMax, 60);
        assert_eq!(evaluate(&hsv, &p), evaluate(&hsv, &p));
    }

    #[test]
    fn inverted_band_yields_empty_mask() {
        let hsv = striped();
        let mut p = everything();
        p.hsv.v = Bounds::new(200, 100);
        let mask = evaluate(&hsv, &p);
        assert_eq!(mask.count(), 0);
        assert_eq!(mask.coverage_percent(), 0.0);
        assert_eq!(mask.bbox(), None);
    }

    #[test]
    fn widening_never_shrinks_selection() {
        let hsv = striped();
        let mut p = LayerParams::new((50, 70), (100, 255), (0, 255), (10, 60), (20, 80));
        let mut previous = evaluate(&hsv, &p).count();
        for control in [Control::HMin, Control::SMin, Control::YMin, Control::XMin] {
            p.set(control, 0);
            let now = evaluate(&hsv, &p).count();
            assert!(now >= previous);
            previous = now;
        }
        for control in [Control::HMax, Control::YMax, Control::XMax] {
            p.set(control, 255);
            let now = evaluate(&hsv, &p).count();
            assert!(now >= previous);
            previous = now;
        }
        assert_eq!(previous, 800);
    }

    #[test]
    fn region_restricts_rows_and_columns() {
        let hsv = striped();
        let p = LayerParams::new((0, 179), (0, 255), (0, 255), (50, 100), (0, 25));
        let mask = evaluate(&hsv, &p);
        // rows 10..20, columns 0..10
        assert_eq!(mask.count(), 100);
        assert_eq!(mask.bbox(), Some(BBox { x0: 0, y0: 10, x1: 9, y1: 19 }));
    }

    #[test]
    fn coverage_rounds_to_one_decimal() {
        let mut mask = BinaryMask::new(30, 10);
        mask.fill_rect(0, 0, 0, 0);
        assert_eq!(mask.coverage_percent(), 0.3);
        mask.fill_rect(0, 0, 1, 0);
        assert_eq!(mask.coverage_percent(), 0.7);
    }

    #[test]
    fn nearest_resize_keeps_hard_edges() {
        let mut mask = BinaryMask::new(8, 8);
        mask.fill_rect(0, 0, 3, 7);
        let small = mask.resize_nearest(4, 2);
        assert_eq!(small.count(), 4);
        assert!(small.get(1, 1));
        assert!(!small.get(2, 0));
    }

    #[test]
    fn subtract_clears_overlap() {
        let mut a = BinaryMask::new(4, 1);
        a.fill_rect(0, 0, 3, 0);
        let mut b = BinaryMask::new(4, 1);
        b.fill_rect(1, 0, 2, 0);
        a.subtract(&b);
        assert_eq!(a.bits(), &[true, false, false, true]);
    }

    #[test]
    fn from_bits_checks_length() {
        assert!(BinaryMask::from_bits(2, 2, vec![false; 3]).is_err());
        assert!(BinaryMask::from_bits(2, 2, vec![true; 4]).is_ok());
    }

    #[test]
    fn alternative_bands_add_to_selection() {
        let hsv = striped();
        let mut p = everything();
        p.hsv.h = Bounds::new(55, 65);
        p.hsv.s = Bounds::new(200, 255);
        p.region.x = Bounds::new(0, 50);
        let white = HsvRanges {
            h: Bounds::new(0, 179),
            s: Bounds::new(0, 20),
            v: Bounds::new(230, 255),
        };
        let mask = evaluate_any(&hsv, &p, &[white]);
        // Green and white columns in the left half only.
        assert_eq!(mask.count(), 200);
        assert!(mask.get(1, 0));
        assert!(mask.get(3, 0));
        assert!(!mask.get(23, 0));
        assert_eq!(evaluate_any(&hsv, &p, &[]), evaluate(&hsv, &p));
    }

    #[test]
    fn padding_round_trips() {
        let mut mask = BinaryMask::new(5, 3);
        mask.fill_rect(0, 0, 1, 2);
        mask.set(4, 0, true);
        let padded = mask.padded(2);
        assert_eq!((padded.width(), padded.height()), (9, 7));
        assert_eq!(padded.count(), mask.count());
        assert!(padded.get(2, 2));
        assert!(padded.get(6, 2));
        assert_eq!(padded.cropped(2), mask);
    }

    #[test]
    fn gray_copy_marks_set_pixels() {
        let mut mask = BinaryMask::new(3, 2);
        mask.set(2, 1, true);
        let gray = mask.to_gray();
        assert_eq!(gray.get_pixel(2, 1), &Luma([255]));
        assert_eq!(gray.get_pixel(0, 0), &Luma([0]));
    }
}
