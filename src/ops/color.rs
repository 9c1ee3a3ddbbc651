use image::RgbaImage;
use rayon::prelude::*;

/// Largest hue value produced by [`rgb_to_hsv`]. Hue is stored in half-degrees.
pub const HUE_MAX: u8 = 179;
/// Largest saturation / value produced by [`rgb_to_hsv`].
pub const SV_MAX: u8 = 255;

/// Convert one RGB sample to 8-bit HSV.
///
/// * `h` ∈ [0, 179] — degrees / 2, rounded, 180 wraps back to 0
/// * `s` ∈ [0, 255] — `255 · chroma / max`
/// * `v` ∈ [0, 255] — `max(r, g, b)`
///
/// Achromatic samples (r = g = b) yield `h = 0, s = 0`.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> [u8; 3] {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let chroma = (max - min) as f32;

    if max == 0 || chroma == 0.0 {
        return [0, 0, max];
    }

    let s = (255.0 * chroma / max as f32).round() as u8;

    let (rf, gf, bf) = (r as f32, g as f32, b as f32);
    let deg = if max == r {
        60.0 * (gf - bf) / chroma
    } else if max == g {
        120.0 + 60.0 * (bf - rf) / chroma
    } else {
        240.0 + 60.0 * (rf - gf) / chroma
    };
    let deg = if deg < 0.0 { deg + 360.0 } else { deg };

    let mut h = (deg / 2.0).round() as u32;
    if h >= 180 {
        h -= 180;
    }
    [h as u8, s, max]
}

/// Hue / saturation / value planes of an image, row-major, one byte per pixel.
///
/// Derived once from the source buffer and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HsvPlanes {
    pub width: u32,
    pub height: u32,
    pub h: Vec<u8>,
    pub s: Vec<u8>,
    pub v: Vec<u8>,
}

impl HsvPlanes {
    /// Convert every pixel of `img` (alpha ignored).
    pub fn from_rgba(img: &RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        let hsv: Vec<[u8; 3]> = img
            .as_raw()
            .par_chunks_exact(4)
            .map(|px| rgb_to_hsv(px[0], px[1], px[2]))
            .collect();

        let n = hsv.len();
        let mut h = Vec::with_capacity(n);
        let mut s = Vec::with_capacity(n);
        let mut v = Vec::with_capacity(n);
        for [ph, ps, pv] in hsv {
            h.push(ph);
            s.push(ps);
            v.push(pv);
        }

        Self { width, height, h, s, v }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.h.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.h.is_empty()
    }

    /// HSV triple at `(x, y)`.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> [u8; 3] {
        let i = (y * self.width + x) as usize;
        [self.h[i], self.s[i], self.v[i]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn primaries_map_to_half_degree_hues() {
        assert_eq!(rgb_to_hsv(255, 0, 0), [0, 255, 255]);
        assert_eq!(rgb_to_hsv(0, 255, 0), [60, 255, 255]);
        assert_eq!(rgb_to_hsv(0, 0, 255), [120, 255, 255]);
        assert_eq!(rgb_to_hsv(255, 255, 0), [30, 255, 255]);
        assert_eq!(rgb_to_hsv(0, 255, 255), [90, 255, 255]);
        assert_eq!(rgb_to_hsv(255, 0, 255), [150, 255, 255]);
    }

    #[test]
    fn achromatic_has_zero_hue_and_saturation() {
        for level in [0u8, 1, 64, 128, 200, 255] {
            assert_eq!(rgb_to_hsv(level, level, level), [0, 0, level]);
        }
    }

    #[test]
    fn hue_stays_below_180_near_wraparound() {
        // 359° would round to 180 half-degrees without the wrap.
        let [h, _, _] = rgb_to_hsv(255, 0, 8);
        assert_eq!(h, 179);
        let [h, _, _] = rgb_to_hsv(255, 0, 4);
        assert_eq!(h, 0);
    }

    #[test]
    fn every_sample_lands_in_documented_range() {
        for r in (0..=255u16).step_by(15) {
            for g in (0..=255u16).step_by(15) {
                for b in (0..=255u16).step_by(15) {
                    let [h, _, v] = rgb_to_hsv(r as u8, g as u8, b as u8);
                    assert!(h <= HUE_MAX, "hue {} for {:?}", h, (r, g, b));
                    assert_eq!(v, r.max(g).max(b) as u8);
                }
            }
        }
    }

    #[test]
    fn planes_follow_row_major_layout() {
        let mut img = RgbaImage::from_pixel(3, 2, Rgba([255, 255, 255, 255]));
        img.put_pixel(2, 1, Rgba([0, 255, 0, 255]));
        let planes = HsvPlanes::from_rgba(&img);
        assert_eq!(planes.len(), 6);
        assert_eq!(planes.get(2, 1), [60, 255, 255]);
        assert_eq!(planes.get(0, 0), [0, 0, 255]);
        assert_eq!(planes.h[5], 60);
    }
}
