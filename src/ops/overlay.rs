use image::RgbaImage;
use rayon::prelude::*;

use crate::ops::mask::BinaryMask;

/// Share of the original pixel kept when a tint is blended over it.
pub const KEEP_ORIGINAL: f32 = 0.35;
/// Share kept per layer when several layers are stacked into one composite.
pub const KEEP_COMPOSITE: f32 = 0.5;

/// `original · keep + tint · (1 - keep)` per RGB channel, rounded and clamped.
#[inline]
pub fn blend_rgb(px: [u8; 3], tint: [u8; 3], keep: f32) -> [u8; 3] {
    let mix = |o: u8, t: u8| (o as f32 * keep + t as f32 * (1.0 - keep)).round().clamp(0.0, 255.0) as u8;
    [mix(px[0], tint[0]), mix(px[1], tint[1]), mix(px[2], tint[2])]
}

/// Blend `tint` into every pixel of `img` selected by `mask`. Alpha is left untouched.
pub fn tint_in_place(img: &mut RgbaImage, mask: &BinaryMask, tint: [u8; 3], keep: f32) {
    debug_assert_eq!(img.dimensions(), (mask.width(), mask.height()));
    img.par_chunks_exact_mut(4)
        .zip(mask.bits().par_iter())
        .for_each(|(px, &on)| {
            if on {
                let [r, g, b] = blend_rgb([px[0], px[1], px[2]], tint, keep);
                px[0] = r;
                px[1] = g;
                px[2] = b;
            }
        });
}

/// Proof image: a copy of `source` with the mask tinted at the standard mix.
/// An empty mask returns an unmodified copy.
pub fn tinted(source: &RgbaImage, mask: &BinaryMask, tint: [u8; 3]) -> RgbaImage {
    let mut out = source.clone();
    tint_in_place(&mut out, mask, tint, KEEP_ORIGINAL);
    out
}

/// Cut-out: original colors, fully opaque inside the mask and transparent outside.
pub fn cutout(source: &RgbaImage, mask: &BinaryMask) -> RgbaImage {
    let mut out = source.clone();
    out.par_chunks_exact_mut(4)
        .zip(mask.bits().par_iter())
        .for_each(|(px, &on)| px[3] = if on { 255 } else { 0 });
    out
}

/// Stack every `(mask, tint)` pair onto a copy of `source`, half-and-half, in order.
pub fn composite(source: &RgbaImage, layers: &[(&BinaryMask, [u8; 3])]) -> RgbaImage {
    let mut out = source.clone();
    for (mask, tint) in layers {
        tint_in_place(&mut out, mask, *tint, KEEP_COMPOSITE);
    }
    out
}
