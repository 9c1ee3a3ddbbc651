use image::Luma;
use imageproc::region_labelling::{connected_components, Connectivity};
use rayon::prelude::*;

use crate::layers::RefineParams;
use crate::ops::mask::BinaryMask;

/// Region Refiner — save-time cleanup of a raw selection:
///
/// 1. **Close** with a disk of `close_radius` to bridge small gaps.
/// 2. **Dilate** with a disk of `dilate_radius` to grow the region slightly.
/// 3. **Label** 8-connected blobs.
/// 4. **Keep** the `max_blobs` largest blobs whose area is at least `min_area`.
///
/// Fewer qualifying blobs than requested is not an error; whatever qualifies is kept.
pub fn refine(mask: &BinaryMask, params: &RefineParams) -> BinaryMask {
    let closed = close(mask, params.close_radius);
    let grown = dilate(&closed, params.dilate_radius);
    if params.filters_blobs() {
        keep_largest_blobs(&grown, params.max_blobs, params.min_area)
    } else {
        grown
    }
}

/// Half-widths of a disk: `extent[|dy|] = floor(sqrt(r² - dy²))`.
fn disk_extents(radius: u32) -> Vec<u32> {
    let r2 = radius as u64 * radius as u64;
    (0..=radius as u64)
        .map(|dy| {
            let rem = r2 - dy * dy;
            let mut dx = (rem as f64).sqrt() as u64;
            // Correct float rounding at perfect squares.
            while dx * dx > rem {
                dx -= 1;
            }
            while (dx + 1) * (dx + 1) <= rem {
                dx += 1;
            }
            dx as u32
        })
        .collect()
}

/// Per-row horizontal distance to the nearest set pixel (`u32::MAX` when the row is empty).
fn row_distances(mask: &BinaryMask) -> Vec<u32> {
    let w = mask.width() as usize;
    let mut dist = vec![u32::MAX; mask.len()];
    if w == 0 {
        return dist;
    }
    dist.par_chunks_mut(w)
        .zip(mask.bits().par_chunks(w))
        .for_each(|(out, row)| {
            // Left-to-right pass
            let mut last: Option<usize> = None;
            for (x, &on) in row.iter().enumerate() {
                if on {
                    last = Some(x);
                }
                if let Some(l) = last {
                    out[x] = (x - l) as u32;
                }
            }
            // Right-to-left pass
            let mut next: Option<usize> = None;
            for x in (0..w).rev() {
                if row[x] {
                    next = Some(x);
                }
                if let Some(n) = next {
                    out[x] = out[x].min((n - x) as u32);
                }
            }
        });
    dist
}

/// Morphological dilation with a disk of `radius`.
pub fn dilate(mask: &BinaryMask, radius: u32) -> BinaryMask {
    if radius == 0 || mask.is_empty() {
        return mask.clone();
    }
    let (w, h) = (mask.width() as usize, mask.height() as usize);
    let extents = disk_extents(radius);
    let dist = row_distances(mask);
    let r = radius as i64;

    let mut bits = vec![false; mask.len()];
    bits.par_chunks_mut(w).enumerate().for_each(|(y, out)| {
        for dy in -r..=r {
            let yy = y as i64 + dy;
            if yy < 0 || yy >= h as i64 {
                continue;
            }
            let reach = extents[dy.unsigned_abs() as usize];
            let src = &dist[yy as usize * w..(yy as usize + 1) * w];
            for (px, &d) in out.iter_mut().zip(src) {
                if d <= reach {
                    *px = true;
                }
            }
        }
    });

    BinaryMask::from_bits(mask.width(), mask.height(), bits).unwrap_or_else(|_| mask.clone())
}

/// Morphological erosion with a disk of `radius`. Pixels outside the image count as set.
pub fn erode(mask: &BinaryMask, radius: u32) -> BinaryMask {
    if radius == 0 {
        return mask.clone();
    }
    dilate(&mask.inverted(), radius).inverted()
}

/// Dilation followed by erosion.
///
/// Runs on a canvas padded by `radius` unset pixels, so the image border
/// never feeds the erosion and the result stays inside the raw bounding box.
pub fn close(mask: &BinaryMask, radius: u32) -> BinaryMask {
    if radius == 0 || mask.is_empty() {
        return mask.clone();
    }
    let canvas = mask.padded(radius);
    erode(&dilate(&canvas, radius), radius).cropped(radius)
}

/// 8-connected component labelling.
///
/// Returns one label per pixel (`0` = background, blobs numbered from 1) and
/// the area of every blob (`areas[label - 1]`).
pub fn label_blobs(mask: &BinaryMask) -> (Vec<u32>, Vec<usize>) {
    if mask.is_empty() {
        return (Vec::new(), Vec::new());
    }
    let labels = connected_components(&mask.to_gray(), Connectivity::Eight, Luma([0u8])).into_raw();

    let blobs = labels.par_iter().copied().max().unwrap_or(0) as usize;
    let mut areas = vec![0usize; blobs];
    for &label in labels.iter().filter(|&&l| l != 0) {
        areas[label as usize - 1] += 1;
    }
    (labels, areas)
}

/// Keep the `max_blobs` largest blobs (all when `None`) with at least `min_area` pixels.
pub fn keep_largest_blobs(mask: &BinaryMask, max_blobs: Option<usize>, min_area: usize) -> BinaryMask {
    let (labels, areas) = label_blobs(mask);
    if areas.is_empty() {
        return mask.clone();
    }

    let mut order: Vec<usize> = (0..areas.len()).collect();
    // Stable: equal areas keep label order.
    order.sort_by(|&a, &b| areas[b].cmp(&areas[a]));

    let mut keep = vec![false; areas.len() + 1];
    for &i in order
        .iter()
        .filter(|&&i| areas[i] >= min_area)
        .take(max_blobs.unwrap_or(usize::MAX))
    {
        keep[i + 1] = true;
    }

    let bits: Vec<bool> = labels.par_iter().map(|&l| keep[l as usize]).collect();
    BinaryMask::from_bits(mask.width(), mask.height(), bits).unwrap_or_else(|_| mask.clone())
}
