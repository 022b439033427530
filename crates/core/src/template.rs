//! Touch-shape templates: extraction, the sub-pixel energy-loss
//! compensation factor, and the template-match distance used both during
//! calibration and by the tracker's touch-update and birth-evidence steps.

use crate::grid::SignalGrid;

pub const TEMPLATE_RADIUS: usize = 3;
pub const TEMPLATE_SIZE: usize = 2 * TEMPLATE_RADIUS + 1;

/// Compensates for the energy bilinear sampling loses away from cell
/// centers: `1.414 - 0.5 * |frac(pos) - (0.5, 0.5)|`.
pub fn z_adjust(x: f32, y: f32) -> f32 {
    let fx = x.fract().abs();
    let fy = y.fract().abs();
    let dx = fx - 0.5;
    let dy = fy - 0.5;
    1.414 - 0.5 * (dx * dx + dy * dy).sqrt()
}

/// Extract a `TEMPLATE_SIZE x TEMPLATE_SIZE` patch from `grid`, sampling
/// bilinearly around `(cx, cy)` so fractional centers are supported.
pub fn extract_patch(grid: &SignalGrid, cx: f32, cy: f32) -> SignalGrid {
    let mut patch = SignalGrid::new(TEMPLATE_SIZE, TEMPLATE_SIZE);
    let r = TEMPLATE_RADIUS as f32;
    for j in 0..TEMPLATE_SIZE {
        for i in 0..TEMPLATE_SIZE {
            let sx = cx - r + i as f32;
            let sy = cy - r + j as f32;
            patch.set(i, j, grid.sample(sx, sy));
        }
    }
    patch
}

/// The fixed radial-cone default template used before calibration
/// completes and as the seed value in unit tests.
pub fn default_template() -> SignalGrid {
    let mut t = SignalGrid::new(TEMPLATE_SIZE, TEMPLATE_SIZE);
    let r = TEMPLATE_RADIUS as f32;
    for j in 0..TEMPLATE_SIZE {
        for i in 0..TEMPLATE_SIZE {
            let dx = i as f32 - r;
            let dy = j as f32 - r;
            let d = (dx * dx + dy * dy).sqrt() / r;
            t.set(i, j, (1.0 - d).max(0.0));
        }
    }
    t
}

/// RMS distance between `template` and a patch extracted from `input`
/// around `pos`, normalized so the patch reads 1.0 at its center. Cells
/// where the raw extracted patch is non-positive are excluded from the
/// RMS; if `mask` is given, cells whose mask patch value is `>= 0.001` are
/// additionally excluded (so touches crowded by neighbors don't falsely
/// fail the template test).
pub fn difference_from_template(
    template: &SignalGrid,
    input: &SignalGrid,
    pos: (f32, f32),
    mask: Option<&SignalGrid>,
) -> f32 {
    let raw_patch = extract_patch(input, pos.0, pos.1);
    let center = input.sample(pos.0, pos.1);
    let scale = (center * z_adjust(pos.0, pos.1)).clamp(1e-5, 1.0);
    let inv = 1.0 / scale;

    let mask_patch = mask.map(|m| extract_patch(m, pos.0, pos.1));

    let mut sum_sq = 0.0f32;
    let mut n = 0usize;
    for j in 0..TEMPLATE_SIZE {
        for i in 0..TEMPLATE_SIZE {
            let raw = raw_patch.get(i, j);
            if raw <= 0.0 {
                continue;
            }
            if let Some(mp) = &mask_patch {
                if mp.get(i, j) >= 0.001 {
                    continue;
                }
            }
            let scaled = raw * inv;
            let d = template.get(i, j) - scaled;
            sum_sq += d * d;
            n += 1;
        }
    }
    if n == 0 {
        return 1.0;
    }
    (sum_sq / n as f32).sqrt()
}
