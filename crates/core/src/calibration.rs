//! Calibration state machine: learns a per-key touch-shape template and a
//! per-sensor normalization map by observing a single finger sliding over
//! every key twice.

use crate::geometry::{KeyGeometry, NUM_KEYS};
use crate::grid::{SignalGrid, SignalGrid3};
use crate::onepole::onepole_coeff;
use crate::template::{
    default_template, difference_from_template, extract_patch, TEMPLATE_RADIUS, TEMPLATE_SIZE,
};

const PASSES_TO_CALIBRATE: u32 = 2;
const WARMUP_FRAMES: u32 = 1000;
/// Peak pressure above which a calibration frame is considered a genuine
/// finger contact rather than noise. Not exposed as a runtime parameter;
/// see DESIGN.md for the rationale.
const CALIBRATE_TRACKER_THRESH: f32 = 0.03;
const WARMUP_LOWPASS_HZ: f32 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalibrationPhase {
    Idle,
    Collecting,
    Done,
}

pub struct CalibrationResult {
    pub calibrate_signal: SignalGrid3,
    pub normalize_map: SignalGrid,
    pub avg_distance: f32,
}

pub struct Calibrator {
    geometry: KeyGeometry,
    width: usize,
    height: usize,
    sample_rate: f32,
    phase: CalibrationPhase,
    warmup_remaining: u32,
    filtered_input: SignalGrid,

    data_min: Vec<SignalGrid>,
    data_sum: Vec<SignalGrid>,
    sample_count: Vec<u32>,
    pass_count: Vec<u32>,
    last_bin: Option<usize>,

    normalize_accum: SignalGrid,
    normalize_count: SignalGrid,

    calibrate_signal: Option<SignalGrid3>,
    normalize_map: Option<SignalGrid>,
    avg_distance: f32,
}

impl Calibrator {
    pub fn new(width: usize, height: usize, sample_rate: f32, geometry: KeyGeometry) -> Self {
        Self {
            geometry,
            width,
            height,
            sample_rate,
            phase: CalibrationPhase::Idle,
            warmup_remaining: 0,
            filtered_input: SignalGrid::new(width, height),
            data_min: (0..NUM_KEYS)
                .map(|_| SignalGrid::new(TEMPLATE_SIZE, TEMPLATE_SIZE))
                .collect(),
            data_sum: (0..NUM_KEYS)
                .map(|_| SignalGrid::new(TEMPLATE_SIZE, TEMPLATE_SIZE))
                .collect(),
            sample_count: vec![0; NUM_KEYS],
            pass_count: vec![0; NUM_KEYS],
            last_bin: None,
            normalize_accum: SignalGrid::new(width, height),
            normalize_count: SignalGrid::new(width, height),
            calibrate_signal: None,
            normalize_map: None,
            avg_distance: 0.0,
        }
    }

    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    pub fn is_calibrating(&self) -> bool {
        self.phase == CalibrationPhase::Collecting
    }

    pub fn is_done(&self) -> bool {
        self.phase == CalibrationPhase::Done
    }

    pub fn begin(&mut self) {
        for g in &mut self.data_min {
            g.fill(f32::MAX);
        }
        for g in &mut self.data_sum {
            g.fill(0.0);
        }
        self.sample_count.iter_mut().for_each(|c| *c = 0);
        self.pass_count.iter_mut().for_each(|c| *c = 0);
        self.last_bin = None;
        self.normalize_accum.fill(0.0);
        self.normalize_count.fill(0.0);
        self.warmup_remaining = WARMUP_FRAMES;
        self.phase = CalibrationPhase::Collecting;
    }

    /// Returns to `Idle` with no state changes beyond what `begin()` made;
    /// the caller is free to `begin()` again later.
    pub fn cancel(&mut self) {
        self.phase = CalibrationPhase::Idle;
    }

    /// Feed one frame of raw input while `Collecting`. No-op otherwise.
    pub fn process(&mut self, input: &SignalGrid) -> Option<CalibrationResult> {
        if self.phase != CalibrationPhase::Collecting {
            return None;
        }

        if self.warmup_remaining > 0 {
            let a0 = onepole_coeff(WARMUP_LOWPASS_HZ, self.sample_rate);
            for y in 0..self.height {
                for x in 0..self.width {
                    let xv = input.get(x, y);
                    let yv = self.filtered_input.get(x, y);
                    self.filtered_input.set(x, y, yv + a0 * (xv - yv));
                }
            }
            self.warmup_remaining -= 1;
            return None;
        }

        let (ix, iy, z) = input.find_peak();
        if z > CALIBRATE_TRACKER_THRESH {
            let (fx, fy) = input.refine_peak(ix, iy);
            let bin = self.geometry.key_index(fx, fy);

            let raw_patch = extract_patch(input, ix as f32, iy as f32);
            let convolved = raw_patch.convolve3x3(4.0 / 16.0, 2.0 / 16.0, 1.0 / 16.0);
            let center = convolved.get(TEMPLATE_RADIUS, TEMPLATE_RADIUS);
            let mut normalized = convolved;
            if center.abs() > 1e-9 {
                normalized.scale(1.0 / center);
            }

            for j in 0..TEMPLATE_SIZE {
                for i in 0..TEMPLATE_SIZE {
                    let v = normalized.get(i, j);
                    let sum_v = self.data_sum[bin].get(i, j) + v;
                    self.data_sum[bin].set(i, j, sum_v);
                    let min_v = self.data_min[bin].get(i, j).min(v);
                    self.data_min[bin].set(i, j, min_v);
                }
            }
            self.sample_count[bin] += 1;

            let acc = self.normalize_accum.get(ix, iy) + z;
            self.normalize_accum.set(ix, iy, acc);
            let cnt = self.normalize_count.get(ix, iy) + 1.0;
            self.normalize_count.set(ix, iy, cnt);

            if self.last_bin != Some(bin) {
                self.pass_count[bin] = (self.pass_count[bin] + 1).min(PASSES_TO_CALIBRATE);
            }
            self.last_bin = Some(bin);
        }

        if self.pass_count.iter().all(|&p| p >= PASSES_TO_CALIBRATE) {
            Some(self.finish())
        } else {
            None
        }
    }

    fn finish(&mut self) -> CalibrationResult {
        let mut calibrate_signal = SignalGrid3::new(TEMPLATE_SIZE, TEMPLATE_SIZE, NUM_KEYS);
        let mut distances = Vec::with_capacity(NUM_KEYS);
        for bin in 0..NUM_KEYS {
            calibrate_signal.frame_mut(bin).copy_from(&self.data_min[bin]);

            if self.sample_count[bin] > 0 {
                let mut averaged = self.data_sum[bin].clone();
                averaged.scale(1.0 / self.sample_count[bin] as f32);
                let d = difference_from_template(
                    &self.data_min[bin],
                    &averaged,
                    (TEMPLATE_RADIUS as f32, TEMPLATE_RADIUS as f32),
                    None,
                );
                distances.push(d);
            }
        }
        let avg_distance = if distances.is_empty() {
            0.0
        } else {
            distances.iter().sum::<f32>() / distances.len() as f32
        };

        let normalize_map = self.make_normalize_map();

        self.calibrate_signal = Some(calibrate_signal.clone());
        self.normalize_map = Some(normalize_map.clone());
        self.avg_distance = avg_distance;
        self.phase = CalibrationPhase::Done;

        CalibrationResult {
            calibrate_signal,
            normalize_map,
            avg_distance,
        }
    }

    fn make_normalize_map(&self) -> SignalGrid {
        let mut ratios = SignalGrid::new(self.width, self.height);
        let mut sum = 0.0f32;
        let mut n = 0usize;
        for y in 0..self.height {
            for x in 0..self.width {
                let c = self.normalize_count.get(x, y);
                if c > 0.0 {
                    let r = self.normalize_accum.get(x, y) / c;
                    ratios.set(x, y, r);
                    sum += r;
                    n += 1;
                }
            }
        }
        let mean = if n > 0 { sum / n as f32 } else { 1.0 };

        let mut map = SignalGrid::new(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let c = self.normalize_count.get(x, y);
                let r = if c > 0.0 { ratios.get(x, y) } else { mean };
                let mut v = if r.abs() > 1e-9 { mean / r } else { 1.0 };
                v *= Self::edge_row_boost(y, self.height);
                map.set(x, y, v);
            }
        }
        map
    }

    /// Hardware-specific compensation for known edge falloff; see
    /// DESIGN.md for why these four constants are not configurable.
    fn edge_row_boost(y: usize, height: usize) -> f32 {
        match y {
            0 => 1.7,
            1 => 1.45,
            y if y == height - 2 => 1.1,
            y if y == height - 1 => 1.33,
            _ => 1.0,
        }
    }

    /// Bilinearly interpolated template at a sensor position, or the fixed
    /// default template before calibration completes.
    pub fn get_template(&self, x: f32, y: f32) -> SignalGrid {
        let Some(signal) = &self.calibrate_signal else {
            return default_template();
        };
        let (col, row) = self.geometry.continuous_coord(x, y);
        let col0 = col.floor().clamp(0.0, 29.0) as usize;
        let row0 = row.floor().clamp(0.0, 4.0) as usize;
        let col1 = (col0 + 1).min(29);
        let row1 = (row0 + 1).min(4);
        let fx = col - col0 as f32;
        let fy = row - row0 as f32;

        let bin = |c: usize, r: usize| r * crate::geometry::NUM_COLS + c;
        let t00 = signal.frame(bin(col0, row0));
        let t10 = signal.frame(bin(col1, row0));
        let t01 = signal.frame(bin(col0, row1));
        let t11 = signal.frame(bin(col1, row1));

        let mut out = SignalGrid::new(TEMPLATE_SIZE, TEMPLATE_SIZE);
        for j in 0..TEMPLATE_SIZE {
            for i in 0..TEMPLATE_SIZE {
                let top = t00.get(i, j) + (t10.get(i, j) - t00.get(i, j)) * fx;
                let bottom = t01.get(i, j) + (t11.get(i, j) - t01.get(i, j)) * fx;
                out.set(i, j, top + (bottom - top) * fy);
            }
        }
        out
    }

    pub fn normalize_map(&self) -> Option<&SignalGrid> {
        self.normalize_map.as_ref()
    }

    pub fn avg_distance(&self) -> f32 {
        self.avg_distance
    }

    pub fn set_calibration(&mut self, signal: SignalGrid3) {
        self.calibrate_signal = Some(signal);
        self.phase = CalibrationPhase::Done;
    }

    pub fn set_normalize_map(&mut self, map: SignalGrid) {
        self.normalize_map = Some(map);
    }

    pub fn set_default_calibration(&mut self) {
        self.calibrate_signal = None;
        self.normalize_map = None;
        self.avg_distance = 0.0;
        self.phase = CalibrationPhase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bump(width: usize, height: usize, cx: f32, cy: f32, peak: f32) -> SignalGrid {
        let mut g = SignalGrid::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                let d2 = dx * dx + dy * dy;
                g.set(x, y, peak * (-d2 / 2.0).exp());
            }
        }
        g
    }

    #[test]
    fn begin_cancel_returns_to_idle() {
        let geo = KeyGeometry::default();
        let mut cal = Calibrator::new(64, 8, 1000.0, geo);
        assert_eq!(cal.phase(), CalibrationPhase::Idle);
        cal.begin();
        assert_eq!(cal.phase(), CalibrationPhase::Collecting);
        cal.cancel();
        assert_eq!(cal.phase(), CalibrationPhase::Idle);
    }

    #[test]
    fn uncalibrated_template_lookup_returns_default() {
        let geo = KeyGeometry::default();
        let cal = Calibrator::new(64, 8, 1000.0, geo);
        let t = cal.get_template(30.0, 3.0);
        assert_eq!(t.width(), TEMPLATE_SIZE);
    }

    #[test]
    fn sweeping_every_bin_twice_completes_calibration() {
        let geo = KeyGeometry::default();
        let mut cal = Calibrator::new(64, 8, 1000.0, geo);
        cal.begin();
        cal.warmup_remaining = 0;

        let mut result = None;
        for _pass in 0..2 {
            for by in 0..5 {
                for bx in 0..30 {
                    let (cx, cy) = geo.key_center((by * 30 + bx) as usize);
                    let frame = bump(64, 8, cx, cy, 0.5);
                    if let Some(r) = cal.process(&frame) {
                        result = Some(r);
                    }
                }
            }
        }
        assert!(cal.is_done());
        let r = result.expect("calibration should complete");
        assert_eq!(r.calibrate_signal.len(), NUM_KEYS);
    }
}
