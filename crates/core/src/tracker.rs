//! Per-frame pipeline orchestrator: owns the background filter, the
//! per-touch update, the residual analysis, the birth logic, and the
//! output frame. This is the component the rest of the core exists to
//! support.

use log::{debug, trace, warn};

use crate::calibration::{CalibrationPhase, Calibrator};
use crate::error::ConfigError;
use crate::geometry::{KeyGeometry, NUM_KEYS};
use crate::grid::{SignalGrid, SignalGrid3};
use crate::keystate::{peak_to_coefficient, KeyStateArray};
use crate::output::{OutputFrame, MIN_COLS};
use crate::params::Parameters;
use crate::template::{difference_from_template, z_adjust, TEMPLATE_RADIUS};
use crate::touch::{Touch, TouchTable};

/// Frames of "no-touch" warm-up the source takes before calibration starts
/// sampling; also reused as the outer attack window for the touch
/// zf lowpass (see DESIGN.md).
const ATTACK_FRAMES: u32 = 100;
const TOUCH_RELEASE_FRAMES: f32 = 100.0;
const KEY_STATE_AGE_GATE: u32 = 10;
const MAX_PEAKS_PER_FRAME: u32 = 4;
const BIRTH_EVIDENCE_FLOOR_SCALE: f32 = 0.25;

type CalibrationListener = Box<dyn FnMut(&SignalGrid3, &SignalGrid, f32)>;

pub struct Tracker {
    width: usize,
    height: usize,
    params: Parameters,
    geometry: KeyGeometry,

    touch_table: TouchTable,
    key_states: KeyStateArray,
    calibrator: Calibrator,
    background: crate::onepole::AsymmetricOnepoleField,

    first_frame: bool,
    logged_output_error: bool,

    listener: Option<CalibrationListener>,
}

impl Tracker {
    pub fn new(width: usize, height: usize, params: Parameters) -> Result<Self, ConfigError> {
        params.validate()?;
        let geometry = KeyGeometry::default();
        Ok(Self {
            width,
            height,
            touch_table: TouchTable::new(params.max_touches()),
            key_states: KeyStateArray::new(&geometry),
            calibrator: Calibrator::new(width, height, params.sample_rate(), geometry),
            background: crate::onepole::AsymmetricOnepoleField::new(
                width,
                height,
                params.sample_rate(),
            ),
            params,
            geometry,
            first_frame: true,
            logged_output_error: false,
            listener: None,
        })
    }

    pub fn set_listener<F>(&mut self, f: F)
    where
        F: FnMut(&SignalGrid3, &SignalGrid, f32) + 'static,
    {
        self.listener = Some(Box::new(f));
    }

    pub fn clear_listener(&mut self) {
        self.listener = None;
    }

    pub fn set_parameters(&mut self, params: Parameters) -> Result<(), ConfigError> {
        params.validate()?;
        self.touch_table.set_max_touches(params.max_touches());
        self.background.set_sample_rate(params.sample_rate());
        self.params = params;
        Ok(())
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    pub fn clear(&mut self) {
        self.touch_table.clear();
        self.key_states = KeyStateArray::new(&self.geometry);
        self.background.clear();
        self.first_frame = true;
    }

    pub fn begin_calibrate(&mut self) {
        self.calibrator.begin();
    }

    pub fn cancel_calibrate(&mut self) {
        self.calibrator.cancel();
    }

    pub fn is_calibrating(&self) -> bool {
        self.calibrator.is_calibrating()
    }

    pub fn set_calibration(&mut self, signal: SignalGrid3) {
        self.calibrator.set_calibration(signal);
    }

    pub fn set_normalize_map(&mut self, map: SignalGrid) {
        self.calibrator.set_normalize_map(map);
    }

    pub fn set_default_calibration(&mut self) {
        self.calibrator.set_default_calibration();
    }

    pub fn touch_table(&self) -> &TouchTable {
        &self.touch_table
    }

    fn validate_output(&mut self, output: &OutputFrame) -> Result<(), ConfigError> {
        if output.cols() < MIN_COLS || output.rows() < self.params.max_touches() {
            let err = ConfigError::OutputTooSmall {
                min_cols: MIN_COLS,
                min_rows: self.params.max_touches(),
                got_cols: output.cols(),
                got_rows: output.rows(),
            };
            if !self.logged_output_error {
                warn!("refusing process(): {err}");
                self.logged_output_error = true;
            }
            return Err(err);
        }
        self.logged_output_error = false;
        Ok(())
    }

    pub fn process(&mut self, input: &SignalGrid, output: &mut OutputFrame) -> Result<(), ConfigError> {
        self.validate_output(output)?;

        if self.calibrator.is_calibrating() {
            if let Some(result) = self.calibrator.process(input) {
                debug!(
                    "calibration complete, avg template distance = {}",
                    result.avg_distance
                );
                if let Some(listener) = &mut self.listener {
                    listener(
                        &result.calibrate_signal,
                        &result.normalize_map,
                        result.avg_distance,
                    );
                }
            }
        }

        if self.first_frame {
            self.background.set_state(input);
            self.first_frame = false;
            output.clear();
            return Ok(());
        }

        // 1. normalize
        let mut filtered = input.clone();
        if let Some(map) = self.calibrator.normalize_map() {
            filtered.multiply(map);
        }

        // 2. smooth
        filtered = filtered.convolve3x3(4.0 / 16.0, 2.0 / 16.0, 1.0 / 16.0);

        // 3. synthesize sum-of-touches
        let mut sum_of_touches = SignalGrid::new(self.width, self.height);
        for (_, touch) in self.touch_table.iter_active() {
            let mut template = self.calibrator.get_template(touch.x, touch.y);
            template.scale(touch.z * z_adjust(touch.x, touch.y));
            sum_of_touches.blit_add(&template, touch.x - TEMPLATE_RADIUS as f32, touch.y - TEMPLATE_RADIUS as f32);
        }

        // 4. background
        let mut fc_rise = SignalGrid::new(self.width, self.height);
        fc_rise.fill(self.params.background_filter_freq());
        let fc_fall = fc_rise.clone();
        let mut touch_suppression = sum_of_touches.clone();
        touch_suppression.scale(100.0);
        fc_rise.subtract(&touch_suppression);
        fc_rise.clamp_below_to_zero();
        self.background.process(&filtered, &fc_rise, &fc_fall);

        // 5. foreground
        let mut diff = filtered.clone();
        diff.subtract(self.background.state());
        diff.clamp_below_to_zero();

        // 6. update existing touches
        self.update_touches(&diff);

        // 7. residual
        let mut residual = diff.clone();
        residual.subtract(&sum_of_touches);
        residual.clamp_below_to_zero();

        // 8. birth evidence
        self.feed_birth_evidence(&diff, &residual);

        // 9. tick
        self.key_states.tick_all();

        // 10. birth
        self.birth_touches();

        // 11. emit
        self.emit(output);

        trace!(
            "frame processed, {} active touches",
            self.touch_table.count_active()
        );
        Ok(())
    }

    fn update_touches(&mut self, diff: &SignalGrid) {
        let mut order: Vec<(usize, f32)> = self
            .touch_table
            .iter_active()
            .map(|(i, t)| (i, t.z))
            .collect();
        order.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());

        let mut working = diff.clone();
        let mut template_mask = SignalGrid::new(self.width, self.height);

        let on_threshold = self.params.on_threshold();
        let off_threshold = self.params.off_threshold();
        let override_threshold = self.params.override_threshold();
        let template_thresh = self.params.template_thresh();
        let max_force = self.params.max_force();
        let sample_rate = self.params.sample_rate();

        let mut to_remove = Vec::new();

        for (idx, _) in order {
            let (current_key, cur_x, cur_y, cur_z, cur_age) = {
                let t = self.touch_table.get(idx);
                (t.key, t.x, t.y, t.z, t.age)
            };

            let ix = cur_x.round().clamp(0.0, (self.width - 1) as f32) as usize;
            let iy = cur_y.round().clamp(0.0, (self.height - 1) as f32) as usize;

            let mut new_pos = match working.step_to_neighbor(ix, iy) {
                Some((nx, ny)) => working.refine_peak(nx, ny),
                None => working.refine_peak(ix, iy),
            };
            let mut new_key = self.geometry.key_index(new_pos.0, new_pos.1) as i32;

            let occupant = self.touch_table.find_by_key(new_key);
            if new_key != current_key && occupant.is_some() && occupant != Some(idx) {
                new_pos = (cur_x, cur_y);
                new_key = current_key;
            }
            if self.params.quantize_to_key() {
                new_pos = self.geometry.key_center(new_key as usize);
            }

            let mut new_z = working.sample(new_pos.0, new_pos.1);

            let template = self.calibrator.get_template(new_pos.0, new_pos.1);
            let t_dist = difference_from_template(&template, &working, new_pos, Some(&template_mask));

            let inhibit = self.inhibit_threshold(new_pos, Some(idx));
            let release = new_z <= off_threshold
                || (t_dist >= template_thresh && new_z <= override_threshold)
                || new_z <= inhibit;

            let touch = self.touch_table.get_mut(idx);
            if release {
                if touch.release_ctr == 0 {
                    touch.release_slope = touch.z / TOUCH_RELEASE_FRAMES;
                }
                touch.release_ctr += 1;
                new_z = touch.z - touch.release_slope;
            } else {
                touch.release_ctr = 0;
            }

            touch.age = cur_age + 1;

            let xy_cutoff = (((new_z - on_threshold) / (0.25 * max_force)).clamp(0.0, 1.0)).powi(2)
                * 100.0;
            let xy_cutoff = xy_cutoff.clamp(1.0, 100.0);
            let a0_xy = crate::onepole::onepole_coeff(xy_cutoff, sample_rate);
            touch.x += a0_xy * (new_pos.0 - touch.x);
            touch.y += a0_xy * (new_pos.1 - touch.y);

            let lp = if touch.age <= ATTACK_FRAMES {
                self.params.lopass()
            } else {
                0.25 * self.params.lopass()
            };
            let a0_z = crate::onepole::onepole_coeff(lp, sample_rate);
            touch.zf += a0_z * (new_z - touch.zf);
            touch.z = new_z;
            touch.key = new_key;
            touch.t_dist = t_dist;

            if touch.zf < 0.0 {
                to_remove.push(idx);
            }

            let pos = (touch.x, touch.y);
            let z = touch.z;
            let mut scaled = self.calibrator.get_template(pos.0, pos.1);
            scaled.scale(z * z_adjust(pos.0, pos.1));
            let mut negated = scaled.clone();
            negated.scale(-1.0);
            working.blit_add(&negated, pos.0 - TEMPLATE_RADIUS as f32, pos.1 - TEMPLATE_RADIUS as f32);
            working.clamp_below_to_zero();
            template_mask.blit_add(&scaled, pos.0 - TEMPLATE_RADIUS as f32, pos.1 - TEMPLATE_RADIUS as f32);
        }

        for idx in to_remove {
            self.touch_table.remove_at(idx);
        }
    }

    fn inhibit_threshold(&self, pos: (f32, f32), exclude: Option<usize>) -> f32 {
        let mut best = 0.0f32;
        for (i, touch) in self.touch_table.iter_active() {
            if Some(i) == exclude {
                continue;
            }
            let dx = pos.0 - touch.x;
            let dy = pos.1 - touch.y;
            let d = (dx * dx + dy * dy).sqrt();
            if d > 0.1 {
                let candidate = 1.1 * touch.z / (1.0 + d / 6.0);
                if candidate > best {
                    best = candidate;
                }
            }
        }
        best
    }

    fn feed_birth_evidence(&mut self, diff: &SignalGrid, residual: &SignalGrid) {
        let mut scratch = residual.clone();
        let floor = BIRTH_EVIDENCE_FLOOR_SCALE * self.params.on_threshold();

        for _ in 0..MAX_PEAKS_PER_FRAME {
            let (ix, iy, z) = scratch.find_peak();
            if z <= floor {
                break;
            }
            let (fx, fy) = scratch.refine_peak(ix, iy);
            let key = self.geometry.key_index(fx, fy);
            let pos = if self.params.quantize_to_key() {
                self.geometry.key_center(key)
            } else {
                (fx, fy)
            };

            let template = self.calibrator.get_template(fx, fy);
            let t_dist = difference_from_template(&template, diff, (fx, fy), None);
            let m_k = peak_to_coefficient(z, self.params.on_threshold(), self.params.max_force());

            let ks = self.key_states.get_mut(key);
            ks.z_in = z;
            ks.dt_in = t_dist;
            ks.pos_in = pos;
            ks.m_k = m_k;

            scratch.suppress_disk(fx, fy, self.params.combine_radius());
        }
    }

    fn birth_touches(&mut self) {
        let on_threshold = self.params.on_threshold();
        let override_threshold = self.params.override_threshold();
        let template_thresh = self.params.template_thresh();

        for key in 0..NUM_KEYS {
            let (z_out, dz_out, dt_out, pos_out, m_k, age) = {
                let ks = self.key_states.get(key);
                (ks.z_out, ks.dz_out, ks.dt_out, ks.pos_out, ks.m_k, ks.age)
            };

            if self.touch_table.find_by_key(key as i32).is_some() {
                continue;
            }
            let inhibit = self.inhibit_threshold(pos_out, None);
            let qualifies = z_out > on_threshold
                && z_out > inhibit
                && m_k > 0.001
                && age > KEY_STATE_AGE_GATE
                && (dt_out < template_thresh || z_out > override_threshold);

            if qualifies {
                let dz = (50.0 * dz_out).clamp(0.0, 1.0).sqrt();
                let touch = Touch {
                    key: key as i32,
                    x: pos_out.0,
                    y: pos_out.1,
                    z: z_out,
                    zf: 0.0,
                    dz,
                    t_dist: dt_out,
                    age: 0,
                    release_ctr: 0,
                    release_slope: 0.0,
                };
                if self.touch_table.add(touch).is_some() {
                    self.key_states.reset_age(key);
                }
            }
        }
    }

    fn emit(&self, output: &mut OutputFrame) {
        output.clear();
        for row in 0..self.touch_table.len() {
            let t = self.touch_table.get(row);
            let z = if t.age > 0 { t.zf } else { 0.0 };
            output.set_touch_row(row, t.x, t.y, z, t.dz, t.age, t.t_dist);
        }
    }
}
