//! Per-cell first-order IIR lowpass with independently tunable rising and
//! falling cutoff frequencies, used to estimate the slowly varying
//! background pressure field.

use crate::grid::SignalGrid;

#[inline]
pub fn onepole_coeff(fc: f32, sample_rate: f32) -> f32 {
    1.0 - (-2.0 * std::f32::consts::PI * fc / sample_rate).exp()
}

pub struct AsymmetricOnepoleField {
    state: SignalGrid,
    sample_rate: f32,
}

impl AsymmetricOnepoleField {
    pub fn new(width: usize, height: usize, sample_rate: f32) -> Self {
        Self {
            state: SignalGrid::new(width, height),
            sample_rate,
        }
    }

    pub fn state(&self) -> &SignalGrid {
        &self.state
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    pub fn clear(&mut self) {
        self.state.fill(0.0);
    }

    /// Force the filter state directly, bypassing the recurrence. Used by
    /// the tracker to seed the background with the first input frame.
    pub fn set_state(&mut self, g: &SignalGrid) {
        self.state.copy_from(g);
    }

    /// Advance the filter one frame: `y += a(fc_rise | fc_fall) * (x - y)`
    /// per cell, choosing `fc_rise` when `x >= y`, `fc_fall` otherwise.
    pub fn process(&mut self, input: &SignalGrid, fc_rise: &SignalGrid, fc_fall: &SignalGrid) {
        let w = self.state.width();
        let h = self.state.height();
        for y in 0..h {
            for x in 0..w {
                let xv = input.get(x, y);
                let yv = self.state.get(x, y);
                let fc = if xv >= yv {
                    fc_rise.get(x, y)
                } else {
                    fc_fall.get(x, y)
                };
                let a0 = onepole_coeff(fc.max(0.0), self.sample_rate);
                self.state.set(x, y, yv + a0 * (xv - yv));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn converges_toward_constant_input() {
        let mut field = AsymmetricOnepoleField::new(2, 2, 1000.0);
        let mut input = SignalGrid::new(2, 2);
        input.fill(1.0);
        let mut rise = SignalGrid::new(2, 2);
        rise.fill(50.0);
        let fall = SignalGrid::new(2, 2);
        for _ in 0..5000 {
            field.process(&input, &rise, &fall);
        }
        assert_relative_eq!(field.state().get(0, 0), 1.0, epsilon = 1e-3);
    }

    #[test]
    fn clear_resets_state() {
        let mut field = AsymmetricOnepoleField::new(1, 1, 1000.0);
        let mut input = SignalGrid::new(1, 1);
        input.fill(1.0);
        let rise = SignalGrid::new(1, 1);
        let fall = SignalGrid::new(1, 1);
        field.process(&input, &rise, &fall);
        field.clear();
        assert_relative_eq!(field.state().get(0, 0), 0.0);
    }

    #[test]
    fn uses_separate_rise_and_fall_coefficients() {
        let mut field = AsymmetricOnepoleField::new(1, 1, 1000.0);
        let mut input = SignalGrid::new(1, 1);
        input.fill(1.0);
        let mut rise = SignalGrid::new(1, 1);
        rise.fill(1000.0);
        let fall = SignalGrid::new(1, 1);
        field.process(&input, &rise, &fall);
        let after_rise = field.state().get(0, 0);

        input.fill(0.0);
        field.process(&input, &rise, &fall);
        let after_fall = field.state().get(0, 0);
        // fall coefficient is 0 here, so state should not have moved.
        assert_relative_eq!(after_fall, after_rise, epsilon = 1e-6);
    }
}
