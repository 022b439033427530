//! Runtime-tunable parameters, read once per frame (the "snapshot
//! pattern" described in the design notes) so the tracker pipeline always
//! sees a consistent parameter set for the frame it is processing.

use crate::error::ConfigError;
use crate::touch::MAX_TOUCHES;
use serde::{Deserialize, Serialize};

const ON_THRESHOLD_HYSTERESIS: f32 = 0.002;
const OVERRIDE_THRESHOLD_SCALE: f32 = 5.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    on_threshold: f32,
    template_thresh: f32,
    taxels_thresh: f32,
    combine_radius: f32,
    background_filter_freq: f32,
    lopass: f32,
    max_force: f32,
    max_touches: usize,
    quantize_to_key: bool,
    sample_rate: f32,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            on_threshold: 0.03,
            template_thresh: 0.5,
            taxels_thresh: 0.1,
            combine_radius: 2.0,
            background_filter_freq: 1.0,
            lopass: 10.0,
            max_force: 1.0,
            max_touches: 4,
            quantize_to_key: false,
            sample_rate: 1000.0,
        }
    }
}

impl Parameters {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate <= 0.0 {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }
        if self.max_touches == 0 || self.max_touches > MAX_TOUCHES {
            return Err(ConfigError::InvalidMaxTouches {
                got: self.max_touches,
                max: MAX_TOUCHES,
            });
        }
        Ok(())
    }

    pub fn on_threshold(&self) -> f32 {
        self.on_threshold
    }

    pub fn off_threshold(&self) -> f32 {
        self.on_threshold + ON_THRESHOLD_HYSTERESIS
    }

    pub fn override_threshold(&self) -> f32 {
        self.on_threshold * OVERRIDE_THRESHOLD_SCALE
    }

    pub fn template_thresh(&self) -> f32 {
        self.template_thresh
    }

    pub fn taxels_thresh(&self) -> f32 {
        self.taxels_thresh
    }

    pub fn combine_radius(&self) -> f32 {
        self.combine_radius
    }

    pub fn background_filter_freq(&self) -> f32 {
        self.background_filter_freq
    }

    pub fn lopass(&self) -> f32 {
        self.lopass
    }

    pub fn max_force(&self) -> f32 {
        self.max_force
    }

    pub fn max_touches(&self) -> usize {
        self.max_touches
    }

    pub fn quantize_to_key(&self) -> bool {
        self.quantize_to_key
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn with_on_threshold(mut self, v: f32) -> Self {
        self.on_threshold = v;
        self
    }

    pub fn with_template_thresh(mut self, v: f32) -> Self {
        self.template_thresh = v;
        self
    }

    pub fn with_taxels_thresh(mut self, v: f32) -> Self {
        self.taxels_thresh = v;
        self
    }

    pub fn with_combine_radius(mut self, v: f32) -> Self {
        self.combine_radius = v;
        self
    }

    pub fn with_background_filter_freq(mut self, v: f32) -> Self {
        self.background_filter_freq = v;
        self
    }

    pub fn with_lopass(mut self, v: f32) -> Self {
        self.lopass = v;
        self
    }

    pub fn with_max_force(mut self, v: f32) -> Self {
        self.max_force = v;
        self
    }

    pub fn with_max_touches(mut self, v: usize) -> Self {
        self.max_touches = v.clamp(1, MAX_TOUCHES);
        self
    }

    pub fn with_quantize_to_key(mut self, v: bool) -> Self {
        self.quantize_to_key = v;
        self
    }

    pub fn with_sample_rate(mut self, v: f32) -> Self {
        self.sample_rate = v;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn off_threshold_has_hysteresis_above_on_threshold() {
        let p = Parameters::default().with_on_threshold(0.03);
        assert_relative_eq!(p.off_threshold(), 0.032, epsilon = 1e-6);
    }

    #[test]
    fn override_threshold_is_five_times_on_threshold() {
        let p = Parameters::default().with_on_threshold(0.03);
        assert_relative_eq!(p.override_threshold(), 0.15, epsilon = 1e-6);
    }

    #[test]
    fn validate_rejects_zero_sample_rate() {
        let p = Parameters::default().with_sample_rate(0.0);
        assert!(p.validate().is_err());
    }

    #[test]
    fn validate_rejects_max_touches_out_of_range() {
        let mut p = Parameters::default();
        p.max_touches = 0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn with_max_touches_clamps_to_hard_cap() {
        let p = Parameters::default().with_max_touches(999);
        assert_eq!(p.max_touches(), MAX_TOUCHES);
    }
}
