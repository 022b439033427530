//! Per-key one-pole accumulators that turn residual peak evidence into
//! touch births.

use crate::geometry::{KeyGeometry, NUM_KEYS};

#[derive(Clone, Copy, Debug)]
pub struct KeyState {
    pub key_center: (f32, f32),
    pub z_in: f32,
    pub dz_in: f32,
    pub dt_in: f32,
    pub pos_in: (f32, f32),
    pub z_out: f32,
    pub dz_out: f32,
    pub dt_out: f32,
    pub pos_out: (f32, f32),
    pub m_k: f32,
    pub age: u32,
}

impl KeyState {
    fn new(key_center: (f32, f32)) -> Self {
        Self {
            key_center,
            z_in: 0.0,
            dz_in: 0.0,
            dt_in: 1.0,
            pos_in: key_center,
            z_out: 0.0,
            dz_out: 0.0,
            dt_out: 1.0,
            pos_out: key_center,
            m_k: 0.0,
            age: 0,
        }
    }

    /// Advance the key's one-pole filters by one frame, then reset the
    /// `*In` fields to their neutral defaults.
    pub fn tick(&mut self) {
        self.dz_in = self.z_in - self.z_out;
        self.z_out += self.m_k * self.dz_in;
        self.dt_out += self.m_k * (self.dt_in - self.dt_out);
        self.pos_out.0 += self.m_k * (self.pos_in.0 - self.pos_out.0);
        self.pos_out.1 += self.m_k * (self.pos_in.1 - self.pos_out.1);
        self.dz_out += self.m_k * (self.dz_in - self.dz_out);
        self.age += 1;

        self.z_in = 0.0;
        self.dz_in = 0.0;
        self.dt_in = 1.0;
        self.pos_in = self.key_center;
    }
}

/// Maps a raw peak pressure to the one-pole coefficient used for that
/// frame's evidence, linearly over `[onThreshold, 0.5*maxForce]`.
pub fn peak_to_coefficient(z: f32, on_threshold: f32, max_force: f32) -> f32 {
    let lo = on_threshold;
    let hi = 0.5 * max_force;
    let t = if hi > lo { (z - lo) / (hi - lo) } else { 1.0 };
    (0.001 + t * (1.0 - 0.001)).clamp(0.001, 1.0)
}

pub struct KeyStateArray {
    states: Vec<KeyState>,
}

impl KeyStateArray {
    pub fn new(geometry: &KeyGeometry) -> Self {
        let states = (0..NUM_KEYS)
            .map(|i| KeyState::new(geometry.key_center(i)))
            .collect();
        Self { states }
    }

    pub fn get(&self, i: usize) -> &KeyState {
        &self.states[i]
    }

    pub fn get_mut(&mut self, i: usize) -> &mut KeyState {
        &mut self.states[i]
    }

    pub fn tick_all(&mut self) {
        for s in &mut self.states {
            s.tick();
        }
    }

    pub fn reset_age(&mut self, i: usize) {
        self.states[i].age = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &KeyState)> {
        self.states.iter().enumerate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn tick_resets_inputs_to_neutral() {
        let geo = KeyGeometry::default();
        let mut arr = KeyStateArray::new(&geo);
        {
            let s = arr.get_mut(0);
            s.z_in = 0.5;
            s.dt_in = 0.2;
            s.m_k = 0.5;
        }
        arr.tick_all();
        let s = arr.get(0);
        assert_relative_eq!(s.z_in, 0.0);
        assert_relative_eq!(s.dt_in, 1.0);
        assert_eq!(s.pos_in, s.key_center);
    }

    #[test]
    fn no_evidence_decays_toward_neutral() {
        let geo = KeyGeometry::default();
        let mut arr = KeyStateArray::new(&geo);
        {
            let s = arr.get_mut(0);
            s.z_out = 0.5;
            s.dt_out = 0.1;
            s.m_k = 0.5;
        }
        for _ in 0..50 {
            arr.tick_all();
        }
        let s = arr.get(0);
        assert!(s.z_out < 0.01);
        assert!(s.dt_out > 0.9);
    }

    #[test]
    fn peak_to_coefficient_is_clamped() {
        assert_relative_eq!(peak_to_coefficient(0.0, 0.03, 1.0), 0.001);
        assert_relative_eq!(peak_to_coefficient(100.0, 0.03, 1.0), 1.0);
    }

    #[test]
    fn age_increments_every_tick() {
        let geo = KeyGeometry::default();
        let mut arr = KeyStateArray::new(&geo);
        for _ in 0..11 {
            arr.tick_all();
        }
        assert_eq!(arr.get(0).age, 11);
        arr.reset_age(0);
        assert_eq!(arr.get(0).age, 0);
    }
}
