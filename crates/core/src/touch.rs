//! The touch data model and the fixed-capacity table of active touches.

use arrayvec::ArrayVec;

/// Hard ceiling on simultaneously tracked touches; `maxTouches` is
/// configurable up to this value but never beyond it.
pub const MAX_TOUCHES: usize = 16;

/// `key = -1` marks an inactive touch slot.
pub const NO_KEY: i32 = -1;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Touch {
    pub key: i32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub zf: f32,
    pub dz: f32,
    pub t_dist: f32,
    pub age: u32,
    pub release_ctr: u32,
    pub release_slope: f32,
}

impl Default for Touch {
    fn default() -> Self {
        Self {
            key: NO_KEY,
            x: 0.0,
            y: 0.0,
            z: 0.0,
            zf: 0.0,
            dz: 0.0,
            t_dist: 0.0,
            age: 0,
            release_ctr: 0,
            release_slope: 0.0,
        }
    }
}

impl Touch {
    pub fn is_active(&self) -> bool {
        self.age > 0
    }
}

pub struct TouchTable {
    slots: ArrayVec<Touch, MAX_TOUCHES>,
    max_touches: usize,
}

impl TouchTable {
    pub fn new(max_touches: usize) -> Self {
        let max_touches = max_touches.clamp(1, MAX_TOUCHES);
        let mut slots = ArrayVec::new();
        for _ in 0..MAX_TOUCHES {
            slots.push(Touch::default());
        }
        Self { slots, max_touches }
    }

    pub fn max_touches(&self) -> usize {
        self.max_touches
    }

    /// Idempotent: shrinking deactivates any touch that falls outside the
    /// new limit so `count(active) <= maxTouches` keeps holding.
    pub fn set_max_touches(&mut self, n: usize) {
        let n = n.clamp(1, MAX_TOUCHES);
        if n < self.max_touches {
            for slot in self.slots.iter_mut().skip(n) {
                *slot = Touch::default();
            }
        }
        self.max_touches = n;
    }

    pub fn len(&self) -> usize {
        self.max_touches
    }

    pub fn get(&self, i: usize) -> &Touch {
        &self.slots[i]
    }

    pub fn get_mut(&mut self, i: usize) -> &mut Touch {
        &mut self.slots[i]
    }

    pub fn count_active(&self) -> usize {
        self.slots[..self.max_touches]
            .iter()
            .filter(|t| t.is_active())
            .count()
    }

    pub fn iter_active(&self) -> impl Iterator<Item = (usize, &Touch)> {
        self.slots[..self.max_touches]
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_active())
    }

    pub fn find_by_key(&self, key: i32) -> Option<usize> {
        self.slots[..self.max_touches]
            .iter()
            .position(|t| t.is_active() && t.key == key)
    }

    /// Place `touch` at the first inactive slot, or evict the active touch
    /// with the lowest `z` if the incoming touch is strictly stronger.
    /// Returns the slot index, or `None` if the table is full and the
    /// incoming touch does not beat the weakest occupant.
    pub fn add(&mut self, mut touch: Touch) -> Option<usize> {
        touch.age = 1;
        touch.release_ctr = 0;

        if let Some(i) = self.slots[..self.max_touches]
            .iter()
            .position(|t| !t.is_active())
        {
            self.slots[i] = touch;
            return Some(i);
        }

        let weakest = self.slots[..self.max_touches]
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.z.partial_cmp(&b.z).unwrap())
            .map(|(i, t)| (i, t.z));

        if let Some((i, weakest_z)) = weakest {
            if touch.z > weakest_z {
                self.slots[i] = touch;
                return Some(i);
            }
        }
        None
    }

    pub fn remove_at(&mut self, i: usize) {
        self.slots[i].age = 0;
        self.slots[i].key = NO_KEY;
    }

    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = Touch::default();
        }
    }
}
