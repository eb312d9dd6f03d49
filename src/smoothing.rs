//! Temporal smoothing of accessory placements.
//!
//! Detector output jitters from frame to frame. Each live accessory keeps the
//! placement it was last drawn with, and every new candidate only closes a
//! fraction of the gap toward the detection.

use std::collections::HashMap;
use std::f32::consts::{PI, TAU};

use serde::{Deserialize, Serialize};

use crate::types::{Placement, Rotation};

/// Fraction of the remaining distance closed per frame; 1.0 disables smoothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingFactors {
    pub position: f32,
    pub scale: f32,
    pub rotation: f32,
}

impl Default for SmoothingFactors {
    fn default() -> Self {
        Self {
            position: 0.3,
            scale: 0.3,
            rotation: 0.4,
        }
    }
}

pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Wrap an angle into (-PI, PI].
pub fn wrap_angle(angle: f32) -> f32 {
    let mut wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped += TAU;
    }
    wrapped
}

/// Interpolate from `a` toward `b` along the shorter arc.
pub fn smooth_angle(a: f32, b: f32, t: f32) -> f32 {
    let diff = wrap_angle(b - a);
    wrap_angle(a + diff * t)
}

fn smooth_rotation(prev: Rotation, next: Rotation, t: f32) -> Rotation {
    Rotation {
        pitch: smooth_angle(prev.pitch, next.pitch, t),
        yaw: smooth_angle(prev.yaw, next.yaw, t),
        roll: smooth_angle(prev.roll, next.roll, t),
    }
}

/// Blend `next` toward `previous`.
///
/// Without a previous placement, or when the instance count changed, `next`
/// is returned as is.
pub fn smooth(previous: Option<&Placement>, next: &Placement, factors: &SmoothingFactors) -> Placement {
    let Some(prev) = previous else {
        return next.clone();
    };
    if !prev.visible || !next.visible || prev.positions.len() != next.positions.len() {
        return next.clone();
    }

    let positions = prev
        .positions
        .iter()
        .zip(&next.positions)
        .map(|(p, n)| *p + (*n - *p) * factors.position)
        .collect();

    Placement {
        positions,
        rotation: smooth_rotation(prev.rotation, next.rotation, factors.rotation),
        scale: lerp(prev.scale, next.scale, factors.scale),
        visible: true,
    }
}

#[derive(Debug, Clone)]
struct TrackedPlacement {
    placement: Placement,
    lost_frames: u32,
}

/// Last applied placement per live accessory, keyed by accessory id.
#[derive(Debug, Clone)]
pub struct SmoothingState {
    factors: SmoothingFactors,
    max_lost_frames: u32,
    entries: HashMap<String, TrackedPlacement>,
}

impl SmoothingState {
    pub fn new(factors: SmoothingFactors, max_lost_frames: u32) -> Self {
        Self {
            factors,
            max_lost_frames,
            entries: HashMap::new(),
        }
    }

    pub fn factors(&self) -> &SmoothingFactors {
        &self.factors
    }

    /// Smooth a visible candidate for `key` and remember the result.
    pub fn apply(&mut self, key: &str, candidate: &Placement) -> Placement {
        let previous = self.entries.get(key).map(|entry| &entry.placement);
        let smoothed = smooth(previous, candidate, &self.factors);
        self.entries.insert(
            key.to_string(),
            TrackedPlacement {
                placement: smoothed.clone(),
                lost_frames: 0,
            },
        );
        smoothed
    }

    /// Count a non-visible frame; returns true once the entry has been dropped.
    pub fn observe_lost(&mut self, key: &str) -> bool {
        let Some(entry) = self.entries.get_mut(key) else {
            return true;
        };
        entry.lost_frames += 1;
        if entry.lost_frames > self.max_lost_frames {
            log::debug!("tracking lost for {key} after {} frames, resetting smoothing", entry.lost_frames);
            self.entries.remove(key);
            true
        } else {
            false
        }
    }

    pub fn last(&self, key: &str) -> Option<&Placement> {
        self.entries.get(key).map(|entry| &entry.placement)
    }

    pub fn clear(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn clear_all(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
