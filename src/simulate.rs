//! Deterministic stand-in motion used when no detector is available.

use std::f32::consts::TAU;

use glam::Vec3;

use crate::assets::default_placement;
use crate::catalog::AccessoryCategory;
use crate::types::Placement;

/// Nominal tick rate the oscillation is expressed in.
const TICKS_PER_SECOND: f32 = 60.0;

#[derive(Clone, Copy, Debug)]
pub struct SimulatedMotion {
    /// Horizontal sway amplitude in world units.
    pub sway: f32,
    /// Vertical bob amplitude in world units.
    pub bob: f32,
    /// Head turn amplitude in radians.
    pub turn: f32,
    /// Seconds per full sway cycle.
    pub period: f32,
}

impl Default for SimulatedMotion {
    fn default() -> Self {
        Self {
            sway: 0.04,
            bob: 0.015,
            turn: 0.35,
            period: 4.0,
        }
    }
}

impl SimulatedMotion {
    /// Placement of `category` at tick `tick`; the same tick always yields the same placement.
    pub fn placement(&self, category: AccessoryCategory, tick: u64) -> Placement {
        let t = tick as f32 / TICKS_PER_SECOND;
        let phase = TAU * t / self.period.max(f32::EPSILON);

        let offset = Vec3::new(self.sway * phase.sin(), self.bob * (2.0 * phase).sin(), 0.0);
        let mut placement = default_placement(category);
        for position in &mut placement.positions {
            *position += offset;
        }
        placement.rotation.yaw = self.turn * phase.sin();
        placement.rotation.roll = 0.25 * self.turn * (phase * 0.5).sin();
        placement
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn motion_is_deterministic() {
        let motion = SimulatedMotion::default();
        for category in AccessoryCategory::ALL {
            assert_eq!(motion.placement(category, 37), motion.placement(category, 37));
        }
    }

    #[test]
    fn motion_repeats_every_period() {
        let motion = SimulatedMotion::default();
        let a = motion.placement(AccessoryCategory::Glasses, 10);
        // two sway periods cover the half-rate roll term as well
        let b = motion.placement(AccessoryCategory::Glasses, 10 + 2 * 4 * 60);
        assert_relative_eq!(a.rotation.yaw, b.rotation.yaw, epsilon = 1e-3);
        assert_relative_eq!(a.positions[0].x, b.positions[0].x, epsilon = 1e-3);
    }

    #[test]
    fn motion_stays_near_the_rest_pose() {
        let motion = SimulatedMotion::default();
        let rest = default_placement(AccessoryCategory::Necklace);
        for tick in 0..600 {
            let placement = motion.placement(AccessoryCategory::Necklace, tick);
            assert!(placement.visible);
            assert!(placement.is_finite());
            let drift = placement.positions[0] - rest.positions[0];
            assert!(drift.length() <= motion.sway + motion.bob + 1e-5);
        }
    }
}
