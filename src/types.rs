use std::time::Instant;

use glam::Vec3;
use serde::Deserialize;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

/// Coordinate space shared by every point of a [`LandmarkSet`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LandmarkSpace {
    /// x, y in pixels of the source frame, z scaled by the frame width.
    Pixel,
    /// x, y, z roughly in [0, 1].
    Normalized,
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
    #[serde(default)]
    pub visibility: Option<f32>,
}

impl Landmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            visibility: None,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    pub fn distance_2d(&self, other: &Landmark) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn midpoint(&self, other: &Landmark) -> Landmark {
        Landmark::new(
            (self.x + other.x) / 2.0,
            (self.y + other.y) / 2.0,
            (self.z + other.z) / 2.0,
        )
    }
}

/// Index-addressable landmarks of one detected subject.
///
/// Slots keep the detector's numbering; a slot is `None` when the detector
/// did not report that point.
#[derive(Clone, Debug, PartialEq)]
pub struct LandmarkSet {
    space: LandmarkSpace,
    points: Vec<Option<Landmark>>,
}

impl LandmarkSet {
    pub fn new(space: LandmarkSpace, points: Vec<Option<Landmark>>) -> Self {
        Self { space, points }
    }

    pub fn from_points(space: LandmarkSpace, points: Vec<Landmark>) -> Self {
        Self {
            space,
            points: points.into_iter().map(Some).collect(),
        }
    }

    pub fn space(&self) -> LandmarkSpace {
        self.space
    }

    /// Number of slots, present or not.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Landmark> {
        self.points.get(index).copied().flatten()
    }

    pub fn is_complete(&self) -> bool {
        self.points.iter().all(Option::is_some)
    }

    /// Average of the given indices, `None` if any of them is missing.
    pub fn centroid(&self, indices: &[usize]) -> Option<Landmark> {
        if indices.is_empty() {
            return None;
        }
        let mut sum = Vec3::ZERO;
        for &idx in indices {
            sum += self.get(idx)?.to_vec3();
        }
        let avg = sum / indices.len() as f32;
        Some(Landmark::new(avg.x, avg.y, avg.z))
    }

    pub fn points(&self) -> &[Option<Landmark>] {
        &self.points
    }

    pub(crate) fn slots_mut(&mut self) -> impl Iterator<Item = &mut Option<Landmark>> {
        self.points.iter_mut()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rotation {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

impl Rotation {
    pub const IDENTITY: Rotation = Rotation {
        pitch: 0.0,
        yaw: 0.0,
        roll: 0.0,
    };

    pub const fn new(pitch: f32, yaw: f32, roll: f32) -> Self {
        Self { pitch, yaw, roll }
    }

    pub fn is_finite(&self) -> bool {
        self.pitch.is_finite() && self.yaw.is_finite() && self.roll.is_finite()
    }
}

/// Where an accessory goes this frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Placement {
    /// One entry per accessory instance (two for paired earrings).
    pub positions: Vec<Vec3>,
    pub rotation: Rotation,
    pub scale: f32,
    pub visible: bool,
}

impl Placement {
    pub fn single(position: Vec3, rotation: Rotation, scale: f32) -> Self {
        Self {
            positions: vec![position],
            rotation,
            scale,
            visible: true,
        }
    }

    pub fn hidden() -> Self {
        Self {
            positions: Vec::new(),
            rotation: Rotation::IDENTITY,
            scale: 1.0,
            visible: false,
        }
    }

    pub fn position(&self) -> Option<Vec3> {
        self.positions.first().copied()
    }

    pub fn is_finite(&self) -> bool {
        self.scale.is_finite()
            && self.rotation.is_finite()
            && self.positions.iter().all(|p| p.is_finite())
    }
}
