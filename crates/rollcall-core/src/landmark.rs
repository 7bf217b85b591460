//! Face mesh landmarks as produced by the upstream detector.

use serde::{Deserialize, Serialize};

/// Landmark count of the MediaPipe face mesh without iris refinement.
pub const FACE_MESH_LANDMARKS: usize = 468;

/// Landmark count of the MediaPipe face mesh with iris refinement enabled.
pub const FACE_MESH_REFINED_LANDMARKS: usize = 478;

/// A single tracked 3D point on the face mesh.
///
/// `x` and `y` are normalized to the image (typically [0, 1]); `z` is a small
/// relative depth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 3]", into = "[f32; 3]")]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another landmark.
    pub fn distance(&self, other: &Landmark) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl From<[f32; 3]> for Landmark {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self { x, y, z }
    }
}

impl From<Landmark> for [f32; 3] {
    fn from(lm: Landmark) -> Self {
        [lm.x, lm.y, lm.z]
    }
}

/// Ordered landmarks for one face. Index positions identify anatomical points,
/// so the order must be exactly the detector's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkSet {
    points: Vec<Landmark>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Landmark>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }

    pub fn get(&self, index: usize) -> Option<&Landmark> {
        self.points.get(index)
    }
}

impl From<Vec<Landmark>> for LandmarkSet {
    fn from(points: Vec<Landmark>) -> Self {
        Self::new(points)
    }
}

impl FromIterator<Landmark> for LandmarkSet {
    fn from_iter<I: IntoIterator<Item = Landmark>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
