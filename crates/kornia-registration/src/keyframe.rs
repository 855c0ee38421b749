//! Keyframe, match and observation types consumed by the registrator.

use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};

/// Identity of the camera a keyframe was captured with.
pub type CameraId = u32;

/// Read access to the landmarks and keypoints of a keyframe.
pub trait Keyframe {
    /// Camera the keyframe was captured with.
    fn camera_id(&self) -> CameraId;

    /// Landmark position in the keyframe's local frame.
    fn landmark(&self, idx: usize) -> Option<DVec3>;

    /// Keypoint pixel location.
    fn keypoint(&self, idx: usize) -> Option<DVec2>;
}

/// Association between a landmark of keyframe A and a keypoint of keyframe B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Match {
    /// Landmark index in keyframe A.
    pub landmark: usize,
    /// Keypoint index in keyframe B.
    pub keypoint: usize,
}

impl Match {
    /// Create a new match.
    pub fn new(landmark: usize, keypoint: usize) -> Self {
        Self { landmark, keypoint }
    }
}

/// A verified correspondence ready for refinement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Landmark position in keyframe A.
    pub point: DVec3,
    /// Unit bearing ray of the keypoint in keyframe B.
    pub ray: DVec3,
}

/// Keyframe holding its landmarks and keypoints in memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyFrame {
    /// Camera the keyframe was captured with.
    pub camera_id: CameraId,
    /// Landmark positions in the keyframe's local frame.
    pub landmarks: Vec<DVec3>,
    /// Keypoint pixel locations.
    pub keypoints: Vec<DVec2>,
}

impl KeyFrame {
    /// Create a keyframe from its camera, landmarks and keypoints.
    pub fn new(camera_id: CameraId, landmarks: Vec<DVec3>, keypoints: Vec<DVec2>) -> Self {
        Self {
            camera_id,
            landmarks,
            keypoints,
        }
    }
}

impl Keyframe for KeyFrame {
    fn camera_id(&self) -> CameraId {
        self.camera_id
    }

    fn landmark(&self, idx: usize) -> Option<DVec3> {
        self.landmarks.get(idx).copied()
    }

    fn keypoint(&self, idx: usize) -> Option<DVec2> {
        self.keypoints.get(idx).copied()
    }
}
