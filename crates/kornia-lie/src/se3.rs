use std::ops::Mul;

use glam::{DMat3, DMat4, DVec3};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::so3::SO3;

/// Rigid body transformation in 3D space.
///
/// A transform `b_from_a` maps a point expressed in frame `a` into frame `b`:
/// `p_b = R * p_a + t`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SE3 {
    /// Rotation part.
    pub rotation: SO3,
    /// Translation part.
    pub translation: DVec3,
}

impl SE3 {
    /// The identity transformation.
    pub const IDENTITY: Self = Self {
        rotation: SO3::IDENTITY,
        translation: DVec3::ZERO,
    };

    /// Create a transformation from its rotation and translation.
    pub fn new(rotation: SO3, translation: DVec3) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Create a transformation from a rotation matrix and a translation vector.
    pub fn from_rt(rotation: &DMat3, translation: DVec3) -> Self {
        Self::new(SO3::from_matrix(rotation), translation)
    }

    /// Create a transformation from a Rodrigues vector and a translation vector.
    pub fn from_rvec_tvec(rvec: DVec3, tvec: DVec3) -> Self {
        Self::new(SO3::exp(rvec), tvec)
    }

    /// Draw a random transformation with uniform rotation and translation in
    /// `[-max_translation, max_translation]` per axis.
    pub fn from_random<R: Rng>(rng: &mut R, max_translation: f64) -> Self {
        let rotation = SO3::from_random(rng);
        let mut axis = || rng.random_range(-1.0..=1.0) * max_translation;
        let translation = DVec3::new(axis(), axis(), axis());
        Self::new(rotation, translation)
    }

    /// The inverse transformation.
    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        let translation = -(rotation * self.translation);
        Self {
            rotation,
            translation,
        }
    }

    /// Compose two transformations, `self * other`.
    pub fn compose(&self, other: &SE3) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.translation + self.rotation * other.translation,
        }
    }

    /// Apply the transformation to a point.
    pub fn transform_point(&self, point: DVec3) -> DVec3 {
        self.rotation * point + self.translation
    }

    /// Rotation as a 3x3 matrix.
    pub fn rotation_matrix(&self) -> DMat3 {
        self.rotation.matrix()
    }

    /// The transformation as a 4x4 homogeneous matrix.
    pub fn matrix(&self) -> DMat4 {
        DMat4::from_rotation_translation(self.rotation.q, self.translation)
    }

    /// Whether all the components are finite.
    pub fn is_finite(&self) -> bool {
        self.rotation.q.is_finite() && self.translation.is_finite()
    }
}

impl Default for SE3 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for SE3 {
    type Output = SE3;

    fn mul(self, rhs: Self) -> Self::Output {
        self.compose(&rhs)
    }
}

impl Mul<DVec3> for SE3 {
    type Output = DVec3;

    fn mul(self, rhs: DVec3) -> Self::Output {
        self.transform_point(rhs)
    }
}
