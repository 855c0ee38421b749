use std::ops::Mul;

use glam::{DMat3, DQuat, DVec3};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Rotation in 3D space stored as a unit quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SO3 {
    /// The unit quaternion representing the rotation.
    pub q: DQuat,
}

impl SO3 {
    /// The identity rotation.
    pub const IDENTITY: Self = Self { q: DQuat::IDENTITY };

    /// Create a rotation from a quaternion. The quaternion is normalized.
    pub fn from_quaternion(quat: &DQuat) -> Self {
        Self {
            q: quat.normalize(),
        }
    }

    /// Create a rotation from a 3x3 rotation matrix.
    ///
    /// PRECONDITION: `mat` is orthonormal with determinant +1.
    pub fn from_matrix(mat: &DMat3) -> Self {
        Self {
            q: DQuat::from_mat3(mat).normalize(),
        }
    }

    /// Draw a rotation uniformly from SO(3).
    ///
    /// Uses the subgroup algorithm of Shoemake with the provided random source.
    pub fn from_random<R: Rng>(rng: &mut R) -> Self {
        let r1: f64 = rng.random();
        let r2: f64 = rng.random();
        let r3: f64 = rng.random();

        let two_pi = 2.0 * std::f64::consts::PI;
        let w = (1.0 - r1).sqrt() * (two_pi * r2).sin();
        let x = (1.0 - r1).sqrt() * (two_pi * r2).cos();
        let y = r1.sqrt() * (two_pi * r3).sin();
        let z = r1.sqrt() * (two_pi * r3).cos();

        Self {
            q: DQuat::from_xyzw(x, y, z, w).normalize(),
        }
    }

    /// The rotation as a 3x3 matrix.
    pub fn matrix(&self) -> DMat3 {
        DMat3::from_quat(self.q)
    }

    /// The inverse rotation.
    pub fn inverse(&self) -> Self {
        Self {
            q: self.q.conjugate(),
        }
    }

    /// Lie algebra -> Lie group
    ///
    /// `v` is the axis-angle (Rodrigues) vector.
    pub fn exp(v: DVec3) -> Self {
        let theta = v.length();
        let theta_half = 0.5 * theta;

        // small angle: sin(theta/2)/theta ~ 1/2 - theta^2/48
        let (w, b) = if theta > 1e-10 {
            (theta_half.cos(), theta_half.sin() / theta)
        } else {
            (1.0, 0.5 - theta * theta / 48.0)
        };
        let xyz = v * b;

        Self {
            q: DQuat::from_xyzw(xyz.x, xyz.y, xyz.z, w).normalize(),
        }
    }

    /// Lie group -> Lie algebra
    ///
    /// Returns the axis-angle vector with angle in `[0, pi]`.
    pub fn log(&self) -> DVec3 {
        // q and -q encode the same rotation; pick the one with w >= 0
        let q = if self.q.w < 0.0 { -self.q } else { self.q };
        let vec = DVec3::new(q.x, q.y, q.z);
        let sin_half = vec.length();

        if sin_half < 1e-10 {
            return vec * 2.0 / q.w;
        }
        let theta = 2.0 * sin_half.atan2(q.w);
        vec * (theta / sin_half)
    }

    /// Rotate a point.
    pub fn transform_point(&self, point: DVec3) -> DVec3 {
        self.q * point
    }

    /// Geodesic angle in radians between two rotations.
    pub fn angle_to(&self, other: &SO3) -> f64 {
        (self.inverse() * *other).log().length()
    }
}

impl Default for SO3 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for SO3 {
    type Output = SO3;

    fn mul(self, rhs: Self) -> Self::Output {
        Self {
            q: (self.q * rhs.q).normalize(),
        }
    }
}

impl Mul<DVec3> for SO3 {
    type Output = DVec3;

    fn mul(self, rhs: DVec3) -> Self::Output {
        self.transform_point(rhs)
    }
}
