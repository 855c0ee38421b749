//! Camera models and distortion handling for PnP solvers.
use glam::{DMat3, DVec2, DVec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    /// Invalid camera intrinsics matrix
    #[error("Invalid camera intrinsics: {0}")]
    InvalidIntrinsics(String),
}

/// Result type for camera operations.
pub type CameraResult<T> = Result<T, CameraError>;

const UNDISTORT_MAX_ITERATIONS: usize = 20;
const UNDISTORT_EPSILON: f64 = 1e-12;

/// Represents the intrinsic parameters of a pinhole camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Focal length in x direction
    pub fx: f64,
    /// Focal length in y direction
    pub fy: f64,
    /// Principal point x coordinate
    pub cx: f64,
    /// Principal point y coordinate
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Create camera intrinsics from focal lengths and principal point.
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Create camera intrinsics from a 3x3 intrinsics matrix.
    ///
    /// The matrix must have the form `[[fx, 0, cx], [0, fy, cy], [0, 0, 1]]` with
    /// positive focal lengths.
    pub fn from_matrix(k: &DMat3) -> CameraResult<Self> {
        // glam is column-major: k.col(c)[r] == K[r][c]
        let (c0, c1, c2) = (k.x_axis, k.y_axis, k.z_axis);
        if c0.y != 0.0 || c0.z != 0.0 || c1.x != 0.0 || c1.z != 0.0 || c2.z != 1.0 {
            return Err(CameraError::InvalidIntrinsics(
                "matrix must have form [[fx, 0, cx], [0, fy, cy], [0, 0, 1]]".to_string(),
            ));
        }
        if c0.x <= 0.0 || c1.y <= 0.0 {
            return Err(CameraError::InvalidIntrinsics(format!(
                "focal lengths must be positive, got fx={} fy={}",
                c0.x, c1.y
            )));
        }

        Ok(Self {
            fx: c0.x,
            fy: c1.y,
            cx: c2.x,
            cy: c2.y,
        })
    }

    /// Convert to 3x3 intrinsics matrix.
    pub fn to_matrix(&self) -> DMat3 {
        DMat3::from_cols(
            DVec3::new(self.fx, 0.0, 0.0),
            DVec3::new(0.0, self.fy, 0.0),
            DVec3::new(self.cx, self.cy, 1.0),
        )
    }

    /// Pixel to normalized image plane coordinates.
    #[inline]
    pub fn normalize(&self, pixel: DVec2) -> DVec2 {
        DVec2::new((pixel.x - self.cx) / self.fx, (pixel.y - self.cy) / self.fy)
    }

    /// Normalized image plane coordinates to pixel.
    #[inline]
    pub fn denormalize(&self, point: DVec2) -> DVec2 {
        DVec2::new(self.fx * point.x + self.cx, self.fy * point.y + self.cy)
    }
}

/// Polynomial distortion parameters of the Brown-Conrady model (OpenCV convention).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct PolynomialDistortion {
    /// Radial distortion coefficients
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
    pub k4: f64,
    pub k5: f64,
    pub k6: f64,
    /// Tangential distortion coefficients
    pub p1: f64,
    pub p2: f64,
}

impl PolynomialDistortion {
    /// Create distortion parameters with all coefficients set to zero (no distortion).
    pub fn none() -> Self {
        Self::default()
    }

    /// Create distortion parameters with only first two radial coefficients.
    pub fn radial(k1: f64, k2: f64) -> Self {
        Self {
            k1,
            k2,
            ..Self::default()
        }
    }

    /// Create distortion parameters with radial and tangential coefficients.
    pub fn radial_tangential(k1: f64, k2: f64, p1: f64, p2: f64) -> Self {
        Self {
            k1,
            k2,
            p1,
            p2,
            ..Self::default()
        }
    }

    /// Check if there is any distortion.
    pub fn has_distortion(&self) -> bool {
        self.coefficients().iter().any(|&c| c != 0.0)
    }

    /// Coefficients in OpenCV order `[k1, k2, p1, p2, k3, k4, k5, k6]`.
    pub fn coefficients(&self) -> [f64; 8] {
        [
            self.k1, self.k2, self.p1, self.p2, self.k3, self.k4, self.k5, self.k6,
        ]
    }

    /// Radial factor and tangential offset at a normalized point.
    #[inline]
    fn terms(&self, p: DVec2) -> (f64, f64, DVec2) {
        let r2 = p.length_squared();
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let num = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        let den = 1.0 + self.k4 * r2 + self.k5 * r4 + self.k6 * r6;
        let xy2 = 2.0 * p.x * p.y;
        let tangential = DVec2::new(
            self.p1 * xy2 + self.p2 * (r2 + 2.0 * p.x * p.x),
            self.p1 * (r2 + 2.0 * p.y * p.y) + self.p2 * xy2,
        );
        (num, den, tangential)
    }

    /// Distort a point on the normalized image plane.
    pub fn distort(&self, p: DVec2) -> DVec2 {
        let (num, den, tangential) = self.terms(p);
        p * (num / den) + tangential
    }

    /// Undistort a point on the normalized image plane by fixed-point iteration.
    pub fn undistort(&self, distorted: DVec2) -> DVec2 {
        let mut p = distorted;
        for _ in 0..UNDISTORT_MAX_ITERATIONS {
            let (num, den, tangential) = self.terms(p);
            let next = (distorted - tangential) * (den / num);
            let step = (next - p).abs().max_element();
            p = next;
            if step < UNDISTORT_EPSILON {
                break;
            }
        }
        p
    }
}

/// A complete camera model with intrinsics and optional distortion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    /// Camera intrinsics
    pub intrinsics: CameraIntrinsics,
    /// Distortion parameters (None for no distortion)
    pub distortion: Option<PolynomialDistortion>,
}

impl CameraModel {
    /// Create a camera model without distortion.
    pub fn pinhole(intrinsics: CameraIntrinsics) -> Self {
        Self {
            intrinsics,
            distortion: None,
        }
    }

    /// Create a camera model with distortion.
    pub fn with_distortion(intrinsics: CameraIntrinsics, distortion: PolynomialDistortion) -> Self {
        Self {
            intrinsics,
            distortion: Some(distortion),
        }
    }

    /// Check if the camera has distortion.
    pub fn has_distortion(&self) -> bool {
        self.distortion.as_ref().is_some_and(|d| d.has_distortion())
    }

    /// The intrinsics matrix `K`.
    pub fn k(&self) -> DMat3 {
        self.intrinsics.to_matrix()
    }

    /// The distortion coefficients `D` in OpenCV order, zeros when undistorted.
    pub fn d(&self) -> [f64; 8] {
        self.distortion
            .map(|d| d.coefficients())
            .unwrap_or([0.0; 8])
    }

    /// Project a point in the camera frame to pixel coordinates.
    ///
    /// No cheirality check is performed: points behind the camera are projected
    /// through the center as well, and points on the `z = 0` plane yield
    /// non-finite pixels.
    pub fn project(&self, point: DVec3) -> DVec2 {
        let inv_z = 1.0 / point.z;
        let normalized = DVec2::new(point.x * inv_z, point.y * inv_z);
        let distorted = match &self.distortion {
            Some(d) => d.distort(normalized),
            None => normalized,
        };
        self.intrinsics.denormalize(distorted)
    }

    /// Unproject a pixel to a unit-length bearing ray in the camera frame.
    pub fn unproject(&self, pixel: DVec2) -> DVec3 {
        let p = self.undistort_normalized(pixel);
        DVec3::new(p.x, p.y, 1.0).normalize()
    }

    /// Remove the lens distortion from a pixel, returning the ideal pinhole pixel.
    pub fn undistort_pixel(&self, pixel: DVec2) -> DVec2 {
        if !self.has_distortion() {
            return pixel;
        }
        self.intrinsics
            .denormalize(self.undistort_normalized(pixel))
    }

    /// Undistort multiple pixels.
    pub fn undistort_pixels(&self, pixels: &[DVec2]) -> Vec<DVec2> {
        pixels.iter().map(|&p| self.undistort_pixel(p)).collect()
    }

    fn undistort_normalized(&self, pixel: DVec2) -> DVec2 {
        let normalized = self.intrinsics.normalize(pixel);
        match &self.distortion {
            Some(d) if d.has_distortion() => d.undistort(normalized),
            _ => normalized,
        }
    }
}

impl Default for CameraModel {
    fn default() -> Self {
        Self::pinhole(CameraIntrinsics::new(1000.0, 1000.0, 640.0, 480.0))
    }
}
