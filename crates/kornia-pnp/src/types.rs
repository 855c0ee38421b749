//! Common data types shared across Perspective-n-Point (PnP) solvers.

use crate::camera::{CameraError, CameraModel};
use glam::{DVec2, DVec3};
use kornia_lie::SE3;
use thiserror::Error;

/// Error types for PnP solvers.
#[derive(Debug, Error)]
pub enum PnPError {
    /// Invalid input data - insufficient correspondences for the specific solver
    #[error("PnP solver requires at least {required} 2D-3D correspondences, got {actual}")]
    InsufficientCorrespondences {
        /// Minimum number of correspondences required by the solver
        required: usize,
        /// Actual number of correspondences provided
        actual: usize,
    },

    /// Invalid input data - mismatched array lengths with descriptive labels.
    #[error("Mismatched array lengths: {left_name} ({left_len}) != {right_name} ({right_len})")]
    MismatchedArrayLengths {
        /// Label for the left-hand slice
        left_name: &'static str,
        /// Length of the left-hand slice
        left_len: usize,
        /// Label for the right-hand slice
        right_name: &'static str,
        /// Length of the right-hand slice
        right_len: usize,
    },

    /// Singular value decomposition failed
    #[error("SVD computation failed: {0}")]
    SvdFailed(String),

    /// The correspondences do not constrain a unique finite pose.
    #[error("Degenerate configuration: {0}")]
    Degenerate(String),

    /// Camera model error
    #[error(transparent)]
    Camera(#[from] CameraError),
}

/// Numeric tolerances used by linear algebra routines throughout the PnP pipeline.
#[derive(Debug, Clone)]
pub struct NumericTol {
    /// Tolerance for singular-value decomposition.
    pub svd: f64,
    /// Epsilon threshold for determinant / singular-value checks when deciding whether to fall back to a pseudo-inverse.
    pub eps: f64,
}

impl Default for NumericTol {
    fn default() -> Self {
        Self {
            svd: 1e-12,
            eps: 1e-12,
        }
    }
}

/// Result returned by any PnP solver.
///
/// The pose maps coordinates from the **world** frame to the **camera** frame.
#[derive(Debug, Clone)]
pub struct PnPResult {
    /// Estimated camera-from-world transformation.
    pub pose: SE3,
    /// Root-mean-square reprojection error in pixels.
    pub reproj_rmse: f64,
}

/// Trait for PnP solvers.
pub trait PnPSolver {
    /// Solver-specific parameters.
    type Param;

    /// Solve for camera pose given 2D-3D correspondences.
    ///
    /// # Arguments
    /// * `world` – 3-D coordinates in the world frame.
    /// * `image` – Corresponding pixel coordinates, possibly distorted.
    /// * `camera` – Camera model with intrinsics and optional distortion.
    /// * `params` – Solver-specific parameters.
    fn solve(
        world: &[DVec3],
        image: &[DVec2],
        camera: &CameraModel,
        params: &Self::Param,
    ) -> Result<PnPResult, PnPError>;
}

/// Check that the world and image slices pair up.
pub(crate) fn check_lengths(world: &[DVec3], image: &[DVec2]) -> Result<(), PnPError> {
    if world.len() != image.len() {
        return Err(PnPError::MismatchedArrayLengths {
            left_name: "world points",
            left_len: world.len(),
            right_name: "image points",
            right_len: image.len(),
        });
    }
    Ok(())
}
