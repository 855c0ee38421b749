#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Kornia PnP (Perspective-n-Point)
//!
//! Camera pose estimation from 2D-3D point correspondences.
//!
//! ## Key Features
//!
//! - **EPnP Algorithm**: Efficient Perspective-n-Point solver for camera pose estimation
//! - **RANSAC Support**: Robust estimation with outlier rejection
//! - **Distortion Handling**: Pixels are undistorted through the camera model before solving
//!
//! ## Example: Basic EPnP
//!
//! ```rust
//! use glam::{DVec2, DVec3};
//! use kornia_pnp::{solve_pnp, CameraIntrinsics, CameraModel, PnPMethod};
//!
//! let camera = CameraModel::pinhole(CameraIntrinsics::new(800.0, 800.0, 320.0, 240.0));
//!
//! // 3D points in front of the camera
//! let world_points = vec![
//!     DVec3::new(-0.5, -0.5, 4.0),
//!     DVec3::new(0.5, -0.4, 5.0),
//!     DVec3::new(0.4, 0.6, 4.5),
//!     DVec3::new(-0.3, 0.5, 6.0),
//!     DVec3::new(0.1, 0.0, 5.5),
//! ];
//!
//! // Observed with an identity pose
//! let image_points: Vec<DVec2> = world_points.iter().map(|&p| camera.project(p)).collect();
//!
//! let result = solve_pnp(&world_points, &image_points, &camera, PnPMethod::EPnPDefault)?;
//! assert!(result.pose.translation.length() < 1e-6);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Example: Robust PnP with RANSAC
//!
//! ```rust
//! use glam::{DVec2, DVec3};
//! use kornia_pnp::{solve_pnp_ransac, CameraModel, PnPMethod, RansacParams};
//!
//! let camera = CameraModel::default();
//! let world_points: Vec<DVec3> = (0..20)
//!     .map(|i| DVec3::new((i % 5) as f64 * 0.2 - 0.4, (i / 5) as f64 * 0.2 - 0.3, 4.0 + (i % 3) as f64))
//!     .collect();
//! let image_points: Vec<DVec2> = world_points.iter().map(|&p| camera.project(p)).collect();
//!
//! let params = RansacParams {
//!     reproj_threshold_px: 2.0,
//!     random_seed: Some(0),
//!     ..Default::default()
//! };
//!
//! let result = solve_pnp_ransac(&world_points, &image_points, &camera, PnPMethod::EPnPDefault, &params)?;
//! println!("Inliers: {}/{}", result.inliers.len(), world_points.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Pinhole camera model with optional polynomial lens distortion.
pub mod camera;

/// Efficient Perspective-n-Point (EPnP) solver implementation.
///
/// A fast and accurate method for computing camera pose from 2D-3D correspondences.
pub mod epnp;

/// RANSAC-based robust PnP pose estimation.
///
/// Handles outliers in point correspondences through random sampling consensus.
pub mod ransac;

/// Common data types and traits for PnP solvers.
pub mod types;

mod ops;

pub use camera::{CameraError, CameraIntrinsics, CameraModel, PolynomialDistortion};
pub use epnp::{EPnP, EPnPParams};
pub use ransac::{solve_pnp_ransac, PnPRansacResult, RansacParams};
pub use types::{NumericTol, PnPError, PnPResult, PnPSolver};

/// Enumeration of the Perspective-n-Point algorithms available in this crate.
#[derive(Debug, Clone)]
pub enum PnPMethod {
    /// Efficient PnP solver with a user-supplied parameter object.
    EPnP(EPnPParams),
    /// Efficient PnP solver with the crate's default parameters.
    EPnPDefault,
}

/// Dispatch function that routes to the chosen PnP solver.
pub fn solve_pnp(
    world: &[glam::DVec3],
    image: &[glam::DVec2],
    camera: &CameraModel,
    method: PnPMethod,
) -> Result<PnPResult, PnPError> {
    match method {
        PnPMethod::EPnP(params) => EPnP::solve(world, image, camera, &params),
        PnPMethod::EPnPDefault => EPnP::solve(world, image, camera, &EPnPParams::default()),
    }
}
