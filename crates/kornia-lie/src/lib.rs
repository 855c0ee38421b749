#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Kornia Lie Groups
//!
//! Double precision rotations and rigid body transformations used by the pose
//! estimation crates.
//!
//! ## Supported Groups
//!
//! - **SO(3)**: 3D rotation group
//! - **SE(3)**: 3D rigid body transformations (rotation + translation)
//!
//! ## Example
//!
//! ```rust
//! use glam::DVec3;
//! use kornia_lie::{se3::SE3, so3::SO3};
//!
//! // rotate 90 degrees around z and move one unit along x
//! let rotation = SO3::exp(DVec3::new(0.0, 0.0, std::f64::consts::FRAC_PI_2));
//! let b_from_a = SE3::new(rotation, DVec3::X);
//!
//! let point_b = b_from_a * DVec3::X;
//! let point_a = b_from_a.inverse() * point_b;
//! assert!((point_a - DVec3::X).length() < 1e-12);
//! ```

/// Special Euclidean group SE(3) for 3D rigid transformations.
pub mod se3;

/// Special Orthogonal group SO(3) for 3D rotations.
pub mod so3;

pub use se3::SE3;
pub use so3::SO3;
