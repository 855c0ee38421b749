//! Pose solver capabilities used by the registrator.

use glam::{DVec2, DVec3};
use kornia_lie::SE3;
use kornia_pnp::{
    epnp::solve_epnp, solve_pnp_ransac, CameraModel, EPnPParams, PnPError, PnPMethod,
    PnPRansacResult, RansacParams,
};

/// Solves a pose from a small or overdetermined set of 3D-2D correspondences.
pub trait MinimalPoseSolver {
    /// Camera-from-world pose of `image` given `world`, or an error when no valid pose exists.
    fn solve(&self, world: &[DVec3], image: &[DVec2], camera: &CameraModel)
        -> Result<SE3, PnPError>;
}

/// Solves a pose with its own internal consensus sampling.
pub trait RobustPoseSolver {
    /// Camera-from-world pose and the indices of the inlier correspondences.
    ///
    /// An empty inlier set means the solver never converged.
    fn solve_robust(
        &self,
        world: &[DVec3],
        image: &[DVec2],
        camera: &CameraModel,
        params: &RansacParams,
    ) -> Result<PnPRansacResult, PnPError>;
}

/// [`MinimalPoseSolver`] backed by EPnP.
#[derive(Debug, Clone, Default)]
pub struct EPnPSolver {
    /// EPnP parameters.
    pub params: EPnPParams,
}

impl MinimalPoseSolver for EPnPSolver {
    fn solve(
        &self,
        world: &[DVec3],
        image: &[DVec2],
        camera: &CameraModel,
    ) -> Result<SE3, PnPError> {
        solve_epnp(world, image, camera, &self.params).map(|res| res.pose)
    }
}

/// [`RobustPoseSolver`] running RANSAC around EPnP.
#[derive(Debug, Clone, Default)]
pub struct RansacPnPSolver {
    /// Parameters of the EPnP solves inside the RANSAC loop.
    pub base: EPnPParams,
}

impl RobustPoseSolver for RansacPnPSolver {
    fn solve_robust(
        &self,
        world: &[DVec3],
        image: &[DVec2],
        camera: &CameraModel,
        params: &RansacParams,
    ) -> Result<PnPRansacResult, PnPError> {
        solve_pnp_ransac(world, image, camera, PnPMethod::EPnP(self.base.clone()), params)
    }
}
