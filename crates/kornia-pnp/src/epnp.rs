//! Efficient Perspective-n-Point (EPnP) solver
//! Paper: [Lepetit et al., IJCV 2009](https://www.tugraz.at/fileadmin/user_upload/Institute/ICG/Images/team_lepetit/publications/lepetit_ijcv08.pdf)
//! Reference: [OpenCV EPnP implementation](https://github.com/opencv/opencv/blob/4.x/modules/calib3d/src/epnp.cpp)

use crate::camera::{CameraIntrinsics, CameraModel};
use crate::ops::{compute_centroid, fit_rigid, gauss_newton, rmse_px, to_na};
use crate::types::{check_lengths, NumericTol, PnPError, PnPResult, PnPSolver};
use glam::{DVec2, DVec3};
use kornia_lie::SE3;
use nalgebra::{DMatrix, DVector, Matrix3};

/// Marker type representing the Efficient PnP algorithm.
pub struct EPnP;

impl PnPSolver for EPnP {
    type Param = EPnPParams;

    fn solve(
        world: &[DVec3],
        image: &[DVec2],
        camera: &CameraModel,
        params: &Self::Param,
    ) -> Result<PnPResult, PnPError> {
        solve_epnp(world, image, camera, params)
    }
}

/// Parameters controlling the EPnP solver.
#[derive(Debug, Clone, Default)]
pub struct EPnPParams {
    /// Shared numeric tolerances.
    pub tol: NumericTol,
}

const NUM_CONTROL_POINTS: usize = 4;
const CP_PAIRS: [(usize, usize); 6] = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];

/// Solve Perspective-n-Point (EPnP).
///
/// # Arguments
/// * `points_world` – 3-D coordinates in the world frame, `N≥4`.
/// * `points_image` – Corresponding pixel coordinates, possibly distorted.
/// * `camera` – Camera model used to undistort the pixels and as `K`.
///
/// # Returns
/// The camera-from-world pose together with its pixel RMSE over all points.
pub fn solve_epnp(
    points_world: &[DVec3],
    points_image: &[DVec2],
    camera: &CameraModel,
    params: &EPnPParams,
) -> Result<PnPResult, PnPError> {
    check_lengths(points_world, points_image)?;
    let n = points_world.len();
    if n < NUM_CONTROL_POINTS {
        return Err(PnPError::InsufficientCorrespondences {
            required: NUM_CONTROL_POINTS,
            actual: n,
        });
    }

    let pixels = camera.undistort_pixels(points_image);
    let pinhole = CameraModel::pinhole(camera.intrinsics);

    let cw = select_control_points(points_world);
    let alphas = compute_barycentric(points_world, &cw, params.tol.eps)?;
    let m = build_m(&alphas, &pixels, &camera.intrinsics);

    // null space of M: eigenvectors of MᵀM with the 4 smallest eigenvalues,
    // null4[0] is the one with the smallest eigenvalue
    let mtm = m.transpose() * &m;
    let eigen = mtm.symmetric_eigen();
    let mut order: Vec<usize> = (0..12).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));
    let mut null4 = [[0.0f64; 12]; 4];
    for (v, &col) in null4.iter_mut().zip(order.iter()) {
        for (dst, src) in v.iter_mut().zip(eigen.eigenvectors.column(col).iter()) {
            *dst = *src;
        }
    }

    let l = build_l6x10(&null4);
    let rho = rho_ctrlpts(&cw);
    let rho_vec = DVector::from_column_slice(&rho);

    let betas = [
        estimate_beta_n4(&l, &rho_vec, params.tol.svd),
        estimate_beta_n2(&l, &rho_vec, params.tol.svd),
        estimate_beta_n3(&l, &rho_vec, params.tol.svd),
    ];

    let mut best: Option<(SE3, f64)> = None;
    for beta in betas.into_iter().flatten() {
        let refined = gauss_newton(beta, &l, &rho);
        let Ok(pose) = pose_from_betas(&refined, &null4, points_world, &alphas) else {
            continue;
        };
        let err = rmse_px(&pinhole, &pose, points_world, &pixels);
        if !err.is_finite() {
            continue;
        }
        if best.as_ref().map_or(true, |(_, best_err)| err < *best_err) {
            best = Some((pose, err));
        }
    }

    let (pose, reproj_rmse) = best.ok_or_else(|| {
        PnPError::Degenerate("no finite EPnP solution for the given points".to_string())
    })?;

    Ok(PnPResult { pose, reproj_rmse })
}

/// Camera-frame control points from betas, then rigid alignment of the world points
/// onto their camera-frame reconstruction.
fn pose_from_betas(
    betas: &[f64; 4],
    null4: &[[f64; 12]; 4],
    points_world: &[DVec3],
    alphas: &[[f64; 4]],
) -> Result<SE3, PnPError> {
    let mut cc = [DVec3::ZERO; NUM_CONTROL_POINTS];
    for (beta, v) in betas.iter().zip(null4.iter()) {
        for (j, c) in cc.iter_mut().enumerate() {
            *c += DVec3::new(v[3 * j], v[3 * j + 1], v[3 * j + 2]) * *beta;
        }
    }

    let mut pcs: Vec<DVec3> = alphas
        .iter()
        .map(|a| cc.iter().zip(a.iter()).map(|(&c, &w)| c * w).sum())
        .collect();

    // the scene must lie in front of the camera
    if pcs[0].z < 0.0 {
        for p in pcs.iter_mut() {
            *p = -*p;
        }
    }

    let pose = fit_rigid(points_world, &pcs)?;
    if !pose.is_finite() {
        return Err(PnPError::Degenerate("non-finite pose".to_string()));
    }
    Ok(pose)
}

/// Control points: centroid plus the principal axes scaled by their standard deviation.
fn select_control_points(points_world: &[DVec3]) -> [DVec3; NUM_CONTROL_POINTS] {
    let n = points_world.len() as f64;
    let c = compute_centroid(points_world);

    let mut cov = Matrix3::<f64>::zeros();
    for &p in points_world {
        let d = to_na(p - c);
        cov += d * d.transpose();
    }
    cov /= n;

    let eigen = cov.symmetric_eigen();
    let mut axes: Vec<(f64, DVec3)> = (0..3)
        .map(|i| {
            let v = eigen.eigenvectors.column(i);
            (eigen.eigenvalues[i].max(0.0).sqrt(), DVec3::new(v[0], v[1], v[2]))
        })
        .collect();
    axes.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut cw = [c; NUM_CONTROL_POINTS];
    for (dst, (sigma, axis)) in cw.iter_mut().skip(1).zip(axes.iter()) {
        *dst = c + *axis * *sigma;
    }
    cw
}

/// Barycentric coordinates of the world points with respect to the control points.
///
/// Each `[a0, a1, a2, a3]` sums to one and satisfies `pw = sum_j(a_j * cw_j)`.
/// A pseudo-inverse is used when the control-point tetrahedron is flat.
fn compute_barycentric(
    points_world: &[DVec3],
    cw: &[DVec3; NUM_CONTROL_POINTS],
    eps: f64,
) -> Result<Vec<[f64; 4]>, PnPError> {
    let b = Matrix3::from_columns(&[
        to_na(cw[1] - cw[0]),
        to_na(cw[2] - cw[0]),
        to_na(cw[3] - cw[0]),
    ]);

    let b_inv = match b.try_inverse() {
        Some(inv) if b.determinant().abs() > eps => inv,
        _ => b
            .pseudo_inverse(eps)
            .map_err(|e| PnPError::SvdFailed(e.to_string()))?,
    };

    Ok(points_world
        .iter()
        .map(|&p| {
            let lamb = b_inv * to_na(p - cw[0]);
            [1.0 - (lamb.x + lamb.y + lamb.z), lamb.x, lamb.y, lamb.z]
        })
        .collect())
}

/// The 2N x 12 design matrix `M`, two rows per correspondence.
fn build_m(alphas: &[[f64; 4]], pixels: &[DVec2], k: &CameraIntrinsics) -> DMatrix<f64> {
    let mut m = DMatrix::<f64>::zeros(2 * alphas.len(), 12);

    for (i, (a, uv)) in alphas.iter().zip(pixels.iter()).enumerate() {
        for (j, &alpha) in a.iter().enumerate() {
            let base = 3 * j;
            m[(2 * i, base)] = alpha * k.fx;
            m[(2 * i, base + 2)] = alpha * (k.cx - uv.x);
            m[(2 * i + 1, base + 1)] = alpha * k.fy;
            m[(2 * i + 1, base + 2)] = alpha * (k.cy - uv.y);
        }
    }
    m
}

/// Build the 6x10 matrix `L` relating the beta products to the squared
/// camera-frame control point distances.
///
/// Columns follow `[b00, b01, b11, b02, b12, b22, b03, b13, b23, b33]`.
fn build_l6x10(null4: &[[f64; 12]; 4]) -> [[f64; 10]; 6] {
    let mut l = [[0.0; 10]; 6];

    for (row, &(a, b)) in l.iter_mut().zip(CP_PAIRS.iter()) {
        let d: [DVec3; 4] = std::array::from_fn(|k| {
            let v = &null4[k];
            DVec3::new(
                v[3 * a] - v[3 * b],
                v[3 * a + 1] - v[3 * b + 1],
                v[3 * a + 2] - v[3 * b + 2],
            )
        });

        *row = [
            d[0].dot(d[0]),
            2.0 * d[0].dot(d[1]),
            d[1].dot(d[1]),
            2.0 * d[0].dot(d[2]),
            2.0 * d[1].dot(d[2]),
            d[2].dot(d[2]),
            2.0 * d[0].dot(d[3]),
            2.0 * d[1].dot(d[3]),
            2.0 * d[2].dot(d[3]),
            d[3].dot(d[3]),
        ];
    }
    l
}

/// Least-squares solve of `L[:, cols] x = rho`.
fn solve_l_subset(
    l: &[[f64; 10]; 6],
    cols: &[usize],
    rho: &DVector<f64>,
    tol_svd: f64,
) -> Option<DVector<f64>> {
    let l_sub = DMatrix::from_fn(6, cols.len(), |r, c| l[r][cols[c]]);
    l_sub.svd(true, true).solve(rho, tol_svd).ok()
}

/// Betas assuming a 4-dimensional null space, linearized on `[b00, b01, b02, b03]`.
fn estimate_beta_n4(l: &[[f64; 10]; 6], rho: &DVector<f64>, tol_svd: f64) -> Option<[f64; 4]> {
    let x = solve_l_subset(l, &[0, 1, 3, 6], rho, tol_svd)?;
    let b0 = x[0].abs().sqrt();
    if b0 <= f64::EPSILON {
        return None;
    }
    let sign = if x[0] < 0.0 { -1.0 } else { 1.0 };
    Some([b0, sign * x[1] / b0, sign * x[2] / b0, sign * x[3] / b0])
}

/// Betas assuming a 2-dimensional null space, from `[b00, b01, b11]`.
fn estimate_beta_n2(l: &[[f64; 10]; 6], rho: &DVector<f64>, tol_svd: f64) -> Option<[f64; 4]> {
    let x = solve_l_subset(l, &[0, 1, 2], rho, tol_svd)?;
    let (mut b0, b1) = leading_betas(x[0], x[2]);
    if x[1] < 0.0 {
        b0 = -b0;
    }
    Some([b0, b1, 0.0, 0.0])
}

/// Betas assuming a 3-dimensional null space, from `[b00, b01, b11, b02, b12]`.
fn estimate_beta_n3(l: &[[f64; 10]; 6], rho: &DVector<f64>, tol_svd: f64) -> Option<[f64; 4]> {
    let x = solve_l_subset(l, &[0, 1, 2, 3, 4], rho, tol_svd)?;
    let (mut b0, b1) = leading_betas(x[0], x[2]);
    if b0 <= f64::EPSILON {
        return None;
    }
    if x[1] < 0.0 {
        b0 = -b0;
    }
    Some([b0, b1, x[3] / b0, 0.0])
}

/// `(|b0|, b1)` from the estimates of `b00` and `b11`, clamping inconsistent signs to zero.
fn leading_betas(b00: f64, b11: f64) -> (f64, f64) {
    if b00 < 0.0 {
        ((-b00).sqrt(), if b11 < 0.0 { (-b11).sqrt() } else { 0.0 })
    } else {
        (b00.sqrt(), if b11 > 0.0 { b11.sqrt() } else { 0.0 })
    }
}

/// The six squared distances between the control points.
fn rho_ctrlpts(cw: &[DVec3; NUM_CONTROL_POINTS]) -> [f64; 6] {
    CP_PAIRS.map(|(i, j)| cw[i].distance_squared(cw[j]))
}
