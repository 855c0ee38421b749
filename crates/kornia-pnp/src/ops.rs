use glam::{DMat3, DVec2, DVec3};
use kornia_lie::SE3;
use nalgebra::{Matrix3, SMatrix, SVector, Vector3, Vector4};

use crate::camera::CameraModel;
use crate::types::PnPError;

const GN_MAX_ITERATIONS: usize = 10;
const GN_STOP_EPS: f64 = 1e-14;

/// Compute the centroid of a set of points.
pub(crate) fn compute_centroid(pts: &[DVec3]) -> DVec3 {
    let n = pts.len() as f64;
    pts.iter().fold(DVec3::ZERO, |acc, &p| acc + p) / n
}

#[inline]
pub(crate) fn to_na(v: DVec3) -> Vector3<f64> {
    Vector3::new(v.x, v.y, v.z)
}

#[inline]
fn to_dmat3(m: &Matrix3<f64>) -> DMat3 {
    DMat3::from_cols(
        DVec3::new(m[(0, 0)], m[(1, 0)], m[(2, 0)]),
        DVec3::new(m[(0, 1)], m[(1, 1)], m[(2, 1)]),
        DVec3::new(m[(0, 2)], m[(1, 2)], m[(2, 2)]),
    )
}

/// Least-squares rigid transformation `dst ≈ R * src + t` (Kabsch, no scale).
pub(crate) fn fit_rigid(src: &[DVec3], dst: &[DVec3]) -> Result<SE3, PnPError> {
    let c_src = compute_centroid(src);
    let c_dst = compute_centroid(dst);

    // cross-covariance dst * src^T
    let mut h = Matrix3::<f64>::zeros();
    for (&s, &d) in src.iter().zip(dst.iter()) {
        h += to_na(d - c_dst) * to_na(s - c_src).transpose();
    }

    let svd = h.svd(true, true);
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => return Err(PnPError::SvdFailed("rigid fit: missing U or V^T".to_string())),
    };

    // guard against reflections
    let d = (u * v_t).determinant().signum();
    let r = u * Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, d)) * v_t;

    let rotation = to_dmat3(&r);
    if !rotation.is_finite() {
        return Err(PnPError::Degenerate("rigid fit produced a non-finite rotation".to_string()));
    }
    let translation = c_dst - rotation * c_src;
    Ok(SE3::from_rt(&rotation, translation))
}

/// Squared pixel reprojection error of one correspondence.
#[inline]
pub(crate) fn reprojection_sq_error(
    camera: &CameraModel,
    camera_from_world: &SE3,
    world_point: DVec3,
    image_point: DVec2,
) -> f64 {
    let err = camera.project(*camera_from_world * world_point) - image_point;
    err.length_squared()
}

/// Root-mean-square reprojection error in pixels.
pub(crate) fn rmse_px(
    camera: &CameraModel,
    camera_from_world: &SE3,
    world: &[DVec3],
    image: &[DVec2],
) -> f64 {
    let sum_sq: f64 = world
        .iter()
        .zip(image.iter())
        .map(|(&pw, &uv)| reprojection_sq_error(camera, camera_from_world, pw, uv))
        .sum();
    (sum_sq / world.len() as f64).sqrt()
}

/// Refine the EPnP betas with Gauss-Newton on the control point distance constraints.
///
/// `l` holds the 6x10 quadratic coefficients and `rho` the squared world-frame
/// distances between control points.
pub(crate) fn gauss_newton(beta_init: [f64; 4], l: &[[f64; 10]; 6], rho: &[f64; 6]) -> [f64; 4] {
    let mut b = Vector4::from(beta_init);

    for _ in 0..GN_MAX_ITERATIONS {
        let mut a = SMatrix::<f64, 6, 4>::zeros();
        let mut r = SVector::<f64, 6>::zeros();

        for (i, row) in l.iter().enumerate() {
            a[(i, 0)] = 2.0 * row[0] * b[0] + row[1] * b[1] + row[3] * b[2] + row[6] * b[3];
            a[(i, 1)] = row[1] * b[0] + 2.0 * row[2] * b[1] + row[4] * b[2] + row[7] * b[3];
            a[(i, 2)] = row[3] * b[0] + row[4] * b[1] + 2.0 * row[5] * b[2] + row[8] * b[3];
            a[(i, 3)] = row[6] * b[0] + row[7] * b[1] + row[8] * b[2] + 2.0 * row[9] * b[3];

            let current = row[0] * b[0] * b[0]
                + row[1] * b[0] * b[1]
                + row[2] * b[1] * b[1]
                + row[3] * b[0] * b[2]
                + row[4] * b[1] * b[2]
                + row[5] * b[2] * b[2]
                + row[6] * b[0] * b[3]
                + row[7] * b[1] * b[3]
                + row[8] * b[2] * b[3]
                + row[9] * b[3] * b[3];
            r[i] = rho[i] - current;
        }

        let delta = match a.svd(true, true).solve(&r, 1e-12) {
            Ok(delta) => delta,
            Err(_) => break,
        };
        if !delta.iter().all(|v| v.is_finite()) {
            break;
        }
        b += delta;
        if delta.norm() < GN_STOP_EPS {
            break;
        }
    }

    b.into()
}
