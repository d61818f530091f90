//! Closed-form transform fits from point correspondences.
//!
//! Every fit maps `moving[i]` onto `fixed[i]` and returns a homogeneous `DMat4`.

use glam::{DMat3, DMat4, DQuat, DVec3};
use nalgebra::{DMatrix, Matrix3, Matrix4, SymmetricEigen};

use crate::error::{Error, Result};
use crate::geometry::{centroid, mat4_from_rows};
use crate::registration::config::TransformKind;

/// Singular values below this fraction of the largest are treated as zero.
const PINV_RELATIVE_CUTOFF: f64 = 1e-15;

fn check_pairs(moving: &[DVec3], fixed: &[DVec3]) -> Result<()> {
    if moving.len() != fixed.len() {
        return Err(Error::LengthMismatch {
            what: "correspondences",
            left: moving.len(),
            right: fixed.len(),
        });
    }
    if moving.is_empty() {
        return Err(Error::InsufficientPoints {
            required: 1,
            found: 0,
        });
    }
    Ok(())
}

fn homogeneous(points: &[DVec3]) -> DMatrix<f64> {
    DMatrix::from_fn(4, points.len(), |r, c| match r {
        0 => points[c].x,
        1 => points[c].y,
        2 => points[c].z,
        _ => 1.0,
    })
}

/// Least-squares affine map `A = F_h · pinv(M_h)` over homogeneous coordinates.
///
/// Underdetermined or degenerate configurations give the least-norm solution.
pub fn fit_affine(moving: &[DVec3], fixed: &[DVec3]) -> Result<DMat4> {
    check_pairs(moving, fixed)?;

    let m = homogeneous(moving);
    let f = homogeneous(fixed);
    let svd = m.svd(true, true);
    let cutoff = svd.singular_values.max() * PINV_RELATIVE_CUTOFF;
    let pinv = svd
        .pseudo_inverse(cutoff)
        .map_err(|_| Error::DegenerateFit("pseudo-inverse failed"))?;
    let a = f * pinv;

    let mut rows = [[0.0; 4]; 4];
    for (r, row) in rows.iter_mut().enumerate() {
        for (c, v) in row.iter_mut().enumerate() {
            *v = a[(r, c)];
        }
    }
    Ok(mat4_from_rows(rows))
}

/// Sum of `p_a · y_b` over the centered pairs, indexed `[a][b]`.
fn cross_covariance(moving: &[DVec3], fixed: &[DVec3], cm: DVec3, cf: DVec3) -> [[f64; 3]; 3] {
    let mut s = [[0.0; 3]; 3];
    for (p, y) in moving.iter().zip(fixed) {
        let p = (*p - cm).to_array();
        let y = (*y - cf).to_array();
        for a in 0..3 {
            for b in 0..3 {
                s[a][b] += p[a] * y[b];
            }
        }
    }
    s
}

/// Similarity fit (uniform scale, rotation, translation) by Horn's quaternion method.
///
/// The rotation is the unit quaternion of the largest eigenvalue of the 4×4
/// N-matrix built from the centered cross-covariance. The scale is
/// `sqrt(Σ|y'|² / Σ|p'|²)`.
pub fn fit_similarity(moving: &[DVec3], fixed: &[DVec3]) -> Result<DMat4> {
    check_pairs(moving, fixed)?;
    let cm = centroid(moving).unwrap_or(DVec3::ZERO);
    let cf = centroid(fixed).unwrap_or(DVec3::ZERO);

    let source_var: f64 = moving.iter().map(|p| (*p - cm).length_squared()).sum();
    let target_var: f64 = fixed.iter().map(|y| (*y - cf).length_squared()).sum();
    if source_var <= f64::EPSILON {
        return Err(Error::DegenerateFit("zero source variance"));
    }

    let s = cross_covariance(moving, fixed, cm, cf);
    let [[sxx, sxy, sxz], [syx, syy, syz], [szx, szy, szz]] = s;
    #[rustfmt::skip]
    let n = Matrix4::new(
        sxx + syy + szz, syz - szy,       szx - sxz,       sxy - syx,
        syz - szy,       sxx - syy - szz, sxy + syx,       szx + sxz,
        szx - sxz,       sxy + syx,       syy - sxx - szz, syz + szy,
        sxy - syx,       szx + sxz,       syz + szy,       szz - sxx - syy,
    );

    let eigen = SymmetricEigen::new(n);
    let best = eigen.eigenvalues.imax();
    let q = eigen.eigenvectors.column(best);
    let quat = DQuat::from_xyzw(q[1], q[2], q[3], q[0]).normalize();
    let rotation = DMat3::from_quat(quat);

    let scale = (target_var / source_var).sqrt();
    let translation = cf - scale * (rotation * cm);

    let mut a = DMat4::from_mat3(rotation * scale);
    a.w_axis = translation.extend(1.0);
    Ok(a)
}

/// Rigid fit (rotation and translation) by the Kabsch SVD, reflections excluded.
pub fn fit_rigid(moving: &[DVec3], fixed: &[DVec3]) -> Result<DMat4> {
    check_pairs(moving, fixed)?;
    let cm = centroid(moving).unwrap_or(DVec3::ZERO);
    let cf = centroid(fixed).unwrap_or(DVec3::ZERO);

    let s = cross_covariance(moving, fixed, cm, cf);
    let h = Matrix3::from_fn(|r, c| s[r][c]);
    let svd = h.svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Err(Error::DegenerateFit("SVD did not converge"));
    };

    let v = v_t.transpose();
    let d = (v * u.transpose()).determinant().signum();
    let correction = Matrix3::from_diagonal(&nalgebra::Vector3::new(1.0, 1.0, d));
    let r = v * correction * u.transpose();

    let rotation = DMat3::from_cols_slice(r.as_slice());
    let translation = cf - rotation * cm;

    let mut a = DMat4::from_mat3(rotation);
    a.w_axis = translation.extend(1.0);
    Ok(a)
}

/// Fits the requested transform model.
pub fn fit(kind: TransformKind, moving: &[DVec3], fixed: &[DVec3]) -> Result<DMat4> {
    match kind {
        TransformKind::Affine => fit_affine(moving, fixed),
        TransformKind::Similarity => fit_similarity(moving, fixed),
        TransformKind::Rigid => fit_rigid(moving, fixed),
    }
}
