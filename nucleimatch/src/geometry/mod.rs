//! Point-set primitives shared by detection output and registration.
//!
//! Coordinates are `DVec3` in (z, y, x) voxel order: `p.x` holds Z, `p.z` holds X.
//! Affine maps are `DMat4` acting on column vectors `[z, y, x, 1]`.


use glam::{DMat4, DVec3, DVec4};
use nalgebra::{Matrix3, SymmetricEigen};

use crate::error::{Error, Result};

/// Ordered point set with optional identity and size annotations.
///
/// `ids` identify points independently of ordering (they need not be sequential).
/// `sizes` are nucleus volumes, used to derive a default inlier threshold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    points: Vec<DVec3>,
    ids: Option<Vec<i64>>,
    sizes: Option<Vec<f64>>,
}

impl PointCloud {
    pub fn new(points: Vec<DVec3>) -> Self {
        Self {
            points,
            ids: None,
            sizes: None,
        }
    }

    /// Cloud whose ids number the points `1..=n` in order.
    pub fn numbered(points: Vec<DVec3>) -> Self {
        let ids = (1..=points.len() as i64).collect();
        Self {
            points,
            ids: Some(ids),
            sizes: None,
        }
    }

    pub fn with_ids(mut self, ids: Vec<i64>) -> Result<Self> {
        if ids.len() != self.points.len() {
            return Err(Error::LengthMismatch {
                what: "point ids",
                left: self.points.len(),
                right: ids.len(),
            });
        }
        self.ids = Some(ids);
        Ok(self)
    }

    pub fn with_sizes(mut self, sizes: Vec<f64>) -> Result<Self> {
        if sizes.len() != self.points.len() {
            return Err(Error::LengthMismatch {
                what: "point sizes",
                left: self.points.len(),
                right: sizes.len(),
            });
        }
        self.sizes = Some(sizes);
        Ok(self)
    }

    #[inline]
    pub fn points(&self) -> &[DVec3] {
        &self.points
    }

    #[inline]
    pub fn ids(&self) -> Option<&[i64]> {
        self.ids.as_deref()
    }

    #[inline]
    pub fn sizes(&self) -> Option<&[f64]> {
        self.sizes.as_deref()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Mean nucleus size, `None` without sizes or points.
    pub fn mean_size(&self) -> Option<f64> {
        let sizes = self.sizes.as_ref()?;
        if sizes.is_empty() {
            return None;
        }
        Some(sizes.iter().sum::<f64>() / sizes.len() as f64)
    }

    /// Copy of the cloud with every point mapped through `transform`.
    pub fn transformed(&self, transform: &DMat4) -> Self {
        Self {
            points: apply_affine(&self.points, transform),
            ids: self.ids.clone(),
            sizes: self.sizes.clone(),
        }
    }
}

/// Mean of the points, `None` for an empty set.
pub fn centroid(points: &[DVec3]) -> Option<DVec3> {
    if points.is_empty() {
        return None;
    }
    let sum: DVec3 = points.iter().copied().sum();
    Some(sum / points.len() as f64)
}

/// Average Euclidean distance over all unordered point pairs.
pub fn mean_distance(points: &[DVec3]) -> Result<f64> {
    let n = points.len();
    if n < 2 {
        return Err(Error::InsufficientPoints {
            required: 2,
            found: n,
        });
    }

    let mut total = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            total += points[i].distance(points[j]);
        }
    }
    let pairs = n * (n - 1) / 2;
    Ok(total / pairs as f64)
}

/// Applies the affine part of `transform` (the bottom row is ignored).
pub fn apply_affine(points: &[DVec3], transform: &DMat4) -> Vec<DVec3> {
    points
        .iter()
        .map(|&p| transform.transform_point3(p))
        .collect()
}

/// Mean Euclidean distance between paired points, `None` for empty input.
pub fn mean_residual(moved: &[DVec3], target: &[DVec3]) -> Option<f64> {
    debug_assert_eq!(moved.len(), target.len());
    if moved.is_empty() {
        return None;
    }
    let total: f64 = moved
        .iter()
        .zip(target)
        .map(|(a, b)| a.distance(*b))
        .sum();
    Some(total / moved.len() as f64)
}

/// Builds a `DMat4` from row-major rows.
pub fn mat4_from_rows(rows: [[f64; 4]; 4]) -> DMat4 {
    DMat4::from_cols(
        DVec4::new(rows[0][0], rows[1][0], rows[2][0], rows[3][0]),
        DVec4::new(rows[0][1], rows[1][1], rows[2][1], rows[3][1]),
        DVec4::new(rows[0][2], rows[1][2], rows[2][2], rows[3][2]),
        DVec4::new(rows[0][3], rows[1][3], rows[2][3], rows[3][3]),
    )
}

/// Row-major rows of a `DMat4`.
pub fn mat4_rows(m: &DMat4) -> [[f64; 4]; 4] {
    [
        m.row(0).to_array(),
        m.row(1).to_array(),
        m.row(2).to_array(),
        m.row(3).to_array(),
    ]
}

/// Centroid and principal axes of a point cloud.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrincipalFrame {
    pub centroid: DVec3,
    /// Unit axes ordered by decreasing variance.
    pub axes: [DVec3; 3],
    /// Variance along each axis.
    pub variances: [f64; 3],
}

impl PrincipalFrame {
    /// Rotation whose rows are the principal axes; maps centered points into the frame.
    pub fn rotation_rows(&self) -> [[f64; 3]; 3] {
        self.axes.map(|a| a.to_array())
    }
}

/// PCA of the centered cloud.
///
/// Each axis is oriented so that its largest-magnitude component is positive,
/// which makes the sign deterministic for a given cloud. The sign is still
/// arbitrary with respect to the geometry, so callers try both orientations.
pub fn principal_frame(points: &[DVec3]) -> Result<PrincipalFrame> {
    let n = points.len();
    if n < 2 {
        return Err(Error::InsufficientPoints {
            required: 2,
            found: n,
        });
    }
    let center = centroid(points).unwrap_or(DVec3::ZERO);

    let mut cov = Matrix3::<f64>::zeros();
    for p in points {
        let d = *p - center;
        let d = [d.x, d.y, d.z];
        for r in 0..3 {
            for c in 0..3 {
                cov[(r, c)] += d[r] * d[c];
            }
        }
    }
    cov /= (n - 1) as f64;

    let eigen = SymmetricEigen::new(cov);
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

    let mut axes = [DVec3::ZERO; 3];
    let mut variances = [0.0; 3];
    for (slot, &k) in order.iter().enumerate() {
        let v = eigen.eigenvectors.column(k);
        let mut axis = DVec3::new(v[0], v[1], v[2]).normalize_or_zero();
        let dominant = axis
            .to_array()
            .into_iter()
            .max_by(|a, b| a.abs().total_cmp(&b.abs()))
            .unwrap_or(0.0);
        if dominant < 0.0 {
            axis = -axis;
        }
        axes[slot] = axis;
        variances[slot] = eigen.eigenvalues[k].max(0.0);
    }

    Ok(PrincipalFrame {
        centroid: center,
        axes,
        variances,
    })
}
