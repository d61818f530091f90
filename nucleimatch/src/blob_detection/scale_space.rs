//! Scale-normalized LoG stack and its 4-D local minima.

use common::Buffer3;
use rayon::prelude::*;

use crate::blob_detection::laplacian::{gaussian_laplace, Axis};
use crate::error::Result;
use crate::progress::{Checkpoint, Stage};

/// One 3-D level per tested scale, indexed (scale, z, y, x).
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleStack<T> {
    scales: Vec<u32>,
    levels: Vec<Buffer3<T>>,
}

impl<T> ScaleStack<T> {
    pub fn new(scales: Vec<u32>, levels: Vec<Buffer3<T>>) -> Self {
        assert_eq!(scales.len(), levels.len(), "one level per scale");
        Self { scales, levels }
    }

    #[inline]
    pub fn scales(&self) -> &[u32] {
        &self.scales
    }

    #[inline]
    pub fn levels(&self) -> &[Buffer3<T>] {
        &self.levels
    }

    #[inline]
    pub fn level(&self, index: usize) -> &Buffer3<T> {
        &self.levels[index]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    #[inline]
    pub fn get(&self, scale_index: usize, z: usize, y: usize, x: usize) -> &T {
        self.levels[scale_index].get(z, y, x)
    }
}

/// Computes `s² · ∇²G_σ * volume` with `σ = (s / anisotropy, s, s)` for every scale.
pub fn sphere_log(
    volume: &Buffer3<f32>,
    scales: &[u32],
    anisotropy: f64,
    checkpoint: &Checkpoint,
) -> Result<ScaleStack<f32>> {
    let mut levels = Vec::with_capacity(scales.len());

    for (i, &scale) in scales.iter().enumerate() {
        checkpoint.step(i, scales.len(), Stage::ScaleSpace)?;

        let s = scale as f64;
        let mut level = gaussian_laplace(volume, [s / anisotropy, s, s]);
        let norm = (s * s) as f32;
        level.data_mut().par_iter_mut().for_each(|v| *v *= norm);

        tracing::debug!(scale, "computed LoG level");
        levels.push(level);
    }
    checkpoint.step(scales.len(), scales.len(), Stage::ScaleSpace)?;

    Ok(ScaleStack::new(scales.to_vec(), levels))
}

/// Size-3 minimum filter along one axis. Borders repeat the edge sample.
fn min3_along(level: &Buffer3<f32>, axis: Axis) -> Vec<f32> {
    let (depth, height, width) = level.shape();
    let (stride, len) = match axis {
        Axis::X => (1, width),
        Axis::Y => (width, height),
        Axis::Z => (height * width, depth),
    };
    let data = level.data();

    data.par_iter()
        .enumerate()
        .map(|(i, &v)| {
            let c = (i / stride) % len;
            let mut m = v;
            if c > 0 {
                m = m.min(data[i - stride]);
            }
            if c + 1 < len {
                m = m.min(data[i + stride]);
            }
            m
        })
        .collect()
}

/// Marks voxels that are `<=` every neighbor in their 3×3×3×3 (scale, z, y, x) window.
///
/// The box minimum is separable, so it is taken one axis at a time, scale last.
pub fn local_minima(stack: &ScaleStack<f32>) -> ScaleStack<bool> {
    let spatial: Vec<Vec<f32>> = stack
        .levels()
        .iter()
        .map(|level| {
            let (d, h, w) = level.shape();
            let mut filtered = Buffer3::new(d, h, w, min3_along(level, Axis::X));
            filtered = Buffer3::new(d, h, w, min3_along(&filtered, Axis::Y));
            min3_along(&filtered, Axis::Z)
        })
        .collect();

    let n = stack.len();
    let levels = (0..n)
        .map(|k| {
            let level = stack.level(k);
            let lower = &spatial[k.saturating_sub(1)];
            let upper = &spatial[(k + 1).min(n - 1)];
            let mask: Vec<bool> = level
                .data()
                .iter()
                .zip(&spatial[k])
                .zip(lower.iter().zip(upper))
                .map(|((&v, &m), (&lo, &up))| v == m.min(lo).min(up))
                .collect();
            let (d, h, w) = level.shape();
            Buffer3::new(d, h, w, mask)
        })
        .collect();

    ScaleStack::new(stack.scales().to_vec(), levels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack_from(levels: Vec<Vec<f32>>, shape: (usize, usize, usize)) -> ScaleStack<f32> {
        let (d, h, w) = shape;
        let scales = (1..=levels.len() as u32).collect();
        ScaleStack::new(
            scales,
            levels.into_iter().map(|v| Buffer3::new(d, h, w, v)).collect(),
        )
    }

    #[test]
    fn single_dip_is_the_only_minimum() {
        let mut a = vec![0.0f32; 27];
        let b = vec![0.0f32; 27];
        a[13] = -5.0;
        // Level 1 equals its neighborhood everywhere except near the dip.
        let stack = stack_from(vec![a, b], (3, 3, 3));
        let minima = local_minima(&stack);

        assert!(*minima.get(0, 1, 1, 1));
        // Every voxel of level 1 sees the dip through the scale window.
        assert!(minima.level(1).data().iter().all(|&m| !m));
        // Corners of level 0 also see the dip (the window covers the whole 3×3×3 cube).
        assert!(!*minima.get(0, 0, 0, 0));
    }

    #[test]
    fn plateau_voxels_are_minima() {
        let stack = stack_from(vec![vec![2.0f32; 8]], (2, 2, 2));
        let minima = local_minima(&stack);
        assert!(minima.level(0).data().iter().all(|&m| m));
    }

    #[test]
    fn minimum_across_scales_picks_the_deeper_level() {
        let mut shallow = vec![0.0f32; 125];
        let mut deep = vec![0.0f32; 125];
        let mut deeper_elsewhere = vec![0.0f32; 125];
        shallow[62] = -1.0;
        deep[62] = -3.0;
        deeper_elsewhere[0] = -9.0;
        let stack = stack_from(vec![shallow, deep, deeper_elsewhere], (5, 5, 5));
        let minima = local_minima(&stack);

        assert!(!*minima.get(0, 2, 2, 2));
        assert!(*minima.get(1, 2, 2, 2));
        assert!(*minima.get(2, 0, 0, 0));
    }

    #[test]
    fn sphere_log_scales_by_s_squared() {
        let mut volume = Buffer3::new_default(9, 9, 9);
        volume[(4, 4, 4)] = 1.0f32;
        let stack = sphere_log(&volume, &[1, 2], 1.0, &Checkpoint::default()).unwrap();

        let raw = gaussian_laplace(&volume, [2.0, 2.0, 2.0]);
        let expected = 4.0 * raw[(4, 4, 4)];
        assert!((stack.get(1, 4, 4, 4) - expected).abs() < 1e-6);
        assert_eq!(stack.scales(), &[1, 2]);
    }

    #[test]
    fn sphere_log_honors_cancellation() {
        let volume = Buffer3::new_default(4, 4, 4);
        let checkpoint = Checkpoint::default();
        checkpoint.cancel.cancel();
        assert!(sphere_log(&volume, &[1, 2, 3], 1.0, &checkpoint).is_err());
    }
}
