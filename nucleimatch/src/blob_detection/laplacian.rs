//! Anisotropic Laplacian-of-Gaussian filtering of 3-D volumes.
//!
//! The Laplacian is separable into one term per axis: a second-derivative
//! Gaussian along that axis, smoothed by plain Gaussians along the other two.
//! Kernels are truncated at 4σ and borders are mirrored (`d c b a | a b c d`).

use common::Buffer3;
use rayon::prelude::*;

const TRUNCATE: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Z,
    Y,
    X,
}

const AXES: [Axis; 3] = [Axis::Z, Axis::Y, Axis::X];

#[inline]
pub fn kernel_radius(sigma: f64) -> usize {
    (TRUNCATE * sigma + 0.5) as usize
}

/// Normalized 1-D Gaussian kernel of length `2 * kernel_radius(sigma) + 1`.
pub fn gaussian_kernel_1d(sigma: f64) -> Vec<f64> {
    assert!(sigma > 0.0, "Sigma must be positive");

    let radius = kernel_radius(sigma) as isize;
    let mut kernel: Vec<f64> = (-radius..=radius)
        .map(|x| (-0.5 * (x * x) as f64 / (sigma * sigma)).exp())
        .collect();
    let sum: f64 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

/// Second derivative of the normalized Gaussian kernel: `(x²/σ⁴ - 1/σ²)·g(x)`.
pub fn gaussian_second_derivative_kernel_1d(sigma: f64) -> Vec<f64> {
    let radius = kernel_radius(sigma) as isize;
    let sigma2 = sigma * sigma;
    gaussian_kernel_1d(sigma)
        .into_iter()
        .zip(-radius..=radius)
        .map(|(g, x)| {
            let x2 = (x * x) as f64;
            (x2 / (sigma2 * sigma2) - 1.0 / sigma2) * g
        })
        .collect()
}

/// Mirrors `i` into `[0, n)` with the edge sample repeated.
#[inline]
fn reflect_index(i: isize, n: usize) -> usize {
    let n = n as isize;
    let period = 2 * n;
    let m = i.rem_euclid(period);
    if m >= n {
        (period - 1 - m) as usize
    } else {
        m as usize
    }
}

/// Source index of every kernel tap for every position along an axis of length `n`.
fn tap_table(n: usize, taps: usize) -> Vec<usize> {
    let radius = (taps / 2) as isize;
    let mut table = Vec::with_capacity(n * taps);
    for p in 0..n as isize {
        for k in 0..taps as isize {
            table.push(reflect_index(p + k - radius, n));
        }
    }
    table
}

/// Correlates `input` with `kernel` along one axis.
pub fn convolve_axis(input: &Buffer3<f32>, axis: Axis, kernel: &[f64]) -> Buffer3<f32> {
    let (depth, height, width) = input.shape();
    let mut output = Buffer3::new_default(depth, height, width);
    if input.is_empty() {
        return output;
    }

    let taps = kernel.len();
    let plane = input.plane_len();
    let src = input.data();

    match axis {
        Axis::X => {
            let table = tap_table(width, taps);
            output
                .data_mut()
                .par_chunks_mut(width)
                .enumerate()
                .for_each(|(row, out)| {
                    let line = &src[row * width..(row + 1) * width];
                    for (x, o) in out.iter_mut().enumerate() {
                        let sources = &table[x * taps..(x + 1) * taps];
                        let acc: f64 = kernel
                            .iter()
                            .zip(sources)
                            .map(|(&k, &i)| k * line[i] as f64)
                            .sum();
                        *o = acc as f32;
                    }
                });
        }
        Axis::Y => {
            let table = tap_table(height, taps);
            output
                .data_mut()
                .par_chunks_mut(plane)
                .enumerate()
                .for_each(|(z, out)| {
                    let slice = &src[z * plane..(z + 1) * plane];
                    let mut acc = vec![0.0f64; width];
                    for y in 0..height {
                        acc.fill(0.0);
                        for (&k, &sy) in kernel.iter().zip(&table[y * taps..(y + 1) * taps]) {
                            let row = &slice[sy * width..(sy + 1) * width];
                            for (a, &v) in acc.iter_mut().zip(row) {
                                *a += k * v as f64;
                            }
                        }
                        for (o, &a) in out[y * width..(y + 1) * width].iter_mut().zip(&acc) {
                            *o = a as f32;
                        }
                    }
                });
        }
        Axis::Z => {
            let table = tap_table(depth, taps);
            output
                .data_mut()
                .par_chunks_mut(plane)
                .enumerate()
                .for_each(|(z, out)| {
                    let mut acc = vec![0.0f64; plane];
                    for (&k, &sz) in kernel.iter().zip(&table[z * taps..(z + 1) * taps]) {
                        for (a, &v) in acc.iter_mut().zip(&src[sz * plane..(sz + 1) * plane]) {
                            *a += k * v as f64;
                        }
                    }
                    for (o, &a) in out.iter_mut().zip(&acc) {
                        *o = a as f32;
                    }
                });
        }
    }

    output
}

/// Laplacian of the volume smoothed by a Gaussian with per-axis `sigma` in (z, y, x).
pub fn gaussian_laplace(volume: &Buffer3<f32>, sigma: [f64; 3]) -> Buffer3<f32> {
    let smooth = sigma.map(gaussian_kernel_1d);
    let second = sigma.map(gaussian_second_derivative_kernel_1d);

    let (depth, height, width) = volume.shape();
    let mut laplacian = Buffer3::<f32>::new_default(depth, height, width);

    for derivative_axis in 0..3 {
        let kernel = |a: usize| {
            if a == derivative_axis {
                &second[a]
            } else {
                &smooth[a]
            }
        };
        let mut term = convolve_axis(volume, AXES[0], kernel(0));
        term = convolve_axis(&term, AXES[1], kernel(1));
        term = convolve_axis(&term, AXES[2], kernel(2));

        for (acc, &v) in laplacian.data_mut().iter_mut().zip(term.data()) {
            *acc += v;
        }
    }

    laplacian
}
