//! Minimum-cost bipartite assignment (Hungarian algorithm).
//!
//! Shortest augmenting paths with row/column potentials, O(n²·m) for an
//! `n × m` matrix with `n <= m`. Taller matrices are solved transposed.

use nalgebra::DMatrix;

use crate::error::{Error, Result};

/// Optimal one-to-one assignment minimizing the total cost.
///
/// Returns `min(rows, cols)` `(row, col)` pairs sorted by row. Every cost must
/// be finite.
pub fn linear_sum_assignment(cost: &DMatrix<f64>) -> Result<Vec<(usize, usize)>> {
    if cost.iter().any(|c| !c.is_finite()) {
        return Err(Error::DegenerateFit("non-finite assignment cost"));
    }
    let (rows, cols) = cost.shape();
    if rows == 0 || cols == 0 {
        return Ok(Vec::new());
    }

    if rows > cols {
        let mut pairs: Vec<(usize, usize)> = solve(&cost.transpose())
            .into_iter()
            .map(|(c, r)| (r, c))
            .collect();
        pairs.sort_unstable();
        return Ok(pairs);
    }
    Ok(solve(cost))
}

/// Requires `rows <= cols`. Indices inside are 1-based; slot 0 is the virtual start.
fn solve(cost: &DMatrix<f64>) -> Vec<(usize, usize)> {
    let (n, m) = cost.shape();
    let mut u = vec![0.0; n + 1];
    let mut v = vec![0.0; m + 1];
    // p[j]: row assigned to column j.
    let mut p = vec![0usize; m + 1];
    let mut way = vec![0usize; m + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0;
        let mut min_v = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];

        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0;
            for j in 1..=m {
                if used[j] {
                    continue;
                }
                let reduced = cost[(i0 - 1, j - 1)] - u[i0] - v[j];
                if reduced < min_v[j] {
                    min_v[j] = reduced;
                    way[j] = j0;
                }
                if min_v[j] < delta {
                    delta = min_v[j];
                    j1 = j;
                }
            }
            for j in 0..=m {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    min_v[j] -= delta;
                }
            }
            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        // Augment along the alternating path.
        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut pairs: Vec<(usize, usize)> = (1..=m)
        .filter(|&j| p[j] != 0)
        .map(|j| (p[j] - 1, j - 1))
        .collect();
    pairs.sort_unstable();
    pairs
}
