//! Gauss-Legendre rules for the unit interval `[0, 1]`.

use crate::{gauss_points_for_strength, Error, Rule1d};
use nalgebra::{DMatrix, SymmetricEigen};

/// Gauss-Legendre quadrature on `[0, 1]` with the given number of points.
///
/// Nodes and weights are computed with the Golub-Welsch algorithm: the nodes on `[-1, 1]` are the
/// eigenvalues of the symmetric tridiagonal Jacobi matrix of the Legendre recurrence, and each
/// weight is twice the square of the first component of the corresponding normalized eigenvector.
/// Points are returned in increasing order. An `n`-point rule integrates polynomials of degree up
/// to `2n - 1` exactly.
///
/// # Panics
///
/// Panics if zero points are requested.
pub fn gauss(num_points: usize) -> Rule1d {
    let n = num_points;
    assert!(n > 0, "number of points must be positive");

    let mut jacobi = DMatrix::zeros(n, n);
    for k in 1..n {
        let k_f = k as f64;
        let beta = k_f / (4.0 * k_f * k_f - 1.0).sqrt();
        jacobi[(k, k - 1)] = beta;
        jacobi[(k - 1, k)] = beta;
    }

    let eigen = SymmetricEigen::new(jacobi);
    let mut pairs: Vec<(f64, f64)> = (0..n)
        .map(|i| {
            let x = eigen.eigenvalues[i];
            let v0 = eigen.eigenvectors[(0, i)];
            (x, 2.0 * v0 * v0)
        })
        .collect();
    pairs.sort_by(|(a, _), (b, _)| a.total_cmp(b));

    // Map from [-1, 1] to [0, 1]
    let weights = pairs.iter().map(|(_, w)| 0.5 * w).collect();
    let points = pairs.iter().map(|(x, _)| [0.5 * (x + 1.0)]).collect();
    (weights, points)
}

/// Gauss-Legendre quadrature on `[0, 1]` that integrates polynomials of degree `strength` exactly.
pub fn gauss_for_strength(strength: usize) -> Result<Rule1d, Error> {
    Ok(gauss(gauss_points_for_strength(strength)?))
}
