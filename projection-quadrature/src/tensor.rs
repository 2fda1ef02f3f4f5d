//! Tensor-product rules for the unit square `[0, 1]^2`.

use crate::univariate::gauss;
use crate::{gauss_points_for_strength, Error, Rule2d};

/// Tensor-product Gauss rule with the given number of points in each direction.
pub fn quadrilateral_gauss(points_x: usize, points_y: usize) -> Rule2d {
    let (wx, px) = gauss(points_x);
    let (wy, py) = gauss(points_y);

    let mut weights = Vec::with_capacity(points_x * points_y);
    let mut points = Vec::with_capacity(points_x * points_y);
    for (w_j, [y]) in wy.iter().zip(&py) {
        for (w_i, [x]) in wx.iter().zip(&px) {
            weights.push(w_i * w_j);
            points.push([*x, *y]);
        }
    }
    (weights, points)
}

/// A quadrilateral rule that integrates polynomials of total degree `strength` exactly.
///
/// Since the tensor rule is exact for every monomial `x^a y^b` with `a, b <= strength`, it is in
/// particular exact for total degree `strength`.
pub fn quadrilateral(strength: usize) -> Result<Rule2d, Error> {
    let n = gauss_points_for_strength(strength)?;
    Ok(quadrilateral_gauss(n, n))
}
