//! Rules for the unit triangle with vertices `(0, 0)`, `(1, 0)` and `(0, 1)`.

use crate::univariate::gauss;
use crate::{gauss_points_for_strength, Error, Rule2d};

/// A collapsed (Duffy) rule on the unit triangle that integrates polynomials of total degree
/// `strength` exactly.
///
/// The square `[0, 1]^2` is mapped onto the triangle by `(u, v) -> (u, v (1 - u))`, whose
/// Jacobian determinant is `1 - u`. A polynomial of degree `p` becomes a polynomial of degree at
/// most `p + 1` in `u` and `p` in `v`, and the tensor Gauss rule is chosen accordingly.
pub fn triangle(strength: usize) -> Result<Rule2d, Error> {
    let n_u = gauss_points_for_strength(strength + 1)?;
    let n_v = gauss_points_for_strength(strength)?;
    let (wu, pu) = gauss(n_u);
    let (wv, pv) = gauss(n_v);

    let mut weights = Vec::with_capacity(n_u * n_v);
    let mut points = Vec::with_capacity(n_u * n_v);
    for (w_i, [u]) in wu.iter().zip(&pu) {
        for (w_j, [v]) in wv.iter().zip(&pv) {
            weights.push(w_i * w_j * (1.0 - u));
            points.push([*u, v * (1.0 - u)]);
        }
    }
    Ok((weights, points))
}
