//! Numeric comparison helpers.
//!
//! [`approx_eq_eps`] is the single authority on "did this number change":
//! every float comparison in [`crate::delta`] routes through it, with
//! [`DEFAULT_EPSILON`] unless a caller overrides the tolerance.

/// Absolute tolerance used when no explicit epsilon is given.
pub const DEFAULT_EPSILON: f64 = 1e-6;

/// Clamp `v` into `[min, max]`.
///
/// Unlike [`f64::clamp`] this never panics when `min > max`; the lower bound
/// wins in that case.
pub fn clamp(v: f64, min: f64, max: f64) -> f64 {
    if v < min {
        min
    } else if v > max {
        max
    } else {
        v
    }
}

/// Linear interpolation. `t` is not bounds-checked, so values outside
/// `[0, 1]` extrapolate.
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// `|a - b| <= DEFAULT_EPSILON`.
pub fn approx_eq(a: f64, b: f64) -> bool {
    approx_eq_eps(a, b, DEFAULT_EPSILON)
}

/// `|a - b| <= eps`. NaN never compares equal.
pub fn approx_eq_eps(a: f64, b: f64, eps: f64) -> bool {
    (a - b).abs() <= eps
}

/// Element-wise [`approx_eq_eps`] plus length equality.
pub fn vec_approx_eq(a: &[f64], b: &[f64], eps: f64) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| approx_eq_eps(*x, *y, eps))
}

/// Compare two optional vectors: both absent is equal, one absent differs.
pub fn opt_vec_approx_eq(a: Option<&[f64]>, b: Option<&[f64]>, eps: f64) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => vec_approx_eq(a, b, eps),
        _ => false,
    }
}
