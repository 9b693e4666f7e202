use crate::HfError;

/// Floating point type used for every flow value.
pub type Real = f64;

/// Marker for a flow that has not been computed yet.
///
/// NaN never compares equal to anything, so test it with [`is_no_flow`].
pub const NO_FLOW: Real = Real::NAN;

/// True if `v` is the `NO_FLOW` marker.
pub fn is_no_flow(v: Real) -> bool {
    v.is_nan()
}

/// One tolerance for everything
#[derive(Clone, Copy, Debug)]
pub struct Tolerances {
    pub abs: Real,
    pub rel: Real,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            abs: 1e-12,
            rel: 1e-9,
        }
    }
}

pub fn nearly_equal(a: Real, b: Real, tol: Tolerances) -> bool {
    let diff = (a - b).abs();
    if diff <= tol.abs {
        return true;
    }
    diff <= tol.rel * a.abs().max(b.abs())
}

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, HfError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(HfError::NonFinite { what, value: v })
    }
}
