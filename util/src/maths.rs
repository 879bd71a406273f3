//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Tolerance under which a value is considered to be zero.
pub const ZERO_TOLERANCE: f64 = 1e-9;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Returns true if the value is within `ZERO_TOLERANCE` of zero.
pub fn is_zero<T>(value: T) -> bool
where
    T: Float
{
    value.abs() < tolerance()
}

/// Returns true if the value is greater than or equal to `ZERO_TOLERANCE`.
pub fn is_positive<T>(value: T) -> bool
where
    T: Float
{
    value >= tolerance()
}

/// Returns true if the value is less than or equal to `-ZERO_TOLERANCE`.
pub fn is_negative<T>(value: T) -> bool
where
    T: Float
{
    value <= -tolerance::<T>()
}

/// Square root which returns zero for negative (or NaN) arguments rather than
/// NaN.
pub fn safe_sqrt<T>(value: T) -> T
where
    T: Float
{
    let ret = value.sqrt();

    if ret.is_nan() {
        T::zero()
    }
    else {
        ret
    }
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
///
/// This function is taken from the std library as num is missing it.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float
{
    let r = lhs % rhs;
    if r < T::zero() { r + rhs.abs() } else { r }
}

/// Wrap any angle into the range [0, 2pi).
pub fn wrap_2pi<T>(value: T) -> T
where
    T: Float
{
    let tau_t: T = T::from(std::f64::consts::TAU).unwrap_or_else(T::zero);

    let wrapped = rem_euclid(value, tau_t);

    // Round-off can land exactly on tau for tiny negative inputs
    if wrapped >= tau_t {
        T::zero()
    }
    else {
        wrapped
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn tolerance<T: Float>() -> T {
    T::from(ZERO_TOLERANCE).unwrap_or_else(T::epsilon)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_wrap_2pi() {
        const PI: f64 = std::f64::consts::PI;

        assert!((wrap_2pi(-PI / 2.0) - 1.5 * PI).abs() < 1e-12);
        assert!((wrap_2pi(5.0 * PI) - PI).abs() < 1e-12);
        assert_eq!(wrap_2pi(0f64), 0f64);
    }

    #[test]
    fn test_safe_sqrt() {
        assert_eq!(safe_sqrt(-4f64), 0f64);
        assert_eq!(safe_sqrt(4f64), 2f64);
    }

    #[test]
    fn test_sign_checks() {
        assert!(is_zero(1e-12f64));
        assert!(!is_positive(1e-12f64));
        assert!(is_positive(0.1f64));
        assert!(is_negative(-0.1f64));
        assert!(!is_negative(0f64));

        // The tolerance itself counts as non-zero
        assert!(is_positive(ZERO_TOLERANCE));
        assert!(is_negative(-ZERO_TOLERANCE));
        assert!(!is_positive(0.5 * ZERO_TOLERANCE));
    }
}
