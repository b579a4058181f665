//! Numeric utilities: centralized integer conversions.
//!
//! Fallible conversions return `Option` so out-of-range values stop the operation instead of
//! truncating.

#[inline]
#[must_use]
pub fn i64_to_usize(v: i64) -> Option<usize> {
    usize::try_from(v).ok()
}

#[inline]
#[must_use]
pub fn usize_to_i64(v: usize) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

#[inline]
#[must_use]
pub fn usize_to_u64(v: usize) -> u64 {
    u64::try_from(v).unwrap_or(u64::MAX)
}

/// Whole-number view of a finite double, if it has no fractional part and fits an `i64`.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn f64_to_i64_exact(v: f64) -> Option<i64> {
    if !v.is_finite() || v.fract() != 0.0 || v < i64::MIN as f64 || v >= i64::MAX as f64 {
        return None;
    }
    Some(v as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        assert_eq!(i64_to_usize(-1), None);
        assert_eq!(i64_to_usize(3), Some(3));
        assert_eq!(usize_to_i64(7), 7);
        assert_eq!(usize_to_u64(7), 7);
        assert_eq!(f64_to_i64_exact(4.0), Some(4));
        assert_eq!(f64_to_i64_exact(4.5), None);
        assert_eq!(f64_to_i64_exact(f64::NAN), None);
    }
}
