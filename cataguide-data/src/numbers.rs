//! Numeric conversion helpers centralizing safe numeric casts.

use num_traits::cast::cast;

/// Clamp a probability into `[0, 1]`, returning 0.0 for non-finite values.
#[must_use]
pub fn clamp_probability(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Convert a percentage chance into a probability in `[0, 1]`.
#[must_use]
pub fn percent_to_probability(percent: f64) -> f64 {
    clamp_probability(percent / 100.0)
}

/// Round a f64 and clamp it to the u32 range, returning 0 for non-finite or negative values.
#[must_use]
pub fn round_f64_to_u32(value: f64) -> u32 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    let max = cast::<u32, f64>(u32::MAX).unwrap_or(f64::MAX);
    cast::<f64, u32>(value.min(max).round()).unwrap_or(0)
}

/// Round a f64 and clamp it to the i64 range, returning 0 for non-finite values.
#[must_use]
pub fn round_f64_to_i64(value: f64) -> i64 {
    if !value.is_finite() {
        return 0;
    }
    let min = cast::<i64, f64>(i64::MIN).unwrap_or(f64::MIN);
    let max = cast::<i64, f64>(i64::MAX).unwrap_or(f64::MAX);
    cast::<f64, i64>(value.clamp(min, max).round()).unwrap_or(0)
}

/// Convert u32 to f64 (lossless).
#[must_use]
pub fn u32_to_f64(value: u32) -> f64 {
    f64::from(value)
}

/// Convert u64 to f64 while allowing precision loss in a single location.
#[must_use]
pub fn u64_to_f64(value: u64) -> f64 {
    cast::<u64, f64>(value).unwrap_or(0.0)
}

/// Convert u32 to i32 for `powi`, saturating at `i32::MAX`.
#[must_use]
pub fn u32_to_i32_saturating(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_handles_non_finite() {
        assert!(clamp_probability(f64::NAN).abs() < f64::EPSILON);
        assert!((clamp_probability(f64::INFINITY)).abs() < f64::EPSILON);
        assert!((clamp_probability(1.7) - 1.0).abs() < f64::EPSILON);
        assert!(clamp_probability(-0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn percent_conversion_saturates() {
        assert!((percent_to_probability(50.0) - 0.5).abs() < f64::EPSILON);
        assert!((percent_to_probability(250.0) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rounders_cover_ranges() {
        assert_eq!(round_f64_to_u32(2.6), 3);
        assert_eq!(round_f64_to_u32(-4.0), 0);
        assert_eq!(round_f64_to_u32(f64::NAN), 0);
        assert_eq!(round_f64_to_u32(1e20), u32::MAX);
        assert_eq!(round_f64_to_i64(-2.4), -2);
        assert_eq!(round_f64_to_i64(f64::INFINITY), 0);
    }

    #[test]
    fn widening_casts_are_exact_for_small_values() {
        assert!((u32_to_f64(7) - 7.0).abs() < f64::EPSILON);
        assert!((u64_to_f64(9) - 9.0).abs() < f64::EPSILON);
        assert_eq!(u32_to_i32_saturating(u32::MAX), i32::MAX);
    }
}
