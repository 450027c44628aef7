//! Bounded random perturbation of numeric values.
//!
//! Integers move by at most `|v| / 100 * percent` in a random direction; if
//! the chosen direction would leave the type's range the opposite direction
//! is used. Floats and decimals move by a random fraction of their magnitude,
//! in steps of 0.01 percent.

use crate::Result;
use crate::catalog::IntWidth;
use crate::error::ObfuscatorError;
use rand::Rng;

/// Largest number of 0.01 % steps a float may move (100 %)
const BASIS_POINTS_PER_UNIT: f64 = 10_000.0;

pub(super) fn parse_signed(text: &str, declared_type: &str, width: IntWidth) -> Result<i64> {
    let value: i64 = text
        .trim()
        .parse()
        .map_err(|e| ObfuscatorError::conversion(text, declared_type, e))?;
    let (lower, upper) = width.signed_bounds();
    if !(lower..=upper).contains(&value) {
        return Err(ObfuscatorError::conversion(
            text,
            declared_type,
            format!("value outside [{}, {}]", lower, upper),
        ));
    }
    Ok(value)
}

pub(super) fn parse_unsigned(text: &str, declared_type: &str, width: IntWidth) -> Result<u64> {
    let value: u64 = text
        .trim()
        .parse()
        .map_err(|e| ObfuscatorError::conversion(text, declared_type, e))?;
    let upper = width.unsigned_max();
    if value > upper {
        return Err(ObfuscatorError::conversion(
            text,
            declared_type,
            format!("value outside [0, {}]", upper),
        ));
    }
    Ok(value)
}

/// Parses a finite float, optionally rejecting magnitudes above `max_abs`.
pub(super) fn parse_float(text: &str, declared_type: &str, max_abs: Option<f64>) -> Result<f64> {
    let value: f64 = text
        .trim()
        .parse()
        .map_err(|e| ObfuscatorError::conversion(text, declared_type, e))?;
    if !value.is_finite() {
        return Err(ObfuscatorError::conversion(text, declared_type, "value is not finite"));
    }
    if max_abs.is_some_and(|max| value.abs() > max) {
        return Err(ObfuscatorError::conversion(text, declared_type, "value out of range"));
    }
    Ok(value)
}

pub(super) fn perturb_signed<R>(value: i64, bounds: (i64, i64), percent: u8, rng: &mut R) -> i64
where
    R: Rng + ?Sized,
{
    let add_first = rng.random_bool(0.5);
    let max_dispersion = (value.unsigned_abs() / 100).saturating_mul(u64::from(percent));
    let dispersion = rng.random_range(0..=max_dispersion);
    shift_signed(value, dispersion, bounds, add_first)
}

fn shift_signed(value: i64, dispersion: u64, (lower, upper): (i64, i64), add_first: bool) -> i64 {
    let added = value
        .checked_add_unsigned(dispersion)
        .filter(|v| *v <= upper);
    let subtracted = value
        .checked_sub_unsigned(dispersion)
        .filter(|v| *v >= lower);

    let moved = if add_first {
        added.or(subtracted)
    } else {
        subtracted.or(added)
    };
    // One direction always fits while the dispersion stays within |value|
    moved.unwrap_or(value)
}

pub(super) fn perturb_unsigned<R>(value: u64, upper: u64, percent: u8, rng: &mut R) -> u64
where
    R: Rng + ?Sized,
{
    let add_first = rng.random_bool(0.5);
    let max_dispersion = (value / 100).saturating_mul(u64::from(percent));
    let dispersion = rng.random_range(0..=max_dispersion);
    shift_unsigned(value, dispersion, upper, add_first)
}

/// Same policy as [`shift_signed`] with a lower bound of zero.
fn shift_unsigned(value: u64, dispersion: u64, upper: u64, add_first: bool) -> u64 {
    let added = value.checked_add(dispersion).filter(|v| *v <= upper);
    let subtracted = value.checked_sub(dispersion);

    let moved = if add_first {
        added.or(subtracted)
    } else {
        subtracted.or(added)
    };
    moved.unwrap_or(value)
}

/// Moves `value` by up to `percent` of its magnitude.
///
/// With `exclusive_bound`, a move that would reach `±bound` flips direction.
/// The result is not rounded.
pub(super) fn perturb_float<R>(value: f64, exclusive_bound: Option<f64>, percent: u8, rng: &mut R) -> f64
where
    R: Rng + ?Sized,
{
    let add_first = rng.random_bool(0.5);
    let steps = rng.random_range(0..=u32::from(percent).saturating_mul(100));
    let delta = value.abs() * f64::from(steps) / BASIS_POINTS_PER_UNIT;

    let added = value + delta;
    let subtracted = value - delta;

    match exclusive_bound {
        Some(bound) if add_first && added >= bound => subtracted,
        Some(bound) if !add_first && subtracted <= -bound => added,
        _ if add_first => added,
        _ => subtracted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_signed_extremes_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for width in [IntWidth::Tiny, IntWidth::Small, IntWidth::Medium, IntWidth::Regular, IntWidth::Big] {
            let (lower, upper) = width.signed_bounds();
            for _ in 0..200 {
                let high = perturb_signed(upper, (lower, upper), 100, &mut rng);
                let low = perturb_signed(lower, (lower, upper), 100, &mut rng);
                assert!((lower..=upper).contains(&high), "{:?}: {}", width, high);
                assert!((lower..=upper).contains(&low), "{:?}: {}", width, low);
            }
        }
    }

    #[test]
    fn test_unsigned_extremes_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(11);
        for width in [IntWidth::Tiny, IntWidth::Regular, IntWidth::Big] {
            let upper = width.unsigned_max();
            for _ in 0..200 {
                assert!(perturb_unsigned(upper, upper, 100, &mut rng) <= upper);
                assert_eq!(perturb_unsigned(0, upper, 100, &mut rng), 0);
            }
        }
    }

    #[test]
    fn test_small_integers_are_unchanged() {
        // |v| / 100 truncates to zero below 100
        let mut rng = StdRng::seed_from_u64(3);
        for value in [-99_i64, -1, 0, 1, 42, 99] {
            assert_eq!(perturb_signed(value, IntWidth::Tiny.signed_bounds(), 50, &mut rng), value);
        }
    }

    #[test]
    fn test_shift_flips_direction_at_bounds() {
        let tiny = IntWidth::Tiny.signed_bounds();
        assert_eq!(shift_signed(120, 10, tiny, true), 110);
        assert_eq!(shift_signed(-120, 10, tiny, false), -110);
        assert_eq!(shift_signed(50, 10, tiny, true), 60);
        assert_eq!(shift_signed(50, 10, tiny, false), 40);
        assert_eq!(shift_signed(i64::MIN, 5, IntWidth::Big.signed_bounds(), false), i64::MIN + 5);
    }

    #[test]
    fn test_unsigned_subtract_mirrors_signed_policy() {
        // Unreachable for percent <= 100, but subtracting past zero must flip
        // to an add instead of wrapping.
        assert_eq!(shift_unsigned(100, 150, 255, false), 250);
        assert_eq!(shift_unsigned(250, 10, 255, true), 240);
        assert_eq!(shift_unsigned(u64::MAX, 1, u64::MAX, true), u64::MAX - 1);
    }

    #[test]
    fn test_zero_percent_is_identity() {
        let mut rng = StdRng::seed_from_u64(5);
        assert_eq!(perturb_signed(123_456, IntWidth::Regular.signed_bounds(), 0, &mut rng), 123_456);
        assert_eq!(perturb_unsigned(987, 1_000, 0, &mut rng), 987);
        assert_eq!(perturb_float(2.5, None, 0, &mut rng), 2.5);
    }

    #[test]
    fn test_float_moves_within_dispersion() {
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..500 {
            let moved = perturb_float(-250.0, None, 10, &mut rng);
            assert!((moved - -250.0).abs() <= 25.0 + f64::EPSILON, "{}", moved);
        }
    }

    #[test]
    fn test_decimal_bound_flips_direction() {
        let mut rng = StdRng::seed_from_u64(13);
        for _ in 0..500 {
            let high = perturb_float(99.99, Some(100.0), 100, &mut rng);
            let low = perturb_float(-99.99, Some(100.0), 100, &mut rng);
            assert!(high < 100.0 && high > -100.0, "{}", high);
            assert!(low < 100.0 && low > -100.0, "{}", low);
        }
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        assert!(parse_signed("128", "tinyint", IntWidth::Tiny).is_err());
        assert_eq!(parse_signed(" -128 ", "tinyint", IntWidth::Tiny).unwrap(), -128);
        assert!(parse_unsigned("-1", "int unsigned", IntWidth::Regular).is_err());
        assert!(parse_unsigned("256", "tinyint unsigned", IntWidth::Tiny).is_err());
        assert!(parse_float("abc", "double", None).is_err());
        assert!(parse_float("NaN", "double", None).is_err());
        assert!(parse_float("1e39", "float", Some(f64::from(f32::MAX))).is_err());
        assert_eq!(parse_float("1.25", "double", None).unwrap(), 1.25);
    }
}
