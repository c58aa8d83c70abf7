//! Exact conversion between signed decimal degrees and EXIF degree/minute/second rationals.
//!
//! All arithmetic is carried out on arbitrary-precision rationals. The only
//! place values are rounded is where [`Precision`] says so: intermediate
//! minutes/seconds are held to a fixed number of significant digits, and
//! comparisons quantize both sides to a fixed number of decimal places.

use std::{fmt, ops::Neg, str::FromStr};

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

use crate::error::{GeotagError, Result};

/// Places printed for coordinates whose decimal expansion does not terminate.
const DISPLAY_PLACES: u32 = 20;

/// Exponent bound on parsed input, keeps `10^n` scaling sane.
const MAX_EXPONENT: i64 = 512;

/// Arithmetic precision handed explicitly to the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Precision {
    /// Significant digits kept for intermediate minutes and seconds.
    pub significant_digits: u32,
    /// Fractional digits compared when validating.
    pub decimal_places: u32,
}

impl Default for Precision {
    fn default() -> Self {
        Self {
            significant_digits: 20,
            decimal_places: 10,
        }
    }
}

/// A signed latitude or longitude in decimal degrees.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DecimalCoordinate(BigRational);

impl DecimalCoordinate {
    #[must_use]
    pub fn from_ratio(value: BigRational) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn as_ratio(&self) -> &BigRational {
        &self.0
    }

    #[must_use]
    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    /// Rounds to `places` fractional digits, ties away from zero. Inputs one
    /// unit apart never quantize to the same value.
    #[must_use]
    pub fn quantize(&self, places: u32) -> Self {
        let scale = pow10(i64::from(places));
        Self((&self.0 * &scale).round() / scale)
    }

    /// Renders with exactly `places` fractional digits.
    #[must_use]
    pub fn to_fixed(&self, places: u32) -> String {
        let scaled = (&self.0 * pow10(i64::from(places)))
            .round()
            .to_integer();
        let sign = if scaled.is_negative() { "-" } else { "" };
        let digits = scaled.abs().to_string();
        let places = places as usize;
        if places == 0 {
            return format!("{sign}{digits}");
        }
        let digits = format!("{digits:0>width$}", width = places + 1);
        let (int_part, frac_part) = digits.split_at(digits.len() - places);
        format!("{sign}{int_part}.{frac_part}")
    }
}

impl From<i64> for DecimalCoordinate {
    fn from(value: i64) -> Self {
        Self(BigRational::from_integer(BigInt::from(value)))
    }
}

impl Neg for DecimalCoordinate {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl FromStr for DecimalCoordinate {
    type Err = GeotagError;

    /// Parses plain decimal notation (`-77.302862`, `38`, `.5`, `1.5e-3`) exactly.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || GeotagError::InvalidDecimal {
            value: s.to_string(),
        };

        let trimmed = s.trim();
        let (negative, unsigned) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };

        let (mantissa, exponent) = match unsigned.find(|c: char| c == 'e' || c == 'E') {
            Some(idx) => (
                &unsigned[..idx],
                unsigned[idx + 1..].parse::<i64>().map_err(|_| invalid())?,
            ),
            None => (unsigned, 0),
        };

        let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part
            .bytes()
            .chain(frac_part.bytes())
            .all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let frac_len = i64::try_from(frac_part.len()).map_err(|_| invalid())?;
        let shift = exponent - frac_len;
        if shift.abs() > MAX_EXPONENT {
            return Err(invalid());
        }

        let digits: BigInt = format!("{int_part}{frac_part}")
            .parse()
            .map_err(|_| invalid())?;
        let value = BigRational::from_integer(digits) * pow10(shift);

        Ok(Self(if negative { -value } else { value }))
    }
}

impl fmt::Display for DecimalCoordinate {
    /// Exact when the expansion terminates, otherwise rounded.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let places = terminating_places(self.0.denom()).unwrap_or(DISPLAY_PLACES);
        f.write_str(&self.to_fixed(places))
    }
}

impl Serialize for DecimalCoordinate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// An unsigned EXIF-style rational, kept exactly as stored (not reduced).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Rational {
    pub numerator: u64,
    pub denominator: u64,
}

impl Rational {
    #[must_use]
    pub const fn new(numerator: u64, denominator: u64) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    #[must_use]
    pub const fn whole(value: u64) -> Self {
        Self::new(value, 1)
    }

    /// # Errors
    ///
    /// [`GeotagError::InvalidRational`] when the denominator is zero.
    pub fn to_ratio(self) -> Result<BigRational> {
        if self.denominator == 0 {
            return Err(GeotagError::InvalidRational);
        }
        Ok(BigRational::new(
            BigInt::from(self.numerator),
            BigInt::from(self.denominator),
        ))
    }

    fn from_ratio(value: &BigRational) -> Result<Self> {
        let out_of_range = || GeotagError::RationalOutOfRange {
            value: value.to_string(),
        };
        Ok(Self::new(
            value.numer().to_u64().ok_or_else(out_of_range)?,
            value.denom().to_u64().ok_or_else(out_of_range)?,
        ))
    }

    #[must_use]
    pub fn is_reduced(self) -> bool {
        self.denominator != 0 && gcd(self.numerator, self.denominator) == 1
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Unsigned degrees/minutes/seconds; the hemisphere is carried separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DmsRational {
    pub degrees: Rational,
    pub minutes: Rational,
    pub seconds: Rational,
}

impl fmt::Display for DmsRational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.degrees, self.minutes, self.seconds)
    }
}

/// Converts a signed decimal coordinate to its unsigned DMS form.
///
/// Degrees and minutes are truncated to whole numbers; seconds is the exact
/// remainder as a reduced fraction. The fractional minutes and the seconds
/// are held to `precision.significant_digits` (ties to even) before being
/// split. If that rounding reaches 60 seconds or 60 minutes, the excess is
/// carried into the next unit.
///
/// # Errors
///
/// [`GeotagError::RationalOutOfRange`] if a component does not fit in `u64`.
pub fn decimal_to_dms(value: &DecimalCoordinate, precision: &Precision) -> Result<DmsRational> {
    let sixty = BigRational::from_integer(BigInt::from(60));
    let digits = precision.significant_digits;

    let magnitude = value.0.abs();
    let mut degrees = magnitude.trunc();

    let minutes_exact = round_significant(&(magnitude.fract() * &sixty), digits);
    let mut minutes = minutes_exact.trunc();
    let mut seconds = round_significant(&(minutes_exact.fract() * &sixty), digits);

    if seconds >= sixty {
        seconds -= &sixty;
        minutes += BigRational::one();
    }
    if minutes >= sixty {
        minutes -= &sixty;
        degrees += BigRational::one();
    }

    Ok(DmsRational {
        degrees: Rational::from_ratio(&degrees)?,
        minutes: Rational::from_ratio(&minutes)?,
        seconds: Rational::from_ratio(&seconds)?,
    })
}

/// `degrees + minutes/60 + seconds/3600`, exactly. The result is unsigned.
///
/// # Errors
///
/// [`GeotagError::InvalidRational`] when any component has a zero denominator.
pub fn dms_to_decimal(dms: &DmsRational) -> Result<DecimalCoordinate> {
    let degrees = dms.degrees.to_ratio()?;
    let minutes = dms.minutes.to_ratio()?;
    let seconds = dms.seconds.to_ratio()?;

    let value = degrees
        + minutes / BigInt::from(60)
        + seconds / BigInt::from(3600);
    Ok(DecimalCoordinate(value))
}

/// Equal iff both values agree after quantizing to `places` fractional digits.
#[must_use]
pub fn compare_coordinates(a: &DecimalCoordinate, b: &DecimalCoordinate, places: u32) -> bool {
    a.quantize(places) == b.quantize(places)
}

/// Which coordinate a hemisphere reference applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Latitude,
    Longitude,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latitude => f.write_str("latitude"),
            Self::Longitude => f.write_str("longitude"),
        }
    }
}

/// Reference characters written for each axis.
///
/// The characters are fixed per deployment rather than derived from the sign
/// of each coordinate; a coordinate whose sign disagrees is stored under the
/// configured hemisphere anyway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HemispherePair {
    pub latitude: char,
    pub longitude: char,
}

impl Default for HemispherePair {
    fn default() -> Self {
        Self {
            latitude: 'N',
            longitude: 'W',
        }
    }
}

impl HemispherePair {
    #[must_use]
    pub fn reference(&self, axis: Axis) -> char {
        match axis {
            Axis::Latitude => self.latitude,
            Axis::Longitude => self.longitude,
        }
    }

    /// True when this axis' hemisphere maps to negative decimal degrees.
    #[must_use]
    pub fn is_negative(&self, axis: Axis) -> bool {
        matches!(self.reference(axis), 'S' | 'W')
    }

    /// Signs a magnitude according to the configured hemisphere.
    #[must_use]
    pub fn signed(&self, axis: Axis, magnitude: &DecimalCoordinate) -> DecimalCoordinate {
        let magnitude = magnitude.abs();
        if self.is_negative(axis) {
            -magnitude
        } else {
            magnitude
        }
    }

    /// True when `value`'s sign matches the configured hemisphere (zero always agrees).
    #[must_use]
    pub fn agrees_with(&self, axis: Axis, value: &DecimalCoordinate) -> bool {
        value.0.is_zero() || value.is_negative() == self.is_negative(axis)
    }

    /// # Errors
    ///
    /// [`GeotagError::Config`] unless latitude is `N`/`S` and longitude is `E`/`W`.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.latitude, 'N' | 'S') {
            return Err(GeotagError::Config(format!(
                "latitude hemisphere must be N or S, got {:?}",
                self.latitude
            )));
        }
        if !matches!(self.longitude, 'E' | 'W') {
            return Err(GeotagError::Config(format!(
                "longitude hemisphere must be E or W, got {:?}",
                self.longitude
            )));
        }
        Ok(())
    }
}

/// `10^exponent` as a rational; negative exponents give the reciprocal.
fn pow10(exponent: i64) -> BigRational {
    let magnitude = num_traits::pow(BigInt::from(10), exponent.unsigned_abs() as usize);
    if exponent >= 0 {
        BigRational::from_integer(magnitude)
    } else {
        BigRational::new(BigInt::one(), magnitude)
    }
}

/// `floor(log10(value))` for a positive rational.
fn decimal_exponent(value: &BigRational) -> i64 {
    let numer_len = value.numer().to_string().len() as i64;
    let denom_len = value.denom().to_string().len() as i64;
    let candidate = numer_len - denom_len;
    if *value >= pow10(candidate) {
        candidate
    } else {
        candidate - 1
    }
}

fn round_half_even(value: &BigRational) -> BigInt {
    let floor = value.floor();
    let remainder = value - &floor;
    let half = BigRational::new(BigInt::one(), BigInt::from(2));
    let floor = floor.to_integer();
    match remainder.cmp(&half) {
        std::cmp::Ordering::Less => floor,
        std::cmp::Ordering::Greater => floor + 1u32,
        std::cmp::Ordering::Equal => {
            if (&floor % 2u32).is_zero() {
                floor
            } else {
                floor + 1u32
            }
        }
    }
}

/// Rounds to `digits` significant digits, ties to even.
fn round_significant(value: &BigRational, digits: u32) -> BigRational {
    if value.is_zero() || digits == 0 {
        return value.clone();
    }
    let shift = i64::from(digits) - 1 - decimal_exponent(&value.abs());
    let rounded = BigRational::from_integer(round_half_even(&(value * pow10(shift))));
    rounded * pow10(-shift)
}

/// Fractional digits needed to print `1/denom` exactly, if finite.
fn terminating_places(denom: &BigInt) -> Option<u32> {
    let mut rest = denom.clone();
    let mut twos = 0u32;
    let mut fives = 0u32;
    while (&rest % 2u32).is_zero() {
        rest /= 2u32;
        twos += 1;
    }
    while (&rest % 5u32).is_zero() {
        rest /= 5u32;
        fives += 1;
    }
    rest.is_one().then(|| twos.max(fives))
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(s: &str) -> DecimalCoordinate {
        s.parse().unwrap()
    }

    fn dms(value: &str) -> DmsRational {
        decimal_to_dms(&coord(value), &Precision::default()).unwrap()
    }

    #[test]
    fn parse_decimal_forms() {
        assert_eq!(coord("38.5").to_string(), "38.5");
        assert_eq!(coord("-77.302862").to_string(), "-77.302862");
        assert_eq!(coord("+12").to_string(), "12");
        assert_eq!(coord(".25").to_string(), "0.25");
        assert_eq!(coord("1.5e-3").to_string(), "0.0015");
        assert_eq!(coord("  42.0  "), DecimalCoordinate::from(42_i64));
    }

    #[test]
    fn parse_rejects_garbage() {
        for bad in ["", "-", ".", "abc", "1.2.3", "12a", "1e", "--1", "1e99999"] {
            assert!(
                matches!(
                    bad.parse::<DecimalCoordinate>(),
                    Err(GeotagError::InvalidDecimal { .. })
                ),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn latitude_to_dms() {
        let result = dms("38.529057");
        assert_eq!(result.degrees, Rational::whole(38));
        assert_eq!(result.minutes, Rational::whole(31));
        // 0.74342' * 60 = 44.6052"
        assert_eq!(result.seconds, Rational::new(111_513, 2_500));
    }

    #[test]
    fn sign_is_dropped() {
        assert_eq!(dms("-77.302862"), dms("77.302862"));
        let result = dms("-77.302862");
        assert_eq!(result.degrees, Rational::whole(77));
        assert_eq!(result.minutes, Rational::whole(18));
        // 0.17172' * 60 = 10.3032"
        assert_eq!(result.seconds, Rational::new(12_879, 1_250));
    }

    #[test]
    fn whole_degrees_have_zero_seconds() {
        let result = dms("45");
        assert_eq!(result.minutes, Rational::whole(0));
        assert_eq!(result.seconds, Rational::new(0, 1));
    }

    #[test]
    fn round_trip_ten_places() {
        for value in [
            "0",
            "0.0000000001",
            "38.529057",
            "-77.302862",
            "89.9999999999",
            "-179.9999999999",
            "12.3456789012",
            "0.5",
            "-0.0000000007",
            "179.0000000001",
        ] {
            let original = coord(value);
            let back = dms_to_decimal(&dms(value)).unwrap();
            assert_eq!(back, original.abs(), "round trip of {value}");
            assert!(compare_coordinates(&back, &original.abs(), 10));
        }
    }

    #[test]
    fn round_trip_sweep_below_180_degrees() {
        // Stride through [0, 180) at ten fractional digits; the stride is
        // coprime to the range so every step lands on a fresh value.
        const RANGE: u64 = 1_800_000_000_000;
        const STRIDE: u64 = 7_919_000_003;
        let scale = pow10(10);

        for i in 0..2_000_u64 {
            let units = (i * STRIDE + 12_345) % RANGE;
            let magnitude = BigRational::from_integer(BigInt::from(units)) / &scale;
            let value = if i % 2 == 0 {
                DecimalCoordinate::from_ratio(magnitude)
            } else {
                DecimalCoordinate::from_ratio(-magnitude)
            };

            let result = decimal_to_dms(&value, &Precision::default()).unwrap();
            assert_eq!(result.degrees.denominator, 1, "{value}");
            assert_eq!(result.minutes.denominator, 1, "{value}");
            assert!(result.minutes.numerator < 60, "{value}");
            assert!(result.seconds.is_reduced(), "{value}: {}", result.seconds);

            let back = dms_to_decimal(&result).unwrap();
            assert_eq!(back, value.abs(), "round trip of {value}");
            assert!(compare_coordinates(&back, &value.abs(), 10));
        }
    }

    #[test]
    fn seconds_are_reduced_and_nonzero_denominator() {
        for value in ["38.529057", "1.1", "0.123456789", "-33.3333333333", "100.0000000005"] {
            let result = dms(value);
            assert!(result.seconds.denominator > 0);
            assert!(result.seconds.is_reduced(), "{value}: {}", result.seconds);
            assert_eq!(result.degrees.denominator, 1);
            assert_eq!(result.minutes.denominator, 1);
        }
    }

    #[test]
    fn ten_place_inputs_fit_exif_width() {
        let result = dms("179.9999999999");
        assert!(result.seconds.numerator <= u64::from(u32::MAX));
        assert!(result.seconds.denominator <= u64::from(u32::MAX));
    }

    #[test]
    fn working_precision_rounds_intermediates() {
        // 19.999...98 minutes rounds to 20 at five significant digits
        let value = coord("0.3333333333333333333333333");
        let narrow = Precision {
            significant_digits: 5,
            ..Precision::default()
        };
        let result = decimal_to_dms(&value, &narrow).unwrap();
        assert_eq!(result.minutes, Rational::whole(20));
        assert_eq!(result.seconds, Rational::new(0, 1));
    }

    #[test]
    fn rounding_carries_into_minutes_and_degrees() {
        let value = coord("10.99999999999999999999999");
        let result = decimal_to_dms(&value, &Precision::default()).unwrap();
        assert_eq!(result.degrees, Rational::whole(11));
        assert_eq!(result.minutes, Rational::whole(0));
        assert_eq!(result.seconds, Rational::new(0, 1));
    }

    #[test]
    fn dms_to_decimal_rejects_zero_denominator() {
        let broken = DmsRational {
            degrees: Rational::whole(38),
            minutes: Rational::whole(31),
            seconds: Rational::new(446_052, 0),
        };
        assert!(matches!(
            dms_to_decimal(&broken),
            Err(GeotagError::InvalidRational)
        ));
    }

    #[test]
    fn dms_to_decimal_accepts_unreduced_and_fractional_components() {
        let value = DmsRational {
            degrees: Rational::new(3_850, 100),
            minutes: Rational::new(60, 2),
            seconds: Rational::new(446_052, 10_000),
        };
        let expected = coord("38.5").as_ratio()
            + coord("0.5").as_ratio()
            + coord("44.6052").as_ratio().clone() / BigInt::from(3600);
        assert_eq!(
            dms_to_decimal(&value).unwrap(),
            DecimalCoordinate::from_ratio(expected)
        );
    }

    #[test]
    fn compare_is_reflexive_and_symmetric() {
        let a = coord("38.529057");
        let b = coord("38.52905700000000001");
        assert!(compare_coordinates(&a, &a, 10));
        assert!(compare_coordinates(&a, &b, 10));
        assert!(compare_coordinates(&b, &a, 10));
    }

    #[test]
    fn compare_detects_last_place_difference() {
        let a = coord("38.5290570000");
        let b = coord("38.5290570001");
        assert!(!compare_coordinates(&a, &b, 10));
        assert!(!compare_coordinates(&b, &a, 10));

        // ties round away from zero, so a full unit apart never collapses
        let c = coord("0.00000000015");
        let d = coord("0.00000000025");
        assert!(!compare_coordinates(&c, &d, 10));
    }

    #[test]
    fn compare_absorbs_sub_unit_noise() {
        let a = coord("-77.30286200000000000001");
        let b = coord("-77.302862");
        assert!(compare_coordinates(&a, &b, 10));
    }

    #[test]
    fn to_fixed_pads() {
        assert_eq!(coord("0.05").to_fixed(3), "0.050");
        assert_eq!(coord("-0.0004").to_fixed(3), "0.000");
        assert_eq!(coord("12.5").to_fixed(0), "13");
        assert_eq!(coord("-0.05").to_fixed(1), "-0.1");
    }

    #[test]
    fn non_terminating_display_is_rounded() {
        let third = DecimalCoordinate::from_ratio(BigRational::new(BigInt::one(), BigInt::from(3)));
        assert_eq!(third.to_string(), "0.33333333333333333333");
    }

    #[test]
    fn hemisphere_defaults_and_signing() {
        let pair = HemispherePair::default();
        assert_eq!(pair.reference(Axis::Latitude), 'N');
        assert_eq!(pair.reference(Axis::Longitude), 'W');
        assert_eq!(pair.signed(Axis::Longitude, &coord("77.3")), coord("-77.3"));
        assert_eq!(pair.signed(Axis::Longitude, &coord("-77.3")), coord("-77.3"));
        assert_eq!(pair.signed(Axis::Latitude, &coord("-38.5")), coord("38.5"));
        assert!(pair.agrees_with(Axis::Longitude, &coord("-77.3")));
        assert!(!pair.agrees_with(Axis::Longitude, &coord("77.3")));
        assert!(pair.agrees_with(Axis::Latitude, &coord("0")));
    }

    #[test]
    fn hemisphere_validation() {
        assert!(HemispherePair::default().validate().is_ok());
        let bad = HemispherePair {
            latitude: 'E',
            longitude: 'W',
        };
        assert!(matches!(bad.validate(), Err(GeotagError::Config(_))));
    }
}
