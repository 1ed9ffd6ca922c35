// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Exact rational durations.
//!
//! Spans, offsets and leaf durations are all fractions of a whole note.
//! Floating point never enters the search: every subdivision is computed
//! exactly so sibling durations always sum to their parent.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;

use num_rational::Ratio;
use num_traits::{One, Zero};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Error returned when a duration string cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseDurationError {
    #[error("Empty duration string")]
    Empty,
    #[error("Invalid integer in duration: {0:?}")]
    InvalidInteger(String),
    #[error("Zero denominator in duration: {0:?}")]
    ZeroDenominator(String),
}

/// An exact rational duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration(Ratio<i64>);

impl Duration {
    /// Create a duration of `numer / denom`, reduced to lowest terms.
    ///
    /// Panics if `denom` is zero.
    pub fn new(numer: i64, denom: i64) -> Self {
        Self(Ratio::new(numer, denom))
    }

    /// Create a duration, returning `None` for a zero denominator
    pub fn try_new(numer: i64, denom: i64) -> Option<Self> {
        if denom == 0 {
            None
        } else {
            Some(Self::new(numer, denom))
        }
    }

    /// Whole-number duration
    pub fn from_integer(value: i64) -> Self {
        Self(Ratio::from_integer(value))
    }

    pub fn zero() -> Self {
        Self(Ratio::zero())
    }

    pub fn one() -> Self {
        Self(Ratio::one())
    }

    /// Numerator in lowest terms
    pub fn numer(&self) -> i64 {
        *self.0.numer()
    }

    /// Denominator in lowest terms (always positive)
    pub fn denom(&self) -> i64 {
        *self.0.denom()
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.numer() > 0
    }

    pub fn is_negative(&self) -> bool {
        self.numer() < 0
    }

    pub fn abs(self) -> Self {
        if self.is_negative() {
            -self
        } else {
            self
        }
    }

    /// Nearest `f64` to this duration
    pub fn to_f64(&self) -> f64 {
        self.numer() as f64 / self.denom() as f64
    }

    /// Best rational approximation of a float, if one fits in `i64` terms
    pub fn from_f64(value: f64) -> Option<Self> {
        Ratio::<i64>::approximate_float(value).map(Self)
    }

    /// True when the denominator is 1, 2, 4, 8, ...
    pub fn has_power_of_two_denominator(&self) -> bool {
        (self.denom() as u64).is_power_of_two()
    }

    /// Access the underlying ratio
    pub fn as_ratio(&self) -> Ratio<i64> {
        self.0
    }
}

impl From<Ratio<i64>> for Duration {
    fn from(ratio: Ratio<i64>) -> Self {
        Self(ratio)
    }
}

impl From<i64> for Duration {
    fn from(value: i64) -> Self {
        Self::from_integer(value)
    }
}

impl From<(i64, i64)> for Duration {
    fn from((numer, denom): (i64, i64)) -> Self {
        Self::new(numer, denom)
    }
}

impl Add for Duration {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Duration {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Mul for Duration {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self(self.0 * rhs.0)
    }
}

impl Div for Duration {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        Self(self.0 / rhs.0)
    }
}

impl Mul<i64> for Duration {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self {
        Self(self.0 * rhs)
    }
}

impl Div<i64> for Duration {
    type Output = Self;

    fn div(self, rhs: i64) -> Self {
        Self(self.0 / rhs)
    }
}

impl Neg for Duration {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl AddAssign for Duration {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Duration {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Sum for Duration {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, d| acc + d)
    }
}

impl<'a> Sum<&'a Duration> for Duration {
    fn sum<I: Iterator<Item = &'a Duration>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, d| acc + *d)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denom() == 1 {
            write!(f, "{}", self.numer())
        } else {
            write!(f, "{}/{}", self.numer(), self.denom())
        }
    }
}

impl FromStr for Duration {
    type Err = ParseDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseDurationError::Empty);
        }

        let parse_int = |part: &str| {
            part.trim()
                .parse::<i64>()
                .map_err(|_| ParseDurationError::InvalidInteger(s.to_string()))
        };

        match s.split_once('/') {
            Some((numer, denom)) => {
                let numer = parse_int(numer)?;
                let denom = parse_int(denom)?;
                Self::try_new(numer, denom)
                    .ok_or_else(|| ParseDurationError::ZeroDenominator(s.to_string()))
            }
            None => Ok(Self::from_integer(parse_int(s)?)),
        }
    }
}

impl Serialize for Duration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct DurationVisitor;

impl<'de> Visitor<'de> for DurationVisitor {
    type Value = Duration;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a duration such as \"3/8\" or an integer")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Duration, E> {
        value.parse().map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Duration, E> {
        Ok(Duration::from_integer(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Duration, E> {
        i64::try_from(value)
            .map(Duration::from_integer)
            .map_err(|_| E::custom(format!("duration {} out of range", value)))
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DurationVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduces_to_lowest_terms() {
        let d = Duration::new(2, 8);
        assert_eq!(d.numer(), 1);
        assert_eq!(d.denom(), 4);
        assert_eq!(Duration::new(3, -6), Duration::new(-1, 2));
    }

    #[test]
    fn test_arithmetic() {
        let quarter = Duration::new(1, 4);
        let eighth = Duration::new(1, 8);
        let sixteenth = Duration::new(1, 16);

        assert_eq!(quarter + eighth + sixteenth, Duration::new(7, 16));
        assert_eq!(quarter - eighth, eighth);
        assert_eq!(quarter * eighth, Duration::new(1, 32));
        assert_eq!(quarter / eighth, Duration::from_integer(2));
        assert_eq!(quarter / 3, Duration::new(1, 12));
        assert_eq!(eighth * 3, Duration::new(3, 8));
        assert_eq!(-quarter, Duration::new(-1, 4));
        assert_eq!((-quarter).abs(), quarter);

        let total: Duration = [quarter, eighth, sixteenth].iter().sum();
        assert_eq!(total, Duration::new(7, 16));
    }

    #[test]
    fn test_ordering() {
        let mut durations = vec![Duration::new(1, 2), Duration::new(-1, 3), Duration::new(1, 3)];
        durations.sort();
        assert_eq!(
            durations,
            vec![Duration::new(-1, 3), Duration::new(1, 3), Duration::new(1, 2)]
        );
        assert!(Duration::new(1, 3) < Duration::new(34, 100));
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("3/8".parse::<Duration>().unwrap(), Duration::new(3, 8));
        assert_eq!(" 2 ".parse::<Duration>().unwrap(), Duration::from_integer(2));
        assert_eq!("-1/4".parse::<Duration>().unwrap(), Duration::new(-1, 4));
        assert_eq!("4/8".parse::<Duration>().unwrap().to_string(), "1/2");
        assert_eq!(Duration::from_integer(3).to_string(), "3");

        assert_eq!("".parse::<Duration>(), Err(ParseDurationError::Empty));
        assert!(matches!(
            "1/0".parse::<Duration>(),
            Err(ParseDurationError::ZeroDenominator(_))
        ));
        assert!(matches!(
            "a/4".parse::<Duration>(),
            Err(ParseDurationError::InvalidInteger(_))
        ));
    }

    #[test]
    fn test_float_conversion() {
        assert_eq!(Duration::new(1, 4).to_f64(), 0.25);
        assert_eq!(Duration::from_f64(0.5), Some(Duration::new(1, 2)));
        assert_eq!(Duration::from_f64(-0.375), Some(Duration::new(-3, 8)));

        let approx = Duration::from_f64(0.49).unwrap();
        assert!((approx.to_f64() - 0.49).abs() < 1e-12);
    }

    #[test]
    fn test_power_of_two_denominator() {
        assert!(Duration::new(1, 16).has_power_of_two_denominator());
        assert!(Duration::new(3, 1).has_power_of_two_denominator());
        assert!(!Duration::new(1, 12).has_power_of_two_denominator());
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&Duration::new(3, 8)).unwrap();
        assert_eq!(json, "\"3/8\"");

        let parsed: Duration = serde_json::from_str("\"3/8\"").unwrap();
        assert_eq!(parsed, Duration::new(3, 8));

        let integral: Duration = serde_json::from_str("2").unwrap();
        assert_eq!(integral, Duration::from_integer(2));

        let yaml: Duration = serde_yaml::from_str("1/12").unwrap();
        assert_eq!(yaml, Duration::new(1, 12));
    }
}
