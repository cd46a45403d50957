// SPDX-FileCopyrightText: 2025 2025 Contributors to the AVCodec buffer manager project.
// SPDX-License-Identifier: Apache-2.0

//! Range (`"<min>-<max>"`) and size (`"<width>x<height>"`) tokens.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Error, Result};

/// Closed integer interval `[min, max]` with `min <= max`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Range {
    pub min: i32,
    pub max: i32,
}

impl Range {
    /// Every positive value.
    pub const POSITIVE: Range = Range {
        min: 1,
        max: i32::MAX,
    };

    /// Creates a range, rejecting `min > max`.
    pub fn new(min: i32, max: i32) -> Result<Self> {
        if min > max {
            return Err(Error::IllegalArgument(format!(
                "range minimum {min} exceeds maximum {max}"
            )));
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, value: i32) -> bool {
        self.min <= value && value <= self.max
    }

    /// Floating point containment with a tolerance on both bounds.
    pub fn contains_f64(&self, value: f64, epsilon: f64) -> bool {
        let below = (self.min as f64) > value && (self.min as f64 - value).abs() >= epsilon;
        let above = (self.max as f64) < value && (self.max as f64 - value).abs() >= epsilon;
        !below && !above
    }

    /// Intersection of two ranges. Disjoint ranges keep `self` unchanged.
    pub fn intersect(&self, other: Range) -> Range {
        let min = self.min.max(other.min);
        let max = self.max.min(other.max);
        if min > max {
            tracing::debug!("Ranges {} and {} do not intersect", self, other);
            return *self;
        }
        Range { min, max }
    }

    /// Divides both ends by `divisor`, rounding the minimum up.
    pub(crate) fn div(&self, divisor: i32) -> Range {
        if divisor <= 1 {
            return *self;
        }
        Range {
            min: div_ceil(self.min, divisor),
            max: self.max / divisor,
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

impl FromStr for Range {
    type Err = Error;

    /// Parses `"<min>-<max>"`. `"null"`, empty strings, a missing delimiter,
    /// an empty tail, non-integer halves and `min > max` are all rejected.
    fn from_str(s: &str) -> Result<Self> {
        let (head, tail) = split_token(s, '-')?;
        Range::new(parse_int(head, s)?, parse_int(tail, s)?)
    }
}

/// Two-dimensional extent, ordered by width then height.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Size {
    type Err = Error;

    /// Parses `"<width>x<height>"`.
    fn from_str(s: &str) -> Result<Self> {
        let (head, tail) = split_token(s, 'x')?;
        Ok(Size::new(parse_int(head, s)?, parse_int(tail, s)?))
    }
}

impl Serialize for Size {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Size {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        token.parse().map_err(serde::de::Error::custom)
    }
}

/// Parses a resolution to frame-rate map: `"<size>@<range>,<size>@<range>,..."`.
///
/// A single malformed entry fails the whole token.
pub fn parse_size_range_map(s: &str) -> Result<BTreeMap<Size, Range>> {
    if s.is_empty() {
        return Err(Error::Parse("empty resolution/frame-rate list".to_string()));
    }
    let mut map = BTreeMap::new();
    for entry in s.split(',').filter(|entry| !entry.is_empty()) {
        let (size, range) = entry.split_once('@').ok_or_else(|| {
            Error::Parse(format!("missing \"@\" in resolution/frame-rate entry \"{entry}\""))
        })?;
        map.insert(size.parse()?, range.parse()?);
    }
    Ok(map)
}

/// Integer division rounding towards positive infinity.
pub(crate) fn div_ceil(dividend: i32, divisor: i32) -> i32 {
    if divisor == 0 {
        tracing::error!("Division of {} by zero", dividend);
        return i32::MAX;
    }
    ((dividend as i64 + divisor as i64 - 1) / divisor as i64) as i32
}

fn split_token(s: &str, delimiter: char) -> Result<(&str, &str)> {
    if s.is_empty() || s == "null" {
        return Err(Error::Parse(format!("\"{s}\" is not a valid token")));
    }
    match s.split_once(delimiter) {
        Some((head, tail)) if !tail.is_empty() => Ok((head, tail)),
        _ => Err(Error::Parse(format!(
            "cannot find the delimiter \"{delimiter}\" in \"{s}\""
        ))),
    }
}

/// Strict decimal parse: digits only, no sign, no whitespace.
pub(crate) fn parse_int(part: &str, token: &str) -> Result<i32> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::Parse(format!(
            "\"{part}\" in \"{token}\" is not an integer"
        )));
    }
    part.parse::<i32>()
        .map_err(|err| Error::Parse(format!("\"{part}\" in \"{token}\": {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_tokens() {
        assert_eq!("0-1920".parse::<Range>().unwrap(), Range { min: 0, max: 1920 });
        assert_eq!(Range { min: 7, max: 7 }.to_string(), "7-7");
        for bad in ["", "null", "12", "12-", "-12", "a-3", "1-b", " 1-3", "1--3"] {
            assert!(bad.parse::<Range>().is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(matches!(
            "30-1".parse::<Range>(),
            Err(Error::IllegalArgument(_))
        ));
    }

    #[test]
    fn size_tokens() {
        let size: Size = "1920x1080".parse().unwrap();
        assert_eq!(size, Size::new(1920, 1080));
        assert_eq!(size.to_string(), "1920x1080");
        assert!("1920x".parse::<Size>().is_err());
        assert!("1920*1080".parse::<Size>().is_err());
    }

    #[test]
    fn size_range_map() {
        let map = parse_size_range_map("320x240@1-60,1920x1080@1-30").unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map[&Size::new(1920, 1080)], Range { min: 1, max: 30 });
        assert!(parse_size_range_map("320x240@1-60,1920x1080").is_err());
        assert!(parse_size_range_map("320x240@1-60@2").is_err());
    }

    #[test]
    fn float_containment_uses_tolerance() {
        let range = Range { min: 1, max: 30 };
        assert!(range.contains_f64(30.00005, 0.0001));
        assert!(!range.contains_f64(30.5, 0.0001));
        assert!(range.contains_f64(29.97, 0.0001));
    }

    #[test]
    fn size_serializes_as_token() {
        let json = serde_json::to_string(&Size::new(640, 480)).unwrap();
        assert_eq!(json, "\"640x480\"");
        let back: Size = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Size::new(640, 480));
    }
}
