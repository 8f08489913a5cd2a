//! Resource quantities
//!
//! Requests carry CPU and memory limits as text (`"500m"`, `"128Mi"`). Policy
//! ceilings are compared against the parsed values, never against the text:
//! `"300m" > "2000m"` holds lexically but not numerically.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,

    #[error("invalid quantity '{0}'")]
    Invalid(String),

    #[error("unknown unit suffix in '{0}'")]
    UnknownUnit(String),

    #[error("quantity '{0}' overflows")]
    Overflow(String),
}

/// CPU limit in millicores (`1000` = one core).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CpuQuantity(u64);

impl CpuQuantity {
    pub const fn from_millicores(millicores: u64) -> Self {
        Self(millicores)
    }

    pub fn millicores(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl FromStr for CpuQuantity {
    type Err = QuantityError;

    /// Accepts `"500m"` (millicores), `"2"` and `"0.5"` (cores).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(QuantityError::Empty);
        }

        if let Some(milli) = s.strip_suffix('m') {
            return parse_integer(milli, s).map(CpuQuantity);
        }

        let (whole, frac) = split_decimal(s)?;
        if frac.len() > 3 {
            // Finer than a millicore.
            return Err(QuantityError::Invalid(s.to_string()));
        }
        let whole = parse_integer(whole, s)?;
        let mut frac_milli = 0u64;
        if !frac.is_empty() {
            let padded = format!("{:0<3}", frac);
            frac_milli = parse_integer(&padded, s)?;
        }
        whole
            .checked_mul(1000)
            .and_then(|m| m.checked_add(frac_milli))
            .map(CpuQuantity)
            .ok_or_else(|| QuantityError::Overflow(s.to_string()))
    }
}

impl fmt::Display for CpuQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m", self.0)
    }
}

impl TryFrom<String> for CpuQuantity {
    type Error = QuantityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CpuQuantity> for String {
    fn from(q: CpuQuantity) -> Self {
        q.to_string()
    }
}

/// Memory limit in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MemoryQuantity(u64);

const BINARY_UNITS: [(&str, u64); 4] = [
    ("Ki", 1 << 10),
    ("Mi", 1 << 20),
    ("Gi", 1 << 30),
    ("Ti", 1 << 40),
];

const DECIMAL_UNITS: [(&str, u64); 5] = [
    ("k", 1_000),
    ("K", 1_000),
    ("M", 1_000_000),
    ("G", 1_000_000_000),
    ("T", 1_000_000_000_000),
];

impl MemoryQuantity {
    pub const fn from_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl FromStr for MemoryQuantity {
    type Err = QuantityError;

    /// Accepts plain bytes and `Ki/Mi/Gi/Ti` or `k/K/M/G/T` suffixes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(QuantityError::Empty);
        }

        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(s.len());
        let (digits, unit) = s.split_at(split);
        let value = parse_integer(digits, s)?;

        let multiplier = if unit.is_empty() {
            1
        } else if let Some((_, m)) = BINARY_UNITS.iter().find(|(u, _)| *u == unit) {
            *m
        } else if let Some((_, m)) = DECIMAL_UNITS.iter().find(|(u, _)| *u == unit) {
            *m
        } else {
            return Err(QuantityError::UnknownUnit(s.to_string()));
        };

        value
            .checked_mul(multiplier)
            .map(MemoryQuantity)
            .ok_or_else(|| QuantityError::Overflow(s.to_string()))
    }
}

impl fmt::Display for MemoryQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (unit, multiplier) in BINARY_UNITS.iter().rev() {
            if self.0 >= *multiplier && self.0 % multiplier == 0 {
                return write!(f, "{}{}", self.0 / multiplier, unit);
            }
        }
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for MemoryQuantity {
    type Error = QuantityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MemoryQuantity> for String {
    fn from(q: MemoryQuantity) -> Self {
        q.to_string()
    }
}

fn split_decimal(s: &str) -> Result<(&str, &str), QuantityError> {
    match s.split_once('.') {
        Some((whole, frac)) if !whole.is_empty() && !frac.is_empty() => Ok((whole, frac)),
        Some(_) => Err(QuantityError::Invalid(s.to_string())),
        None => Ok((s, "")),
    }
}

fn parse_integer(digits: &str, original: &str) -> Result<u64, QuantityError> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(QuantityError::Invalid(original.to_string()));
    }
    digits
        .parse::<u64>()
        .map_err(|_| QuantityError::Overflow(original.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_forms() {
        assert_eq!("500m".parse::<CpuQuantity>().unwrap().millicores(), 500);
        assert_eq!("2".parse::<CpuQuantity>().unwrap().millicores(), 2000);
        assert_eq!("0.5".parse::<CpuQuantity>().unwrap().millicores(), 500);
        assert_eq!("1.25".parse::<CpuQuantity>().unwrap().millicores(), 1250);
    }

    #[test]
    fn test_cpu_rejects_garbage() {
        assert_eq!("".parse::<CpuQuantity>(), Err(QuantityError::Empty));
        assert!("lots".parse::<CpuQuantity>().is_err());
        assert!("-1".parse::<CpuQuantity>().is_err());
        assert!("m".parse::<CpuQuantity>().is_err());
        assert!("0.0001".parse::<CpuQuantity>().is_err());
        assert!(".5".parse::<CpuQuantity>().is_err());
    }

    #[test]
    fn test_cpu_ordering_is_numeric() {
        let small: CpuQuantity = "300m".parse().unwrap();
        let ceiling: CpuQuantity = "2000m".parse().unwrap();
        let big: CpuQuantity = "4000m".parse().unwrap();
        // "300m" > "2000m" as strings
        assert!("300m" > "2000m");
        assert!(small < ceiling);
        assert!(big > ceiling);
    }

    #[test]
    fn test_memory_forms() {
        assert_eq!(
            "128Mi".parse::<MemoryQuantity>().unwrap().bytes(),
            128 * 1024 * 1024
        );
        assert_eq!("1Gi".parse::<MemoryQuantity>().unwrap().bytes(), 1 << 30);
        assert_eq!("64M".parse::<MemoryQuantity>().unwrap().bytes(), 64_000_000);
        assert_eq!("4096".parse::<MemoryQuantity>().unwrap().bytes(), 4096);
        assert!(matches!(
            "12Qi".parse::<MemoryQuantity>(),
            Err(QuantityError::UnknownUnit(_))
        ));
    }

    #[test]
    fn test_memory_ordering_across_units() {
        let ceiling: MemoryQuantity = "512Mi".parse().unwrap();
        assert!("1Gi".parse::<MemoryQuantity>().unwrap() > ceiling);
        assert!("96Mi".parse::<MemoryQuantity>().unwrap() < ceiling);
        assert!("600M".parse::<MemoryQuantity>().unwrap() > ceiling);
    }

    #[test]
    fn test_overflow_detected() {
        assert!(matches!(
            "99999999999999999999Ti".parse::<MemoryQuantity>(),
            Err(QuantityError::Overflow(_))
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(MemoryQuantity::from_bytes(512 << 20).to_string(), "512Mi");
        assert_eq!(MemoryQuantity::from_bytes(1000).to_string(), "1000");
        assert_eq!(CpuQuantity::from_millicores(2000).to_string(), "2000m");
    }
}
