//! Arbitrary-precision cell capacities
//!
//! Capacities are non-negative integers of unbounded size. They travel as
//! decimal strings (storage, address documents) or `0x` hex (node RPC).

use crate::{Error, Result};
use num_bigint::BigUint;
use num_traits::{Num, Zero};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

/// Non-negative capacity amount
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Capacity(BigUint);

impl Capacity {
    /// Zero capacity
    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    /// Whether the amount is zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Wrap a big integer
    pub fn from_biguint(value: BigUint) -> Self {
        Self(value)
    }

    /// Inner big integer
    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }

    /// Parse `0x`-prefixed hex as returned by the node
    pub fn from_hex_str(s: &str) -> Result<Self> {
        let digits = s
            .strip_prefix("0x")
            .ok_or_else(|| Error::InvalidCapacity(format!("missing 0x prefix: {}", s)))?;
        if digits.is_empty() {
            return Err(Error::InvalidCapacity(s.to_string()));
        }
        BigUint::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|e| Error::InvalidCapacity(format!("{}: {}", s, e)))
    }

    /// Subtract, returning `None` when the result would be negative
    pub fn checked_sub(&self, other: &Capacity) -> Option<Capacity> {
        if self.0 < other.0 {
            None
        } else {
            Some(Self(&self.0 - &other.0))
        }
    }
}

impl From<u64> for Capacity {
    fn from(value: u64) -> Self {
        Self(BigUint::from(value))
    }
}

impl FromStr for Capacity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.starts_with("0x") {
            return Self::from_hex_str(s);
        }
        BigUint::from_str(s)
            .map(Self)
            .map_err(|e| Error::InvalidCapacity(format!("{}: {}", s, e)))
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Capacity({})", self.0)
    }
}

impl Add for Capacity {
    type Output = Capacity;

    fn add(self, rhs: Capacity) -> Capacity {
        Capacity(self.0 + rhs.0)
    }
}

impl<'a> Add<&'a Capacity> for &'a Capacity {
    type Output = Capacity;

    fn add(self, rhs: &'a Capacity) -> Capacity {
        Capacity(&self.0 + &rhs.0)
    }
}

impl AddAssign<&Capacity> for Capacity {
    fn add_assign(&mut self, rhs: &Capacity) {
        self.0 += &rhs.0;
    }
}

impl Sum for Capacity {
    fn sum<I: Iterator<Item = Capacity>>(iter: I) -> Self {
        iter.fold(Capacity::zero(), |acc, c| acc + c)
    }
}

impl<'a> Sum<&'a Capacity> for Capacity {
    fn sum<I: Iterator<Item = &'a Capacity>>(iter: I) -> Self {
        let mut total = Capacity::zero();
        for c in iter {
            total += c;
        }
        total
    }
}

impl Serialize for Capacity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Capacity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Capacity::from_str(&s).map_err(serde::de::Error::custom)
    }
}
