//! Operation codes.
//!
//! Every encode/decode runs under a set of operation codes: `C` (create),
//! `R` (read) and `U` (update). Masks are declared with the same codes and
//! block an attribute when the two sets intersect.

use crate::Error;
use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

/// A set of operation codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct OpSet(u8);

impl OpSet {
    pub const NONE: Self = Self(0);
    pub const CREATE: Self = Self(0b001);
    pub const READ: Self = Self(0b010);
    pub const UPDATE: Self = Self(0b100);
    /// Create + update, i.e. everything that sends data to the server.
    pub const WRITE: Self = Self(0b101);
    pub const ALL: Self = Self(0b111);

    /// Parses a string of operation codes (`"CU"`, `"r"`). Order and case
    /// do not matter.
    pub fn parse(codes: &str) -> Result<Self, Error> {
        codes.chars().try_fold(Self::NONE, |acc, c| {
            let op = match c.to_ascii_uppercase() {
                'C' => Self::CREATE,
                'R' => Self::READ,
                'U' => Self::UPDATE,
                _ => return Err(Error::InvalidOpCode(c)),
            };
            Ok(acc | op)
        })
    }

    /// Returns true if every code in `other` is also in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if the two sets share at least one code.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for OpSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl FromStr for OpSet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for OpSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (op, code) in [(Self::CREATE, 'C'), (Self::READ, 'R'), (Self::UPDATE, 'U')] {
            if self.contains(op) {
                write!(f, "{code}")?;
            }
        }
        Ok(())
    }
}
