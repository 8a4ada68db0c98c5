//! Purpose: Syntactic ISBN validation and the validated `Isbn` key type.
//! Exports: `validate`, `Isbn`, `ISBN_LEN`.
//! Role: Gatekeeper in front of the counting store; nothing unvalidated gets in.
//! Invariants: An `Isbn` is exactly 13 ASCII decimal digits; leading zeros kept.
//! Invariants: No check-digit verification is performed.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::core::error::Error;

pub const ISBN_LEN: usize = 13;

/// Returns true iff `candidate` is exactly 13 ASCII decimal digits.
pub fn validate(candidate: &str) -> bool {
    candidate.len() == ISBN_LEN && candidate.bytes().all(|byte| byte.is_ascii_digit())
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Isbn(String);

impl Isbn {
    /// Same rule as [`validate`], but fails with an `InvalidIsbn` error naming
    /// the offending value.
    pub fn parse(candidate: &str) -> Result<Self, Error> {
        if validate(candidate) {
            Ok(Self(candidate.to_string()))
        } else {
            Err(Error::invalid_isbn(candidate))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Isbn {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl AsRef<str> for Isbn {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Isbn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
