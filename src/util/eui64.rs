// src/util/eui64.rs
//! Stable 8-byte hardware identifiers.
//!
//! Humans read and type the identifier most-significant byte first; the
//! radio stack stores it little-endian. `StableId` keeps the stack order
//! internally and only flips it at the text boundary.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const EUI64_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StableIdError {
    #[error("expected 16 hex digits, found {0}")]
    WrongLength(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StableId([u8; EUI64_SIZE]);

impl StableId {
    pub const ZERO: StableId = StableId([0; EUI64_SIZE]);

    pub const fn from_le_bytes(bytes: [u8; EUI64_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn to_le_bytes(self) -> [u8; EUI64_SIZE] {
        self.0
    }

    /// Decode the big-endian text form. Non-hex characters such as `:` or
    /// `-` are skipped; exactly sixteen hex digits must remain.
    pub fn parse(text: &str) -> Result<Self, StableIdError> {
        let nibbles: Vec<u8> = text
            .chars()
            .filter_map(|c| c.to_digit(16))
            .map(|d| d as u8)
            .collect();

        if nibbles.len() != EUI64_SIZE * 2 {
            return Err(StableIdError::WrongLength(nibbles.len()));
        }

        let mut le = [0u8; EUI64_SIZE];
        for (i, pair) in nibbles.chunks_exact(2).enumerate() {
            le[EUI64_SIZE - 1 - i] = (pair[0] << 4) | pair[1];
        }
        Ok(Self(le))
    }
}

impl FromStr for StableId {
    type Err = StableIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Big-endian, upper-case, no separators
impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0.iter().rev() {
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}
