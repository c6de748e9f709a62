//! Identifiers and opaque values shared between the table session and the
//! resolution pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Externally tracked hand identifier.
pub type HandId = u64;

/// Token amounts in the token's smallest unit.
pub type Amount = u128;

/// Basis points denominator.
pub const BPS_DENOMINATOR: u128 = 10_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HexError {
    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error("invalid hex digit {0:?}")]
    Digit(char),
    #[error("odd number of hex digits")]
    OddLength,
}

fn decode_hex(raw: &str) -> Result<Vec<u8>, HexError> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    let chars: Vec<char> = digits.chars().collect();
    if chars.len() % 2 != 0 {
        return Err(HexError::OddLength);
    }
    let nibble = |c: char| c.to_digit(16).map(|d| d as u8).ok_or(HexError::Digit(c));
    chars
        .chunks(2)
        .map(|pair| Ok(nibble(pair[0])? << 4 | nibble(pair[1])?))
        .collect()
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    f.write_str("0x")?;
    for b in bytes {
        write!(f, "{:02x}", b)?;
    }
    Ok(())
}

fn fixed<const N: usize>(raw: &str) -> Result<[u8; N], HexError> {
    let bytes = decode_hex(raw)?;
    bytes.try_into().map_err(|v: Vec<u8>| HexError::Length {
        expected: N,
        actual: v.len(),
    })
}

/// Fixed-width byte newtype rendered as `0x`-prefixed lowercase hex, in text
/// and in serde.
macro_rules! hex_bytes {
    ($(#[$meta:meta])* $name:ident, $len:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write_hex(f, &self.0)
            }
        }

        impl FromStr for $name {
            type Err = HexError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                fixed::<$len>(s).map($name)
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_bytes!(
    /// 20-byte account or contract address.
    Address,
    20
);

hex_bytes!(
    /// Opaque 32-byte shuffle seed delivered by the randomness source.
    Seed,
    32
);

hex_bytes!(
    /// Identifier of the randomness request backing a hand.
    RequestId,
    32
);

impl Address {
    /// Right-most 20 bytes of a 32-byte ABI word.
    pub fn from_word(word: &[u8; 32]) -> Self {
        let mut out = [0u8; 20];
        out.copy_from_slice(&word[12..]);
        Address(out)
    }
}

impl Seed {
    /// Fresh seed from the OS RNG, for local play without an oracle.
    pub fn generate() -> Self {
        Seed(rand::random())
    }
}

/// Serializes an [`Amount`] as a decimal string; token amounts routinely
/// exceed what JSON numbers carry without loss.
pub mod amount_str {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Amount;

    pub fn serialize<S>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(amount)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Amount, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// `amount * bps / 10000`, saturating instead of overflowing.
pub fn apply_bps(amount: Amount, bps: u32) -> Amount {
    amount
        .checked_mul(bps as u128)
        .map(|v| v / BPS_DENOMINATOR)
        .unwrap_or_else(|| (amount / BPS_DENOMINATOR).saturating_mul(bps as u128))
}
