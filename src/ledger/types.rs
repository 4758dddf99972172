use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Number of cards dealt to each side, and number of rounds in a game.
pub const HAND_SIZE: usize = 5;
pub const MIN_RANK: u8 = 1;
pub const MAX_RANK: u8 = 13;

/// Resolved value behind a handle.
pub type Plaintext = u64;
pub type BlockNumber = u64;
pub type SignatureBytes = Vec<u8>;
pub type PublicKeyBytes = Vec<u8>;

macro_rules! hex_bytes_newtype {
    ($name:ident, $len:expr) => {
        impl $name {
            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn into_bytes(self) -> [u8; $len] {
                self.0
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = HexParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                let without_prefix = trimmed.strip_prefix("0x").unwrap_or(trimmed);
                let bytes = hex::decode(without_prefix)?;
                let actual = bytes.len();
                let array: [u8; $len] = bytes.try_into().map_err(|_| HexParseError::Length {
                    expected: $len,
                    actual,
                })?;
                Ok(Self(array))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

#[derive(Debug, Error)]
pub enum HexParseError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}

/// Opaque reference to an encrypted scalar held by the coprocessor.
///
/// The all-zero handle is the sentinel for "never assigned". It is not a
/// ciphertext of zero, although arithmetic treats it as one.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueHandle([u8; 32]);

hex_bytes_newtype!(ValueHandle, 32);

impl ValueHandle {
    pub const SENTINEL: Self = Self([0u8; 32]);

    pub fn is_sentinel(&self) -> bool {
        *self == Self::SENTINEL
    }
}

impl Default for ValueHandle {
    fn default() -> Self {
        Self::SENTINEL
    }
}

/// Account identity on the ledger (participant, contract, or signer).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 20]);

hex_bytes_newtype!(Address, 20);

impl Address {
    pub const ZERO: Self = Self([0u8; 20]);

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::ZERO
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxHash([u8; 32]);

hex_bytes_newtype!(TxHash, 32);
