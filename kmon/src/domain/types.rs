//! Core domain types
//!
//! Addresses on the inspected machine are 32 bits wide. They arrive as text
//! from the command line and as either numbers or strings from snapshots; both
//! paths go through [`parse_address`].

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use super::errors::MonitorError;

/// Parse an address with C-style base prefixes
///
/// `0x`/`0X` selects hexadecimal, a leading `0` selects octal, anything else
/// is decimal. The whole string must be consumed and the value must fit in 32
/// bits; anything else is rejected instead of silently becoming zero.
///
/// # Errors
/// Returns [`MonitorError::InvalidAddress`] carrying the rejected text
pub fn parse_address(text: &str) -> Result<u32, MonitorError> {
    let invalid = || MonitorError::InvalidAddress(text.to_string());

    let digits = text.strip_prefix('+').unwrap_or(text);
    let (digits, radix) = if let Some(hex) =
        digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X"))
    {
        (hex, 16)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (&digits[1..], 8)
    } else {
        (digits, 10)
    };

    // from_str_radix accepts its own sign, which must not follow a prefix
    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return Err(invalid());
    }

    u32::from_str_radix(digits, radix).map_err(|_| invalid())
}

/// A 32-bit address on the inspected machine
///
/// Deserializes from a JSON number or from a string understood by
/// [`parse_address`], so snapshots can spell addresses as `"0xf0100000"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize)]
#[serde(try_from = "AddressRepr")]
pub struct Address(pub u32);

#[derive(Deserialize)]
#[serde(untagged)]
enum AddressRepr {
    Number(u32),
    Text(String),
}

impl TryFrom<AddressRepr> for Address {
    type Error = MonitorError;

    fn try_from(repr: AddressRepr) -> Result<Self, Self::Error> {
        match repr {
            AddressRepr::Number(n) => Ok(Address(n)),
            AddressRepr::Text(s) => s.parse(),
        }
    }
}

impl FromStr for Address {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_address(s.trim()).map(Address)
    }
}

impl From<Address> for u32 {
    fn from(addr: Address) -> Self {
        addr.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}
