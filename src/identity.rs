//! Hardware address of a supervised scale.

use btleplug::api::BDAddr;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Identity of one peripheral: its 48-bit Bluetooth hardware address.
///
/// The canonical string form is uppercase and colon separated
/// (`AA:BB:CC:DD:EE:FF`). Identities are the routing key for every
/// connection event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct DeviceIdentity([u8; 6]);

impl DeviceIdentity {
    /// Create an identity from raw address bytes, most significant first.
    pub const fn from_bytes(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Parse an address.
    ///
    /// Accepts colon or dash separated pairs and the bare 12-digit form,
    /// in either case. Surrounding whitespace is ignored.
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = || Error::InvalidAddress {
            value: value.to_string(),
        };

        let trimmed = value.trim();
        let digits: String = match trimmed.len() {
            12 => trimmed.to_string(),
            17 => {
                let separator = trimmed.as_bytes()[2];
                if separator != b':' && separator != b'-' {
                    return Err(invalid());
                }
                let mut digits = String::with_capacity(12);
                for (i, c) in trimmed.chars().enumerate() {
                    if i % 3 == 2 {
                        if c != separator as char {
                            return Err(invalid());
                        }
                    } else {
                        digits.push(c);
                    }
                }
                digits
            }
            _ => return Err(invalid()),
        };

        if digits.len() != 12 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let mut bytes = [0u8; 6];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
        }

        Ok(Self(bytes))
    }

    /// Raw address bytes.
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Canonical address, e.g. `AA:BB:CC:DD:EE:FF`.
    pub fn address(&self) -> String {
        self.to_string()
    }

    /// Lowercase colon form used as a stable registry id.
    pub fn unique_id(&self) -> String {
        self.address().to_lowercase()
    }

    /// Lowercase underscore form, suitable as a default display name.
    pub fn slug(&self) -> String {
        self.unique_id().replace(':', "_")
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for DeviceIdentity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DeviceIdentity {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<DeviceIdentity> for String {
    fn from(identity: DeviceIdentity) -> Self {
        identity.address()
    }
}

impl From<BDAddr> for DeviceIdentity {
    fn from(addr: BDAddr) -> Self {
        Self(addr.into_inner())
    }
}

impl From<DeviceIdentity> for BDAddr {
    fn from(identity: DeviceIdentity) -> Self {
        BDAddr::from(identity.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_to_uppercase() {
        let id = DeviceIdentity::parse("aa:bb:cc:0d:ee:ff").unwrap();
        assert_eq!(id.address(), "AA:BB:CC:0D:EE:FF");
    }

    #[test]
    fn test_parse_accepted_forms() {
        let expected = DeviceIdentity::from_bytes([0xAA, 0xBB, 0xCC, 0x0D, 0xEE, 0xFF]);
        for input in [
            "AA:BB:CC:0D:EE:FF",
            "aa-bb-cc-0d-ee-ff",
            "aabbcc0deeff",
            "  AA:BB:CC:0D:EE:FF\n",
        ] {
            assert_eq!(DeviceIdentity::parse(input).unwrap(), expected, "{input:?}");
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for input in [
            "",
            "AA:BB:CC:DD:EE",
            "AA:BB:CC:DD:EE:FG",
            "AA:BB-CC:DD:EE:FF",
            "AA.BB.CC.DD.EE.FF",
            "AABBCCDDEEFF00",
        ] {
            assert!(
                matches!(
                    DeviceIdentity::parse(input),
                    Err(Error::InvalidAddress { .. })
                ),
                "{input:?}"
            );
        }
    }

    #[test]
    fn test_derived_names() {
        let id: DeviceIdentity = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        assert_eq!(id.unique_id(), "aa:bb:cc:dd:ee:ff");
        assert_eq!(id.slug(), "aa_bb_cc_dd_ee_ff");
    }

    #[test]
    fn test_bdaddr_conversion() {
        let id = DeviceIdentity::from_bytes([1, 2, 3, 4, 5, 6]);
        let addr: BDAddr = id.into();
        assert_eq!(DeviceIdentity::from(addr), id);
    }
}
