//! Canonical Bluetooth hardware addresses.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smol_str::SmolStr;
use thiserror::Error;

/// Length of a textual address (`AA:BB:CC:11:22:33`).
pub const ADDRESS_LEN: usize = 17;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid MAC address format: {input:?}. Use AA:BB:CC:11:22:33")]
pub struct AddressError {
   input: String,
}

/// A case-normalized hardware address, six colon-separated hex octets.
///
/// Equality is plain string equality on the normalized form, so the same
/// device reported in lower case by one source and upper case by another
/// maps to a single key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceAddress(SmolStr);

impl DeviceAddress {
   pub fn as_str(&self) -> &str {
      &self.0
   }

   /// Returns true if `token` has the shape of an address, without
   /// checking the octets.
   pub fn looks_like(token: &str) -> bool {
      token.len() == ADDRESS_LEN && token.contains(':')
   }
}

impl FromStr for DeviceAddress {
   type Err = AddressError;

   fn from_str(s: &str) -> Result<Self, Self::Err> {
      let normalized = s.trim().to_ascii_uppercase().replace('-', ":");
      let valid = normalized.len() == ADDRESS_LEN
         && normalized.split(':').count() == 6
         && normalized
            .split(':')
            .all(|octet| octet.len() == 2 && octet.bytes().all(|b| b.is_ascii_hexdigit()));

      if valid {
         Ok(Self(normalized.into()))
      } else {
         Err(AddressError { input: s.to_string() })
      }
   }
}

impl fmt::Display for DeviceAddress {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(&self.0)
   }
}

impl AsRef<str> for DeviceAddress {
   fn as_ref(&self) -> &str {
      &self.0
   }
}

impl Serialize for DeviceAddress {
   fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
      serializer.serialize_str(&self.0)
   }
}

impl<'de> Deserialize<'de> for DeviceAddress {
   fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
      let raw = SmolStr::deserialize(deserializer)?;
      raw.parse().map_err(serde::de::Error::custom)
   }
}
