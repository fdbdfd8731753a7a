//! MAC addresses
//!
//! Hosts are identified by their MAC addresses, so every address entering the
//! system goes through `MacAddress::parse` and compares by its normalised form
//! (lowercase octets joined by `:`).

use crate::error::ModelError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A normalised MAC address.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MacAddress(String);

impl MacAddress {
    /// Parses a MAC address written with `:` or `-` separators, in any case.
    ///
    /// Segments must be one or two hex digits; at least one segment is required.
    /// Single-digit segments are zero-padded.
    pub fn parse(input: &str) -> Result<Self, ModelError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ModelError::InvalidMac(input.to_string()));
        }

        let mut octets = Vec::new();
        for segment in trimmed.split([':', '-']) {
            let valid = !segment.is_empty()
                && segment.len() <= 2
                && segment.chars().all(|c| c.is_ascii_hexdigit());
            if !valid {
                return Err(ModelError::InvalidMac(input.to_string()));
            }
            octets.push(format!("{:0>2}", segment.to_ascii_lowercase()));
        }

        Ok(Self(octets.join(":")))
    }

    /// The normalised textual form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name pxelinux looks up for this address (`01-aa-bb-cc-dd-ee-ff`).
    pub fn pxelinux_file_name(&self) -> String {
        format!("01-{}", self.0.replace(':', "-"))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MacAddress {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
