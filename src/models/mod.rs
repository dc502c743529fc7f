// Copyright (C) 2020-2026  The Blockhouse Technology Limited (TBTL).
//
// This program is free software: you can redistribute it and/or modify it
// under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or (at your
// option) any later version.
//
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public
// License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! This module defines the core data types used to implement the [ISO/IEC
//! 18013-5:2021][1] conformance checks.
//!
//! The types here model the decoded (tag-normalized) form of an issued
//! `mso_mdoc` Credential.  They are constructed fresh for every verification
//! run and are read-only once decoded.
//!
//! [1]: <https://www.iso.org/standard/69084.html>

pub mod issuer_auth;
pub mod issuer_signed;

use ciborium::Value;
use serde::{Deserialize, Serialize};

/// A _CBOR_ tag value for the `full-date` as specified by the section `7.2.1`
/// of the [ISO/IEC 18013-5:2021][1].
///
/// [1]: <https://www.iso.org/standard/69084.html>
pub(crate) const MDOC_FULL_DATE_CBOR_TAG: u64 = 1004;

/// A _CBOR_ tag value for date-time as specified in [RFC 8949][1] which is
/// used by [ISO/IEC 18013-5:2021][2].
///
/// [1]: <https://datatracker.ietf.org/doc/html/rfc8949#name-standard-date-time-string>
/// [2]: <https://www.iso.org/standard/69084.html>
pub(crate) const MDOC_TDATE_CBOR_TAG: u64 = 0;

/// A _CBOR_ tag value for the _CBOR_ byte-string as specified by the section
/// `8.1` of the [ISO/IEC 18013-5:2021][1].
///
/// [1]: <https://www.iso.org/standard/69084.html>
pub(crate) const MDOC_BYTES_CBOR_TAG: u64 = 24;

/// The document type for an _mDL_ document, as specified in the section `7.1`
/// of the [ISO/IEC 18013-5:2021][1].
///
/// [1]: <https://www.iso.org/standard/69084.html>
pub(crate) const MDL_DOCUMENT_TYPE: &str = "org.iso.18013.5.1.mDL";

/// The base namespace for _mDL_ data, as specified in the section `7.1` of
/// the [ISO/IEC 18013-5:2021][1].
///
/// [1]: <https://www.iso.org/standard/69084.html>
pub(crate) const MDL_NAMESPACE: &str = "org.iso.18013.5.1";

/// The domestic (jurisdiction) namespace for _mDL_ data.
pub(crate) const MDL_DOMESTIC_NAMESPACE: &str = "org.iso.18013.5.1.aamva";

/// `NameSpace` as defined in the section `8.3.1` of the [ISO/IEC
/// 18013-5:2021][1] standard.
///
/// Conforming credentials carry exactly these two namespaces, so the type is
/// a closed enumeration rather than a free-form string.
///
/// [1]: <https://www.iso.org/standard/69084.html>
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum NameSpace {
    /// The ISO base namespace, `org.iso.18013.5.1`.
    #[serde(rename = "org.iso.18013.5.1")]
    Iso,
    /// The domestic (jurisdiction) namespace, `org.iso.18013.5.1.aamva`.
    #[serde(rename = "org.iso.18013.5.1.aamva")]
    Domestic,
}

impl NameSpace {
    /// The namespace identifier as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Iso => MDL_NAMESPACE,
            Self::Domestic => MDL_DOMESTIC_NAMESPACE,
        }
    }

    /// Maps a wire identifier to a [`NameSpace`], if it is a known one.
    pub(crate) fn from_identifier(identifier: &str) -> Option<Self> {
        match identifier {
            MDL_NAMESPACE => Some(Self::Iso),
            MDL_DOMESTIC_NAMESPACE => Some(Self::Domestic),
            _ => None,
        }
    }
}

impl std::fmt::Display for NameSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Digest ID for issuer data authentication, as defined in the section
/// `9.1.2.5` of the [ISO/IEC 18013-5:2021][1] standard.
///
/// [1]: <https://www.iso.org/standard/69084.html>
#[derive(
    Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct DigestId(u64);

impl std::fmt::Display for DigestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for DigestId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// A _CBOR_ _byte string_.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "Value")]
pub struct Bytes(Vec<u8>);

impl Bytes {
    /// Borrow the raw bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<Bytes> for Value {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes.0)
    }
}

/// Returns the value stored under the given text `key` of a _CBOR_ map.
///
/// If there are multiple entries with the given key, only the first one is
/// returned.
pub(crate) fn lookup<'a>(entries: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    entries
        .iter()
        .find_map(|(k, v)| (k.as_text() == Some(key)).then_some(v))
}

/// Deserializes a _CBOR_ [`Value`] into a typed model.
///
/// The [`Value`] is written out and read back, which preserves map entry
/// ordering; an error message is returned on failure.
pub(crate) fn from_value<T: serde::de::DeserializeOwned>(value: &Value) -> Result<T, String> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes).map_err(|err| err.to_string())?;
    ciborium::from_reader(bytes.as_slice()).map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_round_trip() {
        for (name_space, identifier) in [
            (NameSpace::Iso, "org.iso.18013.5.1"),
            (NameSpace::Domestic, "org.iso.18013.5.1.aamva"),
        ] {
            assert_eq!(name_space.as_str(), identifier);
            assert_eq!(NameSpace::from_identifier(identifier), Some(name_space));
            assert_eq!(name_space.to_string(), identifier);

            let decoded: NameSpace = from_value(&Value::Text(identifier.to_owned())).unwrap();
            assert_eq!(decoded, name_space);
        }

        assert_eq!(NameSpace::from_identifier("org.iso.18013.5.2"), None);
    }

    #[test]
    fn lookup_finds_first_entry() {
        let entries = vec![
            (Value::Text("a".to_owned()), Value::Integer(1.into())),
            (Value::Text("a".to_owned()), Value::Integer(2.into())),
        ];

        assert_eq!(lookup(&entries, "a"), Some(&Value::Integer(1.into())));
        assert_eq!(lookup(&entries, "b"), None);
    }
}
