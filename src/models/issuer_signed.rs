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

//! This module defines the data model described in the section "8.3.2.1.2.2
//! Device retrieval mdoc response" of the [ISO/IEC 18013-5:2021][1] standard,
//! restricted to the issuer-signed part that an issued credential carries,
//! together with the namespace content checks.
//!
//! [1]: <https://www.iso.org/standard/69084.html>

use std::collections::{BTreeMap, HashSet};

use ciborium::Value;
use serde::{Deserialize, Serialize};

use super::{from_value, Bytes, DigestId, NameSpace};
use crate::error::{MdlValidationError, Result};

/// The element identifiers which carry a `full-date` value and therefore must
/// be tagged with `1004` on the wire.
pub(crate) const FULL_DATE_ELEMENTS: [&str; 3] = ["birth_date", "issue_date", "expiry_date"];

/// The element identifier of the driving privileges list.
pub(crate) const DRIVING_PRIVILEGES_ELEMENT: &str = "driving_privileges";

/// The element identifier of the holder portrait.
pub(crate) const PORTRAIT_ELEMENT: &str = "portrait";

/// Minimum number of data elements the domestic namespace must carry.
pub(crate) const DOMESTIC_MIN_ELEMENTS: usize = 2;

/// Maximum number of data elements the domestic namespace may carry.
pub(crate) const DOMESTIC_MAX_ELEMENTS: usize = 3;

/// The kind of value a data element is allowed to hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ElementKind {
    /// A text string.
    Text,
    /// A boolean.
    Boolean,
    /// A byte string.
    Bytes,
    /// A `full-date` text string (`YYYY-MM-DD`).
    FullDate,
    /// A list of [`DrivingPrivilege`]s.
    DrivingPrivileges,
}

/// The data elements of the ISO base namespace, as defined in Table 5 of the
/// [ISO/IEC 18013-5:2021][1] standard.  A conforming credential carries every
/// one of them.
///
/// [1]: <https://www.iso.org/standard/69084.html>
pub(crate) const ISO_ELEMENTS: [(&str, ElementKind); 18] = [
    ("family_name", ElementKind::Text),
    ("given_name", ElementKind::Text),
    ("birth_date", ElementKind::FullDate),
    ("issue_date", ElementKind::FullDate),
    ("expiry_date", ElementKind::FullDate),
    ("issuing_country", ElementKind::Text),
    ("issuing_authority", ElementKind::Text),
    ("document_number", ElementKind::Text),
    ("portrait", ElementKind::Bytes),
    ("driving_privileges", ElementKind::DrivingPrivileges),
    ("un_distinguishing_sign", ElementKind::Text),
    ("age_over_18", ElementKind::Boolean),
    ("age_over_21", ElementKind::Boolean),
    ("resident_address", ElementKind::Text),
    ("resident_city", ElementKind::Text),
    ("resident_state", ElementKind::Text),
    ("resident_postal_code", ElementKind::Text),
    ("resident_country", ElementKind::Text),
];

/// The data elements the domestic namespace may carry.
pub(crate) const DOMESTIC_ELEMENTS: [(&str, ElementKind); 4] = [
    ("name_suffix", ElementKind::Text),
    ("organ_donor", ElementKind::Boolean),
    ("resident_county", ElementKind::Text),
    ("veteran", ElementKind::Boolean),
];

/// Returns the value kind of the given element identifier within the given
/// namespace, if the identifier belongs to the namespace vocabulary.
pub(crate) fn element_kind(name_space: NameSpace, identifier: &str) -> Option<ElementKind> {
    let vocabulary: &[(&str, ElementKind)] = match name_space {
        NameSpace::Iso => &ISO_ELEMENTS,
        NameSpace::Domestic => &DOMESTIC_ELEMENTS,
    };

    vocabulary
        .iter()
        .find_map(|(element, kind)| (*element == identifier).then_some(*kind))
}

/// `IssuerSigned` as defined in the section `8.3.2.1.2.2` of the [ISO/IEC
/// 18013-5:2021][1] standard, decoded from the tag-normalized value tree.
///
/// [1]: <https://www.iso.org/standard/69084.html>
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuerSigned {
    name_spaces: IssuerNameSpaces,
    issuer_auth: super::issuer_auth::IssuerAuth,
}

impl IssuerSigned {
    /// Builds the typed model from the tag-normalized document tree.
    ///
    /// The tree is expected to have passed schema validation already, so a
    /// failure here indicates an internal inconsistency.
    pub(crate) fn from_normalized(document: &Value) -> Result<Self> {
        from_value(document)
            .map_err(|err| bherror::Error::root(MdlValidationError::IssuerSignedSchema(err)))
    }

    /// The namespaces with their issuer-signed data elements.
    pub fn name_spaces(&self) -> &IssuerNameSpaces {
        &self.name_spaces
    }

    /// The `IssuerAuth` COSE_Sign1 structure.
    pub fn issuer_auth(&self) -> &super::issuer_auth::IssuerAuth {
        &self.issuer_auth
    }
}

/// `IssuerNameSpaces` as defined in the section `8.3.2.1.2.2` of the
/// [ISO/IEC 18013-5:2021][1] standard.
///
/// [1]: <https://www.iso.org/standard/69084.html>
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IssuerNameSpaces(BTreeMap<NameSpace, Vec<IssuerSignedItem>>);

impl IssuerNameSpaces {
    /// Asserts that the digest IDs are unique within each namespace.
    pub(crate) fn validate_digest_ids(&self) -> Result<()> {
        for (name_space, items) in &self.0 {
            let unique: HashSet<DigestId> = items.iter().map(|item| item.digest_id).collect();

            if unique.len() < items.len() {
                return Err(bherror::Error::root(
                    MdlValidationError::DuplicateDigestIds(*name_space),
                ));
            }
        }

        Ok(())
    }

    /// Asserts that the `portrait` element of the ISO namespace holds a JPEG
    /// image, i.e. starts with an SOI marker and ends with the EOI marker.
    pub(crate) fn validate_portrait(&self) -> Result<()> {
        let portrait = self
            .0
            .get(&NameSpace::Iso)
            .and_then(|items| {
                items
                    .iter()
                    .find(|item| item.element_identifier == PORTRAIT_ELEMENT)
            })
            .and_then(|item| item.element_value.as_bytes());

        // presence and byte-string-ness are guaranteed by the schema
        match portrait {
            Some(bytes) => validate_portrait_bytes(bytes),
            None => Ok(()),
        }
    }
}

/// The accepted JPEG start-of-image markers, rendered for error messages.
const PORTRAIT_SOI_MARKERS: &str = "ffd8ffe0, ffd8ffee or ffd8ffdb";

/// The JPEG end-of-image marker, rendered for error messages.
const PORTRAIT_EOI_MARKER: &str = "ffd9";

fn validate_portrait_bytes(bytes: &[u8]) -> Result<()> {
    let starts_with_soi = bytes.len() >= 4
        && bytes[..3] == [0xFF, 0xD8, 0xFF]
        && matches!(bytes[3], 0xE0 | 0xEE | 0xDB);

    if !starts_with_soi {
        return Err(bherror::Error::root(MdlValidationError::InvalidPortrait {
            expected: PORTRAIT_SOI_MARKERS.to_owned(),
            found: hex::encode(&bytes[..bytes.len().min(4)]),
        }));
    }

    // the length is at least 4 at this point
    let tail = &bytes[bytes.len() - 2..];
    if tail != [0xFF, 0xD9] {
        return Err(bherror::Error::root(MdlValidationError::InvalidPortrait {
            expected: PORTRAIT_EOI_MARKER.to_owned(),
            found: hex::encode(tail),
        }));
    }

    Ok(())
}

/// `IssuerSignedItem` as defined in the section `8.3.2.1.2.2` of the
/// [ISO/IEC 18013-5:2021][1] standard.
///
/// On the wire each item is wrapped in a tag-24 byte string; this model holds
/// the tag-normalized form.
///
/// [1]: <https://www.iso.org/standard/69084.html>
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuerSignedItem {
    /// The salt the item digest is randomized with.
    pub random: Bytes,
    /// Digest ID of the item, matching an entry of the MSO `valueDigests`.
    #[serde(rename = "digestID")]
    pub digest_id: DigestId,
    /// The value of the data element.
    pub element_value: Value,
    /// The identifier of the data element.
    pub element_identifier: String,
}

/// A single driving privilege, as defined in the section `7.2.4` of the
/// [ISO/IEC 18013-5:2021][1] standard.
///
/// The `full-date` fields hold the tag-normalized text form here; their tag
/// placement on the wire is enforced separately.
///
/// [1]: <https://www.iso.org/standard/69084.html>
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DrivingPrivilege {
    /// Category of the vehicle (e.g. `A`, `B`).
    pub vehicle_category_code: String,
    /// Date the privilege was granted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_date: Option<String>,
    /// Date the privilege expires.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
    /// Restriction and condition codes attached to the privilege.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codes: Option<Vec<PrivilegeCode>>,
}

/// A restriction or condition code of a [`DrivingPrivilege`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrivilegeCode {
    /// The code itself.
    pub code: String,
    /// Sign of the code value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sign: Option<String>,
    /// Value attached to the code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}
