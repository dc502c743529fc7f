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

//! Enforcement of _CBOR_ tag placement over the tag-preserving decode tree.
//!
//! The [ISO/IEC 18013-5:2021][1] standard requires specific semantic
//! positions to carry specific tags: every `IssuerSignedItem` is a tag-24
//! wrapped byte string, `full-date` elements are tagged with `1004` (also
//! inside driving privilege entries), the Mobile Security Object payload is a
//! tag-24 wrapped byte string and the `validityInfo` timestamps are tagged
//! with `0`.  These checks run before tag normalization, since the
//! normalized tree no longer distinguishes tagged from untagged values.
//!
//! [1]: <https://www.iso.org/standard/69084.html>

use ciborium::Value;

use crate::{
    error::{MdlValidationError, Result},
    models::{
        issuer_signed::{DRIVING_PRIVILEGES_ELEMENT, FULL_DATE_ELEMENTS},
        lookup, MDOC_BYTES_CBOR_TAG, MDOC_FULL_DATE_CBOR_TAG, MDOC_TDATE_CBOR_TAG,
    },
};

/// Validates the tag placement of the whole credential.
///
/// `document` is the tag-preserving decode of the top-level `IssuerSigned`
/// document.  The first offending position aborts the walk.
pub(crate) fn validate(document: &Value) -> Result<()> {
    check_document(document)
        .map_err(|message| bherror::Error::root(MdlValidationError::InvalidTags(message)))
}

fn check_document(document: &Value) -> std::result::Result<(), String> {
    let entries = document
        .as_map()
        .ok_or_else(|| "credential must be a map".to_owned())?;

    let name_spaces = lookup(entries, "nameSpaces")
        .and_then(Value::as_map)
        .ok_or_else(|| "`nameSpaces` must be a map".to_owned())?;

    for (name_space, items) in name_spaces {
        let name_space = name_space
            .as_text()
            .ok_or_else(|| "namespace identifiers must be text strings".to_owned())?;

        let items = items
            .as_array()
            .ok_or_else(|| format!("items of namespace {name_space} must be an array"))?;

        for item in items {
            check_item(name_space, item)?;
        }
    }

    let issuer_auth = lookup(entries, "issuerAuth")
        .ok_or_else(|| "`issuerAuth` is missing".to_owned())?;

    check_validity_info(issuer_auth)
}

/// Checks one `IssuerSignedItem` of the given namespace: the tag-24 wrapper
/// and, depending on the element identifier, the tag-1004 wrappers within.
fn check_item(name_space: &str, item: &Value) -> std::result::Result<(), String> {
    let Value::Tag(MDOC_BYTES_CBOR_TAG, contents) = item else {
        return Err(format!(
            "IssuerSignedItem in namespace {name_space} must be tagged with {MDOC_BYTES_CBOR_TAG}"
        ));
    };

    let bytes = contents.as_bytes().ok_or_else(|| {
        format!("IssuerSignedItem in namespace {name_space} must wrap a byte string")
    })?;

    let item: Value = ciborium::from_reader(bytes.as_slice())
        .map_err(|err| format!("failed to decode IssuerSignedItem in namespace {name_space} - {err}"))?;

    let entries = item
        .as_map()
        .ok_or_else(|| format!("IssuerSignedItem in namespace {name_space} must be a map"))?;

    let Some(identifier) = lookup(entries, "elementIdentifier").and_then(Value::as_text) else {
        // left for the schema stage to diagnose
        return Ok(());
    };
    let Some(value) = lookup(entries, "elementValue") else {
        return Ok(());
    };

    if FULL_DATE_ELEMENTS.contains(&identifier)
        && !matches!(value, Value::Tag(MDOC_FULL_DATE_CBOR_TAG, _))
    {
        return Err(format!(
            "`{identifier}` in namespace {name_space} must be tagged with {MDOC_FULL_DATE_CBOR_TAG}"
        ));
    }

    if identifier == DRIVING_PRIVILEGES_ELEMENT {
        for privilege in value.as_array().map(Vec::as_slice).unwrap_or_default() {
            check_privilege_dates(privilege)?;
        }
    }

    Ok(())
}

fn check_privilege_dates(privilege: &Value) -> std::result::Result<(), String> {
    let Some(entries) = privilege.as_map() else {
        return Ok(());
    };

    for field in ["issue_date", "expiry_date"] {
        if let Some(value) = lookup(entries, field) {
            if !matches!(value, Value::Tag(MDOC_FULL_DATE_CBOR_TAG, _)) {
                return Err(format!(
                    "`{field}` of a driving privilege must be tagged with {MDOC_FULL_DATE_CBOR_TAG}"
                ));
            }
        }
    }

    Ok(())
}

/// Checks the tag-24 wrapper of the Mobile Security Object payload and the
/// tag-0 wrappers of the `validityInfo` timestamps within it.
fn check_validity_info(issuer_auth: &Value) -> std::result::Result<(), String> {
    let elements = issuer_auth
        .as_array()
        .ok_or_else(|| "`issuerAuth` must be an array".to_owned())?;

    let payload = elements
        .get(2)
        .and_then(Value::as_bytes)
        .ok_or_else(|| "`issuerAuth` payload must be a byte string".to_owned())?;

    let payload: Value = ciborium::from_reader(payload.as_slice())
        .map_err(|err| format!("failed to decode `issuerAuth` payload - {err}"))?;

    let Value::Tag(MDOC_BYTES_CBOR_TAG, contents) = payload else {
        return Err(format!(
            "MobileSecurityObjectBytes must be tagged with {MDOC_BYTES_CBOR_TAG}"
        ));
    };

    let bytes = contents
        .as_bytes()
        .ok_or_else(|| "MobileSecurityObjectBytes must wrap a byte string".to_owned())?;

    let mso: Value = ciborium::from_reader(bytes.as_slice())
        .map_err(|err| format!("failed to decode MobileSecurityObject - {err}"))?;

    let entries = mso
        .as_map()
        .ok_or_else(|| "MobileSecurityObject must be a map".to_owned())?;

    let validity_info = lookup(entries, "validityInfo")
        .and_then(Value::as_map)
        .ok_or_else(|| "`validityInfo` must be a map".to_owned())?;

    for field in ["signed", "validFrom", "validUntil"] {
        let value = lookup(validity_info, field)
            .ok_or_else(|| format!("`{field}` of validityInfo is missing"))?;

        if !matches!(value, Value::Tag(MDOC_TDATE_CBOR_TAG, _)) {
            return Err(format!(
                "`{field}` of validityInfo must be tagged with {MDOC_TDATE_CBOR_TAG}"
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn encode(value: &Value) -> Vec<u8> {
        let mut bytes = Vec::new();
        ciborium::into_writer(value, &mut bytes).unwrap();
        bytes
    }

    fn tagged_item(entries: Vec<(Value, Value)>) -> Value {
        Value::Tag(
            MDOC_BYTES_CBOR_TAG,
            Box::new(Value::Bytes(encode(&Value::Map(entries)))),
        )
    }

    fn item_entries(identifier: &str, value: Value) -> Vec<(Value, Value)> {
        vec![
            (Value::Text("random".to_owned()), Value::Bytes(vec![0; 16])),
            (Value::Text("digestID".to_owned()), Value::Integer(0.into())),
            (Value::Text("elementValue".to_owned()), value),
            (
                Value::Text("elementIdentifier".to_owned()),
                Value::Text(identifier.to_owned()),
            ),
        ]
    }

    #[test]
    fn untagged_item_fails() {
        let item = Value::Map(item_entries("family_name", Value::Text("Doe".to_owned())));

        let err = check_item("org.iso.18013.5.1", &item).unwrap_err();

        assert_eq!(
            err,
            "IssuerSignedItem in namespace org.iso.18013.5.1 must be tagged with 24"
        );
    }

    #[test]
    fn untagged_full_date_fails() {
        let item = tagged_item(item_entries(
            "birth_date",
            Value::Text("1980-01-02".to_owned()),
        ));

        let err = check_item("org.iso.18013.5.1", &item).unwrap_err();

        assert_eq!(
            err,
            "`birth_date` in namespace org.iso.18013.5.1 must be tagged with 1004"
        );
    }

    #[test]
    fn tagged_full_date_passes() {
        let item = tagged_item(item_entries(
            "birth_date",
            Value::Tag(
                MDOC_FULL_DATE_CBOR_TAG,
                Box::new(Value::Text("1980-01-02".to_owned())),
            ),
        ));

        check_item("org.iso.18013.5.1", &item).unwrap();
    }

    #[test]
    fn untagged_privilege_date_fails() {
        let privileges = Value::Array(vec![Value::Map(vec![
            (
                Value::Text("vehicle_category_code".to_owned()),
                Value::Text("B".to_owned()),
            ),
            (
                Value::Text("expiry_date".to_owned()),
                Value::Text("2029-01-15".to_owned()),
            ),
        ])]);
        let item = tagged_item(item_entries("driving_privileges", privileges));

        let err = check_item("org.iso.18013.5.1", &item).unwrap_err();

        assert_eq!(
            err,
            "`expiry_date` of a driving privilege must be tagged with 1004"
        );
    }

    #[test]
    fn untagged_validity_field_fails() {
        let mso = Value::Map(vec![(
            Value::Text("validityInfo".to_owned()),
            Value::Map(vec![
                (
                    Value::Text("signed".to_owned()),
                    Value::Tag(
                        MDOC_TDATE_CBOR_TAG,
                        Box::new(Value::Text("2024-10-01T13:30:02Z".to_owned())),
                    ),
                ),
                (
                    Value::Text("validFrom".to_owned()),
                    Value::Text("2024-10-01T13:30:02Z".to_owned()),
                ),
                (
                    Value::Text("validUntil".to_owned()),
                    Value::Tag(
                        MDOC_TDATE_CBOR_TAG,
                        Box::new(Value::Text("2025-10-01T13:30:02Z".to_owned())),
                    ),
                ),
            ]),
        )]);
        let payload = Value::Tag(
            MDOC_BYTES_CBOR_TAG,
            Box::new(Value::Bytes(encode(&mso))),
        );
        let issuer_auth = Value::Array(vec![
            Value::Bytes(vec![]),
            Value::Map(vec![]),
            Value::Bytes(encode(&payload)),
            Value::Bytes(vec![]),
        ]);

        let err = check_validity_info(&issuer_auth).unwrap_err();

        assert_eq!(err, "`validFrom` of validityInfo must be tagged with 0");
    }

    #[test]
    fn untagged_mso_payload_fails() {
        let issuer_auth = Value::Array(vec![
            Value::Bytes(vec![]),
            Value::Map(vec![]),
            Value::Bytes(encode(&Value::Map(vec![]))),
            Value::Bytes(vec![]),
        ]);

        let err = check_validity_info(&issuer_auth).unwrap_err();

        assert_eq!(err, "MobileSecurityObjectBytes must be tagged with 24");
    }

    #[test]
    fn validate_wraps_with_prefix() {
        let err = validate(&Value::Integer(1.into())).unwrap_err();

        assert_matches!(&err.error, MdlValidationError::InvalidTags(_));
        assert_eq!(
            err.error.to_string(),
            "Failed to validate tags - credential must be a map"
        );
    }
}
