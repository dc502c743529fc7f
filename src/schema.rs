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

//! Structural (schema) validation of the tag-normalized value trees.
//!
//! Two rule-sets live here: the `IssuerSigned` envelope with its two
//! namespace item arrays, and the Mobile Security Object.  Violations are
//! collected as `{path, keyword, message}` records and aggregated into a
//! single error message per document, so a harness sees every structural
//! problem at once.
//!
//! Byte strings are recognized structurally and `full-date` / `tdate`
//! patterns are enforced by parsing, so no runtime schema engine is needed.

use ciborium::Value;

use crate::{
    error::{MdlValidationError, Result},
    models::{
        from_value,
        issuer_signed::{
            element_kind, DrivingPrivilege, ElementKind, DOMESTIC_MAX_ELEMENTS,
            DOMESTIC_MIN_ELEMENTS, ISO_ELEMENTS,
        },
        lookup, NameSpace, MDL_DOCUMENT_TYPE,
    },
};

/// Largest allowed digest ID (exclusive), per the mdoc `uint` profile.
const DIGEST_ID_LIMIT: i128 = 1 << 31;

/// A single structural violation, in the shape the external rule engines
/// report them: instance path, violated keyword and a human-readable message.
#[derive(Debug, PartialEq)]
struct Violation {
    path: String,
    keyword: &'static str,
    message: String,
}

impl Violation {
    fn new(path: impl Into<String>, keyword: &'static str, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            keyword,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.path, self.message, self.keyword)
    }
}

fn join(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validates the tag-normalized `IssuerSigned` document against the envelope
/// and namespace schemas.
pub(crate) fn validate_issuer_signed(document: &Value) -> Result<()> {
    let violations = issuer_signed_violations(document);

    if violations.is_empty() {
        Ok(())
    } else {
        Err(bherror::Error::root(
            MdlValidationError::IssuerSignedSchema(join(&violations)),
        ))
    }
}

/// Validates the tag-normalized Mobile Security Object against its schema.
pub(crate) fn validate_mso(mso: &Value) -> Result<()> {
    let violations = mso_violations(mso);

    if violations.is_empty() {
        Ok(())
    } else {
        Err(bherror::Error::root(MdlValidationError::MsoSchema(join(
            &violations,
        ))))
    }
}

fn issuer_signed_violations(document: &Value) -> Vec<Violation> {
    let mut violations = Vec::new();

    let Some(entries) = document.as_map() else {
        return vec![Violation::new("/", "type", "must be a map")];
    };

    check_properties(entries, "", &["nameSpaces", "issuerAuth"], &mut violations);

    if let Some(name_spaces) = lookup(entries, "nameSpaces") {
        name_spaces_violations(name_spaces, &mut violations);
    }

    if let Some(issuer_auth) = lookup(entries, "issuerAuth") {
        issuer_auth_violations(issuer_auth, &mut violations);
    }

    violations
}

/// Flags missing required properties and properties outside `allowed` of a
/// map at `path`.
fn check_properties(
    entries: &[(Value, Value)],
    path: &str,
    allowed: &[&str],
    violations: &mut Vec<Violation>,
) {
    for required in allowed {
        if lookup(entries, required).is_none() {
            violations.push(Violation::new(
                format!("{path}/"),
                "required",
                format!("must have required property `{required}`"),
            ));
        }
    }

    for (key, _) in entries {
        match key.as_text() {
            Some(key) if allowed.contains(&key) => {}
            Some(key) => violations.push(Violation::new(
                format!("{path}/"),
                "additionalProperties",
                format!("must NOT have additional property `{key}`"),
            )),
            None => violations.push(Violation::new(
                format!("{path}/"),
                "type",
                "property names must be text strings",
            )),
        }
    }
}

fn name_spaces_violations(name_spaces: &Value, violations: &mut Vec<Violation>) {
    let Some(entries) = name_spaces.as_map() else {
        violations.push(Violation::new("/nameSpaces", "type", "must be a map"));
        return;
    };

    check_properties(
        entries,
        "/nameSpaces",
        &[NameSpace::Iso.as_str(), NameSpace::Domestic.as_str()],
        violations,
    );

    for (key, items) in entries {
        let Some(name_space) = key.as_text().and_then(NameSpace::from_identifier) else {
            continue;
        };

        namespace_items_violations(name_space, items, violations);
    }
}

fn namespace_items_violations(
    name_space: NameSpace,
    items: &Value,
    violations: &mut Vec<Violation>,
) {
    let path = format!("/nameSpaces/{name_space}");

    let Some(items) = items.as_array() else {
        violations.push(Violation::new(path, "type", "must be an array"));
        return;
    };

    if name_space == NameSpace::Domestic {
        if items.len() < DOMESTIC_MIN_ELEMENTS {
            violations.push(Violation::new(
                path.clone(),
                "minItems",
                format!("must contain at least {DOMESTIC_MIN_ELEMENTS} items"),
            ));
        }
        if items.len() > DOMESTIC_MAX_ELEMENTS {
            violations.push(Violation::new(
                path.clone(),
                "maxItems",
                format!("must contain at most {DOMESTIC_MAX_ELEMENTS} items"),
            ));
        }
    }

    let mut seen = Vec::new();

    for (index, item) in items.iter().enumerate() {
        let item_path = format!("{path}/{index}");

        let Some(entries) = item.as_map() else {
            violations.push(Violation::new(item_path, "type", "must be a map"));
            continue;
        };

        check_properties(
            entries,
            &item_path,
            &["digestID", "random", "elementIdentifier", "elementValue"],
            violations,
        );

        if let Some(digest_id) = lookup(entries, "digestID") {
            digest_id_violations(digest_id, &item_path, violations);
        }

        if let Some(random) = lookup(entries, "random") {
            if !random.is_bytes() {
                violations.push(Violation::new(
                    format!("{item_path}/random"),
                    "type",
                    "must be a byte string",
                ));
            }
        }

        let identifier = lookup(entries, "elementIdentifier");
        match identifier.map(Value::as_text) {
            Some(Some(identifier)) => {
                seen.push(identifier.to_owned());

                match element_kind(name_space, identifier) {
                    Some(kind) => {
                        if let Some(value) = lookup(entries, "elementValue") {
                            element_value_violations(kind, value, &item_path, violations);
                        }
                    }
                    None => violations.push(Violation::new(
                        format!("{item_path}/elementIdentifier"),
                        "enum",
                        format!("`{identifier}` is not a data element of namespace {name_space}"),
                    )),
                }
            }
            Some(None) => violations.push(Violation::new(
                format!("{item_path}/elementIdentifier"),
                "type",
                "must be a text string",
            )),
            None => {}
        }
    }

    // every ISO element is mandatory
    if name_space == NameSpace::Iso {
        for (identifier, _) in ISO_ELEMENTS {
            if !seen.iter().any(|seen| seen == identifier) {
                violations.push(Violation::new(
                    path.clone(),
                    "required",
                    format!("must contain element `{identifier}`"),
                ));
            }
        }
    }
}

fn digest_id_violations(digest_id: &Value, item_path: &str, violations: &mut Vec<Violation>) {
    let path = format!("{item_path}/digestID");

    let Some(digest_id) = digest_id.as_integer().map(i128::from) else {
        violations.push(Violation::new(path, "type", "must be an integer"));
        return;
    };

    if digest_id < 0 {
        violations.push(Violation::new(path, "minimum", "must not be negative"));
    } else if digest_id >= DIGEST_ID_LIMIT {
        violations.push(Violation::new(path, "maximum", "must be smaller than 2^31"));
    }
}

fn element_value_violations(
    kind: ElementKind,
    value: &Value,
    item_path: &str,
    violations: &mut Vec<Violation>,
) {
    let path = format!("{item_path}/elementValue");

    match kind {
        ElementKind::Text => {
            if !value.is_text() {
                violations.push(Violation::new(path, "type", "must be a text string"));
            }
        }
        ElementKind::Boolean => {
            if !value.is_bool() {
                violations.push(Violation::new(path, "type", "must be a boolean"));
            }
        }
        ElementKind::Bytes => {
            if !value.is_bytes() {
                violations.push(Violation::new(path, "type", "must be a byte string"));
            }
        }
        ElementKind::FullDate => {
            if !is_full_date(value) {
                violations.push(Violation::new(
                    path,
                    "pattern",
                    "must be a full-date string (YYYY-MM-DD)",
                ));
            }
        }
        ElementKind::DrivingPrivileges => {
            if let Err(err) = from_value::<Vec<DrivingPrivilege>>(value) {
                violations.push(Violation::new(
                    path,
                    "items",
                    format!("must be an array of driving privileges - {err}"),
                ));
            }
        }
    }
}

fn is_full_date(value: &Value) -> bool {
    value
        .as_text()
        .is_some_and(|text| chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok())
}

fn is_date_time(value: &Value) -> bool {
    value
        .as_text()
        .is_some_and(|text| chrono::DateTime::parse_from_rfc3339(text).is_ok())
}

fn issuer_auth_violations(issuer_auth: &Value, violations: &mut Vec<Violation>) {
    let Some(elements) = issuer_auth.as_array() else {
        violations.push(Violation::new("/issuerAuth", "type", "must be an array"));
        return;
    };

    if elements.len() != 4 {
        violations.push(Violation::new(
            "/issuerAuth",
            "items",
            "must have exactly 4 elements",
        ));
        return;
    }

    for index in [0usize, 2, 3] {
        if !elements[index].is_bytes() {
            violations.push(Violation::new(
                format!("/issuerAuth/{index}"),
                "type",
                "must be a byte string",
            ));
        }
    }

    if !elements[1].is_map() {
        violations.push(Violation::new("/issuerAuth/1", "type", "must be a map"));
    }
}

fn mso_violations(mso: &Value) -> Vec<Violation> {
    let mut violations = Vec::new();

    let Some(entries) = mso.as_map() else {
        return vec![Violation::new("/", "type", "must be a map")];
    };

    check_properties(
        entries,
        "",
        &[
            "version",
            "digestAlgorithm",
            "valueDigests",
            "deviceKeyInfo",
            "docType",
            "validityInfo",
            "status",
        ],
        &mut violations,
    );

    check_const(entries, "version", "1.0", &mut violations);
    check_const(entries, "digestAlgorithm", "SHA-256", &mut violations);
    check_const(entries, "docType", MDL_DOCUMENT_TYPE, &mut violations);

    if let Some(value_digests) = lookup(entries, "valueDigests") {
        value_digests_violations(value_digests, &mut violations);
    }

    if let Some(device_key_info) = lookup(entries, "deviceKeyInfo") {
        device_key_info_violations(device_key_info, &mut violations);
    }

    if let Some(validity_info) = lookup(entries, "validityInfo") {
        validity_info_violations(validity_info, &mut violations);
    }

    if let Some(status) = lookup(entries, "status") {
        status_violations(status, &mut violations);
    }

    violations
}

fn check_const(
    entries: &[(Value, Value)],
    property: &str,
    expected: &str,
    violations: &mut Vec<Violation>,
) {
    if let Some(value) = lookup(entries, property) {
        if value.as_text() != Some(expected) {
            violations.push(Violation::new(
                format!("/{property}"),
                "const",
                format!("must be \"{expected}\""),
            ));
        }
    }
}

fn value_digests_violations(value_digests: &Value, violations: &mut Vec<Violation>) {
    let Some(entries) = value_digests.as_map() else {
        violations.push(Violation::new("/valueDigests", "type", "must be a map"));
        return;
    };

    for (key, digests) in entries {
        let Some(name_space) = key.as_text().and_then(NameSpace::from_identifier) else {
            violations.push(Violation::new(
                "/valueDigests",
                "enum",
                format!("{key:?} is not a known namespace"),
            ));
            continue;
        };

        let path = format!("/valueDigests/{name_space}");

        let Some(digests) = digests.as_map() else {
            violations.push(Violation::new(path, "type", "must be a map"));
            continue;
        };

        for (digest_id, digest) in digests {
            let in_range = digest_id
                .as_integer()
                .map(i128::from)
                .is_some_and(|id| (0..DIGEST_ID_LIMIT).contains(&id));

            if !in_range {
                violations.push(Violation::new(
                    path.clone(),
                    "propertyNames",
                    "digest IDs must be unsigned integers smaller than 2^31",
                ));
            }

            if !digest.is_bytes() {
                violations.push(Violation::new(
                    format!("{path}/{digest_id:?}"),
                    "type",
                    "must be a byte string",
                ));
            }
        }
    }
}

fn device_key_info_violations(device_key_info: &Value, violations: &mut Vec<Violation>) {
    let Some(entries) = device_key_info.as_map() else {
        violations.push(Violation::new("/deviceKeyInfo", "type", "must be a map"));
        return;
    };

    check_properties(
        entries,
        "/deviceKeyInfo",
        &["deviceKey", "keyAuthorizations"],
        violations,
    );

    if let Some(device_key) = lookup(entries, "deviceKey") {
        if !device_key.is_map() {
            violations.push(Violation::new(
                "/deviceKeyInfo/deviceKey",
                "type",
                "must be a map",
            ));
        }
    }

    if let Some(key_authorizations) = lookup(entries, "keyAuthorizations") {
        let Some(entries) = key_authorizations.as_map() else {
            violations.push(Violation::new(
                "/deviceKeyInfo/keyAuthorizations",
                "type",
                "must be a map",
            ));
            return;
        };

        check_properties(
            entries,
            "/deviceKeyInfo/keyAuthorizations",
            &["nameSpaces"],
            violations,
        );

        let name_spaces = lookup(entries, "nameSpaces").and_then(Value::as_array);
        match name_spaces {
            Some(name_spaces) => {
                for name_space in name_spaces {
                    let known = name_space
                        .as_text()
                        .and_then(NameSpace::from_identifier)
                        .is_some();

                    if !known {
                        violations.push(Violation::new(
                            "/deviceKeyInfo/keyAuthorizations/nameSpaces",
                            "enum",
                            format!("{name_space:?} is not a known namespace"),
                        ));
                    }
                }
            }
            None => violations.push(Violation::new(
                "/deviceKeyInfo/keyAuthorizations/nameSpaces",
                "type",
                "must be an array",
            )),
        }
    }
}

fn validity_info_violations(validity_info: &Value, violations: &mut Vec<Violation>) {
    let Some(entries) = validity_info.as_map() else {
        violations.push(Violation::new("/validityInfo", "type", "must be a map"));
        return;
    };

    check_properties(
        entries,
        "/validityInfo",
        &["signed", "validFrom", "validUntil"],
        violations,
    );

    for field in ["signed", "validFrom", "validUntil"] {
        if let Some(value) = lookup(entries, field) {
            if !is_date_time(value) {
                violations.push(Violation::new(
                    format!("/validityInfo/{field}"),
                    "format",
                    "must be a date-time string",
                ));
            }
        }
    }
}

fn status_violations(status: &Value, violations: &mut Vec<Violation>) {
    let Some(entries) = status.as_map() else {
        violations.push(Violation::new("/status", "type", "must be a map"));
        return;
    };

    check_properties(entries, "/status", &["status_list"], violations);

    let Some(status_list) = lookup(entries, "status_list") else {
        return;
    };
    let Some(entries) = status_list.as_map() else {
        violations.push(Violation::new(
            "/status/status_list",
            "type",
            "must be a map",
        ));
        return;
    };

    check_properties(entries, "/status/status_list", &["idx", "uri"], violations);

    if let Some(idx) = lookup(entries, "idx") {
        let valid = idx.as_integer().map(i128::from).is_some_and(|idx| idx >= 0);
        if !valid {
            violations.push(Violation::new(
                "/status/status_list/idx",
                "type",
                "must be an unsigned integer",
            ));
        }
    }

    if let Some(uri) = lookup(entries, "uri") {
        if !uri.is_text() {
            violations.push(Violation::new(
                "/status/status_list/uri",
                "type",
                "must be a text string",
            ));
        }
    }
}
