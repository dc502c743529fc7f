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

//! This module implements the `IssuerAuth` data model based on the findings
//! from [ISO/IEC 18013-5:2021][1], [RFC 8152][2] and [RFC 9052][3], together
//! with its validation state machine.
//!
//! Validation is strictly sequential: protected header, unprotected header
//! with the document signing certificate, Mobile Security Object (schema,
//! digests, device key, validity window) and finally the `COSE_Sign1`
//! signature.  The first failing stage aborts the run.
//!
//! [1]: <https://www.iso.org/standard/69084.html>
//! [2]: <https://datatracker.ietf.org/doc/rfc8152/>
//! [3]: <https://datatracker.ietf.org/doc/rfc9052/>

use std::collections::{BTreeMap, BTreeSet};

use bh_jws_utils::{Es256Verifier, SignatureVerifier as _};
use bherror::traits::{ForeignBoxed as _, ForeignError as _, PropagateError as _};
use chrono::{DateTime, Utc};
use ciborium::Value;
use coset::{AsCborValue, CoseSign1};
use openssl::{
    bn::BigNum,
    ec::{EcGroup, EcKey},
    nid::Nid,
    x509::X509,
};
use serde::Deserialize;

use super::{from_value, issuer_signed::IssuerSignedItem, Bytes, DigestId, NameSpace};
use crate::{
    decode,
    error::{MdlValidationError, Result},
    schema,
    utils::{digest::sha256, x509::validate_document_signing_certificate},
};

/// The `COSE_Sign1` label of the `alg` protected header parameter.
const COSE_HEADER_ALG: i128 = 1;

/// The `COSE` algorithm identifier of `ES256`.
const COSE_ALG_ES256: i128 = -7;

/// The `COSE_Key` labels a device key must hold: `kty` (1), `crv` (-1),
/// `x` (-2) and `y` (-3).
const DEVICE_KEY_LABELS: [i64; 4] = [1, -1, -2, -3];

/// The `COSE_Key` key type identifier of EC2 (elliptic curve) keys.
const COSE_KEY_TYPE_EC2: i128 = 2;

/// The `COSE_Key` curve identifier of P-256.
const COSE_CURVE_P256: i128 = 1;

/// `IssuerAuth` as defined in the section `9.1.2.4` of the [ISO/IEC
/// 18013-5:2021][1] standard: an untagged `COSE_Sign1` 4-tuple of protected
/// header bytes, unprotected header map, payload bytes and signature bytes.
///
/// [1]: <https://www.iso.org/standard/69084.html>
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IssuerAuth(Bytes, Value, Bytes, Bytes);

impl IssuerAuth {
    /// The serialized protected header.
    pub fn protected(&self) -> &[u8] {
        self.0.as_slice()
    }

    /// The unprotected header map.
    pub fn unprotected(&self) -> &Value {
        &self.1
    }

    /// The payload, i.e. the serialized `MobileSecurityObjectBytes`.
    pub fn payload(&self) -> &[u8] {
        self.2.as_slice()
    }

    /// The raw `r ‖ s` ECDSA signature.
    pub fn signature(&self) -> &[u8] {
        self.3.as_slice()
    }

    /// Runs the full issuer-auth validation sequence.
    ///
    /// `name_spaces` is the **tag-preserving** decode of the document's
    /// `nameSpaces` map; the digest checks re-serialize its items byte-exact,
    /// including their tag-24 wrappers.
    pub(crate) fn validate(
        &self,
        root_certificate: &X509,
        name_spaces: &Value,
        current_time: u64,
    ) -> Result<()> {
        self.validate_protected_header()?;

        let signing_certificate =
            validate_document_signing_certificate(self.unprotected(), root_certificate, current_time)?;

        let mso = self.mso()?;
        mso.validate_digests(name_spaces)?;
        mso.device_key_info.validate_device_key()?;
        mso.validity_info.validate(current_time)?;

        self.verify_signature(&signing_certificate)
    }

    /// Asserts the protected header is a map holding exactly `alg = ES256`.
    fn validate_protected_header(&self) -> Result<()> {
        let error = |message: &str| {
            bherror::Error::root(MdlValidationError::InvalidProtectedHeader(
                message.to_owned(),
            ))
        };

        let header: Value = ciborium::from_reader(self.protected())
            .match_foreign_err(|err| {
                MdlValidationError::InvalidProtectedHeader(format!("failed to decode - {err}"))
            })?;

        let Some(entries) = header.as_map() else {
            return Err(error("not a Map"));
        };

        if entries.len() > 1 {
            return Err(error("must not contain extra parameters"));
        }

        let alg = entries
            .iter()
            .find_map(|(label, value)| {
                (label.as_integer().map(i128::from) == Some(COSE_HEADER_ALG)).then_some(value)
            })
            .ok_or_else(|| error("missing the alg (1) parameter"))?;

        if alg.as_integer().map(i128::from) != Some(COSE_ALG_ES256) {
            return Err(error("alg (1) must be ES256 (-7)"));
        }

        Ok(())
    }

    /// Decodes and schema-validates the Mobile Security Object from the
    /// payload.
    fn mso(&self) -> Result<MobileSecurityObject> {
        let mso = decode::tag_normalizing(self.payload())?;

        schema::validate_mso(&mso)?;

        from_value(&mso).map_err(|err| bherror::Error::root(MdlValidationError::MsoSchema(err)))
    }

    /// Verifies the `ES256` signature over the `COSE_Sign1` `Sig_structure`
    /// using the document signing certificate's public key.
    ///
    /// Any failure of the verification machinery itself is reported with the
    /// same code as a bad signature.
    fn verify_signature(&self, signing_certificate: &X509) -> Result<()> {
        let engine_error = |message: String| {
            bherror::Error::root(MdlValidationError::SignatureVerification(message))
        };

        let cose_sign1 = CoseSign1::from_cbor_value(self.to_cbor_value())
            .map_err(|err| engine_error(format!("invalid COSE_Sign1 - {err}")))?;

        let public_key = signing_certificate
            .public_key()
            .and_then(|key| key.ec_key())
            .foreign_err(|| {
                MdlValidationError::SignatureVerification(
                    "document signing certificate does not hold an EC key".to_owned(),
                )
            })?;

        let public_jwk = bh_jws_utils::openssl_ec_pub_key_to_jwk(&public_key, None).with_err(|| {
            MdlValidationError::SignatureVerification(
                "failed to encode the signing key as a JWK".to_owned(),
            )
        })?;

        cose_sign1.verify_signature(&[], |signature, data| {
            let verified = Es256Verifier
                .verify(data, signature, &public_jwk)
                .foreign_boxed_err(|| {
                    MdlValidationError::SignatureVerification(
                        "error while verifying signature".to_owned(),
                    )
                })?;

            if !verified {
                return Err(bherror::Error::root(
                    MdlValidationError::SignatureNotVerified,
                ));
            }

            Ok(())
        })
    }

    /// Rebuilds the `COSE_Sign1` 4-tuple as a _CBOR_ value.
    fn to_cbor_value(&self) -> Value {
        Value::Array(vec![
            Value::Bytes(self.protected().to_vec()),
            self.1.clone(),
            Value::Bytes(self.payload().to_vec()),
            Value::Bytes(self.signature().to_vec()),
        ])
    }
}

/// `MobileSecurityObject` as defined in the section `9.1.2.4` of the
/// [ISO/IEC 18013-5:2021][1] standard, decoded from the tag-normalized
/// payload.
///
/// [1]: <https://www.iso.org/standard/69084.html>
#[derive(Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MobileSecurityObject {
    version: String,
    digest_algorithm: String,
    value_digests: ValueDigests,
    pub(crate) device_key_info: DeviceKeyInfo,
    doc_type: String,
    pub(crate) validity_info: ValidityInfo,
    status: StatusClaim,
}

impl MobileSecurityObject {
    /// The MSO version; pinned to `1.0` by the schema.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The digest algorithm; pinned to `SHA-256` by the schema.
    pub fn digest_algorithm(&self) -> &str {
        &self.digest_algorithm
    }

    /// The document type; pinned to `org.iso.18013.5.1.mDL` by the schema.
    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    /// The pointer to the credential's status.
    pub fn status(&self) -> &StatusClaim {
        &self.status
    }

    /// Recomputes the digest of every issuer-signed item and compares it
    /// against the digests stored in this MSO.
    ///
    /// `name_spaces` is the tag-preserving `nameSpaces` map; every item is
    /// re-serialized including its tag-24 wrapper, so the digest covers the
    /// exact bytes the issuer signed over.
    pub(crate) fn validate_digests(&self, name_spaces: &Value) -> Result<()> {
        let internal = |message: &str| {
            bherror::Error::root(MdlValidationError::CborDecode(message.to_owned()))
        };

        let entries = name_spaces
            .as_map()
            .ok_or_else(|| internal("`nameSpaces` must be a map"))?;

        for (name_space, items) in entries {
            let name_space = name_space
                .as_text()
                .and_then(NameSpace::from_identifier)
                .ok_or_else(|| internal("unknown namespace in `nameSpaces`"))?;

            let items = items
                .as_array()
                .ok_or_else(|| internal("namespace items must be an array"))?;

            for item in items {
                self.validate_item_digest(name_space, item)?;
            }
        }

        Ok(())
    }

    fn validate_item_digest(&self, name_space: NameSpace, item: &Value) -> Result<()> {
        let internal = |message: &str| {
            bherror::Error::root(MdlValidationError::CborDecode(message.to_owned()))
        };

        // the digest covers the serialized tagged item; `Value` serialization
        // preserves map entry ordering, so the original bytes are reproduced
        let mut tagged_bytes = Vec::new();
        ciborium::into_writer(item, &mut tagged_bytes)
            .map_err(|_| internal("failed to re-serialize IssuerSignedItem"))?;
        let calculated = sha256(&tagged_bytes);

        let Value::Tag(_, contents) = item else {
            return Err(internal("IssuerSignedItem is not tagged"));
        };
        let item_bytes = contents
            .as_bytes()
            .ok_or_else(|| internal("IssuerSignedItem must wrap a byte string"))?;
        let item: IssuerSignedItem = ciborium::from_reader(item_bytes.as_slice())
            .match_foreign_err(|err| MdlValidationError::CborDecode(err.to_string()))?;

        let digests = self.value_digests.0.get(&name_space);

        let Some(expected) = digests.and_then(|digests| digests.get(&item.digest_id)) else {
            let available = digests
                .map(|digests| {
                    digests
                        .keys()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default();

            return Err(bherror::Error::root(MdlValidationError::MissingDigest {
                digest_id: item.digest_id,
                name_space,
                available: format!("[{available}]"),
            }));
        };

        if expected.as_slice() != calculated.as_slice() {
            return Err(bherror::Error::root(MdlValidationError::DigestMismatch {
                element_identifier: item.element_identifier,
                digest_id: item.digest_id,
                name_space,
                expected: hex::encode(expected.as_slice()),
                calculated: hex::encode(calculated),
            }));
        }

        Ok(())
    }
}

/// `ValueDigests` as defined in the section `9.1.2.4` of the [ISO/IEC
/// 18013-5:2021][1] standard.
///
/// [1]: <https://www.iso.org/standard/69084.html>
#[derive(Debug, PartialEq, Deserialize)]
pub struct ValueDigests(BTreeMap<NameSpace, BTreeMap<DigestId, Bytes>>);

/// `DeviceKeyInfo` as defined in the section `9.1.2.4` of the [ISO/IEC
/// 18013-5:2021][1] standard.
///
/// The device key is kept as a raw label-to-value map so that the key-set
/// check can see every parameter the credential carries.
///
/// [1]: <https://www.iso.org/standard/69084.html>
#[derive(Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceKeyInfo {
    pub(crate) device_key: BTreeMap<i64, Value>,
    key_authorizations: KeyAuthorizations,
}

impl DeviceKeyInfo {
    /// The namespaces the device key is authorized to sign over.
    pub fn key_authorizations(&self) -> &KeyAuthorizations {
        &self.key_authorizations
    }

    /// Asserts the device key is a well-formed `COSE_Key` holding exactly an
    /// EC2 public key on P-256 whose coordinates form a valid curve point.
    pub(crate) fn validate_device_key(&self) -> Result<()> {
        let labels: BTreeSet<i64> = self.device_key.keys().copied().collect();
        if labels != BTreeSet::from(DEVICE_KEY_LABELS) {
            return Err(bherror::Error::root(
                MdlValidationError::DeviceKeyParameters,
            ));
        }

        let parameter =
            |label: i64| self.device_key.get(&label).expect("label checked above");

        if parameter(1).as_integer().map(i128::from) != Some(COSE_KEY_TYPE_EC2) {
            return Err(bherror::Error::root(MdlValidationError::DeviceKeyType));
        }

        if parameter(-1).as_integer().map(i128::from) != Some(COSE_CURVE_P256) {
            return Err(bherror::Error::root(MdlValidationError::DeviceKeyCurve));
        }

        let (Some(x), Some(y)) = (parameter(-2).as_bytes(), parameter(-3).as_bytes()) else {
            return Err(bherror::Error::root(
                MdlValidationError::DeviceKeyCoordinates,
            ));
        };

        import_p256_point(x, y)
    }
}

/// Imports `x`/`y` as an ECDSA public key on P-256, which also checks that
/// the coordinates form a valid point on the curve.
fn import_p256_point(x: &[u8], y: &[u8]) -> Result<()> {
    let point = || {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)?;
        let x = BigNum::from_slice(x)?;
        let y = BigNum::from_slice(y)?;

        EcKey::from_public_key_affine_coordinates(&group, &x, &y)
    };

    point()
        .map(|_| ())
        .foreign_err(|| MdlValidationError::DeviceKeyPoint)
}

/// `KeyAuthorizations` as defined in the section `9.1.2.4` of the [ISO/IEC
/// 18013-5:2021][1] standard.
///
/// [1]: <https://www.iso.org/standard/69084.html>
#[derive(Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyAuthorizations {
    name_spaces: Vec<NameSpace>,
}

impl KeyAuthorizations {
    /// The authorized namespaces.
    pub fn name_spaces(&self) -> &[NameSpace] {
        &self.name_spaces
    }
}

/// `ValidityInfo` as defined in the section `9.1.2.4` of the [ISO/IEC
/// 18013-5:2021][1] standard.
///
/// The timestamps keep their wire (RFC 3339) form so that violation messages
/// can cite the exact values the credential carries.
///
/// [1]: <https://www.iso.org/standard/69084.html>
#[derive(Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidityInfo {
    signed: String,
    valid_from: String,
    valid_until: String,
}

impl ValidityInfo {
    /// Validates the window against the current time, collecting every
    /// violated rule into one error.
    ///
    /// The rules: `signed` and `validFrom` must not be in the future,
    /// `validUntil` must be in the future, and `validFrom` must not precede
    /// `signed`.
    pub(crate) fn validate(&self, current_time: u64) -> Result<()> {
        let signed = parse_date_time(&self.signed, "signed")?;
        let valid_from = parse_date_time(&self.valid_from, "validFrom")?;
        let valid_until = parse_date_time(&self.valid_until, "validUntil")?;

        let now = DateTime::<Utc>::from_timestamp(current_time as i64, 0).ok_or_else(|| {
            bherror::Error::root(MdlValidationError::InvalidValidityInfo(
                "current time is out of range".to_owned(),
            ))
        })?;

        let mut violations = Vec::new();

        if signed > now {
            violations.push(format!("'signed' ({}) must be in the past", self.signed));
        }
        if valid_from > now {
            violations.push(format!(
                "'validFrom' ({}) must be in the past",
                self.valid_from
            ));
        }
        if valid_until <= now {
            violations.push(format!(
                "'validUntil' ({}) must be in the future",
                self.valid_until
            ));
        }
        if valid_from < signed {
            violations.push(format!(
                "'validFrom' ({}) must be equal or later than 'signed' ({})",
                self.valid_from, self.signed
            ));
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(bherror::Error::root(
                MdlValidationError::InvalidValidityInfo(violations.join(", ")),
            ))
        }
    }
}

fn parse_date_time(value: &str, field: &str) -> Result<DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|date_time| date_time.with_timezone(&Utc))
        .match_foreign_err(|_| {
            MdlValidationError::InvalidValidityInfo(format!(
                "'{field}' ({value}) is not a valid date-time"
            ))
        })
}

/// The `status` claim of the MSO, pointing to the credential's entry in a
/// Status List per the _Section 6.3.2._ of the [Token Status List (TSL)][1].
///
/// [1]: <https://www.ietf.org/archive/id/draft-ietf-oauth-status-list-15.html>
#[derive(Debug, PartialEq, Deserialize)]
pub struct StatusClaim {
    status_list: StatusListPointer,
}

impl StatusClaim {
    /// Get the index within the Status List.
    pub fn idx(&self) -> u64 {
        self.status_list.idx
    }

    /// Get the URI of the Status List.
    pub fn uri(&self) -> &str {
        &self.status_list.uri
    }
}

/// Pointer to a single entry of a Status List.
#[derive(Debug, PartialEq, Deserialize)]
pub struct StatusListPointer {
    idx: u64,
    uri: String,
}
