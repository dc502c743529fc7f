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

//! This module provides the [`Verifier`] type which is used to check issued
//! mDL credentials for conformance.

use bherror::traits::ForeignError as _;
use openssl::x509::X509;

use crate::{
    decode,
    error::{MdlValidationError, Result},
    models::{issuer_signed::IssuerSigned, lookup},
    schema, tags,
    utils::base64::base64_url_decode,
};

/// Conformance verifier for issued mDL (`mso_mdoc`) credentials.
///
/// The verifier holds the trusted root certificate the document signing
/// certificate must chain to.  Each [`verify_credential`][Self::verify_credential]
/// call is an independent, pure computation; a [`Verifier`] may be shared
/// freely between callers.
#[derive(Debug)]
pub struct Verifier {
    root_certificate: X509,
}

impl Verifier {
    /// Creates a new [`Verifier`] trusting the given root certificate.
    pub fn new(root_certificate: X509) -> Self {
        Self { root_certificate }
    }

    /// Creates a new [`Verifier`], parsing the trusted root certificate from
    /// PEM bytes.
    pub fn from_pem(root_certificate_pem: &[u8]) -> Result<Self> {
        let root_certificate = X509::from_pem(root_certificate_pem)
            .match_foreign_err(|err| MdlValidationError::InvalidRootCertificate(err.to_string()))?;

        Ok(Self::new(root_certificate))
    }

    /// Verifies the given base64url-encoded _CBOR_ credential.
    ///
    /// `current_time` is the verification instant in seconds since the Unix
    /// epoch; both the document signing certificate and the MSO validity
    /// window are evaluated against it.
    ///
    /// Returns `Ok(true)` only if every stage succeeds.  The stages run in a
    /// fixed order and the first failure aborts the run: base64url decoding,
    /// tag-preserving decoding, tag placement validation, tag-normalizing
    /// decoding, `IssuerSigned` schema validation, digest-ID uniqueness,
    /// portrait format, and `IssuerAuth` validation (headers, certificate,
    /// MSO, signature).
    pub fn verify_credential(&self, credential: &str, current_time: u64) -> Result<bool> {
        let credential_bytes = base64_url_decode(credential)
            .match_foreign_err(|err| MdlValidationError::Base64UrlDecode(err.to_string()))?;

        let preserved = decode::tag_preserving(&credential_bytes)?;
        tags::validate(&preserved)?;

        let normalized = decode::tag_normalizing(&credential_bytes)?;
        schema::validate_issuer_signed(&normalized)?;

        let issuer_signed = IssuerSigned::from_normalized(&normalized)?;
        issuer_signed.name_spaces().validate_digest_ids()?;
        issuer_signed.name_spaces().validate_portrait()?;

        // the digest checks need the tag-preserving items to reproduce the
        // exact signed bytes, so the preserved tree is consulted again here
        let name_spaces = preserved
            .as_map()
            .and_then(|entries| lookup(entries, "nameSpaces"))
            .ok_or_else(|| {
                bherror::Error::root(MdlValidationError::CborDecode(
                    "`nameSpaces` is missing".to_owned(),
                ))
            })?;

        issuer_signed
            .issuer_auth()
            .validate(&self.root_certificate, name_spaces, current_time)?;

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use ciborium::Value;

    use super::*;
    use crate::utils::{
        base64::base64_url_encode,
        test::{CredentialBuilder, TestCa, TEST_NOW},
    };

    fn verifier(ca: &TestCa) -> Verifier {
        Verifier::from_pem(&ca.pem()).unwrap()
    }

    #[test]
    fn valid_credential_verifies() {
        let ca = TestCa::generate("mdl conformance test root");
        let credential = CredentialBuilder::new(&ca).build();

        let valid = verifier(&ca).verify_credential(&credential, TEST_NOW).unwrap();

        assert!(valid);
    }

    #[test]
    fn invalid_base64url_fails() {
        let ca = TestCa::generate("mdl conformance test root");

        let err = verifier(&ca)
            .verify_credential("not!base64url", TEST_NOW)
            .unwrap_err();

        assert_eq!(err.error.code(), "INVALID_BASE64URL");
    }

    #[test]
    fn malformed_cbor_fails() {
        let ca = TestCa::generate("mdl conformance test root");
        // map header announcing one entry, truncated
        let credential = base64_url_encode([0xa1]);

        let err = verifier(&ca)
            .verify_credential(&credential, TEST_NOW)
            .unwrap_err();

        assert_eq!(err.error.code(), "CBOR_DECODE_ERROR");
    }

    #[test]
    fn trailing_bytes_fail() {
        let ca = TestCa::generate("mdl conformance test root");
        let mut bytes = CredentialBuilder::new(&ca).build_bytes();
        bytes.push(0x00);

        let err = verifier(&ca)
            .verify_credential(&base64_url_encode(bytes), TEST_NOW)
            .unwrap_err();

        assert_matches!(
            err.error,
            MdlValidationError::CborDecode(message) if message.contains("trailing")
        );
    }

    #[test]
    fn untagged_full_date_fails_before_digest_validation() {
        let ca = TestCa::generate("mdl conformance test root");
        // the stored digest is consistent with the untagged item bytes, so
        // only the tag check can reject this credential
        let credential = CredentialBuilder::new(&ca)
            .set_iso_element("birth_date", Value::Text("1985-04-12".to_owned()))
            .build();

        let err = verifier(&ca)
            .verify_credential(&credential, TEST_NOW)
            .unwrap_err();

        assert_eq!(err.error.code(), "INVALID_TAGS");
        assert!(err.error.to_string().contains("birth_date"));
    }

    #[test]
    fn missing_iso_element_fails_schema_validation() {
        let ca = TestCa::generate("mdl conformance test root");
        let credential = CredentialBuilder::new(&ca)
            .remove_iso_element("given_name")
            .build();

        let err = verifier(&ca)
            .verify_credential(&credential, TEST_NOW)
            .unwrap_err();

        assert_eq!(err.error.code(), "SCHEMA_VALIDATION_ERROR");
        assert!(err.error.to_string().contains("given_name"));
    }

    #[test]
    fn unknown_iso_element_fails_schema_validation() {
        let ca = TestCa::generate("mdl conformance test root");
        let credential = CredentialBuilder::new(&ca)
            .add_iso_element("shoe_size", Value::Text("46".to_owned()))
            .build();

        let err = verifier(&ca)
            .verify_credential(&credential, TEST_NOW)
            .unwrap_err();

        assert_eq!(err.error.code(), "SCHEMA_VALIDATION_ERROR");
        assert!(err.error.to_string().contains("shoe_size"));
    }

    #[test]
    fn colliding_digest_ids_fail() {
        let ca = TestCa::generate("mdl conformance test root");
        let credential = CredentialBuilder::new(&ca)
            .with_colliding_digest_ids()
            .build();

        let err = verifier(&ca)
            .verify_credential(&credential, TEST_NOW)
            .unwrap_err();

        assert_eq!(err.error.code(), "INVALID_DIGEST_IDS");
        assert_eq!(
            err.error.to_string(),
            "Digest IDs are not unique for namespace org.iso.18013.5.1"
        );
    }

    #[test]
    fn portrait_soi_marker_is_enforced() {
        let ca = TestCa::generate("mdl conformance test root");
        // Exif header instead of the accepted JFIF/Adobe/DQT markers
        let credential = CredentialBuilder::new(&ca)
            .set_iso_element(
                "portrait",
                Value::Bytes(vec![0xFF, 0xD8, 0xFF, 0xE1, 0x00, 0xFF, 0xD9]),
            )
            .build();

        let err = verifier(&ca)
            .verify_credential(&credential, TEST_NOW)
            .unwrap_err();

        assert_eq!(err.error.code(), "INVALID_PORTRAIT");
        assert!(err.error.to_string().contains("ffd8ffe1"));
    }

    #[test]
    fn portrait_eoi_marker_is_enforced() {
        let ca = TestCa::generate("mdl conformance test root");
        let credential = CredentialBuilder::new(&ca)
            .set_iso_element(
                "portrait",
                Value::Bytes(vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0xFF, 0xE0]),
            )
            .build();

        let err = verifier(&ca)
            .verify_credential(&credential, TEST_NOW)
            .unwrap_err();

        assert_eq!(err.error.code(), "INVALID_PORTRAIT");
        assert!(err.error.to_string().contains("ffe0"));
    }

    #[test]
    fn tampered_digest_fails() {
        let ca = TestCa::generate("mdl conformance test root");
        let credential = CredentialBuilder::new(&ca)
            .with_digest_override("family_name", b"incorrect-digest".to_vec())
            .build();

        let err = verifier(&ca)
            .verify_credential(&credential, TEST_NOW)
            .unwrap_err();

        assert_eq!(err.error.code(), "INVALID_DIGESTS");
        let message = err.error.to_string();
        assert!(message.contains("family_name"));
        // the literal `incorrect-digest` bytes, rendered as lowercase hex
        assert!(message.contains("Expected 696e636f72726563742d646967657374"));
        assert!(message.contains("but calculated"));
    }

    #[test]
    fn extra_device_key_parameter_fails() {
        let ca = TestCa::generate("mdl conformance test root");
        let credential = CredentialBuilder::new(&ca)
            .with_extra_device_key_parameter(999)
            .build();

        let err = verifier(&ca)
            .verify_credential(&credential, TEST_NOW)
            .unwrap_err();

        assert_eq!(err.error.code(), "INVALID_DEVICE_KEY");
        assert_eq!(
            err.error.to_string(),
            "DeviceKey must contain exactly the keys [1, -1, -2, -3]"
        );
    }

    #[test]
    fn expired_credential_fails() {
        const DAY: i64 = 24 * 60 * 60;

        let ca = TestCa::generate("mdl conformance test root");
        // `validUntil` one day in the past
        let credential = CredentialBuilder::new(&ca)
            .with_window(-2 * DAY, -2 * DAY, -DAY)
            .build();

        let err = verifier(&ca)
            .verify_credential(&credential, TEST_NOW)
            .unwrap_err();

        assert_eq!(err.error.code(), "INVALID_VALIDITY_INFO");
        let message = err.error.to_string();
        assert!(message.contains("'validUntil'"));
        assert!(message.contains("must be in the future"));
    }

    #[test]
    fn wrong_root_fails() {
        let ca = TestCa::generate("mdl conformance test root");
        let other = TestCa::generate("some other root");
        let credential = CredentialBuilder::new(&ca).build();

        let err = verifier(&other)
            .verify_credential(&credential, TEST_NOW)
            .unwrap_err();

        assert_eq!(err.error.code(), "INVALID_UNPROTECTED_HEADER");
        assert!(err
            .error
            .to_string()
            .contains("Certificate issuer does not match root subject"));
    }

    #[test]
    fn corrupt_signature_fails() {
        let ca = TestCa::generate("mdl conformance test root");
        let credential = CredentialBuilder::new(&ca).with_corrupt_signature().build();

        let err = verifier(&ca)
            .verify_credential(&credential, TEST_NOW)
            .unwrap_err();

        assert_eq!(err.error.code(), "INVALID_SIGNATURE");
        assert_eq!(err.error.to_string(), "Signature not verified");
    }

    #[test]
    fn verification_is_idempotent() {
        let ca = TestCa::generate("mdl conformance test root");
        let credential = CredentialBuilder::new(&ca)
            .with_digest_override("family_name", b"incorrect-digest".to_vec())
            .build();
        let verifier = verifier(&ca);

        let first = verifier
            .verify_credential(&credential, TEST_NOW)
            .unwrap_err();
        let second = verifier
            .verify_credential(&credential, TEST_NOW)
            .unwrap_err();

        assert_eq!(first.error.code(), second.error.code());
        assert_eq!(first.error.to_string(), second.error.to_string());
    }

    #[test]
    fn invalid_root_pem_fails() {
        let err = Verifier::from_pem(b"not a certificate").unwrap_err();

        assert_eq!(err.error.code(), "VALIDATION_FAILED");
        assert_matches!(err.error, MdlValidationError::InvalidRootCertificate(_));
    }
}
