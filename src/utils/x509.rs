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

//! Validation of the document signing certificate carried in the `x5chain`
//! unprotected header parameter.
//!
//! The trust model is deliberately narrow: the certificate must be an
//! end-entity certificate issued and signed directly by the supplied trusted
//! root, and must be time-valid at the injected verification instant.

use std::cmp::Ordering;

use bherror::traits::ForeignError as _;
use ciborium::Value;
use openssl::{asn1::Asn1Time, x509::X509};
use x509_parser::prelude::*;

use crate::error::{MdlValidationError, Result};

/// The `COSE` label of the `x5chain` header parameter, per [RFC 9360][1].
///
/// [1]: <https://www.rfc-editor.org/rfc/rfc9360.html>
const COSE_HEADER_X5CHAIN: i128 = 33;

/// Validates the unprotected header and the document signing certificate
/// within it, returning the certificate for the later signature check.
///
/// The unprotected header must hold exactly the `x5chain` (33) parameter
/// with a single DER certificate; the certificate must not be a CA, must be
/// time-valid at `current_time`, must name the supplied root as its issuer
/// and must carry the root's signature.
pub(crate) fn validate_document_signing_certificate(
    unprotected: &Value,
    root_certificate: &X509,
    current_time: u64,
) -> Result<X509> {
    let error = |message: String| {
        bherror::Error::root(MdlValidationError::InvalidUnprotectedHeader(message))
    };

    let Some(entries) = unprotected.as_map() else {
        return Err(error("not a Map".to_owned()));
    };

    let x5chain_only = entries.len() == 1
        && entries[0].0.as_integer().map(i128::from) == Some(COSE_HEADER_X5CHAIN);
    if !x5chain_only {
        return Err(error(
            "must contain exactly the x5chain (33) parameter".to_owned(),
        ));
    }

    let der = entries[0]
        .1
        .as_bytes()
        .ok_or_else(|| error("x5chain (33) must be a byte string".to_owned()))?;

    let certificate = X509::from_der(der).match_foreign_err(|err| {
        MdlValidationError::InvalidUnprotectedHeader(format!(
            "Failed to parse document signing certificate as X509Certificate - {err}"
        ))
    })?;

    if is_ca_certificate(der)? {
        return Err(error(
            "Document signing certificate must not be a CA certificate".to_owned(),
        ));
    }

    check_time_validity(&certificate, current_time)?;

    let issuer = certificate
        .issuer_name()
        .to_der()
        .foreign_err(foreign_error)?;
    let root_subject = root_certificate
        .subject_name()
        .to_der()
        .foreign_err(foreign_error)?;
    if issuer != root_subject {
        return Err(error(
            "Certificate issuer does not match root subject".to_owned(),
        ));
    }

    let root_public_key = root_certificate.public_key().foreign_err(foreign_error)?;
    let signed_by_root = certificate
        .verify(&root_public_key)
        .foreign_err(foreign_error)?;
    if !signed_by_root {
        return Err(error(
            "Document signing certificate is not signed by the supplied root certificate"
                .to_owned(),
        ));
    }

    Ok(certificate)
}

fn foreign_error() -> MdlValidationError {
    MdlValidationError::InvalidUnprotectedHeader(
        "failed to process document signing certificate".to_owned(),
    )
}

/// Reads the `basicConstraints.cA` flag of the certificate.
///
/// The `openssl` crate exposes no basic-constraints getter, so the DER is
/// re-parsed with `x509-parser` for this single bit.
fn is_ca_certificate(der: &[u8]) -> Result<bool> {
    let (_, parsed) = X509Certificate::from_der(der).map_err(|err| {
        bherror::Error::root(MdlValidationError::InvalidUnprotectedHeader(format!(
            "Failed to parse document signing certificate as X509Certificate - {err}"
        )))
    })?;

    Ok(parsed.extensions().iter().any(|extension| {
        matches!(
            extension.parsed_extension(),
            ParsedExtension::BasicConstraints(constraints) if constraints.ca
        )
    }))
}

/// Asserts `notBefore <= current_time <= notAfter`.
fn check_time_validity(certificate: &X509, current_time: u64) -> Result<()> {
    let now = Asn1Time::from_unix(current_time as i64).foreign_err(foreign_error)?;

    let not_yet_valid = certificate
        .not_before()
        .compare(&now)
        .foreign_err(foreign_error)?
        == Ordering::Greater;
    let expired = certificate
        .not_after()
        .compare(&now)
        .foreign_err(foreign_error)?
        == Ordering::Less;

    if not_yet_valid || expired {
        return Err(bherror::Error::root(
            MdlValidationError::InvalidUnprotectedHeader(format!(
                "Document signing certificate is not time-valid - notBefore: {}, notAfter: {}",
                certificate.not_before(),
                certificate.not_after()
            )),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::utils::test::{TestCa, TEST_NOW};

    fn x5chain_header(der: Vec<u8>) -> Value {
        Value::Map(vec![(Value::Integer(33.into()), Value::Bytes(der))])
    }

    #[test]
    fn accepts_root_issued_signing_certificate() {
        let ca = TestCa::generate("mdl conformance test root");
        let (_, certificate) = ca.issue_signing_certificate();
        let header = x5chain_header(certificate.to_der().unwrap());

        let validated =
            validate_document_signing_certificate(&header, &ca.certificate, TEST_NOW).unwrap();

        assert_eq!(
            validated.to_der().unwrap(),
            certificate.to_der().unwrap()
        );
    }

    #[test]
    fn rejects_header_without_exactly_x5chain() {
        let ca = TestCa::generate("mdl conformance test root");

        let err = validate_document_signing_certificate(
            &Value::Map(vec![]),
            &ca.certificate,
            TEST_NOW,
        )
        .unwrap_err();
        assert_matches!(
            err.error,
            MdlValidationError::InvalidUnprotectedHeader(message)
                if message.contains("exactly the x5chain (33)")
        );

        let (_, certificate) = ca.issue_signing_certificate();
        let header = Value::Map(vec![
            (
                Value::Integer(33.into()),
                Value::Bytes(certificate.to_der().unwrap()),
            ),
            (Value::Integer(4.into()), Value::Bytes(vec![1])),
        ]);

        let err =
            validate_document_signing_certificate(&header, &ca.certificate, TEST_NOW).unwrap_err();
        assert_matches!(err.error, MdlValidationError::InvalidUnprotectedHeader(_));
    }

    #[test]
    fn rejects_garbage_certificate_bytes() {
        let ca = TestCa::generate("mdl conformance test root");
        let header = x5chain_header(vec![0x30, 0x03, 0x01, 0x02, 0x03]);

        let err =
            validate_document_signing_certificate(&header, &ca.certificate, TEST_NOW).unwrap_err();

        assert_matches!(
            err.error,
            MdlValidationError::InvalidUnprotectedHeader(message)
                if message.contains("Failed to parse document signing certificate as X509Certificate")
        );
    }

    #[test]
    fn rejects_ca_certificate_as_signer() {
        let ca = TestCa::generate("mdl conformance test root");
        // the root itself carries basicConstraints CA:TRUE
        let header = x5chain_header(ca.certificate.to_der().unwrap());

        let err =
            validate_document_signing_certificate(&header, &ca.certificate, TEST_NOW).unwrap_err();

        assert_matches!(
            err.error,
            MdlValidationError::InvalidUnprotectedHeader(message)
                if message.contains("must not be a CA certificate")
        );
    }

    #[test]
    fn rejects_certificate_outside_validity_window() {
        let ca = TestCa::generate("mdl conformance test root");
        let (_, certificate) = ca.issue_signing_certificate();
        let header = x5chain_header(certificate.to_der().unwrap());

        // 20 years past the fixture window
        let late = TEST_NOW + 20 * 365 * 24 * 60 * 60;
        let err =
            validate_document_signing_certificate(&header, &ca.certificate, late).unwrap_err();

        assert_matches!(
            err.error,
            MdlValidationError::InvalidUnprotectedHeader(message)
                if message.contains("not time-valid")
        );
    }

    #[test]
    fn rejects_foreign_root() {
        let ca = TestCa::generate("mdl conformance test root");
        let other = TestCa::generate("some other root");
        let (_, certificate) = ca.issue_signing_certificate();
        let header = x5chain_header(certificate.to_der().unwrap());

        let err =
            validate_document_signing_certificate(&header, &other.certificate, TEST_NOW)
                .unwrap_err();

        assert_matches!(
            err.error,
            MdlValidationError::InvalidUnprotectedHeader(message)
                if message == "Certificate issuer does not match root subject"
        );
    }

    #[test]
    fn rejects_forged_issuer_name() {
        // certificate issued by `other` but naming the trusted root's subject
        // as its issuer; the DN check passes, the signature check must not
        let ca = TestCa::generate("mdl conformance test root");
        let other = TestCa::generate("mdl conformance test root");
        let (_, certificate) = other.issue_signing_certificate();
        let header = x5chain_header(certificate.to_der().unwrap());

        let err =
            validate_document_signing_certificate(&header, &ca.certificate, TEST_NOW).unwrap_err();

        assert_matches!(
            err.error,
            MdlValidationError::InvalidUnprotectedHeader(message)
                if message.contains("not signed by the supplied root certificate")
        );
    }
}
