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

//! This module defines the error values returned by the crate API.

use crate::models::{DigestId, NameSpace};

/// Error type used across the crate API.
///
/// Every variant renders a human-readable, stage-prefixed message through its
/// [`Display`][std::fmt::Display] implementation, and maps to a stable
/// machine-readable code through [`MdlValidationError::code`].  Harnesses
/// should match on the code rather than parse the message.
#[derive(strum_macros::Display, Debug, PartialEq, Clone)]
pub enum MdlValidationError {
    /// Error when the credential string is not valid base64url (without
    /// padding).
    #[strum(to_string = "Failed to decode base64url encoded credential - {0}")]
    Base64UrlDecode(String),
    /// Error when the credential bytes are not a single well-formed CBOR
    /// item.
    #[strum(to_string = "Failed to decode CBOR - {0}")]
    CborDecode(String),
    /// Error when a semantic position does not carry its required CBOR tag.
    #[strum(to_string = "Failed to validate tags - {0}")]
    InvalidTags(String),
    /// Error when the `IssuerSigned` document violates the envelope or
    /// namespace schemas.  All violations are aggregated into the message.
    #[strum(to_string = "IssuerSigned does not comply with schema - {0}")]
    IssuerSignedSchema(String),
    /// Error when two `IssuerSignedItem`s of the same namespace share a
    /// digest ID.
    #[strum(to_string = "Digest IDs are not unique for namespace {0}")]
    DuplicateDigestIds(NameSpace),
    /// Error when the `portrait` element is not a JPEG image, i.e. does not
    /// carry the expected SOI/EOI markers.
    #[strum(to_string = "Invalid portrait - expected {expected} but found {found}")]
    InvalidPortrait {
        /// Hex rendering of the accepted marker bytes.
        expected: String,
        /// Hex rendering of the offending bytes of the portrait.
        found: String,
    },
    /// Error when the `IssuerAuth` protected header is not exactly
    /// `{1: -7}`, i.e. `alg = ES256`.
    #[strum(to_string = "Failed to validate protected header - {0}")]
    InvalidProtectedHeader(String),
    /// Error when the `IssuerAuth` unprotected header does not hold exactly
    /// the `x5chain` (33) parameter, or the document signing certificate
    /// within it is not acceptable.
    #[strum(to_string = "Failed to validate unprotected header - {0}")]
    InvalidUnprotectedHeader(String),
    /// Error when the Mobile Security Object violates its schema.  All
    /// violations are aggregated into the message.
    #[strum(to_string = "MobileSecurityObject does not comply with schema - {0}")]
    MsoSchema(String),
    /// Error when the MSO holds no digest for an `IssuerSignedItem`.
    #[strum(
        to_string = "No digest found for digest ID {digest_id} in MSO namespace {name_space}: {available}"
    )]
    MissingDigest {
        /// Digest ID of the item without a digest.
        digest_id: DigestId,
        /// Namespace of the item.
        name_space: NameSpace,
        /// The digest IDs the MSO does hold for the namespace.
        available: String,
    },
    /// Error when a recomputed item digest does not match the digest stored
    /// in the MSO.  Both digests are rendered as lowercase hex.
    #[strum(
        to_string = "Digest mismatch for element identifier {element_identifier} with digest ID \
                     {digest_id} in namespace {name_space} - Expected {expected} but calculated \
                     {calculated}"
    )]
    DigestMismatch {
        /// Element identifier of the mismatched item.
        element_identifier: String,
        /// Digest ID of the mismatched item.
        digest_id: DigestId,
        /// Namespace of the mismatched item.
        name_space: NameSpace,
        /// The digest stored in the MSO, as lowercase hex.
        expected: String,
        /// The digest recomputed from the item bytes, as lowercase hex.
        calculated: String,
    },
    /// Error when the device key does not hold exactly the four `COSE_Key`
    /// EC2 parameters.
    #[strum(to_string = "DeviceKey must contain exactly the keys [1, -1, -2, -3]")]
    DeviceKeyParameters,
    /// Error when the device key type is not EC2.
    #[strum(to_string = "DeviceKey key type (1) must be EC2 (Elliptic Curve) (2)")]
    DeviceKeyType,
    /// Error when the device key curve is not P-256.
    #[strum(to_string = "DeviceKey curve (-1) must be P-256 (1)")]
    DeviceKeyCurve,
    /// Error when the device key coordinates are not byte strings.
    #[strum(to_string = "DeviceKey coordinates (-2, -3) must be byte strings")]
    DeviceKeyCoordinates,
    /// Error when the device key coordinates do not form a point on P-256.
    #[strum(to_string = "Invalid elliptic curve key")]
    DeviceKeyPoint,
    /// Error when the MSO validity window does not contain the current time,
    /// or is internally inconsistent.  All violations are aggregated into
    /// the message.
    #[strum(to_string = "One or more dates are invalid - {0}")]
    InvalidValidityInfo(String),
    /// Error when the `IssuerAuth` ECDSA signature does not verify.
    #[strum(to_string = "Signature not verified")]
    SignatureNotVerified,
    /// Error when the signature verification machinery itself fails, e.g.
    /// the `COSE_Sign1` structure or the signing key cannot be processed.
    #[strum(to_string = "Signature verification failed - {0}")]
    SignatureVerification(String),
    /// Error when the supplied trusted root certificate cannot be parsed.
    #[strum(to_string = "Failed to parse trusted root certificate - {0}")]
    InvalidRootCertificate(String),
}

impl MdlValidationError {
    /// Return the stable machine-readable code of this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Base64UrlDecode(_) => "INVALID_BASE64URL",
            Self::CborDecode(_) => "CBOR_DECODE_ERROR",
            Self::InvalidTags(_) => "INVALID_TAGS",
            Self::IssuerSignedSchema(_) => "SCHEMA_VALIDATION_ERROR",
            Self::DuplicateDigestIds(_) => "INVALID_DIGEST_IDS",
            Self::InvalidPortrait { .. } => "INVALID_PORTRAIT",
            Self::InvalidProtectedHeader(_) => "VALIDATION_FAILED",
            Self::InvalidUnprotectedHeader(_) => "INVALID_UNPROTECTED_HEADER",
            Self::MsoSchema(_) => "INVALID_SCHEMA",
            Self::MissingDigest { .. } | Self::DigestMismatch { .. } => "INVALID_DIGESTS",
            Self::DeviceKeyParameters
            | Self::DeviceKeyType
            | Self::DeviceKeyCurve
            | Self::DeviceKeyCoordinates
            | Self::DeviceKeyPoint => "INVALID_DEVICE_KEY",
            Self::InvalidValidityInfo(_) => "INVALID_VALIDITY_INFO",
            Self::SignatureNotVerified | Self::SignatureVerification(_) => "INVALID_SIGNATURE",
            Self::InvalidRootCertificate(_) => "VALIDATION_FAILED",
        }
    }
}

impl bherror::BhError for MdlValidationError {}

/// Type alias for [`bherror::Result`] types returned by the crate's API.
pub type Result<T> = bherror::Result<T, MdlValidationError>;
