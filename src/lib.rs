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

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! This crate provides conformance verification of issued mDL (`mso_mdoc`)
//! Credentials in compliance with the [ISO/IEC 18013-5:2021][1] standard.
//!
//! It is intended to be used by a test harness which validates credentials
//! produced by a credential-issuer service against a trusted root
//! certificate.  The verification is a pure, synchronous computation over the
//! credential bytes; there is no issuance, persistence or network transport
//! here.
//!
//! # Details
//!
//! The crate defines the following modules.
//!
//!   * The high-level [`verifier`] module with the [`Verifier`] entry point.
//!   * The [`error`] module describing the error values.
//!   * Low-level data model -- [`models`].
//!
//! A verification run performs, in order: base64url decoding, a
//! tag-preserving CBOR decode, CBOR tag placement validation, a
//! tag-normalizing CBOR decode of the same bytes, structural (schema)
//! validation of the `IssuerSigned` document, namespace content validation
//! (digest-ID uniqueness, portrait byte format) and full `IssuerAuth`
//! validation (COSE headers, document signing certificate, Mobile Security
//! Object, ECDSA signature).  The first failing stage aborts the run with an
//! error carrying a human-readable message and a stable machine-readable
//! code.
//!
//! # Examples
//!
//! ```no_run
//! use bhmdl_conformance::Verifier;
//!
//! let root_certificate_pem = b"-----BEGIN CERTIFICATE-----...";
//! let verifier = Verifier::from_pem(root_certificate_pem).unwrap();
//!
//! // Base64url-encoded CBOR `IssuerSigned` document, as produced by the
//! // credential issuer.
//! let credential = "omppc3N1ZXJBdXRo...";
//! let current_time = 1700000000;
//!
//! match verifier.verify_credential(credential, current_time) {
//!     Ok(valid) => assert!(valid),
//!     Err(err) => eprintln!("[{}] {}", err.error.code(), err.error),
//! }
//! ```
//!
//! [1]: <https://www.iso.org/standard/69084.html>

mod decode;
pub mod error;
pub mod models;
mod schema;
mod tags;
mod utils;
pub mod verifier;

pub use error::{MdlValidationError, Result};
pub use verifier::Verifier;
