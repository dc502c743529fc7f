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

//! Dual-mode decoding of untrusted _CBOR_ bytes.
//!
//! The same byte buffer is decoded twice during verification.  The
//! tag-preserving mode keeps every tagged value as an explicit
//! [`Value::Tag`] node, which is what the tag placement checks operate on.
//! The tag-normalizing mode resolves the registered `mdoc` tags (`24`,
//! `1004`, `0`) to their inner values, producing a tree directly usable for
//! schema, digest and business-rule validation.  Collapsing the two modes
//! into one decoder would either make tag compliance unverifiable or force
//! every consumer to unwrap tags by hand.

use bherror::traits::ForeignError as _;
use ciborium::Value;

use crate::{
    error::{MdlValidationError, Result},
    models::{MDOC_BYTES_CBOR_TAG, MDOC_FULL_DATE_CBOR_TAG, MDOC_TDATE_CBOR_TAG},
};

/// Decodes `bytes` as a single _CBOR_ item, keeping tags as explicit
/// [`Value::Tag`] nodes.
///
/// Trailing bytes after the item are an error, not silently ignored.
pub(crate) fn tag_preserving(bytes: &[u8]) -> Result<Value> {
    let mut remaining = bytes;
    let value: Value = ciborium::from_reader(&mut remaining)
        .match_foreign_err(|err| MdlValidationError::CborDecode(err.to_string()))?;

    if !remaining.is_empty() {
        return Err(bherror::Error::root(MdlValidationError::CborDecode(
            format!(
                "{} trailing byte(s) after the top-level item",
                remaining.len()
            ),
        )));
    }

    Ok(value)
}

/// Decodes `bytes` as a single _CBOR_ item, resolving the registered `mdoc`
/// tags.
///
/// Tag `24` is resolved by recursively re-decoding (again tag-normalizing)
/// its byte-string contents; tags `1004` and `0` are resolved by substituting
/// their text contents.  Any other tag is kept as-is.
pub(crate) fn tag_normalizing(bytes: &[u8]) -> Result<Value> {
    let value = tag_preserving(bytes)?;
    normalize(value)
}

fn normalize(value: Value) -> Result<Value> {
    Ok(match value {
        Value::Tag(MDOC_BYTES_CBOR_TAG, inner) => {
            let Value::Bytes(bytes) = *inner else {
                return Err(bherror::Error::root(MdlValidationError::CborDecode(
                    format!("tag {MDOC_BYTES_CBOR_TAG} contents must be a byte string"),
                )));
            };
            tag_normalizing(&bytes)?
        }
        Value::Tag(tag @ (MDOC_FULL_DATE_CBOR_TAG | MDOC_TDATE_CBOR_TAG), inner) => {
            let Value::Text(text) = *inner else {
                return Err(bherror::Error::root(MdlValidationError::CborDecode(
                    format!("tag {tag} contents must be a text string"),
                )));
            };
            Value::Text(text)
        }
        Value::Tag(tag, inner) => Value::Tag(tag, Box::new(normalize(*inner)?)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(normalize)
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Map(entries) => Value::Map(
            entries
                .into_iter()
                .map(|(key, value)| Ok((normalize(key)?, normalize(value)?)))
                .collect::<Result<Vec<_>>>()?,
        ),
        other => other,
    })
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

    #[test]
    fn tag_preserving_keeps_tags() {
        let value = Value::Tag(
            MDOC_FULL_DATE_CBOR_TAG,
            Box::new(Value::Text("2024-10-20".to_owned())),
        );

        let decoded = tag_preserving(&encode(&value)).unwrap();

        assert_eq!(decoded, value);
    }

    #[test]
    fn tag_normalizing_resolves_registered_tags() {
        let inner = Value::Map(vec![(
            Value::Text("birth_date".to_owned()),
            Value::Tag(
                MDOC_FULL_DATE_CBOR_TAG,
                Box::new(Value::Text("1980-01-02".to_owned())),
            ),
        )]);
        let wrapped = Value::Tag(MDOC_BYTES_CBOR_TAG, Box::new(Value::Bytes(encode(&inner))));

        let normalized = tag_normalizing(&encode(&wrapped)).unwrap();

        assert_eq!(
            normalized,
            Value::Map(vec![(
                Value::Text("birth_date".to_owned()),
                Value::Text("1980-01-02".to_owned()),
            )])
        );
    }

    #[test]
    fn tag_normalizing_resolves_tdate() {
        let value = Value::Tag(
            MDOC_TDATE_CBOR_TAG,
            Box::new(Value::Text("2024-10-20T12:00:00Z".to_owned())),
        );

        let normalized = tag_normalizing(&encode(&value)).unwrap();

        assert_eq!(normalized, Value::Text("2024-10-20T12:00:00Z".to_owned()));
    }

    #[test]
    fn tag_normalizing_keeps_unregistered_tags() {
        let value = Value::Tag(7007, Box::new(Value::Integer(1.into())));

        let normalized = tag_normalizing(&encode(&value)).unwrap();

        assert_eq!(normalized, value);
    }

    #[test]
    fn trailing_bytes_fail() {
        let mut bytes = encode(&Value::Integer(1.into()));
        bytes.push(0x00);

        let err = tag_preserving(&bytes).unwrap_err();

        assert_matches!(err.error, MdlValidationError::CborDecode(msg) if msg.contains("trailing"));
    }

    #[test]
    fn malformed_cbor_fails() {
        // map header announcing one entry, but no entry bytes follow
        let err = tag_preserving(&[0xa1]).unwrap_err();

        assert_matches!(err.error, MdlValidationError::CborDecode(_));
    }

    #[test]
    fn tag_24_without_bytes_fails() {
        let value = Value::Tag(MDOC_BYTES_CBOR_TAG, Box::new(Value::Integer(1.into())));

        let err = tag_normalizing(&encode(&value)).unwrap_err();

        assert_matches!(
            err.error,
            MdlValidationError::CborDecode(msg) if msg.contains("byte string")
        );
    }

    #[test]
    fn tag_1004_without_text_fails() {
        let value = Value::Tag(MDOC_FULL_DATE_CBOR_TAG, Box::new(Value::Integer(1.into())));

        let err = tag_normalizing(&encode(&value)).unwrap_err();

        assert_matches!(
            err.error,
            MdlValidationError::CborDecode(msg) if msg.contains("text string")
        );
    }
}
