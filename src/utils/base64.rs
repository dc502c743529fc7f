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

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

/// Decodes the given `payload` as a `base64url`-encoded string **without
/// padding** into bytes.
pub(crate) fn base64_url_decode<T: AsRef<[u8]>>(payload: T) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(payload)
}

/// Returns the `base64url`-encoded string **without padding** of the given
/// `payload`.
#[cfg(test)]
pub(crate) fn base64_url_encode<T: AsRef<[u8]>>(payload: T) -> String {
    URL_SAFE_NO_PAD.encode(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_padding() {
        let err = base64_url_decode("SGVsbG8sIFdvcmxkIQ==").unwrap_err();
        assert!(matches!(err, base64::DecodeError::InvalidPadding));
    }

    #[test]
    fn decode_rejects_invalid_alphabet() {
        let err = base64_url_decode("inv@lid").unwrap_err();
        assert!(matches!(err, base64::DecodeError::InvalidByte(3, b'@')));
    }

    #[test]
    fn round_trip() {
        let payload = [0xDE, 0xAD, 0xBE, 0xEF];
        let encoded = base64_url_encode(payload);
        assert_eq!(encoded, "3q2-7w");
        assert_eq!(base64_url_decode(&encoded).unwrap(), payload);
    }
}
