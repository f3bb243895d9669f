/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Conversions between the key encodings used on either side of the client.
//!
//! The backend hands out its VAPID public key as unpadded base64url text, while the platform
//! push service wants raw bytes. In the other direction, the subscription's `p256dh` and `auth`
//! keys come from the platform as raw bytes and are uploaded as standard, padded base64.

use base64::{engine::general_purpose::STANDARD, Engine};

/// Uncompressed P-256 points are 65 bytes and start with 0x04.
pub const VAPID_KEY_LENGTH: usize = 65;
const UNCOMPRESSED_POINT_TAG: u8 = 0x04;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyFormatError {
    #[error("Key is empty")]
    Empty,

    #[error("Key is not valid base64: {0}")]
    InvalidBase64(String),

    #[error("Key is {0} bytes, expected an uncompressed P-256 point")]
    WrongLength(usize),

    #[error("Key is not an uncompressed P-256 point")]
    NotUncompressedPoint,
}

/// Decode a base64url string (padding optional) to raw bytes.
pub fn decode_key(base64url: &str) -> Result<Vec<u8>, KeyFormatError> {
    let trimmed = base64url.trim();
    if trimmed.is_empty() {
        return Err(KeyFormatError::Empty);
    }
    let padding = "=".repeat((4 - trimmed.len() % 4) % 4);
    let standard = format!("{trimmed}{padding}")
        .replace('-', "+")
        .replace('_', "/");
    STANDARD
        .decode(standard)
        .map_err(|e| KeyFormatError::InvalidBase64(e.to_string()))
}

/// Encode raw key bytes as standard, padded base64.
pub fn encode_key(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Check that decoded VAPID key bytes can be handed to the platform as an application server key.
pub fn validate_vapid_key(bytes: &[u8]) -> Result<(), KeyFormatError> {
    if bytes.len() != VAPID_KEY_LENGTH {
        return Err(KeyFormatError::WrongLength(bytes.len()));
    }
    if bytes[0] != UNCOMPRESSED_POINT_TAG {
        return Err(KeyFormatError::NotUncompressedPoint);
    }
    Ok(())
}
