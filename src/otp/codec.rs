//! Secret codecs: hex and base32 text forms of raw key material.
//!
//! Hex is the storage encoding used by the credential store; base32 is
//! the provisioning encoding most authenticator apps exchange. Both
//! directions are provided, plus a zero-allocation hex decode path with
//! an explicit query-required-length phase.

use crate::otp::types::OathError;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Hex
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Number of bytes `hex_decode` would produce for `text`.
///
/// Validates the input: odd length or a non-hex character fails with
/// `InvalidHex`, the same as the decode itself.
pub fn hex_decoded_len(text: &str) -> Result<usize, OathError> {
    if text.len() % 2 != 0 {
        return Err(OathError::InvalidHex("odd number of hex digits".into()));
    }
    if let Some(bad) = text.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(OathError::InvalidHex(format!("unexpected character {:?}", bad)));
    }
    Ok(text.len() / 2)
}

/// Decode a hex string (case-insensitive, high nibble first).
pub fn hex_decode(text: &str) -> Result<Vec<u8>, OathError> {
    let len = hex_decoded_len(text)?;
    let mut out = vec![0u8; len];
    hex::decode_to_slice(text, &mut out)
        .map_err(|e| OathError::InvalidHex(e.to_string()))?;
    Ok(out)
}

/// Decode a hex string into a caller-supplied buffer, returning the
/// number of bytes written.
///
/// The buffer may be exactly sized or larger; a smaller buffer fails
/// with `BufferTooSmall`, which still reports the required length.
pub fn hex_decode_into(text: &str, out: &mut [u8]) -> Result<usize, OathError> {
    let required = hex_decoded_len(text)?;
    if out.len() < required {
        return Err(OathError::BufferTooSmall { required, provided: out.len() });
    }
    hex::decode_to_slice(text, &mut out[..required])
        .map_err(|e| OathError::InvalidHex(e.to_string()))?;
    Ok(required)
}

/// Encode raw bytes as lower-case hex, two characters per byte.
pub fn bin2hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Base32
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Decode an RFC 4648 base32 secret.
///
/// ASCII spaces are stripped and the input is upper-cased before
/// decoding, so `"mzxw 6==="` and `"MZXW6==="` are equivalent. Missing
/// trailing padding is restored from the length remainder.
pub fn base32_decode(text: &str) -> Result<Vec<u8>, OathError> {
    let cleaned: String = text.chars().filter(|c| *c != ' ').collect::<String>().to_uppercase();
    let padded = pad_base32(&cleaned)?;
    base32::decode(base32::Alphabet::Rfc4648 { padding: true }, &padded)
        .ok_or_else(|| OathError::InvalidBase32("non-alphabet character in input".into()))
}

/// Encode raw bytes to padded, upper-case RFC 4648 base32.
pub fn base32_encode(bytes: &[u8]) -> String {
    base32::encode(base32::Alphabet::Rfc4648 { padding: true }, bytes)
}

/// Pad a stripped base32 string to a multiple of 8 with '='.
///
/// The RFC 4648 remainder table: 2 and 4 and 5 and 7 characters of a
/// final block take 6, 4, 3 and 1 pad characters; remainders 1, 3 and 6
/// cannot occur in valid base32.
fn pad_base32(s: &str) -> Result<String, OathError> {
    let pad = match s.len() % 8 {
        0 => 0,
        2 => 6,
        4 => 4,
        5 => 3,
        7 => 1,
        r => {
            return Err(OathError::InvalidBase32(format!(
                "length remainder {} is not decodable",
                r
            )))
        }
    };
    Ok(format!("{}{}", s, "=".repeat(pad)))
}
