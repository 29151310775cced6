//! Code-string codec: inflates the fixed-width hex wire format and decodes
//! the base64(zlib(...)) compressed wire format into the canonical
//! "`hash time hash time ...`" textual form the rest of the matcher consumes.

use base64::Engine;

/// True iff `s` looks like a compressed/encoded blob rather than a canonical
/// decimal-space code string. The canonical form is pure digits and spaces,
/// so the presence of any base64-alphabet letter (or `-`/`_` from the
/// URL-safe alphabet) is the heuristic the original service uses to decide
/// whether to run the decoder before handing a query to the matcher.
#[must_use]
pub fn looks_compressed(s: &str) -> bool {
    s.chars()
        .any(|c| c.is_ascii_alphabetic() || matches!(c, '/' | '+' | '_' | '-'))
}

/// Inflates a fixed-width hex code string: `n` 5-hex-char time fields
/// followed by `n` 5-hex-char hash fields, each field 20 bits.
///
/// Returns the canonical "`hash time hash time ...`" string.
pub fn inflate(hex: &str) -> Result<String, InflateError> {
    if hex.len() % 10 != 0 {
        return Err(InflateError::BadLength(hex.len()));
    }

    let n = hex.len() / 10;
    let (time_part, hash_part) = hex.split_at(n * 5);

    let times = time_part
        .as_bytes()
        .chunks(5)
        .map(parse_hex_field)
        .collect::<Result<Vec<u32>, _>>()?;
    let hashes = hash_part
        .as_bytes()
        .chunks(5)
        .map(parse_hex_field)
        .collect::<Result<Vec<u32>, _>>()?;

    debug_assert_eq!(times.len(), hashes.len());

    let mut out = String::with_capacity(hex.len());
    for (i, (hash, time)) in hashes.iter().zip(times.iter()).enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&hash.to_string());
        out.push(' ');
        out.push_str(&time.to_string());
    }
    Ok(out)
}

fn parse_hex_field(field: &[u8]) -> Result<u32, InflateError> {
    let s = std::str::from_utf8(field).map_err(|_| InflateError::NotHex)?;
    u32::from_str_radix(s, 16).map_err(|_| InflateError::NotHex)
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InflateError {
    #[error("hex code string length {0} is not a multiple of 10")]
    BadLength(usize),
    #[error("code string contains non-hex characters")]
    NotHex,
}

/// Decodes a base64(zlib(payload)) compressed code string into canonical
/// form, inflating the hex wire format first if the decompressed payload
/// turns out to be the fixed-width hex form rather than already-canonical
/// text.
///
/// Returns `None` on any base64, zlib, or inflate failure. The empty input
/// decodes to the empty string without error.
#[must_use]
pub fn decode(compressed: &str) -> Option<String> {
    if compressed.is_empty() {
        return Some(String::new());
    }

    let bytes = decode_base64(compressed)?;
    let inflated_bytes = miniz_oxide::inflate::decompress_to_vec_zlib(&bytes).ok()?;
    let text = String::from_utf8(inflated_bytes).ok()?;

    if text.contains(' ') {
        Some(text)
    } else {
        inflate(&text).ok()
    }
}

/// Accepts both the URL-safe base64 alphabet (with or without padding) and
/// the standard alphabet, matching the permissive decoding the original
/// `base64.urlsafe_b64decode` call performs in practice.
fn decode_base64(s: &str) -> Option<Vec<u8>> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(s.trim_end_matches('='))
        .or_else(|_| base64::engine::general_purpose::URL_SAFE.decode(s))
        .or_else(|_| base64::engine::general_purpose::STANDARD.decode(s))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_compressed_detects_letters_and_urlsafe_chars() {
        assert!(looks_compressed("eJwLycgs"));
        assert!(looks_compressed("abc-123_x"));
        assert!(!looks_compressed("100 0 200 500"));
        assert!(!looks_compressed(""));
    }

    #[test]
    fn inflate_rejects_bad_length() {
        assert_eq!(inflate("abc").unwrap_err(), InflateError::BadLength(3));
    }

    #[test]
    fn inflate_parses_two_pairs() {
        // n = 2: times "00001","00002" then hashes "00020","0003A"
        let hex = "0000100002000200003A";
        assert_eq!(hex.len(), 20);
        let out = inflate(hex).unwrap();
        assert_eq!(out, "32 1 58 2");
    }

    #[test]
    fn decode_empty_is_empty() {
        assert_eq!(decode(""), Some(String::new()));
    }

    #[test]
    fn decode_garbage_fails() {
        assert_eq!(decode("not*valid*base64!!"), None);
    }

    #[test]
    fn decode_round_trips_canonical_text() {
        let canonical = "100 0 200 500 100 1000";
        let compressed = miniz_oxide::deflate::compress_to_vec_zlib(canonical.as_bytes(), 6);
        let encoded =
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(compressed);
        assert_eq!(decode(&encoded).as_deref(), Some(canonical));
    }
}
