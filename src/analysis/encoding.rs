//! Text encoding detection for input files.
//!
//! A byte order mark wins; otherwise valid UTF-8 is taken as is, and anything
//! else goes through statistical detection.

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};

/// Decoded file content and the name of the encoding it was read with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    pub encoding: &'static str,
}

/// Detect the encoding of `bytes` and decode them.
///
/// Returns an error message when the bytes do not decode cleanly.
pub fn decode(bytes: &[u8]) -> Result<DecodedText, String> {
    let encoding = detect(bytes);
    // `decode` sniffs and strips a BOM itself
    let (text, actual, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(format!("content is not valid {} text", actual.name()));
    }
    Ok(DecodedText {
        text: text.into_owned(),
        encoding: actual.name(),
    })
}

/// Guess the encoding of `bytes` without decoding.
pub fn detect(bytes: &[u8]) -> &'static Encoding {
    if let Some((encoding, _bom_len)) = Encoding::for_bom(bytes) {
        return encoding;
    }
    if std::str::from_utf8(bytes).is_ok() {
        return UTF_8;
    }
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    detector.guess(None, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_and_bom() {
        let plain = decode("SELECT 'é'".as_bytes()).unwrap();
        assert_eq!(plain.encoding, "UTF-8");
        assert_eq!(plain.text, "SELECT 'é'");

        let mut with_bom = vec![0xEF, 0xBB, 0xBF];
        with_bom.extend_from_slice(b"SELECT 1");
        let decoded = decode(&with_bom).unwrap();
        assert_eq!(decoded.text, "SELECT 1");
    }

    #[test]
    fn test_utf16_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "GO".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.encoding, "UTF-16LE");
        assert_eq!(decoded.text, "GO");
    }

    #[test]
    fn test_legacy_single_byte_text_is_detected() {
        let (bytes, _, _) = encoding_rs::WINDOWS_1252
            .encode("SELECT nom FROM clients WHERE ville = 'Orléans' AND catégorie = 'élève' -- déjà vérifié");
        let decoded = decode(&bytes).unwrap();
        assert_ne!(decoded.encoding, "UTF-8");
        assert!(decoded.text.contains("Orléans"));
    }
}
