//! Content-derived request identifiers
//!
//! The synthesis service names its output after an ID chosen by the client, so the
//! ID must be reproducible bit-for-bit: a 31-multiplier rolling hash over UTF-16
//! code units with 32-bit two's-complement wraparound, followed by an absolute value.

use crate::types::RequestId;

/// Derive the request ID for a document's text
///
/// Identical text always yields the same ID. The empty string yields 0.
/// `i32::MIN` has no positive `i32` counterpart, so the absolute value is taken as
/// `u32` (`2147483648`), which is what the service has always received for it.
pub fn generate_id(text: &str) -> RequestId {
    let hash = text.encode_utf16().fold(0i32, |hash, unit| {
        hash.wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit))
    });
    RequestId::new(hash.unsigned_abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_zero() {
        assert_eq!(generate_id(""), RequestId::new(0));
    }

    #[test]
    fn known_values() {
        let cases = [
            ("a", 97),
            ("hello", 99162322),
            ("hello world", 1794106052),
            // negative before the absolute value
            ("The quick brown fox jumps over the lazy dog", 609428141),
        ];

        for (text, expected) in cases {
            assert_eq!(generate_id(text).get(), expected, "id for {text:?}");
        }
    }

    #[test]
    fn overflow_wraps_to_i32_min() {
        // hashes to exactly i32::MIN; a wider or saturating accumulator would not
        assert_eq!(generate_id("polygenelubricants").get(), 2_147_483_648);
    }

    #[test]
    fn hashes_utf16_code_units() {
        assert_eq!(generate_id("నమస్కారం").get(), 1574267018);
        // a surrogate pair contributes two units
        assert_eq!(generate_id("😀").get(), 1772899);
    }

    #[test]
    fn colliding_texts_share_an_id() {
        assert_eq!(generate_id("Aa"), generate_id("BB"));
        assert_eq!(generate_id("Aa").get(), 2112);
    }

    #[test]
    fn deterministic_across_calls() {
        let text = "ఒక చిన్న పరీక్ష\nwith mixed scripts and a long tail ".repeat(50);
        assert_eq!(generate_id(&text), generate_id(&text));
    }
}
