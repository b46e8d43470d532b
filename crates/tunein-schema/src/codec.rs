//! Hex encoding of text into fixed-width record fields.
//!
//! Record templates store every value as an uppercase hex dump of the raw
//! bytes the runtime reads, so strings have to be laid out byte-for-byte:
//! null-terminated, fixed-width, or "wide" (each byte followed by a zero byte,
//! as produced by two-byte-per-character text tables).

/// Target width of an encoded field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    /// The encoded bytes plus one trailing zero byte.
    Terminated,
    /// Exactly this many bytes: truncated or zero-padded.
    Fixed(usize),
}

/// Character layout of an encoded field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Plain UTF-8 bytes.
    #[default]
    Narrow,
    /// Every byte interleaved with a zero byte, followed by one extra zero.
    Wide,
}

/// Lay out `text` as raw field bytes.
pub fn encode_bytes(text: &str, width: Width, encoding: Encoding) -> Vec<u8> {
    let mut bytes = match encoding {
        Encoding::Narrow => text.as_bytes().to_vec(),
        Encoding::Wide => {
            let mut wide = Vec::with_capacity(text.len() * 2 + 1);
            for &byte in text.as_bytes() {
                wide.push(byte);
                wide.push(0);
            }
            wide.push(0);
            wide
        }
    };

    let len = match width {
        Width::Terminated => bytes.len() + 1,
        Width::Fixed(n) => n,
    };
    bytes.resize(len, 0);
    bytes
}

/// Encode `text` as an uppercase hex string of [`encode_bytes`].
pub fn encode_hex(text: &str, width: Width) -> String {
    hex::encode_upper(encode_bytes(text, width, Encoding::Narrow))
}

/// Encode `text` as wide (zero-interleaved) uppercase hex.
pub fn encode_wide_hex(text: &str, width: Width) -> String {
    hex::encode_upper(encode_bytes(text, width, Encoding::Wide))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn terminated_adds_one_zero_byte() {
        assert_eq!(
            encode_hex("Radio_ABCD/01", Width::Terminated),
            "526164696F5F414243442F303100"
        );
        assert_eq!(encode_hex("", Width::Terminated), "00");
    }

    #[test]
    fn fixed_width_truncates_and_pads() {
        assert_eq!(encode_hex("ABCDEF", Width::Fixed(4)), "41424344");
        assert_eq!(encode_hex("AB", Width::Fixed(4)), "41420000");
        assert_eq!(encode_hex("zz_DCBA", Width::Fixed(8)), "7A7A5F4443424100");
    }

    #[test]
    fn wide_terminated_ends_in_two_zero_bytes() {
        assert_eq!(
            encode_wide_hex("Test Radio", Width::Terminated),
            "5400650073007400200052006100640069006F000000"
        );
    }

    #[test]
    fn wide_fixed_width() {
        assert_eq!(encode_wide_hex("AB", Width::Fixed(4)), "41004200");
        assert_eq!(encode_wide_hex("A", Width::Fixed(6)), "410000000000");
    }

    #[test]
    fn encoding_is_deterministic() {
        let a = encode_wide_hex("Déjà vu", Width::Terminated);
        let b = encode_wide_hex("Déjà vu", Width::Terminated);
        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn four_char_ids_round_trip(id in "[A-Za-z0-9_]{4}") {
            let encoded = encode_hex(&id, Width::Fixed(4));
            let decoded = hex::decode(&encoded).unwrap();
            prop_assert_eq!(decoded, id.as_bytes().to_vec());
        }

        #[test]
        fn terminated_is_one_longer(text in ".{0,64}") {
            let bytes = encode_bytes(&text, Width::Terminated, Encoding::Narrow);
            prop_assert_eq!(bytes.len(), text.len() + 1);
            prop_assert_eq!(bytes.last().copied(), Some(0));
        }
    }
}
