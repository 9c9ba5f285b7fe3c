//! String codecs used by obfuscated decoder functions.
//!
//! Every decoder returns `None` on malformed input so callers can leave the
//! call site untouched instead of emitting a wrong literal.

use base64::Engine;
use base64::alphabet::Alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use rc4::consts::*;
use rc4::{Key, KeyInit, Rc4, StreamCipher};

/// Charset of the stock obfuscator Base64 decoder: lowercase first.
pub const OBFUSCATOR_BASE64_CHARSET: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789+/=";

pub const STANDARD_BASE64_CHARSET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/=";

pub const BASE32_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// 64 symbols plus the padding character.
pub const BASE64_CHARSET_LEN: usize = 65;

/// Decodes `input` with a 65-character charset (64 symbols, then padding).
pub fn base64_decode_bytes(input: &str, charset: &str) -> Option<Vec<u8>> {
    if charset.chars().count() != BASE64_CHARSET_LEN || !charset.is_ascii() {
        return None;
    }

    let (symbols, padding) = charset.split_at(64);
    let alphabet = Alphabet::new(symbols).ok()?;
    let config = GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true);
    let engine = GeneralPurpose::new(&alphabet, config);

    let body = match padding.chars().next() {
        Some(pad) => input.split(pad).next().unwrap_or_default(),
        None => input,
    };
    engine.decode(body).ok()
}

pub fn base64_decode(input: &str, charset: &str) -> Option<String> {
    base64_decode_bytes(input, charset).map(|bytes| bytes_to_string(&bytes))
}

/// Base64 first, then RC4 keyed by `key`.
pub fn rc4_decode(input: &str, key: &str, charset: &str) -> Option<String> {
    let mut data = base64_decode_bytes(input, charset)?;
    let key_bytes = latin1_bytes(key)?;
    rc4_apply(&key_bytes, &mut data)?;
    Some(bytes_to_string(&data))
}

macro_rules! rc4_dispatch {
    ($key:expr, $data:expr, $($len:literal => $size:ty),+ $(,)?) => {
        match $key.len() {
            $(
                $len => {
                    let mut cipher = Rc4::<$size>::new(Key::<$size>::from_slice($key));
                    cipher.apply_keystream($data);
                    Some(())
                }
            )+
            _ => None,
        }
    };
}

/// RC4 over `data` in place. Keys longer than 32 bytes are not supported.
pub fn rc4_apply(key: &[u8], data: &mut [u8]) -> Option<()> {
    rc4_dispatch!(key, data,
        1 => U1, 2 => U2, 3 => U3, 4 => U4, 5 => U5, 6 => U6, 7 => U7, 8 => U8,
        9 => U9, 10 => U10, 11 => U11, 12 => U12, 13 => U13, 14 => U14, 15 => U15, 16 => U16,
        17 => U17, 18 => U18, 19 => U19, 20 => U20, 21 => U21, 22 => U22, 23 => U23, 24 => U24,
        25 => U25, 26 => U26, 27 => U27, 28 => U28, 29 => U29, 30 => U30, 31 => U31, 32 => U32,
    )
}

/// Adobe Ascii85, with or without the `<~ ~>` frame.
pub fn ascii85_decode(input: &str) -> Option<String> {
    let framed = input.trim();
    let body = framed
        .strip_prefix("<~")
        .map_or(framed, |rest| rest.strip_suffix("~>").unwrap_or(rest));

    let mut out = Vec::with_capacity(body.len() * 4 / 5);
    let mut group = [0u8; 5];
    let mut filled = 0;

    for c in body.chars().filter(|c| !c.is_whitespace()) {
        if c == 'z' {
            if filled != 0 {
                return None;
            }
            out.extend_from_slice(&[0; 4]);
            continue;
        }
        if !('!'..='u').contains(&c) {
            return None;
        }
        group[filled] = c as u8 - b'!';
        filled += 1;
        if filled == 5 {
            out.extend_from_slice(&ascii85_group(&group)?);
            filled = 0;
        }
    }

    if filled == 1 {
        return None;
    }
    if filled > 0 {
        for slot in group.iter_mut().skip(filled) {
            *slot = b'u' - b'!';
        }
        let bytes = ascii85_group(&group)?;
        out.extend_from_slice(&bytes[..filled - 1]);
    }

    Some(bytes_to_string(&out))
}

fn ascii85_group(group: &[u8; 5]) -> Option<[u8; 4]> {
    let value = group
        .iter()
        .try_fold(0u64, |acc, digit| Some(acc * 85 + u64::from(*digit)))?;
    let value = u32::try_from(value).ok()?;
    Some(value.to_be_bytes())
}

/// RFC 4648 Base32. Padding is optional.
pub fn base32_decode(input: &str) -> Option<String> {
    let body = input.trim_end_matches('=');
    let mut out = Vec::with_capacity(body.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0;

    for c in body.chars() {
        let index = BASE32_ALPHABET.find(c.to_ascii_uppercase())?;
        buffer = (buffer << 5) | index as u32;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
            buffer &= (1 << bits) - 1;
        }
    }

    Some(bytes_to_string(&out))
}

/// Pairs of symbols from a 16-character table, high nibble first.
pub fn hex_table_decode(input: &str, table: &str) -> Option<String> {
    let symbols: Vec<char> = table.chars().collect();
    if !is_hex_table(table) {
        return None;
    }

    let chars: Vec<char> = input.chars().collect();
    if chars.len() % 2 != 0 {
        return None;
    }

    let nibble = |c: char| symbols.iter().position(|s| *s == c);
    let bytes = chars
        .chunks(2)
        .map(|pair| Some((nibble(pair[0])? * 16 + nibble(pair[1])?) as u8))
        .collect::<Option<Vec<u8>>>()?;

    Some(bytes_to_string(&bytes))
}

/// Sixteen distinct characters.
pub fn is_hex_table(table: &str) -> bool {
    let symbols: Vec<char> = table.chars().collect();
    symbols.len() == 16 && symbols.iter().enumerate().all(|(i, c)| !symbols[..i].contains(c))
}

/// UTF-8 when valid, otherwise one char per byte.
pub fn bytes_to_string(bytes: &[u8]) -> String {
    String::from_utf8(bytes.to_vec()).unwrap_or_else(|_| bytes.iter().map(|b| char::from(*b)).collect())
}

fn latin1_bytes(s: &str) -> Option<Vec<u8>> {
    s.chars().map(|c| u8::try_from(u32::from(c)).ok()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;

    fn encode_obfuscator_base64(text: &str) -> String {
        let standard = STANDARD.encode(text);
        let swap = |c: char| {
            if c.is_ascii_lowercase() {
                c.to_ascii_uppercase()
            } else if c.is_ascii_uppercase() {
                c.to_ascii_lowercase()
            } else {
                c
            }
        };
        standard.chars().map(swap).collect()
    }

    #[test]
    fn test_base64_standard_and_custom_charset() {
        assert_eq!(base64_decode("SGVsbG8=", STANDARD_BASE64_CHARSET).as_deref(), Some("Hello"));

        let encoded = encode_obfuscator_base64("World");
        assert_eq!(base64_decode(&encoded, OBFUSCATOR_BASE64_CHARSET).as_deref(), Some("World"));
    }

    #[test]
    fn test_base64_charset_must_be_65() {
        let short = &STANDARD_BASE64_CHARSET[..64];
        assert_eq!(base64_decode("SGVsbG8=", short), None);

        let long = format!("{STANDARD_BASE64_CHARSET}!");
        assert_eq!(base64_decode("SGVsbG8=", &long), None);
    }

    #[test]
    fn test_rc4_round_trip() {
        let key = "k3y!";
        let mut data = b"secret message".to_vec();
        rc4_apply(key.as_bytes(), &mut data).expect("supported key length");
        let encoded = STANDARD.encode(&data);

        assert_eq!(
            rc4_decode(&encoded, key, STANDARD_BASE64_CHARSET).as_deref(),
            Some("secret message")
        );
    }

    #[test]
    fn test_rc4_rejects_oversized_key() {
        let mut data = vec![1, 2, 3];
        assert!(rc4_apply(&[7u8; 40], &mut data).is_none());
    }

    #[test]
    fn test_ascii85() {
        assert_eq!(ascii85_decode("87cURD]i,\"Ebo80").as_deref(), Some("Hello World"));
        assert_eq!(ascii85_decode("<~87cURD]i,\"Ebo80~>").as_deref(), Some("Hello World"));
        assert_eq!(ascii85_decode("z").as_deref(), Some("\0\0\0\0"));
        assert_eq!(ascii85_decode("abc~x"), None);
    }

    #[test]
    fn test_base32() {
        assert_eq!(base32_decode("JBSWY3DP").as_deref(), Some("Hello"));
        assert_eq!(base32_decode("MZXW6===").as_deref(), Some("foo"));
        assert_eq!(base32_decode("1NVALID"), None);
    }

    #[test]
    fn test_hex_table() {
        assert_eq!(hex_table_decode("48656c6c6f", "0123456789abcdef").as_deref(), Some("Hello"));
        // Same bytes through a permuted table.
        let table = "fedcba9876543210";
        let encoded: String = "Hi"
            .bytes()
            .flat_map(|b| {
                let symbols: Vec<char> = table.chars().collect();
                [symbols[(b >> 4) as usize], symbols[(b & 0xf) as usize]]
            })
            .collect();
        assert_eq!(hex_table_decode(&encoded, table).as_deref(), Some("Hi"));
        assert_eq!(hex_table_decode("486", "0123456789abcdef"), None);
        assert_eq!(hex_table_decode("48", "0123456789abcdee"), None);
    }
}
