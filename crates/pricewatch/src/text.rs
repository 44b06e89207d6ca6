//! String helpers shared by the mold engine and the fetch cache.

use std::hash::Hasher;
use std::str::FromStr;
use std::sync::LazyLock;

use base64::Engine;
use fnv::FnvHasher;
use regex::Regex;
use rust_decimal::Decimal;

static FILENAME_UNSAFE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9{=\-_+&.$]").expect("filename regex is valid"));

/// Longest sanitized URI prefix kept in a cache filename.
const FILENAME_PREFIX_LIMIT: usize = 100;

/// PHP-style substring over characters.
///
/// A negative `start` counts from the end; a negative `length` drops that
/// many characters from the end. Out-of-range values clamp instead of failing.
pub fn substr_safe(s: &str, start: i64, length: Option<i64>) -> String {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;

    let from = if start >= 0 { start } else { len + start }.clamp(0, len);
    let rest = len - from;

    let take = match length {
        None => rest,
        Some(l) if l >= 0 => l.min(rest),
        Some(l) => (rest + l).max(0),
    };

    chars[from as usize..(from + take) as usize].iter().collect()
}

/// 64-bit FNV-1a digest of the text.
pub fn fnv64(text: &str) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(text.as_bytes());
    hasher.finish()
}

/// Short, stable, printable hash of `text`, at most `limit` characters long.
pub fn short_hash(text: &str, limit: Option<usize>) -> String {
    let encoded =
        base64::engine::general_purpose::STANDARD.encode(fnv64(text).to_string().as_bytes());
    match limit {
        Some(n) => encoded.chars().take(n).collect(),
        None => encoded,
    }
}

/// Deterministic, filesystem-safe name for a URI (without extension).
pub fn uri_to_filename(uri: &str) -> String {
    let swapped = uri.replace('/', "{").replace('?', "7").replace(':', "$");
    let mut safe = FILENAME_UNSAFE_RE.replace_all(&swapped, "").into_owned();
    safe.push('_');

    let prefix = substr_safe(&safe, 0, Some(FILENAME_PREFIX_LIMIT as i64));
    format!("{prefix}{:016x}", fnv64(uri))
}

/// Join two URI parts with exactly one slash between them.
pub fn slash_safe_concat(a: &str, b: &str) -> String {
    format!("{}/{}", a.trim_end_matches('/'), b.trim_start_matches('/'))
}

/// Decode HTML character references, leaving unknown ones untouched.
pub fn decode_html_entities(s: &str) -> String {
    html_escape::decode_html_entities(s).into_owned()
}

/// Capitalize each word, keeping fully upper-case words (acronyms) as they are.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut word = String::new();

    for ch in s.chars() {
        if ch.is_alphanumeric() || ch == '\'' {
            word.push(ch);
        } else {
            flush_title_word(&mut word, &mut out);
            out.push(ch);
        }
    }
    flush_title_word(&mut word, &mut out);
    out
}

fn flush_title_word(word: &mut String, out: &mut String) {
    if word.is_empty() {
        return;
    }
    let has_letters = word.chars().any(char::is_alphabetic);
    let all_upper = word
        .chars()
        .filter(|c| c.is_alphabetic())
        .all(char::is_uppercase);

    if has_letters && all_upper {
        out.push_str(word);
    } else {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            for c in chars {
                out.extend(c.to_lowercase());
            }
        }
    }
    word.clear();
}

/// Lenient invariant-culture number parsing: surrounding whitespace, a
/// leading `+`, `,` thousands separators and exponents are accepted.
pub fn parse_decimal(s: &str) -> Option<Decimal> {
    let cleaned = s.trim().trim_start_matches('+').replace(',', "");
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned)
        .ok()
        .or_else(|| Decimal::from_scientific(&cleaned).ok())
}

/// Same leniency as [`parse_decimal`], for float arithmetic molds.
pub fn parse_float(s: &str) -> Option<f64> {
    let cleaned = s.trim().trim_start_matches('+').replace(',', "");
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substr_positive() {
        assert_eq!(substr_safe("abcdef", 2, None), "cdef");
        assert_eq!(substr_safe("abcdef", 2, Some(3)), "cde");
        assert_eq!(substr_safe("abcdef", 2, Some(100)), "cdef");
        assert_eq!(substr_safe("abcdef", 10, None), "");
    }

    #[test]
    fn test_substr_negative_start_matches_offset() {
        let s = "1234567890";
        let l = s.chars().count() as i64;
        for n in 1..=l {
            assert_eq!(substr_safe(s, -n, None), substr_safe(s, l - n, None));
        }
        assert_eq!(substr_safe("abc", -5, None), "abc");
    }

    #[test]
    fn test_substr_negative_length() {
        assert_eq!(substr_safe("abcdef", 1, Some(-2)), "bcd");
        assert_eq!(substr_safe("abcdef", 0, Some(-10)), "");
        assert_eq!(substr_safe("12345678", -5, Some(2)), "45");
    }

    #[test]
    fn test_substr_counts_characters() {
        assert_eq!(substr_safe("грн 100", 0, Some(3)), "грн");
    }

    #[test]
    fn test_short_hash_is_stable_and_bounded() {
        let a = short_hash("https://shop.test/a", Some(8));
        assert_eq!(a.len(), 8);
        assert_eq!(a, short_hash("https://shop.test/a", Some(8)));
        assert_ne!(
            short_hash("https://shop.test/a", None),
            short_hash("https://shop.test/b", None)
        );
        assert!(short_hash("x", None).len() > 8);
    }

    #[test]
    fn test_uri_to_filename() {
        let name = uri_to_filename("https://shop.test/item?id=5");
        assert!(name.starts_with("https${{shop.test{item7id=5_"));
        assert!(!name.contains('/'));
        assert!(!name.contains(':'));

        let long = format!("https://shop.test/{}", "a".repeat(300));
        assert_eq!(uri_to_filename(&long).chars().count(), FILENAME_PREFIX_LIMIT + 16);
        assert_ne!(uri_to_filename(&long), uri_to_filename(&format!("{long}b")));
    }

    #[test]
    fn test_slash_safe_concat() {
        assert_eq!(slash_safe_concat("https://a.test/", "/p/1"), "https://a.test/p/1");
        assert_eq!(slash_safe_concat("https://a.test", "p/1"), "https://a.test/p/1");
        assert_eq!(slash_safe_concat("https://a.test//", "//p"), "https://a.test/p");
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_html_entities("Tom &amp; Jerry"), "Tom & Jerry");
        assert_eq!(decode_html_entities("&lt;b&gt; &#39;x&#x27;"), "<b> 'x'");
        assert_eq!(decode_html_entities("5&nbsp;€"), "5\u{a0}€");
        assert_eq!(decode_html_entities("&bogus;"), "&bogus;");
    }

    #[test]
    fn test_decode_entities_accented_and_symbols() {
        assert_eq!(
            decode_html_entities("Caf&eacute; &uuml;ber &hearts; &Auml;"),
            "Café über ♥ Ä"
        );
        assert_eq!(decode_html_entities("&Ccedil;a &ntilde; &szlig;"), "Ça ñ ß");
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("hello wORLD"), "Hello World");
        assert_eq!(title_case("NASA rocket-ship"), "NASA Rocket-Ship");
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal(" 199.99 "), Some(Decimal::new(19999, 2)));
        assert_eq!(parse_decimal("1,299.50"), Some(Decimal::new(129950, 2)));
        assert_eq!(parse_decimal("-3"), Some(Decimal::from(-3)));
        assert_eq!(parse_decimal("1e2"), Some(Decimal::from(100)));
        assert_eq!(parse_decimal("abc"), None);
        assert_eq!(parse_decimal(""), None);
    }
}
