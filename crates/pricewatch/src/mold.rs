//! Mold engine: ordered, composable text mutations.
//!
//! A [`Mold`] is one instruction: an operation kind plus its string
//! attributes. A pipeline is a slice of molds folded over a buffer left to
//! right. Attribute arity is checked when a mold is applied, not when it is
//! built, so a malformed pipeline surfaces as a configuration error on first
//! use.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::text;
use crate::types::{PriceResult, PriceWatchError};

static WHITESPACE_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex is valid"));

static NON_FLOAT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\d\-.,]+").expect("float-chars regex is valid"));

static HTML_COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment regex is valid"));

const ELLIPSIS: char = '…';

/// Every supported mold operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoldKind {
    /// `[text]`: add text at the end.
    Append,
    /// `[text]`: add text at the start.
    Prepend,
    /// `[number]`: numeric addition; non-numeric buffers are left alone.
    FloatAdd,
    /// `[number]`: numeric multiplication; non-numeric buffers are left alone.
    FloatMult,
    /// `[]`: `1 / x`, or `0` when the buffer is not a non-zero number.
    Float1DivX,
    /// `[text]`: append text unless the buffer already contains it.
    AddIfMissing,
    /// `[]`: collapse whitespace runs into one space.
    Spacer,
    /// `[]`: remove all whitespace.
    DeSpace,
    /// `[]`: keep digits, signs, points and commas only.
    OnlyFloatChars,
    /// `[min_len, filler?]`: pad the end up to a minimum length (filler `/`).
    FakeLength,
    /// `[start, length?]`: PHP-style substring.
    Substr,
    Trim,
    HtmlDecode,
    /// `[delimiter]`: keep text before the first occurrence.
    Before,
    /// `[delimiter]`: keep text after the first occurrence.
    After,
    /// `[delimiter]`: keep text after the last occurrence.
    AfterLast,
    /// `[open, close]`: keep text between the delimiters.
    Between,
    Commas2Points,
    /// `[from, to]`
    Replace,
    /// `[text]`
    Remove,
    StripHtmlComments,
    /// `[text]`: set only when the buffer is empty.
    SetIfEmpty,
    /// `[max_len, text]`: replace everything when longer than `max_len`.
    ReplaceIfLonger,
    /// `[len]`: keep the first `len` characters plus an ellipsis.
    CutEnd,
    /// `[len]`: keep the last `len` characters after an ellipsis.
    CutStart,
    /// `[limit?]`: short hash of the buffer.
    EasyHash,
    TitleCase,
    /// `[pattern, replacement]`
    RegexReplace,
    /// `[text]`: unconditionally replace the buffer.
    Override,
}

/// One text-reshaping instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mold {
    pub kind: MoldKind,
    #[serde(default)]
    pub attributes: Vec<String>,
}

impl Mold {
    pub fn new<I, S>(kind: MoldKind, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            attributes: attributes.into_iter().map(Into::into).collect(),
        }
    }

    /// A mold that takes no attributes.
    pub fn bare(kind: MoldKind) -> Self {
        Self {
            kind,
            attributes: Vec::new(),
        }
    }

    /// Mutate `buffer` in place.
    pub fn apply(&self, buffer: &mut String) -> PriceResult<()> {
        match self.kind {
            MoldKind::Append => {
                let tail = self.attr(0)?;
                buffer.push_str(tail);
            }
            MoldKind::Prepend => {
                let head = self.attr(0)?;
                buffer.insert_str(0, head);
            }
            MoldKind::FloatAdd => {
                let operand = self.attr(0)?;
                if let (Some(x), Some(y)) = (text::parse_float(buffer), text::parse_float(operand))
                {
                    *buffer = (x + y).to_string();
                }
            }
            MoldKind::FloatMult => {
                let operand = self.attr(0)?;
                if let (Some(x), Some(y)) = (text::parse_float(buffer), text::parse_float(operand))
                {
                    *buffer = (x * y).to_string();
                }
            }
            MoldKind::Float1DivX => {
                *buffer = match text::parse_float(buffer) {
                    Some(x) if x != 0.0 => (1.0 / x).to_string(),
                    _ => "0".to_string(),
                };
            }
            MoldKind::AddIfMissing => {
                let needle = self.attr(0)?;
                if !buffer.contains(needle) {
                    buffer.push_str(needle);
                }
            }
            MoldKind::Spacer => {
                *buffer = WHITESPACE_RUN_RE.replace_all(buffer, " ").into_owned();
            }
            MoldKind::DeSpace => {
                buffer.retain(|c| !c.is_whitespace());
            }
            MoldKind::OnlyFloatChars => {
                *buffer = NON_FLOAT_RE.replace_all(buffer, "").into_owned();
            }
            MoldKind::FakeLength => {
                let min_len = self.count_attr(0)?;
                let filler = self.attributes.get(1).map(String::as_str).unwrap_or("/");
                if filler.is_empty() {
                    return Err(self.misconfigured("filler must not be empty"));
                }
                while buffer.chars().count() < min_len {
                    buffer.push_str(filler);
                }
            }
            MoldKind::Substr => {
                let start = self.int_attr(0)?;
                let length = match self.attributes.get(1) {
                    Some(_) => Some(self.int_attr(1)?),
                    None => None,
                };
                *buffer = text::substr_safe(buffer, start, length);
            }
            MoldKind::Trim => {
                *buffer = buffer.trim().to_string();
            }
            MoldKind::HtmlDecode => {
                *buffer = text::decode_html_entities(buffer);
            }
            MoldKind::Before => {
                let delimiter = self.attr(0)?;
                if let Some(pos) = buffer.find(delimiter) {
                    buffer.truncate(pos);
                }
            }
            MoldKind::After => {
                let delimiter = self.attr(0)?;
                if let Some(pos) = buffer.find(delimiter) {
                    *buffer = buffer[pos + delimiter.len()..].to_string();
                }
            }
            MoldKind::AfterLast => {
                let delimiter = self.attr(0)?;
                if let Some(pos) = buffer.rfind(delimiter) {
                    *buffer = buffer[pos + delimiter.len()..].to_string();
                }
            }
            MoldKind::Between => {
                let open = self.attr(0)?;
                let close = self.attr(1)?;
                if let Some(start) = buffer.find(open).map(|p| p + open.len()) {
                    if let Some(len) = buffer[start..].find(close) {
                        *buffer = buffer[start..start + len].to_string();
                    }
                }
            }
            MoldKind::Commas2Points => {
                *buffer = buffer.replace(',', ".");
            }
            MoldKind::Replace => {
                let from = self.search_attr(0)?;
                let to = self.attr(1)?;
                *buffer = buffer.replace(from, to);
            }
            MoldKind::Remove => {
                let needle = self.search_attr(0)?;
                *buffer = buffer.replace(needle, "");
            }
            MoldKind::StripHtmlComments => {
                *buffer = HTML_COMMENT_RE.replace_all(buffer, "").into_owned();
            }
            MoldKind::SetIfEmpty => {
                let fallback = self.attr(0)?;
                if buffer.is_empty() {
                    *buffer = fallback.to_string();
                }
            }
            MoldKind::ReplaceIfLonger => {
                let limit = self.count_attr(0)?;
                let replacement = self.attr(1)?;
                if buffer.chars().count() > limit {
                    *buffer = replacement.to_string();
                }
            }
            MoldKind::CutEnd => {
                let limit = self.count_attr(0)?;
                if buffer.chars().count() > limit {
                    let mut cut = text::substr_safe(buffer, 0, Some(limit as i64));
                    cut.push(ELLIPSIS);
                    *buffer = cut;
                }
            }
            MoldKind::CutStart => {
                let limit = self.count_attr(0)?;
                if buffer.chars().count() > limit {
                    let tail = text::substr_safe(buffer, -(limit as i64), None);
                    *buffer = format!("{ELLIPSIS}{tail}");
                }
            }
            MoldKind::EasyHash => {
                let limit = match self.attributes.first() {
                    Some(raw) if !raw.is_empty() => Some(self.count_attr(0)?),
                    _ => None,
                };
                *buffer = text::short_hash(buffer, limit);
            }
            MoldKind::TitleCase => {
                *buffer = text::title_case(buffer);
            }
            MoldKind::RegexReplace => {
                let pattern = self.attr(0)?;
                let replacement = self.attr(1)?;
                let re = Regex::new(pattern)
                    .map_err(|e| self.misconfigured(&format!("invalid pattern: {e}")))?;
                *buffer = re.replace_all(buffer, replacement).into_owned();
            }
            MoldKind::Override => {
                let value = self.attr(0)?;
                *buffer = value.to_string();
            }
        }
        Ok(())
    }

    fn attr(&self, index: usize) -> PriceResult<&str> {
        self.attributes
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| self.misconfigured(&format!("missing attribute #{}", index + 1)))
    }

    fn search_attr(&self, index: usize) -> PriceResult<&str> {
        let value = self.attr(index)?;
        if value.is_empty() {
            return Err(self.misconfigured("search text must not be empty"));
        }
        Ok(value)
    }

    fn int_attr(&self, index: usize) -> PriceResult<i64> {
        let raw = self.attr(index)?;
        raw.trim()
            .parse::<i64>()
            .map_err(|_| self.misconfigured(&format!("attribute '{raw}' is not an integer")))
    }

    fn count_attr(&self, index: usize) -> PriceResult<usize> {
        let value = self.int_attr(index)?;
        usize::try_from(value)
            .map_err(|_| self.misconfigured(&format!("attribute '{value}' must not be negative")))
    }

    fn misconfigured(&self, detail: &str) -> PriceWatchError {
        PriceWatchError::Configuration(format!("{:?} mold: {detail}", self.kind))
    }
}

/// Fold a pipeline over `buffer`.
pub fn apply_all(buffer: &mut String, molds: &[Mold]) -> PriceResult<()> {
    for mold in molds {
        mold.apply(buffer)?;
    }
    Ok(())
}

/// Run `subject` through a pipeline and return the result.
pub fn mold(subject: &str, molds: &[Mold]) -> PriceResult<String> {
    let mut buffer = subject.to_string();
    apply_all(&mut buffer, molds)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(subject: &str, m: Mold) -> String {
        mold(subject, &[m]).unwrap()
    }

    #[test]
    fn test_append_prepend_override() {
        assert_eq!(one("b", Mold::new(MoldKind::Append, ["c"])), "bc");
        assert_eq!(one("b", Mold::new(MoldKind::Prepend, ["a"])), "ab");
        assert_eq!(one("b", Mold::new(MoldKind::Override, ["z"])), "z");
    }

    #[test]
    fn test_float_molds() {
        assert_eq!(one("2.5", Mold::new(MoldKind::FloatAdd, ["0.5"])), "3");
        assert_eq!(one("2.5", Mold::new(MoldKind::FloatMult, ["4"])), "10");
        assert_eq!(one("4", Mold::bare(MoldKind::Float1DivX)), "0.25");
        assert_eq!(one("0", Mold::bare(MoldKind::Float1DivX)), "0");
        assert_eq!(one("n/a", Mold::bare(MoldKind::Float1DivX)), "0");
    }

    #[test]
    fn test_float_molds_leave_non_numeric_untouched() {
        assert_eq!(one("sold out", Mold::new(MoldKind::FloatAdd, ["1"])), "sold out");
        assert_eq!(one("12", Mold::new(MoldKind::FloatMult, ["x"])), "12");
    }

    #[test]
    fn test_add_if_missing() {
        assert_eq!(one("size", Mold::new(MoldKind::AddIfMissing, [" cm"])), "size cm");
        assert_eq!(one("10 cm", Mold::new(MoldKind::AddIfMissing, [" cm"])), "10 cm");
    }

    #[test]
    fn test_whitespace_molds() {
        assert_eq!(one("a  \n\t b", Mold::bare(MoldKind::Spacer)), "a b");
        assert_eq!(one(" 1 2\t3\n", Mold::bare(MoldKind::DeSpace)), "123");
        assert_eq!(one("  x  ", Mold::bare(MoldKind::Trim)), "x");
    }

    #[test]
    fn test_only_float_chars() {
        assert_eq!(one("Price: 1 299,50 грн.", Mold::bare(MoldKind::OnlyFloatChars)), "1299,50.");
        assert_eq!(one("-12.5 EUR", Mold::bare(MoldKind::OnlyFloatChars)), "-12.5");
    }

    #[test]
    fn test_fake_length() {
        assert_eq!(one("ab", Mold::new(MoldKind::FakeLength, ["5"])), "ab///");
        assert_eq!(one("ab", Mold::new(MoldKind::FakeLength, ["4", "0"])), "ab00");
        assert_eq!(one("abcdef", Mold::new(MoldKind::FakeLength, ["3"])), "abcdef");
    }

    #[test]
    fn test_substr() {
        assert_eq!(one("1234567", Mold::new(MoldKind::Substr, ["-5"])), "34567");
        assert_eq!(one("1234567", Mold::new(MoldKind::Substr, ["-5", "2"])), "34");
        assert_eq!(one("abc", Mold::new(MoldKind::Substr, ["10"])), "");
    }

    #[test]
    fn test_delimiters() {
        let s = "a-b-c";
        assert_eq!(one(s, Mold::new(MoldKind::Before, ["-"])), "a");
        assert_eq!(one(s, Mold::new(MoldKind::After, ["-"])), "b-c");
        assert_eq!(one(s, Mold::new(MoldKind::AfterLast, ["-"])), "c");
        assert_eq!(one(s, Mold::new(MoldKind::Before, ["|"])), s);
        assert_eq!(one(s, Mold::new(MoldKind::AfterLast, ["|"])), s);
    }

    #[test]
    fn test_between() {
        let m = Mold::new(MoldKind::Between, ["[[", "]]"]);
        assert_eq!(one("x [[inner]] y", m.clone()), "inner");
        assert_eq!(one("x [[inner y", m.clone()), "x [[inner y");
        assert_eq!(one("]] x [[a]]", m), "a");
    }

    #[test]
    fn test_replace_remove_commas() {
        assert_eq!(one("a.b.c", Mold::new(MoldKind::Replace, [".", "/"])), "a/b/c");
        assert_eq!(one("a=\"\"b", Mold::new(MoldKind::Remove, ["=\"\""])), "ab");
        assert_eq!(one("199,99", Mold::bare(MoldKind::Commas2Points)), "199.99");
    }

    #[test]
    fn test_strip_html_comments() {
        let html = "<p>a</p><!-- one --><p>b</p><!--\ntwo\n-->";
        assert_eq!(one(html, Mold::bare(MoldKind::StripHtmlComments)), "<p>a</p><p>b</p>");
    }

    #[test]
    fn test_conditional_replacements() {
        assert_eq!(one("", Mold::new(MoldKind::SetIfEmpty, ["n/a"])), "n/a");
        assert_eq!(one("x", Mold::new(MoldKind::SetIfEmpty, ["n/a"])), "x");
        assert_eq!(one("abcdef", Mold::new(MoldKind::ReplaceIfLonger, ["3", "long"])), "long");
        assert_eq!(one("abc", Mold::new(MoldKind::ReplaceIfLonger, ["3", "long"])), "abc");
    }

    #[test]
    fn test_cut_end_and_start() {
        assert_eq!(one("abcdef", Mold::new(MoldKind::CutEnd, ["3"])), "abc…");
        assert_eq!(one("abc", Mold::new(MoldKind::CutEnd, ["3"])), "abc");
        assert_eq!(one("abcdef", Mold::new(MoldKind::CutStart, ["2"])), "…ef");
        assert_eq!(one("ab", Mold::new(MoldKind::CutStart, ["2"])), "ab");
    }

    #[test]
    fn test_cut_end_keeps_exactly_n_characters() {
        let s = "Очень длинное название товара";
        for n in 0..s.chars().count() {
            let out = one(s, Mold::new(MoldKind::CutEnd, [n.to_string()]));
            assert_eq!(out.chars().count(), n + 1);
            assert!(out.ends_with('…'));
            assert!(s.starts_with(out.trim_end_matches('…')));
        }
    }

    #[test]
    fn test_easy_hash() {
        let short = one("https://shop.test/p/1", Mold::new(MoldKind::EasyHash, ["6"]));
        assert_eq!(short.len(), 6);
        let full = one("https://shop.test/p/1", Mold::new(MoldKind::EasyHash, [""]));
        assert!(full.starts_with(&short));
        let bare = one("https://shop.test/p/1", Mold::bare(MoldKind::EasyHash));
        assert_eq!(bare, full);
    }

    #[test]
    fn test_html_decode_and_title_case() {
        assert_eq!(one("Fish &amp; Chips", Mold::bare(MoldKind::HtmlDecode)), "Fish & Chips");
        assert_eq!(
            one("Caf&eacute; &uuml;ber &hearts; &Auml;", Mold::bare(MoldKind::HtmlDecode)),
            "Café über ♥ Ä"
        );
        assert_eq!(one("red running SHOE", Mold::bare(MoldKind::TitleCase)), "Red Running SHOE");
    }

    #[test]
    fn test_regex_replace() {
        let m = Mold::new(MoldKind::RegexReplace, [r"(\d+)x(\d+)", "$2 by $1"]);
        assert_eq!(one("size 10x20", m), "size 20 by 10");
        let broken = Mold::new(MoldKind::RegexReplace, ["(", ""]);
        assert!(matches!(
            mold("x", &[broken]),
            Err(PriceWatchError::Configuration(_))
        ));
    }

    #[test]
    fn test_missing_attribute_is_configuration_error() {
        for kind in [
            MoldKind::Append,
            MoldKind::Before,
            MoldKind::Replace,
            MoldKind::Substr,
            MoldKind::CutEnd,
            MoldKind::Override,
        ] {
            let err = mold("abc", &[Mold::bare(kind)]).unwrap_err();
            assert!(matches!(err, PriceWatchError::Configuration(_)), "{kind:?}");
        }
        let err = mold("abc", &[Mold::new(MoldKind::Replace, ["a"])]).unwrap_err();
        assert!(matches!(err, PriceWatchError::Configuration(_)));
    }

    #[test]
    fn test_non_integer_attribute_is_configuration_error() {
        let err = mold("abc", &[Mold::new(MoldKind::CutEnd, ["three"])]).unwrap_err();
        assert!(matches!(err, PriceWatchError::Configuration(_)));
    }

    #[test]
    fn test_pipeline_is_deterministic() {
        let pipeline = vec![
            Mold::bare(MoldKind::HtmlDecode),
            Mold::new(MoldKind::Before, [" - "]),
            Mold::bare(MoldKind::Spacer),
            Mold::bare(MoldKind::Trim),
            Mold::new(MoldKind::EasyHash, ["10"]),
        ];
        let input = "  Garden&nbsp;hose   green - Shop ";
        let first = mold(input, &pipeline).unwrap();
        for _ in 0..5 {
            assert_eq!(mold(input, &pipeline).unwrap(), first);
        }
    }

    #[test]
    fn test_pipeline_order_matters() {
        let price = [Mold::bare(MoldKind::Commas2Points), Mold::bare(MoldKind::OnlyFloatChars)];
        assert_eq!(mold(" 199,99 грн", &price).unwrap(), "199.99");
    }

    #[test]
    fn test_molds_deserialize() {
        let json = r#"[{"kind":"before","attributes":[":"]},{"kind":"trim"}]"#;
        let pipeline: Vec<Mold> = serde_json::from_str(json).unwrap();
        assert_eq!(pipeline[0], Mold::new(MoldKind::Before, [":"]));
        assert_eq!(pipeline[1], Mold::bare(MoldKind::Trim));
    }
}
