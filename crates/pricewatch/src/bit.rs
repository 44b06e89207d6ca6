//! Extraction primitive: one selector plus one mold pipeline.
//!
//! A [`Bit`] selects a value (or a list of raw fragments) out of either a
//! parsed document node or a raw string, then reshapes it through its molds.
//! All entry points are synchronous because `scraper` types are `!Send`;
//! callers parse and extract in one synchronous step and keep only owned
//! results across await points.
//!
//! Selection methods:
//!
//! - **CSS**: structured query against a node. Single extraction takes the
//!   first matching descendant, and reads either an attribute or a text
//!   property off it.
//! - **Regex**: pattern match against text. Single extraction returns capture
//!   group 1 of the first match, or an empty string when nothing matches.
//!   Applied to a node, the pattern runs over the node's inner HTML.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::mold::{self, Mold};
use crate::types::{PriceResult, PriceWatchError};

/// How a bit finds its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectMethod {
    Css,
    Regex,
}

/// Text-valued properties readable off a matched element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextProperty {
    #[default]
    InnerText,
    InnerHtml,
    OuterHtml,
}

/// Which piece of a matched element is read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum Detail {
    Attribute(String),
    Property(TextProperty),
}

impl Default for Detail {
    fn default() -> Self {
        Detail::Property(TextProperty::InnerText)
    }
}

/// Input to an extraction: exactly one of a raw string or a document node.
#[derive(Clone, Copy)]
pub enum Fragment<'a> {
    Text(&'a str),
    Element(ElementRef<'a>),
    /// A whole document together with the markup it was parsed from.
    Document { html: &'a Html, markup: &'a str },
}

impl<'a> Fragment<'a> {
    fn describe(&self) -> String {
        match self {
            Fragment::Text(_) => "text".to_string(),
            Fragment::Element(el) => format!("<{}>", el.value().name()),
            Fragment::Document { .. } => "document".to_string(),
        }
    }
}

/// Outcome of extracting a field the caller treats as optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    /// Nothing matched; carries the reason for the log.
    Missing(String),
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::Missing(_) => None,
        }
    }
}

/// Instruction on how to extract a single information piece, or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bit {
    pub method: SelectMethod,
    pub query: String,
    #[serde(default)]
    pub detail: Detail,
    #[serde(default)]
    pub molds: Vec<Mold>,
}

impl Bit {
    /// CSS bit reading inner text by default.
    pub fn css(query: impl Into<String>) -> Self {
        Self {
            method: SelectMethod::Css,
            query: query.into(),
            detail: Detail::default(),
            molds: Vec::new(),
        }
    }

    pub fn regex(query: impl Into<String>) -> Self {
        Self {
            method: SelectMethod::Regex,
            query: query.into(),
            detail: Detail::default(),
            molds: Vec::new(),
        }
    }

    /// Read the named attribute off the matched element.
    pub fn attr(mut self, name: impl Into<String>) -> Self {
        self.detail = Detail::Attribute(name.into());
        self
    }

    pub fn property(mut self, property: TextProperty) -> Self {
        self.detail = Detail::Property(property);
        self
    }

    pub fn molds(mut self, molds: Vec<Mold>) -> Self {
        self.molds = molds;
        self
    }

    /// Extract a single value and run it through the pipeline.
    pub fn extract(&self, fragment: Fragment<'_>) -> PriceResult<String> {
        let raw = match (self.method, fragment) {
            (SelectMethod::Css, Fragment::Text(_)) => {
                return Err(PriceWatchError::Configuration(format!(
                    "CSS bit '{}' cannot extract from a raw string",
                    self.query
                )));
            }
            (SelectMethod::Css, Fragment::Element(el)) => {
                self.read_detail(self.select_first(el.select(&self.selector()?), &fragment)?)
            }
            (SelectMethod::Css, Fragment::Document { html, .. }) => {
                self.read_detail(self.select_first(html.select(&self.selector()?), &fragment)?)
            }
            (SelectMethod::Regex, Fragment::Text(text)) => self.first_capture(text)?,
            (SelectMethod::Regex, Fragment::Element(el)) => self.first_capture(&el.inner_html())?,
            (SelectMethod::Regex, Fragment::Document { markup, .. }) => {
                self.first_capture(markup)?
            }
        };

        mold::mold(&raw, &self.molds)
    }

    /// Like [`Bit::extract`], but a missing selector is reported as
    /// [`Lookup::Missing`] instead of an error.
    pub fn lookup(&self, fragment: Fragment<'_>) -> PriceResult<Lookup<String>> {
        match self.extract(fragment) {
            Ok(value) => Ok(Lookup::Found(value)),
            Err(e) if e.is_absence() => Ok(Lookup::Missing(e.to_string())),
            Err(e) => Err(e),
        }
    }

    /// Every element matching a CSS query. Pipelines are not supported here.
    pub fn extract_elements<'a>(&self, fragment: Fragment<'a>) -> PriceResult<Vec<ElementRef<'a>>> {
        if self.method != SelectMethod::Css {
            return Err(PriceWatchError::Configuration(format!(
                "regex bit '{}' yields strings, not elements",
                self.query
            )));
        }
        if !self.molds.is_empty() {
            return Err(PriceWatchError::Configuration(format!(
                "bit '{}': element lists cannot be post-processed",
                self.query
            )));
        }

        let selector = self.selector()?;
        let elements: Vec<ElementRef<'a>> = match fragment {
            Fragment::Element(el) => el.select(&selector).collect(),
            Fragment::Document { html, .. } => html.select(&selector).collect(),
            Fragment::Text(_) => {
                return Err(PriceWatchError::Configuration(format!(
                    "CSS bit '{}' cannot extract from a raw string",
                    self.query
                )));
            }
        };

        if elements.is_empty() {
            return Err(PriceWatchError::NoResults {
                query: self.query.clone(),
            });
        }
        Ok(elements)
    }

    /// Every whole regex match in `text`, each run through the pipeline.
    pub fn extract_strings(&self, text: &str) -> PriceResult<Vec<String>> {
        if self.method != SelectMethod::Regex {
            return Err(PriceWatchError::Configuration(format!(
                "CSS bit '{}' cannot extract from a raw string",
                self.query
            )));
        }

        let re = self.compiled()?;
        let matches = re
            .find_iter(text)
            .map(|m| mold::mold(m.as_str(), &self.molds))
            .collect::<PriceResult<Vec<String>>>()?;

        if matches.is_empty() {
            return Err(PriceWatchError::NoResults {
                query: self.query.clone(),
            });
        }
        debug!(query = %self.query, count = matches.len(), "regex list extracted");
        Ok(matches)
    }

    fn selector(&self) -> PriceResult<Selector> {
        Selector::parse(&self.query).map_err(|e| {
            PriceWatchError::Configuration(format!("invalid selector '{}': {e}", self.query))
        })
    }

    fn compiled(&self) -> PriceResult<Regex> {
        Regex::new(&self.query).map_err(|e| {
            PriceWatchError::Configuration(format!("invalid pattern '{}': {e}", self.query))
        })
    }

    fn select_first<'a>(
        &self,
        mut matches: impl Iterator<Item = ElementRef<'a>>,
        fragment: &Fragment<'_>,
    ) -> PriceResult<ElementRef<'a>> {
        matches
            .next()
            .ok_or_else(|| PriceWatchError::SelectorNotFound {
                query: self.query.clone(),
                context: fragment.describe(),
            })
    }

    fn read_detail(&self, el: ElementRef<'_>) -> String {
        match &self.detail {
            Detail::Attribute(name) => el.value().attr(name).unwrap_or_default().to_string(),
            Detail::Property(TextProperty::InnerText) => el.text().collect(),
            Detail::Property(TextProperty::InnerHtml) => el.inner_html(),
            Detail::Property(TextProperty::OuterHtml) => el.html(),
        }
    }

    fn first_capture(&self, text: &str) -> PriceResult<String> {
        let re = self.compiled()?;
        Ok(re
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default())
    }
}
