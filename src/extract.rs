//! Selector fallback chains and field extraction.
//!
//! A [`SelectorChain`] is an ordered list of CSS selectors; the first one that
//! produces a usable value wins. Ordering is the fallback policy, so chains are
//! written most-reliable first. Product links use a [`LinkChain`], whose
//! entries can also read a URL out of an attribute or a JSON attribute.

use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;

use crate::error::SelectorError;

/// Ordered CSS selector candidates for one field.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "OneOrMany<String>")]
pub struct SelectorChain {
    sources: Vec<String>,
    compiled: Vec<Selector>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(item) => vec![item],
            Self::Many(items) => items,
        }
    }
}

impl TryFrom<OneOrMany<String>> for SelectorChain {
    type Error = SelectorError;

    fn try_from(value: OneOrMany<String>) -> Result<Self, Self::Error> {
        Self::parse(value.into_vec())
    }
}

impl SelectorChain {
    /// Compiles every selector, failing on the first one that does not parse.
    ///
    /// # Errors
    ///
    /// Returns [`SelectorError`] naming the offending selector.
    pub fn parse<I, S>(selectors: I) -> Result<Self, SelectorError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut sources = Vec::new();
        let mut compiled = Vec::new();

        for selector in selectors {
            let source: String = selector.into();
            let trimmed = source.trim();
            if trimmed.is_empty() {
                continue;
            }
            compiled.push(compile(trimmed)?);
            sources.push(trimmed.to_string());
        }

        Ok(Self { sources, compiled })
    }

    #[must_use]
    pub fn empty() -> Self {
        Self {
            sources: Vec::new(),
            compiled: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    /// Selector source strings, in fallback order.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(String::as_str)
    }

    pub fn selectors(&self) -> impl Iterator<Item = &Selector> {
        self.compiled.iter()
    }
}

impl Default for SelectorChain {
    fn default() -> Self {
        Self::empty()
    }
}

fn compile(selector: &str) -> Result<Selector, SelectorError> {
    Selector::parse(selector).map_err(|e| SelectorError {
        selector: selector.to_string(),
        reason: format!("{e:?}"),
    })
}

/// One place a product URL can be read from.
///
/// A plain CSS string in the catalog reads the `href` of the first element it
/// matches. The map form names an attribute instead, optionally holding a
/// JSON object whose `json_key` field is the URL:
///
/// ```yaml
/// link:
///   - { attr: data-product, json_key: url }
///   - .product-name a
/// ```
#[derive(Debug, Clone)]
pub struct LinkSource {
    /// Element inside the container; `None` reads the container itself
    selector: Option<Selector>,
    attr: String,
    json_key: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLinkSource {
    Href(String),
    Attribute {
        #[serde(default)]
        selector: Option<String>,
        attr: String,
        #[serde(default)]
        json_key: Option<String>,
    },
}

impl LinkSource {
    /// `href` of the first element `selector` matches.
    ///
    /// # Errors
    ///
    /// Returns [`SelectorError`] if the selector does not parse.
    pub fn href(selector: &str) -> Result<Self, SelectorError> {
        Ok(Self {
            selector: Some(compile(selector)?),
            attr: "href".to_string(),
            json_key: None,
        })
    }

    /// Raw link value from `element`, before URL resolution.
    #[must_use]
    pub fn read(&self, element: ElementRef<'_>) -> Option<String> {
        let target = match &self.selector {
            Some(selector) => element.select(selector).next()?,
            None => element,
        };
        let value = target.value().attr(&self.attr)?;
        match &self.json_key {
            None => Some(value.to_string()),
            Some(key) => {
                let data: serde_json::Value = serde_json::from_str(value).ok()?;
                data.get(key)?.as_str().map(str::to_string)
            }
        }
    }
}

/// Compiles one catalog entry; a blank selector string is skipped.
fn link_source(raw: RawLinkSource) -> Result<Option<LinkSource>, SelectorError> {
    match raw {
        RawLinkSource::Href(selector) => {
            let trimmed = selector.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            LinkSource::href(trimmed).map(Some)
        }
        RawLinkSource::Attribute {
            selector,
            attr,
            json_key,
        } => {
            let attr = attr.trim();
            if attr.is_empty() {
                return Err(SelectorError {
                    selector: selector.unwrap_or_default(),
                    reason: "link attribute name is empty".to_string(),
                });
            }
            let selector = selector
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(compile)
                .transpose()?;
            Ok(Some(LinkSource {
                selector,
                attr: attr.to_string(),
                json_key: json_key.filter(|key| !key.trim().is_empty()),
            }))
        }
    }
}

/// Ordered product-link sources, first resolvable URL wins
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(try_from = "OneOrMany<RawLinkSource>")]
pub struct LinkChain {
    sources: Vec<LinkSource>,
}

impl TryFrom<OneOrMany<RawLinkSource>> for LinkChain {
    type Error = SelectorError;

    fn try_from(value: OneOrMany<RawLinkSource>) -> Result<Self, Self::Error> {
        let mut sources = Vec::new();
        for raw in value.into_vec() {
            if let Some(source) = link_source(raw)? {
                sources.push(source);
            }
        }
        Ok(Self { sources })
    }
}

impl LinkChain {
    /// Chain of plain `href` selectors.
    ///
    /// # Errors
    ///
    /// Returns [`SelectorError`] naming the first selector that does not parse.
    pub fn parse<I, S>(selectors: I) -> Result<Self, SelectorError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut sources = Vec::new();
        for selector in selectors {
            let selector: String = selector.into();
            if let Some(source) = link_source(RawLinkSource::Href(selector))? {
                sources.push(source);
            }
        }
        Ok(Self { sources })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }
}

/// Runs `pick` on the first element each selector matches, in chain order,
/// and returns the first `Some`.
pub fn first_match<T, F>(element: ElementRef<'_>, chain: &SelectorChain, mut pick: F) -> Option<T>
where
    F: FnMut(ElementRef<'_>) -> Option<T>,
{
    chain
        .selectors()
        .filter_map(|selector| element.select(selector).next())
        .find_map(|found| pick(found))
}

/// Trimmed text of the first match with non-empty text.
#[must_use]
pub fn first_text(element: ElementRef<'_>, chain: &SelectorChain) -> Option<String> {
    first_match(element, chain, |found| {
        let text = element_text(found);
        (!text.is_empty()).then_some(text)
    })
}

/// Absolute product URL from the first link source that resolves to one.
/// Relative values are joined onto `prefix`.
#[must_use]
pub fn extract_url(element: ElementRef<'_>, chain: &LinkChain, prefix: &str) -> Option<String> {
    chain.sources.iter().find_map(|source| {
        let href = source.read(element)?;
        let url = resolve_url(&href, prefix);
        is_absolute_url(&url).then_some(url)
    })
}

/// Element text with whitespace runs collapsed and the ends trimmed.
#[must_use]
pub fn element_text(element: ElementRef<'_>) -> String {
    let raw = element.text().collect::<String>();
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Product containers from the first selector in the chain that matches
/// anything. Empty when no selector matches.
#[must_use]
pub fn matching_containers<'a>(document: &'a Html, chain: &SelectorChain) -> Vec<ElementRef<'a>> {
    for selector in chain.selectors() {
        let found: Vec<_> = document.select(selector).collect();
        if !found.is_empty() {
            return found;
        }
    }
    Vec::new()
}

/// Joins a possibly relative `href` onto the store's URL prefix.
///
/// Hrefs that already carry a scheme are returned unchanged; protocol-relative
/// hrefs get `https:`. With an empty prefix a relative href stays relative.
#[must_use]
pub fn resolve_url(href: &str, prefix: &str) -> String {
    let href = href.trim();
    if href.is_empty() {
        return String::new();
    }
    if has_scheme(href) {
        return href.to_string();
    }
    if let Some(rest) = href.strip_prefix("//") {
        return format!("https://{rest}");
    }

    let prefix = prefix.trim().trim_end_matches('/');
    if prefix.is_empty() {
        return href.to_string();
    }

    if href.starts_with('/') {
        format!("{prefix}{href}")
    } else {
        format!("{prefix}/{href}")
    }
}

/// `true` for an absolute `http`/`https` URL with a host.
#[must_use]
pub fn is_absolute_url(url: &str) -> bool {
    Url::parse(url)
        .map(|parsed| matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some())
        .unwrap_or(false)
}

fn has_scheme(href: &str) -> bool {
    match href.split_once(':') {
        Some((scheme, _)) => {
            !scheme.is_empty()
                && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}
