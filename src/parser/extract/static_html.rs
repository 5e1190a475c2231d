use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use tracing::{debug, info};

use super::{parse_input, ExtractError, Extractor};
use crate::parser::builder::absolutize;
use crate::parser::raw::{self, RawRecord};
use crate::parser::text::squash_whitespace;

const DEFAULT_LINK_PATTERN: &str = r"/page\d+\.html";
const SIBLING_SCAN: usize = 3;

static FULL_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}年\d{1,2}月\d{1,2}日").unwrap());
static TOTAL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"全(\d+)件").unwrap());

/// One fetched HTML page (or rendered fragment) and the URL it came from.
#[derive(Debug, Clone, Deserialize)]
pub struct HtmlFragment {
    #[serde(default)]
    pub url: String,
    pub html: String,
}

/// Municipal article listing: each event is a link to an article page, with
/// its date in a nearby `期日` line.
pub struct StaticHtmlExtractor {
    base_url: String,
    link_pattern: String,
}

impl StaticHtmlExtractor {
    pub fn new(base_url: &str, link_pattern: Option<&str>) -> Self {
        StaticHtmlExtractor {
            base_url: base_url.to_string(),
            link_pattern: link_pattern.unwrap_or(DEFAULT_LINK_PATTERN).to_string(),
        }
    }

    pub fn parse(&self, fragments: &[HtmlFragment]) -> Result<Vec<RawRecord>, ExtractError> {
        let link_re = Regex::new(&self.link_pattern)?;
        let anchors = selector("a[href]")?;
        let mut seen = HashSet::new();
        let mut records = Vec::new();
        let mut matched = 0usize;

        for (page, fragment) in fragments.iter().enumerate() {
            let doc = Html::parse_document(&fragment.html);
            if page == 0 {
                if let Some(caps) = TOTAL_RE.captures(&fragment.html) {
                    info!("Site lists {} items in total", &caps[1]);
                }
            }
            let root = content_root(&doc)?;
            let base = if fragment.url.is_empty() {
                &self.base_url
            } else {
                &fragment.url
            };

            for a in root.select(&anchors) {
                let href = a.value().attr("href").unwrap_or("");
                if !link_re.is_match(href) {
                    continue;
                }
                matched += 1;
                let url = absolutize(base, href);
                if !seen.insert(url.clone()) {
                    continue;
                }
                let title = squash_whitespace(&a.text().collect::<String>());
                if title.is_empty() {
                    debug!(url = %url, "link without text");
                    continue;
                }
                let mut record = RawRecord::new()
                    .with(raw::TITLE, title)
                    .with(raw::URL, url)
                    .with(raw::PROVENANCE, format!("page{}", page + 1));
                if let Some(date) = find_deadline_date(a) {
                    record.set(raw::DATE, date);
                }
                records.push(record);
            }
        }

        if matched == 0 {
            return Err(ExtractError::NoStructure(format!(
                "no links matching {:?} in {} fragment(s)",
                self.link_pattern,
                fragments.len()
            )));
        }
        Ok(records)
    }
}

impl Extractor for StaticHtmlExtractor {
    fn key(&self) -> &'static str {
        "static_html"
    }

    fn extract(&self, input: &str) -> Result<Vec<RawRecord>, ExtractError> {
        let fragments: Vec<HtmlFragment> = parse_input(self.key(), input)?;
        self.parse(&fragments)
    }
}

pub(crate) fn selector(s: &str) -> Result<Selector, ExtractError> {
    Selector::parse(s).map_err(|_| ExtractError::Selector {
        selector: s.to_string(),
    })
}

/// `#maincont`, else `<main>`, else the whole document.
fn content_root(doc: &Html) -> Result<ElementRef<'_>, ExtractError> {
    for candidate in ["#maincont", "main"] {
        if let Some(el) = doc.select(&selector(candidate)?).next() {
            return Ok(el);
        }
    }
    Ok(doc.root_element())
}

/// Walk the element siblings after the link's parent, looking for the
/// `期日` line that carries the event date.
fn find_deadline_date(a: ElementRef<'_>) -> Option<String> {
    let parent = a.parent()?;
    parent
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .take(SIBLING_SCAN)
        .find_map(|sibling| {
            let text = sibling.text().collect::<Vec<_>>().join(" ");
            if !text.contains("期日") {
                return None;
            }
            FULL_DATE_RE.find(&text).map(|m| m.as_str().to_string())
        })
}
