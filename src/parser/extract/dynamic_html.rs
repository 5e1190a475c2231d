use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::static_html::{selector, HtmlFragment};
use super::{parse_input, ExtractError, Extractor};
use crate::config::CardSelectors;
use crate::parser::builder::absolutize;
use crate::parser::raw::{self, RawRecord};
use crate::parser::text::squash_whitespace;

/// Selectors compiled once per source.
struct CompiledSelectors {
    card: Selector,
    link: Option<Selector>,
    fields: Vec<(&'static str, Selector)>,
}

impl CompiledSelectors {
    fn compile(s: &CardSelectors) -> Result<Self, ExtractError> {
        let mut fields = vec![(raw::TITLE, selector(&s.title)?)];
        for (key, sel) in [
            (raw::DATE, &s.date),
            (raw::TIME, &s.time),
            (raw::LOCATION, &s.location),
            (raw::APPLY, &s.apply),
            (raw::CATEGORY, &s.category),
            (raw::TARGET, &s.target),
            (raw::BODY, &s.body),
        ] {
            if let Some(sel) = sel {
                fields.push((key, selector(sel)?));
            }
        }
        Ok(CompiledSelectors {
            card: selector(&s.card)?,
            link: s.link.as_deref().map(selector).transpose()?,
            fields,
        })
    }
}

/// Script-rendered event pages, captured as HTML after rendering. Each card
/// element is one event and its fields come from per-field selectors.
pub struct DynamicHtmlExtractor {
    selectors: CardSelectors,
}

impl DynamicHtmlExtractor {
    pub fn new(selectors: CardSelectors) -> Self {
        DynamicHtmlExtractor { selectors }
    }

    pub fn parse(&self, fragments: &[HtmlFragment]) -> Result<Vec<RawRecord>, ExtractError> {
        let compiled = CompiledSelectors::compile(&self.selectors)?;
        let mut records = Vec::new();
        let mut cards = 0usize;

        for (page, fragment) in fragments.iter().enumerate() {
            let doc = Html::parse_document(&fragment.html);
            for (i, card) in doc.select(&compiled.card).enumerate() {
                cards += 1;
                let mut record = RawRecord::new()
                    .with(raw::PROVENANCE, format!("page{}-card{}", page + 1, i + 1));
                for (key, sel) in &compiled.fields {
                    if let Some(text) = first_text(card, sel) {
                        record.set(key, text);
                    }
                }
                let href = compiled
                    .link
                    .as_ref()
                    .and_then(|sel| card.select(sel).next())
                    .and_then(|a| a.value().attr("href"));
                match href {
                    Some(href) => record.set(raw::URL, absolutize(&fragment.url, href)),
                    None => record.set(raw::URL, fragment.url.as_str()),
                }
                if !record.has(raw::TITLE) {
                    debug!(page = page + 1, card = i + 1, "card without title");
                    continue;
                }
                records.push(record);
            }
        }

        if cards == 0 {
            return Err(ExtractError::NoStructure(format!(
                "no elements match card selector {:?}",
                self.selectors.card
            )));
        }
        Ok(records)
    }
}

impl Extractor for DynamicHtmlExtractor {
    fn key(&self) -> &'static str {
        "dynamic_html"
    }

    fn extract(&self, input: &str) -> Result<Vec<RawRecord>, ExtractError> {
        let fragments: Vec<HtmlFragment> = parse_input(self.key(), input)?;
        self.parse(&fragments)
    }
}

fn first_text(card: ElementRef<'_>, sel: &Selector) -> Option<String> {
    let el = card.select(sel).next()?;
    let text = squash_whitespace(&el.text().collect::<Vec<_>>().join(" "));
    (!text.is_empty()).then_some(text)
}
