pub mod dynamic_html;
pub mod fields;
pub mod grid;
pub mod list;
pub mod manual;
pub mod static_html;
pub mod two_column;

use thiserror::Error;

use crate::config::{Layout, SourceConfig};
use crate::parser::raw::RawRecord;

/// Source-level failure: the source contributes no records, the run goes on.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("malformed {layout} input: {source}")]
    Input {
        layout: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid selector {selector:?}")]
    Selector { selector: String },
    #[error("invalid link pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("no reference year/month for page {page}; set `reference` or provide a header")]
    MissingReference { page: u32 },
    #[error("{0}")]
    NoStructure(String),
}

/// One implementation per source layout.
pub trait Extractor {
    fn key(&self) -> &'static str;
    fn extract(&self, input: &str) -> Result<Vec<RawRecord>, ExtractError>;
}

/// Pick the extractor for a configured source.
pub fn for_source(source: &SourceConfig) -> Box<dyn Extractor> {
    match source.layout {
        Layout::StaticHtml => Box::new(static_html::StaticHtmlExtractor::new(
            &source.url,
            source.link_pattern.as_deref(),
        )),
        Layout::DynamicHtml => Box::new(dynamic_html::DynamicHtmlExtractor::new(
            source.selectors.clone().unwrap_or_default(),
        )),
        Layout::Grid => Box::new(grid::GridExtractor::new(source.reference)),
        Layout::List => Box::new(list::ListExtractor::new(source.reference)),
        Layout::TwoColumn => Box::new(two_column::TwoColumnExtractor::new(
            source.reference,
            source.split.clone().unwrap_or_default(),
        )),
        Layout::Manual => Box::new(manual::ManualExtractor),
    }
}

pub(crate) fn parse_input<T: serde::de::DeserializeOwned>(
    layout: &'static str,
    input: &str,
) -> Result<T, ExtractError> {
    serde_json::from_str(input).map_err(|source| ExtractError::Input { layout, source })
}
