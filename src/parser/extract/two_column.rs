use serde::Deserialize;
use tracing::warn;

use super::list::{parse_lines, TextLine};
use super::{parse_input, ExtractError, Extractor};
use crate::config::{SplitConfig, SplitMode};
use crate::parser::datetime::ReferenceMonth;
use crate::parser::raw::{self, RawRecord};

fn first_page() -> u32 {
    1
}

/// Text line with its position on the page, in PDF units.
#[derive(Debug, Clone, Deserialize)]
pub struct PlacedLine {
    #[serde(default = "first_page")]
    pub page: u32,
    pub x: f32,
    pub y: f32,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
struct PlacedInput {
    lines: Vec<PlacedLine>,
    #[serde(default)]
    url: Option<String>,
}

/// Two-column or front/back flyer. Each half is read as a list on its own,
/// and the halves are concatenated with the left/front one first.
pub struct TwoColumnExtractor {
    reference: Option<ReferenceMonth>,
    split: SplitConfig,
}

impl TwoColumnExtractor {
    pub fn new(reference: Option<ReferenceMonth>, split: SplitConfig) -> Self {
        TwoColumnExtractor { reference, split }
    }

    fn halves(&self, lines: &[PlacedLine]) -> (Vec<PlacedLine>, Vec<PlacedLine>) {
        match self.split.mode {
            SplitMode::Pages => lines.iter().cloned().partition(|l| l.page % 2 == 1),
            SplitMode::Columns => {
                let split_x = self.split.split_x.unwrap_or_else(|| midpoint(lines));
                lines.iter().cloned().partition(|l| l.x < split_x)
            }
        }
    }
}

impl Extractor for TwoColumnExtractor {
    fn key(&self) -> &'static str {
        "two_column"
    }

    fn extract(&self, input: &str) -> Result<Vec<RawRecord>, ExtractError> {
        let input: PlacedInput = parse_input(self.key(), input)?;
        let (first, second) = self.halves(&input.lines);
        let (first_tag, second_tag) = match self.split.mode {
            SplitMode::Columns => ("left", "right"),
            SplitMode::Pages => ("front", "back"),
        };

        let mut records = Vec::new();
        let mut failures = Vec::new();
        for (half, tag) in [(first, first_tag), (second, second_tag)] {
            match parse_lines(&reading_order(half), self.reference, input.url.as_deref()) {
                Ok(half_records) => {
                    records.extend(half_records.into_iter().map(|mut r| {
                        let provenance = format!("{}-{tag}", r.text(raw::PROVENANCE));
                        r.set(raw::PROVENANCE, provenance);
                        r
                    }));
                }
                Err(e) => {
                    warn!(half = tag, "{e}");
                    failures.push(e);
                }
            }
        }
        if failures.len() == 2 {
            return Err(failures.remove(0));
        }
        Ok(records)
    }
}

/// Halfway between the leftmost and rightmost line starts.
fn midpoint(lines: &[PlacedLine]) -> f32 {
    let (min, max) = lines
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), l| (lo.min(l.x), hi.max(l.x)));
    if min > max {
        0.0
    } else {
        (min + max) / 2.0
    }
}

/// Top-to-bottom within each page, pages in order.
fn reading_order(mut lines: Vec<PlacedLine>) -> Vec<TextLine> {
    lines.sort_by(|a, b| a.page.cmp(&b.page).then(a.y.total_cmp(&b.y)));
    lines
        .into_iter()
        .map(|l| TextLine {
            page: l.page,
            text: l.text,
        })
        .collect()
}
