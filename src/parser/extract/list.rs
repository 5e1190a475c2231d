use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use super::fields::{split_entries, Stacking};
use super::{parse_input, ExtractError, Extractor};
use crate::parser::datetime::{parse_year_month, ReferenceMonth};
use crate::parser::raw::{self, RawRecord};
use crate::parser::text::{fold_width, lines, original_span};

static DAY_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^((?:(?:令和|平成)\s*(?:\d{1,2}|元)\s*年\s*|\d{4}\s*年\s*)?(?:\d{1,2}\s*月\s*)?\d{1,2}\s*日(?:\s*\([^)]{1,3}\))?|\d{1,2}/\d{1,2}(?:\s*\([^)]{1,3}\))?|\d{1,2}\s*\([月火水木金土日][^)]{0,2}\))\s*(.*)$",
    )
    .unwrap()
});

fn first_page() -> u32 {
    1
}

/// One extracted text line and the PDF page it came from.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TextLine {
    #[serde(default = "first_page")]
    pub page: u32,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ListInput {
    lines: Vec<TextLine>,
    #[serde(default)]
    url: Option<String>,
}

/// Newsletter-style PDF: blocks of text, each opened by a day or date.
pub struct ListExtractor {
    reference: Option<ReferenceMonth>,
}

impl ListExtractor {
    pub fn new(reference: Option<ReferenceMonth>) -> Self {
        ListExtractor { reference }
    }
}

impl Extractor for ListExtractor {
    fn key(&self) -> &'static str {
        "list"
    }

    fn extract(&self, input: &str) -> Result<Vec<RawRecord>, ExtractError> {
        let input: ListInput = parse_input(self.key(), input)?;
        parse_lines(&input.lines, self.reference, input.url.as_deref())
    }
}

struct Block {
    page: u32,
    date: String,
    reference: Option<ReferenceMonth>,
    lines: Vec<String>,
}

/// Segment `lines` on day markers and split each block into events. Lines
/// before the first marker are page furniture, except year/month headers,
/// which set the reference for the markers that follow when none is given.
pub fn parse_lines(
    text_lines: &[TextLine],
    reference: Option<ReferenceMonth>,
    url: Option<&str>,
) -> Result<Vec<RawRecord>, ExtractError> {
    let mut current_ref = reference;
    let mut blocks: Vec<Block> = Vec::new();

    for text_line in text_lines {
        for line in lines(&text_line.text) {
            let folded = fold_width(&line);
            if let Some(caps) = DAY_MARKER_RE.captures(&folded) {
                let marker = caps.get(1).map(|m| original_span(&line, &folded, m.range()));
                let rest = caps.get(2).map(|m| original_span(&line, &folded, m.range()));
                let date = marker.unwrap_or_default();
                let has_year = caps.get(1).is_some_and(|m| m.as_str().contains('年'));
                if current_ref.is_none() && !has_year {
                    return Err(ExtractError::MissingReference {
                        page: text_line.page,
                    });
                }
                blocks.push(Block {
                    page: text_line.page,
                    date,
                    reference: current_ref,
                    lines: rest
                        .map(|r| r.trim().to_string())
                        .filter(|r| !r.is_empty())
                        .into_iter()
                        .collect(),
                });
                continue;
            }
            if reference.is_none() {
                if let Some(header) = parse_year_month(&line) {
                    debug!(page = text_line.page, reference = %header, "year/month header");
                    current_ref = Some(header);
                    continue;
                }
            }
            match blocks.last_mut() {
                Some(block) => block.lines.push(line),
                None => debug!(page = text_line.page, line = %line, "text before first day marker"),
            }
        }
    }

    if blocks.is_empty() {
        return Err(ExtractError::NoStructure(format!(
            "no day markers in {} line(s)",
            text_lines.len()
        )));
    }

    let mut records = Vec::new();
    for block in blocks {
        let mut base = RawRecord::new()
            .with(raw::DATE, block.date)
            .with(raw::PROVENANCE, format!("p{}", block.page));
        if let Some(r) = block.reference {
            base.set(raw::REFERENCE, r.to_string());
        }
        if let Some(url) = url {
            base.set(raw::URL, url);
        }
        records.extend(split_entries(&block.lines, &base, Stacking::TimeLed));
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(v: &[&str]) -> Vec<TextLine> {
        v.iter()
            .map(|t| TextLine {
                page: 1,
                text: t.to_string(),
            })
            .collect()
    }

    #[test]
    fn segments_on_day_markers() {
        let input = text(&[
            "中央ひろば 3月のおしらせ",
            "5日(木) 離乳食講座",
            "5～6か月の赤ちゃんと保護者",
            "要電話申込",
            "12日(木)",
            "10:30～ リトミック",
            "会場：2階ホール",
        ]);
        let records = parse_lines(&input, ReferenceMonth::new(2026, 3), None).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text(raw::DATE), "5日(木)");
        assert_eq!(records[0].text(raw::TITLE), "離乳食講座");
        assert_eq!(records[0].text(raw::APPLY), "要電話申込");
        assert_eq!(records[1].text(raw::DATE), "12日(木)");
        assert_eq!(records[1].text(raw::TITLE), "リトミック");
        assert_eq!(records[1].text(raw::LOCATION), "2階ホール");
        assert_eq!(records[1].text(raw::REFERENCE), "2026-03");
    }

    #[test]
    fn header_supplies_reference() {
        let input = text(&["令和8年4月 ひろばだより", "4/8(水) 絵本の会"]);
        let records = parse_lines(&input, None, Some("https://example.jp/a.pdf")).unwrap();
        assert_eq!(records[0].text(raw::REFERENCE), "2026-04");
        assert_eq!(records[0].text(raw::DATE), "4/8(水)");
        assert_eq!(records[0].text(raw::URL), "https://example.jp/a.pdf");
    }

    #[test]
    fn full_dates_need_no_reference() {
        let input = text(&["2026年3月20日(金) おたのしみ会"]);
        let records = parse_lines(&input, None, None).unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].has(raw::REFERENCE));
    }

    #[test]
    fn day_only_without_reference_fails_the_source() {
        let err = parse_lines(&text(&["5日 離乳食講座"]), None, None).unwrap_err();
        assert!(matches!(err, ExtractError::MissingReference { page: 1 }));
    }

    #[test]
    fn no_markers_fails_the_source() {
        let err = parse_lines(&text(&["休館のお知らせ"]), ReferenceMonth::new(2026, 3), None).unwrap_err();
        assert!(matches!(err, ExtractError::NoStructure(_)));
    }

    #[test]
    fn marker_without_title_is_skipped() {
        let records = parse_lines(&text(&["5日(木)", "※休館日"]), ReferenceMonth::new(2026, 3), None).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn times_are_not_markers() {
        let input = text(&["5日(木)", "10:00～ 体操", "13:00～ 工作"]);
        let records = parse_lines(&input, ReferenceMonth::new(2026, 3), None).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.text(raw::DATE) == "5日(木)"));
    }

    #[test]
    fn newsletter_fixture() {
        let input = std::fs::read_to_string("tests/fixtures/hokubu_list.json").unwrap();
        let records = ListExtractor::new(ReferenceMonth::new(2026, 3)).extract(&input).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].text(raw::TARGET), "2～6か月の赤ちゃんと保護者");
        assert_eq!(records[0].text(raw::APPLY), "予約制・定員10組");
        assert_eq!(records[1].text(raw::APPLY), "申込不要");
        assert_eq!(records[2].text(raw::PROVENANCE), "p2");
    }
}
