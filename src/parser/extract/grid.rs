use std::sync::LazyLock;

use chrono::{Datelike, Weekday};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use super::fields::{split_entries, Stacking};
use super::{parse_input, ExtractError, Extractor};
use crate::parser::datetime::{parse_year_month, weekday_from_kanji, weekday_kanji, ReferenceMonth};
use crate::parser::raw::{self, RawRecord};
use crate::parser::text::{fold_width, lines, original_span};

static DAY_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})(?:\s*日|\s*\([^)]{1,3}\)|\s|$)\s*(?:\([^)]{1,3}\))?\s*(.*)$").unwrap()
});
static WEEKDAY_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[月火水木金土日](?:曜日?)?$").unwrap());

const SUNDAY_FIRST: [Weekday; 7] = [
    Weekday::Sun,
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
];

fn first_page() -> u32 {
    1
}

/// One calendar page: week rows of day cells, optionally preceded by a
/// weekday header row.
#[derive(Debug, Clone, Deserialize)]
pub struct GridPage {
    #[serde(default = "first_page")]
    pub page: u32,
    /// Page title text, e.g. `令和8年3月 ひろばだより`.
    #[serde(default)]
    pub header: Option<String>,
    pub rows: Vec<Vec<String>>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GridInput {
    pages: Vec<GridPage>,
}

/// Monthly calendar PDF: day-of-week columns, one row per week.
pub struct GridExtractor {
    reference: Option<ReferenceMonth>,
}

impl GridExtractor {
    pub fn new(reference: Option<ReferenceMonth>) -> Self {
        GridExtractor { reference }
    }

    pub fn parse_page(&self, page: &GridPage) -> Result<Vec<RawRecord>, ExtractError> {
        let reference = self
            .reference
            .or_else(|| page.header.as_deref().and_then(parse_year_month))
            .ok_or(ExtractError::MissingReference { page: page.page })?;

        let header = page.rows.first().and_then(|row| weekday_header(row));
        let (columns, weeks) = match header {
            Some(columns) => (columns, &page.rows[1..]),
            None => (SUNDAY_FIRST.to_vec(), page.rows.as_slice()),
        };
        let layout = MonthLayout::new(reference, &columns);

        let mut records = Vec::new();
        for (week, row) in weeks.iter().enumerate() {
            for (col, cell) in row.iter().enumerate() {
                let mut cell_lines = lines(cell);
                if cell_lines.is_empty() {
                    continue;
                }
                let explicit = take_day_marker(&mut cell_lines);
                let Some(day) = layout.resolve(week, col, explicit) else {
                    debug!(page = page.page, week, col, cell = %cell, "cell outside month");
                    continue;
                };
                if cell_lines.is_empty() {
                    continue;
                }
                let Some(date) = reference.day(day) else {
                    continue;
                };
                let mut base = RawRecord::new()
                    .with(
                        raw::DATE,
                        format!("{}月{}日({})", reference.month, day, weekday_kanji(date.weekday())),
                    )
                    .with(raw::REFERENCE, reference.to_string())
                    .with(raw::PROVENANCE, format!("p{}-r{}c{}", page.page, week, col));
                if let Some(url) = &page.url {
                    base.set(raw::URL, url.as_str());
                }
                records.extend(split_entries(&cell_lines, &base, Stacking::EveryLine));
            }
        }
        Ok(records)
    }
}

impl Extractor for GridExtractor {
    fn key(&self) -> &'static str {
        "grid"
    }

    fn extract(&self, input: &str) -> Result<Vec<RawRecord>, ExtractError> {
        let input: GridInput = parse_input(self.key(), input)?;
        if input.pages.iter().all(|p| p.rows.iter().all(|r| r.is_empty())) {
            return Err(ExtractError::NoStructure(format!(
                "calendar grid has no cells in {} page(s)",
                input.pages.len()
            )));
        }
        // A bad page is skipped; the source fails only when no page parses.
        let mut records = Vec::new();
        let mut failures = Vec::new();
        for page in &input.pages {
            match self.parse_page(page) {
                Ok(page_records) => records.extend(page_records),
                Err(e) => {
                    warn!(page = page.page, "{e}");
                    failures.push(e);
                }
            }
        }
        if failures.len() == input.pages.len() && !failures.is_empty() {
            return Err(failures.remove(0));
        }
        Ok(records)
    }
}

/// Column weekdays when `row` is a header like `日 月 火 水 木 金 土`.
fn weekday_header(row: &[String]) -> Option<Vec<Weekday>> {
    let days: Vec<Weekday> = row
        .iter()
        .filter_map(|cell| {
            let folded = fold_width(cell.trim());
            WEEKDAY_HEADER_RE
                .is_match(&folded)
                .then(|| weekday_from_kanji(&folded))
                .flatten()
        })
        .collect();
    (days.len() >= 5 && days.len() == row.len()).then_some(days)
}

/// Strip a leading day number (`15`, `15日`, `15(水)`) off the first line.
fn take_day_marker(cell_lines: &mut Vec<String>) -> Option<u32> {
    let first = cell_lines.first()?;
    let folded = fold_width(first);
    let caps = DAY_MARKER_RE.captures(&folded)?;
    let day: u32 = caps[1].parse().ok()?;
    let rest = caps
        .get(2)
        .map(|m| original_span(first, &folded, m.range()).trim().to_string())
        .unwrap_or_default();
    if rest.is_empty() {
        cell_lines.remove(0);
    } else {
        cell_lines[0] = rest;
    }
    Some(day)
}

/// Where day 1 sits in the grid, so a cell position maps to a day number.
struct MonthLayout {
    days_in_month: u32,
    columns: Vec<Weekday>,
    /// Days between the grid's first column and day 1.
    lead: i64,
}

impl MonthLayout {
    fn new(reference: ReferenceMonth, columns: &[Weekday]) -> Self {
        let start = columns.first().copied().unwrap_or(Weekday::Sun);
        let lead = reference
            .first_day()
            .map(|d| days_after(start, d.weekday()))
            .unwrap_or(0);
        MonthLayout {
            days_in_month: reference.days_in_month(),
            columns: columns.to_vec(),
            lead,
        }
    }

    /// Day number implied by the cell's position, which may fall outside
    /// the month when the grid carries days from a neighbouring month.
    fn position(&self, week: usize, col: usize) -> Option<i64> {
        let start = *self.columns.first()?;
        let weekday = *self.columns.get(col)?;
        Some(week as i64 * 7 + days_after(start, weekday) - self.lead + 1)
    }

    /// An explicit day number wins over position, except for cells that
    /// belong to the previous or next month.
    fn resolve(&self, week: usize, col: usize, explicit: Option<u32>) -> Option<u32> {
        let dim = self.days_in_month as i64;
        let pos = self.position(week, col);
        match (explicit, pos) {
            (Some(d), _) if d == 0 || d > self.days_in_month => None,
            (Some(d), Some(p)) if (1..=dim).contains(&p) => {
                if p != d as i64 {
                    warn!(week, col, day = d, position = p, "day number disagrees with grid position");
                }
                Some(d)
            }
            (Some(d), Some(p)) => {
                if (p < 1 && d > 20) || (p > dim && d < 15) {
                    return None;
                }
                warn!(week, col, day = d, position = p, "trusting day number outside grid month");
                Some(d)
            }
            (Some(d), None) => (!(week == 0 && d > 7)).then_some(d),
            (None, Some(p)) if (1..=dim).contains(&p) => Some(p as u32),
            (None, _) => None,
        }
    }
}

fn days_after(start: Weekday, day: Weekday) -> i64 {
    (day.num_days_from_sunday() as i64 + 7 - start.num_days_from_sunday() as i64) % 7
}
