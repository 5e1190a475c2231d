use std::fmt;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::text::{canonicalize, fold_width, original_span};

static ERA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(令和|平成)\s*(\d{1,2}|元)\s*年\s*(\d{1,2})\s*月\s*(\d{1,2})\s*日").unwrap()
});
static FULL_KANJI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})\s*年\s*(\d{1,2})\s*月\s*(\d{1,2})\s*日").unwrap());
static FULL_NUMERIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})[/.\-](\d{1,2})[/.\-](\d{1,2})").unwrap());
static MONTH_DAY_KANJI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})\s*月\s*(\d{1,2})\s*日").unwrap());
static MONTH_DAY_SLASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^\d/])(\d{1,2})/(\d{1,2})(?:$|[^\d/])").unwrap());
static DAY_KANJI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^\d])(\d{1,2})\s*日").unwrap());
static DAY_BARE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d{1,2})\s*(?:\(|$)").unwrap());
static WEEKDAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\(\s*([月火水木金土日])").unwrap());
static RANGE_SEP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[^~]{0,8}?~\s*").unwrap());
static YEAR_MONTH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:(令和|平成)\s*(\d{1,2}|元)|(\d{4}))\s*年\s*(\d{1,2})\s*月").unwrap()
});
static TIME_POINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(午前|午後)?\s*(\d{1,2})\s*(?::\s*(\d{2})|時\s*(?:(\d{1,2})\s*分|(半))?)").unwrap()
});

/// Calendar period a year-less or month-less date fragment resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceMonth {
    pub year: i32,
    pub month: u32,
}

impl ReferenceMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(ReferenceMonth { year, month })
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    pub fn days_in_month(&self) -> u32 {
        let (y, m) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(y, m, 1)
            .and_then(|d| d.pred_opt())
            .map(|d| d.day())
            .unwrap_or(0)
    }

    pub fn day(&self, day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, day)
    }

    /// Inverse of the `Display` form, `YYYY-MM`.
    pub fn parse_key(s: &str) -> Option<Self> {
        let (y, m) = s.trim().split_once('-')?;
        ReferenceMonth::new(y.parse().ok()?, m.parse().ok()?)
    }
}

impl fmt::Display for ReferenceMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

pub fn weekday_kanji(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "月",
        Weekday::Tue => "火",
        Weekday::Wed => "水",
        Weekday::Thu => "木",
        Weekday::Fri => "金",
        Weekday::Sat => "土",
        Weekday::Sun => "日",
    }
}

/// Inverse of [`weekday_kanji`], accepting the first char of `日曜` etc.
pub fn weekday_from_kanji(s: &str) -> Option<Weekday> {
    match s.trim().chars().next()? {
        '月' => Some(Weekday::Mon),
        '火' => Some(Weekday::Tue),
        '水' => Some(Weekday::Wed),
        '木' => Some(Weekday::Thu),
        '金' => Some(Weekday::Fri),
        '土' => Some(Weekday::Sat),
        '日' => Some(Weekday::Sun),
        _ => None,
    }
}

/// Pull a year/month header such as `令和8年3月` or `2026年3月` out of a
/// calendar title.
pub fn parse_year_month(text: &str) -> Option<ReferenceMonth> {
    let canon = canonicalize(text);
    let caps = YEAR_MONTH_RE.captures(&canon)?;
    let year = match (caps.get(1), caps.get(2), caps.get(3)) {
        (Some(era), Some(n), _) => era_year(era.as_str(), n.as_str())?,
        (_, _, Some(y)) => y.as_str().parse().ok()?,
        _ => return None,
    };
    ReferenceMonth::new(year, caps[4].parse().ok()?)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedDate {
    pub raw: String,
    pub date: NaiveDate,
    /// Only set when the text literally states a range.
    pub end: Option<NaiveDate>,
}

impl NormalizedDate {
    pub fn iso(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub raw: String,
    pub start: Option<NaiveTime>,
    pub end: Option<NaiveTime>,
}

impl TimeRange {
    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Resolve free-text date to a calendar day. Shapes are tried from the most
/// specific to the least; the first one that matches decides, and a match
/// naming a non-existent day yields `None` rather than rolling over.
pub fn normalize_date(raw: &str, reference: Option<ReferenceMonth>) -> Option<NormalizedDate> {
    let canon = canonicalize(raw);
    let (date, end_at) = match_shapes(&canon, reference)?;

    let end = RANGE_SEP_RE
        .find(&canon[end_at..])
        .and_then(|m| {
            let rest = &canon[end_at + m.end()..];
            let anchor = ReferenceMonth::new(date.year(), date.month());
            match_shapes(rest, anchor).map(|(d, _)| d)
        })
        .and_then(|end| {
            if end < date {
                warn!(raw, %date, %end, "date range ends before it starts; keeping start only");
                None
            } else {
                Some(end)
            }
        });

    Some(NormalizedDate {
        raw: raw.trim().to_string(),
        date,
        end,
    })
}

/// Returns the date and the byte offset in `canon` right after the match.
fn match_shapes(canon: &str, reference: Option<ReferenceMonth>) -> Option<(NaiveDate, usize)> {
    if let Some(caps) = ERA_RE.captures(canon) {
        let year = era_year(&caps[1], &caps[2])?;
        let date = ymd(year, &caps[3], &caps[4]);
        return date.map(|d| (d, caps.get(0).map_or(0, |m| m.end())));
    }
    if let Some(caps) = FULL_KANJI_RE.captures(canon) {
        let date = caps[1].parse().ok().and_then(|y| ymd(y, &caps[2], &caps[3]));
        return date.map(|d| (d, caps.get(0).map_or(0, |m| m.end())));
    }
    if let Some(caps) = FULL_NUMERIC_RE.captures(canon) {
        let date = caps[1].parse().ok().and_then(|y| ymd(y, &caps[2], &caps[3]));
        return date.map(|d| (d, caps.get(0).map_or(0, |m| m.end())));
    }

    let month_day = MONTH_DAY_KANJI_RE
        .captures(canon)
        .map(|c| capture_span(&c, 1, 2))
        .or_else(|| MONTH_DAY_SLASH_RE.captures(canon).map(|c| capture_span(&c, 1, 2)));
    if let Some((month, day, end)) = month_day {
        let Some(reference) = reference else {
            debug!(canon, "month-day without reference year");
            return None;
        };
        let weekday = weekday_after(&canon[end..]);
        let date = resolve_month_day(month, day, reference, weekday)?;
        return Some((date, end));
    }

    let day_only = DAY_KANJI_RE
        .captures(canon)
        .or_else(|| DAY_BARE_RE.captures(canon))
        .and_then(|c| {
            let m = c.get(1)?;
            let day: u32 = m.as_str().parse().ok()?;
            let end = if c.get(0)?.as_str().ends_with('日') {
                c.get(0)?.end()
            } else {
                m.end()
            };
            Some((day, end))
        });
    if let Some((day, end)) = day_only {
        let reference = reference?;
        let date = reference.day(day)?;
        if let Some(weekday) = weekday_after(&canon[end..]) {
            if weekday != date.weekday() {
                warn!(canon, %date, ?weekday, "weekday does not match resolved day");
            }
        }
        return Some((date, end));
    }

    None
}

fn capture_span(caps: &Captures, month: usize, day: usize) -> (u32, u32, usize) {
    let month_val = caps[month].parse().unwrap_or(0);
    let day_val = caps[day].parse().unwrap_or(0);
    let end = caps.get(day).map_or(0, |m| m.end());
    let end = if caps.get(0).is_some_and(|m| m.as_str().ends_with('日')) {
        caps.get(0).map_or(end, |m| m.end())
    } else {
        end
    };
    (month_val, day_val, end)
}

fn resolve_month_day(
    month: u32,
    day: u32,
    reference: ReferenceMonth,
    weekday: Option<Weekday>,
) -> Option<NaiveDate> {
    // A January listing in a December calendar belongs to the next year.
    let year = if month + 6 < reference.month {
        reference.year + 1
    } else {
        reference.year
    };
    let date = NaiveDate::from_ymd_opt(year, month, day);

    let Some(weekday) = weekday else {
        return date;
    };
    if date.is_some_and(|d| d.weekday() == weekday) {
        return date;
    }
    // Only the next year may override the reference year.
    if year == reference.year {
        if let Some(d) = NaiveDate::from_ymd_opt(year + 1, month, day) {
            if d.weekday() == weekday {
                return Some(d);
            }
        }
    }
    if let Some(d) = date {
        warn!(%d, ?weekday, "weekday does not match the next year either; keeping reference year");
    }
    date
}

fn weekday_after(rest: &str) -> Option<Weekday> {
    let caps = WEEKDAY_RE.captures(rest)?;
    weekday_from_kanji(&caps[1])
}

fn era_year(era: &str, n: &str) -> Option<i32> {
    let n: i32 = if n == "元" { 1 } else { n.parse().ok()? };
    match era {
        "令和" => Some(2018 + n),
        "平成" => Some(1988 + n),
        _ => None,
    }
}

fn ymd(year: i32, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month.parse().ok()?, day.parse().ok()?)
}

/// Parse a time-of-day range. Anything unparsable degrades to an empty range
/// that still carries the raw text.
pub fn normalize_time(raw: &str) -> TimeRange {
    let canon = canonicalize(raw);
    let Some((start, end, _)) = find_times(&canon) else {
        return TimeRange {
            raw: raw.trim().to_string(),
            ..TimeRange::default()
        };
    };
    if let (Some(s), Some(e)) = (start, end) {
        if e < s {
            warn!(raw, %s, %e, "time range ends before it starts");
        }
    }
    TimeRange {
        raw: raw.trim().to_string(),
        start,
        end,
    }
}

/// Time expression embedded in other text (usually a date line). The
/// returned range's `raw` is the matched span in the source characters.
pub fn find_time_in(text: &str) -> Option<TimeRange> {
    let folded = fold_width(text);
    let (start, end, span) = find_times(&folded)?;
    start?;
    Some(TimeRange {
        raw: original_span(text, &folded, span.0..span.1).trim().to_string(),
        start,
        end,
    })
}

type TimeMatch = (Option<NaiveTime>, Option<NaiveTime>, (usize, usize));

fn find_times(canon: &str) -> Option<TimeMatch> {
    let points: Vec<_> = TIME_POINT_RE.captures_iter(canon).take(2).collect();
    let first = points.first()?;
    let first_span = first.get(0)?;
    let (start, afternoon) = time_point(first, false);

    let second = points.get(1).filter(|second| {
        second.get(0).is_some_and(|m| {
            let gap = canon[first_span.end()..m.start()].trim();
            matches!(gap, "~" | "-" | "から")
        })
    });

    match second {
        Some(caps) => {
            let (end, _) = time_point(caps, afternoon);
            let span_end = caps.get(0).map_or(first_span.end(), |m| m.end());
            Some((start, end, (first_span.start(), span_end)))
        }
        None => Some((start, None, (first_span.start(), first_span.end()))),
    }
}

/// `inherit_pm` carries a leading 午後 over to an unmarked end time.
fn time_point(caps: &Captures, inherit_pm: bool) -> (Option<NaiveTime>, bool) {
    let mut hour: u32 = caps[2].parse().unwrap_or(99);
    let minute: u32 = caps
        .get(3)
        .or_else(|| caps.get(4))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(if caps.get(5).is_some() { 30 } else { 0 });
    let pm = match caps.get(1).map(|m| m.as_str()) {
        Some("午後") => true,
        Some(_) => false,
        None => inherit_pm,
    };
    if pm && hour < 12 {
        hour += 12;
    }
    (NaiveTime::from_hms_opt(hour, minute, 0), pm)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    const MARCH_2026: Option<ReferenceMonth> = Some(ReferenceMonth { year: 2026, month: 3 });

    #[test]
    fn full_kanji_date() {
        let n = normalize_date("2026年3月5日", None).unwrap();
        assert_eq!(n.iso(), "2026-03-05");
        assert_eq!(n.raw, "2026年3月5日");
    }

    #[test]
    fn full_width_full_date() {
        let n = normalize_date("２０２６年１２月２４日（木）", None).unwrap();
        assert_eq!(n.date, d(2026, 12, 24));
    }

    #[test]
    fn era_dates() {
        assert_eq!(normalize_date("令和8年3月5日", None).unwrap().date, d(2026, 3, 5));
        assert_eq!(normalize_date("令和元年5月1日", None).unwrap().date, d(2019, 5, 1));
        assert_eq!(normalize_date("平成31年4月30日", None).unwrap().date, d(2019, 4, 30));
    }

    #[test]
    fn numeric_full_date() {
        assert_eq!(normalize_date("2026/3/5", None).unwrap().date, d(2026, 3, 5));
        assert_eq!(normalize_date("2026-03-05", None).unwrap().date, d(2026, 3, 5));
    }

    #[test]
    fn month_day_needs_reference() {
        assert!(normalize_date("3月5日", None).is_none());
        assert_eq!(normalize_date("3月5日", MARCH_2026).unwrap().date, d(2026, 3, 5));
        assert_eq!(normalize_date("3/5", MARCH_2026).unwrap().date, d(2026, 3, 5));
    }

    #[test]
    fn weekday_moves_january_listing_into_next_year() {
        let dec = ReferenceMonth::new(2025, 12);
        // 2026-01-10 is a Saturday
        let n = normalize_date("1月10日(土)", dec).unwrap();
        assert_eq!(n.date, d(2026, 1, 10));
    }

    #[test]
    fn weekday_picks_matching_year() {
        let reference = ReferenceMonth::new(2025, 6);
        // 2026-07-04 is a Saturday, 2025-07-04 is a Friday
        assert_eq!(normalize_date("7月4日(土)", reference).unwrap().date, d(2026, 7, 4));
        assert_eq!(normalize_date("7月4日(金)", reference).unwrap().date, d(2025, 7, 4));
    }

    #[test]
    fn weekday_typo_keeps_reference_year() {
        // 2026-03-05 is a Thursday; 2025-03-05 was a Wednesday
        let n = normalize_date("3月5日(水)", MARCH_2026).unwrap();
        assert_eq!(n.date, d(2026, 3, 5));
    }

    #[test]
    fn day_only_resolves_in_reference_month() {
        let n = normalize_date("15日(日)", MARCH_2026).unwrap();
        assert_eq!(n.date, d(2026, 3, 15));
        assert_eq!(normalize_date("15", MARCH_2026).unwrap().date, d(2026, 3, 15));
        assert_eq!(normalize_date("15(日)", MARCH_2026).unwrap().date, d(2026, 3, 15));
    }

    #[test]
    fn day_only_without_reference_is_dateless() {
        assert!(normalize_date("15日", None).is_none());
    }

    #[test]
    fn out_of_range_days_are_rejected() {
        let april = ReferenceMonth::new(2026, 4);
        assert!(normalize_date("31日", april).is_none());
        assert!(normalize_date("2026年2月30日", None).is_none());
        assert!(normalize_date("2月29日", ReferenceMonth::new(2026, 2)).is_none());
        assert!(normalize_date("2月29日", ReferenceMonth::new(2028, 2)).is_some());
    }

    #[test]
    fn unparsable_text_is_dateless() {
        assert!(normalize_date("来月お知らせ", MARCH_2026).is_none());
        assert!(normalize_date("", MARCH_2026).is_none());
    }

    #[test]
    fn literal_range_sets_end() {
        let n = normalize_date("3月5日(木)～3月7日(土)", MARCH_2026).unwrap();
        assert_eq!(n.date, d(2026, 3, 5));
        assert_eq!(n.end, Some(d(2026, 3, 7)));

        let n = normalize_date("2026年3月5日～7日", None).unwrap();
        assert_eq!(n.end, Some(d(2026, 3, 7)));
    }

    #[test]
    fn single_day_has_no_end() {
        let n = normalize_date("3月5日 10:00～11:30", MARCH_2026).unwrap();
        assert_eq!(n.end, None);
    }

    #[test]
    fn year_month_header() {
        assert_eq!(parse_year_month("令和8年3月 子育てひろば だより"), ReferenceMonth::new(2026, 3));
        assert_eq!(parse_year_month("２０２６年１０月のおしらせ"), ReferenceMonth::new(2026, 10));
        assert_eq!(parse_year_month("おしらせ"), None);
    }

    #[test]
    fn reference_month_bounds() {
        assert!(ReferenceMonth::new(2026, 13).is_none());
        assert_eq!(ReferenceMonth::new(2026, 4).unwrap().days_in_month(), 30);
        assert_eq!(ReferenceMonth::new(2028, 2).unwrap().days_in_month(), 29);
        assert_eq!(ReferenceMonth::new(2026, 12).unwrap().days_in_month(), 31);
    }

    #[test]
    fn reference_key_round_trip() {
        let r = ReferenceMonth::new(2026, 3).unwrap();
        assert_eq!(r.to_string(), "2026-03");
        assert_eq!(ReferenceMonth::parse_key("2026-03"), Some(r));
        assert_eq!(ReferenceMonth::parse_key("2026-13"), None);
    }

    #[test]
    fn colon_time_range() {
        let r = normalize_time("10:00〜11:30");
        assert_eq!(r.raw, "10:00〜11:30");
        assert_eq!(r.start, Some(t(10, 0)));
        assert_eq!(r.end, Some(t(11, 30)));
    }

    #[test]
    fn full_width_kanji_time_range() {
        let r = normalize_time("１０時３０分から１２時まで");
        assert_eq!(r.start, Some(t(10, 30)));
        assert_eq!(r.end, Some(t(12, 0)));
    }

    #[test]
    fn afternoon_prefix_carries_over() {
        let r = normalize_time("午後1時半～3時");
        assert_eq!(r.start, Some(t(13, 30)));
        assert_eq!(r.end, Some(t(15, 0)));
    }

    #[test]
    fn single_point_time() {
        let r = normalize_time("受付 9:45");
        assert_eq!(r.start, Some(t(9, 45)));
        assert_eq!(r.end, None);
    }

    #[test]
    fn unparsable_time_keeps_raw() {
        let r = normalize_time("午前中");
        assert!(r.is_empty());
        assert_eq!(r.raw, "午前中");
    }

    #[test]
    fn inverted_range_is_kept() {
        let r = normalize_time("15:00-13:00");
        assert_eq!(r.start, Some(t(15, 0)));
        assert_eq!(r.end, Some(t(13, 0)));
    }

    #[test]
    fn time_inside_date_text() {
        let r = find_time_in("3月5日(木) 10:00～11:30").unwrap();
        assert_eq!(r.raw, "10:00～11:30");
        assert_eq!(r.start, Some(t(10, 0)));
        assert!(find_time_in("3月5日(木)").is_none());

        let r = find_time_in("３月５日（木）１０時から１２時まで").unwrap();
        assert_eq!(r.raw, "１０時から１２時");
        assert_eq!(r.end, Some(t(12, 0)));
    }
}
