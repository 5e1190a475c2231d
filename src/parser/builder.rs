use thiserror::Error;
use tracing::debug;

use super::classify::RuleTable;
use super::datetime::{self, ReferenceMonth};
use super::raw::{self, RawRecord};
use super::reservation;
use super::text;
use crate::feed::EventRecord;

const BODY_PREVIEW_CHARS: usize = 120;

/// Why a raw record was not published.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DropReason {
    #[error("record has no title")]
    MissingTitle,
    #[error("unresolvable date {raw:?}")]
    UnresolvedDate { raw: String },
}

/// What the builder needs to know about the source a record came from.
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub name: String,
    pub url: String,
    pub reference: Option<ReferenceMonth>,
}

impl SourceContext {
    pub fn new(name: &str, url: &str) -> Self {
        SourceContext {
            name: name.to_string(),
            url: url.to_string(),
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: Option<ReferenceMonth>) -> Self {
        self.reference = reference;
        self
    }
}

/// Assemble one publishable event. Only a missing title or an unresolvable
/// date rejects the record; everything else falls back to a default.
pub fn build(
    raw: &RawRecord,
    ctx: &SourceContext,
    rules: &RuleTable,
) -> Result<EventRecord, DropReason> {
    let title = text::squash_whitespace(raw.text(raw::TITLE));
    if title.is_empty() {
        return Err(DropReason::MissingTitle);
    }

    let date_raw = raw.text(raw::DATE).trim();
    let reference = raw
        .get(raw::REFERENCE)
        .and_then(ReferenceMonth::parse_key)
        .or(ctx.reference);
    let date = datetime::normalize_date(date_raw, reference).ok_or_else(|| {
        DropReason::UnresolvedDate {
            raw: date_raw.to_string(),
        }
    })?;
    if let Some(end) = date.end {
        debug!(title = %title, start = %date.date, %end, "range listed on its first day");
    }

    let time_text = raw.text(raw::TIME).trim();
    let time = if time_text.is_empty() {
        datetime::find_time_in(date_raw).unwrap_or_default()
    } else {
        datetime::normalize_time(time_text)
    };
    if !time_text.is_empty() && time.is_empty() {
        debug!(title = %title, time = time_text, "time kept as text only");
    }

    let apply_info = text::squash_whitespace(raw.text(raw::APPLY));
    let body = raw.text(raw::BODY);
    let hint = raw.text(raw::CATEGORY);
    let age_hint = raw.text(raw::TARGET);

    let category = rules.category(&title, body, hint);
    let target_age = rules.age(&title, &format!("{age_hint}\n{body}"), hint);
    let reservation = reservation::detect(&title, &apply_info);

    Ok(EventRecord {
        title: reservation.title,
        date_raw: date.raw.clone(),
        date_iso: date.iso(),
        time_raw: time.raw,
        location: text::squash_whitespace(raw.text(raw::LOCATION)),
        apply_info,
        category,
        target_age,
        url: absolutize(&ctx.url, raw.text(raw::URL)),
        source: ctx.name.clone(),
        needs_reservation: reservation.needs_reservation,
        body_preview: text::preview(body, BODY_PREVIEW_CHARS),
    })
}

/// Resolve `href` against the source URL; an empty href points at the
/// source itself.
pub fn absolutize(base: &str, href: &str) -> String {
    let href = href.trim();
    if href.is_empty() {
        return base.to_string();
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    let origin = origin(base);
    if href.starts_with('/') {
        return format!("{origin}{href}");
    }
    // Relative to the directory of the base URL.
    let dir = match base.rfind('/') {
        Some(i) if i + 1 > origin.len() => &base[..=i],
        _ => return format!("{origin}/{href}"),
    };
    format!("{dir}{href}")
}

fn origin(url: &str) -> &str {
    let after_scheme = url.find("//").map_or(0, |i| i + 2);
    match url[after_scheme..].find('/') {
        Some(i) => &url[..after_scheme + i],
        None => url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::classify::{AgeBucket, Category};

    fn ctx() -> SourceContext {
        SourceContext::new("熊本市子育て支援", "https://www.kumamoto-kekkon-kosodate.jp/hpkiji/pub/List.aspx")
    }

    #[test]
    fn full_record() {
        let raw = RawRecord::new()
            .with(raw::TITLE, "★離乳食講座")
            .with(raw::DATE, "2026年3月5日")
            .with(raw::TIME, "10:00〜11:30")
            .with(raw::LOCATION, "中央区 子育て支援センター")
            .with(raw::BODY, "5〜6か月の赤ちゃんと保護者。\n持ち物：母子手帳");
        let e = build(&raw, &ctx(), &RuleTable::default()).unwrap();
        assert_eq!(e.title, "★離乳食講座");
        assert_eq!(e.date_iso, "2026-03-05");
        assert_eq!(e.date_raw, "2026年3月5日");
        assert_eq!(e.time_raw, "10:00〜11:30");
        assert!(e.needs_reservation);
        assert_eq!(e.category, Category::FoodNutrition);
        assert_eq!(e.source, "熊本市子育て支援");
        assert_eq!(e.url, "https://www.kumamoto-kekkon-kosodate.jp/hpkiji/pub/List.aspx");
        assert_eq!(e.body_preview, "5〜6か月の赤ちゃんと保護者。 持ち物：母子手帳");
    }

    #[test]
    fn phone_application_marks_title_once() {
        let raw = RawRecord::new()
            .with(raw::TITLE, "パパと遊ぼう")
            .with(raw::DATE, "2026年3月8日")
            .with(raw::APPLY, "要電話申込");
        let e = build(&raw, &ctx(), &RuleTable::default()).unwrap();
        assert!(e.needs_reservation);
        assert_eq!(e.title, "★パパと遊ぼう");

        let again = RawRecord::new()
            .with(raw::TITLE, e.title.as_str())
            .with(raw::DATE, "2026年3月8日")
            .with(raw::APPLY, "要電話申込");
        assert_eq!(build(&again, &ctx(), &RuleTable::default()).unwrap().title, "★パパと遊ぼう");
    }

    #[test]
    fn missing_title_is_dropped() {
        let raw = RawRecord::new().with(raw::DATE, "2026年3月5日");
        assert_eq!(build(&raw, &ctx(), &RuleTable::default()), Err(DropReason::MissingTitle));
    }

    #[test]
    fn unresolvable_date_is_dropped() {
        let raw = RawRecord::new().with(raw::TITLE, "クリスマス会").with(raw::DATE, "来月お知らせ");
        assert_eq!(
            build(&raw, &ctx(), &RuleTable::default()),
            Err(DropReason::UnresolvedDate { raw: "来月お知らせ".into() })
        );
    }

    #[test]
    fn day_only_uses_source_reference() {
        let raw = RawRecord::new().with(raw::TITLE, "えほんの日").with(raw::DATE, "15日");
        let ctx = ctx().with_reference(ReferenceMonth::new(2026, 3));
        assert_eq!(build(&raw, &ctx, &RuleTable::default()).unwrap().date_iso, "2026-03-15");
    }

    #[test]
    fn record_reference_beats_source_reference() {
        let raw = RawRecord::new()
            .with(raw::TITLE, "えほんの日")
            .with(raw::DATE, "15日")
            .with(raw::REFERENCE, "2026-04");
        let ctx = ctx().with_reference(ReferenceMonth::new(2026, 3));
        assert_eq!(build(&raw, &ctx, &RuleTable::default()).unwrap().date_iso, "2026-04-15");
    }

    #[test]
    fn defaults_for_missing_fields() {
        let raw = RawRecord::new().with(raw::TITLE, "おたのしみ会").with(raw::DATE, "2026/3/20");
        let e = build(&raw, &ctx(), &RuleTable::default()).unwrap();
        assert_eq!(e.time_raw, "");
        assert_eq!(e.location, "");
        assert_eq!(e.apply_info, "");
        assert_eq!(e.body_preview, "");
        assert_eq!(e.category, Category::Other);
        assert_eq!(e.target_age, AgeBucket::Unspecified);
        assert!(!e.needs_reservation);
    }

    #[test]
    fn partial_time_keeps_date() {
        let raw = RawRecord::new()
            .with(raw::TITLE, "体操教室")
            .with(raw::DATE, "2026年3月5日")
            .with(raw::TIME, "午前中");
        let e = build(&raw, &ctx(), &RuleTable::default()).unwrap();
        assert_eq!(e.date_iso, "2026-03-05");
        assert_eq!(e.time_raw, "午前中");
    }

    #[test]
    fn time_taken_from_date_text() {
        let raw = RawRecord::new().with(raw::TITLE, "体操教室").with(raw::DATE, "2026年3月5日(木) 10:00～11:00");
        let e = build(&raw, &ctx(), &RuleTable::default()).unwrap();
        assert_eq!(e.time_raw, "10:00～11:00");
    }

    #[test]
    fn target_hint_drives_age() {
        let raw = RawRecord::new()
            .with(raw::TITLE, "親子教室")
            .with(raw::DATE, "2026年3月5日")
            .with(raw::TARGET, "2歳児と保護者");
        let e = build(&raw, &ctx(), &RuleTable::default()).unwrap();
        assert_eq!(e.target_age, AgeBucket::Toddler);
    }

    #[test]
    fn url_resolution() {
        let base = "https://www.kumamoto-kekkon-kosodate.jp/hpkiji/pub/List.aspx";
        assert_eq!(absolutize(base, "/hpkiji/pub/page1234.html"), "https://www.kumamoto-kekkon-kosodate.jp/hpkiji/pub/page1234.html");
        assert_eq!(absolutize(base, "page1.html"), "https://www.kumamoto-kekkon-kosodate.jp/hpkiji/pub/page1.html");
        assert_eq!(absolutize(base, "https://other.jp/x"), "https://other.jp/x");
        assert_eq!(absolutize("https://a.jp", "x.pdf"), "https://a.jp/x.pdf");
    }
}
