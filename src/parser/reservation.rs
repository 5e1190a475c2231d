use std::sync::LazyLock;

use regex::Regex;

/// Badge shown in front of titles that need advance booking.
pub const MARKER: &str = "★";

const NEGATIVE_PHRASES: &[&str] = &["予約不要", "申込不要", "申し込み不要", "申込み不要", "予約なし"];
const POSITIVE_PHRASES: &[&str] = &[
    "要予約",
    "予約制",
    "事前予約",
    "要申込",
    "事前申込",
    "申込必要",
    "予約が必要",
    "申込が必要",
];

// `要` must not be the tail of `不要` or `必要`.
static REQUIRED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^不必])要.{0,4}?(?:申込|申し込|予約)").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub needs_reservation: bool,
    pub title: String,
}

pub fn needs_reservation(title: &str, apply_info: &str) -> bool {
    if title.trim_start().starts_with(MARKER) {
        return true;
    }
    let text = format!("{title}\n{apply_info}");
    if NEGATIVE_PHRASES.iter().any(|p| text.contains(p)) {
        return false;
    }
    POSITIVE_PHRASES.iter().any(|p| text.contains(p)) || REQUIRED_RE.is_match(&text)
}

/// Detect the reservation requirement and badge the title. Running it on its
/// own output is a no-op.
pub fn detect(title: &str, apply_info: &str) -> Reservation {
    let title = title.trim();
    let needs = needs_reservation(title, apply_info);
    let title = if needs && !title.starts_with(MARKER) {
        format!("{MARKER}{title}")
    } else {
        title.to_string()
    };
    Reservation {
        needs_reservation: needs,
        title,
    }
}
