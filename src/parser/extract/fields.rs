use std::sync::LazyLock;

use regex::Regex;

use crate::parser::raw::{self, RawRecord};
use crate::parser::text::{fold_width, original_span};

static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[【\[<(]?\s*(会場|場所|対象|申込み?|申し込み|予約|定員|持ち物|内容|時間|日時|費用|参加費)\s*(?:[】\]>)]\s*:?|:)\s*(.*)$")
        .unwrap()
});
static LEADING_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^((?:午前|午後)?\s*\d{1,2}\s*(?::\s*\d{2}|時\s*(?:\d{1,2}\s*分|半)?)(?:\s*(?:[~\-]|から)\s*(?:(?:午前|午後)?\s*\d{1,2}\s*(?::\s*\d{2}|時\s*(?:\d{1,2}\s*分|半)?))?)?)\s*(.*)$",
    )
    .unwrap()
});

/// How unlabelled lines are grouped into events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stacking {
    /// Every unlabelled line is its own event (calendar cells).
    EveryLine,
    /// Only a line opening with a time starts a new event; other lines are
    /// body text of the current one (list blocks).
    TimeLed,
}

enum Line {
    Labelled(&'static str, String),
    Note(String),
    TimeOnly(String),
    Entry { time: Option<String>, title: String },
}

fn classify(line: &str) -> Line {
    let line = line.trim();
    let folded = fold_width(line);
    let span = |m: regex::Match| original_span(line, &folded, m.range()).trim().to_string();

    if folded.starts_with('※') || folded.starts_with('*') {
        return Line::Note(line.to_string());
    }
    if let Some(caps) = LABEL_RE.captures(&folded) {
        let key = match &caps[1] {
            "会場" | "場所" => raw::LOCATION,
            "対象" => raw::TARGET,
            "申込" | "申込み" | "申し込み" | "予約" => raw::APPLY,
            "時間" | "日時" => raw::TIME,
            _ => return Line::Note(line.to_string()),
        };
        let value = caps.get(2).map(span).unwrap_or_default();
        if value.is_empty() {
            return Line::Labelled(key, line.to_string());
        }
        return Line::Labelled(key, value);
    }
    if let Some(caps) = LEADING_TIME_RE.captures(&folded) {
        let time = caps.get(1).map(span).unwrap_or_default();
        let rest = caps.get(2).map(span).unwrap_or_default();
        if rest.is_empty() {
            return Line::TimeOnly(time);
        }
        return Line::Entry {
            time: Some(time),
            title: rest,
        };
    }
    Line::Entry {
        time: None,
        title: line.to_string(),
    }
}

/// Unlabelled line that reads like application instructions rather than a
/// title (`要電話申込`, `予約は窓口へ`).
fn is_apply_note(title: &str) -> bool {
    title.contains("申込") || title.contains("申し込") || title.contains("予約")
}

/// Split the lines of one calendar cell or list block into raw events. Every
/// event inherits the fields of `base` (date, url, provenance). Labelled lines
/// seen before the first event apply to all events of the block.
pub fn split_entries(lines: &[String], base: &RawRecord, stacking: Stacking) -> Vec<RawRecord> {
    let mut shared = RawRecord::new();
    let mut entries: Vec<RawRecord> = Vec::new();
    let mut pending_time: Option<String> = None;

    for line in lines {
        match classify(line) {
            Line::Labelled(key, value) => {
                let record = entries.last_mut().unwrap_or(&mut shared);
                if key == raw::TIME {
                    record.set(key, value);
                } else {
                    record.append(key, &value);
                }
            }
            Line::Note(text) => {
                entries.last_mut().unwrap_or(&mut shared).append(raw::BODY, &text);
            }
            Line::TimeOnly(time) => {
                pending_time = Some(time);
            }
            Line::Entry { time, title } => {
                let time = time.or_else(|| pending_time.take());
                let starts_new = match stacking {
                    Stacking::EveryLine => !is_apply_note(&title) || entries.is_empty(),
                    Stacking::TimeLed => entries.is_empty() || time.is_some(),
                };
                if !starts_new {
                    let current = entries.last_mut().unwrap_or(&mut shared);
                    if is_apply_note(&title) {
                        current.append(raw::APPLY, &title);
                    } else {
                        current.append(raw::BODY, &title);
                    }
                    continue;
                }
                let (title, location) = split_location(&title);
                let mut entry = base.clone();
                entry.set(raw::TITLE, title);
                if let Some(location) = location {
                    entry.set(raw::LOCATION, location);
                }
                if let Some(time) = time {
                    entry.set(raw::TIME, time);
                }
                entries.push(entry);
            }
        }
    }

    for entry in &mut entries {
        for key in [raw::LOCATION, raw::TARGET, raw::APPLY, raw::TIME, raw::BODY] {
            if !entry.has(key) {
                if let Some(v) = shared.get(key) {
                    entry.set(key, v);
                }
            }
        }
    }
    entries.retain(|e| e.has(raw::TITLE));
    entries
}

/// `離乳食講座＠中央公民館` → title and location.
fn split_location(title: &str) -> (String, Option<String>) {
    match title.split_once(['@', '＠']) {
        Some((t, loc)) if !t.trim().is_empty() && !loc.trim().is_empty() => {
            (t.trim().to_string(), Some(loc.trim().to_string()))
        }
        _ => (title.trim().to_string(), None),
    }
}
