use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::parser::classify::{AgeBucket, Category};

pub const DEFAULT_FEED_PATH: &str = "docs/events.json";

/// The persisted unit. Field order is the serialized order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub title: String,
    pub date_raw: String,
    pub date_iso: String,
    pub time_raw: String,
    pub location: String,
    pub apply_info: String,
    pub category: Category,
    pub target_age: AgeBucket,
    pub url: String,
    pub source: String,
    pub needs_reservation: bool,
    pub body_preview: String,
}

impl EventRecord {
    fn has_valid_date(&self) -> bool {
        NaiveDate::parse_from_str(&self.date_iso, "%Y-%m-%d").is_ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub updated_at: String,
    pub count: usize,
    pub events: Vec<EventRecord>,
}

/// Collects records source by source and produces the published ordering.
#[derive(Debug, Default)]
pub struct FeedAssembler {
    events: Vec<EventRecord>,
}

impl FeedAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one source's records. Duplicates are removed within this batch
    /// only; identical listings from different sources are both kept.
    pub fn push_source(&mut self, source: &str, records: Vec<EventRecord>) -> usize {
        let mut seen = HashSet::new();
        let before = records.len();
        let mut kept = 0;
        for record in records {
            let key = (
                record.title.clone(),
                record.date_iso.clone(),
                record.time_raw.clone(),
                record.url.clone(),
            );
            if !seen.insert(key) {
                continue;
            }
            self.events.push(record);
            kept += 1;
        }
        if kept < before {
            info!(source, removed = before - kept, "dropped duplicate listings");
        }
        kept
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Sorted by `(date_iso, source, title)`; records without a valid ISO
    /// date are left out.
    pub fn into_events(self) -> Vec<EventRecord> {
        let mut events: Vec<EventRecord> = self
            .events
            .into_iter()
            .filter(|e| {
                let ok = e.has_valid_date();
                if !ok {
                    warn!(title = %e.title, date_iso = %e.date_iso, "excluding record without sortable date");
                }
                ok
            })
            .collect();
        events.sort_by(|a, b| {
            (&a.date_iso, &a.source, &a.title).cmp(&(&b.date_iso, &b.source, &b.title))
        });
        events
    }

    pub fn finish(self) -> Feed {
        let events = self.into_events();
        Feed {
            updated_at: chrono::Local::now().to_rfc3339(),
            count: events.len(),
            events,
        }
    }
}

pub fn save(feed: &Feed, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(feed)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Saved {} events to {}", feed.count, path.display());
    Ok(())
}

pub fn load(path: &Path) -> Result<Feed> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read feed {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Malformed feed {}", path.display()))
}

#[cfg(test)]
pub(crate) fn sample(title: &str, date_iso: &str, source: &str) -> EventRecord {
    EventRecord {
        title: title.to_string(),
        date_raw: date_iso.to_string(),
        date_iso: date_iso.to_string(),
        time_raw: String::new(),
        location: String::new(),
        apply_info: String::new(),
        category: Category::Other,
        target_age: AgeBucket::Unspecified,
        url: "https://example.jp/".to_string(),
        source: source.to_string(),
        needs_reservation: false,
        body_preview: String::new(),
    }
}
