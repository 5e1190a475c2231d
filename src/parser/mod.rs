pub mod builder;
pub mod classify;
pub mod datetime;
pub mod extract;
pub mod raw;
pub mod reservation;
pub mod text;

use tracing::warn;

use crate::feed::EventRecord;
use builder::SourceContext;
use classify::RuleTable;
use raw::RawRecord;

/// Build every raw record of one source; rejected ones are logged and
/// counted, never published.
pub fn process_records(
    records: &[RawRecord],
    ctx: &SourceContext,
    rules: &RuleTable,
) -> (Vec<EventRecord>, usize) {
    let mut events = Vec::with_capacity(records.len());
    let mut dropped = 0;
    for record in records {
        match builder::build(record, ctx, rules) {
            Ok(event) => events.push(event),
            Err(reason) => {
                dropped += 1;
                warn!(
                    source = %ctx.name,
                    title = record.text(raw::TITLE),
                    provenance = record.text(raw::PROVENANCE),
                    "dropped record: {reason}"
                );
            }
        }
    }
    (events, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_are_counted_not_published() {
        let records = vec![
            RawRecord::new().with(raw::TITLE, "クリスマス会").with(raw::DATE, "来月お知らせ"),
            RawRecord::new().with(raw::TITLE, "絵本の会").with(raw::DATE, "2026年3月5日"),
            RawRecord::new().with(raw::DATE, "2026年3月6日"),
        ];
        let ctx = SourceContext::new("中央ひろば", "https://example.jp/");
        let (events, dropped) = process_records(&records, &ctx, &RuleTable::default());
        assert_eq!(events.len(), 1);
        assert_eq!(dropped, 2);
        assert_eq!(events[0].title, "絵本の会");
    }
}
