use std::fs;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::config::{Settings, SourceConfig};
use crate::feed::{Feed, FeedAssembler};
use crate::parser::builder::SourceContext;
use crate::parser::classify::RuleTable;
use crate::parser::{self, extract};

/// Outcome of one source in a run.
#[derive(Debug, Clone)]
pub struct SourceReport {
    pub name: String,
    pub extracted: usize,
    pub published: usize,
    pub dropped: usize,
    pub failed: Option<String>,
}

/// Run stats returned after completion.
#[derive(Debug, Default)]
pub struct RunStats {
    pub sources: Vec<SourceReport>,
}

impl RunStats {
    pub fn failed(&self) -> usize {
        self.sources.iter().filter(|s| s.failed.is_some()).count()
    }

    pub fn dropped(&self) -> usize {
        self.sources.iter().map(|s| s.dropped).sum()
    }
}

/// Process every configured source in order and assemble the feed. A source
/// that fails contributes nothing; the run itself only fails on I/O the
/// caller owns.
pub fn run(settings: &Settings) -> Result<(Feed, RunStats)> {
    let rules = settings.rule_table();
    let mut assembler = FeedAssembler::new();
    let mut stats = RunStats::default();

    let pb = ProgressBar::new(settings.sources.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    for source in &settings.sources {
        pb.set_message(source.name.clone());
        let report = run_source(source, &rules, &mut assembler);
        stats.sources.push(report);
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!(
        "Processed {} sources: {} events ({} sources failed, {} records dropped)",
        stats.sources.len(),
        assembler.len(),
        stats.failed(),
        stats.dropped()
    );

    Ok((assembler.finish(), stats))
}

fn run_source(source: &SourceConfig, rules: &RuleTable, assembler: &mut FeedAssembler) -> SourceReport {
    let mut report = SourceReport {
        name: source.name.clone(),
        extracted: 0,
        published: 0,
        dropped: 0,
        failed: None,
    };

    let input = match fs::read_to_string(&source.input) {
        Ok(s) => s,
        Err(e) => {
            warn!(source = %source.name, input = %source.input.display(), "cannot read input: {e}");
            report.failed = Some(format!("unreadable input: {e}"));
            return report;
        }
    };

    let extractor = extract::for_source(source);
    let raw_records = match extractor.extract(&input) {
        Ok(records) => records,
        Err(e) => {
            warn!(source = %source.name, layout = extractor.key(), "extraction failed: {e}");
            report.failed = Some(e.to_string());
            return report;
        }
    };

    let ctx = SourceContext::new(&source.name, &source.url).with_reference(source.reference);
    let (events, dropped) = parser::process_records(&raw_records, &ctx, rules);
    report.extracted = raw_records.len();
    report.dropped = dropped;
    report.published = assembler.push_source(&source.name, events);
    info!(
        source = %source.name,
        extracted = report.extracted,
        published = report.published,
        dropped = report.dropped,
        "source done"
    );
    report
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::config::Layout;

    fn source(name: &str, input: PathBuf, layout: Layout) -> SourceConfig {
        SourceConfig {
            name: name.into(),
            url: "https://example.jp/list".into(),
            input,
            layout,
            reference: None,
            link_pattern: None,
            selectors: None,
            split: None,
        }
    }

    fn settings(sources: Vec<SourceConfig>) -> Settings {
        Settings {
            output: PathBuf::from("unused.json"),
            sources,
            rules: None,
        }
    }

    #[test]
    fn failed_source_does_not_stop_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let manual = dir.path().join("manual.json");
        fs::write(
            &manual,
            r#"[
                {"title": "★離乳食講座", "date": "2026年3月5日", "time": "10:00〜11:30"},
                {"title": "クリスマス会", "date": "来月お知らせ"},
                {"title": "パパと遊ぼう", "date": "2026年3月1日", "apply": "要電話申込"}
            ]"#,
        )
        .unwrap();
        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{").unwrap();

        let settings = settings(vec![
            source("南部ひろば", manual, Layout::Manual),
            source("壊れた入力", broken, Layout::Grid),
            source("存在しない", dir.path().join("missing.json"), Layout::List),
        ]);
        let (feed, stats) = run(&settings).unwrap();

        assert_eq!(feed.count, 2);
        assert_eq!(feed.events[0].title, "★パパと遊ぼう");
        assert_eq!(feed.events[1].date_iso, "2026-03-05");
        assert!(feed.events.iter().all(|e| e.title != "クリスマス会"));
        assert_eq!(stats.failed(), 2);
        assert_eq!(stats.dropped(), 1);
        assert_eq!(stats.sources[0].published, 2);
    }

    #[test]
    fn empty_run_still_yields_a_feed() {
        let (feed, stats) = run(&settings(Vec::new())).unwrap();
        assert_eq!(feed.count, 0);
        assert!(feed.events.is_empty());
        assert!(stats.sources.is_empty());
    }

    #[test]
    fn example_sources_end_to_end() {
        let path = std::path::Path::new("sources.example.json");
        let mut settings = Settings::load(path).unwrap();
        settings.resolve_inputs(path);
        let (feed, stats) = run(&settings).unwrap();

        assert_eq!(stats.failed(), 0);
        // The consultation listing on the municipal site has no date.
        assert_eq!(stats.dropped(), 1);
        assert_eq!(feed.count, 13);
        assert!(feed.events.windows(2).all(|w| w[0].date_iso <= w[1].date_iso));

        let rhythm = feed.events.iter().find(|e| e.title.contains("リズム遊び")).unwrap();
        assert!(!rhythm.needs_reservation);
        assert_eq!(rhythm.date_iso, "2026-03-17");
        let massage = feed.events.iter().find(|e| e.title.contains("ベビーマッサージ") && e.source == "北部子育て支援センター").unwrap();
        assert!(massage.needs_reservation);
        assert_eq!(massage.title, "★ベビーマッサージ");
    }
}
