mod config;
mod feed;
mod parser;
mod pipeline;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::warn;

use crate::config::{Settings, DEFAULT_CONFIG_PATH};
use crate::feed::{FeedAssembler, DEFAULT_FEED_PATH};
use crate::parser::builder::SourceContext;
use crate::parser::classify::{Category, RuleTable};
use crate::parser::extract::manual;

#[derive(Parser)]
#[command(name = "kosodate_feed", about = "Childcare event feed builder for municipal listings and facility PDFs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract every configured source and write the feed
    Run {
        /// Settings file (JSON)
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Output path (overrides the settings file)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Build a feed fragment for one facility from hand-written records
    Manual {
        /// Facility name (default: the one named in the input file)
        #[arg(short, long)]
        facility: Option<String>,
        /// Record file (JSON)
        #[arg(short, long)]
        input: PathBuf,
        /// Fragment output path
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Events overview table from a written feed
    Overview {
        /// Feed file
        #[arg(short, long, default_value = DEFAULT_FEED_PATH)]
        feed: PathBuf,
        /// Filter by category label (e.g. "食育・栄養")
        #[arg(short, long)]
        category: Option<String>,
        /// Filter by source name (substring)
        #[arg(short, long)]
        source: Option<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// List configured sources
    Sources {
        /// Settings file (JSON)
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { config, out } => {
            let mut settings = Settings::load(&config)?;
            settings.resolve_inputs(&config);
            let out = out.unwrap_or_else(|| settings.output.clone());
            if settings.sources.is_empty() {
                println!("No sources configured in {}.", config.display());
            }

            let (feed, stats) = pipeline::run(&settings)?;
            println!(
                "{:<24} | {:>9} | {:>9} | {:>7} | {}",
                "Source", "Extracted", "Published", "Dropped", "Status"
            );
            println!("{}", "-".repeat(72));
            for s in &stats.sources {
                let status = match &s.failed {
                    Some(e) => format!("FAILED: {}", truncate(e, 40)),
                    None => "ok".to_string(),
                };
                println!(
                    "{:<24} | {:>9} | {:>9} | {:>7} | {}",
                    truncate(&s.name, 24),
                    s.extracted,
                    s.published,
                    s.dropped,
                    status
                );
            }

            if feed.count == 0 {
                warn!("No events collected; writing an empty feed");
            }
            feed::save(&feed, &out)?;
            println!(
                "\nWrote {} events to {} ({} sources failed).",
                feed.count,
                out.display(),
                stats.failed()
            );
            Ok(())
        }
        Commands::Manual { facility, input, out } => {
            let text = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let parsed = manual::parse(&text)
                .with_context(|| format!("Invalid override file {}", input.display()))?;
            let Some(facility) = facility.or(parsed.facility) else {
                bail!("no facility name: pass --facility or set \"facility\" in the file");
            };

            let ctx = SourceContext::new(&facility, "");
            let (events, dropped) =
                parser::process_records(&parsed.records, &ctx, &RuleTable::default());
            let mut assembler = FeedAssembler::new();
            assembler.push_source(&facility, events);
            let fragment = assembler.finish();
            feed::save(&fragment, &out)?;
            println!(
                "Wrote {} events for {} to {} ({} dropped).",
                fragment.count,
                facility,
                out.display(),
                dropped
            );
            Ok(())
        }
        Commands::Overview { feed: path, category, source, limit } => {
            let feed = feed::load(&path)?;
            let category = match category.as_deref() {
                Some(label) => match Category::from_label(label) {
                    Some(c) => Some(c),
                    None => bail!(
                        "unknown category {label:?}; one of: {}",
                        Category::ALL.map(|c| c.label()).join(", ")
                    ),
                },
                None => None,
            };
            let rows: Vec<_> = feed
                .events
                .iter()
                .filter(|e| category.map_or(true, |c| e.category == c))
                .filter(|e| source.as_deref().map_or(true, |s| e.source.contains(s)))
                .take(limit)
                .collect();
            if rows.is_empty() {
                println!("No events found.");
                return Ok(());
            }

            println!(
                "{:>3} | {:<10} | {:<11} | {:<16} | {:<12} | {:<10} | {}",
                "#", "Date", "Time", "Source", "Category", "Age", "Title"
            );
            println!("{}", "-".repeat(100));
            for (i, e) in rows.iter().enumerate() {
                println!(
                    "{:>3} | {:<10} | {:<11} | {:<16} | {:<12} | {:<10} | {}",
                    i + 1,
                    e.date_iso,
                    truncate(&e.time_raw, 11),
                    truncate(&e.source, 16),
                    e.category.label(),
                    e.target_age.label(),
                    truncate(&e.title, 32)
                );
            }

            let reserved = rows.iter().filter(|e| e.needs_reservation).count();
            println!(
                "\n{} of {} events | {} need reservation | updated {}",
                rows.len(),
                feed.count,
                reserved,
                feed.updated_at
            );
            Ok(())
        }
        Commands::Sources { config } => {
            let mut settings = Settings::load(&config)?;
            settings.resolve_inputs(&config);
            if settings.sources.is_empty() {
                println!("No sources configured in {}.", config.display());
                return Ok(());
            }
            println!("{:>3} | {:<24} | {:<12} | {:<8} | {}", "#", "Source", "Layout", "Ref", "Input");
            println!("{}", "-".repeat(90));
            for (i, s) in settings.sources.iter().enumerate() {
                let reference = s.reference.map(|r| r.to_string()).unwrap_or_else(|| "-".into());
                let input = if s.input.exists() {
                    s.input.display().to_string()
                } else {
                    format!("{} (missing)", s.input.display())
                };
                println!(
                    "{:>3} | {:<24} | {:<12} | {:<8} | {}",
                    i + 1,
                    truncate(&s.name, 24),
                    s.layout.as_str(),
                    reference,
                    input
                );
            }
            println!("\nOutput: {}", settings.output.display());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
