use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::feed::DEFAULT_FEED_PATH;
use crate::parser::classify::{AgeBucket, Category, Rule, RuleTable};
use crate::parser::datetime::ReferenceMonth;

pub const DEFAULT_CONFIG_PATH: &str = "sources.json";
const ENV_PREFIX: &str = "KOSODATE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    StaticHtml,
    DynamicHtml,
    Grid,
    List,
    TwoColumn,
    Manual,
}

impl Layout {
    pub fn as_str(self) -> &'static str {
        match self {
            Layout::StaticHtml => "static_html",
            Layout::DynamicHtml => "dynamic_html",
            Layout::Grid => "grid",
            Layout::List => "list",
            Layout::TwoColumn => "two_column",
            Layout::Manual => "manual",
        }
    }
}

/// CSS selectors for rendered event cards. Unset fields are left empty on
/// the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardSelectors {
    pub card: String,
    pub title: String,
    pub date: Option<String>,
    pub time: Option<String>,
    pub location: Option<String>,
    pub apply: Option<String>,
    pub category: Option<String>,
    pub target: Option<String>,
    pub body: Option<String>,
    pub link: Option<String>,
}

impl Default for CardSelectors {
    fn default() -> Self {
        CardSelectors {
            card: "article".into(),
            title: "h2, h3, .title".into(),
            date: Some(".date".into()),
            time: Some(".time".into()),
            location: Some(".place, .location".into()),
            apply: None,
            category: Some(".category".into()),
            target: None,
            body: Some("p".into()),
            link: Some("a[href]".into()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMode {
    /// Left/right columns on each page, divided at `split_x`.
    #[default]
    Columns,
    /// Odd pages are the front, even pages the back.
    Pages,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub mode: SplitMode,
    pub split_x: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Display name, published as `source`.
    pub name: String,
    /// Listing or PDF URL; relative links resolve against it.
    pub url: String,
    /// File handed over by the fetch layer.
    pub input: PathBuf,
    pub layout: Layout,
    #[serde(default)]
    pub reference: Option<ReferenceMonth>,
    #[serde(default)]
    pub link_pattern: Option<String>,
    #[serde(default)]
    pub selectors: Option<CardSelectors>,
    #[serde(default)]
    pub split: Option<SplitConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    #[serde(default)]
    pub categories: Vec<Rule<Category>>,
    #[serde(default)]
    pub ages: Vec<Rule<AgeBucket>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub rules: Option<RulesConfig>,
}

fn default_output() -> PathBuf {
    PathBuf::from(DEFAULT_FEED_PATH)
}

impl Settings {
    /// Settings file first, then `KOSODATE_*` environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let settings: Settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Json))
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()
            .with_context(|| format!("Failed to read config {}", path.display()))?
            .try_deserialize()
            .with_context(|| format!("Invalid config {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        for source in &self.sources {
            if source.name.trim().is_empty() {
                bail!("source with input {} has no name", source.input.display());
            }
            if let Some(r) = source.reference {
                if ReferenceMonth::new(r.year, r.month).is_none() {
                    bail!("source {}: reference month {} out of range", source.name, r.month);
                }
            }
        }
        Ok(())
    }

    /// Rule table for this run: the configured one when given, the built-in
    /// defaults for any list left empty.
    pub fn rule_table(&self) -> RuleTable {
        let defaults = RuleTable::default();
        match &self.rules {
            None => defaults,
            Some(r) => RuleTable {
                categories: if r.categories.is_empty() {
                    defaults.categories
                } else {
                    r.categories.clone()
                },
                ages: if r.ages.is_empty() {
                    defaults.ages
                } else {
                    r.ages.clone()
                },
            },
        }
    }

    /// Input paths in the settings file are relative to the file itself.
    pub fn resolve_inputs(&mut self, config_path: &Path) {
        let Some(dir) = config_path.parent() else {
            return;
        };
        for source in &mut self.sources {
            if source.input.is_relative() {
                source.input = dir.join(&source.input);
            }
        }
    }
}
