use serde::Deserialize;

use super::{parse_input, ExtractError, Extractor};
use crate::parser::raw::{self, RawRecord};

/// Hand-written records for sources that cannot be read automatically,
/// either a bare list or one tagged with the facility it belongs to.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ManualInput {
    Tagged {
        facility: String,
        records: Vec<RawRecord>,
    },
    Bare(Vec<RawRecord>),
}

/// Override file for one facility, taken verbatim.
#[derive(Debug, Clone)]
pub struct ManualOverride {
    pub facility: Option<String>,
    pub records: Vec<RawRecord>,
}

pub fn parse(input: &str) -> Result<ManualOverride, ExtractError> {
    let parsed = match parse_input::<ManualInput>("manual", input)? {
        ManualInput::Tagged { facility, records } => ManualOverride {
            facility: Some(facility).filter(|f| !f.trim().is_empty()),
            records,
        },
        ManualInput::Bare(records) => ManualOverride {
            facility: None,
            records,
        },
    };
    Ok(parsed)
}

/// No text parsing at all: records pass through unchanged apart from
/// provenance.
pub struct ManualExtractor;

impl Extractor for ManualExtractor {
    fn key(&self) -> &'static str {
        "manual"
    }

    fn extract(&self, input: &str) -> Result<Vec<RawRecord>, ExtractError> {
        let records = parse(input)?
            .records
            .into_iter()
            .enumerate()
            .map(|(i, mut r)| {
                if !r.has(raw::PROVENANCE) {
                    r.set(raw::PROVENANCE, format!("manual-{}", i + 1));
                }
                r
            })
            .collect();
        Ok(records)
    }
}
