//! Trends topic ingestion
//!
//! Converts the curated topics mapping (topic id → display name, maintained
//! as a JSON file) into the two-column CSV extract for the topics table.
//! Destination: `gtrends_topic`, keyed on the topic id.

use anyhow::{Context, Result};
use kurator_db::Dataset;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Destination declaration for trends topics.
pub struct GtrendsTopics;

impl Dataset for GtrendsTopics {
    fn table_name(&self) -> &str {
        "gtrends_topic"
    }

    fn primary_key(&self) -> &[&str] {
        &["topic_id"]
    }

    fn columns(&self) -> &[(&str, &str)] {
        &[("topic_id", "TEXT"), ("name", "TEXT")]
    }
}

/// Read the topics mapping from `input` and write the extract to `output`.
pub fn ingest(input: &Path, output: &Path) -> Result<()> {
    let json = std::fs::read_to_string(input)
        .with_context(|| format!("could not read {}", input.display()))?;

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(output)
        .with_context(|| format!("could not create {}", output.display()))?;
    topics_to_csv(&json, file)?;

    info!(output = %output.display(), "extract written");
    Ok(())
}

/// Convert a topics mapping to the CSV extract, ordered by topic id.
pub fn topics_to_csv<W: Write>(topics_json: &str, writer: W) -> Result<()> {
    let topics: BTreeMap<String, String> =
        serde_json::from_str(topics_json).context("topics file is not a string-to-string mapping")?;

    let mut csv = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    csv.write_record(["topic_id", "name"])?;
    for (topic_id, name) in &topics {
        csv.write_record([topic_id.as_str(), name.as_str()])?;
    }
    csv.flush()?;
    Ok(())
}
