use crate::batch::{FeatureTable, HRVFeatureRecord};
use anyhow::{Context, Result};
use std::io::Write;

/// Write the table as a JSON array of flat records.
pub fn write_json<W: Write>(table: &FeatureTable, writer: W) -> Result<()> {
    serde_json::to_writer_pretty(writer, table).context("serialising feature table as JSON")
}

/// Write the table as CSV, one header row followed by one row per record.
/// The header is written even when the table is empty.
pub fn write_csv<W: Write>(table: &FeatureTable, writer: W) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    wtr.write_record(HRVFeatureRecord::COLUMNS)
        .context("writing CSV header")?;
    for record in table.iter() {
        wtr.serialize(record)
            .with_context(|| format!("writing row for subject {}", record.subject_id))?;
    }
    wtr.flush().context("flushing CSV output")?;
    Ok(())
}
