use crate::assign::ReportEntry;
use anyhow::{Context, Result};
use csv::WriterBuilder;
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub const HEADER: [&str; 4] = ["layer", "record", "reason", "candidates"];

/// Report entries of one target layer.
pub struct LayerReport<'a> {
    pub layer: &'a str,
    pub entries: &'a [ReportEntry],
}

pub fn write_report<W: Write>(writer: W, separator: u8, reports: &[LayerReport<'_>]) -> Result<()> {
    let mut wtr = WriterBuilder::new().delimiter(separator).from_writer(writer);
    wtr.write_record(HEADER)?;

    for report in reports {
        for entry in report.entries {
            wtr.write_record([
                report.layer.to_string(),
                entry.record.to_string(),
                entry.reason.label().to_string(),
                entry.reason.candidates().join("|"),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}

pub fn write_report_file(path: &Path, separator: u8, reports: &[LayerReport<'_>]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create report directory: {:?}", parent))?;
    }
    let file = File::create(path).with_context(|| format!("Failed to create report: {:?}", path))?;
    write_report(file, separator, reports).with_context(|| format!("Failed to write report: {:?}", path))
}
