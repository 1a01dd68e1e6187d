//! Blank input templates, one per scenario

use std::io::{Cursor, Write};

use anyhow::{Context, Result};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::scenario::Scenario;

pub const BUNDLE_FILENAME: &str = "templates.zip";

/// File name of the template for `scenario` inside the bundle
#[must_use]
pub fn template_filename(scenario: Scenario) -> String {
    format!("{}_template.csv", scenario.slug().replace('-', "_"))
}

/// Header-only CSV listing the scenario's required columns
pub fn template_csv(scenario: Scenario) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(scenario.required_columns())
        .with_context(|| format!("Failed writing {} template", scenario.slug()))?;
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed flushing {} template: {e}", scenario.slug()))
}

/// Zip archive holding every scenario template
pub fn template_bundle() -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for scenario in Scenario::ALL {
        let name = template_filename(scenario);
        zip.start_file(name.as_str(), options)
            .with_context(|| format!("Failed adding {name} to bundle"))?;
        zip.write_all(&template_csv(scenario)?)
            .with_context(|| format!("Failed writing {name}"))?;
    }

    let cursor = zip.finish().context("Failed finishing template bundle")?;
    Ok(cursor.into_inner())
}
