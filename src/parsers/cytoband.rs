// ==============================================================================
// parsers/cytoband.rs - UCSC Cytoband Parser
// ==============================================================================
// Description: Parser for UCSC cytoBand/cytoBandIdeo tables used to label
//              retained variants with their chromosome band
// Created: 2026-10-01
// Modified: 2026-10-07
// Version: 2.0.0
// ==============================================================================
// Format: Tab-delimited, no header, 0-based half-open coordinates
// Example:
//   chr1    0          2300000    p36.33    gneg
//   chr1    2300000    5300000    p36.32    gpos25
// ==============================================================================

use csv::ReaderBuilder;
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// One chromosome band
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Cytoband {
    pub chromosome: String,
    pub start: u64,
    pub end: u64,
    pub band: String,
    pub stain: String,
}

impl Cytoband {
    /// Conventional label, e.g. "1p36.33"
    pub fn label(&self) -> String {
        format!("{}{}", strip_chr(&self.chromosome), self.band)
    }

    /// Whether a 1-based position falls inside this band
    pub fn contains(&self, position: u64) -> bool {
        position > self.start && position <= self.end
    }
}

#[derive(Error, Debug)]
pub enum CytobandError {
    #[error("Cytoband file {0} does not exist")]
    NotFound(PathBuf),

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("No valid cytobands found in file")]
    Empty,
}

fn strip_chr(chromosome: &str) -> &str {
    chromosome.strip_prefix("chr").unwrap_or(chromosome)
}

/// Cytoband table ordered as read from the file
#[derive(Debug, Clone, Default)]
pub struct CytobandTable {
    bands: Vec<Cytoband>,
}

impl CytobandTable {
    /// Read a cytoband file, skipping lines that do not parse
    pub fn read(path: impl AsRef<Path>) -> Result<Self, CytobandError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CytobandError::NotFound(path.to_path_buf()));
        }

        let file = std::fs::File::open(path).map_err(csv::Error::from)?;
        let table = Self::from_reader(file)?;

        info!("Loaded {} cytobands from {:?}", table.len(), path);
        Ok(table)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, CytobandError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .comment(Some(b'#'))
            .flexible(true)
            .from_reader(reader);

        let mut bands = Vec::new();
        for (line, result) in reader.deserialize::<Cytoband>().enumerate() {
            match result {
                Ok(band) => bands.push(band),
                Err(e) => warn!("Skipping cytoband line {}: {}", line + 1, e),
            }
        }

        if bands.is_empty() {
            return Err(CytobandError::Empty);
        }

        Ok(Self { bands })
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    pub fn bands(&self) -> &[Cytoband] {
        &self.bands
    }

    /// Band containing a 1-based VCF position; "chr" prefixes are ignored
    pub fn band_at(&self, chromosome: &str, position: u64) -> Option<&Cytoband> {
        let chromosome = strip_chr(chromosome);
        self.bands
            .iter()
            .find(|band| strip_chr(&band.chromosome) == chromosome && band.contains(position))
    }
}
