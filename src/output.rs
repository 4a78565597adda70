// ==============================================================================
// output.rs - Report Generation
// ==============================================================================
// Description: Write the retained records as a JSON report or as a filtered
//              VCF for the haplotyping step
// Created: 2026-10-03
// Modified: 2026-10-13
// Version: 2.0.0
// ==============================================================================

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

use crate::filter::FilterStats;
use crate::models::{FieldValue, Variant};
use crate::processor::ProcessingResult;
use crate::settings::{Filter1Settings, Settings};
use crate::validator::compute_sha256;

const FT_PASS: &str = "PASS";
const FT_LOW_DEPTH: &str = "LowDP";

/// Supported report formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON report with run metadata and statistics
    Json,
    /// Filtered VCF with per-sample filter flags
    Vcf,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "vcf" => Ok(OutputFormat::Vcf),
            other => Err(format!("unknown output format '{}' (expected json or vcf)", other)),
        }
    }
}

/// Complete JSON report for one run
#[derive(Debug, Serialize)]
pub struct HoplaReport {
    pub metadata: ReportMetadata,
    pub statistics: FilterStats,
    pub variants: Vec<VariantReport>,
}

#[derive(Debug, Serialize)]
pub struct ReportMetadata {
    pub run_id: String,
    pub generated_at: String,
    pub family: String,
    pub input: String,
    pub input_sha256: String,
    pub samples: Vec<String>,
    pub limits: Filter1Settings,
}

/// One retained record
#[derive(Debug, Clone, Serialize)]
pub struct VariantReport {
    pub chromosome: String,
    pub position: u64,
    pub ids: Vec<String>,
    pub ref_allele: String,
    pub alt_allele: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allele_frequency: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<i32>,
    pub included_samples: Vec<String>,
    pub excluded_samples: Vec<String>,
    pub all_samples_excluded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cytoband: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub info: BTreeMap<String, FieldValue>,
}

pub struct OutputGenerator<'a> {
    result: &'a ProcessingResult,
    settings: &'a Settings,
}

impl<'a> OutputGenerator<'a> {
    pub fn new(result: &'a ProcessingResult, settings: &'a Settings) -> Self {
        Self { result, settings }
    }

    /// Write the report in the requested format
    pub fn generate(&self, path: &Path, format: OutputFormat) -> Result<PathBuf> {
        match format {
            OutputFormat::Json => self.generate_json(path),
            OutputFormat::Vcf => self.generate_vcf(path),
        }
    }

    pub fn build_report(&self) -> Result<HoplaReport> {
        let input_sha256 = compute_sha256(&self.result.input)
            .with_context(|| format!("Failed to checksum {:?}", self.result.input))?;

        let variants = self
            .result
            .variants
            .iter()
            .map(|variant| self.variant_report(variant))
            .collect();

        Ok(HoplaReport {
            metadata: ReportMetadata {
                run_id: self.result.run_id.to_string(),
                generated_at: chrono::Utc::now().to_rfc3339(),
                family: self.result.family.clone(),
                input: self.result.input.display().to_string(),
                input_sha256,
                samples: self.result.samples.clone(),
                limits: self.settings.filter1.clone(),
            },
            statistics: self.result.stats.clone(),
            variants,
        })
    }

    fn variant_report(&self, variant: &Variant) -> VariantReport {
        let mut included_samples = Vec::new();
        let mut excluded_samples = Vec::new();
        for (name, entry) in self.result.samples.iter().zip(&variant.genotypes) {
            if entry.is_included() {
                included_samples.push(name.clone());
            } else {
                excluded_samples.push(name.clone());
            }
        }

        let cytoband = self.result.cytobands.as_ref().and_then(|table| {
            table
                .band_at(&variant.chromosome, variant.position)
                .map(|band| band.label())
        });

        let info = self
            .settings
            .annotation
            .info
            .iter()
            .filter_map(|key| {
                variant
                    .info
                    .get(key)
                    .map(|value| (key.clone(), value.clone()))
            })
            .collect();

        VariantReport {
            chromosome: variant.chromosome.clone(),
            position: variant.position,
            ids: variant.ids.clone(),
            ref_allele: variant.ref_allele.clone(),
            alt_allele: variant.alt_alleles.join(","),
            allele_frequency: variant.allele_frequency().ok(),
            depth: variant.depth().ok(),
            included_samples,
            excluded_samples,
            all_samples_excluded: variant.all_samples_excluded(),
            cytoband,
            info,
        }
    }

    fn generate_json(&self, path: &Path) -> Result<PathBuf> {
        info!("Generating JSON output: {:?}", path);

        let report = self.build_report()?;

        let file = File::create(path).context("Failed to create JSON output file")?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &report)
            .context("Failed to write JSON output")?;
        writer.flush().context("Failed to flush JSON output")?;

        info!(
            "JSON output complete: {} variants, {} samples",
            report.variants.len(),
            report.metadata.samples.len()
        );

        Ok(path.to_path_buf())
    }

    /// VCF output, gzip-compressed when the path ends in ".gz"
    fn generate_vcf(&self, path: &Path) -> Result<PathBuf> {
        info!("Generating VCF output: {:?}", path);

        let file = File::create(path).context("Failed to create VCF file")?;

        if path.to_string_lossy().ends_with(".gz") {
            let mut writer = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            self.write_vcf(&mut writer)
                .context("Failed to write VCF output")?;
            writer
                .finish()
                .context("Failed to finalize gzip compression")?;
        } else {
            let mut writer = BufWriter::new(file);
            self.write_vcf(&mut writer)
                .context("Failed to write VCF output")?;
            writer.flush().context("Failed to flush VCF output")?;
        }

        info!(
            "VCF output complete: {} variants, {} samples",
            self.result.variants.len(),
            self.result.samples.len()
        );

        Ok(path.to_path_buf())
    }

    fn write_vcf<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "##fileformat=VCFv4.3")?;
        writeln!(writer, "##fileDate={}", chrono::Utc::now().format("%Y%m%d"))?;
        writeln!(writer, "##source=hopla-{}", env!("CARGO_PKG_VERSION"))?;
        writeln!(
            writer,
            "##FILTER=<ID={},Description=\"Sample depth below {}\">",
            FT_LOW_DEPTH, self.settings.filter1.depth_soft_limit
        )?;
        writeln!(writer, "##INFO=<ID=AF,Number=A,Type=Float,Description=\"Allele Frequency\">")?;
        writeln!(writer, "##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Total Depth\">")?;
        writeln!(writer, "##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">")?;
        writeln!(writer, "##FORMAT=<ID=DP,Number=1,Type=Integer,Description=\"Read Depth\">")?;
        writeln!(writer, "##FORMAT=<ID=FT,Number=1,Type=String,Description=\"Sample filter\">")?;

        write!(writer, "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT")?;
        for sample in &self.result.samples {
            write!(writer, "\t{}", sample)?;
        }
        writeln!(writer)?;

        for variant in &self.result.variants {
            let mut info_parts = Vec::new();
            if let Ok(af) = variant.allele_frequency() {
                info_parts.push(format!("AF={}", af));
            }
            if let Ok(dp) = variant.depth() {
                info_parts.push(format!("DP={}", dp));
            }
            let info_string = if info_parts.is_empty() {
                ".".to_string()
            } else {
                info_parts.join(";")
            };

            let id = if variant.ids.is_empty() {
                ".".to_string()
            } else {
                variant.ids.join(";")
            };

            write!(
                writer,
                "{}\t{}\t{}\t{}\t{}\t.\tPASS\t{}\tGT:DP:FT",
                variant.chromosome,
                variant.position,
                id,
                variant.ref_allele,
                variant.alt_alleles.join(","),
                info_string
            )?;

            for entry in &variant.genotypes {
                let depth = entry
                    .depth()
                    .map(|dp| dp.to_string())
                    .unwrap_or_else(|_| ".".to_string());
                let ft = if entry.is_included() {
                    FT_PASS
                } else {
                    FT_LOW_DEPTH
                };
                write!(
                    writer,
                    "\t{}:{}:{}",
                    entry.genotype().unwrap_or("."),
                    depth,
                    ft
                )?;
            }
            writeln!(writer)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldValue, Fields, GenotypeEntry};
    use crate::parsers::CytobandTable;
    use flate2::read::MultiGzDecoder;
    use std::io::Read;
    use tempfile::{tempdir, NamedTempFile};
    use uuid::Uuid;

    fn entry(gt: &str, dp: i32) -> GenotypeEntry {
        let mut fields = Fields::new();
        fields.insert("GT", FieldValue::String(gt.to_string()));
        fields.insert("DP", FieldValue::Integer(dp));
        GenotypeEntry::new(fields)
    }

    fn sample_result(input: &Path) -> ProcessingResult {
        let mut low_father = Variant::new("1", 200, "A", vec!["G".to_string()])
            .with_info("AF", FieldValue::FloatArray(vec![Some(0.1)]))
            .with_info("DP", FieldValue::Integer(12))
            .with_info("CSQ", FieldValue::String("missense".to_string()))
            .with_genotypes(vec![entry("0/1", 5), entry("0/0", 10)]);
        low_father.ids = vec!["rs2".to_string()];
        low_father.genotypes[0].exclude();

        let no_id = Variant::new("chr1", 3_000_000, "G", vec!["C".to_string()])
            .with_genotypes(vec![entry("0/1", 30), entry("1/1", 30)]);

        let mut stats = FilterStats::default();
        stats.records_seen = 5;
        stats.records_retained = 2;

        ProcessingResult {
            run_id: Uuid::new_v4(),
            family: "Smith".to_string(),
            input: input.to_path_buf(),
            samples: vec!["Father".to_string(), "Mother".to_string()],
            variants: vec![low_father, no_id],
            stats,
            cytobands: CytobandTable::from_reader(
                "chr1\t0\t2300000\tp36.33\tgneg\nchr1\t2300000\t5300000\tp36.32\tgpos25\n".as_bytes(),
            )
            .ok(),
        }
    }

    fn input_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"abc").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("VCF".parse::<OutputFormat>().unwrap(), OutputFormat::Vcf);
        assert!("parquet".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_output_format_serde() {
        let json = serde_json::to_string(&OutputFormat::Json).unwrap();
        assert_eq!(json, "\"json\"");

        let parsed: OutputFormat = serde_json::from_str("\"vcf\"").unwrap();
        assert_eq!(parsed, OutputFormat::Vcf);
    }

    #[test]
    fn test_json_report() {
        let input = input_file();
        let result = sample_result(input.path());
        let mut settings = Settings::default();
        settings.annotation.info = vec!["CSQ".to_string(), "ABSENT".to_string()];

        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");
        OutputGenerator::new(&result, &settings)
            .generate(&path, OutputFormat::Json)
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let report: serde_json::Value = serde_json::from_str(&contents).unwrap();

        assert_eq!(report["metadata"]["family"], "Smith");
        assert_eq!(
            report["metadata"]["input_sha256"],
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(report["metadata"]["limits"]["af.hard.limit"], 0.25);
        assert_eq!(report["statistics"]["records_seen"], 5);

        let first = &report["variants"][0];
        assert_eq!(first["ids"][0], "rs2");
        assert_eq!(first["depth"], 12);
        assert_eq!(first["included_samples"], serde_json::json!(["Mother"]));
        assert_eq!(first["excluded_samples"], serde_json::json!(["Father"]));
        assert_eq!(first["all_samples_excluded"], false);
        assert_eq!(first["cytoband"], "1p36.33");
        assert_eq!(first["info"]["CSQ"], "missense");
        assert!(first["info"].get("ABSENT").is_none());

        let second = &report["variants"][1];
        assert_eq!(second["cytoband"], "1p36.32");
        assert!(second.get("allele_frequency").is_none());
        assert!(second.get("info").is_none());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_json_report_write_failure_is_reported() {
        // Writes to /dev/full fail with ENOSPC once the buffer is flushed
        let full = Path::new("/dev/full");
        if !full.exists() {
            return;
        }

        let input = input_file();
        let result = sample_result(input.path());
        let settings = Settings::default();

        let err = OutputGenerator::new(&result, &settings)
            .generate(full, OutputFormat::Json)
            .unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to flush JSON output"));
    }

    #[test]
    fn test_vcf_output_flags_excluded_samples() {
        let input = input_file();
        let result = sample_result(input.path());
        let settings = Settings::default();

        let dir = tempdir().unwrap();
        let path = dir.path().join("filtered.vcf");
        OutputGenerator::new(&result, &settings)
            .generate(&path, OutputFormat::Vcf)
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();

        assert_eq!(lines[0], "##fileformat=VCFv4.3");
        assert!(lines
            .iter()
            .any(|l| *l == "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tFather\tMother"));

        let records: Vec<&str> = lines.iter().copied().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0],
            "1\t200\trs2\tA\tG\t.\tPASS\tAF=0.1;DP=12\tGT:DP:FT\t0/1:5:LowDP\t0/0:10:PASS"
        );
        assert_eq!(
            records[1],
            "chr1\t3000000\t.\tG\tC\t.\tPASS\t.\tGT:DP:FT\t0/1:30:PASS\t1/1:30:PASS"
        );
    }

    #[test]
    fn test_vcf_output_gzip() {
        let input = input_file();
        let result = sample_result(input.path());
        let settings = Settings::default();

        let dir = tempdir().unwrap();
        let path = dir.path().join("filtered.vcf.gz");
        OutputGenerator::new(&result, &settings)
            .generate(&path, OutputFormat::Vcf)
            .unwrap();

        let mut contents = String::new();
        MultiGzDecoder::new(File::open(&path).unwrap())
            .read_to_string(&mut contents)
            .unwrap();
        assert!(contents.starts_with("##fileformat=VCFv4.3"));
        assert_eq!(contents.lines().filter(|l| !l.starts_with('#')).count(), 2);
    }
}
