// ==============================================================================
// processor.rs - Variant Prefilter Pipeline
// ==============================================================================
// Description: Drives one run: sample reconciliation, streaming the VCF
//              through the tier-1 filter and collecting the retained records
// Created: 2026-10-02
// Modified: 2026-10-13
// Version: 2.0.0
// ==============================================================================

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::filter::{FilterStats, VariantFilter};
use crate::models::Variant;
use crate::parsers::{CytobandTable, VariantReadError, VariantReader};
use crate::roster::{Pedigree, SampleRoster};
use crate::settings::Settings;

/// Malformed records tolerated before a run is aborted
pub const DEFAULT_MAX_ERRORS: usize = 1000;

const PROGRESS_INTERVAL: usize = 100_000;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No variants retained after filtering ({seen} records read)")]
    NoVariantsRetained { seen: usize },

    #[error("Too many malformed VCF records ({count}), limit is {max}")]
    TooManyMalformedRecords { count: usize, max: usize },

    #[error(transparent)]
    Read(#[from] VariantReadError),
}

/// Retained records in input order, with the run counters
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub variants: Vec<Variant>,
    pub stats: FilterStats,
}

/// Ordered collection of records that survived every filter stage
#[derive(Debug, Default)]
pub struct VariantAggregator {
    variants: Vec<Variant>,
}

impl VariantAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, variant: Variant) {
        self.variants.push(variant);
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// An empty collection is reported as an error only here, after the stream
    pub fn finish(self, mut stats: FilterStats) -> Result<PipelineOutcome, PipelineError> {
        if self.variants.is_empty() {
            return Err(PipelineError::NoVariantsRetained {
                seen: stats.records_seen,
            });
        }
        stats.records_retained = self.variants.len();
        Ok(PipelineOutcome {
            variants: self.variants,
            stats,
        })
    }
}

/// Stream records through the filter, skipping up to `max_errors` malformed ones
pub fn run_filter<I>(
    filter: &VariantFilter,
    records: I,
    max_errors: usize,
) -> Result<PipelineOutcome, PipelineError>
where
    I: IntoIterator<Item = Result<Variant, VariantReadError>>,
{
    let mut stats = FilterStats::default();
    let mut aggregator = VariantAggregator::new();

    for result in records {
        let mut variant = match result {
            Ok(variant) => variant,
            Err(e) if e.is_recoverable() => {
                stats.malformed_skipped += 1;
                warn!("Skipping record: {}", e);
                if stats.malformed_skipped > max_errors {
                    return Err(PipelineError::TooManyMalformedRecords {
                        count: stats.malformed_skipped,
                        max: max_errors,
                    });
                }
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        stats.records_seen += 1;
        if filter.apply(&mut variant, &mut stats).is_keep() {
            aggregator.push(variant);
        }

        if stats.records_seen % PROGRESS_INTERVAL == 0 {
            debug!(
                "Processed {} records, {} retained",
                stats.records_seen,
                aggregator.len()
            );
        }
    }

    aggregator.finish(stats)
}

/// Everything a run produced, ready for reporting
#[derive(Debug)]
pub struct ProcessingResult {
    pub run_id: Uuid,
    pub family: String,
    pub input: PathBuf,
    /// Samples in VCF header order
    pub samples: Vec<String>,
    pub variants: Vec<Variant>,
    pub stats: FilterStats,
    /// None when no cytoband file was given or it could not be used
    pub cytobands: Option<CytobandTable>,
}

pub struct HoplaProcessor {
    run_id: Uuid,
    settings: Settings,
    vcf_path: PathBuf,
    cytoband_path: Option<PathBuf>,
    max_errors: usize,
}

impl HoplaProcessor {
    pub fn new(settings: Settings, vcf_path: PathBuf, cytoband_path: Option<PathBuf>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            settings,
            vcf_path,
            cytoband_path,
            max_errors: DEFAULT_MAX_ERRORS,
        }
    }

    pub fn with_max_errors(mut self, max_errors: usize) -> Self {
        self.max_errors = max_errors;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Main processing pipeline
    pub fn process(&self) -> Result<ProcessingResult> {
        info!(
            "Starting run {} for family {}",
            self.run_id, self.settings.family
        );

        // 1. Optional cytoband annotation
        let cytobands = self.cytoband_path.as_deref().and_then(load_cytobands);

        // 2. Open the VCF and read its header
        let mut reader = VariantReader::open(&self.vcf_path)
            .with_context(|| format!("Failed to open VCF file {:?}", self.vcf_path))?;

        info!(
            "VCF header: {} contigs, {} samples",
            reader.contig_count(),
            reader.sample_names().len()
        );
        debug!("VCF samples: {:?}", reader.sample_names());

        // 3. Declared samples must exist, unknown-sex placeholders aside
        let samples = reader.sample_names().to_vec();
        let roster = SampleRoster::reconcile(&self.settings.samples, &samples)
            .context("Declared samples do not match the VCF")?;

        let pedigree = Pedigree::from_settings(&self.settings);
        let to_infer = pedigree.samples_requiring_sex_inference();
        if !to_infer.is_empty() {
            info!("Sex must be inferred for: {}", to_infer.join(", "));
        }

        // 4. Filter and collect
        let filter = VariantFilter::new(&self.settings.filter1, &roster);
        let outcome = run_filter(&filter, reader.records(), self.max_errors)?;

        info!(
            "Filtering complete: {} of {} records retained ({} malformed skipped)",
            outcome.stats.records_retained,
            outcome.stats.records_seen,
            outcome.stats.malformed_skipped
        );
        debug!("Filter statistics: {:?}", outcome.stats);

        Ok(ProcessingResult {
            run_id: self.run_id,
            family: self.settings.family.clone(),
            input: self.vcf_path.clone(),
            samples,
            variants: outcome.variants,
            stats: outcome.stats,
            cytobands,
        })
    }
}

fn load_cytobands(path: &Path) -> Option<CytobandTable> {
    match CytobandTable::read(path) {
        Ok(table) => Some(table),
        Err(e) => {
            warn!("Cytoband annotation disabled: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldValue, GenotypeEntry};
    use crate::settings::Filter1Settings;
    use std::io::Write;
    use tempfile::{Builder, NamedTempFile};

    const VCF_TEXT: &str = "\
##fileformat=VCFv4.3
##contig=<ID=1,length=249250621>
##INFO=<ID=AF,Number=A,Type=Float,Description=\"Allele Frequency\">
##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Total Depth\">
##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">
##FORMAT=<ID=DP,Number=1,Type=Integer,Description=\"Read Depth\">
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tFather\tMother\tChild
1\t100\trs1\tA\tT\t50\tPASS\tAF=0.5;DP=40\tGT:DP\t0/1:20\t0/0:20\t0/1:20
1\t200\trs2\tA\tG\t50\tPASS\tAF=0.1;DP=12\tGT:DP\t0/1:5\t0/0:10\t0/1:15
1\t300\trs3\tAT\tA\t50\tPASS\tAF=0.01;DP=50\tGT:DP\t0/1:20\t0/0:20\t0/1:20
1\t400\trs4\tC\tT\t50\tPASS\tAF=0.2;DP=8\tGT:DP\t0/1:20\t0/0:20\t0/1:20
1\t500\trs5\tG\tC\t50\tPASS\tAF=0.05;DP=60\tGT:DP\t0/1:30\t1/1:30\t0/1:30
";

    fn snv(position: u64, af: f32, dp: i32) -> Variant {
        Variant::new("1", position, "A", vec!["T".to_string()])
            .with_info("AF", FieldValue::Float(af))
            .with_info("DP", FieldValue::Integer(dp))
    }

    fn filter_for(samples: &[&str]) -> VariantFilter {
        let observed: Vec<String> = samples.iter().map(|s| s.to_string()).collect();
        let roster = SampleRoster::reconcile(&[], &observed).unwrap();
        VariantFilter::new(&Filter1Settings::default(), &roster)
    }

    fn malformed(record: usize) -> Result<Variant, VariantReadError> {
        Err(VariantReadError::MalformedRecord {
            record,
            message: "invalid position".to_string(),
        })
    }

    fn write_vcf(contents: &str) -> NamedTempFile {
        let mut file = Builder::new().suffix(".vcf").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_retained_order_preserved() {
        let filter = filter_for(&[]);
        let records = vec![
            Ok(snv(300, 0.1, 20)),
            Ok(snv(100, 0.9, 20)),
            Ok(snv(200, 0.1, 20)),
            Ok(snv(150, 0.1, 20)),
        ];

        let outcome = run_filter(&filter, records, DEFAULT_MAX_ERRORS).unwrap();

        let positions: Vec<u64> = outcome.variants.iter().map(|v| v.position).collect();
        assert_eq!(positions, vec![300, 200, 150]);
        assert_eq!(outcome.stats.records_seen, 4);
        assert_eq!(outcome.stats.records_retained, 3);
        assert_eq!(outcome.stats.dropped_common_variant, 1);
    }

    #[test]
    fn test_nothing_retained_is_an_error() {
        let filter = filter_for(&[]);
        let records = vec![Ok(snv(100, 0.5, 40)), Ok(snv(200, 0.1, 3))];

        let result = run_filter(&filter, records, DEFAULT_MAX_ERRORS);
        assert!(matches!(
            result,
            Err(PipelineError::NoVariantsRetained { seen: 2 })
        ));

        let empty: Vec<Result<Variant, VariantReadError>> = Vec::new();
        assert!(matches!(
            run_filter(&filter, empty, DEFAULT_MAX_ERRORS),
            Err(PipelineError::NoVariantsRetained { seen: 0 })
        ));
    }

    #[test]
    fn test_soft_excluded_samples_travel_with_record() {
        let filter = filter_for(&["Father", "Mother"]);
        let records = vec![Ok(snv(100, 0.1, 12).with_genotypes(vec![
            GenotypeEntry::with_depth(5),
            GenotypeEntry::with_depth(10),
        ]))];

        let outcome = run_filter(&filter, records, DEFAULT_MAX_ERRORS).unwrap();
        let variant = &outcome.variants[0];
        assert!(!variant.genotypes[0].is_included());
        assert!(variant.genotypes[1].is_included());
        assert_eq!(outcome.stats.samples_soft_excluded, 1);
    }

    #[test]
    fn test_malformed_records_skipped() {
        let filter = filter_for(&[]);
        let records = vec![malformed(1), Ok(snv(100, 0.1, 20)), malformed(3)];

        let outcome = run_filter(&filter, records, DEFAULT_MAX_ERRORS).unwrap();
        assert_eq!(outcome.variants.len(), 1);
        assert_eq!(outcome.stats.malformed_skipped, 2);
        assert_eq!(outcome.stats.records_seen, 1);
    }

    #[test]
    fn test_too_many_malformed_records() {
        let filter = filter_for(&[]);
        let records = vec![malformed(1), malformed(2), malformed(3), Ok(snv(100, 0.1, 20))];

        let result = run_filter(&filter, records, 2);
        assert!(matches!(
            result,
            Err(PipelineError::TooManyMalformedRecords { count: 3, max: 2 })
        ));
    }

    #[test]
    fn test_fatal_read_error_stops_stream() {
        let filter = filter_for(&[]);
        let records = vec![
            Ok(snv(100, 0.1, 20)),
            Err(VariantReadError::Header(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "truncated",
            ))),
        ];

        let result = run_filter(&filter, records, DEFAULT_MAX_ERRORS);
        assert!(matches!(result, Err(PipelineError::Read(_))));
    }

    #[test]
    fn test_stream_error_aborts_without_skipping() {
        let filter = filter_for(&[]);
        let stream_error = || {
            Err(VariantReadError::Io {
                record: 2,
                source: std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "unexpected end of file"),
            })
        };
        let records = vec![Ok(snv(100, 0.1, 20)), stream_error(), stream_error(), Ok(snv(200, 0.1, 20))];

        let result = run_filter(&filter, records, DEFAULT_MAX_ERRORS);
        assert!(matches!(
            result,
            Err(PipelineError::Read(VariantReadError::Io { record: 2, .. }))
        ));
    }

    #[test]
    fn test_process_vcf_file() {
        let vcf = write_vcf(VCF_TEXT);
        let settings = Settings {
            samples: vec![
                "Father".to_string(),
                "Mother".to_string(),
                "Child".to_string(),
                "U1".to_string(),
            ],
            ..Settings::default()
        };

        let processor = HoplaProcessor::new(settings, vcf.path().to_path_buf(), None);
        let result = processor.process().unwrap();

        // rs1 common, rs3 indel, rs4 low depth
        let ids: Vec<String> = result.variants.iter().map(|v| v.display_id()).collect();
        assert_eq!(ids, vec!["rs2".to_string(), "rs5".to_string()]);

        assert_eq!(result.samples, vec!["Father", "Mother", "Child"]);
        assert!(!result.variants[0].genotypes[0].is_included());
        assert!(result.variants[0].genotypes[1].is_included());
        assert_eq!(result.stats.records_seen, 5);
        assert_eq!(result.stats.dropped_common_variant, 1);
        assert_eq!(result.stats.dropped_not_biallelic_snv, 1);
        assert_eq!(result.stats.dropped_low_record_depth, 1);
        assert!(result.cytobands.is_none());
    }

    #[test]
    fn test_process_unknown_sample_fails() {
        let vcf = write_vcf(VCF_TEXT);
        let settings = Settings {
            samples: vec!["Father".to_string(), "Grandma".to_string()],
            ..Settings::default()
        };

        let processor = HoplaProcessor::new(settings, vcf.path().to_path_buf(), None);
        let err = processor.process().unwrap_err();
        assert!(format!("{:#}", err).contains("Grandma"));
    }

    #[test]
    fn test_process_nothing_retained() {
        let vcf = write_vcf(VCF_TEXT);
        let settings = Settings {
            filter1: Filter1Settings {
                allele_frequency_hard_limit: 0.0,
                ..Filter1Settings::default()
            },
            ..Settings::default()
        };

        let processor = HoplaProcessor::new(settings, vcf.path().to_path_buf(), None);
        let err = processor.process().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::NoVariantsRetained { seen: 5 })
        ));
    }

    #[test]
    fn test_unusable_cytoband_file_is_not_fatal() {
        let vcf = write_vcf(VCF_TEXT);
        let mut cytoband = NamedTempFile::new().unwrap();
        writeln!(cytoband, "not a cytoband table").unwrap();
        cytoband.flush().unwrap();

        let processor = HoplaProcessor::new(
            Settings::default(),
            vcf.path().to_path_buf(),
            Some(cytoband.path().to_path_buf()),
        );
        let result = processor.process().unwrap();
        assert!(result.cytobands.is_none());
        assert_eq!(result.variants.len(), 2);
    }
}
