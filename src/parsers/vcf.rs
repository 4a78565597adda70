// ==============================================================================
// parsers/vcf.rs - VCF Variant Reader
// ==============================================================================
// Description: Opens a VCF (plain, gzip or bgzip) and yields typed variant
//              records in input order using noodles-vcf
// Created: 2026-09-30
// Modified: 2026-10-13
// Version: 2.0.0
// ==============================================================================
// References:
// - VCF 4.3 Spec: https://samtools.github.io/hts-specs/VCFv4.3.pdf
// - noodles-vcf: https://docs.rs/noodles-vcf/0.81.0/noodles_vcf/
// ==============================================================================

use flate2::read::MultiGzDecoder;
use noodles_bgzf as bgzf;
use noodles_vcf as vcf;
use noodles_vcf::variant::record::samples::series::value::genotype::Phasing;
use noodles_vcf::variant::record_buf::info::field::{value::Array as InfoArray, Value as InfoValue};
use noodles_vcf::variant::record_buf::samples::sample::{
    value::{Array as SampleArray, Genotype},
    Value as SampleValue,
};
use noodles_vcf::variant::RecordBuf;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::models::{FieldValue, Fields, GenotypeEntry, Variant};
use crate::validator::{detect_compression, Compression};

/// Above this size (bytes) a bgzip input gets more decompression workers
pub const LARGE_INPUT_THRESHOLD: u64 = 2_320_303_098;

const SMALL_INPUT_WORKERS: usize = 2;
const LARGE_INPUT_WORKERS: usize = 4;

/// VCF reading errors
#[derive(Error, Debug)]
pub enum VariantReadError {
    #[error("VCF file {0} does not exist")]
    InputNotFound(PathBuf),

    #[error("Failed to open VCF file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read VCF header: {0}")]
    Header(#[source] io::Error),

    #[error("Malformed VCF record #{record}: {message}")]
    MalformedRecord { record: usize, message: String },

    #[error("Failed to read VCF stream at record #{record}: {source}")]
    Io {
        record: usize,
        #[source]
        source: io::Error,
    },
}

impl VariantReadError {
    /// A malformed record can be skipped; everything else ends the run
    pub fn is_recoverable(&self) -> bool {
        matches!(self, VariantReadError::MalformedRecord { .. })
    }
}

/// How the input stream is decompressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decompression {
    /// Block-parallel bgzip decoding
    Bgzf { workers: usize },
    /// Gzip or plain text, sniffed from the content
    Generic,
}

fn has_bgzip_suffix(path: &Path) -> bool {
    let name = path.to_string_lossy();
    name.ends_with(".gz") || name.ends_with(".bgz")
}

/// Pick a decompression strategy from the file name, size and leading block
pub fn choose_decompression(path: &Path, size: u64, compression: Compression) -> Decompression {
    if !has_bgzip_suffix(path) || compression != Compression::Bgzf {
        return Decompression::Generic;
    }

    let workers = if size > LARGE_INPUT_THRESHOLD {
        LARGE_INPUT_WORKERS
    } else {
        SMALL_INPUT_WORKERS
    };
    Decompression::Bgzf { workers }
}

/// Sequential cursor over the records of one VCF
pub struct VariantReader {
    reader: vcf::io::Reader<Box<dyn BufRead>>,
    header: vcf::Header,
    sample_names: Vec<String>,
    decompression: Decompression,
}

impl VariantReader {
    /// Open a VCF file (.vcf, .vcf.gz or .vcf.bgz) and read its header
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VariantReadError> {
        let path = path.as_ref();
        let open_error = |source| VariantReadError::Open {
            path: path.to_path_buf(),
            source,
        };

        if !path.exists() {
            return Err(VariantReadError::InputNotFound(path.to_path_buf()));
        }

        let size = std::fs::metadata(path).map_err(open_error)?.len();
        let compression = detect_compression(path).map_err(open_error)?;
        let file = File::open(path).map_err(open_error)?;

        let decompression = choose_decompression(path, size, compression);
        let inner: Box<dyn BufRead> = match decompression {
            Decompression::Bgzf { workers } => {
                info!("using {} worker threads to decompress bgzip file", workers);
                let workers = NonZeroUsize::new(workers).unwrap_or(NonZeroUsize::MIN);
                Box::new(BufReader::new(
                    bgzf::io::MultithreadedReader::with_worker_count(workers, file),
                ))
            }
            Decompression::Generic => {
                info!("falling back to non-bgzip ({:?})", compression);
                match compression {
                    Compression::Gzip | Compression::Bgzf => {
                        Box::new(BufReader::new(MultiGzDecoder::new(file)))
                    }
                    Compression::Plain => Box::new(BufReader::new(file)),
                }
            }
        };

        Self::with_stream(inner, decompression)
    }

    /// Wrap an already-decompressed VCF stream
    pub fn from_reader(inner: Box<dyn BufRead>) -> Result<Self, VariantReadError> {
        Self::with_stream(inner, Decompression::Generic)
    }

    fn with_stream(
        inner: Box<dyn BufRead>,
        decompression: Decompression,
    ) -> Result<Self, VariantReadError> {
        let mut reader = vcf::io::Reader::new(inner);
        let header = reader.read_header().map_err(VariantReadError::Header)?;
        let sample_names: Vec<String> = header.sample_names().iter().cloned().collect();

        Ok(Self {
            reader,
            header,
            sample_names,
            decompression,
        })
    }

    /// Decompression strategy the input was opened with
    pub fn decompression(&self) -> Decompression {
        self.decompression
    }

    /// Samples in header order
    pub fn sample_names(&self) -> &[String] {
        &self.sample_names
    }

    /// Number of ##contig lines in the header
    pub fn contig_count(&self) -> usize {
        self.header.contigs().len()
    }

    /// Records in input order. A record that fails to parse is yielded as
    /// `MalformedRecord` and iteration continues with the next line. Any
    /// other I/O failure is yielded once as `Io` and ends the iteration.
    pub fn records(&mut self) -> impl Iterator<Item = Result<Variant, VariantReadError>> + '_ {
        let Self {
            reader,
            header,
            sample_names,
            ..
        } = self;
        let sample_count = sample_names.len();
        let mut record_number = 0usize;
        let mut stream_failed = false;

        reader.record_bufs(header).map_while(move |result| {
            if stream_failed {
                return None;
            }
            record_number += 1;
            Some(match result {
                Ok(record) => convert_record(&record, sample_count, record_number),
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    Err(VariantReadError::MalformedRecord {
                        record: record_number,
                        message: e.to_string(),
                    })
                }
                Err(e) => {
                    stream_failed = true;
                    Err(VariantReadError::Io {
                        record: record_number,
                        source: e,
                    })
                }
            })
        })
    }
}

/// Convert a noodles record into the crate's typed variant
fn convert_record(
    record: &RecordBuf,
    sample_count: usize,
    record_number: usize,
) -> Result<Variant, VariantReadError> {
    let position = record
        .variant_start()
        .map(|p| usize::from(p) as u64)
        .ok_or_else(|| VariantReadError::MalformedRecord {
            record: record_number,
            message: "missing position".to_string(),
        })?;

    let info: Fields = record
        .info()
        .as_ref()
        .iter()
        .filter_map(|(key, value)| value.as_ref().map(|v| (key.clone(), info_value(v))))
        .collect();

    let samples = record.samples();
    let keys: Vec<&String> = samples.keys().as_ref().iter().collect();
    let genotypes = (0..sample_count)
        .map(|idx| {
            let mut fields = Fields::new();
            if let Some(sample) = samples.get_index(idx) {
                for key in &keys {
                    if let Some(Some(value)) = sample.get(key.as_str()) {
                        fields.insert((*key).clone(), sample_value(value));
                    }
                }
            }
            GenotypeEntry::new(fields)
        })
        .collect();

    Ok(Variant {
        chromosome: record.reference_sequence_name().to_string(),
        position,
        ids: record.ids().as_ref().iter().cloned().collect(),
        ref_allele: record.reference_bases().to_string(),
        alt_alleles: record.alternate_bases().as_ref().to_vec(),
        info,
        genotypes,
    })
}

fn info_value(value: &InfoValue) -> FieldValue {
    match value {
        InfoValue::Integer(n) => FieldValue::Integer(*n),
        InfoValue::Float(n) => FieldValue::Float(*n),
        InfoValue::Flag => FieldValue::Flag,
        InfoValue::Character(c) => FieldValue::String(c.to_string()),
        InfoValue::String(s) => FieldValue::String(s.clone()),
        InfoValue::Array(InfoArray::Integer(values)) => FieldValue::IntegerArray(values.clone()),
        InfoValue::Array(InfoArray::Float(values)) => FieldValue::FloatArray(values.clone()),
        InfoValue::Array(InfoArray::Character(values)) => {
            FieldValue::StringArray(values.iter().map(|c| c.map(String::from)).collect())
        }
        InfoValue::Array(InfoArray::String(values)) => FieldValue::StringArray(values.clone()),
    }
}

fn sample_value(value: &SampleValue) -> FieldValue {
    match value {
        SampleValue::Integer(n) => FieldValue::Integer(*n),
        SampleValue::Float(n) => FieldValue::Float(*n),
        SampleValue::Character(c) => FieldValue::String(c.to_string()),
        SampleValue::String(s) => FieldValue::String(s.clone()),
        SampleValue::Genotype(genotype) => FieldValue::String(genotype_string(genotype)),
        SampleValue::Array(SampleArray::Integer(values)) => FieldValue::IntegerArray(values.clone()),
        SampleValue::Array(SampleArray::Float(values)) => FieldValue::FloatArray(values.clone()),
        SampleValue::Array(SampleArray::Character(values)) => {
            FieldValue::StringArray(values.iter().map(|c| c.map(String::from)).collect())
        }
        SampleValue::Array(SampleArray::String(values)) => FieldValue::StringArray(values.clone()),
    }
}

/// Render a genotype as VCF text, e.g. "0/1" or "1|0"
fn genotype_string(genotype: &Genotype) -> String {
    let mut gt = String::new();
    for (i, allele) in genotype.as_ref().iter().enumerate() {
        if i > 0 {
            gt.push(match allele.phasing() {
                Phasing::Phased => '|',
                Phasing::Unphased => '/',
            });
        }
        match allele.position() {
            Some(position) => gt.push_str(&position.to_string()),
            None => gt.push('.'),
        }
    }
    gt
}
