// ==============================================================================
// models.rs - Variant Record Data Models
// ==============================================================================
// Description: Typed variant records, genotype entries and INFO/FORMAT values
// Created: 2026-09-28
// Modified: 2026-10-09
// Version: 2.0.0
// ==============================================================================

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// A single INFO or FORMAT value with its VCF type preserved
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i32),
    Float(f32),
    IntegerArray(Vec<Option<i32>>),
    FloatArray(Vec<Option<f32>>),
    String(String),
    StringArray(Vec<Option<String>>),
    Flag,
}

impl FieldValue {
    /// Short type name used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Integer(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::IntegerArray(_) => "integer array",
            FieldValue::FloatArray(_) => "float array",
            FieldValue::String(_) => "string",
            FieldValue::StringArray(_) => "string array",
            FieldValue::Flag => "flag",
        }
    }
}

/// Field retrieval failures (never fatal to the stream)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("Field {0} is not present")]
    Missing(String),

    #[error("Field {0} is present but has no value")]
    Empty(String),

    #[error("Field {key} has type {found}, expected {expected}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl FieldError {
    /// True when the field is absent or empty, as opposed to mistyped
    pub fn is_missing(&self) -> bool {
        matches!(self, FieldError::Missing(_) | FieldError::Empty(_))
    }
}

/// Key -> typed value mapping for INFO or per-sample FORMAT data
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(BTreeMap<String, FieldValue>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    fn require(&self, key: &str) -> Result<&FieldValue, FieldError> {
        self.0
            .get(key)
            .ok_or_else(|| FieldError::Missing(key.to_string()))
    }

    fn mismatch(key: &str, expected: &'static str, found: &FieldValue) -> FieldError {
        FieldError::TypeMismatch {
            key: key.to_string(),
            expected,
            found: found.kind(),
        }
    }

    /// Scalar float value
    pub fn float(&self, key: &str) -> Result<f32, FieldError> {
        match self.require(key)? {
            FieldValue::Float(value) => Ok(*value),
            other => Err(Self::mismatch(key, "float", other)),
        }
    }

    /// Scalar integer value
    pub fn integer(&self, key: &str) -> Result<i32, FieldError> {
        match self.require(key)? {
            FieldValue::Integer(value) => Ok(*value),
            other => Err(Self::mismatch(key, "integer", other)),
        }
    }

    /// Float array value (missing elements stay `None`)
    pub fn float_array(&self, key: &str) -> Result<&[Option<f32>], FieldError> {
        match self.require(key)? {
            FieldValue::FloatArray(values) => Ok(values),
            other => Err(Self::mismatch(key, "float array", other)),
        }
    }

    /// Float value, taking the first element when the field is array-typed.
    ///
    /// `AF` is declared `Number=A`, so most callers see an array here.
    pub fn first_float(&self, key: &str) -> Result<f32, FieldError> {
        match self.require(key)? {
            FieldValue::Float(value) => Ok(*value),
            FieldValue::FloatArray(values) => values
                .first()
                .copied()
                .flatten()
                .ok_or_else(|| FieldError::Empty(key.to_string())),
            other => Err(Self::mismatch(key, "float", other)),
        }
    }

    /// Integer value, taking the first element when the field is array-typed
    pub fn first_integer(&self, key: &str) -> Result<i32, FieldError> {
        match self.require(key)? {
            FieldValue::Integer(value) => Ok(*value),
            FieldValue::IntegerArray(values) => values
                .first()
                .copied()
                .flatten()
                .ok_or_else(|| FieldError::Empty(key.to_string())),
            other => Err(Self::mismatch(key, "integer", other)),
        }
    }

    /// String value (scalar only)
    pub fn string(&self, key: &str) -> Result<&str, FieldError> {
        match self.require(key)? {
            FieldValue::String(value) => Ok(value),
            other => Err(Self::mismatch(key, "string", other)),
        }
    }
}

impl FromIterator<(String, FieldValue)> for Fields {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One sample's genotype data at a variant.
///
/// Soft filtering clears `included` instead of removing the entry, so the
/// entry index always matches the sample's position in the VCF header.
#[derive(Debug, Clone, PartialEq)]
pub struct GenotypeEntry {
    /// FORMAT values for this sample (GT rendered as text)
    pub fields: Fields,
    included: bool,
}

impl GenotypeEntry {
    pub fn new(fields: Fields) -> Self {
        Self {
            fields,
            included: true,
        }
    }

    /// Entry with only a depth value, mostly useful when building records by hand
    pub fn with_depth(depth: i32) -> Self {
        let mut fields = Fields::new();
        fields.insert(FORMAT_DEPTH, FieldValue::Integer(depth));
        Self::new(fields)
    }

    pub fn is_included(&self) -> bool {
        self.included
    }

    /// Mark this sample as excluded from the current record
    pub fn exclude(&mut self) {
        self.included = false;
    }

    /// Per-sample depth of coverage (FORMAT/DP)
    pub fn depth(&self) -> Result<i32, FieldError> {
        self.fields.first_integer(FORMAT_DEPTH)
    }

    /// Genotype call (FORMAT/GT), e.g. "0/1"
    pub fn genotype(&self) -> Option<&str> {
        self.fields.string(FORMAT_GENOTYPE).ok()
    }
}

pub const INFO_ALLELE_FREQUENCY: &str = "AF";
pub const INFO_DEPTH: &str = "DP";
pub const FORMAT_DEPTH: &str = "DP";
pub const FORMAT_GENOTYPE: &str = "GT";

/// A variant record as yielded by the VCF reader
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    /// Chromosome name as written in the VCF (e.g. "1" or "chr1")
    pub chromosome: String,

    /// 1-based position
    pub position: u64,

    /// Record IDs (e.g. rsIDs), possibly empty
    pub ids: Vec<String>,

    /// Reference allele
    pub ref_allele: String,

    /// Alternate alleles
    pub alt_alleles: Vec<String>,

    /// INFO column
    pub info: Fields,

    /// One entry per header sample, in header order
    pub genotypes: Vec<GenotypeEntry>,
}

impl Variant {
    pub fn new(
        chromosome: impl Into<String>,
        position: u64,
        ref_allele: impl Into<String>,
        alt_alleles: Vec<String>,
    ) -> Self {
        Self {
            chromosome: chromosome.into(),
            position,
            ids: Vec::new(),
            ref_allele: ref_allele.into(),
            alt_alleles,
            info: Fields::new(),
            genotypes: Vec::new(),
        }
    }

    pub fn with_info(mut self, key: impl Into<String>, value: FieldValue) -> Self {
        self.info.insert(key, value);
        self
    }

    pub fn with_genotypes(mut self, genotypes: Vec<GenotypeEntry>) -> Self {
        self.genotypes = genotypes;
        self
    }

    /// First record ID, or a generated `chr:pos:ref:alt` identifier
    pub fn display_id(&self) -> String {
        match self.ids.first() {
            Some(id) => id.clone(),
            None => format!(
                "{}:{}:{}:{}",
                self.chromosome,
                self.position,
                self.ref_allele,
                self.alt_alleles.join(",")
            ),
        }
    }

    /// Single alternate allele of a biallelic record
    pub fn alt_allele(&self) -> Option<&str> {
        match self.alt_alleles.as_slice() {
            [alt] => Some(alt),
            _ => None,
        }
    }

    pub fn allele_frequency(&self) -> Result<f32, FieldError> {
        self.info.first_float(INFO_ALLELE_FREQUENCY)
    }

    pub fn depth(&self) -> Result<i32, FieldError> {
        self.info.first_integer(INFO_DEPTH)
    }

    pub fn included_count(&self) -> usize {
        self.genotypes.iter().filter(|g| g.is_included()).count()
    }

    /// True when the record has samples and every one of them was excluded
    pub fn all_samples_excluded(&self) -> bool {
        !self.genotypes.is_empty() && self.included_count() == 0
    }
}
