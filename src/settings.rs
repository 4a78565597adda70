// ==============================================================================
// settings.rs - Run Settings
// ==============================================================================
// Description: Layered run settings (built-in defaults overlaid by a YAML
//              settings document), immutable once loaded
// Created: 2026-09-28
// Modified: 2026-10-12
// Version: 2.0.0
// ==============================================================================
// Example document:
//   family: FAM001
//   samples: [Father, Mother, U1]
//   fathers: [NA, NA, Father]
//   mothers: [NA, NA, Mother]
//   sexes: [M, F, NA]
//   filter1:
//     af.hard.limit: 0.25
//     dp.hard.limit: 10
//     dp.soft.limit: 15
//     dp.soft.limit.ids: [Father, Mother]
// ==============================================================================

use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Settings loading errors
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Settings file {0} does not exist")]
    NotFound(PathBuf),

    #[error("Unable to open settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unable to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid settings: {0}")]
    Invalid(String),
}

/// Treat an explicit `null` (e.g. `dp.soft.limit.ids:` with no value) as the default
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Complete settings for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub family: String,

    /// Declared sample IDs; `U<digits>` marks a sample whose sex must be inferred
    #[serde(deserialize_with = "nullable")]
    pub samples: Vec<String>,

    /// Father of each sample, by position in `samples` ("NA" when unknown)
    #[serde(deserialize_with = "nullable")]
    pub fathers: Vec<String>,

    /// Mother of each sample, by position in `samples` ("NA" when unknown)
    #[serde(deserialize_with = "nullable")]
    pub mothers: Vec<String>,

    /// Sex of each sample, by position in `samples` ("M", "F" or "NA")
    #[serde(deserialize_with = "nullable")]
    pub sexes: Vec<String>,

    #[serde(deserialize_with = "nullable")]
    pub filter1: Filter1Settings,

    #[serde(deserialize_with = "nullable")]
    pub filter2: Filter2Settings,

    #[serde(deserialize_with = "nullable")]
    pub merlin: MerlinSettings,

    #[serde(deserialize_with = "nullable")]
    pub annotation: AnnotationSettings,

    #[serde(deserialize_with = "nullable")]
    pub visualisation: VisualisationSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            family: "Hopla".to_string(),
            samples: Vec::new(),
            fathers: Vec::new(),
            mothers: Vec::new(),
            sexes: Vec::new(),
            filter1: Filter1Settings::default(),
            filter2: Filter2Settings::default(),
            merlin: MerlinSettings::default(),
            annotation: AnnotationSettings::default(),
            visualisation: VisualisationSettings::default(),
        }
    }
}

/// First-tier (hard/soft threshold) filter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filter1Settings {
    /// Records whose allele frequency is at or above this limit are dropped
    #[serde(rename = "af.hard.limit")]
    pub allele_frequency_hard_limit: f32,

    /// Accepted for compatibility; AF is a record-level value
    #[serde(rename = "af.hard.limit.ids", deserialize_with = "nullable")]
    pub allele_frequency_hard_limit_ids: Vec<String>,

    /// Records with INFO/DP below this limit are dropped
    #[serde(rename = "dp.hard.limit")]
    pub depth_hard_limit: u32,

    /// Samples whose FORMAT/DP must also meet the hard limit
    #[serde(rename = "dp.hard.limit.ids", deserialize_with = "nullable")]
    pub depth_hard_limit_ids: Vec<String>,

    /// Samples with FORMAT/DP below this limit are excluded from the record
    #[serde(rename = "dp.soft.limit")]
    pub depth_soft_limit: u32,

    /// Samples the soft limit applies to (all samples when empty)
    #[serde(rename = "dp.soft.limit.ids", deserialize_with = "nullable")]
    pub depth_soft_limit_ids: Vec<String>,

    /// Drop records in which every sample was excluded by the soft limit
    #[serde(rename = "drop.all.excluded")]
    pub drop_all_excluded: bool,
}

impl Default for Filter1Settings {
    fn default() -> Self {
        Self {
            allele_frequency_hard_limit: 0.25,
            allele_frequency_hard_limit_ids: Vec::new(),
            depth_hard_limit: 10,
            depth_hard_limit_ids: Vec::new(),
            depth_soft_limit: 10,
            depth_soft_limit_ids: Vec::new(),
            drop_all_excluded: false,
        }
    }
}

/// Second-tier (informativeness) filter settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filter2Settings {
    #[serde(rename = "keep.informative.ids", deserialize_with = "nullable")]
    pub keep_informative_ids: Vec<String>,

    #[serde(rename = "keep.hetero.ids", deserialize_with = "nullable")]
    pub keep_hetero_ids: Vec<String>,
}

/// Merlin haplotyping model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MerlinModel {
    Sample,
    #[default]
    Best,
}

/// Settings for the external Merlin haplotyping step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MerlinSettings {
    pub model: MerlinModel,

    /// Minimum number of variants in a same-haplotype segment
    #[serde(rename = "min.seg.var")]
    pub min_segment_variants: u32,

    #[serde(rename = "min.seg.var.X")]
    pub min_segment_variants_x: u32,

    /// Window (bp) for weighted neighbourhood voting
    #[serde(rename = "window.size.voting")]
    pub voting_window_size: u64,

    #[serde(rename = "window.size.voting.X")]
    pub voting_window_size_x: u64,

    #[serde(rename = "keep.chromosomes.only")]
    pub keep_chromosomes_only: bool,

    #[serde(rename = "keep.regions.only")]
    pub keep_regions_only: bool,
}

impl Default for MerlinSettings {
    fn default() -> Self {
        Self {
            model: MerlinModel::Best,
            min_segment_variants: 5,
            min_segment_variants_x: 15,
            voting_window_size: 10_000_000,
            voting_window_size_x: 10_000_000,
            keep_chromosomes_only: false,
            keep_regions_only: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationSettings {
    #[serde(deserialize_with = "nullable")]
    pub regions: Vec<String>,

    #[serde(rename = "reference.ids", deserialize_with = "nullable")]
    pub reference_ids: Vec<String>,

    #[serde(rename = "carrier.ids", deserialize_with = "nullable")]
    pub carrier_ids: Vec<String>,

    #[serde(rename = "affected.ids", deserialize_with = "nullable")]
    pub affected_ids: Vec<String>,

    #[serde(rename = "unaffected.ids", deserialize_with = "nullable")]
    pub unaffected_ids: Vec<String>,

    /// Extra INFO keys to carry into the output
    #[serde(deserialize_with = "nullable")]
    pub info: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualisationSettings {
    #[serde(rename = "baf.ids", deserialize_with = "nullable")]
    pub baf_ids: Vec<String>,
}

impl Settings {
    /// Load a settings document and superimpose it onto the defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();

        let contents = fs::read_to_string(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                SettingsError::NotFound(path.to_path_buf())
            } else {
                SettingsError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let settings = Self::parse(&contents).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;

        info!(
            "Loaded settings for family {} ({} declared samples) from {:?}",
            settings.family,
            settings.samples.len(),
            path
        );
        debug!("Filter tier 1: {:?}", settings.filter1);

        Ok(settings)
    }

    /// Parse a settings document; keys absent from the document keep their defaults.
    ///
    /// An empty (or comment-only) document yields the defaults.
    pub fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
        let document: serde_yaml::Value = serde_yaml::from_str(contents)?;
        if document.is_null() {
            return Ok(Self::default());
        }
        serde_yaml::from_value(document)
    }

    /// Check value ranges and pedigree array lengths
    pub fn validate(&self) -> Result<(), SettingsError> {
        let af = self.filter1.allele_frequency_hard_limit;
        if !(0.0..=1.0).contains(&af) {
            return Err(SettingsError::Invalid(format!(
                "af.hard.limit must lie in [0, 1], got {}",
                af
            )));
        }

        for (name, values) in [
            ("fathers", &self.fathers),
            ("mothers", &self.mothers),
            ("sexes", &self.sexes),
        ] {
            if !values.is_empty() && values.len() != self.samples.len() {
                return Err(SettingsError::Invalid(format!(
                    "{} lists {} entries but {} samples are declared",
                    name,
                    values.len(),
                    self.samples.len()
                )));
            }
        }

        Ok(())
    }
}
