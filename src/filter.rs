// ==============================================================================
// filter.rs - Variant Filter Engine (tier 1)
// ==============================================================================
// Description: Ordered per-record and per-sample filters applied ahead of
//              haplotyping
// Created: 2026-09-29
// Modified: 2026-10-13
// Version: 2.0.0
// ==============================================================================
// Stage order (each stage either drops the record or narrows its samples):
//   1. structural      - biallelic SNV only
//   2. hard AF         - drop when INFO/AF >= af.hard.limit
//   3. hard DP         - drop when INFO/DP (or a listed sample's DP) < dp.hard.limit
//   4. soft DP         - exclude samples with FORMAT/DP < dp.soft.limit
//   5. all-excluded    - flag (optionally drop) records with no usable sample
// ==============================================================================

use serde::Serialize;
use tracing::{debug, warn};

use crate::models::{FieldError, Variant};
use crate::roster::SampleRoster;
use crate::settings::Filter1Settings;

/// Why a record was removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Not exactly one single-base REF and one ALT
    NotBiallelicSnv,
    /// Allele frequency at or above the hard limit
    CommonVariant,
    /// INFO/DP below the hard limit
    LowRecordDepth,
    /// A hard-limit sample's FORMAT/DP below the hard limit
    LowSampleDepth,
    /// Every sample excluded by the soft limit (only with `drop.all.excluded`)
    AllSamplesExcluded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Keep,
    Drop(DropReason),
}

impl FilterDecision {
    pub fn is_keep(&self) -> bool {
        matches!(self, FilterDecision::Keep)
    }
}

/// Counters accumulated over one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    pub records_seen: usize,
    pub records_retained: usize,
    pub malformed_skipped: usize,
    pub dropped_not_biallelic_snv: usize,
    pub dropped_common_variant: usize,
    pub dropped_low_record_depth: usize,
    pub dropped_low_sample_depth: usize,
    pub dropped_all_samples_excluded: usize,
    pub allele_frequency_unavailable: usize,
    pub record_depth_unavailable: usize,
    pub sample_depth_unavailable: usize,
    pub samples_soft_excluded: usize,
    pub all_samples_excluded_records: usize,
}

impl FilterStats {
    pub fn record_drop(&mut self, reason: DropReason) {
        match reason {
            DropReason::NotBiallelicSnv => self.dropped_not_biallelic_snv += 1,
            DropReason::CommonVariant => self.dropped_common_variant += 1,
            DropReason::LowRecordDepth => self.dropped_low_record_depth += 1,
            DropReason::LowSampleDepth => self.dropped_low_sample_depth += 1,
            DropReason::AllSamplesExcluded => self.dropped_all_samples_excluded += 1,
        }
    }

    pub fn records_dropped(&self) -> usize {
        self.dropped_not_biallelic_snv
            + self.dropped_common_variant
            + self.dropped_low_record_depth
            + self.dropped_low_sample_depth
            + self.dropped_all_samples_excluded
    }
}

/// Biallelic single-nucleotide check
pub fn is_biallelic_snv(variant: &Variant) -> bool {
    variant.ref_allele.len() == 1 && variant.alt_alleles.len() == 1
}

/// Log a field retrieval failure; missing values are routine, mistyped ones are not
fn log_field_error(variant: &Variant, err: &FieldError) {
    if err.is_missing() {
        debug!("{}: {}", variant.display_id(), err);
    } else {
        warn!("{}: {}", variant.display_id(), err);
    }
}

/// Tier-1 filter with sample allow-lists resolved against the VCF header
#[derive(Debug, Clone)]
pub struct VariantFilter {
    allele_frequency_hard_limit: f32,
    depth_hard_limit: i64,
    depth_hard_samples: Vec<usize>,
    depth_soft_limit: i64,
    depth_soft_samples: Vec<usize>,
    drop_all_excluded: bool,
}

impl VariantFilter {
    pub fn new(settings: &Filter1Settings, roster: &SampleRoster) -> Self {
        let depth_soft_samples = if settings.depth_soft_limit_ids.is_empty() {
            (0..roster.len()).collect()
        } else {
            roster.resolve(&settings.depth_soft_limit_ids)
        };

        debug!(
            "Soft depth limit {} applies to {} of {} samples",
            settings.depth_soft_limit,
            depth_soft_samples.len(),
            roster.len()
        );

        Self {
            allele_frequency_hard_limit: settings.allele_frequency_hard_limit,
            depth_hard_limit: i64::from(settings.depth_hard_limit),
            depth_hard_samples: roster.resolve(&settings.depth_hard_limit_ids),
            depth_soft_limit: i64::from(settings.depth_soft_limit),
            depth_soft_samples,
            drop_all_excluded: settings.drop_all_excluded,
        }
    }

    /// Run all stages on one record, excluding samples in place
    pub fn apply(&self, variant: &mut Variant, stats: &mut FilterStats) -> FilterDecision {
        let decision = self.evaluate(variant, stats);
        if let FilterDecision::Drop(reason) = decision {
            stats.record_drop(reason);
        }
        decision
    }

    fn evaluate(&self, variant: &mut Variant, stats: &mut FilterStats) -> FilterDecision {
        if !is_biallelic_snv(variant) {
            return FilterDecision::Drop(DropReason::NotBiallelicSnv);
        }

        if let Some(reason) = self.check_allele_frequency(variant, stats) {
            return FilterDecision::Drop(reason);
        }

        if let Some(reason) = self.check_record_depth(variant, stats) {
            return FilterDecision::Drop(reason);
        }

        if let Some(reason) = self.check_sample_hard_depth(variant, stats) {
            return FilterDecision::Drop(reason);
        }

        stats.samples_soft_excluded += self.apply_soft_depth(variant, stats);

        if variant.all_samples_excluded() {
            stats.all_samples_excluded_records += 1;
            if self.drop_all_excluded {
                return FilterDecision::Drop(DropReason::AllSamplesExcluded);
            }
            debug!(
                "{}: every sample excluded by the soft depth limit, record kept",
                variant.display_id()
            );
        }

        FilterDecision::Keep
    }

    fn check_allele_frequency(
        &self,
        variant: &Variant,
        stats: &mut FilterStats,
    ) -> Option<DropReason> {
        match variant.allele_frequency() {
            Ok(af) if af >= self.allele_frequency_hard_limit => Some(DropReason::CommonVariant),
            Ok(_) => None,
            Err(err) => {
                stats.allele_frequency_unavailable += 1;
                log_field_error(variant, &err);
                None
            }
        }
    }

    fn check_record_depth(&self, variant: &Variant, stats: &mut FilterStats) -> Option<DropReason> {
        match variant.depth() {
            Ok(dp) if i64::from(dp) < self.depth_hard_limit => Some(DropReason::LowRecordDepth),
            Ok(_) => None,
            Err(err) => {
                stats.record_depth_unavailable += 1;
                log_field_error(variant, &err);
                None
            }
        }
    }

    fn check_sample_hard_depth(
        &self,
        variant: &Variant,
        stats: &mut FilterStats,
    ) -> Option<DropReason> {
        for &idx in &self.depth_hard_samples {
            let Some(entry) = variant.genotypes.get(idx) else {
                continue;
            };
            match entry.depth() {
                Ok(dp) if i64::from(dp) < self.depth_hard_limit => {
                    return Some(DropReason::LowSampleDepth)
                }
                Ok(_) => {}
                Err(err) => {
                    stats.sample_depth_unavailable += 1;
                    log_field_error(variant, &err);
                }
            }
        }
        None
    }

    /// Returns the number of samples newly excluded
    fn apply_soft_depth(&self, variant: &mut Variant, stats: &mut FilterStats) -> usize {
        let mut excluded = 0;
        let mut unavailable = Vec::new();

        for &idx in &self.depth_soft_samples {
            let Some(entry) = variant.genotypes.get_mut(idx) else {
                continue;
            };
            match entry.depth() {
                Ok(dp) if i64::from(dp) < self.depth_soft_limit => {
                    if entry.is_included() {
                        entry.exclude();
                        excluded += 1;
                    }
                }
                Ok(_) => {}
                Err(err) => unavailable.push(err),
            }
        }

        for err in &unavailable {
            log_field_error(variant, err);
        }
        stats.sample_depth_unavailable += unavailable.len();

        excluded
    }
}
