// ==============================================================================
// roster.rs - Sample Roster and Pedigree
// ==============================================================================
// Description: Reconciles declared samples against the VCF header and resolves
//              the declared pedigree (parents, sex)
// Created: 2026-09-29
// Modified: 2026-10-09
// Version: 2.0.0
// ==============================================================================

use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::settings::Settings;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RosterError {
    #[error("Sample {0} is declared in the settings but not present in the VCF")]
    UnknownSample(String),
}

/// `U` followed by one or more digits: a family member whose sex is to be inferred
pub fn is_unknown_sex_placeholder(name: &str) -> bool {
    name.strip_prefix('U')
        .map(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}

/// Declared samples checked against the samples observed in the VCF header
#[derive(Debug, Clone)]
pub struct SampleRoster {
    observed: Vec<String>,
    index: HashMap<String, usize>,
    placeholders: Vec<String>,
}

impl SampleRoster {
    /// Fails on the first declared sample that is neither observed nor a placeholder
    pub fn reconcile(declared: &[String], observed: &[String]) -> Result<Self, RosterError> {
        let index: HashMap<String, usize> = observed
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();

        let mut placeholders = Vec::new();
        for sample in declared {
            if index.contains_key(sample) {
                continue;
            }
            if is_unknown_sex_placeholder(sample) {
                debug!("Declared sample {} is a placeholder absent from the VCF", sample);
                placeholders.push(sample.clone());
                continue;
            }
            return Err(RosterError::UnknownSample(sample.clone()));
        }

        info!(
            "Sample roster reconciled: {} declared, {} observed, {} placeholders",
            declared.len(),
            observed.len(),
            placeholders.len()
        );

        Ok(Self {
            observed: observed.to_vec(),
            index,
            placeholders,
        })
    }

    /// Samples in VCF header order
    pub fn observed(&self) -> &[String] {
        &self.observed
    }

    pub fn len(&self) -> usize {
        self.observed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observed.is_empty()
    }

    /// Declared placeholders that have no column in the VCF
    pub fn placeholders(&self) -> &[String] {
        &self.placeholders
    }

    /// Column index of a sample in the VCF
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Resolve a sample allow-list to column indices, skipping names without a column
    pub fn resolve(&self, names: &[String]) -> Vec<usize> {
        names
            .iter()
            .filter_map(|name| {
                let idx = self.index_of(name);
                if idx.is_none() {
                    debug!("Sample {} has no VCF column, ignored in sample list", name);
                }
                idx
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sex {
    Male,
    Female,
    Unknown,
}

impl Sex {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "m" | "male" | "1" => Sex::Male,
            "f" | "female" | "2" => Sex::Female,
            _ => Sex::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PedigreeMember {
    pub sample: String,
    pub father: Option<String>,
    pub mother: Option<String>,
    pub sex: Sex,
}

/// Declared family structure
#[derive(Debug, Clone, Default)]
pub struct Pedigree {
    members: Vec<PedigreeMember>,
}

fn parent(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty() && *v != "NA" && *v != "0")
        .map(str::to_string)
}

impl Pedigree {
    /// Build from the parallel `samples`/`fathers`/`mothers`/`sexes` lists
    pub fn from_settings(settings: &Settings) -> Self {
        let members = settings
            .samples
            .iter()
            .enumerate()
            .map(|(i, sample)| PedigreeMember {
                sample: sample.clone(),
                father: parent(settings.fathers.get(i)),
                mother: parent(settings.mothers.get(i)),
                sex: settings
                    .sexes
                    .get(i)
                    .map(|s| Sex::parse(s))
                    .unwrap_or(Sex::Unknown),
            })
            .collect();

        Self { members }
    }

    pub fn members(&self) -> &[PedigreeMember] {
        &self.members
    }

    pub fn get(&self, sample: &str) -> Option<&PedigreeMember> {
        self.members.iter().find(|m| m.sample == sample)
    }

    /// Members without a declared sex, or declared through a placeholder ID
    pub fn samples_requiring_sex_inference(&self) -> Vec<&str> {
        self.members
            .iter()
            .filter(|m| m.sex == Sex::Unknown || is_unknown_sex_placeholder(&m.sample))
            .map(|m| m.sample.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_placeholder_pattern() {
        assert!(is_unknown_sex_placeholder("U1"));
        assert!(is_unknown_sex_placeholder("U7"));
        assert!(is_unknown_sex_placeholder("U123"));

        assert!(!is_unknown_sex_placeholder("U"));
        assert!(!is_unknown_sex_placeholder("u7"));
        assert!(!is_unknown_sex_placeholder("U7a"));
        assert!(!is_unknown_sex_placeholder("Sample_42"));
        assert!(!is_unknown_sex_placeholder("XU7"));
    }

    #[test]
    fn test_placeholder_absent_from_vcf_is_accepted() {
        let roster =
            SampleRoster::reconcile(&names(&["Father", "U7"]), &names(&["Father", "Mother"]))
                .unwrap();

        assert_eq!(roster.placeholders(), &["U7".to_string()]);
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.index_of("Mother"), Some(1));
        assert_eq!(roster.index_of("U7"), None);
    }

    #[test]
    fn test_unknown_sample_fails() {
        let err = SampleRoster::reconcile(
            &names(&["Father", "Sample_42", "Other"]),
            &names(&["Father", "Mother"]),
        )
        .unwrap_err();

        assert_eq!(err, RosterError::UnknownSample("Sample_42".to_string()));
    }

    #[test]
    fn test_empty_declaration_accepts_any_vcf() {
        let roster = SampleRoster::reconcile(&[], &names(&["A", "B"])).unwrap();
        assert_eq!(roster.observed(), &names(&["A", "B"])[..]);
        assert!(roster.placeholders().is_empty());
    }

    #[test]
    fn test_resolve_skips_missing_names() {
        let roster = SampleRoster::reconcile(&[], &names(&["A", "B", "C"])).unwrap();
        assert_eq!(roster.resolve(&names(&["C", "U2", "A"])), vec![2, 0]);
    }

    #[test]
    fn test_pedigree_from_settings() {
        let settings = Settings {
            samples: names(&["Father", "Mother", "Child", "U1"]),
            fathers: names(&["NA", "NA", "Father", "Father"]),
            mothers: names(&["NA", "0", "Mother", "Mother"]),
            sexes: names(&["M", "F", "NA", "F"]),
            ..Settings::default()
        };

        let pedigree = Pedigree::from_settings(&settings);
        assert_eq!(pedigree.members().len(), 4);

        let child = pedigree.get("Child").unwrap();
        assert_eq!(child.father.as_deref(), Some("Father"));
        assert_eq!(child.mother.as_deref(), Some("Mother"));
        assert_eq!(child.sex, Sex::Unknown);

        let mother = pedigree.get("Mother").unwrap();
        assert_eq!(mother.mother, None);
        assert_eq!(mother.sex, Sex::Female);

        assert_eq!(pedigree.samples_requiring_sex_inference(), vec!["Child", "U1"]);
    }

    #[test]
    fn test_pedigree_without_parallel_lists() {
        let settings = Settings {
            samples: names(&["A"]),
            ..Settings::default()
        };

        let pedigree = Pedigree::from_settings(&settings);
        let member = pedigree.get("A").unwrap();
        assert_eq!(member.father, None);
        assert_eq!(member.sex, Sex::Unknown);
    }
}
