// ==============================================================================
// parsers/mod.rs - File parser modules
// ==============================================================================
// Description: Parsers for the VCF input and the cytoband annotation table
// Created: 2026-09-30
// Modified: 2026-10-01
// Version: 2.0.0
// ==============================================================================

pub mod vcf;
pub mod cytoband;

pub use vcf::{choose_decompression, Decompression, VariantReadError, VariantReader};
pub use cytoband::{Cytoband, CytobandError, CytobandTable};
