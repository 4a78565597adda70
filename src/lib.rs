// ==============================================================================
// lib.rs - Hopla Library
// ==============================================================================
// Description: Library interface for the Hopla variant prefilter modules
// Created: 2026-09-29
// Modified: 2026-10-03
// Version: 2.0.0
// ==============================================================================

pub mod settings;
pub mod roster;
pub mod models;
pub mod parsers;
pub mod filter;
pub mod validator;
pub mod processor;
pub mod output;
