//! Test Fixtures Module
//!
//! Programmatically generated audio for WaaV Live tests.

// Allow dead code in test fixtures - not every test uses every helper
#![allow(dead_code)]

pub mod audio_fixtures;

pub use audio_fixtures::*;
