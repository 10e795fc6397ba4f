//! cran-pkgtest: CRAN package regression testing across two R runtimes.
//!
//! Drives the `installpkgs.R` installer under a candidate runtime, classifies
//! its output, repeats the tests with a reference runtime, and compares the
//! test transcripts of both.

pub mod classifier;
pub mod collector;
pub mod compare;
pub mod config;
pub mod error;
pub mod layout;
pub mod reconcile;
pub mod runner;
pub mod telemetry;
pub mod types;

pub use error::{PkgTestError, Result};
