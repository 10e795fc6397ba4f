//! Common types for cran-pkgtest.
//!
//! Per-package test outcomes for one runtime, plus the report written at the
//! end of a run.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::reconcile::Diagnostic;

/// Outcome of a single test output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileOutcome {
    /// The test produced this output normally.
    Ok,
    /// The test died; the runner left a `.fail` file behind.
    Failed,
}

/// One output artifact of one test run of one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestFileStatus {
    pub status: FileOutcome,
    pub abspath: PathBuf,
}

impl TestFileStatus {
    pub const fn new(status: FileOutcome, abspath: PathBuf) -> Self {
        Self { status, abspath }
    }

    pub const fn is_failed(&self) -> bool {
        matches!(self.status, FileOutcome::Failed)
    }
}

/// Final verdict for a package.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PackageStatus {
    Ok,
    Failed,
    /// Not decided, either because the reference run failed too or because
    /// the package was never compared.
    #[default]
    Unknown,
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "OK",
            Self::Failed => "FAILED",
            Self::Unknown => "UNKNOWN",
        })
    }
}

/// Test status of one package under one runtime.
///
/// `testfile_outputs` is keyed by the output file's path relative to
/// `test/<package>`, with `/` separators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TestStatus {
    pub status: PackageStatus,
    pub testfile_outputs: BTreeMap<String, TestFileStatus>,
}

impl TestStatus {
    /// True if any output of this run is a `.fail` file.
    pub fn has_failed_outputs(&self) -> bool {
        self.testfile_outputs.values().any(TestFileStatus::is_failed)
    }
}

/// Test status per package, ordered by package name.
pub type TestInfo = BTreeMap<String, TestStatus>;

/// Install outcome per package (`true` = installed).
pub type InstallStatus = BTreeMap<String, bool>;

/// Packages that installed successfully, in name order.
pub fn installed_packages(install_status: &InstallStatus) -> Vec<String> {
    install_status
        .iter()
        .filter(|(_, ok)| **ok)
        .map(|(pkg, _)| pkg.clone())
        .collect()
}

/// Final report of a run.
#[derive(Debug, Serialize)]
pub struct RunReport {
    /// Candidate installer exit code.
    pub exit_code: i32,
    pub install_status: InstallStatus,
    pub test_status: BTreeMap<String, PackageStatus>,
    pub diagnostics: Vec<Diagnostic>,
}

impl RunReport {
    pub fn count(&self, status: PackageStatus) -> usize {
        self.test_status.values().filter(|s| **s == status).count()
    }
}
