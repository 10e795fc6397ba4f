//! Reconciliation of candidate test results against the reference runtime.
//!
//! The reference runtime is the oracle: only packages it has results for are
//! decided, and a package whose reference run failed stays UNKNOWN.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::collector::TestOutputCollector;
use crate::compare::{compare_files, CompareOutcome};
use crate::error::Result;
use crate::types::{InstallStatus, PackageStatus, TestInfo, TestStatus};

/// Why a package did not end up OK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// The reference run left `.fail` outputs, so nothing can be compared.
    ReferenceFailed { package: String },
    CandidateFailed { package: String },
    MissingOutput { package: String, path: String },
    OutputMismatch {
        package: String,
        path: String,
        reference_line: usize,
    },
}

impl Diagnostic {
    /// Status the package ends up with because of this diagnostic.
    pub const fn status(&self) -> PackageStatus {
        match self {
            Self::ReferenceFailed { .. } => PackageStatus::Unknown,
            _ => PackageStatus::Failed,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReferenceFailed { package } => {
                write!(f, "{package}: reference test had .fail outputs")
            }
            Self::CandidateFailed { package } => {
                write!(f, "{package}: candidate test had .fail outputs")
            }
            Self::MissingOutput { package, path } => {
                write!(f, "{package}: candidate is missing output file: {path}")
            }
            Self::OutputMismatch {
                package,
                path,
                reference_line,
            } => write!(
                f,
                "{package}: candidate output mismatch: {path} (reference line {})",
                reference_line + 1
            ),
        }
    }
}

/// Collects the reference outputs for every candidate package that
/// installed and settles each of their statuses.
///
/// Packages that failed to install, or have no install status, are not
/// compared and stay UNKNOWN. Returns one diagnostic per compared package
/// that did not end up OK.
pub fn set_test_status(
    candidate: &mut TestInfo,
    install_status: &InstallStatus,
    reference_collector: &TestOutputCollector,
) -> Result<Vec<Diagnostic>> {
    let mut reference = TestInfo::new();
    for pkg in candidate.keys() {
        if install_status.get(pkg).copied().unwrap_or(false) {
            reference_collector.collect(pkg, &mut reference)?;
        } else {
            debug!(package = %pkg, "not installed, skipping comparison");
        }
    }
    reconcile(candidate, &reference)
}

/// Settles candidate statuses from already collected reference outputs.
pub fn reconcile(candidate: &mut TestInfo, reference: &TestInfo) -> Result<Vec<Diagnostic>> {
    let mut diagnostics = Vec::new();

    for (pkg, reference_status) in reference {
        let Some(candidate_status) = candidate.get_mut(pkg) else {
            continue;
        };

        let diagnostic = if reference_status.has_failed_outputs() {
            Some(Diagnostic::ReferenceFailed {
                package: pkg.clone(),
            })
        } else if candidate_status.has_failed_outputs() {
            Some(Diagnostic::CandidateFailed {
                package: pkg.clone(),
            })
        } else {
            first_difference(pkg, reference_status, candidate_status)?
        };

        match diagnostic {
            Some(diagnostic) => {
                warn!("{diagnostic}");
                candidate_status.status = diagnostic.status();
                diagnostics.push(diagnostic);
            }
            None => {
                info!(package = %pkg, "test outputs match");
                candidate_status.status = PackageStatus::Ok;
            }
        }
    }

    Ok(diagnostics)
}

fn first_difference(
    pkg: &str,
    reference: &TestStatus,
    candidate: &TestStatus,
) -> Result<Option<Diagnostic>> {
    if let Some(path) = reference
        .testfile_outputs
        .keys()
        .find(|path| !candidate.testfile_outputs.contains_key(*path))
    {
        return Ok(Some(Diagnostic::MissingOutput {
            package: pkg.to_string(),
            path: path.clone(),
        }));
    }

    for (path, reference_file) in &reference.testfile_outputs {
        let Some(candidate_file) = candidate.testfile_outputs.get(path) else {
            continue;
        };
        if let CompareOutcome::Mismatch { reference_line, .. } =
            compare_files(&reference_file.abspath, &candidate_file.abspath)?
        {
            return Ok(Some(Diagnostic::OutputMismatch {
                package: pkg.to_string(),
                path: path.clone(),
                reference_line,
            }));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FileOutcome, TestFileStatus};
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const BODY: &str = "> 1 + 1\n[1] 2\n";

    fn reference_transcript(body: &str) -> String {
        format!("R version\nType 'q()' to quit R.\n\n{body}Time elapsed: 0.1s\n")
    }

    fn candidate_transcript(body: &str) -> String {
        format!("FastR version\nType 'q()' to quit R.\n{body}Time elapsed: 0.2s\n")
    }

    fn status_with(dir: &Path, files: &[(&str, FileOutcome, String)]) -> TestStatus {
        let mut status = TestStatus::default();
        for (name, outcome, content) in files {
            let path = dir.join(name);
            fs::write(&path, content).unwrap();
            status
                .testfile_outputs
                .insert((*name).to_string(), TestFileStatus::new(*outcome, path));
        }
        status
    }

    struct Fixture {
        _tmp: TempDir,
        reference_dir: std::path::PathBuf,
        candidate_dir: std::path::PathBuf,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let reference_dir = tmp.path().join("reference");
        let candidate_dir = tmp.path().join("candidate");
        fs::create_dir_all(&reference_dir).unwrap();
        fs::create_dir_all(&candidate_dir).unwrap();
        Fixture {
            _tmp: tmp,
            reference_dir,
            candidate_dir,
        }
    }

    fn run(reference: TestStatus, candidate: TestStatus) -> (PackageStatus, Vec<Diagnostic>) {
        let mut candidate_info = TestInfo::from([("foo".to_string(), candidate)]);
        let reference_info = TestInfo::from([("foo".to_string(), reference)]);
        let diagnostics = reconcile(&mut candidate_info, &reference_info).unwrap();
        (candidate_info["foo"].status, diagnostics)
    }

    #[test]
    fn matching_outputs_are_ok() {
        let fx = fixture();
        let reference = status_with(
            &fx.reference_dir,
            &[("t.Rout", FileOutcome::Ok, reference_transcript(BODY))],
        );
        let candidate = status_with(
            &fx.candidate_dir,
            &[("t.Rout", FileOutcome::Ok, candidate_transcript(BODY))],
        );
        assert_eq!(run(reference, candidate), (PackageStatus::Ok, vec![]));
    }

    #[test]
    fn reference_failure_leaves_unknown() {
        let fx = fixture();
        let reference = status_with(
            &fx.reference_dir,
            &[("t.Rout", FileOutcome::Failed, "boom\n".to_string())],
        );
        let candidate = status_with(
            &fx.candidate_dir,
            &[("t.Rout", FileOutcome::Failed, "boom\n".to_string())],
        );
        let (status, diagnostics) = run(reference, candidate);
        assert_eq!(status, PackageStatus::Unknown);
        assert_eq!(
            diagnostics,
            vec![Diagnostic::ReferenceFailed {
                package: "foo".to_string()
            }]
        );
    }

    #[test]
    fn candidate_failure_is_failed() {
        let fx = fixture();
        let reference = status_with(
            &fx.reference_dir,
            &[("t.Rout", FileOutcome::Ok, reference_transcript(BODY))],
        );
        let candidate = status_with(
            &fx.candidate_dir,
            &[("t.Rout", FileOutcome::Failed, "Error\n".to_string())],
        );
        let (status, diagnostics) = run(reference, candidate);
        assert_eq!(status, PackageStatus::Failed);
        assert_eq!(diagnostics[0].to_string(), "foo: candidate test had .fail outputs");
    }

    #[test]
    fn missing_output_is_failed() {
        let fx = fixture();
        let reference = status_with(
            &fx.reference_dir,
            &[
                ("a.Rout", FileOutcome::Ok, reference_transcript(BODY)),
                ("b.Rout", FileOutcome::Ok, reference_transcript(BODY)),
            ],
        );
        let candidate = status_with(
            &fx.candidate_dir,
            &[("a.Rout", FileOutcome::Ok, candidate_transcript(BODY))],
        );
        let (status, diagnostics) = run(reference, candidate);
        assert_eq!(status, PackageStatus::Failed);
        assert_eq!(
            diagnostics[0].to_string(),
            "foo: candidate is missing output file: b.Rout"
        );
    }

    #[test]
    fn content_mismatch_is_failed() {
        let fx = fixture();
        let reference = status_with(
            &fx.reference_dir,
            &[("t.Rout", FileOutcome::Ok, reference_transcript(BODY))],
        );
        let candidate = status_with(
            &fx.candidate_dir,
            &[("t.Rout", FileOutcome::Ok, candidate_transcript("> 1 + 1\n[1] 3\n"))],
        );
        let (status, diagnostics) = run(reference, candidate);
        assert_eq!(status, PackageStatus::Failed);
        assert_eq!(
            diagnostics,
            vec![Diagnostic::OutputMismatch {
                package: "foo".to_string(),
                path: "t.Rout".to_string(),
                reference_line: 4,
            }]
        );
    }

    #[test]
    fn extra_candidate_outputs_are_ignored() {
        let fx = fixture();
        let reference = status_with(
            &fx.reference_dir,
            &[("t.Rout", FileOutcome::Ok, reference_transcript(BODY))],
        );
        let candidate = status_with(
            &fx.candidate_dir,
            &[
                ("t.Rout", FileOutcome::Ok, candidate_transcript(BODY)),
                ("extra.Rout", FileOutcome::Ok, "anything\n".to_string()),
            ],
        );
        assert_eq!(run(reference, candidate).0, PackageStatus::Ok);
    }

    #[test]
    fn candidate_only_packages_stay_unknown() {
        let mut candidate = TestInfo::from([("solo".to_string(), TestStatus::default())]);
        let diagnostics = reconcile(&mut candidate, &TestInfo::new()).unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(candidate["solo"].status, PackageStatus::Unknown);
    }

    #[test]
    fn missing_marker_propagates() {
        let fx = fixture();
        let reference = status_with(
            &fx.reference_dir,
            &[("t.Rout", FileOutcome::Ok, BODY.to_string())],
        );
        let candidate = status_with(
            &fx.candidate_dir,
            &[("t.Rout", FileOutcome::Ok, candidate_transcript(BODY))],
        );
        let mut candidate_info = TestInfo::from([("foo".to_string(), candidate)]);
        let reference_info = TestInfo::from([("foo".to_string(), reference)]);
        assert!(reconcile(&mut candidate_info, &reference_info).is_err());
    }

    #[test]
    fn missing_output_reported_before_comparing() {
        let fx = fixture();
        let reference = status_with(
            &fx.reference_dir,
            &[
                ("a.Rout", FileOutcome::Ok, reference_transcript(BODY)),
                ("b.Rout", FileOutcome::Ok, reference_transcript(BODY)),
            ],
        );
        let candidate = status_with(
            &fx.candidate_dir,
            &[("a.Rout", FileOutcome::Ok, candidate_transcript("> 1 + 1\n[1] 3\n"))],
        );
        let (status, diagnostics) = run(reference, candidate);
        assert_eq!(status, PackageStatus::Failed);
        assert_eq!(
            diagnostics,
            vec![Diagnostic::MissingOutput {
                package: "foo".to_string(),
                path: "b.Rout".to_string(),
            }]
        );
    }

    #[test]
    fn missing_output_wins_over_unanchored_transcript() {
        let fx = fixture();
        let reference = status_with(
            &fx.reference_dir,
            &[
                ("a.Rout", FileOutcome::Ok, "Type 'q()' to quit R.\n\nno footer\n".to_string()),
                ("b.Rout", FileOutcome::Ok, reference_transcript(BODY)),
            ],
        );
        let candidate = status_with(
            &fx.candidate_dir,
            &[("a.Rout", FileOutcome::Ok, candidate_transcript(BODY))],
        );
        let (status, diagnostics) = run(reference, candidate);
        assert_eq!(status, PackageStatus::Failed);
        assert_eq!(
            diagnostics[0].to_string(),
            "foo: candidate is missing output file: b.Rout"
        );
    }

    #[test]
    fn only_installed_packages_are_compared() {
        let tmp = TempDir::new().unwrap();
        let candidate_root = tmp.path().join("candidate");
        let reference_root = tmp.path().join("reference");
        for (root, transcript) in [
            (&candidate_root, candidate_transcript(BODY)),
            (&reference_root, reference_transcript(BODY)),
        ] {
            for pkg in ["good", "broken"] {
                fs::create_dir_all(root.join(pkg)).unwrap();
                fs::write(root.join(pkg).join("t.Rout"), &transcript).unwrap();
            }
        }

        let mut candidate = TestInfo::new();
        let candidate_collector = TestOutputCollector::new(&candidate_root);
        candidate_collector.collect("good", &mut candidate).unwrap();
        candidate_collector.collect("broken", &mut candidate).unwrap();
        let install_status = InstallStatus::from([
            ("good".to_string(), true),
            ("broken".to_string(), false),
        ]);

        let diagnostics = set_test_status(
            &mut candidate,
            &install_status,
            &TestOutputCollector::new(&reference_root),
        )
        .unwrap();

        assert!(diagnostics.is_empty());
        assert_eq!(candidate["good"].status, PackageStatus::Ok);
        assert_eq!(candidate["broken"].status, PackageStatus::Unknown);
    }
}
