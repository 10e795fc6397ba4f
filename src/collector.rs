//! Test output collection.
//!
//! The CRAN test runner writes one directory per package under `test/`,
//! holding the transcript of every test script it ran. Scripts that died
//! leave their transcript with a `.fail` extension.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::Result;
use crate::types::{FileOutcome, TestFileStatus, TestInfo};

/// Extensions that are never compared: the test scripts themselves,
/// snapshots of a previous run, and rendered plots.
const IGNORED_EXTENSIONS: [&str; 3] = ["R", "prev", "pdf"];

const FAIL_EXTENSION: &str = "fail";

/// Reads test outputs from one runtime's `test/` tree.
#[derive(Debug, Clone)]
pub struct TestOutputCollector {
    test_root: PathBuf,
}

impl TestOutputCollector {
    pub fn new(test_root: impl Into<PathBuf>) -> Self {
        Self {
            test_root: test_root.into(),
        }
    }

    pub fn package_dir(&self, pkg: &str) -> PathBuf {
        self.test_root.join(pkg)
    }

    /// Records every output file of `pkg` into `test_info`.
    ///
    /// The package entry is created on first sight. Existing file entries are
    /// overwritten, entries for files that no longer exist are kept. A package
    /// without a test directory is left out entirely. Entries that cannot be
    /// read are logged and skipped.
    pub fn collect(&self, pkg: &str, test_info: &mut TestInfo) -> Result<()> {
        let pkg_dir = self.package_dir(pkg);
        if !pkg_dir.is_dir() {
            debug!(package = pkg, dir = %pkg_dir.display(), "no test outputs");
            return Ok(());
        }

        let status = test_info.entry(pkg.to_string()).or_default();
        for entry in WalkDir::new(&pkg_dir).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(package = pkg, error = %e, "skipping unreadable test output");
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                continue;
            }

            let path = entry.path();
            let ext = path.extension().and_then(OsStr::to_str);
            if ext.is_some_and(|e| IGNORED_EXTENSIONS.contains(&e)) {
                continue;
            }

            let (outcome, logical) = if ext == Some(FAIL_EXTENSION) {
                (FileOutcome::Failed, path.with_extension(""))
            } else {
                (FileOutcome::Ok, path.to_path_buf())
            };

            let Ok(rel) = logical.strip_prefix(&pkg_dir) else {
                continue;
            };
            status.testfile_outputs.insert(
                relative_key(rel),
                TestFileStatus::new(outcome, path.to_path_buf()),
            );
        }

        debug!(
            package = pkg,
            outputs = status.testfile_outputs.len(),
            "collected test outputs"
        );
        Ok(())
    }
}

/// Joins path components with `/` so keys match across platforms.
fn relative_key(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
