//! Per-runtime directory layout.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::collector::TestOutputCollector;
use crate::error::{PkgTestError, Result};

/// Package list handed to the reference installer.
pub const REFERENCE_PACKAGE_LIST: &str = "reference.packages";

/// Install and test directories of one runtime.
#[derive(Debug, Clone)]
pub struct RuntimeTree {
    root: PathBuf,
}

impl RuntimeTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `R_LIBS_USER` for the run.
    pub fn lib_install(&self) -> PathBuf {
        self.root.join("lib.install.cran")
    }

    /// `TMPDIR` for the run.
    pub fn install_tmp(&self) -> PathBuf {
        self.root.join("install.tmp")
    }

    pub fn test_dir(&self) -> PathBuf {
        self.root.join("test")
    }

    pub fn collector(&self) -> TestOutputCollector {
        TestOutputCollector::new(self.test_dir())
    }

    /// Removes and recreates the library, temp and test directories.
    pub fn prepare(&self) -> Result<()> {
        for dir in [self.lib_install(), self.install_tmp(), self.test_dir()] {
            recreate_dir(&dir)?;
        }
        Ok(())
    }

    pub fn remove_install_tmp(&self) -> Result<()> {
        remove_dir_if_present(&self.install_tmp())
    }
}

fn recreate_dir(dir: &Path) -> Result<()> {
    remove_dir_if_present(dir)?;
    fs::create_dir_all(dir).map_err(|e| PkgTestError::io(dir, e))?;
    debug!(dir = %dir.display(), "recreated");
    Ok(())
}

fn remove_dir_if_present(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PkgTestError::io(dir, e)),
    }
}

/// Writes one package name per line.
pub fn write_package_list(path: &Path, packages: &[String]) -> Result<()> {
    let mut file = fs::File::create(path).map_err(|e| PkgTestError::io(path, e))?;
    for pkg in packages {
        writeln!(file, "{pkg}").map_err(|e| PkgTestError::io(path, e))?;
    }
    Ok(())
}

/// Copies `src` to `dst` recursively unless `dst` already exists.
///
/// Returns whether a copy was made.
pub fn copy_tree_if_absent(src: &Path, dst: &Path) -> Result<bool> {
    if dst.exists() {
        return Ok(false);
    }
    for entry in WalkDir::new(src) {
        let entry = entry?;
        let Ok(rel) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| PkgTestError::io(&target, e))?;
        } else {
            fs::copy(entry.path(), &target).map_err(|e| PkgTestError::io(&target, e))?;
        }
    }
    debug!(from = %src.display(), to = %dst.display(), "copied test project");
    Ok(true)
}
