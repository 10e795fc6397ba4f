//! Run configuration.
//!
//! Where the two R runtimes live comes from a YAML file; what to install and
//! test comes from command-line options.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PkgTestError, Result};

/// One R runtime taking part in the run.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeSpec {
    /// Display name (populated from the role when omitted).
    #[serde(default)]
    pub name: String,
    /// Directory holding `lib.install.cran`, `install.tmp` and `test`.
    pub root: PathBuf,
    /// `Rscript` of this runtime.
    pub rscript: PathBuf,
    /// Arguments placed before the installer arguments.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

/// Contents of `pkgtest.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct PkgTestConfig {
    /// The `installpkgs.R` driver script.
    pub installpkgs_script: PathBuf,
    /// CRAN test project, copied into the reference root before its run.
    pub cran_test_project: PathBuf,
    /// Package list used by `--ok-only`.
    pub ok_packages: Option<PathBuf>,
    pub candidate: RuntimeSpec,
    pub reference: RuntimeSpec,
}

impl PkgTestConfig {
    pub fn ok_packages_file(&self) -> PathBuf {
        self.ok_packages
            .clone()
            .unwrap_or_else(|| self.cran_test_project.join("ok.packages"))
    }
}

/// Parses a config from YAML.
pub fn parse_config(content: &str) -> std::result::Result<PkgTestConfig, serde_yaml_ng::Error> {
    let mut config: PkgTestConfig = serde_yaml_ng::from_str(content)?;
    if config.candidate.name.is_empty() {
        config.candidate.name = "candidate".to_string();
    }
    if config.reference.name.is_empty() {
        config.reference.name = "reference".to_string();
    }
    Ok(config)
}

/// Loads a config file.
pub fn load_config(path: &Path) -> Result<PkgTestConfig> {
    let content = fs::read_to_string(path).map_err(|e| PkgTestError::io(path, e))?;
    parse_config(&content).map_err(|source| PkgTestError::Config {
        path: path.to_path_buf(),
        source,
    })
}

/// Which packages to install and test, passed through to `installpkgs.R`.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Only packages listed in the ok-packages file.
    pub ok_only: bool,
    /// Install without running tests (and without the reference run).
    pub install_only: bool,
    pub pkg_count: u32,
    pub pkg_filelist: Option<PathBuf>,
    pub ignore_blacklist: bool,
    pub install_dependents_first: bool,
    pub print_ok_installs: bool,
    pub invert_pkgset: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            ok_only: false,
            install_only: false,
            pkg_count: 100,
            pkg_filelist: None,
            ignore_blacklist: false,
            install_dependents_first: false,
            print_ok_installs: false,
            invert_pkgset: false,
        }
    }
}

impl InstallOptions {
    /// Installer arguments for the candidate run, `--verbose` last.
    pub fn candidate_args(&self, ok_packages: &Path) -> Vec<String> {
        let mut args = Vec::new();
        if self.pkg_filelist.is_none() {
            args.push("--pkg-count".to_string());
            args.push(self.pkg_count.to_string());
        }
        if self.ok_only {
            args.push("--pkg-filelist".to_string());
            args.push(ok_packages.display().to_string());
        }
        if let Some(ref filelist) = self.pkg_filelist {
            args.push("--pkg-filelist".to_string());
            args.push(filelist.display().to_string());
        }
        if !self.install_only {
            args.push("--run-tests".to_string());
        }
        let flags = [
            (self.ignore_blacklist, "--ignore-blacklist"),
            (self.install_dependents_first, "--install-dependents-first"),
            (self.print_ok_installs, "--print-ok-installs"),
            (self.invert_pkgset, "--invert-pkgset"),
        ];
        args.extend(
            flags
                .iter()
                .filter(|(set, _)| *set)
                .map(|(_, flag)| (*flag).to_string()),
        );
        args.push("--verbose".to_string());
        args
    }
}

/// Installer arguments for the reference run over `package_list`.
pub fn reference_args(package_list: &Path) -> Vec<String> {
    vec![
        "--pkg-filelist".to_string(),
        package_list.display().to_string(),
        "--run-tests".to_string(),
        "--ignore-blacklist".to_string(),
    ]
}
