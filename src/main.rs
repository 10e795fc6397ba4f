//! cran-pkgtest: CLI entry point.
//!
//! Installs and tests CRAN packages with the candidate R runtime, repeats the
//! tests of every package that installed with the reference runtime, and
//! compares the two sets of test outputs.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use tracing::{info, Level};

use cran_pkgtest::classifier::OutputCapture;
use cran_pkgtest::config::{load_config, reference_args, InstallOptions, PkgTestConfig};
use cran_pkgtest::layout::{
    copy_tree_if_absent, write_package_list, RuntimeTree, REFERENCE_PACKAGE_LIST,
};
use cran_pkgtest::reconcile::set_test_status;
use cran_pkgtest::runner::{check_rscript_available, run_streaming, Invocation};
use cran_pkgtest::telemetry::init_tracing;
use cran_pkgtest::types::{installed_packages, PackageStatus, RunReport};

#[derive(Parser)]
#[command(name = "cran-pkgtest")]
#[command(about = "Install and test CRAN packages against a reference R")]
#[command(version)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Runtime configuration file.
    #[arg(short, long, env = "PKGTEST_CONFIG", default_value = "pkgtest.yaml")]
    config: PathBuf,

    /// Only install/test packages from the ok.packages file.
    #[arg(long)]
    ok_only: bool,

    /// Just install packages, do not test.
    #[arg(long)]
    install_only: bool,

    /// Number of packages to install/test.
    #[arg(long, default_value_t = 100)]
    pkg_count: u32,

    /// File listing the packages to install/test.
    #[arg(long)]
    pkg_filelist: Option<PathBuf>,

    /// Pass --ignore-blacklist to the installer.
    #[arg(long)]
    ignore_blacklist: bool,

    /// Pass --install-dependents-first to the installer.
    #[arg(long)]
    install_dependents_first: bool,

    /// Pass --print-ok-installs to the installer.
    #[arg(long)]
    print_ok_installs: bool,

    /// Pass --invert-pkgset to the installer.
    #[arg(long)]
    invert_pkgset: bool,

    /// Write a JSON report here.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Debug logging.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn install_options(&self) -> InstallOptions {
        InstallOptions {
            ok_only: self.ok_only,
            install_only: self.install_only,
            pkg_count: self.pkg_count,
            pkg_filelist: self.pkg_filelist.clone(),
            ignore_blacklist: self.ignore_blacklist,
            install_dependents_first: self.install_dependents_first,
            print_ok_installs: self.print_ok_installs,
            invert_pkgset: self.invert_pkgset,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(if cli.verbose { Level::DEBUG } else { Level::INFO });

    if !cli.config.exists() {
        anyhow::bail!("Config file not found: {}", cli.config.display());
    }
    let config = load_config(&cli.config)?;
    let options = cli.install_options();

    let r_version = check_rscript_available(&config.candidate.rscript)?;

    println!("{}", "cran-pkgtest".bold());
    println!(
        "  Candidate: {} ({})",
        config.candidate.name,
        config.candidate.rscript.display()
    );
    println!("  R: {r_version}");
    if !options.install_only {
        println!(
            "  Reference: {} ({})",
            config.reference.name,
            config.reference.rscript.display()
        );
    }
    println!("  Installer: {}", config.installpkgs_script.display());
    println!();

    let start = Instant::now();
    let report = pkgtest(&config, &options)?;
    print_report(&report, start.elapsed().as_secs_f64());

    if let Some(ref path) = cli.report {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
    }

    if report.exit_code != 0 {
        std::process::exit(report.exit_code);
    }

    Ok(())
}

fn log_step(state: &str, step: &str, runtime: &str) {
    println!("{}", format!("{state} {step} with {runtime}").cyan());
}

/// Candidate install/test, then (unless install-only) the reference run and
/// the comparison.
fn pkgtest(config: &PkgTestConfig, options: &InstallOptions) -> anyhow::Result<RunReport> {
    let candidate = &config.candidate;
    let tree = RuntimeTree::new(&candidate.root);
    tree.prepare()?;

    let args = options.candidate_args(&config.ok_packages_file());
    let invocation = Invocation::installpkgs(candidate, &tree, &config.installpkgs_script, args)
        .current_dir(tree.root());

    let mut capture = OutputCapture::new(tree.collector());
    log_step("BEGIN", "install/test", &candidate.name);
    let exit_code = run_streaming(&invocation, |line| {
        print!("{line}");
        capture.feed(line)?;
        Ok(())
    })?;
    log_step("END", "install/test", &candidate.name);

    let mut diagnostics = Vec::new();
    if !options.install_only {
        let packages = installed_packages(&capture.install_status);
        let reference_tree = reference_install_test(config, &packages)?;
        diagnostics = set_test_status(
            &mut capture.test_info,
            &capture.install_status,
            &reference_tree.collector(),
        )?;
    }

    tree.remove_install_tmp()?;

    Ok(RunReport {
        exit_code,
        install_status: capture.install_status,
        test_status: capture
            .test_info
            .iter()
            .map(|(pkg, status)| (pkg.clone(), status.status))
            .collect(),
        diagnostics,
    })
}

/// Installs and tests `packages` with the reference runtime.
fn reference_install_test(
    config: &PkgTestConfig,
    packages: &[String],
) -> anyhow::Result<RuntimeTree> {
    let reference = &config.reference;
    let tree = RuntimeTree::new(&reference.root);
    tree.prepare()?;

    if packages.is_empty() {
        info!("no packages installed, skipping {} run", reference.name);
        return Ok(tree);
    }

    let project_name = config
        .cran_test_project
        .file_name()
        .context("CRAN test project path has no directory name")?;
    copy_tree_if_absent(&config.cran_test_project, &tree.root().join(project_name))?;

    let package_list = tree.root().join(REFERENCE_PACKAGE_LIST);
    write_package_list(&package_list, packages)?;

    let mut invocation = Invocation::installpkgs(
        reference,
        &tree,
        &config.installpkgs_script,
        reference_args(&package_list),
    )
    .current_dir(tree.root());
    if let Some(bin) = reference.rscript.parent().filter(|p| !p.as_os_str().is_empty()) {
        invocation = invocation.prepend_path(bin)?;
    }

    log_step("BEGIN", "install/test", &reference.name);
    run_streaming(&invocation, |line| {
        print!("{line}");
        Ok(())
    })?;
    log_step("END", "install/test", &reference.name);

    Ok(tree)
}

fn print_report(report: &RunReport, elapsed: f64) {
    if !report.diagnostics.is_empty() {
        println!();
        for diagnostic in &report.diagnostics {
            println!("  {} {diagnostic}", "!".yellow());
        }
    }

    if !report.test_status.is_empty() {
        println!();
        println!("{}", "Test Status".bold());
        for (pkg, status) in &report.test_status {
            let label = match status {
                PackageStatus::Ok => status.to_string().green(),
                PackageStatus::Failed => status.to_string().red(),
                PackageStatus::Unknown => status.to_string().yellow(),
            };
            println!("{pkg}: {label}");
        }
    }

    let installed = report.install_status.values().filter(|ok| **ok).count();
    let ok = report.count(PackageStatus::Ok);
    let failed = report.count(PackageStatus::Failed);
    let unknown = report.count(PackageStatus::Unknown);

    println!();
    println!("{}", "=".repeat(60));
    println!(
        "  {} of {} packages installed",
        installed,
        report.install_status.len()
    );
    if failed == 0 {
        println!(
            "  {} {} ok, {} unknown in {:.2}s",
            "PASS".green(),
            ok.to_string().green(),
            unknown,
            elapsed
        );
    } else {
        println!(
            "  {} {} ok, {} failed, {} unknown in {:.2}s",
            "FAIL".red(),
            ok,
            failed.to_string().red(),
            unknown,
            elapsed
        );
    }
    println!("{}", "=".repeat(60));
}
