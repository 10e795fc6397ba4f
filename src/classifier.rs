//! Classifier for the installer's combined output.
//!
//! The `installpkgs` script prints fixed banners around its phases:
//!
//! ```text
//! BEGIN package installation
//! BEGIN processing: foo 1.0 ...
//! BEGIN install status
//! foo: OK
//! END install status
//! BEGIN package tests
//! BEGIN testing: foo ...
//! END testing: foo ...
//! ```
//!
//! [`ClassifierState::advance`] is a pure transition from one line to the
//! next state and at most one [`CaptureEvent`]. [`OutputCapture`] folds those
//! events into install data, install status and collected test outputs.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::collector::TestOutputCollector;
use crate::error::{PkgTestError, Result};
use crate::types::{InstallStatus, TestInfo};

pub const INSTALL_BANNER: &str = "BEGIN package installation";
pub const INSTALL_STATUS_BANNER: &str = "BEGIN install status";
pub const INSTALL_STATUS_END: &str = "END install status";
pub const TESTS_BANNER: &str = "BEGIN package tests";

static START_INSTALL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^BEGIN processing: (?P<package>[a-zA-Z0-9.\-]+) ").expect("valid regex")
});
static TEST_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<status>BEGIN|END) testing: (?P<package>[a-zA-Z0-9.\-]+) ")
        .expect("valid regex")
});
static STATUS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<package>[a-zA-Z0-9.\-]+): (?P<status>OK|FAILED)").expect("valid regex")
});

/// Installer phase the classifier is in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    None,
    Install,
    InstallStatus,
    Test,
}

/// Something the classifier recognized in a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Raw installer output belonging to `package`.
    InstallOutput { package: String, text: String },
    /// Final install outcome of `package`.
    InstallStatus { package: String, ok: bool },
    TestsStarted { package: String },
    /// The test runner finished `package`; its outputs are ready.
    TestsFinished { package: String },
}

/// Classifier state between two lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifierState {
    pub mode: Mode,
    /// Package whose installation output is being accumulated.
    pub package: Option<String>,
}

impl ClassifierState {
    /// Consumes one line of output (terminator included).
    ///
    /// Fails only on a malformed line inside the install status block.
    pub fn advance(self, line: &str) -> Result<(Self, Option<CaptureEvent>)> {
        let bare = strip_terminator(line);
        let mode = match bare {
            INSTALL_BANNER => Some(Mode::Install),
            INSTALL_STATUS_BANNER => Some(Mode::InstallStatus),
            TESTS_BANNER => Some(Mode::Test),
            INSTALL_STATUS_END if self.mode == Mode::InstallStatus => Some(Mode::None),
            _ => None,
        };
        if let Some(mode) = mode {
            debug!(from = ?self.mode, to = ?mode, "classifier mode change");
            return Ok((Self { mode, ..self }, None));
        }

        match self.mode {
            Mode::None => Ok((self, None)),
            Mode::Install => {
                let package = START_INSTALL_PATTERN
                    .captures(bare)
                    .map(|c| c["package"].to_string())
                    .or(self.package);
                let event = package.clone().map(|package| CaptureEvent::InstallOutput {
                    package,
                    text: line.to_string(),
                });
                Ok((
                    Self {
                        mode: Mode::Install,
                        package,
                    },
                    event,
                ))
            }
            Mode::InstallStatus => {
                let caps = STATUS_PATTERN
                    .captures(bare)
                    .ok_or_else(|| PkgTestError::ProtocolViolation {
                        line: bare.to_string(),
                    })?;
                let event = CaptureEvent::InstallStatus {
                    package: caps["package"].to_string(),
                    ok: &caps["status"] == "OK",
                };
                Ok((self, Some(event)))
            }
            Mode::Test => {
                let event = TEST_PATTERN.captures(bare).map(|c| {
                    let package = c["package"].to_string();
                    if &c["status"] == "END" {
                        CaptureEvent::TestsFinished { package }
                    } else {
                        CaptureEvent::TestsStarted { package }
                    }
                });
                Ok((self, event))
            }
        }
    }
}

fn strip_terminator(line: &str) -> &str {
    line.strip_suffix('\n')
        .map_or(line, |l| l.strip_suffix('\r').unwrap_or(l))
}

/// Everything learned from one installer run.
#[derive(Debug)]
pub struct OutputCapture {
    state: ClassifierState,
    collector: TestOutputCollector,
    /// Raw installer output per package.
    pub install_data: BTreeMap<String, String>,
    pub install_status: InstallStatus,
    /// Test outputs of every package whose tests finished.
    pub test_info: TestInfo,
}

impl OutputCapture {
    /// Creates a capture that collects finished tests with `collector`.
    pub fn new(collector: TestOutputCollector) -> Self {
        Self {
            state: ClassifierState::default(),
            collector,
            install_data: BTreeMap::new(),
            install_status: InstallStatus::new(),
            test_info: TestInfo::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.state.mode
    }

    /// Classifies `line` and applies the resulting event.
    pub fn feed(&mut self, line: &str) -> Result<()> {
        let (state, event) = std::mem::take(&mut self.state).advance(line)?;
        self.state = state;
        if let Some(event) = event {
            self.apply(event)?;
        }
        Ok(())
    }

    fn apply(&mut self, event: CaptureEvent) -> Result<()> {
        match event {
            CaptureEvent::InstallOutput { package, text } => {
                self.install_data.entry(package).or_default().push_str(&text);
            }
            CaptureEvent::InstallStatus { package, ok } => {
                debug!(package = %package, ok, "install status");
                self.install_status.insert(package, ok);
            }
            CaptureEvent::TestsStarted { package } => {
                debug!(package = %package, "tests started");
            }
            CaptureEvent::TestsFinished { package } => {
                self.collector.collect(&package, &mut self.test_info)?;
            }
        }
        Ok(())
    }
}
