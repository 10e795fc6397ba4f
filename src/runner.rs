//! Runner for the `installpkgs.R` driver.
//!
//! Executes the installer under one R runtime and hands every line of its
//! combined stdout/stderr to a callback as it is produced.

use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info, warn};

use crate::config::RuntimeSpec;
use crate::layout::RuntimeTree;

/// A fully specified subprocess call.
///
/// `env` holds overrides on top of the inherited environment; the tool's own
/// environment is never modified.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, OsString>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    /// `Rscript <script> <extra args> <args>` for `runtime`, with `TMPDIR`
    /// and `R_LIBS_USER` pointing into its tree.
    pub fn installpkgs(
        runtime: &RuntimeSpec,
        tree: &RuntimeTree,
        script: &Path,
        args: Vec<String>,
    ) -> Self {
        let mut inv = Self::new(&runtime.rscript);
        inv.args.push(script.display().to_string());
        inv.args.extend(runtime.extra_args.iter().cloned());
        inv.args.extend(args);
        inv.env
            .insert("TMPDIR".to_string(), tree.install_tmp().into_os_string());
        inv.env
            .insert("R_LIBS_USER".to_string(), tree.lib_install().into_os_string());
        inv
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Puts `dir` in front of the inherited `PATH`.
    pub fn prepend_path(mut self, dir: &Path) -> Result<Self> {
        let inherited = std::env::var_os("PATH").unwrap_or_default();
        let paths = std::iter::once(dir.to_path_buf()).chain(std::env::split_paths(&inherited));
        let joined = std::env::join_paths(paths).context("Invalid PATH entry")?;
        self.env.insert("PATH".to_string(), joined);
        Ok(self)
    }

    fn command_line(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Runs `inv`, calling `on_line` with each output line (terminator included).
///
/// Returns the exit code; a process killed by a signal reports `-1`. An error
/// from `on_line` kills the process and is returned.
pub fn run_streaming<F>(inv: &Invocation, mut on_line: F) -> Result<i32>
where
    F: FnMut(&str) -> Result<()>,
{
    let (reader, writer) = std::io::pipe().context("Failed to create output pipe")?;

    let mut child = {
        let stderr = writer
            .try_clone()
            .context("Failed to duplicate output pipe")?;
        let mut command = Command::new(&inv.program);
        command
            .args(&inv.args)
            .envs(&inv.env)
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(stderr);
        if let Some(ref dir) = inv.cwd {
            command.current_dir(dir);
        }
        debug!(command = %inv.command_line(), "spawning");
        command
            .spawn()
            .with_context(|| format!("Failed to spawn: {}", inv.program.display()))?
    };

    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .context("Failed to read process output")?;
        if read == 0 {
            break;
        }
        if let Err(e) = on_line(&String::from_utf8_lossy(&buf)) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }
    }

    let status = child.wait().context("Error waiting for process")?;
    let code = status.code().unwrap_or(-1);
    if status.success() {
        info!(program = %inv.program.display(), "finished");
    } else {
        warn!(program = %inv.program.display(), code, "exited with non-zero status");
    }
    Ok(code)
}

/// Checks that an `Rscript` is runnable and returns its version banner.
pub fn check_rscript_available(rscript: &Path) -> Result<String> {
    let output = Command::new(rscript)
        .arg("--version")
        .output()
        .with_context(|| format!("Failed to run {} --version", rscript.display()))?;

    // Rscript prints its version on stderr.
    let version = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if version.contains("version") || output.status.success() {
        Ok(version)
    } else {
        Err(anyhow!("{} not available", rscript.display()))
    }
}
