//! Fuzzy comparison of R session transcripts.
//!
//! A transcript contains the whole console session: the startup banner, the
//! echoed test script with its output, and a timing footer. Only the part
//! between the banner and the footer is compared, line by line.

use std::fs;
use std::path::Path;

use crate::error::{PkgTestError, Result};

/// Last line of the R startup banner.
pub const START_MARKER: &str = "Type 'q()' to quit R.";

/// Footer the test runner prints after the session.
pub const END_MARKER: &str = "Time elapsed:";

/// Lines the reference runtime prints after the banner that the candidate
/// does not (a single blank line).
///
/// Empirical and tied to the reference runtime's version; re-check it when
/// the reference R is upgraded.
pub const REFERENCE_EXTRA_BLANK_LINES: usize = 1;

/// Result of comparing two transcripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompareOutcome {
    Match,
    Mismatch {
        /// Index into the reference transcript of the first differing line.
        reference_line: usize,
        expected: String,
        /// `None` if the candidate transcript ended first.
        actual: Option<String>,
    },
}

impl CompareOutcome {
    pub const fn is_match(&self) -> bool {
        matches!(self, Self::Match)
    }

    /// `0` for a match, `1` for a mismatch.
    pub const fn code(&self) -> i32 {
        match self {
            Self::Match => 0,
            Self::Mismatch { .. } => 1,
        }
    }
}

/// Compares the body of `candidate` against the body of `reference`.
///
/// Lines are compared exactly, terminators included. Extra trailing lines in
/// the candidate are not a mismatch.
pub fn fuzzy_compare<S: AsRef<str>>(reference: &[S], candidate: &[S]) -> Result<CompareOutcome> {
    let reference_start = find_start(reference, "reference")? + REFERENCE_EXTRA_BLANK_LINES;
    let reference_end = find_marker(reference, END_MARKER).ok_or(PkgTestError::MarkerNotFound {
        marker: END_MARKER,
        transcript: "reference",
    })?;
    let candidate_start = find_start(candidate, "candidate")?;

    let body = reference
        .get(reference_start..reference_end)
        .unwrap_or_default();
    let candidate_body = candidate.get(candidate_start..).unwrap_or_default();

    for (offset, expected) in body.iter().enumerate() {
        let expected = expected.as_ref();
        let actual = candidate_body.get(offset).map(AsRef::as_ref);
        if actual != Some(expected) {
            return Ok(CompareOutcome::Mismatch {
                reference_line: reference_start + offset,
                expected: expected.to_string(),
                actual: actual.map(str::to_string),
            });
        }
    }

    Ok(CompareOutcome::Match)
}

/// Index of the first line after the startup banner.
fn find_start<S: AsRef<str>>(content: &[S], transcript: &'static str) -> Result<usize> {
    find_marker(content, START_MARKER)
        .map(|i| i + 1)
        .ok_or(PkgTestError::MarkerNotFound {
            marker: START_MARKER,
            transcript,
        })
}

fn find_marker<S: AsRef<str>>(content: &[S], marker: &str) -> Option<usize> {
    content.iter().position(|line| line.as_ref().contains(marker))
}

/// Reads a transcript, keeping line terminators. Invalid UTF-8 is replaced.
pub fn read_transcript(path: &Path) -> Result<Vec<String>> {
    let bytes = fs::read(path).map_err(|e| PkgTestError::io(path, e))?;
    Ok(String::from_utf8_lossy(&bytes)
        .split_inclusive('\n')
        .map(str::to_string)
        .collect())
}

/// Reads and compares two transcript files.
pub fn compare_files(reference: &Path, candidate: &Path) -> Result<CompareOutcome> {
    let reference = read_transcript(reference)?;
    let candidate = read_transcript(candidate)?;
    fuzzy_compare(&reference, &candidate)
}
