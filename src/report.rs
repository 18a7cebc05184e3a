//! Append-only report files.
//!
//! A run writes one summary report at its report root and one report per script under a
//! sub-directory named after the script. Every line is `[SUCCESS] <text>` or
//! `[FAILURE] <text>`.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::trace;

use crate::test_script::{TestResult, TestResultType};

pub const REPORT_FILENAME: &str = "report.txt";

pub fn report_line(result_type: TestResultType, text: &str) -> String {
    format!("{result_type} {text}")
}

/// Directory name for a script's report; path separators become `_`.
pub fn script_dir_name(script_name: &str) -> String {
    let name = script_name.replace(['/', '\\'], "_");
    match name.as_str() {
        "" | "." | ".." => format!("_{name}"),
        _ => name,
    }
}

fn append_line(path: &Path, line: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    trace!("Appending to {}: {line}", path.display());
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}

#[derive(Debug, Clone)]
pub struct ReportWriter {
    root: PathBuf,
}

impl ReportWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn summary_path(&self) -> PathBuf {
        self.root.join(REPORT_FILENAME)
    }

    pub fn script_dir(&self, script_name: &str) -> PathBuf {
        self.root.join(script_dir_name(script_name))
    }

    /// Appends `[TYPE] <script name>` to the summary report.
    pub fn append_summary(&self, script_name: &str, result: &TestResult) -> io::Result<()> {
        append_line(
            &self.summary_path(),
            &report_line(result.result_type(), script_name),
        )
    }

    /// Appends `[TYPE] <description>` to the script's own report.
    pub fn append_script_report(&self, script_name: &str, result: &TestResult) -> io::Result<()> {
        append_line(
            &self.script_dir(script_name).join(REPORT_FILENAME),
            &report_line(result.result_type(), result.description()),
        )
    }
}
