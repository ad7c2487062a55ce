//! Per-call results and the files they are persisted to.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::cost::format_cost;
use crate::error::{Error, Result};
use crate::usage::UsageMetrics;

pub const SUMMARY_FILE: &str = "summary_metrics.txt";

/// Outcome of one (provider, prompt file) call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallResult {
    pub provider: String,
    pub prompt_file: String,
    pub result_text: String,
    pub elapsed_ms: u64,
    pub usage: UsageMetrics,
}

impl CallResult {
    /// `{provider}\t{file}\t{metric}\t{value}` lines, without a trailing newline.
    pub fn metric_lines(&self) -> String {
        let usage = &self.usage;
        let metrics = [
            ("elapsed_time_ms", self.elapsed_ms.to_string()),
            ("input_tokens", usage.input_tokens.to_string()),
            ("output_tokens", usage.output_tokens.to_string()),
            ("total_tokens", usage.total_tokens.to_string()),
            ("input_cost_usd", format_cost(usage.input_cost())),
            ("output_cost_usd", format_cost(usage.output_cost())),
            ("total_cost_usd", format_cost(usage.total_cost())),
        ];
        metrics
            .iter()
            .map(|(name, value)| format!("{}\t{}\t{}\t{}", self.provider, self.prompt_file, name, value))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn result_file_name(&self) -> String {
        result_file_name(&self.provider, &self.prompt_file)
    }
}

/// `{provider}_{stem}_result.txt`, the stem being the name up to its first `.`.
pub fn result_file_name(provider: &str, prompt_file: &str) -> String {
    let stem = prompt_file.split('.').next().unwrap_or(prompt_file);
    format!("{}_{}_result.txt", provider, stem)
}

/// Metric blocks of every call so far, each followed by a blank line.
#[derive(Clone, Debug, Default)]
pub struct Summary {
    text: String,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: &CallResult) {
        self.text.push_str(&result.metric_lines());
        self.text.push_str("\n\n");
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// The output directory of one run.
#[derive(Clone, Debug)]
pub struct OutputDir {
    path: PathBuf,
}

impl OutputDir {
    /// Remove whatever is at `path` and start from an empty directory.
    pub fn reset(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            debug!(dir = %path.display(), "removing previous output");
            fs::remove_dir_all(path).map_err(|e| Error::file(path, e))?;
        }
        fs::create_dir_all(path).map_err(|e| Error::file(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_result(&self, result: &CallResult) -> Result<PathBuf> {
        self.write(&result.result_file_name(), &result.result_text)
    }

    pub fn write_summary(&self, summary: &Summary) -> Result<PathBuf> {
        self.write(SUMMARY_FILE, summary.as_str())
    }

    fn write(&self, name: &str, content: &str) -> Result<PathBuf> {
        let file = self.path.join(name);
        fs::write(&file, content).map_err(|e| Error::file(&file, e))?;
        Ok(file)
    }
}
