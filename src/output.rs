use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink, RunOutcome};
use crate::error::DownloaderError;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_outcome(outcome: &RunOutcome) -> io::Result<()> {
        Self::print_json(outcome)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Prints download progress lines; `phase=` bookkeeping stays in the logs.
pub struct ConsoleOutput;

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        if event.message.starts_with("phase=") || event.message.starts_with("portal.") {
            tracing::debug!(message = %event.message, elapsed = ?event.elapsed, "progress");
            return;
        }
        println!("{}", event.message);
    }
}

impl ConsoleOutput {
    pub fn print_summary(outcome: &RunOutcome) {
        let green = "\x1b[32m";
        let yellow = "\x1b[33m";
        let cyan = "\x1b[36m";
        let red = "\x1b[31m";
        let reset = "\x1b[0m";

        match outcome {
            RunOutcome::Empty { study_id } => {
                println!("{yellow}No files found for the study {study_id}{reset}");
            }
            RunOutcome::Planned {
                destination,
                files,
                truncated,
                ..
            } => {
                println!("{cyan}Planned downloads into {destination}: {}{reset}", files.len());
                for file in files {
                    println!("  {} <- {}", file.destination_path(), file.source_url());
                }
                if !truncated.is_empty() {
                    println!("{yellow}Listing may be incomplete: {truncated:?}{reset}");
                }
            }
            RunOutcome::Completed {
                destination,
                truncated,
                report,
            } => {
                println!("{cyan}Study {} -> {destination}{reset}", report.study_id);
                println!("{green}Downloaded files: {}{reset}", report.succeeded);
                let color = if report.is_success() { green } else { red };
                println!("{color}Failed files: {}{reset}", report.failed_count());
                for failure in &report.failed {
                    println!(
                        "{red}  {} ({}): {}{reset}",
                        failure.descriptor.file_name(),
                        failure.descriptor.source_url(),
                        failure.reason
                    );
                }
                if !truncated.is_empty() {
                    println!("{yellow}Listing may be incomplete: {truncated:?}{reset}");
                }
            }
        }
    }
}

/// Writes `value` as pretty JSON through a temp file renamed into place.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), DownloaderError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| DownloaderError::Filesystem(err.to_string()))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    let content = serde_json::to_vec_pretty(value)
        .map_err(|err| DownloaderError::Filesystem(err.to_string()))?;
    fs::write(&tmp_path, &content).map_err(|err| DownloaderError::Filesystem(err.to_string()))?;
    fs::rename(&tmp_path, path).map_err(|err| DownloaderError::Filesystem(err.to_string()))?;
    Ok(())
}
