//! Loudness measurement and normalization via ffmpeg.
//!
//! ffmpeg is invoked twice per pass: once with the `volumedetect` filter to
//! measure the peak level (reported on stderr), and, when the measured level
//! is outside the tolerance band around the target, once more with
//! `volume=-1dB, loudnorm` to produce a normalized sibling file.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Band around the target within which a file counts as already normalized.
pub const VOLUME_TOLERANCE_DB: f64 = 0.5;

/// Errors that can occur during measurement or normalization.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("ffmpeg failed: {0}")]
    ProcessFailed(String),

    #[error("ffmpeg timed out after {0:?}")]
    Timeout(Duration),

    #[error("could not parse volume from ffmpeg output: {0}")]
    ParseFailed(String),

    #[error("input file is not readable: {0}")]
    UnreadableInput(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of comparing a measured level against the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    AlreadyNormalized,
    NeedsNormalization,
}

/// Decide whether a measured level needs re-encoding toward the target.
///
/// Pure tolerance comparison: within half a decibel either way counts as
/// already normalized.
pub fn decide(target_db: f64, measured_db: f64) -> Verdict {
    if (target_db - measured_db).abs() < VOLUME_TOLERANCE_DB {
        Verdict::AlreadyNormalized
    } else {
        Verdict::NeedsNormalization
    }
}

/// Conditional loudness normalizer.
pub struct Normalizer {
    target_db: i32,
    ffmpeg_timeout: Duration,
    tool: PathBuf,
}

impl Normalizer {
    pub fn new(target_db: i32, ffmpeg_timeout: Duration) -> Self {
        Self {
            target_db,
            ffmpeg_timeout,
            tool: PathBuf::from("ffmpeg"),
        }
    }

    #[cfg(test)]
    fn with_tool(mut self, tool: PathBuf) -> Self {
        self.tool = tool;
        self
    }

    /// Measure the input and re-encode it when needed.
    ///
    /// Returns the path of the file to use afterwards: the input itself when
    /// it is already within tolerance, otherwise a `normalized_`-prefixed
    /// sibling. The input file is never moved or deleted. Re-running on an
    /// already-normalized file is a no-op beyond one measurement pass.
    pub async fn normalize(&self, input: &Path) -> Result<PathBuf, NormalizeError> {
        check_readable(input)?;

        let measured = self.measure_max_volume(input).await?;
        let target = self.target_db as f64;
        if decide(target, measured) == Verdict::AlreadyNormalized {
            info!(
                "volume already normalized: measured {} dB, target {} dB",
                measured, target
            );
            return Ok(input.to_path_buf());
        }

        let output = sibling_output_path(input);
        // A previous failed run may have left a stale output behind.
        if output.exists() {
            tokio::fs::remove_file(&output).await?;
        }

        info!(
            "normalizing {:?}: measured {} dB, target {} dB",
            input, measured, target
        );
        let input_arg = input.to_string_lossy();
        let output_arg = output.to_string_lossy();
        self.run_ffmpeg(&[
            "-i",
            input_arg.as_ref(),
            "-af",
            "volume=-1dB, loudnorm",
            "-y",
            output_arg.as_ref(),
        ])
        .await?;

        Ok(output)
    }

    /// Measure the peak volume of a file in dB.
    pub async fn measure_max_volume(&self, input: &Path) -> Result<f64, NormalizeError> {
        let input_arg = input.to_string_lossy();
        let output = self
            .run_ffmpeg(&[
                "-i",
                input_arg.as_ref(),
                "-af",
                "volumedetect",
                "-f",
                "null",
                "-",
            ])
            .await?;
        // volumedetect reports on stderr
        parse_max_volume(&String::from_utf8_lossy(&output.stderr))
    }

    async fn run_ffmpeg(&self, args: &[&str]) -> Result<std::process::Output, NormalizeError> {
        debug!("running ffmpeg with arguments {:?}", args);
        // Timing out drops the future; the child must die with it.
        let run = Command::new(&self.tool)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();
        let output = tokio::time::timeout(self.ffmpeg_timeout, run)
            .await
            .map_err(|_| NormalizeError::Timeout(self.ffmpeg_timeout))??;

        if !output.status.success() {
            return Err(NormalizeError::ProcessFailed(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }
        Ok(output)
    }
}

fn check_readable(path: &Path) -> Result<(), NormalizeError> {
    std::fs::File::open(path).map_err(|_| NormalizeError::UnreadableInput(path.to_path_buf()))?;
    Ok(())
}

/// `normalized_<file name>` next to the input.
fn sibling_output_path(input: &Path) -> PathBuf {
    let file_name = input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("normalized_{}", file_name))
}

/// Extract the peak volume from a volumedetect report.
///
/// Scans for a line containing `max_volume`; the value is the text after the
/// last colon, or, when the line has no usable colon, the last two
/// whitespace-separated tokens (number and unit).
pub fn parse_max_volume(report: &str) -> Result<f64, NormalizeError> {
    for line in report.lines() {
        if !line.contains("max_volume") {
            continue;
        }
        let value = match line.rfind(':') {
            Some(idx) if idx > 0 && idx + 1 < line.len() => line[idx + 1..].trim().to_string(),
            _ => {
                let tokens: Vec<&str> = line.split_whitespace().collect();
                if tokens.len() < 2 {
                    continue;
                }
                format!("{} {}", tokens[tokens.len() - 2], tokens[tokens.len() - 1])
            }
        };
        return parse_db_value(&value);
    }
    Err(NormalizeError::ParseFailed(
        "no max_volume line in report".to_string(),
    ))
}

/// Parse a signed decimal with an optional `dB` unit suffix.
fn parse_db_value(value: &str) -> Result<f64, NormalizeError> {
    let mut number = value.trim();
    let bytes = number.as_bytes();
    if bytes.len() >= 2
        && bytes[bytes.len() - 2].eq_ignore_ascii_case(&b'd')
        && bytes[bytes.len() - 1].eq_ignore_ascii_case(&b'b')
    {
        number = number[..number.len() - 2].trim();
    }
    number
        .parse::<f64>()
        .map_err(|_| NormalizeError::ParseFailed(format!("invalid volume value {:?}", value)))
}
