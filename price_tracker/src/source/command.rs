//! External-command price source.
//!
//! Runs `<program> [args...] <KEY>` for every fetch and takes the first non-empty line of
//! its standard output as the quoted price. This keeps scraping, browser automation or API
//! clients out of the engine: anything that can print a number can feed the tracker.
//!
//! A program still running when its deadline passes is killed and reaped, so a hung
//! helper never outlives the fetch that started it.

use log::{debug, warn};
use price_common::Key;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::{PriceSource, SourceError};
use crate::fetcher::DEFAULT_TIMEOUT;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Price source backed by an external program.
pub struct CommandSource {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandSource {
    /// Create a source that runs `program` with `args` followed by the key.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Kill the program if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl PriceSource for CommandSource {
    fn quote(&self, key: &Key) -> Result<String, SourceError> {
        debug!("Running {} for {}", self.program.display(), key);
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(key.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("cannot run {}: {}", self.program.display(), e))?;

        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) if started.elapsed() >= self.timeout => {
                    warn!(
                        "Killing {} for {} after {:?}",
                        self.program.display(),
                        key,
                        self.timeout
                    );
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(format!(
                        "{} did not answer for {} within {:?}",
                        self.program.display(),
                        key,
                        self.timeout
                    )
                    .into());
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(format!("cannot wait for {}: {}", self.program.display(), e).into());
                }
            }
        }
        let output = child.wait_with_output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )
            .into());
        }

        let stdout = String::from_utf8(output.stdout)?;
        stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| format!("{} printed nothing for {}", self.program.display(), key).into())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn key() -> Key {
        "msft".parse().unwrap()
    }

    #[test]
    fn first_non_empty_stdout_line_is_the_quote() {
        let source = CommandSource::new(
            "sh",
            vec!["-c".into(), "echo; echo \"$0 415,20\"; echo ignored".into()],
        );
        assert_eq!(source.quote(&key()).unwrap(), "MSFT 415,20");
    }

    #[test]
    fn failing_program_reports_stderr() {
        let source = CommandSource::new("sh", vec!["-c".into(), "echo boom >&2; exit 3".into()]);
        let err = source.quote(&key()).unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn missing_program_is_an_error() {
        let source = CommandSource::new("/nonexistent/quote-helper", Vec::new());
        assert!(source.quote(&key()).is_err());
    }

    #[test]
    fn silent_program_is_an_error() {
        let source = CommandSource::new("true", Vec::new());
        assert!(source.quote(&key()).is_err());
    }

    #[test]
    fn hung_program_is_killed_at_the_deadline() {
        let dir = tempfile::TempDir::new().unwrap();
        let pid_file = dir.path().join("pid");
        let script = format!("echo $$ > '{}'; exec sleep 30", pid_file.display());
        let source = CommandSource::new("sh", vec!["-c".into(), script])
            .with_timeout(Duration::from_millis(300));

        let started = Instant::now();
        let err = source.quote(&key()).unwrap_err();
        assert!(err.to_string().contains("did not answer"));
        assert!(started.elapsed() < Duration::from_secs(5));

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let alive = Command::new("kill")
            .args(["-0", pid.trim()])
            .stderr(Stdio::null())
            .status()
            .unwrap()
            .success();
        assert!(!alive, "helper {} still running", pid.trim());
    }
}
