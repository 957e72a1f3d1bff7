//! Simulator subprocess runner.
//!
//! The parser hands the simulator canonical netlist text and gets raw
//! result vectors back; everything numeric happens on the other side of
//! this boundary.

use std::io::Write;
use std::process::{Command, Stdio};
use std::time::Duration;

use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::rawfile::{RawResults, parse_rawfile};

/// The `run(netlist) -> raw results` boundary.
pub trait Simulator {
    fn run(&self, netlist: &str) -> Result<RawResults>;
}

/// Configuration for the ngspice runner.
#[derive(Debug, Clone)]
pub struct NgspiceConfig {
    /// Path to the ngspice executable (default: `ngspice` in PATH).
    pub executable: String,
    /// Timeout for one run, in seconds.
    pub timeout_secs: u64,
}

impl Default for NgspiceConfig {
    fn default() -> Self {
        Self {
            executable: "ngspice".to_string(),
            timeout_secs: 60,
        }
    }
}

/// ngspice invoked in batch mode with an ASCII rawfile.
#[derive(Debug, Clone, Default)]
pub struct Ngspice {
    config: NgspiceConfig,
}

impl Ngspice {
    pub fn new(config: NgspiceConfig) -> Self {
        Self { config }
    }

    /// Check that the executable runs at all.
    pub fn is_available(&self) -> bool {
        Command::new(&self.config.executable)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    pub fn version(&self) -> Result<String> {
        let output = Command::new(&self.config.executable)
            .arg("--version")
            .output()
            .map_err(|e| Error::NotFound(e.to_string()))?;
        if !output.status.success() {
            return Err(Error::NotFound("--version failed".to_string()));
        }
        let version = String::from_utf8_lossy(&output.stdout);
        Ok(version.lines().next().unwrap_or("unknown").to_string())
    }
}

impl Simulator for Ngspice {
    fn run(&self, netlist: &str) -> Result<RawResults> {
        let mut netlist_file = NamedTempFile::new().map_err(|e| Error::TempFile(e.to_string()))?;

        // The wire format requires a .end terminator.
        let netlist = if netlist.to_lowercase().contains(".end") {
            netlist.to_string()
        } else {
            format!("{}\n.end\n", netlist.trim_end())
        };
        netlist_file
            .write_all(netlist.as_bytes())
            .map_err(|e| Error::TempFile(e.to_string()))?;

        let raw_file = NamedTempFile::new().map_err(|e| Error::TempFile(e.to_string()))?;

        log::debug!("running {} in batch mode", self.config.executable);
        let mut cmd = Command::new(&self.config.executable);
        cmd.env("SPICE_ASCIIRAWFILE", "1")
            .arg("-b")
            .arg("-r")
            .arg(raw_file.path())
            .arg(netlist_file.path())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = cmd.spawn().map_err(|e| Error::NotFound(e.to_string()))?;
        let output = wait_with_timeout(child, Duration::from_secs(self.config.timeout_secs))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ExecutionFailed(format!(
                "exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let raw_text = std::fs::read_to_string(raw_file.path())
            .map_err(|e| Error::Rawfile(format!("failed to read rawfile: {}", e)))?;
        if raw_text.is_empty() {
            return Err(Error::Rawfile("simulator produced no output".to_string()));
        }
        parse_rawfile(&raw_text)
    }
}

/// Wait for a child process, killing it at the deadline.
fn wait_with_timeout(
    mut child: std::process::Child,
    timeout: Duration,
) -> Result<std::process::Output> {
    use std::io::Read;

    let start = std::time::Instant::now();
    let poll = Duration::from_millis(100);

    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let mut stdout = Vec::new();
                let mut stderr = Vec::new();
                if let Some(mut out) = child.stdout.take() {
                    out.read_to_end(&mut stdout).ok();
                }
                if let Some(mut err) = child.stderr.take() {
                    err.read_to_end(&mut stderr).ok();
                }
                return Ok(std::process::Output {
                    status,
                    stdout,
                    stderr,
                });
            }
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    return Err(Error::Timeout(timeout.as_secs()));
                }
                std::thread::sleep(poll);
            }
            Err(e) => return Err(Error::ExecutionFailed(e.to_string())),
        }
    }
}
