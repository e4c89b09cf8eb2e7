//! Offline compiler driven as a child process.

use std::fs;
use std::io;
use std::path::Path;
use std::process::Command;

use progcache_core::{CompileAdapter, DeviceIdentity};
use thiserror::Error;
use tracing::debug;

use crate::config::CompilerConfig;

#[derive(Debug, Error)]
pub enum CompilerError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} failed for {device} ({status}):\n{log}")]
    Failed {
        program: String,
        device: String,
        status: String,
        log: String,
    },

    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("Got {actual} binaries for {expected} devices")]
    BinaryCount { expected: usize, actual: usize },

    #[error("Binary for device {0} is empty")]
    EmptyBinary(usize),
}

/// Binaries produced for a device list, in device order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessProgram {
    pub binaries: Vec<Vec<u8>>,
}

/// Runs `program args...` once per device.
///
/// `{input}`, `{output}`, `{device}` and `{options}` are replaced inside
/// every argument. An argument that is exactly `{options}` is dropped when
/// there are no options.
#[derive(Debug, Clone)]
pub struct ProcessCompiler {
    program: String,
    args: Vec<String>,
    runtime_version: String,
}

impl ProcessCompiler {
    pub fn new(config: &CompilerConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            runtime_version: config.runtime_version.clone(),
        }
    }

    fn command_args(
        &self,
        input: &Path,
        output: &Path,
        device: &str,
        options: &str,
    ) -> Vec<String> {
        self.args
            .iter()
            .filter(|arg| !(options.is_empty() && arg.as_str() == "{options}"))
            .map(|arg| {
                arg.replace("{input}", &input.to_string_lossy())
                    .replace("{output}", &output.to_string_lossy())
                    .replace("{device}", device)
                    .replace("{options}", options)
            })
            .collect()
    }
}

impl CompileAdapter for ProcessCompiler {
    type Device = DeviceIdentity;
    type Context = ();
    type Program = ProcessProgram;
    type Error = CompilerError;

    fn device_identity(&self, device: &DeviceIdentity) -> Result<DeviceIdentity, CompilerError> {
        Ok(device.clone())
    }

    fn runtime_fingerprint(&self) -> String {
        self.runtime_version.clone()
    }

    fn compile(
        &self,
        _context: &(),
        devices: &[DeviceIdentity],
        source: &str,
        options: &str,
    ) -> Result<ProcessProgram, CompilerError> {
        let scratch = tempfile::tempdir()?;
        let input = scratch.path().join("kernel.cl");
        fs::write(&input, source)?;

        let mut binaries = Vec::with_capacity(devices.len());
        for (i, device) in devices.iter().enumerate() {
            let output = scratch.path().join(format!("device{i}.bin"));
            let args = self.command_args(&input, &output, &device.name, options);
            debug!("Running {} {}", self.program, args.join(" "));

            let result = Command::new(&self.program)
                .args(&args)
                .output()
                .map_err(|source| CompilerError::Spawn {
                    program: self.program.clone(),
                    source,
                })?;

            if !result.status.success() {
                return Err(CompilerError::Failed {
                    program: self.program.clone(),
                    device: device.name.clone(),
                    status: result.status.to_string(),
                    log: String::from_utf8_lossy(&result.stderr).trim_end().to_string(),
                });
            }

            binaries.push(fs::read(&output)?);
        }

        Ok(ProcessProgram { binaries })
    }

    fn binaries(&self, program: &ProcessProgram) -> Result<Vec<Vec<u8>>, CompilerError> {
        Ok(program.binaries.clone())
    }

    fn from_binaries(
        &self,
        _context: &(),
        devices: &[DeviceIdentity],
        binaries: &[&[u8]],
    ) -> Result<ProcessProgram, CompilerError> {
        if binaries.len() != devices.len() {
            return Err(CompilerError::BinaryCount {
                expected: devices.len(),
                actual: binaries.len(),
            });
        }
        if let Some(i) = binaries.iter().position(|b| b.is_empty()) {
            return Err(CompilerError::EmptyBinary(i));
        }

        Ok(ProcessProgram {
            binaries: binaries.iter().map(|b| b.to_vec()).collect(),
        })
    }
}
