use crate::error::{RegionRasterError, Result};
use log::{debug, info};
use std::io::ErrorKind;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

/// What happens to a tool's stdout/stderr while it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Collect the streams; they only surface in errors and debug logs.
    #[default]
    Captured,
    /// Pass the streams through to the terminal.
    Inherited,
}

impl OutputMode {
    pub fn from_show_output(show: bool) -> Self {
        if show {
            OutputMode::Inherited
        } else {
            OutputMode::Captured
        }
    }
}

/// Result of a tool run that exited successfully.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// A GDAL command-line invocation (`gdalwarp`, `gdal_rasterize`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolInvocation {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl ToString) -> Self {
        self.args.push(arg.to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        self.args.extend(args.into_iter().map(|a| a.to_string()));
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run to completion, failing on a missing executable or a non-zero exit.
    pub fn run(&self, mode: OutputMode) -> Result<ToolOutput> {
        debug!("Running: {}", self.command_line());

        let mut command = Command::new(&self.program);
        command.args(&self.args);

        let output = match mode {
            OutputMode::Captured => command.output(),
            OutputMode::Inherited => command
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .map(|status| std::process::Output {
                    status,
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                }),
        };

        let output = match output {
            Ok(output) => output,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RegionRasterError::ToolNotFound(self.program.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(RegionRasterError::ToolFailed {
                program: self.program.clone(),
                code: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        if !stderr.trim().is_empty() {
            debug!("{} stderr: {}", self.program, stderr.trim());
        }
        info!("{} finished", self.program);

        Ok(ToolOutput {
            status: output.status,
            stdout,
            stderr,
        })
    }
}

/// Check that a tool actually produced its output file.
pub fn ensure_output(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(RegionRasterError::OutputMissing(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line() {
        let inv = ToolInvocation::new("gdalwarp")
            .args(["-r", "near"])
            .arg(70.0)
            .path_arg(Path::new("/tmp/out.tif"));
        assert_eq!(inv.command_line(), "gdalwarp -r near 70 /tmp/out.tif");
    }

    #[test]
    fn test_missing_tool() {
        let inv = ToolInvocation::new("surely-not-an-installed-gdal-tool");
        assert!(matches!(
            inv.run(OutputMode::Captured),
            Err(RegionRasterError::ToolNotFound(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_reported() {
        let inv = ToolInvocation::new("sh").args(["-c", "echo broken >&2; exit 3"]);
        match inv.run(OutputMode::Captured) {
            Err(RegionRasterError::ToolFailed { code, stderr, .. }) => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "broken");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_success_captures_stdout() {
        let out = ToolInvocation::new("sh")
            .args(["-c", "echo done"])
            .run(OutputMode::Captured)
            .unwrap();
        assert_eq!(out.stdout.trim(), "done");
    }

    #[test]
    fn test_ensure_output() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.tif");
        assert!(ensure_output(&path).is_err());
        std::fs::write(&path, b"x").unwrap();
        assert!(ensure_output(&path).is_ok());
    }
}
