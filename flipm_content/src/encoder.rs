use std::{
    io::{BufRead, BufReader, Read},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    thread,
};

use flipm_shared::log::{info, trace, warn};

use crate::{Error, Result};

/// What the encoder reported after it exited.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToolOutput {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Turns a non-zero exit code into [`Error::ProcessFailure`].
    pub fn check(self) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::ProcessFailure { exit_code: self.exit_code })
        }
    }
}

/// Runs the external encoder. The pipeline only talks to the encoder through this trait.
pub trait ToolRunner: Send + Sync {
    /// Runs the tool with exactly the given arguments and waits until it exits.
    ///
    /// `label` identifies the invocation in the log, e.g. `FBX encode 'res/box.fbx'`.
    /// A non-zero exit code is not an error of this function.
    fn run(&self, label: &str, args: &[String]) -> Result<ToolOutput>;
}

/// The gameplay encoder executable.
#[derive(Debug, Clone)]
pub struct Encoder {
    path: PathBuf,
}

impl Encoder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ToolRunner for Encoder {
    fn run(&self, label: &str, args: &[String]) -> Result<ToolOutput> {
        trace!("Spawning '{}' with arguments {args:?}", self.path.display());
        let mut child = Command::new(&self.path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(Error::io("spawn", &self.path))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Both pipes are drained concurrently so that the encoder never blocks on a full pipe.
        let (stdout, stderr) = thread::scope(|scope| {
            let stdout = scope.spawn(|| stdout.map(|stdout| forward_lines(stdout, |line| info!("{label}: {line}"))));
            let stderr = scope.spawn(|| stderr.map(|stderr| forward_lines(stderr, |line| warn!("{label}: {line}"))));
            (
                stdout.join().unwrap_or_default().unwrap_or_default(),
                stderr.join().unwrap_or_default().unwrap_or_default(),
            )
        });

        let status = child.wait().map_err(Error::io("wait for", &self.path))?;
        Ok(ToolOutput {
            exit_code: status.code(),
            stdout,
            stderr,
        })
    }
}

/// Reads the stream line by line, passes every line to `log_line` and returns the whole text.
fn forward_lines(stream: impl Read, log_line: impl Fn(&str)) -> String {
    let mut text = String::new();
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {
                let decoded = String::from_utf8_lossy(&line);
                log_line(decoded.trim_end());
                text.push_str(&decoded);
            }
            Err(err) => {
                warn!("Failed to read the output of the encoder: {err}");
                break;
            }
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_exit_code() {
        let output = ToolOutput {
            exit_code: Some(0),
            ..Default::default()
        };
        assert!(output.check().is_ok());

        let output = ToolOutput {
            exit_code: Some(2),
            ..Default::default()
        };
        assert!(matches!(output.check(), Err(Error::ProcessFailure { exit_code: Some(2) })));

        let output = ToolOutput::default();
        assert!(matches!(output.check(), Err(Error::ProcessFailure { exit_code: None })));
    }

    #[test]
    fn forward_lines_keeps_text() {
        let lines = std::sync::Mutex::new(Vec::new());
        let text = forward_lines("first\nsecond\r\nthird".as_bytes(), |line| lines.lock().unwrap().push(line.to_owned()));
        assert_eq!(text, "first\nsecond\r\nthird");
        assert_eq!(lines.into_inner().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn missing_executable() {
        let encoder = Encoder::new("./this/encoder/does/not/exist");
        let result = encoder.run("test", &["-h".to_owned()]);
        assert!(matches!(result, Err(Error::IoFailure { operation: "spawn", .. })));
    }

    #[cfg(unix)]
    #[test]
    fn captures_output_and_exit_code() {
        let shell = Encoder::new("sh");
        let script = "echo out; echo err 1>&2; exit 3".to_owned();
        let output = shell.run("sh", &["-c".to_owned(), script]).unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert!(!output.success());
    }
}
