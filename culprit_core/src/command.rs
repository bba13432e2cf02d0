use crate::component::{Component, ComponentSet};
use crate::oracle::{Oracle, OracleError, Verdict};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How the enabled components reach the test command.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum InputDelivery {
    /// One component name per line on stdin.
    #[default]
    StdIn,
    /// One component name per line in a temp file. Every `{}` in `template` is
    /// replaced by the file path and the result is appended to the command,
    /// split on whitespace.
    File { template: String },
}

#[derive(Debug, Clone)]
pub struct CommandOracleConfig {
    pub command: Vec<String>,
    pub input_delivery: InputDelivery,
    pub timeout: Duration,
    /// Verdict reported when the command is killed after `timeout`.
    pub timeout_verdict: Verdict,
    pub working_dir: Option<PathBuf>,
}

/// Runs an external command once per evaluation.
///
/// Exit status zero means the subset is good; any other exit code, or death by
/// signal, means it fails.
#[derive(Debug)]
pub struct CommandOracle {
    config: CommandOracleConfig,
}

impl CommandOracle {
    pub fn new(config: CommandOracleConfig) -> Result<Self, OracleError> {
        if config.command.is_empty() {
            return Err(OracleError::InvalidSetup(
                "command must have at least one element".to_string(),
            ));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &CommandOracleConfig {
        &self.config
    }

    /// Waits for `child`, killing it once `timeout` has passed.
    ///
    /// # Returns
    /// The exit status, or `None` if the child timed out and was killed.
    fn run_and_wait_with_timeout(
        &self,
        mut child: Child,
        timeout: Duration,
    ) -> Result<Option<ExitStatus>, OracleError> {
        let start_time = Instant::now();
        loop {
            match child.try_wait()? {
                Some(status) => return Ok(Some(status)),
                None if start_time.elapsed() > timeout => {
                    warn!(
                        command = ?self.config.command,
                        timeout_ms = timeout.as_millis() as u64,
                        "test command timed out, killing"
                    );
                    child.kill().map_err(|e| {
                        OracleError::Io(format!("Failed to kill timed-out process: {e}"))
                    })?;
                    child.wait()?;
                    return Ok(None);
                }
                None => std::thread::sleep(Duration::from_millis(50)),
            }
        }
    }
}

/// Renders `subset` as one component per line, in sorted order.
pub fn render_subset<C: Component + Display>(subset: &ComponentSet<C>) -> String {
    let mut rendered = String::new();
    for component in subset {
        rendered.push_str(&component.to_string());
        rendered.push('\n');
    }
    rendered
}

fn describe_failure(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exited with code {code}");
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("terminated by signal {signal}");
        }
    }
    "exited abnormally".to_string()
}

impl<C: Component + Display> Oracle<C> for CommandOracle {
    fn name(&self) -> &'static str {
        "CommandOracle"
    }

    fn evaluate(&mut self, subset: &ComponentSet<C>) -> Result<Verdict, OracleError> {
        let payload = render_subset(subset);

        let mut cmd = Command::new(&self.config.command[0]);
        cmd.args(&self.config.command[1..]);
        if let Some(cwd) = &self.config.working_dir {
            cmd.current_dir(cwd);
        }

        // Removed on drop, so it must outlive the child.
        let mut _temp_file: Option<tempfile::NamedTempFile> = None;
        match &self.config.input_delivery {
            InputDelivery::StdIn => {
                cmd.stdin(Stdio::piped());
            }
            InputDelivery::File { template } => {
                let mut file = tempfile::NamedTempFile::new()?;
                file.write_all(payload.as_bytes())?;
                file.flush()?;
                let path = file.path().to_str().ok_or_else(|| {
                    OracleError::InvalidSetup("Temp file path is not valid UTF-8".to_string())
                })?;
                let argument = template.replace("{}", path);
                cmd.args(argument.split_whitespace());
                cmd.stdin(Stdio::null());
                _temp_file = Some(file);
            }
        }
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());

        let mut child = cmd.spawn().map_err(|e| OracleError::Spawn {
            command: self.config.command.clone(),
            reason: e.to_string(),
        })?;

        // Fed from its own thread so a child that never reads stdin cannot
        // stall the timeout below.
        let writer = child.stdin.take().map(|mut stdin| {
            std::thread::spawn(move || stdin.write_all(payload.as_bytes()))
        });

        let outcome = self.run_and_wait_with_timeout(child, self.config.timeout)?;

        if let Some(writer) = writer {
            if writer.is_finished() {
                match writer.join() {
                    // The command may legitimately exit without reading its input.
                    Ok(Err(e)) if e.kind() != ErrorKind::BrokenPipe => {
                        return Err(OracleError::Io(format!("Failed to write to stdin: {e}")));
                    }
                    Err(_) => {
                        return Err(OracleError::Io("stdin writer panicked".to_string()));
                    }
                    _ => {}
                }
            } else {
                // A descendant still holds the read end open; the writer ends with it.
                debug!("detaching stdin writer still blocked on the pipe");
            }
        }

        let verdict = match outcome {
            Some(status) if status.success() => Verdict::Good,
            Some(status) => {
                debug!(components = subset.len(), outcome = %describe_failure(&status), "test command failed");
                Verdict::Fail
            }
            None => self.config.timeout_verdict,
        };
        Ok(verdict)
    }
}
