//! Script Functions
//!
//! Function definitions backed by an external script. The call argument is
//! written to the script's stdin as JSON and its stdout is parsed as the
//! result.

use serde_json::Value;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::str::FromStr;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error};

use crate::common::interpolation::interpolate;
use crate::common::paths::resolve_path;
use crate::common::CallError;
use crate::definition::Definition;

/// Interpreter used to run a script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Runtime {
    Sh,
    Bash,
    Python3,
    Node,
    Ruby,
    /// The entrypoint is itself the executable
    Custom,
}

impl Runtime {
    fn interpreter(self) -> Option<&'static str> {
        match self {
            Runtime::Sh => Some("sh"),
            Runtime::Bash => Some("bash"),
            Runtime::Python3 => Some("python3"),
            Runtime::Node => Some("node"),
            Runtime::Ruby => Some("ruby"),
            Runtime::Custom => None,
        }
    }
}

impl FromStr for Runtime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sh" => Ok(Runtime::Sh),
            "bash" => Ok(Runtime::Bash),
            "python3" => Ok(Runtime::Python3),
            "node" => Ok(Runtime::Node),
            "ruby" => Ok(Runtime::Ruby),
            "custom" => Ok(Runtime::Custom),
            other => Err(format!("unsupported script runtime: {}", other)),
        }
    }
}

/// How long a script may run unless its export sets `timeout_ms`
pub const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_secs(60);

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// A script bound to the unit that exports it
#[derive(Debug, Clone)]
pub struct ScriptFunction {
    unit: String,
    runtime: Runtime,
    entrypoint: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
    timeout: Duration,
}

impl ScriptFunction {
    /// Bind a script to `unit`, resolving the entrypoint against `unit_dir`
    /// and interpolating the env template once
    pub fn new(
        unit: &str,
        unit_dir: &Path,
        runtime: Runtime,
        entrypoint: &str,
        args: Vec<String>,
        env_template: &HashMap<String, String>,
    ) -> Self {
        let env = env_template
            .iter()
            .map(|(key, template)| (key.clone(), render_env_value(template, unit, unit_dir)))
            .collect();

        Self {
            unit: unit.to_string(),
            runtime,
            entrypoint: resolve_path(entrypoint, unit_dir),
            args,
            env,
            timeout: DEFAULT_SCRIPT_TIMEOUT,
        }
    }

    /// Kill the script if it runs longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn entrypoint(&self) -> &Path {
        &self.entrypoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wrap this script as a function definition
    pub fn into_definition(self) -> Definition {
        Definition::function(move |input| self.invoke(input))
    }

    /// Run the script once with `input`
    pub fn invoke(&self, input: Value) -> Result<Value, CallError> {
        debug!("Executing script for unit {}: {:?}", self.unit, self.entrypoint);

        if !self.entrypoint.exists() {
            error!("Script not found: {:?}", self.entrypoint);
            return Err(CallError::Spawn {
                command: self.entrypoint.display().to_string(),
                message: "script not found".to_string(),
            });
        }

        let (program, cmd_args) = match self.runtime.interpreter() {
            Some(interpreter) => {
                let mut cmd_args = vec![self.entrypoint.display().to_string()];
                cmd_args.extend(self.args.iter().cloned());
                (interpreter.to_string(), cmd_args)
            }
            None => (self.entrypoint.display().to_string(), self.args.clone()),
        };

        let payload = serde_json::json!({
            "unit": self.unit,
            "input": input,
        });
        let payload = serde_json::to_vec(&payload)
            .map_err(|e| CallError::InvalidArguments(format!("failed to serialize input: {}", e)))?;

        let mut command = Command::new(&program);
        command
            .args(&cmd_args)
            .env_clear()
            .envs(&self.env)
            .env("SPACEDEFS_UNIT", &self.unit)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(path) = std::env::var_os("PATH") {
            command.env("PATH", path);
        }

        let mut child = command.spawn().map_err(|e| {
            error!("Failed to spawn script: {}", e);
            CallError::Spawn {
                command: program.clone(),
                message: e.to_string(),
            }
        })?;

        // Scripts may write output before consuming all of stdin
        let writer = child.stdin.take().map(|mut stdin| {
            thread::spawn(move || {
                // A script that never reads stdin closes the pipe early
                if let Err(e) = stdin.write_all(&payload) {
                    debug!("Script did not consume stdin: {}", e);
                }
            })
        });
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = self.wait(&mut child, &program)?;

        if let Some(writer) = writer {
            let _ = writer.join();
        }
        let stdout = collect(stdout);
        let stderr = collect(stderr);

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr).trim().to_string();
            error!("Script failed: {}", stderr);
            return Err(CallError::Failed {
                status: status.to_string(),
                stderr,
            });
        }

        let stdout = String::from_utf8_lossy(&stdout);
        if stdout.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&stdout).map_err(|e| {
            error!("Script output is not valid JSON: {}", e);
            CallError::InvalidOutput(e.to_string())
        })
    }

    /// Wait for the child to exit, killing it once the timeout passes
    fn wait(&self, child: &mut Child, program: &str) -> Result<ExitStatus, CallError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    error!(
                        "Script for unit {} timed out after {:?}",
                        self.unit, self.timeout
                    );
                    return Err(CallError::Timeout {
                        command: program.to_string(),
                        timeout_ms: self.timeout.as_millis() as u64,
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    return Err(CallError::Spawn {
                        command: program.to_string(),
                        message: e.to_string(),
                    })
                }
            }
        }
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(e) = pipe.read_to_end(&mut buf) {
            debug!("Failed to read script output: {}", e);
        }
        buf
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

/// Interpolate `{unit:name}`, `{unit:dir}` and `{env:VAR}` in an env value
fn render_env_value(template: &str, unit: &str, unit_dir: &Path) -> String {
    interpolate(template, |scope, key| match (scope, key) {
        ("unit", "name") => Some(unit.to_string()),
        ("unit", "dir") => Some(unit_dir.display().to_string()),
        ("env", var) => std::env::var(var).ok(),
        _ => None,
    })
}
