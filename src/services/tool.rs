use crate::metrics::Metrics;
use crate::models::{OsFamily, Platform};
use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

/// Captured result of a successful external process run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Errors from running an external process.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran and exited non-zero; `stderr` is the tool's own diagnostic.
    #[error("Command exited with code {exit_code}: {}", .stderr.trim())]
    Failed { exit_code: i32, stderr: String },

    #[error("Timeout after {0:?}")]
    Timeout(Duration),
}

/// Seam between the provisioning logic and process execution.
///
/// Implementations block the caller (at the `.await`) until the process exits and
/// turn a non-zero exit into [`ToolError::Failed`].
#[allow(async_fn_in_trait)]
pub trait ToolRunner {
    async fn run(&self, program: &Utf8Path, args: &[String]) -> Result<ToolOutput>;
}

/// How a command line is handed to the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellMode {
    /// Program plus argument vector, no shell in between.
    Direct,
    /// `powershell.exe -ExecutionPolicy Bypass` on Windows hosts, `/bin/bash -c` elsewhere.
    HostShell,
}

/// Runs one external process at a time from the provisioning root.
pub struct ToolInvoker {
    host: Platform,
    working_dir: Utf8PathBuf,
    timeout: Duration,
    shell: ShellMode,
    metrics: Arc<Metrics>,
}

impl ToolInvoker {
    pub fn new(
        host: Platform,
        working_dir: impl Into<Utf8PathBuf>,
        timeout: Duration,
        shell: ShellMode,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            host,
            working_dir: working_dir.into(),
            timeout,
            shell,
            metrics,
        }
    }

    pub fn working_dir(&self) -> &Utf8Path {
        &self.working_dir
    }

    /// Build the command for `program args...` according to the shell mode and host OS.
    pub fn build_command(&self, program: &Utf8Path, args: &[String]) -> Command {
        let mut cmd = match (self.shell, self.host.os_family()) {
            (ShellMode::Direct, _) => {
                let mut c = Command::new(program.as_std_path());
                c.args(args);
                c
            }
            (ShellMode::HostShell, OsFamily::Windows) => {
                let line = powershell_command_line(program, args);
                let mut c = Command::new("powershell.exe");
                c.args([
                    "-NoProfile",
                    "-ExecutionPolicy",
                    "Bypass",
                    "-Command",
                    line.as_str(),
                ]);
                c
            }
            (ShellMode::HostShell, OsFamily::Unix) => {
                let line = bash_command_line(program, args);
                let mut c = Command::new("/bin/bash");
                c.args(["-c", line.as_str()]);
                c
            }
        };

        cmd.current_dir(self.working_dir.as_std_path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl ToolRunner for ToolInvoker {
    async fn run(&self, program: &Utf8Path, args: &[String]) -> Result<ToolOutput> {
        tracing::info!("Executing: {} {}", program, args.join(" "));

        let start = Instant::now();
        self.metrics.record_tool_invocation();

        let child = self
            .build_command(program, args)
            .spawn()
            .map_err(|source| {
                self.metrics.record_tool_failure();
                ToolError::Spawn {
                    program: program.to_string(),
                    source,
                }
            })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| {
                self.metrics.record_tool_failure();
                ToolError::Spawn {
                    program: program.to_string(),
                    source,
                }
            })?,
            Err(_) => {
                tracing::warn!("{} timed out after {:?}", program, self.timeout);
                self.metrics.record_tool_failure();
                return Err(ToolError::Timeout(self.timeout).into());
            }
        };

        let duration = start.elapsed();
        self.metrics.record_tool_time(duration);
        let exit_code = output.status.code().unwrap_or(-1);

        tracing::info!(
            "{} completed in {:.2}s with exit code {}",
            program,
            duration.as_secs_f32(),
            exit_code
        );

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if exit_code != 0 {
            self.metrics.record_tool_failure();
            return Err(ToolError::Failed {
                exit_code,
                stderr,
            }
            .into());
        }

        Ok(ToolOutput {
            stdout,
            stderr,
            exit_code,
        })
    }
}

/// Quote `arg` for POSIX shells: single quotes, with embedded quotes spliced out.
pub fn bash_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// Quote `arg` as a PowerShell verbatim string.
pub fn powershell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', "''"))
}

fn bash_command_line(program: &Utf8Path, args: &[String]) -> String {
    std::iter::once(bash_quote(program.as_str()))
        .chain(args.iter().map(|a| bash_quote(a)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn powershell_command_line(program: &Utf8Path, args: &[String]) -> String {
    std::iter::once(format!("& {}", powershell_quote(program.as_str())))
        .chain(args.iter().map(|a| powershell_quote(a)))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    fn invoker(host: Platform, shell: ShellMode) -> ToolInvoker {
        ToolInvoker::new(
            host,
            "/work",
            Duration::from_secs(5),
            shell,
            Arc::new(Metrics::new()),
        )
    }

    fn argv(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_quoting() {
        assert_eq!(bash_quote("plain"), "'plain'");
        assert_eq!(bash_quote("it's"), r"'it'\''s'");
        assert_eq!(powershell_quote("it's"), "'it''s'");
    }

    #[test]
    fn test_direct_command_is_structured() {
        let invoker = invoker(Platform::LinuxX64, ShellMode::Direct);
        let args = vec!["list".to_string(), "--json".to_string()];
        let cmd = invoker.build_command(Utf8Path::new("/work/pixi"), &args);

        assert_eq!(cmd.as_std().get_program(), OsStr::new("/work/pixi"));
        assert_eq!(argv(&cmd), args);
        assert_eq!(
            cmd.as_std().get_current_dir(),
            Some(Utf8Path::new("/work").as_std_path())
        );
    }

    #[test]
    fn test_bash_wrapper() {
        let invoker = invoker(Platform::MacArm64, ShellMode::HostShell);
        let cmd = invoker.build_command(
            Utf8Path::new("/work/pixi"),
            &["add".to_string(), "gdal >=3.9".to_string()],
        );

        assert_eq!(cmd.as_std().get_program(), OsStr::new("/bin/bash"));
        assert_eq!(argv(&cmd), vec!["-c", "'/work/pixi' 'add' 'gdal >=3.9'"]);
    }

    #[test]
    fn test_powershell_wrapper() {
        let invoker = invoker(Platform::WindowsX64, ShellMode::HostShell);
        let cmd = invoker.build_command(Utf8Path::new("C:/Conda/pixi.exe"), &["list".to_string()]);

        assert_eq!(cmd.as_std().get_program(), OsStr::new("powershell.exe"));
        let args = argv(&cmd);
        assert_eq!(&args[..4], &["-NoProfile", "-ExecutionPolicy", "Bypass", "-Command"]);
        assert_eq!(args[4], "& 'C:/Conda/pixi.exe' 'list'");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_captures_stdout() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let invoker = ToolInvoker::new(
            Platform::LinuxX64,
            Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap(),
            Duration::from_secs(10),
            ShellMode::Direct,
            Arc::new(Metrics::new()),
        );

        let output = invoker
            .run(Utf8Path::new("/bin/sh"), &["-c".to_string(), "echo hello".to_string()])
            .await
            .unwrap();
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.exit_code, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_maps_nonzero_exit_to_failed() {
        let metrics = Arc::new(Metrics::new());
        let invoker = ToolInvoker::new(
            Platform::LinuxX64,
            "/",
            Duration::from_secs(10),
            ShellMode::Direct,
            metrics.clone(),
        );

        let err = invoker
            .run(
                Utf8Path::new("/bin/sh"),
                &["-c".to_string(), "echo broken manifest >&2; exit 3".to_string()],
            )
            .await
            .unwrap_err();

        match err.downcast_ref::<ToolError>() {
            Some(ToolError::Failed { exit_code, stderr }) => {
                assert_eq!(*exit_code, 3);
                assert_eq!(stderr, "broken manifest\n");
            }
            other => panic!("expected ToolError::Failed, got {:?}", other),
        }
        assert!(err.to_string().ends_with(": broken manifest"));
        assert_eq!(metrics.snapshot().tool_failures, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_times_out() {
        let invoker = ToolInvoker::new(
            Platform::LinuxX64,
            "/",
            Duration::from_millis(100),
            ShellMode::Direct,
            Arc::new(Metrics::new()),
        );

        let err = invoker
            .run(Utf8Path::new("/bin/sh"), &["-c".to_string(), "sleep 5".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ToolError>(),
            Some(ToolError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let invoker = ToolInvoker::new(
            Platform::LinuxX64,
            dir.clone(),
            Duration::from_secs(5),
            ShellMode::Direct,
            Arc::new(Metrics::new()),
        );

        let err = invoker.run(&dir.join("pixi"), &[]).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ToolError>(),
            Some(ToolError::Spawn { .. })
        ));
    }
}
