//! Rendering-host execution.
//!
//! The host runs an assembled script headlessly. The command is a template
//! split with shell quoting rules; `{script}`, `{output}`, and `{mode}` are
//! substituted per job.
use crate::error::ExecutionError;
use crate::process::run_with_timeout;
use crate::util::tail_excerpt;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

pub const DEFAULT_RENDER_COMMAND: &str = "blender --background --factory-startup --python {script}";

const LOG_EXCERPT_BYTES: usize = 2000;

/// Render quality preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// Few samples at reduced resolution.
    #[default]
    Preview,
    Final,
}

impl RenderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderMode::Preview => "preview",
            RenderMode::Final => "final",
        }
    }

    pub fn samples(&self) -> u32 {
        match self {
            RenderMode::Preview => 32,
            RenderMode::Final => 256,
        }
    }

    pub fn resolution_percentage(&self) -> u32 {
        match self {
            RenderMode::Preview => 50,
            RenderMode::Final => 100,
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One script execution request. The script is already on disk at
/// `script_path`; `script` carries the same text for in-process hosts.
#[derive(Debug, Clone)]
pub struct RenderJob<'a> {
    pub script: &'a str,
    pub script_path: &'a Path,
    pub output_path: &'a Path,
    pub timeout: Duration,
    pub mode: RenderMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOutcome {
    pub exit_code: Option<i32>,
    pub log: String,
    /// Set when the host wrote the expected output file.
    pub artifact: Option<PathBuf>,
    pub elapsed: Duration,
}

/// Executes scripts in an external rendering host.
pub trait RenderConnector: Send + Sync {
    /// Non-zero exit and timeout are errors, never retried here.
    fn execute(&self, job: &RenderJob<'_>) -> Result<RenderOutcome, ExecutionError>;
}

/// Runs the host as a subprocess built from a command template.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    template: Vec<String>,
}

impl CommandRenderer {
    pub fn from_command(command: &str) -> Result<Self> {
        let template =
            shell_words::split(command).with_context(|| format!("parse render command: {command}"))?;
        if template.is_empty() {
            return Err(anyhow!("render command is empty"));
        }
        Ok(Self { template })
    }

    /// Concrete argv for `job`. The script path is appended when the
    /// template has no `{script}` placeholder.
    fn argv(&self, job: &RenderJob<'_>) -> Vec<String> {
        let script = job.script_path.display().to_string();
        let output = job.output_path.display().to_string();
        let mut argv: Vec<String> = self
            .template
            .iter()
            .map(|arg| {
                arg.replace("{script}", &script)
                    .replace("{output}", &output)
                    .replace("{mode}", job.mode.as_str())
            })
            .collect();
        if !self.template.iter().any(|arg| arg.contains("{script}")) {
            argv.push(script);
        }
        argv
    }
}

impl RenderConnector for CommandRenderer {
    fn execute(&self, job: &RenderJob<'_>) -> Result<RenderOutcome, ExecutionError> {
        let argv = self.argv(job);
        let program = which::which(&argv[0])
            .map_err(|err| ExecutionError::Spawn(format!("render host {}: {err}", argv[0])))?;

        let mut command = Command::new(&program);
        command
            .args(&argv[1..])
            .env("SFORGE_RENDER_OUTPUT", job.output_path)
            .env("SFORGE_RENDER_MODE", job.mode.as_str());
        if let Some(dir) = job.script_path.parent() {
            command.current_dir(dir);
        }

        tracing::debug!(program = %program.display(), mode = %job.mode, "render host start");
        let output = run_with_timeout(command, None, job.timeout)
            .map_err(|err| ExecutionError::Spawn(format!("render host {}: {err}", argv[0])))?;

        let mut log = output.stdout_lossy();
        let stderr = output.stderr_lossy();
        if !stderr.trim().is_empty() {
            if !log.is_empty() && !log.ends_with('\n') {
                log.push('\n');
            }
            log.push_str(&stderr);
        }

        tracing::info!(
            exit_code = output.status.code(),
            elapsed_ms = output.elapsed.as_millis() as u64,
            timed_out = output.timed_out,
            log_bytes = log.len(),
            "render host complete"
        );

        if output.timed_out {
            return Err(ExecutionError::TimedOut {
                timeout: job.timeout,
                log_excerpt: tail_excerpt(&log, LOG_EXCERPT_BYTES),
            });
        }
        if !output.status.success() {
            return Err(ExecutionError::NonZeroExit {
                status: output.status.to_string(),
                log_excerpt: tail_excerpt(&log, LOG_EXCERPT_BYTES),
            });
        }

        Ok(RenderOutcome {
            exit_code: output.status.code(),
            log,
            artifact: job.output_path.is_file().then(|| job.output_path.to_path_buf()),
            elapsed: output.elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job<'a>(script_path: &'a Path, output_path: &'a Path, timeout: Duration) -> RenderJob<'a> {
        RenderJob {
            script: "import bpy\n",
            script_path,
            output_path,
            timeout,
            mode: RenderMode::Preview,
        }
    }

    #[test]
    fn substitutes_placeholders() {
        let renderer = CommandRenderer::from_command("host --python {script} -o {output} --{mode}").unwrap();
        let argv = renderer.argv(&job(Path::new("/s/combined.py"), Path::new("/s/render.png"), Duration::ZERO));
        assert_eq!(
            argv,
            ["host", "--python", "/s/combined.py", "-o", "/s/render.png", "--preview"]
        );
    }

    #[test]
    fn appends_script_without_placeholder() {
        let renderer = CommandRenderer::from_command("host -b").unwrap();
        let argv = renderer.argv(&job(Path::new("/s/x.py"), Path::new("/s/x.png"), Duration::ZERO));
        assert_eq!(argv, ["host", "-b", "/s/x.py"]);
    }

    #[test]
    fn default_command_parses() {
        let renderer = CommandRenderer::from_command(DEFAULT_RENDER_COMMAND).unwrap();
        assert_eq!(renderer.template[0], "blender");
    }

    #[test]
    fn missing_host_is_a_spawn_error() {
        let renderer = CommandRenderer::from_command("sforge-no-such-render-host {script}").unwrap();
        let err = renderer
            .execute(&job(Path::new("/tmp/x.py"), Path::new("/tmp/x.png"), Duration::from_secs(1)))
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Spawn(_)));
    }

    #[cfg(unix)]
    #[test]
    fn successful_run_reports_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("combined.py");
        let output = dir.path().join("render.png");
        std::fs::write(&script, "import bpy\n").unwrap();
        let renderer =
            CommandRenderer::from_command(r#"sh -c 'echo rendering "$1"; touch "$2"' host {script} {output}"#)
                .unwrap();
        let outcome = renderer
            .execute(&job(&script, &output, Duration::from_secs(10)))
            .unwrap();
        assert_eq!(outcome.exit_code, Some(0));
        assert!(outcome.log.contains("rendering"));
        assert_eq!(outcome.artifact, Some(output));
    }

    #[cfg(unix)]
    #[test]
    fn failing_run_keeps_log_tail() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("combined.py");
        let renderer =
            CommandRenderer::from_command("sh -c 'echo Traceback: bad node >&2; exit 1' host").unwrap();
        let err = renderer
            .execute(&job(&script, &dir.path().join("render.png"), Duration::from_secs(10)))
            .unwrap_err();
        match err {
            ExecutionError::NonZeroExit { log_excerpt, .. } => assert!(log_excerpt.contains("bad node")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn slow_host_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("combined.py");
        let renderer = CommandRenderer::from_command("sh -c 'sleep 5' host").unwrap();
        let err = renderer
            .execute(&job(&script, &dir.path().join("render.png"), Duration::from_millis(100)))
            .unwrap_err();
        assert!(matches!(err, ExecutionError::TimedOut { .. }));
    }
}
