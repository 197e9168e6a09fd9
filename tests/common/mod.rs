//! Shared test infrastructure for integration tests.

use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

pub fn manifest_dir() -> PathBuf {
    PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into()))
}

/// Scratch directory plus an `sforge` command isolated from the caller's
/// environment and working directory.
pub struct Sandbox {
    pub dir: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    pub fn workspace(&self) -> PathBuf {
        self.dir.path().join("sessions")
    }

    pub fn command(&self) -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_sforge"));
        command.current_dir(self.dir.path());
        for var in [
            "SFORGE_LM_COMMAND",
            "SFORGE_LM_URL",
            "SFORGE_LM_MODEL",
            "SFORGE_LM_API_KEY",
            "SFORGE_RENDER_COMMAND",
            "RUST_LOG",
        ] {
            command.env_remove(var);
        }
        command
    }

    /// `sforge generate` with the mock LM and the given render command.
    pub fn generate(&self, prompt: &str, render_command: &str, extra: &[&str]) -> Output {
        let lm = format!("sh {}", fixture("mock-lm.sh").display());
        self.command()
            .args(["generate", "--prompt", prompt, "--json", "--lm", &lm])
            .args(["--render-command", render_command])
            .arg("--workspace")
            .arg(self.workspace())
            .args(extra)
            .output()
            .expect("run sforge generate")
    }

    /// The single session directory created under the workspace.
    pub fn session_dir(&self) -> PathBuf {
        let mut sessions: Vec<PathBuf> = std::fs::read_dir(self.workspace())
            .expect("read workspace")
            .map(|entry| entry.expect("dir entry").path())
            .collect();
        assert_eq!(sessions.len(), 1, "expected one session: {sessions:?}");
        sessions.remove(0)
    }
}

pub fn fixture(name: &str) -> PathBuf {
    let tests = manifest_dir().join("tests");
    let direct = tests.join(name);
    if direct.exists() {
        return direct;
    }
    tests.join("fixtures").join(name)
}

pub fn mock_render_command() -> String {
    format!("sh {} {{script}}", fixture("mock-render.sh").display())
}

pub fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|err| {
        panic!(
            "stdout is not JSON ({err}): {}\nstderr: {}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )
    })
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|err| panic!("read {}: {err}", path.display()))
}
