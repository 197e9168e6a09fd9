//! Per-session output directory.
//!
//! ```text
//! <root>/<session_id>/
//!   metadata.json
//!   stages.jsonl
//!   concept.txt
//!   iterations/001/{concept.txt, <stage>.py, combined.py, render.log, render.png, review.json}
//! ```
//!
//! Session directories are created exclusively, so two sessions never write
//! into the same tree.
use super::session::{GenerationSession, SessionFailure};
use super::state::SessionState;
use crate::stages::{ArtifactKind, StageArtifact, StageId};
use crate::util::now_epoch_ms;
use anyhow::{anyhow, Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub const METADATA_SCHEMA_VERSION: u32 = 1;
pub const STAGE_LOG_SCHEMA_VERSION: u32 = 1;

/// `<data_local_dir>/sforge/sessions`, falling back to the home directory.
pub fn default_workspace_root() -> Result<PathBuf> {
    let base = dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow!("unable to resolve a data directory; pass --workspace"))?;
    Ok(base.join("sforge").join("sessions"))
}

/// `<epoch_ms>-<8 hex>`.
pub fn new_session_id() -> Result<String> {
    let suffix: u32 = rand::thread_rng().gen();
    Ok(format!("{}-{suffix:08x}", now_epoch_ms()?))
}

#[derive(Debug, Clone)]
pub struct SessionWorkspace {
    id: String,
    root: PathBuf,
}

impl SessionWorkspace {
    /// Create `<root>/<id>`; fails if it already exists.
    pub fn create(root: &Path, id: &str) -> Result<Self> {
        fs::create_dir_all(root).with_context(|| format!("create workspace root {}", root.display()))?;
        let dir = root.join(id);
        fs::create_dir(&dir).with_context(|| format!("create session directory {}", dir.display()))?;
        Ok(Self {
            id: id.to_string(),
            root: dir,
        })
    }

    /// Create a workspace under a fresh session id.
    pub fn create_fresh(root: &Path) -> Result<Self> {
        Self::create(root, &new_session_id()?)
    }

    /// Open an existing session directory.
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(anyhow!("session directory not found: {}", dir.display()));
        }
        let id = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("session directory has no name: {}", dir.display()))?;
        Ok(Self {
            id,
            root: dir.to_path_buf(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.root.join("metadata.json")
    }

    pub fn stage_log_path(&self) -> PathBuf {
        self.root.join("stages.jsonl")
    }

    pub fn concept_path(&self) -> PathBuf {
        self.root.join("concept.txt")
    }

    pub fn iteration_dir(&self, iteration: u32) -> PathBuf {
        self.root.join("iterations").join(format!("{iteration:03}"))
    }

    pub fn artifact_path(&self, stage: StageId, iteration: u32) -> PathBuf {
        let name = match stage.artifact_kind() {
            ArtifactKind::Concept => "concept.txt".to_string(),
            ArtifactKind::Review => "review.json".to_string(),
            ArtifactKind::Script => format!("{stage}.py"),
        };
        self.iteration_dir(iteration).join(name)
    }

    pub fn combined_script_path(&self, iteration: u32) -> PathBuf {
        self.iteration_dir(iteration).join("combined.py")
    }

    pub fn render_log_path(&self, iteration: u32) -> PathBuf {
        self.iteration_dir(iteration).join("render.log")
    }

    pub fn render_output_path(&self, iteration: u32) -> PathBuf {
        self.iteration_dir(iteration).join("render.png")
    }

    /// Write one artifact. Concept artifacts are stored as plain text, both
    /// per iteration and as the session-level latest `concept.txt`.
    pub fn write_artifact(&self, artifact: &StageArtifact) -> Result<PathBuf> {
        let path = self.artifact_path(artifact.stage, artifact.iteration);
        let content = match artifact.kind {
            ArtifactKind::Concept => {
                let text = artifact
                    .concept()
                    .map(|doc| doc.to_text())
                    .unwrap_or_else(|_| artifact.content.clone());
                write_file(&self.concept_path(), &text)?;
                text
            }
            _ => artifact.content.clone(),
        };
        write_file(&path, &content)?;
        Ok(path)
    }

    pub fn write_combined_script(&self, iteration: u32, script: &str) -> Result<PathBuf> {
        let path = self.combined_script_path(iteration);
        write_file(&path, script)?;
        Ok(path)
    }

    pub fn write_render_log(&self, iteration: u32, log: &str) -> Result<PathBuf> {
        let path = self.render_log_path(iteration);
        write_file(&path, log)?;
        Ok(path)
    }

    pub fn write_metadata(&self, metadata: &SessionMetadata) -> Result<()> {
        let text = serde_json::to_string_pretty(metadata).context("serialize session metadata")?;
        write_file(&self.metadata_path(), &format!("{text}\n"))
    }

    pub fn load_metadata(&self) -> Result<SessionMetadata> {
        let path = self.metadata_path();
        let bytes = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))
    }

    /// Append one JSON line to `stages.jsonl`.
    pub fn append_stage_log(&self, entry: &StageLogEntry) -> Result<()> {
        let path = self.stage_log_path();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open stage log for append: {}", path.display()))?;
        let line = serde_json::to_string(entry).context("serialize stage log entry")?;
        writeln!(file, "{line}").context("write stage log entry")?;
        Ok(())
    }

    pub fn load_stage_log(&self) -> Result<Vec<StageLogEntry>> {
        let path = self.stage_log_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        let mut entries = Vec::new();
        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StageLogEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(err) => tracing::warn!(line = index + 1, error = %err, "skipping corrupt stage log entry"),
            }
        }
        Ok(entries)
    }
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("write {}", path.display()))
}

/// Summary record written to `metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub schema_version: u32,
    pub session_id: String,
    pub prompt: String,
    pub state: SessionState,
    pub iterations: u32,
    #[serde(default)]
    pub ratings: Vec<IterationRating>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_iteration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_rating: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caveat: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<SessionFailure>,
    pub started_at_epoch_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at_epoch_ms: Option<u128>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationRating {
    pub iteration: u32,
    pub rating: u8,
}

impl SessionMetadata {
    pub fn from_session(session: &GenerationSession) -> Self {
        let best = session.best_iteration();
        Self {
            schema_version: METADATA_SCHEMA_VERSION,
            session_id: session.id.clone(),
            prompt: session.prompt.clone(),
            state: session.state(),
            iterations: session.iteration_count(),
            ratings: session
                .ratings()
                .into_iter()
                .map(|(iteration, rating)| IterationRating { iteration, rating })
                .collect(),
            best_iteration: best.map(|record| record.iteration),
            final_rating: best.and_then(|record| record.rating()),
            caveat: session.caveat().map(str::to_string),
            failure: session.failure().cloned(),
            started_at_epoch_ms: session.started_at_epoch_ms,
            finished_at_epoch_ms: session.finished_at_epoch_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Success,
    Skipped,
    Failed,
}

/// One line of `stages.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageLogEntry {
    pub schema_version: u32,
    pub ts: u128,
    pub iteration: u32,
    /// A stage id, or `execute` for the render step.
    pub step: String,
    pub duration_ms: u64,
    pub outcome: StageOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Times one step and finishes into a [`StageLogEntry`].
pub struct StageLogBuilder {
    start: Instant,
    iteration: u32,
    step: String,
}

impl StageLogBuilder {
    pub fn new(iteration: u32, step: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            iteration,
            step: step.into(),
        }
    }

    pub fn success(self, summary: impl Into<String>) -> Result<StageLogEntry> {
        self.build(StageOutcome::Success, Some(summary.into()), None)
    }

    pub fn skipped(self, reason: impl Into<String>) -> Result<StageLogEntry> {
        self.build(StageOutcome::Skipped, Some(reason.into()), None)
    }

    pub fn failed(self, error: impl Into<String>) -> Result<StageLogEntry> {
        self.build(StageOutcome::Failed, None, Some(error.into()))
    }

    fn build(self, outcome: StageOutcome, summary: Option<String>, error: Option<String>) -> Result<StageLogEntry> {
        Ok(StageLogEntry {
            schema_version: STAGE_LOG_SCHEMA_VERSION,
            ts: now_epoch_ms()?,
            iteration: self.iteration,
            step: self.step,
            duration_ms: self.start.elapsed().as_millis() as u64,
            outcome,
            summary,
            error,
        })
    }
}
