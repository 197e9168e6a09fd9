//! `sforge generate` and `sforge init`.
use crate::catalog::{AssetCatalog, StaticCatalog};
use crate::cli::{GenerateArgs, InitArgs};
use crate::config::{config_stub, resolve_config, validate_config, WorkflowConfig};
use crate::lm::{CommandGenerator, HttpGenerator, TextGenerator, DEFAULT_LM_COMMAND};
use crate::render::{CommandRenderer, DEFAULT_RENDER_COMMAND};
use crate::stages::StageSet;
use crate::workflow::{
    default_workspace_root, CancelToken, GenerationSession, Orchestrator, SessionMetadata, SessionState,
    SessionWorkspace,
};
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

const LM_COMMAND_ENV: &str = "SFORGE_LM_COMMAND";
const LM_URL_ENV: &str = "SFORGE_LM_URL";
const LM_MODEL_ENV: &str = "SFORGE_LM_MODEL";
const LM_API_KEY_ENV: &str = "SFORGE_LM_API_KEY";
const RENDER_COMMAND_ENV: &str = "SFORGE_RENDER_COMMAND";

/// Run one session. Returns `false` when the session ended `Failed`.
pub fn run_generate(args: &GenerateArgs) -> Result<bool> {
    if args.prompt.trim().is_empty() {
        return Err(anyhow!("--prompt must not be empty"));
    }
    let config = effective_config(args)?;
    let generator = build_generator(args, &config)?;
    let catalog: Arc<dyn AssetCatalog> = match &args.catalog {
        Some(path) => Arc::new(StaticCatalog::load(path)?),
        None => Arc::new(StaticCatalog::empty()),
    };
    let render_command = resolve_command(args.render_command.as_deref(), RENDER_COMMAND_ENV, DEFAULT_RENDER_COMMAND);
    let renderer = Arc::new(CommandRenderer::from_command(&render_command)?);

    let root = match &args.workspace {
        Some(path) => path.clone(),
        None => default_workspace_root()?,
    };
    let workspace = SessionWorkspace::create_fresh(&root)?;
    eprintln!("session: {}", workspace.root().display());

    let stages = StageSet::standard(generator, catalog, &config);
    let session = Orchestrator::new(stages, renderer, config)
        .with_cancel(CancelToken::interruptible())
        .run(&args.prompt, &workspace)?;

    if args.json {
        let text = serde_json::to_string_pretty(&SessionMetadata::from_session(&session))?;
        println!("{text}");
    } else {
        print_summary(&session, &workspace);
    }
    Ok(session.state() != SessionState::Failed)
}

/// Config file (or defaults) with command-line overrides applied.
fn effective_config(args: &GenerateArgs) -> Result<WorkflowConfig> {
    let mut config = resolve_config(args.config.as_deref())?;
    if let Some(max_iterations) = args.max_iterations {
        config.max_iterations = max_iterations;
    }
    if let Some(threshold) = args.threshold {
        config.quality_threshold = threshold;
    }
    if args.no_review {
        config.review_enabled = false;
    }
    for stage in &args.skip {
        config.stages.set(*stage, false);
    }
    if let Some(mode) = args.mode {
        config.render_mode = mode;
    }
    if let Some(mode) = args.blend_mode {
        config.lighting.blend_mode = mode;
    }
    validate_config(&config)?;
    Ok(config)
}

/// Flag, then environment, then default.
fn resolve_command(explicit: Option<&str>, env: &str, default: &str) -> String {
    explicit
        .map(|s| s.to_string())
        .or_else(|| std::env::var(env).ok().filter(|value| !value.trim().is_empty()))
        .unwrap_or_else(|| default.to_string())
}

fn build_generator(args: &GenerateArgs, config: &WorkflowConfig) -> Result<Arc<dyn TextGenerator>> {
    let url = if args.lm.is_some() {
        None
    } else {
        args.lm_url.clone().or_else(|| std::env::var(LM_URL_ENV).ok())
    };
    if let Some(url) = url {
        let model = args
            .model
            .clone()
            .or_else(|| std::env::var(LM_MODEL_ENV).ok())
            .ok_or_else(|| anyhow!("--model (or {LM_MODEL_ENV}) is required with an LM URL"))?;
        let api_key = std::env::var(LM_API_KEY_ENV).ok();
        let generator = HttpGenerator::new(&url, &model, api_key, config.lm_timeout());
        tracing::debug!(endpoint = generator.endpoint(), model = %model, "using http text generation");
        return Ok(Arc::new(generator));
    }
    let command = resolve_command(args.lm.as_deref(), LM_COMMAND_ENV, DEFAULT_LM_COMMAND);
    let generator = CommandGenerator::from_command(&command, config.lm_timeout())?;
    tracing::debug!(program = generator.program(), "using command text generation");
    Ok(Arc::new(generator))
}

fn print_summary(session: &GenerationSession, workspace: &SessionWorkspace) {
    println!("session {} {}", session.id, session.state());
    println!("iterations: {}", session.iteration_count());
    for (iteration, rating) in session.ratings() {
        println!("  iteration {iteration}: rated {rating}/10");
    }
    if let Some(best) = session.best_iteration() {
        let script = workspace.combined_script_path(best.iteration);
        println!("best iteration: {}", best.iteration);
        println!("script: {}", script.display());
        if let Some(image) = best.render.as_ref().and_then(|render| render.artifact.as_ref()) {
            println!("render: {}", image.display());
        }
    }
    if let Some(caveat) = session.caveat() {
        println!("note: {caveat}");
    }
    if let Some(failure) = session.failure() {
        println!("failed during {} (iteration {})", failure.state, failure.iteration);
        println!("cause: {}", failure.cause);
        match failure.last_artifact {
            Some(last) => println!(
                "last artifact: {} (iteration {}) at {}",
                last.stage,
                last.iteration,
                workspace.artifact_path(last.stage, last.iteration).display()
            ),
            None => println!("last artifact: none"),
        }
    }
}

/// Write the default config file.
pub fn run_init(args: &InitArgs) -> Result<PathBuf> {
    if args.out.exists() && !args.force {
        return Err(anyhow!(
            "{} already exists (use --force to overwrite)",
            args.out.display()
        ));
    }
    let stub = config_stub()?;
    fs::write(&args.out, format!("{stub}\n")).with_context(|| format!("write {}", args.out.display()))?;
    Ok(args.out.clone())
}
