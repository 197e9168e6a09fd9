//! CLI argument parsing for the scene generation workflow.
//!
//! The CLI stays thin: it resolves collaborators and configuration, then
//! hands off to the orchestrator or the lighting engine.
use crate::lighting::BlendMode;
use crate::render::RenderMode;
use crate::stages::StageId;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "sforge",
    version,
    about = "LM-driven procedural scene generator with render review",
    after_help = "Commands:\n  generate --prompt <text>             Run a generation session end to end\n  init                                 Write a default sforge.json\n  select --catalog <file>              Rank lighting assets for a scene\n  blend --catalog <file>               Print the lighting script for a scene\n  search --catalog <file> --tag <t>    Query the asset catalog by tag\n  status --session <dir>               Summarize a finished session\n\nExamples:\n  sforge generate --prompt \"a cozy cabin at sunset\" --catalog hdri.json\n  sforge select --catalog hdri.json --prompt \"stormy night at sea\"\n  sforge blend --catalog hdri.json --time sunset --mode dominant\n  sforge status --session ~/.local/share/sforge/sessions/1760000000000-1a2b3c4d --json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Generate(GenerateArgs),
    Init(InitArgs),
    Select(SelectArgs),
    Blend(BlendArgs),
    Search(SearchArgs),
    Status(StatusArgs),
}

#[derive(Parser, Debug)]
#[command(about = "Generate, render, and refine a scene from a prompt")]
pub struct GenerateArgs {
    /// Natural-language scene description
    #[arg(long)]
    pub prompt: String,

    /// Workflow config (defaults to ./sforge.json when present)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Lighting asset catalog JSON; without one the lighting stage uses sun and sky
    #[arg(long, value_name = "FILE")]
    pub catalog: Option<PathBuf>,

    /// LM command (stdin prompt, stdout response); env SFORGE_LM_COMMAND
    #[arg(long, value_name = "CMD", conflicts_with = "lm_url")]
    pub lm: Option<String>,

    /// OpenAI-compatible base URL; env SFORGE_LM_URL
    #[arg(long, value_name = "URL")]
    pub lm_url: Option<String>,

    /// Model name for --lm-url; env SFORGE_LM_MODEL
    #[arg(long, value_name = "NAME")]
    pub model: Option<String>,

    /// Render host command; `{script}`, `{output}` and `{mode}` are substituted.
    /// Env SFORGE_RENDER_COMMAND
    #[arg(long, value_name = "CMD")]
    pub render_command: Option<String>,

    /// Directory that receives the session directory
    #[arg(long, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    #[arg(long, value_name = "N")]
    pub max_iterations: Option<u32>,

    /// Review rating (1-10) that ends refinement
    #[arg(long, value_name = "RATING")]
    pub threshold: Option<u8>,

    /// Accept the first render without review
    #[arg(long)]
    pub no_review: bool,

    /// Leave a stage out of the pipeline (repeatable)
    #[arg(long, value_name = "STAGE")]
    pub skip: Vec<StageId>,

    #[arg(long, value_enum)]
    pub mode: Option<RenderMode>,

    #[arg(long, value_enum)]
    pub blend_mode: Option<BlendMode>,

    /// Emit the session metadata as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Write a config file with every default spelled out")]
pub struct InitArgs {
    #[arg(long, value_name = "FILE", default_value = crate::config::DEFAULT_CONFIG_FILE)]
    pub out: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

/// Scene labels for catalog queries. Labels not given explicitly are
/// inferred from `--prompt`.
#[derive(Args, Debug, Clone)]
pub struct SceneQueryArgs {
    #[arg(long, value_name = "FILE")]
    pub catalog: PathBuf,

    /// Derive labels from a description
    #[arg(long)]
    pub prompt: Option<String>,

    /// Mood label with optional weight, e.g. `cozy` or `dramatic=0.6` (repeatable)
    #[arg(long, value_name = "LABEL[=WEIGHT]")]
    pub mood: Vec<String>,

    #[arg(long, value_name = "LABEL")]
    pub time: Option<String>,

    #[arg(long, value_name = "LABEL")]
    pub environment: Option<String>,
}

#[derive(Parser, Debug)]
#[command(about = "Rank catalog assets against scene labels")]
pub struct SelectArgs {
    #[command(flatten)]
    pub query: SceneQueryArgs,

    #[arg(long, default_value_t = 5)]
    pub limit: usize,

    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Select assets and print the generated lighting script")]
pub struct BlendArgs {
    #[command(flatten)]
    pub query: SceneQueryArgs,

    #[arg(long, value_enum, default_value_t = BlendMode::Layered)]
    pub mode: BlendMode,

    #[arg(long, default_value_t = 3)]
    pub limit: usize,

    #[arg(long, default_value_t = 4)]
    pub max_layers: usize,

    #[arg(long, default_value_t = 1.0)]
    pub world_strength: f64,

    /// Print the blend configuration as JSON instead of the script
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Find catalog assets carrying any of the given tags")]
pub struct SearchArgs {
    #[arg(long, value_name = "FILE")]
    pub catalog: PathBuf,

    #[arg(long, value_name = "TAG", required = true)]
    pub tag: Vec<String>,

    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

#[derive(Parser, Debug)]
#[command(about = "Summarize a session directory")]
pub struct StatusArgs {
    #[arg(long, value_name = "DIR")]
    pub session: PathBuf,

    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        RootArgs::command().debug_assert();
    }

    #[test]
    fn generate_parses_overrides() {
        let args = RootArgs::try_parse_from([
            "sforge",
            "generate",
            "--prompt",
            "a foggy pier",
            "--skip",
            "lighting",
            "--skip",
            "render-setup",
            "--mode",
            "final",
            "--threshold",
            "9",
            "--verbose",
        ])
        .unwrap();
        assert!(args.verbose);
        let Command::Generate(generate) = args.command else {
            panic!("expected generate");
        };
        assert_eq!(generate.skip, [StageId::Lighting, StageId::RenderSetup]);
        assert_eq!(generate.mode, Some(RenderMode::Final));
        assert_eq!(generate.threshold, Some(9));
    }

    #[test]
    fn lm_command_and_url_conflict() {
        assert!(RootArgs::try_parse_from([
            "sforge", "generate", "--prompt", "x", "--lm", "cat", "--lm-url", "http://localhost"
        ])
        .is_err());
    }
}
