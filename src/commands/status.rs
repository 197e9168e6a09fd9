//! `sforge status`: summarize a session directory from its metadata.
use crate::cli::StatusArgs;
use crate::workflow::{SessionMetadata, SessionWorkspace, StageOutcome};
use anyhow::Result;

pub fn run_status(args: &StatusArgs) -> Result<()> {
    let workspace = SessionWorkspace::open(&args.session)?;
    let metadata = workspace.load_metadata()?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&metadata)?);
        return Ok(());
    }
    let failed_steps = workspace
        .load_stage_log()?
        .iter()
        .filter(|entry| entry.outcome == StageOutcome::Failed)
        .count();
    print!("{}", render_status(&metadata, failed_steps));
    Ok(())
}

fn render_status(metadata: &SessionMetadata, failed_steps: usize) -> String {
    let mut out = format!(
        "session {} {}\nprompt: {}\niterations: {}\n",
        metadata.session_id, metadata.state, metadata.prompt, metadata.iterations
    );
    for rating in &metadata.ratings {
        out.push_str(&format!("  iteration {}: rated {}/10\n", rating.iteration, rating.rating));
    }
    if let Some(best) = metadata.best_iteration {
        out.push_str(&format!("best iteration: {best}\n"));
    }
    if let Some(caveat) = &metadata.caveat {
        out.push_str(&format!("note: {caveat}\n"));
    }
    if let Some(failure) = &metadata.failure {
        out.push_str(&format!("failed during {}: {}\n", failure.state, failure.cause));
    }
    if failed_steps > 0 {
        out.push_str(&format!("failed steps logged: {failed_steps}\n"));
    }
    if let Some(finished) = metadata.finished_at_epoch_ms {
        let elapsed_ms = finished.saturating_sub(metadata.started_at_epoch_ms);
        out.push_str(&format!("elapsed: {:.1}s\n", elapsed_ms as f64 / 1000.0));
    }
    out
}
