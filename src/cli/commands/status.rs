//! `intake status` command - Where the current session stands
//!
//! The session is resolved exactly as `intake fill` would resolve it, so an
//! expired draft or a receipt for a vanished record is purged here too.

use console::style;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

use crate::cli::helpers::{format_timestamp, Context};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::entities::SubmissionSummary;
use crate::registration::{EntryContext, SessionMode};

#[derive(clap::Args, Debug)]
pub struct StatusArgs {
    /// Resolve the session for a correction link instead
    #[arg(long, value_name = "ID")]
    pub request: Option<String>,
}

#[derive(Debug, Serialize)]
struct StatusView {
    mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    notice: Option<String>,
    step: usize,
    total_steps: usize,
    progress: f64,
    completed_steps: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    draft_saved_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<SubmissionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    review_note: Option<String>,
}

pub async fn run(args: StatusArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let (mut session, _events) = ctx.session()?;
    let entry = match args.request {
        Some(id) => EntryContext::correction(id),
        None => EntryContext::fresh(),
    };
    session.initialize(entry).await;
    let draft_saved_at = ctx.cache().status().draft_saved_at;
    session.shutdown();

    let mode = session.mode().clone();
    let mut view = StatusView {
        mode: mode.name(),
        notice: None,
        step: session.current_step(),
        total_steps: session.total_steps(),
        progress: session.progress(),
        completed_steps: session.completed_steps().iter().copied().collect(),
        draft_saved_at: draft_saved_at.as_ref().map(format_timestamp),
        remote_id: None,
        summary: None,
        review_note: None,
    };
    match &mode {
        SessionMode::Inactive(notice) => view.notice = Some(notice.to_string()),
        SessionMode::AlreadySubmitted(receipt) => {
            view.remote_id = Some(receipt.remote_id.clone());
            view.summary = Some(receipt.summary.clone());
            view.draft_saved_at = None;
        }
        SessionMode::PendingCorrection(request) => {
            view.remote_id = Some(request.request_id.clone());
            view.review_note = request.review_note.clone();
        }
        SessionMode::Loading | SessionMode::FreshDraft => {}
    }

    match global.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&view).into_diagnostic()?);
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yml::to_string(&view).into_diagnostic()?);
        }
        OutputFormat::Id => {
            if let Some(id) = &view.remote_id {
                println!("{id}");
            }
        }
        OutputFormat::Auto => print_human(&view),
    }
    Ok(())
}

fn print_human(view: &StatusView) {
    println!("{}", style("Session Status").bold());
    println!("{}", style("─".repeat(40)).dim());
    println!("  Mode:      {}", style(view.mode).cyan());

    if let Some(notice) = &view.notice {
        println!("  Notice:    {}", style(notice).yellow());
        return;
    }
    if let Some(id) = &view.remote_id {
        println!("  Record:    {}", style(id).cyan());
    }
    if let Some(summary) = &view.summary {
        println!("  Applicant: {}", summary.display_name());
        return;
    }
    if let Some(note) = &view.review_note {
        println!("  Reviewer:  {note}");
    }

    println!(
        "  Step:      {} of {} ({:.0}%)",
        view.step,
        view.total_steps,
        view.progress
    );
    if !view.completed_steps.is_empty() {
        let done: Vec<String> = view.completed_steps.iter().map(|s| s.to_string()).collect();
        println!("  Completed: {}", done.join(", "));
    }
    if let Some(saved) = &view.draft_saved_at {
        println!("  Saved at:  {saved}");
    }
}
