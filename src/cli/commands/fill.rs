//! `intake fill` command - Interactive application session
//!
//! Fresh drafts resume where the applicant left off. With `--request` the
//! session answers a reviewer's correction request: the one-time code is
//! asked first and the stored application is then loaded for editing.

use console::style;
use miette::{IntoDiagnostic, Result};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

use crate::cli::helpers::{drain_notices, format_timestamp, Context};
use crate::cli::GlobalOpts;
use crate::entities::{SectionKey, FORM_ERROR_KEY};
use crate::registration::{
    EntryContext, RegistrationOrchestrator, SessionError, SessionEvent, SessionMode,
};
use crate::schema::{SchemaWizard, StepAction};

const MAX_CODE_ATTEMPTS: usize = 3;

#[derive(clap::Args, Debug)]
pub struct FillArgs {
    /// Registration id from a correction link
    #[arg(long, value_name = "ID")]
    pub request: Option<String>,
}

pub async fn run(args: FillArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let (mut session, mut events) = ctx.session()?;
    let wizard = SchemaWizard::new(ctx.validator.registry().clone());

    let entry = match args.request {
        Some(id) => EntryContext::correction(id),
        None => EntryContext::fresh(),
    };
    session.initialize(entry).await;
    drain_notices(&mut events, global.quiet);

    let outcome = drive(&mut session, &mut events, &wizard, global.quiet).await;
    session.shutdown();
    outcome
}

async fn drive(
    session: &mut RegistrationOrchestrator,
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    wizard: &SchemaWizard,
    quiet: bool,
) -> Result<()> {
    match session.mode().clone() {
        SessionMode::Loading | SessionMode::Inactive(_) => return Ok(()),
        SessionMode::AlreadySubmitted(receipt) => {
            println!(
                "{} Application {} was submitted on {} ({})",
                style("✓").green(),
                style(&receipt.remote_id).cyan(),
                format_timestamp(&receipt.timestamp),
                receipt.summary.display_name()
            );
            println!(
                "Run {} to start a new application",
                style("intake reset").yellow()
            );
            return Ok(());
        }
        SessionMode::PendingCorrection(request) => {
            if let Some(note) = &request.review_note {
                println!("{} {}", style("Reviewer note:").bold(), note);
            }
            if !unlock_correction(session, events, wizard, quiet).await? {
                return Err(miette::miette!(
                    "correction code refused {MAX_CODE_ATTEMPTS} times"
                ));
            }
        }
        SessionMode::FreshDraft => {
            if !session.completed_steps().is_empty() && !quiet {
                println!(
                    "{} Resuming your draft at step {} of {}",
                    style("→").blue(),
                    session.current_step(),
                    session.total_steps()
                );
            }
        }
    }

    loop {
        let step = session.current_step();
        let section = SectionKey::for_step(step)
            .ok_or_else(|| miette::miette!("no section for step {step}"))?;

        let current = session.draft().section(section).clone();
        let errors = session.errors().clone();
        let prompts = wizard.clone();
        let answers =
            blocking(move || prompts.prompt_section(section, &current, &errors)).await?;
        for (path, value) in answers {
            if value.is_null() {
                session.clear_field(&path)?;
            } else {
                session.set_field(&path, value)?;
            }
        }

        let total = session.total_steps();
        let is_first = session.is_first_step();
        let is_last = session.is_last_step();
        let prompts = wizard.clone();
        let action =
            blocking(move || prompts.prompt_action(step, total, is_first, is_last)).await?;

        match action {
            StepAction::Next => {
                let result = session.next_step()?;
                if !result.is_valid {
                    print_errors(&result.errors);
                }
            }
            StepAction::Back => {
                session.previous_step()?;
            }
            StepAction::SaveAndQuit => {
                if matches!(session.mode(), SessionMode::PendingCorrection(_)) {
                    println!(
                        "{} Corrections are not kept locally; open the link again to restart",
                        style("!").yellow()
                    );
                } else {
                    println!("{} Draft saved", style("✓").green());
                }
                return Ok(());
            }
            StepAction::Submit => {
                let result = session.next_step()?;
                if !result.is_valid {
                    print_errors(&result.errors);
                    continue;
                }
                match session.submit_form().await {
                    Ok(remote_id) => {
                        drain_notices(events, quiet);
                        println!("{}", remote_id);
                        return Ok(());
                    }
                    Err(SessionError::StepInvalid { step, errors }) => {
                        println!(
                            "{} Step {} needs attention",
                            style("!").yellow(),
                            step
                        );
                        print_errors(&errors);
                    }
                    Err(e) => {
                        drain_notices(events, quiet);
                        return Err(e.into());
                    }
                }
            }
        }
        drain_notices(events, quiet);
    }
}

/// Ask for the correction code until it is accepted or attempts run out
async fn unlock_correction(
    session: &mut RegistrationOrchestrator,
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    wizard: &SchemaWizard,
    quiet: bool,
) -> Result<bool> {
    for _ in 0..MAX_CODE_ATTEMPTS {
        let prompts = wizard.clone();
        let code = blocking(move || prompts.prompt_security_code()).await?;
        session.set_security_code_input(&code);
        let input = session.security_code_input().to_string();
        let accepted = session.verify_security_code(&input).await;
        drain_notices(events, quiet);
        if accepted {
            return Ok(true);
        }
    }
    Ok(false)
}

fn print_errors(errors: &BTreeMap<String, String>) {
    for (field, message) in errors {
        if field == FORM_ERROR_KEY {
            println!("  {} {}", style("✗").red(), message);
        } else {
            println!("  {} {}: {}", style("✗").red(), style(field).bold(), message);
        }
    }
}

/// Run a blocking prompt off the runtime thread so autosave timers keep firing
async fn blocking<T, F>(prompt: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(prompt).await.into_diagnostic()?
}
