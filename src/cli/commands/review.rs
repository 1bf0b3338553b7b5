//! `intake review` command - Reviewer side of the local registry
//!
//! Status changes follow the record status transition table. Requesting a
//! correction issues a fresh one-time code; it is printed once and only its
//! digest is stored.

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};
use tabled::{builder::Builder, settings::Style};

use crate::cli::helpers::{format_timestamp, truncate_str, Context};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::entity::RecordStatus;
use crate::core::identity::ApplicationId;
use crate::core::workflow::allowed_transitions;
use crate::entities::{RemoteRecord, SectionKey};

#[derive(Subcommand, Debug)]
pub enum ReviewCommands {
    /// List registrations, newest first
    List {
        /// Only show records in this status
        #[arg(long, short = 's')]
        status: Option<RecordStatus>,
    },

    /// Show one registration
    Show {
        /// Registration id (APP-...)
        id: String,
    },

    /// Send a registration back to the applicant with a one-time code
    RequestCorrection {
        /// Registration id (APP-...)
        id: String,

        /// What the applicant needs to correct
        #[arg(long, short = 'n')]
        note: String,

        /// Code lifetime in hours (default: correction_code_ttl_hours)
        #[arg(long)]
        ttl_hours: Option<u64>,
    },

    /// Approve a pending registration
    Approve {
        /// Registration id (APP-...)
        id: String,
    },

    /// Reject a pending registration
    Reject {
        /// Registration id (APP-...)
        id: String,

        /// Reason given to the applicant
        #[arg(long, short = 'n')]
        note: Option<String>,
    },
}

pub fn run(cmd: ReviewCommands, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    match cmd {
        ReviewCommands::List { status } => run_list(&ctx, status, global),
        ReviewCommands::Show { id } => run_show(&ctx, &parse_id(&id)?, global),
        ReviewCommands::RequestCorrection {
            id,
            note,
            ttl_hours,
        } => run_request_correction(&ctx, &parse_id(&id)?, &note, ttl_hours, global),
        ReviewCommands::Approve { id } => {
            let record = ctx.registry.approve(&parse_id(&id)?).into_diagnostic()?;
            print_transition(&record, global);
            Ok(())
        }
        ReviewCommands::Reject { id, note } => {
            let record = ctx
                .registry
                .reject(&parse_id(&id)?, note.as_deref())
                .into_diagnostic()?;
            print_transition(&record, global);
            Ok(())
        }
    }
}

fn run_list(ctx: &Context, status: Option<RecordStatus>, global: &GlobalOpts) -> Result<()> {
    let records: Vec<RemoteRecord> = ctx
        .registry
        .list(status)
        .into_diagnostic()?
        .into_iter()
        .map(redacted)
        .collect();

    match global.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&records).into_diagnostic()?);
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yml::to_string(&records).into_diagnostic()?);
        }
        OutputFormat::Id => {
            for record in &records {
                println!("{}", record.id);
            }
        }
        OutputFormat::Auto => {
            if records.is_empty() {
                println!("No registrations found.");
                return Ok(());
            }
            let mut builder = Builder::default();
            builder.push_record(["ID", "Status", "Applicant", "Updated", "Note"]);
            for record in &records {
                builder.push_record([
                    record.id.clone(),
                    record.status.to_string(),
                    record.data.summary().display_name(),
                    format_timestamp(&record.updated_at),
                    truncate_str(record.review_note.as_deref().unwrap_or(""), 40),
                ]);
            }
            println!("{}", builder.build().with(Style::rounded()));
            if !global.quiet {
                println!();
                println!("{} registration(s) found", style(records.len()).cyan());
            }
        }
    }
    Ok(())
}

fn run_show(ctx: &Context, id: &str, global: &GlobalOpts) -> Result<()> {
    let record = ctx
        .registry
        .get(id)
        .into_diagnostic()?
        .map(redacted)
        .ok_or_else(|| miette::miette!("registration not found: {id}"))?;

    match global.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&record).into_diagnostic()?);
        }
        OutputFormat::Id => println!("{}", record.id),
        OutputFormat::Yaml => {
            print!("{}", serde_yml::to_string(&record).into_diagnostic()?);
        }
        OutputFormat::Auto => {
            print!("{}", serde_yml::to_string(&record).into_diagnostic()?);
            let next: Vec<String> = allowed_transitions(record.status)
                .iter()
                .map(ToString::to_string)
                .collect();
            if !global.quiet && !next.is_empty() {
                println!();
                println!("{} {}", style("Can move to:").dim(), next.join(", "));
            }
        }
    }
    Ok(())
}

/// Canonical `APP-<ULID>` form of a typed id
fn parse_id(raw: &str) -> Result<String> {
    Ok(ApplicationId::parse(raw.trim())?.to_string())
}

fn run_request_correction(
    ctx: &Context,
    id: &str,
    note: &str,
    ttl_hours: Option<u64>,
    global: &GlobalOpts,
) -> Result<()> {
    let ttl = match ttl_hours {
        Some(hours) => chrono::Duration::hours(i64::try_from(hours).into_diagnostic()?),
        None => ctx.config.correction_code_ttl(),
    };
    let issued = ctx
        .registry
        .request_correction(id, note, ttl)
        .into_diagnostic()?;

    if global.format == OutputFormat::Json {
        let view = serde_json::json!({
            "requestId": issued.request_id,
            "code": issued.code,
            "expiresAt": issued.expires_at,
        });
        println!("{}", serde_json::to_string_pretty(&view).into_diagnostic()?);
        return Ok(());
    }

    println!(
        "{} {} is now {}",
        style("✓").green(),
        style(&issued.request_id).cyan(),
        style(RecordStatus::UnderReview).yellow()
    );
    println!();
    println!(
        "  Correction code: {}  (shown once)",
        style(&issued.code).bold()
    );
    println!("  Expires:         {}", format_timestamp(&issued.expires_at));
    println!();
    println!(
        "Applicant runs: {}",
        style(format!("intake fill --request {}", issued.request_id)).yellow()
    );
    Ok(())
}

fn print_transition(record: &RemoteRecord, global: &GlobalOpts) {
    if global.quiet {
        return;
    }
    println!(
        "{} {} is now {}",
        style("✓").green(),
        style(&record.id).cyan(),
        style(record.status).yellow()
    );
    let filled = SectionKey::all()
        .iter()
        .filter(|key| !record.data.section(**key).is_empty())
        .count();
    println!(
        "  {} ({} of {} sections filled)",
        record.data.summary().display_name(),
        filled,
        SectionKey::all().len()
    );
}

/// The stored code digest is never shown
fn redacted(mut record: RemoteRecord) -> RemoteRecord {
    record.security_code = None;
    record
}
