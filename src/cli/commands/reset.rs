//! `intake reset` command - Start over with an empty application

use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm};
use miette::{IntoDiagnostic, Result};

use crate::cli::helpers::{drain_notices, Context};
use crate::cli::GlobalOpts;
use crate::registration::EntryContext;

#[derive(clap::Args, Debug)]
pub struct ResetArgs {
    /// Do not ask for confirmation
    #[arg(long, short = 'y')]
    pub yes: bool,
}

pub async fn run(args: ResetArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;

    if !args.yes {
        let confirmed = tokio::task::spawn_blocking(|| {
            Confirm::with_theme(&ColorfulTheme::default())
                .with_prompt("Discard the current draft and any submission receipt?")
                .default(false)
                .interact()
        })
        .await
        .into_diagnostic()?
        .into_diagnostic()?;
        if !confirmed {
            println!("{} Nothing changed", style("→").blue());
            return Ok(());
        }
    }

    let (mut session, mut events) = ctx.session()?;
    session.initialize(EntryContext::fresh()).await;
    session.reset_form();
    session.shutdown();
    drain_notices(&mut events, global.quiet);

    if !global.quiet {
        println!("{} Session reset", style("✓").green());
    }
    Ok(())
}
