use clap::Parser;
use intake::cli::{commands, Cli, Commands};
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Reset SIGPIPE so piping into `head` terminates quietly instead of panicking
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = cli.global;
    init_tracing(global.verbose);

    // Timers must keep firing while prompts block, so prompts run on the
    // blocking pool and the session lives on this runtime
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;

    match cli.command {
        Commands::Init(args) => commands::init::run(args),
        Commands::Fill(args) => runtime.block_on(commands::fill::run(args, &global)),
        Commands::Status(args) => runtime.block_on(commands::status::run(args, &global)),
        Commands::Reset(args) => runtime.block_on(commands::reset::run(args, &global)),
        Commands::Cache(cmd) => commands::cache::run(cmd, &global),
        Commands::Review(cmd) => commands::review::run(cmd, &global),
        Commands::Config(cmd) => commands::config::run(cmd, &global),
        Commands::Completions(args) => commands::completions::run(args),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "intake=debug" } else { "intake=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A second init (tests embedding the binary) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
