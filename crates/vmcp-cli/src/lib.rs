pub mod args;
pub mod commands;

use args::{Cli, Command};

/// Runs the parsed CLI: initializes tracing from `--log-level`/`LOG_LEVEL`
/// the way the teacher's `Cli::execute` does, then dispatches to the
/// chosen subcommand.
pub async fn execute(cli: Cli) -> anyhow::Result<()> {
    init_tracing(cli.log_level.as_deref());

    match cli.command {
        Command::Run(args) => commands::run::execute(args).await,
        Command::ServeTest(args) => commands::serve_test::execute(args).await,
    }
}

fn init_tracing(log_level_override: Option<&str>) {
    let level = log_level_override
        .map(str::to_string)
        .or_else(|| std::env::var("LOG_LEVEL").ok())
        .unwrap_or_else(|| "info".to_string());

    let filter = tracing_subscriber::EnvFilter::try_new(&level).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}
