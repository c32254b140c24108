use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    // A missing `.env` is fine; values may come from the environment or flags.
    let _ = dotenvy::dotenv();
    omnivore_epub::logging::init().context("init logging")?;

    let cli = omnivore_epub::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "omnivore-epub");

    match cli.command {
        omnivore_epub::cli::Command::Build(args) => {
            omnivore_epub::build::run(args).await.context("build")?;
        }
    }

    Ok(())
}
